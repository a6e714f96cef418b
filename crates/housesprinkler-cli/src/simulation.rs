//! In-process deterministic simulation driven by `--test`, grounded in
//! the teacher's timer-advance test harness pattern: rather than sleeping
//! in real time, ticks are driven by an explicit simulated clock so a run
//! finishes instantly and is reproducible.

use chrono::{Duration, Utc};
use housesprinkler_core::{EmptyRegistry, SprinklerConfig, SprinklerCore, Zone};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = SprinklerConfig {
        zones: vec![Zone {
            name: "Simulated".to_string(),
            feed: None,
            hydrate: 0,
            pulse: 30,
            pause: 10,
            manual_only: false,
        }],
        ..Default::default()
    };

    let dir = tempfile::tempdir()?;
    let mut core = SprinklerCore::new(config, reqwest::Client::new(), dir.path().join("state.json"));
    let registry = EmptyRegistry;
    let start = Utc::now();

    core.start_manual_zone("Simulated", 10, start);
    println!("simulation: activated 'Simulated' for 10s");

    for step in 0..45 {
        let now = start + Duration::seconds(step);
        core.tick(&registry, now).await;
    }

    println!(
        "simulation: idle={} after 45 simulated seconds",
        core.idle()
    );
    Ok(())
}
