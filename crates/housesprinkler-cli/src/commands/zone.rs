use chrono::{DateTime, Utc};
use clap::Subcommand;
use housesprinkler_core::SprinklerCore;

#[derive(Subcommand)]
pub enum ZoneAction {
    /// Manually activate a zone for a number of seconds
    On {
        name: String,
        #[arg(default_value_t = 30)]
        seconds: u32,
    },
    /// Stop a running zone, or every zone if no name is given
    Off { name: Option<String> },
    /// List configured zones and their current control state
    List,
}

pub async fn run(
    action: ZoneAction,
    core: &mut SprinklerCore,
    now: DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ZoneAction::On { name, seconds } => {
            if !core.start_manual_zone(&name, seconds, now) {
                return Err(format!("unknown zone: {name}").into());
            }
            println!("{name} activated for {seconds}s");
        }
        ZoneAction::Off { name } => {
            core.stop(name.as_deref()).await;
            match name {
                Some(n) => println!("{n} stopped"),
                None => println!("all zones stopped"),
            }
        }
        ZoneAction::List => {
            for zone in &core.config.zones {
                println!("{}: {}", zone.name, core.control_state(&zone.name));
            }
        }
    }
    Ok(())
}
