use chrono::{DateTime, Utc};
use clap::Subcommand;
use housesprinkler_core::SprinklerCore;

#[derive(Subcommand)]
pub enum ProgramAction {
    /// Launch a program immediately
    On {
        name: String,
        /// Bypass watering-index scaling, as if launched manually from the panel
        #[arg(long)]
        manual: bool,
    },
    /// List configured programs and whether they are currently running
    List,
}

pub async fn run(
    action: ProgramAction,
    core: &mut SprinklerCore,
    now: DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ProgramAction::On { name, manual } => {
            if !core.start_program(&name, manual, now) {
                return Err(format!("program '{name}' is unknown or already running").into());
            }
            println!("{name} launched");
        }
        ProgramAction::List => {
            for program in &core.config.programs {
                println!(
                    "{}: {}",
                    program.name,
                    if program.running { "running" } else { "idle" }
                );
            }
        }
    }
    Ok(())
}
