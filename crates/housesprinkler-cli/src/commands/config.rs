use std::path::Path;

use clap::Subcommand;

use super::state::load_config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration document without starting anything
    Validate,
    /// Print the configuration document as JSON
    Show,
}

pub fn run(action: ConfigAction, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    match action {
        ConfigAction::Validate => {
            println!(
                "configuration at {} is valid: {} zone(s), {} program(s), {} schedule(s)",
                config_path.display(),
                config.zones.len(),
                config.programs.len(),
                config.schedules.len()
            );
        }
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
