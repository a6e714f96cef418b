use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

mod commands;
mod simulation;

use commands::state::open_core;

#[derive(Parser)]
#[command(name = "housesprinkler-cli", version)]
#[command(about = "CLI-first distributed irrigation controller", long_about = None)]
struct Cli {
    /// Path to the configuration document.
    #[arg(long, default_value = "/etc/house/sprinkler.json", global = true)]
    config: PathBuf,
    /// Copy the configuration document to this path before exiting.
    #[arg(long, global = true)]
    backup: Option<PathBuf>,
    /// Use the local JSON state file (default).
    #[arg(long, global = true, conflicts_with = "no_use_local_storage")]
    use_local_storage: bool,
    /// Disable the local JSON state file; state persists only to a remote
    /// depot, if one is configured.
    #[arg(long = "no-use-local-storage", global = true)]
    no_use_local_storage: bool,
    /// Verbose logging.
    #[arg(long, global = true)]
    debug: bool,
    /// Run an in-process deterministic simulation instead of driving real
    /// hardware, then exit.
    #[arg(long, global = true)]
    test: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration document management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Zone control
    Zone {
        #[command(subcommand)]
        action: commands::zone::ZoneAction,
    },
    /// Program control
    Program {
        #[command(subcommand)]
        action: commands::program::ProgramAction,
    },
    /// Calendar schedule management
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// Extend the rain delay
    Raindelay {
        /// Seconds to extend the delay by (negative shortens it).
        #[arg(default_value_t = 86_400)]
        amount: i64,
    },
    /// Enable or disable honoring the rain delay
    Rain {
        #[arg(value_enum, default_value_t = OnOff::On)]
        active: OnOff,
    },
    /// Watering-index scaling
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Re-declare control points from the configuration document
    Refresh,
    /// Toggle the global schedule switch
    Onoff,
    /// Print full runtime status as JSON
    Status,
    /// Generate shell completion script
    Complete {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OnOff {
    On,
    Off,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Print the current watering index
    Get,
    /// Enable or disable scaling program durations by the watering index
    Set { #[arg(value_enum)] state: OnOff },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = run(cli).await;
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let Some(command) = cli.command else {
        if cli.test {
            return simulation::run().await;
        }
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Complete { shell } => {
            print_completions(shell);
            return Ok(());
        }
        Commands::Config { action } => return commands::config::run(action, &cli.config),
        _ => {}
    }

    let mut core = open_core(&cli.config, cli.no_use_local_storage)?;
    let now = chrono::Utc::now();

    match command {
        Commands::Zone { action } => commands::zone::run(action, &mut core, now).await?,
        Commands::Program { action } => commands::program::run(action, &mut core, now).await?,
        Commands::Schedule { action } => commands::schedule::run(action, &mut core)?,
        Commands::Raindelay { amount } => {
            core.rain_delay(amount, now);
            println!("rain delay until {}", core.status(now)["schedule"]["rainDelayUntil"]);
        }
        Commands::Rain { active } => {
            core.rain_enable(matches!(active, OnOff::On));
            println!("rain delay honored: {}", matches!(active, OnOff::On));
        }
        Commands::Index { action } => match action {
            IndexAction::Get => println!("{}", core.current_index(now)),
            IndexAction::Set { state } => {
                let enabled = matches!(state, OnOff::On);
                core.set_index_scaling_enabled(enabled);
                println!("index scaling: {}", if enabled { "on" } else { "off" });
            }
        },
        Commands::Refresh => {
            core.refresh();
            println!("control points re-declared from configuration");
        }
        Commands::Onoff => {
            let enabled = core.schedule_switch();
            println!("schedule switch: {}", if enabled { "on" } else { "off" });
        }
        Commands::Status => {
            core.tick(&housesprinkler_core::EmptyRegistry, now).await;
            println!("{}", serde_json::to_string_pretty(&core.status(now))?);
        }
        Commands::Config { .. } | Commands::Complete { .. } => unreachable!("handled above"),
    }

    commands::state::save_config(&cli.config, &core.config)?;
    if let Some(backup) = &cli.backup {
        commands::state::save_config(backup, &core.config)?;
    }
    Ok(())
}

fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "housesprinkler-cli", &mut std::io::stdout());
}
