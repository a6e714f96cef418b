use clap::Subcommand;
use housesprinkler_core::{RepeatKind, Schedule, SprinklerCore, TimeOfDay};
use uuid::Uuid;

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum RepeatArg {
    Once,
    Daily,
    Weekly,
}

impl From<RepeatArg> for RepeatKind {
    fn from(value: RepeatArg) -> Self {
        match value {
            RepeatArg::Once => RepeatKind::Once,
            RepeatArg::Daily => RepeatKind::Daily,
            RepeatArg::Weekly => RepeatKind::Weekly,
        }
    }
}

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Add a calendar rule that fires a program at a time of day
    Add {
        program: String,
        hour: u32,
        minute: u32,
        #[arg(long, value_enum, default_value = "daily")]
        repeat: RepeatArg,
        /// Day interval, only meaningful with `--repeat daily`
        #[arg(long, default_value_t = 1)]
        interval: i64,
        /// Zero-indexed Sunday-first weekdays this fires on, only
        /// meaningful with `--repeat weekly` (e.g. "0,6" for Sun/Sat)
        #[arg(long)]
        days: Option<String>,
    },
    /// Remove a calendar rule by id
    Remove { id: Uuid },
    /// List configured calendar rules
    List,
    /// Enable a calendar rule
    Enable { id: Uuid },
    /// Disable a calendar rule
    Disable { id: Uuid },
}

pub fn run(action: ScheduleAction, core: &mut SprinklerCore) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ScheduleAction::Add { program, hour, minute, repeat, interval, days } => {
            if core.config.program(&program).is_none() {
                return Err(format!("unknown program: {program}").into());
            }
            let mut day_flags = [false; 7];
            if let Some(days) = days {
                for token in days.split(',').filter(|t| !t.is_empty()) {
                    let index: usize = token.trim().parse()?;
                    if index >= 7 {
                        return Err(format!("day index out of range: {index}").into());
                    }
                    day_flags[index] = true;
                }
            }
            let id = Uuid::new_v4();
            core.config.schedules.push(Schedule {
                id,
                program_name: program,
                enabled: true,
                begin: 0,
                until: 0,
                start: TimeOfDay { hour, minute },
                repeat: repeat.into(),
                days: day_flags,
                interval,
                last_launch: 0,
            });
            println!("added schedule {id}");
        }
        ScheduleAction::Remove { id } => {
            let before = core.config.schedules.len();
            core.config.schedules.retain(|s| s.id != id);
            if core.config.schedules.len() == before {
                return Err(format!("unknown schedule id: {id}").into());
            }
            println!("removed schedule {id}");
        }
        ScheduleAction::List => {
            for schedule in &core.config.schedules {
                println!(
                    "{}: {} at {:02}:{:02} ({:?}){}",
                    schedule.id,
                    schedule.program_name,
                    schedule.start.hour,
                    schedule.start.minute,
                    schedule.repeat,
                    if schedule.enabled { "" } else { " [disabled]" }
                );
            }
        }
        ScheduleAction::Enable { id } => set_enabled(core, id, true)?,
        ScheduleAction::Disable { id } => set_enabled(core, id, false)?,
    }
    Ok(())
}

fn set_enabled(core: &mut SprinklerCore, id: Uuid, enabled: bool) -> Result<(), Box<dyn std::error::Error>> {
    let schedule = core
        .config
        .schedules
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| format!("unknown schedule id: {id}"))?;
    schedule.enabled = enabled;
    println!("schedule {id} {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}
