//! Pure interval/season lookup functions (spec.md §4.3).
//!
//! Both tables are pure functions of configuration, mirroring how
//! `pomodoroom-core::scheduler` keeps day-template gap math separate from
//! the stateful `AutoScheduler` engine that drives it.

use chrono::{DateTime, Datelike, Utc};

use crate::config::SprinklerConfig;

/// `index / 10` (clamped to 0..=10) looked up against `byIndex`. A missing
/// table returns 1 day (daily, i.e. no effective throttling).
pub fn interval_for_index(config: &SprinklerConfig, name: &str, index: u32) -> u32 {
    let Some(scale) = config.interval_scale(name) else {
        return 1;
    };
    let bucket = (index / 10).min(10) as usize;
    scale.by_index[bucket]
}

/// Selects the monthly or weekly bucket depending on table length (12 or
/// 52/53). A missing table returns 100 (no effect).
pub fn season_multiplier(config: &SprinklerConfig, name: &str, now: DateTime<Utc>) -> u32 {
    let Some(table) = config.season_table(name) else {
        return 100;
    };
    match table.values.len() {
        12 => {
            let month0 = now.month0() as usize;
            table.values.get(month0).copied().unwrap_or(100)
        }
        52 | 53 => {
            let week0 = (now.iso_week().week() as usize).saturating_sub(1);
            table
                .values
                .get(week0.min(table.values.len() - 1))
                .copied()
                .unwrap_or(100)
        }
        _ => 100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntervalScale, SeasonTable};
    use chrono::TimeZone;

    fn config_with_interval(by_index: [u32; 11]) -> SprinklerConfig {
        SprinklerConfig {
            intervals: vec![IntervalScale {
                name: "default".to_string(),
                by_index,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn interval_clamps_bucket_to_ten() {
        let config = config_with_interval([1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 7]);
        assert_eq!(interval_for_index(&config, "default", 100), 7);
        assert_eq!(interval_for_index(&config, "default", 250), 7);
    }

    #[test]
    fn missing_interval_table_defaults_to_daily() {
        let config = SprinklerConfig::default();
        assert_eq!(interval_for_index(&config, "missing", 50), 1);
    }

    #[test]
    fn missing_season_table_defaults_to_no_effect() {
        let config = SprinklerConfig::default();
        assert_eq!(
            season_multiplier(&config, "missing", Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap()),
            100
        );
    }

    #[test]
    fn monthly_season_table_selects_by_month() {
        let config = SprinklerConfig {
            seasons: vec![SeasonTable {
                name: "m".to_string(),
                values: (0..12).map(|i| i * 10).collect(),
            }],
            ..Default::default()
        };
        let july = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        assert_eq!(season_multiplier(&config, "m", july), 60);
    }
}
