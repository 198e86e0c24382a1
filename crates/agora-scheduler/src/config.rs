//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use agora_types::ScheduleSettings;

use crate::SchedulerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Timezone for jobs registered without one (IANA name).
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Grace period given to running jobs on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl From<&ScheduleSettings> for SchedulerConfig {
    fn from(settings: &ScheduleSettings) -> Self {
        Self {
            default_timezone: settings.timezone.clone(),
            shutdown_timeout_secs: settings.shutdown_timeout_secs,
        }
    }
}

impl SchedulerConfig {
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_schedule_settings() {
        let settings = ScheduleSettings {
            timezone: "Europe/Berlin".to_string(),
            shutdown_timeout_secs: 12,
            ..Default::default()
        };
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.default_timezone, "Europe/Berlin");
        assert_eq!(config.shutdown_timeout_secs, 12);
        assert_eq!(config.parse_timezone().unwrap().name(), "Europe/Berlin");
    }

    #[test]
    fn test_invalid_timezone() {
        let config = SchedulerConfig {
            default_timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.parse_timezone(),
            Err(SchedulerError::InvalidTimezone(tz)) if tz == "Mars/Olympus"
        ));
    }
}
