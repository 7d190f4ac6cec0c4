use crate::domain::models::PomodoroConfig;
use crate::infrastructure::api_client::PomodoroApi;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const WORK_MINUTES: RangeInclusive<u32> = 1..=120;
pub const SHORT_BREAK_MINUTES: RangeInclusive<u32> = 1..=60;
pub const LONG_BREAK_MINUTES: RangeInclusive<u32> = 1..=120;
pub const LONG_BREAK_INTERVAL: RangeInclusive<u32> = 1..=12;
pub const ALARM_VOLUME: RangeInclusive<u32> = 0..=100;

/// Fields a user changed in the configuration form. `None` keeps the server value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub work_duration: Option<u32>,
    pub short_break_duration: Option<u32>,
    pub long_break_duration: Option<u32>,
    pub long_break_interval: Option<u32>,
    pub alarm_sound: Option<String>,
    pub alarm_volume: Option<u32>,
    pub auto_start_breaks: Option<bool>,
    pub auto_start_pomodoros: Option<bool>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, mut config: PomodoroConfig) -> PomodoroConfig {
        if let Some(value) = self.work_duration {
            config.work_duration = value;
        }
        if let Some(value) = self.short_break_duration {
            config.short_break_duration = value;
        }
        if let Some(value) = self.long_break_duration {
            config.long_break_duration = value;
        }
        if let Some(value) = self.long_break_interval {
            config.long_break_interval = value;
        }
        if let Some(sound) = self
            .alarm_sound
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            config.alarm_sound = sound.to_string();
        }
        if let Some(value) = self.alarm_volume {
            config.alarm_volume = value;
        }
        if let Some(value) = self.auto_start_breaks {
            config.auto_start_breaks = value;
        }
        if let Some(value) = self.auto_start_pomodoros {
            config.auto_start_pomodoros = value;
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClampedField {
    pub field: &'static str,
    pub requested: u32,
    pub applied: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub config: PomodoroConfig,
    pub clamped: Vec<ClampedField>,
}

/// Pulls every numeric field into its allowed range and reports what moved.
pub fn clamp_config(mut config: PomodoroConfig) -> (PomodoroConfig, Vec<ClampedField>) {
    let mut clamped = Vec::new();
    let mut clamp = |field: &'static str, value: &mut u32, range: RangeInclusive<u32>| {
        let applied = (*value).clamp(*range.start(), *range.end());
        if applied != *value {
            clamped.push(ClampedField {
                field,
                requested: *value,
                applied,
            });
            *value = applied;
        }
    };

    clamp("workDuration", &mut config.work_duration, WORK_MINUTES);
    clamp(
        "shortBreakDuration",
        &mut config.short_break_duration,
        SHORT_BREAK_MINUTES,
    );
    clamp(
        "longBreakDuration",
        &mut config.long_break_duration,
        LONG_BREAK_MINUTES,
    );
    clamp(
        "longBreakInterval",
        &mut config.long_break_interval,
        LONG_BREAK_INTERVAL,
    );
    clamp("alarmVolume", &mut config.alarm_volume, ALARM_VOLUME);

    if config.alarm_sound.trim().is_empty() {
        config.alarm_sound = PomodoroConfig::default().alarm_sound;
    }
    (config, clamped)
}

/// Read-modify-write of the server configuration.
pub async fn save_config<A>(
    api: &A,
    access_token: &str,
    patch: &ConfigPatch,
) -> Result<ConfigUpdate, InfraError>
where
    A: PomodoroApi + ?Sized,
{
    let current = api.get_config(access_token).await?;
    let (candidate, clamped) = clamp_config(patch.apply(current));
    for adjustment in &clamped {
        log::warn!(
            "{} {} out of range, saving {}",
            adjustment.field,
            adjustment.requested,
            adjustment.applied
        );
    }
    let config = api.update_config(access_token, &candidate).await?;
    Ok(ConfigUpdate { config, clamped })
}
