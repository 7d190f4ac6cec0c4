//! Wire payloads of the pomodoro API and their conversion into domain types.
//!
//! Responses are first deserialized into permissive payload structs, then
//! converted with `TryFrom`; anything that does not describe a valid domain
//! value is rejected here, at the network boundary.

use crate::domain::models::{
    parse_session_status, parse_session_type, HistoryPage, PomodoroConfig, PomodoroSession,
    PomodoroTask, SessionAction, SessionType,
};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Some deployments wrap every body in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub id: Option<serde_json::Value>,
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub id: Option<serde_json::Value>,
    pub session_type: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<String>,
    pub work_duration: Option<i64>,
    pub break_duration: Option<i64>,
    pub paused_at: Option<String>,
    pub total_paused_seconds: Option<i64>,
    #[serde(default)]
    pub tasks: Option<Vec<TaskPayload>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPayload {
    #[serde(alias = "sessions", alias = "content")]
    pub items: Option<Vec<SessionPayload>>,
    #[serde(alias = "totalElements", alias = "count")]
    pub total: Option<u64>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPayload {
    pub work_duration: Option<i64>,
    pub short_break_duration: Option<i64>,
    pub long_break_duration: Option<i64>,
    pub long_break_interval: Option<i64>,
    pub alarm_sound: Option<String>,
    pub alarm_volume: Option<i64>,
    pub auto_start_breaks: Option<bool>,
    pub auto_start_pomodoros: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub session_type: SessionType,
    pub work_duration: u32,
    pub break_duration: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub action: SessionAction,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest<'a> {
    pub description: &'a str,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TryFrom<TaskPayload> for PomodoroTask {
    type Error = InfraError;

    fn try_from(payload: TaskPayload) -> Result<Self, Self::Error> {
        Ok(PomodoroTask {
            id: required_id(payload.id, "task.id")?,
            description: payload.description.unwrap_or_default().trim().to_string(),
            completed: payload.completed,
        })
    }
}

impl TryFrom<SessionPayload> for PomodoroSession {
    type Error = InfraError;

    fn try_from(payload: SessionPayload) -> Result<Self, Self::Error> {
        let id = required_id(payload.id, "session.id")?;
        let session_type = payload
            .session_type
            .as_deref()
            .ok_or_else(|| invalid("session.sessionType is missing"))
            .and_then(|raw| parse_session_type(raw).map_err(InfraError::InvalidPayload))?;
        let status = payload
            .status
            .as_deref()
            .ok_or_else(|| invalid("session.status is missing"))
            .and_then(|raw| parse_session_status(raw).map_err(InfraError::InvalidPayload))?;

        let session = PomodoroSession {
            id,
            session_type,
            status,
            start_time: optional_timestamp(payload.start_time.as_deref(), "session.startTime")?,
            work_duration: positive_minutes(payload.work_duration, "session.workDuration")?,
            break_duration: positive_minutes(payload.break_duration, "session.breakDuration")?,
            paused_at: optional_timestamp(payload.paused_at.as_deref(), "session.pausedAt")?,
            total_paused_seconds: payload.total_paused_seconds,
            tasks: payload
                .tasks
                .unwrap_or_default()
                .into_iter()
                .map(PomodoroTask::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        };
        session.validate().map_err(InfraError::InvalidPayload)?;
        Ok(session)
    }
}

impl HistoryPayload {
    pub fn into_page(self, requested_offset: u32, requested_limit: u32) -> Result<HistoryPage, InfraError> {
        let items = self
            .items
            .unwrap_or_default()
            .into_iter()
            .map(PomodoroSession::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let offset = self.offset.unwrap_or(requested_offset);
        let total = self
            .total
            .unwrap_or(u64::from(offset) + items.len() as u64);
        Ok(HistoryPage {
            items,
            total,
            offset,
            limit: self.limit.unwrap_or(requested_limit),
        })
    }
}

impl TryFrom<ConfigPayload> for PomodoroConfig {
    type Error = InfraError;

    fn try_from(payload: ConfigPayload) -> Result<Self, Self::Error> {
        let defaults = PomodoroConfig::default();
        let minutes = |value: Option<i64>, fallback: u32, field: &str| match value {
            Some(value) => positive_minutes(Some(value), field),
            None => Ok(fallback),
        };
        Ok(PomodoroConfig {
            work_duration: minutes(payload.work_duration, defaults.work_duration, "config.workDuration")?,
            short_break_duration: minutes(
                payload.short_break_duration,
                defaults.short_break_duration,
                "config.shortBreakDuration",
            )?,
            long_break_duration: minutes(
                payload.long_break_duration,
                defaults.long_break_duration,
                "config.longBreakDuration",
            )?,
            long_break_interval: minutes(
                payload.long_break_interval,
                defaults.long_break_interval,
                "config.longBreakInterval",
            )?,
            alarm_sound: payload
                .alarm_sound
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.alarm_sound),
            alarm_volume: match payload.alarm_volume {
                Some(value) if (0..=100).contains(&value) => value as u32,
                Some(value) => return Err(invalid(&format!("config.alarmVolume out of range: {value}"))),
                None => defaults.alarm_volume,
            },
            auto_start_breaks: payload.auto_start_breaks.unwrap_or(defaults.auto_start_breaks),
            auto_start_pomodoros: payload
                .auto_start_pomodoros
                .unwrap_or(defaults.auto_start_pomodoros),
        })
    }
}

fn invalid(message: &str) -> InfraError {
    InfraError::InvalidPayload(message.to_string())
}

fn required_id(value: Option<serde_json::Value>, field: &str) -> Result<String, InfraError> {
    let id = match value {
        Some(serde_json::Value::String(raw)) => raw.trim().to_string(),
        Some(serde_json::Value::Number(raw)) => raw.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err(invalid(&format!("{field} is missing")));
    }
    Ok(id)
}

fn positive_minutes(value: Option<i64>, field: &str) -> Result<u32, InfraError> {
    match value {
        Some(minutes) if minutes > 0 && minutes <= i64::from(u32::MAX) => Ok(minutes as u32),
        Some(minutes) => Err(invalid(&format!("{field} must be positive, got {minutes}"))),
        None => Err(invalid(&format!("{field} is missing"))),
    }
}

fn optional_timestamp(value: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>, InfraError> {
    let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| Some(parsed.with_timezone(&Utc)))
        .map_err(|error| invalid(&format!("{field} must be RFC3339: {error}")))
}
