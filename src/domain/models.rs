use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_MINUTE: i64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "WORK",
            Self::ShortBreak => "SHORT_BREAK",
            Self::LongBreak => "LONG_BREAK",
        }
    }

    pub fn is_break(self) -> bool {
        matches!(self, Self::ShortBreak | Self::LongBreak)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Intent sent to the server to move a session between statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionAction {
    Start,
    Pause,
    Resume,
    Complete,
    Cancel,
}

impl SessionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::Complete => "COMPLETE",
            Self::Cancel => "CANCEL",
        }
    }

    /// Whether the server accepts this action for a session currently in `status`.
    pub fn allowed_from(self, status: SessionStatus) -> bool {
        match self {
            Self::Start => false,
            Self::Pause => status == SessionStatus::Active,
            Self::Resume => status == SessionStatus::Paused,
            Self::Complete => status == SessionStatus::Active,
            Self::Cancel => !status.is_terminal(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroTask {
    pub id: String,
    pub description: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroSession {
    pub id: String,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub start_time: Option<DateTime<Utc>>,
    /// Minutes.
    pub work_duration: u32,
    /// Minutes.
    pub break_duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_paused_seconds: Option<i64>,
    #[serde(default)]
    pub tasks: Vec<PomodoroTask>,
}

impl PomodoroSession {
    pub fn total_duration_seconds(&self) -> i64 {
        let minutes = if self.session_type.is_break() {
            self.break_duration
        } else {
            self.work_duration
        };
        i64::from(minutes) * SECONDS_PER_MINUTE
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        if self.work_duration == 0 {
            return Err("session.workDuration must be > 0".to_string());
        }
        if self.break_duration == 0 {
            return Err("session.breakDuration must be > 0".to_string());
        }
        if let (Some(start), Some(paused_at)) = (self.start_time, self.paused_at) {
            if paused_at < start {
                return Err("session.pausedAt must not precede startTime".to_string());
            }
        }
        if self.total_paused_seconds.is_some_and(|value| value < 0) {
            return Err("session.totalPausedSeconds must be >= 0".to_string());
        }
        for task in &self.tasks {
            validate_non_empty(&task.id, "task.id")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroConfig {
    pub work_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    pub long_break_interval: u32,
    pub alarm_sound: String,
    pub alarm_volume: u32,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
}

impl Default for PomodoroConfig {
    fn default() -> Self {
        Self {
            work_duration: 25,
            short_break_duration: 5,
            long_break_duration: 15,
            long_break_interval: 4,
            alarm_sound: "bell".to_string(),
            alarm_volume: 80,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
        }
    }
}

impl PomodoroConfig {
    pub fn break_duration_for(&self, session_type: SessionType) -> u32 {
        match session_type {
            SessionType::LongBreak => self.long_break_duration,
            SessionType::Work | SessionType::ShortBreak => self.short_break_duration,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub items: Vec<PomodoroSession>,
    pub total: u64,
    pub offset: u32,
    pub limit: u32,
}

impl HistoryPage {
    pub fn has_more(&self) -> bool {
        u64::from(self.offset) + (self.items.len() as u64) < self.total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }
}

pub fn parse_session_type(value: &str) -> Result<SessionType, String> {
    match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
        "WORK" | "FOCUS" => Ok(SessionType::Work),
        "SHORT_BREAK" | "BREAK" => Ok(SessionType::ShortBreak),
        "LONG_BREAK" => Ok(SessionType::LongBreak),
        other => Err(format!("unsupported session type: {other}")),
    }
}

pub fn parse_session_status(value: &str) -> Result<SessionStatus, String> {
    match value.trim().to_ascii_uppercase().as_str() {
        "ACTIVE" => Ok(SessionStatus::Active),
        "PAUSED" => Ok(SessionStatus::Paused),
        "COMPLETED" => Ok(SessionStatus::Completed),
        "CANCELLED" | "CANCELED" => Ok(SessionStatus::Cancelled),
        other => Err(format!("unsupported session status: {other}")),
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
