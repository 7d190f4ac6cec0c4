//! Countdown reconciliation.
//!
//! The displayed time left is always derived from the server's `startTime`
//! and the wall clock, never from a locally accumulated counter, so a
//! suspended process picks up the correct value on its next tick.

use crate::domain::models::{PomodoroSession, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pause intervals observed by this client for one session.
///
/// Used only when the server does not report paused time itself. The ledger
/// is bound to the `startTime` it was recorded against: if the server later
/// reports a different `startTime` it has shifted the start on resume, and
/// the ledger no longer applies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PauseLedger {
    pub session_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub accumulated_seconds: i64,
}

impl PauseLedger {
    pub fn new(session: &PomodoroSession) -> Self {
        Self {
            session_id: session.id.clone(),
            start_time: session.start_time,
            paused_at: None,
            accumulated_seconds: 0,
        }
    }

    pub fn record_pause(&mut self, now: DateTime<Utc>) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn record_resume(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_at.take() {
            let paused = (now - paused_at).num_seconds().max(0);
            self.accumulated_seconds = self.accumulated_seconds.saturating_add(paused);
        }
    }

    pub fn applies_to(&self, session: &PomodoroSession) -> bool {
        self.session_id == session.id && self.start_time == session.start_time
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CountdownSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub total_seconds: i64,
    pub time_left_seconds: i64,
    pub running: bool,
}

impl CountdownSnapshot {
    /// An active session whose countdown reached zero and still awaits COMPLETE.
    pub fn is_expired(&self) -> bool {
        self.status == SessionStatus::Active && self.time_left_seconds == 0
    }

    pub fn formatted(&self) -> String {
        format_clock(self.time_left_seconds)
    }
}

pub fn reconcile(
    session: &PomodoroSession,
    ledger: Option<&PauseLedger>,
    now: DateTime<Utc>,
) -> CountdownSnapshot {
    let total = session.total_duration_seconds();
    let snapshot = |time_left_seconds: i64, running: bool| CountdownSnapshot {
        session_id: session.id.clone(),
        status: session.status,
        total_seconds: total,
        time_left_seconds,
        running,
    };

    if session.status.is_terminal() {
        return snapshot(0, false);
    }
    let Some(start_time) = session.start_time else {
        return snapshot(total, false);
    };

    let ledger = ledger.filter(|ledger| ledger.applies_to(session));
    let reference = if session.status == SessionStatus::Paused {
        match session
            .paused_at
            .or_else(|| ledger.and_then(|ledger| ledger.paused_at))
        {
            Some(paused_at) => paused_at,
            None => return snapshot(total, false),
        }
    } else {
        now
    };

    let paused_seconds = match session.total_paused_seconds {
        Some(seconds) => seconds.max(0),
        None => ledger.map(|ledger| ledger.accumulated_seconds).unwrap_or(0),
    };
    let elapsed = ((reference - start_time).num_seconds() - paused_seconds).max(0);
    let time_left = (total - elapsed).clamp(0, total);

    snapshot(
        time_left,
        session.status == SessionStatus::Active && time_left > 0,
    )
}

pub fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
