use crate::domain::countdown::{reconcile, CountdownSnapshot, PauseLedger};
use crate::domain::models::{
    PomodoroConfig, PomodoroSession, SessionAction, SessionStatus, SessionType,
};
use crate::infrastructure::alarm::AlarmPlayer;
use crate::infrastructure::api_client::PomodoroApi;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::CreateSessionRequest;
use crate::infrastructure::session_cache::CachedSession;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type CompletionCallback = Arc<dyn Fn(&PomodoroSession) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Running(CountdownSnapshot),
    Paused(CountdownSnapshot),
    /// Reached zero but the server refused COMPLETE; waits for an explicit skip or reload.
    Expired(CountdownSnapshot),
    Completed(PomodoroSession),
}

#[derive(Debug, Default)]
struct TimerState {
    session: Option<PomodoroSession>,
    ledger: Option<PauseLedger>,
    failed_completion: Option<String>,
}

impl TimerState {
    fn snapshot(&self, now: DateTime<Utc>) -> Option<CountdownSnapshot> {
        self.session
            .as_ref()
            .map(|session| reconcile(session, self.ledger.as_ref(), now))
    }

    fn adopt(&mut self, session: Option<PomodoroSession>) {
        let keeps_ledger = match (&self.ledger, &session) {
            (Some(ledger), Some(session)) => ledger.session_id == session.id,
            _ => false,
        };
        if !keeps_ledger {
            self.ledger = None;
        }
        if self.failed_completion.as_deref() != session.as_ref().map(|session| session.id.as_str()) {
            self.failed_completion = None;
        }
        self.session = session.filter(PomodoroSession::is_open);
    }
}

/// Client-side view of the single open session.
///
/// Every transition is sent to the server first and the local state is
/// replaced with what the server reports back. The countdown itself is
/// recomputed from `startTime` on each call.
pub struct PomodoroTimer<A, L>
where
    A: PomodoroApi + ?Sized,
    L: AlarmPlayer + ?Sized,
{
    api: Arc<A>,
    alarm: Arc<L>,
    access_token: String,
    alarm_sound: String,
    alarm_volume: u32,
    on_complete: Option<CompletionCallback>,
    state: Mutex<TimerState>,
}

impl<A, L> PomodoroTimer<A, L>
where
    A: PomodoroApi + ?Sized,
    L: AlarmPlayer + ?Sized,
{
    pub fn new(api: Arc<A>, alarm: Arc<L>, access_token: impl Into<String>) -> Self {
        let defaults = PomodoroConfig::default();
        Self {
            api,
            alarm,
            access_token: access_token.into(),
            alarm_sound: defaults.alarm_sound,
            alarm_volume: defaults.alarm_volume,
            on_complete: None,
            state: Mutex::new(TimerState::default()),
        }
    }

    pub fn with_alarm(mut self, sound: impl Into<String>, volume: u32) -> Self {
        self.alarm_sound = sound.into();
        self.alarm_volume = volume.min(100);
        self
    }

    pub fn with_on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    /// Seeds local state from a cached copy. The next `load` replaces the session
    /// but keeps the pause ledger when it still belongs to it.
    pub async fn restore(&self, cached: CachedSession) {
        let mut state = self.state.lock().await;
        state.ledger = cached.ledger;
        state.adopt(Some(cached.session));
    }

    pub async fn load(&self, now: DateTime<Utc>) -> Result<Option<CountdownSnapshot>, InfraError> {
        let active = self.api.get_active_session(&self.access_token).await?;
        let mut state = self.state.lock().await;
        state.adopt(active);
        Ok(state.snapshot(now))
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> Option<CountdownSnapshot> {
        self.state.lock().await.snapshot(now)
    }

    pub async fn session(&self) -> Option<PomodoroSession> {
        self.state.lock().await.session.clone()
    }

    /// Current session plus ledger in the shape the session cache stores.
    pub async fn cached(&self, now: DateTime<Utc>) -> Option<CachedSession> {
        let state = self.state.lock().await;
        state.session.clone().map(|session| CachedSession {
            session,
            ledger: state.ledger.clone(),
            reconciled_at: now,
        })
    }

    pub async fn start(
        &self,
        session_type: SessionType,
        work_duration: u32,
        break_duration: u32,
        now: DateTime<Utc>,
    ) -> Result<CountdownSnapshot, InfraError> {
        if work_duration == 0 || break_duration == 0 {
            return Err(InfraError::InvalidConfig(
                "session durations must be > 0".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let active = self.api.get_active_session(&self.access_token).await?;
        if let Some(open) = active {
            let message = format!(
                "session {} is already {}",
                open.id,
                open.status.as_str().to_ascii_lowercase()
            );
            state.adopt(Some(open));
            return Err(InfraError::InvalidTransition(message));
        }

        let request = CreateSessionRequest {
            session_type,
            work_duration,
            break_duration,
        };
        let mut created = self.api.create_session(&self.access_token, &request).await?;
        if created.start_time.is_none() {
            created = self
                .api
                .update_session(&self.access_token, &created.id, SessionAction::Start)
                .await?;
        }

        let refreshed = self.api.get_active_session(&self.access_token).await?;
        state.ledger = None;
        state.adopt(Some(refreshed.unwrap_or(created)));
        log::info!("started {} session", session_type.as_str());
        state.snapshot(now).ok_or_else(|| {
            InfraError::InvalidPayload("server did not report the started session as open".to_string())
        })
    }

    pub async fn pause(&self, now: DateTime<Utc>) -> Result<CountdownSnapshot, InfraError> {
        let mut state = self.state.lock().await;
        let session = Self::require_transition(&state, SessionAction::Pause)?;
        let updated = self
            .api
            .update_session(&self.access_token, &session.id, SessionAction::Pause)
            .await?;

        let mut ledger = state
            .ledger
            .take()
            .filter(|ledger| ledger.applies_to(&session))
            .unwrap_or_else(|| PauseLedger::new(&session));
        ledger.record_pause(now);
        let ledger = Self::rebind_ledger(ledger, &updated);
        state.ledger = Some(ledger);
        self.reconcile_after(&mut state, updated).await;
        Self::snapshot_or_closed(&state, now)
    }

    pub async fn resume(&self, now: DateTime<Utc>) -> Result<CountdownSnapshot, InfraError> {
        let mut state = self.state.lock().await;
        let session = Self::require_transition(&state, SessionAction::Resume)?;
        let updated = self
            .api
            .update_session(&self.access_token, &session.id, SessionAction::Resume)
            .await?;

        if let Some(mut ledger) = state.ledger.take().filter(|ledger| ledger.applies_to(&session)) {
            ledger.record_resume(now);
            state.ledger = Some(Self::rebind_ledger(ledger, &updated));
        }
        self.reconcile_after(&mut state, updated).await;
        Self::snapshot_or_closed(&state, now)
    }

    /// Cancels the open session. The countdown stops and no completion fires.
    pub async fn stop(&self) -> Result<PomodoroSession, InfraError> {
        let mut state = self.state.lock().await;
        let session = Self::require_transition(&state, SessionAction::Cancel)?;
        let cancelled = self
            .api
            .update_session(&self.access_token, &session.id, SessionAction::Cancel)
            .await?;
        state.ledger = None;
        state.adopt(None);
        log::info!("cancelled session {}", cancelled.id);
        Ok(cancelled)
    }

    /// Ends the running session early through the same path as natural expiry.
    pub async fn skip(&self) -> Result<PomodoroSession, InfraError> {
        let mut state = self.state.lock().await;
        let session = Self::require_transition(&state, SessionAction::Complete)?;
        self.complete(&mut state, session).await
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickOutcome, InfraError> {
        let mut state = self.state.lock().await;
        let Some(snapshot) = state.snapshot(now) else {
            return Ok(TickOutcome::Idle);
        };
        if snapshot.status == SessionStatus::Paused {
            return Ok(TickOutcome::Paused(snapshot));
        }
        if !snapshot.is_expired() {
            return Ok(TickOutcome::Running(snapshot));
        }
        if state.failed_completion.as_deref() == Some(snapshot.session_id.as_str()) {
            return Ok(TickOutcome::Expired(snapshot));
        }

        let Some(session) = state.session.clone() else {
            return Ok(TickOutcome::Idle);
        };
        self.complete(&mut state, session)
            .await
            .map(TickOutcome::Completed)
    }

    async fn complete(
        &self,
        state: &mut TimerState,
        session: PomodoroSession,
    ) -> Result<PomodoroSession, InfraError> {
        if let Err(error) = self.alarm.play(&self.alarm_sound, self.alarm_volume) {
            log::warn!("alarm for session {} failed: {error}", session.id);
        }

        let completed = match self
            .api
            .update_session(&self.access_token, &session.id, SessionAction::Complete)
            .await
        {
            Ok(completed) => completed,
            Err(error) => {
                state.failed_completion = Some(session.id.clone());
                return Err(error);
            }
        };

        state.ledger = None;
        state.adopt(None);
        log::info!(
            "completed {} session {}",
            completed.session_type.as_str(),
            completed.id
        );
        if let Some(callback) = &self.on_complete {
            callback(&completed);
        }
        Ok(completed)
    }

    async fn reconcile_after(&self, state: &mut TimerState, updated: PomodoroSession) {
        match self.api.get_active_session(&self.access_token).await {
            Ok(refreshed) => state.adopt(refreshed),
            Err(error) => {
                log::warn!("refetching session {} failed: {error}", updated.id);
                state.adopt(Some(updated));
            }
        }
    }

    fn require_transition(
        state: &TimerState,
        action: SessionAction,
    ) -> Result<PomodoroSession, InfraError> {
        let session = state.session.clone().ok_or_else(|| {
            InfraError::InvalidTransition(format!(
                "cannot {} without an open session",
                action.as_str().to_ascii_lowercase()
            ))
        })?;
        if !action.allowed_from(session.status) {
            return Err(InfraError::InvalidTransition(format!(
                "cannot {} a {} session",
                action.as_str().to_ascii_lowercase(),
                session.status.as_str().to_ascii_lowercase()
            )));
        }
        Ok(session)
    }

    fn rebind_ledger(mut ledger: PauseLedger, updated: &PomodoroSession) -> PauseLedger {
        if ledger.session_id == updated.id && ledger.start_time.is_none() {
            ledger.start_time = updated.start_time;
        }
        ledger
    }

    fn snapshot_or_closed(
        state: &TimerState,
        now: DateTime<Utc>,
    ) -> Result<CountdownSnapshot, InfraError> {
        state.snapshot(now).ok_or_else(|| {
            InfraError::InvalidTransition("session was closed by the server".to_string())
        })
    }
}

/// Session type to auto-start after `completed`, honoring the config's
/// auto-start flags. `completed_work_sessions` counts WORK sessions finished
/// in the current cycle, including `completed` itself.
pub fn next_auto_start(
    completed: &PomodoroSession,
    config: &PomodoroConfig,
    completed_work_sessions: u32,
) -> Option<SessionType> {
    if completed.status != SessionStatus::Completed {
        return None;
    }
    match completed.session_type {
        SessionType::Work if config.auto_start_breaks => {
            let interval = config.long_break_interval.max(1);
            if completed_work_sessions > 0 && completed_work_sessions % interval == 0 {
                Some(SessionType::LongBreak)
            } else {
                Some(SessionType::ShortBreak)
            }
        }
        SessionType::ShortBreak | SessionType::LongBreak if config.auto_start_pomodoros => {
            Some(SessionType::Work)
        }
        _ => None,
    }
}
