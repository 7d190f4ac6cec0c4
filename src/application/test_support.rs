//! In-process stand-in for the pomodoro API, shared by the service tests.

use crate::domain::models::{
    HistoryPage, PomodoroConfig, PomodoroSession, PomodoroTask, SessionAction, SessionStatus,
    SessionType,
};
use crate::infrastructure::api_client::PomodoroApi;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::{CreateSessionRequest, TaskUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid datetime")
        .with_timezone(&Utc)
}

pub fn session(id: &str, session_type: SessionType, status: SessionStatus) -> PomodoroSession {
    PomodoroSession {
        id: id.to_string(),
        session_type,
        status,
        start_time: Some(at("2026-03-02T09:00:00Z")),
        work_duration: 25,
        break_duration: 5,
        paused_at: None,
        total_paused_seconds: None,
        tasks: Vec::new(),
    }
}

#[derive(Debug, Default)]
struct FakeState {
    active: Option<PomodoroSession>,
    history: Vec<PomodoroSession>,
    tasks: HashMap<String, Vec<PomodoroTask>>,
    config: PomodoroConfig,
    actions: Vec<(String, SessionAction)>,
    failing_actions: HashSet<&'static str>,
    failing_task_lists: HashSet<String>,
    panicking_task_lists: HashSet<String>,
    failing_create: bool,
    saved_configs: Vec<PomodoroConfig>,
    created: Vec<CreateSessionRequest>,
    next_id: u32,
}

/// Applies actions the way the server does and records every call.
#[derive(Debug)]
pub struct FakePomodoroApi {
    state: Mutex<FakeState>,
    clock: Mutex<DateTime<Utc>>,
    starts_on_create: bool,
}

impl Default for FakePomodoroApi {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            clock: Mutex::new(at("2026-03-02T09:00:00Z")),
            starts_on_create: true,
        }
    }
}

impl FakePomodoroApi {
    pub fn with_active(session: PomodoroSession) -> Self {
        let api = Self::default();
        api.lock().active = Some(session);
        api
    }

    /// Created sessions stay without `startTime` until an explicit START.
    pub fn deferred_start() -> Self {
        Self {
            starts_on_create: false,
            ..Self::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake api mutex poisoned")
    }

    pub fn set_clock(&self, now: DateTime<Utc>) {
        *self.clock.lock().expect("clock mutex poisoned") = now;
    }

    fn now(&self) -> DateTime<Utc> {
        *self.clock.lock().expect("clock mutex poisoned")
    }

    pub fn fail_action(&self, action: SessionAction) {
        self.lock().failing_actions.insert(action.as_str());
    }

    pub fn fail_task_list(&self, session_id: &str) {
        self.lock().failing_task_lists.insert(session_id.to_string());
    }

    pub fn panic_task_list(&self, session_id: &str) {
        self.lock().panicking_task_lists.insert(session_id.to_string());
    }

    pub fn fail_create(&self) {
        self.lock().failing_create = true;
    }

    pub fn set_history(&self, history: Vec<PomodoroSession>) {
        self.lock().history = history;
    }

    pub fn set_tasks(&self, session_id: &str, tasks: Vec<PomodoroTask>) {
        self.lock().tasks.insert(session_id.to_string(), tasks);
    }

    pub fn set_config(&self, config: PomodoroConfig) {
        self.lock().config = config;
    }

    pub fn active(&self) -> Option<PomodoroSession> {
        self.lock().active.clone()
    }

    pub fn actions(&self) -> Vec<SessionAction> {
        self.lock().actions.iter().map(|(_, action)| *action).collect()
    }

    pub fn created(&self) -> Vec<CreateSessionRequest> {
        self.lock().created.clone()
    }

    pub fn saved_configs(&self) -> Vec<PomodoroConfig> {
        self.lock().saved_configs.clone()
    }
}

#[async_trait]
impl PomodoroApi for FakePomodoroApi {
    async fn get_active_session(
        &self,
        _access_token: &str,
    ) -> Result<Option<PomodoroSession>, InfraError> {
        Ok(self.lock().active.clone().filter(PomodoroSession::is_open))
    }

    async fn create_session(
        &self,
        _access_token: &str,
        request: &CreateSessionRequest,
    ) -> Result<PomodoroSession, InfraError> {
        let now = self.now();
        let mut state = self.lock();
        if state.failing_create {
            return Err(InfraError::Api {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        if state.active.as_ref().is_some_and(PomodoroSession::is_open) {
            return Err(InfraError::Api {
                status: 409,
                body: "session already open".to_string(),
            });
        }
        state.next_id += 1;
        let created = PomodoroSession {
            id: format!("fake-{}", state.next_id),
            session_type: request.session_type,
            status: SessionStatus::Active,
            start_time: self.starts_on_create.then_some(now),
            work_duration: request.work_duration,
            break_duration: request.break_duration,
            paused_at: None,
            total_paused_seconds: None,
            tasks: Vec::new(),
        };
        state.created.push(request.clone());
        state.active = Some(created.clone());
        Ok(created)
    }

    async fn update_session(
        &self,
        _access_token: &str,
        session_id: &str,
        action: SessionAction,
    ) -> Result<PomodoroSession, InfraError> {
        let now = self.now();
        let mut state = self.lock();
        state.actions.push((session_id.to_string(), action));
        if state.failing_actions.contains(action.as_str()) {
            return Err(InfraError::Api {
                status: 500,
                body: "boom".to_string(),
            });
        }
        let Some(session) = state.active.as_mut().filter(|session| session.id == session_id) else {
            return Err(InfraError::Api {
                status: 404,
                body: String::new(),
            });
        };
        match action {
            SessionAction::Start => {
                session.status = SessionStatus::Active;
                session.start_time = Some(now);
            }
            SessionAction::Pause => session.status = SessionStatus::Paused,
            SessionAction::Resume => session.status = SessionStatus::Active,
            SessionAction::Complete => session.status = SessionStatus::Completed,
            SessionAction::Cancel => session.status = SessionStatus::Cancelled,
        }
        Ok(session.clone())
    }

    async fn get_history(
        &self,
        _access_token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<HistoryPage, InfraError> {
        let state = self.lock();
        let items = state
            .history
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(HistoryPage {
            items,
            total: state.history.len() as u64,
            offset,
            limit,
        })
    }

    async fn get_config(&self, _access_token: &str) -> Result<PomodoroConfig, InfraError> {
        Ok(self.lock().config.clone())
    }

    async fn update_config(
        &self,
        _access_token: &str,
        config: &PomodoroConfig,
    ) -> Result<PomodoroConfig, InfraError> {
        let mut state = self.lock();
        state.saved_configs.push(config.clone());
        state.config = config.clone();
        Ok(config.clone())
    }

    async fn list_session_tasks(
        &self,
        _access_token: &str,
        session_id: &str,
    ) -> Result<Vec<PomodoroTask>, InfraError> {
        let state = self.lock();
        if state.panicking_task_lists.contains(session_id) {
            drop(state);
            panic!("task list for {session_id} blew up");
        }
        if state.failing_task_lists.contains(session_id) {
            return Err(InfraError::Http(format!("tasks for {session_id} unavailable")));
        }
        Ok(state.tasks.get(session_id).cloned().unwrap_or_default())
    }

    async fn create_task(
        &self,
        _access_token: &str,
        session_id: &str,
        description: &str,
    ) -> Result<PomodoroTask, InfraError> {
        let mut state = self.lock();
        state.next_id += 1;
        let task = PomodoroTask {
            id: format!("task-{}", state.next_id),
            description: description.to_string(),
            completed: false,
        };
        state
            .tasks
            .entry(session_id.to_string())
            .or_default()
            .push(task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        _access_token: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<PomodoroTask, InfraError> {
        let mut state = self.lock();
        let task = state
            .tasks
            .values_mut()
            .flatten()
            .find(|task| task.id == task_id)
            .ok_or(InfraError::Api {
                status: 404,
                body: String::new(),
            })?;
        if let Some(description) = &update.description {
            task.description = description.clone();
        }
        if let Some(completed) = update.completed {
            task.completed = completed;
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, _access_token: &str, task_id: &str) -> Result<(), InfraError> {
        let mut state = self.lock();
        for tasks in state.tasks.values_mut() {
            tasks.retain(|task| task.id != task_id);
        }
        Ok(())
    }
}
