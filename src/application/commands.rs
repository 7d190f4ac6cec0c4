use crate::application::auth::TokenManager;
use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::config_form::{save_config, ConfigPatch, ConfigUpdate};
use crate::application::history::{load_history, normalize_limit, HistoryView};
use crate::application::ticker::{CountdownTicker, TickListener};
use crate::application::timer::{next_auto_start, CompletionCallback, PomodoroTimer, TickOutcome};
use crate::domain::countdown::CountdownSnapshot;
use crate::domain::models::{
    parse_session_type, PomodoroConfig, PomodoroSession, PomodoroTask, SessionType,
};
use crate::infrastructure::alarm::{default_alarm, AlarmPlayer};
use crate::infrastructure::api_client::{PomodoroApi, ReqwestPomodoroApi};
use crate::infrastructure::auth_client::{AuthHttpClient, ReqwestAuthClient};
use crate::infrastructure::config::{save_api_base_url, ClientSettings};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::TaskUpdate;
use crate::infrastructure::session_cache::{SessionCacheRepository, SqliteSessionCache};
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Timer = PomodoroTimer<dyn PomodoroApi, dyn AlarmPlayer>;

/// Services the commands talk to. Production wiring lives in [`Collaborators::production`].
pub struct Collaborators {
    pub api: Arc<dyn PomodoroApi>,
    pub auth_client: Arc<dyn AuthHttpClient>,
    pub credential_store: Arc<dyn CredentialStore>,
    pub session_cache: Arc<dyn SessionCacheRepository>,
    pub alarm: Arc<dyn AlarmPlayer>,
}

impl Collaborators {
    pub fn production(bootstrap: &BootstrapResult) -> Self {
        let settings = &bootstrap.settings;
        Self {
            api: Arc::new(ReqwestPomodoroApi::new(settings.api_base_url.clone())),
            auth_client: Arc::new(ReqwestAuthClient::new(settings.api_base_url.clone())),
            credential_store: Arc::new(KeyringCredentialStore::for_account(settings.account.clone())),
            session_cache: Arc::new(SqliteSessionCache::new(&bootstrap.database_path)),
            alarm: Arc::from(default_alarm(
                settings.alarm_enabled,
                settings.alarm_sound_dir.clone(),
            )),
        }
    }
}

pub struct AppState {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    settings: ClientSettings,
    api: Arc<dyn PomodoroApi>,
    auth_client: Arc<dyn AuthHttpClient>,
    credential_store: Arc<dyn CredentialStore>,
    session_cache: Arc<dyn SessionCacheRepository>,
    alarm: Arc<dyn AlarmPlayer>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let collaborators = Collaborators::production(&bootstrap);
        Ok(Self::from_parts(bootstrap, collaborators))
    }

    pub fn from_parts(bootstrap: BootstrapResult, collaborators: Collaborators) -> Self {
        Self {
            config_dir: bootstrap.config_dir,
            logs_dir: bootstrap.logs_dir,
            settings: bootstrap.settings,
            api: collaborators.api,
            auth_client: collaborators.auth_client,
            credential_store: collaborators.credential_store,
            session_cache: collaborators.session_cache,
            alarm: collaborators.alarm,
            log_guard: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn token_manager(&self) -> TokenManager<dyn CredentialStore, dyn AuthHttpClient> {
        TokenManager::new(
            Arc::clone(&self.credential_store),
            Arc::clone(&self.auth_client),
        )
    }

    async fn access_token(&self) -> Result<String, InfraError> {
        self.token_manager().access_token().await
    }

    /// Builds a timer seeded from the session cache and reconciled with the server.
    async fn loaded_timer(
        &self,
        access_token: String,
        config: Option<&PomodoroConfig>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<Timer, InfraError> {
        let mut timer = PomodoroTimer::new(
            Arc::clone(&self.api),
            Arc::clone(&self.alarm),
            access_token,
        );
        if let Some(config) = config {
            timer = timer.with_alarm(config.alarm_sound.clone(), config.alarm_volume);
        }
        if let Some(callback) = on_complete {
            timer = timer.with_on_complete(callback);
        }

        match self.session_cache.load() {
            Ok(Some(cached)) => timer.restore(cached).await,
            Ok(None) => {}
            Err(error) => log::warn!("ignoring unreadable session cache: {error}"),
        }
        timer.load(Utc::now()).await?;
        Ok(timer)
    }

    async fn persist_session(&self, timer: &Timer) {
        let result = match timer.cached(Utc::now()).await {
            Some(cached) => self.session_cache.save(&cached),
            None => self.session_cache.clear(),
        };
        if let Err(error) = result {
            log::warn!("failed to update session cache: {error}");
        }
    }

    /// Server config for alarm settings; defaults when it cannot be read.
    async fn config_or_default(&self, access_token: &str) -> PomodoroConfig {
        match self.api.get_config(access_token).await {
            Ok(config) => config,
            Err(error) => {
                log::warn!("using default pomodoro config: {error}");
                PomodoroConfig::default()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub status: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub state: String,
    pub session: Option<PomodoroSession>,
    pub countdown: Option<CountdownSnapshot>,
    pub time_left: Option<String>,
}

impl StatusResponse {
    fn from_parts(session: Option<PomodoroSession>, countdown: Option<CountdownSnapshot>) -> Self {
        let state = match (&session, &countdown) {
            (Some(_), Some(snapshot)) if snapshot.is_expired() => "expired".to_string(),
            (Some(session), _) => session.status.as_str().to_ascii_lowercase(),
            (None, _) => "idle".to_string(),
        };
        let time_left = countdown.as_ref().map(CountdownSnapshot::formatted);
        Self {
            state,
            session,
            countdown,
            time_left,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchResponse {
    pub completed: Vec<PomodoroSession>,
    pub auto_started: Vec<String>,
    pub stopped_by: String,
}

pub struct WatchHooks {
    pub period: Duration,
    pub on_tick: TickListener,
    pub on_complete: Option<CompletionCallback>,
}

pub async fn login_impl(
    state: &AppState,
    email: Option<String>,
    password: String,
) -> Result<LoginResponse, InfraError> {
    let email = email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| {
            Some(state.settings.account.clone()).filter(|account| account.contains('@'))
        })
        .ok_or_else(|| {
            InfraError::InvalidConfig(
                "email is required (pass --email or set POMOTRACK_EMAIL)".to_string(),
            )
        })?;

    let tokens = state.token_manager().login(&email, &password).await?;
    state.log_info("login", &format!("authenticated {email}"));
    Ok(LoginResponse {
        status: "authenticated".to_string(),
        expires_at: tokens.expires_at.to_rfc3339(),
    })
}

pub fn logout_impl(state: &AppState) -> Result<bool, InfraError> {
    state.token_manager().logout()?;
    state.session_cache.clear()?;
    state.log_info("logout", "removed stored tokens");
    Ok(true)
}

pub async fn status_impl(state: &AppState) -> Result<StatusResponse, InfraError> {
    let access_token = state.access_token().await?;
    let timer = state.loaded_timer(access_token, None, None).await?;
    state.persist_session(&timer).await;
    let response = StatusResponse::from_parts(timer.session().await, timer.snapshot(Utc::now()).await);
    state.log_info("status", &format!("state={}", response.state));
    Ok(response)
}

pub async fn start_impl(
    state: &AppState,
    session_type: String,
    work_duration: Option<u32>,
    break_duration: Option<u32>,
) -> Result<StatusResponse, InfraError> {
    let session_type = parse_session_type(&session_type).map_err(InfraError::InvalidConfig)?;
    let access_token = state.access_token().await?;
    let config = if work_duration.is_some() && break_duration.is_some() {
        PomodoroConfig::default()
    } else {
        state.config_or_default(&access_token).await
    };
    let work_duration = work_duration.unwrap_or(config.work_duration);
    let break_duration = break_duration.unwrap_or_else(|| config.break_duration_for(session_type));

    let timer = state.loaded_timer(access_token, None, None).await?;
    let result = timer
        .start(session_type, work_duration, break_duration, Utc::now())
        .await;
    state.persist_session(&timer).await;
    let snapshot = result?;

    state.log_info(
        "start",
        &format!(
            "started {} session_id={}",
            session_type.as_str(),
            snapshot.session_id
        ),
    );
    Ok(StatusResponse::from_parts(timer.session().await, Some(snapshot)))
}

pub async fn pause_impl(state: &AppState) -> Result<StatusResponse, InfraError> {
    let access_token = state.access_token().await?;
    let timer = state.loaded_timer(access_token, None, None).await?;
    let result = timer.pause(Utc::now()).await;
    state.persist_session(&timer).await;
    let snapshot = result?;

    state.log_info("pause", &format!("paused session_id={}", snapshot.session_id));
    Ok(StatusResponse::from_parts(timer.session().await, Some(snapshot)))
}

pub async fn resume_impl(state: &AppState) -> Result<StatusResponse, InfraError> {
    let access_token = state.access_token().await?;
    let timer = state.loaded_timer(access_token, None, None).await?;
    let result = timer.resume(Utc::now()).await;
    state.persist_session(&timer).await;
    let snapshot = result?;

    state.log_info("resume", &format!("resumed session_id={}", snapshot.session_id));
    Ok(StatusResponse::from_parts(timer.session().await, Some(snapshot)))
}

pub async fn stop_impl(state: &AppState) -> Result<PomodoroSession, InfraError> {
    let access_token = state.access_token().await?;
    let timer = state.loaded_timer(access_token, None, None).await?;
    let result = timer.stop().await;
    state.persist_session(&timer).await;
    let cancelled = result?;

    state.log_info("stop", &format!("cancelled session_id={}", cancelled.id));
    Ok(cancelled)
}

pub async fn skip_impl(state: &AppState) -> Result<PomodoroSession, InfraError> {
    let access_token = state.access_token().await?;
    let config = state.config_or_default(&access_token).await;
    let timer = state.loaded_timer(access_token, Some(&config), None).await?;
    let result = timer.skip().await;
    state.persist_session(&timer).await;
    let completed = result?;

    state.log_info("skip", &format!("completed session_id={}", completed.id));
    Ok(completed)
}

/// Follows the open session until it completes, then chains auto-started
/// sessions per the server config. Returns early when `shutdown` resolves.
pub async fn watch_impl<F>(
    state: &AppState,
    hooks: WatchHooks,
    shutdown: F,
) -> Result<WatchResponse, InfraError>
where
    F: Future<Output = ()>,
{
    let access_token = state.access_token().await?;
    let config = state.config_or_default(&access_token).await;
    let timer = Arc::new(
        state
            .loaded_timer(access_token, Some(&config), hooks.on_complete.clone())
            .await?,
    );
    tokio::pin!(shutdown);

    let mut completed = Vec::new();
    let mut auto_started = Vec::new();
    let mut completed_work_sessions = 0_u32;

    let stopped_by = loop {
        let mut ticker =
            CountdownTicker::spawn(Arc::clone(&timer), hooks.period, Arc::clone(&hooks.on_tick));
        let joined = tokio::select! {
            outcome = ticker.join() => Some(outcome),
            _ = &mut shutdown => None,
        };
        let Some(outcome) = joined else {
            ticker.stop();
            break "interrupted".to_string();
        };

        let finished = match outcome {
            Some(TickOutcome::Completed(session)) => session,
            Some(TickOutcome::Expired(_)) => break "expired".to_string(),
            Some(TickOutcome::Idle) => break "idle".to_string(),
            Some(TickOutcome::Running(_)) | Some(TickOutcome::Paused(_)) | None => {
                break "aborted".to_string();
            }
        };
        state.persist_session(&timer).await;
        state.log_info(
            "watch",
            &format!(
                "completed {} session_id={}",
                finished.session_type.as_str(),
                finished.id
            ),
        );
        if finished.session_type == SessionType::Work {
            completed_work_sessions += 1;
        }
        let next = next_auto_start(&finished, &config, completed_work_sessions);
        completed.push(finished);

        let Some(next) = next else {
            break "completed".to_string();
        };
        let started = timer
            .start(
                next,
                config.work_duration,
                config.break_duration_for(next),
                Utc::now(),
            )
            .await;
        let snapshot = match started {
            Ok(snapshot) => snapshot,
            Err(error) => {
                state.log_error(
                    "watch",
                    &format!("auto-start of {} failed: {error}", next.as_str()),
                );
                break format!("auto-start failed: {error}");
            }
        };
        state.persist_session(&timer).await;
        state.log_info(
            "watch",
            &format!(
                "auto-started {} session_id={}",
                next.as_str(),
                snapshot.session_id
            ),
        );
        auto_started.push(snapshot.session_id);
    };

    state.persist_session(&timer).await;
    Ok(WatchResponse {
        completed,
        auto_started,
        stopped_by,
    })
}

pub async fn get_config_impl(state: &AppState) -> Result<PomodoroConfig, InfraError> {
    let access_token = state.access_token().await?;
    let config = state.api.get_config(&access_token).await?;
    state.log_info("get_config", "loaded pomodoro config");
    Ok(config)
}

pub async fn update_config_impl(
    state: &AppState,
    patch: ConfigPatch,
) -> Result<ConfigUpdate, InfraError> {
    if patch.is_empty() {
        return Err(InfraError::InvalidConfig(
            "no configuration fields to update".to_string(),
        ));
    }
    let access_token = state.access_token().await?;
    let update = save_config(state.api.as_ref(), &access_token, &patch).await?;
    state.log_info(
        "update_config",
        &format!("saved pomodoro config clamped_fields={}", update.clamped.len()),
    );
    Ok(update)
}

pub fn set_api_base_url_impl(state: &AppState, raw_url: String) -> Result<String, InfraError> {
    let url = save_api_base_url(&state.config_dir, &raw_url)?;
    state.log_info("set_api_base_url", &format!("api base url set to {url}"));
    Ok(url.to_string())
}

pub async fn history_impl(
    state: &AppState,
    offset: Option<u32>,
    limit: Option<u32>,
) -> Result<HistoryView, InfraError> {
    let access_token = state.access_token().await?;
    let offset = offset.unwrap_or(0);
    let limit = normalize_limit(limit.unwrap_or(0), state.settings.history_page_size);
    let view = load_history(Arc::clone(&state.api), &access_token, offset, limit).await?;
    state.log_info(
        "history",
        &format!(
            "loaded offset={offset} limit={limit} items={} task_errors={}",
            view.page.items.len(),
            view.task_errors.len()
        ),
    );
    Ok(view)
}

async fn open_session_id(state: &AppState, access_token: &str) -> Result<String, InfraError> {
    state
        .api
        .get_active_session(access_token)
        .await?
        .map(|session| session.id)
        .ok_or_else(|| InfraError::InvalidTransition("no open session".to_string()))
}

pub async fn list_tasks_impl(state: &AppState) -> Result<Vec<PomodoroTask>, InfraError> {
    let access_token = state.access_token().await?;
    let session_id = open_session_id(state, &access_token).await?;
    state.api.list_session_tasks(&access_token, &session_id).await
}

pub async fn add_task_impl(state: &AppState, description: String) -> Result<PomodoroTask, InfraError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(InfraError::InvalidConfig(
            "task description must not be empty".to_string(),
        ));
    }
    let access_token = state.access_token().await?;
    let session_id = open_session_id(state, &access_token).await?;
    let task = state
        .api
        .create_task(&access_token, &session_id, description)
        .await?;
    state.log_info(
        "add_task",
        &format!("added task_id={} session_id={session_id}", task.id),
    );
    Ok(task)
}

pub async fn complete_task_impl(
    state: &AppState,
    task_id: String,
    completed: bool,
) -> Result<PomodoroTask, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let access_token = state.access_token().await?;
    let update = TaskUpdate {
        completed: Some(completed),
        ..TaskUpdate::default()
    };
    let task = state.api.update_task(&access_token, task_id, &update).await?;
    state.log_info(
        "complete_task",
        &format!("task_id={} completed={}", task.id, task.completed),
    );
    Ok(task)
}

pub async fn remove_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let access_token = state.access_token().await?;
    state.api.delete_task(&access_token, task_id).await?;
    state.log_info("remove_task", &format!("removed task_id={task_id}"));
    Ok(true)
}

fn required_id<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{session, FakePomodoroApi};
    use crate::domain::models::{AuthTokens, SessionAction, SessionStatus};
    use crate::infrastructure::alarm::RecordingAlarm;
    use crate::infrastructure::auth_client::{LoginRequest, RefreshRequest, TokenResponse};
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct FakeAuthClient;

    #[async_trait]
    impl AuthHttpClient for FakeAuthClient {
        async fn login(&self, request: LoginRequest) -> Result<TokenResponse, InfraError> {
            if request.password != "secret" {
                return Err(InfraError::AuthenticationRequired);
            }
            Ok(TokenResponse {
                access_token: "login-access".to_string(),
                refresh_token: Some("login-refresh".to_string()),
                expires_in: 900,
            })
        }

        async fn refresh(&self, _request: RefreshRequest) -> Result<TokenResponse, InfraError> {
            Err(InfraError::AuthenticationRequired)
        }
    }

    struct TempWorkspace {
        path: PathBuf,
        api: Arc<FakePomodoroApi>,
        alarm: Arc<RecordingAlarm>,
        credentials: Arc<InMemoryCredentialStore>,
    }

    impl TempWorkspace {
        fn new(api: FakePomodoroApi) -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomotrack-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self {
                path,
                api: Arc::new(api),
                alarm: Arc::new(RecordingAlarm::default()),
                credentials: Arc::new(InMemoryCredentialStore::with_tokens(AuthTokens {
                    access_token: "token".to_string(),
                    refresh_token: None,
                    expires_at: Utc::now() + chrono::Duration::hours(1),
                })),
            }
        }

        fn app_state(&self) -> AppState {
            let bootstrap = bootstrap_workspace(&self.path).expect("bootstrap workspace");
            let session_cache = Arc::new(SqliteSessionCache::new(&bootstrap.database_path));
            let api: Arc<dyn PomodoroApi> = self.api.clone();
            let alarm: Arc<dyn AlarmPlayer> = self.alarm.clone();
            let credential_store: Arc<dyn CredentialStore> = self.credentials.clone();
            AppState::from_parts(
                bootstrap,
                Collaborators {
                    api,
                    auth_client: Arc::new(FakeAuthClient),
                    credential_store,
                    session_cache,
                    alarm,
                },
            )
        }

        fn command_log(&self) -> String {
            fs::read_to_string(self.path.join("logs").join("commands.log")).unwrap_or_default()
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn live_api() -> FakePomodoroApi {
        let api = FakePomodoroApi::default();
        api.set_clock(Utc::now());
        api
    }

    #[tokio::test]
    async fn status_without_tokens_requires_login_and_is_logged() {
        let workspace = TempWorkspace::new(live_api());
        workspace.credentials.delete_tokens().expect("clear tokens");
        let state = workspace.app_state();

        let error = status_impl(&state).await.expect_err("login required");
        assert!(matches!(error, InfraError::AuthenticationRequired));
        let message = state.command_error("status", &error);
        assert!(message.contains("pomotrack login"));
        assert!(workspace.command_log().contains("\"level\":\"error\""));
    }

    #[tokio::test]
    async fn login_stores_tokens_and_logout_removes_them() {
        let workspace = TempWorkspace::new(live_api());
        workspace.credentials.delete_tokens().expect("clear tokens");
        let state = workspace.app_state();

        assert!(login_impl(&state, None, "secret".to_string()).await.is_err());
        assert!(matches!(
            login_impl(&state, Some("me@example.com".to_string()), "wrong".to_string()).await,
            Err(InfraError::AuthenticationRequired)
        ));
        let response = login_impl(&state, Some("me@example.com".to_string()), "secret".to_string())
            .await
            .expect("login");
        assert_eq!(response.status, "authenticated");
        assert!(workspace.credentials.load_tokens().expect("load").is_some());

        assert!(logout_impl(&state).expect("logout"));
        assert!(workspace.credentials.load_tokens().expect("load").is_none());
    }

    #[tokio::test]
    async fn idle_status_reports_no_session() {
        let workspace = TempWorkspace::new(live_api());
        let state = workspace.app_state();
        let status = status_impl(&state).await.expect("status");
        assert_eq!(status.state, "idle");
        assert_eq!(status.session, None);
        assert!(workspace.command_log().contains("\"command\":\"status\""));
    }

    #[tokio::test]
    async fn pause_survives_across_invocations_through_the_session_cache() {
        let workspace = TempWorkspace::new(live_api());

        let started = start_impl(&workspace.app_state(), "work".to_string(), Some(25), Some(5))
            .await
            .expect("start");
        assert_eq!(started.state, "active");
        assert_eq!(workspace.api.created()[0].work_duration, 25);

        let paused = pause_impl(&workspace.app_state()).await.expect("pause");
        assert_eq!(paused.state, "paused");
        let frozen = paused.countdown.expect("countdown").time_left_seconds;
        assert!(frozen > 1490);

        let status = status_impl(&workspace.app_state()).await.expect("status");
        assert_eq!(status.state, "paused");
        let countdown = status.countdown.expect("countdown");
        assert!(!countdown.running);
        assert_eq!(countdown.time_left_seconds, frozen);

        let resumed = resume_impl(&workspace.app_state()).await.expect("resume");
        assert_eq!(resumed.state, "active");
        assert!(resumed.countdown.expect("countdown").running);
        assert_eq!(
            workspace.api.actions(),
            vec![SessionAction::Pause, SessionAction::Resume]
        );
    }

    #[tokio::test]
    async fn start_uses_server_config_for_missing_durations() {
        let api = live_api();
        api.set_config(PomodoroConfig {
            work_duration: 50,
            long_break_duration: 20,
            ..PomodoroConfig::default()
        });
        let workspace = TempWorkspace::new(api);

        start_impl(&workspace.app_state(), "long_break".to_string(), None, None)
            .await
            .expect("start");
        let created = workspace.api.created();
        assert_eq!(created[0].session_type, SessionType::LongBreak);
        assert_eq!(created[0].work_duration, 50);
        assert_eq!(created[0].break_duration, 20);

        assert!(matches!(
            start_impl(&workspace.app_state(), "nap".to_string(), None, None).await,
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn skip_plays_alarm_completes_and_clears_cache() {
        let workspace = TempWorkspace::new(FakePomodoroApi::with_active(session(
            "s-1",
            SessionType::Work,
            SessionStatus::Active,
        )));
        let state = workspace.app_state();
        status_impl(&state).await.expect("status");
        assert!(state.session_cache.load().expect("cache").is_some());

        let completed = skip_impl(&state).await.expect("skip");
        assert_eq!(completed.status, SessionStatus::Completed);
        assert_eq!(workspace.alarm.played(), vec!["bell".to_string()]);
        assert!(state.session_cache.load().expect("cache").is_none());
    }

    #[tokio::test]
    async fn stop_without_session_is_an_invalid_transition() {
        let workspace = TempWorkspace::new(live_api());
        let state = workspace.app_state();
        assert!(matches!(
            stop_impl(&state).await,
            Err(InfraError::InvalidTransition(_))
        ));
        assert!(workspace.api.actions().is_empty());
    }

    #[tokio::test]
    async fn watch_completes_expired_session_and_auto_starts_break() {
        let api = FakePomodoroApi::with_active(session("s-1", SessionType::Work, SessionStatus::Active));
        api.set_config(PomodoroConfig {
            auto_start_breaks: true,
            ..PomodoroConfig::default()
        });
        let workspace = TempWorkspace::new(api);
        let state = workspace.app_state();

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        let hooks = WatchHooks {
            period: Duration::from_millis(5),
            on_tick: Arc::new(|_outcome: &TickOutcome| {}),
            on_complete: Some(Arc::new(move |_session: &PomodoroSession| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        };

        let response = watch_impl(&state, hooks, std::future::pending::<()>())
            .await
            .expect("watch");
        assert_eq!(response.stopped_by, "completed");
        assert_eq!(response.completed.len(), 2);
        assert_eq!(response.completed[0].session_type, SessionType::Work);
        assert_eq!(response.completed[1].session_type, SessionType::ShortBreak);
        assert_eq!(response.auto_started.len(), 1);
        assert_eq!(completions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn watch_returns_when_shutdown_fires() {
        let workspace = TempWorkspace::new(FakePomodoroApi::with_active(session(
            "s-1",
            SessionType::Work,
            SessionStatus::Paused,
        )));
        let state = workspace.app_state();
        let hooks = WatchHooks {
            period: Duration::from_millis(5),
            on_tick: Arc::new(|_outcome: &TickOutcome| {}),
            on_complete: None,
        };

        let response = watch_impl(&state, hooks, tokio::time::sleep(Duration::from_millis(30)))
            .await
            .expect("watch");
        assert_eq!(response.stopped_by, "interrupted");
        assert!(response.completed.is_empty());
    }

    #[tokio::test]
    async fn watch_stops_ticking_once_shutdown_returns() {
        let workspace = TempWorkspace::new(FakePomodoroApi::with_active(session(
            "s-1",
            SessionType::Work,
            SessionStatus::Paused,
        )));
        let state = workspace.app_state();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let hooks = WatchHooks {
            period: Duration::from_millis(5),
            on_tick: Arc::new(move |_outcome: &TickOutcome| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            on_complete: None,
        };

        let response = watch_impl(&state, hooks, tokio::time::sleep(Duration::from_millis(30)))
            .await
            .expect("watch");
        assert_eq!(response.stopped_by, "interrupted");

        let ticks_at_return = ticks.load(Ordering::SeqCst);
        assert!(ticks_at_return > 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), ticks_at_return);
        assert!(workspace.api.actions().is_empty());
    }

    #[tokio::test]
    async fn watch_keeps_completed_sessions_when_auto_start_fails() {
        let api = FakePomodoroApi::with_active(session("s-1", SessionType::Work, SessionStatus::Active));
        api.set_config(PomodoroConfig {
            auto_start_breaks: true,
            ..PomodoroConfig::default()
        });
        api.fail_create();
        let workspace = TempWorkspace::new(api);
        let state = workspace.app_state();
        let hooks = WatchHooks {
            period: Duration::from_millis(5),
            on_tick: Arc::new(|_outcome: &TickOutcome| {}),
            on_complete: None,
        };

        let response = watch_impl(&state, hooks, std::future::pending::<()>())
            .await
            .expect("watch");
        assert!(response.stopped_by.starts_with("auto-start failed"));
        assert_eq!(response.completed.len(), 1);
        assert_eq!(response.completed[0].id, "s-1");
        assert!(response.auto_started.is_empty());
        assert!(workspace.command_log().contains("auto-start of SHORT_BREAK failed"));
    }

    #[tokio::test]
    async fn config_updates_are_clamped_and_empty_patches_rejected() {
        let workspace = TempWorkspace::new(live_api());
        let state = workspace.app_state();

        assert!(matches!(
            update_config_impl(&state, ConfigPatch::default()).await,
            Err(InfraError::InvalidConfig(_))
        ));

        let update = update_config_impl(
            &state,
            ConfigPatch {
                long_break_interval: Some(40),
                ..ConfigPatch::default()
            },
        )
        .await
        .expect("update config");
        assert_eq!(update.config.long_break_interval, 12);
        assert_eq!(get_config_impl(&state).await.expect("config").long_break_interval, 12);
    }

    #[tokio::test]
    async fn history_uses_configured_page_size() {
        let api = live_api();
        api.set_history(
            (0..15)
                .map(|index| session(&format!("h-{index}"), SessionType::Work, SessionStatus::Completed))
                .collect(),
        );
        let workspace = TempWorkspace::new(api);
        let state = workspace.app_state();

        let view = history_impl(&state, None, None).await.expect("history");
        assert_eq!(view.page.limit, 10);
        assert_eq!(view.page.items.len(), 10);
        assert!(view.has_more);

        let capped = history_impl(&state, Some(10), Some(500)).await.expect("history");
        assert_eq!(capped.page.limit, 100);
        assert_eq!(capped.page.items.len(), 5);
        assert!(!capped.has_more);
    }

    #[tokio::test]
    async fn task_commands_require_an_open_session() {
        let workspace = TempWorkspace::new(live_api());
        let state = workspace.app_state();

        assert!(matches!(
            add_task_impl(&state, "write report".to_string()).await,
            Err(InfraError::InvalidTransition(_))
        ));

        start_impl(&state, "work".to_string(), Some(25), Some(5))
            .await
            .expect("start");
        assert!(matches!(
            add_task_impl(&state, "   ".to_string()).await,
            Err(InfraError::InvalidConfig(_))
        ));

        let task = add_task_impl(&state, "  write report ".to_string())
            .await
            .expect("add task");
        assert_eq!(task.description, "write report");

        let done = complete_task_impl(&state, task.id.clone(), true)
            .await
            .expect("complete task");
        assert!(done.completed);
        assert_eq!(list_tasks_impl(&state).await.expect("list").len(), 1);

        assert!(remove_task_impl(&state, task.id).await.expect("remove"));
        assert!(list_tasks_impl(&state).await.expect("list").is_empty());
    }

    #[test]
    fn api_base_url_is_normalized_and_saved() {
        let workspace = TempWorkspace::new(live_api());
        let state = workspace.app_state();
        let saved = set_api_base_url_impl(&state, "https://pomodoro.example.com/api".to_string())
            .expect("save url");
        assert_eq!(saved, "https://pomodoro.example.com/api/");
        assert!(set_api_base_url_impl(&state, "ftp://example.com".to_string()).is_err());
    }
}
