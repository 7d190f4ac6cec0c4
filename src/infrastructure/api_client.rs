use crate::domain::models::{HistoryPage, PomodoroConfig, PomodoroSession, PomodoroTask, SessionAction};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::{
    ConfigPayload, CreateSessionRequest, CreateTaskRequest, Envelope, HistoryPayload,
    SessionPayload, TaskPayload, TaskUpdate, UpdateSessionRequest,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

#[async_trait]
pub trait PomodoroApi: Send + Sync {
    /// `Ok(None)` when the server reports no active or paused session.
    async fn get_active_session(
        &self,
        access_token: &str,
    ) -> Result<Option<PomodoroSession>, InfraError>;

    async fn create_session(
        &self,
        access_token: &str,
        request: &CreateSessionRequest,
    ) -> Result<PomodoroSession, InfraError>;

    async fn update_session(
        &self,
        access_token: &str,
        session_id: &str,
        action: SessionAction,
    ) -> Result<PomodoroSession, InfraError>;

    async fn get_history(
        &self,
        access_token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<HistoryPage, InfraError>;

    async fn get_config(&self, access_token: &str) -> Result<PomodoroConfig, InfraError>;

    async fn update_config(
        &self,
        access_token: &str,
        config: &PomodoroConfig,
    ) -> Result<PomodoroConfig, InfraError>;

    async fn list_session_tasks(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<Vec<PomodoroTask>, InfraError>;

    async fn create_task(
        &self,
        access_token: &str,
        session_id: &str,
        description: &str,
    ) -> Result<PomodoroTask, InfraError>;

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<PomodoroTask, InfraError>;

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestPomodoroApi {
    client: Client,
    base_url: Url,
}

impl ReqwestPomodoroApi {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidPayload(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("api base URL cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// Sends the request and returns the status plus the raw body.
    async fn execute(
        &self,
        request: RequestBuilder,
        access_token: &str,
        operation: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        let response = request
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error while {operation}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading {operation} response: {error}")))?;
        log::debug!("{operation}: http {}", status.as_u16());
        Ok((status, body))
    }

    fn parse_body<T: DeserializeOwned>(body: &str, operation: &str) -> Result<T, InfraError> {
        serde_json::from_str::<Envelope<T>>(body)
            .map(Envelope::into_inner)
            .map_err(|error| {
                InfraError::InvalidPayload(format!("invalid {operation} payload: {error}; body={body}"))
            })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        access_token: &str,
        operation: &str,
    ) -> Result<T, InfraError> {
        let (status, body) = self.execute(request, access_token, operation).await?;
        if !status.is_success() {
            return Err(InfraError::api(status, &body));
        }
        Self::parse_body(&body, operation)
    }

    async fn send_session(
        &self,
        request: RequestBuilder,
        access_token: &str,
        operation: &str,
    ) -> Result<PomodoroSession, InfraError> {
        let payload: SessionPayload = self.send_json(request, access_token, operation).await?;
        PomodoroSession::try_from(payload)
    }

    async fn send_task(
        &self,
        request: RequestBuilder,
        access_token: &str,
        operation: &str,
    ) -> Result<PomodoroTask, InfraError> {
        let payload: TaskPayload = self.send_json(request, access_token, operation).await?;
        PomodoroTask::try_from(payload)
    }
}

#[async_trait]
impl PomodoroApi for ReqwestPomodoroApi {
    async fn get_active_session(
        &self,
        access_token: &str,
    ) -> Result<Option<PomodoroSession>, InfraError> {
        let operation = "fetching active session";
        let endpoint = self.endpoint(&["pomodoro", "sessions", "active"])?;
        let (status, body) = self
            .execute(self.client.get(endpoint), access_token, operation)
            .await?;

        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(InfraError::api(status, &body));
        }
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" || trimmed == r#"{"data":null}"# {
            return Ok(None);
        }

        let payload: SessionPayload = Self::parse_body(trimmed, operation)?;
        let session = PomodoroSession::try_from(payload)?;
        Ok(session.is_open().then_some(session))
    }

    async fn create_session(
        &self,
        access_token: &str,
        request: &CreateSessionRequest,
    ) -> Result<PomodoroSession, InfraError> {
        let endpoint = self.endpoint(&["pomodoro", "sessions"])?;
        self.send_session(
            self.client.post(endpoint).json(request),
            access_token,
            "creating session",
        )
        .await
    }

    async fn update_session(
        &self,
        access_token: &str,
        session_id: &str,
        action: SessionAction,
    ) -> Result<PomodoroSession, InfraError> {
        Self::ensure_non_empty(session_id, "session id")?;
        let endpoint = self.endpoint(&["pomodoro", "sessions", session_id])?;
        self.send_session(
            self.client
                .patch(endpoint)
                .json(&UpdateSessionRequest { action }),
            access_token,
            &format!("sending {} for session {session_id}", action.as_str()),
        )
        .await
    }

    async fn get_history(
        &self,
        access_token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<HistoryPage, InfraError> {
        let endpoint = self.endpoint(&["pomodoro", "sessions", "history"])?;
        let payload: HistoryPayload = self
            .send_json(
                self.client
                    .get(endpoint)
                    .query(&[("offset", offset), ("limit", limit)]),
                access_token,
                "fetching session history",
            )
            .await?;
        payload.into_page(offset, limit)
    }

    async fn get_config(&self, access_token: &str) -> Result<PomodoroConfig, InfraError> {
        let endpoint = self.endpoint(&["pomodoro", "config"])?;
        let payload: ConfigPayload = self
            .send_json(self.client.get(endpoint), access_token, "fetching config")
            .await?;
        PomodoroConfig::try_from(payload)
    }

    async fn update_config(
        &self,
        access_token: &str,
        config: &PomodoroConfig,
    ) -> Result<PomodoroConfig, InfraError> {
        let endpoint = self.endpoint(&["pomodoro", "config"])?;
        let payload: ConfigPayload = self
            .send_json(
                self.client.put(endpoint).json(config),
                access_token,
                "updating config",
            )
            .await?;
        PomodoroConfig::try_from(payload)
    }

    async fn list_session_tasks(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<Vec<PomodoroTask>, InfraError> {
        Self::ensure_non_empty(session_id, "session id")?;
        let endpoint = self.endpoint(&["pomodoro", "sessions", session_id, "tasks"])?;
        let payload: Vec<TaskPayload> = self
            .send_json(
                self.client.get(endpoint),
                access_token,
                &format!("listing tasks for session {session_id}"),
            )
            .await?;
        payload.into_iter().map(PomodoroTask::try_from).collect()
    }

    async fn create_task(
        &self,
        access_token: &str,
        session_id: &str,
        description: &str,
    ) -> Result<PomodoroTask, InfraError> {
        Self::ensure_non_empty(session_id, "session id")?;
        Self::ensure_non_empty(description, "task description")?;
        let endpoint = self.endpoint(&["pomodoro", "sessions", session_id, "tasks"])?;
        self.send_task(
            self.client.post(endpoint).json(&CreateTaskRequest {
                description: description.trim(),
            }),
            access_token,
            "creating task",
        )
        .await
    }

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<PomodoroTask, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let endpoint = self.endpoint(&["pomodoro", "tasks", task_id])?;
        self.send_task(
            self.client.patch(endpoint).json(update),
            access_token,
            "updating task",
        )
        .await
    }

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let endpoint = self.endpoint(&["pomodoro", "tasks", task_id])?;
        let (status, body) = self
            .execute(self.client.delete(endpoint), access_token, "deleting task")
            .await?;
        if !status.is_success() {
            return Err(InfraError::api(status, &body));
        }
        Ok(())
    }
}
