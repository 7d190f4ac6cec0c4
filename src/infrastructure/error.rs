use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("Network error: {0}")]
    Http(String),
    #[error("API error: http {status}{}", body_suffix(.body))]
    Api { status: u16, body: String },
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Authentication required; run `pomotrack login`")]
    AuthenticationRequired,
    #[error("Alarm error: {0}")]
    Alarm(String),
}

impl InfraError {
    pub fn api(status: reqwest::StatusCode, body: &str) -> Self {
        Self::Api {
            status: status.as_u16(),
            body: body.trim().to_string(),
        }
    }
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("; body={body}")
    }
}
