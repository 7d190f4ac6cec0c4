use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::Envelope;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[async_trait]
pub trait AuthHttpClient: Send + Sync {
    async fn login(&self, request: LoginRequest) -> Result<TokenResponse, InfraError>;

    async fn refresh(&self, request: RefreshRequest) -> Result<TokenResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAuthClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponsePayload {
    #[serde(alias = "access_token", alias = "token")]
    access_token: Option<String>,
    #[serde(alias = "refresh_token")]
    refresh_token: Option<String>,
    #[serde(alias = "expires_in")]
    expires_in: Option<i64>,
}

/// Lifetime assumed when the server omits `expiresIn`.
const DEFAULT_EXPIRES_IN_SECONDS: i64 = 15 * 60;

impl ReqwestAuthClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, name: &str) -> Result<Url, InfraError> {
        self.base_url
            .join(&format!("auth/{name}"))
            .map_err(|error| InfraError::InvalidConfig(format!("invalid auth endpoint: {error}")))
    }

    async fn post_json(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> Result<TokenResponse, InfraError> {
        let response = self
            .client
            .post(self.endpoint(name)?)
            .json(&body)
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("auth {name} request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading auth {name} response: {error}")))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(InfraError::AuthenticationRequired);
        }
        if !status.is_success() {
            return Err(InfraError::api(status, &body));
        }

        let parsed = serde_json::from_str::<Envelope<TokenResponsePayload>>(&body)
            .map(Envelope::into_inner)
            .map_err(|error| {
                InfraError::InvalidPayload(format!("invalid auth {name} payload: {error}"))
            })?;
        let access_token = parsed
            .access_token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                InfraError::InvalidPayload(format!("auth {name} response did not include accessToken"))
            })?;

        Ok(TokenResponse {
            access_token,
            refresh_token: parsed
                .refresh_token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            expires_in: parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS).max(0),
        })
    }
}

#[async_trait]
impl AuthHttpClient for ReqwestAuthClient {
    async fn login(&self, request: LoginRequest) -> Result<TokenResponse, InfraError> {
        self.post_json(
            "login",
            serde_json::json!({
                "email": request.email,
                "password": request.password,
            }),
        )
        .await
    }

    async fn refresh(&self, request: RefreshRequest) -> Result<TokenResponse, InfraError> {
        self.post_json(
            "refresh",
            serde_json::json!({ "refreshToken": request.refresh_token }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ReqwestAuthClient {
        ReqwestAuthClient::new(Url::parse(&format!("{}/api/", server.uri())).expect("url"))
    }

    #[tokio::test]
    async fn login_parses_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(serde_json::json!({ "email": "a@b.c", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "access", "refreshToken": "refresh", "expiresIn": 900
            })))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .login(LoginRequest {
                email: "a@b.c".to_string(),
                password: "pw".to_string(),
            })
            .await
            .expect("login succeeds");
        assert_eq!(response.access_token, "access");
        assert_eq!(response.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(response.expires_in, 900);
    }

    #[tokio::test]
    async fn rejected_refresh_requires_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .refresh(RefreshRequest {
                refresh_token: "stale".to_string(),
            })
            .await;
        assert!(matches!(result, Err(InfraError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn missing_access_token_is_invalid_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": {} })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .login(LoginRequest {
                email: "a@b.c".to_string(),
                password: "pw".to_string(),
            })
            .await;
        assert!(matches!(result, Err(InfraError::InvalidPayload(_))));
    }
}
