use crate::domain::models::AuthTokens;
use crate::infrastructure::auth_client::{AuthHttpClient, LoginRequest, RefreshRequest, TokenResponse};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

const TOKEN_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureTokenResult {
    Existing(AuthTokens),
    Refreshed(AuthTokens),
    LoginRequired,
}

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Loads, refreshes and stores the API tokens.
pub struct TokenManager<S, C>
where
    S: CredentialStore + ?Sized,
    C: AuthHttpClient + ?Sized,
{
    credential_store: Arc<S>,
    auth_client: Arc<C>,
    now_provider: NowProvider,
}

impl<S, C> TokenManager<S, C>
where
    S: CredentialStore + ?Sized,
    C: AuthHttpClient + ?Sized,
{
    pub fn new(credential_store: Arc<S>, auth_client: Arc<C>) -> Self {
        Self {
            credential_store,
            auth_client,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn is_token_valid(&self, tokens: &AuthTokens) -> bool {
        tokens.is_valid_at((self.now_provider)(), TOKEN_LEEWAY_SECONDS)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTokens, InfraError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(InfraError::InvalidConfig("email must not be empty".to_string()));
        }
        if password.is_empty() {
            return Err(InfraError::InvalidConfig("password must not be empty".to_string()));
        }

        let response = self
            .auth_client
            .login(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;

        let tokens = self.tokens_from_response(response, None);
        self.credential_store.save_tokens(&tokens)?;
        Ok(tokens)
    }

    pub async fn ensure_access_token(&self) -> Result<EnsureTokenResult, InfraError> {
        let Some(stored) = self.credential_store.load_tokens()? else {
            return Ok(EnsureTokenResult::LoginRequired);
        };

        if self.is_token_valid(&stored) {
            return Ok(EnsureTokenResult::Existing(stored));
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            return Ok(EnsureTokenResult::LoginRequired);
        };

        match self
            .auth_client
            .refresh(RefreshRequest { refresh_token })
            .await
        {
            Ok(response) => {
                let tokens = self.tokens_from_response(response, stored.refresh_token);
                self.credential_store.save_tokens(&tokens)?;
                log::info!("refreshed api access token");
                Ok(EnsureTokenResult::Refreshed(tokens))
            }
            Err(InfraError::AuthenticationRequired) => Ok(EnsureTokenResult::LoginRequired),
            Err(error) => Err(error),
        }
    }

    /// The current access token, or `AuthenticationRequired` when the user must log in again.
    pub async fn access_token(&self) -> Result<String, InfraError> {
        match self.ensure_access_token().await? {
            EnsureTokenResult::Existing(tokens) | EnsureTokenResult::Refreshed(tokens) => {
                Ok(tokens.access_token)
            }
            EnsureTokenResult::LoginRequired => Err(InfraError::AuthenticationRequired),
        }
    }

    pub fn logout(&self) -> Result<(), InfraError> {
        self.credential_store.delete_tokens()
    }

    fn tokens_from_response(
        &self,
        response: TokenResponse,
        fallback_refresh_token: Option<String>,
    ) -> AuthTokens {
        AuthTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at: (self.now_provider)() + Duration::seconds(response.expires_in.max(0)),
        }
    }
}
