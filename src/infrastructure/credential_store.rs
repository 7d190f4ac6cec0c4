use crate::domain::models::AuthTokens;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

const KEYRING_SERVICE: &str = "pomotrack.api.tokens";
const TOKEN_RECORD_VERSION: u32 = 1;

/// Persistent home of the API access/refresh tokens.
pub trait CredentialStore: Send + Sync {
    fn save_tokens(&self, tokens: &AuthTokens) -> Result<(), InfraError>;
    fn load_tokens(&self) -> Result<Option<AuthTokens>, InfraError>;
    fn delete_tokens(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenRecord {
    version: u32,
    tokens: AuthTokens,
}

fn encode_tokens(tokens: &AuthTokens) -> Result<String, InfraError> {
    serde_json::to_string(&TokenRecord {
        version: TOKEN_RECORD_VERSION,
        tokens: tokens.clone(),
    })
    .map_err(|error| InfraError::Credential(error.to_string()))
}

/// Current records, then the bare token object written by early builds.
/// Anything else (newer versions, corrupt text) reads as "no tokens" so the
/// user is asked to log in again.
fn decode_tokens(payload: &str) -> Option<AuthTokens> {
    if let Ok(record) = serde_json::from_str::<TokenRecord>(payload) {
        if record.version == TOKEN_RECORD_VERSION {
            return Some(record.tokens);
        }
        log::warn!("ignoring stored tokens with record version {}", record.version);
        return None;
    }
    match serde_json::from_str::<AuthTokens>(payload) {
        Ok(tokens) => Some(tokens),
        Err(error) => {
            log::warn!("ignoring unreadable stored tokens: {error}");
            None
        }
    }
}

/// Tokens in the platform keyring, one entry per account.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn for_account(account_name: impl Into<String>) -> Self {
        Self {
            service_name: KEYRING_SERVICE.to_string(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_tokens(&self, tokens: &AuthTokens) -> Result<(), InfraError> {
        let payload = encode_tokens(tokens)?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_tokens(&self) -> Result<Option<AuthTokens>, InfraError> {
        match self.entry()?.get_password() {
            Ok(payload) => Ok(decode_tokens(&payload)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Credential(format!(
                "keyring read failed for {}: {error}",
                self.account_name
            ))),
        }
    }

    fn delete_tokens(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

/// Keeps the encoded record in memory; shares the keyring codec.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    payload: Mutex<Option<String>>,
}

impl InMemoryCredentialStore {
    pub fn with_tokens(tokens: AuthTokens) -> Self {
        Self {
            payload: Mutex::new(encode_tokens(&tokens).ok()),
        }
    }

    #[cfg(test)]
    fn with_payload(payload: &str) -> Self {
        Self {
            payload: Mutex::new(Some(payload.to_string())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, InfraError> {
        self.payload
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_tokens(&self, tokens: &AuthTokens) -> Result<(), InfraError> {
        *self.lock()? = Some(encode_tokens(tokens)?);
        Ok(())
    }

    fn load_tokens(&self) -> Result<Option<AuthTokens>, InfraError> {
        Ok(self.lock()?.as_deref().and_then(decode_tokens))
    }

    fn delete_tokens(&self) -> Result<(), InfraError> {
        *self.lock()? = None;
        Ok(())
    }
}
