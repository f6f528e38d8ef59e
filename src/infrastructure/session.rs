use crate::infrastructure::error::SessionError;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Holds the bearer credential for the remote authority. The credential
/// must survive a process restart and be clearable on logout; expiry is
/// read from the token itself, never from the network.
pub trait SessionStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;

    fn is_valid(&self) -> bool {
        self.token()
            .map(|token| !token_is_expired(&token, Utc::now()))
            .unwrap_or(false)
    }
}

/// Expiry embedded in the credential's claims segment. Returns `None` for
/// tokens that are not well-formed JWTs or carry no `exp` claim.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let claims_segment = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD
        .decode(claims_segment)
        .or_else(|_| URL_SAFE.decode(claims_segment))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// A malformed credential is treated as expired rather than trusted.
pub fn token_is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match token_expiry(token) {
        Some(expiry) => expiry <= now,
        None => true,
    }
}

/// Credential store backed by the operating system keyring, the desktop
/// counterpart of a scoped session cookie.
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    service_name: String,
    account_name: String,
}

impl KeyringSessionStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, SessionError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| SessionError::Store(error.to_string()))
    }
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new("daybook.session", "default")
    }
}

impl SessionStore for KeyringSessionStore {
    fn token(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(error) => {
                log::warn!("session store unavailable: {error}");
                return None;
            }
        };
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(error) => {
                log::warn!("failed reading session credential: {error}");
                None
            }
        }
    }

    fn set_token(&self, token: &str) -> Result<(), SessionError> {
        self.entry()?
            .set_password(token)
            .map_err(|error| SessionError::Store(error.to_string()))
    }

    fn clear(&self) -> Result<(), SessionError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(SessionError::Store(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    token: Mutex<Option<String>>,
}

impl SessionStore for InMemorySessionStore {
    fn token(&self) -> Option<String> {
        match self.token.lock() {
            Ok(guard) => guard.clone(),
            Err(error) => {
                log::warn!("in-memory session lock poisoned: {error}");
                None
            }
        }
    }

    fn set_token(&self, token: &str) -> Result<(), SessionError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| SessionError::Store(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| SessionError::Store(format!("in-memory lock poisoned: {error}")))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(
            serde_json::json!({ "sub": "user-1", "exp": exp })
                .to_string()
                .as_bytes(),
        );
        format!("{header}.{claims}.signature")
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-07T12:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn token_expiry_reads_exp_claim() {
        let expiry = token_expiry(&jwt_with_exp(1_800_000_000)).expect("expiry");
        assert_eq!(expiry.timestamp(), 1_800_000_000);
    }

    #[test]
    fn future_token_is_not_expired() {
        let token = jwt_with_exp(fixed_now().timestamp() + 3600);
        assert!(!token_is_expired(&token, fixed_now()));
    }

    #[test]
    fn past_token_is_expired() {
        let token = jwt_with_exp(fixed_now().timestamp() - 1);
        assert!(token_is_expired(&token, fixed_now()));
    }

    #[test]
    fn malformed_token_counts_as_expired() {
        assert!(token_is_expired("not-a-jwt", fixed_now()));
        assert!(token_is_expired("a.%%%.c", fixed_now()));
        assert!(token_is_expired("", fixed_now()));
    }

    #[test]
    fn in_memory_store_set_get_clear() {
        let store = InMemorySessionStore::default();
        assert!(store.token().is_none());
        assert!(!store.is_valid());

        store.set_token("abc").expect("set token");
        assert_eq!(store.token().as_deref(), Some("abc"));

        store.clear().expect("clear token");
        assert!(store.token().is_none());
    }

    #[test]
    fn in_memory_store_validity_tracks_embedded_expiry() {
        let store = InMemorySessionStore::default();
        store
            .set_token(&jwt_with_exp(Utc::now().timestamp() + 3600))
            .expect("set token");
        assert!(store.is_valid());

        store
            .set_token(&jwt_with_exp(Utc::now().timestamp() - 3600))
            .expect("set token");
        assert!(!store.is_valid());
    }
}
