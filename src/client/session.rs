//! Signed-in state on the client side.
//!
//! The bearer token survives restarts through a [`TokenStore`]; the user is
//! only kept in memory and is re-fetched from `/users/profile` when the
//! session is hydrated.

use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::{ApiClient, ClientError};
use crate::auth::AuthPayload;
use crate::domain::aggregates::User;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, ClientError>;
    async fn save(&self, token: &str) -> Result<(), ClientError>;
    async fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<String>, ClientError> { Ok(self.token.lock().await.clone()) }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        *self.token.lock().await = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        self.token.lock().await.take();
        Ok(())
    }
}

/// Keeps the token in a single file.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<String>, ClientError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                Ok(if token.is_empty() { None } else { Some(token.to_string()) })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, token).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    user: Option<User>,
}

pub struct Session {
    tokens: Box<dyn TokenStore>,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(tokens: impl TokenStore + 'static) -> Self {
        Self { tokens: Box::new(tokens), state: RwLock::new(SessionState::default()) }
    }

    pub fn in_memory() -> Self { Self::new(MemoryTokenStore::new()) }

    pub async fn token(&self) -> Option<String> { self.state.read().await.token.clone() }

    pub async fn user(&self) -> Option<User> { self.state.read().await.user.clone() }

    pub async fn is_authenticated(&self) -> bool { self.state.read().await.user.is_some() }

    pub async fn is_admin(&self) -> bool { self.state.read().await.user.as_ref().is_some_and(User::is_admin) }

    /// Stores the token and the user from a login or registration.
    pub async fn sign_in(&self, payload: &AuthPayload) -> Result<(), ClientError> {
        self.tokens.save(&payload.token).await?;
        let mut state = self.state.write().await;
        state.token = Some(payload.token.clone());
        state.user = Some(payload.user.clone());
        Ok(())
    }

    pub(crate) async fn set_user(&self, user: User) { self.state.write().await.user = Some(user); }

    async fn adopt_token(&self, token: String) -> Result<(), ClientError> {
        self.tokens.save(&token).await?;
        let mut state = self.state.write().await;
        state.token = Some(token);
        state.user = None;
        Ok(())
    }

    /// Forgets the user and the persisted token.
    pub async fn teardown(&self) -> Result<(), ClientError> {
        *self.state.write().await = SessionState::default();
        self.tokens.clear().await
    }
}

/// Pulls `token` out of an OAuth callback URL such as
/// `https://shop.example/auth/callback?token=abc&next=/`. Relative callbacks
/// are resolved against `base_url`.
pub fn capture_oauth_callback(base_url: &str, url: &str) -> Option<String> {
    let url = match Url::parse(url) {
        Ok(url) => url,
        Err(_) => Url::parse(base_url).ok()?.join(url).ok()?,
    };
    url.query_pairs()
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

impl ApiClient {
    /// Restores a persisted session. Returns the signed-in user, or `None`
    /// when there is no token or the server no longer accepts it.
    pub async fn hydrate(&self) -> Result<Option<User>, ClientError> {
        let Some(token) = self.session.tokens.load().await? else { return Ok(None) };
        self.session.state.write().await.token = Some(token);
        match self.profile().await {
            Ok(user) => {
                self.session.set_user(user.clone()).await;
                Ok(Some(user))
            }
            Err(ClientError::Http { status: 401 | 403, message }) => {
                info!(%message, "stored session rejected, signing out");
                self.session.teardown().await?;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "could not restore session");
                Err(e)
            }
        }
    }

    /// Completes a third-party sign-in that redirected back with a token.
    pub async fn complete_oauth(&self, callback_url: &str) -> Result<Option<User>, ClientError> {
        let token = capture_oauth_callback(&self.base_url, callback_url).ok_or(ClientError::Unauthenticated)?;
        self.session.adopt_token(token).await?;
        self.hydrate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Email;

    fn payload() -> AuthPayload {
        AuthPayload { token: "tok-1".into(), user: User::new("Jane", Email::parse("jane@shop.test").unwrap(), String::new()) }
    }

    #[test]
    fn test_capture_oauth_callback() {
        let base = "https://shop.test";
        assert_eq!(capture_oauth_callback(base, "https://shop.test/auth/callback?token=abc123"), Some("abc123".into()));
        assert_eq!(capture_oauth_callback(base, "/auth/callback?next=%2F&token=xyz#top"), Some("xyz".into()));
        assert_eq!(capture_oauth_callback(base, "/auth/callback?token=a%2Bb%3D%3D"), Some("a+b==".into()));
        assert_eq!(capture_oauth_callback(base, "/auth/callback?token="), None);
        assert_eq!(capture_oauth_callback(base, "/auth/callback"), None);
        assert_eq!(capture_oauth_callback("not a url", "/auth/callback?token=abc"), None);
    }

    #[tokio::test]
    async fn test_file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("token");
        let session = Session::new(FileTokenStore::new(&path));
        session.sign_in(&payload()).await.unwrap();
        assert!(session.is_authenticated().await);

        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), Some("tok-1".into()));

        session.teardown().await.unwrap();
        assert!(session.token().await.is_none());
        assert_eq!(reopened.load().await.unwrap(), None);
        reopened.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_hydrate_without_token_is_signed_out() {
        let client = ApiClient::new("http://127.0.0.1:9", std::sync::Arc::new(Session::in_memory()));
        assert!(client.hydrate().await.unwrap().is_none());
    }
}
