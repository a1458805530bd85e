use crate::domain::models::AuthUser;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::identity_client::IdentityClient;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use url::Url;

#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    #[serde(skip)]
    pub credential: String,
    pub user: AuthUser,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("credential", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "session")]
pub enum AuthState {
    Anonymous,
    Authenticated(AuthSession),
}

impl AuthState {
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(session) => Some(session),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }
}

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct AuthManager<S, C>
where
    S: CredentialStore + ?Sized,
    C: IdentityClient + ?Sized,
{
    api_base_url: String,
    credential_store: Arc<S>,
    identity_client: Arc<C>,
    now_provider: NowProvider,
}

impl<S, C> AuthManager<S, C>
where
    S: CredentialStore + ?Sized,
    C: IdentityClient + ?Sized,
{
    pub fn new(api_base_url: impl Into<String>, credential_store: Arc<S>, identity_client: Arc<C>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            credential_store,
            identity_client,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn login_url(&self) -> Result<String, InfraError> {
        let mut url = Url::parse(&self.api_base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid api base url '{}': {error}", self.api_base_url))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("api base url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("auth");
            segments.push("google");
        }
        Ok(url.to_string())
    }

    pub async fn complete_login(&self, credential: &str) -> Result<AuthSession, InfraError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(InfraError::Validation("credential must not be empty".to_string()));
        }

        let user = self.identity_client.fetch_current_user(credential).await?;
        if user.is_expired_at((self.now_provider)()) {
            return Err(InfraError::Unauthorized(format!("session for {} has expired", user.sub)));
        }

        self.credential_store.save_credential(credential)?;
        info!("signed in as {}", user.sub);
        Ok(AuthSession {
            credential: credential.to_string(),
            user,
        })
    }

    /// Startup check. Rejected or expired credentials are forgotten; an
    /// unreachable backend leaves the credential in place for the next launch.
    pub async fn restore_session(&self) -> Result<AuthState, InfraError> {
        let Some(credential) = self.credential_store.load_credential()? else {
            return Ok(AuthState::Anonymous);
        };

        let user = match self.identity_client.fetch_current_user(&credential).await {
            Ok(user) => user,
            Err(InfraError::Unauthorized(message)) => {
                info!("stored credential rejected: {message}");
                self.credential_store.delete_credential()?;
                return Ok(AuthState::Anonymous);
            }
            Err(InfraError::BackendUnavailable(message)) => {
                warn!("identity backend unavailable, continuing anonymously: {message}");
                return Ok(AuthState::Anonymous);
            }
            Err(error) => return Err(error),
        };

        if user.is_expired_at((self.now_provider)()) {
            info!("stored session for {} expired", user.sub);
            self.credential_store.delete_credential()?;
            return Ok(AuthState::Anonymous);
        }

        Ok(AuthState::Authenticated(AuthSession { credential, user }))
    }

    pub async fn logout(&self) -> Result<(), InfraError> {
        if let Some(credential) = self.credential_store.load_credential()? {
            if let Err(error) = self.identity_client.logout(&credential).await {
                warn!("remote logout failed, clearing local credential anyway: {error}");
            }
        }
        self.credential_store.delete_credential()
    }
}
