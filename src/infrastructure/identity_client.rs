use crate::domain::models::AuthUser;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn fetch_current_user(&self, credential: &str) -> Result<AuthUser, InfraError>;
    async fn logout(&self, credential: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestIdentityClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct MeResponse {
    user: AuthUser,
}

impl ReqwestIdentityClient {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid api base url '{base_url}': {error}"))
        })?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, action: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("api base url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("auth");
            segments.push(action);
        }
        Ok(url)
    }
}

#[async_trait]
impl IdentityClient for ReqwestIdentityClient {
    async fn fetch_current_user(&self, credential: &str) -> Result<AuthUser, InfraError> {
        if credential.trim().is_empty() {
            return Err(InfraError::Unauthorized("credential must not be empty".to_string()));
        }

        let response = self
            .client
            .get(self.endpoint("me")?)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|error| {
                InfraError::BackendUnavailable(format!("network error while resolving user: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::BackendUnavailable(format!("failed reading /auth/me response: {error}"))
        })?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(InfraError::Unauthorized("session credential rejected".to_string()));
        }
        if !status.is_success() {
            return Err(InfraError::BackendUnavailable(format!(
                "/auth/me failed: http {}",
                status.as_u16()
            )));
        }

        let parsed: MeResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::BackendUnavailable(format!("invalid /auth/me payload: {error}"))
        })?;
        parsed.user.validate().map_err(InfraError::Unauthorized)?;
        Ok(parsed.user)
    }

    async fn logout(&self, credential: &str) -> Result<(), InfraError> {
        let response = self
            .client
            .post(self.endpoint("logout")?)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|error| {
                InfraError::BackendUnavailable(format!("network error while logging out: {error}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(InfraError::BackendUnavailable(format!(
                "/auth/logout failed: http {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIdentityClient {
    users: Mutex<HashMap<String, AuthUser>>,
    fetch_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl InMemoryIdentityClient {
    pub fn register(&self, credential: &str, user: AuthUser) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(credential.to_string(), user);
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityClient for InMemoryIdentityClient {
    async fn fetch_current_user(&self, credential: &str) -> Result<AuthUser, InfraError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let users = self
            .users
            .lock()
            .map_err(|error| InfraError::BackendUnavailable(format!("identity lock poisoned: {error}")))?;
        users
            .get(credential)
            .cloned()
            .ok_or_else(|| InfraError::Unauthorized("session credential rejected".to_string()))
    }

    async fn logout(&self, credential: &str) -> Result<(), InfraError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let mut users = self
            .users
            .lock()
            .map_err(|error| InfraError::BackendUnavailable(format!("identity lock poisoned: {error}")))?;
        users.remove(credential);
        Ok(())
    }
}
