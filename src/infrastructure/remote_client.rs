use crate::domain::models::{
    FocusSession, FocusSessionPatch, NewFocusSession, NewTask, Task, TaskPatch,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use url::Url;

pub const REMOTE_SESSION_HISTORY_LIMIT: usize = 30;

#[async_trait]
pub trait RemoteApiClient: Send + Sync {
    async fn list(&self, credential: &str, path: &[String]) -> Result<Value, InfraError>;
    async fn create(&self, credential: &str, path: &[String], body: Value) -> Result<Value, InfraError>;
    async fn update(&self, credential: &str, path: &[String], body: Value) -> Result<Value, InfraError>;
    async fn remove(&self, credential: &str, path: &[String]) -> Result<(), InfraError>;
}

#[derive(Debug, serde::Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<EnvelopeError>,
}

#[derive(Debug, serde::Deserialize)]
struct EnvelopeError {
    code: String,
    #[serde(default)]
    message: String,
}

pub fn decode_envelope(status: StatusCode, body: &str) -> Result<Value, InfraError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(InfraError::Unauthorized(format!("remote rejected credential: {body}")));
    }
    if status.is_server_error() {
        return Err(InfraError::BackendUnavailable(format!(
            "remote error: http {}",
            status.as_u16()
        )));
    }

    let envelope: Envelope = serde_json::from_str(body).map_err(|error| {
        InfraError::BackendUnavailable(format!(
            "undecodable remote payload (http {}): {error}",
            status.as_u16()
        ))
    })?;

    if envelope.success && status.is_success() {
        return Ok(envelope.data.unwrap_or(Value::Null));
    }

    let (code, message) = envelope
        .error
        .map(|error| (error.code, error.message))
        .unwrap_or_else(|| (String::new(), format!("http {}", status.as_u16())));
    Err(match code.as_str() {
        "INVALID_INPUT" => InfraError::Validation(message),
        "NOT_FOUND" => InfraError::NotFound(message),
        "UNAUTHORIZED" => InfraError::Unauthorized(message),
        "NETWORK_ERROR" => InfraError::BackendUnavailable(message),
        _ => match status {
            StatusCode::BAD_REQUEST => InfraError::Validation(message),
            StatusCode::NOT_FOUND => InfraError::NotFound(message),
            _ => InfraError::BackendUnavailable(format!("{code} {message}").trim().to_string()),
        },
    })
}

#[derive(Debug, Clone)]
pub struct ReqwestRemoteApiClient {
    client: Client,
    base_url: Url,
}

impl ReqwestRemoteApiClient {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid api base url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "api base url '{base_url}' cannot be a base"
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &[String]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("api base url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            for segment in path {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<Value, InfraError> {
        let response = request.send().await.map_err(|error| {
            InfraError::BackendUnavailable(format!("network error while {action}: {error}"))
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::BackendUnavailable(format!("failed reading response while {action}: {error}"))
        })?;
        decode_envelope(status, &body)
    }
}

#[async_trait]
impl RemoteApiClient for ReqwestRemoteApiClient {
    async fn list(&self, credential: &str, path: &[String]) -> Result<Value, InfraError> {
        let request = self.client.get(self.endpoint(path)?).bearer_auth(credential);
        self.send(request, "listing records").await
    }

    async fn create(&self, credential: &str, path: &[String], body: Value) -> Result<Value, InfraError> {
        let request = self
            .client
            .post(self.endpoint(path)?)
            .bearer_auth(credential)
            .json(&body);
        self.send(request, "creating record").await
    }

    async fn update(&self, credential: &str, path: &[String], body: Value) -> Result<Value, InfraError> {
        let request = self
            .client
            .patch(self.endpoint(path)?)
            .bearer_auth(credential)
            .json(&body);
        self.send(request, "updating record").await
    }

    async fn remove(&self, credential: &str, path: &[String]) -> Result<(), InfraError> {
        let request = self.client.delete(self.endpoint(path)?).bearer_auth(credential);
        self.send(request, "deleting record").await.map(|_| ())
    }
}

#[derive(Debug, Default)]
struct AccountRecords {
    tasks: Vec<Task>,
    sessions: Vec<FocusSession>,
}

#[derive(Debug, Default)]
struct InMemoryRemoteState {
    credentials: HashMap<String, String>,
    accounts: HashMap<String, AccountRecords>,
}

#[derive(Debug, Default)]
pub struct InMemoryRemoteApiClient {
    state: Mutex<InMemoryRemoteState>,
    offline: AtomicBool,
    create_budget: Mutex<Option<usize>>,
    create_calls: AtomicUsize,
}

impl InMemoryRemoteApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorize(&self, credential: &str, account: &str) {
        if let Ok(mut state) = self.state.lock() {
            state
                .credentials
                .insert(credential.to_string(), account.to_string());
            state.accounts.entry(account.to_string()).or_default();
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_creates_after(&self, count: usize) {
        if let Ok(mut budget) = self.create_budget.lock() {
            *budget = Some(count);
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn tasks_of(&self, account: &str) -> Vec<Task> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.accounts.get(account).map(|records| records.tasks.clone()))
            .unwrap_or_default()
    }

    pub fn sessions_of(&self, account: &str) -> Vec<FocusSession> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.accounts.get(account).map(|records| records.sessions.clone()))
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryRemoteState>, InfraError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(InfraError::BackendUnavailable("remote store offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|error| InfraError::BackendUnavailable(format!("remote state lock poisoned: {error}")))
    }

    fn take_create_budget(&self) -> Result<(), InfraError> {
        let mut budget = self
            .create_budget
            .lock()
            .map_err(|error| InfraError::BackendUnavailable(format!("budget lock poisoned: {error}")))?;
        match budget.as_mut() {
            Some(0) => Err(InfraError::BackendUnavailable("injected create failure".to_string())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn account_for<'a>(
    state: &'a mut InMemoryRemoteState,
    credential: &str,
) -> Result<&'a mut AccountRecords, InfraError> {
    let account = state
        .credentials
        .get(credential)
        .cloned()
        .ok_or_else(|| InfraError::Unauthorized("unknown credential".to_string()))?;
    Ok(state.accounts.entry(account).or_default())
}

fn account_name(state: &InMemoryRemoteState, credential: &str) -> Result<String, InfraError> {
    state
        .credentials
        .get(credential)
        .cloned()
        .ok_or_else(|| InfraError::Unauthorized("unknown credential".to_string()))
}

fn route(path: &[String]) -> Vec<&str> {
    path.iter().map(String::as_str).collect()
}

fn invalid_body(error: serde_json::Error) -> InfraError {
    InfraError::Validation(format!("invalid request body: {error}"))
}

fn unknown_route(path: &[String]) -> InfraError {
    InfraError::NotFound(format!("no route for /{}", path.join("/")))
}

#[async_trait]
impl RemoteApiClient for InMemoryRemoteApiClient {
    async fn list(&self, credential: &str, path: &[String]) -> Result<Value, InfraError> {
        let mut state = self.lock()?;
        let records = account_for(&mut state, credential)?;
        match route(path).as_slice() {
            ["todos"] => Ok(serde_json::to_value(&records.tasks)?),
            ["pomodoro", "sessions"] => {
                let mut sessions = records.sessions.clone();
                sessions.sort_by(|left, right| right.started_at.cmp(&left.started_at));
                sessions.truncate(REMOTE_SESSION_HISTORY_LIMIT);
                Ok(serde_json::to_value(sessions)?)
            }
            _ => Err(unknown_route(path)),
        }
    }

    async fn create(&self, credential: &str, path: &[String], body: Value) -> Result<Value, InfraError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock()?;
        let owner = account_name(&state, credential)?;
        self.take_create_budget()?;
        let records = account_for(&mut state, credential)?;
        let now = Utc::now();

        match route(path).as_slice() {
            ["todos"] => {
                let new: NewTask = serde_json::from_value(body).map_err(invalid_body)?;
                let title = new.normalized_title().map_err(InfraError::Validation)?;
                let task = Task {
                    id: uuid::Uuid::new_v4().to_string(),
                    owner_ref: Some(owner),
                    title,
                    completed: false,
                    created_at: now,
                    updated_at: now,
                };
                records.tasks.push(task.clone());
                Ok(serde_json::to_value(task)?)
            }
            ["pomodoro", "sessions"] => {
                let new: NewFocusSession = serde_json::from_value(body).map_err(invalid_body)?;
                new.validate().map_err(InfraError::Validation)?;
                let session = FocusSession {
                    id: uuid::Uuid::new_v4().to_string(),
                    owner_ref: Some(owner),
                    linked_task_ref: new.linked_task_ref,
                    kind: new.kind,
                    started_at: new.started_at,
                    completed_at: None,
                    duration_seconds: new.duration_seconds,
                    created_at: now,
                };
                records.sessions.push(session.clone());
                Ok(serde_json::to_value(session)?)
            }
            _ => Err(unknown_route(path)),
        }
    }

    async fn update(&self, credential: &str, path: &[String], body: Value) -> Result<Value, InfraError> {
        let mut state = self.lock()?;
        let records = account_for(&mut state, credential)?;
        let now = Utc::now();

        match route(path).as_slice() {
            ["todos", id] => {
                let patch: TaskPatch = serde_json::from_value(body).map_err(invalid_body)?;
                let task = records
                    .tasks
                    .iter_mut()
                    .find(|task| task.id == *id)
                    .ok_or_else(|| InfraError::NotFound(format!("todo {id}")))?;
                patch.apply_to(task, now).map_err(InfraError::Validation)?;
                Ok(serde_json::to_value(task.clone())?)
            }
            ["pomodoro", "sessions", id, "complete"] => {
                let session = records
                    .sessions
                    .iter_mut()
                    .find(|session| session.id == *id)
                    .ok_or_else(|| InfraError::NotFound(format!("session {id}")))?;
                if !session.is_completed() {
                    FocusSessionPatch::completed(now.max(session.started_at))
                        .apply_to(session)
                        .map_err(InfraError::Validation)?;
                }
                Ok(serde_json::to_value(session.clone())?)
            }
            _ => Err(unknown_route(path)),
        }
    }

    async fn remove(&self, credential: &str, path: &[String]) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        let records = account_for(&mut state, credential)?;

        match route(path).as_slice() {
            ["todos", id] => {
                let before = records.tasks.len();
                records.tasks.retain(|task| task.id != *id);
                if records.tasks.len() == before {
                    return Err(InfraError::NotFound(format!("todo {id}")));
                }
                for session in records
                    .sessions
                    .iter_mut()
                    .filter(|session| session.linked_task_ref.as_deref() == Some(*id))
                {
                    session.linked_task_ref = None;
                }
                Ok(())
            }
            ["pomodoro", "sessions", id] => {
                let before = records.sessions.len();
                records.sessions.retain(|session| session.id != *id);
                if records.sessions.len() == before {
                    return Err(InfraError::NotFound(format!("session {id}")));
                }
                Ok(())
            }
            _ => Err(unknown_route(path)),
        }
    }
}
