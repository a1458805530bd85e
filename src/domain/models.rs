use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const WORK_SECONDS: u32 = 25 * 60;
pub const SHORT_BREAK_SECONDS: u32 = 5 * 60;
pub const LONG_BREAK_SECONDS: u32 = 15 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionKind {
    pub const ALL: [SessionKind; 3] = [Self::Work, Self::ShortBreak, Self::LongBreak];

    pub const fn duration_seconds(self) -> u32 {
        match self {
            Self::Work => WORK_SECONDS,
            Self::ShortBreak => SHORT_BREAK_SECONDS,
            Self::LongBreak => LONG_BREAK_SECONDS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::ShortBreak => "short_break",
            Self::LongBreak => "long_break",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim() {
            "work" => Ok(Self::Work),
            "short_break" => Ok(Self::ShortBreak),
            "long_break" => Ok(Self::LongBreak),
            other => Err(format!("unknown session kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_ref: Option<String>,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.updated_at < self.created_at {
            return Err("task.updated_at must be >= task.created_at".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn normalized_title(&self) -> Result<String, String> {
        normalize_title(&self.title)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn apply_to(&self, task: &mut Task, now: DateTime<Utc>) -> Result<(), String> {
        let title = self.title.as_deref().map(normalize_title).transpose()?;
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        task.updated_at = now.max(task.created_at);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_ref: Option<String>,
    #[serde(rename = "todoId", default)]
    pub linked_task_ref: Option<String>,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "durationSecs")]
    pub duration_seconds: u32,
    pub created_at: DateTime<Utc>,
}

impl FocusSession {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        if self.duration_seconds == 0 {
            return Err("session.duration_seconds must be > 0".to_string());
        }
        if let Some(completed_at) = self.completed_at {
            if completed_at < self.started_at {
                return Err("session.completed_at must be >= session.started_at".to_string());
            }
        }
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewFocusSession {
    #[serde(rename = "todoId", skip_serializing_if = "Option::is_none")]
    pub linked_task_ref: Option<String>,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "durationSecs")]
    pub duration_seconds: u32,
}

impl NewFocusSession {
    pub fn validate(&self) -> Result<(), String> {
        if self.duration_seconds == 0 {
            return Err("session.duration_seconds must be > 0".to_string());
        }
        if let Some(task_ref) = self.linked_task_ref.as_deref() {
            validate_non_empty(task_ref, "session.todo_id")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FocusSessionPatch {
    pub fn completed(at: DateTime<Utc>) -> Self {
        Self {
            completed_at: Some(at),
        }
    }

    /// `completed_at` moves from null to a timestamp once and is never reverted.
    pub fn apply_to(&self, session: &mut FocusSession) -> Result<(), String> {
        let Some(completed_at) = self.completed_at else {
            return Ok(());
        };
        if session.completed_at.is_some() {
            return Err(format!("session {} is already completed", session.id));
        }
        if completed_at < session.started_at {
            return Err("session.completed_at must be >= session.started_at".to_string());
        }
        session.completed_at = Some(completed_at);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub sub: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl AuthUser {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.sub, "user.sub")?;
        if self.exp <= self.iat {
            return Err("user.exp must be after user.iat".to_string());
        }
        Ok(())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

fn normalize_title(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("title must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
