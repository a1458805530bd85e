use crate::domain::models::{
    FocusSession, FocusSessionPatch, NewFocusSession, NewTask, Task, TaskPatch,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_client::RemoteApiClient;
use crate::infrastructure::slot_store::{SlotStore, FOCUS_SESSIONS_NAMESPACE, TASKS_NAMESPACE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "account")]
pub enum RecordScope {
    Device,
    Account(String),
}

impl fmt::Display for RecordScope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => formatter.write_str("device"),
            Self::Account(account) => write!(formatter, "account:{account}"),
        }
    }
}

pub trait StoredRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type New: Serialize + Clone + Send + Sync + 'static;
    type Patch: Serialize + Clone + Send + Sync + 'static;

    const LABEL: &'static str;
    const LOCAL_NAMESPACE: &'static str;
    const REMOTE_COLLECTION: &'static [&'static str];

    fn id(&self) -> &str;
    fn prepare_new(new: Self::New) -> Result<Self::New, InfraError>;
    fn create(new: Self::New, id: String, now: DateTime<Utc>) -> Self;
    fn apply_patch(&mut self, patch: &Self::Patch, now: DateTime<Utc>) -> Result<(), InfraError>;
    fn remote_update_path(id: &str) -> Vec<String>;
    fn present(records: Vec<Self>, history_limit: usize) -> Vec<Self>;

    fn remote_collection_path() -> Vec<String> {
        Self::REMOTE_COLLECTION.iter().map(|segment| segment.to_string()).collect()
    }

    fn remote_item_path(id: &str) -> Vec<String> {
        let mut path = Self::remote_collection_path();
        path.push(id.to_string());
        path
    }
}

impl StoredRecord for Task {
    type New = NewTask;
    type Patch = TaskPatch;

    const LABEL: &'static str = "task";
    const LOCAL_NAMESPACE: &'static str = TASKS_NAMESPACE;
    const REMOTE_COLLECTION: &'static [&'static str] = &["todos"];

    fn id(&self) -> &str {
        &self.id
    }

    fn prepare_new(new: NewTask) -> Result<NewTask, InfraError> {
        let title = new.normalized_title().map_err(InfraError::Validation)?;
        Ok(NewTask { title })
    }

    fn create(new: NewTask, id: String, now: DateTime<Utc>) -> Self {
        Task {
            id,
            owner_ref: None,
            title: new.title,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &TaskPatch, now: DateTime<Utc>) -> Result<(), InfraError> {
        patch.apply_to(self, now).map_err(InfraError::Validation)
    }

    fn remote_update_path(id: &str) -> Vec<String> {
        Self::remote_item_path(id)
    }

    fn present(records: Vec<Self>, _history_limit: usize) -> Vec<Self> {
        records
    }
}

impl StoredRecord for FocusSession {
    type New = NewFocusSession;
    type Patch = FocusSessionPatch;

    const LABEL: &'static str = "focus session";
    const LOCAL_NAMESPACE: &'static str = FOCUS_SESSIONS_NAMESPACE;
    const REMOTE_COLLECTION: &'static [&'static str] = &["pomodoro", "sessions"];

    fn id(&self) -> &str {
        &self.id
    }

    fn prepare_new(new: NewFocusSession) -> Result<NewFocusSession, InfraError> {
        new.validate().map_err(InfraError::Validation)?;
        Ok(new)
    }

    fn create(new: NewFocusSession, id: String, now: DateTime<Utc>) -> Self {
        FocusSession {
            id,
            owner_ref: None,
            linked_task_ref: new.linked_task_ref,
            kind: new.kind,
            started_at: new.started_at,
            completed_at: None,
            duration_seconds: new.duration_seconds,
            created_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &FocusSessionPatch, _now: DateTime<Utc>) -> Result<(), InfraError> {
        patch.apply_to(self).map_err(InfraError::Validation)
    }

    fn remote_update_path(id: &str) -> Vec<String> {
        let mut path = Self::remote_item_path(id);
        path.push("complete".to_string());
        path
    }

    fn present(mut records: Vec<Self>, history_limit: usize) -> Vec<Self> {
        records.reverse();
        records.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        records.truncate(history_limit);
        records
    }
}

#[async_trait]
pub trait RecordBackend<R: StoredRecord>: Send + Sync {
    fn scope(&self) -> RecordScope;
    async fn get_all(&self) -> Result<Vec<R>, InfraError>;
    async fn add(&self, new: R::New) -> Result<R, InfraError>;
    async fn update(&self, id: &str, patch: R::Patch) -> Result<R, InfraError>;
    async fn delete(&self, id: &str) -> Result<(), InfraError>;
    async fn clear(&self) -> Result<(), InfraError>;
}

fn not_found<R: StoredRecord>(id: &str, scope: &RecordScope) -> InfraError {
    InfraError::NotFound(format!("{} {id} in {scope} scope", R::LABEL))
}

pub struct LocalRecordBackend<R> {
    store: Arc<dyn SlotStore>,
    history_limit: usize,
    write_guard: Mutex<()>,
    _record: PhantomData<fn() -> R>,
}

impl<R: StoredRecord> LocalRecordBackend<R> {
    pub fn new(store: Arc<dyn SlotStore>, history_limit: usize) -> Self {
        Self {
            store,
            history_limit,
            write_guard: Mutex::new(()),
            _record: PhantomData,
        }
    }

    fn read_all(&self) -> Result<Vec<R>, InfraError> {
        let Some(payload) = self.store.load(R::LOCAL_NAMESPACE)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<R>>(&payload) {
            Ok(records) => Ok(records),
            Err(error) => {
                warn!("local {} slot is corrupt, treating as empty: {error}", R::LABEL);
                Ok(Vec::new())
            }
        }
    }

    fn write_all(&self, records: &[R]) -> Result<(), InfraError> {
        let payload = serde_json::to_string(records)?;
        self.store.save(R::LOCAL_NAMESPACE, &payload)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, InfraError> {
        self.write_guard
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("local record lock poisoned: {error}")))
    }
}

#[async_trait]
impl<R: StoredRecord> RecordBackend<R> for LocalRecordBackend<R> {
    fn scope(&self) -> RecordScope {
        RecordScope::Device
    }

    async fn get_all(&self) -> Result<Vec<R>, InfraError> {
        let _guard = self.lock()?;
        Ok(R::present(self.read_all()?, self.history_limit))
    }

    async fn add(&self, new: R::New) -> Result<R, InfraError> {
        let new = R::prepare_new(new)?;
        let _guard = self.lock()?;
        let mut records = self.read_all()?;
        let record = R::create(new, uuid::Uuid::new_v4().to_string(), Utc::now());
        records.push(record.clone());
        self.write_all(&records)?;
        Ok(record)
    }

    async fn update(&self, id: &str, patch: R::Patch) -> Result<R, InfraError> {
        let _guard = self.lock()?;
        let mut records = self.read_all()?;
        let record = records
            .iter_mut()
            .find(|record| record.id() == id)
            .ok_or_else(|| not_found::<R>(id, &RecordScope::Device))?;
        record.apply_patch(&patch, Utc::now())?;
        let updated = record.clone();
        self.write_all(&records)?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), InfraError> {
        let _guard = self.lock()?;
        let mut records = self.read_all()?;
        let before = records.len();
        records.retain(|record| record.id() != id);
        if records.len() == before {
            return Err(not_found::<R>(id, &RecordScope::Device));
        }
        self.write_all(&records)
    }

    async fn clear(&self) -> Result<(), InfraError> {
        let _guard = self.lock()?;
        self.store.remove(R::LOCAL_NAMESPACE)
    }
}

pub struct RemoteRecordBackend<R> {
    client: Arc<dyn RemoteApiClient>,
    credential: String,
    account: String,
    history_limit: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: StoredRecord> RemoteRecordBackend<R> {
    pub fn new(
        client: Arc<dyn RemoteApiClient>,
        credential: impl Into<String>,
        account: impl Into<String>,
        history_limit: usize,
    ) -> Self {
        Self {
            client,
            credential: credential.into(),
            account: account.into(),
            history_limit,
            _record: PhantomData,
        }
    }

    fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, InfraError> {
        serde_json::from_value(value).map_err(|error| {
            InfraError::BackendUnavailable(format!("undecodable remote {}: {error}", R::LABEL))
        })
    }

    fn scoped(&self, id: &str, error: InfraError) -> InfraError {
        match error {
            InfraError::NotFound(_) => {
                not_found::<R>(id, &RecordScope::Account(self.account.clone()))
            }
            other => other,
        }
    }
}

#[async_trait]
impl<R: StoredRecord> RecordBackend<R> for RemoteRecordBackend<R> {
    fn scope(&self) -> RecordScope {
        RecordScope::Account(self.account.clone())
    }

    async fn get_all(&self) -> Result<Vec<R>, InfraError> {
        let value = self
            .client
            .list(&self.credential, &R::remote_collection_path())
            .await?;
        let records = Self::decode::<Vec<R>>(value)?;
        Ok(R::present(records, self.history_limit))
    }

    async fn add(&self, new: R::New) -> Result<R, InfraError> {
        let new = R::prepare_new(new)?;
        let body = serde_json::to_value(&new)?;
        let value = self
            .client
            .create(&self.credential, &R::remote_collection_path(), body)
            .await?;
        Self::decode(value)
    }

    async fn update(&self, id: &str, patch: R::Patch) -> Result<R, InfraError> {
        let body = serde_json::to_value(&patch)?;
        let value = self
            .client
            .update(&self.credential, &R::remote_update_path(id), body)
            .await
            .map_err(|error| self.scoped(id, error))?;
        Self::decode(value)
    }

    async fn delete(&self, id: &str) -> Result<(), InfraError> {
        self.client
            .remove(&self.credential, &R::remote_item_path(id))
            .await
            .map_err(|error| self.scoped(id, error))
    }

    async fn clear(&self) -> Result<(), InfraError> {
        debug!("ignoring clear on remote {} backend for {}", R::LABEL, self.account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SessionKind;
    use crate::infrastructure::remote_client::InMemoryRemoteApiClient;
    use crate::infrastructure::slot_store::InMemorySlotStore;
    use chrono::Duration;

    fn local<R: StoredRecord>() -> (Arc<InMemorySlotStore>, LocalRecordBackend<R>) {
        let store = Arc::new(InMemorySlotStore::default());
        let backend = LocalRecordBackend::new(store.clone(), 30);
        (store, backend)
    }

    fn remote<R: StoredRecord>(client: &Arc<InMemoryRemoteApiClient>, account: &str) -> RemoteRecordBackend<R> {
        let credential = format!("cred-{account}");
        client.authorize(&credential, account);
        RemoteRecordBackend::new(client.clone(), credential, account, 30)
    }

    fn new_session(started_at: DateTime<Utc>) -> NewFocusSession {
        NewFocusSession {
            linked_task_ref: None,
            kind: SessionKind::Work,
            started_at,
            duration_seconds: 1500,
        }
    }

    #[tokio::test]
    async fn local_tasks_keep_insertion_order_and_trim_titles() {
        let (_, backend) = local::<Task>();
        let first = backend.add(NewTask::new(" A ")).await.expect("add A");
        backend.add(NewTask::new("B")).await.expect("add B");

        let all = backend.get_all().await.expect("get all");
        let titles: Vec<_> = all.iter().map(|task| task.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[0].owner_ref, None);
        assert!(!all[0].completed);
    }

    #[tokio::test]
    async fn local_add_rejects_blank_title() {
        let (store, backend) = local::<Task>();
        let result = backend.add(NewTask::new("   ")).await;
        assert!(matches!(result, Err(InfraError::Validation(_))));
        assert_eq!(store.load(TASKS_NAMESPACE).expect("load"), None);
    }

    #[tokio::test]
    async fn local_update_patches_only_present_fields() {
        let (_, backend) = local::<Task>();
        let task = backend.add(NewTask::new("Draft")).await.expect("add");
        let updated = backend
            .update(
                &task.id,
                TaskPatch {
                    title: None,
                    completed: Some(true),
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.title, "Draft");
        assert!(updated.completed);
        assert!(updated.updated_at >= task.updated_at);
    }

    #[tokio::test]
    async fn local_delete_twice_fails_not_found() {
        let (_, backend) = local::<Task>();
        let task = backend.add(NewTask::new("Once")).await.expect("add");
        backend.delete(&task.id).await.expect("first delete");
        assert!(matches!(
            backend.delete(&task.id).await,
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            backend.update(&task.id, TaskPatch::default()).await,
            Err(InfraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn local_delete_leaves_linked_sessions_dangling() {
        let store = Arc::new(InMemorySlotStore::default());
        let tasks = LocalRecordBackend::<Task>::new(store.clone(), 30);
        let sessions = LocalRecordBackend::<FocusSession>::new(store.clone(), 30);
        let task = tasks.add(NewTask::new("Linked")).await.expect("add task");
        let mut new = new_session(Utc::now());
        new.linked_task_ref = Some(task.id.clone());
        sessions.add(new).await.expect("add session");

        tasks.delete(&task.id).await.expect("delete task");
        let remaining = sessions.get_all().await.expect("sessions");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].linked_task_ref, Some(task.id));
    }

    #[tokio::test]
    async fn local_sessions_are_newest_first_and_capped() {
        let store = Arc::new(InMemorySlotStore::default());
        let backend = LocalRecordBackend::<FocusSession>::new(store, 30);
        let base = Utc::now();
        for offset in 0..35 {
            backend
                .add(new_session(base + Duration::minutes(offset)))
                .await
                .expect("add session");
        }
        let all = backend.get_all().await.expect("get all");
        assert_eq!(all.len(), 30);
        assert_eq!(all[0].started_at, base + Duration::minutes(34));
        assert!(all.windows(2).all(|pair| pair[0].started_at >= pair[1].started_at));
    }

    #[tokio::test]
    async fn local_session_completion_is_not_reverted() {
        let (_, backend) = local::<FocusSession>();
        let started = Utc::now();
        let session = backend.add(new_session(started)).await.expect("add");
        let completed_at = started + Duration::minutes(25);
        backend
            .update(&session.id, FocusSessionPatch::completed(completed_at))
            .await
            .expect("complete");
        let again = backend
            .update(
                &session.id,
                FocusSessionPatch::completed(completed_at + Duration::minutes(1)),
            )
            .await;
        assert!(matches!(again, Err(InfraError::Validation(_))));
        let all = backend.get_all().await.expect("get all");
        assert_eq!(all[0].completed_at, Some(completed_at));
    }

    #[tokio::test]
    async fn corrupt_local_slot_reads_as_empty() {
        let (store, backend) = local::<Task>();
        store.save(TASKS_NAMESPACE, "{oops").expect("seed");
        assert!(backend.get_all().await.expect("get all").is_empty());
    }

    #[tokio::test]
    async fn local_clear_wipes_only_its_namespace() {
        let store = Arc::new(InMemorySlotStore::default());
        let tasks = LocalRecordBackend::<Task>::new(store.clone(), 30);
        let sessions = LocalRecordBackend::<FocusSession>::new(store.clone(), 30);
        tasks.add(NewTask::new("A")).await.expect("add task");
        sessions.add(new_session(Utc::now())).await.expect("add session");

        tasks.clear().await.expect("clear");
        assert!(tasks.get_all().await.expect("tasks").is_empty());
        assert_eq!(sessions.get_all().await.expect("sessions").len(), 1);
    }

    #[tokio::test]
    async fn ids_from_the_other_scope_are_not_found() {
        let client = Arc::new(InMemoryRemoteApiClient::new());
        let remote_backend = remote::<Task>(&client, "user-1");
        let (_, local_backend) = local::<Task>();

        let remote_task = remote_backend.add(NewTask::new("Remote")).await.expect("remote add");
        let local_task = local_backend.add(NewTask::new("Local")).await.expect("local add");

        assert!(matches!(
            local_backend.update(&remote_task.id, TaskPatch::default()).await,
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            local_backend.delete(&remote_task.id).await,
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            remote_backend.update(&local_task.id, TaskPatch::default()).await,
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            remote_backend.delete(&local_task.id).await,
            Err(InfraError::NotFound(_))
        ));

        let other_account = remote::<Task>(&client, "user-2");
        assert!(matches!(
            other_account.delete(&remote_task.id).await,
            Err(InfraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remote_clear_is_a_no_op() {
        let client = Arc::new(InMemoryRemoteApiClient::new());
        let backend = remote::<Task>(&client, "user-1");
        backend.add(NewTask::new("Keep me")).await.expect("add");
        backend.clear().await.expect("clear");
        assert_eq!(backend.get_all().await.expect("get all").len(), 1);
        assert_eq!(backend.scope(), RecordScope::Account("user-1".to_string()));
    }

    #[tokio::test]
    async fn remote_failure_does_not_fall_back_to_local() {
        let client = Arc::new(InMemoryRemoteApiClient::new());
        let backend = remote::<Task>(&client, "user-1");
        client.set_offline(true);
        assert!(matches!(
            backend.add(NewTask::new("lost")).await,
            Err(InfraError::BackendUnavailable(_))
        ));
        client.set_offline(false);
        assert!(backend.get_all().await.expect("get all").is_empty());
    }

    #[tokio::test]
    async fn remote_session_completion_uses_complete_route() {
        let client = Arc::new(InMemoryRemoteApiClient::new());
        let backend = remote::<FocusSession>(&client, "user-1");
        let started = Utc::now() - Duration::minutes(25);
        let session = backend.add(new_session(started)).await.expect("add");
        assert_eq!(session.owner_ref.as_deref(), Some("user-1"));

        let completed = backend
            .update(&session.id, FocusSessionPatch::completed(Utc::now()))
            .await
            .expect("complete");
        assert!(completed.is_completed());
    }

    #[test]
    fn scope_display_names_the_partition() {
        assert_eq!(RecordScope::Device.to_string(), "device");
        assert_eq!(RecordScope::Account("u1".into()).to_string(), "account:u1");
    }
}
