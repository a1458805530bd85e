use crate::application::auth::{AuthManager, AuthSession, AuthState};
use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::dual_store::DualModeStore;
use crate::application::migration::{
    MigrationCoordinator, MigrationDecision, MigrationOutcome, MigrationState,
};
use crate::application::timer_service::TimerService;
use crate::domain::clock::TimerState;
use crate::domain::models::{FocusSession, NewTask, SessionKind, Task, TaskPatch};
use crate::infrastructure::config::{read_app_settings, AppSettings};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::identity_client::{IdentityClient, ReqwestIdentityClient};
use crate::infrastructure::record_store::{
    LocalRecordBackend, RecordBackend, RecordScope, RemoteRecordBackend,
};
use crate::infrastructure::remote_client::{RemoteApiClient, ReqwestRemoteApiClient};
use crate::infrastructure::slot_store::{SlotStore, SqliteSlotStore};
use crate::infrastructure::timer_snapshot::TimerSnapshotRepository;
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct ServiceClients {
    pub credential_store: Arc<dyn CredentialStore>,
    pub identity_client: Arc<dyn IdentityClient>,
    pub remote_client: Arc<dyn RemoteApiClient>,
}

impl ServiceClients {
    pub fn production(settings: &AppSettings) -> Result<Self, InfraError> {
        Ok(Self {
            credential_store: Arc::new(KeyringCredentialStore::default()),
            identity_client: Arc::new(ReqwestIdentityClient::new(&settings.api_base_url)?),
            remote_client: Arc::new(ReqwestRemoteApiClient::new(&settings.api_base_url)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStateResponse {
    #[serde(flatten)]
    pub timer: TimerState,
    pub total_seconds: u32,
    pub progress_ratio: f64,
    pub selected_task_id: Option<String>,
}

impl TimerStateResponse {
    fn new(timer: TimerState, selected_task_id: Option<String>) -> Self {
        Self {
            total_seconds: timer.total_seconds(),
            progress_ratio: timer.progress_ratio(),
            timer,
            selected_task_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub auth: AuthState,
    pub migration: MigrationState,
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    settings: AppSettings,
    auth: AuthManager<dyn CredentialStore, dyn IdentityClient>,
    auth_state: tokio::sync::Mutex<AuthState>,
    remote_client: Arc<dyn RemoteApiClient>,
    local_tasks: Arc<dyn RecordBackend<Task>>,
    local_sessions: Arc<dyn RecordBackend<FocusSession>>,
    tasks: Arc<DualModeStore<Task>>,
    sessions: Arc<DualModeStore<FocusSession>>,
    timer: TimerService,
    migration: MigrationCoordinator,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let settings = read_app_settings(&bootstrap.config_dir)?;
        let clients = ServiceClients::production(&settings)?;
        Ok(Self::assemble(bootstrap, settings, clients))
    }

    pub fn with_clients(workspace_root: PathBuf, clients: ServiceClients) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let settings = read_app_settings(&bootstrap.config_dir)?;
        Ok(Self::assemble(bootstrap, settings, clients))
    }

    fn assemble(bootstrap: BootstrapResult, settings: AppSettings, clients: ServiceClients) -> Self {
        let limit = settings.session_history_limit;

        let slots: Arc<dyn SlotStore> = Arc::new(SqliteSlotStore::new(&bootstrap.database_path));
        let local_tasks: Arc<dyn RecordBackend<Task>> =
            Arc::new(LocalRecordBackend::<Task>::new(slots.clone(), limit));
        let local_sessions: Arc<dyn RecordBackend<FocusSession>> =
            Arc::new(LocalRecordBackend::<FocusSession>::new(slots.clone(), limit));
        let tasks = Arc::new(DualModeStore::new(local_tasks.clone()));
        let sessions = Arc::new(DualModeStore::new(local_sessions.clone()));
        let timer = TimerService::new(TimerSnapshotRepository::new(slots), sessions.clone());

        Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            auth: AuthManager::new(
                settings.api_base_url.clone(),
                clients.credential_store,
                clients.identity_client,
            ),
            settings,
            auth_state: tokio::sync::Mutex::new(AuthState::Anonymous),
            remote_client: clients.remote_client,
            migration: MigrationCoordinator::new(local_tasks.clone()),
            local_tasks,
            local_sessions,
            tasks,
            sessions,
            timer,
            log_guard: Mutex::new(()),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn timer(&self) -> &TimerService {
        &self.timer
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &format!("[{}] {error}", error.code()));
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.logs_dir.join("commands.log"))
        {
            Ok(mut file) => {
                if let Err(error) = writeln!(file, "{entry}") {
                    log::warn!("command log write failed: {error}");
                }
            }
            Err(error) => log::warn!("command log unavailable: {error}"),
        }
    }

    fn activate_account(&self, session: &AuthSession) -> Result<(), InfraError> {
        let limit = self.settings.session_history_limit;
        self.tasks.switch_to(Arc::new(RemoteRecordBackend::<Task>::new(
            self.remote_client.clone(),
            session.credential.clone(),
            session.user.sub.clone(),
            limit,
        )))?;
        self.sessions
            .switch_to(Arc::new(RemoteRecordBackend::<FocusSession>::new(
                self.remote_client.clone(),
                session.credential.clone(),
                session.user.sub.clone(),
                limit,
            )))?;
        Ok(())
    }

    fn activate_device(&self) -> Result<(), InfraError> {
        self.tasks.switch_to(self.local_tasks.clone())?;
        self.sessions.switch_to(self.local_sessions.clone())?;
        Ok(())
    }

    async fn enter_session(&self, session: AuthSession) -> Result<SessionResponse, InfraError> {
        self.activate_account(&session)?;
        let mut auth_state = self.auth_state.lock().await;
        *auth_state = AuthState::Authenticated(session);
        let migration = self.migration.on_authenticated().await?;
        Ok(SessionResponse {
            auth: auth_state.clone(),
            migration,
        })
    }
}

async fn timer_response(state: &AppState, timer: TimerState) -> TimerStateResponse {
    TimerStateResponse::new(timer, state.timer.selected_task().await)
}

pub async fn get_timer_state_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let timer = state.timer.state().await;
    Ok(timer_response(state, timer).await)
}

pub async fn start_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let timer = state.timer.start().await;
    state.log_info(
        "start_timer",
        &format!("{} with {}s left", timer.session_kind.as_str(), timer.remaining_seconds),
    );
    Ok(timer_response(state, timer).await)
}

pub async fn pause_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let timer = state.timer.pause().await;
    state.log_info("pause_timer", &format!("paused at {}s", timer.remaining_seconds));
    Ok(timer_response(state, timer).await)
}

pub async fn reset_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let timer = state.timer.reset().await;
    state.log_info(
        "reset_timer",
        &format!("{} reset to {}s", timer.session_kind.as_str(), timer.remaining_seconds),
    );
    Ok(timer_response(state, timer).await)
}

pub async fn skip_session_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let timer = state.timer.skip().await;
    state.log_info(
        "skip_session",
        &format!("advanced to {}", timer.session_kind.as_str()),
    );
    Ok(timer_response(state, timer).await)
}

pub async fn change_session_kind_impl(
    state: &AppState,
    kind: String,
) -> Result<TimerStateResponse, InfraError> {
    let kind = SessionKind::parse(&kind).map_err(InfraError::Validation)?;
    let timer = state.timer.change_session_kind(kind).await;
    state.log_info("change_session_kind", kind.as_str());
    Ok(timer_response(state, timer).await)
}

pub async fn select_task_impl(
    state: &AppState,
    task_id: Option<String>,
) -> Result<TimerStateResponse, InfraError> {
    if let Some(id) = task_id.as_deref() {
        let id = id.trim();
        let known = state.tasks.get_all().await?.iter().any(|task| task.id == id);
        if !known {
            return Err(InfraError::NotFound(format!("task {id}")));
        }
    }
    let selected = state.timer.select_task(task_id).await?;
    state.log_info(
        "select_task",
        &format!("selected={}", selected.as_deref().unwrap_or("none")),
    );
    get_timer_state_impl(state).await
}

pub async fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    state.tasks.get_all().await
}

pub async fn create_task_impl(state: &AppState, title: String) -> Result<Task, InfraError> {
    let task = state.tasks.add(NewTask::new(title)).await?;
    state.log_info("create_task", &format!("created task_id={}", task.id));
    Ok(task)
}

pub async fn update_task_impl(
    state: &AppState,
    task_id: String,
    title: Option<String>,
    completed: Option<bool>,
) -> Result<Task, InfraError> {
    let task = state
        .tasks
        .update(&task_id, TaskPatch { title, completed })
        .await?;
    state.log_info(
        "update_task",
        &format!("updated task_id={} completed={}", task.id, task.completed),
    );
    Ok(task)
}

pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    state.tasks.delete(&task_id).await?;
    if state.timer.selected_task().await.as_deref() == Some(task_id.as_str()) {
        state.timer.select_task(None).await?;
    }
    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    Ok(true)
}

pub async fn list_focus_sessions_impl(state: &AppState) -> Result<Vec<FocusSession>, InfraError> {
    state.sessions.get_all().await
}

pub fn login_url_impl(state: &AppState) -> Result<String, InfraError> {
    state.auth.login_url()
}

pub async fn get_auth_state_impl(state: &AppState) -> Result<AuthState, InfraError> {
    Ok(state.auth_state.lock().await.clone())
}

pub async fn restore_session_impl(state: &AppState) -> Result<SessionResponse, InfraError> {
    match state.auth.restore_session().await? {
        AuthState::Authenticated(session) => {
            let sub = session.user.sub.clone();
            let response = state.enter_session(session).await?;
            state.log_info("restore_session", &format!("resumed account={sub}"));
            Ok(response)
        }
        AuthState::Anonymous => {
            state.log_info("restore_session", "no stored session");
            Ok(SessionResponse {
                auth: AuthState::Anonymous,
                migration: state.migration.state().await,
            })
        }
    }
}

pub async fn sign_in_impl(state: &AppState, credential: String) -> Result<SessionResponse, InfraError> {
    if state.auth_state.lock().await.is_authenticated() {
        return Err(InfraError::Validation(
            "already signed in; sign out first".to_string(),
        ));
    }
    let session = state.auth.complete_login(&credential).await?;
    let sub = session.user.sub.clone();
    let response = state.enter_session(session).await?;
    state.log_info("sign_in", &format!("signed in account={sub}"));
    Ok(response)
}

pub async fn sign_out_impl(state: &AppState) -> Result<AuthState, InfraError> {
    state.auth.logout().await?;
    state.activate_device()?;
    *state.auth_state.lock().await = AuthState::Anonymous;
    state.migration.on_signed_out().await;
    state.log_info("sign_out", "switched to device storage");
    Ok(AuthState::Anonymous)
}

pub async fn get_migration_state_impl(state: &AppState) -> Result<MigrationState, InfraError> {
    Ok(state.migration.state().await)
}

pub async fn resolve_migration_impl(
    state: &AppState,
    decision: String,
) -> Result<MigrationOutcome, InfraError> {
    let decision = MigrationDecision::parse(&decision)?;
    let target = state.tasks.backend()?;
    if target.scope() == RecordScope::Device {
        return Err(InfraError::Validation(
            "sign in before resolving migration".to_string(),
        ));
    }
    let outcome = state.migration.resolve(decision, target).await?;
    state.log_info(
        "resolve_migration",
        &format!(
            "decision={:?} migrated={} discarded={}",
            outcome.decision, outcome.migrated, outcome.discarded
        ),
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AuthUser;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::identity_client::InMemoryIdentityClient;
    use crate::infrastructure::remote_client::InMemoryRemoteApiClient;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::fs;
    use tokio::sync::Notify;

    struct TempWorkspace {
        path: PathBuf,
        credentials: Arc<InMemoryCredentialStore>,
        identity: Arc<InMemoryIdentityClient>,
        remote: Arc<InMemoryRemoteApiClient>,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!(
                "pomdo-command-tests-{}-{}",
                std::process::id(),
                uuid::Uuid::new_v4()
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            let identity = Arc::new(InMemoryIdentityClient::default());
            identity.register("cred-1", account_user("user-1"));
            identity.register("cred-2", account_user("user-2"));
            let remote = Arc::new(InMemoryRemoteApiClient::new());
            remote.authorize("cred-1", "user-1");
            remote.authorize("cred-2", "user-2");
            Self {
                path,
                credentials: Arc::new(InMemoryCredentialStore::default()),
                identity,
                remote,
            }
        }

        fn app_state(&self) -> AppState {
            self.app_state_with_remote(self.remote.clone())
        }

        fn app_state_with_remote(&self, remote_client: Arc<dyn RemoteApiClient>) -> AppState {
            AppState::with_clients(
                self.path.clone(),
                ServiceClients {
                    credential_store: self.credentials.clone(),
                    identity_client: self.identity.clone(),
                    remote_client,
                },
            )
            .expect("initialize app state")
        }

        fn command_log(&self) -> String {
            fs::read_to_string(self.path.join("logs").join("commands.log")).unwrap_or_default()
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn account_user(sub: &str) -> AuthUser {
        let now = Utc::now().timestamp();
        AuthUser {
            sub: sub.to_string(),
            email: format!("{sub}@example.com"),
            name: sub.to_string(),
            avatar_url: None,
            iat: now - 60,
            exp: now + 3_600,
        }
    }

    /// Parks every `create` until released.
    struct GatedRemoteClient {
        inner: Arc<InMemoryRemoteApiClient>,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RemoteApiClient for GatedRemoteClient {
        async fn list(&self, credential: &str, path: &[String]) -> Result<Value, InfraError> {
            self.inner.list(credential, path).await
        }

        async fn create(&self, credential: &str, path: &[String], body: Value) -> Result<Value, InfraError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.create(credential, path, body).await
        }

        async fn update(&self, credential: &str, path: &[String], body: Value) -> Result<Value, InfraError> {
            self.inner.update(credential, path, body).await
        }

        async fn remove(&self, credential: &str, path: &[String]) -> Result<(), InfraError> {
            self.inner.remove(credential, path).await
        }
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.title.as_str()).collect()
    }

    #[tokio::test]
    async fn device_tasks_persist_across_app_restarts() {
        let workspace = TempWorkspace::new();
        {
            let state = workspace.app_state();
            create_task_impl(&state, "Write report".to_string())
                .await
                .expect("create");
        }
        let state = workspace.app_state();
        let tasks = list_tasks_impl(&state).await.expect("list");
        assert_eq!(titles(&tasks), vec!["Write report"]);
        assert!(tasks[0].owner_ref.is_none());
    }

    #[tokio::test]
    async fn blank_title_is_rejected_and_logged() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let error = create_task_impl(&state, "   ".to_string())
            .await
            .expect_err("blank title");
        let message = state.command_error("create_task", &error);
        assert!(message.contains("title"));
        assert!(list_tasks_impl(&state).await.expect("list").is_empty());

        let log = workspace.command_log();
        assert!(log.contains("\"command\":\"create_task\""));
        assert!(log.contains("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_ids() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, "Plan".to_string()).await.expect("create");

        let updated = update_task_impl(&state, task.id.clone(), None, Some(true))
            .await
            .expect("update");
        assert!(updated.completed);
        assert_eq!(updated.title, "Plan");

        assert!(delete_task_impl(&state, task.id.clone()).await.expect("delete"));
        assert!(matches!(
            delete_task_impl(&state, task.id.clone()).await,
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            update_task_impl(&state, task.id, Some("again".to_string()), None).await,
            Err(InfraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sign_in_with_device_tasks_awaits_decision_then_migrates() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        create_task_impl(&state, "A".to_string()).await.expect("A");
        create_task_impl(&state, "B".to_string()).await.expect("B");

        let response = sign_in_impl(&state, "cred-1".to_string()).await.expect("sign in");
        assert!(response.auth.is_authenticated());
        assert_eq!(response.migration, MigrationState::AwaitingDecision { pending: 2 });
        assert!(list_tasks_impl(&state).await.expect("remote list").is_empty());

        let outcome = resolve_migration_impl(&state, "migrate".to_string())
            .await
            .expect("migrate");
        assert_eq!(outcome.migrated, 2);
        assert_eq!(
            titles(&list_tasks_impl(&state).await.expect("remote list")),
            vec!["A", "B"]
        );
        assert_eq!(
            get_migration_state_impl(&state).await.expect("state"),
            MigrationState::Idle
        );

        sign_out_impl(&state).await.expect("sign out");
        assert!(list_tasks_impl(&state).await.expect("device list").is_empty());
    }

    #[tokio::test]
    async fn sign_in_with_empty_device_goes_straight_to_account() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let response = sign_in_impl(&state, "cred-1".to_string()).await.expect("sign in");
        assert_eq!(response.migration, MigrationState::Idle);

        let task = create_task_impl(&state, "Remote".to_string()).await.expect("create");
        assert_eq!(task.owner_ref.as_deref(), Some("user-1"));
        assert_eq!(workspace.remote.tasks_of("user-1").len(), 1);

        assert!(matches!(
            sign_in_impl(&state, "cred-2".to_string()).await,
            Err(InfraError::Validation(_))
        ));
        assert!(matches!(
            resolve_migration_impl(&state, "migrate".to_string()).await,
            Err(InfraError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn records_are_never_visible_across_scopes() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let device_task = create_task_impl(&state, "device".to_string()).await.expect("device");

        sign_in_impl(&state, "cred-1".to_string()).await.expect("sign in");
        resolve_migration_impl(&state, "discard".to_string())
            .await
            .expect("discard");
        assert!(matches!(
            delete_task_impl(&state, device_task.id).await,
            Err(InfraError::NotFound(_))
        ));
        let account_task = create_task_impl(&state, "account".to_string()).await.expect("account");

        sign_out_impl(&state).await.expect("sign out");
        assert!(matches!(
            update_task_impl(&state, account_task.id, None, Some(true)).await,
            Err(InfraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn device_task_created_during_overlapping_migration_survives() {
        let workspace = TempWorkspace::new();
        let gated = Arc::new(GatedRemoteClient {
            inner: workspace.remote.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let state = Arc::new(workspace.app_state_with_remote(gated.clone()));
        create_task_impl(&state, "A".to_string()).await.expect("seed");
        sign_in_impl(&state, "cred-1".to_string()).await.expect("sign in");

        let migration = {
            let state = state.clone();
            tokio::spawn(async move { resolve_migration_impl(&state, "migrate".to_string()).await })
        };
        gated.entered.notified().await;

        let sign_out = {
            let state = state.clone();
            tokio::spawn(async move { sign_out_impl(&state).await })
        };
        while get_auth_state_impl(&state).await.expect("auth").is_authenticated() {
            tokio::task::yield_now().await;
        }
        create_task_impl(&state, "B".to_string()).await.expect("device task");

        gated.release.notify_one();
        let outcome = migration.await.expect("join").expect("migrate");
        assert_eq!(outcome.migrated, 1);
        sign_out.await.expect("join").expect("sign out");

        assert_eq!(titles(&list_tasks_impl(&state).await.expect("device list")), vec!["B"]);
        let remote_titles: Vec<_> = workspace
            .remote
            .tasks_of("user-1")
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(remote_titles, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn unknown_credential_leaves_state_anonymous() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        assert!(matches!(
            sign_in_impl(&state, "nope".to_string()).await,
            Err(InfraError::Unauthorized(_))
        ));
        assert_eq!(get_auth_state_impl(&state).await.expect("auth"), AuthState::Anonymous);
        assert_eq!(workspace.credentials.load_credential().expect("load"), None);
    }

    #[tokio::test]
    async fn restore_session_resumes_keychain_account() {
        let workspace = TempWorkspace::new();
        {
            let state = workspace.app_state();
            sign_in_impl(&state, "cred-1".to_string()).await.expect("sign in");
            create_task_impl(&state, "kept remotely".to_string())
                .await
                .expect("create");
        }

        let state = workspace.app_state();
        assert_eq!(get_auth_state_impl(&state).await.expect("auth"), AuthState::Anonymous);
        let response = restore_session_impl(&state).await.expect("restore");
        assert!(response.auth.is_authenticated());
        assert_eq!(
            titles(&list_tasks_impl(&state).await.expect("list")),
            vec!["kept remotely"]
        );
    }

    #[tokio::test]
    async fn timer_commands_drive_clock_and_reject_unknown_kind() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let initial = get_timer_state_impl(&state).await.expect("state");
        assert!(!initial.timer.is_active);
        assert_eq!(initial.total_seconds, 1_500);

        let started = start_timer_impl(&state).await.expect("start");
        assert!(started.timer.is_active);
        let paused = pause_timer_impl(&state).await.expect("pause");
        assert!(!paused.timer.is_active);

        let changed = change_session_kind_impl(&state, "short_break".to_string())
            .await
            .expect("change");
        assert_eq!(changed.timer.session_kind, SessionKind::ShortBreak);
        assert_eq!(changed.timer.remaining_seconds, 300);

        assert!(matches!(
            change_session_kind_impl(&state, "nap".to_string()).await,
            Err(InfraError::Validation(_))
        ));

        let skipped = skip_session_impl(&state).await.expect("skip");
        assert_eq!(skipped.timer.session_kind, SessionKind::Work);
        let reset = reset_timer_impl(&state).await.expect("reset");
        assert_eq!(reset.timer.remaining_seconds, 1_500);
        assert!(workspace.command_log().contains("work reset to 1500s"));

        change_session_kind_impl(&state, "long_break".to_string())
            .await
            .expect("change");
        reset_timer_impl(&state).await.expect("reset break");
        assert!(workspace.command_log().contains("long_break reset to 900s"));
        state.timer().shutdown().await;
    }

    #[tokio::test]
    async fn started_session_is_recorded_with_selected_task() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let task = create_task_impl(&state, "Focus".to_string()).await.expect("create");

        let selected = select_task_impl(&state, Some(task.id.clone()))
            .await
            .expect("select");
        assert_eq!(selected.selected_task_id.as_deref(), Some(task.id.as_str()));
        assert!(matches!(
            select_task_impl(&state, Some("missing".to_string())).await,
            Err(InfraError::NotFound(_))
        ));

        start_timer_impl(&state).await.expect("start");
        state.timer().pause().await;
        state.timer().flush_recordings().await;

        let sessions = list_focus_sessions_impl(&state).await.expect("sessions");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].linked_task_ref.as_deref(), Some(task.id.as_str()));
        assert!(sessions[0].completed_at.is_none());

        delete_task_impl(&state, task.id).await.expect("delete");
        let after = get_timer_state_impl(&state).await.expect("state");
        assert_eq!(after.selected_task_id, None);
    }

    #[tokio::test]
    async fn timer_snapshot_survives_restart_inactive() {
        let workspace = TempWorkspace::new();
        {
            let state = workspace.app_state();
            change_session_kind_impl(&state, "long_break".to_string())
                .await
                .expect("change");
            start_timer_impl(&state).await.expect("start");
            state.timer().shutdown().await;
        }
        let state = workspace.app_state();
        let restored = get_timer_state_impl(&state).await.expect("state");
        assert_eq!(restored.timer.session_kind, SessionKind::LongBreak);
        assert!(!restored.timer.is_active);
    }

    #[test]
    fn login_url_uses_configured_base() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let url = login_url_impl(&state).expect("url");
        assert!(url.ends_with("/auth/google"));
        assert!(state.database_path().exists());
        assert!(state.config_dir().join("app.json").exists());
    }
}
