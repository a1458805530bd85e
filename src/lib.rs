pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    change_session_kind_impl, create_task_impl, delete_task_impl, get_auth_state_impl,
    get_migration_state_impl, get_timer_state_impl, list_focus_sessions_impl, list_tasks_impl,
    login_url_impl, pause_timer_impl, reset_timer_impl, resolve_migration_impl,
    restore_session_impl, select_task_impl, sign_in_impl, sign_out_impl, skip_session_impl,
    start_timer_impl, update_task_impl, AppState, ServiceClients, SessionResponse,
    TimerStateResponse,
};
pub use domain::clock::{SessionCompleted, TimerState};
pub use domain::models::{FocusSession, SessionKind, Task};
pub use infrastructure::error::InfraError;

use std::path::PathBuf;

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

pub async fn launch(workspace_root: Option<PathBuf>) -> Result<AppState, InfraError> {
    init_logging();
    let workspace_root = match workspace_root {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    let state = AppState::new(workspace_root)?;
    match restore_session_impl(&state).await {
        Ok(session) => log::info!(
            "startup complete (authenticated={})",
            session.auth.is_authenticated()
        ),
        Err(error) => {
            log::warn!("session restore failed, continuing on device storage: {error}");
            state.command_error("restore_session", &error);
        }
    }
    Ok(state)
}
