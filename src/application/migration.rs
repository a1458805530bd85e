use crate::domain::models::{NewTask, Task};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{RecordBackend, RecordScope};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum MigrationState {
    Idle,
    AwaitingDecision { pending: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDecision {
    Migrate,
    Discard,
}

impl MigrationDecision {
    pub fn parse(value: &str) -> Result<Self, InfraError> {
        match value.trim() {
            "migrate" => Ok(Self::Migrate),
            "discard" | "skip" => Ok(Self::Discard),
            other => Err(InfraError::Validation(format!("unknown migration decision: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub decision: MigrationDecision,
    pub migrated: usize,
    pub discarded: usize,
}

#[derive(Debug)]
struct CoordinatorState {
    phase: MigrationState,
    /// Cleared once a login has been evaluated; re-armed by sign-out.
    armed: bool,
}

pub struct MigrationCoordinator {
    local_tasks: Arc<dyn RecordBackend<Task>>,
    state: Mutex<CoordinatorState>,
}

impl MigrationCoordinator {
    pub fn new(local_tasks: Arc<dyn RecordBackend<Task>>) -> Self {
        Self {
            local_tasks,
            state: Mutex::new(CoordinatorState {
                phase: MigrationState::Idle,
                armed: true,
            }),
        }
    }

    pub async fn state(&self) -> MigrationState {
        self.state.lock().await.phase
    }

    pub async fn on_authenticated(&self) -> Result<MigrationState, InfraError> {
        let mut state = self.state.lock().await;
        if !state.armed {
            return Ok(state.phase);
        }
        state.armed = false;

        let pending = self.local_tasks.get_all().await?.len();
        state.phase = if pending == 0 {
            MigrationState::Idle
        } else {
            info!("{pending} local task(s) awaiting migration decision");
            MigrationState::AwaitingDecision { pending }
        };
        Ok(state.phase)
    }

    pub async fn on_signed_out(&self) {
        let mut state = self.state.lock().await;
        state.phase = MigrationState::Idle;
        state.armed = true;
    }

    pub async fn resolve(
        &self,
        decision: MigrationDecision,
        remote_tasks: Arc<dyn RecordBackend<Task>>,
    ) -> Result<MigrationOutcome, InfraError> {
        let mut state = self.state.lock().await;
        if !matches!(state.phase, MigrationState::AwaitingDecision { .. }) {
            return Err(InfraError::Validation("no migration decision is pending".to_string()));
        }

        match decision {
            MigrationDecision::Discard => {
                let discarded = self.discard_listed().await?;
                state.phase = MigrationState::Idle;
                info!("discarded {discarded} local task(s)");
                Ok(MigrationOutcome {
                    decision,
                    migrated: 0,
                    discarded,
                })
            }
            MigrationDecision::Migrate => {
                if remote_tasks.scope() == RecordScope::Device {
                    return Err(InfraError::Validation(
                        "migration target must be an account backend".to_string(),
                    ));
                }
                let result = self.migrate_all(remote_tasks.as_ref()).await;
                match &result {
                    Ok(_) => state.phase = MigrationState::Idle,
                    Err(InfraError::Migration { remaining, .. }) => {
                        state.phase = MigrationState::AwaitingDecision {
                            pending: *remaining,
                        };
                    }
                    Err(_) => {}
                }
                result
            }
        }
    }

    /// Removes only the tasks listed here; anything created on the device
    /// meanwhile survives.
    async fn discard_listed(&self) -> Result<usize, InfraError> {
        let tasks = self.local_tasks.get_all().await?;
        let mut discarded = 0;
        for task in &tasks {
            match self.local_tasks.delete(&task.id).await {
                Ok(()) => discarded += 1,
                Err(InfraError::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(discarded)
    }

    /// Sequential, in original order. Each task leaves the device as soon as
    /// the remote copy exists, so a later retry only sends the remainder.
    async fn migrate_all(&self, remote: &dyn RecordBackend<Task>) -> Result<MigrationOutcome, InfraError> {
        let tasks = self.local_tasks.get_all().await?;
        let total = tasks.len();

        for (migrated, task) in tasks.iter().enumerate() {
            if let Err(error) = remote.add(NewTask::new(task.title.clone())).await {
                warn!("migration stopped at {migrated}/{total}: {error}");
                return Err(InfraError::Migration {
                    migrated,
                    remaining: total - migrated,
                    message: error.to_string(),
                });
            }
            if let Err(error) = self.local_tasks.delete(&task.id).await {
                warn!("migrated task {} could not be removed locally: {error}", task.id);
                return Err(InfraError::Migration {
                    migrated: migrated + 1,
                    remaining: total - migrated - 1,
                    message: error.to_string(),
                });
            }
        }

        info!("migrated {total} local task(s)");
        Ok(MigrationOutcome {
            decision: MigrationDecision::Migrate,
            migrated: total,
            discarded: 0,
        })
    }
}
