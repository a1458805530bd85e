use crate::domain::clock::TimerState;
use crate::domain::models::SessionKind;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::slot_store::{SlotStore, TIMER_NAMESPACE};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub session_kind: SessionKind,
    pub remaining_seconds: u32,
    pub completed_work_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_slot: Option<u8>,
}

impl From<&TimerState> for TimerSnapshot {
    fn from(state: &TimerState) -> Self {
        Self {
            session_kind: state.session_kind,
            remaining_seconds: state.remaining_seconds,
            completed_work_count: state.completed_work_count,
            rotation_slot: Some(state.rotation_slot),
        }
    }
}

impl TimerSnapshot {
    pub fn into_state(self) -> TimerState {
        TimerState::restore(
            self.session_kind,
            self.remaining_seconds,
            self.completed_work_count,
            self.rotation_slot,
        )
    }
}

#[derive(Clone)]
pub struct TimerSnapshotRepository {
    store: Arc<dyn SlotStore>,
}

impl TimerSnapshotRepository {
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> TimerState {
        let payload = match self.store.load(TIMER_NAMESPACE) {
            Ok(Some(payload)) => payload,
            Ok(None) => return TimerState::default(),
            Err(error) => {
                warn!("timer snapshot unreadable, using defaults: {error}");
                return TimerState::default();
            }
        };
        match serde_json::from_str::<TimerSnapshot>(&payload) {
            Ok(snapshot) => snapshot.into_state(),
            Err(error) => {
                warn!("timer snapshot corrupt, using defaults: {error}");
                TimerState::default()
            }
        }
    }

    pub fn save(&self, state: &TimerState) -> Result<(), InfraError> {
        let payload = serde_json::to_string(&TimerSnapshot::from(state))?;
        self.store.save(TIMER_NAMESPACE, &payload)
    }
}
