use crate::domain::models::SessionKind;
use crate::domain::rotation::{kind_at, next_slot, reconcile_slot, slot_for};
use serde::Serialize;

/// Emitted on the tick after the countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompleted {
    pub kind: SessionKind,
    pub duration_seconds: u32,
}

/// The single running timer. `remaining_seconds` stays within
/// `[0, duration(session_kind)]` and `kind_at(rotation_slot) == session_kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub is_active: bool,
    pub session_kind: SessionKind,
    pub remaining_seconds: u32,
    pub completed_work_count: u32,
    pub rotation_slot: u8,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            is_active: false,
            session_kind: SessionKind::Work,
            remaining_seconds: SessionKind::Work.duration_seconds(),
            completed_work_count: 0,
            rotation_slot: 0,
        }
    }
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(
        session_kind: SessionKind,
        remaining_seconds: u32,
        completed_work_count: u32,
        rotation_slot: Option<u8>,
    ) -> Self {
        Self {
            is_active: false,
            session_kind,
            remaining_seconds: remaining_seconds.min(session_kind.duration_seconds()),
            completed_work_count,
            rotation_slot: reconcile_slot(session_kind, rotation_slot, completed_work_count),
        }
    }

    pub fn total_seconds(&self) -> u32 {
        self.session_kind.duration_seconds()
    }

    pub fn progress_ratio(&self) -> f64 {
        let total = f64::from(self.total_seconds());
        let remaining = f64::from(self.remaining_seconds);
        (1.0 - remaining / total).clamp(0.0, 1.0)
    }

    pub fn start(&mut self) -> bool {
        if self.is_active {
            return false;
        }
        self.is_active = true;
        true
    }

    pub fn pause(&mut self) {
        self.is_active = false;
    }

    pub fn reset(&mut self) {
        self.is_active = false;
        self.remaining_seconds = self.total_seconds();
    }

    pub fn skip(&mut self) {
        self.enter_slot(next_slot(self.rotation_slot));
    }

    pub fn change_session_kind(&mut self, kind: SessionKind) {
        self.enter_slot(slot_for(kind, self.rotation_slot));
    }

    pub fn tick(&mut self) -> Option<SessionCompleted> {
        if !self.is_active {
            return None;
        }
        if self.remaining_seconds > 0 {
            self.remaining_seconds -= 1;
            return None;
        }

        let completed = SessionCompleted {
            kind: self.session_kind,
            duration_seconds: self.total_seconds(),
        };
        if completed.kind == SessionKind::Work {
            self.completed_work_count = self.completed_work_count.saturating_add(1);
        }
        self.enter_slot(next_slot(self.rotation_slot));
        Some(completed)
    }

    fn enter_slot(&mut self, slot: u8) {
        let kind = kind_at(slot);
        self.is_active = false;
        self.rotation_slot = slot;
        self.session_kind = kind;
        self.remaining_seconds = kind.duration_seconds();
    }
}
