use crate::application::dual_store::DualModeStore;
use crate::domain::clock::{SessionCompleted, TimerState};
use crate::domain::models::{FocusSession, FocusSessionPatch, NewFocusSession, SessionKind};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::timer_snapshot::TimerSnapshotRepository;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

const COMPLETION_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
struct TrackedSession {
    token: u64,
    record_id: Option<String>,
}

#[derive(Debug, Default)]
struct ClockRuntime {
    state: TimerState,
    selected_task: Option<String>,
    tracked: Option<TrackedSession>,
    /// Expiries that happened before the session's record came back.
    pending_completions: HashMap<u64, DateTime<Utc>>,
    next_token: u64,
}

#[derive(Clone)]
pub struct TimerService {
    runtime: Arc<Mutex<ClockRuntime>>,
    snapshots: TimerSnapshotRepository,
    sessions: Arc<DualModeStore<FocusSession>>,
    completed_tx: broadcast::Sender<SessionCompleted>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    recordings: Arc<Mutex<Vec<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl TimerService {
    pub fn new(snapshots: TimerSnapshotRepository, sessions: Arc<DualModeStore<FocusSession>>) -> Self {
        let state = snapshots.load();
        let (completed_tx, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        Self {
            runtime: Arc::new(Mutex::new(ClockRuntime {
                state,
                ..ClockRuntime::default()
            })),
            snapshots,
            sessions,
            completed_tx,
            ticker: Arc::new(Mutex::new(None)),
            recordings: Arc::new(Mutex::new(Vec::new())),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionCompleted> {
        self.completed_tx.subscribe()
    }

    pub async fn state(&self) -> TimerState {
        self.runtime.lock().await.state.clone()
    }

    pub async fn selected_task(&self) -> Option<String> {
        self.runtime.lock().await.selected_task.clone()
    }

    pub async fn start(&self) -> TimerState {
        let (state, recording) = {
            let mut runtime = self.runtime.lock().await;
            if !runtime.state.start() {
                return runtime.state.clone();
            }
            let recording = if runtime.tracked.is_none() {
                let token = runtime.next_token;
                runtime.next_token += 1;
                runtime.tracked = Some(TrackedSession {
                    token,
                    record_id: None,
                });
                let kind = runtime.state.session_kind;
                Some((
                    token,
                    NewFocusSession {
                        linked_task_ref: runtime.selected_task.clone(),
                        kind,
                        started_at: Utc::now(),
                        duration_seconds: kind.duration_seconds(),
                    },
                ))
            } else {
                None
            };
            self.persist(&runtime.state);
            (runtime.state.clone(), recording)
        };

        if let Some((token, new)) = recording {
            let service = self.clone();
            self.track_recording(tokio::spawn(async move {
                service.record_start(token, new).await;
            }))
            .await;
        }
        self.spawn_ticker().await;
        state
    }

    pub async fn pause(&self) -> TimerState {
        self.cancel_ticker().await;
        let mut runtime = self.runtime.lock().await;
        runtime.state.pause();
        self.persist(&runtime.state);
        runtime.state.clone()
    }

    pub async fn reset(&self) -> TimerState {
        self.interrupt(TimerState::reset).await
    }

    pub async fn skip(&self) -> TimerState {
        self.interrupt(TimerState::skip).await
    }

    pub async fn change_session_kind(&self, kind: SessionKind) -> TimerState {
        self.interrupt(|state| state.change_session_kind(kind)).await
    }

    pub async fn select_task(&self, task_id: Option<String>) -> Result<Option<String>, InfraError> {
        let task_id = match task_id.map(|id| id.trim().to_string()) {
            Some(id) if id.is_empty() => {
                return Err(InfraError::Validation("task id must not be empty".to_string()));
            }
            other => other,
        };
        let mut runtime = self.runtime.lock().await;
        runtime.selected_task = task_id.clone();
        Ok(task_id)
    }

    pub async fn flush_recordings(&self) {
        let handles: Vec<_> = self.recordings.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(error) = handle.await {
                warn!("focus session recording task failed: {error}");
            }
        }
    }

    pub async fn shutdown(&self) {
        self.cancel_ticker().await;
        self.flush_recordings().await;
        let runtime = self.runtime.lock().await;
        self.persist(&runtime.state);
    }

    pub async fn tick(&self) -> Option<SessionCompleted> {
        let (completed, finished) = {
            let mut runtime = self.runtime.lock().await;
            let was_active = runtime.state.is_active;
            let completed = runtime.state.tick();
            if was_active {
                self.persist(&runtime.state);
            }
            let finished = match completed {
                Some(_) => Self::finish_tracked(&mut runtime, Utc::now()),
                None => None,
            };
            (completed, finished)
        };

        if let Some(event) = completed {
            info!("{} session completed", event.kind.as_str());
            if let Some((record_id, completed_at)) = finished {
                let service = self.clone();
                self.track_recording(tokio::spawn(async move {
                    service.record_completion(&record_id, completed_at).await;
                }))
                .await;
            }
            if self.completed_tx.send(event).is_err() {
                debug!("no subscribers for session completion");
            }
        }
        completed
    }

    async fn interrupt<F>(&self, operation: F) -> TimerState
    where
        F: FnOnce(&mut TimerState),
    {
        self.cancel_ticker().await;
        let mut runtime = self.runtime.lock().await;
        operation(&mut runtime.state);
        if let Some(dropped) = runtime.tracked.take() {
            debug!("dropping tracked focus session (token {})", dropped.token);
        }
        self.persist(&runtime.state);
        runtime.state.clone()
    }

    /// Returns the record to complete now, or parks the completion until the
    /// record's create call returns.
    fn finish_tracked(runtime: &mut ClockRuntime, at: DateTime<Utc>) -> Option<(String, DateTime<Utc>)> {
        let tracked = runtime.tracked.take()?;
        match tracked.record_id {
            Some(record_id) => Some((record_id, at)),
            None => {
                runtime.pending_completions.insert(tracked.token, at);
                None
            }
        }
    }

    async fn record_start(&self, token: u64, new: NewFocusSession) {
        let created = match self.sessions.add(new).await {
            Ok(session) => session,
            Err(error) => {
                warn!("failed to record focus session start: {error}");
                let mut runtime = self.runtime.lock().await;
                runtime.pending_completions.remove(&token);
                if runtime.tracked.as_ref().is_some_and(|tracked| tracked.token == token) {
                    runtime.tracked = None;
                }
                return;
            }
        };

        let completion = {
            let mut runtime = self.runtime.lock().await;
            match runtime.tracked.as_mut() {
                Some(tracked) if tracked.token == token => {
                    tracked.record_id = Some(created.id.clone());
                    None
                }
                _ => runtime.pending_completions.remove(&token),
            }
        };
        if let Some(completed_at) = completion {
            self.record_completion(&created.id, completed_at).await;
        }
    }

    async fn record_completion(&self, record_id: &str, completed_at: DateTime<Utc>) {
        if let Err(error) = self
            .sessions
            .update(record_id, FocusSessionPatch::completed(completed_at))
            .await
        {
            warn!("failed to record focus session {record_id} completion: {error}");
        }
    }

    async fn track_recording(&self, handle: JoinHandle<()>) {
        let mut recordings = self.recordings.lock().await;
        recordings.retain(|handle| !handle.is_finished());
        recordings.push(handle);
    }

    fn persist(&self, state: &TimerState) {
        if let Err(error) = self.snapshots.save(state) {
            warn!("failed to persist timer snapshot: {error}");
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let service = self.clone();
        let period = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                service.tick().await;
                if !service.runtime.lock().await.state.is_active {
                    break;
                }
            }
        });
        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}
