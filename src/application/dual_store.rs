use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{RecordBackend, RecordScope, StoredRecord};
use log::{info, warn};
use std::sync::{Arc, RwLock};

struct ActiveBackend<R: StoredRecord> {
    backend: Arc<dyn RecordBackend<R>>,
    generation: u64,
}

/// Routes record operations to whichever backend the current auth state
/// selects. A switch bumps the generation; operations issued against an
/// older generation finish with `StaleBackend` instead of their result.
pub struct DualModeStore<R: StoredRecord> {
    active: RwLock<ActiveBackend<R>>,
}

impl<R: StoredRecord> DualModeStore<R> {
    pub fn new(initial: Arc<dyn RecordBackend<R>>) -> Self {
        Self {
            active: RwLock::new(ActiveBackend {
                backend: initial,
                generation: 0,
            }),
        }
    }

    pub fn switch_to(&self, backend: Arc<dyn RecordBackend<R>>) -> Result<u64, InfraError> {
        let mut active = self.write_active()?;
        let from = active.backend.scope();
        active.generation += 1;
        active.backend = backend;
        info!(
            "{} store switched {from} -> {} (generation {})",
            R::LABEL,
            active.backend.scope(),
            active.generation
        );
        Ok(active.generation)
    }

    pub fn scope(&self) -> Result<RecordScope, InfraError> {
        Ok(self.read_active()?.backend.scope())
    }

    pub fn generation(&self) -> Result<u64, InfraError> {
        Ok(self.read_active()?.generation)
    }

    pub fn backend(&self) -> Result<Arc<dyn RecordBackend<R>>, InfraError> {
        Ok(self.read_active()?.backend.clone())
    }

    pub async fn get_all(&self) -> Result<Vec<R>, InfraError> {
        let (backend, generation) = self.pin()?;
        let result = backend.get_all().await;
        self.settle(generation, "get_all", result)
    }

    pub async fn add(&self, new: R::New) -> Result<R, InfraError> {
        let (backend, generation) = self.pin()?;
        let result = backend.add(new).await;
        self.settle(generation, "add", result)
    }

    pub async fn update(&self, id: &str, patch: R::Patch) -> Result<R, InfraError> {
        let (backend, generation) = self.pin()?;
        let result = backend.update(id, patch).await;
        self.settle(generation, "update", result)
    }

    pub async fn delete(&self, id: &str) -> Result<(), InfraError> {
        let (backend, generation) = self.pin()?;
        let result = backend.delete(id).await;
        self.settle(generation, "delete", result)
    }

    pub async fn clear(&self) -> Result<(), InfraError> {
        let (backend, generation) = self.pin()?;
        let result = backend.clear().await;
        self.settle(generation, "clear", result)
    }

    fn pin(&self) -> Result<(Arc<dyn RecordBackend<R>>, u64), InfraError> {
        let active = self.read_active()?;
        Ok((active.backend.clone(), active.generation))
    }

    fn settle<T>(
        &self,
        issued_at: u64,
        operation: &str,
        result: Result<T, InfraError>,
    ) -> Result<T, InfraError> {
        let current = self.generation()?;
        if current != issued_at {
            warn!(
                "discarding {} {operation} result from generation {issued_at} (now {current})",
                R::LABEL
            );
            return Err(InfraError::StaleBackend);
        }
        result
    }

    fn read_active(&self) -> Result<std::sync::RwLockReadGuard<'_, ActiveBackend<R>>, InfraError> {
        self.active
            .read()
            .map_err(|error| InfraError::InvalidConfig(format!("backend selection lock poisoned: {error}")))
    }

    fn write_active(&self) -> Result<std::sync::RwLockWriteGuard<'_, ActiveBackend<R>>, InfraError> {
        self.active
            .write()
            .map_err(|error| InfraError::InvalidConfig(format!("backend selection lock poisoned: {error}")))
    }
}
