use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub trait CredentialStore: Send + Sync {
    fn save_credential(&self, credential: &str) -> Result<(), InfraError>;
    fn load_credential(&self) -> Result<Option<String>, InfraError>;
    fn delete_credential(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("pomdo.session", "default")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_credential(&self, credential: &str) -> Result<(), InfraError> {
        self.entry()?
            .set_password(credential)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_credential(&self) -> Result<Option<String>, InfraError> {
        match self.entry()?.get_password() {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }

    fn delete_credential(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credential: Mutex<Option<String>>,
}

impl InMemoryCredentialStore {
    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, InfraError> {
        self.credential
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_credential(&self, credential: &str) -> Result<(), InfraError> {
        *self.guard()? = Some(credential.to_string());
        Ok(())
    }

    fn load_credential(&self) -> Result<Option<String>, InfraError> {
        Ok(self.guard()?.clone())
    }

    fn delete_credential(&self) -> Result<(), InfraError> {
        *self.guard()? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_round_trips_and_deletes() {
        let store = InMemoryCredentialStore::default();
        assert_eq!(store.load_credential().expect("load"), None);
        store.save_credential("token-1").expect("save");
        store.save_credential("token-2").expect("overwrite");
        assert_eq!(store.load_credential().expect("load"), Some("token-2".to_string()));
        store.delete_credential().expect("delete");
        store.delete_credential().expect("delete twice");
        assert_eq!(store.load_credential().expect("load"), None);
    }
}
