pub mod config;
pub mod credential_store;
pub mod error;
pub mod identity_client;
pub mod record_store;
pub mod remote_client;
pub mod slot_store;
pub mod storage;
pub mod timer_snapshot;
