pub mod auth;
pub mod bootstrap;
pub mod commands;
pub mod dual_store;
pub mod migration;
pub mod timer_service;
