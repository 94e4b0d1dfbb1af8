mod bootstrap_service;
mod config;
mod config_repository;
mod event_handler;
mod in_memory_config_repository;

pub use bootstrap_service::*;
pub use config::*;
pub use config_repository::*;
pub use event_handler::*;
pub use in_memory_config_repository::*;
