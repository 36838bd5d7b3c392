// Public API for integration tests and potential library usage

pub mod api;
pub mod durable;
pub mod error;
pub mod game;
pub mod keys;
pub mod lobby;
pub mod quiz;
pub mod store;
pub mod sweeper;
pub mod types;
