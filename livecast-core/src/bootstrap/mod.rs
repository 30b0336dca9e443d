//! Startup wiring for the livecast server
//!
//! Loads configuration, opens the database pool and builds the shared
//! services in dependency order.

pub mod config;
pub mod database;
pub mod services;

pub use config::load_config;
pub use database::init_database;
pub use services::{init_services, Services};
