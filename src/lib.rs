pub mod api;
pub mod business;
pub mod config;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod schedule;
pub mod scraping;
pub mod textbook;
pub mod throttle;
pub mod training_scheme;
pub mod utils;

pub use gateway::Gateway;
pub use models::GatewayError;
