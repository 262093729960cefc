// Re-export modules
pub mod api;
pub mod biometrics;
pub mod config;
pub mod models;
pub mod relay;
pub mod utils;
pub mod verification;
