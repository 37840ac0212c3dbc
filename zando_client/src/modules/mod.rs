pub mod analysis_state;
pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod google_auth;
pub mod notifications;
pub mod progress;
pub mod session;
