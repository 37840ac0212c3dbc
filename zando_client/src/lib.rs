mod modules;

pub use modules::{
    analysis_state, app, backend, config, error, google_auth, notifications, progress, session,
};
pub use zando_protocol as protocol;

pub use modules::app::App;
pub use modules::backend::{Backend, HttpBackend};
pub use modules::config::ClientConfig;
pub use modules::error::ApiError;
