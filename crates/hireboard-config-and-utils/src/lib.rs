//! Configuration, paths and logging setup shared by Hireboard binaries.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_FIREBASE_API_KEY, DEFAULT_GOOGLE_CLIENT_ID, DEFAULT_GOOGLE_CLIENT_SECRET,
    DEFAULT_LOGIN_PATH, DEFAULT_LOG_LEVEL, DEFAULT_OAUTH_CALLBACK_PORT, DEFAULT_OAUTH_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
