//! Hireboard auth CLI - drives the session controller against Firebase Auth.

mod commands;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use auth_session::AuthSessionController;
use clap::{Parser, Subcommand};
use hireboard_config_and_utils::{init_logging, Config, Paths};
use identity_gateway::{FirebaseConfig, FirebaseRestGateway, SessionPersistence};
use output::OutputFormat;

/// Hireboard auth command-line interface.
#[derive(Parser)]
#[command(name = "hireboard-auth")]
#[command(about = "Sign in to Hireboard and inspect the auth session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the config value
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for session, config and logs. Defaults to ~/.hireboard
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Auth emulator origin, e.g. http://localhost:9099
    #[arg(long, global = true)]
    emulator: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an email/password account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "HIREBOARD_PASSWORD")]
        password: String,
        /// Display name applied before the account is published
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "HIREBOARD_PASSWORD")]
        password: String,
    },
    /// Sign in with Google
    Google {
        /// Use the redirect flow instead of the popup flow
        #[arg(long)]
        redirect: bool,
    },
    /// Sign out
    Logout,
    /// Send a password reset email
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Update the signed-in user's profile
    UpdateProfile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        photo_url: Option<String>,
    },
    /// Show the current session
    Status,
    /// Evaluate the route guard for a path
    Guard {
        /// Requested path, including any query string
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let mut config = Config::load(&paths)?;
    if let Some(origin) = cli.emulator {
        config.auth_emulator = Some(origin);
    }

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(&paths, level, cli.verbose)?;

    let persistence = SessionPersistence::new(paths.session_file(), paths.pending_redirect_file());
    let mut gateway = FirebaseRestGateway::new(
        FirebaseConfig {
            api_key: config.firebase_api_key.clone(),
            google_client_id: config.google_client_id.clone(),
            google_client_secret: config.google_client_secret.clone(),
            callback_port: config.oauth_callback_port,
            callback_timeout_secs: config.oauth_timeout_secs,
        },
        persistence,
    )?
    .with_browser_launcher(Arc::new(|url: &str| {
        eprintln!("Open this URL in your browser to continue:\n  {}", url);
    }));

    if let Some(origin) = config.emulator_url()? {
        let origin = origin.as_str().trim_end_matches('/');
        tracing::info!(origin = %origin, "Using auth emulator");
        gateway = gateway.with_endpoints(
            format!("{}/identitytoolkit.googleapis.com/v1", origin),
            format!("{}/securetoken.googleapis.com/v1", origin),
        );
    }

    let gateway = Arc::new(gateway);
    let controller = AuthSessionController::start(gateway.clone());
    let result = commands::run(&controller, &gateway, &config, cli.command, cli.format).await;
    controller.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_register_with_name() {
        let cli = Cli::try_parse_from([
            "hireboard-auth",
            "register",
            "--email",
            "a@b.co",
            "--password",
            "secret",
            "--name",
            "Ada",
        ])
        .unwrap();
        match cli.command {
            Commands::Register { email, name, .. } => {
                assert_eq!(email, "a@b.co");
                assert_eq!(name.as_deref(), Some("Ada"));
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_parse_guard_with_global_format() {
        let cli =
            Cli::try_parse_from(["hireboard-auth", "guard", "/jobs?x=1", "--format", "json"])
                .unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Guard { ref path } if path == "/jobs?x=1"));
    }
}
