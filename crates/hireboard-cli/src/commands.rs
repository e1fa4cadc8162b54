//! Subcommand handlers.

use std::time::Duration;

use auth_session::{
    AuthError, AuthSessionController, GoogleSignInStrategy, OperationOutcome, ProfilePatch,
    Session,
};
use hireboard_config_and_utils::Config;
use identity_gateway::{FirebaseRestGateway, IdentityGateway};
use tokio::sync::watch;
use tracing::debug;

use crate::output::{print_decision, print_outcome, print_session, OutputFormat};
use crate::Commands;

type Controller = AuthSessionController<FirebaseRestGateway>;
type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub async fn run(
    controller: &Controller,
    gateway: &FirebaseRestGateway,
    config: &Config,
    command: Commands,
    format: OutputFormat,
) -> CommandResult {
    match command {
        Commands::Register {
            email,
            password,
            name,
        } => {
            let outcome = controller
                .register(&email, &password, name.as_deref())
                .await;
            report("register", outcome, format)
        }
        Commands::Login { email, password } => {
            let outcome = controller.login(&email, &password).await;
            report("login", outcome, format)
        }
        Commands::Google { redirect } => {
            let strategy = GoogleSignInStrategy::from_redirect_flag(redirect);
            let redirect_results = gateway.redirect_results();
            let outcome = controller.sign_in_with_google(strategy).await;
            let deferred = outcome.deferred;
            report("google", outcome, format)?;
            if deferred {
                let timeout = Duration::from_secs(config.oauth_timeout_secs);
                match wait_for_sign_in(controller, gateway, redirect_results, timeout).await {
                    RedirectWait::SignedIn(session) => print_session(&session, format),
                    RedirectWait::Failed(outcome) => report("google", outcome, format)?,
                    RedirectWait::TimedOut => eprintln!(
                        "Sign-in not finished yet. Run `hireboard-auth status` once you complete it in the browser."
                    ),
                }
            }
            Ok(())
        }
        Commands::Logout => {
            let outcome = controller.logout().await;
            report("logout", outcome, format)
        }
        Commands::ResetPassword { email } => {
            let outcome = controller.reset_password(&email).await;
            report("reset-password", outcome, format)
        }
        Commands::UpdateProfile { name, photo_url } => {
            let patch = ProfilePatch {
                display_name: name,
                photo_url,
            };
            if patch.is_empty() {
                return Err("Nothing to update: pass --name or --photo-url".into());
            }
            let outcome = controller.update_profile(patch).await;
            report("update-profile", outcome, format)
        }
        Commands::Status => {
            if let Some(outcome) = controller.wait_redirect_check().await {
                if outcome.identity.is_some() || outcome.error_message.is_some() {
                    print_outcome("redirect", &outcome, format);
                }
            }
            let session = controller.session().wait_until_settled().await;
            print_session(&session, format);
            Ok(())
        }
        Commands::Guard { path } => {
            let decision = controller
                .route_guard(config.login_path.clone())
                .resolve(&path)
                .await;
            print_decision(&path, &decision, format);
            Ok(())
        }
    }
}

/// Print the outcome and turn a reported failure into an error exit.
fn report(operation: &str, outcome: OperationOutcome, format: OutputFormat) -> CommandResult {
    let reported_failure = !outcome.success && !outcome.is_silent_failure();
    if !reported_failure || matches!(format, OutputFormat::Json) {
        print_outcome(operation, &outcome, format);
    }
    if !reported_failure {
        return Ok(());
    }
    let message = outcome
        .error_message
        .unwrap_or_else(|| format!("{} failed", operation));
    Err(message.into())
}

/// How a deferred Google sign-in ended from the CLI's point of view.
enum RedirectWait {
    SignedIn(Session),
    Failed(OperationOutcome),
    TimedOut,
}

/// Wait for a redirect sign-in to land on the session stream.
///
/// A failed sign-in never reaches the stream. Each tick of
/// `redirect_results` means a result was recorded, so the record is read
/// back and a failure ends the wait.
async fn wait_for_sign_in<G: IdentityGateway>(
    controller: &AuthSessionController<G>,
    gateway: &G,
    mut redirect_results: watch::Receiver<u64>,
    timeout: Duration,
) -> RedirectWait {
    let mut reader = controller.session();
    let mut results_open = true;
    let wait = async {
        loop {
            tokio::select! {
                session = reader.changed() => match session {
                    Some(session) if session.is_authenticated() => {
                        return RedirectWait::SignedIn(session);
                    }
                    Some(_) => {}
                    None => return RedirectWait::TimedOut,
                },
                changed = redirect_results.changed(), if results_open => {
                    if changed.is_err() {
                        results_open = false;
                        continue;
                    }
                    match gateway.pending_redirect_result().await {
                        Err(e) => {
                            let outcome =
                                OperationOutcome::failed(AuthError::from(e), "Google sign-in failed");
                            return RedirectWait::Failed(outcome);
                        }
                        // Success is published on the session stream.
                        Ok(_) => {}
                    }
                }
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout_secs = timeout.as_secs(), "Gave up waiting for redirect sign-in");
            RedirectWait::TimedOut
        }
    }
}
