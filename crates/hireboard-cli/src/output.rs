//! Output formatting for the CLI.

use auth_session::{GuardDecision, OperationOutcome, Session};
use clap::ValueEnum;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

/// Print an operation outcome.
pub fn print_outcome(operation: &str, outcome: &OperationOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Text => {
            if outcome.deferred {
                println!("{}: started, completes in the browser", operation);
            } else if outcome.success {
                match &outcome.identity {
                    Some(identity) => println!("{}: ok ({})", operation, describe(identity)),
                    None => println!("{}: ok", operation),
                }
            } else if let Some(message) = &outcome.error_message {
                eprintln!("{}: {}", operation, message);
            } else {
                eprintln!("{}: cancelled", operation);
            }
        }
    }
}

/// Print the current session.
pub fn print_session(session: &Session, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(session),
        OutputFormat::Text => match (&session.identity, session.settled) {
            (_, false) => println!("Session: unknown (still loading)"),
            (Some(identity), true) => println!("Signed in as {}", describe(identity)),
            (None, true) => println!("Signed out"),
        },
    }
}

/// Print a route guard decision.
pub fn print_decision(path: &str, decision: &GuardDecision, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(decision),
        OutputFormat::Text => match decision {
            GuardDecision::Loading => println!("{}: loading", path),
            GuardDecision::Render => println!("{}: render", path),
            GuardDecision::RedirectToLogin { to, return_to, .. } => {
                println!("{}: redirect to {} (return to {})", path, to, return_to)
            }
        },
    }
}

fn describe(identity: &auth_session::Identity) -> String {
    match (&identity.display_name, &identity.email) {
        (Some(name), Some(email)) => format!("{} <{}>", name, email),
        (None, Some(email)) => email.clone(),
        (Some(name), None) => name.clone(),
        (None, None) => identity.uid.clone(),
    }
}
