use clap::Subcommand;
use waterlog_core::sync::{AuthOracle, StoredSession};

use super::CliResult;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the session used for sync
    Login {
        /// Remote user id that owns synced records
        #[arg(long)]
        user_id: String,
        /// Access token sent as the bearer credential
        #[arg(long)]
        token: Option<String>,
    },
    /// Remove the stored session
    Logout,
    /// Show who is signed in
    Status,
}

pub fn run(action: AuthAction) -> CliResult {
    let session = StoredSession::load();
    match action {
        AuthAction::Login { user_id, token } => {
            if user_id.trim().is_empty() {
                return Err("user id must not be empty".into());
            }
            session.sign_in(&user_id, token.as_deref())?;
            println!("signed in as {user_id}");
        }
        AuthAction::Logout => {
            session.sign_out()?;
            println!("signed out");
        }
        AuthAction::Status => match session.current_user_id() {
            Some(user_id) => println!(
                "signed in as {user_id} ({})",
                if session.access_token().is_some() {
                    "token stored"
                } else {
                    "no token"
                }
            ),
            None => println!("signed out"),
        },
    }
    Ok(())
}
