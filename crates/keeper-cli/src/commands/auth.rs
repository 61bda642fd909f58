//! Authentication commands.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use keeper::{AuthError, SessionContext};
use std::io::{self, Write};

/// Login with username and password.
pub async fn login(ctx: &SessionContext, username: Option<String>, format: &OutputFormat) -> Result<()> {
    if let Some(role) = ctx.initialize().await? {
        output::print_success(&format!("Already logged in as {}", role), format);
        return Ok(());
    }

    let username = match username {
        Some(username) => username,
        None => {
            print!("Username: ");
            io::stdout().flush()?;
            let mut username = String::new();
            io::stdin().read_line(&mut username)?;
            username.trim().to_string()
        }
    };
    if username.is_empty() {
        output::print_error("Username is required", format);
        return Ok(());
    }

    // Prompt for password (hidden)
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    match ctx.login(&username, &password).await {
        Ok(role) => {
            let home = role.home_route().unwrap_or(keeper::LOGIN_ROUTE);
            match format {
                OutputFormat::Text => {
                    println!("Logged in as {} ({})", username, role);
                    output::print_row("Home", home);
                }
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "status": "success",
                    "username": username,
                    "role": role,
                    "home_route": home,
                })),
            }
        }
        Err(AuthError::Authentication(detail)) => {
            output::print_error(&format!("Login failed: {}", detail), format);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Logout and clear session.
pub async fn logout(ctx: &SessionContext, format: &OutputFormat) -> Result<()> {
    let had_session = ctx.force_logout(keeper::TerminationReason::UserLogout)?;
    if had_session {
        output::print_success("Logged out successfully", format);
    } else {
        output::print_success("Not logged in", format);
    }
    Ok(())
}

/// Check authentication status.
pub async fn status(ctx: &SessionContext, format: &OutputFormat) -> Result<()> {
    ctx.initialize().await?;
    let session = ctx.session();

    match format {
        OutputFormat::Text => {
            if session.authenticated {
                println!("Auth:     logged in");
                output::print_row(
                    "Role",
                    session.role.as_ref().map(|r| r.as_str()).unwrap_or("unknown"),
                );
                output::print_row("Home", session.home_route);
            } else {
                println!("Auth:     not logged in");
            }
        }
        OutputFormat::Json => output::print_json(&session),
    }
    Ok(())
}

/// Show the signed-in user's profile.
pub async fn whoami(ctx: &SessionContext, format: &OutputFormat) -> Result<()> {
    if ctx.initialize().await?.is_none() {
        output::print_error("Not logged in. Run 'keeper login' first", format);
        return Ok(());
    }

    let profile = ctx.current_user().await?;
    match format {
        OutputFormat::Text => {
            output::print_row("Username", profile.username.as_deref().unwrap_or("unknown"));
            output::print_row("Email", profile.email.as_deref().unwrap_or("-"));
            output::print_row("Role", &profile.role);
        }
        OutputFormat::Json => output::print_json(&profile),
    }
    Ok(())
}
