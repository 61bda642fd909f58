//! Interactive session hold.
//!
//! Every line read from stdin counts as a key press for the idle monitor.
//! `stay` renews the credential, `logout` ends the session, EOF or Ctrl-C
//! leaves the session saved and exits.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use keeper::{ActivitySignal, SessionContext, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

pub async fn watch(ctx: &SessionContext, format: &OutputFormat) -> Result<()> {
    let Some(role) = ctx.initialize().await? else {
        output::print_error("Not logged in. Run 'keeper login' first", format);
        return Ok(());
    };

    let mut events = ctx.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if let OutputFormat::Text = format {
        println!("Session active as {}. Type 'stay' to renew, 'logout' to sign out.", role);
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        report(&event, format);
                        if matches!(event, SessionEvent::Terminated { .. }) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed session events"),
                    Err(RecvError::Closed) => break,
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "stay" => {
                        if let Err(e) = ctx.stay_signed_in().await {
                            output::print_error(&format!("Could not extend session: {}", e), format);
                        }
                    }
                    "logout" => {
                        ctx.logout().await?;
                    }
                    _ => {
                        ctx.record_activity(ActivitySignal::KeyPress);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

fn report(event: &SessionEvent, format: &OutputFormat) {
    match format {
        OutputFormat::Json => output::print_json(event),
        OutputFormat::Text => {
            let now = chrono::Local::now().format("%H:%M:%S");
            match event {
                SessionEvent::SignedIn { role } => println!("[{}] Signed in as {}", now, role),
                SessionEvent::Renewed { role } => println!("[{}] Session renewed ({})", now, role),
                SessionEvent::IdleWarning { remaining } => println!(
                    "[{}] Inactive: signing out in {}s unless you type something or 'stay'",
                    now,
                    remaining.as_secs()
                ),
                SessionEvent::ActivityResumed => println!("[{}] Welcome back", now),
                SessionEvent::Terminated { reason } => {
                    println!("[{}] {}", now, reason.notice())
                }
            }
        }
    }
}
