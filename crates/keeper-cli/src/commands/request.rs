//! Authenticated request command.

use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use keeper::{ApiRequest, AuthError, Method, SessionContext};

pub async fn request(
    ctx: &SessionContext,
    method: Method,
    path: &str,
    data: Option<&str>,
    query: Vec<(String, String)>,
    format: &OutputFormat,
) -> Result<()> {
    if ctx.initialize().await?.is_none() {
        output::print_error("Not logged in. Run 'keeper login' first", format);
        return Ok(());
    }

    let mut request = ApiRequest::new(method, path);
    for (key, value) in query {
        request = request.query(key, value);
    }
    if let Some(data) = data {
        let body: serde_json::Value =
            serde_json::from_str(data).context("--data must be valid JSON")?;
        request = request.json(body);
    }

    match ctx.authorized_request(request).await {
        Ok(response) => {
            match response.json::<serde_json::Value>() {
                Ok(body) => output::print_json(&body),
                Err(_) => println!("{}", response.text()),
            }
            Ok(())
        }
        Err(e @ AuthError::AuthorizationExpired) => {
            output::print_error(&format!("{}. Run 'keeper login'", e), format);
            Ok(())
        }
        Err(AuthError::Status { status, body }) => {
            anyhow::bail!("{} {} failed with HTTP {}: {}", method, path, status, body)
        }
        Err(e) => Err(e.into()),
    }
}
