//! HTTP client subcommands talking to a running daemon.

use anyhow::{Context, Result};
use serde_json::json;

use recap_types::ApiResponse;

/// Start the recording task now.
pub async fn run_record_start(url: String) -> Result<()> {
    post_and_report(&url, "/api/start-recording", None).await
}

/// Stop the recording task now.
pub async fn run_record_stop(url: String) -> Result<()> {
    post_and_report(&url, "/api/stop-recording", None).await
}

/// Rewrite the recording schedule on the running daemon.
pub async fn run_set_schedule(url: String, start: String, stop: String) -> Result<()> {
    let body = json!({ "start": start, "stop": stop });
    post_and_report(&url, "/api/set-recording-schedule", Some(body)).await
}

/// Print the daemon's health document.
pub async fn run_health(url: String) -> Result<()> {
    let endpoint = join_url(&url, "/health");
    let response = reqwest::Client::new()
        .get(&endpoint)
        .send()
        .await
        .context("Failed to reach recap daemon")?;
    let body: serde_json::Value = response
        .json()
        .await
        .context("Malformed daemon response")?;
    println!("{body}");
    Ok(())
}

async fn post_and_report(
    base: &str,
    path: &str,
    body: Option<serde_json::Value>,
) -> Result<()> {
    let endpoint = join_url(base, path);
    let mut request = reqwest::Client::new().post(&endpoint);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request
        .send()
        .await
        .context("Failed to reach recap daemon")?;
    let body: ApiResponse = response
        .json()
        .await
        .context("Malformed daemon response")?;

    if body.status == "success" {
        println!("{}", body.message);
        Ok(())
    } else {
        eprintln!("Error: {}", body.message);
        std::process::exit(1);
    }
}

/// Join a base URL and an absolute path without doubling the slash.
fn join_url(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://127.0.0.1:6000", "/health"),
            "http://127.0.0.1:6000/health"
        );
        assert_eq!(
            join_url("http://127.0.0.1:6000/", "/health"),
            "http://127.0.0.1:6000/health"
        );
    }
}
