//! Run status reporting for hosted runs
//!
//! Outside a hosting environment reporting does nothing. When
//! `SCRAPESTORE_STATUS_URL` is set, the status is posted there as JSON.

use std::fmt;
use std::str::FromStr;
use crate::{Error, Result};

/// Environment variable naming the hosting environment's status endpoint
pub const STATUS_URL_VAR: &str = "SCRAPESTORE_STATUS_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ok" => Ok(Status::Ok),
            "error" => Ok(Status::Error),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

/// JSON body posted to the status endpoint
pub fn status_payload(status: Status, message: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "type": status.as_str(),
        "message": message,
    })
}

/// Report the run's status to the hosting environment, if there is one
pub fn report_status(status: Status, message: Option<&str>) -> Result<()> {
    match std::env::var(STATUS_URL_VAR) {
        Ok(url) if !url.is_empty() => post_status(&url, status, message),
        _ => {
            tracing::debug!(status = %status, "no status endpoint configured, not reporting");
            Ok(())
        }
    }
}

/// POST the status to `url` with curl
pub fn post_status(url: &str, status: Status, message: Option<&str>) -> Result<()> {
    let body = status_payload(status, message).to_string();
    let output = std::process::Command::new("curl")
        .arg("-sS")
        .arg("--fail")
        .arg("--max-time")
        .arg("10")
        .arg("-X")
        .arg("POST")
        .arg("-H")
        .arg("Content-Type: application/json")
        .arg("--data")
        .arg(&body)
        .arg(url)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Io(std::io::Error::other(format!(
            "status report to {} failed: {}",
            url,
            stderr.trim()
        ))));
    }
    tracing::info!(status = %status, "reported status");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!("ok".parse::<Status>().unwrap(), Status::Ok);
        assert_eq!("error".parse::<Status>().unwrap(), Status::Error);
        assert_eq!(Status::Error.to_string(), "error");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "hello".parse::<Status>().unwrap_err();
        assert!(matches!(err, Error::InvalidStatus(ref s) if s == "hello"));
        assert_eq!(err.kind(), "InvalidStatusError");
        assert!("OK".parse::<Status>().is_err());
    }

    #[test]
    fn test_payload() {
        assert_eq!(
            status_payload(Status::Error, Some("scraper broke")),
            serde_json::json!({"type": "error", "message": "scraper broke"})
        );
        assert_eq!(status_payload(Status::Ok, None)["message"], serde_json::Value::Null);
    }

    #[test]
    fn test_unreachable_endpoint_is_io_error() {
        // Port 9 (discard) on localhost is closed; if curl is missing entirely
        // spawning fails, which is an Io error too.
        let err = post_status("http://127.0.0.1:9/status", Status::Ok, None).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
