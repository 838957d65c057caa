//! Where command output goes
//!
//! Results (rows, variables, JSON envelopes) always go to stdout. Progress
//! and confirmation lines are chatter: they are dropped in JSON mode and when
//! `SCRAPESTORE_QUIET` is set, so scripts can pipe results cleanly.

use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

fn quiet_from(value: Option<&str>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// `SCRAPESTORE_QUIET=1` silences chatter, never results or warnings
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| quiet_from(std::env::var("SCRAPESTORE_QUIET").ok().as_deref()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_flags(json: bool) -> Self {
        if json { OutputMode::Json } else { OutputMode::Human }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, OutputMode::Human)
    }
}

/// `{"ok": true, "command": ..., "data": ...}`
pub fn envelope(command: &str, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "command": command,
        "data": data,
    })
}

/// Print the JSON envelope for a successful command; no-op in human mode
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode.is_human() {
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&envelope(command, data))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_values() {
        assert!(quiet_from(Some("1")));
        assert!(quiet_from(Some("TRUE")));
        assert!(!quiet_from(Some("0")));
        assert!(!quiet_from(None));
    }

    #[test]
    fn test_output_mode_from_flags() {
        assert_eq!(OutputMode::from_flags(true), OutputMode::Json);
        assert!(!OutputMode::Json.is_human());
        assert!(OutputMode::from_flags(false).is_human());
    }

    #[test]
    fn test_envelope() {
        let data = serde_json::json!({"table": "swdata", "records": 2});
        assert_eq!(
            envelope("save", data.clone()),
            serde_json::json!({"ok": true, "command": "save", "data": data})
        );
    }
}
