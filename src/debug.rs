//! Trace-file logging of MCP tool traffic.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Maximum characters of a JSON payload written per trace line.
const MAX_PAYLOAD_LEN: usize = 1000;

/// Records tool calls and results to a trace file when debug mode is on.
pub struct DebugLogger {
    enabled: bool,
    trace_file: Option<Mutex<File>>,
    trace_path: Option<PathBuf>,
}

impl DebugLogger {
    /// Create a logger; with `enabled` a fresh trace file is opened in the temp directory.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = std::env::temp_dir().join(format!("ga_report_mcp_trace_{}.log", timestamp));
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
        {
            Ok(file) => Self {
                enabled,
                trace_file: Some(Mutex::new(file)),
                trace_path: Some(path),
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to create trace file");
                Self {
                    enabled,
                    trace_file: None,
                    trace_path: None,
                }
            }
        }
    }

    fn disabled() -> Self {
        Self {
            enabled: false,
            trace_file: None,
            trace_path: None,
        }
    }

    /// Get the trace file path.
    pub fn trace_path(&self) -> Option<&PathBuf> {
        self.trace_path.as_ref()
    }

    /// Log a message to the tracing subscriber and the trace file.
    pub fn log(&self, message: &str) {
        if !self.enabled {
            return;
        }

        tracing::debug!("{}", message);

        if let Some(ref file) = self.trace_file {
            if let Ok(mut f) = file.lock() {
                let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                let _ = writeln!(f, "[{}] {}", timestamp, message);
                let _ = f.flush();
            }
        }
    }

    /// Log a tool call.
    pub fn log_tool_call(&self, tool_name: &str, params: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        self.log(&format!(
            "TOOL CALL: {} | params: {}",
            tool_name,
            truncate_json(params, MAX_PAYLOAD_LEN)
        ));
    }

    /// Log a tool result.
    pub fn log_tool_result(&self, tool_name: &str, result: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        self.log(&format!(
            "TOOL RESULT: {} | result: {}",
            tool_name,
            truncate_json(result, MAX_PAYLOAD_LEN)
        ));
    }

    /// Log a failed tool call.
    pub fn log_error(&self, tool_name: &str, error: &str) {
        if !self.enabled {
            return;
        }

        self.log(&format!("TOOL ERROR [{}]: {}", tool_name, error));
    }
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger")
            .field("enabled", &self.enabled)
            .field("trace_path", &self.trace_path)
            .finish()
    }
}

/// Truncate a JSON value to a maximum length.
fn truncate_json(value: &serde_json::Value, max_len: usize) -> String {
    let s = value.to_string();
    match s.char_indices().nth(max_len) {
        None => s,
        Some((end, _)) => format!("{}...(truncated)", &s[..end]),
    }
}
