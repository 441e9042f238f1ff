//! Output formatting for arcmigrate
//!
//! Provides text and JSON output formats for CLI output.

use anyhow::Result;
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON format - machine-readable output
    Json,
    /// Plain text format - concise output for operators
    #[default]
    Text,
}

/// Formatter that can output data in text or JSON format
#[derive(Debug, Clone)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Create a new formatter with the specified output format
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format data according to the configured output format
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::to_string_pretty(data)?;
                Ok(output)
            }
            OutputFormat::Text => {
                // Convert to JSON value first, then render as text
                let json_value = serde_json::to_value(data)?;
                Ok(render_text(&json_value))
            }
        }
    }

    /// Format and print data to stdout
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn print<T: Serialize>(&self, data: &T) -> Result<()> {
        let output = self.format(data)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{output}")?;
        Ok(())
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputFormat::default())
    }
}

/// Render a JSON value as concise text
fn render_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            // Put ID-like fields first (arc_id, participant_id, device_id)
            let mut parts = Vec::new();
            let id_keys = ["arc_id", "participant_id", "device_id"];

            for key in &id_keys {
                if let Some(val) = map.get(*key) {
                    parts.push(render_field_value(val));
                }
            }

            for (key, val) in map {
                if !id_keys.contains(&key.as_str()) {
                    match val {
                        serde_json::Value::Array(arr) if arr.is_empty() => {}
                        serde_json::Value::Null => {}
                        _ => {
                            parts.push(format!("{}:{}", key, render_field_value(val)));
                        }
                    }
                }
            }
            parts.join("  ")
        }
        serde_json::Value::Array(arr) => {
            arr.iter().map(render_text).collect::<Vec<_>>().join("\n")
        }
        _ => render_field_value(value),
    }
}

/// Render a single field value as concise text
fn render_field_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => {
            if s.contains(' ') || s.contains('\n') {
                format!("\"{}\"", s.replace('\n', "\\n"))
            } else {
                s.clone()
            }
        }
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(render_field_value).collect();
            format!("[{}]", items.join(","))
        }
        serde_json::Value::Object(map) => {
            // Compact inline for nested objects
            let parts: Vec<String> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| format!("{}:{}", k, render_field_value(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct TestData {
        arc_id: String,
        created: u32,
        clean: bool,
    }

    fn sample_data() -> TestData {
        TestData {
            arc_id: "000042".to_string(),
            created: 42,
            clean: true,
        }
    }

    #[test]
    fn test_output_format_default() {
        let format = OutputFormat::default();
        assert_eq!(format, OutputFormat::Text);
    }

    #[test]
    fn test_formatter_json_output() {
        let formatter = Formatter::new(OutputFormat::Json);
        let data = sample_data();
        let output = formatter.format(&data).expect("JSON formatting failed");

        // Verify it's valid JSON
        let parsed: serde_json::Value =
            serde_json::from_str(&output).expect("Output is not valid JSON");
        assert_eq!(parsed["arc_id"], "000042");
        assert_eq!(parsed["created"], 42);
        assert_eq!(parsed["clean"], true);
    }

    #[test]
    fn test_formatter_text_output_leads_with_ids() {
        let formatter = Formatter::new(OutputFormat::Text);
        let data = sample_data();
        let output = formatter.format(&data).expect("Text formatting failed");

        assert!(output.starts_with("000042"), "{output}");
        assert!(output.contains("created:42"));
    }

    #[test]
    fn test_text_output_skips_empty_arrays_and_nulls() {
        let value = serde_json::json!({
            "arc_id": "000001",
            "failures": [],
            "notes": null,
            "rewritten": 3,
        });
        let rendered = render_text(&value);
        assert!(!rendered.contains("failures"));
        assert!(!rendered.contains("notes"));
        assert!(rendered.contains("rewritten:3"));
    }
}
