//! Output formatting for human, quiet and JSON modes

use calbridge_core::domain::ReconcileSummary;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    /// Errors and warnings only
    Quiet,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// Human formatter that drops everything but problems
pub struct QuietFormatter;

impl OutputFormatter for QuietFormatter {
    fn success(&self, _message: &str) {}
    fn error(&self, message: &str) {
        HumanFormatter.error(message);
    }
    fn warn(&self, message: &str) {
        HumanFormatter.warn(message);
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Human => Box::new(HumanFormatter),
        OutputFormat::Quiet => Box::new(QuietFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// One-line rendering of a reconciliation summary, e.g.
/// `database: +2 ~1 -0, calendar: +0 ~0 -1`
pub fn summary_line(summary: &ReconcileSummary) -> String {
    let mut line = format!(
        "database: +{} ~{} -{}, calendar: +{} ~{} -{}",
        summary.created_targets,
        summary.updated_targets,
        summary.deleted_targets,
        summary.created_sources,
        summary.updated_sources,
        summary.deleted_sources,
    );
    if summary.adopted > 0 {
        line.push_str(&format!(", adopted {}", summary.adopted));
    }
    if summary.failed_deletes > 0 {
        line.push_str(&format!(", {} failed deletes", summary.failed_deletes));
    }
    line
}
