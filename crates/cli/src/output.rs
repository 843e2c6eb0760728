//! Output formatting helpers for human-readable and JSON output.

use racer::Value;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Prints an optional value the way a read (`get`) or a write's previous
/// value would be reported.
pub fn print_value(format: OutputFormat, label: &str, value: Option<&Value>) {
    match format {
        OutputFormat::Json => {
            let json = value.map(Value::to_json).unwrap_or(serde_json::Value::Null);
            println!("{}", serde_json::json!({ label: json }));
        }
        OutputFormat::Human => match value {
            Some(v) => println!("{label}: {v}"),
            None => println!("{label}: <absent>"),
        },
    }
}

/// Prints a bare numeric result (increment's new value, push/insert's new
/// length).
pub fn print_number(format: OutputFormat, label: &str, value: f64) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ label: value })),
        OutputFormat::Human => println!("{label}: {value}"),
    }
}

/// Prints a bare string result (a generated document id).
pub fn print_text(format: OutputFormat, label: &str, value: &str) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ label: value })),
        OutputFormat::Human => println!("{label}: {value}"),
    }
}

/// Prints a list of removed/pushed values.
pub fn print_values(format: OutputFormat, label: &str, values: &[Value]) {
    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = values.iter().map(Value::to_json).collect();
            println!("{}", serde_json::json!({ label: json }));
        }
        OutputFormat::Human => {
            let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
            println!("{label}: [{}]", rendered.join(", "));
        }
    }
}
