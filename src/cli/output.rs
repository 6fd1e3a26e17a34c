use crate::models::{NamespaceInfo, OutputFormat, RunReport};

pub trait Formatter {
    fn format_run_report(&self, report: &RunReport) -> String;
    fn format_namespace_info(&self, info: Option<&NamespaceInfo>) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_run_report(&self, report: &RunReport) -> String {
        let status = if report.cancelled {
            "[CANCELLED]"
        } else if report.is_complete() {
            "[COMPLETE]"
        } else {
            "[PARTIAL]"
        };

        let mut lines = vec![
            format!("Load Summary {status}"),
            "------------".to_string(),
            format!("Namespace:        {}", report.namespace),
            format!(
                "Files:            {} loaded, {} skipped, {} total",
                report.files_loaded, report.files_skipped, report.files_total
            ),
            format!(
                "Batches:          {} upserted, {} failed",
                report.batches_upserted, report.batches_failed
            ),
        ];
        if report.batches_dropped > 0 {
            lines.push(format!(
                "Dropped:          {} batches after cancellation",
                report.batches_dropped
            ));
        }
        lines.push(format!("Rows upserted:    {}", report.rows_upserted));
        lines.push(format!("Final offset:     {}", report.final_offset));
        if let Some(ref failure) = report.read_failure {
            lines.push(format!("Read failure:     {failure}"));
        }
        lines.push(format!("Elapsed:          {:.3}s", report.elapsed_secs));

        let mut output = lines.join("\n");
        output.push('\n');
        output
    }

    fn format_namespace_info(&self, info: Option<&NamespaceInfo>) -> String {
        match info {
            Some(info) => format!(
                "Namespace:   {}\nVectors:     {}\nDimensions:  {}\n",
                info.name, info.approx_count, info.dimensions
            ),
            None => "Namespace does not exist.\n".to_string(),
        }
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &serde_json::Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_run_report(&self, report: &RunReport) -> String {
        match serde_json::to_value(report) {
            Ok(mut value) => {
                if let Some(object) = value.as_object_mut() {
                    object.insert("complete".to_string(), report.is_complete().into());
                }
                self.render(&value)
            }
            Err(e) => self.format_error(&e.to_string()),
        }
    }

    fn format_namespace_info(&self, info: Option<&NamespaceInfo>) -> String {
        let json = match info {
            Some(info) => serde_json::json!({
                "exists": true,
                "name": info.name,
                "approx_count": info.approx_count,
                "dimensions": info.dimensions,
            }),
            None => serde_json::json!({"exists": false}),
        };
        self.render(&json)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}
