//! Service health visualization
//!
//! Reshapes the ITSI service listing into a Chart.js bar chart embedded in a
//! self-contained HTML document. The transform is deterministic: input order is
//! preserved and missing fields default rather than fail.

use serde_json::{json, Value};

use crate::errors::AppError;

pub const LOW_TIER_COLOR: &str = "rgba(255, 99, 132, 0.8)";
pub const MEDIUM_TIER_COLOR: &str = "rgba(255, 206, 86, 0.8)";
pub const HIGH_TIER_COLOR: &str = "rgba(75, 192, 192, 0.8)";

pub const NO_DATA_DOCUMENT: &str =
    "<html><body><h1>No Data</h1><p>Could not retrieve service health data.</p></body></html>";

#[derive(Debug, Clone, PartialEq)]
pub struct HealthRow {
    pub title: String,
    pub score: f64,
}

/// Extracts one row per service record, preserving response order.
///
/// A record missing `title` or `health_score` is merely incomplete and gets
/// defaults; a listing that is not an array at all is structurally wrong and
/// fails the operation.
pub fn extract_health_rows(services: &Value) -> Result<Vec<HealthRow>, AppError> {
    let records = services
        .as_array()
        .ok_or_else(|| AppError::transform("service listing is not an array"))?;

    Ok(records
        .iter()
        .map(|record| HealthRow {
            title: record
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("N/A")
                .to_string(),
            score: extract_score(record.get("health_score")),
        })
        .collect())
}

// Splunk emits health_score as a number or a numeric string depending on the
// endpoint version.
fn extract_score(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Tier thresholds are inclusive on the lower tier: 60 is low, 80 is medium.
pub fn tier_color(score: f64) -> &'static str {
    if score <= 60.0 {
        LOW_TIER_COLOR
    } else if score <= 80.0 {
        MEDIUM_TIER_COLOR
    } else {
        HIGH_TIER_COLOR
    }
}

pub fn render_health_chart(rows: &[HealthRow]) -> String {
    if rows.is_empty() {
        return NO_DATA_DOCUMENT.to_string();
    }

    let labels: Vec<&str> = rows.iter().map(|row| row.title.as_str()).collect();
    let scores: Vec<f64> = rows.iter().map(|row| row.score).collect();
    let colors: Vec<&str> = rows.iter().map(|row| tier_color(row.score)).collect();

    let chart_config = json!({
        "type": "bar",
        "data": {
            "labels": labels,
            "datasets": [{
                "label": "Health Score",
                "data": scores,
                "backgroundColor": colors,
            }]
        },
        "options": {
            "responsive": true,
            "indexAxis": "y",
            "scales": {"x": {"beginAtZero": true, "max": 100}},
            "plugins": {
                "legend": {"display": false},
                "title": {"display": true, "text": "Health Score (0-100)"}
            }
        }
    });

    format!(
        concat!(
            "<!DOCTYPE html><html><head><title>ITSI Service Health</title>",
            "<script src=\"https://cdn.jsdelivr.net/npm/chart.js\"></script>",
            "<style>body{{font-family:sans-serif;display:flex;justify-content:center;",
            "align-items:center;height:100vh;margin:0;}}",
            ".chart-container{{width:90%;max-width:1000px;padding:20px;background:white;",
            "border-radius:10px;box-shadow:0 4px 12px rgba(0,0,0,0.1);}}",
            "h1{{text-align:center;}}</style></head>",
            "<body><div class=\"chart-container\"><h1>ITSI Service Health Overview</h1>",
            "<canvas id=\"healthChart\"></canvas></div>",
            "<script>new Chart(document.getElementById('healthChart').getContext('2d'), ",
            "{config});</script></body></html>"
        ),
        config = chart_config
    )
}

/// Minimal valid document for the failure path, so a caller that always
/// renders the return value never receives something unrenderable.
pub fn render_error_document(message: &str) -> String {
    format!(
        "<html><body><h1>Error</h1><p>Could not generate visualization: {message}</p></body></html>"
    )
}
