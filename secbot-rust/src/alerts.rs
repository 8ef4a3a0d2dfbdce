//! Incident dispatch to configured webhook endpoints.
//!
//! Failures here must never feed back into the alert path: callers log them
//! at WARNING and move on.

use std::collections::HashMap;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use dosa_wire::level::AlertCategory;

#[derive(Debug, Error)]
pub enum AlertSinkError {
    #[error("alert endpoint {url} returned status {status}")]
    Rejected { url: String, status: u16 },

    #[error("alert dispatch failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One incident record as posted to an endpoint.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub device: String,
    pub message: String,
    pub description: Option<String>,
    pub category: AlertCategory,
    /// Level string: a log level or security level name.
    pub level: String,
}

const COLOUR_AMBER: &str = "#FCB900";
const COLOUR_RED: &str = "#EB144C";

/// Tag map with display colours attached where the paging UI expects them.
pub fn colourise_tags(record: &AlertRecord) -> Value {
    let category: Value = if record.category == AlertCategory::Security {
        json!({ "color": COLOUR_AMBER, "value": record.category.as_str() })
    } else {
        Value::String(record.category.as_str().to_string())
    };

    let level: Value = match record.level.as_str() {
        "ERROR" | "TAMPER" | "ALERT" => {
            json!({ "color": COLOUR_AMBER, "value": record.level })
        }
        "CRITICAL" | "BREACH" | "PANIC" => {
            json!({ "color": COLOUR_RED, "value": record.level })
        }
        _ => Value::String(record.level.clone()),
    };

    json!({
        "device": record.device,
        "category": category,
        "level": level,
    })
}

/// Fan-out to every endpoint configured for a record's category.
pub struct AlertSink {
    endpoints: HashMap<String, Vec<String>>,
    client: reqwest::Client,
}

impl AlertSink {
    pub fn new(endpoints: HashMap<String, Vec<String>>) -> Self {
        Self {
            endpoints,
            client: reqwest::Client::new(),
        }
    }

    /// Post the record to each endpoint for its category. Returns the
    /// endpoints notified; an unconfigured category is a quiet no-op.
    pub async fn publish(&self, record: &AlertRecord) -> Result<Vec<String>, AlertSinkError> {
        let Some(urls) = self.endpoints.get(record.category.as_str()) else {
            debug!("no alert endpoints for category {}", record.category);
            return Ok(Vec::new());
        };

        let body = json!({
            "message": record.message,
            "description": record.description,
            "tags": colourise_tags(record),
            "status": "trigger",
        });

        let mut notified = Vec::with_capacity(urls.len());
        for url in urls {
            let resp = self.client.post(url).json(&body).send().await?;
            if resp.status().is_success() {
                notified.push(url.clone());
            } else {
                return Err(AlertSinkError::Rejected {
                    url: url.clone(),
                    status: resp.status().as_u16(),
                });
            }
        }
        Ok(notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: AlertCategory, level: &str) -> AlertRecord {
        AlertRecord {
            device: "front door".into(),
            message: "front door critical".into(),
            description: None,
            category,
            level: level.into(),
        }
    }

    #[test]
    fn security_category_and_hot_levels_are_colourised() {
        let tags = colourise_tags(&record(AlertCategory::Security, "BREACH"));
        assert_eq!(tags["category"]["color"], COLOUR_AMBER);
        assert_eq!(tags["category"]["value"], "security");
        assert_eq!(tags["level"]["color"], COLOUR_RED);
        assert_eq!(tags["level"]["value"], "BREACH");
    }

    #[test]
    fn network_category_and_mild_levels_stay_plain() {
        let tags = colourise_tags(&record(AlertCategory::Network, "WARNING"));
        assert_eq!(tags["category"], "network");
        assert_eq!(tags["level"], "WARNING");
        assert_eq!(tags["device"], "front door");
    }

    #[test]
    fn error_level_is_amber() {
        let tags = colourise_tags(&record(AlertCategory::Network, "ERROR"));
        assert_eq!(tags["level"]["color"], COLOUR_AMBER);
    }

    #[tokio::test]
    async fn unconfigured_category_is_a_no_op() {
        let sink = AlertSink::new(HashMap::new());
        let notified = sink
            .publish(&record(AlertCategory::Network, "ERROR"))
            .await
            .unwrap();
        assert!(notified.is_empty());
    }
}
