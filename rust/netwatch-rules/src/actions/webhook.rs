// netwatch-rules: Webhook action sink
// Sends a JSON document describing the trigger; success iff HTTP 2xx

use super::ActionOutcome;
use crate::rule::HttpMethod;
use netwatch_event::{Event, Severity};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// JSON document posted for one trigger
pub fn body(rule_name: &str, severity: Severity, event: &Event) -> serde_json::Value {
    serde_json::json!({
        "alert_name": rule_name,
        "severity": severity.as_str(),
        "timestamp": event.timestamp / 1_000_000_000,
        "event": {
            "sequence": event.sequence,
            "type": event.event_type.code(),
            "message_type": event.message_type,
            "interface": event.interface.as_str(),
        },
    })
}

/// Deliver the trigger document to `url`
pub fn run(
    url: &str,
    method: HttpMethod,
    timeout_ms: u64,
    rule_name: &str,
    severity: Severity,
    event: &Event,
    started: Instant,
) -> ActionOutcome {
    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(timeout_ms.max(1)))
        .build()
    {
        Ok(client) => client,
        Err(error) => return ActionOutcome::failed(started.elapsed(), error.to_string()),
    };

    let document = body(rule_name, severity, event);
    let request = match method {
        HttpMethod::Post => client.post(url).json(&document),
        HttpMethod::Get => client.get(url).json(&document),
    };

    match request.send() {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                debug!(%url, %status, rule = rule_name, "webhook delivered");
                ActionOutcome::success(started.elapsed())
            } else {
                warn!(%url, %status, rule = rule_name, "webhook refused");
                ActionOutcome::failed(started.elapsed(), format!("http status {}", status))
            }
        }
        Err(error) => {
            if error.is_timeout() {
                ActionOutcome::timeout(started.elapsed())
            } else {
                warn!(%url, %error, rule = rule_name, "webhook transport error");
                ActionOutcome::failed(started.elapsed(), error.to_string())
            }
        }
    }
}
