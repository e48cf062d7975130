// netwatch-rules: Log action sink
// One formatted line per trigger, append or truncate per rule

use super::ActionOutcome;
use netwatch_event::{Event, Severity};
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Instant;
use tracing::warn;

/// Write one trigger line to `path`
///
/// Line format: local ISO-8601 time, severity, rule name, event summary.
pub fn run(
    path: &str,
    append: bool,
    rule_name: &str,
    severity: Severity,
    event: &Event,
    started: Instant,
) -> ActionOutcome {
    let line = format_line(rule_name, severity, event);

    let result = OpenOptions::new()
        .create(true)
        .append(append)
        .write(true)
        .truncate(!append)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));

    match result {
        Ok(()) => ActionOutcome::success(started.elapsed()),
        Err(error) => {
            warn!(%path, %error, "log action failed");
            ActionOutcome::failed(started.elapsed(), error.to_string())
        }
    }
}

fn format_line(rule_name: &str, severity: Severity, event: &Event) -> String {
    format!(
        "{} [{}] {} {}\n",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%z"),
        severity,
        rule_name,
        event.summary()
    )
}
