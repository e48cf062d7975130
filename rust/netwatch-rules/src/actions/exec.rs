// netwatch-rules: Exec action sink
// Spawns a shell child with event environment, enforcing a kill deadline

use super::ActionOutcome;
use netwatch_event::Event;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Output capture cap per stream
const CAPTURE_LIMIT: usize = 64 * 1024;

/// Poll interval while waiting on the child
const POLL_INTERVAL: Duration = Duration::from_millis(5);

const SAFE_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Environment variables describing the event, handed to the script
pub fn event_env(event: &Event) -> Vec<(String, String)> {
    vec![
        (
            "NETWATCH_TIMESTAMP".to_string(),
            event.timestamp.to_string(),
        ),
        ("NETWATCH_SEQUENCE".to_string(), event.sequence.to_string()),
        (
            "NETWATCH_EVENT_TYPE".to_string(),
            event.event_type.code().to_string(),
        ),
        (
            "NETWATCH_MESSAGE_TYPE".to_string(),
            event.message_type.to_string(),
        ),
        (
            "NETWATCH_INTERFACE".to_string(),
            event.interface.as_str().to_string(),
        ),
        ("PATH".to_string(), SAFE_PATH.to_string()),
    ]
}

/// Run `script` via the shell; timeout 0 means no deadline
pub fn run(
    script: &str,
    event: &Event,
    timeout_ms: u64,
    capture: bool,
    started: Instant,
) -> ActionOutcome {
    let stdio = || {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut command = Command::new("/bin/sh");
    command
        .arg("-c")
        .arg(script)
        .env_clear()
        .envs(event_env(event))
        .stdin(Stdio::null())
        .stdout(stdio())
        .stderr(stdio());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!(%script, %error, "failed to spawn exec action");
            return ActionOutcome::failed(started.elapsed(), error.to_string());
        }
    };

    // Readers drain the pipes so a chatty child cannot block on a full
    // pipe while we poll for exit
    let stdout_reader = child.stdout.take().map(spawn_capture);
    let stderr_reader = child.stderr.take().map(spawn_capture);

    let deadline = (timeout_ms > 0).then(|| started + Duration::from_millis(timeout_ms));
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        // Kill and reap; the child never outlives the action
                        let _ = child.kill();
                        let _ = child.wait();
                        debug!(%script, timeout_ms, "exec action timed out");
                        return ActionOutcome::timeout(started.elapsed());
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return ActionOutcome::failed(started.elapsed(), error.to_string());
            }
        }
    };

    let mut captured = None;
    if capture {
        let mut output = String::new();
        for reader in [stdout_reader, stderr_reader].into_iter().flatten() {
            if let Ok(chunk) = reader.join() {
                output.push_str(&chunk);
            }
        }
        captured = Some(output);
    }

    let duration = started.elapsed();
    if status.success() {
        ActionOutcome {
            captured,
            ..ActionOutcome::success(duration)
        }
    } else {
        ActionOutcome {
            captured,
            ..ActionOutcome::failed(duration, format!("exit status {}", status))
        }
    }
}

/// Read up to the capture cap, then drain the rest of the stream
fn spawn_capture<R: Read + Send + 'static>(stream: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut stream = stream;
        let mut buffer = Vec::with_capacity(4096);
        let _ = stream
            .by_ref()
            .take(CAPTURE_LIMIT as u64)
            .read_to_end(&mut buffer);
        let _ = std::io::copy(&mut stream, &mut std::io::sink());
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionStatus;
    use netwatch_event::{IfName, LinkInfo, Payload};

    fn event() -> Event {
        let mut event = Event::new(
            16,
            IfName::new("eth0").unwrap(),
            Payload::Link(LinkInfo::default()),
        );
        event.sequence = 7;
        event
    }

    #[test]
    fn test_exec_success() {
        let outcome = run("exit 0", &event(), 5_000, false, Instant::now());
        assert_eq!(outcome.status, ActionStatus::Success);
    }

    #[test]
    fn test_exec_nonzero_exit_is_failure() {
        let outcome = run("exit 3", &event(), 5_000, false, Instant::now());
        assert_eq!(outcome.status, ActionStatus::Failed);
        assert!(outcome.detail.unwrap().contains("exit status"));
    }

    #[test]
    fn test_exec_timeout_kills_child() {
        let started = Instant::now();
        let outcome = run("sleep 10", &event(), 100, false, started);
        assert_eq!(outcome.status, ActionStatus::Timeout);
        // The deadline fired, not the sleep
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[test]
    fn test_exec_event_environment() {
        let outcome = run(
            "test \"$NETWATCH_INTERFACE\" = eth0 && test \"$NETWATCH_SEQUENCE\" = 7 && test \"$NETWATCH_MESSAGE_TYPE\" = 16",
            &event(),
            5_000,
            false,
            Instant::now(),
        );
        assert_eq!(outcome.status, ActionStatus::Success);
    }

    #[test]
    fn test_exec_capture_output() {
        let outcome = run("echo hello-netwatch", &event(), 5_000, true, Instant::now());
        assert_eq!(outcome.status, ActionStatus::Success);
        assert!(outcome.captured.unwrap().contains("hello-netwatch"));
    }

    #[test]
    fn test_exec_zero_timeout_waits() {
        let outcome = run("sleep 0.05; exit 0", &event(), 0, false, Instant::now());
        assert_eq!(outcome.status, ActionStatus::Success);
    }
}
