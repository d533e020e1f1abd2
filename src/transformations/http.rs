// src/transformations/http.rs
use bevy::log::warn;
use reqwest::blocking::{Client, Response};
use std::time::Duration;

use super::TransformationError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Attempt count and initial delay for a service call; the delay doubles after
/// every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Backoff {
    pub const fn new(attempts: u32, initial_delay: Duration) -> Self {
        Backoff { attempts, initial_delay }
    }
}

pub fn client() -> Result<Client, TransformationError> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Runs `call` until it succeeds, fails with something other than an
/// external-service error, or runs out of attempts. Blocks the calling thread
/// between attempts.
pub fn with_backoff<T, F>(label: &str, backoff: Backoff, mut call: F) -> Result<T, TransformationError>
where
    F: FnMut() -> Result<T, TransformationError>,
{
    let attempts = backoff.attempts.max(1);
    let mut delay = backoff.initial_delay;
    let mut attempt = 1;
    loop {
        match call() {
            Err(TransformationError::ExternalService(reason)) if attempt < attempts => {
                warn!("[{}] Retry {}/{} after error: {}", label, attempt, attempts, reason);
                std::thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Turns non-2xx responses into `ExternalService` errors carrying the body.
pub fn check_status(label: &str, response: Response) -> Result<Response, TransformationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(TransformationError::ExternalService(format!(
        "{} returned HTTP {}: {}",
        label,
        status,
        truncate(&body, 300)
    )))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Backoff = Backoff::new(3, Duration::from_millis(0));

    #[test]
    fn retries_only_external_failures() {
        let mut calls = 0;
        let result: Result<u32, _> = with_backoff("test", FAST, || {
            calls += 1;
            if calls < 3 {
                Err(TransformationError::ExternalService("503".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));

        let mut calls = 0;
        let result: Result<(), _> = with_backoff("test", FAST, || {
            calls += 1;
            Err(TransformationError::Validation("bad json".into()))
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(TransformationError::Validation(_))));
    }

    #[test]
    fn gives_up_after_last_attempt() {
        let mut calls = 0;
        let result: Result<(), _> = with_backoff("test", FAST, || {
            calls += 1;
            Err(TransformationError::ExternalService("down".into()))
        });
        assert_eq!(calls, 3);
        assert_eq!(result, Err(TransformationError::ExternalService("down".into())));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
    }
}
