//! Rendering of limiter decisions into client-facing responses.

use std::fmt;

use crate::ratelimit::Decision;

/// Status code for an admitted request.
pub const STATUS_OK: u16 = 200;
/// Status code for a throttled request.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// What the client sees for one request.
///
/// A throttled response only ever reveals the wait time, never counts or
/// raw timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleResponse {
    pub status: u16,
    pub body: String,
}

impl ThrottleResponse {
    /// The response for an admitted request.
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK,
            body: "ok".to_string(),
        }
    }

    /// The response for a throttled request.
    pub fn throttled(retry_after_secs: u64) -> Self {
        Self {
            status: STATUS_TOO_MANY_REQUESTS,
            body: format!(
                "Rate limit exceeded. Try again in {}",
                pluralize(retry_after_secs, "second")
            ),
        }
    }

    pub fn from_decision(decision: &Decision) -> Self {
        if decision.admitted {
            Self::ok()
        } else {
            Self::throttled(decision.retry_after_secs.unwrap_or(1))
        }
    }
}

impl From<Decision> for ThrottleResponse {
    fn from(decision: Decision) -> Self {
        Self::from_decision(&decision)
    }
}

impl fmt::Display for ThrottleResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.body)
    }
}

fn pluralize(count: u64, singular: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}s", count, singular)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admitted_renders_ok() {
        let response = ThrottleResponse::from(Decision::admit());
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "ok");
    }

    #[test]
    fn test_rejected_renders_retry_after() {
        let response = ThrottleResponse::from(Decision::reject(3600));
        assert_eq!(response.status, 429);
        assert_eq!(response.body, "Rate limit exceeded. Try again in 3600 seconds");
    }

    #[test]
    fn test_single_second_is_singular() {
        let response = ThrottleResponse::throttled(1);
        assert_eq!(response.body, "Rate limit exceeded. Try again in 1 second");
    }

    #[test]
    fn test_display() {
        assert_eq!(ThrottleResponse::ok().to_string(), "200 ok");
        assert_eq!(
            ThrottleResponse::throttled(90).to_string(),
            "429 Rate limit exceeded. Try again in 90 seconds"
        );
    }
}
