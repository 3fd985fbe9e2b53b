//! Request handling: the layer that turns a client address into a response.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::clock::Clock;
use crate::ratelimit::{FixedWindowLimiter, WindowStore};
use crate::response::ThrottleResponse;

/// Applies the limiter to incoming requests.
///
/// The client identifier is trusted as supplied by the caller; it is used
/// as the limiter key verbatim.
pub struct RequestHandler<S: WindowStore> {
    /// The rate limiter instance
    limiter: Arc<FixedWindowLimiter<S>>,
    /// Time source for each request
    clock: Arc<dyn Clock>,
}

impl<S: WindowStore> RequestHandler<S> {
    /// Create a new handler with the given limiter and clock.
    pub fn new(limiter: Arc<FixedWindowLimiter<S>>, clock: Arc<dyn Clock>) -> Self {
        Self { limiter, clock }
    }

    /// Count a request from `client_ip` and render the outcome.
    #[instrument(skip(self))]
    pub async fn handle(&self, client_ip: &str) -> ThrottleResponse {
        let now = self.clock.now();
        let decision = self.limiter.check(client_ip, now).await;
        let response = ThrottleResponse::from(decision);

        if !decision.admitted {
            info!(
                status = response.status,
                retry_after_secs = ?decision.retry_after_secs,
                "Request throttled"
            );
        }

        response
    }

    pub fn limiter(&self) -> &Arc<FixedWindowLimiter<S>> {
        &self.limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::LimiterSettings;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const LIMIT: u64 = 100;

    fn frozen_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 2, 3, 10, 0, 0).unwrap()
    }

    fn create_test_handler() -> (Arc<ManualClock>, RequestHandler<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(frozen_time()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = Arc::new(FixedWindowLimiter::new(store, LimiterSettings::default()));
        (clock.clone(), RequestHandler::new(limiter, clock))
    }

    #[tokio::test]
    async fn test_requests_below_limit_are_ok() {
        let (_clock, handler) = create_test_handler();

        for _ in 0..LIMIT {
            let response = handler.handle("1.2.3.4").await;
            assert_eq!(response.status, 200);
            assert_eq!(response.body, "ok");
        }
    }

    #[tokio::test]
    async fn test_requests_above_limit_are_throttled() {
        let (_clock, handler) = create_test_handler();

        for i in 0..LIMIT * 2 {
            let response = handler.handle("1.2.3.4").await;
            if i >= LIMIT {
                assert_eq!(response.status, 429);
                assert_eq!(
                    response.body,
                    "Rate limit exceeded. Try again in 3600 seconds"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_throttle_message_counts_down() {
        let (clock, handler) = create_test_handler();

        for _ in 0..LIMIT * 2 + 1 {
            handler.handle("1.2.3.9").await;
        }

        clock.set(frozen_time() + Duration::hours(1) - Duration::seconds(90));
        let response = handler.handle("1.2.3.9").await;
        assert_eq!(response.status, 429);
        assert_eq!(response.body, "Rate limit exceeded. Try again in 90 seconds");

        clock.set(frozen_time() + Duration::hours(1) - Duration::seconds(1));
        let response = handler.handle("1.2.3.9").await;
        assert_eq!(response.body, "Rate limit exceeded. Try again in 1 second");
    }

    #[tokio::test]
    async fn test_below_limit_then_new_window() {
        let (clock, handler) = create_test_handler();

        for _ in 0..LIMIT - 1 {
            handler.handle("1.2.3.4").await;
        }

        clock.advance(Duration::minutes(61));
        let response = handler.handle("1.2.3.4").await;
        assert_eq!(response, ThrottleResponse::ok());
    }

    #[tokio::test]
    async fn test_above_limit_then_new_window() {
        let (clock, handler) = create_test_handler();

        for _ in 0..LIMIT * 2 {
            handler.handle("1.2.3.5").await;
        }

        clock.advance(Duration::minutes(61));
        let response = handler.handle("1.2.3.5").await;
        assert_eq!(response, ThrottleResponse::ok());
    }

    #[tokio::test]
    async fn test_other_client_unaffected() {
        let (_clock, handler) = create_test_handler();

        for _ in 0..LIMIT * 2 {
            handler.handle("1.2.3.4").await;
        }

        assert_eq!(handler.handle("1.2.3.4").await.status, 429);
        assert_eq!(handler.handle("1.2.3.5").await, ThrottleResponse::ok());
    }
}
