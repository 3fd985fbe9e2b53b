//! Rate limiting logic and state management.

mod limiter;
mod store;
mod window;

pub use limiter::{Decision, FailurePolicy, FixedWindowLimiter, LimiterSettings};
pub use store::{StoreError, WindowStore};
pub use window::{ceil_secs, WindowAlignment, WindowEntry};
