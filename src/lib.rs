//! ipthrottle - per-client fixed-window rate limiting
//!
//! The decision core lives in [`ratelimit`]: given a client identifier and
//! the current time it admits or rejects the request and, on rejection,
//! reports how long until the client's window resets. Window state is kept
//! in an injected expiring key-value store ([`ratelimit::WindowStore`]), with
//! an in-memory implementation in [`store`].

pub mod clock;
pub mod config;
pub mod error;
pub mod handler;
pub mod ratelimit;
pub mod response;
pub mod store;
