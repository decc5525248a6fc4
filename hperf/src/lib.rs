//! HTTP load-generation driver.
//!
//! Resolves command line options into a shared request template and a single
//! transport, then hammers the target from many concurrent workers for a
//! fixed duration, classifying every response.

pub mod bench;
pub mod cfg;
pub mod cmd;
pub mod error;
mod histogram;
pub mod logging;
pub mod outcome;
pub mod perf;
pub mod request;
pub mod tls;
pub mod transport;
