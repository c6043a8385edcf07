#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Timer facilities backing `parley_core::TimeoutScheduler`.
//!
//! `TokioScheduler` runs timeouts on a tokio runtime. `ManualScheduler`
//! keeps a virtual clock that only moves when told to, for tests and
//! turn-based hosts.

pub mod manual;
pub mod runtime;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;
