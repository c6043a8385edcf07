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

//! On-disk configuration: the `~/parley/config.json` settings file and the
//! JSON wizard scripts run by the `parley` binary.

pub mod schema;
pub mod script;

pub use schema::{Config, LogConfig, TimeoutDefaults};
pub use script::{
    Branch, END, OnFail, RuleKind, Script, ScriptError, ScriptQuestion, TimeoutSpec,
    ValidatorSpec,
};
