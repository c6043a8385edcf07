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

//! Scripted, timeout-bounded question/answer exchanges with partners.
//!
//! A `Conversation` walks one partner through a sequence of questions,
//! validating each reply and optionally bounding the wait with a timeout.
//! The `ConversationManager` keeps at most one live conversation per
//! partner and routes replies to it.

pub mod chain;
pub mod conversation;
pub mod manager;
pub mod question;
pub mod validator;

pub use chain::{ChainedQuestions, ComputeContext, ComputeStep};
pub use conversation::{Conversation, ConversationBuilder, DoneHandler};
pub use manager::ConversationManager;
pub use question::{OnTimeout, Question, QuestionBuilder};
pub use validator::{InputValidator, Rejection, TextRule, TextValidator, ValidationOutcome};

pub use parley_core::{
    Answers, ConversationContext, EndState, Error, Partner, PartnerId, Result, ScheduleError,
    TimeUnit, TimeoutAction, TimeoutHandle, TimeoutScheduler,
};
