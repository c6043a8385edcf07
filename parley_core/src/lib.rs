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

//! Shared vocabulary for scripted partner conversations.
//!
//! Everything a host integration and the conversation engine need to agree
//! on lives here: partner identity and delivery, the terminal record of a
//! conversation, and the abstract timer facility.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod context;
pub mod error;
pub mod timeout;

pub use context::{Answers, ConversationContext, EndState};
pub use error::{Error, Result};
pub use timeout::{
    ScheduleError, TimeUnit, TimeoutAction, TimeoutHandle, TimeoutScheduler, TimerLatch,
};

/// Stable unique identity of a conversation partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartnerId(Uuid);

impl PartnerId {
    /// Generate a fresh, time-ordered identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PartnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PartnerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The remote participant of a conversation.
///
/// Implemented by host integrations. `send` is fire-and-forget: the engine
/// assumes no acknowledgement and never waits on delivery. Implementations
/// must not call back into the conversation engine from `send`.
pub trait Partner<M>: Send + Sync {
    fn id(&self) -> PartnerId;

    fn send(&self, message: M);
}
