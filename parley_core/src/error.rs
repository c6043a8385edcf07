use crate::PartnerId;
use crate::timeout::ScheduleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Partner {0} already has an active conversation")]
    ConflictingConversation(PartnerId),

    #[error("Conversation with partner {0} was already started")]
    AlreadyStarted(PartnerId),

    #[error("Timeout scheduling failed: {0}")]
    Schedule(#[from] ScheduleError),
}

impl Error {
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }
}
