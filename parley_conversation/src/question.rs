//! Questions: one prompt step of a conversation.

use crate::validator::{InputValidator, ValidationOutcome};
use parley_core::{Error, Result, TimeUnit};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Action run with the partner after a question times out.
pub type OnTimeout<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// One immutable prompt step.
///
/// Cloning is cheap; clones share the same payload, validator and timeout
/// action.
pub struct Question<M, P> {
    inner: Arc<QuestionInner<M, P>>,
}

struct QuestionInner<M, P> {
    id: String,
    message: M,
    timeout: Option<Duration>,
    on_timeout: Option<OnTimeout<P>>,
    validator: Option<Arc<dyn InputValidator<M>>>,
}

impl<M, P> Question<M, P> {
    /// A plain question with no timeout and no validator.
    #[must_use]
    pub fn new(id: impl Into<String>, message: M) -> Self {
        Self {
            inner: Arc::new(QuestionInner {
                id: id.into(),
                message,
                timeout: None,
                on_timeout: None,
                validator: None,
            }),
        }
    }

    #[must_use]
    pub const fn builder() -> QuestionBuilder<M, P> {
        QuestionBuilder::new()
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn message(&self) -> &M {
        &self.inner.message
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    #[must_use]
    pub fn on_timeout(&self) -> Option<&OnTimeout<P>> {
        self.inner.on_timeout.as_ref()
    }

    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.inner.validator.is_some()
    }

    /// Run the attached validator; replies to questions without one are
    /// always accepted.
    #[must_use]
    pub fn validate(&self, reply: &M) -> ValidationOutcome<M> {
        self.inner
            .validator
            .as_ref()
            .map_or(ValidationOutcome::Accepted, |validator| {
                validator.validate(reply)
            })
    }
}

impl<M: Clone, P> Question<M, P> {
    /// A builder pre-filled with this question's parts.
    #[must_use]
    pub fn to_builder(&self) -> QuestionBuilder<M, P> {
        QuestionBuilder {
            id: Some(self.inner.id.clone()),
            message: Some(self.inner.message.clone()),
            timeout: self.inner.timeout.map(Timeout::Exact),
            on_timeout: self.inner.on_timeout.clone(),
            validator: self.inner.validator.clone(),
        }
    }
}

impl<M, P> Clone for Question<M, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: fmt::Debug, P> fmt::Debug for Question<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Question")
            .field("id", &self.inner.id)
            .field("message", &self.inner.message)
            .field("timeout", &self.inner.timeout)
            .field("on_timeout", &self.inner.on_timeout.is_some())
            .field("validator", &self.inner.validator.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Timeout {
    Exact(Duration),
    Amount(u64),
    Unit(TimeUnit),
    Both(u64, TimeUnit),
}

/// Builder for `Question`.
pub struct QuestionBuilder<M, P> {
    id: Option<String>,
    message: Option<M>,
    timeout: Option<Timeout>,
    on_timeout: Option<OnTimeout<P>>,
    validator: Option<Arc<dyn InputValidator<M>>>,
}

impl<M, P> QuestionBuilder<M, P> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            id: None,
            message: None,
            timeout: None,
            on_timeout: None,
            validator: None,
        }
    }

    /// Identifier, unique within one conversation.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Prompt payload sent to the partner.
    #[must_use]
    pub fn message(mut self, message: M) -> Self {
        self.message = Some(message);
        self
    }

    #[must_use]
    pub fn timeout(mut self, after: Duration) -> Self {
        self.timeout = Some(Timeout::Exact(after));
        self
    }

    /// Timeout given as an amount of `unit`s.
    #[must_use]
    pub fn timeout_in(self, amount: u64, unit: TimeUnit) -> Self {
        self.timeout_amount(amount).timeout_unit(unit)
    }

    /// Timeout amount; needs a matching `timeout_unit`.
    #[must_use]
    pub fn timeout_amount(mut self, amount: u64) -> Self {
        self.timeout = Some(match self.timeout {
            Some(Timeout::Unit(unit) | Timeout::Both(_, unit)) => Timeout::Both(amount, unit),
            _ => Timeout::Amount(amount),
        });
        self
    }

    /// Timeout unit; needs a matching `timeout_amount`.
    #[must_use]
    pub fn timeout_unit(mut self, unit: TimeUnit) -> Self {
        self.timeout = Some(match self.timeout {
            Some(Timeout::Amount(amount) | Timeout::Both(amount, _)) => {
                Timeout::Both(amount, unit)
            }
            _ => Timeout::Unit(unit),
        });
        self
    }

    /// Run `action` with the partner once this question times out.
    #[must_use]
    pub fn when_timeout(mut self, action: impl Fn(&P) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(action));
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl InputValidator<M> + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn build(self) -> Result<Question<M, P>> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::invalid("question identifier is missing"))?;
        let message = self
            .message
            .ok_or_else(|| Error::invalid(format!("question '{id}' has no message")))?;
        let timeout = match self.timeout {
            None => None,
            Some(Timeout::Exact(after)) => Some(after),
            Some(Timeout::Both(amount, unit)) => Some(unit.duration(amount)),
            Some(Timeout::Amount(_)) => {
                return Err(Error::invalid(format!(
                    "question '{id}' has a timeout amount without a unit"
                )));
            }
            Some(Timeout::Unit(_)) => {
                return Err(Error::invalid(format!(
                    "question '{id}' has a timeout unit without an amount"
                )));
            }
        };

        Ok(Question {
            inner: Arc::new(QuestionInner {
                id,
                message,
                timeout,
                on_timeout: self.on_timeout,
                validator: self.validator,
            }),
        })
    }
}

impl<M, P> Default for QuestionBuilder<M, P> {
    fn default() -> Self {
        Self::new()
    }
}
