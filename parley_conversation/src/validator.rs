//! Reply validation.
//!
//! A validator is a pure function from a reply to a `ValidationOutcome`.
//! Rejection is an ordinary outcome handled by the conversation state
//! machine, never an error.

use regex::Regex;
use std::fmt;

/// Result of validating one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome<M> {
    /// Record the reply and move on.
    Accepted,
    /// Send `message` and keep waiting on the same question.
    Rejected { message: M },
    /// Send `message`, ask the same question again.
    RejectedRetry { message: M },
    /// Send `message` and end the conversation.
    RejectedAbort { message: M },
}

impl<M> ValidationOutcome<M> {
    #[must_use]
    pub const fn accept() -> Self {
        Self::Accepted
    }

    #[must_use]
    pub const fn reject(message: M) -> Self {
        Self::Rejected { message }
    }

    #[must_use]
    pub const fn retry(message: M) -> Self {
        Self::RejectedRetry { message }
    }

    #[must_use]
    pub const fn abort(message: M) -> Self {
        Self::RejectedAbort { message }
    }

    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// The rejection message, if this is a rejection.
    #[must_use]
    pub const fn message(&self) -> Option<&M> {
        match self {
            Self::Accepted => None,
            Self::Rejected { message }
            | Self::RejectedRetry { message }
            | Self::RejectedAbort { message } => Some(message),
        }
    }
}

/// Validates replies to one question.
pub trait InputValidator<M>: Send + Sync {
    fn validate(&self, reply: &M) -> ValidationOutcome<M>;
}

impl<M, F> InputValidator<M> for F
where
    F: Fn(&M) -> ValidationOutcome<M> + Send + Sync,
{
    fn validate(&self, reply: &M) -> ValidationOutcome<M> {
        self(reply)
    }
}

/// What a failed built-in rule turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rejection {
    /// Tell the partner, keep waiting.
    Notify,
    /// Tell the partner and repeat the prompt.
    #[default]
    Retry,
    /// Tell the partner and end the conversation.
    Abort,
}

impl Rejection {
    #[must_use]
    pub const fn outcome<M>(self, message: M) -> ValidationOutcome<M> {
        match self {
            Self::Notify => ValidationOutcome::Rejected { message },
            Self::Retry => ValidationOutcome::RejectedRetry { message },
            Self::Abort => ValidationOutcome::RejectedAbort { message },
        }
    }
}

/// Rule applied by a `TextValidator`.
#[derive(Clone)]
pub enum TextRule {
    /// Something other than whitespace.
    NonEmpty,
    /// One of a fixed set of answers, compared after trimming.
    OneOf {
        options: Vec<String>,
        case_sensitive: bool,
    },
    /// The regex matches somewhere in the reply.
    Matches(Regex),
    /// At most this many characters.
    MaxChars(usize),
}

impl TextRule {
    #[must_use]
    pub fn accepts(&self, text: &str) -> bool {
        match self {
            Self::NonEmpty => !text.trim().is_empty(),
            Self::OneOf {
                options,
                case_sensitive,
            } => {
                let text = text.trim();
                if *case_sensitive {
                    options.iter().any(|option| option == text)
                } else {
                    let text = text.to_lowercase();
                    options.iter().any(|option| option.to_lowercase() == text)
                }
            }
            Self::Matches(pattern) => pattern.is_match(text),
            Self::MaxChars(limit) => text.chars().count() <= *limit,
        }
    }
}

impl fmt::Debug for TextRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonEmpty => f.write_str("NonEmpty"),
            Self::OneOf {
                options,
                case_sensitive,
            } => f
                .debug_struct("OneOf")
                .field("options", options)
                .field("case_sensitive", case_sensitive)
                .finish(),
            Self::Matches(pattern) => f.debug_tuple("Matches").field(&pattern.as_str()).finish(),
            Self::MaxChars(limit) => f.debug_tuple("MaxChars").field(limit).finish(),
        }
    }
}

/// Built-in validator for textual replies.
#[derive(Debug, Clone)]
pub struct TextValidator<M> {
    rule: TextRule,
    message: M,
    rejection: Rejection,
}

impl<M> TextValidator<M> {
    /// Validator for `rule`; failures send `message` and ask again.
    #[must_use]
    pub const fn new(rule: TextRule, message: M) -> Self {
        Self {
            rule,
            message,
            rejection: Rejection::Retry,
        }
    }

    #[must_use]
    pub const fn non_empty(message: M) -> Self {
        Self::new(TextRule::NonEmpty, message)
    }

    /// Case-insensitive choice between `options`.
    #[must_use]
    pub fn one_of<I, S>(options: I, message: M) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            TextRule::OneOf {
                options: options.into_iter().map(Into::into).collect(),
                case_sensitive: false,
            },
            message,
        )
    }

    pub fn matches(pattern: &str, message: M) -> Result<Self, regex::Error> {
        Ok(Self::new(TextRule::Matches(Regex::new(pattern)?), message))
    }

    #[must_use]
    pub const fn max_chars(limit: usize, message: M) -> Self {
        Self::new(TextRule::MaxChars(limit), message)
    }

    #[must_use]
    pub const fn with_rejection(mut self, rejection: Rejection) -> Self {
        self.rejection = rejection;
        self
    }

    #[must_use]
    pub const fn rule(&self) -> &TextRule {
        &self.rule
    }

    #[must_use]
    pub const fn rejection(&self) -> Rejection {
        self.rejection
    }
}

impl<M> InputValidator<M> for TextValidator<M>
where
    M: AsRef<str> + Clone + Send + Sync,
{
    fn validate(&self, reply: &M) -> ValidationOutcome<M> {
        if self.rule.accepts(reply.as_ref()) {
            ValidationOutcome::Accepted
        } else {
            self.rejection.outcome(self.message.clone())
        }
    }
}
