//! Terminal record of a conversation.
//!
//! A `ConversationContext` is produced exactly once per conversation, when it
//! reaches a terminal state, and handed to the completion callback.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Why a conversation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndState {
    /// The resolver ran out of questions.
    Success,
    /// The pending question's timer expired before a reply arrived.
    Timeout,
    /// A validator rejected a reply and asked for the conversation to end.
    ValidationAbort,
    /// The host reported that the partner went away.
    PartnerDisconnect,
    /// Torn down externally without a more specific reason.
    Unknown,
}

impl EndState {
    /// Whether `ConversationContext::ending_question` carries meaning for
    /// this state.
    #[must_use]
    pub const fn names_ending_question(self) -> bool {
        matches!(self, Self::Timeout | Self::ValidationAbort)
    }
}

impl fmt::Display for EndState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::ValidationAbort => "validation_abort",
            Self::PartnerDisconnect => "partner_disconnect",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Accepted replies keyed by question identifier, in the order they were
/// accepted.
///
/// Append-only: an identifier that already has an answer is never
/// overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answers<M> {
    entries: Vec<(String, M)>,
}

impl<M> Answers<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record `reply` for `question_id`.
    ///
    /// Returns `false` and leaves the existing answer in place if the
    /// identifier was already answered.
    pub fn record(&mut self, question_id: impl Into<String>, reply: M) -> bool {
        let question_id = question_id.into();
        if self.contains(&question_id) {
            return false;
        }
        self.entries.push((question_id, reply));
        true
    }

    #[must_use]
    pub fn get(&self, question_id: &str) -> Option<&M> {
        self.entries
            .iter()
            .find(|(id, _)| id == question_id)
            .map(|(_, reply)| reply)
    }

    #[must_use]
    pub fn contains(&self, question_id: &str) -> bool {
        self.entries.iter().any(|(id, _)| id == question_id)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(question_id, reply)` pairs in answer order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &M)> {
        self.entries.iter().map(|(id, reply)| (id.as_str(), reply))
    }

    /// Question identifiers in answer order.
    pub fn question_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<(String, M)> {
        self.entries
    }
}

impl<M> Default for Answers<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Serialize> Serialize for Answers<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, reply) in &self.entries {
            map.serialize_entry(id, reply)?;
        }
        map.end()
    }
}

/// Final record handed to the completion callback.
pub struct ConversationContext<M, P> {
    partner: Arc<P>,
    answers: Answers<M>,
    end_state: EndState,
    ending_question: Option<String>,
    ended_at: DateTime<Utc>,
}

impl<M, P> ConversationContext<M, P> {
    /// Build a terminal record.
    ///
    /// The ending question identifier is dropped for `EndState::Success`.
    #[must_use]
    pub fn new(
        partner: Arc<P>,
        answers: Answers<M>,
        end_state: EndState,
        ending_question: Option<String>,
    ) -> Self {
        let ending_question = match end_state {
            EndState::Success => None,
            _ => ending_question,
        };
        Self {
            partner,
            answers,
            end_state,
            ending_question,
            ended_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn partner(&self) -> &P {
        &self.partner
    }

    #[must_use]
    pub fn partner_handle(&self) -> Arc<P> {
        Arc::clone(&self.partner)
    }

    /// The accepted reply for `question_id`, if the question was answered.
    #[must_use]
    pub fn answer(&self, question_id: &str) -> Option<&M> {
        self.answers.get(question_id)
    }

    #[must_use]
    pub const fn answers(&self) -> &Answers<M> {
        &self.answers
    }

    #[must_use]
    pub fn into_answers(self) -> Answers<M> {
        self.answers
    }

    #[must_use]
    pub const fn end_state(&self) -> EndState {
        self.end_state
    }

    /// Identifier of the question that was pending when the conversation
    /// ended. Always `None` for `EndState::Success`; only meaningful for
    /// `Timeout` and `ValidationAbort`.
    #[must_use]
    pub fn ending_question(&self) -> Option<&str> {
        self.ending_question.as_deref()
    }

    #[must_use]
    pub const fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }
}

impl<M: Clone, P> Clone for ConversationContext<M, P> {
    fn clone(&self) -> Self {
        Self {
            partner: Arc::clone(&self.partner),
            answers: self.answers.clone(),
            end_state: self.end_state,
            ending_question: self.ending_question.clone(),
            ended_at: self.ended_at,
        }
    }
}

impl<M: fmt::Debug, P> fmt::Debug for ConversationContext<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationContext")
            .field("answers", &self.answers)
            .field("end_state", &self.end_state)
            .field("ending_question", &self.ending_question)
            .field("ended_at", &self.ended_at)
            .finish_non_exhaustive()
    }
}
