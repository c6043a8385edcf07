//! Chained questions: the resolver that decides what to ask next.
//!
//! The first question is fixed. Every following question is produced by a
//! step function that sees the previous question, the accepted reply and the
//! partner. Steps are consumed in FIFO order, one per accepted reply; once
//! the queue is empty the sequence is over.

use crate::question::Question;
use parley_core::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Read-only input to one resolver step.
pub struct ComputeContext<'a, M, P> {
    previous_question: &'a Question<M, P>,
    reply: &'a M,
    partner: &'a P,
}

impl<'a, M, P> ComputeContext<'a, M, P> {
    #[must_use]
    pub const fn new(
        previous_question: &'a Question<M, P>,
        reply: &'a M,
        partner: &'a P,
    ) -> Self {
        Self {
            previous_question,
            reply,
            partner,
        }
    }

    /// The question that was just answered.
    #[must_use]
    pub const fn previous_question(&self) -> &'a Question<M, P> {
        self.previous_question
    }

    /// The accepted reply to `previous_question`.
    #[must_use]
    pub const fn reply(&self) -> &'a M {
        self.reply
    }

    #[must_use]
    pub const fn partner(&self) -> &'a P {
        self.partner
    }
}

/// One resolver step. `None` ends the sequence.
pub type ComputeStep<M, P> =
    Arc<dyn Fn(&ComputeContext<'_, M, P>) -> Option<Question<M, P>> + Send + Sync>;

/// A fixed first question followed by a queue of one-shot steps.
///
/// Cloning copies the queue itself, so a clone and its source drain their
/// steps independently.
pub struct ChainedQuestions<M, P> {
    first: Question<M, P>,
    pending: VecDeque<ComputeStep<M, P>>,
}

impl<M, P> ChainedQuestions<M, P> {
    #[must_use]
    pub fn new(first: Question<M, P>) -> Self {
        Self {
            first,
            pending: VecDeque::new(),
        }
    }

    /// Static sequence: each step yields the next question of the list.
    pub fn from_questions<I>(questions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Question<M, P>>,
        M: Send + Sync + 'static,
        P: 'static,
    {
        let mut questions = questions.into_iter();
        let first = questions
            .next()
            .ok_or_else(|| Error::invalid("no questions specified"))?;
        Ok(questions.fold(Self::new(first), Self::then_question))
    }

    /// Append a step.
    #[must_use]
    pub fn then<F>(mut self, step: F) -> Self
    where
        F: Fn(&ComputeContext<'_, M, P>) -> Option<Question<M, P>> + Send + Sync + 'static,
    {
        self.push(step);
        self
    }

    /// Append a step that always yields `question`.
    #[must_use]
    pub fn then_question(self, question: Question<M, P>) -> Self
    where
        M: Send + Sync + 'static,
        P: 'static,
    {
        self.then(move |_| Some(question.clone()))
    }

    pub fn push<F>(&mut self, step: F)
    where
        F: Fn(&ComputeContext<'_, M, P>) -> Option<Question<M, P>> + Send + Sync + 'static,
    {
        self.pending.push_back(Arc::new(step));
    }

    #[must_use]
    pub const fn first_question(&self) -> &Question<M, P> {
        &self.first
    }

    /// Consume the next step and apply it to `context`.
    ///
    /// Returns `None` once the queue is empty, and for every call after.
    pub fn next_question(
        &mut self,
        context: &ComputeContext<'_, M, P>,
    ) -> Option<Question<M, P>> {
        let step = self.pending.pop_front()?;
        step(context)
    }

    /// Steps not consumed yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl<M, P> Clone for ChainedQuestions<M, P> {
    fn clone(&self) -> Self {
        Self {
            first: self.first.clone(),
            pending: self.pending.iter().map(Arc::clone).collect(),
        }
    }
}

impl<M: fmt::Debug, P> fmt::Debug for ChainedQuestions<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedQuestions")
            .field("first", &self.first)
            .field("remaining", &self.pending.len())
            .finish()
    }
}
