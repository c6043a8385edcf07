//! The per-partner conversation state machine.
//!
//! A conversation moves `Created -> Active -> Ended` and never leaves
//! `Ended`. It is driven from up to three independent execution contexts at
//! once: the host delivering a reply, a timer firing, and an external
//! teardown (disconnect, manager shutdown). All of them funnel through one
//! mutex, and whichever path takes the conversation to `Ended` first also
//! takes the completion callback out of the state, so the callback runs
//! exactly once.
//!
//! Host code never runs while the mutex is held. Prompts and rejection
//! messages are queued and sent once it is released, followed by the
//! completion callback, so `Partner::send`, the callback and a question's
//! timeout action may all call back into the conversation or its manager.

use crate::chain::{ChainedQuestions, ComputeContext};
use crate::manager::ConversationManager;
use crate::question::Question;
use crate::validator::ValidationOutcome;
use parley_core::{
    Answers, ConversationContext, EndState, Error, Partner, PartnerId, Result, ScheduleError,
    TimeoutHandle, TimeoutScheduler,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, warn};

/// Completion callback, invoked once with the terminal record.
pub type DoneHandler<M, P> = Arc<dyn Fn(ConversationContext<M, P>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Active,
    Ended(EndState),
}

struct ArmedTimer {
    seq: u64,
    handle: Box<dyn TimeoutHandle>,
}

struct State<M, P> {
    phase: Phase,
    questions: ChainedQuestions<M, P>,
    current: Option<Question<M, P>>,
    answers: Answers<M>,
    timer: Option<ArmedTimer>,
    timer_seq: u64,
    on_done: Option<DoneHandler<M, P>>,
}

struct Inner<M, P> {
    partner: Arc<P>,
    partner_id: PartnerId,
    manager: ConversationManager<M, P>,
    scheduler: Option<Arc<dyn TimeoutScheduler>>,
    template: ChainedQuestions<M, P>,
    done: DoneHandler<M, P>,
    ended: AtomicBool,
    state: Mutex<State<M, P>>,
}

/// Work that must run after the state lock is released.
struct Completion<M, P> {
    handler: DoneHandler<M, P>,
    context: ConversationContext<M, P>,
}

/// Partner messages and completion gathered under the state lock.
struct Outbox<M, P> {
    messages: Vec<M>,
    ended: bool,
    completion: Option<Completion<M, P>>,
}

impl<M, P> Outbox<M, P> {
    const fn new() -> Self {
        Self {
            messages: Vec::new(),
            ended: false,
            completion: None,
        }
    }

    fn end(&mut self, completion: Option<Completion<M, P>>) {
        self.ended = true;
        self.completion = completion;
    }
}

/// A scripted exchange with one partner.
///
/// `Conversation` is a cheap, cloneable handle; the manager holds one clone
/// while the conversation is active.
pub struct Conversation<M, P> {
    inner: Arc<Inner<M, P>>,
}

impl<M, P> Clone for Conversation<M, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M, P> Conversation<M, P> {
    #[must_use]
    pub fn builder() -> ConversationBuilder<M, P> {
        ConversationBuilder::new()
    }

    #[must_use]
    pub fn partner(&self) -> &P {
        &self.inner.partner
    }

    #[must_use]
    pub fn partner_handle(&self) -> Arc<P> {
        Arc::clone(&self.inner.partner)
    }

    #[must_use]
    pub fn partner_id(&self) -> PartnerId {
        self.inner.partner_id
    }

    /// Whether the conversation reached a terminal state.
    #[must_use]
    pub fn has_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// The terminal state, once ended.
    #[must_use]
    pub fn end_state(&self) -> Option<EndState> {
        match self.lock().phase {
            Phase::Ended(end_state) => Some(end_state),
            Phase::Created | Phase::Active => None,
        }
    }

    /// Identifier of the question waiting for a reply.
    #[must_use]
    pub fn current_question_id(&self) -> Option<String> {
        self.lock()
            .current
            .as_ref()
            .map(|question| question.id().to_string())
    }

    /// Whether both handles refer to the same conversation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A builder pre-filled with this conversation's partner, manager,
    /// scheduler, completion callback and a fresh copy of its questions as
    /// they were when it was built.
    #[must_use]
    pub fn to_builder(&self) -> ConversationBuilder<M, P> {
        ConversationBuilder {
            manager: Some(self.inner.manager.clone()),
            partner: Some(Arc::clone(&self.inner.partner)),
            scheduler: self.inner.scheduler.clone(),
            questions: Questions::Chained(self.inner.template.clone()),
            on_done: Some(Arc::clone(&self.inner.done)),
            error: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<M, P>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Clone, P> Conversation<M, P> {
    /// Snapshot of the accepted replies so far.
    #[must_use]
    pub fn answers(&self) -> Answers<M> {
        self.lock().answers.clone()
    }
}

impl<M, P> Conversation<M, P>
where
    M: Clone + Send + Sync + 'static,
    P: Partner<M> + 'static,
{
    /// Register with the manager and ask the first question.
    ///
    /// If the first question's timer cannot be armed the conversation ends
    /// with `EndState::Unknown` (the completion callback runs), the prompt is
    /// not sent and the scheduling error is returned.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.phase != Phase::Created {
                return Err(Error::AlreadyStarted(self.inner.partner_id));
            }
            state.phase = Phase::Active;
        }

        if let Err(e) = self.inner.manager.register(self) {
            let mut state = self.lock();
            if state.phase == Phase::Active {
                state.phase = Phase::Created;
            }
            return Err(e);
        }

        let mut outbox = Outbox::new();
        let result = {
            let mut state = self.lock();
            if state.phase != Phase::Active {
                // Torn down between registration and here.
                return Ok(());
            }
            let first = state.questions.first_question().clone();
            info!(
                "Starting conversation with partner {} at question '{}'",
                self.inner.partner_id,
                first.id()
            );
            self.ask(&mut state, first, &mut outbox)
        };
        self.deliver(outbox);
        result
    }

    /// Handle one reply from the partner.
    ///
    /// This is the single entry point for replies. A reply that loses the
    /// race against an already-fired timer is ignored. Returns an error only
    /// when the next question's timer cannot be armed, in which case the
    /// conversation has ended with `EndState::Unknown`.
    pub fn accept_input(&self, reply: M) -> Result<()> {
        let mut outbox = Outbox::new();
        let result = {
            let mut state = self.lock();
            self.handle_reply(&mut state, reply, &mut outbox)
        };
        self.deliver(outbox);
        result
    }

    /// End the conversation from outside with `end_state`.
    ///
    /// Returns `false` if it had already ended. The manager entry is left
    /// alone; `ConversationManager::unregister` removes it.
    pub fn force_end(&self, end_state: EndState) -> bool {
        let mut state = self.lock();
        if matches!(state.phase, Phase::Ended(_)) {
            return false;
        }
        let ending_question = state
            .current
            .as_ref()
            .map(|question| question.id().to_string());
        info!(
            "Conversation with partner {} ended externally ({end_state})",
            self.inner.partner_id
        );
        let completion = self.finish(&mut state, end_state, ending_question);
        drop(state);
        if let Some(completion) = completion {
            completion.run();
        }
        true
    }

    fn handle_reply(
        &self,
        state: &mut State<M, P>,
        reply: M,
        outbox: &mut Outbox<M, P>,
    ) -> Result<()> {
        if state.phase != Phase::Active {
            debug!(
                "Ignoring reply from partner {}: conversation not active",
                self.inner.partner_id
            );
            return Ok(());
        }

        if let Some(timer) = &state.timer {
            if !timer.handle.cancel() {
                debug!(
                    "Reply from partner {} arrived after the timeout fired",
                    self.inner.partner_id
                );
                return Ok(());
            }
            state.timer = None;
        }

        let Some(current) = state.current.clone() else {
            return Ok(());
        };

        match current.validate(&reply) {
            ValidationOutcome::Accepted => {}
            ValidationOutcome::Rejected { message } => {
                debug!("Reply to '{}' rejected", current.id());
                outbox.messages.push(message);
                return self.rearm(state, &current, outbox);
            }
            ValidationOutcome::RejectedRetry { message } => {
                debug!("Reply to '{}' rejected, asking again", current.id());
                outbox.messages.push(message);
                outbox.messages.push(current.message().clone());
                return self.rearm(state, &current, outbox);
            }
            ValidationOutcome::RejectedAbort { message } => {
                info!(
                    "Reply to '{}' rejected, aborting conversation with partner {}",
                    current.id(),
                    self.inner.partner_id
                );
                outbox.messages.push(message);
                outbox.end(self.finish(
                    state,
                    EndState::ValidationAbort,
                    Some(current.id().to_string()),
                ));
                return Ok(());
            }
        }

        state.answers.record(current.id(), reply.clone());

        let next = {
            let context = ComputeContext::new(&current, &reply, self.inner.partner.as_ref());
            state.questions.next_question(&context)
        };

        match next {
            Some(question) => self.ask(state, question, outbox),
            None => {
                outbox.end(self.finish(state, EndState::Success, None));
                Ok(())
            }
        }
    }

    fn on_timeout_fired(&self, seq: u64) {
        let mut state = self.lock();
        if state.phase != Phase::Active {
            return;
        }
        if state.timer.as_ref().map(|timer| timer.seq) != Some(seq) {
            debug!(
                "Ignoring stale timer {seq} for partner {}",
                self.inner.partner_id
            );
            return;
        }
        state.timer = None;

        let Some(question) = state.current.clone() else {
            return;
        };
        info!(
            "Question '{}' timed out for partner {}",
            question.id(),
            self.inner.partner_id
        );
        let completion = self.finish(
            &mut state,
            EndState::Timeout,
            Some(question.id().to_string()),
        );
        drop(state);
        self.complete(completion);

        if let Some(action) = question.on_timeout() {
            action(self.inner.partner.as_ref());
        }
    }

    /// Arm `question`'s timer, make it current and queue its prompt.
    fn ask(
        &self,
        state: &mut State<M, P>,
        question: Question<M, P>,
        outbox: &mut Outbox<M, P>,
    ) -> Result<()> {
        state.current = Some(question.clone());
        if let Err(e) = self.arm(state, &question) {
            return Err(self.fail_scheduling(state, &question, e, outbox));
        }
        outbox.messages.push(question.message().clone());
        Ok(())
    }

    /// Re-arm the current question's timer after a rejected reply.
    fn rearm(
        &self,
        state: &mut State<M, P>,
        question: &Question<M, P>,
        outbox: &mut Outbox<M, P>,
    ) -> Result<()> {
        if let Err(e) = self.arm(state, question) {
            return Err(self.fail_scheduling(state, question, e, outbox));
        }
        Ok(())
    }

    fn arm(
        &self,
        state: &mut State<M, P>,
        question: &Question<M, P>,
    ) -> std::result::Result<(), ScheduleError> {
        let Some(after) = question.timeout() else {
            return Ok(());
        };
        let scheduler = self.inner.scheduler.as_ref().ok_or_else(|| {
            ScheduleError::Unavailable("no timeout scheduler configured".to_string())
        })?;

        state.timer_seq += 1;
        let seq = state.timer_seq;
        let conversation = Arc::downgrade(&self.inner);
        let handle = scheduler.schedule(
            Box::new(move || {
                if let Some(inner) = Weak::upgrade(&conversation) {
                    Self { inner }.on_timeout_fired(seq);
                }
            }),
            after,
        )?;
        debug!(
            "Armed {after:?} timeout for question '{}' (timer {seq})",
            question.id()
        );
        state.timer = Some(ArmedTimer { seq, handle });
        Ok(())
    }

    fn fail_scheduling(
        &self,
        state: &mut State<M, P>,
        question: &Question<M, P>,
        error: ScheduleError,
        outbox: &mut Outbox<M, P>,
    ) -> Error {
        warn!(
            "Could not arm timeout for question '{}' (partner {}): {error}",
            question.id(),
            self.inner.partner_id
        );
        outbox.end(self.finish(
            state,
            EndState::Unknown,
            Some(question.id().to_string()),
        ));
        Error::Schedule(error)
    }

    /// Move to `Ended` and take the completion callback.
    ///
    /// Returns `None` if the conversation had already ended.
    fn finish(
        &self,
        state: &mut State<M, P>,
        end_state: EndState,
        ending_question: Option<String>,
    ) -> Option<Completion<M, P>> {
        if matches!(state.phase, Phase::Ended(_)) {
            return None;
        }
        state.phase = Phase::Ended(end_state);
        self.inner.ended.store(true, Ordering::Release);
        if let Some(timer) = state.timer.take() {
            timer.handle.cancel();
        }

        let handler = state.on_done.take()?;
        Some(Completion {
            handler,
            context: ConversationContext::new(
                Arc::clone(&self.inner.partner),
                state.answers.clone(),
                end_state,
                ending_question,
            ),
        })
    }

    /// Send the queued messages in order, then finish up if the
    /// conversation ended. Must be called with the state lock released.
    fn deliver(&self, outbox: Outbox<M, P>) {
        for message in outbox.messages {
            self.inner.partner.send(message);
        }
        if outbox.ended {
            self.complete(outbox.completion);
        }
    }

    /// Evict from the manager, then run the completion callback.
    fn complete(&self, completion: Option<Completion<M, P>>) {
        self.inner.manager.evict(self);
        if let Some(completion) = completion {
            info!(
                "Conversation with partner {} finished: {}",
                self.inner.partner_id,
                completion.context.end_state()
            );
            completion.run();
        }
    }
}

impl<M, P> Completion<M, P> {
    fn run(self) {
        (self.handler)(self.context);
    }
}

impl<M, P> fmt::Debug for Conversation<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("partner_id", &self.inner.partner_id)
            .field("ended", &self.has_ended())
            .finish_non_exhaustive()
    }
}

enum Questions<M, P> {
    None,
    Listed(Vec<Question<M, P>>),
    Chained(ChainedQuestions<M, P>),
}

/// Builder for `Conversation`.
///
/// Questions come either from repeated `question` calls (a static list) or
/// from one `chained` resolver; mixing the two is a configuration error.
pub struct ConversationBuilder<M, P> {
    manager: Option<ConversationManager<M, P>>,
    partner: Option<Arc<P>>,
    scheduler: Option<Arc<dyn TimeoutScheduler>>,
    questions: Questions<M, P>,
    on_done: Option<DoneHandler<M, P>>,
    error: Option<String>,
}

impl<M, P> ConversationBuilder<M, P> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            manager: None,
            partner: None,
            scheduler: None,
            questions: Questions::None,
            on_done: None,
            error: None,
        }
    }

    /// The manager this conversation registers with.
    #[must_use]
    pub fn parent_manager(mut self, manager: ConversationManager<M, P>) -> Self {
        self.manager = Some(manager);
        self
    }

    #[must_use]
    pub fn partner(mut self, partner: impl Into<Arc<P>>) -> Self {
        self.partner = Some(partner.into());
        self
    }

    /// Scheduler for question timeouts. Defaults to the manager's.
    #[must_use]
    pub fn timeout_scheduler(mut self, scheduler: Arc<dyn TimeoutScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Append a question to the static list.
    #[must_use]
    pub fn question(mut self, question: Question<M, P>) -> Self {
        self.questions = match self.questions {
            Questions::None => Questions::Listed(vec![question]),
            Questions::Listed(mut list) => {
                list.push(question);
                Questions::Listed(list)
            }
            chained @ Questions::Chained(_) => {
                self.error.get_or_insert_with(|| {
                    "cannot add a listed question after chained questions were set".to_string()
                });
                chained
            }
        };
        self
    }

    /// Use a dynamic resolver for the questions.
    #[must_use]
    pub fn chained(mut self, questions: ChainedQuestions<M, P>) -> Self {
        self.questions = match self.questions {
            Questions::None => Questions::Chained(questions),
            existing => {
                self.error.get_or_insert_with(|| {
                    "chained questions cannot be combined with other questions".to_string()
                });
                existing
            }
        };
        self
    }

    /// Callback invoked exactly once with the terminal record.
    #[must_use]
    pub fn on_done(
        mut self,
        handler: impl Fn(ConversationContext<M, P>) + Send + Sync + 'static,
    ) -> Self {
        self.on_done = Some(Arc::new(handler));
        self
    }
}

impl<M, P> ConversationBuilder<M, P>
where
    M: Send + Sync + 'static,
    P: Partner<M> + 'static,
{
    pub fn build(self) -> Result<Conversation<M, P>> {
        if let Some(reason) = self.error {
            return Err(Error::InvalidConfiguration(reason));
        }
        let manager = self
            .manager
            .ok_or_else(|| Error::invalid("conversation has no parent manager"))?;
        let partner = self
            .partner
            .ok_or_else(|| Error::invalid("conversation has no partner"))?;
        let on_done = self
            .on_done
            .ok_or_else(|| Error::invalid("conversation has no completion handler"))?;
        let questions = match self.questions {
            Questions::None => return Err(Error::invalid("no questions specified")),
            Questions::Listed(list) => ChainedQuestions::from_questions(list)?,
            Questions::Chained(chain) => chain,
        };
        let scheduler = self.scheduler.or_else(|| manager.default_scheduler());

        let first = questions.first_question();
        if first.timeout().is_some() && scheduler.is_none() {
            return Err(Error::InvalidConfiguration(format!(
                "question '{}' has a timeout but no timeout scheduler is configured",
                first.id()
            )));
        }

        let partner_id = partner.id();
        Ok(Conversation {
            inner: Arc::new(Inner {
                partner,
                partner_id,
                manager,
                scheduler,
                template: questions.clone(),
                done: Arc::clone(&on_done),
                ended: AtomicBool::new(false),
                state: Mutex::new(State {
                    phase: Phase::Created,
                    questions,
                    current: None,
                    answers: Answers::new(),
                    timer: None,
                    timer_seq: 0,
                    on_done: Some(on_done),
                }),
            }),
        })
    }
}

impl<M, P> Default for ConversationBuilder<M, P> {
    fn default() -> Self {
        Self::new()
    }
}
