//! Registry of active conversations.
//!
//! The `ConversationManager` maps partner identity to that partner's live
//! conversation and enforces that a partner is in at most one conversation
//! at a time. Host integrations forward replies and disconnects through it.
//!
//! The registry is sharded, so different partners never contend. No
//! registry guard is held while calling into a conversation.

use crate::conversation::{Conversation, ConversationBuilder};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_core::{EndState, Error, Partner, PartnerId, Result, TimeoutScheduler};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Cloneable handle to a shared conversation registry.
pub struct ConversationManager<M, P> {
    conversations: Arc<DashMap<PartnerId, Conversation<M, P>>>,
    scheduler: Option<Arc<dyn TimeoutScheduler>>,
}

impl<M, P> Clone for ConversationManager<M, P> {
    fn clone(&self) -> Self {
        Self {
            conversations: Arc::clone(&self.conversations),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<M, P> ConversationManager<M, P> {
    /// A manager without a default timeout scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(DashMap::new()),
            scheduler: None,
        }
    }

    /// A manager whose conversations use `scheduler` unless they set their
    /// own.
    #[must_use]
    pub fn with_scheduler(scheduler: Arc<dyn TimeoutScheduler>) -> Self {
        Self {
            conversations: Arc::new(DashMap::new()),
            scheduler: Some(scheduler),
        }
    }

    #[must_use]
    pub fn default_scheduler(&self) -> Option<Arc<dyn TimeoutScheduler>> {
        self.scheduler.clone()
    }

    /// A conversation builder already wired to this manager, its default
    /// scheduler and `partner`.
    #[must_use]
    pub fn builder(&self, partner: impl Into<Arc<P>>) -> ConversationBuilder<M, P> {
        let builder = ConversationBuilder::new()
            .parent_manager(self.clone())
            .partner(partner);
        match &self.scheduler {
            Some(scheduler) => builder.timeout_scheduler(Arc::clone(scheduler)),
            None => builder,
        }
    }

    /// Add `conversation` to the registry.
    ///
    /// Fails with `ConflictingConversation` if its partner already has a
    /// conversation that has not ended. An ended entry is replaced.
    pub fn register(&self, conversation: &Conversation<M, P>) -> Result<()> {
        let partner_id = conversation.partner_id();
        match self.conversations.entry(partner_id) {
            Entry::Occupied(mut entry) => {
                if !entry.get().has_ended() {
                    return Err(Error::ConflictingConversation(partner_id));
                }
                debug!("Replacing ended conversation of partner {partner_id}");
                entry.insert(conversation.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(conversation.clone());
            }
        }
        Ok(())
    }

    /// Whether `partner_id` has a conversation that has not ended.
    ///
    /// An ended entry found on the way is evicted.
    #[must_use]
    pub fn has_active_conversation(&self, partner_id: PartnerId) -> bool {
        match self.lookup(partner_id) {
            Some(conversation) if !conversation.has_ended() => true,
            Some(_) => {
                self.evict_ended(partner_id);
                false
            }
            None => false,
        }
    }

    /// The live conversation of `partner_id`, if any.
    #[must_use]
    pub fn conversation(&self, partner_id: PartnerId) -> Option<Conversation<M, P>> {
        self.lookup(partner_id)
            .filter(|conversation| !conversation.has_ended())
    }

    /// Number of registered conversations that have not ended.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.conversations
            .iter()
            .filter(|entry| !entry.value().has_ended())
            .count()
    }

    /// Remove `conversation` if it is still the registered one for its
    /// partner.
    pub(crate) fn evict(&self, conversation: &Conversation<M, P>) {
        self.conversations
            .remove_if(&conversation.partner_id(), |_, registered| {
                registered.ptr_eq(conversation)
            });
    }

    fn evict_ended(&self, partner_id: PartnerId) {
        self.conversations
            .remove_if(&partner_id, |_, registered| registered.has_ended());
    }

    fn lookup(&self, partner_id: PartnerId) -> Option<Conversation<M, P>> {
        self.conversations
            .get(&partner_id)
            .map(|entry| entry.value().clone())
    }
}

impl<M, P> ConversationManager<M, P>
where
    M: Clone + Send + Sync + 'static,
    P: Partner<M> + 'static,
{
    /// Deliver `reply` to the live conversation of `partner_id`.
    ///
    /// Replies for partners without a live conversation are dropped; an
    /// ended entry is evicted.
    pub fn route_input(&self, partner_id: PartnerId, reply: M) -> Result<()> {
        match self.lookup(partner_id) {
            Some(conversation) if !conversation.has_ended() => conversation.accept_input(reply),
            Some(_) => {
                self.evict_ended(partner_id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Remove the conversation of `partner_id`, ending it with `end_state`
    /// if it is still running.
    ///
    /// Returns whether a running conversation was ended by this call.
    /// Unknown partners and repeated calls are no-ops.
    pub fn unregister(&self, partner_id: PartnerId, end_state: EndState) -> bool {
        let Some((_, conversation)) = self.conversations.remove(&partner_id) else {
            return false;
        };
        conversation.force_end(end_state)
    }

    /// End and remove every registered conversation.
    ///
    /// Returns how many running conversations were ended.
    pub fn unregister_all(&self, end_state: EndState) -> usize {
        let partners: Vec<PartnerId> = self
            .conversations
            .iter()
            .map(|entry| *entry.key())
            .collect();
        let ended = partners
            .into_iter()
            .filter(|partner_id| self.unregister(*partner_id, end_state))
            .count();
        if ended > 0 {
            info!("Ended {ended} conversation(s) ({end_state})");
        }
        ended
    }
}

impl<M, P> Default for ConversationManager<M, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, P> fmt::Debug for ConversationManager<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationManager")
            .field("registered", &self.conversations.len())
            .field("has_scheduler", &self.scheduler.is_some())
            .finish()
    }
}
