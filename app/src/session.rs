//! Running one wizard conversation to completion.

use crate::console::ReplySource;
use chrono::{DateTime, Utc};
use parley_config::Script;
use parley_conversation::{Answers, ConversationContext, ConversationManager, EndState, Partner};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Terminal record printed by `parley run`.
#[derive(Debug, Serialize)]
pub struct Report {
    pub script: String,
    pub end_state: EndState,
    pub ending_question: Option<String>,
    pub answers: Answers<String>,
    pub ended_at: DateTime<Utc>,
}

impl Report {
    fn new<P>(script: &str, context: ConversationContext<String, P>) -> Self {
        Self {
            script: script.to_string(),
            end_state: context.end_state(),
            ending_question: context.ending_question().map(str::to_string),
            ended_at: context.ended_at(),
            answers: context.into_answers(),
        }
    }
}

/// Ask `script` of `partner`, feeding it replies from `replies` until the
/// conversation ends.
///
/// The partner running out of replies counts as a disconnect; Ctrl-C ends
/// the conversation with `EndState::Unknown`.
pub async fn run_script<P, S>(
    manager: &ConversationManager<String, P>,
    partner: Arc<P>,
    script: &Script,
    fallback: Option<Duration>,
    replies: &mut S,
) -> anyhow::Result<Report>
where
    P: Partner<String> + 'static,
    S: ReplySource,
{
    let chain = crate::wizard::build_chain(script, fallback)?;
    let partner_id = partner.id();

    let (done_tx, mut done_rx) = oneshot::channel();
    let done_tx = Mutex::new(Some(done_tx));
    let conversation = manager
        .builder(partner)
        .chained(chain)
        .on_done(move |context| {
            let sender = done_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(sender) = sender {
                let _ = sender.send(context);
            }
        })
        .build()?;

    info!("Running script '{}'", script.name);
    if let Err(e) = conversation.start() {
        if !conversation.has_ended() {
            return Err(e.into());
        }
        // Ended with `Unknown`; the record is already on its way.
        warn!("Script '{}' could not start: {e}", script.name);
    }

    let context = loop {
        tokio::select! {
            context = &mut done_rx => break context?,
            reply = replies.next_reply() => match reply {
                Some(reply) => {
                    if let Err(e) = manager.route_input(partner_id, reply) {
                        warn!("Reply could not be processed: {e}");
                    }
                }
                None => {
                    manager.unregister(partner_id, EndState::PartnerDisconnect);
                    break (&mut done_rx).await?;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                manager.unregister(partner_id, EndState::Unknown);
                break (&mut done_rx).await?;
            }
        }
    };

    Ok(Report::new(&script.name, context))
}
