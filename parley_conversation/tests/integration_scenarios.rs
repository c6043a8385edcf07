//! End-to-end conversation flows driven through the manager.
//!
//! Timeouts run on the virtual clock so every test is deterministic.

mod common;

use common::{BrokenScheduler, DummyPartner, Outcomes};
use parley_conversation::{
    ChainedQuestions, Conversation, ConversationContext, ConversationManager, EndState, Error,
    Partner, PartnerId, Question, ScheduleError, TimeUnit, TimeoutScheduler, ValidationOutcome,
};
use parley_scheduler::ManualScheduler;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Duration;

type Manager = ConversationManager<String, DummyPartner>;
type Q = Question<String, DummyPartner>;

fn manual_manager() -> (Manager, Arc<ManualScheduler>) {
    let scheduler = Arc::new(ManualScheduler::new());
    let manager = Manager::with_scheduler(scheduler.clone());
    (manager, scheduler)
}

fn timed(id: &str, prompt: &str, after: Duration) -> Q {
    Q::builder()
        .id(id)
        .message(prompt.to_string())
        .timeout(after)
        .build()
        .expect("valid question")
}

#[test]
fn test_static_questions_collect_answers_in_order() {
    let manager = Manager::new();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    let conversation = manager
        .builder(Arc::clone(&partner))
        .question(Q::new("first", "Foo".to_string()))
        .question(Q::new("second", "Bar".to_string()))
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation");
    conversation.start().expect("start");

    manager
        .route_input(partner.id(), "Bar".to_string())
        .expect("first reply");
    assert_eq!(conversation.current_question_id().as_deref(), Some("second"));
    manager
        .route_input(partner.id(), "Foo".to_string())
        .expect("second reply");

    let outcome = outcomes.single();
    assert_eq!(outcome.end_state(), EndState::Success);
    assert_eq!(outcome.ending_question(), None);
    assert_eq!(
        outcome.answers().iter().collect::<Vec<_>>(),
        [("first", &"Bar".to_string()), ("second", &"Foo".to_string())]
    );
    assert_eq!(partner.sent(), ["Foo", "Bar"]);
    assert!(conversation.has_ended());
    assert!(!manager.has_active_conversation(partner.id()));
}

#[test]
fn test_rejected_reply_keeps_waiting() {
    let manager = Manager::new();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    let question = Q::builder()
        .id("first")
        .message("Foo".to_string())
        .validator(|reply: &String| {
            if reply.eq_ignore_ascii_case("bar") {
                ValidationOutcome::reject("mama".to_string())
            } else {
                ValidationOutcome::accept()
            }
        })
        .build()
        .expect("valid question");
    manager
        .builder(Arc::clone(&partner))
        .question(question)
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation")
        .start()
        .expect("start");

    manager
        .route_input(partner.id(), "bar".to_string())
        .expect("reply");

    assert_eq!(partner.sent(), ["Foo", "mama"]);
    assert!(manager.has_active_conversation(partner.id()));
    assert_eq!(outcomes.count(), 0);
    let conversation = manager.conversation(partner.id()).expect("still live");
    assert!(conversation.answers().is_empty());
    assert_eq!(conversation.current_question_id().as_deref(), Some("first"));
}

#[test]
fn test_retry_resends_prompt_and_abort_ends() {
    let manager = Manager::new();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    let question = Q::builder()
        .id("pin")
        .message("PIN?".to_string())
        .validator(|reply: &String| match reply.as_str() {
            "1234" => ValidationOutcome::accept(),
            "stop" => ValidationOutcome::abort("bye".to_string()),
            _ => ValidationOutcome::retry("wrong".to_string()),
        })
        .build()
        .expect("valid question");
    manager
        .builder(Arc::clone(&partner))
        .question(question)
        .question(Q::new("unused", "never asked".to_string()))
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation")
        .start()
        .expect("start");

    manager
        .route_input(partner.id(), "0000".to_string())
        .expect("retry");
    assert_eq!(partner.sent(), ["PIN?", "wrong", "PIN?"]);
    assert_eq!(outcomes.count(), 0);

    manager
        .route_input(partner.id(), "stop".to_string())
        .expect("abort");
    let outcome = outcomes.single();
    assert_eq!(outcome.end_state(), EndState::ValidationAbort);
    assert_eq!(outcome.ending_question(), Some("pin"));
    assert!(outcome.answers().is_empty());
    assert_eq!(partner.sent(), ["PIN?", "wrong", "PIN?", "bye"]);
    assert!(!manager.has_active_conversation(partner.id()));
}

#[test]
fn test_timeout_ends_conversation_and_runs_action() {
    let (manager, scheduler) = manual_manager();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    let question = Q::builder()
        .id("first")
        .message("Foo".to_string())
        .timeout_in(1, TimeUnit::Seconds)
        .when_timeout(|partner: &DummyPartner| partner.send("foo".to_string()))
        .build()
        .expect("valid question");
    manager
        .builder(Arc::clone(&partner))
        .question(question)
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation")
        .start()
        .expect("start");

    assert_eq!(scheduler.advance(Duration::from_millis(999)), 0);
    assert_eq!(outcomes.count(), 0);
    assert_eq!(scheduler.advance(Duration::from_millis(1)), 1);

    let outcome = outcomes.single();
    assert_eq!(outcome.end_state(), EndState::Timeout);
    assert_eq!(outcome.ending_question(), Some("first"));
    assert_eq!(partner.sent(), ["Foo", "foo"]);
    assert!(!manager.has_active_conversation(partner.id()));

    manager
        .route_input(partner.id(), "late".to_string())
        .expect("late reply is dropped");
    assert_eq!(outcomes.count(), 1);
}

#[test]
fn test_disconnect_reports_pending_question() {
    let manager = Manager::new();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    manager
        .builder(Arc::clone(&partner))
        .question(Q::new("first", "Foo".to_string()))
        .question(Q::new("second", "Bar".to_string()))
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation")
        .start()
        .expect("start");
    manager
        .route_input(partner.id(), "one".to_string())
        .expect("reply");

    assert!(manager.unregister(partner.id(), EndState::PartnerDisconnect));
    assert!(!manager.unregister(partner.id(), EndState::PartnerDisconnect));

    let outcome = outcomes.single();
    assert_eq!(outcome.end_state(), EndState::PartnerDisconnect);
    assert_eq!(outcome.ending_question(), Some("second"));
    assert_eq!(outcome.answer("first").map(String::as_str), Some("one"));
}

#[test]
fn test_disconnect_cancels_armed_timer() {
    let (manager, scheduler) = manual_manager();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    manager
        .builder(Arc::clone(&partner))
        .question(timed("first", "Foo", Duration::from_secs(5)))
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation")
        .start()
        .expect("start");
    assert_eq!(scheduler.pending(), 1);

    manager.unregister(partner.id(), EndState::PartnerDisconnect);
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(scheduler.advance(Duration::from_secs(10)), 0);
    assert_eq!(outcomes.single().end_state(), EndState::PartnerDisconnect);
}

#[test]
fn test_rejection_rearms_timeout() {
    let (manager, scheduler) = manual_manager();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    let question = Q::builder()
        .id("first")
        .message("Foo".to_string())
        .timeout(Duration::from_millis(10))
        .validator(|reply: &String| {
            if reply.is_empty() {
                ValidationOutcome::reject("say something".to_string())
            } else {
                ValidationOutcome::accept()
            }
        })
        .build()
        .expect("valid question");
    manager
        .builder(Arc::clone(&partner))
        .question(question)
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation")
        .start()
        .expect("start");

    scheduler.advance(Duration::from_millis(8));
    manager
        .route_input(partner.id(), String::new())
        .expect("rejected reply");
    scheduler.advance(Duration::from_millis(8));
    assert_eq!(outcomes.count(), 0);

    scheduler.advance(Duration::from_millis(2));
    assert_eq!(outcomes.single().end_state(), EndState::Timeout);
}

#[test]
fn test_chained_questions_branch_on_reply() {
    let manager = Manager::new();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    let chain = ChainedQuestions::new(Q::new("pet", "Cat or dog?".to_string()))
        .then(|ctx| {
            let follow_up = if ctx.reply() == "cat" {
                Q::new("cat_name", "Cat's name?".to_string())
            } else {
                Q::new("dog_breed", "Dog's breed?".to_string())
            };
            Some(follow_up)
        })
        .then(|ctx| {
            (ctx.previous_question().id() == "dog_breed")
                .then(|| Q::new("walks", "Walks per day?".to_string()))
        });

    let conversation = manager
        .builder(Arc::clone(&partner))
        .chained(chain)
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation");
    conversation.start().expect("start");
    for reply in ["cat", "Tom"] {
        manager
            .route_input(partner.id(), reply.to_string())
            .expect("reply");
    }

    let outcome = outcomes.single();
    assert_eq!(outcome.end_state(), EndState::Success);
    assert_eq!(
        outcome.answers().question_ids().collect::<Vec<_>>(),
        ["pet", "cat_name"]
    );

    // A rebuilt conversation starts from a fresh copy of the resolver.
    let again = conversation.to_builder().build().expect("rebuild");
    again.start().expect("restart");
    for reply in ["dog", "poodle", "2"] {
        manager
            .route_input(partner.id(), reply.to_string())
            .expect("reply");
    }
    let last = outcomes.all().pop().expect("second outcome");
    assert_eq!(
        last.answers().question_ids().collect::<Vec<_>>(),
        ["pet", "dog_breed", "walks"]
    );
}

#[test]
fn test_callback_can_start_next_conversation() {
    let manager = Manager::new();
    let partner = DummyPartner::new();
    let restarted = Arc::new(AtomicBool::new(false));

    let conversation = {
        let manager = manager.clone();
        let restarted = Arc::clone(&restarted);
        manager
            .clone()
            .builder(Arc::clone(&partner))
            .question(Q::new("first", "Foo".to_string()))
            .on_done(move |ctx| {
                if ctx.end_state() != EndState::Success {
                    return;
                }
                let started = manager
                    .builder(ctx.partner_handle())
                    .question(Q::new("again", "Once more?".to_string()))
                    .on_done(|_| {})
                    .build()
                    .and_then(|next| next.start());
                restarted.store(started.is_ok(), Ordering::SeqCst);
            })
            .build()
            .expect("valid conversation")
    };
    conversation.start().expect("start");
    manager
        .route_input(partner.id(), "x".to_string())
        .expect("reply");

    assert!(restarted.load(Ordering::SeqCst));
    assert!(manager.has_active_conversation(partner.id()));
    assert_eq!(partner.sent(), ["Foo", "Once more?"]);
}

#[test]
fn test_start_twice_and_force_end_before_start() {
    let manager = Manager::new();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    let conversation = manager
        .builder(Arc::clone(&partner))
        .question(Q::new("first", "Foo".to_string()))
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation");
    conversation.start().expect("start");
    assert!(matches!(conversation.start(), Err(Error::AlreadyStarted(_))));

    let idle = manager
        .builder(DummyPartner::new())
        .question(Q::new("first", "Foo".to_string()))
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation");
    assert!(idle.force_end(EndState::Unknown));
    assert!(!idle.force_end(EndState::Unknown));
    assert_eq!(idle.end_state(), Some(EndState::Unknown));
    assert!(matches!(idle.start(), Err(Error::AlreadyStarted(_))));
    assert_eq!(outcomes.single().ending_question(), None);
}

#[test]
fn test_builder_rejects_incomplete_configuration() {
    let manager = Manager::new();
    let outcomes = Outcomes::default();

    let no_questions = manager
        .builder(DummyPartner::new())
        .on_done(outcomes.handler())
        .build();
    assert!(matches!(no_questions, Err(Error::InvalidConfiguration(_))));

    let no_callback = manager
        .builder(DummyPartner::new())
        .question(Q::new("first", "Foo".to_string()))
        .build();
    assert!(matches!(no_callback, Err(Error::InvalidConfiguration(_))));

    let no_manager = Conversation::<String, DummyPartner>::builder()
        .partner(DummyPartner::new())
        .question(Q::new("first", "Foo".to_string()))
        .on_done(outcomes.handler())
        .build();
    assert!(matches!(no_manager, Err(Error::InvalidConfiguration(_))));

    let mixed = manager
        .builder(DummyPartner::new())
        .question(Q::new("first", "Foo".to_string()))
        .chained(ChainedQuestions::new(Q::new("other", "Bar".to_string())))
        .on_done(outcomes.handler())
        .build();
    assert!(matches!(mixed, Err(Error::InvalidConfiguration(_))));

    let timed_without_scheduler = manager
        .builder(DummyPartner::new())
        .question(timed("first", "Foo", Duration::from_secs(1)))
        .on_done(outcomes.handler())
        .build();
    assert!(matches!(
        timed_without_scheduler,
        Err(Error::InvalidConfiguration(_))
    ));
}

#[test]
fn test_scheduling_failure_on_start_ends_with_unknown() {
    let manager = Manager::new();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();
    let broken: Arc<dyn TimeoutScheduler> = Arc::new(BrokenScheduler);

    let conversation = manager
        .builder(Arc::clone(&partner))
        .timeout_scheduler(broken)
        .question(timed("first", "Foo", Duration::from_secs(1)))
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation");

    let result = conversation.start();
    assert!(matches!(
        result,
        Err(Error::Schedule(ScheduleError::Unavailable(_)))
    ));
    let outcome = outcomes.single();
    assert_eq!(outcome.end_state(), EndState::Unknown);
    assert_eq!(outcome.ending_question(), Some("first"));
    assert!(partner.sent().is_empty());
    assert!(!manager.has_active_conversation(partner.id()));
}

#[test]
fn test_scheduling_failure_while_advancing_ends_with_unknown() {
    let (manager, scheduler) = manual_manager();
    let partner = DummyPartner::new();
    let outcomes = Outcomes::default();

    manager
        .builder(Arc::clone(&partner))
        .question(Q::new("first", "Foo".to_string()))
        .question(timed("second", "Bar", Duration::from_secs(1)))
        .on_done(outcomes.handler())
        .build()
        .expect("valid conversation")
        .start()
        .expect("start");

    scheduler.shutdown();
    let result = manager.route_input(partner.id(), "one".to_string());
    assert!(matches!(result, Err(Error::Schedule(ScheduleError::ShutDown))));

    let outcome = outcomes.single();
    assert_eq!(outcome.end_state(), EndState::Unknown);
    assert_eq!(outcome.ending_question(), Some("second"));
    assert_eq!(outcome.answer("first").map(String::as_str), Some("one"));
    assert_eq!(partner.sent(), ["Foo"]);
}

type BotManager = ConversationManager<String, EchoBot>;

/// Partner wired straight into the manager: every prompt it receives is
/// answered from inside `send`.
struct EchoBot {
    id: PartnerId,
    manager: BotManager,
    replies: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<String>>,
    seen_questions: Mutex<Vec<String>>,
}

impl EchoBot {
    fn new(manager: &BotManager, replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            id: PartnerId::new(),
            manager: manager.clone(),
            replies: Mutex::new(replies.iter().map(|reply| (*reply).to_string()).collect()),
            sent: Mutex::new(Vec::new()),
            seen_questions: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Partner<String> for EchoBot {
    fn id(&self) -> PartnerId {
        self.id
    }

    fn send(&self, message: String) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        if let Some(current) = self
            .manager
            .conversation(self.id)
            .and_then(|conversation| conversation.current_question_id())
        {
            self.seen_questions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(current);
        }
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(reply) = reply {
            self.manager
                .route_input(self.id, reply)
                .expect("reply routed");
        }
    }
}

/// Run `f` on its own thread and fail instead of hanging if it never
/// returns.
fn finishes_in_time(f: impl FnOnce() + Send + 'static) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        f();
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(5))
        .expect("conversation did not finish");
}

fn bot_outcomes() -> (
    Arc<Mutex<Vec<ConversationContext<String, EchoBot>>>>,
    impl Fn(ConversationContext<String, EchoBot>) + Send + Sync + 'static,
) {
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    (outcomes, move |context| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context);
    })
}

#[test]
fn test_partner_replying_from_send_runs_to_completion() {
    let manager = BotManager::new();
    let bot = EchoBot::new(&manager, &["Ada", "yes"]);
    let (outcomes, on_done) = bot_outcomes();

    let conversation = manager
        .builder(Arc::clone(&bot))
        .question(Question::new("name", "Your name?".to_string()))
        .question(Question::new("confirm", "Continue?".to_string()))
        .on_done(on_done)
        .build()
        .expect("valid conversation");
    finishes_in_time(move || conversation.start().expect("start"));

    let outcomes = outcomes.lock().unwrap_or_else(PoisonError::into_inner);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].end_state(), EndState::Success);
    assert_eq!(
        outcomes[0].answers().iter().collect::<Vec<_>>(),
        [("name", &"Ada".to_string()), ("confirm", &"yes".to_string())]
    );
    assert_eq!(bot.sent(), ["Your name?", "Continue?"]);
    assert_eq!(
        *bot.seen_questions
            .lock()
            .unwrap_or_else(PoisonError::into_inner),
        ["name", "confirm"]
    );
    assert!(!manager.has_active_conversation(bot.id()));
}

#[test]
fn test_rejection_message_is_sent_before_completion() {
    let manager = BotManager::new();
    let bot = EchoBot::new(&manager, &["", "ignored"]);
    let (outcomes, on_done) = bot_outcomes();
    let sent_at_completion = Arc::new(Mutex::new(Vec::new()));

    let question = Question::builder()
        .id("name")
        .message("Your name?".to_string())
        .validator(|reply: &String| {
            if reply.is_empty() {
                ValidationOutcome::abort("Bye".to_string())
            } else {
                ValidationOutcome::Accepted
            }
        })
        .build()
        .expect("valid question");
    let snapshot = Arc::clone(&sent_at_completion);
    let observer = Arc::clone(&bot);
    let conversation = manager
        .builder(Arc::clone(&bot))
        .question(question)
        .on_done(move |context| {
            *snapshot.lock().unwrap_or_else(PoisonError::into_inner) = observer.sent();
            on_done(context);
        })
        .build()
        .expect("valid conversation");
    finishes_in_time(move || conversation.start().expect("start"));

    let outcomes = outcomes.lock().unwrap_or_else(PoisonError::into_inner);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].end_state(), EndState::ValidationAbort);
    assert_eq!(outcomes[0].ending_question(), Some("name"));
    assert_eq!(
        *sent_at_completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner),
        ["Your name?", "Bye"]
    );
}
