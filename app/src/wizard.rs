//! Turning a wizard `Script` into a question resolver.

use parley_config::{OnFail, RuleKind, Script, ScriptQuestion, ValidatorSpec};
use parley_conversation::{ChainedQuestions, Partner, Question, Rejection, TextRule, TextValidator};
use std::sync::Arc;
use std::time::Duration;

/// Build the resolver for `script`.
///
/// Questions without a timeout of their own or from the script use
/// `fallback`.
pub fn build_chain<P>(
    script: &Script,
    fallback: Option<Duration>,
) -> anyhow::Result<ChainedQuestions<String, P>>
where
    P: Partner<String> + 'static,
{
    let questions = script
        .questions
        .iter()
        .map(|question| build_question(script, question, fallback))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let Some(first) = questions.first().cloned() else {
        anyhow::bail!("script '{}' has no questions", script.name);
    };

    // Jumps only go forward, so one step per remaining question is enough.
    let route = Arc::new(Route {
        script: script.clone(),
        questions,
    });
    let mut chain = ChainedQuestions::new(first);
    for _ in 1..route.questions.len() {
        let route = Arc::clone(&route);
        chain.push(move |ctx| route.next(ctx.previous_question().id(), ctx.reply()));
    }
    Ok(chain)
}

struct Route<P> {
    script: Script,
    questions: Vec<Question<String, P>>,
}

impl<P> Route<P> {
    fn next(&self, previous: &str, reply: &str) -> Option<Question<String, P>> {
        let index = self.script.position(previous)?;
        let next = self.script.next_index(index, reply)?;
        self.questions.get(next).cloned()
    }
}

fn build_question<P>(
    script: &Script,
    question: &ScriptQuestion,
    fallback: Option<Duration>,
) -> anyhow::Result<Question<String, P>>
where
    P: Partner<String> + 'static,
{
    let mut builder = Question::builder()
        .id(question.id.clone())
        .message(question.prompt.clone());
    if let Some(after) = script.timeout_for(question).or(fallback) {
        builder = builder.timeout(after);
    }
    if let Some(message) = &question.timeout_message {
        let message = message.clone();
        builder = builder.when_timeout(move |partner: &P| partner.send(message.clone()));
    }
    if let Some(spec) = &question.validator {
        builder = builder.validator(text_validator(spec)?);
    }
    Ok(builder.build()?)
}

fn text_validator(spec: &ValidatorSpec) -> anyhow::Result<TextValidator<String>> {
    let message = spec.message.clone();
    let validator = match spec.rule {
        RuleKind::NonEmpty => TextValidator::non_empty(message),
        RuleKind::OneOf => TextValidator::new(
            TextRule::OneOf {
                options: spec.options.clone(),
                case_sensitive: spec.case_sensitive,
            },
            message,
        ),
        RuleKind::Matches => {
            let pattern = spec
                .pattern
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("'matches' rule without a pattern"))?;
            TextValidator::matches(pattern, message)?
        }
        RuleKind::MaxChars => {
            let limit = spec
                .max_chars
                .ok_or_else(|| anyhow::anyhow!("'max_chars' rule without a limit"))?;
            TextValidator::max_chars(limit, message)
        }
    };
    Ok(validator.with_rejection(rejection(spec.on_fail)))
}

const fn rejection(on_fail: OnFail) -> Rejection {
    match on_fail {
        OnFail::Notify => Rejection::Notify,
        OnFail::Retry => Rejection::Retry,
        OnFail::Abort => Rejection::Abort,
    }
}
