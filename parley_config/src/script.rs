//! Wizard scripts: a JSON description of a conversation.
//!
//! Questions are asked in file order. A question may branch on the accepted
//! answer to a later question or to `$end`; jumps only go forward, so every
//! script terminates and no question is asked twice.

use parley_core::TimeUnit;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Branch target that ends the script.
pub const END: &str = "$end";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script has no questions")]
    Empty,

    #[error("question {0} has a blank id")]
    BlankId(usize),

    #[error("question id '{0}' is used more than once")]
    DuplicateId(String),

    #[error("question '{question}' branches to unknown question '{target}'")]
    UnknownTarget { question: String, target: String },

    #[error("question '{question}' branches back to '{target}'; only forward jumps are allowed")]
    BackwardJump { question: String, target: String },

    #[error("question '{question}' has an invalid pattern: {source}")]
    InvalidPattern {
        question: String,
        #[source]
        source: regex::Error,
    },

    #[error("timeout of {0} has an amount but no unit")]
    MissingUnit(String),

    #[error("question '{question}' uses rule '{rule}' without its '{field}' field")]
    IncompleteRule {
        question: String,
        rule: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct TimeoutSpec {
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<TimeUnit>,
}

impl TimeoutSpec {
    /// `None` if the unit is missing.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.unit.map(|unit| unit.duration(self.amount))
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    NonEmpty,
    OneOf,
    Matches,
    MaxChars,
}

impl RuleKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NonEmpty => "non_empty",
            Self::OneOf => "one_of",
            Self::Matches => "matches",
            Self::MaxChars => "max_chars",
        }
    }
}

/// What happens when a reply fails its validator.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    Notify,
    #[default]
    Retry,
    Abort,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidatorSpec {
    pub rule: RuleKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chars: Option<usize>,
    pub message: String,
    #[serde(default)]
    pub on_fail: OnFail,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Branch {
    pub answer: String,
    pub goto: String,
}

impl Branch {
    /// Case-insensitive match after trimming.
    #[must_use]
    pub fn matches(&self, answer: &str) -> bool {
        self.answer.trim().to_lowercase() == answer.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptQuestion {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValidatorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutSpec>,
    /// Sent to the partner when this question times out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Script {
    pub name: String,
    /// Timeout for questions that declare none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutSpec>,
    pub questions: Vec<ScriptQuestion>,
}

impl Script {
    /// Read, parse and validate a script file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read script {}: {e}", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse and validate a script.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let script: Self = serde_json::from_str(json)?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.questions.is_empty() {
            return Err(ScriptError::Empty);
        }
        if self.timeout.is_some_and(|timeout| timeout.unit.is_none()) {
            return Err(ScriptError::MissingUnit(format!("script '{}'", self.name)));
        }

        let mut seen = HashSet::new();
        for (index, question) in self.questions.iter().enumerate() {
            if question.id.trim().is_empty() {
                return Err(ScriptError::BlankId(index + 1));
            }
            if !seen.insert(question.id.as_str()) {
                return Err(ScriptError::DuplicateId(question.id.clone()));
            }
        }

        for (index, question) in self.questions.iter().enumerate() {
            if question.timeout.is_some_and(|timeout| timeout.unit.is_none()) {
                return Err(ScriptError::MissingUnit(format!(
                    "question '{}'",
                    question.id
                )));
            }
            if let Some(validator) = &question.validator {
                Self::validate_rule(question, validator)?;
            }
            for branch in &question.branches {
                if branch.goto == END {
                    continue;
                }
                match self.position(&branch.goto) {
                    None => {
                        return Err(ScriptError::UnknownTarget {
                            question: question.id.clone(),
                            target: branch.goto.clone(),
                        });
                    }
                    Some(target) if target <= index => {
                        return Err(ScriptError::BackwardJump {
                            question: question.id.clone(),
                            target: branch.goto.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn validate_rule(
        question: &ScriptQuestion,
        validator: &ValidatorSpec,
    ) -> Result<(), ScriptError> {
        let incomplete = |field| ScriptError::IncompleteRule {
            question: question.id.clone(),
            rule: validator.rule.as_str(),
            field,
        };
        match validator.rule {
            RuleKind::NonEmpty => Ok(()),
            RuleKind::OneOf if validator.options.is_empty() => Err(incomplete("options")),
            RuleKind::OneOf => Ok(()),
            RuleKind::MaxChars if validator.max_chars.is_none() => Err(incomplete("max_chars")),
            RuleKind::MaxChars => Ok(()),
            RuleKind::Matches => {
                let pattern = validator
                    .pattern
                    .as_deref()
                    .ok_or_else(|| incomplete("pattern"))?;
                Regex::new(pattern)
                    .map(|_| ())
                    .map_err(|source| ScriptError::InvalidPattern {
                        question: question.id.clone(),
                        source,
                    })
            }
        }
    }

    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.questions.iter().position(|question| question.id == id)
    }

    /// Index of the question that follows an accepted `answer` to question
    /// `index`, or `None` when the script ends.
    #[must_use]
    pub fn next_index(&self, index: usize, answer: &str) -> Option<usize> {
        let question = self.questions.get(index)?;
        match question.branches.iter().find(|branch| branch.matches(answer)) {
            Some(branch) if branch.goto == END => None,
            Some(branch) => self.position(&branch.goto),
            None => Some(index + 1).filter(|next| *next < self.questions.len()),
        }
    }

    /// The question's own timeout, else the script's.
    #[must_use]
    pub fn timeout_for(&self, question: &ScriptQuestion) -> Option<Duration> {
        question
            .timeout
            .or(self.timeout)
            .and_then(|timeout| timeout.duration())
    }
}
