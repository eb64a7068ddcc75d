//! Command registry
//!
//! Commands are plain records of a match predicate and an action closure,
//! kept in registration order. Matching scans that order and the first
//! predicate that accepts wins, so overlapping keywords resolve to whichever
//! command was registered first.

mod builtin;

pub use builtin::{default_registry, register_defaults, register_launchers};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AssistantError, Result};

/// Broad grouping used for listing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    Greeting,
    System,
    Web,
    Utility,
    Control,
    Help,
}

/// Failure reported by a command action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ActionError(pub String);

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type MatchFn = Box<dyn Fn(&str) -> bool + Send + Sync>;
pub type ActionFn = Box<dyn Fn(&str) -> std::result::Result<String, ActionError> + Send + Sync>;

/// A matchable action
pub struct Command {
    name: String,
    description: String,
    category: CommandCategory,
    keywords: Vec<String>,
    matcher: Option<MatchFn>,
    action: ActionFn,
    executions: AtomicU64,
    last_executed: Mutex<Option<DateTime<Utc>>>,
}

impl Command {
    /// Create a command that matches on its keywords
    ///
    /// The action receives the normalized (lowercased) text that matched.
    pub fn new<F>(name: impl Into<String>, category: CommandCategory, action: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<String, ActionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            category,
            keywords: Vec::new(),
            matcher: None,
            action: Box::new(action),
            executions: AtomicU64::new(0),
            last_executed: Mutex::new(None),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Keywords or multi-word phrases; any one matching whole words accepts
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(|k| normalize(&k.into()))
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    /// Replace the keyword predicate with a custom one
    pub fn matcher<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Box::new(matcher));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> CommandCategory {
        self.category
    }

    pub fn keyword_list(&self) -> &[String] {
        &self.keywords
    }

    /// Whether this command accepts already-normalized text
    pub fn matches(&self, normalized: &str) -> bool {
        match &self.matcher {
            Some(matcher) => matcher(normalized),
            None => self
                .keywords
                .iter()
                .any(|keyword| contains_phrase(normalized, keyword)),
        }
    }

    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn last_executed(&self) -> Option<DateTime<Utc>> {
        *self
            .last_executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("keywords", &self.keywords)
            .finish_non_exhaustive()
    }
}

/// Result of resolving and running recognized text
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A command ran and produced a response
    Executed { command: String, response: String },
    /// A command matched but its action failed
    Failed { command: String, cause: String },
    /// Nothing matched
    NoMatch,
}

/// Ordered table of commands
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command; names must be unique
    pub fn register(&mut self, command: Command) -> Result<()> {
        if self.commands.iter().any(|c| c.name == command.name) {
            return Err(AssistantError::DuplicateName { name: command.name });
        }
        info!(name = %command.name, category = ?command.category, "command registered");
        self.commands.push(command);
        Ok(())
    }

    /// First command, in registration order, whose predicate accepts `text`
    pub fn find_match(&self, text: &str) -> Option<&Command> {
        let normalized = normalize(text);
        let found = self.commands.iter().find(|c| c.matches(&normalized));
        match found {
            Some(command) => debug!(name = %command.name, "command matched"),
            None => debug!(text = %normalized, "no command matched"),
        }
        found
    }

    /// Run a command's action
    ///
    /// A failing or panicking action is reported as `ActionFailed`.
    pub fn execute(&self, command: &Command, text: &str) -> Result<String> {
        let normalized = normalize(text);
        let outcome = catch_unwind(AssertUnwindSafe(|| (command.action)(&normalized)));

        command.executions.fetch_add(1, Ordering::Relaxed);
        *command
            .last_executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        match outcome {
            Ok(Ok(response)) => {
                info!(name = %command.name, "command executed");
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!(name = %command.name, error = %e, "command failed");
                Err(AssistantError::ActionFailed {
                    name: command.name.clone(),
                    cause: e.0,
                })
            }
            Err(_) => {
                warn!(name = %command.name, "command panicked");
                Err(AssistantError::ActionFailed {
                    name: command.name.clone(),
                    cause: "action panicked".to_string(),
                })
            }
        }
    }

    /// Resolve `text` and run the match, if any
    pub fn dispatch(&self, text: &str) -> Dispatch {
        let Some(command) = self.find_match(text) else {
            return Dispatch::NoMatch;
        };
        match self.execute(command, text) {
            Ok(response) => Dispatch::Executed {
                command: command.name.clone(),
                response,
            },
            Err(AssistantError::ActionFailed { name, cause }) => Dispatch::Failed {
                command: name,
                cause,
            },
            Err(other) => Dispatch::Failed {
                command: command.name.clone(),
                cause: other.to_string(),
            },
        }
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn by_category(&self, category: CommandCategory) -> Vec<&Command> {
        self.commands
            .iter()
            .filter(|c| c.category == category)
            .collect()
    }

    /// Command names in registration (match) order
    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Case-fold and collapse to single-space separated words
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole-word phrase containment on normalized text
fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let words: Vec<&str> = normalized.split(' ').collect();
    let needle: Vec<&str> = phrase.split(' ').collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words.windows(needle.len()).any(|w| w == needle.as_slice())
}
