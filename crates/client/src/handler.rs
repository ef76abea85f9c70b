//! Inbound quest handling for duplex connections.
//!
//! A server may push quests to the client. A [`QuestHandler`] maps a method
//! name to a [`MethodFn`]; [`MethodTable`] is the stock implementation.
//!
//! Every two-way inbound quest gets exactly one answer frame:
//!
//! | Situation                         | Answer                         |
//! |-----------------------------------|--------------------------------|
//! | no handler / no method function   | `CORE_UNKNOWN_METHOD`          |
//! | function returns `Ok(Some(a))`    | `a`                            |
//! | function returns `Ok(None)`       | `CORE_UNKNOWN_ERROR`           |
//! | function returns `Err(e)`         | `CORE_UNKNOWN_ERROR` with `e`  |
//! | function panics                   | `CORE_UNKNOWN_ERROR`           |
//!
//! One-way quests never produce a frame; problems are only logged.

use std::collections::HashMap;
use std::sync::Arc;

use protocol::{error_code, Answer, Quest};

/// Error returned by a method function.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Function processing one inbound quest.
pub type MethodFn =
    Arc<dyn Fn(&Quest) -> Result<Option<Answer>, HandlerError> + Send + Sync + 'static>;

/// Resolves inbound method names to processing functions.
pub trait QuestHandler: Send + Sync {
    fn method(&self, name: &str) -> Option<MethodFn>;
}

/// Method-name table of processing functions.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, MethodFn>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` for `name`, builder style.
    pub fn on<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Quest) -> Result<Option<Answer>, HandlerError> + Send + Sync + 'static,
    {
        self.register(name, f);
        self
    }

    /// Register `f` for `name`, replacing any previous function.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Quest) -> Result<Option<Answer>, HandlerError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl QuestHandler for MethodTable {
    fn method(&self, name: &str) -> Option<MethodFn> {
        self.methods.get(name).cloned()
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("MethodTable").field("methods", &names).finish()
    }
}

/// Run the handler for `quest` and decide which answer, if any, goes back.
///
/// Panics are not caught here; the connection runs this on the blocking
/// pool and converts a panic with [`panic_answer`].
pub(crate) fn process_quest(handler: Option<&dyn QuestHandler>, quest: &Quest) -> Option<Answer> {
    let Some(handler) = handler else {
        return unknown_method(quest, "Client quest processor is unconfiged.");
    };
    let Some(method) = handler.method(quest.method()) else {
        return unknown_method(quest, "Method function is unconfiged.");
    };

    match method(quest) {
        Ok(Some(answer)) if quest.is_two_way() => Some(answer),
        Ok(Some(_)) => {
            tracing::error!(method = quest.method(), "handler returned an answer for a one-way quest");
            None
        }
        Ok(None) if quest.is_two_way() => Some(Answer::error(
            quest,
            error_code::CORE_UNKNOWN_ERROR,
            "Quest processer don't return invalid answer.",
        )),
        Ok(None) => None,
        Err(e) => {
            tracing::error!(method = quest.method(), error = %e, "quest processing failed");
            quest.is_two_way().then(|| {
                Answer::error(quest, error_code::CORE_UNKNOWN_ERROR, format!("Client error: {e}"))
            })
        }
    }
}

/// Error answer for a two-way quest whose handler panicked.
pub(crate) fn panic_answer(quest: &Quest, message: &str) -> Option<Answer> {
    tracing::error!(method = quest.method(), panic = message, "quest handler panicked");
    quest.is_two_way().then(|| {
        Answer::error(
            quest,
            error_code::CORE_UNKNOWN_ERROR,
            format!("Client error: handler panicked: {message}"),
        )
    })
}

fn unknown_method(quest: &Quest, ex: &str) -> Option<Answer> {
    if quest.is_two_way() {
        tracing::error!(method = quest.method(), "no processor for two-way quest");
        Some(Answer::error(quest, error_code::CORE_UNKNOWN_METHOD, ex))
    } else {
        tracing::error!(method = quest.method(), "no processor for one-way quest");
        None
    }
}
