//! Editing sessions.
//!
//! An [`Editor`] owns one session: the current [`EditorState`], plugin
//! instances, observers and the dispatch queue. Transactions are applied
//! one at a time; anything dispatched while another transaction is being
//! applied (plugin follow-ups) waits in a FIFO queue.

pub mod commands;
pub mod history;
pub mod input_rules;
pub mod keymap;
mod plugin;
pub mod search;
mod state;
mod transaction;

pub use commands::{chain, command_fn, emit, reborrow, Command, CommandFn, CommandTable, Dispatch};
pub use history::History;
pub use input_rules::{InputMatch, InputRule, InputRuleTable};
pub use keymap::{normalize_key, KeyBinding, Keymap};
pub use plugin::Plugin;
pub use state::{textblocks, EditorState, Position, Selection};
pub use transaction::{HistoryAction, Origin, Step, Transaction};

use crate::engine::Engine;
use crate::error::{EditorError, SerializeError};
use crate::model::{Attrs, Node};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

pub type SubscriptionId = usize;

type Observer = Box<dyn FnMut(&EditorState, &Transaction) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Applying,
}

pub struct Editor {
    engine: Arc<Engine>,
    state: EditorState,
    plugins: Vec<Box<dyn Plugin>>,
    phase: DispatchPhase,
    queue: VecDeque<Transaction>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: SubscriptionId,
    destroyed: bool,
}

impl Editor {
    pub fn new(engine: Arc<Engine>, doc: Node) -> Self {
        let mut state = engine.create_state(doc);
        state.set_editable(engine.editable());
        let mut plugins: Vec<Box<dyn Plugin>> = engine
            .registry()
            .iter()
            .flat_map(|ext| ext.plugins())
            .collect();
        for plugin in &mut plugins {
            plugin.init(&state);
        }
        Self {
            engine,
            state,
            plugins,
            phase: DispatchPhase::Idle,
            queue: VecDeque::new(),
            observers: Vec::new(),
            next_subscription: 0,
            destroyed: false,
        }
    }

    pub fn from_markdown(engine: Arc<Engine>, markdown: &str) -> Self {
        let doc = engine.parse(markdown);
        Self::new(engine, doc)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn doc(&self) -> &Node {
        self.state.doc()
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.state.set_editable(editable);
    }

    /// Serialize the current document.
    pub fn markdown(&self) -> Result<String, SerializeError> {
        self.engine.serialize(self.state.doc())
    }

    /// Apply a transaction. Follow-up transactions returned by plugins are
    /// applied afterwards in the order they were produced.
    pub fn dispatch(&mut self, tr: Transaction) -> Result<(), EditorError> {
        if self.destroyed {
            return Err(EditorError::Destroyed);
        }
        self.queue.push_back(tr);
        if self.phase == DispatchPhase::Applying {
            debug!(queued = self.queue.len(), "Transaction queued behind active dispatch");
            return Ok(());
        }

        self.phase = DispatchPhase::Applying;
        let mut result = Ok(());
        while let Some(tr) = self.queue.pop_front() {
            if let Err(err) = self.apply_one(tr) {
                self.queue.clear();
                result = Err(err);
                break;
            }
        }
        self.phase = DispatchPhase::Idle;
        result
    }

    fn apply_one(&mut self, tr: Transaction) -> Result<(), EditorError> {
        let next = self.state.apply(&tr)?;
        let old = std::mem::replace(&mut self.state, next);
        for plugin in &mut self.plugins {
            if let Some(follow_up) = plugin.apply(&tr, &old, &self.state) {
                self.queue.push_back(follow_up);
            }
        }
        for (_, observer) in &mut self.observers {
            observer(&self.state, &tr);
        }
        Ok(())
    }

    /// Run a named command against the current state, dispatching what it
    /// produces. Returns whether the command applied.
    pub fn run_command(&mut self, name: &str, attrs: &Attrs) -> Result<bool, EditorError> {
        if self.destroyed {
            return Err(EditorError::Destroyed);
        }
        let engine = self.engine.clone();
        let mut produced = Vec::new();
        let mut sink = |tr: Transaction| produced.push(tr);
        let applied = engine
            .commands()
            .run(name, &self.state, attrs, Some(&mut sink as &mut dyn FnMut(Transaction)))?;
        for tr in produced {
            self.dispatch(tr)?;
        }
        Ok(applied)
    }

    /// Whether a named command would apply, without running it.
    pub fn can_run(&self, name: &str, attrs: &Attrs) -> bool {
        self.engine
            .commands()
            .run(name, &self.state, attrs, None)
            .unwrap_or(false)
    }

    /// Handle a key press. Returns whether a binding handled it.
    pub fn handle_key(&mut self, key: &str) -> Result<bool, EditorError> {
        if self.destroyed {
            return Err(EditorError::Destroyed);
        }
        let engine = self.engine.clone();
        let mut produced = Vec::new();
        let mut sink = |tr: Transaction| produced.push(tr);
        let handled = engine
            .keymap()
            .handle(key, &self.state, Some(&mut sink as &mut dyn FnMut(Transaction)));
        for tr in produced {
            self.dispatch(tr)?;
        }
        Ok(handled)
    }

    /// Handle typed text: an input rule may transform it, otherwise it is
    /// inserted at the cursor. Returns whether an input rule fired.
    pub fn handle_text_input(&mut self, text: &str) -> Result<bool, EditorError> {
        if self.destroyed {
            return Err(EditorError::Destroyed);
        }
        if let Some(tr) = self.engine.input_rules().handle(&self.state, text) {
            self.dispatch(tr)?;
            return Ok(true);
        }
        if !self.state.is_editable() {
            return Ok(false);
        }
        let marks = self.state.marks_at_cursor();
        let mut tr = self.state.tr();
        tr.insert_text(text, &marks)?;
        self.dispatch(tr)?;
        Ok(false)
    }

    /// Type `text` one character at a time, as a keyboard would.
    pub fn type_text(&mut self, text: &str) -> Result<(), EditorError> {
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.handle_text_input(ch.encode_utf8(&mut buf))?;
        }
        Ok(())
    }

    pub fn select(&mut self, selection: Selection) -> Result<(), EditorError> {
        let mut tr = self.state.tr();
        tr.set_selection(selection);
        self.dispatch(tr)
    }

    /// Observe every applied transaction.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&EditorState, &Transaction) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn add_plugin(&mut self, mut plugin: Box<dyn Plugin>) {
        plugin.init(&self.state);
        self.plugins.push(plugin);
    }

    /// Downcast the plugin registered under `key`.
    pub fn plugin_as<T: 'static>(&self, key: &str) -> Option<&T> {
        self.plugins
            .iter()
            .find(|p| p.key() == key)
            .and_then(|p| p.as_any().downcast_ref::<T>())
    }

    /// Tear down plugins and observers. Later dispatches fail.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        for plugin in &mut self.plugins {
            plugin.destroy();
        }
        self.plugins.clear();
        self.observers.clear();
        self.queue.clear();
        self.destroyed = true;
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        self.destroy();
    }
}
