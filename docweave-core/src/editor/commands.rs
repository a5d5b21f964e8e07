//! Named editing commands.
//!
//! A command follows the `(state, attrs, dispatch) -> bool` protocol: it
//! returns whether it applies, and when `dispatch` is `Some` it also hands
//! the resulting transaction over. With `None` it only answers "can this
//! run?".

use super::state::EditorState;
use super::transaction::Transaction;
use crate::error::EditorError;
use crate::model::Attrs;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub type Dispatch<'a> = Option<&'a mut dyn FnMut(Transaction)>;

pub type CommandFn =
    Arc<dyn Fn(&EditorState, &Attrs, Option<&mut dyn FnMut(Transaction)>) -> bool + Send + Sync>;

/// Box a closure as a [`CommandFn`], pinning its signature.
pub fn command_fn<F>(f: F) -> CommandFn
where
    F: Fn(&EditorState, &Attrs, Option<&mut dyn FnMut(Transaction)>) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Hand `tr` to `dispatch` when present. Always `true`, so commands can
/// end with `emit(dispatch, tr)`.
pub fn emit(dispatch: Dispatch<'_>, tr: Transaction) -> bool {
    if let Some(dispatch) = dispatch {
        dispatch(tr);
    }
    true
}

/// Reborrow a dispatch handle so it can be passed on more than once.
pub fn reborrow<'a>(dispatch: &'a mut Dispatch<'_>) -> Dispatch<'a> {
    match dispatch {
        Some(d) => Some(&mut **d as &mut dyn FnMut(Transaction)),
        None => None,
    }
}

/// Try each command in turn; the first that applies wins.
pub fn chain(commands: Vec<CommandFn>) -> CommandFn {
    command_fn(move |state, attrs, mut dispatch| {
        commands
            .iter()
            .any(|command| command(state, attrs, reborrow(&mut dispatch)))
    })
}

#[derive(Clone)]
pub struct Command {
    name: String,
    run: CommandFn,
    read_only: bool,
}

impl Command {
    pub fn new(name: impl Into<String>, run: CommandFn) -> Self {
        Self {
            name: name.into(),
            run,
            read_only: false,
        }
    }

    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&EditorState, &Attrs, Option<&mut dyn FnMut(Transaction)>) -> bool
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, command_fn(f))
    }

    /// Allow running on a non-editable state.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runs_read_only(&self) -> bool {
        self.read_only
    }

    pub fn run_fn(&self) -> &CommandFn {
        &self.run
    }

    /// Run the command, refusing when the state is read-only and the
    /// command has not opted in.
    pub fn exec(&self, state: &EditorState, attrs: &Attrs, dispatch: Dispatch<'_>) -> bool {
        if !state.is_editable() && !self.read_only {
            debug!(command = %self.name, "Refusing command on read-only state");
            return false;
        }
        (self.run)(state, attrs, dispatch)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Flat command table. The last registration of a name wins.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: BTreeMap<String, Command>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, command: Command) {
        if self.commands.contains_key(command.name()) {
            debug!(command = command.name(), "Command overridden by later registration");
        }
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn run(
        &self,
        name: &str,
        state: &EditorState,
        attrs: &Attrs,
        dispatch: Dispatch<'_>,
    ) -> Result<bool, EditorError> {
        let command = self
            .get(name)
            .ok_or_else(|| EditorError::UnknownCommand(name.to_string()))?;
        Ok(command.exec(state, attrs, dispatch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodeSpec, SchemaBuilder};

    fn state() -> EditorState {
        let schema = SchemaBuilder::new()
            .node("doc", NodeSpec::new().content("paragraph+"))
            .node("paragraph", NodeSpec::new().content("text*"))
            .node("text", NodeSpec::new().inline())
            .build()
            .unwrap();
        let doc = schema
            .create_and_fill("doc", Attrs::new(), Vec::new())
            .unwrap();
        EditorState::new(Arc::new(schema), doc)
    }

    fn never() -> CommandFn {
        command_fn(|_, _, _| false)
    }

    fn always() -> CommandFn {
        command_fn(|state, _, dispatch| emit(dispatch, state.tr()))
    }

    #[test]
    fn chain_stops_at_first_success() {
        let state = state();
        let mut seen = 0;
        let mut sink = |_tr: Transaction| seen += 1;
        let chained = chain(vec![never(), always(), always()]);
        assert!(chained(&state, &Attrs::new(), Some(&mut sink as &mut dyn FnMut(Transaction))));
        assert_eq!(seen, 1);
    }

    #[test]
    fn read_only_state_refuses_unless_opted_in() {
        let mut state = state();
        state.set_editable(false);
        let edit = Command::new("edit", always());
        let inspect = Command::new("inspect", always()).read_only();
        assert!(!edit.exec(&state, &Attrs::new(), None));
        assert!(inspect.exec(&state, &Attrs::new(), None));
    }

    #[test]
    fn later_registration_wins() {
        let state = state();
        let mut table = CommandTable::new();
        table.insert(Command::new("go", never()));
        table.insert(Command::new("go", always()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.run("go", &state, &Attrs::new(), None), Ok(true));
        assert_eq!(
            table.run("missing", &state, &Attrs::new(), None),
            Err(EditorError::UnknownCommand("missing".into()))
        );
    }
}
