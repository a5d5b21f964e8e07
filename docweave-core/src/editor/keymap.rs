//! Key bindings keyed by normalized key combination.

use super::commands::{CommandFn, Dispatch};
use super::state::EditorState;
use crate::model::Attrs;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

#[derive(Clone)]
pub struct KeyBinding {
    pub key: String,
    pub command: CommandFn,
    pub read_only: bool,
}

impl KeyBinding {
    pub fn new(key: impl Into<String>, command: CommandFn) -> Self {
        Self {
            key: key.into(),
            command,
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl fmt::Debug for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBinding")
            .field("key", &self.key)
            .field("read_only", &self.read_only)
            .finish()
    }
}

const MODIFIERS: [&str; 5] = ["Mod", "Alt", "Ctrl", "Meta", "Shift"];

/// Normalize a key description such as `shift-mod-B` into canonical
/// `Mod-Alt-Ctrl-Meta-Shift-key` order. Single-character keys are
/// lowercased. Returns `None` for unknown modifiers.
pub fn normalize_key(key: &str) -> Option<String> {
    let mut parts: Vec<&str> = key.split('-').collect();
    let mut name = parts.pop()?.to_string();
    if name.is_empty() && !parts.is_empty() {
        // `Mod--` binds the minus key.
        parts.pop();
        name = "-".to_string();
    }
    if name.is_empty() {
        return None;
    }

    let mut present = [false; 5];
    for part in parts {
        let index = match part.to_ascii_lowercase().as_str() {
            "mod" | "cmdorctrl" => 0,
            "alt" | "a" | "option" => 1,
            "ctrl" | "c" | "control" => 2,
            "meta" | "m" | "cmd" => 3,
            "shift" | "s" => 4,
            _ => return None,
        };
        present[index] = true;
    }

    let name = if name.chars().count() == 1 {
        name.to_lowercase()
    } else {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => name,
        }
    };

    let mut out = String::new();
    for (modifier, on) in MODIFIERS.iter().zip(present) {
        if on {
            out.push_str(modifier);
            out.push('-');
        }
    }
    out.push_str(&name);
    Some(out)
}

/// Flat key table. The last binding of a combination wins.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    bindings: BTreeMap<String, KeyBinding>,
}

impl Keymap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, binding: KeyBinding) {
        let Some(key) = normalize_key(&binding.key) else {
            debug!(key = %binding.key, "Ignoring key binding with unknown modifier");
            return;
        };
        if self.bindings.contains_key(&key) {
            debug!(key = %key, "Key binding overridden by later registration");
        }
        self.bindings.insert(key.clone(), KeyBinding { key, ..binding });
    }

    pub fn get(&self, key: &str) -> Option<&KeyBinding> {
        self.bindings.get(&normalize_key(key)?)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Run the binding for `key`. Returns whether it handled the key.
    pub fn handle(&self, key: &str, state: &EditorState, dispatch: Dispatch<'_>) -> bool {
        let Some(binding) = self.get(key) else {
            return false;
        };
        if !state.is_editable() && !binding.read_only {
            debug!(key, "Refusing key binding on read-only state");
            return false;
        }
        (binding.command)(state, &Attrs::new(), dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::commands::command_fn;

    #[test]
    fn modifiers_are_reordered() {
        assert_eq!(normalize_key("Shift-Mod-b").as_deref(), Some("Mod-Shift-b"));
        assert_eq!(normalize_key("shift-ctrl-alt-Z").as_deref(), Some("Alt-Ctrl-Shift-z"));
        assert_eq!(normalize_key("mod-enter").as_deref(), Some("Mod-Enter"));
        assert_eq!(normalize_key("Mod--").as_deref(), Some("Mod--"));
        assert_eq!(normalize_key("Hyper-x"), None);
    }

    #[test]
    fn equivalent_spellings_collide() {
        let mut keymap = Keymap::new();
        keymap.insert(KeyBinding::new("Mod-Shift-x", command_fn(|_, _, _| false)));
        keymap.insert(KeyBinding::new("shift-mod-X", command_fn(|_, _, _| true)));
        assert_eq!(keymap.len(), 1);
        assert!(keymap.get("Mod-Shift-x").is_some());
    }
}
