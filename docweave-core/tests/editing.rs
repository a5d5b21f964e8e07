use docweave_core::editor::{command_fn, emit, Command, KeyBinding};
use docweave_core::extensions::{default_extensions, FindState, FIND_PLUGIN_KEY};
use docweave_core::{Attrs, Editor, Engine, Extension, Position, Selection};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn engine() -> Arc<Engine> {
    Arc::new(Engine::with_defaults().unwrap())
}

fn attrs(value: Value) -> Attrs {
    value
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn cursor(path: Vec<usize>, offset: usize) -> Selection {
    Selection::cursor(Position::new(path, offset))
}

fn block_types(editor: &Editor) -> Vec<String> {
    editor
        .doc()
        .content()
        .iter()
        .map(|n| n.node_type().to_string())
        .collect()
}

#[test]
fn read_only_sessions_refuse_edits_but_allow_queries() {
    let mut editor = Editor::from_markdown(engine(), "some text");
    editor.set_editable(false);
    editor.select(Selection::new(
        Position::new(vec![0], 0),
        Position::new(vec![0], 4),
    ))
    .unwrap();

    assert!(!editor.run_command("strong", &Attrs::new()).unwrap());
    assert!(!editor.handle_key("Backspace").unwrap());
    assert!(!editor.handle_text_input("x").unwrap());
    assert_eq!(editor.markdown().unwrap(), "some text");

    assert!(editor.run_command("select_all", &Attrs::new()).unwrap());
    assert!(editor.run_command("find", &attrs(json!({"query": "text"}))).unwrap());
}

struct Shout;

impl Extension for Shout {
    fn name(&self) -> &str {
        "shout"
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::from_fn("strong", |state, _, dispatch| {
            let mut tr = state.tr();
            tr.insert_text("!", &[]).unwrap();
            emit(dispatch, tr)
        })]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new(
            "Mod-b",
            command_fn(|state, _, dispatch| {
                let mut tr = state.tr();
                tr.insert_text("?", &[]).unwrap();
                emit(dispatch, tr)
            }),
        )]
    }
}

#[test]
fn later_registrations_win_collisions() {
    let mut extensions = default_extensions();
    extensions.push(Box::new(Shout));
    let engine = Arc::new(Engine::new(extensions).unwrap());
    let mut editor = Editor::from_markdown(engine, "hi");
    editor.select(cursor(vec![0], 2)).unwrap();

    assert!(editor.run_command("strong", &Attrs::new()).unwrap());
    assert!(editor.handle_key("Mod-b").unwrap());
    assert_eq!(editor.markdown().unwrap(), "hi!?");
}

#[test]
fn typing_a_heading_prefix_converts_the_block() {
    let mut editor = Editor::from_markdown(engine(), "");
    editor.select(cursor(vec![0], 0)).unwrap();
    editor.type_text("## Title").unwrap();

    let heading = editor.doc().child(0).unwrap();
    assert_eq!(heading.node_type(), "heading");
    assert_eq!(heading.attr_u64("level"), Some(2));
    assert_eq!(heading.text_content(), "Title");
}

#[test]
fn typing_delimiters_applies_marks() {
    let mut editor = Editor::from_markdown(engine(), "");
    editor.select(cursor(vec![0], 0)).unwrap();
    editor.type_text("**bold** and `code`").unwrap();
    assert_eq!(editor.markdown().unwrap(), "**bold** and `code`");
}

#[test]
fn smart_text_replaces_dashes() {
    let mut editor = Editor::from_markdown(engine(), "");
    editor.select(cursor(vec![0], 0)).unwrap();
    editor.type_text("a -- b").unwrap();
    assert_eq!(editor.doc().text_content(), "a — b");
}

#[test]
fn no_input_rules_inside_code_blocks() {
    let mut editor = Editor::from_markdown(engine(), "```\nx\n```");
    assert_eq!(block_types(&editor), vec!["code_block"]);
    editor.select(cursor(vec![0], 1)).unwrap();
    editor.type_text(" -- **b**").unwrap();
    assert_eq!(editor.doc().child(0).unwrap().text_content(), "x -- **b**");
}

#[test]
fn undo_and_redo_walk_the_history() {
    let mut editor = Editor::from_markdown(engine(), "");
    editor.select(cursor(vec![0], 0)).unwrap();
    editor.type_text("abc").unwrap();

    assert!(editor.run_command("undo", &Attrs::new()).unwrap());
    assert_eq!(editor.doc().text_content(), "ab");
    assert!(editor.handle_key("Mod-z").unwrap());
    assert_eq!(editor.doc().text_content(), "a");
    assert!(editor.run_command("redo", &Attrs::new()).unwrap());
    assert_eq!(editor.doc().text_content(), "ab");
    assert_eq!(editor.state().history().redo_depth(), 1);

    editor.type_text("x").unwrap();
    assert_eq!(editor.state().history().redo_depth(), 0);
    assert!(!editor.run_command("redo", &Attrs::new()).unwrap());
}

#[test]
fn plugin_follow_ups_are_queued_after_the_current_dispatch() {
    let mut editor = Editor::from_markdown(engine(), "x");
    editor.select(cursor(vec![0], 1)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    editor.subscribe(move |state, _| {
        let types: Vec<String> = state
            .doc()
            .content()
            .iter()
            .map(|n| n.node_type().to_string())
            .collect();
        log.lock().unwrap().push(types);
    });

    assert!(editor.run_command("hr", &Attrs::new()).unwrap());
    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            vec!["paragraph", "horizontal_rule"],
            vec!["paragraph", "horizontal_rule", "paragraph"],
        ]
    );

    // The trailing paragraph is not part of the undoable change.
    assert!(editor.run_command("undo", &Attrs::new()).unwrap());
    assert_eq!(block_types(&editor), vec!["paragraph", "paragraph"]);
}

#[test]
fn enter_at_the_end_of_a_heading_starts_a_paragraph() {
    let mut editor = Editor::from_markdown(engine(), "# Title");
    editor.select(cursor(vec![0], 5)).unwrap();
    assert!(editor.handle_key("Enter").unwrap());
    assert_eq!(block_types(&editor), vec!["heading", "paragraph"]);
    assert_eq!(editor.state().selection().head, Position::new(vec![1], 0));

    // Backspace at the start of a heading resets it.
    editor.select(cursor(vec![0], 0)).unwrap();
    assert!(editor.handle_key("Backspace").unwrap());
    assert_eq!(block_types(&editor), vec!["paragraph", "paragraph"]);
}

#[test]
fn list_items_split_and_lift() {
    let mut editor = Editor::from_markdown(engine(), "- one");
    editor.select(cursor(vec![0, 0, 0], 3)).unwrap();
    assert!(editor.handle_key("Enter").unwrap());
    editor.type_text("two").unwrap();
    assert_eq!(editor.markdown().unwrap(), "- one\n- two");

    // Enter in an empty item leaves the list.
    assert!(editor.handle_key("Enter").unwrap());
    assert_eq!(editor.doc().child(0).unwrap().child_count(), 3);
    assert!(editor.handle_key("Enter").unwrap());
    assert_eq!(editor.doc().child(0).unwrap().child_count(), 2);
    assert_eq!(block_types(&editor)[1], "paragraph");
    assert_eq!(editor.state().selection().head, Position::new(vec![1], 0));
}

#[test]
fn find_results_follow_the_document() {
    let mut editor = Editor::from_markdown(engine(), "cat and cat");
    assert!(editor.run_command("find", &attrs(json!({"query": "cat"}))).unwrap());
    let state = editor.plugin_as::<FindState>(FIND_PLUGIN_KEY).unwrap();
    assert_eq!(state.matches().len(), 2);

    let replace = attrs(json!({"query": "cat", "replacement": "dog"}));
    assert!(editor.run_command("replace", &replace).unwrap());
    assert_eq!(editor.markdown().unwrap(), "dog and cat");
    let state = editor.plugin_as::<FindState>(FIND_PLUGIN_KEY).unwrap();
    assert_eq!(state.matches().len(), 1);

    assert!(editor.run_command("replace_all", &replace).unwrap());
    assert_eq!(editor.markdown().unwrap(), "dog and dog");
    assert!(!editor.run_command("replace_all", &replace).unwrap());

    assert!(editor.run_command("clear_search", &Attrs::new()).unwrap());
    let state = editor.plugin_as::<FindState>(FIND_PLUGIN_KEY).unwrap();
    assert!(state.query().is_none());
    assert!(state.matches().is_empty());
}

#[test]
fn destroyed_editors_reject_dispatch() {
    let mut editor = Editor::from_markdown(engine(), "x");
    editor.destroy();
    assert!(editor.run_command("select_all", &Attrs::new()).is_err());
}
