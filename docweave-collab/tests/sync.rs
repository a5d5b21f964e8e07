use docweave_collab::{
    apply_remote_update, attach, BindingState, CollabBinding, CollabError, MemoryTransport, SharedBinding,
    SyncOutcome, SyncPlugin, SYNC_PLUGIN_KEY,
};
use docweave_core::{Editor, Engine, EngineConfig, Position, Selection};
use loro::LoroDoc;
use parking_lot::Mutex;
use std::sync::Arc;

fn engine() -> Arc<Engine> {
    let config = EngineConfig {
        disabled: vec!["trailing_node".to_string()],
        ..EngineConfig::default()
    };
    Arc::new(Engine::from_config(&config).unwrap())
}

struct Peer {
    editor: Editor,
    binding: SharedBinding,
    transport: Arc<MemoryTransport>,
}

impl Peer {
    fn join(engine: &Arc<Engine>, markdown: &str, actor: &str, doc: Arc<LoroDoc>) -> Self {
        let mut editor = Editor::from_markdown(engine.clone(), markdown);
        let binding = Arc::new(Mutex::new(CollabBinding::new(doc, engine.schema().clone(), actor)));
        let transport = Arc::new(MemoryTransport::new());
        attach(&mut editor, binding.clone(), transport.clone()).unwrap();
        Self {
            editor,
            binding,
            transport,
        }
    }

    fn type_at(&mut self, path: Vec<usize>, offset: usize, text: &str) {
        self.editor
            .select(Selection::cursor(Position::new(path, offset)))
            .unwrap();
        self.editor.type_text(text).unwrap();
    }

    fn receive(&mut self, updates: &[Vec<u8>]) {
        for update in updates {
            apply_remote_update(&mut self.editor, &self.binding, update).unwrap();
        }
    }

    fn markdown(&self) -> String {
        self.editor.markdown().unwrap()
    }

    fn last_outcome(&self) -> Option<SyncOutcome> {
        self.editor
            .plugin_as::<SyncPlugin>(SYNC_PLUGIN_KEY)
            .and_then(SyncPlugin::last_outcome)
    }
}

/// Peer `a` seeds the shared document; peer `b` starts from a copy of it.
fn pair() -> (Peer, Peer) {
    let engine = engine();
    let a = Peer::join(&engine, "# Title\n\nBody", "ada", Arc::new(LoroDoc::new()));
    let seed = a.transport.take();
    assert_eq!(seed.len(), 1);

    let doc_b = Arc::new(LoroDoc::new());
    for update in &seed {
        doc_b.import(update).unwrap();
    }
    let b = Peer::join(&engine, "", "grace", doc_b);
    (a, b)
}

#[test]
fn second_peer_adopts_shared_content() {
    let (a, b) = pair();
    assert_eq!(b.markdown(), "# Title\n\nBody");
    assert_eq!(b.markdown(), a.markdown());
    // Adopting is a remote change: nothing to undo, nothing sent back.
    assert_eq!(b.editor.state().history().undo_depth(), 0);
    assert!(b.transport.is_empty());
    assert_eq!(b.binding.lock().state(), BindingState::Bound);
}

#[test]
fn concurrent_edits_converge() {
    let (mut a, mut b) = pair();
    a.type_at(vec![1], 4, "!");
    b.type_at(vec![0], 5, " two");
    assert_eq!(a.last_outcome(), Some(SyncOutcome::Sent));

    let from_a = a.transport.take();
    let from_b = b.transport.take();
    a.receive(&from_b);
    b.receive(&from_a);

    assert_eq!(a.markdown(), "# Title two\n\nBody!");
    assert_eq!(b.markdown(), a.markdown());
    // Remote edits never enter the local history.
    assert_eq!(a.editor.state().history().undo_depth(), 1);
}

#[test]
fn typing_in_the_same_paragraph_merges_per_character() {
    let (mut a, mut b) = pair();
    a.type_at(vec![1], 0, "A");
    b.type_at(vec![1], 4, "B");

    let from_a = a.transport.take();
    let from_b = b.transport.take();
    a.receive(&from_b);
    b.receive(&from_a);

    assert_eq!(a.markdown(), "# Title\n\nABodyB");
    assert_eq!(b.markdown(), a.markdown());
}

#[test]
fn formatting_survives_concurrent_typing() {
    let engine = engine();
    let mut a = Peer::join(&engine, "**Bo**dy", "ada", Arc::new(LoroDoc::new()));
    let doc_b = Arc::new(LoroDoc::new());
    for update in &a.transport.take() {
        doc_b.import(update).unwrap();
    }
    let mut b = Peer::join(&engine, "", "grace", doc_b);
    a.type_at(vec![0], 3, "z");
    b.type_at(vec![0], 4, "y");

    let from_a = a.transport.take();
    let from_b = b.transport.take();
    a.receive(&from_b);
    b.receive(&from_a);

    assert_eq!(a.markdown(), "**Bo**dzyy");
    assert_eq!(b.markdown(), a.markdown());
}

#[test]
fn imported_updates_are_not_sent_back() {
    let (mut a, mut b) = pair();
    b.type_at(vec![0], 5, " two");
    a.receive(&b.transport.take());
    assert!(a.transport.is_empty());

    a.type_at(vec![1], 4, "!");
    let from_a = a.transport.take();
    assert_eq!(from_a.len(), 1);

    // `a`'s update carries none of `b`'s operations.
    let observer = LoroDoc::new();
    for update in &from_a {
        let _ = observer.import(update);
    }
    let b_peer = b.binding.lock().doc().peer_id();
    assert!(observer.oplog_vv().get(&b_peer).is_none());

    // `b` still applies `a`'s edit on top of its own.
    b.receive(&from_a);
    assert_eq!(b.markdown(), "# Title two\n\nBody!");
    assert_eq!(a.markdown(), b.markdown());
}

#[test]
fn block_inserts_from_both_peers_survive() {
    let (mut a, mut b) = pair();
    a.type_at(vec![1], 4, "");
    assert!(a.editor.run_command("hr", &Default::default()).unwrap());
    b.type_at(vec![0], 0, "");
    assert!(b.editor.run_command("hr", &Default::default()).unwrap());

    let from_a = a.transport.take();
    let from_b = b.transport.take();
    a.receive(&from_b);
    b.receive(&from_a);

    assert_eq!(a.markdown(), b.markdown());
    let rules = a
        .editor
        .doc()
        .content()
        .iter()
        .filter(|n| n.node_type() == "horizontal_rule")
        .count();
    assert_eq!(rules, 2);
}

#[test]
fn actor_is_recorded_once_and_only_after_a_change() {
    let (mut a, mut b) = pair();
    // Seeding is not attributed.
    assert!(a.binding.lock().actors().is_empty());

    a.type_at(vec![1], 4, "ab");
    let actors = a.binding.lock().actors();
    assert_eq!(actors.len(), 1);
    let peer = a.binding.lock().doc().peer_id().to_string();
    assert_eq!(actors.get(&peer).map(String::as_str), Some("ada"));

    // `b` made no change, so it has no record even after syncing.
    let from_a = a.transport.take();
    b.receive(&from_a);
    let actors = b.binding.lock().actors();
    assert_eq!(actors.len(), 1);
    assert_eq!(actors.values().next().map(String::as_str), Some("ada"));
}

#[test]
fn closed_transport_defers_until_rebind() {
    let (mut a, mut b) = pair();
    a.transport.close();
    a.type_at(vec![1], 4, " offline");

    assert_eq!(a.last_outcome(), Some(SyncOutcome::Deferred));
    assert!(a.binding.lock().is_pending());
    assert!(a.transport.is_empty());
    assert_eq!(a.markdown(), "# Title\n\nBody offline");
    // The edit still lands in the local undo history.
    assert_eq!(a.editor.state().history().undo_depth(), " offline".len());

    let fresh = Arc::new(MemoryTransport::new());
    let doc = a.editor.doc().clone();
    let outcome = a.binding.lock().rebind(fresh.clone(), &doc).unwrap();
    assert_eq!(outcome, SyncOutcome::Sent);
    assert!(!a.binding.lock().is_pending());

    b.receive(&fresh.take());
    assert_eq!(b.markdown(), "# Title\n\nBody offline");
}

#[test]
fn destroying_the_editor_tears_the_binding_down() {
    let (mut a, b) = pair();
    let binding = a.binding.clone();
    a.editor.destroy();
    assert_eq!(binding.lock().state(), BindingState::TornDown);

    let state = b.editor.state().clone();
    assert!(matches!(
        binding.lock().on_remote_change(&[], &state),
        Err(CollabError::TornDown)
    ));
}
