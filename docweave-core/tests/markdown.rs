use docweave_core::{Attrs, Engine, Mark, Node};
use serde_json::{json, Value};

fn engine() -> Engine {
    Engine::with_defaults().unwrap()
}

fn attrs(value: Value) -> Attrs {
    value
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn text(engine: &Engine, s: &str, marks: &[Mark]) -> Node {
    engine.schema().text(s, marks).unwrap()
}

fn node(engine: &Engine, name: &str, attrs: Attrs, content: Vec<Node>) -> Node {
    engine.schema().node(name, attrs, content).unwrap()
}

fn mark(engine: &Engine, name: &str) -> Mark {
    engine.schema().mark(name, Attrs::new()).unwrap()
}

fn paragraph(engine: &Engine, content: Vec<Node>) -> Node {
    node(engine, "paragraph", Attrs::new(), content)
}

fn doc(engine: &Engine, content: Vec<Node>) -> Node {
    node(engine, "doc", Attrs::new(), content)
}

#[test]
fn emphasis_after_plain_text() {
    let e = engine();
    let em = mark(&e, "em");
    let d = doc(
        &e,
        vec![paragraph(&e, vec![text(&e, "hello ", &[]), text(&e, "world", &[em])])],
    );
    insta::assert_snapshot!(e.serialize(&d).unwrap(), @"hello *world*");
}

#[test]
fn tight_list_of_inline_code() {
    let e = engine();
    let code = mark(&e, "code_inline");
    let item = |e: &Engine| {
        node(
            e,
            "list_item",
            Attrs::new(),
            vec![paragraph(e, vec![text(e, "x", &[code.clone()])])],
        )
    };
    let d = doc(
        &e,
        vec![node(&e, "bullet_list", Attrs::new(), vec![item(&e), item(&e)])],
    );
    insta::assert_snapshot!(e.serialize(&d).unwrap(), @r"
    - `x`
    - `x`
    ");
}

#[test]
fn header_alignment_sets_separator() {
    let e = engine();
    let cell = |e: &Engine, name: &str, s: &str, alignment: Value| {
        node(
            e,
            name,
            attrs(json!({ "alignment": alignment })),
            vec![paragraph(e, vec![text(e, s, &[])])],
        )
    };
    let header = node(
        &e,
        "tr",
        Attrs::new(),
        vec![cell(&e, "th", "a", Value::Null), cell(&e, "th", "b", json!("right"))],
    );
    let body = node(
        &e,
        "tr",
        Attrs::new(),
        vec![cell(&e, "td", "c", Value::Null), cell(&e, "td", "d", Value::Null)],
    );
    let d = doc(&e, vec![node(&e, "table", Attrs::new(), vec![header, body])]);
    let md = e.serialize(&d).unwrap();
    let separator = md.lines().nth(1).unwrap();
    let segments: Vec<&str> = separator.split('|').filter(|s| !s.is_empty()).collect();
    assert_eq!(segments[1], "---:");
    insta::assert_snapshot!(md, @r"
    | a | b |
    |----|---:|
    | c | d |
    ");
}

#[test]
fn display_math_round_trips_byte_for_byte() {
    let e = engine();
    let input = "$$\nE=mc^2\n$$";
    let parsed = e.parse(input);
    assert_eq!(parsed.child_count(), 1);
    let block = parsed.child(0).unwrap();
    assert_eq!(block.node_type(), "math_block");
    assert_eq!(block.text_content(), "E=mc^2");
    assert_eq!(e.serialize(&parsed).unwrap(), input);
}

const CANONICAL_SAMPLES: &[(&str, &str)] = &[
    ("paragraph", "Plain paragraph"),
    ("heading", "## Section"),
    ("blockquote", "> quoted"),
    ("bullet_list", "- one\n- two"),
    ("ordered_list", "1. one\n2. two"),
    ("checkbox_list", "- [ ] todo\n- [x] done"),
    ("code_block", "```rust\nfn main() {}\n```"),
    ("horizontal_rule", "---"),
    ("hard_break", "one\\\ntwo"),
    ("image", "![alt](pic.png \"Title\")"),
    ("table", "| a | b |\n|----|---:|\n| c | d |"),
    ("math_block", "$$\n\\int x\n$$"),
    ("math_inline", "Euler $e^{i\\pi}$ here"),
    ("mention", "Hi @[Ada](mention://user/42)"),
    ("container_notice", ":::warning\nCareful\n:::"),
    ("embed", "[https://youtu.be/abc](https://youtu.be/abc)"),
    ("link", "[site](https://example.com \"Home\")"),
    ("em", "*soft*"),
    ("strong", "**loud**"),
    ("strikethrough", "~~gone~~"),
    ("code_inline", "`let x = 1;`"),
];

#[test]
fn every_type_round_trips() {
    let e = engine();
    for (name, sample) in CANONICAL_SAMPLES {
        let parsed = e.parse(sample);
        let mut seen = false;
        parsed.descendants(&mut |n, _| {
            seen |= n.node_type() == *name || n.has_mark(name);
        });
        assert!(seen, "{name}: sample did not produce the type");

        let serialized = e.serialize(&parsed).unwrap();
        assert_eq!(&serialized, sample, "{name}: output is not canonical");
        assert_eq!(e.parse(&serialized), parsed, "{name}: tree changed on re-parse");
    }
}

#[test]
fn serialization_is_idempotent() {
    let e = engine();
    let input = "# Notes\n\nSome *mixed* **text** with `code` and a [link](https://example.com).\n\n\
                 > A quote\n> over lines\n\n1. first\n2. second\n   - nested\n\n\
                 :::tip\nInside a notice\n:::\n\n| h1 | h2 |\n|:--|:-:|\n| a | b |";
    let once = e.normalize(input).unwrap();
    let twice = e.normalize(&once).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn mark_order_does_not_change_output() {
    let e = engine();
    let (em, strong) = (mark(&e, "em"), mark(&e, "strong"));
    let first = doc(
        &e,
        vec![paragraph(&e, vec![text(&e, "both", &[em.clone(), strong.clone()])])],
    );
    let second = doc(&e, vec![paragraph(&e, vec![text(&e, "both", &[strong, em])])]);
    assert_eq!(e.serialize(&first).unwrap(), e.serialize(&second).unwrap());
}

#[test]
fn second_paragraph_makes_the_list_loose() {
    let e = engine();
    assert_eq!(e.normalize("- a\n- b").unwrap(), "- a\n- b");
    let loose = e.normalize("- a\n\n  more\n- b").unwrap();
    insta::assert_snapshot!(loose, @r"
    - a

      more

    - b
    ");
}

#[test]
fn pipes_in_cells_are_escaped() {
    let e = engine();
    let input = "| x |\n|----|\n| a\\|b |";
    let parsed = e.parse(input);
    let cell = parsed.node_at(&[0, 1, 0]).unwrap();
    assert_eq!(cell.text_content(), "a|b");
    assert_eq!(e.serialize(&parsed).unwrap(), input);
}

#[test]
fn unknown_syntax_degrades_quietly() {
    let e = engine();
    let parsed = e.parse("Footnote[^1]\n\n[^1]: gone");
    assert_eq!(parsed.node_type(), "doc");
    assert!(parsed.text_content().starts_with("Footnote"));
}

#[test]
fn pasted_block_syntax_stays_inline() {
    let e = engine();
    let nodes = e.parse_paste("# not a heading");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].node_type(), "paragraph");
    assert_eq!(nodes[0].text_content(), "# not a heading");
}

#[test]
fn adjacent_lists_stay_apart() {
    let e = engine();
    for input in ["- a\n\n\n* b", "1. a\n\n\n1) b"] {
        let parsed = e.parse(input);
        assert_eq!(parsed.child_count(), 2, "{input:?}");
        assert_eq!(e.serialize(&parsed).unwrap(), input);
    }
}

#[test]
fn checklist_before_bullets_keeps_its_checks() {
    let e = engine();
    let parsed = e.parse("- [x] done\n\n* plain");
    let kinds: Vec<&str> = parsed.content().iter().map(Node::node_type).collect();
    assert_eq!(kinds, ["checkbox_list", "bullet_list"]);
    assert!(parsed.node_at(&[0, 0]).unwrap().attr_bool("checked"));

    let once = e.serialize(&parsed).unwrap();
    assert_eq!(once, "- [x] done\n\n* plain");
    assert_eq!(e.parse(&once), parsed);
}

#[test]
fn fenced_blocks_nest_in_quotes_and_items() {
    let e = engine();
    let cases: [(&str, &[usize], &str); 4] = [
        ("> $$\n> x^2\n> $$", &[0, 0], "math_block"),
        ("> :::tip\n> Inside\n> :::", &[0, 0], "container_notice"),
        ("- one\n\n  $$\n  x^2\n  $$", &[0, 0, 1], "math_block"),
        ("1. one\n\n   :::tip\n   Inside\n   :::", &[0, 0, 1], "container_notice"),
    ];
    for (input, path, kind) in cases {
        let parsed = e.parse(input);
        assert_eq!(parsed.node_at(path).unwrap().node_type(), kind, "{input:?}");
        assert_eq!(e.serialize(&parsed).unwrap(), input);
        assert_eq!(e.parse(&e.serialize(&parsed).unwrap()), parsed);
    }
}

#[test]
fn literal_dollars_stay_text() {
    let e = engine();
    let d = doc(&e, vec![paragraph(&e, vec![text(&e, "between $a$ and", &[])])]);
    let out = e.serialize(&d).unwrap();
    insta::assert_snapshot!(out, @r"between \$a\$ and");

    let parsed = e.parse(&out);
    let para = parsed.child(0).unwrap();
    assert_eq!(para.child_count(), 1);
    assert_eq!(para.text_content(), "between $a$ and");
}

#[test]
fn nested_document_normalizes_once() {
    let e = engine();
    let input = "> Quote with $$ inline dollars\n>\n> $$\n> a+b\n> $$\n\n\
                 - [ ] task\n- [x] $$ done\n\n\
                 * other\n\n\
                 1. one\n\n   :::warning\n   Careful\n   :::\n\n\
                 1) two";
    let once = e.normalize(input).unwrap();
    let twice = e.normalize(&once).unwrap();
    assert_eq!(once, twice);
    assert_eq!(e.parse(&once), e.parse(&twice));
}
