//! GFM pipe tables.
//!
//! Cells hold paragraphs; the serializer writes each cell's paragraphs on
//! one line. Column alignment lives on every cell of the column.

use super::commands::{ancestor_of_type, attr_u64, insert_block_at};
use crate::editor::{command_fn, emit, Command, CommandFn, EditorState, Position, Selection, Transaction};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{GrammarOptions, MarkdownRule, MarkdownSerializerState, ParseRule};
use crate::model::{Attrs, Node};
use crate::schema::{AttributeSpec, NodeSpec, Schema};
use serde_json::Value;

const CELLS: [&str; 2] = ["th", "td"];
const MAX_DIMENSION: u64 = 100;

fn valid_alignment(value: &Value) -> bool {
    value.is_null() || matches!(value.as_str(), Some("left" | "center" | "right"))
}

fn alignment_attrs(alignment: &Value) -> Attrs {
    Attrs::from([("alignment".to_string(), alignment.clone())])
}

fn empty_cell(schema: &Schema, cell_type: &str, alignment: &Value) -> Option<Node> {
    schema
        .create_and_fill(cell_type, alignment_attrs(alignment), Vec::new())
        .ok()
}

/// Table, row and cell paths around the cursor.
struct CellContext {
    table: Vec<usize>,
    row: usize,
    column: usize,
}

fn cell_context(state: &EditorState) -> Option<CellContext> {
    let doc = state.doc();
    let cell = ancestor_of_type(doc, &state.selection().head.path, &CELLS)?;
    let (&column, row_path) = cell.split_last()?;
    let (&row, table) = row_path.split_last()?;
    (doc.node_at(table)?.node_type() == "table").then(|| CellContext {
        table: table.to_vec(),
        row,
        column,
    })
}

/// Replace the table at `path` with `table`, putting the cursor at the
/// start of the given cell.
fn replace_table(state: &EditorState, path: &[usize], table: Node, cursor: (usize, usize)) -> Option<Transaction> {
    let mut tr = state.tr();
    tr.replace_node(path, vec![table]).ok()?;
    let mut target = path.to_vec();
    target.extend([cursor.0, cursor.1, 0]);
    tr.set_selection(Selection::cursor(Position::new(target, 0)));
    Some(tr)
}

fn create_table() -> CommandFn {
    command_fn(|state, attrs, dispatch| {
        let rows = attr_u64(attrs, "rows").unwrap_or(3);
        let cols = attr_u64(attrs, "cols").unwrap_or(3);
        if rows == 0 || cols == 0 || rows > MAX_DIMENSION || cols > MAX_DIMENSION {
            return false;
        }
        let schema = state.schema();
        let build = || -> Option<Node> {
            let rows = (0..rows)
                .map(|r| {
                    let cell_type = if r == 0 { "th" } else { "td" };
                    let cells = (0..cols)
                        .map(|_| empty_cell(schema, cell_type, &Value::Null))
                        .collect::<Option<Vec<_>>>()?;
                    schema.node("tr", Attrs::new(), cells).ok()
                })
                .collect::<Option<Vec<_>>>()?;
            schema.node("table", Attrs::new(), rows).ok()
        };
        let Some(table) = build() else {
            return false;
        };
        match insert_block_at(state, table) {
            Some(tr) => emit(dispatch, tr),
            None => false,
        }
    })
}

fn add_row_after() -> CommandFn {
    command_fn(|state, _, dispatch| {
        let Some(ctx) = cell_context(state) else {
            return false;
        };
        let schema = state.schema();
        let Some(table) = state.doc().node_at(&ctx.table) else {
            return false;
        };
        let Some(row) = table.child(ctx.row) else {
            return false;
        };
        let cells = row
            .content()
            .iter()
            .map(|cell| empty_cell(schema, "td", cell.attr("alignment").unwrap_or(&Value::Null)))
            .collect::<Option<Vec<_>>>();
        let Some(new_row) = cells.and_then(|cells| schema.node("tr", Attrs::new(), cells).ok()) else {
            return false;
        };
        let mut rows = table.content().to_vec();
        rows.insert(ctx.row + 1, new_row);
        let Ok(new_table) = schema.replace_content(table, rows) else {
            return false;
        };
        match replace_table(state, &ctx.table, new_table, (ctx.row + 1, ctx.column)) {
            Some(tr) => emit(dispatch, tr),
            None => false,
        }
    })
}

fn add_column_after() -> CommandFn {
    command_fn(|state, _, dispatch| {
        let Some(ctx) = cell_context(state) else {
            return false;
        };
        let schema = state.schema();
        let Some(table) = state.doc().node_at(&ctx.table) else {
            return false;
        };
        let mut rows = Vec::with_capacity(table.child_count());
        for (r, row) in table.content().iter().enumerate() {
            let cell_type = if r == 0 { "th" } else { "td" };
            let alignment = row
                .child(ctx.column)
                .and_then(|c| c.attr("alignment"))
                .cloned()
                .unwrap_or(Value::Null);
            let Some(cell) = empty_cell(schema, cell_type, &alignment) else {
                return false;
            };
            let mut cells = row.content().to_vec();
            cells.insert((ctx.column + 1).min(cells.len()), cell);
            let Ok(new_row) = schema.replace_content(row, cells) else {
                return false;
            };
            rows.push(new_row);
        }
        let Ok(new_table) = schema.replace_content(table, rows) else {
            return false;
        };
        match replace_table(state, &ctx.table, new_table, (ctx.row, ctx.column + 1)) {
            Some(tr) => emit(dispatch, tr),
            None => false,
        }
    })
}

fn set_column_alignment() -> CommandFn {
    command_fn(|state, attrs, dispatch| {
        let alignment = attrs.get("alignment").cloned().unwrap_or(Value::Null);
        if !valid_alignment(&alignment) {
            return false;
        }
        let Some(ctx) = cell_context(state) else {
            return false;
        };
        let schema = state.schema();
        let Some(table) = state.doc().node_at(&ctx.table) else {
            return false;
        };
        let mut rows = Vec::with_capacity(table.child_count());
        for row in table.content() {
            let mut cells = row.content().to_vec();
            if let Some(cell) = cells.get_mut(ctx.column) {
                let mut cell_attrs = cell.attrs().clone();
                cell_attrs.insert("alignment".to_string(), alignment.clone());
                match schema.replace_attrs(cell, cell_attrs) {
                    Ok(updated) => *cell = updated,
                    Err(_) => return false,
                }
            }
            match schema.replace_content(row, cells) {
                Ok(new_row) => rows.push(new_row),
                Err(_) => return false,
            }
        }
        let Ok(new_table) = schema.replace_content(table, rows) else {
            return false;
        };
        let mut tr = state.tr();
        if tr.replace_node(&ctx.table, vec![new_table]).is_err() {
            return false;
        }
        tr.set_selection(state.selection().clone());
        emit(dispatch, tr)
    })
}

fn delete_table() -> CommandFn {
    command_fn(|state, _, dispatch| {
        let Some(ctx) = cell_context(state) else {
            return false;
        };
        let Ok(paragraph) = state.schema().node("paragraph", Attrs::new(), Vec::new()) else {
            return false;
        };
        let mut tr = state.tr();
        if tr.replace_node(&ctx.table, vec![paragraph]).is_err() {
            return false;
        }
        tr.set_selection(Selection::cursor(Position::new(ctx.table, 0)));
        emit(dispatch, tr)
    })
}

pub struct Table;

impl Extension for Table {
    fn name(&self) -> &str {
        "table"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().content("tr+").group("block"))
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.render_table(node)
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("table", "table"))
    }

    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        vec![MarkdownRule::Options(GrammarOptions::ENABLE_TABLES)]
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("create_table", create_table()),
            Command::new("add_row_after", add_row_after()),
            Command::new("add_column_after", add_column_after()),
            Command::new("set_column_alignment", set_column_alignment()),
            Command::new("delete_table", delete_table()),
        ]
    }
}

pub struct TableRow;

impl Extension for TableRow {
    fn name(&self) -> &str {
        "tr"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().content("(th | td)+"))
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.render_content(node)
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("tr", "tr"))
    }
}

/// Header (`th`) or body (`td`) cell.
pub struct TableCell {
    name: &'static str,
}

impl TableCell {
    pub fn header() -> Self {
        Self { name: "th" }
    }

    pub fn data() -> Self {
        Self { name: "td" }
    }
}

impl Extension for TableCell {
    fn name(&self) -> &str {
        self.name
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .content("paragraph+")
                .attr(
                    "alignment",
                    AttributeSpec::with_default(Value::Null).validate(valid_alignment),
                ),
        )
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.render_content(node)
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block(self.name, self.name))
    }
}
