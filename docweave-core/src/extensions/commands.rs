//! Command constructors shared by the built-in descriptors.

use crate::editor::{command_fn, emit, CommandFn, EditorState, Position, Selection, Transaction};
use crate::model::{inline, Attrs, Node};
use crate::schema::Schema;
use serde_json::Value;

pub(crate) const LIST_ITEMS: [&str; 2] = ["list_item", "checkbox_item"];
pub(crate) const LISTS: [&str; 3] = ["bullet_list", "ordered_list", "checkbox_list"];

/// Deepest ancestor-or-self of `path` whose type is in `types`.
pub(crate) fn ancestor_of_type(doc: &Node, path: &[usize], types: &[&str]) -> Option<Vec<usize>> {
    (0..=path.len())
        .rev()
        .map(|depth| &path[..depth])
        .find(|prefix| {
            doc.node_at(prefix)
                .is_some_and(|n| types.contains(&n.node_type()))
        })
        .map(<[usize]>::to_vec)
}

/// Textblocks touched by the selection.
pub(crate) fn selected_textblocks(state: &EditorState) -> Vec<Vec<usize>> {
    let selection = state.selection();
    let (from, to) = (&selection.from().path, &selection.to().path);
    crate::editor::textblocks(state.doc(), state.schema())
        .into_iter()
        .filter(|p| p >= from && p <= to)
        .collect()
}

pub(crate) fn attr_string(attrs: &Attrs, key: &str) -> Option<String> {
    attrs.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn attr_u64(attrs: &Attrs, key: &str) -> Option<u64> {
    attrs.get(key).and_then(Value::as_u64)
}

/// Set the type of every selected textblock. With `toggle`, blocks that
/// already match are turned back into paragraphs.
pub(crate) fn set_block<F>(node_type: &'static str, toggle: bool, attrs: F) -> CommandFn
where
    F: Fn(&Attrs) -> Option<Attrs> + Send + Sync + 'static,
{
    command_fn(move |state, cmd_attrs, dispatch| {
        let Some(target_attrs) = attrs(cmd_attrs) else {
            return false;
        };
        let schema = state.schema();
        let blocks = selected_textblocks(state);
        if blocks.is_empty() {
            return false;
        }
        let all_match = blocks.iter().all(|path| {
            state.doc().node_at(path).is_some_and(|n| {
                n.node_type() == node_type && target_attrs.iter().all(|(k, v)| n.attr(k) == Some(v))
            })
        });
        if all_match && !toggle {
            return false;
        }
        let (name, new_attrs) = if all_match {
            ("paragraph", Attrs::new())
        } else {
            (node_type, target_attrs)
        };
        if schema.node_type(name).is_none() {
            return false;
        }

        let mut tr = state.tr();
        for path in &blocks {
            if tr.set_block_type(path, name, new_attrs.clone()).is_err() {
                return false;
            }
        }
        tr.set_selection(state.selection().clone());
        emit(dispatch, tr)
    })
}

/// Insert an inline node built from the command attributes at the cursor.
pub(crate) fn insert_inline<F>(build: F) -> CommandFn
where
    F: Fn(&Schema, &Attrs) -> Option<Node> + Send + Sync + 'static,
{
    command_fn(move |state, attrs, dispatch| {
        if !state.selection().is_in_one_block() {
            return false;
        }
        let Some(block) = state.head_block() else {
            return false;
        };
        let Some(node) = build(state.schema(), attrs) else {
            return false;
        };
        let allowed = state
            .schema()
            .node_type(block.node_type())
            .is_some_and(|t| t.content_expr().allows(node.node_type()));
        if !allowed {
            return false;
        }
        let mut tr = state.tr();
        if tr.insert_inline(node).is_err() {
            return false;
        }
        emit(dispatch, tr)
    })
}

/// Place `node` after the block holding the cursor, at the deepest level
/// that accepts it. An empty paragraph at the cursor is replaced instead.
pub(crate) fn insert_block_at(state: &EditorState, node: Node) -> Option<Transaction> {
    let head = &state.selection().head;
    let path = head.path.clone();
    let block = state.doc().node_at(&path)?;

    if block.node_type() == "paragraph" && block.child_count() == 0 {
        let mut tr = state.tr();
        if tr.replace_node(&path, vec![node.clone()]).is_ok() {
            return Some(tr);
        }
    }
    for depth in (1..=path.len()).rev() {
        let parent = path[..depth - 1].to_vec();
        let index = path[depth - 1];
        let mut tr = state.tr();
        if tr.replace(parent, index + 1, index + 1, vec![node.clone()]).is_ok() {
            return Some(tr);
        }
    }
    None
}

pub(crate) fn insert_block<F>(build: F) -> CommandFn
where
    F: Fn(&Schema, &Attrs) -> Option<Node> + Send + Sync + 'static,
{
    command_fn(move |state, attrs, dispatch| {
        let Some(node) = build(state.schema(), attrs) else {
            return false;
        };
        match insert_block_at(state, node) {
            Some(tr) => emit(dispatch, tr),
            None => false,
        }
    })
}

/// Wrap the cursor's block in `wrapper`, or unwrap when already inside one.
pub(crate) fn toggle_wrap<F>(wrapper: &'static str, attrs: F) -> CommandFn
where
    F: Fn(&Attrs) -> Option<Attrs> + Send + Sync + 'static,
{
    command_fn(move |state, cmd_attrs, dispatch| {
        let Some(wrap_attrs) = attrs(cmd_attrs) else {
            return false;
        };
        let doc = state.doc();
        let head = state.selection().head.clone();
        let mut tr = state.tr();

        if let Some(path) = ancestor_of_type(doc, &head.path, &[wrapper]) {
            let Some(existing) = doc.node_at(&path) else {
                return false;
            };
            let same_attrs = wrap_attrs.iter().all(|(k, v)| existing.attr(k) == Some(v));
            if same_attrs {
                // Unwrap.
                let children = existing.content().to_vec();
                let inner = head.path[path.len()..].to_vec();
                if tr.replace_node(&path, children).is_err() {
                    return false;
                }
                let mut cursor = path.clone();
                if let Some(last) = cursor.last_mut() {
                    *last += inner.first().copied().unwrap_or(0);
                }
                cursor.extend(inner.iter().skip(1));
                tr.set_selection(Selection::cursor(Position::new(cursor, head.offset)));
            } else {
                let mut merged = existing.attrs().clone();
                merged.extend(wrap_attrs);
                if tr.set_node_attrs(&path, merged).is_err() {
                    return false;
                }
            }
            return emit(dispatch, tr);
        }

        if head.path.is_empty() || tr.wrap_block(&head.path, wrapper, wrap_attrs, None).is_err() {
            return false;
        }
        emit(dispatch, tr)
    })
}

/// Toggle a list type around the cursor's block: lift out of a list of the
/// same type, convert a list of another type, or wrap.
pub(crate) fn toggle_list(list: &'static str, item: &'static str) -> CommandFn {
    command_fn(move |state, attrs, dispatch| {
        let doc = state.doc();
        let schema = state.schema();
        let head = state.selection().head.clone();
        let mut tr = state.tr();

        if let Some(list_path) = ancestor_of_type(doc, &head.path, &LISTS) {
            let Some(existing) = doc.node_at(&list_path) else {
                return false;
            };
            if existing.node_type() == list {
                return lift_item(state, dispatch);
            }
            let Some(converted) = convert_list(schema, existing, list, item) else {
                return false;
            };
            if tr.replace_node(&list_path, vec![converted]).is_err() {
                return false;
            }
            tr.set_selection(state.selection().clone());
            return emit(dispatch, tr);
        }

        let mut list_attrs = Attrs::new();
        if let Some(start) = attr_u64(attrs, "start") {
            list_attrs.insert("start".into(), start.into());
        }
        if tr
            .wrap_block(&head.path, list, list_attrs, Some(item))
            .is_err()
        {
            return false;
        }
        emit(dispatch, tr)
    })
}

/// Rebuild a list as another list type, converting its items.
fn convert_list(schema: &Schema, list: &Node, to_list: &str, to_item: &str) -> Option<Node> {
    let items = list
        .content()
        .iter()
        .map(|item| schema.node(to_item, Attrs::new(), item.content().to_vec()).ok())
        .collect::<Option<Vec<_>>>()?;
    schema.node(to_list, Attrs::new(), items).ok()
}

/// Move the item holding the cursor one level out. At the top level the
/// item's blocks replace it and the list is split around them.
pub(crate) fn lift_item(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let doc = state.doc();
    let schema = state.schema();
    let head = state.selection().head.clone();
    let Some(item_path) = ancestor_of_type(doc, &head.path, &LIST_ITEMS) else {
        return false;
    };
    let Some((&index, list_path)) = item_path.split_last() else {
        return false;
    };
    let (Some(list), Some(item)) = (doc.node_at(list_path), doc.node_at(&item_path)) else {
        return false;
    };
    let inner = head.path[item_path.len()..].to_vec();
    let mut tr = state.tr();

    let outer_item = ancestor_of_type(doc, list_path, &LIST_ITEMS).filter(|p| p.len() + 1 == list_path.len());
    if let Some(outer_path) = outer_item {
        // Nested: move after the enclosing item, taking later siblings along
        // as a nested list.
        let Some(outer) = doc.node_at(&outer_path) else {
            return false;
        };
        let Some((&outer_index, outer_list_path)) = outer_path.split_last() else {
            return false;
        };
        let before: Vec<Node> = list.content()[..index].to_vec();
        let after: Vec<Node> = list.content()[index + 1..].to_vec();

        let mut outer_content: Vec<Node> = outer.content().to_vec();
        let list_child = list_path[list_path.len() - 1];
        if before.is_empty() {
            outer_content.remove(list_child);
        } else {
            let Ok(rest) = schema.replace_content(list, before) else {
                return false;
            };
            outer_content[list_child] = rest;
        }
        let Ok(new_outer) = schema.replace_content(outer, outer_content) else {
            return false;
        };

        let mut moved_content = item.content().to_vec();
        if !after.is_empty() {
            let Ok(tail) = schema.replace_content(list, after) else {
                return false;
            };
            moved_content.push(tail);
        }
        let outer_list = doc.node_at(outer_list_path);
        let item_type = outer_list
            .and_then(|l| l.first_child())
            .map(|i| i.node_type().to_string())
            .unwrap_or_else(|| item.node_type().to_string());
        let Ok(moved) = schema.node(&item_type, Attrs::new(), moved_content) else {
            return false;
        };
        if tr
            .replace(outer_list_path.to_vec(), outer_index, outer_index + 1, vec![new_outer, moved])
            .is_err()
        {
            return false;
        }
        let mut cursor = outer_list_path.to_vec();
        cursor.push(outer_index + 1);
        cursor.extend(inner);
        tr.set_selection(Selection::cursor(Position::new(cursor, head.offset)));
        return emit(dispatch, tr);
    }

    let mut replacement = Vec::new();
    let before = &list.content()[..index];
    let after = &list.content()[index + 1..];
    if !before.is_empty() {
        let Ok(node) = schema.replace_content(list, before.to_vec()) else {
            return false;
        };
        replacement.push(node);
    }
    let lifted_at = replacement.len();
    replacement.extend(item.content().iter().cloned());
    if !after.is_empty() {
        let Ok(node) = schema.replace_content(list, after.to_vec()) else {
            return false;
        };
        replacement.push(node);
    }
    if tr.replace_node(list_path, replacement).is_err() {
        return false;
    }
    let mut cursor = list_path.to_vec();
    if let (Some(last), Some(first)) = (cursor.last_mut(), inner.first()) {
        *last += lifted_at + first;
    }
    cursor.extend(inner.iter().skip(1));
    tr.set_selection(Selection::cursor(Position::new(cursor, head.offset)));
    emit(dispatch, tr)
}

/// Nest the item holding the cursor inside its previous sibling.
pub(crate) fn sink_item(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let doc = state.doc();
    let schema = state.schema();
    let head = state.selection().head.clone();
    let Some(item_path) = ancestor_of_type(doc, &head.path, &LIST_ITEMS) else {
        return false;
    };
    let Some((&index, list_path)) = item_path.split_last() else {
        return false;
    };
    if index == 0 {
        return false;
    }
    let (Some(list), Some(item)) = (doc.node_at(list_path), doc.node_at(&item_path)) else {
        return false;
    };
    let Some(previous) = list.child(index - 1) else {
        return false;
    };

    let mut prev_content = previous.content().to_vec();
    let nested_index = match prev_content.last() {
        Some(last) if last.node_type() == list.node_type() => {
            let mut items = last.content().to_vec();
            items.push(item.clone());
            let Ok(nested) = schema.replace_content(last, items) else {
                return false;
            };
            let position = nested.child_count() - 1;
            let at = prev_content.len() - 1;
            prev_content[at] = nested;
            (at, position)
        }
        _ => {
            let Ok(nested) = schema.node(list.node_type(), list.attrs().clone(), vec![item.clone()]) else {
                return false;
            };
            prev_content.push(nested);
            (prev_content.len() - 1, 0)
        }
    };
    let Ok(new_previous) = schema.replace_content(previous, prev_content) else {
        return false;
    };

    let mut tr = state.tr();
    if tr
        .replace(list_path.to_vec(), index - 1, index + 1, vec![new_previous])
        .is_err()
    {
        return false;
    }
    let mut cursor = list_path.to_vec();
    cursor.push(index - 1);
    cursor.push(nested_index.0);
    cursor.push(nested_index.1);
    cursor.extend(head.path[item_path.len()..].iter());
    tr.set_selection(Selection::cursor(Position::new(cursor, head.offset)));
    emit(dispatch, tr)
}

/// Split the list item at the cursor. An empty item is lifted out of the
/// list instead.
pub(crate) fn split_item(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let doc = state.doc();
    let schema = state.schema();
    let selection = state.selection();
    if !selection.is_empty() {
        return false;
    }
    let head = selection.head.clone();
    let Some(item_path) = ancestor_of_type(doc, &head.path, &LIST_ITEMS) else {
        return false;
    };
    // Only the item's first block splits the item.
    if head.path.len() != item_path.len() + 1 || head.path.last() != Some(&0) {
        return false;
    }
    let (Some(item), Some(block)) = (doc.node_at(&item_path), doc.node_at(&head.path)) else {
        return false;
    };
    if block.child_count() == 0 && item.child_count() == 1 {
        return lift_item(state, dispatch);
    }

    let (before, after) = inline::split_at(block.content(), head.offset);
    let (Ok(first_block), Ok(second_block)) = (
        schema.replace_content(block, before),
        schema.replace_content(block, after),
    ) else {
        return false;
    };
    let Ok(first) = schema.replace_content(item, vec![first_block]) else {
        return false;
    };
    let mut rest = vec![second_block];
    rest.extend(item.content().iter().skip(1).cloned());
    let Ok(second) = schema.node(item.node_type(), Attrs::new(), rest) else {
        return false;
    };

    let mut tr = state.tr();
    if tr.replace_node(&item_path, vec![first, second]).is_err() {
        return false;
    }
    let mut cursor = item_path.clone();
    if let Some(last) = cursor.last_mut() {
        *last += 1;
    }
    cursor.push(0);
    tr.set_selection(Selection::cursor(Position::new(cursor, 0)));
    emit(dispatch, tr)
}

/// Toggle a mark over the selection, or in the stored marks when the
/// selection is empty.
pub(crate) fn toggle_mark<F>(mark_type: &'static str, attrs: F) -> CommandFn
where
    F: Fn(&Attrs) -> Option<Attrs> + Send + Sync + 'static,
{
    command_fn(move |state, cmd_attrs, dispatch| {
        let schema = state.schema();
        let Some(mark_attrs) = attrs(cmd_attrs) else {
            return false;
        };
        let Ok(mark) = schema.mark(mark_type, mark_attrs) else {
            return false;
        };
        let selection = state.selection();
        let blocks = selected_textblocks(state);
        let allowed = blocks.iter().any(|p| {
            state
                .doc()
                .node_at(p)
                .and_then(|n| schema.node_type(n.node_type()))
                .is_some_and(|t| t.allows_mark(mark_type))
        });
        if !allowed {
            return false;
        }

        let mut tr = state.tr();
        if selection.is_empty() {
            let current = state.marks_at_cursor();
            let next = if current.iter().any(|m| m.mark_type() == mark_type) {
                schema.remove_mark(&current, mark_type)
            } else {
                schema.add_mark(&current, mark)
            };
            tr.set_stored_marks(Some(next));
            return emit(dispatch, tr);
        }

        let from = selection.from();
        let to = selection.to();
        let has = blocks.iter().all(|path| {
            let Some(block) = state.doc().node_at(path) else {
                return true;
            };
            let start = if *path == from.path { from.offset } else { 0 };
            let end = if *path == to.path {
                to.offset
            } else {
                inline::content_size(block.content())
            };
            start >= end || inline::range_has_mark(block.content(), start, end, mark_type)
        });
        let result = if has {
            tr.remove_mark(mark_type).map(|_| ())
        } else {
            tr.add_mark(mark).map(|_| ())
        };
        if result.is_err() {
            return false;
        }
        tr.set_selection(selection.clone());
        emit(dispatch, tr)
    })
}

/// Path of the first textblock inside the node at `path`.
pub(crate) fn first_textblock_in(doc: &Node, schema: &Schema, path: &[usize]) -> Option<Vec<usize>> {
    let node = doc.node_at(path)?;
    let mut found = None;
    node.descendants(&mut |n, sub| {
        if found.is_none() && schema.is_textblock(n.node_type()) && !schema.is_inline(n.node_type()) {
            let mut full = path.to_vec();
            full.extend_from_slice(sub);
            found = Some(full);
        }
    });
    found
}
