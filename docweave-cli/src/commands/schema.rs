//! Describe the schema the configured descriptors produce.

use anyhow::Result;
use docweave_core::Engine;
use serde_json::{json, Value};

fn describe(engine: &Engine) -> Value {
    let schema = engine.schema();
    let nodes: Vec<Value> = schema
        .node_types()
        .map(|node| {
            json!({
                "name": node.name(),
                "groups": node.groups(),
                "content": node.spec().content,
                "inline": node.is_inline(),
                "atom": node.is_atom(),
                "code": node.is_code(),
                "attrs": node.spec().attrs.keys().collect::<Vec<_>>(),
            })
        })
        .collect();
    let marks: Vec<Value> = schema
        .mark_types()
        .map(|mark| {
            json!({
                "name": mark.name(),
                "rank": mark.rank(),
                "inclusive": mark.spec().inclusive,
                "excludes": mark.spec().excludes,
                "attrs": mark.spec().attrs.keys().collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "top": schema.top_node_type(),
        "nodes": nodes,
        "marks": marks,
        "extensions": engine.registry().names(),
    })
}

pub fn describe_schema(engine: &Engine, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&describe(engine))?);
        return Ok(());
    }

    let schema = engine.schema();
    println!("top: {}", schema.top_node_type());
    println!("nodes:");
    for node in schema.node_types() {
        let content = node.spec().content.as_deref().unwrap_or("(leaf)");
        let groups = node.groups().join(" ");
        println!("  {:<18} {:<24} {}", node.name(), content, groups);
    }
    println!("marks:");
    for mark in schema.mark_types() {
        println!("  {}", mark.name());
    }
    Ok(())
}
