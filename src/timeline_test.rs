use serde_json::{Map, json};

use super::*;

#[test]
fn entries_keep_insertion_order() {
    let mut timeline = Timeline::new();
    timeline.push_user("make it blue");
    timeline.push_assistant("Looking at the styles.");
    timeline.push_tool(ToolActivity::new("Read", Map::new()));
    timeline.push_assistant("Done.");

    let roles: Vec<_> = timeline.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, [ChatRole::User, ChatRole::Assistant, ChatRole::Tool, ChatRole::Assistant]);
}

#[test]
fn tool_entry_shares_activity_id() {
    let mut timeline = Timeline::new();
    let activity = ToolActivity::new("Bash", Map::new());
    let id = activity.id.clone();

    let entry = timeline.push_tool(activity);
    assert_eq!(entry.id, id);
    assert!(entry.content.is_empty());
    assert!(timeline.tool_activity_mut(&id).is_some());
    assert!(timeline.tool_activity_mut("missing").is_none());
}

#[test]
fn ids_are_distinct() {
    let mut timeline = Timeline::new();
    let first = timeline.push_user("a").id.clone();
    let second = timeline.push_user("a").id.clone();
    assert_ne!(first, second);
    assert_eq!(first.len(), 16);
}

#[test]
fn clear_empties_timeline() {
    let mut timeline = Timeline::new();
    timeline.push_user("a");
    timeline.clear();
    assert!(timeline.is_empty());
    assert_eq!(timeline.len(), 0);
}

#[test]
fn message_serializes_camel_case() {
    let mut timeline = Timeline::new();
    let entry = timeline.push_assistant("hi").clone();
    let value = serde_json::to_value(&entry).expect("serialize");

    assert_eq!(value["role"], json!("assistant"));
    assert_eq!(value["content"], json!("hi"));
    assert!(value.get("toolActivity").is_none());
    assert!(value["timestamp"].as_i64().expect("timestamp") > 0);
}
