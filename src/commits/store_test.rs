use super::*;
use crate::commits::{CommitKind, CommitSpec};

fn prompt(text: &str) -> PromptContent {
    PromptContent::text(text)
}

fn add_root(store: &mut CommitStore, text: &str) -> CommitHash {
    let commit = CommitStore::create_commit(CommitSpec::ai_create(prompt(text), 4));
    let hash = commit.hash.clone();
    store.add_commit(commit).expect("add root");
    hash
}

fn add_edit(store: &mut CommitStore, parent: &CommitHash, text: &str) -> CommitHash {
    let commit = CommitStore::create_commit(CommitSpec::ai_edit(parent.clone(), prompt(text), 4));
    let hash = commit.hash.clone();
    store.add_commit(commit).expect("add edit");
    hash
}

// =============================================================
// create / add
// =============================================================

#[test]
fn create_commit_is_pure_and_initializes_variants() {
    let store = CommitStore::new();
    let commit = CommitStore::create_commit(CommitSpec::ai_create(prompt("hero"), 4));

    assert!(store.is_empty());
    assert_eq!(commit.kind, CommitKind::AiCreate);
    assert!(commit.is_root());
    assert_eq!(commit.variants.len(), 4);
    assert_eq!(commit.selected_variant_index, 0);
    assert!(commit.variants.iter().all(|v| v.status == VariantStatus::Generating && v.code.is_empty()));
}

#[test]
fn create_commit_assigns_distinct_hashes() {
    let a = CommitStore::create_commit(CommitSpec::code_create("<p/>"));
    let b = CommitStore::create_commit(CommitSpec::code_create("<p/>"));
    assert_ne!(a.hash, b.hash);
}

#[test]
fn add_commit_rejects_duplicate_hash() {
    let mut store = CommitStore::new();
    let commit = CommitStore::create_commit(CommitSpec::code_create("<p/>"));
    store.add_commit(commit.clone()).expect("first add");
    let err = store.add_commit(commit.clone()).expect_err("duplicate");
    assert_eq!(err, CommitError::DuplicateHash(commit.hash));
}

#[test]
fn add_commit_rejects_missing_parent() {
    let mut store = CommitStore::new();
    let ghost = CommitHash::from("ghost");
    let commit = CommitStore::create_commit(CommitSpec::ai_edit(ghost.clone(), prompt("x"), 4));
    let err = store.add_commit(commit).expect_err("missing parent");
    assert_eq!(err, CommitError::MissingParent(ghost));
    assert!(store.is_empty());
}

#[test]
fn add_commit_rejects_empty_variant_list() {
    let mut store = CommitStore::new();
    let commit = CommitStore::create_commit(CommitSpec::ai_create(prompt("x"), 0));
    assert_eq!(store.add_commit(commit).expect_err("empty"), CommitError::NoVariants);
}

// =============================================================
// head
// =============================================================

#[test]
fn set_head_requires_existing_commit() {
    let mut store = CommitStore::new();
    let err = store.set_head(&CommitHash::from("nope")).expect_err("unknown");
    assert!(matches!(err, CommitError::UnknownCommit(_)));
    assert!(store.head().is_none());

    let root = add_root(&mut store, "a");
    store.set_head(&root).expect("set head");
    assert_eq!(store.head(), Some(&root));
    store.reset_head();
    assert!(store.head().is_none());
}

// =============================================================
// remove
// =============================================================

#[test]
fn remove_leaf_clears_head_pointing_at_it() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    let edit = add_edit(&mut store, &root, "b");
    store.set_head(&edit).expect("head");

    let removed = store.remove_commit(&edit).expect("remove");
    assert_eq!(removed.hash, edit);
    assert!(store.head().is_none());
    assert!(store.contains(&root));
}

#[test]
fn remove_rejects_commit_with_children() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    add_edit(&mut store, &root, "b");

    assert_eq!(store.remove_commit(&root).expect_err("non-leaf"), CommitError::HasChildren(root.clone()));
    assert!(store.contains(&root));
}

#[test]
fn remove_unknown_commit_errors() {
    let mut store = CommitStore::new();
    let err = store.remove_commit(&CommitHash::from("x")).expect_err("unknown");
    assert!(matches!(err, CommitError::UnknownCommit(_)));
}

// =============================================================
// variant mutation
// =============================================================

#[test]
fn append_and_set_code() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");

    assert!(store.append_commit_code(&root, 1, "<div>"));
    assert!(store.append_commit_code(&root, 1, "</div>"));
    assert_eq!(store.get(&root).expect("commit").variants[1].code, "<div></div>");

    assert!(store.set_commit_code(&root, 1, "<p/>"));
    assert_eq!(store.get(&root).expect("commit").variants[1].code, "<p/>");
}

#[test]
fn append_to_removed_commit_is_noop() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    let edit = add_edit(&mut store, &root, "b");
    store.remove_commit(&edit).expect("remove");

    assert!(!store.append_commit_code(&edit, 0, "late"));
    assert!(!store.set_commit_code(&edit, 0, "late"));
    assert!(!store.update_variant_status(&edit, 0, VariantStatus::Complete));
    assert!(!store.resize_variants(&edit, 2));
}

#[test]
fn append_to_out_of_range_variant_is_noop() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    assert!(!store.append_commit_code(&root, 9, "x"));
}

#[test]
fn update_variant_status_records_error_message() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    let status = VariantStatus::Error { message: "rate limited".to_owned() };
    assert!(store.update_variant_status(&root, 2, status));

    let variant = &store.get(&root).expect("commit").variants[2];
    assert_eq!(variant.error_message(), Some("rate limited"));
}

#[test]
fn out_of_order_completion_resolves_both_variants() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    store.resize_variants(&root, 2);

    store.update_variant_status(&root, 1, VariantStatus::Complete);
    store.update_variant_status(&root, 0, VariantStatus::Complete);

    let commit = store.get(&root).expect("commit");
    assert!(commit.variants.iter().all(|v| v.status == VariantStatus::Complete));
    assert!(commit.is_resolved());
}

// =============================================================
// resize / select
// =============================================================

#[test]
fn resize_preserves_retained_code_and_drops_the_rest() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    for i in 0..4 {
        store.append_commit_code(&root, i, &format!("v{i}"));
    }

    assert!(store.resize_variants(&root, 3));
    let commit = store.get(&root).expect("commit");
    assert_eq!(commit.variants.len(), 3);
    assert_eq!(commit.variants[0].code, "v0");
    assert_eq!(commit.variants[2].code, "v2");

    store.select_variant(&root, 2).expect("select retained");
    let err = store.select_variant(&root, 3).expect_err("dropped");
    assert_eq!(err, CommitError::VariantOutOfRange { hash: root.clone(), index: 3, len: 3 });
}

#[test]
fn resize_clamps_selection() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    store.select_variant(&root, 3).expect("select");
    store.resize_variants(&root, 2);
    assert_eq!(store.get(&root).expect("commit").selected_variant_index, 1);
}

#[test]
fn resize_widens_with_generating_variants() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    store.resize_variants(&root, 5);
    let commit = store.get(&root).expect("commit");
    assert_eq!(commit.variants.len(), 5);
    assert_eq!(commit.variants[4].status, VariantStatus::Generating);
}

#[test]
fn resize_to_zero_is_rejected() {
    let mut store = CommitStore::new();
    let root = add_root(&mut store, "a");
    assert!(!store.resize_variants(&root, 0));
    assert_eq!(store.get(&root).expect("commit").variants.len(), 4);
}

// =============================================================
// history
// =============================================================

#[test]
fn extract_history_is_chronological() {
    let mut store = CommitStore::new();
    let a = add_root(&mut store, "A");
    let b = add_edit(&mut store, &a, "B");

    let history = store.extract_history(&b).expect("history");
    assert_eq!(history, vec![prompt("A"), prompt("B")]);
}

#[test]
fn extract_history_walks_only_the_branch() {
    let mut store = CommitStore::new();
    let a = add_root(&mut store, "A");
    let b = add_edit(&mut store, &a, "B");
    add_edit(&mut store, &a, "sibling");
    let c = add_edit(&mut store, &b, "C");

    let texts: Vec<_> = store
        .extract_history(&c)
        .expect("history")
        .into_iter()
        .map(|p| p.text)
        .collect();
    assert_eq!(texts, ["A", "B", "C"]);
}

#[test]
fn extract_history_skips_imported_root_inputs() {
    let mut store = CommitStore::new();
    let root = CommitStore::create_commit(CommitSpec::code_create("<p/>"));
    let root_hash = root.hash.clone();
    store.add_commit(root).expect("add");
    let edit = add_edit(&mut store, &root_hash, "restyle");

    assert_eq!(store.extract_history(&edit).expect("history"), vec![prompt("restyle")]);
}

#[test]
fn extract_history_reports_missing_commit() {
    let store = CommitStore::new();
    let err = store.extract_history(&CommitHash::from("gone")).expect_err("missing");
    assert!(matches!(err, CommitError::InvalidHistory(_)));
}

#[test]
fn extract_history_detects_cycles() {
    let mut store = CommitStore::new();
    let mut a = CommitStore::create_commit(CommitSpec::ai_create(prompt("A"), 1));
    let mut b = CommitStore::create_commit(CommitSpec::ai_create(prompt("B"), 1));
    a.parent_hash = Some(b.hash.clone());
    b.parent_hash = Some(a.hash.clone());
    let start = a.hash.clone();
    store.insert_unchecked(a);
    store.insert_unchecked(b);

    let err = store.extract_history(&start).expect_err("cycle");
    assert!(matches!(err, CommitError::InvalidHistory(msg) if msg.contains("cycle")));
}
