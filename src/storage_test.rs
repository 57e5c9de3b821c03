use super::*;

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("pixelforge-storage-{}", uuid::Uuid::new_v4()))
        .join(name)
}

#[test]
fn memory_store_set_get_remove() {
    let mut store = MemoryStore::new();
    assert_eq!(store.get("k"), None);
    store.set("k", "v").expect("set");
    assert_eq!(store.get("k").as_deref(), Some("v"));
    store.remove("k").expect("remove");
    assert_eq!(store.get("k"), None);
}

#[test]
fn file_store_missing_file_is_empty() {
    let store = FileStore::open(scratch_path("state.json")).expect("open");
    assert_eq!(store.get(SESSION_ID_KEY), None);
}

#[test]
fn file_store_persists_across_reopen() {
    let path = scratch_path("state.json");
    {
        let mut store = FileStore::open(&path).expect("open");
        store.set(PROJECT_PATH_KEY, "/tmp/site").expect("set");
    }
    let reopened = FileStore::open(&path).expect("reopen");
    assert_eq!(reopened.get(PROJECT_PATH_KEY).as_deref(), Some("/tmp/site"));
}

#[test]
fn file_store_remove_is_persisted() {
    let path = scratch_path("state.json");
    let mut store = FileStore::open(&path).expect("open");
    store.set(LAST_SAVED_FILE_KEY, "index.html").expect("set");
    store.remove(LAST_SAVED_FILE_KEY).expect("remove");

    let reopened = FileStore::open(&path).expect("reopen");
    assert_eq!(reopened.get(LAST_SAVED_FILE_KEY), None);
}

#[test]
fn file_store_treats_corrupt_file_as_empty() {
    let path = scratch_path("state.json");
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "not json").expect("write");

    let store = FileStore::open(&path).expect("open");
    assert_eq!(store.get(SESSION_ID_KEY), None);
}
