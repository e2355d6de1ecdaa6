use super::*;

fn sample() -> PersistedSession {
    PersistedSession {
        access_token: "a.b.c".into(),
        refresh_token: "r-1".into(),
        user_json: r#"{"id":"1","role":"gm"}"#.into(),
    }
}

#[test]
fn memory_store_round_trip_and_clear() {
    let store = MemoryStore::new();
    assert_eq!(load_session(&store).unwrap(), None);
    save_session(&store, &sample()).unwrap();
    assert_eq!(load_session(&store).unwrap(), Some(sample()));

    save_tokens(&store, "x.y.z", "r-2").unwrap();
    let rec = load_session(&store).unwrap().unwrap();
    assert_eq!(rec.access_token, "x.y.z");
    assert_eq!(rec.refresh_token, "r-2");
    assert_eq!(rec.user_json, sample().user_json);

    clear_session(&store).unwrap();
    assert!(store.is_empty());
    // clearing twice is harmless
    clear_session(&store).unwrap();
}

#[test]
fn clones_share_state_like_a_reloaded_tab() {
    let tab = MemoryStore::new();
    let reloaded = tab.clone();
    save_session(&tab, &sample()).unwrap();
    assert_eq!(load_session(&reloaded).unwrap(), Some(sample()));
}

#[test]
fn incomplete_record_is_absent() {
    let store = MemoryStore::new();
    store.set(AUTH_TOKEN_KEY, "a.b.c").unwrap();
    store.set(CURRENT_USER_KEY, "{}").unwrap();
    assert_eq!(load_session(&store).unwrap(), None);
    store.set(REFRESH_TOKEN_KEY, "").unwrap();
    assert_eq!(load_session(&store).unwrap(), None);
}

#[test]
fn file_store_persists_across_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nested").join("session.json");
    {
        let store = FileStore::open(&path).unwrap();
        save_session(&store, &sample()).unwrap();
    }
    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(load_session(&reopened).unwrap(), Some(sample()));
    clear_session(&reopened).unwrap();
    let again = FileStore::open(&path).unwrap();
    assert_eq!(load_session(&again).unwrap(), None);
}

#[test]
fn corrupt_file_starts_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("session.json");
    std::fs::write(&path, b"{not json").unwrap();
    let store = FileStore::open(&path).unwrap();
    assert!(store.keys().unwrap().is_empty());
}
