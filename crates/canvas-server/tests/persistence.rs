// crates/canvas-server/tests/persistence.rs
use canvas_core::CanvasSnapshot;
use canvas_server::persistence::{JsonFileStore, PersistenceError, SnapshotStore};

#[test]
fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("absent.json"));
    assert!(store.load().unwrap().is_none());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("canvas.json"));

    let snapshot = CanvasSnapshot {
        width: 3,
        height: 2,
        pixels: vec![0, 1, 2, 3, 4, 29],
    };
    store.save(&snapshot).unwrap();
    assert_eq!(store.load().unwrap(), Some(snapshot.clone()));

    // Overwrite leaves no temp file behind.
    store.save(&snapshot).unwrap();
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("canvas.json")]);
}

#[test]
fn file_format_is_plain_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("canvas.json");
    let store = JsonFileStore::new(&path);

    store
        .save(&CanvasSnapshot {
            width: 1,
            height: 2,
            pixels: vec![5, 6],
        })
        .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, r#"{"width":1,"height":2,"pixels":[5,6]}"#);
}

#[test]
fn inconsistent_snapshot_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("canvas.json");
    std::fs::write(&path, r#"{"width":2,"height":2,"pixels":[1]}"#).unwrap();

    let err = JsonFileStore::new(&path).load().unwrap_err();
    assert!(matches!(err, PersistenceError::Invalid(_)), "{err}");

    std::fs::write(&path, "not json").unwrap();
    let err = JsonFileStore::new(&path).load().unwrap_err();
    assert!(matches!(err, PersistenceError::Json(_)), "{err}");
}
