use chrono::Utc;
use ifturn_core::interpreter::{InterpreterKind, StateFileNaming};
use ifturn_core::session::{
    AutosaveBlob, GameSession, InputRequest, StateRepository, TurnMetadata, WindowSummary,
};
use ifturn_core::TurnWarning;
use ifturn_infrastructure::FileStateStore;
use std::path::Path;
use tempfile::TempDir;

fn glulx_session(game_dir: &Path) -> GameSession {
    GameSession::new(
        "advent",
        game_dir,
        &game_dir.join("game.ulx"),
        InterpreterKind::Glulx,
        &StateFileNaming::Fixed {
            name: "autosave".to_string(),
        },
    )
}

fn metadata(generation: u64) -> TurnMetadata {
    TurnMetadata {
        generation,
        interpreter_gen: generation,
        input: Some(InputRequest::Line { window: 22 }),
        windows: vec![WindowSummary {
            id: 22,
            window_type: "buffer".to_string(),
            rock: 201,
        }],
        last_command: Some("look".to_string()),
        updated_at: Utc::now(),
    }
}

fn blob(tag: &[u8]) -> AutosaveBlob {
    let mut blob = AutosaveBlob::new();
    blob.insert("autosave.json", tag.to_vec());
    blob.insert("autosave.ulx", vec![0, 159, 146, 150, 255]);
    blob
}

#[tokio::test]
async fn test_missing_state_is_fresh_game() {
    let dir = TempDir::new().unwrap();
    let loaded = FileStateStore::new().load(&glulx_session(dir.path())).await;
    assert!(loaded.blob.is_none());
    assert!(loaded.metadata.is_none());
    assert!(loaded.warning.is_none());
}

#[tokio::test]
async fn test_save_then_load_is_byte_exact() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let session = glulx_session(dir.path());
    let store = FileStateStore::new();

    let meta = metadata(3);
    store.save(&session, &blob(b"{\"gen\":3}"), &meta).await?;
    let loaded = store.load(&session).await;

    assert_eq!(loaded.blob, Some(blob(b"{\"gen\":3}")));
    assert_eq!(loaded.metadata, Some(meta));
    assert!(dir.path().join("state/autosave.state").exists());
    assert!(dir.path().join("metadata.json").exists());
    assert!(!dir.path().join("state/.autosave.state.tmp").exists());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_envelope_degrades_with_warning() {
    let dir = TempDir::new().unwrap();
    let session = glulx_session(dir.path());
    std::fs::create_dir_all(session.state_dir()).unwrap();
    std::fs::write(&session.state_path, b"{\"format\":1,\"kind\":").unwrap();

    let loaded = FileStateStore::new().load(&session).await;
    assert!(loaded.blob.is_none());
    assert!(matches!(loaded.warning, Some(TurnWarning::StateCorrupt { .. })));
}

#[tokio::test]
async fn test_future_format_is_refused() {
    let dir = TempDir::new().unwrap();
    let session = glulx_session(dir.path());
    let store = FileStateStore::new();
    store.save(&session, &blob(b"x"), &metadata(2)).await.unwrap();

    let raw = std::fs::read_to_string(&session.state_path).unwrap();
    let mut envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
    envelope["format"] = serde_json::json!(2);
    std::fs::write(&session.state_path, envelope.to_string()).unwrap();

    let loaded = store.load(&session).await;
    assert!(loaded.metadata.is_none());
    match loaded.warning {
        Some(TurnWarning::StateCorrupt { reason }) => assert!(reason.contains("format 2")),
        other => panic!("unexpected warning: {:?}", other),
    }
}

#[tokio::test]
async fn test_envelope_wins_over_metadata_copy() {
    let dir = TempDir::new().unwrap();
    let session = glulx_session(dir.path());
    let store = FileStateStore::new();
    store.save(&session, &blob(b"x"), &metadata(4)).await.unwrap();
    std::fs::write(&session.metadata_path, b"garbage").unwrap();

    let loaded = store.load(&session).await;
    assert_eq!(loaded.metadata.map(|m| m.generation), Some(4));
    assert!(loaded.warning.is_none());
}

#[tokio::test]
async fn test_reset_keeps_game_and_journal() {
    let dir = TempDir::new().unwrap();
    let session = glulx_session(dir.path());
    let store = FileStateStore::new();
    std::fs::write(dir.path().join("game.ulx"), b"Glul").unwrap();
    std::fs::write(dir.path().join("journal.jsonl"), b"{}\n").unwrap();
    std::fs::create_dir(dir.path().join(".turn-abc")).unwrap();
    store.save(&session, &blob(b"x"), &metadata(7)).await.unwrap();
    std::fs::write(dir.path().join(".metadata.json.tmp"), b"{").unwrap();
    std::fs::write(dir.path().join("state/.autosave.state.tmp"), b"{").unwrap();
    std::fs::write(dir.path().join(".journal.jsonl.tmp"), b"{}\n").unwrap();

    store.reset(&session).await.unwrap();

    assert!(!session.state_path.exists());
    assert!(!session.metadata_path.exists());
    assert!(!dir.path().join(".turn-abc").exists());
    assert!(!dir.path().join(".metadata.json.tmp").exists());
    assert!(!dir.path().join("state/.autosave.state.tmp").exists());
    assert!(dir.path().join(".journal.jsonl.tmp").exists());
    assert!(dir.path().join("game.ulx").exists());
    assert!(dir.path().join("journal.jsonl").exists());
    let loaded = store.load(&session).await;
    assert!(loaded.metadata.is_none());
    assert!(loaded.warning.is_none());
}

#[tokio::test]
async fn test_kind_mismatch_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let session = glulx_session(dir.path());
    let store = FileStateStore::new();
    store.save(&session, &blob(b"x"), &metadata(1)).await.unwrap();

    let mut other = session.clone();
    other.kind = InterpreterKind::ZMachine;
    let loaded = store.load(&other).await;
    assert!(matches!(loaded.warning, Some(TurnWarning::StateCorrupt { .. })));
}
