use mvstore_core::db::{open_db, open_db_in_memory};
use mvstore_core::repo::{
    ArtifactMetadata, ArtifactRepository, RepoError, SqliteArtifactRepository, CHUNK_SIZE,
};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use uuid::Uuid;

fn write_source(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn chunk_count(conn: &Connection, artifact_id: Uuid) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM serialized_chunks WHERE files_id = ?1;",
        [artifact_id.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn put_and_get_roundtrip_across_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..CHUNK_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
    let source = write_source(dir.path(), "model.bin", &content);
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();
    let model_id = Uuid::new_v4();

    let stored = repo
        .put(&source, &ArtifactMetadata::new(model_id, "model.bin"))
        .unwrap();
    assert_eq!(stored.model_id(), model_id);
    assert_eq!(stored.filename(), "model.bin");
    assert_eq!(stored.length(), content.len() as u64);
    assert_eq!(stored.chunk_size() as usize, CHUNK_SIZE);
    assert_eq!(stored.sha256().len(), 64);
    assert!(stored.upload_date() > 0);
    assert_eq!(chunk_count(&conn, stored.id()), 3);

    let destination = dir.path().join("restored.bin");
    let loaded = repo.get(stored.id(), &destination).unwrap();
    assert_eq!(loaded.path(), Some(destination.as_path()));
    assert_eq!(fs::read(&destination).unwrap(), content);
}

#[test]
fn empty_file_is_stored_as_one_empty_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "empty.bin", b"");
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();

    let stored = repo
        .put(&source, &ArtifactMetadata::new(Uuid::new_v4(), "empty.bin"))
        .unwrap();
    assert_eq!(stored.length(), 0);
    assert_eq!(chunk_count(&conn, stored.id()), 1);

    let destination = dir.path().join("empty-out.bin");
    repo.get(stored.id(), &destination).unwrap();
    assert!(fs::read(&destination).unwrap().is_empty());
}

#[test]
fn put_reports_unreadable_source_and_existing_id() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();
    let metadata = ArtifactMetadata::new(Uuid::new_v4(), "model.bin");

    let err = repo
        .put(&dir.path().join("missing.bin"), &metadata)
        .unwrap_err();
    assert!(matches!(err, RepoError::Io { .. }));

    let source = write_source(dir.path(), "model.bin", b"weights");
    repo.put(&source, &metadata).unwrap();
    let err = repo.put(&source, &metadata).unwrap_err();
    assert!(matches!(err, RepoError::ArtifactExists(id) if id == metadata.id));
}

#[test]
fn get_never_overwrites_destination() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "model.bin", b"weights");
    let existing = write_source(dir.path(), "taken.bin", b"keep me");
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();
    let stored = repo
        .put(&source, &ArtifactMetadata::new(Uuid::new_v4(), "model.bin"))
        .unwrap();

    let err = repo.get(stored.id(), &existing).unwrap_err();
    assert!(matches!(err, RepoError::DestinationExists(_)));
    assert_eq!(fs::read(&existing).unwrap(), b"keep me");
}

#[test]
fn restore_targets_the_recorded_source_path() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "model.bin", b"weights");
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();
    let stored = repo
        .put(&source, &ArtifactMetadata::new(Uuid::new_v4(), "model.bin"))
        .unwrap();
    assert_eq!(stored.source_path(), Some(source.as_path()));

    assert!(matches!(
        repo.restore(stored.id()),
        Err(RepoError::DestinationExists(_))
    ));

    fs::remove_file(&source).unwrap();
    let restored = repo.restore(stored.id()).unwrap();
    assert_eq!(restored.path(), Some(source.as_path()));
    assert_eq!(fs::read(&source).unwrap(), b"weights");

    conn.execute("UPDATE serialized_files SET source_path = NULL;", [])
        .unwrap();
    assert!(matches!(
        repo.restore(stored.id()),
        Err(RepoError::NoSourcePath(id)) if id == stored.id()
    ));
}

#[test]
fn get_and_delete_of_unknown_artifact_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();
    let unknown = Uuid::new_v4();

    assert!(matches!(
        repo.get(unknown, &dir.path().join("out.bin")),
        Err(RepoError::ArtifactNotFound(id)) if id == unknown
    ));
    assert!(matches!(
        repo.delete(unknown),
        Err(RepoError::ArtifactNotFound(_))
    ));
    assert!(repo.find(unknown).unwrap().is_none());
}

#[test]
fn delete_removes_file_record_and_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "model.bin", b"weights");
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();
    let stored = repo
        .put(&source, &ArtifactMetadata::new(Uuid::new_v4(), "model.bin"))
        .unwrap();

    let deletion = repo.delete(stored.id()).unwrap();
    assert_eq!(deletion.files_deleted, 1);
    assert_eq!(deletion.chunks_deleted, 1);
    assert!(repo.find(stored.id()).unwrap().is_none());
    assert_eq!(chunk_count(&conn, stored.id()), 0);
}

#[test]
fn delete_reports_partial_state_written_by_another_connection() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("blobs.db");
    let source = write_source(dir.path(), "model.bin", b"weights");
    let conn = open_db(&db_path).unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();
    let stored = repo
        .put(&source, &ArtifactMetadata::new(Uuid::new_v4(), "model.bin"))
        .unwrap();

    let other = Connection::open(&db_path).unwrap();
    other
        .execute(
            "DELETE FROM serialized_chunks WHERE files_id = ?1;",
            [stored.id().to_string()],
        )
        .unwrap();

    let err = repo.delete(stored.id()).unwrap_err();
    match err {
        RepoError::PartialDelete {
            artifact_id,
            files_deleted,
            chunks_deleted,
        } => {
            assert_eq!(artifact_id, stored.id());
            assert_eq!(files_deleted, 1);
            assert_eq!(chunks_deleted, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn tampered_chunk_fails_hash_verification() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "model.bin", b"weights");
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteArtifactRepository::try_new(&conn).unwrap();
    let stored = repo
        .put(&source, &ArtifactMetadata::new(Uuid::new_v4(), "model.bin"))
        .unwrap();
    conn.execute(
        "UPDATE serialized_chunks SET data = ?2 WHERE files_id = ?1;",
        rusqlite::params![stored.id().to_string(), b"WEIGHTS".to_vec()],
    )
    .unwrap();

    let destination = dir.path().join("out.bin");
    let err = repo.get(stored.id(), &destination).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
    assert!(!destination.exists());
}
