//! MetaStore integration tests.
//!
//! These need a PostgreSQL server with the pgvector extension. They are
//! skipped (pass vacuously) unless `DATABASE_URL` is set, so unit test runs
//! stay green without infrastructure.

use serde_json::json;

use spaces_core::{Settings, Tenant};
use spaces_db::{Database, NewChunk, NewDocument};

async fn test_db() -> Option<Database> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let settings = Settings {
        database_url: Some(url),
        ..Default::default()
    };
    match Database::connect_with_settings(&settings).await {
        Ok(db) => Some(db),
        Err(e) => panic!("DATABASE_URL set but connection failed: {e}"),
    }
}

fn new_doc(user_id: i64, space_id: Option<i64>, file_name: &str) -> NewDocument {
    NewDocument {
        user_id,
        space_id,
        source_type: "txt".into(),
        file_name: file_name.into(),
        blob_url: None,
        metadata: json!({"filename": file_name}),
    }
}

fn chunks(contents: &[&str]) -> Vec<NewChunk> {
    contents
        .iter()
        .enumerate()
        .map(|(i, c)| NewChunk {
            chunk_index: i as i32,
            content: c.to_string(),
            char_count: c.len() as i32,
            embedding: None,
        })
        .collect()
}

async fn make_user(db: &Database) -> i64 {
    let suffix = uuid_suffix();
    let user = db
        .users
        .create(&format!("it-{suffix}@example.com"), "x")
        .await
        .unwrap();
    user.id
}

fn uuid_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    format!(
        "{}-{:x}",
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}

#[tokio::test]
async fn schema_init_is_idempotent() {
    let Some(db) = test_db().await else { return };
    let settings = Settings {
        database_url: std::env::var("DATABASE_URL").ok(),
        ..Default::default()
    };
    // Re-running must not error or drop data.
    spaces_db::init_schema(&db.pool, &settings).await.unwrap();
    spaces_db::init_schema(&db.pool, &settings).await.unwrap();
}

#[tokio::test]
async fn chunk_indexes_are_gap_free_and_ordered() {
    let Some(db) = test_db().await else { return };
    let user_id = make_user(&db).await;

    let (doc_id, _) = db
        .documents
        .create_with_chunks(
            &new_doc(user_id, None, "ordered.txt"),
            &chunks(&["zero", "one", "two"]),
            &[],
        )
        .await
        .unwrap();

    let stored = db.documents.list_chunks(doc_id).await.unwrap();
    let indexes: Vec<i32> = stored.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
}

#[tokio::test]
async fn duplicate_chunk_index_is_conflict() {
    let Some(db) = test_db().await else { return };
    let user_id = make_user(&db).await;

    let bad = vec![
        NewChunk {
            chunk_index: 0,
            content: "a".into(),
            char_count: 1,
            embedding: None,
        },
        NewChunk {
            chunk_index: 0,
            content: "b".into(),
            char_count: 1,
            embedding: None,
        },
    ];
    let err = db
        .documents
        .create_with_chunks(&new_doc(user_id, None, "dup.txt"), &bad, &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), spaces_core::error::ErrorKind::Conflict);

    // The transaction rolled back: nothing persisted for this file.
    let (_, docs) = db
        .documents
        .list(Tenant::new(user_id, None), 100, 0)
        .await
        .unwrap();
    assert!(docs.iter().all(|d| d.file_name != "dup.txt"));
}

#[tokio::test]
async fn tenancy_is_enforced_on_reads_and_deletes() {
    let Some(db) = test_db().await else { return };
    let owner = make_user(&db).await;
    let intruder = make_user(&db).await;

    let (doc_id, _) = db
        .documents
        .create_with_chunks(
            &new_doc(owner, None, "private.txt"),
            &chunks(&["secret content"]),
            &[],
        )
        .await
        .unwrap();

    // A different user sees NotFound, not Forbidden: existence is not
    // revealed across tenants.
    let err = db
        .documents
        .get(doc_id, Tenant::new(intruder, None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), spaces_core::error::ErrorKind::NotFound);

    let err = db
        .documents
        .delete(doc_id, Tenant::new(intruder, None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), spaces_core::error::ErrorKind::NotFound);

    // The owner still has it.
    assert!(db.documents.get(doc_id, Tenant::new(owner, None)).await.is_ok());
}

#[tokio::test]
async fn lexical_search_is_tenant_scoped() {
    let Some(db) = test_db().await else { return };
    let u1 = make_user(&db).await;
    let u2 = make_user(&db).await;
    let marker = format!("xylophone{}", uuid_suffix().replace(['-', ':'], ""));

    db.documents
        .create_with_chunks(
            &new_doc(u1, None, "u1.txt"),
            &chunks(&[&format!("the {marker} appears here")]),
            &[],
        )
        .await
        .unwrap();

    let own = db
        .retrieval
        .lexical_search(&marker, Tenant::new(u1, None), 10, "english", None)
        .await
        .unwrap();
    assert_eq!(own.len(), 1);

    // Identical query text from an adjacent user finds nothing.
    let other = db
        .retrieval
        .lexical_search(&marker, Tenant::new(u2, None), 10, "english", None)
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn document_delete_cascades_to_chunks() {
    let Some(db) = test_db().await else { return };
    let user_id = make_user(&db).await;

    let (doc_id, _) = db
        .documents
        .create_with_chunks(
            &new_doc(user_id, None, "gone.txt"),
            &chunks(&["a", "b"]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(db.documents.chunk_count(doc_id).await.unwrap(), 2);

    db.documents
        .delete(doc_id, Tenant::new(user_id, None))
        .await
        .unwrap();
    assert_eq!(db.documents.chunk_count(doc_id).await.unwrap(), 0);
}

#[tokio::test]
async fn default_space_invariant_holds() {
    let Some(db) = test_db().await else { return };
    let user_id = make_user(&db).await;

    // create() already ensured a default space.
    let spaces = db.users.list_spaces(user_id).await.unwrap();
    assert_eq!(spaces.iter().filter(|s| s.is_default).count(), 1);

    // Making a new default demotes the old one.
    let second = db.users.create_space(user_id, "Work", true).await.unwrap();
    let spaces = db.users.list_spaces(user_id).await.unwrap();
    assert_eq!(spaces.iter().filter(|s| s.is_default).count(), 1);
    assert!(spaces.iter().any(|s| s.id == second.id && s.is_default));
}

#[tokio::test]
async fn research_session_retains_last_forty_messages() {
    let Some(db) = test_db().await else { return };
    let user_id = make_user(&db).await;
    let tenant = Tenant::new(user_id, None);

    db.research_sessions
        .ensure("conv-retention-test", tenant, None)
        .await
        .unwrap();

    let messages: Vec<spaces_core::ResearchMessage> = (0..60)
        .map(|i| spaces_core::ResearchMessage::new("user", format!("message {i}")))
        .collect();
    db.research_sessions
        .save_messages("conv-retention-test", user_id, &messages)
        .await
        .unwrap();

    let loaded = db
        .research_sessions
        .load("conv-retention-test", user_id)
        .await
        .unwrap();
    assert_eq!(loaded.messages.len(), 40);
    assert_eq!(loaded.messages.last().unwrap().content, "message 59");
    assert_eq!(loaded.messages.first().unwrap().content, "message 20");
}
