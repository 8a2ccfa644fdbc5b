use parley::db;
use parley::history::types::Role;
use parley::history::{conversations, embeddings, messages, Store};
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("chat.db");

    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    assert!(db_path.exists());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn busy_timeout_is_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("chat.db")).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn health_check_counts_rows() {
    let mut conn = db::open_memory_database().unwrap();
    let cid = conversations::create_conversation(&conn, "health", true).unwrap();
    let m = messages::insert_message(&mut conn, &cid, Role::User, "ping").unwrap();
    embeddings::insert_embedding(&conn, &m.id, &[1.0, 0.0, 0.0]).unwrap();
    messages::insert_message(&mut conn, &cid, Role::Assistant, "pong").unwrap();

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert!(!report.sqlite_vec_version.is_empty());
    assert_eq!(report.conversation_count, 1);
    assert_eq!(report.message_count, 2);
    assert_eq!(report.embedding_count, 1);
}

#[test]
fn deleting_conversation_cascades_to_embeddings() {
    let mut conn = db::open_memory_database().unwrap();
    let cid = conversations::create_conversation(&conn, "doomed", true).unwrap();
    let m = messages::insert_message(&mut conn, &cid, Role::User, "bye").unwrap();
    embeddings::insert_embedding(&conn, &m.id, &[0.5; 4]).unwrap();

    assert!(conversations::delete_conversation(&conn, &cid).unwrap());

    let report = db::check_database_health(&conn).unwrap();
    assert_eq!(report.message_count, 0);
    assert_eq!(report.embedding_count, 0);
}

#[tokio::test]
async fn history_persists_across_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("chat.db");

    let store = Store::open(&path).unwrap();
    let cid = store
        .call(|conn| {
            let cid = conversations::create_conversation(conn, "kept", false)?;
            messages::insert_message(conn, &cid, Role::User, "remember me")?;
            Ok(cid)
        })
        .await
        .unwrap();
    store.close().unwrap();

    let reopened = Store::open(&path).unwrap();
    let id = cid.clone();
    let stored = reopened
        .call(move |conn| messages::list_messages(conn, &id))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "remember me");
    assert_eq!(stored[0].conversation_id, cid);
}

#[tokio::test]
async fn large_embedding_round_trips_through_store() {
    let store = Store::open_in_memory().unwrap();
    let vector: Vec<f32> = (0..1536).map(|i| (i as f32 * 0.001).sin()).collect();
    let expected = vector.clone();

    let back = store
        .call(move |conn| {
            let cid = conversations::create_conversation(conn, "vec", true)?;
            let m = messages::insert_message(conn, &cid, Role::Assistant, "long")?;
            embeddings::insert_embedding(conn, &m.id, &vector)?;
            embeddings::get_embedding(conn, &m.id)
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(back, expected);
}
