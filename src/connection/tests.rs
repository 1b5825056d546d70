use super::*;
use crate::storage::mock::{MockDatabase, DEFAULT_BACKEND};

const ANNOTATION: &str = "/*maintenance:lhm*/";

async fn connect(db: &MockDatabase, max_attempts: u32) -> ResilientConnection {
    ResilientConnection::connect(Arc::new(db.connector()))
        .await
        .unwrap()
        .with_retry(RetryConfig::immediate(max_attempts))
}

fn lock_wait() -> DriverError {
    DriverError::database(1205, "Lock wait timeout exceeded; try restarting transaction")
}

fn gone_away() -> DriverError {
    DriverError::database(2006, "MySQL server has gone away")
}

#[tokio::test]
async fn test_statements_are_tagged() {
    let db = MockDatabase::new();
    let mut conn = connect(&db, 3).await;

    conn.execute("SELECT 1", ExecOptions::once()).await.unwrap();
    conn.execute("SELECT 2", ExecOptions::retrying()).await.unwrap();

    let statements = db.statements().await;
    assert_eq!(
        statements,
        vec![format!("SELECT 1 {ANNOTATION}"), format!("SELECT 2 {ANNOTATION}")]
    );
}

#[tokio::test]
async fn test_raw_is_forwarded_unmodified() {
    let db = MockDatabase::new();
    db.stub("SELECT @@VERSION", vec![Row::new(vec![("@@version".into(), Some("8.0.36".into()))])])
        .await;
    db.fail_next(lock_wait()).await;
    let mut conn = connect(&db, 5).await;

    // Pass-through does not retry.
    let err = conn.raw("SELECT @@version").await.unwrap_err();
    assert_eq!(err.attempts(), 1);

    let rows = conn.raw("SELECT @@version").await.unwrap();
    assert_eq!(rows[0].get("@@VERSION"), Some("8.0.36"));
    assert_eq!(db.statements().await, vec!["SELECT @@version", "SELECT @@version"]);
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let db = MockDatabase::new();
    db.fail_next(lock_wait()).await;
    let mut conn = connect(&db, 3).await;

    conn.execute("UPDATE t SET a = 1", ExecOptions::retrying())
        .await
        .unwrap();

    assert_eq!(db.statements().await.len(), 2);
    // No reconnect for lock contention.
    assert_eq!(db.connect_count().await, 1);
}

#[tokio::test]
async fn test_retryable_error_exhausts_attempts() {
    let db = MockDatabase::new();
    db.fail_on("select", DriverError::database(1213, "Deadlock found"), 10)
        .await;
    let mut conn = connect(&db, 3).await;

    let err = conn
        .select_value("SELECT a FROM t", ExecOptions::retrying())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 3);
    assert_eq!(err.label(), DEFAULT_LABEL);
    assert_eq!(err.driver_error().and_then(|e| e.code), Some(1213));
    assert!(matches!(
        err,
        ConnectionError::Failed {
            class: ErrorClass::Transient,
            operation: "select_value",
            ..
        }
    ));
    assert_eq!(db.statements().await.len(), 3);
}

#[tokio::test]
async fn test_fatal_error_surfaces_after_one_attempt() {
    let db = MockDatabase::new();
    db.fail_next(DriverError::database(1064, "You have an error in your SQL syntax"))
        .await;
    let mut conn = connect(&db, 5).await;

    let err = conn
        .execute("SELEC 1", ExecOptions::retrying())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 1);
    assert!(matches!(
        err,
        ConnectionError::Failed {
            class: ErrorClass::Fatal,
            ..
        }
    ));
    assert_eq!(db.statements().await.len(), 1);
}

#[tokio::test]
async fn test_without_retry_transient_error_surfaces_once() {
    let db = MockDatabase::new();
    db.fail_next(lock_wait()).await;
    let mut conn = connect(&db, 5).await;

    let err = conn
        .update("UPDATE t SET a = 1", ExecOptions::once())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 1);
    assert_eq!(db.statements().await.len(), 1);
}

#[tokio::test]
async fn test_per_call_policy_overrides_connection_policy() {
    let db = MockDatabase::new();
    db.fail_on("insert", lock_wait(), 10).await;
    let mut conn = connect(&db, 5).await;

    let err = conn
        .execute(
            "INSERT INTO t VALUES (1)",
            ExecOptions::retrying().with_policy(RetryConfig::immediate(2)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 2);
}

#[tokio::test]
async fn test_label_precedence() {
    let db = MockDatabase::new();
    db.fail_on("select", DriverError::database(1146, "Table doesn't exist"), 2)
        .await;
    let mut conn = connect(&db, 3).await.with_default_label("Migrator");

    let err = conn
        .select_one("SELECT * FROM t", ExecOptions::retrying())
        .await
        .unwrap_err();
    assert_eq!(err.label(), "Migrator");

    let err = conn
        .select_one(
            "SELECT * FROM t",
            ExecOptions::retrying().labelled("ChunkInsert"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.label(), "ChunkInsert");
    assert!(err.to_string().contains("[ChunkInsert]"));
}

#[tokio::test]
async fn test_disconnect_reconnects_to_same_backend() {
    let db = MockDatabase::new();
    db.fail_next(gone_away()).await;
    let mut conn = connect(&db, 3).await;

    conn.execute("ALTER TABLE t ADD COLUMN b INT", ExecOptions::retrying())
        .await
        .unwrap();

    assert_eq!(db.connect_count().await, 2);
    let pins = db.pins().await;
    assert_eq!(pins[0], None);
    assert_eq!(pins[1], Some(BackendIdentity::new(DEFAULT_BACKEND)));
    assert_eq!(conn.backend().as_str(), DEFAULT_BACKEND);
}

#[tokio::test]
async fn test_reconnect_to_other_backend_is_fatal_with_affinity() {
    let db = MockDatabase::new();
    db.queue_backends(&["writer-1", "writer-2"]).await;
    db.fail_on("select", gone_away(), 1).await;
    let mut conn = connect(&db, 5).await;

    let err = conn
        .select_values("SELECT id FROM t", ExecOptions::retrying().labelled("Entangler"))
        .await
        .unwrap_err();

    match err {
        ConnectionError::HostMismatch {
            label,
            expected,
            actual,
            attempts,
        } => {
            assert_eq!(label, "Entangler");
            assert_eq!(expected.as_str(), "writer-1");
            assert_eq!(actual.as_str(), "writer-2");
            assert_eq!(attempts, 2);
        }
        other => panic!("expected host mismatch, got {other:?}"),
    }
    // The original statement ran once; no attempt ran on the wrong backend.
    assert_eq!(db.statements().await.len(), 1);
    assert_eq!(conn.backend().as_str(), "writer-1");
}

#[tokio::test]
async fn test_set_options_applies_to_next_reconnect() {
    let db = MockDatabase::new();
    db.queue_backends(&["writer-1", "writer-2"]).await;
    let mut conn = connect(&db, 3).await;
    assert!(conn.options().reconnect_with_consistent_host);

    conn.set_options(ConnectionOptions {
        reconnect_with_consistent_host: false,
    });
    db.fail_next(gone_away()).await;

    conn.execute("SELECT 1", ExecOptions::retrying())
        .await
        .unwrap();

    assert_eq!(conn.backend().as_str(), "writer-2");
    assert_eq!(db.pins().await[1], None);
}

#[tokio::test]
async fn test_failed_reconnect_consumes_an_attempt() {
    let db = MockDatabase::new();
    db.fail_next(DriverError::connection_lost("connection reset by peer"))
        .await;
    let mut conn = connect(&db, 4).await;
    db.fail_connect(DriverError::database(2003, "Can't connect to MySQL server"))
        .await;

    let affected = conn
        .update("DELETE FROM t WHERE id = 1", ExecOptions::retrying())
        .await
        .unwrap();

    assert_eq!(affected, 0);
    // initial + failed reconnect + successful reconnect
    assert_eq!(db.connect_count().await, 3);
    assert_eq!(db.statements().await.len(), 2);
}

#[tokio::test]
async fn test_reconnect_failures_are_bounded() {
    let db = MockDatabase::new();
    db.fail_next(gone_away()).await;
    let mut conn = connect(&db, 3).await;
    for _ in 0..5 {
        db.fail_connect(DriverError::connection_lost("refused")).await;
    }

    let err = conn
        .execute("SELECT 1", ExecOptions::retrying())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 3);
    assert!(matches!(
        err,
        ConnectionError::Failed {
            class: ErrorClass::Disconnected,
            ..
        }
    ));
}

#[tokio::test]
async fn test_select_shapes() {
    let db = MockDatabase::new();
    db.add_table("users").await;
    db.add_table("lhmn_users").await;
    db.set_affected_rows(7).await;
    let mut conn = connect(&db, 1).await;

    let values = conn
        .select_values("SHOW TABLES", ExecOptions::once())
        .await
        .unwrap();
    assert_eq!(values, vec!["users", "lhmn_users"]);

    let value = conn
        .select_value("SHOW TABLES", ExecOptions::once())
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("users"));

    let row = conn
        .select_one("SHOW TABLES", ExecOptions::once())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.first(), Some("users"));

    let affected = conn
        .update("UPDATE users SET a = 1", ExecOptions::once())
        .await
        .unwrap();
    assert_eq!(affected, 7);
}

#[tokio::test]
async fn test_initial_connect_failure() {
    let db = MockDatabase::new();
    db.fail_connect(DriverError::connection_lost("refused")).await;

    let result = ResilientConnection::connect(Arc::new(db.connector())).await;
    match result {
        Err(err @ ConnectionError::Connect { .. }) => assert_eq!(err.attempts(), 1),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_with_config() {
    let db = MockDatabase::new();
    db.fail_on("select", lock_wait(), 10).await;
    let mut config = crate::config::Config::default();
    config.retry = RetryConfig::immediate(2);
    config.proxy.annotation = "/*maintenance:test*/".to_string();
    config.database.reconnect_with_consistent_host = false;

    let mut conn = ResilientConnection::connect(Arc::new(db.connector()))
        .await
        .unwrap()
        .with_config(&config);

    assert!(!conn.options().reconnect_with_consistent_host);
    let err = conn
        .select_value("SELECT 1", ExecOptions::retrying())
        .await
        .unwrap_err();
    assert_eq!(err.attempts(), 2);
    assert_eq!(db.statements().await[0], "SELECT 1 /*maintenance:test*/");
}
