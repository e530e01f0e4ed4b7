use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use thiserror::Error;

use crate::killmail::EnrichedKillmail;

/// Enumeration of errors for operations with a `KillmailStore`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} for killmail {killmail_id} failed with: {error}")]
    QueryError {
        command: &'static str,
        killmail_id: i64,
        error: sqlx::Error,
    },
}

impl StoreError {
    /// Whether the underlying connection is gone and must be replaced before storing anything else.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            StoreError::ConnectionError { .. } => true,
            StoreError::QueryError { error, .. } => {
                matches!(error, sqlx::Error::Io(_) | sqlx::Error::Tls(_))
            }
        }
    }
}

/// Result of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A row with the same killmail_id already existed and was left untouched.
    AlreadyPresent,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::AlreadyPresent => "already_present",
        }
    }
}

/// Idempotent killmail storage, owned by a single worker.
#[async_trait]
pub trait KillmailStore: Send {
    /// Insert `killmail` unless a row with its killmail_id exists. Repeating the call is a no-op.
    async fn upsert(&mut self, killmail: &EnrichedKillmail) -> Result<UpsertOutcome, StoreError>;
}

/// Opens a new, exclusive `KillmailStore` for each worker.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: KillmailStore + 'static;

    async fn connect(&self) -> Result<Self::Store, StoreError>;
}

const INSERT_KILLMAIL: &str = r#"
INSERT INTO killmails
    (killmail_id, killmail_hash, solar_system_id, killmail_time, destroyed_value, dropped_value, fitted_value, total_value, victim_ship, kill_ship)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (killmail_id) DO NOTHING
"#;

/// A `KillmailStore` on top of a single PostgreSQL connection.
pub struct PgKillmailStore {
    conn: PgConnection,
}

impl PgKillmailStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let conn = PgConnection::connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl KillmailStore for PgKillmailStore {
    async fn upsert(&mut self, killmail: &EnrichedKillmail) -> Result<UpsertOutcome, StoreError> {
        let killmail_id = killmail.killmail_id;

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|error| StoreError::QueryError {
                command: "BEGIN",
                killmail_id,
                error,
            })?;

        let result = sqlx::query(INSERT_KILLMAIL)
            .bind(killmail.killmail_id)
            .bind(&killmail.hash)
            .bind(killmail.solar_system_id)
            .bind(killmail.occurred_at)
            .bind(killmail.destroyed_value)
            .bind(killmail.dropped_value)
            .bind(killmail.fitted_value)
            .bind(killmail.total_value)
            .bind(killmail.victim_ship_id)
            .bind(killmail.killer_ship_id)
            .execute(&mut *tx)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "INSERT",
                killmail_id,
                error,
            })?;

        tx.commit()
            .await
            .map_err(|error| StoreError::QueryError {
                command: "COMMIT",
                killmail_id,
                error,
            })?;

        match result.rows_affected() {
            0 => Ok(UpsertOutcome::AlreadyPresent),
            _ => Ok(UpsertOutcome::Inserted),
        }
    }
}

/// Connects every worker to PostgreSQL with its own connection.
#[derive(Clone)]
pub struct PgConnector {
    database_url: String,
}

impl PgConnector {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_owned(),
        }
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Store = PgKillmailStore;

    async fn connect(&self) -> Result<Self::Store, StoreError> {
        PgKillmailStore::connect(&self.database_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::PgPool;

    fn killmail(killmail_id: i64, hash: &str) -> EnrichedKillmail {
        EnrichedKillmail {
            killmail_id,
            hash: hash.to_owned(),
            solar_system_id: 30000142,
            occurred_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            victim_ship_id: 587,
            killer_ship_id: 0,
            destroyed_value: 10.0,
            dropped_value: 5.0,
            fitted_value: 12.5,
            total_value: 15.0,
        }
    }

    async fn store(db: &PgPool) -> PgKillmailStore {
        let conn = db
            .acquire()
            .await
            .expect("failed to acquire connection")
            .detach();
        PgKillmailStore::from_connection(conn)
    }

    async fn count(db: &PgPool, killmail_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM killmails WHERE killmail_id = $1")
            .bind(killmail_id)
            .fetch_one(db)
            .await
            .expect("failed to count killmails")
    }

    #[test]
    fn test_connection_loss_classification() {
        let refused = StoreError::ConnectionError {
            error: sqlx::Error::PoolTimedOut,
        };
        let reset = StoreError::QueryError {
            command: "INSERT",
            killmail_id: 123,
            error: sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        };
        let rejected = StoreError::QueryError {
            command: "INSERT",
            killmail_id: 123,
            error: sqlx::Error::RowNotFound,
        };

        assert!(refused.is_connection_lost());
        assert!(reset.is_connection_lost());
        assert!(!rejected.is_connection_lost());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_upsert_inserts_row(db: PgPool) {
        let mut store = store(&db).await;

        let outcome = store.upsert(&killmail(123, "abc")).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Inserted);
        let (hash, time, victim, killer): (String, chrono::DateTime<Utc>, i64, i64) = sqlx::query_as(
            "SELECT killmail_hash, killmail_time, victim_ship, kill_ship FROM killmails WHERE killmail_id = $1",
        )
        .bind(123_i64)
        .fetch_one(&db)
        .await
        .unwrap();
        assert_eq!(hash, "abc");
        assert_eq!(time.timestamp(), 1704067200);
        assert_eq!(victim, 587);
        assert_eq!(killer, 0);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_upsert_is_idempotent(db: PgPool) {
        let mut store = store(&db).await;

        assert_eq!(
            store.upsert(&killmail(123, "abc")).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert(&killmail(123, "changed")).await.unwrap(),
            UpsertOutcome::AlreadyPresent
        );

        assert_eq!(count(&db, 123).await, 1);
        let hash: String =
            sqlx::query_scalar("SELECT killmail_hash FROM killmails WHERE killmail_id = $1")
                .bind(123_i64)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(hash, "abc");
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_concurrent_upserts_store_one_row(db: PgPool) {
        let mut first = store(&db).await;
        let mut second = store(&db).await;
        let row = killmail(456, "abc");

        let (a, b) = tokio::join!(first.upsert(&row), second.upsert(&row));

        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|outcome| outcome.as_str());
        assert_eq!(
            outcomes,
            vec![UpsertOutcome::AlreadyPresent, UpsertOutcome::Inserted]
        );
        assert_eq!(count(&db, 456).await, 1);
    }
}
