use crate::Database;
use crate::models::{FactCheckRow, MessageRow, ThreadListingRow, ThreadRow, UserRow};
use anyhow::Result;
use axiom_types::models::Role;
use rusqlite::{Connection, ErrorCode, Row, TransactionBehavior};

/// Result of [`Database::append_user_message`].
#[derive(Debug)]
pub enum AppendOutcome {
    Appended(MessageRow),
    /// The thread already holds the maximum number of user messages;
    /// nothing was written.
    QuotaReached,
}

impl Database {
    // -- Users --

    /// Inserts a user and returns its id, or `None` when the email is
    /// already registered.
    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO users (email, password_hash) VALUES (?1, ?2) RETURNING id",
                (email, password_hash),
                |row| row.get(0),
            );

            match inserted {
                Ok(id) => Ok(Some(id)),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password_hash FROM users WHERE email = ?1",
                [email],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password_hash FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    // -- Threads --

    pub fn create_thread(&self, user_id: i64, is_public: bool) -> Result<ThreadRow> {
        self.with_conn_mut(|conn| {
            let row = conn.query_row(
                "INSERT INTO threads (user_id, is_public) VALUES (?1, ?2)
                 RETURNING id, user_id, is_public",
                rusqlite::params![user_id, is_public],
                thread_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_thread(&self, id: i64) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, is_public FROM threads WHERE id = ?1",
                [id],
                thread_from_row,
            )
            .optional()
        })
    }

    /// Deletes a thread together with its messages. Returns whether a row
    /// was removed.
    pub fn delete_thread(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM threads WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    /// Flips the public flag and returns the new value, or `None` when the
    /// thread does not exist.
    pub fn toggle_thread_public(&self, id: i64) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "UPDATE threads SET is_public = NOT is_public WHERE id = ?1 RETURNING is_public",
                [id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Threads owned by `user_id`, newest first.
    pub fn list_threads_for_user(&self, user_id: i64) -> Result<Vec<ThreadListingRow>> {
        self.with_conn(|conn| query_listings(conn, "WHERE t.user_id = ?1", rusqlite::params![user_id]))
    }

    /// Every public thread, newest first.
    pub fn list_public_threads(&self) -> Result<Vec<ThreadListingRow>> {
        self.with_conn(|conn| query_listings(conn, "WHERE t.is_public = 1", rusqlite::params![]))
    }

    // -- Messages --

    /// Counts the thread's user messages and, if below `ceiling`, inserts
    /// the new one. Both steps run in one immediate transaction so
    /// concurrent sends cannot overshoot the ceiling.
    pub fn append_user_message(&self, thread_id: i64, text: &str, ceiling: i64) -> Result<AppendOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let count = count_user_messages(&tx, thread_id)?;
            if count >= ceiling {
                return Ok(AppendOutcome::QuotaReached);
            }

            let row = insert_message(&tx, thread_id, Role::User, text)?;
            tx.commit()?;
            Ok(AppendOutcome::Appended(row))
        })
    }

    pub fn insert_message(&self, thread_id: i64, role: Role, text: &str) -> Result<MessageRow> {
        self.with_conn_mut(|conn| insert_message(conn, thread_id, role, text))
    }

    /// All messages of a thread in creation order.
    pub fn get_thread_messages(&self, thread_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_id, role, message, created_at
                 FROM messages
                 WHERE thread_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;

            let rows = stmt
                .query_map([thread_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn count_user_messages(&self, thread_id: i64) -> Result<i64> {
        self.with_conn(|conn| count_user_messages(conn, thread_id))
    }

    // -- Fact checks --

    /// Stores a finished check, claim and verdict together.
    pub fn insert_fact_check(&self, user_id: Option<i64>, claim: &str, verdict: &str) -> Result<FactCheckRow> {
        self.with_conn_mut(|conn| {
            let row = conn.query_row(
                "INSERT INTO fact_checks (claim_text, verdict, user_id) VALUES (?1, ?2, ?3)
                 RETURNING id, claim_text, verdict, user_id, created_at",
                rusqlite::params![claim, verdict, user_id],
                fact_check_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_fact_check(&self, id: i64) -> Result<Option<FactCheckRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, claim_text, verdict, user_id, created_at FROM fact_checks WHERE id = ?1",
                [id],
                fact_check_from_row,
            )
            .optional()
        })
    }

    pub fn list_fact_checks_for_user(&self, user_id: i64) -> Result<Vec<FactCheckRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, claim_text, verdict, user_id, created_at
                 FROM fact_checks
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;

            let rows = stmt
                .query_map([user_id], fact_check_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn delete_fact_check(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM fact_checks WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }
}

fn insert_message(conn: &Connection, thread_id: i64, role: Role, text: &str) -> Result<MessageRow> {
    let row = conn.query_row(
        "INSERT INTO messages (thread_id, role, message) VALUES (?1, ?2, ?3)
         RETURNING id, thread_id, role, message, created_at",
        rusqlite::params![thread_id, role.as_str(), text],
        message_from_row,
    )?;
    Ok(row)
}

fn count_user_messages(conn: &Connection, thread_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE thread_id = ?1 AND role = 'user'",
        [thread_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn query_listings(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<ThreadListingRow>> {
    // Author email and first user message come back in the same query (no N+1)
    let sql = format!(
        "SELECT t.id, t.user_id, u.email, t.is_public, t.created_at,
                (SELECT m.message FROM messages m
                  WHERE m.thread_id = t.id AND m.role = 'user'
                  ORDER BY m.created_at ASC, m.id ASC
                  LIMIT 1)
         FROM threads t
         JOIN users u ON u.id = t.user_id
         {}
         ORDER BY t.created_at DESC, t.id DESC",
        filter
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(ThreadListingRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                author_email: row.get(2)?,
                is_public: row.get(3)?,
                created_at: row.get(4)?,
                first_user_message: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
    })
}

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<ThreadRow> {
    Ok(ThreadRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        is_public: row.get(2)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let role: String = row.get(2)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(MessageRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        role,
        message: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn fact_check_from_row(row: &Row<'_>) -> rusqlite::Result<FactCheckRow> {
    Ok(FactCheckRow {
        id: row.get(0)?,
        claim_text: row.get(1)?,
        verdict: row.get(2)?,
        user_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
