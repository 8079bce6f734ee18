//! SQLite 儲存：tickets / agent_runs / reviews 三張表。
//! 連線開啟時設定 `foreign_keys=ON` 並套用 migration，版本記錄在 `PRAGMA user_version`。

use crate::config::DatabaseConfig;
use crate::domain::model::{AgentRun, NewAgentRun, Review, ReviewStatus, Ticket, TicketInput};
use crate::domain::ports::TicketStore;
use crate::utils::error::{Result, TriageError};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/0001_init.sql"),
}];

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let current: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();

    if current > latest {
        return Err(TriageError::SchemaVersionError {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    tracing::info!(from = current, to = latest, "🗄️ Database migrated");
    Ok(())
}

fn bootstrap(mut conn: Connection) -> Result<Connection> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

/// 截到微秒，與寫入資料庫的精度一致
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    // 固定長度，字串排序即時間排序
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        subject: row.get(1)?,
        body: row.get(2)?,
        customer_email: row.get(3)?,
        channel: row.get(4)?,
        created_at: parse_ts(row, 5)?,
    })
}

fn agent_run_from_row(row: &Row<'_>) -> rusqlite::Result<AgentRun> {
    Ok(AgentRun {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        intent: row.get(2)?,
        priority: row.get(3)?,
        confidence: row.get(4)?,
        draft_reply: row.get(5)?,
        decision: row.get(6)?,
        created_at: parse_ts(row, 7)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let status: String = row.get(2)?;
    let status = status
        .parse::<ReviewStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(Review {
        id: row.get(0)?,
        agent_run_id: row.get(1)?,
        status,
        reviewer_notes: row.get(3)?,
        final_reply: row.get(4)?,
        created_at: parse_ts(row, 5)?,
    })
}

const TICKET_COLUMNS: &str = "id, subject, body, customer_email, channel, created_at";
const AGENT_RUN_COLUMNS: &str =
    "id, ticket_id, intent, priority, confidence, draft_reply, decision, created_at";
const REVIEW_COLUMNS: &str = "id, agent_run_id, status, reviewer_notes, final_reply, created_at";

pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let started_at = Instant::now();
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = bootstrap(Connection::open(path)?)?;
        tracing::info!(
            path = %path.display(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "🗄️ Opened SQLite ticket store"
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = bootstrap(Connection::open_in_memory()?)?;
        tracing::debug!("Opened in-memory ticket store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        match config.sqlite_path() {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn review_by_id(conn: &Connection, review_id: i64) -> Result<Option<Review>> {
        let review = conn
            .query_row(
                &format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS),
                params![review_id],
                review_from_row,
            )
            .optional()?;
        Ok(review)
    }

    fn set_review_outcome(
        &self,
        review_id: i64,
        status: ReviewStatus,
        column: &str,
        value: &str,
    ) -> Result<Option<Review>> {
        let conn = self.conn();
        let changed = conn.execute(
            &format!("UPDATE reviews SET status = ?1, {} = ?2 WHERE id = ?3", column),
            params![status.as_str(), value, review_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Self::review_by_id(&conn, review_id)
    }
}

impl TicketStore for SqliteTicketStore {
    fn create_ticket(&self, ticket: &TicketInput) -> Result<Ticket> {
        let created_at = now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tickets (subject, body, customer_email, channel, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ticket.subject,
                ticket.body,
                ticket.customer_email,
                ticket.channel,
                format_ts(&created_at)
            ],
        )?;

        Ok(Ticket {
            id: conn.last_insert_rowid(),
            subject: ticket.subject.clone(),
            body: ticket.body.clone(),
            customer_email: ticket.customer_email.clone(),
            channel: ticket.channel.clone(),
            created_at,
        })
    }

    fn create_agent_run(&self, run: &NewAgentRun) -> Result<AgentRun> {
        let created_at = now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO agent_runs
                (ticket_id, intent, priority, confidence, draft_reply, decision, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.ticket_id,
                run.intent,
                run.priority,
                run.confidence,
                run.draft_reply,
                run.decision,
                format_ts(&created_at)
            ],
        )?;

        Ok(AgentRun {
            id: conn.last_insert_rowid(),
            ticket_id: run.ticket_id,
            intent: run.intent.clone(),
            priority: run.priority.clone(),
            confidence: run.confidence,
            draft_reply: run.draft_reply.clone(),
            decision: run.decision.clone(),
            created_at,
        })
    }

    fn create_review(
        &self,
        agent_run_id: i64,
        status: ReviewStatus,
        reviewer_notes: Option<&str>,
        final_reply: Option<&str>,
    ) -> Result<Review> {
        let created_at = now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO reviews (agent_run_id, status, reviewer_notes, final_reply, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                agent_run_id,
                status.as_str(),
                reviewer_notes,
                final_reply,
                format_ts(&created_at)
            ],
        )?;

        Ok(Review {
            id: conn.last_insert_rowid(),
            agent_run_id,
            status,
            reviewer_notes: reviewer_notes.map(str::to_string),
            final_reply: final_reply.map(str::to_string),
            created_at,
        })
    }

    fn get_ticket(&self, ticket_id: i64) -> Result<Option<Ticket>> {
        let ticket = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS),
                params![ticket_id],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    fn get_latest_agent_run(&self, ticket_id: i64) -> Result<Option<AgentRun>> {
        let run = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM agent_runs WHERE ticket_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    AGENT_RUN_COLUMNS
                ),
                params![ticket_id],
                agent_run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn list_pending_reviews(&self, limit: usize) -> Result<Vec<Review>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reviews WHERE status = ?1
             ORDER BY created_at ASC, id ASC LIMIT ?2",
            REVIEW_COLUMNS
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let reviews = stmt
            .query_map(params![ReviewStatus::Pending.as_str(), limit], review_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reviews)
    }

    fn get_review(&self, review_id: i64) -> Result<Option<Review>> {
        Self::review_by_id(&self.conn(), review_id)
    }

    fn approve_review(&self, review_id: i64, final_reply: &str) -> Result<Option<Review>> {
        self.set_review_outcome(review_id, ReviewStatus::Approved, "final_reply", final_reply)
    }

    fn reject_review(&self, review_id: i64, reviewer_notes: &str) -> Result<Option<Review>> {
        self.set_review_outcome(review_id, ReviewStatus::Rejected, "reviewer_notes", reviewer_notes)
    }
}
