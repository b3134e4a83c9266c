//! `sql`: runs statements against the bot's database inside one transaction.
//!
//! Every inline-code or code-block argument holds one or more statements.
//! Results are collected into one reply that fits the output budget. When the
//! session changed something, the reply offers ↩ (rollback, also on timeout)
//! and ✅ (commit).
//!
//! A session holds the database write lease from open to finish, so other
//! writers queue behind a pending confirmation instead of failing.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use bastion_core::args::{Arg, Args};
use bastion_core::blocking::offload_result;
use bastion_core::confirm::{ConfirmationFlow, Feedback, PendingConfirmation};
use bastion_core::markup::code_block;
use bastion_core::output::{OutputAccumulator, TableChunk};
use bastion_core::platform::Message;
use bastion_core::store::{Database, WriteLease};
use rusqlite::{Batch, Connection, Statement};
use rusqlite::types::ValueRef;

use crate::bot::BotContext;

const ROLLBACK: &str = "\u{21A9}";
const COMMIT: &str = "\u{2705}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Rollback,
    Commit,
}

/// What one statement produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StatementOutput {
    Done {
        status: String,
        table: Option<TableChunk>,
    },
    Failed(String),
}

impl StatementOutput {
    fn append_to(self, output: &mut OutputAccumulator) {
        match self {
            StatementOutput::Done { status, table } => {
                output.status(status);
                if let Some(table) = table {
                    output.table(table);
                }
            }
            StatementOutput::Failed(error) => output.status(code_block(&error)),
        }
    }
}

struct SessionState {
    conn: Connection,
    wrote: bool,
    lease: Option<WriteLease>,
}

/// One connection with an open transaction, held for a whole invocation.
///
/// Dropping the session without [`SqlSession::finish`] rolls back.
#[derive(Clone)]
pub(crate) struct SqlSession {
    state: Arc<Mutex<SessionState>>,
    max_rows: usize,
}

impl SqlSession {
    pub(crate) async fn open(database: Database, max_rows: usize) -> Result<Self> {
        let state = offload_result(move || -> Result<SessionState> {
            let lease = database.lease_writes();
            let conn = database.connect()?;
            conn.execute_batch("BEGIN")?;
            Ok(SessionState {
                conn,
                wrote: false,
                lease: Some(lease),
            })
        })
        .await
        .context("Failed to open sql session")?;

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            max_rows,
        })
    }

    /// Runs every statement in `sql`, one output each. Stops at the first
    /// failure; statements after it in the same argument don't run.
    pub(crate) async fn execute(&self, sql: String) -> Result<Vec<StatementOutput>> {
        let state = Arc::clone(&self.state);
        let max_rows = self.max_rows;
        offload_result(move || -> Result<Vec<StatementOutput>> {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let SessionState { conn, wrote, .. } = &mut *state;
            Ok(run_script(conn, wrote, &sql, max_rows))
        })
        .await
    }

    /// The session wrote something and its transaction is still open.
    pub(crate) async fn has_pending_changes(&self) -> Result<bool> {
        let state = Arc::clone(&self.state);
        offload_result(move || -> Result<bool> {
            let state = state.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(state.wrote && !state.conn.is_autocommit())
        })
        .await
    }

    pub(crate) async fn finish(&self, decision: Decision) -> Result<()> {
        let state = Arc::clone(&self.state);
        offload_result(move || -> Result<()> {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.conn.is_autocommit() {
                let command = match decision {
                    Decision::Commit => "COMMIT",
                    Decision::Rollback => "ROLLBACK",
                };
                state
                    .conn
                    .execute_batch(command)
                    .with_context(|| format!("{command} failed"))?;
            }
            state.lease = None;
            Ok(())
        })
        .await
    }
}

fn run_script(
    conn: &Connection,
    wrote: &mut bool,
    sql: &str,
    max_rows: usize,
) -> Vec<StatementOutput> {
    let mut outputs = Vec::new();
    let mut batch = Batch::new(conn, sql);
    loop {
        let result = batch.next().and_then(|stmt| {
            let Some(mut stmt) = stmt else {
                return Ok(None);
            };
            let text = stmt.expanded_sql().unwrap_or_default();
            // An explicit COMMIT or ROLLBACK ended the session's transaction;
            // later statements get a new one.
            if conn.is_autocommit() && first_word(&text) != "BEGIN" {
                conn.execute_batch("BEGIN")?;
                *wrote = false;
            }
            run_statement(&mut stmt, &text, max_rows).map(Some)
        });
        match result {
            Ok(Some((output, changed))) => {
                *wrote |= changed;
                outputs.push(output);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(%sql, "statement failed: {err}");
                outputs.push(StatementOutput::Failed(err.to_string()));
                break;
            }
        }
    }
    outputs
}

/// Runs one prepared statement. Returns its output and whether it may have
/// written.
fn run_statement(
    stmt: &mut Statement<'_>,
    sql: &str,
    max_rows: usize,
) -> rusqlite::Result<(StatementOutput, bool)> {
    let wrote = !stmt.readonly();
    let columns = stmt.column_count();

    if columns == 0 {
        let changed = stmt.execute([])?;
        let status = status_tag(sql, changed, false);
        return Ok((
            StatementOutput::Done {
                status,
                table: None,
            },
            wrote,
        ));
    }

    let header = stmt.column_names().join(" ");
    let mut lines = vec![header];
    let mut rows = stmt.query([])?;
    let mut fetched = 0;
    while fetched < max_rows {
        let Some(row) = rows.next()? else {
            break;
        };
        let mut values = Vec::with_capacity(columns);
        for index in 0..columns {
            values.push(render_value(row.get_ref(index)?));
        }
        lines.push(values.join(" "));
        fetched += 1;
    }

    let table = if fetched == max_rows {
        TableChunk::with_marker(lines)
    } else {
        TableChunk::new(lines)
    };
    // The tag counts every row, not just the fetched ones.
    let mut total = fetched;
    while rows.next()?.is_some() {
        total += 1;
    }
    Ok((
        StatementOutput::Done {
            status: status_tag(sql, total, true),
            table: Some(table),
        },
        wrote,
    ))
}

fn first_word(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches(';')
        .to_ascii_uppercase()
}

/// Command tag in the style of `psql`: `SELECT 3`, `INSERT 0 1`,
/// `UPDATE 2`, `CREATE TABLE`.
fn status_tag(sql: &str, count: usize, returned_rows: bool) -> String {
    let verb = first_word(sql);
    let mut words = sql
        .split_whitespace()
        .skip(1)
        .map(|word| word.trim_end_matches(';').to_ascii_uppercase());
    if returned_rows && verb != "INSERT" && verb != "UPDATE" && verb != "DELETE" {
        return format!("SELECT {count}");
    }
    match verb.as_str() {
        "INSERT" | "REPLACE" => format!("INSERT 0 {count}"),
        "UPDATE" | "DELETE" => format!("{verb} {count}"),
        "CREATE" | "DROP" | "ALTER" => match words.next() {
            Some(object) => format!("{verb} {object}"),
            None => verb,
        },
        _ => verb,
    }
}

/// Renders a value as a literal: `'text'`, `1`, `1.5`, `NULL`, `b'\x00'`.
fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(number) => number.to_string(),
        ValueRef::Real(number) => format!("{number:?}"),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
        }
        ValueRef::Blob(bytes) => {
            let mut rendered = String::from("b'");
            for &byte in bytes {
                match byte {
                    b'\\' => rendered.push_str("\\\\"),
                    b'\'' => rendered.push_str("\\'"),
                    0x20..=0x7e => rendered.push(char::from(byte)),
                    _ => {
                        let _ = write!(rendered, "\\x{byte:02x}");
                    }
                }
            }
            rendered.push('\'');
            rendered
        }
    }
}

pub(crate) async fn run_sql(context: &BotContext, message: &Message, args: Args) -> Result<()> {
    let statements: Vec<String> = args
        .filter(Arg::is_code)
        .map(|arg| arg.text().to_string())
        .collect();
    if statements.is_empty() {
        return Ok(());
    }

    let config = context.config();
    let session = SqlSession::open(context.database().clone(), config.max_fetch_rows).await?;
    let mut output = OutputAccumulator::new();
    for statement in statements {
        for result in session.execute(statement).await? {
            result.append_to(&mut output);
        }
    }

    let text = output.render(config.output_budget);
    let reply = context
        .platform()
        .say(message.channel_id, &text)
        .await
        .context("Failed to post sql output")?;

    if !session.has_pending_changes().await? {
        return Ok(());
    }

    let pending = PendingConfirmation::new(
        reply.location(),
        message.author.id,
        config.sql_confirm_timeout(),
    )
    .default_choice(ROLLBACK, Decision::Rollback)
    .choice(COMMIT, Decision::Commit)
    .feedback(Feedback::KeepChosen);

    let resolution = ConfirmationFlow::new(context.platform(), context.hub())
        .run(pending, |decision| session.finish(decision))
        .await?;
    tracing::info!(
        user_id = message.author.id,
        decision = ?resolution.action,
        timed_out = resolution.timed_out,
        "sql session closed"
    );
    Ok(())
}
