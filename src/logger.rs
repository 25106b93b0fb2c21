//! Global Logger Module
//!
//! Unified logging interface. Lines go to stderr and, when persistence is
//! enabled, to a SQLite table through a batching writer thread.
//! Conversation text is never passed to the logger, only sizes and counts.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{mpsc, Once, RwLock};
use std::time::{Duration, Instant};

use crate::config::LogConfig;
use crate::error::AppResult;

static INIT: Once = Once::new();

static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

// Log message for batching
#[derive(Debug, Clone)]
struct LogMessage {
    timestamp: i64,
    level: LogLevel,
    source: String,
    message: String,
}

// Async log channel sender
static LOG_SENDER: RwLock<Option<mpsc::Sender<LogMessage>>> = RwLock::new(None);

// Database backing the log viewer, if persistence is on
static LOG_DB: RwLock<Option<PathBuf>> = RwLock::new(None);

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

// ============================================
// Log Level & Entry Types
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: i64,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct LogQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub level: Option<LogLevel>,
    pub source: Option<String>,
}

// ============================================
// Setup
// ============================================

/// Set the minimum level that is emitted.
pub fn set_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn min_level() -> LogLevel {
    LogLevel::from_u8(MIN_LEVEL.load(Ordering::Relaxed))
}

/// Initialise logging from configuration. Later calls are ignored.
pub fn init(cfg: &LogConfig) {
    INIT.call_once(|| {
        match LogLevel::from_str(&cfg.level) {
            Some(level) => set_level(level),
            None => eprintln!("Unknown log level '{}', using info", cfg.level),
        }

        if !cfg.persist {
            return;
        }

        let path = cfg.resolved_db_path();
        match prepare_store(&path) {
            Ok(()) => {
                if let Ok(mut db) = LOG_DB.write() {
                    *db = Some(path.clone());
                }
                spawn_batch_writer(path);
            }
            Err(e) => eprintln!("Log persistence disabled, {:?} unusable: {}", path, e),
        }
    });
}

fn open_conn(path: &Path) -> AppResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Connection::open(path)?)
}

fn prepare_store(path: &Path) -> AppResult<()> {
    let conn = open_conn(path)?;
    create_tables(&conn)
}

fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS global_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            level TEXT NOT NULL,
            source TEXT NOT NULL,
            message TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_global_logs_timestamp ON global_logs(timestamp DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_global_logs_level ON global_logs(level)",
        [],
    )?;
    Ok(())
}

/// Background writer: flushes every second or every `BATCH_SIZE` lines.
fn spawn_batch_writer(path: PathBuf) {
    let (tx, rx) = mpsc::channel::<LogMessage>();

    if let Ok(mut sender) = LOG_SENDER.write() {
        *sender = Some(tx);
    }

    std::thread::spawn(move || {
        let mut buffer = Vec::with_capacity(BATCH_SIZE);
        let mut last_flush = Instant::now();

        loop {
            let timeout = FLUSH_INTERVAL
                .checked_sub(last_flush.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            match rx.recv_timeout(timeout) {
                Ok(msg) => {
                    buffer.push(msg);
                    if buffer.len() >= BATCH_SIZE || last_flush.elapsed() >= FLUSH_INTERVAL {
                        flush_logs(&path, &mut buffer);
                        last_flush = Instant::now();
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if !buffer.is_empty() {
                        flush_logs(&path, &mut buffer);
                    }
                    last_flush = Instant::now();
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }

        if !buffer.is_empty() {
            flush_logs(&path, &mut buffer);
        }
    });
}

fn flush_logs(path: &Path, buffer: &mut Vec<LogMessage>) {
    let result = open_conn(path).and_then(|mut conn| insert_batch(&mut conn, buffer));
    if let Err(e) = result {
        eprintln!("Failed to persist {} log lines: {}", buffer.len(), e);
    }
    buffer.clear();
}

fn insert_batch(conn: &mut Connection, buffer: &[LogMessage]) -> AppResult<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO global_logs (timestamp, level, source, message) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for msg in buffer {
            stmt.execute(params![msg.timestamp, msg.level.as_str(), msg.source, msg.message])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ============================================
// Global Log Functions
// ============================================

fn log_internal(level: LogLevel, source: &str, message: &str) {
    if level < min_level() {
        return;
    }

    let now = chrono::Local::now();
    eprintln!(
        "{} {:<5} [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        level.as_str().to_uppercase(),
        source,
        message
    );

    if let Ok(guard) = LOG_SENDER.read() {
        if let Some(sender) = guard.as_ref() {
            let _ = sender.send(LogMessage {
                timestamp: now.timestamp(),
                level,
                source: source.to_string(),
                message: message.to_string(),
            });
        }
    }
}

pub fn debug(source: &str, message: &str) {
    log_internal(LogLevel::Debug, source, message);
}

pub fn info(source: &str, message: &str) {
    log_internal(LogLevel::Info, source, message);
}

pub fn warn(source: &str, message: &str) {
    log_internal(LogLevel::Warn, source, message);
}

pub fn error(source: &str, message: &str) {
    log_internal(LogLevel::Error, source, message);
}

// ============================================
// Log Viewer Queries
// ============================================

fn store_path() -> Option<PathBuf> {
    LOG_DB.read().ok().and_then(|db| db.clone())
}

fn where_clause(query: &LogQuery, params_vec: &mut Vec<Box<dyn rusqlite::ToSql>>) -> String {
    let mut sql = String::from(" WHERE 1=1");
    if let Some(level) = query.level {
        sql.push_str(" AND level = ?");
        params_vec.push(Box::new(level.as_str().to_string()));
    }
    if let Some(ref source) = query.source {
        sql.push_str(" AND source = ?");
        params_vec.push(Box::new(source.clone()));
    }
    sql
}

fn select_logs(conn: &Connection, query: &LogQuery) -> AppResult<Vec<LogEntry>> {
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    let mut sql = String::from("SELECT id, timestamp, level, source, message FROM global_logs");
    sql.push_str(&where_clause(query, &mut params_vec));
    sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?");
    params_vec.push(Box::new(query.limit.unwrap_or(100).clamp(1, 1000)));
    params_vec.push(Box::new(query.offset.unwrap_or(0).max(0)));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        let level_str: String = row.get(2)?;
        Ok(LogEntry {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            level: LogLevel::from_str(&level_str).unwrap_or(LogLevel::Info),
            source: row.get(3)?,
            message: row.get(4)?,
        })
    })?;

    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn count_logs(conn: &Connection, query: &LogQuery) -> AppResult<i64> {
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    let mut sql = String::from("SELECT COUNT(*) FROM global_logs");
    sql.push_str(&where_clause(query, &mut params_vec));

    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    Ok(conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?)
}

/// Query persisted logs, newest first. Empty when persistence is off.
pub fn query_logs(query: &LogQuery) -> AppResult<Vec<LogEntry>> {
    match store_path() {
        Some(path) => select_logs(&open_conn(&path)?, query),
        None => Ok(Vec::new()),
    }
}

/// Count persisted logs matching the filter.
pub fn logs_count(query: &LogQuery) -> AppResult<i64> {
    match store_path() {
        Some(path) => count_logs(&open_conn(&path)?, query),
        None => Ok(0),
    }
}

/// Delete every persisted log line.
pub fn clear_all_logs() -> AppResult<i64> {
    match store_path() {
        Some(path) => {
            let affected = open_conn(&path)?.execute("DELETE FROM global_logs", [])?;
            Ok(affected as i64)
        }
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(ts: i64, level: LogLevel, source: &str, message: &str) -> LogMessage {
        LogMessage {
            timestamp: ts,
            level,
            source: source.to_string(),
            message: message.to_string(),
        }
    }

    fn seeded() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        insert_batch(
            &mut conn,
            &[
                msg(1, LogLevel::Info, "relay", "first"),
                msg(2, LogLevel::Warn, "client", "second"),
                msg(3, LogLevel::Info, "stream", "third"),
                msg(4, LogLevel::Error, "relay", "fourth"),
            ],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_level_parsing_and_order() {
        assert_eq!(LogLevel::from_str("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("trace"), None);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!(LogLevel::from_u8(LogLevel::Warn as u8), LogLevel::Warn);
    }

    #[test]
    fn test_select_newest_first() {
        let conn = seeded();
        let logs = select_logs(&conn, &LogQuery::default()).unwrap();
        let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["fourth", "third", "second", "first"]);
    }

    #[test]
    fn test_select_filters_and_paging() {
        let conn = seeded();
        let query = LogQuery {
            source: Some("relay".to_string()),
            ..Default::default()
        };
        assert_eq!(count_logs(&conn, &query).unwrap(), 2);

        let query = LogQuery {
            level: Some(LogLevel::Info),
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        let logs = select_logs(&conn, &query).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "first");
        assert_eq!(logs[0].level, LogLevel::Info);
    }

    #[test]
    fn test_queries_without_store() {
        // Persistence is never initialised in unit tests.
        assert!(query_logs(&LogQuery::default()).unwrap().is_empty());
        assert_eq!(logs_count(&LogQuery::default()).unwrap(), 0);
    }
}
