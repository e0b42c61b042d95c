//! Shared fixtures: SQLite databases and a fake text-generation model

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use askdb::{
    ConnectRequest, ConnectionManager, DatabaseType, EngineConnector, ExecutionPolicy, LlmError,
    Pipeline, TextGenerator, TlsConfig,
};

/// Unique temp path per fixture
fn temp_db_path(prefix: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!("askdb_{prefix}_{}_{id}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

/// Customer/Invoice database: five customers, two of them from France
pub fn create_store_db() -> PathBuf {
    let path = temp_db_path("store");
    let conn = rusqlite::Connection::open(&path).expect("Failed to create database");

    conn.execute_batch(
        "CREATE TABLE Customer (
            CustomerId INTEGER PRIMARY KEY,
            FirstName TEXT NOT NULL,
            LastName TEXT NOT NULL,
            Country TEXT
        );
        CREATE TABLE Invoice (
            InvoiceId INTEGER PRIMARY KEY,
            CustomerId INTEGER NOT NULL REFERENCES Customer (CustomerId),
            Total REAL NOT NULL
        );
        INSERT INTO Customer (FirstName, LastName, Country) VALUES
            ('Camille', 'Bernard', 'France'),
            ('Dominique', 'Lefebvre', 'France'),
            ('Leonie', 'Kohler', 'Germany'),
            ('Frank', 'Harris', 'USA'),
            ('Luis', 'Rojas', 'Chile');
        INSERT INTO Invoice (CustomerId, Total) VALUES (1, 1.98), (1, 3.96), (3, 5.94);",
    )
    .expect("Failed to seed database");

    path
}

/// Album database with no tables in common with the store database
pub fn create_music_db() -> PathBuf {
    let path = temp_db_path("music");
    let conn = rusqlite::Connection::open(&path).expect("Failed to create database");

    conn.execute_batch(
        "CREATE TABLE Album (
            AlbumId INTEGER PRIMARY KEY,
            Title TEXT NOT NULL
        );
        INSERT INTO Album (Title) VALUES ('For Those About To Rock'), ('Balls to the Wall');",
    )
    .expect("Failed to seed database");

    path
}

pub fn sqlite_request(path: &std::path::Path) -> ConnectRequest {
    ConnectRequest {
        engine: Some(DatabaseType::SQLite),
        file: Some(path.to_path_buf()),
        ..ConnectRequest::default()
    }
}

pub fn row_count(path: &std::path::Path, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(path).expect("Failed to open database");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("Failed to count rows")
}

/// Fake model: answers generation prompts with a fixed statement and synthesis
/// prompts with a sentence quoting the SQL response
#[derive(Default)]
pub struct FakeModel {
    sql: Mutex<String>,
    pub generation_calls: AtomicUsize,
    pub synthesis_calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn replying(sql: &str) -> Self {
        Self { sql: Mutex::new(sql.to_string()), ..Self::default() }
    }

    pub fn set_sql(&self, sql: &str) {
        *self.sql.lock().unwrap() = sql.to_string();
    }

    pub fn calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst) + self.synthesis_calls.load(Ordering::SeqCst)
    }

    pub fn last_generation_prompt(&self) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.contains("You are a SQL expert"))
            .cloned()
    }
}

impl TextGenerator for FakeModel {
    async fn generate(&self, prompt: &str, stop: &[&str]) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(response) = prompt.lines().find_map(|l| l.strip_prefix("SQL Response: ")) {
            assert!(stop.is_empty(), "synthesis must not use a stop sequence");
            self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(format!("The result is {response}."));
        }

        assert_eq!(stop, ["\nSQL Result:"]);
        self.generation_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("```sql\n{}\n```", self.sql.lock().unwrap()))
    }
}

pub type TestPipeline = Pipeline<EngineConnector, Arc<FakeModel>>;

pub fn pipeline(model: Arc<FakeModel>, policy: ExecutionPolicy) -> TestPipeline {
    let manager = Arc::new(ConnectionManager::new(EngineConnector, TlsConfig::default(), 2));
    Pipeline::new(manager, model, policy)
}
