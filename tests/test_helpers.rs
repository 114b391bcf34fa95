// ==========================================
// Integration test helpers
// ==========================================
// Temp-file database with the reference and catalog schema,
// the seeded S1 project and a ready JobController.
// ==========================================

#![allow(dead_code)]

use precast_import::config::ImportConfig;
use precast_import::db::{open_sqlite_connection, ConnectionPool};
use precast_import::domain::CallerContext;
use precast_import::importer::DraftPersister;
use precast_import::jobs::JobController;
use precast_import::repository::{ActivityLogRepository, ImportJobRepository};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const PROJECT_ID: i64 = 1;
pub const OTHER_PROJECT_ID: i64 = 2;
pub const SESSION_TOKEN: &str = "session-ok";
pub const EXPIRED_TOKEN: &str = "session-expired";
pub const USER_ID: i64 = 42;

/// Reference dictionaries, catalog tables and sessions.
pub const SCHEMA: &str = r#"
    CREATE TABLE drawing_types (
        id INTEGER PRIMARY KEY, project_id INTEGER NOT NULL, name TEXT NOT NULL);
    CREATE TABLE project_stages (
        id INTEGER PRIMARY KEY, project_id INTEGER NOT NULL, name TEXT NOT NULL,
        stage_order INTEGER NOT NULL DEFAULT 0);
    CREATE TABLE precast (
        id INTEGER PRIMARY KEY, project_id INTEGER NOT NULL, parent_id INTEGER,
        path TEXT NOT NULL, prefix TEXT, naming_convention TEXT, name TEXT);
    CREATE TABLE bom_products (
        id INTEGER PRIMARY KEY, project_id INTEGER NOT NULL, name_id TEXT NOT NULL,
        product_name TEXT);

    CREATE TABLE element_type (
        element_type_id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL, element_type TEXT NOT NULL, element_type_name TEXT,
        height REAL, length REAL, thickness REAL, mass REAL, volume REAL, area REAL,
        width REAL, density REAL, element_type_version TEXT,
        total_count_element INTEGER NOT NULL DEFAULT 0,
        instance_count INTEGER NOT NULL DEFAULT 0,
        created_by INTEGER, created_at TEXT, updated_at TEXT,
        UNIQUE (project_id, element_type));
    CREATE TABLE element_type_path (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        element_type_id INTEGER NOT NULL REFERENCES element_type(element_type_id),
        stage_path TEXT NOT NULL, created_at TEXT);
    CREATE TABLE drawings (
        drawing_id INTEGER PRIMARY KEY AUTOINCREMENT, project_id INTEGER,
        element_type_id INTEGER NOT NULL REFERENCES element_type(element_type_id),
        drawing_type_id INTEGER NOT NULL REFERENCES drawing_types(id),
        current_version TEXT NOT NULL, file TEXT, comments TEXT, created_by INTEGER,
        created_at TEXT, updated_at TEXT);
    CREATE TABLE element_type_hierarchy_quantity (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        element_type_id INTEGER NOT NULL REFERENCES element_type(element_type_id),
        hierarchy_id INTEGER NOT NULL REFERENCES precast(id),
        quantity INTEGER NOT NULL, naming_convention TEXT,
        left_quantity INTEGER NOT NULL DEFAULT 0,
        UNIQUE (element_type_id, hierarchy_id));
    CREATE TABLE element_type_bom (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        element_type_id INTEGER NOT NULL REFERENCES element_type(element_type_id),
        project_id INTEGER, product_json TEXT NOT NULL, created_at TEXT);
    CREATE TABLE element (
        id INTEGER PRIMARY KEY AUTOINCREMENT, project_id INTEGER,
        element_type_id INTEGER NOT NULL REFERENCES element_type(element_type_id),
        hierarchy_id INTEGER, element_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'created', created_at TEXT);

    CREATE TABLE session (
        session_id TEXT PRIMARY KEY, user_id INTEGER NOT NULL,
        host_name TEXT, ip_address TEXT, expires_at TEXT);
"#;

/// Project 1 dictionaries: stages Cast/Cure, drawing types Plan/Section,
/// hierarchy T1/F1 and T1/F2, BOM products Cement_OPC and Steel_Fe500.
/// Project 2 owns look-alike labels that must never resolve for project 1.
pub const SEED: &str = r#"
    INSERT INTO project_stages VALUES (1, 1, 'Cast', 1), (2, 1, 'Cure', 2), (3, 2, 'Cast', 1);
    INSERT INTO drawing_types VALUES (11, 1, 'Plan'), (12, 1, 'Section'), (13, 2, 'Details');
    INSERT INTO precast VALUES
        (21, 1, NULL, 'T1/F1', 'T1', '-T1F1-', 'F1'),
        (22, 1, NULL, 'T1/F2', 'T1', '-T1F2-', 'F2'),
        (23, 2, NULL, 'T9/F1', 'T9', '-T9F1-', 'F1');
    INSERT INTO bom_products VALUES
        (31, 1, 'Cement_OPC', 'Cement OPC 53'),
        (32, 1, 'Steel_Fe500', 'Steel Fe500'),
        (33, 2, 'Cement_OPC', 'Cement (project 2)');
"#;

pub fn create_test_db() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("precast.db").to_string_lossy().to_string();

    let conn = Connection::open(&db_path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(SEED).unwrap();
    conn.execute(
        "INSERT INTO session VALUES (?1, ?2, 'ws-01', '10.1.1.7', ?3)",
        params![
            SESSION_TOKEN,
            USER_ID,
            chrono::Utc::now() + chrono::Duration::hours(8)
        ],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO session VALUES (?1, 7, NULL, NULL, ?2)",
        params![EXPIRED_TOKEN, chrono::Utc::now() - chrono::Duration::hours(1)],
    )
    .unwrap();

    (dir, db_path)
}

pub fn caller() -> CallerContext {
    CallerContext {
        user_id: USER_ID,
        host: Some("ws-01".to_string()),
        ip: Some("10.1.1.7".to_string()),
    }
}

// ==========================================
// Test files
// ==========================================

/// Header of the S1 project layout (18 columns).
pub fn s1_header() -> Vec<&'static str> {
    vec![
        "element_type",
        "element_type_name",
        "height",
        "length",
        "thickness",
        "mass",
        "volume",
        "area",
        "width",
        "element_type_version",
        "Cast",
        "Cure",
        "Plan",
        "Section",
        "T1/F1",
        "T1/F2",
        "Cement_OPC",
        "Steel_Fe500",
    ]
}

/// The S1 row with another code.
pub fn s1_row(code: &str) -> String {
    format!(
        "{},Beam-A,300,2500,6000,2400,4.5,5.25,200,,yes,,plan.dwg,,2,1,100,50",
        code
    )
}

pub fn write_csv(dir: &Path, name: &str, header: &[&str], rows: &[String]) -> PathBuf {
    let mut content = header.join(",");
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ==========================================
// Environment
// ==========================================

pub struct TestEnv {
    pub dir: TempDir,
    pub db_path: String,
    pub pool: ConnectionPool,
    pub conn: Arc<Mutex<Connection>>,
    pub jobs: Arc<ImportJobRepository>,
    pub activity: Arc<ActivityLogRepository>,
    pub controller: Arc<JobController>,
}

impl TestEnv {
    /// Fresh connection for assertions.
    pub fn open(&self) -> Connection {
        open_sqlite_connection(&self.db_path).unwrap()
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.open().query_row(sql, [], |row| row.get(0)).unwrap()
    }
}

pub fn build_env(config: ImportConfig) -> TestEnv {
    build(config, None::<fn(&ConnectionPool) -> Arc<dyn DraftPersister>>)
}

/// Environment whose controller persists through `make(pool)`.
pub fn build_env_with<F>(config: ImportConfig, make: F) -> TestEnv
where
    F: FnOnce(&ConnectionPool) -> Arc<dyn DraftPersister>,
{
    build(config, Some(make))
}

fn build<F>(config: ImportConfig, make: Option<F>) -> TestEnv
where
    F: FnOnce(&ConnectionPool) -> Arc<dyn DraftPersister>,
{
    let (dir, db_path) = create_test_db();
    let pool = ConnectionPool::new(&db_path, config.pool_size, Duration::from_secs(5)).unwrap();

    let conn = Arc::new(Mutex::new(open_sqlite_connection(&db_path).unwrap()));
    let jobs = Arc::new(ImportJobRepository::new(conn.clone()));
    jobs.ensure_table().unwrap();
    let activity = Arc::new(ActivityLogRepository::new(conn.clone()));
    activity.ensure_table().unwrap();

    let mut controller = JobController::new(pool.clone(), config, jobs.clone());
    if let Some(make) = make {
        controller = controller.with_persister(make(&pool));
    }

    TestEnv {
        dir,
        db_path,
        pool,
        conn,
        jobs,
        activity,
        controller: Arc::new(controller),
    }
}

/// Rows of the four reference tables, for isolation checks.
pub fn reference_snapshot(conn: &Connection) -> Vec<String> {
    let mut rows = Vec::new();
    for sql in [
        "SELECT id || '|' || project_id || '|' || name FROM drawing_types ORDER BY id",
        "SELECT id || '|' || project_id || '|' || name || '|' || stage_order FROM project_stages ORDER BY id",
        "SELECT id || '|' || project_id || '|' || path || '|' || naming_convention FROM precast ORDER BY id",
        "SELECT id || '|' || project_id || '|' || name_id || '|' || product_name FROM bom_products ORDER BY id",
    ] {
        let mut stmt = conn.prepare(sql).unwrap();
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(|r| r.unwrap());
        rows.extend(values);
    }
    rows
}
