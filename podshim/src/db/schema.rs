//! Record store schema.

pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_VERSION_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
";

// `seq` preserves enumeration order; `record` holds the JSON-encoded EngineRecord.
const RECORDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    state TEXT NOT NULL,
    record TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_name ON records(name);
";

pub fn all_schemas() -> [&'static str; 2] {
    [SCHEMA_VERSION_TABLE, RECORDS_TABLE]
}
