//! Database schema definitions

/// SQL to create all tables
///
/// One row per storage namespace (identity key). The payload is the JSON
/// array of favorite records; `version` backs the compare-and-swap writes.
pub const CREATE_TABLES: &str = r#"
-- Namespaced favorites records (one blob per identity key)
CREATE TABLE IF NOT EXISTS records (
    namespace TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    updated_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_records_updated ON records(updated_at)
"#;
