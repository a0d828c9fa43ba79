//! Detection database schema.

use crate::error::Result;
use sqlx::SqlitePool;

/// DDL statements, applied in order at open. All statements are
/// idempotent so re-opening an existing database is a no-op.
const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS audio_files (
        id TEXT PRIMARY KEY,
        file_path TEXT NOT NULL UNIQUE,
        duration REAL NOT NULL,
        size_bytes INTEGER NOT NULL,
        recording_start TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS detections (
        id TEXT PRIMARY KEY,
        species_tensor TEXT NOT NULL,
        scientific_name TEXT NOT NULL,
        common_name TEXT NOT NULL,
        confidence REAL NOT NULL,
        timestamp TEXT NOT NULL,
        audio_file_id TEXT REFERENCES audio_files(id),
        latitude REAL,
        longitude REAL,
        species_confidence_threshold REAL NOT NULL,
        week INTEGER NOT NULL,
        sensitivity_setting REAL NOT NULL,
        overlap REAL NOT NULL,
        hour_epoch INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS weather (
        hour_epoch INTEGER PRIMARY KEY,
        temperature REAL,
        humidity REAL,
        pressure REAL,
        wind_speed REAL,
        precipitation REAL
    )",
    "CREATE INDEX IF NOT EXISTS idx_detections_timestamp
        ON detections (timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_detections_species_timestamp
        ON detections (scientific_name, timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_detections_confidence
        ON detections (confidence)",
    "CREATE INDEX IF NOT EXISTS idx_detections_hour_epoch
        ON detections (hour_epoch)",
];

/// Apply the schema to a freshly opened pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
