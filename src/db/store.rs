//! Detection store: CRUD plus the aggregates consumed by the query and
//! analytics layers.

use crate::db::models::{
    AudioFile, Detection, HourlyCount, SpeciesCount, StorageMetrics, TopSpeciesRow, Weather,
};
use crate::db::schema;
use crate::error::{Error, Result};
use crate::utils::time::{from_db_timestamp, to_db_timestamp};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Handle to the detection database.
///
/// Cloning shares the underlying pool. Writes use one transaction per
/// detection; aggregate reads are single statements and therefore
/// atomic with respect to those writes.
#[derive(Debug, Clone)]
pub struct DetectionStore {
    pool: SqlitePool,
}

impl DetectionStore {
    /// Open (or create) the detection database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Short busy timeout: a contended write should fail into the retry
        // buffer instead of stalling the analyzer task.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(1));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for sessions that attach reference databases.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a detection and its optional audio file atomically.
    ///
    /// The audio row is inserted first so the detection's foreign key is
    /// satisfied; both become visible at commit, never separately.
    pub async fn insert_detection(
        &self,
        detection: &Detection,
        audio: Option<&AudioFile>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(audio) = audio {
            sqlx::query(
                "INSERT INTO audio_files (id, file_path, duration, size_bytes, recording_start)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(audio.id.to_string())
            .bind(&audio.file_path)
            .bind(audio.duration)
            .bind(audio.size_bytes)
            .bind(to_db_timestamp(audio.recording_start))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO detections (
                id, species_tensor, scientific_name, common_name, confidence,
                timestamp, audio_file_id, latitude, longitude,
                species_confidence_threshold, week, sensitivity_setting,
                overlap, hour_epoch
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(detection.id.to_string())
        .bind(&detection.species_tensor)
        .bind(&detection.scientific_name)
        .bind(&detection.common_name)
        .bind(detection.confidence)
        .bind(to_db_timestamp(detection.timestamp))
        .bind(detection.audio_file_id.map(|id| id.to_string()))
        .bind(detection.latitude)
        .bind(detection.longitude)
        .bind(detection.species_confidence_threshold)
        .bind(detection.week)
        .bind(detection.sensitivity_setting)
        .bind(detection.overlap)
        .bind(detection.hour_epoch)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Fetch one detection by id.
    pub async fn get_detection(&self, id: Uuid) -> Result<Option<Detection>> {
        let row = sqlx::query("SELECT * FROM detections WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(detection_from_row).transpose()
    }

    /// Correct the coordinates of a persisted detection.
    ///
    /// The only permitted mutation; returns false if the id is unknown.
    pub async fn update_location(
        &self,
        id: Uuid,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE detections SET latitude = ?, longitude = ? WHERE id = ?")
            .bind(latitude)
            .bind(longitude)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a detection (and its audio row) on explicit operator request.
    pub async fn delete_detection(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let audio_file_id: Option<String> =
            sqlx::query_scalar("SELECT audio_file_id FROM detections WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .flatten();

        let result = sqlx::query("DELETE FROM detections WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if let Some(audio_id) = audio_file_id {
            sqlx::query("DELETE FROM audio_files WHERE id = ?")
                .bind(audio_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count detections in an inclusive time range.
    pub async fn detection_count(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM detections WHERE timestamp >= ? AND timestamp <= ?",
        )
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Count unique species in an inclusive time range.
    pub async fn unique_species_count(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT scientific_name) FROM detections
             WHERE timestamp >= ? AND timestamp <= ?",
        )
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Per-species counts in a time range, ordered by count descending then
    /// scientific name.
    pub async fn species_counts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SpeciesCount>> {
        let rows = sqlx::query(
            "SELECT scientific_name, common_name, COUNT(*) as count
             FROM detections
             WHERE timestamp >= ? AND timestamp <= ?
             GROUP BY scientific_name, common_name
             ORDER BY count DESC, scientific_name",
        )
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SpeciesCount {
                    scientific_name: row.try_get("scientific_name")?,
                    common_name: row.try_get("common_name")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Hourly detection counts for one calendar date (UTC).
    pub async fn hourly_counts(&self, date: NaiveDate) -> Result<Vec<HourlyCount>> {
        let start = format!("{date} 00:00:00");
        let end = format!("{date} 23:59:59");

        let rows = sqlx::query(
            "SELECT strftime('%H', timestamp) as hour, COUNT(*) as count
             FROM detections
             WHERE timestamp >= ? AND timestamp <= ?
             GROUP BY strftime('%H', timestamp)
             ORDER BY hour",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let hour: String = row.try_get("hour")?;
                let hour = hour.parse::<u32>().map_err(|_| Error::Internal {
                    message: format!("non-numeric hour bucket '{hour}'"),
                })?;
                Ok(HourlyCount {
                    hour,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Detection counts per calendar date, optionally for one species.
    pub async fn count_by_date(
        &self,
        species: Option<&str>,
    ) -> Result<BTreeMap<NaiveDate, i64>> {
        let rows = if let Some(species) = species {
            sqlx::query(
                "SELECT date(timestamp) as date, COUNT(*) as count
                 FROM detections
                 WHERE scientific_name = ?
                 GROUP BY date(timestamp)
                 ORDER BY date(timestamp)",
            )
            .bind(species)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT date(timestamp) as date, COUNT(*) as count
                 FROM detections
                 GROUP BY date(timestamp)
                 ORDER BY date(timestamp)",
            )
            .fetch_all(&self.pool)
            .await?
        };

        let mut counts = BTreeMap::new();
        for row in &rows {
            let date: String = row.try_get("date")?;
            let date = NaiveDate::from_str(&date).map_err(|_| Error::TimestampParse {
                value: date.clone(),
            })?;
            counts.insert(date, row.try_get("count")?);
        }
        Ok(counts)
    }

    /// Total clip bytes and duration.
    pub async fn storage_metrics(&self) -> Result<StorageMetrics> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(size_bytes), 0) as total_bytes,
                    COALESCE(SUM(duration), 0.0) as total_duration
             FROM audio_files",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StorageMetrics {
            total_bytes: row.try_get("total_bytes")?,
            total_duration: row.try_get("total_duration")?,
        })
    }

    /// All detections in an inclusive time range, newest first.
    pub async fn detections_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Detection>> {
        let rows = sqlx::query(
            "SELECT * FROM detections
             WHERE timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp DESC",
        )
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(detection_from_row).collect()
    }

    /// Species first seen inside the range (no detections before `start`),
    /// with their in-range counts, highest first.
    pub async fn new_species(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SpeciesCount>> {
        let rows = sqlx::query(
            "SELECT scientific_name,
                    COALESCE(common_name, scientific_name) as common_name,
                    COUNT(*) as count
             FROM detections
             WHERE timestamp >= ? AND timestamp <= ?
               AND scientific_name NOT IN (
                   SELECT DISTINCT scientific_name FROM detections WHERE timestamp < ?
               )
             GROUP BY scientific_name
             ORDER BY count DESC",
        )
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .bind(to_db_timestamp(start))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SpeciesCount {
                    scientific_name: row.try_get("scientific_name")?,
                    common_name: row.try_get("common_name")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Top 10 species of the current period with their prior-period counts.
    pub async fn top_species_with_prior(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        prior_start: DateTime<Utc>,
        prior_end: DateTime<Utc>,
    ) -> Result<Vec<TopSpeciesRow>> {
        let rows = sqlx::query(
            "WITH current_period AS (
                SELECT scientific_name,
                       COALESCE(common_name, scientific_name) as common_name,
                       COUNT(*) as current_count
                FROM detections
                WHERE timestamp >= ? AND timestamp <= ?
                GROUP BY scientific_name
             ),
             prior_period AS (
                SELECT scientific_name, COUNT(*) as prior_count
                FROM detections
                WHERE timestamp >= ? AND timestamp <= ?
                GROUP BY scientific_name
             )
             SELECT c.scientific_name, c.common_name, c.current_count,
                    COALESCE(p.prior_count, 0) as prior_count
             FROM current_period c
             LEFT JOIN prior_period p ON c.scientific_name = p.scientific_name
             ORDER BY c.current_count DESC
             LIMIT 10",
        )
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .bind(to_db_timestamp(prior_start))
        .bind(to_db_timestamp(prior_end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TopSpeciesRow {
                    scientific_name: row.try_get("scientific_name")?,
                    common_name: row.try_get("common_name")?,
                    current_count: row.try_get("current_count")?,
                    prior_count: row.try_get("prior_count")?,
                })
            })
            .collect()
    }

    /// Insert or replace the weather observation for an hour.
    pub async fn upsert_weather(&self, weather: &Weather) -> Result<()> {
        sqlx::query(
            "INSERT INTO weather (hour_epoch, temperature, humidity, pressure, wind_speed, precipitation)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(hour_epoch) DO UPDATE SET
                temperature = excluded.temperature,
                humidity = excluded.humidity,
                pressure = excluded.pressure,
                wind_speed = excluded.wind_speed,
                precipitation = excluded.precipitation",
        )
        .bind(weather.hour_epoch)
        .bind(weather.temperature)
        .bind(weather.humidity)
        .bind(weather.pressure)
        .bind(weather.wind_speed)
        .bind(weather.precipitation)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Map a `detections` row to the model struct.
pub(crate) fn detection_from_row(row: &SqliteRow) -> Result<Detection> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id).map_err(|_| Error::Internal {
        message: format!("malformed detection id '{id}'"),
    })?;

    let audio_file_id: Option<String> = row.try_get("audio_file_id")?;
    let audio_file_id = audio_file_id
        .map(|raw| {
            Uuid::parse_str(&raw).map_err(|_| Error::Internal {
                message: format!("malformed audio file id '{raw}'"),
            })
        })
        .transpose()?;

    let timestamp: String = row.try_get("timestamp")?;

    Ok(Detection {
        id,
        species_tensor: row.try_get("species_tensor")?,
        scientific_name: row.try_get("scientific_name")?,
        common_name: row.try_get("common_name")?,
        confidence: row.try_get("confidence")?,
        timestamp: from_db_timestamp(&timestamp)?,
        audio_file_id,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        species_confidence_threshold: row.try_get("species_confidence_threshold")?,
        week: row.try_get("week")?,
        sensitivity_setting: row.try_get("sensitivity_setting")?,
        overlap: row.try_get("overlap")?,
        hour_epoch: row.try_get("hour_epoch")?,
    })
}
