//! Enriched query engine.
//!
//! Joins detections with species taxonomy and multilingual common names
//! across the attached reference databases, computes first-ever /
//! first-in-period flags with window functions, and feeds the analytics
//! layer with raw aggregates. Every session attaches the reference
//! databases on entry and detaches on all exits.

use crate::db::{
    AttachManager, AttachedSet, DetectionStore, detection_from_row,
};
use crate::error::Result;
use crate::query::envelope::{
    EnrichedDetection, FamilySummaryRow, PeriodSpeciesCounts, ScopeFlags, SpeciesSummaryRow,
    WeatherSeries, WindowSpecies,
};
use crate::query::filters::{
    BestRecordingsQuery, DetectionQuery, OrderBy, TemporalResolution,
};
use crate::utils::time::{from_db_timestamp, to_db_timestamp};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// Reference capabilities of one attached session.
#[derive(Debug, Clone, Copy)]
struct Caps {
    ioc: bool,
    patlevin: bool,
    avibase: bool,
}

impl Caps {
    fn from_attached(attached: &AttachedSet) -> Self {
        Self {
            ioc: attached.has("ioc"),
            patlevin: attached.has("patlevin"),
            avibase: attached.has("avibase"),
        }
    }
}

/// Cross-database detection query engine.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    pool: SqlitePool,
    attach: AttachManager,
    language: String,
}

impl QueryEngine {
    /// Build an engine over the detection store's pool.
    pub fn new(store: &DetectionStore, attach: AttachManager, language: impl Into<String>) -> Self {
        Self {
            pool: store.pool().clone(),
            attach,
            language: language.into(),
        }
    }

    /// Main detection query with enrichment and optional first-detection flags.
    pub async fn query_detections(
        &self,
        query: &DetectionQuery,
    ) -> Result<Vec<EnrichedDetection>> {
        let mut conn = self.pool.acquire().await?;
        let attached = self.attach.attach_all(&mut conn).await?;
        let result = self.run_query_detections(&mut conn, &attached, query).await;
        self.attach.detach_all(&mut conn, &attached).await;
        result
    }

    /// Fetch one enriched detection by id.
    pub async fn get_detection(&self, id: Uuid) -> Result<Option<EnrichedDetection>> {
        let mut conn = self.pool.acquire().await?;
        let attached = self.attach.attach_all(&mut conn).await?;
        let result = self.run_get_detection(&mut conn, &attached, id).await;
        self.attach.detach_all(&mut conn, &attached).await;
        result
    }

    /// Per-species aggregate summary, ordered by detection count.
    pub async fn species_summary(
        &self,
        since: Option<DateTime<Utc>>,
        family: Option<&str>,
        include_first_detections: bool,
    ) -> Result<Vec<SpeciesSummaryRow>> {
        let mut conn = self.pool.acquire().await?;
        let attached = self.attach.attach_all(&mut conn).await?;
        let result = self
            .run_species_summary(&mut conn, &attached, since, family, include_first_detections)
            .await;
        self.attach.detach_all(&mut conn, &attached).await;
        result
    }

    /// Per-family aggregate summary, ordered by detection count.
    ///
    /// Requires the IOC reference database; without it there is no family
    /// information and the summary is empty.
    pub async fn family_summary(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FamilySummaryRow>> {
        let mut conn = self.pool.acquire().await?;
        let attached = self.attach.attach_all(&mut conn).await?;
        let result = self.run_family_summary(&mut conn, &attached, since).await;
        self.attach.detach_all(&mut conn, &attached).await;
        result
    }

    /// Best recordings per species with pagination; returns rows plus the
    /// total matching count.
    pub async fn best_recordings(
        &self,
        query: &BestRecordingsQuery,
    ) -> Result<(Vec<EnrichedDetection>, i64)> {
        let mut conn = self.pool.acquire().await?;
        let attached = self.attach.attach_all(&mut conn).await?;
        let result = self.run_best_recordings(&mut conn, &attached, query).await;
        self.attach.detach_all(&mut conn, &attached).await;
        result
    }

    /// First-detection flags for one persisted detection, used by
    /// notification scopes. Window starts are supplied by the caller in
    /// the station's timezone, converted to UTC.
    pub async fn scope_flags(
        &self,
        scientific_name: &str,
        timestamp: DateTime<Utc>,
        day_start: DateTime<Utc>,
        week_start: DateTime<Utc>,
    ) -> Result<ScopeFlags> {
        let ts = to_db_timestamp(timestamp);

        let first_ever: Option<String> =
            sqlx::query_scalar("SELECT MIN(timestamp) FROM detections WHERE scientific_name = ?")
                .bind(scientific_name)
                .fetch_one(&self.pool)
                .await?;
        let first_today: Option<String> = sqlx::query_scalar(
            "SELECT MIN(timestamp) FROM detections
             WHERE scientific_name = ? AND timestamp >= ?",
        )
        .bind(scientific_name)
        .bind(to_db_timestamp(day_start))
        .fetch_one(&self.pool)
        .await?;
        let first_week: Option<String> = sqlx::query_scalar(
            "SELECT MIN(timestamp) FROM detections
             WHERE scientific_name = ? AND timestamp >= ?",
        )
        .bind(scientific_name)
        .bind(to_db_timestamp(week_start))
        .fetch_one(&self.pool)
        .await?;

        Ok(ScopeFlags {
            first_ever: first_ever.as_deref() == Some(ts.as_str()),
            first_today: first_today.as_deref() == Some(ts.as_str()),
            first_this_week: first_week.as_deref() == Some(ts.as_str()),
        })
    }

    /// Species counts grouped into time buckets, for diversity timelines.
    pub async fn species_counts_by_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: TemporalResolution,
    ) -> Result<Vec<PeriodSpeciesCounts>> {
        let bucket = match resolution {
            TemporalResolution::Hourly => "strftime('%Y-%m-%d %H:00:00', timestamp)",
            TemporalResolution::Daily => "date(timestamp)",
            TemporalResolution::Weekly => "date(timestamp, 'weekday 0', '-6 days')",
        };

        let rows = sqlx::query(&format!(
            "SELECT {bucket} as period, scientific_name, COUNT(*) as count
             FROM detections
             WHERE timestamp >= ? AND timestamp <= ?
             GROUP BY period, scientific_name
             ORDER BY period"
        ))
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .fetch_all(&self.pool)
        .await?;

        let mut periods: Vec<PeriodSpeciesCounts> = Vec::new();
        for row in &rows {
            let period: String = row.try_get("period")?;
            let species: String = row.try_get("scientific_name")?;
            let count: i64 = row.try_get("count")?;
            match periods.last_mut() {
                Some(last) if last.period == period => {
                    last.counts.insert(species, count);
                }
                _ => {
                    periods.push(PeriodSpeciesCounts {
                        period,
                        counts: HashMap::from([(species, count)]),
                    });
                }
            }
        }
        Ok(periods)
    }

    /// `(timestamp, scientific_name)` pairs in chronological order, for
    /// accumulation curves.
    pub async fn detections_for_accumulation(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, String)>> {
        let rows = sqlx::query(
            "SELECT timestamp, scientific_name FROM detections
             WHERE timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp",
        )
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("timestamp")?;
                Ok((from_db_timestamp(&raw)?, row.try_get("scientific_name")?))
            })
            .collect()
    }

    /// Species counts for each of the given periods, for similarity matrices.
    pub async fn species_counts_for_periods(
        &self,
        periods: &[(DateTime<Utc>, DateTime<Utc>)],
    ) -> Result<Vec<HashMap<String, i64>>> {
        let mut result = Vec::with_capacity(periods.len());
        for &(start, end) in periods {
            let rows = sqlx::query(
                "SELECT scientific_name, COUNT(*) as count FROM detections
                 WHERE timestamp >= ? AND timestamp <= ?
                 GROUP BY scientific_name",
            )
            .bind(to_db_timestamp(start))
            .bind(to_db_timestamp(end))
            .fetch_all(&self.pool)
            .await?;

            let mut counts = HashMap::with_capacity(rows.len());
            for row in &rows {
                counts.insert(row.try_get("scientific_name")?, row.try_get("count")?);
            }
            result.push(counts);
        }
        Ok(result)
    }

    /// Distinct species per sliding window, for beta diversity.
    pub async fn species_sets_by_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window_size: Duration,
    ) -> Result<Vec<WindowSpecies>> {
        let mut windows = Vec::new();
        let mut current = start;

        while current + window_size <= end {
            let window_end = current + window_size;
            let rows = sqlx::query(
                "SELECT DISTINCT scientific_name FROM detections
                 WHERE timestamp >= ? AND timestamp < ?",
            )
            .bind(to_db_timestamp(current))
            .bind(to_db_timestamp(window_end))
            .fetch_all(&self.pool)
            .await?;

            let mut species = HashSet::with_capacity(rows.len());
            for row in &rows {
                species.insert(row.try_get::<String, _>("scientific_name")?);
            }
            windows.push(WindowSpecies {
                period_start: current,
                period_end: window_end,
                species,
            });
            current = window_end;
        }
        Ok(windows)
    }

    /// Hourly detection counts joined with weather, for correlation.
    pub async fn weather_correlation_series(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WeatherSeries> {
        let rows = sqlx::query(
            "SELECT d.hour_epoch,
                    COUNT(*) as detection_count,
                    COUNT(DISTINCT d.scientific_name) as species_count,
                    AVG(w.temperature) as temperature,
                    AVG(w.humidity) as humidity,
                    AVG(w.pressure) as pressure,
                    AVG(w.wind_speed) as wind_speed,
                    AVG(w.precipitation) as precipitation
             FROM detections d
             LEFT JOIN weather w ON d.hour_epoch = w.hour_epoch
             WHERE d.timestamp >= ? AND d.timestamp <= ? AND d.hour_epoch IS NOT NULL
             GROUP BY d.hour_epoch
             ORDER BY d.hour_epoch",
        )
        .bind(to_db_timestamp(start))
        .bind(to_db_timestamp(end))
        .fetch_all(&self.pool)
        .await?;

        let mut series = WeatherSeries::default();
        for row in &rows {
            series.hours.push(row.try_get("hour_epoch")?);
            series.detection_counts.push(row.try_get("detection_count")?);
            series.species_counts.push(row.try_get("species_count")?);
            series.temperature.push(row.try_get("temperature")?);
            series.humidity.push(row.try_get("humidity")?);
            series.pressure.push(row.try_get("pressure")?);
            series.wind_speed.push(row.try_get("wind_speed")?);
            series.precipitation.push(row.try_get("precipitation")?);
        }
        Ok(series)
    }

    // ---- session bodies ------------------------------------------------

    async fn run_query_detections(
        &self,
        conn: &mut SqliteConnection,
        attached: &AttachedSet,
        query: &DetectionQuery,
    ) -> Result<Vec<EnrichedDetection>> {
        let caps = Caps::from_attached(attached);
        if !caps.ioc {
            debug!("IOC reference database not attached, taxonomy columns degrade to NULL");
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("");

        if query.include_first_detections {
            // Rank every detection globally BEFORE any non-time filter so a
            // confidence or taxonomy filter cannot promote a later
            // detection to first-ever.
            qb.push(
                "WITH all_detections_ranked AS (
                    SELECT id,
                           ROW_NUMBER() OVER (
                               PARTITION BY scientific_name ORDER BY timestamp
                           ) as overall_rank,
                           MIN(timestamp) OVER (
                               PARTITION BY scientific_name
                           ) as first_ever_detection
                    FROM detections
                 ),
                 filtered_detections AS (
                    SELECT d.*, ",
            );
            self.push_enrichment_select(&mut qb, caps);
            qb.push(", adr.overall_rank, adr.first_ever_detection FROM detections d
                     JOIN all_detections_ranked adr ON d.id = adr.id");
            self.push_enrichment_joins(&mut qb, caps);
            qb.push(" WHERE 1=1");
            push_filters(&mut qb, query, caps.ioc);
            // The period minimum deliberately re-applies only the time
            // filters, not confidence or taxonomy.
            qb.push(
                "),
                 period_first AS (
                    SELECT scientific_name, MIN(timestamp) as first_period_detection
                    FROM detections WHERE 1=1",
            );
            if let Some(start) = query.start_date {
                qb.push(" AND timestamp >= ").push_bind(to_db_timestamp(start));
            }
            if let Some(end) = query.end_date {
                qb.push(" AND timestamp <= ").push_bind(to_db_timestamp(end));
            }
            qb.push(
                " GROUP BY scientific_name
                 )
                 SELECT fd.*,
                        CASE WHEN fd.overall_rank = 1 THEN 1 ELSE 0 END as is_first_ever,
                        CASE WHEN fd.timestamp = pf.first_period_detection THEN 1 ELSE 0 END
                            as is_first_in_period,
                        pf.first_period_detection
                 FROM filtered_detections fd
                 LEFT JOIN period_first pf ON fd.scientific_name = pf.scientific_name",
            );
            qb.push(order_clause(query.order_by, query.order_desc, caps.ioc));
        } else {
            qb.push("SELECT d.*, ");
            self.push_enrichment_select(&mut qb, caps);
            qb.push(" FROM detections d");
            self.push_enrichment_joins(&mut qb, caps);
            qb.push(" WHERE 1=1");
            push_filters(&mut qb, query, caps.ioc);
            qb.push(order_clause(query.order_by, query.order_desc, caps.ioc));
        }

        push_pagination(&mut qb, query.limit, query.offset);

        let rows = qb.build().fetch_all(&mut *conn).await?;
        rows.iter()
            .map(|row| enriched_from_row(row, query.include_first_detections))
            .collect()
    }

    async fn run_get_detection(
        &self,
        conn: &mut SqliteConnection,
        attached: &AttachedSet,
        id: Uuid,
    ) -> Result<Option<EnrichedDetection>> {
        let caps = Caps::from_attached(attached);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT d.*, ");
        self.push_enrichment_select(&mut qb, caps);
        qb.push(" FROM detections d");
        self.push_enrichment_joins(&mut qb, caps);
        qb.push(" WHERE d.id = ").push_bind(id.to_string());

        let row = qb.build().fetch_optional(&mut *conn).await?;
        row.as_ref().map(|row| enriched_from_row(row, false)).transpose()
    }

    async fn run_species_summary(
        &self,
        conn: &mut SqliteConnection,
        attached: &AttachedSet,
        since: Option<DateTime<Utc>>,
        family: Option<&str>,
        include_first_detections: bool,
    ) -> Result<Vec<SpeciesSummaryRow>> {
        let caps = Caps::from_attached(attached);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT d.scientific_name,
                    COUNT(*) as detection_count,
                    AVG(d.confidence) as avg_confidence,
                    MAX(d.timestamp) as latest_detection, ",
        );

        if include_first_detections {
            qb.push("MIN(d.timestamp) as first_ever_detection, ");
            if let Some(since) = since {
                qb.push("MIN(CASE WHEN d.timestamp >= ")
                    .push_bind(to_db_timestamp(since))
                    .push(" THEN d.timestamp END) as first_period_detection, ");
            } else {
                qb.push("NULL as first_period_detection, ");
            }
        }

        qb.push(format!(
            "MAX({}) as ioc_english_name, MAX({}) as translated_name, ",
            ioc_english_name_expr(caps),
            translated_name_expr(caps)
        ));
        if caps.ioc {
            qb.push(
                "MAX(s.family) as family, MAX(s.genus) as genus, MAX(s.order_name) as order_name",
            );
        } else {
            qb.push("NULL as family, NULL as genus, NULL as order_name");
        }

        qb.push(" FROM detections d");
        self.push_enrichment_joins(&mut qb, caps);
        qb.push(" WHERE 1=1");
        if let Some(since) = since {
            qb.push(" AND d.timestamp >= ").push_bind(to_db_timestamp(since));
        }
        if let Some(family) = family {
            if caps.ioc {
                qb.push(" AND s.family = ").push_bind(family.to_string());
            } else {
                qb.push(" AND 0");
            }
        }
        qb.push(" GROUP BY d.scientific_name ORDER BY detection_count DESC");

        let rows = qb.build().fetch_all(&mut *conn).await?;
        rows.iter()
            .map(|row| {
                let translated_name: Option<String> = row.try_get("translated_name")?;
                let ioc_english_name: Option<String> = row.try_get("ioc_english_name")?;
                let avg_confidence: f64 = row.try_get("avg_confidence")?;
                Ok(SpeciesSummaryRow {
                    scientific_name: row.try_get("scientific_name")?,
                    detection_count: row.try_get("detection_count")?,
                    avg_confidence: round3(avg_confidence),
                    latest_detection: optional_db_timestamp(row, "latest_detection")?,
                    best_common_name: translated_name.clone().or_else(|| ioc_english_name.clone()),
                    ioc_english_name,
                    translated_name,
                    family: row.try_get("family")?,
                    genus: row.try_get("genus")?,
                    order_name: row.try_get("order_name")?,
                    first_ever_detection: if include_first_detections {
                        optional_db_timestamp(row, "first_ever_detection")?
                    } else {
                        None
                    },
                    first_period_detection: if include_first_detections {
                        optional_db_timestamp(row, "first_period_detection")?
                    } else {
                        None
                    },
                })
            })
            .collect()
    }

    async fn run_family_summary(
        &self,
        conn: &mut SqliteConnection,
        attached: &AttachedSet,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FamilySummaryRow>> {
        if !attached.has("ioc") {
            debug!("family summary requires the IOC reference database");
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT s.family, s.order_name,
                    COUNT(*) as detection_count,
                    COUNT(DISTINCT d.scientific_name) as species_count,
                    AVG(d.confidence) as avg_confidence,
                    MAX(d.timestamp) as latest_detection
             FROM detections d
             LEFT JOIN ioc.species s ON d.scientific_name = s.scientific_name
             WHERE s.family IS NOT NULL",
        );
        if let Some(since) = since {
            qb.push(" AND d.timestamp >= ").push_bind(to_db_timestamp(since));
        }
        qb.push(" GROUP BY s.family, s.order_name ORDER BY detection_count DESC");

        let rows = qb.build().fetch_all(&mut *conn).await?;
        rows.iter()
            .map(|row| {
                let avg_confidence: f64 = row.try_get("avg_confidence")?;
                Ok(FamilySummaryRow {
                    family: row.try_get("family")?,
                    order_name: row.try_get("order_name")?,
                    detection_count: row.try_get("detection_count")?,
                    species_count: row.try_get("species_count")?,
                    avg_confidence: round3(avg_confidence),
                    latest_detection: optional_db_timestamp(row, "latest_detection")?,
                })
            })
            .collect()
    }

    async fn run_best_recordings(
        &self,
        conn: &mut SqliteConnection,
        attached: &AttachedSet,
        query: &BestRecordingsQuery,
    ) -> Result<(Vec<EnrichedDetection>, i64)> {
        let caps = Caps::from_attached(attached);
        if query.family.is_some() && !caps.ioc {
            return Ok((Vec::new(), 0));
        }

        // A specific-species request means "all recordings of that species";
        // the per-species limit only applies to the cross-species view.
        let per_species_limit = if query.species.is_some() {
            None
        } else {
            query.per_species_limit
        };

        let total = {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("");
            if let Some(limit) = per_species_limit {
                qb.push(
                    "WITH ranked_detections AS (
                        SELECT d.scientific_name,
                               ROW_NUMBER() OVER (
                                   PARTITION BY d.scientific_name
                                   ORDER BY d.confidence DESC, d.timestamp DESC
                               ) as rank_within_species
                        FROM detections d",
                );
                push_best_recordings_joins(&mut qb, query, caps);
                qb.push(" WHERE 1=1");
                push_best_recordings_filters(&mut qb, query);
                qb.push(") SELECT COUNT(*) FROM ranked_detections WHERE rank_within_species <= ")
                    .push_bind(limit);
            } else {
                qb.push("SELECT COUNT(*) FROM detections d");
                push_best_recordings_joins(&mut qb, query, caps);
                qb.push(" WHERE 1=1");
                push_best_recordings_filters(&mut qb, query);
            }
            let row = qb.build().fetch_one(&mut *conn).await?;
            row.try_get::<i64, _>(0)?
        };

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("");
        if let Some(limit) = per_species_limit {
            qb.push(
                "WITH ranked_detections AS (
                    SELECT d.*,
                           ROW_NUMBER() OVER (
                               PARTITION BY d.scientific_name
                               ORDER BY d.confidence DESC, d.timestamp DESC
                           ) as rank_within_species
                    FROM detections d",
            );
            push_best_recordings_joins(&mut qb, query, caps);
            qb.push(" WHERE 1=1");
            push_best_recordings_filters(&mut qb, query);
            qb.push(") SELECT d.*, ");
            self.push_enrichment_select(&mut qb, caps);
            qb.push(" FROM ranked_detections d");
            self.push_enrichment_joins(&mut qb, caps);
            qb.push(" WHERE d.rank_within_species <= ").push_bind(limit);
        } else {
            qb.push("SELECT d.*, ");
            self.push_enrichment_select(&mut qb, caps);
            qb.push(" FROM detections d");
            self.push_enrichment_joins(&mut qb, caps);
            qb.push(" WHERE 1=1");
            push_best_recordings_filters(&mut qb, query);
        }
        qb.push(" ORDER BY d.confidence DESC, d.timestamp DESC");
        qb.push(" LIMIT ")
            .push_bind(i64::from(query.per_page_clamped()));
        qb.push(" OFFSET ").push_bind(query.offset());

        let rows = qb.build().fetch_all(&mut *conn).await?;
        let detections = rows
            .iter()
            .map(|row| enriched_from_row(row, false))
            .collect::<Result<Vec<_>>>()?;

        Ok((detections, total))
    }

    // ---- SQL fragments -------------------------------------------------

    /// Push the enrichment select columns (no binds).
    fn push_enrichment_select(&self, qb: &mut QueryBuilder<Sqlite>, caps: Caps) {
        qb.push(format!(
            "{} as ioc_english_name, {} as translated_name, ",
            ioc_english_name_expr(caps),
            translated_name_expr(caps)
        ));
        if caps.ioc {
            qb.push("s.family, s.genus, s.order_name");
        } else {
            qb.push("NULL as family, NULL as genus, NULL as order_name");
        }
    }

    /// Push the reference joins for every attached source, binding the
    /// configured language per translation table.
    fn push_enrichment_joins(&self, qb: &mut QueryBuilder<Sqlite>, caps: Caps) {
        if caps.ioc {
            qb.push(" LEFT JOIN ioc.species s ON d.scientific_name = s.scientific_name");
            qb.push(" LEFT JOIN ioc.translations t ON s.avibase_id = t.avibase_id AND t.language_code = ")
                .push_bind(self.language.clone());
        }
        if caps.patlevin {
            qb.push(
                " LEFT JOIN patlevin.patlevin_names p ON p.scientific_name = d.scientific_name AND p.language_code = ",
            )
            .push_bind(self.language.clone());
        }
        if caps.avibase {
            qb.push(
                " LEFT JOIN avibase.avibase_names a ON a.scientific_name = d.scientific_name AND a.language_code = ",
            )
            .push_bind(self.language.clone());
        }
    }
}

/// English-name expression with fallback to the detection's common name.
fn ioc_english_name_expr(caps: Caps) -> &'static str {
    if caps.ioc {
        "COALESCE(s.english_name, d.common_name)"
    } else {
        "d.common_name"
    }
}

/// Translation priority: IOC > PatLevin > Avibase > IOC english > detection.
fn translated_name_expr(caps: Caps) -> String {
    let mut sources = Vec::new();
    if caps.ioc {
        sources.push("t.common_name");
    }
    if caps.patlevin {
        sources.push("p.common_name");
    }
    if caps.avibase {
        sources.push("a.common_name");
    }
    if caps.ioc {
        sources.push("s.english_name");
    }
    sources.push("d.common_name");
    if sources.len() == 1 {
        sources[0].to_string()
    } else {
        format!("COALESCE({})", sources.join(", "))
    }
}

/// Push the AND-combined detection filters.
fn push_filters(qb: &mut QueryBuilder<Sqlite>, query: &DetectionQuery, has_ioc: bool) {
    if let Some(start) = query.start_date {
        qb.push(" AND d.timestamp >= ").push_bind(to_db_timestamp(start));
    }
    if let Some(end) = query.end_date {
        qb.push(" AND d.timestamp <= ").push_bind(to_db_timestamp(end));
    }

    match query.species.as_slice() {
        [] => {}
        [species] => {
            qb.push(" AND d.scientific_name = ").push_bind(species.clone());
        }
        species => {
            qb.push(" AND d.scientific_name IN (");
            let mut separated = qb.separated(", ");
            for name in species {
                separated.push_bind(name.clone());
            }
            qb.push(")");
        }
    }

    if let Some(family) = &query.family {
        if has_ioc {
            qb.push(" AND s.family = ").push_bind(family.clone());
        } else {
            // No taxonomy attached: an explicit family filter matches nothing.
            qb.push(" AND 0");
        }
    }
    if let Some(genus) = &query.genus {
        if has_ioc {
            qb.push(" AND s.genus = ").push_bind(genus.clone());
        } else {
            qb.push(" AND 0");
        }
    }

    if let Some(min) = query.min_confidence {
        qb.push(" AND d.confidence >= ").push_bind(min);
    }
    if let Some(max) = query.max_confidence {
        qb.push(" AND d.confidence <= ").push_bind(max);
    }
}

/// ORDER BY clause over the output column names, which are identical in
/// the plain and CTE variants.
fn order_clause(order_by: OrderBy, desc: bool, has_ioc: bool) -> String {
    let column = match order_by {
        OrderBy::Timestamp => "timestamp",
        OrderBy::Confidence => "confidence",
        OrderBy::ScientificName => "scientific_name",
        OrderBy::Family if has_ioc => "family",
        OrderBy::Family => "scientific_name",
    };
    let direction = if desc { "DESC" } else { "ASC" };
    format!(" ORDER BY {column} {direction}")
}

/// LIMIT/OFFSET; SQLite requires a LIMIT before OFFSET, so an
/// offset-without-limit query gets `LIMIT -1`.
fn push_pagination(qb: &mut QueryBuilder<Sqlite>, limit: Option<i64>, offset: i64) {
    match (limit, offset) {
        (Some(limit), 0) => {
            qb.push(" LIMIT ").push_bind(limit);
        }
        (Some(limit), offset) => {
            qb.push(" LIMIT ").push_bind(limit);
            qb.push(" OFFSET ").push_bind(offset);
        }
        (None, offset) if offset > 0 => {
            qb.push(" LIMIT -1 OFFSET ").push_bind(offset);
        }
        (None, _) => {}
    }
}

/// Joins needed by the best-recordings filters (family requires IOC).
fn push_best_recordings_joins(
    qb: &mut QueryBuilder<Sqlite>,
    query: &BestRecordingsQuery,
    caps: Caps,
) {
    if query.family.is_some() && caps.ioc {
        qb.push(" LEFT JOIN ioc.species s ON d.scientific_name = s.scientific_name");
    }
}

/// Best-recordings filter conditions: confidence floor plus one of
/// species / genus-prefix / family.
fn push_best_recordings_filters(qb: &mut QueryBuilder<Sqlite>, query: &BestRecordingsQuery) {
    qb.push(" AND d.confidence >= ").push_bind(query.min_confidence);
    if let Some(species) = &query.species {
        qb.push(" AND d.scientific_name = ").push_bind(species.clone());
    } else if let Some(genus) = &query.genus {
        qb.push(" AND d.scientific_name LIKE ")
            .push_bind(format!("{genus} %"));
    } else if let Some(family) = &query.family {
        qb.push(" AND s.family = ").push_bind(family.clone());
    }
}

/// Round to 3 decimals, matching the summary contract.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Optional TEXT timestamp column.
fn optional_db_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.as_deref().map(from_db_timestamp).transpose()
}

/// Map an enriched row (detection columns + enrichment columns, plus the
/// first-detection columns when requested) to the envelope.
pub(crate) fn enriched_from_row(row: &SqliteRow, with_first: bool) -> Result<EnrichedDetection> {
    let detection = detection_from_row(row)?;

    let (is_first_ever, is_first_in_period, first_ever_detection, first_period_detection) =
        if with_first {
            let ever: i64 = row.try_get("is_first_ever")?;
            let period: i64 = row.try_get("is_first_in_period")?;
            (
                Some(ever == 1),
                Some(period == 1),
                optional_db_timestamp(row, "first_ever_detection")?,
                optional_db_timestamp(row, "first_period_detection")?,
            )
        } else {
            (None, None, None, None)
        };

    Ok(EnrichedDetection {
        detection,
        ioc_english_name: row.try_get("ioc_english_name")?,
        translated_name: row.try_get("translated_name")?,
        family: row.try_get("family")?,
        genus: row.try_get("genus")?,
        order_name: row.try_get("order_name")?,
        is_first_ever,
        is_first_in_period,
        first_ever_detection,
        first_period_detection,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::db::{AttachSource, Detection, DetectionStore, Weather};
    use crate::utils::time::{hour_epoch, iso_week};
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::path::Path;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn make_detection(
        scientific: &str,
        common: &str,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Detection {
        Detection {
            id: Uuid::new_v4(),
            species_tensor: format!("{scientific}_{common}"),
            scientific_name: scientific.to_string(),
            common_name: common.to_string(),
            confidence,
            timestamp,
            audio_file_id: None,
            latitude: None,
            longitude: None,
            species_confidence_threshold: 0.7,
            week: iso_week(timestamp),
            sensitivity_setting: 1.25,
            overlap: 0.0,
            hour_epoch: Some(hour_epoch(timestamp)),
        }
    }

    async fn exec_all(path: &Path, statements: &[&str]) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        for statement in statements {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        pool.close().await;
    }

    /// IOC reference fixture with the American Robin and Common Raven.
    async fn make_ioc_db(path: &Path) {
        exec_all(
            path,
            &[
                "CREATE TABLE species (
                    scientific_name TEXT PRIMARY KEY,
                    english_name TEXT,
                    order_name TEXT,
                    family TEXT,
                    genus TEXT,
                    species_epithet TEXT,
                    authority TEXT,
                    avibase_id TEXT
                )",
                "CREATE TABLE translations (
                    avibase_id TEXT,
                    language_code TEXT,
                    common_name TEXT
                )",
                "INSERT INTO species VALUES
                    ('Turdus migratorius', 'American Robin', 'Passeriformes',
                     'Turdidae', 'Turdus', 'migratorius', 'Linnaeus, 1766', 'AVB001'),
                    ('Corvus corax', 'Northern Raven', 'Passeriformes',
                     'Corvidae', 'Corvus', 'corax', 'Linnaeus, 1758', 'AVB002')",
                "INSERT INTO translations VALUES
                    ('AVB001', 'es', 'Petirrojo Americano'),
                    ('AVB002', 'fi', 'Korppi')",
            ],
        )
        .await;
    }

    async fn make_patlevin_db(path: &Path) {
        exec_all(
            path,
            &[
                "CREATE TABLE patlevin_names (
                    scientific_name TEXT,
                    language_code TEXT,
                    common_name TEXT
                )",
                "INSERT INTO patlevin_names VALUES
                    ('Corvus corax', 'es', 'Cuervo Grande')",
            ],
        )
        .await;
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: DetectionStore,
        engine: QueryEngine,
    }

    /// Store plus engine with IOC and PatLevin reference databases attached.
    async fn fixture(language: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = DetectionStore::open(&dir.path().join("detections.db"))
            .await
            .unwrap();
        make_ioc_db(&dir.path().join("ioc.db")).await;
        make_patlevin_db(&dir.path().join("patlevin.db")).await;
        let attach = AttachManager::new(vec![
            AttachSource {
                alias: "ioc",
                path: dir.path().join("ioc.db"),
            },
            AttachSource {
                alias: "patlevin",
                path: dir.path().join("patlevin.db"),
            },
            AttachSource {
                alias: "avibase",
                path: dir.path().join("avibase.db"),
            },
        ]);
        let engine = QueryEngine::new(&store, attach, language);
        Fixture {
            _dir: dir,
            store,
            engine,
        }
    }

    #[tokio::test]
    async fn test_enrichment_prefers_ioc_translation() {
        let fx = fixture("es").await;
        let d = make_detection("Turdus migratorius", "American Robin", 0.9, at(2025, 5, 1, 6, 0, 0));
        fx.store.insert_detection(&d, None).await.unwrap();

        let fetched = fx.engine.get_detection(d.id).await.unwrap().unwrap();
        assert_eq!(fetched.translated_name.as_deref(), Some("Petirrojo Americano"));
        assert_eq!(fetched.family.as_deref(), Some("Turdidae"));
        assert_eq!(fetched.genus.as_deref(), Some("Turdus"));
        assert_eq!(fetched.order_name.as_deref(), Some("Passeriformes"));
        assert_eq!(fetched.ioc_english_name.as_deref(), Some("American Robin"));
    }

    #[tokio::test]
    async fn test_enrichment_falls_back_to_patlevin() {
        let fx = fixture("es").await;
        // The raven has no Spanish IOC translation, but PatLevin has one.
        let d = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 5, 1, 6, 0, 0));
        fx.store.insert_detection(&d, None).await.unwrap();

        let fetched = fx.engine.get_detection(d.id).await.unwrap().unwrap();
        assert_eq!(fetched.translated_name.as_deref(), Some("Cuervo Grande"));
    }

    #[tokio::test]
    async fn test_enrichment_falls_back_to_english_then_detection() {
        let fx = fixture("de").await;
        let known = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 5, 1, 6, 0, 0));
        let unknown = make_detection("Ficedula parva", "Red-breasted Flycatcher", 0.8, at(2025, 5, 1, 7, 0, 0));
        fx.store.insert_detection(&known, None).await.unwrap();
        fx.store.insert_detection(&unknown, None).await.unwrap();

        // No German translation anywhere: IOC english name wins.
        let fetched = fx.engine.get_detection(known.id).await.unwrap().unwrap();
        assert_eq!(fetched.translated_name.as_deref(), Some("Northern Raven"));

        // Species missing from the reference entirely: detection's own name.
        let fetched = fx.engine.get_detection(unknown.id).await.unwrap().unwrap();
        assert_eq!(
            fetched.translated_name.as_deref(),
            Some("Red-breasted Flycatcher")
        );
        assert_eq!(fetched.family, None);
    }

    #[tokio::test]
    async fn test_query_without_reference_dbs_still_returns_detections() {
        let dir = tempfile::tempdir().unwrap();
        let store = DetectionStore::open(&dir.path().join("detections.db"))
            .await
            .unwrap();
        let attach = AttachManager::new(vec![AttachSource {
            alias: "ioc",
            path: dir.path().join("missing.db"),
        }]);
        let engine = QueryEngine::new(&store, attach, "en");

        let d = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 5, 1, 6, 0, 0));
        store.insert_detection(&d, None).await.unwrap();

        let results = engine
            .query_detections(&DetectionQuery::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].family, None);
        assert_eq!(results[0].translated_name.as_deref(), Some("Common Raven"));
    }

    #[tokio::test]
    async fn test_filters_and_ordering() {
        let fx = fixture("en").await;
        for (conf, hour) in [(0.95, 6), (0.75, 7), (0.85, 8)] {
            let d = make_detection("Corvus corax", "Common Raven", conf, at(2025, 5, 1, hour, 0, 0));
            fx.store.insert_detection(&d, None).await.unwrap();
        }
        let robin = make_detection("Turdus migratorius", "American Robin", 0.9, at(2025, 5, 1, 9, 0, 0));
        fx.store.insert_detection(&robin, None).await.unwrap();

        let results = fx
            .engine
            .query_detections(&DetectionQuery {
                species: vec!["Corvus corax".to_string()],
                min_confidence: Some(0.8),
                order_by: OrderBy::Confidence,
                order_desc: false,
                ..DetectionQuery::default()
            })
            .await
            .unwrap();
        let confidences: Vec<f64> = results.iter().map(|r| r.detection.confidence).collect();
        assert_eq!(confidences, vec![0.85, 0.95]);

        // Family filter via the IOC join.
        let results = fx
            .engine
            .query_detections(&DetectionQuery {
                family: Some("Turdidae".to_string()),
                ..DetectionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detection.scientific_name, "Turdus migratorius");
    }

    #[tokio::test]
    async fn test_pagination() {
        let fx = fixture("en").await;
        for minute in 0..5 {
            let d = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 5, 1, 6, minute, 0));
            fx.store.insert_detection(&d, None).await.unwrap();
        }

        let page = fx
            .engine
            .query_detections(&DetectionQuery {
                limit: Some(2),
                offset: 2,
                order_by: OrderBy::Timestamp,
                order_desc: false,
                ..DetectionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].detection.timestamp, at(2025, 5, 1, 6, 2, 0));
    }

    #[tokio::test]
    async fn test_first_ever_flag_is_stable_across_inserts() {
        let fx = fixture("en").await;
        let first = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 1, 2, 10, 0, 0));
        fx.store.insert_detection(&first, None).await.unwrap();

        let results = fx
            .engine
            .query_detections(&DetectionQuery {
                include_first_detections: true,
                ..DetectionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].is_first_ever, Some(true));

        let second = make_detection("Corvus corax", "Common Raven", 0.95, at(2025, 2, 2, 10, 0, 0));
        fx.store.insert_detection(&second, None).await.unwrap();

        let results = fx
            .engine
            .query_detections(&DetectionQuery {
                include_first_detections: true,
                order_by: OrderBy::Timestamp,
                order_desc: false,
                ..DetectionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].detection.id, first.id);
        assert_eq!(results[0].is_first_ever, Some(true));
        assert_eq!(results[1].is_first_ever, Some(false));
        assert_eq!(
            results[0].first_ever_detection,
            Some(at(2025, 1, 2, 10, 0, 0))
        );
    }

    #[tokio::test]
    async fn test_global_ranking_precedes_confidence_filter() {
        let fx = fixture("en").await;
        // The true first detection is below the confidence filter.
        let low = make_detection("Corvus corax", "Common Raven", 0.71, at(2025, 1, 1, 8, 0, 0));
        let high = make_detection("Corvus corax", "Common Raven", 0.95, at(2025, 1, 5, 8, 0, 0));
        fx.store.insert_detection(&low, None).await.unwrap();
        fx.store.insert_detection(&high, None).await.unwrap();

        let results = fx
            .engine
            .query_detections(&DetectionQuery {
                min_confidence: Some(0.9),
                include_first_detections: true,
                ..DetectionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        // The surviving row must NOT be promoted to first-ever.
        assert_eq!(results[0].is_first_ever, Some(false));
    }

    #[tokio::test]
    async fn test_first_in_period_uses_time_only_subquery() {
        let fx = fixture("en").await;
        // Inside the period, the earliest raven is low-confidence.
        let early_low = make_detection("Corvus corax", "Common Raven", 0.71, at(2025, 3, 1, 6, 0, 0));
        let later_high = make_detection("Corvus corax", "Common Raven", 0.95, at(2025, 3, 2, 6, 0, 0));
        fx.store.insert_detection(&early_low, None).await.unwrap();
        fx.store.insert_detection(&later_high, None).await.unwrap();

        let results = fx
            .engine
            .query_detections(&DetectionQuery {
                start_date: Some(at(2025, 3, 1, 0, 0, 0)),
                min_confidence: Some(0.9),
                include_first_detections: true,
                ..DetectionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        // The period minimum comes from a time-only subquery, so the
        // high-confidence row is not first-in-period either.
        assert_eq!(results[0].is_first_in_period, Some(false));
        assert_eq!(
            results[0].first_period_detection,
            Some(at(2025, 3, 1, 6, 0, 0))
        );
    }

    #[tokio::test]
    async fn test_species_summary_counts_and_rounding() {
        let fx = fixture("en").await;
        for conf in [0.8, 0.9] {
            let d = make_detection("Corvus corax", "Common Raven", conf, at(2025, 5, 1, 6, 0, 0));
            fx.store.insert_detection(&d, None).await.unwrap();
        }
        for minute in 0..3 {
            let d = make_detection(
                "Turdus migratorius",
                "American Robin",
                0.7777,
                at(2025, 5, 1, 7, minute, 0),
            );
            fx.store.insert_detection(&d, None).await.unwrap();
        }

        let summary = fx.engine.species_summary(None, None, false).await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].scientific_name, "Turdus migratorius");
        assert_eq!(summary[0].detection_count, 3);
        assert_eq!(summary[0].avg_confidence, 0.778);
        assert_eq!(summary[1].avg_confidence, 0.85);
        assert_eq!(summary[0].family.as_deref(), Some("Turdidae"));
        assert!(summary[0].first_ever_detection.is_none());
    }

    #[tokio::test]
    async fn test_species_summary_first_detection_columns() {
        let fx = fixture("en").await;
        let d1 = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 1, 2, 10, 0, 0));
        let d2 = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 4, 2, 10, 0, 0));
        fx.store.insert_detection(&d1, None).await.unwrap();
        fx.store.insert_detection(&d2, None).await.unwrap();

        let summary = fx
            .engine
            .species_summary(Some(at(2025, 3, 1, 0, 0, 0)), None, true)
            .await
            .unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].detection_count, 1);
        assert_eq!(
            summary[0].first_ever_detection,
            Some(at(2025, 1, 2, 10, 0, 0))
        );
        assert_eq!(
            summary[0].first_period_detection,
            Some(at(2025, 4, 2, 10, 0, 0))
        );
    }

    #[tokio::test]
    async fn test_family_summary() {
        let fx = fixture("en").await;
        for species in [
            ("Corvus corax", "Common Raven"),
            ("Turdus migratorius", "American Robin"),
        ] {
            let d = make_detection(species.0, species.1, 0.9, at(2025, 5, 1, 6, 0, 0));
            fx.store.insert_detection(&d, None).await.unwrap();
        }

        let summary = fx.engine.family_summary(None).await.unwrap();
        assert_eq!(summary.len(), 2);
        let families: HashSet<_> = summary.iter().filter_map(|r| r.family.clone()).collect();
        assert!(families.contains("Corvidae"));
        assert!(families.contains("Turdidae"));
    }

    #[tokio::test]
    async fn test_best_recordings_limit_and_prefix_property() {
        let fx = fixture("en").await;
        for (species, common) in [
            ("Corvus corax", "Common Raven"),
            ("Turdus migratorius", "American Robin"),
        ] {
            for i in 0..4 {
                let d = make_detection(
                    species,
                    common,
                    0.6 + f64::from(i) * 0.1,
                    at(2025, 5, 1, 6, u32::try_from(i).unwrap(), 0),
                );
                fx.store.insert_detection(&d, None).await.unwrap();
            }
        }

        let narrow = fx
            .engine
            .best_recordings(&BestRecordingsQuery {
                per_species_limit: Some(2),
                min_confidence: 0.5,
                ..BestRecordingsQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(narrow.1, 4); // 2 per species x 2 species
        assert_eq!(narrow.0.len(), 4);

        let wide = fx
            .engine
            .best_recordings(&BestRecordingsQuery {
                per_species_limit: Some(3),
                min_confidence: 0.5,
                ..BestRecordingsQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(wide.1, 6);

        // Per species, the narrow result is a prefix of the wide result in
        // ranking order.
        for species in ["Corvus corax", "Turdus migratorius"] {
            let narrow_ids: Vec<Uuid> = narrow
                .0
                .iter()
                .filter(|r| r.detection.scientific_name == species)
                .map(|r| r.detection.id)
                .collect();
            let wide_ids: Vec<Uuid> = wide
                .0
                .iter()
                .filter(|r| r.detection.scientific_name == species)
                .map(|r| r.detection.id)
                .collect();
            assert_eq!(&wide_ids[..narrow_ids.len()], narrow_ids.as_slice());
        }

        // Ranking is confidence-descending.
        let confidences: Vec<f64> = narrow.0.iter().map(|r| r.detection.confidence).collect();
        let mut sorted = confidences.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(confidences, sorted);
    }

    #[tokio::test]
    async fn test_best_recordings_species_filter_ignores_per_species_limit() {
        let fx = fixture("en").await;
        for i in 0..5 {
            let d = make_detection(
                "Corvus corax",
                "Common Raven",
                0.6 + f64::from(i) * 0.05,
                at(2025, 5, 1, 6, u32::try_from(i).unwrap(), 0),
            );
            fx.store.insert_detection(&d, None).await.unwrap();
        }

        let (rows, total) = fx
            .engine
            .best_recordings(&BestRecordingsQuery {
                per_species_limit: Some(2),
                min_confidence: 0.5,
                species: Some("Corvus corax".to_string()),
                ..BestRecordingsQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_scope_flags() {
        let fx = fixture("en").await;
        let yesterday = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 5, 1, 23, 0, 0));
        let today = make_detection("Corvus corax", "Common Raven", 0.9, at(2025, 5, 2, 6, 0, 0));
        fx.store.insert_detection(&yesterday, None).await.unwrap();
        fx.store.insert_detection(&today, None).await.unwrap();

        let flags = fx
            .engine
            .scope_flags(
                "Corvus corax",
                today.timestamp,
                at(2025, 5, 2, 0, 0, 0),
                at(2025, 4, 28, 0, 0, 0),
            )
            .await
            .unwrap();
        assert!(!flags.first_ever);
        assert!(flags.first_today);
        assert!(!flags.first_this_week);
    }

    #[tokio::test]
    async fn test_species_counts_by_period_daily() {
        let fx = fixture("en").await;
        for (day, species, common) in [
            (1, "Corvus corax", "Common Raven"),
            (1, "Corvus corax", "Common Raven"),
            (2, "Turdus migratorius", "American Robin"),
        ] {
            let d = make_detection(species, common, 0.9, at(2025, 5, day, 6, 0, 0));
            fx.store.insert_detection(&d, None).await.unwrap();
        }

        let periods = fx
            .engine
            .species_counts_by_period(
                at(2025, 5, 1, 0, 0, 0),
                at(2025, 5, 3, 0, 0, 0),
                TemporalResolution::Daily,
            )
            .await
            .unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].period, "2025-05-01");
        assert_eq!(periods[0].counts["Corvus corax"], 2);
        assert_eq!(periods[1].counts["Turdus migratorius"], 1);
    }

    #[tokio::test]
    async fn test_species_sets_by_window() {
        let fx = fixture("en").await;
        for (day, species, common) in [
            (1, "Corvus corax", "Common Raven"),
            (2, "Turdus migratorius", "American Robin"),
        ] {
            let d = make_detection(species, common, 0.9, at(2025, 5, day, 6, 0, 0));
            fx.store.insert_detection(&d, None).await.unwrap();
        }

        let windows = fx
            .engine
            .species_sets_by_window(
                at(2025, 5, 1, 0, 0, 0),
                at(2025, 5, 3, 0, 0, 0),
                Duration::days(1),
            )
            .await
            .unwrap();
        assert_eq!(windows.len(), 2);
        assert!(windows[0].species.contains("Corvus corax"));
        assert!(windows[1].species.contains("Turdus migratorius"));
    }

    #[tokio::test]
    async fn test_weather_correlation_series_joins_on_hour_epoch() {
        let fx = fixture("en").await;
        let ts = at(2025, 5, 1, 6, 30, 0);
        let d = make_detection("Corvus corax", "Common Raven", 0.9, ts);
        fx.store.insert_detection(&d, None).await.unwrap();
        fx.store
            .upsert_weather(&Weather {
                hour_epoch: hour_epoch(ts),
                temperature: Some(11.5),
                humidity: Some(70.0),
                pressure: Some(1008.0),
                wind_speed: Some(2.0),
                precipitation: Some(0.0),
            })
            .await
            .unwrap();

        let series = fx
            .engine
            .weather_correlation_series(at(2025, 5, 1, 0, 0, 0), at(2025, 5, 2, 0, 0, 0))
            .await
            .unwrap();
        assert_eq!(series.hours, vec![hour_epoch(ts)]);
        assert_eq!(series.detection_counts, vec![1]);
        assert_eq!(series.temperature, vec![Some(11.5)]);
    }
}
