//! eBird regional occurrence filtering.
//!
//! Looks up the detection's species in an H3-indexed regional pack and
//! applies the configured strictness policy. Filtering must never lose
//! real detections silently: every internal failure falls open to allow.

mod registry;

pub use registry::{PackRegion, PackRegistry};

use crate::config::{DetectionMode, EbirdFilterConfig, Strictness, UnknownSpeciesBehavior};
use h3o::{LatLng, Resolution};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Occurrence tier for a species in a cell, least to most expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Out-of-range stray.
    Vagrant,
    /// Rarely reported in the region.
    Rare,
    /// Occasionally reported in the region.
    Uncommon,
    /// Regularly reported in the region.
    Common,
}

impl Tier {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "vagrant" => Some(Self::Vagrant),
            "rare" => Some(Self::Rare),
            "uncommon" => Some(Self::Uncommon),
            "common" => Some(Self::Common),
            _ => None,
        }
    }

    /// Whether this tier falls inside the block set for a strictness level.
    ///
    /// Strictness names the highest blocked tier, so the block set is
    /// cumulative from `vagrant` upward: `rare` blocks vagrant and rare,
    /// `common` blocks every tier present in the pack.
    fn blocked_at(self, strictness: Strictness) -> bool {
        let ceiling = match strictness {
            Strictness::Vagrant => Self::Vagrant,
            Strictness::Rare => Self::Rare,
            Strictness::Uncommon => Self::Uncommon,
            Strictness::Common => Self::Common,
        };
        self <= ceiling
    }
}

/// The filter's verdict for one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Persist the detection.
    Allow,
    /// Drop the detection; carries the tier when the pack had one.
    Block(Option<Tier>),
}

/// Regional occurrence filter over H3-indexed packs.
#[derive(Debug, Clone)]
pub struct EbirdFilter {
    config: EbirdFilterConfig,
    registry: PackRegistry,
    pool: SqlitePool,
}

impl EbirdFilter {
    /// Build a filter over the given pack registry and database pool.
    ///
    /// The pool is only used as an attach session for pack lookups.
    pub fn new(config: EbirdFilterConfig, registry: PackRegistry, pool: SqlitePool) -> Self {
        Self {
            config,
            registry,
            pool,
        }
    }

    /// Decide whether a detection at the given coordinates may be persisted.
    pub async fn evaluate(
        &self,
        scientific_name: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> FilterDecision {
        if !self.config.enabled || self.config.detection_mode == DetectionMode::Off {
            return FilterDecision::Allow;
        }
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return FilterDecision::Allow;
        };

        // No pack covering the point means the operator has not installed
        // regional data for it.
        let Some(pack_path) = self.registry.find_pack(latitude, longitude) else {
            debug!(scientific_name, "no regional pack covers the station point");
            return FilterDecision::Allow;
        };

        let tier = match self
            .lookup_tier(scientific_name, latitude, longitude, &pack_path)
            .await
        {
            Ok(tier) => tier,
            Err(e) => {
                warn!(scientific_name, error = %e, "eBird tier lookup failed, allowing");
                return FilterDecision::Allow;
            }
        };

        let would_block = match tier {
            Some(tier) => tier.blocked_at(self.config.detection_strictness),
            None => self.config.unknown_species_behavior == UnknownSpeciesBehavior::Block,
        };

        if !would_block {
            return FilterDecision::Allow;
        }

        match self.config.detection_mode {
            DetectionMode::Warn => {
                info!(
                    scientific_name,
                    ?tier,
                    strictness = ?self.config.detection_strictness,
                    "occurrence check would block detection (warn mode)"
                );
                FilterDecision::Allow
            }
            DetectionMode::Filter => FilterDecision::Block(tier),
            DetectionMode::Off => FilterDecision::Allow,
        }
    }

    /// Query the pack for the species tier at the point's H3 cell.
    async fn lookup_tier(
        &self,
        scientific_name: &str,
        latitude: f64,
        longitude: f64,
        pack_path: &std::path::Path,
    ) -> crate::error::Result<Option<Tier>> {
        let cell = h3_cell(latitude, longitude, self.config.h3_resolution)?;

        let mut conn = self.pool.acquire().await?;
        sqlx::query("ATTACH DATABASE ? AS ebird_pack")
            .bind(pack_path.to_string_lossy().into_owned())
            .execute(&mut *conn)
            .await?;

        let result = sqlx::query(
            "SELECT tier FROM ebird_pack.species_cells
             WHERE scientific_name = ? AND h3_cell = ?",
        )
        .bind(scientific_name)
        .bind(&cell)
        .fetch_optional(&mut *conn)
        .await;

        // Detach before surfacing the query result so the session is clean
        // on every exit.
        if let Err(e) = sqlx::query("DETACH DATABASE ebird_pack")
            .execute(&mut *conn)
            .await
        {
            warn!(error = %e, "failed to detach eBird pack");
        }

        let row = result?;
        Ok(row.and_then(|row| {
            let raw: String = row.try_get("tier").ok()?;
            let tier = Tier::parse(&raw);
            if tier.is_none() {
                warn!(%raw, "unknown occurrence tier in pack");
            }
            tier
        }))
    }
}

/// H3 cell index for a point, as the canonical lowercase hex string.
pub fn h3_cell(latitude: f64, longitude: f64, resolution: u8) -> crate::error::Result<String> {
    let point = LatLng::new(latitude, longitude).map_err(|e| crate::error::Error::Internal {
        message: format!("invalid coordinates for H3: {e}"),
    })?;
    let resolution =
        Resolution::try_from(resolution).map_err(|e| crate::error::Error::Internal {
            message: format!("invalid H3 resolution: {e}"),
        })?;
    Ok(point.to_cell(resolution).to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::path::Path;

    const ROBIN: &str = "Turdus migratorius";
    const TORONTO: (f64, f64) = (43.65, -79.38);

    async fn scratch_pool(dir: &tempfile::TempDir) -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(dir.path().join("main.db"))
                    .create_if_missing(true),
            )
            .await
            .unwrap()
    }

    /// Install a one-region registry plus a pack holding the given tiers.
    async fn install_pack(dir: &Path, tiers: &[(&str, &str)]) {
        std::fs::write(
            dir.join("registry.json"),
            r#"[{
                "region_id": "CA-ON",
                "pack_file": "ca_on.db",
                "min_latitude": 41.0,
                "max_latitude": 57.0,
                "min_longitude": -95.0,
                "max_longitude": -74.0
            }]"#,
        )
        .unwrap();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(dir.join("ca_on.db"))
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE species_cells (
                scientific_name TEXT NOT NULL,
                h3_cell TEXT NOT NULL,
                tier TEXT NOT NULL,
                PRIMARY KEY (scientific_name, h3_cell)
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        let cell = h3_cell(TORONTO.0, TORONTO.1, 5).unwrap();
        for (species, tier) in tiers {
            sqlx::query("INSERT INTO species_cells VALUES (?, ?, ?)")
                .bind(*species)
                .bind(&cell)
                .bind(*tier)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;
    }

    fn filter_config(
        mode: DetectionMode,
        strictness: Strictness,
        unknown: UnknownSpeciesBehavior,
        pack_root: &Path,
    ) -> EbirdFilterConfig {
        EbirdFilterConfig {
            enabled: true,
            detection_mode: mode,
            detection_strictness: strictness,
            h3_resolution: 5,
            unknown_species_behavior: unknown,
            pack_root_dir: pack_root.to_path_buf(),
        }
    }

    async fn build_filter(
        dir: &tempfile::TempDir,
        mode: DetectionMode,
        strictness: Strictness,
        unknown: UnknownSpeciesBehavior,
    ) -> EbirdFilter {
        let registry = PackRegistry::load(dir.path()).unwrap();
        let pool = scratch_pool(dir).await;
        EbirdFilter::new(
            filter_config(mode, strictness, unknown, dir.path()),
            registry,
            pool,
        )
    }

    #[test]
    fn test_tier_block_matrix() {
        use Strictness as S;
        use Tier as T;
        assert!(T::Vagrant.blocked_at(S::Vagrant));
        assert!(!T::Rare.blocked_at(S::Vagrant));
        assert!(T::Rare.blocked_at(S::Rare));
        assert!(!T::Uncommon.blocked_at(S::Rare));
        assert!(T::Uncommon.blocked_at(S::Uncommon));
        assert!(!T::Common.blocked_at(S::Uncommon));
        // 'common' strictness blocks any tier present.
        assert!(T::Common.blocked_at(S::Common));
        assert!(T::Vagrant.blocked_at(S::Common));
    }

    #[tokio::test]
    async fn test_off_mode_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        install_pack(dir.path(), &[(ROBIN, "vagrant")]).await;
        let filter = build_filter(
            &dir,
            DetectionMode::Off,
            Strictness::Common,
            UnknownSpeciesBehavior::Block,
        )
        .await;

        let decision = filter
            .evaluate(ROBIN, Some(TORONTO.0), Some(TORONTO.1))
            .await;
        assert_eq!(decision, FilterDecision::Allow);
    }

    #[tokio::test]
    async fn test_missing_coordinates_allow() {
        let dir = tempfile::tempdir().unwrap();
        install_pack(dir.path(), &[(ROBIN, "vagrant")]).await;
        let filter = build_filter(
            &dir,
            DetectionMode::Filter,
            Strictness::Common,
            UnknownSpeciesBehavior::Block,
        )
        .await;

        assert_eq!(
            filter.evaluate(ROBIN, None, Some(TORONTO.1)).await,
            FilterDecision::Allow
        );
        assert_eq!(
            filter.evaluate(ROBIN, Some(TORONTO.0), None).await,
            FilterDecision::Allow
        );
    }

    #[tokio::test]
    async fn test_blocks_rare_at_rare_strictness() {
        let dir = tempfile::tempdir().unwrap();
        install_pack(dir.path(), &[(ROBIN, "rare")]).await;
        let filter = build_filter(
            &dir,
            DetectionMode::Filter,
            Strictness::Rare,
            UnknownSpeciesBehavior::Allow,
        )
        .await;

        let decision = filter
            .evaluate(ROBIN, Some(TORONTO.0), Some(TORONTO.1))
            .await;
        assert_eq!(decision, FilterDecision::Block(Some(Tier::Rare)));
    }

    #[tokio::test]
    async fn test_allows_common_at_rare_strictness() {
        let dir = tempfile::tempdir().unwrap();
        install_pack(dir.path(), &[(ROBIN, "common")]).await;
        let filter = build_filter(
            &dir,
            DetectionMode::Filter,
            Strictness::Rare,
            UnknownSpeciesBehavior::Allow,
        )
        .await;

        let decision = filter
            .evaluate(ROBIN, Some(TORONTO.0), Some(TORONTO.1))
            .await;
        assert_eq!(decision, FilterDecision::Allow);
    }

    #[tokio::test]
    async fn test_warn_mode_never_blocks() {
        let dir = tempfile::tempdir().unwrap();
        install_pack(dir.path(), &[(ROBIN, "vagrant")]).await;
        let filter = build_filter(
            &dir,
            DetectionMode::Warn,
            Strictness::Vagrant,
            UnknownSpeciesBehavior::Allow,
        )
        .await;

        let decision = filter
            .evaluate(ROBIN, Some(TORONTO.0), Some(TORONTO.1))
            .await;
        assert_eq!(decision, FilterDecision::Allow);
    }

    #[tokio::test]
    async fn test_unknown_species_behavior() {
        let dir = tempfile::tempdir().unwrap();
        install_pack(dir.path(), &[(ROBIN, "common")]).await;

        let filter = build_filter(
            &dir,
            DetectionMode::Filter,
            Strictness::Vagrant,
            UnknownSpeciesBehavior::Block,
        )
        .await;
        let decision = filter
            .evaluate("Sitta europaea", Some(TORONTO.0), Some(TORONTO.1))
            .await;
        assert_eq!(decision, FilterDecision::Block(None));

        let filter = build_filter(
            &dir,
            DetectionMode::Filter,
            Strictness::Vagrant,
            UnknownSpeciesBehavior::Allow,
        )
        .await;
        let decision = filter
            .evaluate("Sitta europaea", Some(TORONTO.0), Some(TORONTO.1))
            .await;
        assert_eq!(decision, FilterDecision::Allow);
    }

    #[tokio::test]
    async fn test_point_outside_all_regions_allows() {
        let dir = tempfile::tempdir().unwrap();
        install_pack(dir.path(), &[(ROBIN, "vagrant")]).await;
        let filter = build_filter(
            &dir,
            DetectionMode::Filter,
            Strictness::Common,
            UnknownSpeciesBehavior::Block,
        )
        .await;

        // Helsinki is outside the Ontario bounding box.
        let decision = filter.evaluate(ROBIN, Some(60.17), Some(24.94)).await;
        assert_eq!(decision, FilterDecision::Allow);
    }

    #[tokio::test]
    async fn test_corrupt_pack_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        install_pack(dir.path(), &[(ROBIN, "vagrant")]).await;
        // Replace the pack with garbage after registry install.
        std::fs::write(dir.path().join("ca_on.db"), b"not a database").unwrap();

        let filter = build_filter(
            &dir,
            DetectionMode::Filter,
            Strictness::Common,
            UnknownSpeciesBehavior::Block,
        )
        .await;
        let decision = filter
            .evaluate(ROBIN, Some(TORONTO.0), Some(TORONTO.1))
            .await;
        assert_eq!(decision, FilterDecision::Allow);
    }
}
