//! eBird regional pack registry.
//!
//! The pack root directory holds one SQLite file per region plus a
//! `registry.json` mapping each region to its bounding box and pack
//! filename. Packs are immutable once installed.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Registry file name under the pack root.
const REGISTRY_FILE: &str = "registry.json";

/// One region entry in the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct PackRegion {
    /// Region identifier, e.g. `US-ON`.
    pub region_id: String,
    /// Pack filename relative to the pack root.
    pub pack_file: String,
    /// Bounding box south edge.
    pub min_latitude: f64,
    /// Bounding box north edge.
    pub max_latitude: f64,
    /// Bounding box west edge.
    pub min_longitude: f64,
    /// Bounding box east edge.
    pub max_longitude: f64,
}

impl PackRegion {
    /// Whether the bounding box contains the point.
    fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}

/// Installed regional packs.
#[derive(Debug, Clone, Default)]
pub struct PackRegistry {
    root: PathBuf,
    regions: Vec<PackRegion>,
}

impl PackRegistry {
    /// Load the registry under `root`.
    ///
    /// A missing registry file means the operator has not installed
    /// regional data; that is an empty registry, not an error.
    pub fn load(root: &Path) -> Result<Self> {
        let registry_path = root.join(REGISTRY_FILE);
        if !registry_path.exists() {
            return Ok(Self {
                root: root.to_path_buf(),
                regions: Vec::new(),
            });
        }

        let contents =
            std::fs::read_to_string(&registry_path).map_err(|e| Error::PackRegistryRead {
                path: registry_path.clone(),
                source: e,
            })?;
        let regions: Vec<PackRegion> =
            serde_json::from_str(&contents).map_err(|e| Error::PackRegistryParse {
                path: registry_path,
                source: e,
            })?;

        info!(count = regions.len(), root = %root.display(), "loaded eBird pack registry");
        Ok(Self {
            root: root.to_path_buf(),
            regions,
        })
    }

    /// Find the pack file whose region contains the point.
    pub fn find_pack(&self, latitude: f64, longitude: f64) -> Option<PathBuf> {
        self.regions
            .iter()
            .find(|region| region.contains(latitude, longitude))
            .map(|region| self.root.join(&region.pack_file))
    }

    /// Whether any region is installed.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
