//! Reference database attachment.
//!
//! Reference databases (IOC taxonomy, PatLevin and Avibase translations)
//! are separate SQLite files attached to a session with `ATTACH DATABASE`
//! and released with `DETACH DATABASE`. Missing files are skipped so the
//! capability set degrades gracefully; detach errors are logged, never
//! raised, so cleanup always runs.

use crate::config::DataPaths;
use crate::error::Result;
use sqlx::SqliteConnection;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One attachable reference database.
#[derive(Debug, Clone)]
pub struct AttachSource {
    /// Schema alias used in queries, e.g. `ioc`.
    pub alias: &'static str,
    /// Database file path.
    pub path: PathBuf,
}

/// The subset of sources actually attached to one session.
#[derive(Debug, Default)]
pub struct AttachedSet {
    aliases: Vec<&'static str>,
}

impl AttachedSet {
    /// Whether the alias was attached.
    pub fn has(&self, alias: &str) -> bool {
        self.aliases.contains(&alias)
    }

    /// Whether nothing was attached.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Attaches the configured reference databases to query sessions.
#[derive(Debug, Clone)]
pub struct AttachManager {
    sources: Vec<AttachSource>,
}

impl AttachManager {
    /// Build from an explicit source list (order is attach order).
    pub fn new(sources: Vec<AttachSource>) -> Self {
        Self { sources }
    }

    /// Standard reference set under the data root: IOC, PatLevin, Avibase.
    pub fn from_data_paths(paths: &DataPaths) -> Self {
        Self::new(vec![
            AttachSource {
                alias: "ioc",
                path: paths.ioc_db(),
            },
            AttachSource {
                alias: "patlevin",
                path: paths.patlevin_db(),
            },
            AttachSource {
                alias: "avibase",
                path: paths.avibase_db(),
            },
        ])
    }

    /// Attach every present source to the session, in order.
    pub async fn attach_all(&self, conn: &mut SqliteConnection) -> Result<AttachedSet> {
        let mut attached = AttachedSet::default();
        for source in &self.sources {
            if !source.path.exists() {
                debug!(
                    alias = source.alias,
                    path = %source.path.display(),
                    "reference database missing, skipping attach"
                );
                continue;
            }
            // The alias comes from the fixed source list, never user input.
            let result = sqlx::query(&format!("ATTACH DATABASE ? AS {}", source.alias))
                .bind(source.path.to_string_lossy().into_owned())
                .execute(&mut *conn)
                .await;
            if let Err(e) = result {
                // Never hand a half-attached session back to the pool.
                self.detach_all(conn, &attached).await;
                return Err(e.into());
            }
            attached.aliases.push(source.alias);
        }
        Ok(attached)
    }

    /// Detach in reverse attach order; errors are logged, not raised.
    pub async fn detach_all(&self, conn: &mut SqliteConnection, attached: &AttachedSet) {
        for alias in attached.aliases.iter().rev() {
            if let Err(e) = sqlx::query(&format!("DETACH DATABASE {alias}"))
                .execute(&mut *conn)
                .await
            {
                warn!(alias, error = %e, "failed to detach reference database");
            }
        }
    }
}
