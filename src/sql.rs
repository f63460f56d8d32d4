//! SQL text lookup by logical name.
//!
//! Queries live as `*.sql` files in one directory; the file stem is the query
//! name. Lookups never touch the remote API.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};

const SQL_EXTENSION: &str = "sql";

/// Resolves a query name to SQL text.
pub trait SqlTextProvider: Send + Sync {
    /// Returns the SQL for `name`, or `SqlTextNotFound`.
    fn resolve(&self, name: &str) -> Result<String>;

    /// Names of all known queries, sorted.
    fn list(&self) -> Vec<String>;
}

/// Directory-backed provider, loaded eagerly and reloadable.
pub struct SqlDirectory {
    root: PathBuf,
    queries: RwLock<BTreeMap<String, String>>,
}

impl SqlDirectory {
    /// Loads every `*.sql` file in `root`. A missing directory is logged and
    /// yields an empty provider.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let directory = Self {
            root: root.into(),
            queries: RwLock::new(BTreeMap::new()),
        };
        directory.reload();
        directory
    }

    /// Re-reads the directory, replacing all loaded queries.
    pub fn reload(&self) {
        let loaded = Self::load_all(&self.root);
        *self.queries.write().unwrap_or_else(|e| e.into_inner()) = loaded;
    }

    fn load_all(root: &Path) -> BTreeMap<String, String> {
        let mut queries = BTreeMap::new();

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %root.display(), "SQL directory is not readable: {e}");
                return queries;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SQL_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            match fs::read_to_string(&path) {
                Ok(text) => {
                    info!(query = %name, "Loaded SQL query");
                    queries.insert(name.to_string(), text.trim().to_string());
                }
                Err(e) => error!(path = %path.display(), "Failed to load SQL file: {e}"),
            }
        }

        queries
    }
}

/// Strips an optional `.sql` suffix and rejects anything path-like.
pub fn normalize_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let stem = trimmed
        .strip_suffix(".sql")
        .unwrap_or(trimmed);

    if stem.is_empty() || stem.contains(['/', '\\']) || stem.contains("..") {
        return Err(RelayError::sql_not_found(format!(
            "Invalid query name: '{name}'"
        )));
    }
    Ok(stem)
}

impl SqlTextProvider for SqlDirectory {
    fn resolve(&self, name: &str) -> Result<String> {
        let stem = normalize_name(name)?;
        debug!(query = %stem, "Resolving SQL text");

        self.queries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(stem)
            .cloned()
            .ok_or_else(|| {
                RelayError::sql_not_found(format!(
                    "SQL file not found: {}",
                    self.root.join(format!("{stem}.{SQL_EXTENSION}")).display()
                ))
            })
    }

    fn list(&self) -> Vec<String> {
        self.queries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}
