use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::csv::CsvRow;
use super::snapshot::{PersistError, Snapshot, SnapshotBackend};
use super::source::FeedSource;
use crate::util::strip_control_chars;

// ============================================================================
// Error Types
// ============================================================================

/// Column store failures. None of them leave the store modified.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No column named '{0}'")]
    NotFound(String),

    #[error("A column named '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid column name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error(transparent)]
    Persist(#[from] PersistError),
}

// ============================================================================
// Data Structures
// ============================================================================

/// Stable column identifier, independent of the (mutable) display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(Uuid);

impl ColumnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ColumnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A named, ordered bucket of feed sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    /// Insertion order; duplicates allowed.
    pub sources: Vec<FeedSource>,
}

// ============================================================================
// Column Store
// ============================================================================

/// Columns and their feed sources, persisted after every mutation.
///
/// Mutations validate first, then build the next state and hand the full
/// snapshot to the backend; the in-memory state only changes once the save
/// succeeded. Names are matched case-sensitively.
pub struct ColumnStore {
    columns: Vec<Column>,
    backend: Box<dyn SnapshotBackend>,
}

impl fmt::Debug for ColumnStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnStore")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl ColumnStore {
    /// Loads the store from `backend`.
    ///
    /// When the backend has no snapshot yet and `seed` is given, the seed
    /// rows become the initial state and are persisted immediately.
    pub fn open(
        backend: Box<dyn SnapshotBackend>,
        seed: Option<Vec<CsvRow>>,
    ) -> Result<Self, StoreError> {
        match backend.load()? {
            Some(snapshot) => {
                let columns = dedupe_names(snapshot.columns);
                tracing::info!(columns = columns.len(), "Loaded column snapshot");
                Ok(Self { columns, backend })
            }
            None => {
                let mut store = Self {
                    columns: Vec::new(),
                    backend,
                };
                if let Some(rows) = seed {
                    store.replace_from_rows(rows)?;
                    tracing::info!(columns = store.columns.len(), "Seeded columns on first run");
                }
                Ok(store)
            }
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks a column up by name.
    ///
    /// `name` is normalized the way [`add_column`](Self::add_column) stores
    /// it (control characters stripped, trimmed), so `"  Tech "` finds
    /// `Tech`. Matching is case-sensitive.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|index| &self.columns[index])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Creates an empty column at the end and returns its id.
    ///
    /// # Arguments
    ///
    /// * `name` - display name; control characters are stripped and
    ///   surrounding whitespace trimmed before it is stored
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidName`] - empty, or contains a comma or line break
    /// - [`StoreError::DuplicateName`] - a column already has this name
    /// - [`StoreError::Persist`] - the snapshot could not be saved; the store
    ///   is unchanged
    pub fn add_column(&mut self, name: &str) -> Result<ColumnId, StoreError> {
        let name = validate_name(name)?;
        if self.position(&name).is_some() {
            return Err(StoreError::DuplicateName(name));
        }

        let id = ColumnId::new();
        let mut next = self.columns.clone();
        next.push(Column {
            id,
            name,
            sources: Vec::new(),
        });
        self.commit(next)?;
        Ok(id)
    }

    /// Deletes a column and all of its sources.
    ///
    /// # Returns
    ///
    /// The removed column, so callers can report what went with it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - no column has this name
    /// - [`StoreError::Persist`] - the snapshot could not be saved
    pub fn remove_column(&mut self, name: &str) -> Result<Column, StoreError> {
        let index = self.require(name)?;
        let mut next = self.columns.clone();
        let removed = next.remove(index);
        self.commit(next)?;
        Ok(removed)
    }

    /// Renames a column in place; its id, position and sources are kept.
    ///
    /// Renaming to the current name succeeds without saving.
    ///
    /// # Errors
    ///
    /// Same as [`add_column`](Self::add_column) for `new_name`, plus
    /// [`StoreError::NotFound`] when `old_name` does not exist.
    pub fn rename_column(&mut self, old_name: &str, new_name: &str) -> Result<(), StoreError> {
        let index = self.require(old_name)?;
        let new_name = validate_name(new_name)?;
        if new_name == self.columns[index].name {
            return Ok(());
        }
        if self.position(&new_name).is_some() {
            return Err(StoreError::DuplicateName(new_name));
        }

        let mut next = self.columns.clone();
        next[index].name = new_name;
        self.commit(next)
    }

    /// Appends a source to the end of a column's list.
    ///
    /// The same source may appear twice in one column, and each copy is
    /// fetched on refresh.
    ///
    /// # Arguments
    ///
    /// * `column` - column name, normalized like [`column`](Self::column)
    /// * `source` - an already validated, unprefixed feed URL
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - no column has this name
    /// - [`StoreError::Persist`] - the snapshot could not be saved
    pub fn add_source(&mut self, column: &str, source: FeedSource) -> Result<(), StoreError> {
        let index = self.require(column)?;
        let mut next = self.columns.clone();
        next[index].sources.push(source);
        self.commit(next)
    }

    /// Removes every occurrence of `source` from a column.
    ///
    /// Returns how many entries were removed; zero is not an error and does
    /// not touch persistence.
    pub fn remove_source(&mut self, column: &str, source: &FeedSource) -> Result<usize, StoreError> {
        let index = self.require(column)?;
        let before = self.columns[index].sources.len();

        let mut next = self.columns.clone();
        next[index].sources.retain(|s| s != source);
        let removed = before - next[index].sources.len();
        if removed == 0 {
            return Ok(0);
        }

        self.commit(next)?;
        Ok(removed)
    }

    /// Flattens the store into `(column, source)` rows.
    ///
    /// Each membership becomes one row, in column then source order. A column
    /// without sources becomes a single row with no source, so it survives a
    /// round-trip.
    pub fn to_rows(&self) -> Vec<CsvRow> {
        let mut rows = Vec::new();
        for column in &self.columns {
            if column.sources.is_empty() {
                rows.push(CsvRow {
                    column: column.name.clone(),
                    source: None,
                });
            }
            for source in &column.sources {
                rows.push(CsvRow {
                    column: column.name.clone(),
                    source: Some(source.clone()),
                });
            }
        }
        rows
    }

    /// Replaces the whole store with the given rows.
    ///
    /// Columns appear in order of first mention. A column whose name already
    /// exists keeps its id. Nothing is merged with the previous sources.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidName`] - any row names an invalid column; no
    ///   row is applied
    /// - [`StoreError::Persist`] - the snapshot could not be saved
    pub fn replace_from_rows(&mut self, rows: Vec<CsvRow>) -> Result<(), StoreError> {
        let mut next: Vec<Column> = Vec::new();
        for row in rows {
            let name = validate_name(&row.column)?;
            let index = match next.iter().position(|c| c.name == name) {
                Some(index) => index,
                None => {
                    let id = self
                        .column(&name)
                        .map(|existing| existing.id)
                        .unwrap_or_default();
                    next.push(Column {
                        id,
                        name,
                        sources: Vec::new(),
                    });
                    next.len() - 1
                }
            };
            if let Some(source) = row.source {
                next[index].sources.push(source);
            }
        }
        self.commit(next)
    }

    fn position(&self, name: &str) -> Option<usize> {
        let wanted = normalize_name(name);
        self.columns.iter().position(|c| c.name == wanted)
    }

    fn require(&self, name: &str) -> Result<usize, StoreError> {
        self.position(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn commit(&mut self, next: Vec<Column>) -> Result<(), StoreError> {
        let snapshot = Snapshot::new(next);
        self.backend.save(&snapshot)?;
        self.columns = snapshot.columns;
        Ok(())
    }
}

/// Stored form of a column name: control characters stripped, then trimmed.
fn normalize_name(name: &str) -> String {
    strip_control_chars(name).trim().to_string()
}

/// Trims and checks a column name.
///
/// Names must be non-empty and must not contain commas or line breaks, which
/// the CSV export cannot represent.
fn validate_name(name: &str) -> Result<String, StoreError> {
    let normalized = normalize_name(name);
    let trimmed = normalized.as_str();
    let invalid = |reason| StoreError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if trimmed.contains(',') {
        return Err(invalid("name cannot contain a comma"));
    }
    if trimmed.contains(['\n', '\r']) {
        return Err(invalid("name cannot contain a line break"));
    }
    Ok(trimmed.to_string())
}

/// Drops later columns that reuse an earlier column's name.
fn dedupe_names(columns: Vec<Column>) -> Vec<Column> {
    let mut kept: Vec<Column> = Vec::with_capacity(columns.len());
    for column in columns {
        if kept.iter().any(|c| c.name == column.name) {
            tracing::warn!(name = %column.name, "Duplicate column name in snapshot, dropping");
            continue;
        }
        kept.push(column);
    }
    kept
}
