//! Change tracking for a persistence context
//!
//! Staged inserts, updates and deletes accumulate here, in issue order, until
//! the owning unit of work flushes them. Entries are type-erased so one tracker
//! serves every entity type sharing the context; typed lookups go through
//! `Any` downcasts.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::Entity;
use crate::error::{DataError, Result};
use crate::storage::SqlValue;

/// State of a staged change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
}

/// Staged change counts for one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

/// Object-safe view of an [`Entity`] used by the tracker and the flush
pub(crate) trait TrackedEntity: Debug + Send + Sync {
    fn entity_name(&self) -> &'static str;
    fn table(&self) -> &'static str;
    fn key_column(&self) -> &'static str;
    fn columns(&self) -> &'static [&'static str];
    fn version_column(&self) -> Option<&'static str>;
    fn tracked_key(&self) -> Option<i64>;
    fn tracked_version(&self) -> Option<i64>;
    fn column_values(&self) -> Vec<SqlValue>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Entity> TrackedEntity for T {
    fn entity_name(&self) -> &'static str {
        T::NAME
    }

    fn table(&self) -> &'static str {
        T::TABLE
    }

    fn key_column(&self) -> &'static str {
        T::KEY
    }

    fn columns(&self) -> &'static [&'static str] {
        T::COLUMNS
    }

    fn version_column(&self) -> Option<&'static str> {
        T::VERSION
    }

    fn tracked_key(&self) -> Option<i64> {
        Entity::key(self)
    }

    fn tracked_version(&self) -> Option<i64> {
        Entity::version(self)
    }

    fn column_values(&self) -> Vec<SqlValue> {
        Entity::values(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub(crate) struct TrackedEntry {
    pub state: EntityState,
    pub entity: Box<dyn TrackedEntity>,
}

/// Ordered set of staged, unflushed changes
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: Vec<TrackedEntry>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged changes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every staged change
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(discarded = self.entries.len(), "Clearing change tracker");
        }
        self.entries.clear();
    }

    /// Staged change counts per table
    pub fn summary(&self) -> BTreeMap<&'static str, ChangeCounts> {
        let mut summary: BTreeMap<&'static str, ChangeCounts> = BTreeMap::new();
        for entry in &self.entries {
            let counts = summary.entry(entry.entity.table()).or_default();
            match entry.state {
                EntityState::Added => counts.added += 1,
                EntityState::Modified => counts.modified += 1,
                EntityState::Deleted => counts.deleted += 1,
            }
        }
        summary
    }

    pub(crate) fn entries(&self) -> &[TrackedEntry] {
        &self.entries
    }

    /// Staged state and instance of the entity with the given key, if tracked
    pub fn find<T: Entity>(&self, key: i64) -> Option<(EntityState, &T)> {
        let position = self.position(T::TABLE, key)?;
        let entry = &self.entries[position];
        entry
            .entity
            .as_any()
            .downcast_ref::<T>()
            .map(|entity| (entry.state, entity))
    }

    /// Stage an insert
    pub fn stage_added<T: Entity>(&mut self, entity: T) -> Result<()> {
        self.check_addable(&entity)?;
        if let Some(position) = entity.key().and_then(|key| self.position(T::TABLE, key)) {
            // re-adding something staged for deletion turns into an update
            self.entries[position] = TrackedEntry {
                state: EntityState::Modified,
                entity: Box::new(entity),
            };
            return Ok(());
        }
        debug!(entity = T::NAME, key = ?entity.key(), "Staging insert");
        self.entries.push(TrackedEntry {
            state: EntityState::Added,
            entity: Box::new(entity),
        });
        Ok(())
    }

    /// Stage a batch of inserts; nothing is staged if any entity is rejected
    pub fn stage_added_range<T: Entity>(&mut self, entities: Vec<T>) -> Result<()> {
        let mut seen = HashSet::new();
        for entity in &entities {
            self.check_addable(entity)?;
            if let Some(key) = entity.key() {
                if !seen.insert(key) {
                    return Err(DataError::invalid_operation(format!(
                        "{} with key {key} appears more than once in the batch",
                        T::NAME
                    )));
                }
            }
        }
        for entity in entities {
            self.stage_added(entity)?;
        }
        Ok(())
    }

    /// Stage a full-entity update
    pub fn stage_modified<T: Entity>(&mut self, entity: T) -> Result<()> {
        let key = require_key(&entity, "update")?;
        match self.position(T::TABLE, key) {
            Some(position) => {
                let state = self.entries[position].state;
                match state {
                    EntityState::Deleted => {
                        return Err(DataError::invalid_operation(format!(
                            "{} with key {key} is staged for deletion",
                            T::NAME
                        )));
                    }
                    // an insert that has not been flushed yet just carries the new values
                    EntityState::Added | EntityState::Modified => {
                        self.entries[position].entity = Box::new(entity);
                    }
                }
            }
            None => {
                debug!(entity = T::NAME, key, "Staging update");
                self.entries.push(TrackedEntry {
                    state: EntityState::Modified,
                    entity: Box::new(entity),
                });
            }
        }
        Ok(())
    }

    /// Stage a removal
    pub fn stage_deleted<T: Entity>(&mut self, entity: T) -> Result<()> {
        let key = require_key(&entity, "delete")?;
        match self.position(T::TABLE, key) {
            Some(position) => match self.entries[position].state {
                EntityState::Added => {
                    // never reached the store, so there is nothing to delete
                    self.entries.remove(position);
                }
                EntityState::Modified => {
                    self.entries[position] = TrackedEntry {
                        state: EntityState::Deleted,
                        entity: Box::new(entity),
                    };
                }
                EntityState::Deleted => {}
            },
            None => {
                debug!(entity = T::NAME, key, "Staging delete");
                self.entries.push(TrackedEntry {
                    state: EntityState::Deleted,
                    entity: Box::new(entity),
                });
            }
        }
        Ok(())
    }

    fn check_addable<T: Entity>(&self, entity: &T) -> Result<()> {
        if let Some(key) = entity.key() {
            if let Some(position) = self.position(T::TABLE, key) {
                if self.entries[position].state != EntityState::Deleted {
                    return Err(DataError::invalid_operation(format!(
                        "{} with key {key} is already tracked",
                        T::NAME
                    )));
                }
            }
        }
        Ok(())
    }

    fn position(&self, table: &str, key: i64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.entity.table() == table && e.entity.tracked_key() == Some(key))
    }
}

fn require_key<T: Entity>(entity: &T, operation: &str) -> Result<i64> {
    entity.key().ok_or_else(|| {
        DataError::argument(format!("cannot {operation} a {} that has no key yet", T::NAME))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Customer, Truck};

    #[test]
    fn add_then_update_stays_an_insert() {
        let mut tracker = ChangeTracker::new();
        tracker.stage_added(Truck::new("AB-123", "Volvo FH", 18_000).with_id(1)).unwrap();

        let mut changed = Truck::new("AB-123", "Volvo FH16", 18_000).with_id(1);
        changed.active = false;
        tracker.stage_modified(changed.clone()).unwrap();

        assert_eq!(tracker.len(), 1);
        let (state, tracked) = tracker.find::<Truck>(1).unwrap();
        assert_eq!(state, EntityState::Added);
        assert_eq!(tracked, &changed);
    }

    #[test]
    fn deleting_a_staged_insert_forgets_it() {
        let mut tracker = ChangeTracker::new();
        let truck = Truck::new("AB-123", "Volvo FH", 18_000).with_id(1);
        tracker.stage_added(truck.clone()).unwrap();
        tracker.stage_deleted(truck).unwrap();
        assert!(tracker.is_empty());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut tracker = ChangeTracker::new();
        tracker.stage_added(Truck::new("AB-123", "Volvo FH", 18_000).with_id(1)).unwrap();
        let err = tracker
            .stage_added(Truck::new("CD-456", "Scania R", 20_000).with_id(1))
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidOperation(_)));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut tracker = ChangeTracker::new();
        let batch = vec![
            Truck::new("AB-1", "Volvo FH", 18_000).with_id(1),
            Truck::new("AB-2", "Volvo FH", 18_000).with_id(2),
            Truck::new("AB-3", "Volvo FH", 18_000).with_id(1),
        ];
        assert!(tracker.stage_added_range(batch).is_err());
        assert!(tracker.is_empty());
    }

    #[test]
    fn same_key_in_different_tables_does_not_collide() {
        let mut tracker = ChangeTracker::new();
        tracker.stage_added(Truck::new("AB-123", "Volvo FH", 18_000).with_id(1)).unwrap();
        tracker.stage_added(Customer::new("Acme").with_id(1)).unwrap();
        assert_eq!(tracker.len(), 2);
        assert!(tracker.find::<Customer>(1).is_some());
    }

    #[test]
    fn update_without_key_is_an_argument_error() {
        let mut tracker = ChangeTracker::new();
        let err = tracker
            .stage_modified(Truck::new("AB-123", "Volvo FH", 18_000))
            .unwrap_err();
        assert!(matches!(err, DataError::Argument(_)));
    }

    #[test]
    fn summary_counts_by_table_and_state() {
        let mut tracker = ChangeTracker::new();
        tracker.stage_added(Truck::new("AB-1", "Volvo FH", 18_000)).unwrap();
        tracker.stage_added(Truck::new("AB-2", "Volvo FH", 18_000)).unwrap();
        tracker.stage_modified(Truck::new("AB-3", "Volvo FH", 18_000).with_id(3)).unwrap();
        tracker.stage_deleted(Customer::new("Acme").with_id(9)).unwrap();

        let summary = tracker.summary();
        assert_eq!(summary["trucks"], ChangeCounts { added: 2, modified: 1, deleted: 0 });
        assert_eq!(summary["customers"].deleted, 1);
    }
}
