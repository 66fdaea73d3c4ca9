//! Relation descriptors announced on the current replication session.
//!
//! Inserts carry only a relation OID; the column layout comes from the last
//! Relation message for that OID. OIDs are meaningful only within one
//! session, so the cache is emptied when the session ends.

use std::collections::HashMap;

use super::pgoutput::{ColumnInfo, RelationMessage, ReplicaIdentity};
use crate::error::{PgError, PgResult};

#[derive(Debug, Clone, PartialEq)]
pub struct RelationInfo {
    pub namespace: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub replica_identity: ReplicaIdentity,
}

impl RelationInfo {
    /// `schema.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// A tuple may omit trailing columns but never carry more than announced.
    pub fn check_tuple_width(&self, width: usize) -> PgResult<()> {
        if width > self.columns.len() {
            return Err(PgError::Protocol(format!(
                "tuple for {} has {} columns, relation has {}",
                self.qualified_name(),
                width,
                self.columns.len()
            )));
        }
        Ok(())
    }

    fn same_layout(&self, other: &RelationInfo) -> bool {
        self.namespace == other.namespace
            && self.name == other.name
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name && a.type_oid == b.type_oid)
    }
}

/// What an announcement did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    New,
    Unchanged,
    /// Same OID, different name or columns (e.g. `ALTER TABLE`).
    Changed,
}

#[derive(Debug, Default)]
pub struct RelationCache {
    relations: HashMap<u32, RelationInfo>,
}

impl RelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the descriptor from a Relation message, replacing any earlier one.
    pub fn announce(&mut self, msg: RelationMessage) -> Announcement {
        let relation_id = msg.relation_id;
        let info = RelationInfo {
            namespace: msg.namespace,
            name: msg.name,
            columns: msg.columns,
            replica_identity: msg.replica_identity,
        };

        let outcome = match self.relations.get(&relation_id) {
            None => Announcement::New,
            Some(previous) if previous.same_layout(&info) => Announcement::Unchanged,
            Some(_) => Announcement::Changed,
        };
        self.relations.insert(relation_id, info);
        outcome
    }

    pub fn get(&self, relation_id: u32) -> Option<&RelationInfo> {
        self.relations.get(&relation_id)
    }

    /// Like [`get`](Self::get), but a miss is [`PgError::UnknownRelation`].
    pub fn resolve(&self, relation_id: u32) -> PgResult<&RelationInfo> {
        self.get(relation_id)
            .ok_or(PgError::UnknownRelation(relation_id))
    }

    pub fn clear(&mut self) {
        self.relations.clear();
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(relation_id: u32, name: &str, columns: &[(&str, u32)]) -> RelationMessage {
        RelationMessage {
            xid: None,
            relation_id,
            namespace: "public".to_string(),
            name: name.to_string(),
            replica_identity: ReplicaIdentity::Default,
            columns: columns
                .iter()
                .map(|(c, oid)| ColumnInfo {
                    flags: 0,
                    name: c.to_string(),
                    type_oid: *oid,
                    type_modifier: -1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_announce_and_resolve() {
        let mut cache = RelationCache::new();
        let outcome = cache.announce(relation(16384, "outbox", &[("event_name", 25), ("data", 3802)]));
        assert_eq!(outcome, Announcement::New);

        let info = cache.resolve(16384).unwrap();
        assert_eq!(info.qualified_name(), "public.outbox");
        assert_eq!(info.columns[1].type_oid, 3802);
    }

    #[test]
    fn test_resolve_miss_is_unknown_relation() {
        let cache = RelationCache::new();
        assert!(cache.get(12345).is_none());
        assert!(matches!(
            cache.resolve(12345),
            Err(PgError::UnknownRelation(12345))
        ));
    }

    #[test]
    fn test_reannouncement_classified() {
        let mut cache = RelationCache::new();
        cache.announce(relation(16384, "outbox", &[("event_name", 25)]));

        assert_eq!(
            cache.announce(relation(16384, "outbox", &[("event_name", 25)])),
            Announcement::Unchanged
        );
        assert_eq!(
            cache.announce(relation(16384, "outbox", &[("event_name", 25), ("object_id", 25)])),
            Announcement::Changed
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resolve(16384).unwrap().columns.len(), 2);

        // A column type change alone counts as a new layout.
        assert_eq!(
            cache.announce(relation(16384, "outbox", &[("event_name", 25), ("object_id", 23)])),
            Announcement::Changed
        );
    }

    #[test]
    fn test_tuple_width() {
        let mut cache = RelationCache::new();
        cache.announce(relation(1, "users", &[("name", 25), ("email", 25)]));
        let info = cache.resolve(1).unwrap();

        assert!(info.check_tuple_width(2).is_ok());
        assert!(info.check_tuple_width(1).is_ok());
        assert!(matches!(info.check_tuple_width(3), Err(PgError::Protocol(_))));
    }

    #[test]
    fn test_clear_forgets_session_relations() {
        let mut cache = RelationCache::new();
        cache.announce(relation(16384, "users", &[]));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.resolve(16384).is_err());
    }
}
