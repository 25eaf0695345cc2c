//! The mapper environment.
//!
//! [`Environment`] indexes every declared mapper twice: by owning entity (the
//! entity named in the registry key) and by source entity (every entity the
//! mapper reads). The second index answers "what must be recomputed when X
//! changes". Declarations arrive as registry key/value pairs:
//!
//! ```text
//! core.mapper.BASIC.device123.mapper-from-device234 = insert into device123 select device234.temp as temp
//! └── category ─┘ └ q ┘ └ entity ─┘ └──── name ────────┘
//! ```
//!
//! The key is split from the right, so the category may itself contain dots.
//! A qualifier of `SUBSCRIPTION` parses the value as a subscription mapper;
//! any other qualifier parses it as a property mapper.
//!
//! Batches are applied under one write lock: readers never observe half of a
//! batch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use twin_net::messages::{KvPair, MapperUpdate};
use twin_net::{NatsConnection, NetError, subjects};
use twin_tql::Mapper;

use crate::error::EnvironmentError;

/// Qualifier selecting the subscription parsing strategy.
pub const SUBSCRIPTION_QUALIFIER: &str = "SUBSCRIPTION";

/// A registry key split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperKey {
    pub category: String,
    pub qualifier: String,
    pub entity_id: String,
    pub name: String,
}

impl MapperKey {
    /// # Errors
    ///
    /// Returns [`EnvironmentError::InvalidKey`] unless the key has four
    /// non-empty dot-separated parts.
    pub fn parse(key: &str) -> Result<Self, EnvironmentError> {
        let mut parts = key.rsplitn(4, '.');
        let (Some(name), Some(entity_id), Some(qualifier), Some(category)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(EnvironmentError::InvalidKey(key.to_string()));
        };
        if [category, qualifier, entity_id, name].iter().any(|p| p.is_empty()) {
            return Err(EnvironmentError::InvalidKey(key.to_string()));
        }
        Ok(Self {
            category: category.to_string(),
            qualifier: qualifier.to_string(),
            entity_id: entity_id.to_string(),
            name: name.to_string(),
        })
    }

    /// The id given to the parsed mapper.
    #[must_use]
    pub fn mapper_id(&self) -> String {
        format!("{}.{}", self.entity_id, self.name)
    }

    fn is_subscription(&self) -> bool {
        self.qualifier == SUBSCRIPTION_QUALIFIER
    }
}

/// Outcome of storing one registry pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MapperInfo {
    pub key: String,
    /// Owning entity; empty when the key could not be parsed.
    pub entity_id: String,
    pub name: String,
    pub outcome: Result<(), EnvironmentError>,
}

#[derive(Debug, Default)]
struct Index {
    /// owner entity -> mapper name -> mapper
    owners: HashMap<String, BTreeMap<String, Arc<Mapper>>>,
    /// source entity -> {(owner entity, mapper name)}
    sources: HashMap<String, BTreeSet<(String, String)>>,
}

impl Index {
    fn insert(&mut self, owner: &str, name: &str, mapper: Arc<Mapper>) {
        self.remove(owner, name);
        for source in mapper.source_entities() {
            self.sources
                .entry(source.clone())
                .or_default()
                .insert((owner.to_string(), name.to_string()));
        }
        self.owners
            .entry(owner.to_string())
            .or_default()
            .insert(name.to_string(), mapper);
    }

    fn remove(&mut self, owner: &str, name: &str) -> bool {
        let Some(mappers) = self.owners.get_mut(owner) else {
            return false;
        };
        let Some(old) = mappers.remove(name) else {
            return false;
        };
        if mappers.is_empty() {
            self.owners.remove(owner);
        }
        let entry = (owner.to_string(), name.to_string());
        for source in old.source_entities() {
            if let Some(set) = self.sources.get_mut(source) {
                set.remove(&entry);
                if set.is_empty() {
                    self.sources.remove(source);
                }
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.owners.values().map(BTreeMap::len).sum()
    }
}

/// Process-wide index of declared mappers.
#[derive(Debug, Default)]
pub struct Environment {
    index: RwLock<Index>,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse and upsert a batch of declarations. Every pair yields one
    /// [`MapperInfo`], in input order; a bad pair never aborts the batch.
    pub fn store_mappers(&self, pairs: &[KvPair]) -> Vec<MapperInfo> {
        self.apply_batch(pairs, &[])
    }

    /// Apply a registry change-feed batch: puts, then deletes, atomically.
    pub fn apply(&self, update: &MapperUpdate) -> Vec<MapperInfo> {
        self.apply_batch(&update.puts, &update.deletes)
    }

    fn apply_batch(&self, puts: &[KvPair], deletes: &[String]) -> Vec<MapperInfo> {
        let prepared: Vec<(MapperInfo, Option<(MapperKey, Mapper)>)> =
            puts.iter().map(prepare).collect();
        let removals: Vec<MapperKey> = deletes
            .iter()
            .filter_map(|key| match MapperKey::parse(key) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(%key, error = %e, "ignoring delete of malformed key");
                    None
                }
            })
            .collect();

        let mut infos = Vec::with_capacity(prepared.len());
        let mut index = self.write();
        for (info, parsed) in prepared {
            if let Some((key, mapper)) = parsed {
                index.insert(&key.entity_id, &key.name, Arc::new(mapper));
            }
            infos.push(info);
        }
        for key in removals {
            if index.remove(&key.entity_id, &key.name) {
                debug!(entity_id = %key.entity_id, name = %key.name, "mapper removed");
            }
        }
        infos
    }

    /// Mappers that read from `entity_id`.
    pub fn mappers_for(&self, entity_id: &str) -> Vec<Arc<Mapper>> {
        let index = self.read();
        let Some(entries) = index.sources.get(entity_id) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|(owner, name)| index.owners.get(owner)?.get(name).cloned())
            .collect()
    }

    /// Mappers declared under `entity_id`.
    pub fn mappers_of(&self, entity_id: &str) -> Vec<Arc<Mapper>> {
        self.read()
            .owners
            .get(entity_id)
            .map(|mappers| mappers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove mappers by registry key. Malformed and unknown keys are
    /// skipped. Returns how many were removed.
    pub fn remove_mappers(&self, keys: &[String]) -> usize {
        let parsed: Vec<MapperKey> = keys
            .iter()
            .filter_map(|key| MapperKey::parse(key).ok())
            .collect();
        let mut index = self.write();
        parsed
            .iter()
            .filter(|key| index.remove(&key.entity_id, &key.name))
            .count()
    }

    /// Remove every mapper owned by `entity_id`. Returns how many were
    /// removed.
    pub fn remove_entity(&self, entity_id: &str) -> usize {
        let mut index = self.write();
        let names: Vec<String> = index
            .owners
            .get(entity_id)
            .map(|mappers| mappers.keys().cloned().collect())
            .unwrap_or_default();
        names
            .iter()
            .filter(|name| index.remove(entity_id, name))
            .count()
    }

    /// Total number of mappers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prepare(pair: &KvPair) -> (MapperInfo, Option<(MapperKey, Mapper)>) {
    let key = match MapperKey::parse(&pair.key) {
        Ok(key) => key,
        Err(e) => {
            warn!(key = %pair.key, error = %e, "rejecting mapper declaration");
            return (
                MapperInfo {
                    key: pair.key.clone(),
                    entity_id: String::new(),
                    name: String::new(),
                    outcome: Err(e),
                },
                None,
            );
        }
    };

    let info = |outcome| MapperInfo {
        key: pair.key.clone(),
        entity_id: key.entity_id.clone(),
        name: key.name.clone(),
        outcome,
    };

    let Ok(tql) = std::str::from_utf8(&pair.value) else {
        warn!(key = %pair.key, "mapper value is not UTF-8");
        return (
            info(Err(EnvironmentError::InvalidUtf8 {
                key: pair.key.clone(),
            })),
            None,
        );
    };

    let parsed = if key.is_subscription() {
        Mapper::parse_subscription(key.mapper_id(), tql)
    } else {
        Mapper::parse(key.mapper_id(), tql)
    };

    match parsed {
        Ok(mapper) => {
            if mapper.target_entity() != key.entity_id {
                warn!(
                    key = %pair.key,
                    target = %mapper.target_entity(),
                    "mapper target differs from its key's entity"
                );
            }
            let info = info(Ok(()));
            (info, Some((key, mapper)))
        }
        Err(source) => {
            warn!(key = %pair.key, error = %source, "mapper failed to parse");
            (
                info(Err(EnvironmentError::Tql {
                    key: pair.key.clone(),
                    source,
                })),
                None,
            )
        }
    }
}

/// Keep `env` in sync with the registry change feed.
///
/// # Errors
///
/// Returns [`NetError::Subscribe`] if the subscription fails.
pub async fn watch_registry(
    conn: &NatsConnection,
    env: Arc<Environment>,
) -> Result<JoinHandle<()>, NetError> {
    let mut sub = conn.subscribe(subjects::REGISTRY_MAPPERS).await?;
    info!(subject = subjects::REGISTRY_MAPPERS, "watching mapper registry");

    Ok(tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let update: MapperUpdate = match twin_net::decode(&msg.payload) {
                Ok(update) => update,
                Err(e) => {
                    warn!(%e, "dropping malformed registry update");
                    continue;
                }
            };
            let infos = env.apply(&update);
            let failed = infos.iter().filter(|i| i.outcome.is_err()).count();
            info!(
                puts = update.puts.len(),
                deletes = update.deletes.len(),
                failed,
                "registry update applied"
            );
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_tql::TentacleKind;

    #[test]
    fn test_key_is_split_from_the_right() {
        let key = MapperKey::parse("core.mappe.BASIC.device123.mapper-from-device234").unwrap();
        assert_eq!(key.category, "core.mappe");
        assert_eq!(key.qualifier, "BASIC");
        assert_eq!(key.entity_id, "device123");
        assert_eq!(key.name, "mapper-from-device234");
        assert_eq!(key.mapper_id(), "device123.mapper-from-device234");
    }

    #[test]
    fn test_malformed_keys() {
        for key in ["", "a.b.c", "a..c.d", "a.b.c."] {
            assert!(MapperKey::parse(key).is_err(), "{key}");
        }
    }

    #[test]
    fn test_store_mappers_reports_entity() {
        let env = Environment::new();
        let infos = env.store_mappers(&[KvPair::new(
            "core.mappe.BASIC.device123.mapper-from-device234",
            "insert into device123 select device234.temp as temp",
        )]);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].entity_id, "device123");
        assert_eq!(infos[0].outcome, Ok(()));

        let deps = env.mappers_for("device234");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].target_entity(), "device123");
        assert_eq!(env.mappers_of("device123").len(), 1);
    }

    #[test]
    fn test_bad_pairs_do_not_abort_batch() {
        let env = Environment::new();
        let infos = env.store_mappers(&[
            KvPair::new("badkey", "insert into a select b.x as x"),
            KvPair::new("core.mapper.BASIC.a.m1", "select nonsense"),
            KvPair {
                key: "core.mapper.BASIC.a.m2".to_string(),
                value: vec![0xff, 0xfe],
            },
            KvPair::new("core.mapper.BASIC.a.m3", "insert into a select b.x as x"),
        ]);
        assert_eq!(infos.len(), 4);
        assert!(matches!(infos[0].outcome, Err(EnvironmentError::InvalidKey(_))));
        assert!(matches!(infos[1].outcome, Err(EnvironmentError::Tql { .. })));
        assert!(matches!(infos[2].outcome, Err(EnvironmentError::InvalidUtf8 { .. })));
        assert_eq!(infos[3].outcome, Ok(()));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_reinsert_replaces_and_reindexes() {
        let env = Environment::new();
        env.store_mappers(&[KvPair::new("c.BASIC.a.m", "insert into a select b.x as x")]);
        env.store_mappers(&[KvPair::new("c.BASIC.a.m", "insert into a select c.y as y")]);
        assert_eq!(env.len(), 1);
        assert!(env.mappers_for("b").is_empty());
        assert_eq!(env.mappers_for("c").len(), 1);
    }

    #[test]
    fn test_subscription_qualifier() {
        let env = Environment::new();
        env.store_mappers(&[KvPair::new(
            "core.mapper.SUBSCRIPTION.sub1.watch-temp",
            "insert into sub1 select dev1.temp",
        )]);
        let mappers = env.mappers_for("dev1");
        let tentacle = &mappers[0].tentacles()[0];
        assert_eq!(tentacle.kind(), TentacleKind::Mapper);
        assert_eq!(tentacle.target_id(), "sub1.watch-temp");
    }

    #[test]
    fn test_apply_puts_then_deletes() {
        let env = Environment::new();
        env.store_mappers(&[KvPair::new("c.BASIC.a.old", "insert into a select b.x as x")]);
        let infos = env.apply(&MapperUpdate {
            puts: vec![KvPair::new("c.BASIC.a.new", "insert into a select b.y as y")],
            deletes: vec!["c.BASIC.a.old".to_string(), "garbage".to_string()],
        });
        assert_eq!(infos.len(), 1);
        let names: Vec<String> = env
            .mappers_of("a")
            .iter()
            .map(|m| m.id().to_string())
            .collect();
        assert_eq!(names, ["a.new"]);
    }

    #[test]
    fn test_remove_entity_and_keys() {
        let env = Environment::new();
        env.store_mappers(&[
            KvPair::new("c.BASIC.a.m1", "insert into a select s.x as x"),
            KvPair::new("c.BASIC.a.m2", "insert into a select s.y as y"),
            KvPair::new("c.BASIC.b.m1", "insert into b select s.z as z"),
        ]);
        assert_eq!(env.mappers_for("s").len(), 3);

        assert_eq!(env.remove_entity("a"), 2);
        assert_eq!(env.mappers_for("s").len(), 1);
        assert_eq!(
            env.remove_mappers(&["c.BASIC.b.m1".to_string(), "c.BASIC.b.nope".to_string()]),
            1
        );
        assert!(env.is_empty());
        assert!(env.mappers_for("s").is_empty());
    }
}
