//! The authoritative world/object/attribute store.
//!
//! Entries live in an append-only arena and are addressed by stable
//! [`EntryId`]s, so sessions can hold bindings across lock windows without
//! raw pointers. Per-world simulated time is itself an arity-1 entry, which
//! makes the time slot bind like any other value.
//!
//! Efforts (force, torque) aggregate across producers: each producing
//! session gets its own contributor row keyed by socket address, and the
//! shared object value is recomputed as the component-wise sum over all
//! rows on every broadcast.

use std::collections::BTreeMap;

use crate::attribute::Attribute;
use crate::error::CoreError;

/// Stable index of an attribute entry in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

/// One attribute's storage: the current value vector and whether any
/// producer has written it yet.
#[derive(Debug)]
pub struct AttributeEntry {
    pub values: Vec<f64>,
    pub written: bool,
}

/// How a produced attribute was bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerBinding {
    /// First declaration: the entry was created with default values.
    Created(EntryId),
    /// Effort kind: the session writes its own contributor row.
    Effort(EntryId),
    /// The entry already existed: the client resumes and supplies current
    /// values up-front, so the entry counts as written.
    Resumed(EntryId),
}

impl ProducerBinding {
    pub fn entry(&self) -> EntryId {
        match self {
            ProducerBinding::Created(id)
            | ProducerBinding::Effort(id)
            | ProducerBinding::Resumed(id) => *id,
        }
    }
}

#[derive(Debug)]
struct World {
    time: EntryId,
    objects: BTreeMap<String, BTreeMap<Attribute, EntryId>>,
    /// object → socket address → effort kind → contributor row
    efforts: BTreeMap<String, BTreeMap<String, BTreeMap<Attribute, EntryId>>>,
}

/// Process-wide directory of worlds. All access goes through one mutex held
/// by the hub; hold windows stay short and never overlap transport I/O.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<AttributeEntry>,
    worlds: BTreeMap<String, World>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    fn alloc(&mut self, values: Vec<f64>) -> EntryId {
        let id = EntryId(self.entries.len());
        self.entries.push(AttributeEntry { values, written: false });
        id
    }

    fn ensure_world(&mut self, world: &str) -> &mut World {
        if !self.worlds.contains_key(world) {
            let time = self.alloc(vec![0.0]);
            self.worlds.insert(
                world.to_string(),
                World { time, objects: BTreeMap::new(), efforts: BTreeMap::new() },
            );
        }
        self.worlds.get_mut(world).expect("world just ensured")
    }

    /// The entry holding this world's simulated time, creating the world on
    /// first reference.
    pub fn time_entry(&mut self, world: &str) -> EntryId {
        self.ensure_world(world).time
    }

    /// Current simulated time of a world in SI seconds.
    pub fn world_time(&mut self, world: &str) -> f64 {
        let time = self.time_entry(world);
        self.entries[time.0].values[0]
    }

    pub fn entry(&self, id: EntryId) -> &AttributeEntry {
        &self.entries[id.0]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut AttributeEntry {
        &mut self.entries[id.0]
    }

    pub fn lookup(&self, world: &str, object: &str, attribute: Attribute) -> Option<EntryId> {
        self.worlds
            .get(world)?
            .objects
            .get(object)?
            .get(&attribute)
            .copied()
    }

    /// Whether the attribute exists and has been written by some producer.
    pub fn is_written(&self, world: &str, object: &str, attribute: Attribute) -> bool {
        self.lookup(world, object, attribute)
            .map(|id| self.entries[id.0].written)
            .unwrap_or(false)
    }

    pub fn mark_written(&mut self, world: &str, object: &str, attribute: Attribute) {
        if let Some(id) = self.lookup(world, object, attribute) {
            self.entries[id.0].written = true;
        }
    }

    /// Binds one produced attribute for a session.
    ///
    /// Efforts always bind a per-socket contributor row (reset to zero on
    /// re-declaration) with the shared object value created alongside for
    /// consumers. Other attributes are created on first declaration or
    /// resumed with their current values.
    pub fn bind_producer(
        &mut self,
        world: &str,
        object: &str,
        attribute: Attribute,
        socket: &str,
    ) -> ProducerBinding {
        if attribute.is_effort() {
            if self.lookup(world, object, attribute).is_none() {
                let id = self.alloc(attribute.default_values());
                self.ensure_world(world)
                    .objects
                    .entry(object.to_string())
                    .or_default()
                    .insert(attribute, id);
            }
            let existing = self
                .worlds
                .get(world)
                .and_then(|w| w.efforts.get(object))
                .and_then(|sockets| sockets.get(socket))
                .and_then(|kinds| kinds.get(&attribute))
                .copied();
            let row = match existing {
                Some(id) => {
                    self.entries[id.0].values = attribute.default_values();
                    id
                }
                None => {
                    let id = self.alloc(attribute.default_values());
                    self.ensure_world(world)
                        .efforts
                        .entry(object.to_string())
                        .or_default()
                        .entry(socket.to_string())
                        .or_default()
                        .insert(attribute, id);
                    id
                }
            };
            ProducerBinding::Effort(row)
        } else {
            match self.lookup(world, object, attribute) {
                None => {
                    let id = self.alloc(attribute.default_values());
                    self.ensure_world(world)
                        .objects
                        .entry(object.to_string())
                        .or_default()
                        .insert(attribute, id);
                    ProducerBinding::Created(id)
                }
                Some(id) => {
                    self.entries[id.0].written = true;
                    ProducerBinding::Resumed(id)
                }
            }
        }
    }

    /// Recomputes the shared value of an effort attribute as the
    /// component-wise sum over every contributor row, folding each row's
    /// 3-element groups together first. Rows are left untouched.
    pub fn aggregate_efforts(&mut self, world: &str, object: &str, attribute: Attribute) {
        let Some(w) = self.worlds.get(world) else { return };
        let Some(shared) = w.objects.get(object).and_then(|m| m.get(&attribute)).copied() else {
            return;
        };
        let rows: Vec<EntryId> = w
            .efforts
            .get(object)
            .map(|sockets| {
                sockets
                    .values()
                    .filter_map(|kinds| kinds.get(&attribute))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        if rows.is_empty() {
            return;
        }

        let mut sums = [0.0; 3];
        for row in rows {
            let values = &self.entries[row.0].values;
            for (axis, sum) in sums.iter_mut().enumerate() {
                let mut group = axis;
                while group < values.len() {
                    *sum += values[group];
                    group += 3;
                }
            }
        }
        let shared_values = &mut self.entries[shared.0].values;
        shared_values[..3].copy_from_slice(&sums);
    }

    /// Whether the attribute is eligible for broadcast expansion: efforts
    /// only qualify once dimensioned past a single contributor group.
    fn broadcastable(&self, attribute: Attribute, id: EntryId) -> bool {
        !attribute.is_effort() || self.entries[id.0].values.len() > 3
    }

    /// Expands a requested receive map against the current world contents,
    /// resolving the three sentinel forms of the protocol:
    ///
    /// - `{"": [""]}` — every broadcastable attribute of every object;
    /// - `{"obj": [""]}` — every broadcastable attribute of `obj`;
    /// - `{"": ["attr"]}` — `attr` on every object declaring it, after which
    ///   remaining request keys are left as sent.
    pub fn expand_receive(
        &self,
        world: &str,
        requested: &BTreeMap<String, Vec<String>>,
    ) -> Result<BTreeMap<String, Vec<Attribute>>, CoreError> {
        let empty = BTreeMap::new();
        let objects = self.worlds.get(world).map(|w| &w.objects).unwrap_or(&empty);

        if requested.get("").is_some_and(|names| names.iter().any(|n| n.is_empty())) {
            let mut expanded = BTreeMap::new();
            for (object, attributes) in objects {
                let mut names: Vec<Attribute> = attributes
                    .iter()
                    .filter(|(attribute, id)| self.broadcastable(**attribute, **id))
                    .map(|(attribute, _)| *attribute)
                    .collect();
                names.sort_by_key(|a| a.name());
                if !names.is_empty() {
                    expanded.insert(object.clone(), names);
                }
            }
            return Ok(expanded);
        }

        let mut expanded: BTreeMap<String, Vec<Attribute>> = BTreeMap::new();
        for (object, names) in requested {
            if object.is_empty() {
                continue;
            }
            let mut attributes = Vec::with_capacity(names.len());
            for name in names {
                if name.is_empty() {
                    continue;
                }
                attributes.push(
                    Attribute::from_name(name)
                        .ok_or_else(|| CoreError::UnknownAttribute(name.clone()))?,
                );
            }
            expanded.insert(object.clone(), attributes);
        }

        for (object, names) in requested {
            if object.is_empty() {
                // Attribute-on-every-object sentinel; stop afterwards.
                for name in names {
                    let attribute = Attribute::from_name(name)
                        .ok_or_else(|| CoreError::UnknownAttribute(name.clone()))?;
                    for (candidate, attributes) in objects {
                        if let Some(id) = attributes.get(&attribute) {
                            if self.broadcastable(attribute, *id) {
                                let entry = expanded.entry(candidate.clone()).or_default();
                                if !entry.contains(&attribute) {
                                    entry.push(attribute);
                                }
                            }
                        }
                    }
                }
                break;
            }
            if names.iter().any(|n| n.is_empty()) {
                // Every-attribute-of-object sentinel replaces the list.
                let mut all: Vec<Attribute> = objects
                    .get(object)
                    .map(|attributes| {
                        attributes
                            .iter()
                            .filter(|(attribute, id)| self.broadcastable(**attribute, **id))
                            .map(|(attribute, _)| *attribute)
                            .collect()
                    })
                    .unwrap_or_default();
                all.sort_by_key(|a| a.name());
                expanded.insert(object.clone(), all);
            }
        }

        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worlds_created_on_first_reference() {
        let mut registry = Registry::new();
        assert_eq!(registry.world_time("w"), 0.0);
        let time = registry.time_entry("w");
        registry.entry_mut(time).values[0] = 2.5;
        assert_eq!(registry.world_time("w"), 2.5);
    }

    #[test]
    fn test_bind_producer_creates_with_defaults() {
        let mut registry = Registry::new();
        let binding = registry.bind_producer("w", "box", Attribute::Position, "tcp://*:7001");
        let ProducerBinding::Created(id) = binding else {
            panic!("expected fresh entry, got {binding:?}");
        };
        assert_eq!(registry.entry(id).values.len(), 3);
        assert!(registry.entry(id).values.iter().all(|v| v.is_nan()));
        assert!(!registry.entry(id).written);
        assert_eq!(registry.lookup("w", "box", Attribute::Position), Some(id));
    }

    #[test]
    fn test_bind_producer_resumes_existing() {
        let mut registry = Registry::new();
        let first = registry.bind_producer("w", "box", Attribute::Position, "tcp://*:7001");
        registry.entry_mut(first.entry()).values[0] = 1.0;

        let second = registry.bind_producer("w", "box", Attribute::Position, "tcp://*:7002");
        assert_eq!(second, ProducerBinding::Resumed(first.entry()));
        assert!(registry.entry(first.entry()).written);
        assert_eq!(registry.entry(first.entry()).values[0], 1.0);
    }

    #[test]
    fn test_effort_producers_get_own_rows() {
        let mut registry = Registry::new();
        let p1 = registry.bind_producer("w", "box", Attribute::Force, "tcp://*:7001");
        let p2 = registry.bind_producer("w", "box", Attribute::Force, "tcp://*:7002");
        assert!(matches!(p1, ProducerBinding::Effort(_)));
        assert!(matches!(p2, ProducerBinding::Effort(_)));
        assert_ne!(p1.entry(), p2.entry());

        let shared = registry.lookup("w", "box", Attribute::Force).unwrap();
        assert_ne!(shared, p1.entry());
        assert_ne!(shared, p2.entry());
    }

    #[test]
    fn test_effort_redeclaration_resets_row() {
        let mut registry = Registry::new();
        let row = registry.bind_producer("w", "box", Attribute::Torque, "tcp://*:7001").entry();
        registry.entry_mut(row).values.copy_from_slice(&[1.0, 2.0, 3.0]);

        let again = registry.bind_producer("w", "box", Attribute::Torque, "tcp://*:7001").entry();
        assert_eq!(again, row);
        assert_eq!(registry.entry(row).values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_aggregate_sums_across_contributors() {
        let mut registry = Registry::new();
        let p1 = registry.bind_producer("w", "box", Attribute::Force, "tcp://*:7001").entry();
        let p2 = registry.bind_producer("w", "box", Attribute::Force, "tcp://*:7002").entry();
        registry.entry_mut(p1).values.copy_from_slice(&[1.0, 2.0, 3.0]);
        registry.entry_mut(p2).values.copy_from_slice(&[4.0, 5.0, 6.0]);

        registry.aggregate_efforts("w", "box", Attribute::Force);
        let shared = registry.lookup("w", "box", Attribute::Force).unwrap();
        assert_eq!(registry.entry(shared).values, vec![5.0, 7.0, 9.0]);

        // Aggregation is idempotent: rows are inputs, not accumulators.
        registry.aggregate_efforts("w", "box", Attribute::Force);
        assert_eq!(registry.entry(shared).values, vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_aggregate_folds_row_groups() {
        let mut registry = Registry::new();
        let row = registry.bind_producer("w", "box", Attribute::Force, "tcp://*:7001").entry();
        registry.entry_mut(row).values = vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0];

        registry.aggregate_efforts("w", "box", Attribute::Force);
        let shared = registry.lookup("w", "box", Attribute::Force).unwrap();
        assert_eq!(registry.entry(shared).values, vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_expand_receive_all_sentinel_skips_efforts() {
        let mut registry = Registry::new();
        registry.bind_producer("w", "box", Attribute::Position, "tcp://*:7001");
        registry.bind_producer("w", "box", Attribute::Quaternion, "tcp://*:7001");
        registry.bind_producer("w", "box", Attribute::Force, "tcp://*:7001");

        let mut requested = BTreeMap::new();
        requested.insert(String::new(), vec![String::new()]);
        let expanded = registry.expand_receive("w", &requested).unwrap();

        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded["box"], vec![Attribute::Position, Attribute::Quaternion]);
    }

    #[test]
    fn test_expand_receive_object_sentinel() {
        let mut registry = Registry::new();
        registry.bind_producer("w", "box", Attribute::Position, "tcp://*:7001");
        registry.bind_producer("w", "lid", Attribute::JointRvalue, "tcp://*:7001");

        let mut requested = BTreeMap::new();
        requested.insert("box".to_string(), vec![String::new()]);
        requested.insert("lid".to_string(), vec!["joint_rvalue".to_string()]);
        let expanded = registry.expand_receive("w", &requested).unwrap();

        assert_eq!(expanded["box"], vec![Attribute::Position]);
        assert_eq!(expanded["lid"], vec![Attribute::JointRvalue]);
    }

    #[test]
    fn test_expand_receive_attribute_sentinel() {
        let mut registry = Registry::new();
        registry.bind_producer("w", "box", Attribute::Position, "tcp://*:7001");
        registry.bind_producer("w", "lid", Attribute::Position, "tcp://*:7001");
        registry.bind_producer("w", "lid", Attribute::Quaternion, "tcp://*:7001");

        let mut requested = BTreeMap::new();
        requested.insert(String::new(), vec!["position".to_string()]);
        let expanded = registry.expand_receive("w", &requested).unwrap();

        assert_eq!(expanded["box"], vec![Attribute::Position]);
        assert_eq!(expanded["lid"], vec![Attribute::Position]);
        assert!(!expanded.contains_key(""));
    }

    #[test]
    fn test_expand_receive_unknown_attribute() {
        let registry = Registry::new();
        let mut requested = BTreeMap::new();
        requested.insert("box".to_string(), vec!["tractor_beam".to_string()]);
        assert_eq!(
            registry.expand_receive("w", &requested),
            Err(CoreError::UnknownAttribute("tractor_beam".into()))
        );
    }
}
