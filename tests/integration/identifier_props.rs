#![allow(missing_docs)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use roadgraph::graph::Graph;
use roadgraph::storage::kinds::VertexSpec;
use roadgraph::storage::{ArchiveVersion, CommonAttributes, IdentifierIndex, IndexMode, StoreOptions};
use roadgraph::types::{ElementIndex, Identifier, Location};
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Operation {
    Create(i64),
    Remove(i64),
    Overwrite { old: i64, new: i64 },
}

fn arb_identifier() -> impl Strategy<Value = i64> {
    prop_oneof![1i64..=64, -64i64..=-1, Just(i64::MAX), Just(i64::MIN + 1)]
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => arb_identifier().prop_map(Operation::Create),
        1 => arb_identifier().prop_map(Operation::Remove),
        1 => (arb_identifier(), arb_identifier()).prop_map(|(old, new)| Operation::Overwrite { old, new }),
    ]
}

proptest! {
    #[test]
    fn index_stays_a_bijection(ops in prop::collection::vec(arb_operation(), 1..200)) {
        let mut index = IdentifierIndex::new();
        let mut model: BTreeMap<i64, u32> = BTreeMap::new();
        let mut next = 1u32;

        for op in ops {
            match op {
                Operation::Create(id) => {
                    let key = id.abs();
                    let expected = *model.entry(key).or_insert_with(|| {
                        next += 1;
                        next - 1
                    });
                    let created = index.index_for(Identifier(id), IndexMode::Create).unwrap();
                    prop_assert_eq!(created, ElementIndex(expected));
                    prop_assert_eq!(index.get(Identifier(-id)).unwrap(), created);
                }
                Operation::Remove(id) => {
                    let removed = index.remove(Identifier(id));
                    prop_assert_eq!(removed, model.remove(&id.abs()).map(ElementIndex));
                }
                Operation::Overwrite { old, new } => {
                    let Some(&slot) = model.get(&old.abs()) else {
                        prop_assert!(index.overwrite(ElementIndex(1), Identifier(old), Identifier(new)).is_err());
                        continue;
                    };
                    let clash = model.get(&new.abs()).is_some_and(|other| *other != slot);
                    let outcome = index.overwrite(ElementIndex(slot), Identifier(old), Identifier(new));
                    prop_assert_eq!(outcome.is_ok(), !clash);
                    if !clash {
                        model.remove(&old.abs());
                        model.insert(new.abs(), slot);
                    }
                }
            }
        }

        prop_assert_eq!(index.len(), model.len());
        prop_assert_eq!(index.next_index(), ElementIndex(next));
        let mut seen = std::collections::BTreeSet::new();
        for (identifier, slot) in index.iter() {
            prop_assert_eq!(model.get(&identifier.0).copied(), Some(slot.0));
            prop_assert!(seen.insert(slot), "slot {} mapped twice", slot);
        }
    }

    #[test]
    fn rebuild_matches_the_live_index(ids in prop::collection::btree_set(1i64..10_000, 1..64), holes in prop::collection::vec(any::<bool>(), 64)) {
        let mut column = vec![Identifier::NULL];
        for (position, id) in ids.iter().enumerate() {
            let removed = holes[position % holes.len()];
            column.push(if removed { Identifier::NULL } else { Identifier(*id) });
        }
        let rebuilt = IdentifierIndex::rebuild(&column);
        prop_assert_eq!(rebuilt.next_index(), ElementIndex(column.len() as u32));
        for (slot, identifier) in column.iter().enumerate().skip(1) {
            if identifier.is_valid() {
                prop_assert_eq!(rebuilt.get(*identifier).unwrap(), ElementIndex(slot as u32));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn indices_survive_save_and_open(ids in prop::collection::btree_set(1i64..1_000_000, 1..40)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.rga");
        let graph = Graph::new("ids", StoreOptions::new());
        for (n, id) in ids.iter().enumerate() {
            let location = Location::degrees(40.0 + n as f64 * 0.001, 2.0);
            prop_assert!(graph.vertices().add(VertexSpec::new(CommonAttributes::new(*id), location)));
        }
        graph.commit().unwrap();
        graph.save(&path, ArchiveVersion(1)).unwrap();

        let reopened = Graph::open(&path, StoreOptions::new()).unwrap();
        for id in &ids {
            let identifier = Identifier(*id);
            prop_assert_eq!(
                reopened.vertices().retrieve_index(identifier).unwrap(),
                graph.vertices().retrieve_index(identifier).unwrap()
            );
        }
        prop_assert!(reopened.vertices().validator().unwrap().is_consistent());
    }
}
