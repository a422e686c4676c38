// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};

use common::{file, node, shapes_indexer, REPO};
use modelgraph_core::constants::{EDGE_KIND_OF, EDGE_TYPE_OF, LABEL_INSTANCE};
use modelgraph_core::{
    GraphStore, IndexerConfig, MemoryStore, ModelIndexer, PackageDef, PropertyValue, Scalar,
    TypeRef,
};
use modelgraph_dry_tests::{
    assert_file_membership, assert_type_edges, init_test_tracing, instance_count, shapes,
    FixtureElement, PackageBuilder, TypeBuilder,
};

// Override with PROPTEST_SEED to explore other cases locally.
const SEED_BYTES: [u8; 32] = [
    0x42, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0,
];

const PKG: &str = "urn:generated";

fn runner(cases: u32) -> TestRunner {
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    TestRunner::new_with_rng(
        PropConfig {
            cases,
            ..PropConfig::default()
        },
        rng,
    )
}

/// Supertypes of every type: type `i` may extend any `j < i`, so the
/// hierarchy is acyclic.
fn direct_supertypes(bits: &[Vec<bool>]) -> Vec<Vec<usize>> {
    bits.iter()
        .enumerate()
        .map(|(i, row)| (0..i).filter(|&j| row[j]).collect())
        .collect()
}

fn closure(direct: &[Vec<usize>], of: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack = direct[of].clone();
    while let Some(t) = stack.pop() {
        if seen.insert(t) {
            stack.extend(direct[t].iter().copied());
        }
    }
    seen
}

fn type_name(i: usize) -> String {
    format!("T{i}")
}

#[test]
fn kind_of_edges_match_the_supertype_closure() {
    let hierarchy = (2usize..7).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(any::<bool>(), n), n)
    });

    runner(48)
        .run(&hierarchy, |bits| {
            init_test_tracing();
            let direct = direct_supertypes(&bits);
            let mut builder = PackageBuilder::new(PKG);
            for (i, sups) in direct.iter().enumerate() {
                let mut ty = TypeBuilder::new(type_name(i)).attribute(&format!("a{i}"), "EInt");
                for &j in sups {
                    ty = ty.extends(TypeRef::new(PKG, type_name(j)));
                }
                builder = builder.with(ty);
            }

            let mut indexer = ModelIndexer::new(MemoryStore::new(), IndexerConfig::default());
            let report = indexer.register_packages(&[builder.build()]).unwrap();
            prop_assert!(report.is_complete());

            let elements: Vec<_> = (0..direct.len())
                .map(|i| FixtureElement::new(TypeRef::new(PKG, type_name(i)), format!("e{i}")))
                .collect();
            let stats = indexer.insert_file(&file("f"), &elements).unwrap();
            prop_assert_eq!(stats.inserted, direct.len());

            let store = indexer.store();
            for i in 0..direct.len() {
                let instance = node(&indexer, "f", &format!("e{i}"));
                let expected: BTreeSet<_> = closure(&direct, i)
                    .into_iter()
                    .map(|j| indexer.type_node(&TypeRef::new(PKG, type_name(j))).unwrap())
                    .collect();
                let actual: BTreeSet<_> = store
                    .outgoing(instance, Some(EDGE_KIND_OF))
                    .into_iter()
                    .map(|e| e.to)
                    .collect();
                prop_assert_eq!(actual, expected);
                let type_of = store.outgoing(instance, Some(EDGE_TYPE_OF));
                prop_assert_eq!(type_of.len(), 1);
                prop_assert_eq!(
                    Some(type_of[0].to),
                    indexer.type_node(&TypeRef::new(PKG, type_name(i)))
                );
            }
            assert_type_edges(store);
            assert_file_membership(store);
            Ok(())
        })
        .unwrap();
}

/// Type `i` of `n` lives in package `i * k / n`. Supertypes only point at
/// lower indices, so the packages depend on each other without cycles.
fn package_of(i: usize, n: usize, k: usize) -> usize {
    i * k / n
}

fn package_uri(p: usize) -> String {
    format!("urn:layer:{p}")
}

fn int(i: usize) -> i64 {
    i64::try_from(i).unwrap()
}

#[test]
fn hierarchies_spanning_packages_close_and_cascade_in_order() {
    let scenario = (2usize..8, 1usize..4).prop_flat_map(|(n, k)| {
        let k = k.min(n);
        let bits = prop::collection::vec(prop::collection::vec(any::<bool>(), n), n);
        let order = Just((0..k).collect::<Vec<_>>()).prop_shuffle();
        (Just(k), bits, order, 0..k)
    });

    runner(48)
        .run(&scenario, |(k, bits, order, victim)| {
            init_test_tracing();
            let n = bits.len();
            let direct = direct_supertypes(&bits);
            let type_ref = |i: usize| TypeRef::new(package_uri(package_of(i, n, k)), type_name(i));

            let mut builders: Vec<_> = (0..k).map(|p| PackageBuilder::new(package_uri(p))).collect();
            for (i, sups) in direct.iter().enumerate() {
                let mut ty = TypeBuilder::new(type_name(i)).attribute(&format!("a{i}"), "EInt");
                for &j in sups {
                    ty = ty.extends(type_ref(j));
                }
                let p = package_of(i, n, k);
                builders[p] = builders[p].clone().with(ty);
            }
            // Dependents may come before their dependencies in the batch.
            let packages: Vec<PackageDef> =
                order.iter().map(|&p| builders[p].clone().build()).collect();
            let mut indexer = ModelIndexer::new(MemoryStore::new(), IndexerConfig::default());
            let report = indexer.register_packages(&packages).unwrap();
            prop_assert!(report.is_complete());

            let lineage = |i: usize| closure(&direct, i).into_iter().chain([i]);
            let elements: Vec<_> = (0..n)
                .map(|i| {
                    lineage(i).fold(FixtureElement::new(type_ref(i), format!("e{i}")), |e, j| {
                        e.attr(&format!("a{j}"), Scalar::Int(int(j)))
                    })
                })
                .collect();
            indexer.insert_file(&file("f"), &elements).unwrap();

            for i in 0..n {
                let instance = node(&indexer, "f", &format!("e{i}"));
                let expected: BTreeSet<_> = closure(&direct, i)
                    .into_iter()
                    .map(|j| indexer.type_node(&type_ref(j)).unwrap())
                    .collect();
                let actual: BTreeSet<_> = indexer
                    .store()
                    .outgoing(instance, Some(EDGE_KIND_OF))
                    .into_iter()
                    .map(|e| e.to)
                    .collect();
                prop_assert_eq!(actual, expected);
                for j in lineage(i) {
                    prop_assert_eq!(
                        indexer.store().property(instance, &format!("a{j}")),
                        Some(PropertyValue::Int(int(j)))
                    );
                }
            }
            assert_type_edges(indexer.store());

            // Package q depends on p when a type of q has a supertype in p.
            let depends = |q: usize, p: usize| {
                q != p
                    && (0..n).any(|i| {
                        package_of(i, n, k) == q
                            && closure(&direct, i).iter().any(|&j| package_of(j, n, k) == p)
                    })
            };
            let mut doomed = BTreeSet::from([victim]);
            loop {
                let grown: Vec<usize> = (0..k)
                    .filter(|&q| !doomed.contains(&q) && doomed.iter().any(|&p| depends(q, p)))
                    .collect();
                if grown.is_empty() {
                    break;
                }
                doomed.extend(grown);
            }

            let report = indexer.unregister_packages(&[package_uri(victim)]).unwrap();
            let deleted: Vec<usize> = report
                .packages
                .iter()
                .map(|uri| uri.rsplit(':').next().unwrap().parse().unwrap())
                .collect();
            prop_assert_eq!(deleted.iter().copied().collect::<BTreeSet<_>>(), doomed.clone());
            for (at, &q) in deleted.iter().enumerate() {
                for &p in &deleted[at + 1..] {
                    prop_assert!(!depends(p, q), "package {} deleted before its dependent {}", q, p);
                }
            }
            let survivors = (0..n).filter(|&i| !doomed.contains(&package_of(i, n, k))).count();
            prop_assert_eq!(instance_count(indexer.store()), survivors);
            assert_type_edges(indexer.store());
            assert_file_membership(indexer.store());
            Ok(())
        })
        .unwrap();
}

/// File `i` holds circle `c` and link `l` pointing at the circle of file
/// `targets[i]`.
fn linked_files(targets: &[usize]) -> Vec<(String, Vec<FixtureElement>)> {
    targets
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let target = format!("p{t}#c");
            let elements = vec![
                FixtureElement::new(shapes("Circle"), "c").attr("radius", Scalar::Real(1.0)),
                FixtureElement::new(shapes("Link"), "l").reference("target", &[target.as_str()]),
            ];
            (format!("p{i}"), elements)
        })
        .collect()
}

#[test]
fn cross_file_references_resolve_in_any_insertion_order() {
    let scenario = (2usize..6)
        .prop_flat_map(|n| {
            let targets = prop::collection::vec(0..n - 1, n).prop_map(|raw| {
                // Shift so no file points at itself.
                raw.into_iter()
                    .enumerate()
                    .map(|(i, t)| if t >= i { t + 1 } else { t })
                    .collect::<Vec<_>>()
            });
            let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
            (targets, order)
        });

    runner(64)
        .run(&scenario, |(targets, order)| {
            let mut indexer = shapes_indexer();
            let files = linked_files(&targets);
            for &i in &order {
                let (path, elements) = &files[i];
                indexer.insert_file(&file(path), elements).unwrap();
            }
            prop_assert_eq!(indexer.unresolved_proxy_count(), 0);
            for (i, &t) in targets.iter().enumerate() {
                let link = node(&indexer, &format!("p{i}"), "l");
                let circle = node(&indexer, &format!("p{t}"), "c");
                let edges = indexer.store().outgoing(link, Some("target"));
                prop_assert_eq!(edges.len(), 1);
                prop_assert_eq!(edges[0].to, circle);
            }

            // Deleting in insertion order empties every file again.
            for &i in &order {
                indexer.delete_file(REPO, &files[i].0).unwrap();
            }
            prop_assert_eq!(indexer.store().nodes_with_label(LABEL_INSTANCE).len(), 0);
            Ok(())
        })
        .unwrap();
}
