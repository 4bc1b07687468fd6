use crate::access::{AccessSequence, FileSet, FileSpec, PartId, RawAccess};
use crate::config::{PolicyConfig, SimulationConfig};
use crate::error::SimError;
use crate::policies::build_policy;
use crate::reuse::FullReuseIndex;
use crate::selection_tree::WeightedSelectionTree;
use crate::simulator::Simulator;
use crate::state::StateProcessor;
use crate::stats::{StatsCollector, StatsSnapshot, Thresholds};
use crate::units::{parse_byte_size, BytesSize, KIB, MIB};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;

fn file_set(sizes: &[BytesSize], part_size: BytesSize) -> FileSet {
    FileSet::new(
        sizes
            .iter()
            .enumerate()
            .map(|(ind, &size)| FileSpec {
                name: format!("f{ind}"),
                size,
            })
            .collect(),
        part_size,
    )
}

/// Whole-file accesses in the given file order, one second apart
fn sequence(sizes: &[BytesSize], order: &[usize], part_size: BytesSize) -> AccessSequence {
    let files = file_set(sizes, part_size);
    let raw = order
        .iter()
        .enumerate()
        .map(|(ts, &file)| RawAccess {
            file: format!("f{file}"),
            offset: 0,
            size: sizes[file],
            ts: ts as u64,
            origin: None,
        })
        .collect();
    AccessSequence::from_raw(files, raw, part_size).unwrap()
}

fn policy_config(raw: serde_json::Value) -> PolicyConfig {
    serde_json::from_value(raw).unwrap()
}

fn run_to_completion(
    config: &PolicyConfig,
    capacity: BytesSize,
    sequence: &AccessSequence,
) -> StatsSnapshot {
    let reuse = config
        .requires_reuse_index()
        .then(|| Arc::new(FullReuseIndex::build(sequence)));
    let policy = build_policy(config, capacity, reuse, 7).unwrap();
    let mut processor = StateProcessor::new(capacity, policy, StatsCollector::new(None, None));
    processor.run(sequence).unwrap();
    assert!(processor.state().resident_bytes() <= capacity);
    *processor.stats()
}

fn all_policy_configs() -> Vec<PolicyConfig> {
    [
        serde_json::json!({"kind": "lru"}),
        serde_json::json!({"kind": "lru_bit"}),
        serde_json::json!({"kind": "arc"}),
        serde_json::json!({"kind": "arc_bit", "ghost_factor": 0.5}),
        serde_json::json!({"kind": "prp"}),
        serde_json::json!({"kind": "prp_bit", "weighting": "size"}),
        serde_json::json!({"kind": "lrfu", "lambda": 1e-4}),
        serde_json::json!({"kind": "lrfu", "mode": "sampled"}),
        serde_json::json!({"kind": "eva", "age_bin_width": 2, "computation_interval": 8}),
        serde_json::json!({"kind": "eva_bit", "computation_interval": 8}),
        serde_json::json!({"kind": "min"}),
        serde_json::json!({"kind": "rand", "weighting": "inverse_size"}),
    ]
    .into_iter()
    .map(policy_config)
    .collect()
}

#[test]
fn byte_size_notation() {
    assert_eq!(parse_byte_size("123").unwrap(), 123);
    assert_eq!(parse_byte_size("7B").unwrap(), 7);
    assert_eq!(parse_byte_size("4 KiB").unwrap(), 4 * KIB);
    assert_eq!(parse_byte_size("16GiB").unwrap(), 16 << 30);
    assert!(parse_byte_size("12XB").is_err());
    assert!(parse_byte_size("-5").is_err());
    assert!(parse_byte_size("18446744073709551615KiB").is_err());
}

#[test]
fn access_normalization_splits_on_part_boundaries() {
    // 10-byte file, 4-byte parts: sizes 4, 4, 2
    let files = file_set(&[10], 4);
    let raw = vec![
        RawAccess {
            file: "f0".to_string(),
            offset: 3,
            size: 2,
            ts: 0,
            origin: Some("node-7".to_string()),
        },
        RawAccess {
            file: "f0".to_string(),
            offset: 8,
            size: 2,
            ts: 1,
            origin: None,
        },
    ];
    let seq = AccessSequence::from_raw(files, raw, 4).unwrap();

    let spanning = seq.get(0);
    assert_eq!(spanning.origin.as_deref(), Some("node-7"));
    assert_eq!(spanning.parts.len(), 2);
    assert_eq!(spanning.parts[0].index, 0);
    assert_eq!(spanning.parts[0].size, 4);
    assert_eq!(spanning.parts[1].index, 1);
    assert_eq!(spanning.parts[1].size, 4);

    let tail = seq.get(1);
    assert_eq!(tail.parts.len(), 1);
    assert_eq!(tail.parts[0].index, 2);
    assert_eq!(tail.parts[0].size, 2);

    assert_eq!(seq.summary().total_parts, 3);
    assert_eq!(seq.summary().max_parts_per_access, 2);
}

#[test]
fn malformed_accesses_are_rejected() {
    let make = |offset, size, file: &str| {
        AccessSequence::from_raw(
            file_set(&[4], 4),
            vec![RawAccess {
                file: file.to_string(),
                offset,
                size,
                ts: 0,
                origin: None,
            }],
            4,
        )
    };

    assert!(matches!(
        make(0, 0, "f0"),
        Err(SimError::MalformedAccess { access_ind: 0, .. })
    ));
    assert!(matches!(
        make(2, 4, "f0"),
        Err(SimError::MalformedAccess { .. })
    ));
    assert!(matches!(
        make(0, 4, "nope"),
        Err(SimError::UnknownFile { .. })
    ));
}

#[test]
fn reuse_index_links_touches_of_the_same_part() {
    // f0 at flat positions 0, 2, 4
    let seq = sequence(&[4, 4, 4], &[0, 1, 0, 2, 0], 4);
    let index = FullReuseIndex::build(&seq);

    assert_eq!(index.len(), 5);
    assert_eq!(index.next_use_ind(0), Some(2));
    assert_eq!(index.next_use_ind(2), Some(4));
    assert_eq!(index.next_use_ind(4), None);
    assert_eq!(index.next_use_ind(1), None);
    assert_eq!(index.prev_use_ind(0), None);
    assert_eq!(index.prev_use_ind(4), Some(2));
    // Sentinel form orders "never again" after every real position
    assert_eq!(index.next_use_ind_len(4), 5);
    assert_eq!(index.parts_range(3), 3..4);
    assert_eq!(index.part(3), PartId { file: 2, index: 0 });
}

#[test]
fn reuse_index_matches_a_naive_scan() {
    let sizes = [4, 4, 4, 4];
    let order = [0, 1, 2, 0, 3, 1, 0, 2, 2, 3, 1, 0];
    let seq = sequence(&sizes, &order, 4);
    let index = FullReuseIndex::build(&seq);

    let parts: Vec<PartId> = seq
        .iter()
        .flat_map(|access| (0..access.parts.len()).map(|slot| access.part_id(slot)))
        .collect();
    for ind in 0..parts.len() {
        let naive_next = (ind + 1..parts.len()).find(|&later| parts[later] == parts[ind]);
        let naive_prev = (0..ind).rev().find(|&earlier| parts[earlier] == parts[ind]);
        assert_eq!(index.next_use_ind(ind), naive_next, "next at {ind}");
        assert_eq!(index.prev_use_ind(ind), naive_prev, "prev at {ind}");
    }
}

#[test]
fn sequence_iteration_is_restartable() {
    let seq = sequence(&[10, 8, 4], &[0, 1, 2, 0, 2], 4);
    let first: Vec<_> = seq.iter().map(|a| (a.ts, a.file, a.parts.clone())).collect();
    let second: Vec<_> = seq.iter().map(|a| (a.ts, a.file, a.parts.clone())).collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), seq.len());
}

#[test]
fn selection_tree_sums_stay_consistent() {
    let mut tree: WeightedSelectionTree<u32> = WeightedSelectionTree::new();
    // Past 4 items the leaf level has to double
    for item in 0..10u32 {
        tree.insert(item, (item + 1) as f64);
        assert!(tree.check_sums());
    }
    assert_eq!(tree.len(), 10);
    assert!((tree.total_weight() - 55.0).abs() < 1e-9);

    assert!(tree.update_weight(&3, 10.0));
    assert!(!tree.update_weight(&99, 1.0));
    assert_eq!(tree.remove(&9), Some(10.0));
    assert_eq!(tree.remove(&9), None);
    assert!(tree.check_sums());
    assert!((tree.total_weight() - 51.0).abs() < 1e-9);

    // Freed slot gets recycled
    tree.insert(40, 2.0);
    assert!(tree.check_sums());
    assert_eq!(tree.len(), 10);
}

#[test]
fn selection_tree_sampling_follows_weights() {
    let mut tree: WeightedSelectionTree<char> = WeightedSelectionTree::new();
    tree.insert('a', 1.0);
    tree.insert('b', 3.0);
    let mut rng = StdRng::seed_from_u64(17);

    let mut counts: HashMap<char, u32> = HashMap::new();
    for _ in 0..10_000 {
        *counts.entry(*tree.sample(&mut rng).unwrap()).or_default() += 1;
    }
    let b = counts[&'b'];
    assert!((7100..=7900).contains(&b), "b sampled {b} times");
}

#[test]
fn sampling_an_empty_tree_fails() {
    let tree: WeightedSelectionTree<u32> = WeightedSelectionTree::new();
    let mut rng = StdRng::seed_from_u64(0);
    assert_eq!(tree.sample(&mut rng).err(), Some(SimError::EmptyOrZeroWeight));

    let mut zeroed: WeightedSelectionTree<u32> = WeightedSelectionTree::new();
    zeroed.insert(1, 0.0);
    assert_eq!(
        zeroed.sample(&mut rng).err(),
        Some(SimError::EmptyOrZeroWeight)
    );
}

#[test]
fn lru_evicts_the_coldest_part() {
    let sizes = [4, 4, 4];
    let lru = policy_config(serde_json::json!({"kind": "lru"}));

    // Two-part cache: A is gone by the time it comes back
    let stats = run_to_completion(&lru, 8, &sequence(&sizes, &[0, 1, 2, 0], 4));
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 4);

    // Three-part cache: everything fits
    let stats = run_to_completion(&lru, 12, &sequence(&sizes, &[0, 1, 2, 0], 4));
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
}

#[test]
fn lrfu_with_zero_lambda_degenerates_to_lfu() {
    let lrfu = policy_config(serde_json::json!({"kind": "lrfu", "lambda": 0.0}));
    // A is touched three times before B and C fight over the second slot
    let stats = run_to_completion(&lrfu, 8, &sequence(&[4, 4, 4], &[0, 0, 0, 1, 2, 0], 4));
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.hits, 3);
}

#[test]
fn arc_readmits_ghost_hits_into_the_frequent_list() {
    let arc = policy_config(serde_json::json!({"kind": "arc"}));
    // A is evicted at C, comes back through the B1 ghost list, then hits in T2
    let stats = run_to_completion(&arc, 8, &sequence(&[4, 4, 4], &[0, 1, 2, 0, 0], 4));
    assert_eq!(stats.misses, 4);
    assert_eq!(stats.hits, 1);
}

#[test]
fn min_is_at_least_as_good_as_every_online_policy() {
    let sizes = [4, 4, 4, 4, 4, 4];
    let order = [0, 1, 2, 3, 0, 1, 2, 4, 0, 1, 5, 2, 0, 3, 1, 0, 2, 1];
    let seq = sequence(&sizes, &order, 4);

    let min = policy_config(serde_json::json!({"kind": "min"}));
    let min_misses = run_to_completion(&min, 12, &seq).misses;

    for config in all_policy_configs() {
        let misses = run_to_completion(&config, 12, &seq).misses;
        assert!(
            min_misses <= misses,
            "min had {min_misses} misses, {} had {misses}",
            config.kind_name()
        );
    }
}

#[test]
fn every_policy_accounts_every_part_touch() {
    let sizes = [10, 8, 4, 6, 12];
    let order = [0, 1, 2, 3, 4, 0, 2, 4, 1, 3, 0, 4, 2, 0, 1];
    let seq = sequence(&sizes, &order, 4);
    let total_parts = seq.summary().total_parts as u64;
    let total_bytes: BytesSize = order.iter().map(|&f| sizes[f]).sum();

    for config in all_policy_configs() {
        let stats = run_to_completion(&config, 16, &seq);
        assert_eq!(
            stats.hits + stats.misses,
            total_parts,
            "{} dropped a part touch",
            config.kind_name()
        );
        assert_eq!(stats.bytes_seen, total_bytes);
        assert_eq!(stats.accesses, order.len() as u64);
        assert_eq!(stats.unique_bytes_seen, 10 + 8 + 4 + 6 + 12);
    }
}

#[test]
fn oversized_part_aborts_the_run() {
    let lru = policy_config(serde_json::json!({"kind": "lru"}));
    let seq = sequence(&[4], &[0], 4);
    let policy = build_policy(&lru, 2, None, 0).unwrap();
    let mut processor = StateProcessor::new(2, policy, StatsCollector::new(None, None));
    assert!(matches!(
        processor.run(&seq),
        Err(SimError::InsufficientCapacity {
            access_ind: 0,
            part_bytes: 4,
            capacity: 2,
            ..
        })
    ));
}

#[test]
fn stop_early_processes_the_completing_access() {
    // Unique bytes 1, 1, 1 then 2; the limit of 3 is reached by the third access,
    // which is still processed and recorded, and the fourth is never seen
    let seq = sequence(&[1, 1, 1, 2], &[0, 1, 2, 3], 4);
    let stop_early = Thresholds {
        unique_bytes: Some(3),
        ..Thresholds::default()
    };
    let lru = policy_config(serde_json::json!({"kind": "lru"}));
    let policy = build_policy(&lru, 8, None, 0).unwrap();
    let mut processor =
        StateProcessor::new(8, policy, StatsCollector::new(None, Some(stop_early)));
    processor.run(&seq).unwrap();

    assert!(processor.halted_early());
    assert_eq!(processor.accesses_processed(), 3);
    let stats = processor.stats();
    assert_eq!(stats.accesses, 3);
    assert_eq!(stats.unique_bytes_seen, 3);
    assert_eq!(stats.misses, 3);
}

#[test]
fn stop_early_honours_the_time_threshold() {
    // Timestamps run 0..=3; the limit fires on the access stamped 2, which is
    // still processed before the run halts
    let seq = sequence(&[4, 4, 4, 4], &[0, 1, 2, 3], 4);
    let stop_early = Thresholds {
        time: Some(2),
        ..Thresholds::default()
    };
    let lru = policy_config(serde_json::json!({"kind": "lru"}));
    let policy = build_policy(&lru, 16, None, 0).unwrap();
    let mut processor =
        StateProcessor::new(16, policy, StatsCollector::new(None, Some(stop_early)));
    processor.run(&seq).unwrap();

    assert!(processor.halted_early());
    assert_eq!(processor.accesses_processed(), 3);
    assert_eq!(processor.stats().accesses, 3);
}

#[test]
fn warm_up_latches_on_the_completing_access() {
    let seq = sequence(&[4], &[0, 0, 0], 4);
    let warm_up = Thresholds {
        accesses: Some(2),
        ..Thresholds::default()
    };
    let lru = policy_config(serde_json::json!({"kind": "lru"}));
    let policy = build_policy(&lru, 8, None, 0).unwrap();
    let mut processor = StateProcessor::new(8, policy, StatsCollector::new(Some(warm_up), None));
    processor.run(&seq).unwrap();

    // The first access (a miss) falls inside warm-up; the second and third hits count
    let stats = processor.stats();
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.accesses, 3);
}

#[test]
fn warm_up_by_total_bytes_counts_from_the_completing_access() {
    // 4 bytes per access; the 8-byte limit is reached by the second access, so the
    // first miss is swallowed and both later touches are recorded hits
    let seq = sequence(&[4], &[0, 0, 0], 4);
    let warm_up = Thresholds {
        total_bytes: Some(8),
        ..Thresholds::default()
    };
    let lru = policy_config(serde_json::json!({"kind": "lru"}));
    let policy = build_policy(&lru, 8, None, 0).unwrap();
    let mut processor = StateProcessor::new(8, policy, StatsCollector::new(Some(warm_up), None));
    processor.run(&seq).unwrap();

    let stats = processor.stats();
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.bytes_seen, 12);
}

#[test]
fn config_parsing_accepts_aliases_and_size_notation() {
    let raw = r#"{
        "part_size": "1MiB",
        "seed": 9,
        "warm_up": { "accesses": 100 },
        "stop_early": { "unique_bytes": "10GiB", "time": 86400 },
        "runs": [
            { "name": "baseline", "capacity": "64MiB", "policy": { "kind": "LRU" } },
            { "capacity": 1048576, "policy": { "kind": "arc", "ghost_factor": 0.5 } },
            { "capacity": "1GiB", "policy": { "kind": "belady" } }
        ]
    }"#;
    let config = SimulationConfig::from_json(raw).unwrap();
    assert_eq!(config.part_size, MIB);
    assert_eq!(config.seed, 9);
    assert_eq!(config.warm_up.as_ref().unwrap().accesses, Some(100));
    assert_eq!(config.runs.len(), 3);
    assert_eq!(config.runs[0].effective_name(), "baseline");
    assert_eq!(config.runs[1].effective_name(), "arc");
    assert!(config.runs[2].policy.requires_reuse_index());

    assert!(SimulationConfig::from_json(r#"{ "runs": [], "typo": 1 }"#).is_err());
}

#[test]
fn zero_part_size_is_rejected_as_a_config_error() {
    let config = SimulationConfig::from_json(
        r#"{
            "part_size": 0,
            "runs": [ { "capacity": 8, "policy": { "kind": "lru" } } ]
        }"#,
    )
    .unwrap();
    let trace = serde_json::from_str(
        r#"{
            "files": [ { "name": "a", "size": 4 } ],
            "accesses": [ { "file": "a", "size": 4, "ts": 0 } ]
        }"#,
    )
    .unwrap();
    assert!(matches!(
        Simulator::new(config, trace),
        Err(SimError::InvalidConfig { .. })
    ));

    // The sequence constructor guards on its own, without a simulator in front
    assert!(matches!(
        AccessSequence::from_raw(FileSet::new(Vec::new(), 0), Vec::new(), 0),
        Err(SimError::InvalidConfig { .. })
    ));
}

#[test]
fn simulator_reports_all_runs_in_order() {
    let raw = r#"{
        "part_size": 4,
        "runs": [
            { "capacity": 8, "policy": { "kind": "lru" } },
            { "capacity": 12, "policy": { "kind": "min" } },
            { "capacity": 2, "policy": { "kind": "lru" } }
        ]
    }"#;
    let config = SimulationConfig::from_json(raw).unwrap();
    let trace = serde_json::from_str(
        r#"{
            "files": [ { "name": "a", "size": 4 }, { "name": "b", "size": 4 } ],
            "accesses": [
                { "file": "a", "size": 4, "ts": 0 },
                { "file": "b", "size": 4, "ts": 1 },
                { "file": "a", "size": 4, "ts": 2 }
            ]
        }"#,
    )
    .unwrap();

    let mut simulator = Simulator::new(config, trace).unwrap();
    let report = simulator.simulate();
    assert_eq!(report.runs.len(), 3);
    assert_eq!(report.runs[0].policy, "lru");
    assert_eq!(report.runs[0].stats.hits, 1);
    assert!(report.runs[0].error.is_none());
    assert_eq!(report.runs[1].policy, "min");
    // The 2-byte cache cannot hold a single part; only that run fails
    assert!(report.runs[2].error.is_some());
    assert_eq!(report.runs[2].stats.hits, 0);
}

#[test]
fn parallel_simulation_matches_sequential() {
    let raw = r#"{
        "part_size": 4,
        "runs": [
            { "capacity": 8, "policy": { "kind": "lru" } },
            { "capacity": 8, "policy": { "kind": "arc" } },
            { "capacity": 8, "policy": { "kind": "lrfu" } }
        ]
    }"#;
    let trace_raw = r#"{
        "files": [
            { "name": "a", "size": 4 }, { "name": "b", "size": 4 },
            { "name": "c", "size": 4 }, { "name": "d", "size": 4 }
        ],
        "accesses": [
            { "file": "a", "size": 4, "ts": 0 },
            { "file": "b", "size": 4, "ts": 1 },
            { "file": "c", "size": 4, "ts": 2 },
            { "file": "a", "size": 4, "ts": 3 },
            { "file": "d", "size": 4, "ts": 4 },
            { "file": "b", "size": 4, "ts": 5 }
        ]
    }"#;
    let config = SimulationConfig::from_json(raw).unwrap();

    let mut sequential =
        Simulator::new(config.clone(), serde_json::from_str(trace_raw).unwrap()).unwrap();
    let mut parallel =
        Simulator::new(config, serde_json::from_str(trace_raw).unwrap()).unwrap();

    let expected = sequential.simulate();
    let actual = parallel.simulate_parallel();
    for (a, b) in expected.runs.iter().zip(actual.runs.iter()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.stats, b.stats);
    }
}
