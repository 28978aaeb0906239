//! End-to-end driver scenarios.
//!
//! Each test runs the full benchmark pipeline (pre-fill, pinned workers,
//! mixed workload, aggregation) for one protocol and checks the
//! observable properties that must hold at quiescence. Thread counts are
//! clamped to the online CPU count so the driver's validation passes on
//! small hosts, and the runs are kept short.

use rcx_hashlist::bench::{run, run_with_set, BenchConfig, BindPolicy};
use rcx_hashlist::list::{HashList, UpdateOutcome};
use rcx_hashlist::topology;

fn config(benchmark: &str) -> BenchConfig {
    BenchConfig {
        benchmark: benchmark.to_string(),
        bind: BindPolicy::None,
        ..BenchConfig::default()
    }
}

fn clamp_threads(requested: usize) -> usize {
    requested.min(topology::online_cpus()).max(1)
}

// The abort table and the epoch collector are process-global; driver runs
// must not interleave.
static DRIVER: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[test]
fn scenario_rcu_read_only() {
    let _g = DRIVER.lock().unwrap();
    let cfg = BenchConfig {
        threads_nb: 1,
        duration_ms: 500,
        update: 0,
        range: 1024,
        nr_buckets: 8,
        ..config("rcu")
    };

    let report = run(&cfg).unwrap();

    assert_eq!(report.prefilled, 512);
    assert_eq!(report.final_size, 512);
    assert!(report.ops.nb_lookup > 0);
    assert_eq!(report.ops.nr_updates(), 0);
    assert!(report.aborts.is_zero());
}

#[test]
fn scenario_fglock_update_only() {
    let _g = DRIVER.lock().unwrap();
    let cfg = BenchConfig {
        threads_nb: clamp_threads(4),
        duration_ms: 200,
        update: 10_000,
        range: 256,
        nr_buckets: 1,
        ..config("rcu-fglock")
    };

    let (report, set) = run_with_set(&cfg).unwrap();

    assert!(report.final_size <= 256);
    assert_eq!(report.ops.nb_lookup, 0);
    // Inserted and removed counts account exactly for the size delta.
    let balance = report.prefilled as i64 + report.ops.nb_insert as i64
        - report.ops.nb_delete as i64;
    assert_eq!(balance, report.final_size as i64);
    // Fine-grained locking recovers locally; no aborts surface.
    assert_eq!(report.ops.nr_aborts(), 0);
    // Every node-local lock taken during the run is released again.
    set.assert_quiescent();
}

#[test]
fn scenario_retry_accounts_every_update() {
    let _g = DRIVER.lock().unwrap();
    let cfg = BenchConfig {
        threads_nb: clamp_threads(8),
        duration_ms: 200,
        update: 5_000,
        range: 1024,
        nr_buckets: 16,
        ..config("retry")
    };

    let report = run(&cfg).unwrap();

    let ops = &report.ops;
    let accounted = ops.nb_insert
        + ops.nb_ins_fail
        + ops.nb_ins_abort
        + ops.nb_delete
        + ops.nb_del_noop
        + ops.nb_del_abort;
    assert_eq!(accounted, ops.nr_updates());
    let balance =
        report.prefilled as i64 + ops.nb_insert as i64 - ops.nb_delete as i64;
    assert_eq!(balance, report.final_size as i64);
}

#[test]
fn scenario_htmlock_flags_quiesce() {
    let _g = DRIVER.lock().unwrap();
    // Drive the protocol directly so the set can be inspected afterwards.
    let set = HashList::new(1);
    for key in 0..8 {
        assert_eq!(set.bucket_of(key).htmlock_add(key), UpdateOutcome::Inserted);
    }

    std::thread::scope(|s| {
        for t in 0..clamp_threads(2) as i32 {
            let set = &set;
            s.spawn(move || {
                for i in 0..500 {
                    let key = (t * 5 + i) % 16;
                    let bucket = set.bucket_of(key);
                    if i % 2 == 0 {
                        bucket.htmlock_add(key);
                    } else {
                        bucket.htmlock_remove(key);
                    }
                }
            });
        }
    });

    // Lock flags are all zero and no reachable node is marked removed.
    set.assert_quiescent();
}

#[test]
fn scenario_rcx_numa_quiesces_and_drains() {
    let _g = DRIVER.lock().unwrap();
    let cfg = BenchConfig {
        threads_nb: clamp_threads(16),
        duration_ms: 200,
        update: 2_000,
        range: 4096,
        nr_buckets: 64,
        ..config("rcx")
    };

    let (report, set) = run_with_set(&cfg).unwrap();

    let balance = report.prefilled as i64 + report.ops.nb_insert as i64
        - report.ops.nb_delete as i64;
    assert_eq!(balance, report.final_size as i64);

    // The per-NUMA lock arrays and global locks the contended run took
    // are all released, and no reachable node is marked removed.
    set.assert_quiescent();
}

#[test]
fn scenario_forgive_read_only_records_no_aborts() {
    let _g = DRIVER.lock().unwrap();
    let cfg = BenchConfig {
        threads_nb: 1,
        duration_ms: 100,
        update: 0,
        range: 1024,
        nr_buckets: 1,
        ..config("forgive")
    };

    let report = run(&cfg).unwrap();

    assert!(report.aborts.is_zero());
    assert!(report.ops.nb_lookup > 0);
}

#[test]
fn scenario_rlu_mixed_workload() {
    let _g = DRIVER.lock().unwrap();
    let cfg = BenchConfig {
        threads_nb: clamp_threads(4),
        duration_ms: 200,
        update: 2_000,
        range: 512,
        nr_buckets: 4,
        ..config("rlu")
    };

    let (report, set) = run_with_set(&cfg).unwrap();

    let balance = report.prefilled as i64 + report.ops.nb_insert as i64
        - report.ops.nb_delete as i64;
    assert_eq!(balance, report.final_size as i64);
    // The default RLU policy retries conflicts internally.
    assert_eq!(report.ops.nr_aborts(), 0);
    // No node is left carrying a writer's copy.
    set.assert_quiescent();
}

#[test]
fn scenario_update_full_has_no_lookups() {
    let _g = DRIVER.lock().unwrap();
    let cfg = BenchConfig {
        threads_nb: clamp_threads(2),
        duration_ms: 100,
        update: 10_000,
        range: 64,
        nr_buckets: 2,
        ..config("rcu")
    };

    let report = run(&cfg).unwrap();
    assert_eq!(report.ops.nb_lookup, 0);
    assert!(report.ops.nr_updates() > 0);
}

#[test]
fn scenario_every_protocol_survives_a_short_run() {
    let _g = DRIVER.lock().unwrap();
    for bench in rcx_hashlist::bench::REGISTRY {
        let cfg = BenchConfig {
            threads_nb: clamp_threads(2),
            duration_ms: 50,
            update: 5_000,
            range: 128,
            nr_buckets: 4,
            ..config(bench.name)
        };

        let (report, set) = run_with_set(&cfg).unwrap();
        let balance = report.prefilled as i64 + report.ops.nb_insert as i64
            - report.ops.nb_delete as i64;
        assert_eq!(balance, report.final_size as i64, "protocol {}", bench.name);
        set.assert_quiescent();
    }
}
