//! Benchmark driver.
//!
//! Mirrors the protocol registry onto the list operations, pre-fills the
//! set to half the key range, runs a mixed lookup/update workload on N
//! pinned workers for a fixed wall-clock duration and aggregates
//! per-thread counters plus the abort-reason breakdown into a report.

use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::abort::{self, AbortReason, Snapshot};
use crate::barrier::Barrier;
use crate::list::{HashList, Key, UpdateOutcome};
use crate::rlu::{self, RluThread};
use crate::rlu_list::RluHashList;
use crate::topology::{self, Topology};

/// Log target for all result lines.
const TAG: &str = "sync_bench";

/// Wall-clock cutoff shared by every worker.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    duration: Duration,
}

impl Deadline {
    /// Start the clock now, expiring after `ms` milliseconds.
    pub fn after_ms(ms: u64) -> Self {
        Self {
            start: Instant::now(),
            duration: Duration::from_millis(ms),
        }
    }

    /// A deadline that never expires (pre-fill, direct API use).
    pub fn never() -> Self {
        Self {
            start: Instant::now(),
            duration: Duration::from_secs(u64::MAX / 4),
        }
    }

    /// Whether the cutoff has been reached.
    #[inline]
    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.duration
    }
}

/// The set implementation a protocol family operates on.
pub enum SetKind {
    /// Bucket array protected by the spinlock/HTM families.
    Hash(HashList),
    /// Bucket array managed by the RLU family.
    Rlu(RluHashList),
}

impl SetKind {
    fn hash(&self) -> &HashList {
        match self {
            SetKind::Hash(set) => set,
            SetKind::Rlu(_) => unreachable!("registry paired an RLU set with a non-RLU protocol"),
        }
    }

    fn rlu(&self) -> &RluHashList {
        match self {
            SetKind::Rlu(set) => set,
            SetKind::Hash(_) => unreachable!("registry paired a plain set with an RLU protocol"),
        }
    }

    /// Total number of keys, observed quiescently.
    pub fn len(&self) -> usize {
        match self {
            SetKind::Hash(set) => set.len(),
            SetKind::Rlu(set) => set.len(),
        }
    }

    /// Whether the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the quiescent invariants of whichever family is inside.
    pub fn assert_quiescent(&self) {
        match self {
            SetKind::Hash(set) => set.assert_quiescent(),
            SetKind::Rlu(set) => set.assert_quiescent(),
        }
    }
}

/// Per-worker state threaded through every operation.
pub struct WorkerCtx {
    /// Benchmark cutoff consulted by the retry policy.
    pub deadline: Deadline,
    rlu: Option<RluThread>,
}

impl WorkerCtx {
    fn new(deadline: Deadline, needs_rlu: bool) -> Self {
        Self {
            deadline,
            rlu: needs_rlu.then(RluThread::new),
        }
    }

    fn rlu_mut(&mut self) -> &mut RluThread {
        self.rlu.as_mut().expect("protocol requires an RLU context")
    }
}

type LookupFn = fn(&SetKind, &mut WorkerCtx, Key) -> bool;
type UpdateFn = fn(&SetKind, &mut WorkerCtx, Key) -> UpdateOutcome;

/// One registry entry binding a protocol name to its operations.
pub struct BenchOps {
    /// Registry name selected by the `benchmark` parameter.
    pub name: &'static str,
    needs_rlu: bool,
    lookup: LookupFn,
    insert: UpdateFn,
    remove: UpdateFn,
}

fn plain_lookup(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> bool {
    set.hash().contains(key)
}

fn rlu_lookup(set: &SetKind, ctx: &mut WorkerCtx, key: Key) -> bool {
    let set = set.rlu();
    set.contains(ctx.rlu_mut(), key)
}

fn coarse_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).coarse_add(key)
}

fn coarse_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).coarse_remove(key)
}

fn try_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).try_add(key)
}

fn try_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).try_remove(key)
}

fn fg_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).fg_add(key)
}

fn fg_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).fg_remove(key)
}

fn numa_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).numa_add(key)
}

fn numa_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).numa_remove(key)
}

fn rlu_insert(set: &SetKind, ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    let set = set.rlu();
    set.add(ctx.rlu_mut(), key)
}

fn rlu_remove(set: &SetKind, ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    let set = set.rlu();
    set.remove(ctx.rlu_mut(), key)
}

fn rlu_try_insert(set: &SetKind, ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    let set = set.rlu();
    set.try_add(ctx.rlu_mut(), key)
}

fn rlu_try_remove(set: &SetKind, ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    let set = set.rlu();
    set.try_remove(ctx.rlu_mut(), key)
}

fn lf_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).lf_add(key)
}

fn lf_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).lf_remove(key)
}

fn htm_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).htm_add(key)
}

fn htm_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).htm_remove(key)
}

fn retry_insert(set: &SetKind, ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    loop {
        match set.hash().bucket_of(key).htm_add(key) {
            UpdateOutcome::Conflict => {
                if ctx.deadline.expired() {
                    return UpdateOutcome::DeadlineExpired;
                }
            }
            out => return out,
        }
    }
}

fn retry_remove(set: &SetKind, ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    loop {
        match set.hash().bucket_of(key).htm_remove(key) {
            UpdateOutcome::Conflict => {
                if ctx.deadline.expired() {
                    return UpdateOutcome::DeadlineExpired;
                }
            }
            out => return out,
        }
    }
}

fn hwa_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).hwa_add(key)
}

fn hwa_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).hwa_remove(key)
}

fn htmlock_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).htmlock_add(key)
}

fn htmlock_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).htmlock_remove(key)
}

fn hhtmlock_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).hhtmlock_add(key)
}

fn hhtmlock_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).hhtmlock_remove(key)
}

fn htm_numa_insert(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).htm_numa_add(key)
}

fn htm_numa_remove(set: &SetKind, _ctx: &mut WorkerCtx, key: Key) -> UpdateOutcome {
    set.hash().bucket_of(key).htm_numa_remove(key)
}

/// The fixed protocol registry, selectable by name.
pub static REGISTRY: &[BenchOps] = &[
    BenchOps {
        name: "rcu",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: coarse_insert,
        remove: coarse_remove,
    },
    BenchOps {
        name: "rcu-forgive",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: try_insert,
        remove: try_remove,
    },
    BenchOps {
        name: "rcu-fglock",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: fg_insert,
        remove: fg_remove,
    },
    BenchOps {
        name: "rcu-numa",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: numa_insert,
        remove: numa_remove,
    },
    BenchOps {
        name: "rlu",
        needs_rlu: true,
        lookup: rlu_lookup,
        insert: rlu_insert,
        remove: rlu_remove,
    },
    BenchOps {
        name: "rlu-forgive",
        needs_rlu: true,
        lookup: rlu_lookup,
        insert: rlu_try_insert,
        remove: rlu_try_remove,
    },
    BenchOps {
        name: "rcuhtm",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: lf_insert,
        remove: lf_remove,
    },
    BenchOps {
        name: "forgive",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: htm_insert,
        remove: htm_remove,
    },
    BenchOps {
        name: "retry",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: retry_insert,
        remove: retry_remove,
    },
    BenchOps {
        name: "hwa",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: hwa_insert,
        remove: hwa_remove,
    },
    BenchOps {
        name: "rcx-htmlock",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: htmlock_insert,
        remove: htmlock_remove,
    },
    BenchOps {
        name: "rcx-hhtmlock",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: hhtmlock_insert,
        remove: hhtmlock_remove,
    },
    BenchOps {
        name: "rcx",
        needs_rlu: false,
        lookup: plain_lookup,
        insert: htm_numa_insert,
        remove: htm_numa_remove,
    },
];

/// Look a protocol up by its registry name.
pub fn find_benchmark(name: &str) -> Option<&'static BenchOps> {
    REGISTRY.iter().find(|b| b.name == name)
}

/// How workers are pinned to CPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindPolicy {
    /// Leave scheduling to the OS.
    None,
    /// Worker `i` on CPU `i`.
    Sequential,
    /// Fill the first online NUMA node, then the next, wrapping.
    #[default]
    NumaCompact,
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Protocol name from the registry.
    pub benchmark: String,
    /// Worker count.
    pub threads_nb: usize,
    /// Wall-clock run length in milliseconds.
    pub duration_ms: u64,
    /// Update probability, in units of 1/10000.
    pub update: u32,
    /// Keys are drawn from `[0, range)`; the initial fill is `range / 2`.
    pub range: Key,
    /// Bucket count.
    pub nr_buckets: usize,
    /// CPU binding policy.
    pub bind: BindPolicy,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            benchmark: "rcuhashlist".to_string(),
            threads_nb: 1,
            duration_ms: 100,
            update: 0,
            range: 1024,
            nr_buckets: 1,
            bind: BindPolicy::default(),
        }
    }
}

/// Driver validation and runtime failures.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// The requested name is not in the registry.
    #[error("unknown benchmark {0:?}")]
    UnknownBenchmark(String),
    /// More workers than the host or the RLU registry can carry.
    #[error("invalid number of threads {requested} (max {max})")]
    TooManyThreads {
        /// Requested worker count.
        requested: usize,
        /// Hard limit that was exceeded.
        max: usize,
    },
    /// Bucket count outside `[1, 1000]`.
    #[error("invalid number of buckets {0} (max {1})")]
    InvalidBuckets(usize, usize),
    /// Update probability outside `[0, 10000]`.
    #[error("invalid update probability {0} (max 10000)")]
    InvalidUpdate(u32),
    /// Key range must be positive.
    #[error("invalid key range {0}")]
    InvalidRange(Key),
}

/// Per-worker operation counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpCounts {
    /// Lookups issued.
    pub nb_lookup: u64,
    /// Keys actually inserted.
    pub nb_insert: u64,
    /// Inserts that found the key already present.
    pub nb_ins_fail: u64,
    /// Inserts that ended in a protocol abort.
    pub nb_ins_abort: u64,
    /// Keys actually removed.
    pub nb_delete: u64,
    /// Removes that found nothing.
    pub nb_del_noop: u64,
    /// Removes that ended in a protocol abort.
    pub nb_del_abort: u64,
}

impl OpCounts {
    fn merge(&mut self, other: OpCounts) {
        self.nb_lookup += other.nb_lookup;
        self.nb_insert += other.nb_insert;
        self.nb_ins_fail += other.nb_ins_fail;
        self.nb_ins_abort += other.nb_ins_abort;
        self.nb_delete += other.nb_delete;
        self.nb_del_noop += other.nb_del_noop;
        self.nb_del_abort += other.nb_del_abort;
    }

    /// Update operations issued, successful or not.
    pub fn nr_updates(&self) -> u64 {
        self.nb_insert
            + self.nb_ins_fail
            + self.nb_ins_abort
            + self.nb_delete
            + self.nb_del_noop
            + self.nb_del_abort
    }

    /// Operations issued across every class.
    pub fn nr_ops(&self) -> u64 {
        self.nb_lookup + self.nr_updates()
    }

    /// Updates that ended in a protocol abort.
    pub fn nr_aborts(&self) -> u64 {
        self.nb_ins_abort + self.nb_del_abort
    }
}

/// Aggregated result of one benchmark run.
#[derive(Debug)]
pub struct BenchReport {
    /// Protocol that ran.
    pub benchmark: String,
    /// Run length in milliseconds.
    pub duration_ms: u64,
    /// Summed worker counters.
    pub ops: OpCounts,
    /// Keys inserted by the pre-fill phase.
    pub prefilled: u64,
    /// Set size after the workers joined.
    pub final_size: usize,
    /// Abort-reason breakdown.
    pub aborts: Snapshot,
}

impl BenchReport {
    /// Emit the result as key/value lines under the module tag.
    pub fn log(&self) {
        let ms = self.duration_ms.max(1);
        let ops = &self.ops;

        log::info!(target: TAG, "benchmark: {}", self.benchmark);
        log::info!(target: TAG, "#lookup: {} / s", ops.nb_lookup * 1000 / ms);
        log::info!(target: TAG, "#insert: {} / s", ops.nb_insert * 1000 / ms);
        log::info!(target: TAG, "#delete: {} / s", ops.nb_delete * 1000 / ms);
        log::info!(
            target: TAG,
            "#update: {} / s",
            (ops.nb_insert + ops.nb_delete) * 1000 / ms
        );

        let nr_aborts = ops.nr_aborts();
        let nr_ops = ops.nr_ops().max(1);
        log::info!(target: TAG, "#ops: {} / s", nr_ops * 1000 / ms);
        log::info!(
            target: TAG,
            "#success: {} / s",
            (nr_ops - nr_aborts) * 1000 / ms
        );
        log::info!(target: TAG, "#ins abort: {} / s", ops.nb_ins_abort * 1000 / ms);
        log::info!(target: TAG, "#del abort: {} / s", ops.nb_del_abort * 1000 / ms);
        log::info!(target: TAG, "#abort: {} / s", nr_aborts * 1000 / ms);
        log::info!(
            target: TAG,
            "#abort / ops: {} / 1000 ops",
            nr_aborts * 1000 / nr_ops
        );

        let nr_updates = ops.nr_updates().max(1);
        log::info!(
            target: TAG,
            "#abort / updates: {} / 1000 updates",
            nr_aborts * 1000 / nr_updates
        );

        log::info!(target: TAG, "final_size: {}", self.final_size);

        let tx = &self.aborts;
        log::info!(target: TAG, "aborts_per_sec: {}", tx.total * 1000 / ms);
        log::info!(
            target: TAG,
            "aborts_per_1000issued: {}",
            tx.total * 1000 / nr_ops
        );
        log::info!(
            target: TAG,
            "aborts_per_1000succ: {}",
            tx.total * 1000 / (nr_ops - nr_aborts).max(1)
        );
        log::info!(
            target: TAG,
            "aborts_per_1000upd: {}",
            tx.total * 1000 / nr_updates
        );
        log::info!(target: TAG, "nr_total_aborts: {}", tx.total);
        for reason in AbortReason::ALL {
            log::info!(target: TAG, "{}: {}", reason.label(), tx.get(reason));
        }
    }
}

fn worker(
    ops: &'static BenchOps,
    set: &SetKind,
    cfg: &BenchConfig,
    id: usize,
    cpu: Option<usize>,
    barrier: &Barrier,
    deadline: Deadline,
) -> OpCounts {
    if let Some(cpu) = cpu {
        if let Err(err) = topology::pin_to_cpu(cpu) {
            log::debug!(target: TAG, "worker {id}: pinning to cpu {cpu} failed: {err}");
        }
    }

    let mut ctx = WorkerCtx::new(deadline, ops.needs_rlu);
    let mut rng = SmallRng::seed_from_u64(id as u64 + 1);
    let mut counts = OpCounts::default();
    let mut iters = 0u64;

    barrier.wait();

    while !deadline.expired() {
        let op: u32 = rng.gen_range(0..10_000);
        let key: Key = rng.gen_range(0..cfg.range);

        if op < cfg.update {
            if rng.gen_range(0..2u32) == 0 {
                match (ops.insert)(set, &mut ctx, key) {
                    UpdateOutcome::Inserted => counts.nb_insert += 1,
                    UpdateOutcome::AlreadyPresent => counts.nb_ins_fail += 1,
                    _ => counts.nb_ins_abort += 1,
                }
            } else {
                match (ops.remove)(set, &mut ctx, key) {
                    UpdateOutcome::Removed => counts.nb_delete += 1,
                    UpdateOutcome::NotFound => counts.nb_del_noop += 1,
                    _ => counts.nb_del_abort += 1,
                }
            }
        } else {
            (ops.lookup)(set, &mut ctx, key);
            counts.nb_lookup += 1;
        }

        iters += 1;
        if iters & 0x3f == 0 {
            std::thread::yield_now();
        }
    }

    counts
}

/// Run one benchmark to completion and return its report.
pub fn run(cfg: &BenchConfig) -> Result<BenchReport, BenchError> {
    run_with_set(cfg).map(|(report, _set)| report)
}

/// As [`run`], but hand the set back alongside the report so callers can
/// inspect its quiescent state (lock flags, `removed` marks, ordering)
/// after the workers have joined.
pub fn run_with_set(cfg: &BenchConfig) -> Result<(BenchReport, SetKind), BenchError> {
    let ops = find_benchmark(&cfg.benchmark)
        .ok_or_else(|| BenchError::UnknownBenchmark(cfg.benchmark.clone()))?;

    let online = topology::online_cpus();
    if cfg.threads_nb == 0 || cfg.threads_nb > online {
        return Err(BenchError::TooManyThreads {
            requested: cfg.threads_nb,
            max: online,
        });
    }
    if cfg.threads_nb > rlu::MAX_THREADS {
        return Err(BenchError::TooManyThreads {
            requested: cfg.threads_nb,
            max: rlu::MAX_THREADS,
        });
    }
    if cfg.nr_buckets == 0 || cfg.nr_buckets > crate::list::MAX_BUCKETS {
        return Err(BenchError::InvalidBuckets(
            cfg.nr_buckets,
            crate::list::MAX_BUCKETS,
        ));
    }
    if cfg.update > 10_000 {
        return Err(BenchError::InvalidUpdate(cfg.update));
    }
    if cfg.range <= 0 {
        return Err(BenchError::InvalidRange(cfg.range));
    }

    log::info!(
        target: TAG,
        "running benchmark {} with {} threads",
        ops.name,
        cfg.threads_nb
    );

    abort::reset();

    let set = if ops.needs_rlu {
        SetKind::Rlu(RluHashList::new(cfg.nr_buckets))
    } else {
        SetKind::Hash(HashList::new(cfg.nr_buckets))
    };

    // Half fill the set; redraw until each slot actually inserts.
    let prefilled = (cfg.range / 2) as u64;
    {
        let mut ctx = WorkerCtx::new(Deadline::never(), ops.needs_rlu);
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for _ in 0..cfg.range / 2 {
            loop {
                let key: Key = rng.gen_range(0..cfg.range);
                if (ops.insert)(&set, &mut ctx, key) == UpdateOutcome::Inserted {
                    break;
                }
            }
        }
    }

    let cpu_map: Option<Vec<usize>> = match cfg.bind {
        BindPolicy::None => None,
        BindPolicy::Sequential => Some((0..cfg.threads_nb).collect()),
        BindPolicy::NumaCompact => Some(Topology::detect().compact_cpu_map(cfg.threads_nb)),
    };

    let barrier = Barrier::new(cfg.threads_nb);
    let deadline = Deadline::after_ms(cfg.duration_ms);

    let mut totals = OpCounts::default();
    std::thread::scope(|s| {
        let handles: Vec<_> = (1..cfg.threads_nb)
            .map(|id| {
                let set = &set;
                let barrier = &barrier;
                let cpu = cpu_map.as_ref().map(|m| m[id]);
                s.spawn(move || worker(ops, set, cfg, id, cpu, barrier, deadline))
            })
            .collect();

        // The calling thread is also doing work.
        let cpu0 = cpu_map.as_ref().map(|m| m[0]);
        totals.merge(worker(ops, &set, cfg, 0, cpu0, &barrier, deadline));

        for handle in handles {
            totals.merge(handle.join().expect("worker panicked"));
        }
    });

    let final_size = set.len();

    // Nudge the reclaimer so nodes retired during the run drain.
    for _ in 0..8 {
        crossbeam_epoch::pin().flush();
    }

    let report = BenchReport {
        benchmark: ops.name.to_string(),
        duration_ms: cfg.duration_ms,
        ops: totals,
        prefilled,
        final_size,
        aborts: abort::snapshot(),
    };
    Ok((report, set))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names() {
        let expected = [
            "rcu",
            "rcu-forgive",
            "rcu-fglock",
            "rcu-numa",
            "rlu",
            "rlu-forgive",
            "rcuhtm",
            "forgive",
            "retry",
            "hwa",
            "rcx-htmlock",
            "rcx-hhtmlock",
            "rcx",
        ];
        assert_eq!(REGISTRY.len(), expected.len());
        for name in expected {
            assert!(find_benchmark(name).is_some(), "missing {name}");
        }
        assert!(find_benchmark("rcuhashlist").is_none());
    }

    #[test]
    fn test_unknown_benchmark_rejected() {
        let cfg = BenchConfig::default();
        assert!(matches!(
            run(&cfg),
            Err(BenchError::UnknownBenchmark(_))
        ));
    }

    #[test]
    fn test_invalid_buckets_rejected() {
        let cfg = BenchConfig {
            benchmark: "rcu".into(),
            nr_buckets: 1001,
            ..BenchConfig::default()
        };
        assert!(matches!(run(&cfg), Err(BenchError::InvalidBuckets(..))));
    }

    #[test]
    fn test_too_many_threads_rejected() {
        let cfg = BenchConfig {
            benchmark: "rcu".into(),
            threads_nb: topology::online_cpus() + 1,
            ..BenchConfig::default()
        };
        assert!(matches!(run(&cfg), Err(BenchError::TooManyThreads { .. })));
    }

    #[test]
    fn test_deadline_expires() {
        let d = Deadline::after_ms(1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(d.expired());
        assert!(!Deadline::never().expired());
    }
}
