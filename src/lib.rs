//! # rcx-hashlist
//!
//! A concurrent ordered set built as a hash table of sorted singly-linked
//! lists, together with a family of interchangeable synchronization
//! protocols evaluated under a common workload.
//!
//! Each bucket is an ordered list of `i32` keys bookended by `MIN`/`MAX`
//! sentinels. Lookups are lock-free under an epoch guard; adds and
//! removes commit through one of thirteen protocols ranging from a
//! coarse per-bucket spinlock to NUMA-aware hardware-transactional
//! schemes. The benchmark driver fills the set to half the key range,
//! runs a mixed workload on pinned workers and reports throughput plus a
//! per-cause abort breakdown.
//!
//! ## Module Organization
//!
//! ### Building Blocks
//! - [`mod@backoff`] - Exponential backoff for contention management
//! - [`spinlock`] - Raw node/bucket spinlocks with a flag view
//! - [`barrier`] - One-shot start line for the benchmark workers
//! - [`topology`] - CPU/NUMA discovery and thread pinning
//!
//! ### Infrastructure
//! - [`htm`] - Hardware-transaction facade with a software fallback
//! - [`abort`] - Abort-reason accounting
//!
//! ### Data Structure
//! - [`list`] - Sentinel-bounded sorted lists and the bucket array
//!
//! ### Synchronization Protocols
//! - [`rcu`] - Spinlock-committed families (coarse, try, fine-grained, NUMA)
//! - [`rcx`] - Hardware-transaction-committed families
//! - [`rlu`] - Read-Log-Update mechanism
//! - [`rlu_list`] - The sorted list built on RLU
//!
//! ### Driver
//! - [`bench`] - Registry, workload loop and reporting

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// =============================================================================
// Tier 0: Building Blocks (No Internal Dependencies)
// =============================================================================

/// Exponential backoff for contention management.
pub mod backoff;

/// Raw spinlocks guarding list structure.
pub mod spinlock;

/// One-shot start line for the benchmark workers.
pub mod barrier;

/// CPU and NUMA topology services.
pub mod topology;

// =============================================================================
// Tier 1: Infrastructure (Depends on Tier 0)
// =============================================================================

/// Hardware transactional memory facade.
pub mod htm;

/// Abort-reason accounting.
pub mod abort;

// =============================================================================
// Tier 2: Data Structure (Depends on Tiers 0-1)
// =============================================================================

/// Sentinel-bounded sorted list and hash-list bucket array.
pub mod list;

// =============================================================================
// Tier 3: Synchronization Protocols (Depends on Tiers 0-2)
// =============================================================================

/// Spinlock-committed mutation protocols.
pub mod rcu;

/// Hardware-transaction-committed mutation protocols.
pub mod rcx;

/// Read-Log-Update mechanism.
pub mod rlu;

/// Sorted list over the RLU mechanism.
pub mod rlu_list;

// =============================================================================
// Tier 4: Driver (Depends on Tiers 0-3)
// =============================================================================

/// Benchmark driver: registry, workload loop, reporting.
pub mod bench;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use bench::{run, BenchConfig, BenchError, BenchReport, BindPolicy};
pub use list::{HashList, Key, List, UpdateOutcome};

#[cfg(test)]
pub(crate) mod testutil {
    /// Serializes tests that reset or assert on the process-global abort
    /// counters.
    pub static SERIAL: std::sync::Mutex<()> = std::sync::Mutex::new(());

    pub fn serial() -> std::sync::MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(|e| e.into_inner())
    }
}
