//! Command-line entry point for the synchronization benchmark.

use anyhow::Context;
use clap::{Parser, ValueEnum};

use rcx_hashlist::{run, BenchConfig, BindPolicy};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Bind {
    /// Leave scheduling to the OS.
    None,
    /// Worker i on CPU i.
    Seq,
    /// Fill NUMA nodes one at a time.
    Numa,
}

impl From<Bind> for BindPolicy {
    fn from(bind: Bind) -> Self {
        match bind {
            Bind::None => BindPolicy::None,
            Bind::Seq => BindPolicy::Sequential,
            Bind::Numa => BindPolicy::NumaCompact,
        }
    }
}

/// Exercise one synchronization protocol under a mixed workload.
#[derive(Debug, Parser)]
#[command(name = "sync-bench", version, about)]
struct Args {
    /// Benchmark name from the protocol registry.
    #[arg(long, default_value = "rcuhashlist")]
    benchmark: String,

    /// Number of worker threads.
    #[arg(long, default_value_t = 1)]
    threads_nb: usize,

    /// Duration of the benchmark in ms.
    #[arg(long, default_value_t = 100)]
    duration: u64,

    /// Probability for update operations; 10000 = 100%, 1 = 0.01%.
    #[arg(long, default_value_t = 0)]
    update: u32,

    /// Key range. Initial set size is half the key range.
    #[arg(long, default_value_t = 1024)]
    range: i32,

    /// Number of buckets to utilize.
    #[arg(long, default_value_t = 1)]
    nr_buckets: usize,

    /// CPU binding policy for the workers.
    #[arg(long, value_enum, default_value = "numa")]
    bind: Bind,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let cfg = BenchConfig {
        benchmark: args.benchmark,
        threads_nb: args.threads_nb,
        duration_ms: args.duration,
        update: args.update,
        range: args.range,
        nr_buckets: args.nr_buckets,
        bind: args.bind.into(),
    };

    let report = run(&cfg).context("benchmark failed")?;
    report.log();
    Ok(())
}
