//! The statistics snapshot and the collaborator that produces it.

/// An immutable point-in-time view of the campaign's aggregate counters.
///
/// Rates are fractions in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    pub total_samples: u64,
    pub interesting_samples: u64,
    /// Interesting samples for which runtime type information was collected.
    pub interesting_samples_with_types: u64,
    pub valid_samples: u64,
    pub crashing_samples: u64,
    pub timed_out_samples: u64,
    pub success_rate: f64,
    pub timeout_rate: f64,
    pub coverage: f64,
    pub avg_program_size: f64,
    pub connected_workers: u32,
    pub execs_per_second: f64,
    /// Share of wall time spent in the engine rather than executing samples.
    pub fuzzer_overhead: f64,
    pub total_execs: u64,
    /// Whether the type-collection figures below are meaningful.
    pub collect_runtime_types: bool,
    pub type_collection_timeout_rate: f64,
    pub type_collection_failure_rate: f64,
}

/// Produces fresh snapshots on demand.
///
/// Engines that aggregate statistics register an implementation; observers
/// fetch it through `EngineContext::statistics` once the engine is initialized.
pub trait StatisticsProvider: Send + Sync {
    fn compute(&self) -> Statistics;
}
