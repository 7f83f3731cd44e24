//! A simulated fuzzing campaign that drives a real engine.
//!
//! The simulation decides each step's outcome on its own task, then hands the
//! step to the engine queue, where it updates the corpus and phase and fires
//! the same events a real engine would.

use fuzzmon::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Edges in the simulated target, for the coverage figure.
const TOTAL_EDGES: u64 = 50_000;

const OPERATIONS: [&str; 8] = [
    "let v{0} = {1};",
    "let v{0} = [v{1}, {1}];",
    "let v{0} = v{1} + {1};",
    "v{1}.toString();",
    "let v{0} = new Map();",
    "v{0}.set(v{1}, {1});",
    "let v{0} = typeof v{1};",
    "let v{0} = Math.max(v{1}, {1});",
];

const TYPES: [&str; 5] = [".integer", ".string", ".object()", ".boolean", ".undefined"];

/// Knobs for the simulated workload.
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignSettings {
    /// Name shown as the active generation strategy.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Milliseconds between two simulated executions.
    #[serde(default = "default_step_millis")]
    pub step_millis: u64,
    /// Programs imported before generation starts.
    #[serde(default = "default_import_size")]
    pub import_size: usize,
    /// Corpus size at which initial generation gives way to fuzzing.
    #[serde(default = "default_initial_corpus_size")]
    pub initial_corpus_size: usize,
    /// Remote workers whose logs are forwarded to the local instance.
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Stop after this many executions. `0` runs until interrupted.
    #[serde(default)]
    pub max_executions: u64,
    /// Seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_strategy() -> String {
    "MutationEngine".to_string()
}

fn default_step_millis() -> u64 {
    20
}

fn default_import_size() -> usize {
    25
}

fn default_initial_corpus_size() -> usize {
    100
}

fn default_workers() -> u32 {
    2
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            step_millis: default_step_millis(),
            import_size: default_import_size(),
            initial_corpus_size: default_initial_corpus_size(),
            workers: default_workers(),
            max_executions: 0,
            seed: None,
        }
    }
}

/// Counter-based statistics for the simulated campaign.
pub struct CampaignStatistics {
    started: Instant,
    collect_runtime_types: bool,
    workers: u32,
    samples: AtomicU64,
    interesting: AtomicU64,
    interesting_with_types: AtomicU64,
    valid: AtomicU64,
    crashes: AtomicU64,
    timeouts: AtomicU64,
    instructions: AtomicU64,
    covered_edges: AtomicU64,
    type_timeouts: AtomicU64,
    type_failures: AtomicU64,
}

/// What one simulated execution did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded { new_edges: u64 },
    Failed,
    TimedOut,
    Crashed { unique: bool },
}

impl CampaignStatistics {
    pub fn new(collect_runtime_types: bool, workers: u32) -> Self {
        Self {
            started: Instant::now(),
            collect_runtime_types,
            workers,
            samples: AtomicU64::new(0),
            interesting: AtomicU64::new(0),
            interesting_with_types: AtomicU64::new(0),
            valid: AtomicU64::new(0),
            crashes: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            instructions: AtomicU64::new(0),
            covered_edges: AtomicU64::new(0),
            type_timeouts: AtomicU64::new(0),
            type_failures: AtomicU64::new(0),
        }
    }

    fn record(&self, outcome: Outcome, program_size: usize, type_collection: TypeCollection) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.instructions
            .fetch_add(program_size as u64, Ordering::Relaxed);
        match outcome {
            Outcome::Succeeded { new_edges } => {
                self.valid.fetch_add(1, Ordering::Relaxed);
                if new_edges > 0 {
                    self.interesting.fetch_add(1, Ordering::Relaxed);
                    self.covered_edges.fetch_add(new_edges, Ordering::Relaxed);
                    if type_collection == TypeCollection::Collected {
                        self.interesting_with_types.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Outcome::Failed => {}
            Outcome::TimedOut => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Crashed { unique } => {
                if unique {
                    self.crashes.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        match type_collection {
            TypeCollection::TimedOut => {
                self.type_timeouts.fetch_add(1, Ordering::Relaxed);
            }
            TypeCollection::Failed => {
                self.type_failures.fetch_add(1, Ordering::Relaxed);
            }
            TypeCollection::Collected | TypeCollection::Disabled => {}
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl StatisticsProvider for CampaignStatistics {
    fn compute(&self) -> Statistics {
        let samples = self.samples.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        Statistics {
            total_samples: samples,
            interesting_samples: self.interesting.load(Ordering::Relaxed),
            interesting_samples_with_types: self.interesting_with_types.load(Ordering::Relaxed),
            valid_samples: self.valid.load(Ordering::Relaxed),
            crashing_samples: self.crashes.load(Ordering::Relaxed),
            timed_out_samples: self.timeouts.load(Ordering::Relaxed),
            success_rate: ratio(self.valid.load(Ordering::Relaxed), samples),
            timeout_rate: ratio(self.timeouts.load(Ordering::Relaxed), samples),
            coverage: ratio(self.covered_edges.load(Ordering::Relaxed), TOTAL_EDGES).min(1.0),
            avg_program_size: ratio(self.instructions.load(Ordering::Relaxed), samples),
            connected_workers: self.workers,
            execs_per_second: samples as f64 / elapsed,
            // Generation and bookkeeping cost per step in the simulation.
            fuzzer_overhead: 0.04,
            total_execs: samples,
            collect_runtime_types: self.collect_runtime_types,
            type_collection_timeout_rate: ratio(self.type_timeouts.load(Ordering::Relaxed), samples),
            type_collection_failure_rate: ratio(self.type_failures.load(Ordering::Relaxed), samples),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCollection {
    Disabled,
    Collected,
    TimedOut,
    Failed,
}

/// One step, decided off the engine queue.
struct Step {
    program: Program,
    outcome: Outcome,
    type_collection: TypeCollection,
    worker_log: Option<LogEvent>,
}

struct Campaign {
    rng: StdRng,
    settings: CampaignSettings,
    workers: Vec<InstanceId>,
    collect_runtime_types: bool,
    next_program_id: u64,
}

impl Campaign {
    fn generate_program(&mut self) -> Program {
        let id = self.next_program_id;
        self.next_program_id += 1;
        let length: usize = self.rng.gen_range(3..12);
        let instructions = (0..length)
            .map(|index| {
                let template = OPERATIONS[self.rng.gen_range(0..OPERATIONS.len())];
                let code = template
                    .replace("{0}", &index.to_string())
                    .replace("{1}", &self.rng.gen_range(0..index.max(1)).to_string());
                let mut instruction = Instruction::new(code);
                if self.rng.gen_bool(0.3) {
                    instruction = instruction.with_comment("mutated by InputMutator");
                }
                if self.collect_runtime_types {
                    instruction = instruction.with_type(TYPES[self.rng.gen_range(0..TYPES.len())]);
                }
                instruction
            })
            .collect();
        Program::new(id, instructions)
    }

    fn next_step(&mut self) -> Step {
        let program = self.generate_program();
        let roll: f64 = self.rng.gen();
        let outcome = if roll < 0.002 {
            Outcome::Crashed {
                unique: self.rng.gen_bool(0.4),
            }
        } else if roll < 0.02 {
            Outcome::TimedOut
        } else if roll < 0.25 {
            Outcome::Failed
        } else {
            let new_edges = if self.rng.gen_bool(0.05) {
                self.rng.gen_range(1..40)
            } else {
                0
            };
            Outcome::Succeeded { new_edges }
        };
        let type_collection = if !self.collect_runtime_types {
            TypeCollection::Disabled
        } else {
            match self.rng.gen_range(0..100) {
                0..=2 => TypeCollection::TimedOut,
                3 => TypeCollection::Failed,
                _ => TypeCollection::Collected,
            }
        };
        let worker_log = if !self.workers.is_empty() && self.rng.gen_bool(0.002) {
            let origin = self.workers[self.rng.gen_range(0..self.workers.len())];
            Some(LogEvent {
                origin,
                level: LogLevel::Info,
                label: "Worker".to_string(),
                message: format!("synchronized {} programs", self.rng.gen_range(1..20)),
            })
        } else {
            None
        };
        Step {
            program,
            outcome,
            type_collection,
            worker_log,
        }
    }
}

/// Applies a step on the engine queue.
fn apply(
    context: &mut EngineContext,
    step: Step,
    settings: &CampaignSettings,
    statistics: &CampaignStatistics,
) {
    let imported = context.phase() == Phase::CorpusImport;
    statistics.record(step.outcome, step.program.len(), step.type_collection);
    context.dispatch(EngineEvent::ProgramGenerated(ProgramGenerated {
        program: step.program.clone(),
    }));

    match step.outcome {
        Outcome::Succeeded { new_edges } if new_edges > 0 || imported => {
            context.set_corpus_size(context.corpus_size() + 1);
            context.log(
                LogLevel::Verbose,
                "Corpus",
                format!("Added program {} ({} new edges)", step.program.id, new_edges),
            );
        }
        Outcome::Crashed { unique } => {
            context.dispatch(EngineEvent::CrashFound(CrashEvent {
                program: step.program,
                is_unique: unique,
            }));
        }
        Outcome::TimedOut => {
            context.log(
                LogLevel::Verbose,
                "Executor",
                format!("Program {} timed out", step.program.id),
            );
        }
        _ => {}
    }
    if let Some(event) = step.worker_log {
        context.dispatch(EngineEvent::Log(event));
    }

    let corpus = context.corpus_size();
    match context.phase() {
        Phase::CorpusImport if corpus >= settings.import_size => {
            context.log(
                LogLevel::Info,
                "Fuzzer",
                format!("Corpus import finished with {corpus} programs"),
            );
            context.set_phase(Phase::InitialCorpusGeneration);
        }
        Phase::InitialCorpusGeneration if corpus >= settings.initial_corpus_size => {
            context.log(
                LogLevel::Info,
                "Fuzzer",
                format!("Initial corpus generated ({corpus} programs), switching to fuzzing"),
            );
            context.set_phase(Phase::Fuzzing);
        }
        _ => {}
    }
}

/// Drives `engine` until it stops or `max_executions` is reached.
pub async fn run_campaign(
    engine: FuzzEngine,
    statistics: Arc<CampaignStatistics>,
    settings: CampaignSettings,
) -> anyhow::Result<()> {
    let seed = settings.seed.unwrap_or_else(rand::random);
    info!("Simulated campaign starting (seed {seed}).");
    let mut campaign = Campaign {
        rng: StdRng::seed_from_u64(seed),
        workers: (0..settings.workers).map(|_| InstanceId::random()).collect(),
        collect_runtime_types: engine.config().collect_runtime_types,
        settings: settings.clone(),
        next_program_id: 0,
    };

    let import = settings.import_size > 0;
    engine
        .perform_on_queue(move |context| {
            if import {
                context.set_phase(Phase::CorpusImport);
                context.log(LogLevel::Info, "Fuzzer", "Importing corpus");
            }
        })
        .await?;

    let settings = Arc::new(settings);
    let mut clock = tokio::time::interval(Duration::from_millis(settings.step_millis.max(1)));
    let mut executions = 0u64;
    loop {
        tokio::select! {
            _ = engine.stopped() => break,
            _ = clock.tick() => {}
        }
        let step = campaign.next_step();
        let (settings, statistics) = (Arc::clone(&settings), Arc::clone(&statistics));
        if engine
            .enqueue(move |context| apply(context, step, &settings, &statistics))
            .is_err()
        {
            break;
        }
        executions += 1;
        if campaign.settings.max_executions > 0 && executions >= campaign.settings.max_executions {
            debug!("Execution budget of {executions} reached.");
            engine.shutdown(ShutdownReason::Finished).await?;
            break;
        }
    }
    info!("Simulated campaign stopped after {executions} executions.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(collect_runtime_types: bool) -> Campaign {
        Campaign {
            rng: StdRng::seed_from_u64(7),
            settings: CampaignSettings::default(),
            workers: vec![InstanceId::random()],
            collect_runtime_types,
            next_program_id: 0,
        }
    }

    #[test]
    fn programs_get_sequential_ids() {
        let mut campaign = campaign(false);
        let first = campaign.generate_program();
        let second = campaign.generate_program();
        assert_eq!((first.id, second.id), (0, 1));
        assert!((3..12).contains(&first.len()));
        assert!(first.instructions().iter().all(|i| i.inferred_type.is_none()));
    }

    #[test]
    fn types_are_attached_when_collected() {
        let mut campaign = campaign(true);
        let program = campaign.generate_program();
        assert!(program.instructions().iter().all(|i| i.inferred_type.is_some()));
    }

    #[test]
    fn statistics_rates_follow_the_counters() {
        let statistics = CampaignStatistics::new(false, 3);
        statistics.record(Outcome::Succeeded { new_edges: 500 }, 10, TypeCollection::Disabled);
        statistics.record(Outcome::TimedOut, 4, TypeCollection::Disabled);
        statistics.record(Outcome::Crashed { unique: true }, 6, TypeCollection::Disabled);
        statistics.record(Outcome::Failed, 0, TypeCollection::Disabled);

        let snapshot = statistics.compute();
        assert_eq!(snapshot.total_samples, 4);
        assert_eq!(snapshot.interesting_samples, 1);
        assert_eq!(snapshot.crashing_samples, 1);
        assert_eq!(snapshot.success_rate, 0.25);
        assert_eq!(snapshot.timeout_rate, 0.25);
        assert_eq!(snapshot.coverage, 0.01);
        assert_eq!(snapshot.avg_program_size, 5.0);
        assert_eq!(snapshot.connected_workers, 3);
    }

    #[test]
    fn empty_statistics_have_zero_rates() {
        let snapshot = CampaignStatistics::new(true, 0).compute();
        assert_eq!(snapshot.success_rate, 0.0);
        assert!(snapshot.collect_runtime_types);
    }
}
