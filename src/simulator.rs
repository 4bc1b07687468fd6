use crate::access::{AccessSequence, FileSet};
use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::io::TraceDoc;
use crate::policies::build_policy;
use crate::reuse::FullReuseIndex;
use crate::state::StateProcessor;
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::units::BytesSize;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one configured run. A failed run keeps the stats it accumulated up to the
/// failing access, alongside the error that ended it.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub name: String,
    pub policy: String,
    pub capacity: BytesSize,
    pub stats: StatsSnapshot,
    pub accesses_processed: usize,
    pub halted_early: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub part_size: BytesSize,
    pub accesses: usize,
    pub runs: Vec<RunResult>,
}

/// Replays one normalized trace against every configured run.
///
/// The sequence (and the reuse index, when an offline-optimal run asks for one) is
/// built once and shared immutably, so runs can execute sequentially or spread across
/// threads without duplicating the trace in memory. Runs are independent: an error in
/// one aborts that run only.
pub struct Simulator {
    config: SimulationConfig,
    sequence: Arc<AccessSequence>,
    reuse: Option<Arc<FullReuseIndex>>,
    simulation_time: Duration,
}

impl Simulator {
    pub fn new(config: SimulationConfig, trace: TraceDoc) -> Result<Self, SimError> {
        // Part counts divide by the part size, so a zero must not reach the file set
        if config.part_size == 0 {
            return Err(SimError::InvalidConfig {
                reason: "part_size must be positive".to_string(),
            });
        }
        let files = FileSet::new(trace.files, config.part_size);
        let sequence = AccessSequence::from_raw(files, trace.accesses, config.part_size)?;
        let reuse = if config.runs.iter().any(|run| run.policy.requires_reuse_index()) {
            log::info!(
                "building reuse index over {} part touches",
                sequence.summary().total_parts
            );
            Some(Arc::new(FullReuseIndex::build(&sequence)))
        } else {
            None
        };
        Ok(Self {
            config,
            sequence: Arc::new(sequence),
            reuse,
            simulation_time: Duration::new(0, 0),
        })
    }

    pub fn sequence(&self) -> &AccessSequence {
        &self.sequence
    }

    fn run_one(&self, run_ind: usize) -> RunResult {
        let run = &self.config.runs[run_ind];
        let name = run.effective_name();
        log::info!(
            "run {name}: policy {}, capacity {} bytes",
            run.policy.kind_name(),
            run.capacity
        );
        let collector = StatsCollector::new(
            self.config.warm_up.clone(),
            self.config.stop_early.clone(),
        );
        // Offset the seed per run so same-policy runs do not share a random stream
        let seed = self.config.seed.wrapping_add(run_ind as u64);

        let policy = match build_policy(&run.policy, run.capacity, self.reuse.clone(), seed) {
            Ok(policy) => policy,
            Err(e) => {
                return RunResult {
                    name,
                    policy: run.policy.kind_name().to_string(),
                    capacity: run.capacity,
                    stats: StatsSnapshot::default(),
                    accesses_processed: 0,
                    halted_early: false,
                    error: Some(e),
                }
            }
        };

        let mut processor = StateProcessor::new(run.capacity, policy, collector);
        let error = processor.run(&self.sequence).err().map(|e| e.to_string());
        if let Some(e) = &error {
            log::warn!("run {name} aborted: {e}");
        }
        RunResult {
            name,
            policy: run.policy.kind_name().to_string(),
            capacity: run.capacity,
            stats: *processor.stats(),
            accesses_processed: processor.accesses_processed(),
            halted_early: processor.halted_early(),
            error,
        }
    }

    /// Executes all runs on the calling thread, in configuration order
    pub fn simulate(&mut self) -> SimulationReport {
        let start = Instant::now();
        let runs = (0..self.config.runs.len())
            .map(|ind| self.run_one(ind))
            .collect();
        self.simulation_time += start.elapsed();
        self.report(runs)
    }

    /// Executes every run on its own thread. Results come back in configuration order
    /// regardless of completion order.
    pub fn simulate_parallel(&mut self) -> SimulationReport {
        let start = Instant::now();
        let this = &*self;
        let runs = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..this.config.runs.len())
                .map(|ind| scope.spawn(move || this.run_one(ind)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(_) => panic!("simulation worker panicked"),
                })
                .collect()
        });
        self.simulation_time += start.elapsed();
        self.report(runs)
    }

    fn report(&self, runs: Vec<RunResult>) -> SimulationReport {
        SimulationReport {
            part_size: self.config.part_size,
            accesses: self.sequence.len(),
            runs,
        }
    }

    pub fn get_execution_time(&self) -> &Duration {
        &self.simulation_time
    }
}
