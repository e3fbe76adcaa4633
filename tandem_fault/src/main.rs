//! # Tandem Fault Supervisor Demo
//!
//! Scripted cooperative run of the fault core: a privileged supervisor
//! task plus two workers cycle round-robin. Mid-run one worker files a
//! fatal error about itself at the supervisor and then moves on without
//! resolving it; the supervisor's reconciliation pass detects the missed
//! resolution, declares a component failure, and drives coordinated
//! shutdown. Every task obeys the `ExecutionCommand` returned from its
//! per-cycle fault processing.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use tandem_common::command::ExecutionCommand;
use tandem_common::config::{ConfigError, ConfigLoader, RuntimeConfig};
use tandem_common::impact::Impact;
use tandem_common::record::{ErrorIdSource, ErrorRecord};
use tandem_common::task::{Lifecycle, PhaseId, TaskId, TaskProbe, TaskRights, TaskSnapshot};
use tandem_fault::coordinator::{FaultContext, FaultCoordinator, FaultHooks};
use tandem_fault::foreign::ForeignErrorTable;
use tandem_fault::reconciler::TaskDirectory;

/// Tandem Fault Supervisor — scripted fault-containment walkthrough
#[derive(Parser, Debug)]
#[command(name = "tandem_fault")]
#[command(version)]
#[command(about = "Scripted cooperative run of the Tandem fault core")]
struct Args {
    /// Path to runtime configuration TOML (tandem.toml).
    #[arg(default_value = "config/tandem.toml")]
    config: PathBuf,

    /// Maximum number of scheduler cycles before giving up.
    #[arg(long, default_value_t = 16)]
    max_cycles: u64,

    /// Cycle at which worker 2 files its fatal error.
    #[arg(long, default_value_t = 3)]
    fault_cycle: u64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Tandem fault supervisor v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Tandem fault supervisor shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    match RuntimeConfig::load(&args.config) {
        Ok(config) => {
            config.validate()?;
            info!(
                "Config OK: service={}, queue_capacity={}",
                config.shared.service_name, config.fault.queue_capacity
            );
        }
        Err(ConfigError::FileNotFound) => {
            warn!(
                "No config at '{}', running with defaults",
                args.config.display()
            );
        }
        Err(e) => return Err(Box::new(e)),
    }

    let mut scheduler = Scheduler::new()?;
    scheduler.run(args.max_cycles, args.fault_cycle)
}

// ─── Scripted cooperative scheduler ─────────────────────────────────

const SUPERVISOR: TaskId = TaskId(1);
const WORKER_A: TaskId = TaskId(2);
const WORKER_B: TaskId = TaskId(3);

/// Process-wide lifecycle state shared by every task.
#[derive(Default)]
struct LifecycleState {
    component_failure: AtomicBool,
    shutting_down: AtomicBool,
}

impl Lifecycle for LifecycleState {
    fn is_operable(&self) -> bool {
        true
    }
    fn has_component_failure(&self) -> bool {
        self.component_failure.load(Ordering::Acquire)
    }
    fn is_global_die_mode(&self) -> bool {
        false
    }
    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
    fn coordinated_shutdown_enabled(&self) -> bool {
        true
    }
    fn command_for(&self, _task: TaskId) -> ExecutionCommand {
        if self.has_component_failure() {
            ExecutionCommand::Stop
        } else {
            ExecutionCommand::Continue
        }
    }
    fn mark_component_failure(&self) {
        self.component_failure.store(true, Ordering::Release);
    }
    fn begin_coordinated_shutdown(&self) {
        info!("coordinated shutdown begins");
        self.shutting_down.store(true, Ordering::Release);
    }
}

/// Live state of one scripted task.
struct Task {
    id: TaskId,
    phase: AtomicU32,
    generation: AtomicU64,
    running: AtomicBool,
    coordinator: Arc<FaultCoordinator>,
}

impl Task {
    fn new(id: TaskId, rights: TaskRights, ids: &ErrorIdSource) -> Result<Self, Box<dyn std::error::Error>> {
        let coordinator = Arc::new(FaultCoordinator::new(id, rights, ids.clone()));
        coordinator.set_up()?;
        Ok(Self {
            id,
            phase: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            running: AtomicBool::new(true),
            coordinator,
        })
    }

    fn advance(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl TaskProbe for Task {
    fn current_phase(&self) -> PhaseId {
        PhaseId(self.phase.load(Ordering::Relaxed))
    }
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
    fn is_aborting(&self) -> bool {
        false
    }
}

/// Directory over the scripted task set.
struct Directory<'a> {
    tasks: &'a [Task],
}

impl TaskDirectory for Directory<'_> {
    fn snapshot_of(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.tasks
            .iter()
            .find(|t| t.id == id && t.is_running())
            .map(|t| t.snapshot())
    }
    fn listener_tables(&self) -> Vec<Arc<ForeignErrorTable>> {
        self.tasks
            .iter()
            .filter_map(|t| t.coordinator.foreign_table())
            .collect()
    }
}

/// Hooks that log every decision the demo makes.
struct LoggingHooks {
    task: TaskId,
}

impl FaultHooks for LoggingHooks {
    fn on_internal_defect(&mut self, record: &ErrorRecord) -> ExecutionCommand {
        error!(task = %self.task, msg = record.message(), "internal defect");
        ExecutionCommand::Abort
    }
    fn on_own_die(&mut self, record: &ErrorRecord) -> ExecutionCommand {
        warn!(task = %self.task, msg = record.message(), "own die-mode error");
        ExecutionCommand::Stop
    }
    fn on_own_fatal(&mut self, record: &ErrorRecord) -> ExecutionCommand {
        error!(task = %self.task, msg = record.message(), "own fatal error");
        ExecutionCommand::Abort
    }
    fn on_lifecycle_own_error(&mut self, record: &ErrorRecord) -> ExecutionCommand {
        error!(task = %self.task, msg = record.message(), "lifecycle task own error");
        ExecutionCommand::Stop
    }
    fn on_foreign_fatals(&mut self, batch: &[ErrorRecord]) -> ExecutionCommand {
        warn!(task = %self.task, count = batch.len(), "observed foreign fatals");
        ExecutionCommand::Continue
    }
    fn on_component_failure(&mut self, task: TaskId, record: &ErrorRecord) -> ExecutionCommand {
        error!(
            failed = %task,
            id = record.id().0,
            "component failure declared"
        );
        ExecutionCommand::Stop
    }
}

struct Scheduler {
    lifecycle: LifecycleState,
    tasks: Vec<Task>,
    ids: ErrorIdSource,
}

impl Scheduler {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let ids = ErrorIdSource::new();
        let tasks = vec![
            Task::new(
                SUPERVISOR,
                TaskRights::FOREIGN_LISTENER | TaskRights::LIFECYCLE_OWNER,
                &ids,
            )?,
            Task::new(WORKER_A, TaskRights::empty(), &ids)?,
            Task::new(WORKER_B, TaskRights::empty(), &ids)?,
        ];
        Ok(Self {
            lifecycle: LifecycleState::default(),
            tasks,
            ids,
        })
    }

    fn run(
        &mut self,
        max_cycles: u64,
        fault_cycle: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for cycle in 1..=max_cycles {
            info!(cycle, "scheduler cycle");

            // Worker B hits its scripted fault: it files a fatal about
            // itself at the supervisor, then keeps cycling as if nothing
            // happened. The supervisor must catch the missed resolution.
            if cycle == fault_cycle {
                let worker = self.task(WORKER_B);
                let record = ErrorRecord::new(
                    &self.ids,
                    WORKER_B,
                    Impact::FatalError,
                    worker.current_phase(),
                    worker.current_generation(),
                    "scripted sensor failure",
                );
                let supervisor = self.task(SUPERVISOR);
                if !supervisor.coordinator.add_error(record) {
                    error!("supervisor refused the foreign record");
                }
            }

            let mut any_running = false;
            for i in 0..self.tasks.len() {
                let task = &self.tasks[i];
                if !task.is_running() {
                    continue;
                }
                // Shutdown staging is the scheduler's job; tasks wind down
                // without another fault-processing pass.
                if self.lifecycle.is_shutting_down() {
                    info!(task = %task.id, "winding down");
                    task.stop();
                    continue;
                }
                any_running = true;

                let directory = Directory { tasks: &self.tasks };
                let cx = FaultContext {
                    task,
                    lifecycle: &self.lifecycle,
                    directory: (task.id == SUPERVISOR).then_some(&directory as &dyn TaskDirectory),
                };
                let mut hooks = LoggingHooks { task: task.id };
                let command = task.coordinator.process_errors(&cx, &mut hooks, false);

                match command {
                    ExecutionCommand::Continue => task.advance(),
                    ExecutionCommand::Stop => {
                        info!(task = %task.id, "stopping after this cycle");
                        task.stop();
                    }
                    ExecutionCommand::Abort => {
                        warn!(task = %task.id, "aborting");
                        task.stop();
                    }
                }
            }

            if !any_running {
                info!(cycle, "all tasks stopped");
                return Ok(());
            }
        }

        if self.tasks.iter().any(|t| t.is_running()) {
            warn!("cycle budget exhausted with tasks still running");
        }
        Ok(())
    }

    fn task(&self, id: TaskId) -> &Task {
        // The scripted task set is fixed at construction.
        self.tasks
            .iter()
            .find(|t| t.id == id)
            .unwrap_or(&self.tasks[0])
    }
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
