//! The engine handle, its serialized execution context and the event channels.
//!
//! All engine state lives in an [`EngineContext`] owned by a single dispatcher
//! task. Nothing touches that state from anywhere else: callers hand closures
//! to the dispatcher through [`FuzzEngine::perform_on_queue`] and every event
//! handler and scheduled task runs there too, one at a time.

use crate::common::{InstanceId, TaskId};
use crate::components::timer::ScheduledTask;
use crate::config::FuzzerConfig;
use crate::events::{
    CrashEvent, EngineEvent, LogEvent, LogLevel, ProgramGenerated, Shutdown, ShutdownReason,
};
use crate::lifter::{Lifter, TextLifter};
use crate::stats::StatisticsProvider;
use anyhow::anyhow;
use slotmap::SlotMap;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace};

/// A unit of work executed on the engine's queue.
type Job = Box<dyn FnOnce(&mut EngineContext) + Send>;

/// A subscriber to one event channel.
pub type Handler<T> = Box<dyn FnMut(&mut EngineContext, &T) + Send>;

/// The engine's high-level operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Importing an existing corpus.
    CorpusImport,
    /// Generating the first samples from scratch.
    InitialCorpusGeneration,
    /// Steady-state fuzzing.
    Fuzzing,
}

/// The handlers registered for one kind of event, in registration order.
pub struct Channel<T> {
    handlers: Vec<Handler<T>>,
}

impl<T> Channel<T> {
    /// Registers `handler`. It runs on the engine queue for every later event.
    pub fn observe(&mut self, handler: impl FnMut(&mut EngineContext, &T) + Send + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

/// One channel per [`EngineEvent`] variant.
#[derive(Default)]
pub struct Events {
    pub log: Channel<LogEvent>,
    pub crash_found: Channel<CrashEvent>,
    pub program_generated: Channel<ProgramGenerated>,
    pub initialized: Channel<()>,
    pub shutdown: Channel<Shutdown>,
}

/// The engine's state, confined to the dispatcher task.
pub struct EngineContext {
    id: InstanceId,
    config: Arc<FuzzerConfig>,
    phase: Phase,
    strategy_name: String,
    corpus_size: usize,
    lifter: Arc<dyn Lifter>,
    statistics: Option<Arc<dyn StatisticsProvider>>,
    events: Events,
    tasks: SlotMap<TaskId, ScheduledTask>,
    /// Events raised while another event is being delivered.
    pending: VecDeque<EngineEvent>,
    dispatching: bool,
    initialized: bool,
    shutdown_reason: Option<ShutdownReason>,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("strategy_name", &self.strategy_name)
            .field("corpus_size", &self.corpus_size)
            .field("tasks", &self.tasks.len())
            .field("initialized", &self.initialized)
            .field("shutdown_reason", &self.shutdown_reason)
            .finish()
    }
}

// Read access and engine-side mutation.
impl EngineContext {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn config(&self) -> &FuzzerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Phase change: {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Name of the active generation strategy.
    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn set_strategy_name(&mut self, name: impl Into<String>) {
        self.strategy_name = name.into();
    }

    pub fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    pub fn set_corpus_size(&mut self, size: usize) {
        self.corpus_size = size;
    }

    pub fn lifter(&self) -> Arc<dyn Lifter> {
        Arc::clone(&self.lifter)
    }

    /// The statistics collaborator, if the engine was built with one.
    pub fn statistics(&self) -> Option<Arc<dyn StatisticsProvider>> {
        self.statistics.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_reason.is_some()
    }

    /// The event channels, for registering handlers.
    pub fn events(&mut self) -> &mut Events {
        &mut self.events
    }
}

// Dispatch and scheduling.
impl EngineContext {
    /// Delivers `event` to every handler of its channel, in registration order.
    ///
    /// A handler may register further handlers, including on the channel being
    /// dispatched; those only see later events. Events raised from inside a
    /// handler are queued and delivered once the current event has reached
    /// every handler. A panicking handler is logged and skipped, the remaining
    /// handlers still run.
    pub fn dispatch(&mut self, event: EngineEvent) {
        self.pending.push_back(event);
        if self.dispatching {
            return;
        }
        self.dispatching = true;
        while let Some(event) = self.pending.pop_front() {
            self.deliver(event);
        }
        self.dispatching = false;
    }

    fn deliver(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Log(payload) => self.emit(|events| &mut events.log, &payload),
            EngineEvent::CrashFound(payload) => {
                self.emit(|events| &mut events.crash_found, &payload)
            }
            EngineEvent::ProgramGenerated(payload) => {
                self.emit(|events| &mut events.program_generated, &payload)
            }
            EngineEvent::Initialized => self.emit(|events| &mut events.initialized, &()),
            EngineEvent::Shutdown(payload) => self.emit(|events| &mut events.shutdown, &payload),
        }
    }

    fn emit<T>(&mut self, channel: fn(&mut Events) -> &mut Channel<T>, payload: &T) {
        let mut handlers = std::mem::take(&mut channel(&mut self.events).handlers);
        for handler in handlers.iter_mut() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(self, payload)));
            if outcome.is_err() {
                error!("An event handler panicked. Continuing dispatch.");
            }
        }
        let registered_meanwhile = &mut channel(&mut self.events).handlers;
        handlers.append(registered_meanwhile);
        *registered_meanwhile = handlers;
    }

    /// Emits a log event originating from this instance.
    pub fn log(&mut self, level: LogLevel, label: impl Into<String>, message: impl Into<String>) {
        let event = LogEvent {
            origin: self.id,
            level,
            label: label.into(),
            message: message.into(),
        };
        self.dispatch(EngineEvent::Log(event));
    }

    /// Registers `action` to run every `every` on the engine clock.
    ///
    /// Tasks live as long as the dispatcher; they are dropped with it when the
    /// engine stops, so no explicit cancellation is required.
    pub fn schedule_task(
        &mut self,
        every: Duration,
        action: impl FnMut(&mut EngineContext) + Send + 'static,
    ) -> TaskId {
        let task = ScheduledTask::new(every, Box::new(action), Instant::now());
        let id = self.tasks.insert(task);
        debug!("Scheduled task {:?} every {:?}", id, every);
        id
    }

    /// Removes a scheduled task. Returns `true` if it was still registered.
    pub fn cancel_task(&mut self, id: TaskId) -> bool {
        self.tasks.remove(id).is_some()
    }

    pub fn scheduled_tasks(&self) -> usize {
        self.tasks.len()
    }

    #[doc(hidden)]
    fn run_due_tasks(&mut self, now: Instant) {
        let due: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.is_due(now))
            .map(|(id, _)| id)
            .collect();
        for id in due {
            let Some(mut action) = self.tasks.get_mut(id).and_then(ScheduledTask::take_action)
            else {
                continue;
            };
            trace!("Running scheduled task {:?}", id);
            if panic::catch_unwind(AssertUnwindSafe(|| action(self))).is_err() {
                error!("Scheduled task {:?} panicked.", id);
            }
            if let Some(task) = self.tasks.get_mut(id) {
                task.restore(action, now);
            }
        }
    }

    /// Marks startup complete and fires `Initialized`. Only the first call has an effect.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        info!("Engine {} initialized.", self.id.short());
        self.dispatch(EngineEvent::Initialized);
    }

    /// Fires `Shutdown` and stops the dispatcher after the current job.
    /// Only the first call has an effect.
    pub fn shutdown(&mut self, reason: ShutdownReason) {
        if self.shutdown_reason.is_some() {
            return;
        }
        info!("Engine {} shutting down ({}).", self.id.short(), reason);
        self.shutdown_reason = Some(reason);
        self.dispatch(EngineEvent::Shutdown(Shutdown { reason }));
    }
}

/// Builds a [`FuzzEngine`] and spawns its dispatcher.
pub struct EngineBuilder {
    config: FuzzerConfig,
    id: InstanceId,
    strategy_name: String,
    lifter: Arc<dyn Lifter>,
    statistics: Option<Arc<dyn StatisticsProvider>>,
}

impl EngineBuilder {
    pub fn id(mut self, id: InstanceId) -> Self {
        self.id = id;
        self
    }

    pub fn strategy_name(mut self, name: impl Into<String>) -> Self {
        self.strategy_name = name.into();
        self
    }

    pub fn lifter(mut self, lifter: Arc<dyn Lifter>) -> Self {
        self.lifter = lifter;
        self
    }

    pub fn statistics(mut self, provider: Arc<dyn StatisticsProvider>) -> Self {
        self.statistics = Some(provider);
        self
    }

    /// Spawns the dispatcher task. Must be called inside a Tokio runtime.
    ///
    /// The queue accepts work immediately; the engine itself stays idle until
    /// [`FuzzEngine::initialize`] or [`FuzzEngine::run`].
    pub fn spawn(self) -> FuzzEngine {
        let resolution = self.config.resolution.period();
        let config = Arc::new(self.config);
        let context = EngineContext {
            id: self.id,
            config: Arc::clone(&config),
            phase: Phase::InitialCorpusGeneration,
            strategy_name: self.strategy_name,
            corpus_size: 0,
            lifter: self.lifter,
            statistics: self.statistics,
            events: Events::default(),
            tasks: SlotMap::with_key(),
            pending: VecDeque::new(),
            dispatching: false,
            initialized: false,
            shutdown_reason: None,
        };

        let (job_sender, job_receiver) = mpsc::unbounded_channel();
        let (stopped_sender, stopped) = watch::channel(false);
        tokio::spawn(dispatcher_loop(context, job_receiver, resolution, stopped_sender));

        FuzzEngine {
            id: self.id,
            config,
            job_sender,
            stopped,
        }
    }
}

/// A cloneable handle to a running engine.
#[derive(Clone)]
pub struct FuzzEngine {
    id: InstanceId,
    config: Arc<FuzzerConfig>,
    job_sender: mpsc::UnboundedSender<Job>,
    stopped: watch::Receiver<bool>,
}

impl FuzzEngine {
    /// Starts configuring an engine with a fresh random id, the `TextLifter`
    /// and no statistics collaborator.
    pub fn builder(config: FuzzerConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            id: InstanceId::random(),
            strategy_name: "MutationEngine".to_string(),
            lifter: Arc::new(TextLifter),
            statistics: None,
        }
    }

    /// Shorthand for `FuzzEngine::builder(config).spawn()`.
    pub fn new(config: FuzzerConfig) -> Self {
        Self::builder(config).spawn()
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn config(&self) -> &FuzzerConfig {
        &self.config
    }

    /// Runs `job` on the engine queue and waits for its result.
    ///
    /// Everything the job does happens-before this call returns, and no
    /// handler or task runs concurrently with it.
    pub async fn perform_on_queue<R>(
        &self,
        job: impl FnOnce(&mut EngineContext) -> R + Send + 'static,
    ) -> anyhow::Result<R>
    where
        R: Send + 'static,
    {
        let (reply_sender, reply) = oneshot::channel();
        self.enqueue(move |context| {
            reply_sender.send(job(context)).ok();
        })?;
        reply
            .await
            .map_err(|_| anyhow!("engine stopped before the job completed"))
    }

    /// Queues `job` without waiting for it to run.
    pub fn enqueue(
        &self,
        job: impl FnOnce(&mut EngineContext) + Send + 'static,
    ) -> anyhow::Result<()> {
        self.job_sender
            .send(Box::new(job))
            .map_err(|_| anyhow!("engine queue is closed"))
    }

    /// Dispatches `event` on the engine queue.
    pub fn emit(&self, event: EngineEvent) -> anyhow::Result<()> {
        self.enqueue(move |context| context.dispatch(event))
    }

    /// Completes startup and fires `Initialized`.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        self.perform_on_queue(|context| context.initialize()).await
    }

    /// Fires `Shutdown` and waits until the dispatcher has stopped.
    pub async fn shutdown(&self, reason: ShutdownReason) -> anyhow::Result<()> {
        // A closed queue means the engine is already down.
        if self.enqueue(move |context| context.shutdown(reason)).is_ok() {
            self.stopped().await;
        }
        Ok(())
    }

    /// Resolves once the dispatcher has exited.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        stopped.wait_for(|stopped| *stopped).await.ok();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Initializes the engine and runs until Ctrl+C or until something else
    /// shuts it down.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("FuzzEngine {} starting up...", self.id.short());
        self.initialize().await?;
        info!(
            "Engine running with {:?} scheduler resolution. Press Ctrl+C to shut down.",
            self.config.resolution
        );
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received.");
                self.shutdown(ShutdownReason::UserInitiated).await?;
            }
            _ = self.stopped() => {}
        }
        info!("FuzzEngine has shut down.");
        Ok(())
    }
}

#[doc(hidden)]
async fn dispatcher_loop(
    mut context: EngineContext,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    resolution: Duration,
    stopped: watch::Sender<bool>,
) {
    let mut clock = tokio::time::interval(resolution);
    clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            job = jobs.recv() => {
                let Some(job) = job else { break };
                if panic::catch_unwind(AssertUnwindSafe(|| job(&mut context))).is_err() {
                    error!("A queued job panicked.");
                }
            }
            now = clock.tick() => {
                context.run_due_tasks(now);
            }
        }
        if context.is_shutting_down() {
            break;
        }
    }
    debug!(
        "Dispatcher exiting, dropping {} scheduled task(s).",
        context.scheduled_tasks()
    );
    drop(context);
    drop(jobs);
    stopped.send_replace(true);
}
