//! # fuzzmon
//!
//! An event-driven terminal monitor for long-running, asynchronous
//! test-generation engines.
//!
//! The crate has two halves. The engine contract (`engine`, `events`,
//! `lifter`, `stats`) describes what a fuzzing engine offers its observers: a
//! single serialized execution context, typed event channels, a timer facility
//! and a few read-only views of its state. The `ui` module is the observer: it
//! renders log lines, unique crashes and on-demand program dumps, and prints a
//! statistics report every minute and once more at shutdown.
//!
//! ## Core Concepts
//!
//! - **The queue**: every piece of engine state is owned by one dispatcher
//!   task. Work is handed to it with `perform_on_queue`, which waits for the
//!   work to finish, so registration is ordered before anything the engine does next.
//! - **Closed events**: `EngineEvent` has one variant per channel; observers
//!   subscribe to exactly the channels they care about.
//! - **Scheduled tasks**: recurring work runs on the engine clock and is torn
//!   down together with the dispatcher.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fuzzmon::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Spawn the engine's dispatcher.
//!     let engine = FuzzEngine::new(FuzzerConfig::default());
//!
//!     // 2. Attach the monitor before the engine starts working.
//!     let _ui = TerminalUi::attach(&engine, MonitorConfig::default()).await?;
//!
//!     // 3. Run until Ctrl+C.
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const MONITOR_NAME: &str = "fuzzmon";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod events;
pub mod lifter;
pub mod stats;
pub mod ui;

/// A prelude module for easy importing of the most common fuzzmon types.
pub mod prelude {
    pub use crate::common::{InstanceId, TaskId};
    pub use crate::config::{ColorMode, FuzzerConfig, MonitorConfig, TimerResolution};
    pub use crate::engine::{EngineContext, FuzzEngine, Phase};
    pub use crate::events::{
        CrashEvent, EngineEvent, LogEvent, LogLevel, ProgramGenerated, Shutdown, ShutdownReason,
    };
    pub use crate::lifter::{Instruction, LiftOptions, Lifter, Program, TextLifter};
    pub use crate::stats::{Statistics, StatisticsProvider};
    pub use crate::ui::{Output, TerminalUi};
}
