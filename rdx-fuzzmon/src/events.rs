//! Defines all public event types dispatched by the engine.
//!
//! The set of events is closed: [`EngineEvent`] has one variant per channel and
//! every channel carries its own strongly-typed payload. Observers subscribe to
//! a single channel through [`EngineContext::events`](crate::engine::EngineContext::events).

use crate::common::InstanceId;
use crate::lifter::Program;
use serde::Deserialize;
use std::fmt;

/// Severity of a log event, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Verbose,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// Every level, least severe first.
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Verbose,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
    ];
}

/// A log line emitted by an engine instance.
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// The instance that produced the line. Remote workers forward their logs
    /// to the local engine, so this is not always the local id.
    pub origin: InstanceId,
    pub level: LogLevel,
    /// Short tag naming the emitting component, e.g. `Corpus` or `Sync`.
    pub label: String,
    pub message: String,
}

/// Fired when an executed program crashed the target.
#[derive(Debug, Clone)]
pub struct CrashEvent {
    pub program: Program,
    /// `false` when the crash reproduces one already reported.
    pub is_unique: bool,
}

/// Fired for every program the engine generates.
#[derive(Debug, Clone)]
pub struct ProgramGenerated {
    pub program: Program,
}

/// Why the engine is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The operator asked the engine to stop (e.g. Ctrl+C).
    UserInitiated,
    /// The campaign reached its configured end.
    Finished,
    /// A fatal error was logged.
    FatalError,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShutdownReason::UserInitiated => "user initiated",
            ShutdownReason::Finished => "finished",
            ShutdownReason::FatalError => "fatal error",
        };
        f.write_str(text)
    }
}

/// Fired once when the engine stops dispatching.
#[derive(Debug, Clone, Copy)]
pub struct Shutdown {
    pub reason: ShutdownReason,
}

/// The engine's closed set of events, one variant per channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Log(LogEvent),
    CrashFound(CrashEvent),
    ProgramGenerated(ProgramGenerated),
    /// Fired once, after the engine finished its startup work.
    Initialized,
    Shutdown(Shutdown),
}
