//! The terminal monitor: turns engine events into colorized stdout lines.
//!
//! [`TerminalUi::attach`] registers one handler per event channel on the
//! engine queue and returns only once they are in place. From then on the
//! monitor is purely reactive: every print happens inside an engine handler or
//! in the periodic report task the engine schedules for it.

pub mod color;
pub mod report;

use crate::common::InstanceId;
use crate::config::MonitorConfig;
use crate::engine::{EngineContext, FuzzEngine};
use crate::events::{CrashEvent, LogEvent, ProgramGenerated, Shutdown};
use crate::lifter::LiftOptions;
use crate::stats::StatisticsProvider;
use colored::Colorize;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub use color::color_for;
pub use report::{format_report, phase_label, ReportInputs};

/// Where the monitor writes. Clones share the same sink.
#[derive(Clone)]
pub struct Output {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Output {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Writes `line` followed by a newline.
    ///
    /// Write errors drop the line: the monitor must never take the engine
    /// down with it.
    pub fn line(&self, line: impl Display) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(sink, "{line}").ok();
        sink.flush().ok();
    }

    /// Writes `text`, terminated by a newline if it does not already end with one.
    pub fn text(&self, text: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_all(text.as_bytes()).ok();
        if !text.ends_with('\n') {
            sink.write_all(b"\n").ok();
        }
        sink.flush().ok();
    }
}

/// The one-shot "print the next generated program" request.
///
/// Only armed and consumed on the engine queue, which serializes both sides;
/// the atomic swap additionally makes the consume step a single operation.
#[derive(Clone, Default)]
struct DebugToggle(Arc<AtomicBool>);

impl DebugToggle {
    fn arm(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Clears the toggle, returning whether it was set.
    fn consume(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }

    fn is_armed(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A handle to a monitor attached to an engine.
pub struct TerminalUi {
    engine: FuzzEngine,
    print_next_generated_program: DebugToggle,
}

impl TerminalUi {
    /// Attaches a monitor printing to stdout.
    pub async fn attach(engine: &FuzzEngine, config: MonitorConfig) -> anyhow::Result<Self> {
        Self::attach_with_output(engine, config, Output::stdout()).await
    }

    /// Registers all handlers on the engine queue and waits until they are in
    /// place. Call this before starting the engine so no event is missed.
    pub async fn attach_with_output(
        engine: &FuzzEngine,
        config: MonitorConfig,
        output: Output,
    ) -> anyhow::Result<Self> {
        let toggle = DebugToggle::default();
        let handlers = Handlers {
            config: Arc::new(config),
            output,
            print_next_generated_program: toggle.clone(),
        };
        engine
            .perform_on_queue(move |context| handlers.register(context))
            .await?;
        Ok(Self {
            engine: engine.clone(),
            print_next_generated_program: toggle,
        })
    }

    /// Requests a dump of the next generated program.
    ///
    /// The request is handed to the engine queue. Repeated requests before the
    /// next program still print exactly one.
    pub async fn print_next_generated_program(&self) -> anyhow::Result<()> {
        let toggle = self.print_next_generated_program.clone();
        self.engine.perform_on_queue(move |_| toggle.arm()).await
    }

    /// Whether a dump request is still pending.
    pub async fn is_program_dump_pending(&self) -> anyhow::Result<bool> {
        let toggle = self.print_next_generated_program.clone();
        self.engine.perform_on_queue(move |_| toggle.is_armed()).await
    }
}

/// State shared by the registered handlers.
#[derive(Clone)]
struct Handlers {
    config: Arc<MonitorConfig>,
    output: Output,
    print_next_generated_program: DebugToggle,
}

impl Handlers {
    fn register(self, context: &mut EngineContext) {
        let local = context.id();
        let events = context.events();

        let this = self.clone();
        events
            .log
            .observe(move |_, event| this.on_log(local, event));

        let this = self.clone();
        events
            .crash_found
            .observe(move |context, event| this.on_crash(context, event));

        let this = self.clone();
        events
            .program_generated
            .observe(move |context, event| this.on_program_generated(context, event));

        events
            .initialized
            .observe(move |context, _| self.on_initialized(context));
    }

    fn on_log(&self, local: InstanceId, event: &LogEvent) {
        if event.level < self.config.min_log_level {
            return;
        }
        let line = render_log_line(local, event);
        self.output.line(line.color(color_for(event.level)));
    }

    fn on_crash(&self, context: &EngineContext, event: &CrashEvent) {
        if !event.is_unique {
            return;
        }
        let banner = format!(
            "########## Unique crash found (program {}) ##########",
            event.program.id
        );
        self.output.line(banner.red().bold());
        let code = context
            .lifter()
            .lift(&event.program, LiftOptions::IncludeComments);
        self.output.text(&code);
    }

    fn on_program_generated(&self, context: &EngineContext, event: &ProgramGenerated) {
        if !self.print_next_generated_program.consume() {
            return;
        }
        let banner = format!(
            "========== Generated program {} ==========",
            event.program.id
        );
        self.output.line(banner.cyan().bold());
        let code = context.lifter().lift(&event.program, LiftOptions::DumpTypes);
        self.output.text(&code);
    }

    /// Installs statistics reporting if the engine has a statistics collaborator.
    /// Without one, reporting stays off for the rest of the run.
    fn on_initialized(&self, context: &mut EngineContext) {
        let Some(statistics) = context.statistics() else {
            return;
        };

        let this = self.clone();
        let final_statistics = Arc::clone(&statistics);
        context
            .events()
            .shutdown
            .observe(move |context, event| this.on_shutdown(context, event, &*final_statistics));

        let this = self.clone();
        context.schedule_task(self.config.report_interval(), move |context| {
            this.print_report(context, &*statistics, false);
            this.output.line("");
        });
    }

    fn on_shutdown(
        &self,
        context: &EngineContext,
        event: &Shutdown,
        statistics: &dyn StatisticsProvider,
    ) {
        self.output.line("");
        let banner = format!("++++++++++ Fuzzing finished ({}) ++++++++++", event.reason);
        self.output.line(banner.green().bold());
        self.output.line("");
        self.print_report(context, statistics, true);
    }

    fn print_report(
        &self,
        context: &EngineContext,
        statistics: &dyn StatisticsProvider,
        final_report: bool,
    ) {
        let snapshot = statistics.compute();
        let inputs = ReportInputs::from_context(context, final_report);
        self.output.text(&format_report(&inputs, &snapshot));
    }
}

/// `[label] message` for local lines, `[shortId:label] message` for lines
/// forwarded from another instance.
pub fn render_log_line(local: InstanceId, event: &LogEvent) -> String {
    if event.origin == local {
        format!("[{}] {}", event.label, event.message)
    } else {
        format!(
            "[{}:{}] {}",
            event.origin.short(),
            event.label,
            event.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogLevel;

    fn event(origin: InstanceId) -> LogEvent {
        LogEvent {
            origin,
            level: LogLevel::Warning,
            label: "Corpus".to_string(),
            message: "imported 12 programs".to_string(),
        }
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn text_always_ends_on_a_fresh_line() {
        let buffer = Buffer::default();
        let output = Output::new(buffer.clone());
        output.text("let v0 = 1;");
        output.text("let v1 = 2;\n");
        output.line("done");
        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "let v0 = 1;\nlet v1 = 2;\ndone\n");
    }

    #[test]
    fn local_lines_carry_only_the_label() {
        let local = InstanceId::random();
        assert_eq!(
            render_log_line(local, &event(local)),
            "[Corpus] imported 12 programs"
        );
    }

    #[test]
    fn remote_lines_carry_the_short_origin() {
        let local = InstanceId::random();
        let remote = InstanceId::random();
        let line = render_log_line(local, &event(remote));
        assert!(line.starts_with(&format!("[{}:Corpus] ", remote.short())));
        assert!(remote.to_string().starts_with(&remote.short()));
    }

    #[test]
    fn toggle_consumes_once() {
        let toggle = DebugToggle::default();
        assert!(!toggle.consume());
        toggle.arm();
        toggle.arm();
        assert!(toggle.is_armed());
        assert!(toggle.consume());
        assert!(!toggle.consume());
    }
}
