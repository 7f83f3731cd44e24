use fuzzmon::prelude::*;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An output sink the test can read back.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reports how many snapshots were taken as the sample count.
#[derive(Default)]
struct CountingStatistics {
    computed: AtomicU64,
}

impl StatisticsProvider for CountingStatistics {
    fn compute(&self) -> Statistics {
        let computed = self.computed.fetch_add(1, Ordering::SeqCst) + 1;
        Statistics {
            total_samples: computed,
            ..Default::default()
        }
    }
}

async fn attached(engine: &FuzzEngine) -> (TerminalUi, Capture) {
    attached_with(engine, MonitorConfig::default()).await
}

async fn attached_with(engine: &FuzzEngine, config: MonitorConfig) -> (TerminalUi, Capture) {
    colored::control::set_override(false);
    let capture = Capture::default();
    let ui = TerminalUi::attach_with_output(engine, config, Output::new(capture.clone()))
        .await
        .unwrap();
    (ui, capture)
}

/// Waits until everything queued so far has been processed.
async fn drain(engine: &FuzzEngine) {
    engine.perform_on_queue(|_| ()).await.unwrap();
}

fn program(id: u64) -> Program {
    Program::new(
        id,
        vec![
            Instruction::new("let v0 = 42;")
                .with_comment("from seed")
                .with_type(".integer"),
            Instruction::new("v0.toString();"),
        ],
    )
}

#[tokio::test]
async fn log_lines_are_prefixed_by_origin() {
    let engine = FuzzEngine::new(FuzzerConfig::default());
    let (_ui, capture) = attached(&engine).await;
    let remote = InstanceId::random();

    engine
        .perform_on_queue(|context| context.log(LogLevel::Info, "Fuzzer", "started"))
        .await
        .unwrap();
    engine
        .emit(EngineEvent::Log(LogEvent {
            origin: remote,
            level: LogLevel::Warning,
            label: "Sync".to_string(),
            message: "worker connected".to_string(),
        }))
        .unwrap();
    drain(&engine).await;

    let output = capture.contents();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "[Fuzzer] started");
    assert_eq!(
        lines[1],
        format!("[{}:Sync] worker connected", remote.short())
    );
}

#[tokio::test]
async fn every_level_is_printed_by_default() {
    let engine = FuzzEngine::new(FuzzerConfig::default());
    let (_ui, capture) = attached(&engine).await;

    engine
        .perform_on_queue(|context| context.log(LogLevel::Verbose, "Mutator", "detail"))
        .await
        .unwrap();

    assert_eq!(capture.contents(), "[Mutator] detail\n");
}

#[tokio::test]
async fn lines_below_the_minimum_level_are_skipped() {
    let engine = FuzzEngine::new(FuzzerConfig::default());
    let config = MonitorConfig {
        min_log_level: LogLevel::Info,
        ..MonitorConfig::default()
    };
    let (_ui, capture) = attached_with(&engine, config).await;

    engine
        .perform_on_queue(|context| {
            context.log(LogLevel::Verbose, "Mutator", "chatty");
            context.log(LogLevel::Fatal, "Fuzzer", "out of memory");
        })
        .await
        .unwrap();

    assert_eq!(capture.contents(), "[Fuzzer] out of memory\n");
}

#[tokio::test]
async fn lines_logged_by_a_handler_are_printed_after_the_current_one() {
    let engine = FuzzEngine::new(FuzzerConfig::default());
    let (_ui, capture) = attached(&engine).await;

    engine
        .perform_on_queue(|context| {
            context.events().log.observe(|context, event| {
                if event.label == "Corpus" {
                    context.log(LogLevel::Info, "Nested", "from handler");
                }
            });
            context.log(LogLevel::Info, "Corpus", "first");
        })
        .await
        .unwrap();

    assert_eq!(capture.contents(), "[Corpus] first\n[Nested] from handler\n");
}

#[tokio::test]
async fn only_unique_crashes_are_printed() {
    let engine = FuzzEngine::new(FuzzerConfig::default());
    let (_ui, capture) = attached(&engine).await;

    engine
        .emit(EngineEvent::CrashFound(CrashEvent {
            program: program(1),
            is_unique: false,
        }))
        .unwrap();
    drain(&engine).await;
    assert!(capture.contents().is_empty());

    engine
        .emit(EngineEvent::CrashFound(CrashEvent {
            program: program(2),
            is_unique: true,
        }))
        .unwrap();
    drain(&engine).await;
    assert_eq!(
        capture.contents(),
        "########## Unique crash found (program 2) ##########\n\
         // from seed\n\
         let v0 = 42;\n\
         v0.toString();\n"
    );
}

#[tokio::test]
async fn generated_program_is_printed_once_per_request() {
    let engine = FuzzEngine::new(FuzzerConfig::default());
    let (ui, capture) = attached(&engine).await;

    engine
        .emit(EngineEvent::ProgramGenerated(ProgramGenerated {
            program: program(1),
        }))
        .unwrap();
    drain(&engine).await;
    assert!(capture.contents().is_empty());

    ui.print_next_generated_program().await.unwrap();
    ui.print_next_generated_program().await.unwrap();
    for id in [2, 3] {
        engine
            .emit(EngineEvent::ProgramGenerated(ProgramGenerated {
                program: program(id),
            }))
            .unwrap();
    }
    drain(&engine).await;

    let output = capture.contents();
    assert_eq!(
        output,
        "========== Generated program 2 ==========\n\
         let v0 = 42; // .integer\n\
         v0.toString();\n"
    );
    assert!(!ui.is_program_dump_pending().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn no_statistics_means_no_reports() {
    let engine = FuzzEngine::new(FuzzerConfig::default());
    let (_ui, capture) = attached(&engine).await;

    engine.initialize().await.unwrap();
    tokio::time::sleep(Duration::from_secs(300)).await;
    engine.shutdown(ShutdownReason::Finished).await.unwrap();

    assert!(capture.contents().is_empty());
}

#[tokio::test(start_paused = true)]
async fn periodic_and_final_reports() {
    let statistics = Arc::new(CountingStatistics::default());
    let engine = FuzzEngine::builder(FuzzerConfig::default())
        .strategy_name("MutationEngine")
        .statistics(statistics.clone())
        .spawn();
    let (_ui, capture) = attached(&engine).await;
    engine
        .perform_on_queue(|context| context.set_phase(Phase::Fuzzing))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(180)).await;
    assert!(capture.contents().is_empty());

    engine.initialize().await.unwrap();
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(capture.contents().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let output = capture.contents();
    assert_eq!(output.matches("Fuzzer Statistics\n").count(), 1);
    assert!(output.contains("Fuzzer phase:                 Fuzzing (with MutationEngine)\n"));
    assert!(output.ends_with("\n\n"));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(statistics.computed.load(Ordering::SeqCst), 2);

    engine.shutdown(ShutdownReason::UserInitiated).await.unwrap();
    let output = capture.contents();
    assert_eq!(output.matches("Final Fuzzer Statistics").count(), 1);
    assert!(output.contains("++++++++++ Fuzzing finished (user initiated) ++++++++++"));

    let final_report = output.split("Final Fuzzer Statistics").nth(1).unwrap();
    assert!(final_report.contains("Total samples:                3\n"));
    assert_eq!(statistics.computed.load(Ordering::SeqCst), 3);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(statistics.computed.load(Ordering::SeqCst), 3);
}
