//! Renders a statistics snapshot as the fixed-layout text report.
//!
//! The output depends only on its inputs, so the same snapshot always
//! produces the same bytes.

use crate::engine::{EngineContext, Phase};
use crate::stats::Statistics;
use std::fmt::{Display, Write};

/// Width of the label column, including the colon.
const LABEL_WIDTH: usize = 30;

/// Everything besides the snapshot that appears in a report.
#[derive(Debug, Clone, Copy)]
pub struct ReportInputs<'a> {
    pub phase: Phase,
    pub strategy_name: &'a str,
    pub corpus_size: usize,
    /// Runtime type collection is enabled in the engine configuration.
    pub collect_runtime_types: bool,
    /// Use the heading of the final report printed at shutdown.
    pub final_report: bool,
}

impl<'a> ReportInputs<'a> {
    /// Reads the current phase, strategy, corpus size and config flag.
    pub fn from_context(context: &'a EngineContext, final_report: bool) -> Self {
        Self {
            phase: context.phase(),
            strategy_name: context.strategy_name(),
            corpus_size: context.corpus_size(),
            collect_runtime_types: context.config().collect_runtime_types,
            final_report,
        }
    }
}

/// The phase as shown on the report's first line.
pub fn phase_label(phase: Phase, strategy_name: &str) -> String {
    match phase {
        Phase::CorpusImport => "Corpus import".to_string(),
        Phase::InitialCorpusGeneration => {
            format!("Initial corpus generation (with {strategy_name})")
        }
        Phase::Fuzzing => format!("Fuzzing (with {strategy_name})"),
    }
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn field(out: &mut String, label: &str, value: impl Display) {
    writeln!(out, "{label:<width$}{value}", width = LABEL_WIDTH).ok();
}

/// Formats the statistics report. Every line, the last included, ends in `\n`.
pub fn format_report(inputs: &ReportInputs<'_>, stats: &Statistics) -> String {
    let with_types = inputs.collect_runtime_types || stats.collect_runtime_types;
    let heading = if inputs.final_report {
        "Final Fuzzer Statistics"
    } else {
        "Fuzzer Statistics"
    };

    let mut out = String::with_capacity(1024);
    writeln!(out, "{heading}").ok();
    writeln!(out, "{}", "-".repeat(heading.len())).ok();

    field(
        &mut out,
        "Fuzzer phase:",
        phase_label(inputs.phase, inputs.strategy_name),
    );
    field(&mut out, "Total samples:", stats.total_samples);

    let mut interesting = stats.interesting_samples.to_string();
    if with_types {
        let ratio = if stats.interesting_samples == 0 {
            0.0
        } else {
            stats.interesting_samples_with_types as f64 / stats.interesting_samples as f64
        };
        write!(
            interesting,
            " ({} with runtime type information)",
            percent(ratio)
        )
        .ok();
    }
    field(&mut out, "Interesting samples found:", interesting);

    field(&mut out, "Valid samples found:", stats.valid_samples);
    field(&mut out, "Corpus size:", inputs.corpus_size);
    field(&mut out, "Success rate:", percent(stats.success_rate));
    field(&mut out, "Timeout rate:", percent(stats.timeout_rate));
    field(&mut out, "Crashes found:", stats.crashing_samples);
    field(&mut out, "Timeouts hit:", stats.timed_out_samples);
    field(&mut out, "Coverage:", percent(stats.coverage));
    field(
        &mut out,
        "Avg. program size:",
        format!("{:.2}", stats.avg_program_size),
    );
    field(&mut out, "Connected workers:", stats.connected_workers);
    field(
        &mut out,
        "Execs / Second:",
        format!("{:.2}", stats.execs_per_second),
    );
    field(&mut out, "Fuzzer overhead:", percent(stats.fuzzer_overhead));
    field(&mut out, "Total execs:", stats.total_execs);

    if with_types {
        field(
            &mut out,
            "Type collection timeout rate:",
            percent(stats.type_collection_timeout_rate),
        );
        field(
            &mut out,
            "Type collection failure rate:",
            percent(stats.type_collection_failure_rate),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Statistics {
        Statistics {
            total_samples: 1000,
            interesting_samples: 42,
            valid_samples: 900,
            success_rate: 0.9,
            timeout_rate: 0.01,
            coverage: 0.357,
            avg_program_size: 12.345,
            execs_per_second: 250.5,
            fuzzer_overhead: 0.02,
            total_execs: 500_000,
            collect_runtime_types: false,
            ..Default::default()
        }
    }

    fn inputs() -> ReportInputs<'static> {
        ReportInputs {
            phase: Phase::Fuzzing,
            strategy_name: "MutationEngine",
            corpus_size: 128,
            collect_runtime_types: false,
            final_report: false,
        }
    }

    #[test]
    fn golden_fields() {
        let report = format_report(&inputs(), &snapshot());
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], "Fuzzer Statistics");
        assert_eq!(lines[1], "-----------------");
        assert!(lines.contains(&"Fuzzer phase:                 Fuzzing (with MutationEngine)"));
        assert!(lines.contains(&"Total samples:                1000"));
        assert!(lines.contains(&"Interesting samples found:    42"));
        assert!(lines.contains(&"Corpus size:                  128"));
        assert!(lines.contains(&"Success rate:                 90.00%"));
        assert!(lines.contains(&"Timeout rate:                 1.00%"));
        assert!(lines.contains(&"Coverage:                     35.70%"));
        assert!(lines.contains(&"Execs / Second:               250.50"));
        assert!(lines.contains(&"Fuzzer overhead:              2.00%"));
        assert!(lines.contains(&"Total execs:                  500000"));
        assert!(!report.contains("Type collection"));
        assert!(!report.contains("runtime type information"));
        assert_eq!(lines.len(), 17);
    }

    #[test]
    fn type_collection_lines_when_enabled() {
        let stats = Statistics {
            collect_runtime_types: true,
            interesting_samples_with_types: 21,
            type_collection_timeout_rate: 0.05,
            type_collection_failure_rate: 0.01,
            ..snapshot()
        };
        let report = format_report(&inputs(), &stats);
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines.len(), 19);
        assert_eq!(lines[17], "Type collection timeout rate: 5.00%");
        assert_eq!(lines[18], "Type collection failure rate: 1.00%");
        assert!(lines.contains(
            &"Interesting samples found:    42 (50.00% with runtime type information)"
        ));
    }

    #[test]
    fn config_flag_alone_enables_type_sections() {
        let inputs = ReportInputs {
            collect_runtime_types: true,
            ..inputs()
        };
        let stats = Statistics {
            interesting_samples: 0,
            ..snapshot()
        };
        let report = format_report(&inputs, &stats);
        assert!(report.contains("Interesting samples found:    0 (0.00% with runtime type information)"));
        assert_eq!(report.matches("Type collection").count(), 2);
    }

    #[test]
    fn phase_labels() {
        assert_eq!(phase_label(Phase::CorpusImport, "X"), "Corpus import");
        assert_eq!(
            phase_label(Phase::InitialCorpusGeneration, "GenerativeEngine"),
            "Initial corpus generation (with GenerativeEngine)"
        );
    }

    #[test]
    fn final_report_heading() {
        let inputs = ReportInputs {
            final_report: true,
            ..inputs()
        };
        let report = format_report(&inputs, &snapshot());
        assert!(report.starts_with("Final Fuzzer Statistics\n-----------------------\n"));
        assert_eq!(report, format_report(&inputs, &snapshot()));
    }
}
