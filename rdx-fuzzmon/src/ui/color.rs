//! Severity to terminal color mapping.

use crate::events::LogLevel;
use colored::Color;

/// The color log lines of `level` are printed in.
pub fn color_for(level: LogLevel) -> Color {
    match level {
        LogLevel::Verbose => Color::BrightBlue,
        LogLevel::Info => Color::Blue,
        LogLevel::Warning => Color::Yellow,
        LogLevel::Error => Color::Magenta,
        LogLevel::Fatal => Color::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_level_has_a_distinct_color_code() {
        let codes: HashSet<String> = LogLevel::ALL
            .iter()
            .map(|level| color_for(*level).to_fg_str().to_string())
            .collect();
        assert_eq!(codes.len(), LogLevel::ALL.len());
        assert!(codes.iter().all(|code| !code.is_empty()));
    }

    #[test]
    fn fatal_is_red() {
        assert_eq!(color_for(LogLevel::Fatal), Color::Red);
    }
}
