#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MATCHING_TRUE_PREFIX: &str = "matching class Singleton(\"true\"): ";
pub const MATCHING_FALSE_PREFIX: &str = "matching class Singleton(\"false\"): ";
pub const MISMATCH_TRUE_FALSE_SUFFIX: &str = "true vs false";
pub const MISMATCH_FALSE_TRUE_SUFFIX: &str = "false vs true";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    MatchTrue,
    MatchFalse,
}

impl AggregateKind {
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::MatchTrue => MATCHING_TRUE_PREFIX,
            Self::MatchFalse => MATCHING_FALSE_PREFIX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSignal {
    AggregateMatchTrue(u64),
    AggregateMatchFalse(u64),
    MismatchTrueThenFalse,
    MismatchFalseThenTrue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    UnrecognizedLine(String),
    MissingAggregate(AggregateKind),
}

impl ClassifyError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnrecognizedLine(_) => "diff_line_unrecognized",
            Self::MissingAggregate(_) => "diff_aggregate_missing",
        }
    }
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedLine(line) => write!(f, "unknown line {line:?}"),
            Self::MissingAggregate(kind) => {
                write!(f, "no aggregate line with prefix {:?}", kind.prefix())
            }
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Mismatch suffixes take precedence over aggregate prefixes; every line
/// matches at most one rule.
pub fn classify_line(line: &str) -> Result<ClassificationSignal, ClassifyError> {
    if line.ends_with(MISMATCH_TRUE_FALSE_SUFFIX) {
        return Ok(ClassificationSignal::MismatchTrueThenFalse);
    }
    if line.ends_with(MISMATCH_FALSE_TRUE_SUFFIX) {
        return Ok(ClassificationSignal::MismatchFalseThenTrue);
    }
    if let Some(rest) = line.strip_prefix(MATCHING_TRUE_PREFIX) {
        return parse_aggregate_count(line, rest).map(ClassificationSignal::AggregateMatchTrue);
    }
    if let Some(rest) = line.strip_prefix(MATCHING_FALSE_PREFIX) {
        return parse_aggregate_count(line, rest).map(ClassificationSignal::AggregateMatchFalse);
    }
    Err(ClassifyError::UnrecognizedLine(line.to_string()))
}

fn parse_aggregate_count(line: &str, raw: &str) -> Result<u64, ClassifyError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ClassifyError::UnrecognizedLine(line.to_string()))
}

/// Scans the full tool output. Blank lines are skipped; the first line
/// outside the grammar aborts the scan.
pub fn classify_output(text: &str) -> Result<Vec<ClassificationSignal>, ClassifyError> {
    let mut signals = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        signals.push(classify_line(line)?);
    }
    Ok(signals)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tt: u64,
    pub tf: u64,
    pub ft: u64,
    pub ff: u64,
}

impl ConfusionMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate signals overwrite their counter; mismatch signals increment.
    pub fn apply(&mut self, signal: ClassificationSignal) {
        match signal {
            ClassificationSignal::AggregateMatchTrue(count) => self.tt = count,
            ClassificationSignal::AggregateMatchFalse(count) => self.ff = count,
            ClassificationSignal::MismatchTrueThenFalse => self.tf += 1,
            ClassificationSignal::MismatchFalseThenTrue => self.ft += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.tt + self.tf + self.ft + self.ff
    }

    #[must_use]
    pub fn mismatch_count(&self) -> u64 {
        self.tf + self.ft
    }
}

#[must_use]
pub fn build_matrix(signals: &[ClassificationSignal]) -> ConfusionMatrix {
    let mut matrix = ConfusionMatrix::new();
    for signal in signals {
        matrix.apply(*signal);
    }
    matrix
}

/// Classifies one tool run's output and builds its matrix. A run that never
/// produced one of the two aggregate lines is rejected rather than folded
/// into a silently zero counter.
pub fn matrix_from_output(text: &str) -> Result<ConfusionMatrix, ClassifyError> {
    let signals = classify_output(text)?;

    let mut saw_match_true = false;
    let mut saw_match_false = false;
    for signal in &signals {
        match signal {
            ClassificationSignal::AggregateMatchTrue(_) => saw_match_true = true,
            ClassificationSignal::AggregateMatchFalse(_) => saw_match_false = true,
            _ => {}
        }
    }
    if !saw_match_true {
        return Err(ClassifyError::MissingAggregate(AggregateKind::MatchTrue));
    }
    if !saw_match_false {
        return Err(ClassifyError::MissingAggregate(AggregateKind::MatchFalse));
    }

    Ok(build_matrix(&signals))
}

#[cfg(test)]
mod tests {
    use super::{
        AggregateKind, ClassificationSignal, ClassifyError, ConfusionMatrix, build_matrix,
        classify_line, classify_output, matrix_from_output,
    };

    const WELL_FORMED: &str = concat!(
        "matching class Singleton(\"true\"): 12\n",
        "matching class Singleton(\"false\"): 5\n",
        "case7: true vs false\n",
        "case9: true vs false\n",
        "case2: false vs true\n",
    );

    #[test]
    fn classifies_each_rule() {
        assert_eq!(
            classify_line("case7: true vs false"),
            Ok(ClassificationSignal::MismatchTrueThenFalse)
        );
        assert_eq!(
            classify_line("case2: false vs true"),
            Ok(ClassificationSignal::MismatchFalseThenTrue)
        );
        assert_eq!(
            classify_line("matching class Singleton(\"true\"): 12"),
            Ok(ClassificationSignal::AggregateMatchTrue(12))
        );
        assert_eq!(
            classify_line("matching class Singleton(\"false\"): 0"),
            Ok(ClassificationSignal::AggregateMatchFalse(0))
        );
    }

    #[test]
    fn rejects_lines_outside_the_grammar() {
        assert_eq!(
            classify_line("unexpected garbage"),
            Err(ClassifyError::UnrecognizedLine(
                "unexpected garbage".to_string()
            ))
        );
        assert_eq!(
            classify_line(""),
            Err(ClassifyError::UnrecognizedLine(String::new()))
        );
        assert_eq!(
            classify_line("matching class Singleton(\"true\"): twelve"),
            Err(ClassifyError::UnrecognizedLine(
                "matching class Singleton(\"true\"): twelve".to_string()
            ))
        );
    }

    #[test]
    fn unrecognized_line_aborts_the_whole_scan() {
        let output = "matching class Singleton(\"true\"): 12\nunexpected garbage\n";
        assert_eq!(
            classify_output(output),
            Err(ClassifyError::UnrecognizedLine(
                "unexpected garbage".to_string()
            ))
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        let output = "matching class Singleton(\"true\"): 1\n\n   \nmatching class Singleton(\"false\"): 2\n";
        let signals = classify_output(output).expect("scan should succeed");
        assert_eq!(signals.len(), 2);
    }

    #[test]
    fn worked_example_matches_expected_matrix() {
        let matrix = matrix_from_output(WELL_FORMED).expect("output is well-formed");
        assert_eq!(
            matrix,
            ConfusionMatrix {
                tt: 12,
                tf: 2,
                ft: 1,
                ff: 5,
            }
        );
        assert_eq!(matrix.total(), 20);
        assert_eq!(matrix.mismatch_count(), 3);
    }

    #[test]
    fn mismatch_counting_is_order_independent() {
        let signals = classify_output(WELL_FORMED).expect("scan should succeed");
        let mut reversed = signals.clone();
        reversed.reverse();
        assert_eq!(build_matrix(&signals), build_matrix(&reversed));
    }

    #[test]
    fn mismatch_total_matches_line_count() {
        let signals = classify_output(WELL_FORMED).expect("scan should succeed");
        let mismatch_lines = signals
            .iter()
            .filter(|signal| {
                matches!(
                    signal,
                    ClassificationSignal::MismatchTrueThenFalse
                        | ClassificationSignal::MismatchFalseThenTrue
                )
            })
            .count() as u64;
        assert_eq!(build_matrix(&signals).mismatch_count(), mismatch_lines);
    }

    #[test]
    fn duplicate_aggregate_keeps_the_last_value() {
        let output = concat!(
            "matching class Singleton(\"true\"): 7\n",
            "matching class Singleton(\"true\"): 9\n",
            "matching class Singleton(\"false\"): 3\n",
        );
        let matrix = matrix_from_output(output).expect("duplicates are tolerated");
        assert_eq!(matrix.tt, 9);
        assert_eq!(matrix.ff, 3);
    }

    #[test]
    fn missing_aggregate_names_the_absent_kind() {
        assert_eq!(
            matrix_from_output("matching class Singleton(\"false\"): 3\n"),
            Err(ClassifyError::MissingAggregate(AggregateKind::MatchTrue))
        );
        assert_eq!(
            matrix_from_output("matching class Singleton(\"true\"): 3\n"),
            Err(ClassifyError::MissingAggregate(AggregateKind::MatchFalse))
        );
        assert_eq!(
            matrix_from_output("case1: true vs false\n"),
            Err(ClassifyError::MissingAggregate(AggregateKind::MatchTrue))
        );
    }

    #[test]
    fn reason_codes_are_stable() {
        let unrecognized = ClassifyError::UnrecognizedLine("x".to_string());
        assert_eq!(unrecognized.reason_code(), "diff_line_unrecognized");
        let missing = ClassifyError::MissingAggregate(AggregateKind::MatchFalse);
        assert_eq!(missing.reason_code(), "diff_aggregate_missing");
    }
}
