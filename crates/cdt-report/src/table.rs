#![forbid(unsafe_code)]

use crate::SuiteMatrices;
use std::fmt::Write as _;

/// Renders the grouped verdict-agreement table. Suites and implementations
/// appear exactly in input order; the suite label spans its group via
/// `\multirow`; groups are separated by `\hline` with none after the last.
#[must_use]
pub fn render_table(suites: &[SuiteMatrices]) -> String {
    let mut out = String::new();
    out.push_str("\\begin{tabular}{clrrrr}\n");
    out.push_str("Test & Impl. & A/A & A/R & R/A & R/R \\\\\n");
    out.push_str("\\hline\n");

    for (suite_index, suite) in suites.iter().enumerate() {
        if suite_index != 0 {
            out.push_str("\\hline\n");
        }

        for (row_index, row) in suite.rows.iter().enumerate() {
            if row_index == 0 {
                let _ = write!(
                    &mut out,
                    "\\multirow{{{}}}{{*}}{{{}}} ",
                    suite.rows.len(),
                    suite.suite
                );
            }
            let _ = writeln!(
                &mut out,
                "& {} & {} & {} & {} & {} \\\\",
                row.implementation,
                format_count(row.matrix.tt),
                format_count(row.matrix.tf),
                format_count(row.matrix.ft),
                format_count(row.matrix.ff)
            );
        }
    }

    out.push_str("\\end{tabular}\n");
    out
}

/// Groups decimal digits in threes: `1234567` renders as `1,234,567`.
#[must_use]
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index != 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}
