//! Diagnostic rendering. Stage errors and validator violations become
//! `ariadne` reports against the module's source text.

use ariadne::{ColorGenerator, Label, Report, ReportKind};
use std::ops::Range;

use crate::ir::lowering::LoweringError;

use super::{CheckReport, Violation};

/// A span tied to a source id, the shape `ariadne` wants.
#[derive(Debug, Clone)]
pub struct FileSpan {
    pub span: Range<usize>,
    pub source: String,
}

impl FileSpan {
    pub fn new(source: String, span: Range<usize>) -> Self {
        Self { source, span }
    }
}

impl ariadne::Span for FileSpan {
    type SourceId = String;

    fn source(&self) -> &Self::SourceId {
        &self.source
    }

    fn start(&self) -> usize {
        self.span.start
    }

    fn end(&self) -> usize {
        self.span.end
    }
}

/// Creates a report from a lowering error.
pub fn lowering_error_to_report(
    error: &LoweringError,
    source_name: &str,
) -> Report<'static, FileSpan> {
    let mut colors = ColorGenerator::new();
    let filespan = FileSpan::new(source_name.to_string(), error.span().range());
    Report::build(ReportKind::Error, filespan.clone())
        .with_code(error.code())
        .with_label(
            Label::new(filespan)
                .with_message(error.to_string())
                .with_color(colors.next()),
        )
        .with_message("Lowering aborted; no IR was produced for this module.")
        .finish()
}

/// Creates one report per collected violation. The validator is exhaustive,
/// so a failing module renders every problem in one diagnostic pass.
pub fn check_report_to_reports(
    report: &CheckReport,
    source_name: &str,
) -> Vec<Report<'static, FileSpan>> {
    report
        .violations
        .iter()
        .map(|violation| violation_to_report(violation, source_name))
        .collect()
}

fn violation_to_report(violation: &Violation, source_name: &str) -> Report<'static, FileSpan> {
    let mut colors = ColorGenerator::new();
    let range = violation.span.map(|s| s.range()).unwrap_or(0..0);
    let filespan = FileSpan::new(source_name.to_string(), range);
    let mut builder = Report::build(ReportKind::Error, filespan.clone())
        .with_code(violation.code.as_str())
        .with_label(
            Label::new(filespan)
                .with_message(&violation.message)
                .with_color(colors.next()),
        );
    if let Some(node) = violation.node {
        builder = builder.with_note(format!("offending node: {node}"));
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::common::Span;

    #[test]
    fn lowering_report_carries_the_stable_code() {
        let error = LoweringError::RestNotLast {
            span: Span::new(1, 5, 4, 3),
        };
        let report = lowering_error_to_report(&error, "mod.src");
        // Rendering without a source cache is enough to prove the report is
        // well-formed; the code surfaces in the output.
        let mut out = Vec::new();
        let sources = ariadne::sources(vec![(
            "mod.src".to_string(),
            "const [..rest, a] = xs;".to_string(),
        )]);
        report.write(sources, &mut out).expect("report renders");
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("SyntaxLowering"));
    }
}
