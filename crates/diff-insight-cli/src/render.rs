//! 纯文本输出

use diff_insight_core::{FileQualityReport, SemanticAnalysis, SessionSnapshot};
use std::fmt::Write;

pub fn session_text(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    let session = &snapshot.session;
    let stats = &snapshot.stats;
    let risk = &snapshot.risk;

    let _ = writeln!(out, "Session {}", session.id);
    let _ = writeln!(
        out,
        "  base: {} @ {}",
        session.base_branch,
        short_commit(&session.base_commit)
    );
    let _ = writeln!(
        out,
        "  files: {}  +{} -{}  complexity: {}  duration: {}m",
        stats.total_files,
        stats.insertions,
        stats.deletions,
        stats.complexity.as_str(),
        stats.duration_minutes
    );

    let _ = writeln!(out, "\nRisk: {}", risk.level.as_str());
    for factor in &risk.factors {
        let _ = writeln!(
            out,
            "  [{}/{}] {}",
            factor.risk_type.as_str(),
            factor.impact.as_str(),
            factor.description
        );
    }
    if !risk.recommendations.is_empty() {
        let _ = writeln!(out, "\nRecommendations:");
        for recommendation in &risk.recommendations {
            let _ = writeln!(out, "  - {recommendation}");
        }
    }
    if !risk.split_suggestions.is_empty() {
        let _ = writeln!(out, "\nSuggested splits:");
        for split in &risk.split_suggestions {
            let _ = writeln!(
                out,
                "  {} ({} files, {} lines)",
                split.scope,
                split.files.len(),
                split.changed_lines
            );
        }
    }

    if !snapshot.patterns.is_empty() {
        let _ = writeln!(out, "\nPatterns:");
        for pattern in &snapshot.patterns {
            let _ = writeln!(
                out,
                "  {} ({:.2}): {}",
                pattern.pattern.as_str(),
                pattern.confidence,
                pattern.evidence.join("; ")
            );
        }
    }
    out
}

pub fn analysis_text(analysis: &SemanticAnalysis) -> String {
    let mut out = String::new();
    let classification = &analysis.classification;

    let _ = writeln!(
        out,
        "Change type: {} (confidence {:.2}, {} files)",
        classification.kind.as_str(),
        classification.confidence,
        analysis.files_analyzed
    );
    let complexity = &analysis.complexity;
    let _ = writeln!(
        out,
        "Complexity: cyclomatic {}, cognitive {}, max nesting {}, {} changed lines",
        complexity.cyclomatic,
        complexity.cognitive,
        complexity.max_nesting_depth,
        complexity.total_changed_lines
    );

    let structure = &analysis.structure;
    let sections = [
        ("Added functions", &structure.added_functions),
        ("Modified functions", &structure.modified_functions),
        ("Removed functions", &structure.removed_functions),
        ("Removed exports", &structure.removed_exports),
        ("Added routes", &structure.added_routes),
        ("Removed routes", &structure.removed_routes),
    ];
    for (title, symbols) in sections {
        if symbols.is_empty() {
            continue;
        }
        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        let _ = writeln!(out, "{title}: {}", names.join(", "));
    }

    if !analysis.patterns.is_empty() {
        let _ = writeln!(out, "\nPatterns:");
        for pattern in &analysis.patterns {
            let _ = writeln!(
                out,
                "  {}: {}",
                pattern.kind.as_str(),
                pattern.evidence.join("; ")
            );
        }
    }

    if !analysis.risk_factors.is_empty() {
        let _ = writeln!(out, "\nRisk factors:");
        for factor in &analysis.risk_factors {
            let location = match (&factor.file, factor.line) {
                (Some(file), Some(line)) => format!(" ({}:{line})", file.display()),
                (Some(file), None) => format!(" ({})", file.display()),
                _ => String::new(),
            };
            let _ = writeln!(
                out,
                "  [{}/{}] {}{location}",
                factor.risk_type.as_str(),
                factor.impact.as_str(),
                factor.description
            );
        }
    }
    out
}

pub fn quality_text(reports: &[FileQualityReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = writeln!(
            out,
            "{}: {:.1} ({})",
            report.file.display(),
            report.overall_score,
            report.overall_grade.as_str()
        );
        for metric in &report.metrics {
            let _ = writeln!(
                out,
                "  {:<14} {:>5.1} {} {}",
                metric.dimension.as_str(),
                metric.score,
                metric.grade.as_str(),
                metric.trend.as_str()
            );
            for issue in &metric.issues {
                let line = issue.line.map(|l| format!("{l}: ")).unwrap_or_default();
                let _ = writeln!(
                    out,
                    "      {} {line}{}",
                    issue.severity.as_str(),
                    issue.message
                );
            }
        }
    }
    out
}

fn short_commit(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}
