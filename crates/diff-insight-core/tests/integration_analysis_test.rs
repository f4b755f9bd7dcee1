//! 语义分析集成测试
//!
//! 从 numstat 与统一差异文本出发，经解析器到分类器的完整流程

mod test_data;

use diff_insight_core::{
    ChangeKind, ChangeType, DiffParser, Impact, PatternKind, RiskType, SemanticAnalyzer,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use test_data::{FileDiff, render};

const AUTH_DIFF: &str = "diff --git a/src/auth.ts b/src/auth.ts
index 1111111..2222222 100644
--- a/src/auth.ts
+++ b/src/auth.ts
@@ -1,2 +1,4 @@
-export function login(user) {
+try {
+  session.open(user);
+} catch (err) {
 }
";

#[test]
fn test_removed_export_with_try_catch_is_breaking_bugfix() {
    let changes = DiffParser::parse_changes("3\t1\tsrc/auth.ts\n", AUTH_DIFF);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].insertions, 3);
    assert_eq!(changes[0].deletions, 1);

    let analysis = SemanticAnalyzer::new().analyze(&changes);

    let breaking: Vec<_> = analysis
        .risk_factors
        .iter()
        .filter(|f| f.risk_type == RiskType::Breaking)
        .collect();
    assert_eq!(breaking.len(), 1);
    assert_eq!(breaking[0].impact, Impact::High);
    assert_eq!(breaking[0].file, Some(PathBuf::from("src/auth.ts")));
    assert!(breaking[0].description.contains("login"));

    assert_ne!(analysis.classification.kind, ChangeKind::Docs);
    assert_ne!(analysis.classification.kind, ChangeKind::Chore);
    assert_eq!(analysis.classification.kind, ChangeKind::Bugfix);
    assert!(
        analysis
            .patterns
            .iter()
            .any(|p| p.kind == PatternKind::ErrorHandlingAdded)
    );
}

#[test]
fn test_mixed_change_set_keeps_numstat_order() {
    let files = [
        FileDiff::created(
            "src/routes.ts",
            &[
                "export function listUsers(req, res) {",
                "  res.json([]);",
                "}",
                "app.get('/users', listUsers);",
            ],
        ),
        FileDiff::modified("README.md", &["Old intro"], &["New intro", "More detail"]),
        FileDiff::created(
            "src/routes.test.ts",
            &["it('lists users', () => {", "  expect(listUsers).toBeDefined();", "});"],
        ),
    ];
    let (numstat, diff) = render(&files);
    let changes = DiffParser::parse_changes(&numstat, &diff);

    let paths: Vec<_> = changes.iter().map(|c| c.file_path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("src/routes.ts"),
            PathBuf::from("README.md"),
            PathBuf::from("src/routes.test.ts"),
        ]
    );
    assert_eq!(changes[0].change_type, ChangeType::Added);
    assert_eq!(changes[1].change_type, ChangeType::Modified);

    let analysis = SemanticAnalyzer::new().analyze(&changes);
    assert_eq!(analysis.files_analyzed, 3);

    let route_labels: Vec<_> = analysis
        .structure
        .added_routes
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(route_labels, vec!["GET /users"]);
    assert!(
        analysis
            .patterns
            .iter()
            .any(|p| p.kind == PatternKind::ApiRouteChanged)
    );
    assert!(analysis.patterns.iter().any(|p| p.kind == PatternKind::TestsAdded));

    let total: f64 = analysis.classification.scores.iter().map(|s| s.score).sum();
    assert!(total > 0.0);
    assert!(analysis.classification.confidence > 0.0);
    assert!(analysis.classification.confidence <= 1.0);
}

#[test]
fn test_unparseable_numstat_lines_are_skipped() {
    let numstat = "garbage line\n2\t0\tsrc/ok.ts\n";
    let diff = FileDiff::modified("src/ok.ts", &[], &["const a = 1;", "const b = 2;"]).section();
    let changes = DiffParser::parse_changes(numstat, &diff);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].file_path, PathBuf::from("src/ok.ts"));
}

#[test]
fn test_security_markers_in_added_lines() {
    let files = [FileDiff::modified(
        "src/view.js",
        &[],
        &[
            "const apiKey = \"sk_live_0123456789abcdef\";",
            "el.innerHTML = userInput;",
            "eval(userCode);",
        ],
    )];
    let (numstat, diff) = render(&files);
    let analysis = SemanticAnalyzer::new().analyze(&DiffParser::parse_changes(&numstat, &diff));

    let security: Vec<_> = analysis
        .risk_factors
        .iter()
        .filter(|f| f.risk_type == RiskType::Security)
        .map(|f| (f.impact, f.line))
        .collect();
    assert_eq!(
        security,
        vec![
            (Impact::High, Some(1)),
            (Impact::Medium, Some(2)),
            (Impact::Medium, Some(3)),
        ]
    );
}
