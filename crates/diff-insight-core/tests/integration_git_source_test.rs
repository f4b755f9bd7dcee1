//! Git 变更来源集成测试
//!
//! 在真实的临时仓库上验证工作区、暂存区与会话跟踪

mod test_data;

use diff_insight_core::{
    AnalysisConfig, ChangeSource, ChangeType, GitChangeSource, SessionComplexity, SessionTracker,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use test_data::TestRepo;

fn repo() -> TestRepo {
    TestRepo::with_files(&[
        ("src/app.ts", "export function start() {\n  return 1;\n}\n"),
        ("src/old_name.ts", "export const legacy = true;\nexport const other = false;\n"),
        ("README.md", "# App\n"),
    ])
    .expect("test repository")
}

#[test]
fn test_branch_and_commit_match_git() {
    let repo = repo();
    let source = GitChangeSource::new(repo.path_buf()).unwrap();

    assert_eq!(source.current_branch().unwrap(), "main");
    let head = repo.git(&["rev-parse", "HEAD"]);
    assert_eq!(source.current_commit().unwrap(), head.trim());
    assert!(!source.has_unpushed_commits().unwrap());
}

#[test]
fn test_working_and_staged_are_separate() {
    let repo = repo();
    repo.write("README.md", "# App\n\nStaged docs.\n").unwrap();
    repo.git(&["add", "README.md"]);
    repo.write(
        "src/app.ts",
        "export function start() {\n  if (ready) {\n    return 1;\n  }\n  return 0;\n}\n",
    )
    .unwrap();

    let source = GitChangeSource::new(repo.path_buf()).unwrap();

    let working = source.working_changes().unwrap().parse();
    assert_eq!(working.len(), 1);
    assert_eq!(working[0].file_path, PathBuf::from("src/app.ts"));
    assert_eq!(working[0].insertions, 4);
    assert_eq!(working[0].deletions, 1);
    let added: Vec<Option<u32>> = working[0].added_lines().map(|l| l.line_number).collect();
    assert_eq!(added.len(), 4);
    assert!(added.iter().all(Option::is_some));

    let staged = source.staged_changes().unwrap().parse();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].file_path, PathBuf::from("README.md"));
    assert_eq!(staged[0].insertions, 2);
}

#[test]
fn test_staged_rename_is_detected() {
    let repo = repo();
    repo.git(&["mv", "src/old_name.ts", "src/new_name.ts"]);

    let source = GitChangeSource::new(repo.path_buf()).unwrap();
    let staged = source.staged_changes().unwrap().parse();

    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].file_path, PathBuf::from("src/new_name.ts"));
    assert_eq!(
        staged[0].change_type,
        ChangeType::Renamed {
            old_path: PathBuf::from("src/old_name.ts")
        }
    );
}

#[test]
fn test_tracker_over_real_repository() {
    let repo = repo();
    repo.write("src/extra.ts", "export const extra = 1;\n").unwrap();
    repo.git(&["add", "src/extra.ts"]);
    repo.write("src/app.ts", "export function start() {\n  return 2;\n}\n")
        .unwrap();

    let source = GitChangeSource::new(repo.path_buf()).unwrap();
    let mut tracker = SessionTracker::new(source, AnalysisConfig::default());
    let session = tracker.initialize().unwrap();
    assert_eq!(session.base_branch, "main");
    assert!(session.working.is_empty());

    tracker.refresh().unwrap();
    assert!(tracker.has_changes().unwrap());

    let stats = tracker.stats().unwrap();
    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.insertions, 2);
    assert_eq!(stats.deletions, 1);
    assert_eq!(stats.complexity, SessionComplexity::Low);

    let analysis = tracker.analysis().unwrap();
    assert_eq!(analysis.files_analyzed, 2);
}

#[test]
fn test_clean_repository_has_no_changes() {
    let repo = repo();
    let source = GitChangeSource::new(repo.path_buf()).unwrap();
    let mut tracker = SessionTracker::new(source, AnalysisConfig::default());
    tracker.initialize().unwrap();
    tracker.refresh().unwrap();

    assert!(!tracker.has_changes().unwrap());
    assert_eq!(tracker.stats().unwrap().total_files, 0);
}

#[test]
fn test_opening_a_non_repository_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    assert!(GitChangeSource::new(dir.path().to_path_buf()).is_err());
}
