//! CLI 集成测试
//!
//! 在临时 Git 仓库上运行编译后的二进制文件

use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// 获取编译后的二进制文件路径
fn get_binary_path() -> String {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // 移除测试可执行文件名
    if path.ends_with("deps") {
        path.pop(); // 移除 deps 目录
    }
    path.push("diff-insight");
    path.to_string_lossy().to_string()
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// 创建带一次初始提交的临时仓库
fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path();

    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(
        dir.join("src/auth.ts"),
        "export function login(user: string) {\n  return user.length > 0;\n}\n",
    )
    .unwrap();
    std::fs::write(dir.join("README.md"), "# Demo\n").unwrap();

    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "Initial commit"]);
    temp_dir
}

fn run(repo: &Path, args: &[&str]) -> Output {
    Command::new(get_binary_path())
        .args(args)
        .arg("--repo")
        .arg(repo)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is valid JSON")
}

#[test]
fn test_help_lists_subcommands() {
    let output = Command::new(get_binary_path())
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("diff-insight"));
    for subcommand in ["session", "analyze", "quality"] {
        assert!(stdout.contains(subcommand), "help is missing {subcommand}");
    }
    assert!(stdout.contains("--format"));
}

#[test]
fn test_version_output() {
    let output = Command::new(get_binary_path())
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_missing_subcommand_fails() {
    let output = Command::new(get_binary_path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

#[test]
fn test_nonexistent_repo_path() {
    let output = run(Path::new("/nonexistent/path"), &["session"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Repository path does not exist"));
}

#[test]
fn test_invalid_format_rejected() {
    let repo = create_test_repo();
    let output = run(repo.path(), &["session", "--format", "html"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("invalid value"));
}

#[test]
fn test_clean_session_is_low_risk() {
    let repo = create_test_repo();
    let output = run(repo.path(), &["session"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("Session session-"));
    assert!(stdout.contains("base: main @ "));
    assert!(stdout.contains("files: 0  +0 -0  complexity: low"));
    assert!(stdout.contains("Risk: low"));
}

#[test]
fn test_session_json_counts_working_and_staged_files() {
    let repo = create_test_repo();
    let dir = repo.path();

    std::fs::write(dir.join("README.md"), "# Demo\n\nUsage notes.\n").unwrap();
    git(dir, &["add", "README.md"]);
    std::fs::write(
        dir.join("src/auth.ts"),
        "export function login(user: string) {\n  return user.length > 1;\n}\n",
    )
    .unwrap();

    let value = json(&run(dir, &["session", "--format", "json"]));
    assert_eq!(value["stats"]["total_files"], 2);
    assert_eq!(value["stats"]["insertions"], 3);
    assert_eq!(value["stats"]["deletions"], 1);
    assert_eq!(value["session"]["base_branch"], "main");
    // src/auth.ts 属于安全敏感路径：一个高影响因子对应 medium
    assert_eq!(value["risk"]["level"], "medium");
    let factors = value["risk"]["factors"].as_array().unwrap();
    assert!(factors.iter().any(|f| f["risk_type"] == "security"));
}

#[test]
fn test_feature_branch_pattern_detected() {
    let repo = create_test_repo();
    let dir = repo.path();
    git(dir, &["checkout", "-q", "-b", "feature/jwt-auth"]);

    for i in 0..5 {
        std::fs::write(
            dir.join(format!("src/token_{i}.ts")),
            format!("export const token{i} = {i};\n"),
        )
        .unwrap();
    }
    git(dir, &["add", "."]);

    let value = json(&run(dir, &["session", "--format", "json"]));
    let patterns = value["patterns"].as_array().unwrap();
    let feature = patterns
        .iter()
        .find(|p| p["pattern"] == "feature-branch")
        .expect("feature-branch pattern");
    assert_eq!(feature["confidence"], 0.9);
}

#[test]
fn test_analyze_reports_removed_export() {
    let repo = create_test_repo();
    let dir = repo.path();
    std::fs::write(
        dir.join("src/auth.ts"),
        "function authenticate(user: string) {\n  try {\n    return user.length > 0;\n  } catch (err) {\n    return false;\n  }\n}\n",
    )
    .unwrap();

    let output = run(dir, &["analyze"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Change type: bugfix"));
    assert!(stdout.contains("Removed exports: login"));
    assert!(stdout.contains("[breaking/high]"));
}

#[test]
fn test_analyze_staged_ignores_working_tree() {
    let repo = create_test_repo();
    let dir = repo.path();
    std::fs::write(dir.join("README.md"), "# Demo\n\nMore docs.\n").unwrap();

    let staged = json(&run(dir, &["analyze", "--staged", "--format", "json"]));
    assert_eq!(staged["files_analyzed"], 0);

    let working = json(&run(dir, &["analyze", "--format", "json"]));
    assert_eq!(working["files_analyzed"], 1);
    assert_eq!(working["classification"]["kind"], "docs");
}

#[test]
fn test_quality_json_reports_six_dimensions() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("math.py");
    std::fs::write(
        &file,
        "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n",
    )
    .unwrap();

    let output = Command::new(get_binary_path())
        .args(["quality", "--format", "json"])
        .arg(&file)
        .output()
        .expect("Failed to execute command");

    let value = json(&output);
    let reports = value.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    let metrics = reports[0]["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), 6);
    let documentation = metrics
        .iter()
        .find(|m| m["dimension"] == "documentation")
        .unwrap();
    assert_eq!(documentation["score"], 100.0);
    assert_eq!(documentation["grade"], "A");
}

#[test]
fn test_quality_fails_when_nothing_scored() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.rs");

    let output = Command::new(get_binary_path())
        .arg("quality")
        .arg(&missing)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("could be scored"));
}
