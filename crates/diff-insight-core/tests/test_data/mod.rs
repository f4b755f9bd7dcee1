//! 测试数据集模块
//!
//! 提供差异文本构造器与临时 Git 仓库

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// 单个文件的差异片段
pub struct FileDiff {
    pub path: String,
    pub removed: Vec<String>,
    pub added: Vec<String>,
    pub new_file: bool,
}

impl FileDiff {
    pub fn modified(path: &str, removed: &[&str], added: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            removed: removed.iter().map(|l| l.to_string()).collect(),
            added: added.iter().map(|l| l.to_string()).collect(),
            new_file: false,
        }
    }

    pub fn created(path: &str, added: &[&str]) -> Self {
        Self {
            new_file: true,
            ..Self::modified(path, &[], added)
        }
    }

    pub fn numstat_line(&self) -> String {
        format!("{}\t{}\t{}", self.added.len(), self.removed.len(), self.path)
    }

    pub fn section(&self) -> String {
        let mut out = format!("diff --git a/{0} b/{0}\n", self.path);
        if self.new_file {
            out.push_str("new file mode 100644\n");
            out.push_str("--- /dev/null\n");
        } else {
            out.push_str(&format!("--- a/{}\n", self.path));
        }
        out.push_str(&format!("+++ b/{}\n", self.path));
        out.push_str(&format!(
            "@@ -{},{} +1,{} @@\n",
            if self.new_file { 0 } else { 1 },
            self.removed.len(),
            self.added.len()
        ));
        for line in &self.removed {
            out.push_str(&format!("-{line}\n"));
        }
        for line in &self.added {
            out.push_str(&format!("+{line}\n"));
        }
        out
    }
}

/// 把多个文件差异拼成 (numstat, diff) 文本对
pub fn render(files: &[FileDiff]) -> (String, String) {
    let numstat = files
        .iter()
        .map(|f| f.numstat_line() + "\n")
        .collect::<String>();
    let diff = files.iter().map(FileDiff::section).collect::<String>();
    (numstat, diff)
}

/// 只有 numstat、没有差异正文的大批量变更
pub fn numstat_only(entries: &[(String, u32, u32)]) -> String {
    entries
        .iter()
        .map(|(path, ins, del)| format!("{ins}\t{del}\t{path}\n"))
        .collect()
}

/// `n` 行、包含 `functions` 个无文档函数的 TypeScript 源码
pub fn undocumented_module(lines: usize, functions: usize) -> String {
    let mut out = Vec::new();
    for i in 0..functions {
        out.push(format!("function handler{i}(x) {{"));
        out.push("  const y = x + 1;".to_string());
        out.push("  return y;".to_string());
        out.push("}".to_string());
    }
    let mut i = 0;
    while out.len() < lines {
        out.push(format!("export const r{i} = handler0({i});"));
        i += 1;
    }
    out.join("\n") + "\n"
}

/// 临时 Git 仓库
pub struct TestRepo {
    pub temp_dir: TempDir,
}

impl TestRepo {
    /// 初始化仓库并在 `main` 分支上提交 `files`
    pub fn with_files(files: &[(&str, &str)]) -> std::io::Result<Self> {
        let repo = Self {
            temp_dir: TempDir::new()?,
        };
        repo.git(&["init", "-q"]);
        repo.git(&["config", "user.name", "Test User"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        for (path, content) in files {
            repo.write(path, content)?;
        }
        repo.git(&["add", "."]);
        repo.git(&["commit", "-q", "-m", "Initial commit"]);
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn write(&self, path: &str, content: &str) -> std::io::Result<()> {
        let full = self.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, content)
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}
