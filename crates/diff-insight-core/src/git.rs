//! Git 差异解析模块
//!
//! 将 `git diff --numstat` 与统一差异格式文本解析为结构化的文件变更。
//! 解析是尽力而为的：单个文件或差异块解析失败时降级为空结果，不会中断整个流程。

use crate::error::{DiffInsightError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$").expect("valid hunk regex")
});

/// 文件变更信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file_path: PathBuf,
    pub change_type: ChangeType,
    pub insertions: u32,
    pub deletions: u32,
    pub hunks: Vec<DiffHunk>,
    pub is_binary: bool,
}

/// 变更类型枚举
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed { old_path: PathBuf },
}

/// 差异块信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// 原始 `@@ ... @@` 头部
    pub header: String,
    pub old_start: u32,
    pub old_lines: u32,
    /// 新文件中的起始行号
    pub new_start: u32,
    pub new_lines: u32,
    /// 只在新增行上推进的结束行号（不含）
    pub end_line: u32,
    pub lines: Vec<DiffLine>,
}

/// 差异行信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// 去掉差异标记后的内容
    pub content: String,
    pub line_type: DiffLineType,
    /// 仅新增行带有新文件中的行号
    pub line_number: Option<u32>,
}

/// 差异行类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineType {
    Context,
    Added,
    Removed,
}

/// numstat 单行解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumstatEntry {
    pub insertions: u32,
    pub deletions: u32,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
    pub is_binary: bool,
}

/// 多文件差异中的单个文件片段
#[derive(Debug, Clone)]
struct FileSection {
    path: PathBuf,
    old_path: Option<PathBuf>,
    change_type: ChangeType,
    is_binary: bool,
    body: String,
}

impl FileChange {
    /// 新增与删除行的总数
    pub fn total_changes(&self) -> u64 {
        u64::from(self.insertions) + u64::from(self.deletions)
    }

    /// 重命名前的路径
    pub fn old_path(&self) -> Option<&Path> {
        match &self.change_type {
            ChangeType::Renamed { old_path } => Some(old_path.as_path()),
            _ => None,
        }
    }

    /// 所有新增行
    pub fn added_lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.lines_of(DiffLineType::Added)
    }

    /// 所有删除行
    pub fn removed_lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.lines_of(DiffLineType::Removed)
    }

    fn lines_of(&self, line_type: DiffLineType) -> impl Iterator<Item = &DiffLine> {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(move |l| l.line_type == line_type)
    }

    /// 新增行拼接成的文本（用于结构提取）
    pub fn added_text(&self) -> String {
        join_lines(self.added_lines())
    }

    /// 删除行拼接成的文本
    pub fn removed_text(&self) -> String {
        join_lines(self.removed_lines())
    }
}

fn join_lines<'a>(lines: impl Iterator<Item = &'a DiffLine>) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(&line.content);
        text.push('\n');
    }
    text
}

/// 差异文本解析器
pub struct DiffParser;

impl DiffParser {
    /// 解析单行 numstat：`<insertions>\t<deletions>\t<path>`
    ///
    /// `-` 表示二进制文件，计为 0。
    pub fn parse_numstat_line(line: &str) -> Result<NumstatEntry> {
        let mut parts = line.splitn(3, '\t');
        let (Some(ins), Some(del), Some(path_part)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DiffInsightError::ParseError(format!(
                "Malformed numstat line: {line:?}"
            )));
        };

        let is_binary = ins == "-" || del == "-";
        let insertions = Self::parse_count(ins, line)?;
        let deletions = Self::parse_count(del, line)?;

        let path_part = path_part.trim();
        if path_part.is_empty() {
            return Err(DiffInsightError::ParseError(format!(
                "Numstat line has no path: {line:?}"
            )));
        }
        let (path, old_path) = Self::split_rename(path_part);

        Ok(NumstatEntry {
            insertions,
            deletions,
            path,
            old_path,
            is_binary,
        })
    }

    fn parse_count(raw: &str, line: &str) -> Result<u32> {
        if raw == "-" {
            return Ok(0);
        }
        raw.trim().parse::<u32>().map_err(|e| {
            DiffInsightError::ParseError(format!("Invalid count {raw:?} in numstat {line:?}: {e}"))
        })
    }

    /// 解析 numstat 路径中的重命名语法，返回 (新路径, 旧路径)
    ///
    /// 支持 `old => new` 与 `dir/{old => new}/file` 两种形式。
    fn split_rename(path_part: &str) -> (PathBuf, Option<PathBuf>) {
        if let Some(brace_start) = path_part.find('{') {
            let rest = &path_part[brace_start..];
            if let (Some(arrow), Some(brace_end)) = (rest.find(" => "), rest.find('}')) {
                if arrow < brace_end {
                    let prefix = &path_part[..brace_start];
                    let suffix = &rest[brace_end + 1..];
                    let old_name = rest[1..arrow].trim();
                    let new_name = rest[arrow + 4..brace_end].trim();
                    let old = normalize_path(&format!("{prefix}{old_name}{suffix}"));
                    let new = normalize_path(&format!("{prefix}{new_name}{suffix}"));
                    return (PathBuf::from(new), Some(PathBuf::from(old)));
                }
            }
        }

        if let Some((old, new)) = path_part.split_once(" => ") {
            return (
                PathBuf::from(new.trim()),
                Some(PathBuf::from(old.trim())),
            );
        }

        (PathBuf::from(path_part), None)
    }

    /// 由一行 numstat 和对应的差异正文构建一个文件变更
    ///
    /// 差异正文缺失或无法解析时得到空的差异块列表。
    pub fn parse_change(numstat_line: &str, diff_body: Option<&str>) -> Result<FileChange> {
        let entry = Self::parse_numstat_line(numstat_line)?;
        Ok(Self::build_change(entry, diff_body))
    }

    fn build_change(entry: NumstatEntry, diff_body: Option<&str>) -> FileChange {
        let body = diff_body.unwrap_or_default();
        let hunks = Self::parse_hunks(body);

        let change_type = if body.contains("\nnew file mode") || body.starts_with("new file mode")
        {
            ChangeType::Added
        } else if body.contains("\ndeleted file mode") || body.starts_with("deleted file mode") {
            ChangeType::Deleted
        } else if let Some(old_path) = entry
            .old_path
            .clone()
            .or_else(|| Self::rename_source(body))
        {
            ChangeType::Renamed { old_path }
        } else {
            ChangeType::Modified
        };

        let is_binary = entry.is_binary || body.contains("Binary files ");

        let (insertions, deletions) = if hunks.is_empty() {
            (entry.insertions, entry.deletions)
        } else {
            let counted = count_lines(&hunks);
            if counted != (entry.insertions, entry.deletions) {
                debug!(
                    "numstat counts {:?} differ from diff body {:?} for {}",
                    (entry.insertions, entry.deletions),
                    counted,
                    entry.path.display()
                );
            }
            counted
        };

        FileChange {
            file_path: entry.path,
            change_type,
            insertions,
            deletions,
            hunks,
            is_binary,
        }
    }

    fn rename_source(body: &str) -> Option<PathBuf> {
        body.lines()
            .take_while(|l| !l.starts_with("@@"))
            .find_map(|l| l.strip_prefix("rename from "))
            .map(|p| PathBuf::from(p.trim()))
    }

    /// 解析差异正文中的所有差异块
    ///
    /// 只跟踪新文件的起始行号，并为每个新增行分配行号。
    pub fn parse_hunks(body: &str) -> Vec<DiffHunk> {
        let mut hunks = Vec::new();
        let mut current: Option<DiffHunk> = None;

        for raw in body.lines() {
            if let Some(caps) = HUNK_HEADER.captures(raw) {
                if let Some(done) = current.take() {
                    hunks.push(done);
                }
                let number = |i: usize, default: u32| {
                    caps.get(i)
                        .and_then(|m| m.as_str().parse::<u32>().ok())
                        .unwrap_or(default)
                };
                let new_start = number(3, 0);
                current = Some(DiffHunk {
                    header: raw.to_string(),
                    old_start: number(1, 0),
                    old_lines: number(2, 1),
                    new_start,
                    new_lines: number(4, 1),
                    end_line: new_start,
                    lines: Vec::new(),
                });
                continue;
            }

            let Some(hunk) = current.as_mut() else {
                // 第一个差异块之前的元数据行
                continue;
            };

            if let Some(content) = raw.strip_prefix('+') {
                let Some(next_line) = hunk.end_line.checked_add(1) else {
                    warn!("Hunk `{}` exceeds the line number range, skipping it", hunk.header);
                    current = None;
                    continue;
                };
                hunk.lines.push(DiffLine {
                    content: content.to_string(),
                    line_type: DiffLineType::Added,
                    line_number: Some(hunk.end_line),
                });
                hunk.end_line = next_line;
            } else if let Some(content) = raw.strip_prefix('-') {
                hunk.lines.push(DiffLine {
                    content: content.to_string(),
                    line_type: DiffLineType::Removed,
                    line_number: None,
                });
            } else if let Some(content) = raw.strip_prefix(' ') {
                hunk.lines.push(DiffLine {
                    content: content.to_string(),
                    line_type: DiffLineType::Context,
                    line_number: None,
                });
            } else if raw.is_empty() {
                hunk.lines.push(DiffLine {
                    content: String::new(),
                    line_type: DiffLineType::Context,
                    line_number: None,
                });
            } else if raw.starts_with('\\') {
                // "\ No newline at end of file"
                continue;
            } else {
                // 其他内容意味着差异块结束
                if let Some(done) = current.take() {
                    hunks.push(done);
                }
            }
        }

        if let Some(done) = current {
            hunks.push(done);
        }
        hunks
    }

    /// 将 numstat 输出与完整差异文本配对，得到所有文件变更
    ///
    /// 无法解析的 numstat 行会被跳过并记录警告。
    pub fn parse_changes(numstat: &str, diff: &str) -> Vec<FileChange> {
        let mut bodies: HashMap<PathBuf, String> = Self::split_sections(diff)
            .into_iter()
            .map(|section| (section.path, section.body))
            .collect();

        let mut changes = Vec::new();
        for line in numstat.lines().filter(|l| !l.trim().is_empty()) {
            match Self::parse_numstat_line(line) {
                Ok(entry) => {
                    let body = bodies.remove(&entry.path);
                    changes.push(Self::build_change(entry, body.as_deref()));
                }
                Err(e) => warn!("Skipping numstat line: {}", e),
            }
        }
        changes
    }

    /// 解析完整的多文件差异文本（按 `diff --git` 边界拆分）
    ///
    /// 通过 "new file mode" / "deleted file mode" 推断新增与删除。
    pub fn parse_multi_file_diff(diff: &str) -> Vec<FileChange> {
        Self::split_sections(diff)
            .into_iter()
            .map(|section| {
                let hunks = Self::parse_hunks(&section.body);
                let (insertions, deletions) = count_lines(&hunks);
                let change_type = match (section.change_type, section.old_path) {
                    (ChangeType::Modified, Some(old_path)) => ChangeType::Renamed { old_path },
                    (other, _) => other,
                };
                FileChange {
                    file_path: section.path,
                    change_type,
                    insertions,
                    deletions,
                    hunks,
                    is_binary: section.is_binary,
                }
            })
            .collect()
    }

    fn split_sections(diff: &str) -> Vec<FileSection> {
        let mut raw_sections: Vec<Vec<&str>> = Vec::new();
        for line in diff.lines() {
            if line.starts_with("diff --git ") {
                raw_sections.push(vec![line]);
            } else if let Some(section) = raw_sections.last_mut() {
                section.push(line);
            }
        }

        let mut sections = Vec::new();
        for lines in raw_sections {
            match Self::parse_section(&lines) {
                Ok(section) => sections.push(section),
                Err(e) => warn!("Skipping unparseable diff section: {}", e),
            }
        }
        sections
    }

    fn parse_section(lines: &[&str]) -> Result<FileSection> {
        let header = lines.first().copied().unwrap_or_default();
        let (header_old, header_new) = Self::parse_git_header(header);

        let mut change_type = ChangeType::Modified;
        let mut minus_path: Option<String> = None;
        let mut plus_path: Option<String> = None;
        let mut rename_from: Option<String> = None;
        let mut rename_to: Option<String> = None;
        let mut is_binary = false;

        for line in lines.iter().skip(1).take_while(|l| !l.starts_with("@@")) {
            if line.starts_with("new file mode") {
                change_type = ChangeType::Added;
            } else if line.starts_with("deleted file mode") {
                change_type = ChangeType::Deleted;
            } else if let Some(p) = line.strip_prefix("rename from ") {
                rename_from = Some(p.trim().to_string());
            } else if let Some(p) = line.strip_prefix("rename to ") {
                rename_to = Some(p.trim().to_string());
            } else if let Some(p) = line.strip_prefix("--- ") {
                minus_path = strip_side_prefix(p);
            } else if let Some(p) = line.strip_prefix("+++ ") {
                plus_path = strip_side_prefix(p);
            } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
                is_binary = true;
            }
        }

        let path = rename_to
            .or(plus_path)
            .or_else(|| minus_path.clone())
            .or(header_new)
            .ok_or_else(|| {
                DiffInsightError::ParseError(format!("Cannot determine file path from {header:?}"))
            })?;

        let old_path = rename_from
            .or_else(|| match (&minus_path, &header_old) {
                (Some(old), _) if *old != path && change_type == ChangeType::Modified => {
                    Some(old.clone())
                }
                (None, Some(old)) if *old != path && change_type == ChangeType::Modified => {
                    Some(old.clone())
                }
                _ => None,
            })
            .map(PathBuf::from);

        Ok(FileSection {
            path: PathBuf::from(path),
            old_path,
            change_type,
            is_binary,
            body: lines.join("\n"),
        })
    }

    /// 解析 `diff --git a/<old> b/<new>` 头部
    fn parse_git_header(header: &str) -> (Option<String>, Option<String>) {
        let Some(rest) = header.strip_prefix("diff --git ") else {
            return (None, None);
        };
        match rest.rfind(" b/") {
            Some(idx) => {
                let old = rest[..idx].strip_prefix("a/").map(str::to_string);
                let new = rest[idx + 3..].to_string();
                (old, (!new.is_empty()).then_some(new))
            }
            None => (None, None),
        }
    }
}

fn strip_side_prefix(raw: &str) -> Option<String> {
    let raw = raw.trim_end_matches('\t').trim();
    if raw == "/dev/null" {
        return None;
    }
    let stripped = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    Some(stripped.to_string())
}

fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace("//", "/");
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    normalized.trim_start_matches('/').to_string()
}

fn count_lines(hunks: &[DiffHunk]) -> (u32, u32) {
    let mut insertions = 0;
    let mut deletions = 0;
    for line in hunks.iter().flat_map(|h| h.lines.iter()) {
        match line.line_type {
            DiffLineType::Added => insertions += 1,
            DiffLineType::Removed => deletions += 1,
            DiffLineType::Context => {}
        }
    }
    (insertions, deletions)
}
