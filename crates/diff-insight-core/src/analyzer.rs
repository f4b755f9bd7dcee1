//! 语义分类模块
//!
//! 对一组文件变更做启发式分析：主导变更类型、子模式、结构增量、
//! 复杂度指标以及风险因子。分析只读取已解析的差异内容，不会失败。

use crate::git::{ChangeType, DiffHunk, DiffLineType, FileChange};
use crate::parser::{
    ApiRoute, CodeStructure, ExtractorFactory, StructureExtractor, SupportedLanguage,
    common::strip_strings_and_comments,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static BRANCH_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(if|elif|else|for|while|switch|case|try|catch|except|match|loop)\b|&&|\|\|")
        .expect("valid branch regex")
});

static ERROR_HANDLING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(try|catch|except|finally|rescue)\b|if err != nil|\.catch\(|\.map_err\(")
        .expect("valid error handling regex")
});

static BUG_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(fix(?:e[sd])?|bug|hotfix|workaround|regression|issue)\b")
        .expect("valid bug keyword regex")
});

static NULL_GUARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[!=]==?\s*(?:null|undefined|nil|None)\b|\bis (?:not )?None\b|\?\.")
        .expect("valid null guard regex")
});

static TEST_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"#\[test\]|#\[cfg\(test\)\]|\b(?:describe|it|test)\(|\bassert(?:_eq|_ne)?!?\(|\bexpect\(|\bfunc Test\w*\(|\bdef test_\w*",
    )
    .expect("valid test marker regex")
});

static LOGGING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bconsole\.(?:log|info|warn|error|debug)\(|\blog(?:ger|ging)?\.(?:debug|info|warn(?:ing)?|error|trace|fatal|critical|exception|Print\w*)\(|\b(?:trace|debug|info|warn|error)!\(|\bfmt\.Print",
    )
    .expect("valid logging regex")
});

static COMMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?://|#(?:[^\[!]|$)|/\*|\*|"""|''')"#).expect("valid comment regex")
});

static LOOP_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\}\s*)?(?:for|while)\b|\bloop\s*\{|\.forEach\(")
        .expect("valid loop regex")
});

static SECRET_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"AKIA[0-9A-Z]{16}|ghp_[A-Za-z0-9]{36}|\bsk-[A-Za-z0-9]{20,}|xox[baprs]-[A-Za-z0-9-]{10,}|-----BEGIN (?:RSA |EC |OPENSSH )?PRIVATE KEY-----",
    )
    .expect("valid secret token regex")
});

static CREDENTIAL_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:\b|_)(password|passwd|pwd|secret|api[_-]?key|access[_-]?token|auth[_-]?token|private[_-]?key|client[_-]?secret)["']?\s*[:=]\s*["'][^"'\s]{4,}["']"#,
    )
    .expect("valid credential assignment regex")
});

static CREDENTIAL_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(password|passwd|secret|credential|api[_-]?key|private[_-]?key|auth[_-]?token)")
        .expect("valid credential keyword regex")
});

static DYNAMIC_EXECUTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\beval\s*\(|\bnew Function\s*\(|\bexec\s*\(|\bset(?:Timeout|Interval)\s*\(\s*["'`]"#)
        .expect("valid dynamic execution regex")
});

static HTML_SINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.innerHTML\s*=|\.outerHTML\s*=|dangerouslySetInnerHTML|document\.write\(|v-html=|mark_safe\(")
        .expect("valid html sink regex")
});

static DESTRUCTIVE_SQL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:DROP\s+(?:TABLE|DATABASE|SCHEMA|COLUMN|INDEX)|TRUNCATE(?:\s+TABLE)?)\b")
        .expect("valid destructive sql regex")
});

static DELETE_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bDELETE\s+FROM\b").expect("valid delete regex"));

static WHERE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").expect("valid where regex"));

static SCHEMA_SQL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ALTER\s+TABLE|CREATE\s+(?:TABLE|INDEX|DATABASE)|RENAME\s+COLUMN)\b")
        .expect("valid schema sql regex")
});

static STATIC_MUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bstatic\s+mut\b").expect("valid static mut regex"));

static SHARED_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:Mutex|RwLock|Atomic[A-Z]\w*|sync\.(?:Mutex|RWMutex|WaitGroup)|threading\.\w+|SharedArrayBuffer|Atomics\.\w+|synchronized|volatile)\b|\bArc<|\bgo func\b|^\s*global\s+\w+",
    )
    .expect("valid shared state regex")
});

const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.toml",
    "Cargo.lock",
    "go.mod",
    "go.sum",
    "requirements.txt",
    "Pipfile",
    "Pipfile.lock",
    "pyproject.toml",
    "poetry.lock",
    "Gemfile",
    "Gemfile.lock",
    "pom.xml",
    "build.gradle",
    "composer.json",
];

const CONFIG_EXTENSIONS: &[&str] = &["yml", "yaml", "toml", "ini", "cfg", "conf", "json", "env", "properties"];

const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "rst", "adoc", "txt"];

/// 行内是否出现凭据相关内容（关键字、赋值字面量或已知令牌格式）
pub fn mentions_credentials(line: &str) -> bool {
    is_hardcoded_secret(line) || CREDENTIAL_KEYWORD.is_match(line)
}

/// 凭据以字面量形式写死，或出现已知格式的令牌
pub fn is_hardcoded_secret(line: &str) -> bool {
    SECRET_TOKEN.is_match(line) || CREDENTIAL_ASSIGNMENT.is_match(line)
}

pub fn is_dynamic_execution(line: &str) -> bool {
    DYNAMIC_EXECUTION.is_match(line)
}

/// 未经转义直接写入 HTML 的位置
pub fn is_html_sink(line: &str) -> bool {
    HTML_SINK.is_match(line)
}

pub fn is_logging_call(line: &str) -> bool {
    LOGGING.is_match(line)
}

pub(crate) fn is_loop_header(line: &str) -> bool {
    LOOP_HEADER.is_match(line)
}

pub(crate) fn is_comment_line(line: &str) -> bool {
    COMMENT_LINE.is_match(line)
}

/// 主导变更类型
///
/// 声明顺序即平局时的优先级：bugfix > feature > refactor > test > docs > chore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Bugfix,
    Feature,
    Refactor,
    Test,
    Docs,
    Chore,
}

impl ChangeKind {
    /// 按平局优先级排列的全部类型
    pub const PRIORITY: [ChangeKind; 6] = [
        ChangeKind::Bugfix,
        ChangeKind::Feature,
        ChangeKind::Refactor,
        ChangeKind::Test,
        ChangeKind::Docs,
        ChangeKind::Chore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Bugfix => "bugfix",
            ChangeKind::Feature => "feature",
            ChangeKind::Refactor => "refactor",
            ChangeKind::Test => "test",
            ChangeKind::Docs => "docs",
            ChangeKind::Chore => "chore",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// 单个类型的证据得分
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindScore {
    pub kind: ChangeKind,
    pub score: f64,
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeClassification {
    pub kind: ChangeKind,
    /// 获胜得分占全部证据的比例，范围 [0, 1]
    pub confidence: f64,
    /// 按优先级顺序列出的全部得分
    pub scores: Vec<KindScore>,
}

/// 文件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Source,
    Test,
    Docs,
    Config,
    Manifest,
}

impl FileCategory {
    /// 根据路径判断文件类别
    pub fn of(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let components: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_ascii_lowercase())
            .collect();
        let in_dir = |names: &[&str]| {
            components
                .iter()
                .take(components.len().saturating_sub(1))
                .any(|c| names.contains(&c.as_str()))
        };

        if MANIFEST_FILES.contains(&file_name) {
            return FileCategory::Manifest;
        }
        if is_test_file_name(file_name) || in_dir(&["test", "tests", "__tests__", "spec", "specs"]) {
            return FileCategory::Test;
        }
        let upper = file_name.to_ascii_uppercase();
        if DOC_EXTENSIONS.contains(&extension.as_str())
            || in_dir(&["docs", "doc"])
            || upper.starts_with("LICENSE")
            || upper.starts_with("CHANGELOG")
        {
            return FileCategory::Docs;
        }
        if CONFIG_EXTENSIONS.contains(&extension.as_str())
            || file_name.starts_with(".env")
            || file_name.starts_with("Dockerfile")
            || file_name.starts_with("docker-compose")
            || matches!(file_name, ".gitignore" | ".editorconfig" | ".dockerignore" | "Makefile")
            || in_dir(&[".github", ".circleci", "config"])
        {
            return FileCategory::Config;
        }
        FileCategory::Source
    }
}

/// 文件名是否符合常见测试文件命名
pub fn is_test_file_name(file_name: &str) -> bool {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    file_name.contains(".test.")
        || file_name.contains(".spec.")
        || stem.ends_with("_test")
        || stem.ends_with("_spec")
        || stem.starts_with("test_")
}

/// 子模式种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    NewPublicApi,
    ErrorHandlingAdded,
    TestsAdded,
    ApiRouteChanged,
    DependencyChange,
    ConfigChange,
    AsyncConversion,
    LoggingAdded,
    DeadCodeRemoval,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::NewPublicApi => "new_public_api",
            PatternKind::ErrorHandlingAdded => "error_handling_added",
            PatternKind::TestsAdded => "tests_added",
            PatternKind::ApiRouteChanged => "api_route_changed",
            PatternKind::DependencyChange => "dependency_change",
            PatternKind::ConfigChange => "config_change",
            PatternKind::AsyncConversion => "async_conversion",
            PatternKind::LoggingAdded => "logging_added",
            PatternKind::DeadCodeRemoval => "dead_code_removal",
        }
    }
}

/// 检测到的子模式及证据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePattern {
    pub kind: PatternKind,
    pub evidence: Vec<String>,
}

/// 带文件归属的符号
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    pub name: String,
    pub file: PathBuf,
}

/// 汇总的结构增量
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDelta {
    pub added_functions: Vec<SymbolRef>,
    pub modified_functions: Vec<SymbolRef>,
    pub removed_functions: Vec<SymbolRef>,
    pub added_classes: Vec<SymbolRef>,
    pub modified_classes: Vec<SymbolRef>,
    pub removed_classes: Vec<SymbolRef>,
    pub added_imports: Vec<SymbolRef>,
    pub removed_imports: Vec<SymbolRef>,
    pub added_exports: Vec<SymbolRef>,
    pub removed_exports: Vec<SymbolRef>,
    /// 形如 `GET /users` 的路由描述
    pub added_routes: Vec<SymbolRef>,
    pub removed_routes: Vec<SymbolRef>,
}

impl StructureDelta {
    pub fn is_empty(&self) -> bool {
        *self == StructureDelta::default()
    }
}

/// 复杂度指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    /// 圈复杂度近似：1 + 新增代码中的判定点
    pub cyclomatic: u32,
    /// 认知复杂度近似：每个判定点按嵌套层级加权
    pub cognitive: u32,
    pub total_changed_lines: u64,
    pub max_nesting_depth: u32,
}

/// 风险类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskType {
    Performance,
    Security,
    Breaking,
    Data,
    Concurrency,
    Size,
    Complexity,
    Scope,
}

impl RiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::Performance => "performance",
            RiskType::Security => "security",
            RiskType::Breaking => "breaking",
            RiskType::Data => "data",
            RiskType::Concurrency => "concurrency",
            RiskType::Size => "size",
            RiskType::Complexity => "complexity",
            RiskType::Scope => "scope",
        }
    }
}

/// 风险影响程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
        }
    }
}

/// 单条风险因子
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub risk_type: RiskType,
    pub description: String,
    pub impact: Impact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl RiskFactor {
    pub fn new(risk_type: RiskType, impact: Impact, description: impl Into<String>) -> Self {
        Self {
            risk_type,
            description: description.into(),
            impact,
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: &Path, line: Option<u32>) -> Self {
        self.file = Some(file.to_path_buf());
        self.line = line;
        self
    }
}

/// 一组变更的完整语义分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    pub classification: ChangeClassification,
    pub patterns: Vec<ChangePattern>,
    pub structure: StructureDelta,
    pub complexity: ComplexityMetrics,
    pub risk_factors: Vec<RiskFactor>,
    pub files_analyzed: usize,
}

/// 单个文件的结构对比：新增行与删除行分别提取
struct FileStructures {
    added: CodeStructure,
    removed: CodeStructure,
    /// 差异块标题中携带的上下文函数名
    context_functions: Vec<String>,
}

/// 语义分析器
pub struct SemanticAnalyzer {
    extractors: Vec<Box<dyn StructureExtractor>>,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    /// 创建分析器，并预先构建所有语言的结构提取器
    pub fn new() -> Self {
        let languages = [
            SupportedLanguage::TypeScript,
            SupportedLanguage::JavaScript,
            SupportedLanguage::Python,
            SupportedLanguage::Rust,
            SupportedLanguage::Go,
        ];
        let extractors = languages
            .into_iter()
            .filter_map(|language| match ExtractorFactory::create_extractor(language) {
                Ok(extractor) => Some(extractor),
                Err(e) => {
                    warn!("Structure extractor for {} unavailable: {}", language.name(), e);
                    None
                }
            })
            .collect();

        Self { extractors }
    }

    fn extractor_for(&self, path: &Path) -> Option<&dyn StructureExtractor> {
        let language = ExtractorFactory::detect_language(path)?;
        self.extractors
            .iter()
            .find(|e| e.language() == language)
            .map(|e| &**e)
    }

    /// 分析一组文件变更
    pub fn analyze(&self, changes: &[FileChange]) -> SemanticAnalysis {
        let mut scores = [0.0f64; 6];
        let mut structure = StructureDelta::default();
        let mut complexity = ComplexityMetrics::default();
        let mut risk_factors = Vec::new();
        let mut patterns = PatternCollector::default();

        for change in changes {
            let category = FileCategory::of(&change.file_path);
            let structures = if change.is_binary {
                None
            } else {
                self.extract_structures(change)
            };

            if let Some(s) = &structures {
                merge_delta(&mut structure, &change.file_path, s);
            }
            score_file(change, category, structures.as_ref(), &mut scores);
            detect_patterns(change, category, structures.as_ref(), &mut patterns);

            if category != FileCategory::Docs && !change.is_binary {
                accumulate_complexity(change, &mut complexity);
                risk_factors.extend(line_risk_factors(change));
            }
            if let Some(s) = &structures {
                risk_factors.extend(breaking_risk_factors(change, s));
            }
        }

        complexity.total_changed_lines = changes.iter().map(FileChange::total_changes).sum();
        let classification = classify(scores);
        debug!(
            "Classified {} changes as {} (confidence {:.2}, {} risk factors)",
            changes.len(),
            classification.kind.as_str(),
            classification.confidence,
            risk_factors.len()
        );

        SemanticAnalysis {
            classification,
            patterns: patterns.finish(),
            structure,
            complexity,
            risk_factors,
            files_analyzed: changes.len(),
        }
    }

    fn extract_structures(&self, change: &FileChange) -> Option<FileStructures> {
        let extractor = self.extractor_for(&change.file_path)?;
        let context_functions = change
            .hunks
            .iter()
            .filter_map(hunk_heading)
            .flat_map(|heading| {
                extractor
                    .extract(heading)
                    .functions
                    .into_iter()
                    .map(|f| f.name)
            })
            .collect();

        Some(FileStructures {
            added: extractor.extract(&change.added_text()),
            removed: extractor.extract(&change.removed_text()),
            context_functions,
        })
    }
}

/// 差异块标题在第二个 `@@` 之后携带的上下文行
fn hunk_heading(hunk: &DiffHunk) -> Option<&str> {
    let rest = hunk.header.strip_prefix("@@")?;
    let (_, heading) = rest.split_once("@@")?;
    let heading = heading.trim();
    (!heading.is_empty()).then_some(heading)
}

fn classify(scores: [f64; 6]) -> ChangeClassification {
    let total: f64 = scores.iter().sum();
    let mut winner = ChangeKind::Chore;
    let mut best = 0.0;
    for kind in ChangeKind::PRIORITY {
        // 严格大于，平局时保留优先级更高的类型
        if scores[kind.index()] > best {
            best = scores[kind.index()];
            winner = kind;
        }
    }

    let confidence = if total > 0.0 {
        (best / total).clamp(0.0, 1.0)
    } else {
        0.0
    };

    ChangeClassification {
        kind: winner,
        confidence,
        scores: ChangeKind::PRIORITY
            .iter()
            .map(|&kind| KindScore {
                kind,
                score: scores[kind.index()],
            })
            .collect(),
    }
}

fn comment_prefix(path: &Path) -> &'static str {
    ExtractorFactory::detect_language(path)
        .map(|l| l.line_comment())
        .unwrap_or("//")
}

fn added_code<'a>(change: &'a FileChange) -> impl Iterator<Item = (&'a str, Option<u32>)> + 'a {
    change
        .added_lines()
        .filter(|l| !l.content.trim().is_empty() && !COMMENT_LINE.is_match(&l.content))
        .map(|l| (l.content.as_str(), l.line_number))
}

fn score_file(
    change: &FileChange,
    category: FileCategory,
    structures: Option<&FileStructures>,
    scores: &mut [f64; 6],
) {
    let mut add = |kind: ChangeKind, weight: f64| scores[kind.index()] += weight;

    match category {
        FileCategory::Test => {
            let test_lines = change
                .added_lines()
                .filter(|l| TEST_MARKERS.is_match(&l.content))
                .count();
            add(ChangeKind::Test, 3.0 + 0.5 * test_lines as f64);
            return;
        }
        FileCategory::Docs => {
            add(ChangeKind::Docs, 3.0);
            return;
        }
        FileCategory::Config | FileCategory::Manifest => {
            add(ChangeKind::Chore, 2.0);
            return;
        }
        FileCategory::Source => {}
    }

    let comment = comment_prefix(&change.file_path);
    for (line, _) in added_code(change) {
        let code = strip_strings_and_comments(line, comment);
        if ERROR_HANDLING.is_match(&code) {
            add(ChangeKind::Bugfix, 1.0);
        }
        if NULL_GUARD.is_match(&code) {
            add(ChangeKind::Bugfix, 0.5);
        }
        if TEST_MARKERS.is_match(line) {
            add(ChangeKind::Test, 0.5);
        }
    }
    let bug_comments = change
        .added_lines()
        .filter(|l| COMMENT_LINE.is_match(&l.content) && BUG_KEYWORDS.is_match(&l.content))
        .count();
    add(ChangeKind::Bugfix, bug_comments as f64);

    let comment_lines = change
        .added_lines()
        .filter(|l| COMMENT_LINE.is_match(&l.content))
        .count();
    add(ChangeKind::Docs, 0.3 * comment_lines as f64);

    match &change.change_type {
        ChangeType::Added => add(ChangeKind::Feature, 2.0),
        ChangeType::Renamed { .. } => add(ChangeKind::Refactor, 2.0),
        _ => {}
    }

    if let Some(s) = structures {
        let added = names(&s.added.functions, |f| &f.name);
        let removed = names(&s.removed.functions, |f| &f.name);
        let new_functions = added.difference(&removed).count();
        let gone_functions = removed.difference(&added).count();
        let modified = added.intersection(&removed).count()
            + s.context_functions
                .iter()
                .filter(|n| !added.contains(n.as_str()) && !removed.contains(n.as_str()))
                .count();

        let added_classes = names(&s.added.classes, |c| &c.name);
        let removed_classes = names(&s.removed.classes, |c| &c.name);
        let new_classes = added_classes.difference(&removed_classes).count();

        add(
            ChangeKind::Feature,
            1.5 * (new_functions + new_classes) as f64 + 2.0 * s.added.routes.len() as f64,
        );
        add(
            ChangeKind::Refactor,
            0.5 * modified as f64 + new_functions.min(gone_functions) as f64,
        );
    }

    // 增删规模接近且都不为零，多为改写
    let (ins, del) = (f64::from(change.insertions), f64::from(change.deletions));
    if ins > 0.0 && del > 0.0 && ins.min(del) / ins.max(del) >= 0.6 {
        add(ChangeKind::Refactor, 1.0);
    }

    if is_whitespace_only(change) {
        add(ChangeKind::Chore, 2.0);
    }
}

fn names<'a, T>(items: &'a [T], name: impl Fn(&'a T) -> &'a String) -> BTreeSet<&'a str> {
    items.iter().map(|item| name(item).as_str()).collect()
}

/// 增删内容去掉空白后完全一致，视为格式调整
fn is_whitespace_only(change: &FileChange) -> bool {
    if change.insertions == 0 || change.deletions == 0 {
        return false;
    }
    let normalize = |text: String| -> String { text.chars().filter(|c| !c.is_whitespace()).collect() };
    normalize(change.added_text()) == normalize(change.removed_text())
}

fn merge_delta(delta: &mut StructureDelta, file: &Path, s: &FileStructures) {
    let push = |target: &mut Vec<SymbolRef>, names: BTreeSet<&str>| {
        target.extend(names.into_iter().map(|name| SymbolRef {
            name: name.to_string(),
            file: file.to_path_buf(),
        }));
    };

    let added = names(&s.added.functions, |f| &f.name);
    let removed = names(&s.removed.functions, |f| &f.name);
    let mut modified: BTreeSet<&str> = added.intersection(&removed).copied().collect();
    modified.extend(
        s.context_functions
            .iter()
            .map(String::as_str)
            .filter(|n| !added.contains(n) && !removed.contains(n)),
    );
    push(&mut delta.added_functions, added.difference(&removed).copied().collect());
    push(&mut delta.removed_functions, removed.difference(&added).copied().collect());
    push(&mut delta.modified_functions, modified);

    let added = names(&s.added.classes, |c| &c.name);
    let removed = names(&s.removed.classes, |c| &c.name);
    push(&mut delta.added_classes, added.difference(&removed).copied().collect());
    push(&mut delta.removed_classes, removed.difference(&added).copied().collect());
    push(&mut delta.modified_classes, added.intersection(&removed).copied().collect());

    let added = names(&s.added.imports, |i| &i.module);
    let removed = names(&s.removed.imports, |i| &i.module);
    push(&mut delta.added_imports, added.difference(&removed).copied().collect());
    push(&mut delta.removed_imports, removed.difference(&added).copied().collect());

    let added = names(&s.added.exports, |e| &e.name);
    let removed = names(&s.removed.exports, |e| &e.name);
    push(&mut delta.added_exports, added.difference(&removed).copied().collect());
    push(&mut delta.removed_exports, removed.difference(&added).copied().collect());

    let added = route_labels(&s.added);
    let removed = route_labels(&s.removed);
    push(
        &mut delta.added_routes,
        added.difference(&removed).map(String::as_str).collect(),
    );
    push(
        &mut delta.removed_routes,
        removed.difference(&added).map(String::as_str).collect(),
    );
}

fn route_labels(structure: &CodeStructure) -> BTreeSet<String> {
    structure.routes.iter().map(ApiRoute::label).collect()
}

#[derive(Default)]
struct PatternCollector {
    found: Vec<ChangePattern>,
}

impl PatternCollector {
    fn add(&mut self, kind: PatternKind, evidence: String) {
        match self.found.iter_mut().find(|p| p.kind == kind) {
            Some(pattern) => {
                if !pattern.evidence.contains(&evidence) {
                    pattern.evidence.push(evidence);
                }
            }
            None => self.found.push(ChangePattern {
                kind,
                evidence: vec![evidence],
            }),
        }
    }

    fn finish(self) -> Vec<ChangePattern> {
        self.found
    }
}

fn detect_patterns(
    change: &FileChange,
    category: FileCategory,
    structures: Option<&FileStructures>,
    patterns: &mut PatternCollector,
) {
    let path = change.file_path.display().to_string();

    match category {
        FileCategory::Manifest => {
            patterns.add(PatternKind::DependencyChange, format!("{path} changed"));
        }
        FileCategory::Config => {
            patterns.add(PatternKind::ConfigChange, format!("{path} changed"));
        }
        FileCategory::Test if change.insertions > 0 => {
            patterns.add(
                PatternKind::TestsAdded,
                format!("{path}: {} lines of tests added", change.insertions),
            );
        }
        _ => {}
    }

    if category == FileCategory::Docs {
        return;
    }

    let comment = comment_prefix(&change.file_path);
    for (line, number) in added_code(change) {
        let code = strip_strings_and_comments(line, comment);
        let location = number.map_or_else(|| path.clone(), |n| format!("{path}:{n}"));
        if ERROR_HANDLING.is_match(&code) {
            patterns.add(
                PatternKind::ErrorHandlingAdded,
                format!("{location}: {}", line.trim()),
            );
        }
        if LOGGING.is_match(line) {
            patterns.add(PatternKind::LoggingAdded, format!("{location}: {}", line.trim()));
        }
    }

    let Some(s) = structures else { return };

    let removed_exports = names(&s.removed.exports, |e| &e.name);
    for export in s.added.exports.iter() {
        if !removed_exports.contains(export.name.as_str()) {
            patterns.add(
                PatternKind::NewPublicApi,
                format!("{path}: exports {}", export.name),
            );
        }
    }

    let added_routes = route_labels(&s.added);
    let removed_routes = route_labels(&s.removed);
    for route in added_routes.symmetric_difference(&removed_routes) {
        let verb = if added_routes.contains(route) { "added" } else { "removed" };
        patterns.add(
            PatternKind::ApiRouteChanged,
            format!("{path}: route {route} {verb}"),
        );
    }

    if category == FileCategory::Source {
        let test_functions = s
            .added
            .functions
            .iter()
            .filter(|f| f.name.starts_with("test") || f.name.starts_with("Test"))
            .count();
        if test_functions > 0 {
            patterns.add(
                PatternKind::TestsAdded,
                format!("{path}: {test_functions} test functions added"),
            );
        }
    }

    for function in &s.added.functions {
        let was_sync = s
            .removed
            .functions
            .iter()
            .any(|old| old.name == function.name && !old.is_async);
        if function.is_async && was_sync {
            patterns.add(
                PatternKind::AsyncConversion,
                format!("{path}: {} became async", function.name),
            );
        }
    }

    let external_imports: Vec<&str> = s
        .added
        .imports
        .iter()
        .filter(|i| !i.is_local)
        .filter(|i| !s.removed.imports.iter().any(|old| old.module == i.module))
        .map(|i| i.module.as_str())
        .collect();
    for module in external_imports {
        patterns.add(
            PatternKind::DependencyChange,
            format!("{path}: imports {module}"),
        );
    }

    let added_functions = names(&s.added.functions, |f| &f.name);
    let dead: Vec<&str> = s
        .removed
        .functions
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| !added_functions.contains(name))
        .collect();
    if !dead.is_empty() && change.deletions > change.insertions {
        for name in dead {
            patterns.add(
                PatternKind::DeadCodeRemoval,
                format!("{path}: {name} removed"),
            );
        }
    }
}

/// 行首缩进宽度，制表符按 4 列计算
pub(crate) fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// 从差异块中推断缩进单位：最小的非零缩进，限制在 2..=8
fn indent_unit(change: &FileChange) -> usize {
    change
        .hunks
        .iter()
        .flat_map(|h| h.lines.iter())
        .filter(|l| !l.content.trim().is_empty())
        .map(|l| indent_width(&l.content))
        .filter(|&w| w > 0)
        .min()
        .unwrap_or(4)
        .clamp(2, 8)
}

fn accumulate_complexity(change: &FileChange, metrics: &mut ComplexityMetrics) {
    let comment = comment_prefix(&change.file_path);
    let unit = indent_unit(change);
    let mut has_code = false;
    let mut decisions = 0u32;

    for (line, _) in added_code(change) {
        has_code = true;
        let level = (indent_width(line) / unit) as u32;
        metrics.max_nesting_depth = metrics.max_nesting_depth.max(level);

        let code = strip_strings_and_comments(line, comment);
        let points = BRANCH_TOKENS.find_iter(&code).count() as u32;
        decisions += points;
        // 嵌套越深，每个判定点的认知负担越重
        metrics.cognitive += points * (1 + level);
    }

    if has_code {
        metrics.cyclomatic += 1 + decisions;
    }
}

/// 扫描新增行中的性能、安全、数据与并发风险
fn line_risk_factors(change: &FileChange) -> Vec<RiskFactor> {
    let mut factors = nested_loop_factors(change);
    let path = &change.file_path;

    for (line, number) in added_code(change) {
        let trimmed = line.trim();

        if is_hardcoded_secret(line) {
            factors.push(
                RiskFactor::new(
                    RiskType::Security,
                    Impact::High,
                    "Hardcoded credential or secret token added",
                )
                .at(path, number),
            );
        } else if CREDENTIAL_KEYWORD.is_match(line) {
            factors.push(
                RiskFactor::new(
                    RiskType::Security,
                    Impact::Medium,
                    "Credential-related code changed",
                )
                .at(path, number),
            );
        } else if DYNAMIC_EXECUTION.is_match(line) || HTML_SINK.is_match(line) {
            factors.push(
                RiskFactor::new(
                    RiskType::Security,
                    Impact::Medium,
                    format!("Dynamic execution or raw HTML sink: {trimmed}"),
                )
                .at(path, number),
            );
        }

        if DESTRUCTIVE_SQL.is_match(line)
            || (DELETE_FROM.is_match(line) && !WHERE_CLAUSE.is_match(line))
        {
            factors.push(
                RiskFactor::new(
                    RiskType::Data,
                    Impact::High,
                    format!("Destructive data statement: {trimmed}"),
                )
                .at(path, number),
            );
        } else if SCHEMA_SQL.is_match(line) {
            factors.push(
                RiskFactor::new(
                    RiskType::Data,
                    Impact::Medium,
                    format!("Schema change: {trimmed}"),
                )
                .at(path, number),
            );
        }

        if STATIC_MUT.is_match(line) {
            factors.push(
                RiskFactor::new(
                    RiskType::Concurrency,
                    Impact::High,
                    "Global mutable state introduced",
                )
                .at(path, number),
            );
        } else if SHARED_STATE.is_match(line) {
            factors.push(
                RiskFactor::new(
                    RiskType::Concurrency,
                    Impact::Medium,
                    format!("Shared mutable state: {trimmed}"),
                )
                .at(path, number),
            );
        }
    }

    factors
}

/// 在新文件视角（上下文行 + 新增行）中跟踪循环缩进栈，新增的内层循环记为风险
fn nested_loop_factors(change: &FileChange) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    for hunk in &change.hunks {
        let mut loop_indents: Vec<usize> = Vec::new();
        for line in hunk.lines.iter().filter(|l| l.line_type != DiffLineType::Removed) {
            if line.content.trim().is_empty() {
                continue;
            }
            let indent = indent_width(&line.content);
            while loop_indents.last().is_some_and(|&top| top >= indent) {
                loop_indents.pop();
            }
            if LOOP_HEADER.is_match(&line.content) {
                if !loop_indents.is_empty() && line.line_type == DiffLineType::Added {
                    factors.push(
                        RiskFactor::new(
                            RiskType::Performance,
                            Impact::Medium,
                            "Nested loop added",
                        )
                        .at(&change.file_path, line.line_number),
                    );
                }
                loop_indents.push(indent);
            }
        }
    }

    factors
}

/// 删除后未重新添加的导出符号
fn breaking_risk_factors(change: &FileChange, s: &FileStructures) -> Vec<RiskFactor> {
    let added = names(&s.added.exports, |e| &e.name);
    s.removed
        .exports
        .iter()
        .filter(|e| !added.contains(e.name.as_str()))
        .map(|e| {
            RiskFactor::new(
                RiskType::Breaking,
                Impact::High,
                format!("Exported symbol `{}` removed", e.name),
            )
            .at(&change.file_path, None)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::DiffParser;
    use pretty_assertions::assert_eq;

    const AUTH_DIFF: &str = "diff --git a/src/auth.ts b/src/auth.ts
index 1111111..2222222 100644
--- a/src/auth.ts
+++ b/src/auth.ts
@@ -10,3 +10,5 @@ import { db } from './db';
 const TIMEOUT = 30;
-export function login(user: string, pass: string) {
+function authenticate(user: string, pass: string) {
+  try {
+    return db.check(user, pass);
+  } catch (err) {
+    return null;
+  }
 }
";

    fn change(numstat: &str, diff: &str) -> FileChange {
        let body = diff.split_once("@@").map(|(_, rest)| format!("@@{rest}"));
        DiffParser::parse_change(numstat, body.as_deref()).unwrap()
    }

    #[test]
    fn test_removed_export_is_breaking_and_not_docs() {
        let changes = vec![change("6\t1\tsrc/auth.ts", AUTH_DIFF)];
        let analysis = SemanticAnalyzer::new().analyze(&changes);

        let breaking: Vec<&RiskFactor> = analysis
            .risk_factors
            .iter()
            .filter(|f| f.risk_type == RiskType::Breaking)
            .collect();
        assert_eq!(breaking.len(), 1);
        assert_eq!(breaking[0].impact, Impact::High);
        assert!(breaking[0].description.contains("login"));

        assert_ne!(analysis.classification.kind, ChangeKind::Docs);
        assert_ne!(analysis.classification.kind, ChangeKind::Chore);
        assert_eq!(analysis.classification.kind, ChangeKind::Bugfix);
        assert!(analysis.classification.confidence > 0.0);
        assert!(analysis.classification.confidence <= 1.0);

        assert!(
            analysis
                .patterns
                .iter()
                .any(|p| p.kind == PatternKind::ErrorHandlingAdded)
        );
        assert_eq!(
            analysis.structure.removed_exports,
            vec![SymbolRef {
                name: "login".to_string(),
                file: PathBuf::from("src/auth.ts"),
            }]
        );
    }

    #[test]
    fn test_no_evidence_is_chore_with_zero_confidence() {
        let analysis = SemanticAnalyzer::new().analyze(&[]);
        assert_eq!(analysis.classification.kind, ChangeKind::Chore);
        assert_eq!(analysis.classification.confidence, 0.0);
        assert_eq!(analysis.complexity, ComplexityMetrics::default());
    }

    #[test]
    fn test_tie_prefers_bugfix_over_feature() {
        let mut scores = [0.0; 6];
        scores[ChangeKind::Feature.index()] = 2.0;
        scores[ChangeKind::Bugfix.index()] = 2.0;
        let classification = classify(scores);
        assert_eq!(classification.kind, ChangeKind::Bugfix);
        assert_eq!(classification.confidence, 0.5);
    }

    #[test]
    fn test_test_files_classify_as_test() {
        let changes = vec![
            change(
                "2\t0\tsrc/auth.test.ts",
                "@@ -0,0 +1,2 @@\n+it('logs in', () => {\n+  expect(login()).toBe(true);\n",
            ),
            change("1\t0\ttests/api_test.py", "@@ -0,0 +1,1 @@\n+def test_api(): pass\n"),
        ];
        let analysis = SemanticAnalyzer::new().analyze(&changes);
        assert_eq!(analysis.classification.kind, ChangeKind::Test);
        assert_eq!(analysis.classification.confidence, 1.0);
        assert!(analysis.patterns.iter().any(|p| p.kind == PatternKind::TestsAdded));
    }

    #[test]
    fn test_new_file_with_functions_is_feature() {
        let diff = "@@ -0,0 +1,6 @@\n+export function createUser(name) {\n+  return { name };\n+}\n+export function deleteUser(id) {\n+  return id;\n+}\n";
        let mut added = change("6\t0\tsrc/users.ts", diff);
        added.change_type = ChangeType::Added;
        let analysis = SemanticAnalyzer::new().analyze(&[added]);

        assert_eq!(analysis.classification.kind, ChangeKind::Feature);
        assert_eq!(analysis.structure.added_functions.len(), 2);
        let api = analysis
            .patterns
            .iter()
            .find(|p| p.kind == PatternKind::NewPublicApi)
            .unwrap();
        assert_eq!(api.evidence.len(), 2);
    }

    #[test]
    fn test_docs_only_change() {
        let changes = vec![change("1\t1\tREADME.md", "@@ -1 +1 @@\n-old\n+new\n")];
        let analysis = SemanticAnalyzer::new().analyze(&changes);
        assert_eq!(analysis.classification.kind, ChangeKind::Docs);
        assert!(analysis.risk_factors.is_empty());
    }

    #[test]
    fn test_file_categories() {
        let cases = [
            ("src/app.ts", FileCategory::Source),
            ("src/app.test.ts", FileCategory::Test),
            ("tests/integration.rs", FileCategory::Test),
            ("pkg/handler_test.go", FileCategory::Test),
            ("docs/guide.md", FileCategory::Docs),
            ("CHANGELOG", FileCategory::Docs),
            ("Cargo.toml", FileCategory::Manifest),
            ("web/package.json", FileCategory::Manifest),
            (".github/workflows/ci.yml", FileCategory::Config),
            (".env.local", FileCategory::Config),
            ("Dockerfile", FileCategory::Config),
        ];
        for (path, expected) in cases {
            assert_eq!(FileCategory::of(Path::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn test_security_risk_specificity() {
        let diff = "@@ -1,0 +1,3 @@\n+const API_KEY = \"abcd1234efgh\";\n+const password = readPassword();\n+el.innerHTML = userInput;\n";
        let analysis = SemanticAnalyzer::new().analyze(&[change("3\t0\tsrc/config.ts", diff)]);

        let security: Vec<(Impact, Option<u32>)> = analysis
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

    #[test]
    fn test_data_and_concurrency_risks() {
        let diff = "@@ -0,0 +1,4 @@\n+DROP TABLE users;\n+ALTER TABLE orders ADD COLUMN note TEXT;\n+static mut COUNTER: u32 = 0;\n+let shared = Arc::new(Mutex::new(0));\n";
        let analysis = SemanticAnalyzer::new().analyze(&[change("4\t0\tsrc/db.rs", diff)]);

        let summary: Vec<(RiskType, Impact)> = analysis
            .risk_factors
            .iter()
            .map(|f| (f.risk_type, f.impact))
            .collect();
        assert_eq!(
            summary,
            vec![
                (RiskType::Data, Impact::High),
                (RiskType::Data, Impact::Medium),
                (RiskType::Concurrency, Impact::High),
                (RiskType::Concurrency, Impact::Medium),
            ]
        );
    }

    #[test]
    fn test_delete_with_where_is_not_destructive() {
        let diff = "@@ -0,0 +1 @@\n+DELETE FROM sessions WHERE expired = 1;\n";
        let analysis = SemanticAnalyzer::new().analyze(&[change("1\t0\tsrc/cleanup.py", diff)]);
        assert!(analysis.risk_factors.is_empty());
    }

    #[test]
    fn test_nested_loop_detection_uses_context() {
        let diff = "@@ -1,3 +1,5 @@\n for (const a of rows) {\n+  for (const b of cols) {\n+    sum += a * b;\n+  }\n   total++;\n }\n";
        let analysis = SemanticAnalyzer::new().analyze(&[change("3\t0\tsrc/matrix.js", diff)]);
        let perf: Vec<&RiskFactor> = analysis
            .risk_factors
            .iter()
            .filter(|f| f.risk_type == RiskType::Performance)
            .collect();
        assert_eq!(perf.len(), 1);
        assert_eq!(perf[0].line, Some(1));
    }

    #[test]
    fn test_complexity_weights_nesting() {
        let diff = "@@ -0,0 +1,5 @@\n+if (a) {\n+    if (b && c) {\n+        run();\n+    }\n+}\n";
        let analysis = SemanticAnalyzer::new().analyze(&[change("5\t0\tsrc/flow.js", diff)]);
        let metrics = analysis.complexity;
        // if + if + &&
        assert_eq!(metrics.cyclomatic, 4);
        // 顶层 if 计 1，内层 if 与 && 各计 2
        assert_eq!(metrics.cognitive, 5);
        assert_eq!(metrics.max_nesting_depth, 2);
        assert_eq!(metrics.total_changed_lines, 5);
    }

    #[test]
    fn test_async_conversion_and_logging() {
        let diff = "@@ -1,3 +1,4 @@\n-function load(id) {\n+async function load(id) {\n+  console.log('loading', id);\n   return fetch(id);\n }\n";
        let analysis = SemanticAnalyzer::new().analyze(&[change("2\t1\tsrc/load.js", diff)]);
        let kinds: Vec<PatternKind> = analysis.patterns.iter().map(|p| p.kind).collect();
        assert!(kinds.contains(&PatternKind::AsyncConversion));
        assert!(kinds.contains(&PatternKind::LoggingAdded));
        assert_eq!(analysis.structure.modified_functions.len(), 1);
    }

    #[test]
    fn test_hunk_heading_marks_function_modified() {
        let diff = "@@ -4,2 +4,2 @@ function render(view) {\n-  draw(view, 1);\n+  draw(view, 2);\n";
        let analysis = SemanticAnalyzer::new().analyze(&[change("1\t1\tsrc/view.js", diff)]);
        assert_eq!(
            analysis.structure.modified_functions,
            vec![SymbolRef {
                name: "render".to_string(),
                file: PathBuf::from("src/view.js"),
            }]
        );
    }
}
