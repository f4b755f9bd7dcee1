//! 通用结构提取接口和数据结构
//!
//! 定义多语言结构提取器的通用接口、共享数据结构以及基于文本扫描的辅助函数

use crate::error::{DiffInsightError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static BRANCH_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(if|else|for|while|switch|case|try|catch)\b").expect("valid branch regex")
});

/// 支持的编程语言枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportedLanguage {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
}

impl SupportedLanguage {
    /// 获取语言名称
    pub fn name(&self) -> &'static str {
        match self {
            SupportedLanguage::TypeScript => "TypeScript",
            SupportedLanguage::JavaScript => "JavaScript",
            SupportedLanguage::Python => "Python",
            SupportedLanguage::Rust => "Rust",
            SupportedLanguage::Go => "Go",
        }
    }

    /// 行注释前缀
    pub fn line_comment(&self) -> &'static str {
        match self {
            SupportedLanguage::Python => "#",
            _ => "//",
        }
    }
}

/// 通用结构提取器接口
///
/// 提取只依赖文本扫描时允许漏报，但应尽量避免误报。
/// 实现可以替换为真正的语法解析器，消费方只依赖 [`CodeStructure`] 的形状。
pub trait StructureExtractor: Send + Sync {
    /// 从源码文本中提取结构信息
    fn extract(&self, source: &str) -> CodeStructure;

    /// 获取语言类型
    fn language(&self) -> SupportedLanguage;

    /// 获取支持的文件扩展名
    fn file_extensions(&self) -> &'static [&'static str];
}

/// 源码结构摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeStructure {
    pub language: SupportedLanguage,
    pub exports: Vec<ExportedSymbol>,
    pub imports: Vec<ImportInfo>,
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub routes: Vec<ApiRoute>,
}

impl CodeStructure {
    /// 创建空的结构摘要
    pub fn empty(language: SupportedLanguage) -> Self {
        Self {
            language,
            exports: Vec::new(),
            imports: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
            && self.imports.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
            && self.routes.is_empty()
    }

    pub fn find_function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn find_class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.name == name)
    }
}

/// 导出符号种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Variable,
    Type,
    Interface,
}

/// 导出符号
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub is_default: bool,
}

/// 导入声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// 模块说明符
    pub module: String,
    /// 具名绑定
    pub bindings: Vec<String>,
    /// 是否为项目内部（相对路径）导入
    pub is_local: bool,
}

/// 粗粒度复杂度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    /// 分支关键字数量分桶：<5 低，5-10 中，>10 高
    pub fn from_branch_count(count: u32) -> Self {
        match count {
            0..=4 => ComplexityLevel::Low,
            5..=10 => ComplexityLevel::Medium,
            _ => ComplexityLevel::High,
        }
    }
}

/// 函数信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub parameters: Vec<String>,
    pub is_async: bool,
    pub is_exported: bool,
    /// 函数体内分支/循环/异常关键字数量
    pub branch_count: u32,
    pub complexity: ComplexityLevel,
    /// 起始行（从 1 开始）
    pub start_line: u32,
    pub end_line: u32,
}

impl FunctionInfo {
    /// 函数所占行数
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// 类（或结构体）信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub start_line: u32,
}

/// HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    Any,
}

impl HttpMethod {
    /// 宽松解析方法名（大小写不敏感），未知名称视为 Any
    pub fn parse(name: &str) -> Self {
        match name.trim().trim_matches(|c| c == '\'' || c == '"').to_ascii_lowercase().as_str() {
            "get" => HttpMethod::Get,
            "post" => HttpMethod::Post,
            "put" => HttpMethod::Put,
            "delete" | "del" => HttpMethod::Delete,
            "patch" => HttpMethod::Patch,
            "options" => HttpMethod::Options,
            "head" => HttpMethod::Head,
            _ => HttpMethod::Any,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Any => "ANY",
        }
    }
}

/// API 路由声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRoute {
    pub path: String,
    pub method: HttpMethod,
    pub handler: Option<String>,
}

impl ApiRoute {
    /// 形如 `GET /users` 的描述
    pub fn label(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

/// 提取器工厂
pub struct ExtractorFactory;

impl ExtractorFactory {
    /// 根据语言类型创建提取器
    pub fn create_extractor(language: SupportedLanguage) -> Result<Box<dyn StructureExtractor>> {
        match language {
            SupportedLanguage::TypeScript | SupportedLanguage::JavaScript => {
                Ok(Box::new(super::script::ScriptExtractor::new(language)))
            }
            SupportedLanguage::Python => Ok(Box::new(super::python::PythonExtractor::new())),
            SupportedLanguage::Rust => Ok(Box::new(super::rust::RustExtractor::new())),
            SupportedLanguage::Go => Ok(Box::new(super::go::GoExtractor::new()?)),
        }
    }

    /// 根据文件路径检测语言类型
    pub fn detect_language(file_path: &Path) -> Option<SupportedLanguage> {
        match file_path.extension()?.to_str()? {
            "ts" | "tsx" | "mts" | "cts" => Some(SupportedLanguage::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(SupportedLanguage::JavaScript),
            "py" | "pyi" => Some(SupportedLanguage::Python),
            "rs" => Some(SupportedLanguage::Rust),
            "go" => Some(SupportedLanguage::Go),
            _ => None,
        }
    }

    /// 根据文件路径创建对应的提取器
    pub fn create_extractor_for_file(file_path: &Path) -> Result<Box<dyn StructureExtractor>> {
        let language = Self::detect_language(file_path).ok_or_else(|| {
            DiffInsightError::UnsupportedFileType(file_path.to_string_lossy().to_string())
        })?;
        Self::create_extractor(language)
    }

    /// 提取文件结构；不支持的文件类型或提取器创建失败时返回 None
    pub fn extract_file(file_path: &Path, source: &str) -> Option<CodeStructure> {
        match Self::create_extractor_for_file(file_path) {
            Ok(extractor) => Some(extractor.extract(source)),
            Err(DiffInsightError::UnsupportedFileType(_)) => None,
            Err(e) => {
                warn!(
                    "Structure extraction unavailable for {}: {}",
                    file_path.display(),
                    e
                );
                None
            }
        }
    }
}

/// 去掉字符串字面量内容和行尾注释，保留代码骨架
pub fn strip_strings_and_comments(line: &str, comment: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut rest = line;

    while let Some(c) = rest.chars().next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
                out.push(c);
            }
        } else if rest.starts_with(comment) {
            break;
        } else if c == '"' || c == '\'' || c == '`' {
            quote = Some(c);
            out.push(c);
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// 统计文本中分支/循环/异常关键字的数量
pub fn count_branch_keywords(text: &str, comment: &str) -> u32 {
    text.lines()
        .map(|line| {
            let code = strip_strings_and_comments(line, comment);
            BRANCH_KEYWORDS.find_iter(&code).count() as u32
        })
        .sum()
}

/// 根据字节偏移计算行号（从 1 开始）
pub fn line_at(source: &str, byte_offset: usize) -> u32 {
    let end = byte_offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() as u32 + 1
}

/// 从 `open_brace` 位置开始做括号配对，返回函数体（含大括号）的结束字节偏移
///
/// 字符串中的括号会被跳过；没有配对时返回 None。
pub fn find_matching_brace(source: &str, open_brace: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    if bytes.get(open_brace) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open_brace;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q || (b == b'\n' && q != b'`') {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                    continue;
                }
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// 从 `from` 开始查找下一个 `{`，遇到 `;` 或换行后的空行则放弃
pub fn find_body_start(source: &str, from: usize) -> Option<usize> {
    let rest = source.get(from..)?;
    for (offset, c) in rest.char_indices() {
        match c {
            '{' => return Some(from + offset),
            ';' => return None,
            _ => {}
        }
    }
    None
}

/// 把花括号包围的函数体按行切分，并给出每行开头处相对于类体的嵌套深度
pub fn lines_with_depth(body: &str) -> Vec<(usize, &str, usize)> {
    let mut result = Vec::new();
    let mut depth = 0usize;
    for (idx, line) in body.lines().enumerate() {
        result.push((idx, line, depth));
        let code = strip_strings_and_comments(line, "//");
        for c in code.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    result
}

/// 将逗号分隔的参数列表拆分为参数文本
pub fn split_parameters(raw: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in raw.chars() {
        match c {
            '(' | '[' | '{' | '<' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' | '>' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                let param = current.trim();
                if !param.is_empty() {
                    params.push(param.to_string());
                }
                current.clear();
            }
            '\n' | '\r' => current.push(' '),
            _ => current.push(c),
        }
    }
    let param = current.trim();
    if !param.is_empty() {
        params.push(param.to_string());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_detect_language() {
        let cases = [
            ("src/app.ts", Some(SupportedLanguage::TypeScript)),
            ("src/App.tsx", Some(SupportedLanguage::TypeScript)),
            ("index.js", Some(SupportedLanguage::JavaScript)),
            ("tool.py", Some(SupportedLanguage::Python)),
            ("src/lib.rs", Some(SupportedLanguage::Rust)),
            ("main.go", Some(SupportedLanguage::Go)),
            ("README.md", None),
            ("Makefile", None),
        ];
        for (path, expected) in cases {
            assert_eq!(
                ExtractorFactory::detect_language(&PathBuf::from(path)),
                expected,
                "{path}"
            );
        }
    }

    #[test]
    fn test_unsupported_file_type() {
        let result = ExtractorFactory::create_extractor_for_file(Path::new("notes.txt"));
        assert!(matches!(
            result,
            Err(DiffInsightError::UnsupportedFileType(_))
        ));
        assert!(ExtractorFactory::extract_file(Path::new("notes.txt"), "hello").is_none());
    }

    #[test]
    fn test_complexity_buckets() {
        assert_eq!(ComplexityLevel::from_branch_count(0), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_branch_count(4), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_branch_count(5), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_branch_count(10), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_branch_count(11), ComplexityLevel::High);
    }

    #[test]
    fn test_count_branch_keywords_ignores_strings_and_comments() {
        let text = "if (a) {\n  log(\"for while\"); // else case\n} else {\n  try { x() } catch (e) {}\n}";
        assert_eq!(count_branch_keywords(text, "//"), 4);
    }

    #[test]
    fn test_find_matching_brace_skips_strings() {
        let source = "function f() { const s = \"}\"; if (x) { y(); } }";
        let open = source.find('{').unwrap();
        let close = find_matching_brace(source, open).unwrap();
        assert_eq!(close, source.len() - 1);
    }

    #[test]
    fn test_unbalanced_brace_returns_none() {
        let source = "function f() { if (x) {";
        assert_eq!(find_matching_brace(source, source.find('{').unwrap()), None);
    }

    #[test]
    fn test_split_parameters_respects_nesting() {
        let params = split_parameters("a: Map<string, number>, { b, c }, d = [1, 2]");
        assert_eq!(params, vec!["a: Map<string, number>", "{ b, c }", "d = [1, 2]"]);
    }

    #[test]
    fn test_line_at() {
        let source = "a\nb\nc";
        assert_eq!(line_at(source, 0), 1);
        assert_eq!(line_at(source, 2), 2);
        assert_eq!(line_at(source, 4), 3);
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("GET"), HttpMethod::Get);
        assert_eq!(HttpMethod::parse("'post'"), HttpMethod::Post);
        assert_eq!(HttpMethod::parse("HandleFunc"), HttpMethod::Any);
    }
}
