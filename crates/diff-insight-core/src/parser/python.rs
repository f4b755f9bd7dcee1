//! Python 结构提取器
//!
//! 以缩进界定函数体与类体的文本扫描实现

use super::common::{
    ApiRoute, ClassInfo, CodeStructure, ComplexityLevel, ExportedSymbol, FunctionInfo,
    HttpMethod, ImportInfo, StructureExtractor, SupportedLanguage, SymbolKind,
    count_branch_keywords, line_at, split_parameters, strip_strings_and_comments,
};
use regex::Regex;
use std::sync::LazyLock;

static DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)(async[ \t]+)?def[ \t]+([A-Za-z_]\w*)[ \t]*\(([^)]*)\)")
        .expect("valid def regex")
});

static CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)class[ \t]+([A-Za-z_]\w*)[ \t]*(?:\(([^)]*)\))?[ \t]*:")
        .expect("valid class regex")
});

static ALL_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^__all__[ \t]*=[ \t]*[\[(](.*?)[\])]").expect("valid __all__ regex")
});

static NAME_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"]([A-Za-z_]\w*)['"]"#).expect("valid name literal regex")
});

static TOP_CONSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([A-Z][A-Z0-9_]*)[ \t]*(?::[^=\n]+)?=[^=]").expect("valid constant regex")
});

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*import[ \t]+([^\n#;]+)").expect("valid import regex")
});

static FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*from[ \t]+([\w.]+)[ \t]+import[ \t]+(\([^)]*\)|[^\n#;]+)")
        .expect("valid from-import regex")
});

static ROUTE_DECORATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*@\w+\.(route|get|post|put|delete|patch|options|head|api_route)\([ \t]*['"]([^'"]+)['"]([^\n]*)$"#,
    )
    .expect("valid route decorator regex")
});

static METHODS_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"methods[ \t]*=[ \t]*[\[(]([^\])]*)[\])]").expect("valid methods regex")
});

static NEXT_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)").expect("valid def regex")
});

static SELF_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bself\.([A-Za-z_]\w*)[ \t]*(?::[^=\n]+)?=[^=]").expect("valid self regex")
});

static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)[ \t]*(?::[ \t]*[^=\n]+?)?[ \t]*(=[^=].*)?$")
        .expect("valid class attribute regex")
});

static EXTRA_BRANCHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(elif|except)\b").expect("valid branch regex"));

const KEYWORDS: &[&str] = &[
    "pass", "return", "raise", "break", "continue", "else", "try", "finally", "yield", "del",
];

/// Python 结构提取器
#[derive(Debug, Default)]
pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// 以缩进界定的代码块范围（行号从 1 开始，闭区间）
struct Block {
    indent: usize,
    start_line: u32,
    end_line: u32,
}

impl StructureExtractor for PythonExtractor {
    fn extract(&self, source: &str) -> CodeStructure {
        let lines: Vec<&str> = source.lines().collect();
        let all_names = declared_all(source);
        let is_public = |name: &str| match &all_names {
            Some(names) => names.iter().any(|n| n == name),
            None => !name.starts_with('_'),
        };

        let mut structure = CodeStructure::empty(SupportedLanguage::Python);
        let mut defs = Vec::new();

        for caps in DEF.captures_iter(source) {
            let (Some(whole), Some(indent), Some(name)) = (caps.get(0), caps.get(1), caps.get(3))
            else {
                continue;
            };
            let block = block_at(source, &lines, whole.start(), whole.end(), indent.as_str());
            let body = lines[(block.start_line - 1) as usize..block.end_line as usize].join("\n");
            let branch_count = count_branches(&body);
            let name = name.as_str().to_string();
            let top_level = block.indent == 0;

            defs.push((block.indent, block.start_line, name.clone()));
            structure.functions.push(FunctionInfo {
                is_exported: top_level && is_public(&name),
                name,
                parameters: split_parameters(caps.get(4).map(|m| m.as_str()).unwrap_or_default())
                    .into_iter()
                    .filter(|p| p != "self" && p != "cls")
                    .collect(),
                is_async: caps.get(2).is_some(),
                branch_count,
                complexity: ComplexityLevel::from_branch_count(branch_count),
                start_line: block.start_line,
                end_line: block.end_line,
            });
        }

        for caps in CLASS.captures_iter(source) {
            let (Some(whole), Some(indent), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let block = block_at(source, &lines, whole.start(), whole.end(), indent.as_str());
            let member_indent = member_indent(&lines, &block);

            let methods = defs
                .iter()
                .filter(|(indent, line, _)| {
                    Some(*indent) == member_indent
                        && *line > block.start_line
                        && *line <= block.end_line
                })
                .map(|(_, _, name)| name.clone())
                .collect();

            let mut bases: Vec<String> = caps
                .get(3)
                .map(|m| split_parameters(m.as_str()))
                .unwrap_or_default()
                .into_iter()
                .filter(|b| b != "object" && !b.contains('='))
                .collect();
            let superclass = (!bases.is_empty()).then(|| bases.remove(0));

            let name = name.as_str().to_string();
            if block.indent == 0 && is_public(&name) {
                structure.exports.push(ExportedSymbol {
                    name: name.clone(),
                    kind: SymbolKind::Class,
                    is_default: false,
                });
            }
            structure.classes.push(ClassInfo {
                properties: class_properties(&lines, &block, member_indent),
                name,
                methods,
                superclass,
                interfaces: bases,
                start_line: block.start_line,
            });
        }

        for function in structure.functions.iter().filter(|f| f.is_exported) {
            structure.exports.push(ExportedSymbol {
                name: function.name.clone(),
                kind: SymbolKind::Function,
                is_default: false,
            });
        }
        for caps in TOP_CONSTANT.captures_iter(source) {
            if let Some(name) = caps.get(1) {
                if is_public(name.as_str()) {
                    structure.exports.push(ExportedSymbol {
                        name: name.as_str().to_string(),
                        kind: SymbolKind::Variable,
                        is_default: false,
                    });
                }
            }
        }

        structure.imports = extract_imports(source);
        structure.routes = extract_routes(source);
        structure
    }

    fn language(&self) -> SupportedLanguage {
        SupportedLanguage::Python
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }
}

fn declared_all(source: &str) -> Option<Vec<String>> {
    let caps = ALL_DECL.captures(source)?;
    let list = caps.get(1)?.as_str();
    Some(
        NAME_LITERAL
            .captures_iter(list)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
    )
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// 计算以 `start..signature_end` 为头部的代码块范围
fn block_at(source: &str, lines: &[&str], start: usize, signature_end: usize, indent: &str) -> Block {
    let start_line = line_at(source, start);
    let header_end = line_at(source, signature_end);
    let indent = indent.len();

    let mut end_line = header_end;
    for (idx, line) in lines.iter().enumerate().skip(header_end as usize) {
        if is_blank_or_comment(line) {
            continue;
        }
        if indent_width(line) <= indent {
            break;
        }
        end_line = idx as u32 + 1;
    }

    Block {
        indent,
        start_line,
        end_line,
    }
}

/// 类体中第一行非空代码的缩进
fn member_indent(lines: &[&str], block: &Block) -> Option<usize> {
    lines[block.start_line as usize..block.end_line as usize]
        .iter()
        .find(|l| !is_blank_or_comment(l))
        .map(|l| indent_width(l))
        .filter(|&w| w > block.indent)
}

fn class_properties(lines: &[&str], block: &Block, member_indent: Option<usize>) -> Vec<String> {
    let mut properties: Vec<String> = Vec::new();
    let body = &lines[block.start_line as usize..block.end_line as usize];

    for line in body {
        if Some(indent_width(line)) == member_indent {
            let trimmed = line.trim();
            if let Some(caps) = CLASS_ATTR.captures(trimmed) {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let annotated = trimmed[name.len()..].trim_start().starts_with(':');
                if (caps.get(2).is_some() || annotated)
                    && !KEYWORDS.contains(&name)
                    && !properties.iter().any(|p| p == name)
                {
                    properties.push(name.to_string());
                }
            }
        }

        for caps in SELF_ASSIGN.captures_iter(line) {
            if let Some(name) = caps.get(1) {
                let name = name.as_str();
                if !properties.iter().any(|p| p == name) {
                    properties.push(name.to_string());
                }
            }
        }
    }

    properties
}

fn count_branches(body: &str) -> u32 {
    let extra: u32 = body
        .lines()
        .map(|line| {
            let code = strip_strings_and_comments(line, "#");
            EXTRA_BRANCHES.find_iter(&code).count() as u32
        })
        .sum();
    count_branch_keywords(body, "#") + extra
}

fn extract_imports(source: &str) -> Vec<ImportInfo> {
    let mut imports = Vec::new();

    for caps in IMPORT.captures_iter(source) {
        let Some(list) = caps.get(1) else { continue };
        for part in list.as_str().split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (module, binding) = match part.split_once(" as ") {
                Some((module, alias)) => (module.trim(), alias.trim()),
                None => (part, part.split('.').next().unwrap_or(part)),
            };
            imports.push(ImportInfo {
                module: module.to_string(),
                bindings: vec![binding.to_string()],
                is_local: module.starts_with('.'),
            });
        }
    }

    for caps in FROM_IMPORT.captures_iter(source) {
        let (Some(module), Some(names)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let names = names.as_str().trim().trim_start_matches('(').trim_end_matches(')');
        let bindings = names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| n.rsplit(" as ").next().unwrap_or(n).trim().to_string())
            .collect();
        imports.push(ImportInfo {
            module: module.as_str().to_string(),
            bindings,
            is_local: module.as_str().starts_with('.'),
        });
    }

    imports
}

fn extract_routes(source: &str) -> Vec<ApiRoute> {
    let mut routes = Vec::new();

    for caps in ROUTE_DECORATOR.captures_iter(source) {
        let (Some(whole), Some(kind), Some(path)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let handler = NEXT_DEF
            .captures(&source[whole.end()..])
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let methods: Vec<HttpMethod> = match kind.as_str() {
            "route" | "api_route" => {
                let declared: Vec<HttpMethod> = caps
                    .get(3)
                    .and_then(|rest| METHODS_ARG.captures(rest.as_str()))
                    .and_then(|c| c.get(1))
                    .map(|list| {
                        list.as_str()
                            .split(',')
                            .map(str::trim)
                            .filter(|m| !m.is_empty())
                            .map(HttpMethod::parse)
                            .collect()
                    })
                    .unwrap_or_default();
                if !declared.is_empty() {
                    declared
                } else if kind.as_str() == "route" {
                    // Flask 默认只响应 GET
                    vec![HttpMethod::Get]
                } else {
                    vec![HttpMethod::Any]
                }
            }
            method => vec![HttpMethod::parse(method)],
        };

        for method in methods {
            routes.push(ApiRoute {
                path: path.as_str().to_string(),
                method,
                handler: handler.clone(),
            });
        }
    }

    routes
}
