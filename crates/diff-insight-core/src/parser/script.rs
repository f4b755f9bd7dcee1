//! JavaScript / TypeScript 结构提取器
//!
//! 基于关键字锚点（`export`、`function`、`class`、`import`、`require(`）的文本扫描

use super::common::{
    ApiRoute, ClassInfo, CodeStructure, ComplexityLevel, ExportedSymbol, FunctionInfo,
    HttpMethod, ImportInfo, StructureExtractor, SupportedLanguage, SymbolKind,
    count_branch_keywords, find_body_start, find_matching_brace, line_at, lines_with_depth,
    split_parameters,
};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(export[ \t]+)?(default[ \t]+)?(async[ \t]+)?function\b[ \t]*\*?[ \t]*([A-Za-z_$][\w$]*)?[ \t]*(?:<[^>(]*>)?[ \t]*\(([^)]*)\)",
    )
    .expect("valid function regex")
});

static ARROW_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(export[ \t]+)?(?:const|let|var)[ \t]+([A-Za-z_$][\w$]*)[ \t]*(?::[^=\n]+)?=[ \t]*(async[ \t]+)?(?:function\b[^(\n]*\(([^)]*)\)|\(([^)]*)\)[^=;{\n]*=>|([A-Za-z_$][\w$]*)[ \t]*=>)",
    )
    .expect("valid arrow regex")
});

static CLASS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(export[ \t]+)?(default[ \t]+)?(?:abstract[ \t]+)?class[ \t]+([A-Za-z_$][\w$]*)(?:[ \t]*<[^>{]*>)?(?:[ \t]+extends[ \t]+([\w$.]+)(?:<[^>{]*>)?)?(?:[ \t]+implements[ \t]+([^{]+?))?[ \t]*\{",
    )
    .expect("valid class regex")
});

static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*export[ \t]+(default[ \t]+)?(?:declare[ \t]+)?(?:async[ \t]+)?(function|abstract[ \t]+class|class|const|let|var|type|interface|enum)\b[ \t]*\*?[ \t]*([A-Za-z_$][\w$]*)?",
    )
    .expect("valid export regex")
});

static EXPORT_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export[ \t]+(?:type[ \t]+)?\{([^}]*)\}").expect("valid export list regex")
});

static EXPORT_DEFAULT_IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export[ \t]+default[ \t]+([A-Za-z_$][\w$]*)[ \t]*;?[ \t]*$")
        .expect("valid default export regex")
});

static COMMONJS_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:module\.exports\.([A-Za-z_$][\w$]*)|exports\.([A-Za-z_$][\w$]*)|module\.exports)[ \t]*=[ \t]*([A-Za-z_$][\w$]*)?",
    )
    .expect("valid commonjs export regex")
});

static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*import[ \t]+(?:type[ \t]+)?([\w$*{}\s,]+?)\s*from[ \t]+['"]([^'"]+)['"]"#,
    )
    .expect("valid import regex")
});

static IMPORT_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import[ \t]+['"]([^'"]+)['"]"#).expect("valid bare import regex")
});

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)(?:const|let|var)[ \t]+(\{[^}]*\}|[A-Za-z_$][\w$]*)[ \t]*=[ \t]*require\([ \t]*['"]([^'"]+)['"][ \t]*\)"#,
    )
    .expect("valid require regex")
});

static ROUTE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)\b(?:app|router|server|api|routes?)\.(get|post|put|delete|patch|options|head|all)\([ \t]*['"`]([^'"`]+)['"`](.*)$"#,
    )
    .expect("valid route regex")
});

static DECORATOR_ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*@(Get|Post|Put|Delete|Patch|Options|Head|All)\([ \t]*(?:['"]([^'"]*)['"])?[ \t]*\)"#,
    )
    .expect("valid decorator regex")
});

static CONTROLLER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@Controller\([ \t]*['"]([^'"]*)['"]"#).expect("valid controller regex")
});

static METHOD_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[ \t]*(?:(?:public|private|protected|static|readonly|async|override|abstract|get|set)[ \t]+)*\*?(#?[A-Za-z_$][\w$]*)[ \t]*(?:<[^>(]*>)?[ \t]*\(",
    )
    .expect("valid method regex")
});

static PROPERTY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[ \t]*(?:(?:public|private|protected|static|readonly|declare|override)[ \t]+)*(#?[A-Za-z_$][\w$]*)[ \t]*[?!]?[ \t]*(?::[^=;(]+)?(?:=[^;]*)?;?[ \t]*$",
    )
    .expect("valid property regex")
});

static THIS_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bthis\.([A-Za-z_$][\w$]*)[ \t]*=[^=]").expect("valid this regex")
});

static IDENTIFIER_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][\w$.]*$").expect("valid identifier regex")
});

const NON_METHOD_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "constructor", "super", "new",
];

/// JavaScript / TypeScript 结构提取器
pub struct ScriptExtractor {
    language: SupportedLanguage,
}

impl ScriptExtractor {
    /// 创建指定语言（JS 或 TS）的提取器
    pub fn new(language: SupportedLanguage) -> Self {
        Self { language }
    }

    fn extract_functions(&self, source: &str) -> Vec<FunctionInfo> {
        let mut functions = Vec::new();

        for caps in FUNCTION_DECL.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let name = caps
                .get(4)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "default".to_string());
            let params = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
            functions.push(build_function(
                source,
                name,
                params,
                caps.get(3).is_some(),
                caps.get(1).is_some(),
                whole.start(),
                whole.end(),
            ));
        }

        for caps in ARROW_FUNCTION.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(name) = caps.get(2) else { continue };
            let params = caps
                .get(4)
                .or_else(|| caps.get(5))
                .or_else(|| caps.get(6))
                .map(|m| m.as_str())
                .unwrap_or_default();
            functions.push(build_function(
                source,
                name.as_str().to_string(),
                params,
                caps.get(3).is_some(),
                caps.get(1).is_some(),
                whole.start(),
                whole.end(),
            ));
        }

        functions.sort_by_key(|f| f.start_line);
        functions
    }

    fn extract_classes(&self, source: &str) -> Vec<ClassInfo> {
        let mut classes = Vec::new();

        for caps in CLASS_DECL.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(3)) else {
                continue;
            };
            let open = whole.end() - 1;
            let body = find_matching_brace(source, open)
                .map(|close| &source[open + 1..close])
                .unwrap_or_default();

            let (methods, properties) = class_members(body);
            let interfaces = caps
                .get(5)
                .map(|m| {
                    split_parameters(m.as_str())
                        .into_iter()
                        .map(|s| s.trim().to_string())
                        .collect()
                })
                .unwrap_or_default();

            classes.push(ClassInfo {
                name: name.as_str().to_string(),
                methods,
                properties,
                superclass: caps.get(4).map(|m| m.as_str().to_string()),
                interfaces,
                start_line: line_at(source, whole.start()),
            });
        }

        classes
    }

    fn extract_exports(&self, source: &str) -> Vec<ExportedSymbol> {
        let mut exports = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |exports: &mut Vec<ExportedSymbol>, symbol: ExportedSymbol| {
            if seen.insert((symbol.name.clone(), symbol.is_default)) {
                exports.push(symbol);
            }
        };

        for caps in EXPORT_DECL.captures_iter(source) {
            let is_default = caps.get(1).is_some();
            let keyword = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let kind = match keyword {
                "function" => SymbolKind::Function,
                "type" | "enum" => SymbolKind::Type,
                "interface" => SymbolKind::Interface,
                "const" | "let" | "var" => SymbolKind::Variable,
                _ => SymbolKind::Class,
            };
            let name = match caps.get(3) {
                Some(m) => m.as_str().to_string(),
                None if is_default => "default".to_string(),
                None => continue,
            };
            // `export const f = () => {}` 视为函数导出
            let kind = if kind == SymbolKind::Variable && is_arrow_binding(source, &name) {
                SymbolKind::Function
            } else {
                kind
            };
            push(&mut exports, ExportedSymbol { name, kind, is_default });
        }

        for caps in EXPORT_LIST.captures_iter(source) {
            let Some(list) = caps.get(1) else { continue };
            for entry in list.as_str().split(',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                let exported = entry.rsplit(" as ").next().unwrap_or(entry).trim();
                let is_default = exported == "default";
                push(
                    &mut exports,
                    ExportedSymbol {
                        name: exported.to_string(),
                        kind: SymbolKind::Variable,
                        is_default,
                    },
                );
            }
        }

        for caps in EXPORT_DEFAULT_IDENT.captures_iter(source) {
            let Some(name) = caps.get(1) else { continue };
            push(
                &mut exports,
                ExportedSymbol {
                    name: name.as_str().to_string(),
                    kind: SymbolKind::Variable,
                    is_default: true,
                },
            );
        }

        for caps in COMMONJS_EXPORT.captures_iter(source) {
            let named = caps.get(1).or_else(|| caps.get(2));
            let symbol = match (named, caps.get(3)) {
                (Some(name), _) => ExportedSymbol {
                    name: name.as_str().to_string(),
                    kind: SymbolKind::Variable,
                    is_default: false,
                },
                (None, Some(value)) => ExportedSymbol {
                    name: value.as_str().to_string(),
                    kind: SymbolKind::Variable,
                    is_default: true,
                },
                (None, None) => continue,
            };
            push(&mut exports, symbol);
        }

        exports
    }

    fn extract_imports(&self, source: &str) -> Vec<ImportInfo> {
        let mut imports = Vec::new();

        for caps in IMPORT_FROM.captures_iter(source) {
            let (Some(clause), Some(module)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            imports.push(ImportInfo {
                module: module.as_str().to_string(),
                bindings: import_bindings(clause.as_str()),
                is_local: is_local_module(module.as_str()),
            });
        }

        for caps in IMPORT_BARE.captures_iter(source) {
            let Some(module) = caps.get(1) else { continue };
            imports.push(ImportInfo {
                module: module.as_str().to_string(),
                bindings: Vec::new(),
                is_local: is_local_module(module.as_str()),
            });
        }

        for caps in REQUIRE.captures_iter(source) {
            let (Some(binding), Some(module)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            imports.push(ImportInfo {
                module: module.as_str().to_string(),
                bindings: import_bindings(binding.as_str()),
                is_local: is_local_module(module.as_str()),
            });
        }

        imports
    }

    fn extract_routes(&self, source: &str) -> Vec<ApiRoute> {
        let mut routes = Vec::new();

        for caps in ROUTE_CALL.captures_iter(source) {
            let (Some(method), Some(path)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let handler = caps.get(3).and_then(|rest| route_handler(rest.as_str()));
            routes.push(ApiRoute {
                path: path.as_str().to_string(),
                method: HttpMethod::parse(method.as_str()),
                handler,
            });
        }

        let prefix = CONTROLLER_PREFIX
            .captures(source)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_matches('/').to_string());

        for caps in DECORATOR_ROUTE.captures_iter(source) {
            let (Some(whole), Some(method)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let sub = caps.get(2).map(|m| m.as_str().trim_matches('/')).unwrap_or("");
            let path = match (&prefix, sub.is_empty()) {
                (Some(p), true) => format!("/{p}"),
                (Some(p), false) => format!("/{p}/{sub}"),
                (None, _) => format!("/{sub}"),
            };
            let handler = source[whole.end()..]
                .lines()
                .skip(1)
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.starts_with('@'))
                .and_then(|l| METHOD_DECL.captures(l))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            routes.push(ApiRoute {
                path,
                method: HttpMethod::parse(method.as_str()),
                handler,
            });
        }

        routes
    }
}

impl StructureExtractor for ScriptExtractor {
    fn extract(&self, source: &str) -> CodeStructure {
        CodeStructure {
            language: self.language,
            exports: self.extract_exports(source),
            imports: self.extract_imports(source),
            functions: self.extract_functions(source),
            classes: self.extract_classes(source),
            routes: self.extract_routes(source),
        }
    }

    fn language(&self) -> SupportedLanguage {
        self.language
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        match self.language {
            SupportedLanguage::TypeScript => &["ts", "tsx", "mts", "cts"],
            _ => &["js", "jsx", "mjs", "cjs"],
        }
    }
}

fn build_function(
    source: &str,
    name: String,
    params: &str,
    is_async: bool,
    is_exported: bool,
    start: usize,
    signature_end: usize,
) -> FunctionInfo {
    let start_line = line_at(source, start);
    let (body, end_line) = match find_body_start(source, signature_end)
        .and_then(|open| find_matching_brace(source, open).map(|close| (open, close)))
    {
        Some((open, close)) => (&source[open..=close], line_at(source, close)),
        None => {
            // 无花括号的箭头函数：函数体就是当前行剩余部分
            let rest = &source[signature_end..];
            let line_end = rest.find('\n').map_or(source.len(), |i| signature_end + i);
            (&source[signature_end..line_end], start_line)
        }
    };

    let branch_count = count_branch_keywords(body, "//");
    FunctionInfo {
        name,
        parameters: split_parameters(params),
        is_async,
        is_exported,
        branch_count,
        complexity: ComplexityLevel::from_branch_count(branch_count),
        start_line,
        end_line,
    }
}

fn class_members(body: &str) -> (Vec<String>, Vec<String>) {
    let mut methods = Vec::new();
    let mut properties = Vec::new();

    for (_, line, depth) in lines_with_depth(body) {
        if depth == 0 {
            if let Some(name) = METHOD_DECL
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
            {
                if !NON_METHOD_KEYWORDS.contains(&name) || name == "constructor" {
                    if !methods.iter().any(|m| m == name) {
                        methods.push(name.to_string());
                    }
                    continue;
                }
            }
            if let Some(name) = PROPERTY_DECL.captures(line).and_then(|c| c.get(1)) {
                let name = name.as_str();
                if !NON_METHOD_KEYWORDS.contains(&name) && !properties.iter().any(|p| p == name) {
                    properties.push(name.to_string());
                }
            }
        }

        for caps in THIS_ASSIGNMENT.captures_iter(line) {
            if let Some(name) = caps.get(1) {
                let name = name.as_str();
                if !properties.iter().any(|p| p == name) {
                    properties.push(name.to_string());
                }
            }
        }
    }

    (methods, properties)
}

fn is_arrow_binding(source: &str, name: &str) -> bool {
    ARROW_FUNCTION
        .captures_iter(source)
        .any(|c| c.get(2).is_some_and(|m| m.as_str() == name))
}

fn import_bindings(clause: &str) -> Vec<String> {
    let mut bindings = Vec::new();
    let clause = clause.trim();

    let (outside, inside) = match (clause.find('{'), clause.find('}')) {
        (Some(open), Some(close)) if open < close => (
            format!("{}{}", &clause[..open], &clause[close + 1..]),
            Some(&clause[open + 1..close]),
        ),
        _ => (clause.to_string(), None),
    };

    for part in outside.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        // `* as ns` 与默认导入
        let local = part.rsplit(" as ").next().unwrap_or(part).trim();
        if !local.is_empty() && local != "*" {
            bindings.push(local.to_string());
        }
    }

    if let Some(inside) = inside {
        for part in inside.split(',') {
            let part = part.trim().trim_start_matches("type ").trim();
            if part.is_empty() {
                continue;
            }
            let local = part
                .rsplit(" as ")
                .next()
                .unwrap_or(part)
                .split(':')
                .next_back()
                .unwrap_or(part)
                .trim();
            bindings.push(local.to_string());
        }
    }

    bindings
}

fn is_local_module(module: &str) -> bool {
    module.starts_with('.') || module.starts_with('/') || module.starts_with("@/") || module.starts_with("~/")
}

fn route_handler(rest: &str) -> Option<String> {
    if rest.contains("=>") || rest.contains("function") {
        return None;
    }
    let args = rest.trim().trim_end_matches(';').trim_end();
    let args = args.strip_suffix(')').unwrap_or(args);
    let last = args.rsplit(',').next()?.trim();
    IDENTIFIER_PATH.is_match(last).then(|| last.to_string())
}
