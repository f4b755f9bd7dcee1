//! Rust 结构提取器
//!
//! 关注 `pub` 可见性的条目、`use` 导入、`impl` 块以及 axum / actix 路由

use super::common::{
    ApiRoute, ClassInfo, CodeStructure, ComplexityLevel, ExportedSymbol, FunctionInfo,
    HttpMethod, ImportInfo, StructureExtractor, SupportedLanguage, SymbolKind,
    count_branch_keywords, find_body_start, find_matching_brace, line_at, lines_with_depth,
    split_parameters, strip_strings_and_comments,
};
use regex::Regex;
use std::sync::LazyLock;

static FN_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)(pub(?:\([^)]*\))?[ \t]+)?(?:(?:const|unsafe|extern(?:[ \t]+"[^"]*")?)[ \t]+)*(async[ \t]+)?(?:unsafe[ \t]+)?fn[ \t]+([A-Za-z_]\w*)[ \t]*(?:<[^(]*>)?[ \t]*\(([^)]*)\)"#,
    )
    .expect("valid fn regex")
});

static ITEM_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(pub(?:\([^)]*\))?[ \t]+)?(struct|enum|trait|type|union|const|static)[ \t]+(?:mut[ \t]+)?([A-Za-z_]\w*)",
    )
    .expect("valid item regex")
});

static IMPL_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:unsafe[ \t]+)?impl(?:[ \t]*<[^{]*?>)?[ \t]+(?:!?([\w:]+)(?:<[^{]*?>)?[ \t]+for[ \t]+)?&?([A-Za-z_][\w:]*)[^{;]*\{",
    )
    .expect("valid impl regex")
});

static USE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?use[ \t]+([^;]+);").expect("valid use regex")
});

static STRUCT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?([a-z_]\w*)[ \t]*:").expect("valid field regex")
});

static ENUM_VARIANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*([A-Z]\w*)[ \t]*(?:[({,=]|$)").expect("valid variant regex")
});

static METHOD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:(?:const|async|unsafe)[ \t]+)*fn[ \t]+([A-Za-z_]\w*)")
        .expect("valid method regex")
});

static AXUM_ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.route\([ \t]*"([^"]+)"[ \t]*,([^\n]*)"#).expect("valid axum route regex")
});

static AXUM_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(get|post|put|delete|patch|options|head|any)\([ \t]*([\w:]+)[ \t]*\)")
        .expect("valid axum handler regex")
});

static ACTIX_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*#\[(get|post|put|delete|patch|options|head)\([ \t]*"([^"]+)""#)
        .expect("valid actix attribute regex")
});

static NEXT_FN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfn[ \t]+([A-Za-z_]\w*)").expect("valid fn name regex"));

static EXTRA_BRANCHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(match|loop)\b|=>").expect("valid branch regex"));

/// Rust 结构提取器
#[derive(Debug, Default)]
pub struct RustExtractor;

impl RustExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl StructureExtractor for RustExtractor {
    fn extract(&self, source: &str) -> CodeStructure {
        let mut structure = CodeStructure::empty(SupportedLanguage::Rust);

        structure.functions = extract_functions(source);
        for function in structure.functions.iter().filter(|f| f.is_exported) {
            structure.exports.push(ExportedSymbol {
                name: function.name.clone(),
                kind: SymbolKind::Function,
                is_default: false,
            });
        }

        for caps in ITEM_DECL.captures_iter(source) {
            let (Some(whole), Some(keyword), Some(name)) = (caps.get(0), caps.get(2), caps.get(3))
            else {
                continue;
            };
            let name = name.as_str().to_string();
            let keyword = keyword.as_str();

            if caps.get(1).is_some_and(|v| v.as_str().trim() == "pub") {
                let kind = match keyword {
                    "struct" | "union" => SymbolKind::Class,
                    "trait" => SymbolKind::Interface,
                    "const" | "static" => SymbolKind::Variable,
                    _ => SymbolKind::Type,
                };
                structure.exports.push(ExportedSymbol {
                    name: name.clone(),
                    kind,
                    is_default: false,
                });
            }

            if keyword == "struct" || keyword == "enum" {
                let properties = find_body_start(source, whole.end())
                    .and_then(|open| {
                        find_matching_brace(source, open).map(|close| &source[open + 1..close])
                    })
                    .map(|body| item_members(body, keyword == "enum"))
                    .unwrap_or_default();
                structure.classes.push(ClassInfo {
                    name,
                    methods: Vec::new(),
                    properties,
                    superclass: None,
                    interfaces: Vec::new(),
                    start_line: line_at(source, whole.start()),
                });
            }
        }

        attach_impl_blocks(source, &mut structure.classes);
        structure.imports = extract_imports(source);
        structure.routes = extract_routes(source);
        structure
    }

    fn language(&self) -> SupportedLanguage {
        SupportedLanguage::Rust
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }
}

fn extract_functions(source: &str) -> Vec<FunctionInfo> {
    let mut functions = Vec::new();

    for caps in FN_DECL.captures_iter(source) {
        let (Some(whole), Some(indent), Some(name)) = (caps.get(0), caps.get(1), caps.get(4))
        else {
            continue;
        };
        let start_line = line_at(source, whole.start());
        let (body, end_line) = match find_body_start(source, whole.end())
            .and_then(|open| find_matching_brace(source, open).map(|close| (open, close)))
        {
            Some((open, close)) => (&source[open..=close], line_at(source, close)),
            // trait 中没有默认实现的方法声明
            None => ("", start_line),
        };

        let branch_count = count_branches(body);
        let is_pub = caps.get(2).is_some_and(|v| v.as_str().trim() == "pub");
        functions.push(FunctionInfo {
            name: name.as_str().to_string(),
            parameters: split_parameters(caps.get(5).map(|m| m.as_str()).unwrap_or_default())
                .into_iter()
                .filter(|p| !p.trim_start_matches('&').trim_start_matches("mut ").starts_with("self"))
                .collect(),
            is_async: caps.get(3).is_some(),
            is_exported: is_pub && indent.as_str().is_empty(),
            branch_count,
            complexity: ComplexityLevel::from_branch_count(branch_count),
            start_line,
            end_line,
        });
    }

    functions
}

fn count_branches(body: &str) -> u32 {
    let extra: u32 = body
        .lines()
        .map(|line| {
            let code = strip_strings_and_comments(line, "//");
            EXTRA_BRANCHES.find_iter(&code).count() as u32
        })
        .sum();
    count_branch_keywords(body, "//") + extra
}

fn item_members(body: &str, is_enum: bool) -> Vec<String> {
    let pattern: &Regex = if is_enum { &*ENUM_VARIANT } else { &*STRUCT_FIELD };
    lines_with_depth(body)
        .into_iter()
        .filter(|(_, _, depth)| *depth == 0)
        .filter_map(|(_, line, _)| pattern.captures(line).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn attach_impl_blocks(source: &str, classes: &mut [ClassInfo]) {
    for caps in IMPL_BLOCK.captures_iter(source) {
        let (Some(whole), Some(target)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let target = target.as_str().rsplit("::").next().unwrap_or(target.as_str());
        let Some(class) = classes.iter_mut().find(|c| c.name == target) else {
            continue;
        };

        if let Some(trait_name) = caps.get(1) {
            let trait_name = trait_name.as_str().to_string();
            if !class.interfaces.contains(&trait_name) {
                class.interfaces.push(trait_name);
            }
        }

        let open = whole.end() - 1;
        let Some(close) = find_matching_brace(source, open) else {
            continue;
        };
        for (_, line, depth) in lines_with_depth(&source[open + 1..close]) {
            if depth != 0 {
                continue;
            }
            if let Some(name) = METHOD_NAME.captures(line).and_then(|c| c.get(1)) {
                class.methods.push(name.as_str().to_string());
            }
        }
    }
}

fn extract_imports(source: &str) -> Vec<ImportInfo> {
    let mut imports = Vec::new();

    for caps in USE_DECL.captures_iter(source) {
        let Some(tree) = caps.get(1) else { continue };
        let tree: String = tree.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        let tree = tree.trim_start_matches("::");

        let (module, bindings) = match tree.split_once("::{") {
            Some((module, rest)) => {
                let inner = rest.strip_suffix('}').unwrap_or(rest);
                let bindings = split_parameters(inner)
                    .iter()
                    .map(|item| use_binding(item))
                    .collect();
                (module.to_string(), bindings)
            }
            None => match tree.rsplit_once("::") {
                Some((module, last)) => (module.to_string(), vec![use_binding(last)]),
                None => (tree.to_string(), vec![use_binding(tree)]),
            },
        };

        let is_local = ["crate", "super", "self"]
            .iter()
            .any(|root| module == *root || module.starts_with(&format!("{root}::")));
        imports.push(ImportInfo {
            module,
            bindings,
            is_local,
        });
    }

    imports
}

fn use_binding(item: &str) -> String {
    let item = item.trim();
    match item.split_once(" as ") {
        Some((_, alias)) => alias.trim().to_string(),
        None => item.rsplit("::").next().unwrap_or(item).to_string(),
    }
}

fn extract_routes(source: &str) -> Vec<ApiRoute> {
    let mut routes = Vec::new();

    for caps in AXUM_ROUTE.captures_iter(source) {
        let (Some(path), Some(rest)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        for handler in AXUM_HANDLER.captures_iter(rest.as_str()) {
            let (Some(method), Some(name)) = (handler.get(1), handler.get(2)) else {
                continue;
            };
            routes.push(ApiRoute {
                path: path.as_str().to_string(),
                method: HttpMethod::parse(method.as_str()),
                handler: Some(name.as_str().to_string()),
            });
        }
    }

    for caps in ACTIX_ATTRIBUTE.captures_iter(source) {
        let (Some(whole), Some(method), Some(path)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        routes.push(ApiRoute {
            path: path.as_str().to_string(),
            method: HttpMethod::parse(method.as_str()),
            handler: NEXT_FN
                .captures(&source[whole.end()..])
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
        });
    }

    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIBRARY: &str = r#"
use std::collections::HashMap;
use crate::error::{Result, StoreError as Error};
use super::model::*;

pub const MAX_ITEMS: usize = 64;

#[derive(Debug)]
pub struct Store {
    pub name: String,
    items: HashMap<String, u32>,
}

pub enum Mode {
    ReadOnly,
    ReadWrite { sync: bool },
}

pub trait Backend {
    fn load(&self, key: &str) -> Option<u32>;
}

impl Store {
    pub fn new(name: String) -> Self {
        Self { name, items: HashMap::new() }
    }

    pub async fn get(&self, key: &str) -> Result<u32> {
        match self.items.get(key) {
            Some(v) => Ok(*v),
            None => {
                if key.is_empty() {
                    return Err(Error::Empty);
                }
                Err(Error::Missing)
            }
        }
    }
}

impl Backend for Store {
    fn load(&self, key: &str) -> Option<u32> {
        self.items.get(key).copied()
    }
}

fn internal_helper(x: u32) -> u32 {
    x + 1
}
"#;

    fn extract(source: &str) -> CodeStructure {
        RustExtractor::new().extract(source)
    }

    #[test]
    fn test_extract_functions() {
        let structure = extract(LIBRARY);
        let names: Vec<&str> = structure.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["load", "new", "get", "load", "internal_helper"]);

        let get = structure.find_function("get").unwrap();
        assert!(get.is_async);
        // 方法不在顶层，不计为导出
        assert!(!get.is_exported);
        assert_eq!(get.parameters, vec!["key: &str"]);
        // match + 两个分支箭头 + if
        assert_eq!(get.branch_count, 4);

        let helper = structure.find_function("internal_helper").unwrap();
        assert!(!helper.is_exported);
        assert_eq!(helper.line_count(), 3);
    }

    #[test]
    fn test_extract_exports() {
        let exports = extract(LIBRARY).exports;
        let summary: Vec<(&str, SymbolKind)> =
            exports.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            summary,
            vec![
                ("MAX_ITEMS", SymbolKind::Variable),
                ("Store", SymbolKind::Class),
                ("Mode", SymbolKind::Type),
                ("Backend", SymbolKind::Interface),
            ]
        );
    }

    #[test]
    fn test_extract_structs_and_impls() {
        let structure = extract(LIBRARY);
        let store = structure.find_class("Store").unwrap();
        assert_eq!(store.properties, vec!["name", "items"]);
        assert_eq!(store.methods, vec!["new", "get", "load"]);
        assert_eq!(store.interfaces, vec!["Backend"]);

        let mode = structure.find_class("Mode").unwrap();
        assert_eq!(mode.properties, vec!["ReadOnly", "ReadWrite"]);
    }

    #[test]
    fn test_extract_use_declarations() {
        let imports = extract(LIBRARY).imports;
        let summary: Vec<(&str, Vec<String>, bool)> = imports
            .iter()
            .map(|i| (i.module.as_str(), i.bindings.clone(), i.is_local))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("std::collections", vec!["HashMap".to_string()], false),
                ("crate::error", vec!["Result".to_string(), "Error".to_string()], true),
                ("super::model", vec!["*".to_string()], true),
            ]
        );
    }

    #[test]
    fn test_extract_axum_and_actix_routes() {
        let source = r#"
let app = Router::new()
    .route("/users", get(list_users).post(create_user))
    .route("/users/:id", delete(handlers::remove));

#[get("/health")]
async fn health() -> impl Responder {
    "ok"
}
"#;
        let routes = extract(source).routes;
        let summary: Vec<(&str, HttpMethod, Option<&str>)> = routes
            .iter()
            .map(|r| (r.path.as_str(), r.method, r.handler.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("/users", HttpMethod::Get, Some("list_users")),
                ("/users", HttpMethod::Post, Some("create_user")),
                ("/users/:id", HttpMethod::Delete, Some("handlers::remove")),
                ("/health", HttpMethod::Get, Some("health")),
            ]
        );
    }
}
