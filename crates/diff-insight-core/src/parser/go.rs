//! Go 语言结构提取器
//!
//! 基于 Tree-sitter 语法树提取函数、类型、导入与导出信息

use super::common::{
    ApiRoute, ClassInfo, CodeStructure, ComplexityLevel, ExportedSymbol, FunctionInfo,
    HttpMethod, ImportInfo, StructureExtractor, SupportedLanguage, SymbolKind,
};
use crate::error::{DiffInsightError, Result};
use regex::Regex;
use std::sync::{LazyLock, Mutex};
use tracing::warn;
use tree_sitter::{Node, Parser, Tree};

static ROUTE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\.(HandleFunc|Handle|GET|POST|PUT|DELETE|PATCH|OPTIONS|HEAD|Any|Get|Post|Put|Delete|Patch|Options|Head)\([ \t]*"([^"]+)"[ \t]*,[ \t]*([\w.]+)"#,
    )
    .expect("valid go route regex")
});

/// 计入分支复杂度的语法节点
const BRANCH_NODES: &[&str] = &[
    "if_statement",
    "for_statement",
    "expression_switch_statement",
    "type_switch_statement",
    "select_statement",
    "expression_case",
    "type_case",
    "communication_case",
];

/// Go 语言结构提取器
///
/// Tree-sitter 解析器不可共享，这里用互斥锁包装以满足 `Sync`。
pub struct GoExtractor {
    parser: Mutex<Parser>,
}

impl GoExtractor {
    /// 创建新的 Go 提取器
    pub fn new() -> Result<Self> {
        let language = tree_sitter_go::LANGUAGE.into();
        let mut parser = Parser::new();

        parser.set_language(&language).map_err(|e| {
            DiffInsightError::TreeSitterError(format!("Failed to set Go language: {e}"))
        })?;

        Ok(Self {
            parser: Mutex::new(parser),
        })
    }

    fn parse_source(&self, source: &str) -> Result<Tree> {
        let mut parser = self.parser.lock().unwrap_or_else(|e| e.into_inner());
        parser.parse(source, None).ok_or_else(|| {
            DiffInsightError::ParseError("Failed to parse Go source code".to_string())
        })
    }
}

impl StructureExtractor for GoExtractor {
    fn extract(&self, source: &str) -> CodeStructure {
        let tree = match self.parse_source(source) {
            Ok(tree) => tree,
            Err(e) => {
                warn!("Go structure extraction failed: {}", e);
                return CodeStructure::empty(SupportedLanguage::Go);
            }
        };

        let root = tree.root_node();
        let mut structure = CodeStructure::empty(SupportedLanguage::Go);
        let mut methods: Vec<(String, String)> = Vec::new();

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "import_declaration" => collect_imports(child, source, &mut structure.imports),
                "function_declaration" => {
                    if let Some(function) = function_info(child, source) {
                        if function.is_exported {
                            structure.exports.push(ExportedSymbol {
                                name: function.name.clone(),
                                kind: SymbolKind::Function,
                                is_default: false,
                            });
                        }
                        structure.functions.push(function);
                    }
                }
                "method_declaration" => {
                    if let Some(function) = function_info(child, source) {
                        if let Some(receiver) = receiver_type(child, source) {
                            methods.push((receiver, function.name.clone()));
                        }
                        structure.functions.push(function);
                    }
                }
                "type_declaration" => collect_types(child, source, &mut structure),
                "const_declaration" | "var_declaration" => {
                    collect_values(child, source, &mut structure.exports)
                }
                _ => {}
            }
        }

        // 方法声明可能出现在类型声明之前，最后统一挂接
        for (receiver, method) in methods {
            if let Some(class) = structure.classes.iter_mut().find(|c| c.name == receiver) {
                class.methods.push(method);
            }
        }

        structure.routes = extract_routes(source);
        structure
    }

    fn language(&self) -> SupportedLanguage {
        SupportedLanguage::Go
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

fn is_exported_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

fn function_info(node: Node, source: &str) -> Option<FunctionInfo> {
    let name = node_text(node.child_by_field_name("name")?, source).to_string();

    let mut parameters = Vec::new();
    if let Some(list) = node.child_by_field_name("parameters") {
        let mut cursor = list.walk();
        for param in list.named_children(&mut cursor) {
            if param.kind() == "comment" {
                continue;
            }
            parameters.push(node_text(param, source).to_string());
        }
    }

    let branch_count = node
        .child_by_field_name("body")
        .map(count_branches)
        .unwrap_or(0);

    Some(FunctionInfo {
        is_exported: node.kind() == "function_declaration" && is_exported_name(&name),
        name,
        parameters,
        is_async: false,
        branch_count,
        complexity: ComplexityLevel::from_branch_count(branch_count),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
    })
}

/// 递归统计分支节点；`else` 分支额外计一次
fn count_branches(node: Node) -> u32 {
    let mut count = 0;
    if BRANCH_NODES.contains(&node.kind()) {
        count += 1;
    }
    if node.kind() == "if_statement" && node.child_by_field_name("alternative").is_some() {
        count += 1;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count += count_branches(child);
    }
    count
}

fn receiver_type(node: Node, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let text = node_text(receiver, source);
    let text = text.trim_matches(|c| c == '(' || c == ')');
    let type_part = text.split_whitespace().last()?;
    let type_part = type_part.trim_start_matches('*');
    let type_part = type_part.split('[').next().unwrap_or(type_part);
    Some(type_part.to_string())
}

fn collect_imports(node: Node, source: &str, imports: &mut Vec<ImportInfo>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_spec" => imports.extend(import_spec(child, source)),
            "import_spec_list" => {
                let mut spec_cursor = child.walk();
                for spec in child.children(&mut spec_cursor) {
                    if spec.kind() == "import_spec" {
                        imports.extend(import_spec(spec, source));
                    }
                }
            }
            _ => {}
        }
    }
}

fn import_spec(node: Node, source: &str) -> Option<ImportInfo> {
    let path = node_text(node.child_by_field_name("path")?, source)
        .trim_matches(|c| c == '"' || c == '`')
        .to_string();
    if path.is_empty() {
        return None;
    }

    let binding = match node.child_by_field_name("name") {
        Some(alias) => node_text(alias, source).to_string(),
        None => path.rsplit('/').next().unwrap_or(&path).to_string(),
    };

    Some(ImportInfo {
        // 标准库路径的首段不含点号，如 "net/http"；模块内导入通常以 "./" 开头
        is_local: path.starts_with('.'),
        module: path,
        bindings: vec![binding],
    })
}

fn collect_types(node: Node, source: &str, structure: &mut CodeStructure) {
    let mut cursor = node.walk();
    for spec in node.children(&mut cursor) {
        if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
            continue;
        }
        let Some(name_node) = spec.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, source).to_string();
        let type_node = spec.child_by_field_name("type");
        let type_kind = type_node.map(|t| t.kind()).unwrap_or_default();

        let kind = match type_kind {
            "struct_type" => SymbolKind::Class,
            "interface_type" => SymbolKind::Interface,
            _ => SymbolKind::Type,
        };
        if is_exported_name(&name) {
            structure.exports.push(ExportedSymbol {
                name: name.clone(),
                kind,
                is_default: false,
            });
        }

        if let (SymbolKind::Class, Some(struct_node)) = (kind, type_node) {
            structure.classes.push(ClassInfo {
                properties: struct_fields(struct_node, source),
                name,
                methods: Vec::new(),
                superclass: None,
                interfaces: Vec::new(),
                start_line: spec.start_position().row as u32 + 1,
            });
        }
    }
}

fn struct_fields(struct_node: Node, source: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cursor = struct_node.walk();
    for list in struct_node.children(&mut cursor) {
        if list.kind() != "field_declaration_list" {
            continue;
        }
        let mut list_cursor = list.walk();
        for field in list.children(&mut list_cursor) {
            if field.kind() != "field_declaration" {
                continue;
            }
            let mut name_cursor = field.walk();
            let names: Vec<String> = field
                .children_by_field_name("name", &mut name_cursor)
                .map(|n| node_text(n, source).to_string())
                .collect();
            if names.is_empty() {
                // 匿名嵌入字段以类型名作为字段名
                if let Some(t) = field.child_by_field_name("type") {
                    fields.push(node_text(t, source).trim_start_matches('*').to_string());
                }
            } else {
                fields.extend(names);
            }
        }
    }
    fields
}

fn collect_values(node: Node, source: &str, exports: &mut Vec<ExportedSymbol>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "const_spec" | "var_spec" => value_names(child, source, exports),
            // 分组的 var ( ... ) 声明
            "var_spec_list" => {
                let mut list_cursor = child.walk();
                for spec in child.children(&mut list_cursor) {
                    if spec.kind() == "var_spec" {
                        value_names(spec, source, exports);
                    }
                }
            }
            _ => {}
        }
    }
}

fn value_names(spec: Node, source: &str, exports: &mut Vec<ExportedSymbol>) {
    let mut cursor = spec.walk();
    for name in spec.children_by_field_name("name", &mut cursor) {
        let name = node_text(name, source);
        if is_exported_name(name) {
            exports.push(ExportedSymbol {
                name: name.to_string(),
                kind: SymbolKind::Variable,
                is_default: false,
            });
        }
    }
}

fn extract_routes(source: &str) -> Vec<ApiRoute> {
    ROUTE_CALL
        .captures_iter(source)
        .filter_map(|caps| {
            let call = caps.get(1)?.as_str();
            let pattern = caps.get(2)?.as_str();
            let handler = caps.get(3).map(|m| m.as_str().to_string());

            // Go 1.22 的 "GET /path" 形式
            let (method, path) = match pattern.split_once(' ') {
                Some((method, path)) if call.starts_with("Handle") => {
                    (HttpMethod::parse(method), path.trim().to_string())
                }
                _ if call.starts_with("Handle") => (HttpMethod::Any, pattern.to_string()),
                _ => (HttpMethod::parse(call), pattern.to_string()),
            };
            Some(ApiRoute {
                path,
                method,
                handler,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SERVICE: &str = r#"
package users

import (
	"fmt"
	"net/http"
	store "example.com/app/internal/store"
)

const MaxUsers = 100
const defaultName = "anon"

var (
	ErrNotFound = fmt.Errorf("not found")
)

type Service struct {
	db   *store.DB
	Name string
	*http.Client
}

type Repository interface {
	Find(id string) (*User, error)
}

func NewService(db *store.DB, name string) *Service {
	if name == "" {
		name = defaultName
	} else {
		name = fmt.Sprintf("%s-svc", name)
	}
	return &Service{db: db, Name: name}
}

func (s *Service) Lookup(id string) error {
	for i := 0; i < 3; i++ {
		switch id {
		case "":
			return ErrNotFound
		default:
		}
	}
	return nil
}

func helper() {}

func Register(mux *http.ServeMux, s *Service) {
	mux.HandleFunc("GET /users/{id}", s.Handle)
	mux.HandleFunc("/health", health)
}
"#;

    fn extract(source: &str) -> CodeStructure {
        GoExtractor::new()
            .expect("Failed to create extractor")
            .extract(source)
    }

    #[test]
    fn test_go_extractor_initialization() {
        let extractor = GoExtractor::new().expect("GoExtractor initialization should succeed");
        assert_eq!(extractor.language(), SupportedLanguage::Go);
        assert_eq!(extractor.file_extensions(), &["go"]);
    }

    #[test]
    fn test_extract_functions_and_methods() {
        let structure = extract(SERVICE);
        let names: Vec<&str> = structure.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["NewService", "Lookup", "helper", "Register"]);

        let new_service = structure.find_function("NewService").unwrap();
        assert!(new_service.is_exported);
        assert_eq!(new_service.parameters, vec!["db *store.DB", "name string"]);
        // if + else
        assert_eq!(new_service.branch_count, 2);
        assert_eq!(new_service.complexity, ComplexityLevel::Low);

        let lookup = structure.find_function("Lookup").unwrap();
        assert!(!lookup.is_exported);
        // for + switch + case（default 分支不计入 expression_case）
        assert!(lookup.branch_count >= 3);

        assert!(!structure.find_function("helper").unwrap().is_exported);
    }

    #[test]
    fn test_extract_struct_with_methods() {
        let structure = extract(SERVICE);
        let service = structure.find_class("Service").unwrap();
        assert_eq!(service.properties, vec!["db", "Name", "http.Client"]);
        assert_eq!(service.methods, vec!["Lookup"]);
    }

    #[test]
    fn test_extract_exports_by_capitalization() {
        let structure = extract(SERVICE);
        let exports: Vec<(&str, SymbolKind)> = structure
            .exports
            .iter()
            .map(|e| (e.name.as_str(), e.kind))
            .collect();
        assert_eq!(
            exports,
            vec![
                ("MaxUsers", SymbolKind::Variable),
                ("ErrNotFound", SymbolKind::Variable),
                ("Service", SymbolKind::Class),
                ("Repository", SymbolKind::Interface),
                ("NewService", SymbolKind::Function),
                ("Register", SymbolKind::Function),
            ]
        );
    }

    #[test]
    fn test_extract_imports() {
        let imports = extract(SERVICE).imports;
        let summary: Vec<(&str, &str)> = imports
            .iter()
            .map(|i| (i.module.as_str(), i.bindings[0].as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("fmt", "fmt"),
                ("net/http", "http"),
                ("example.com/app/internal/store", "store"),
            ]
        );
        assert!(imports.iter().all(|i| !i.is_local));
    }

    #[test]
    fn test_extract_routes() {
        let routes = extract(SERVICE).routes;
        assert_eq!(
            routes,
            vec![
                ApiRoute {
                    path: "/users/{id}".to_string(),
                    method: HttpMethod::Get,
                    handler: Some("s.Handle".to_string()),
                },
                ApiRoute {
                    path: "/health".to_string(),
                    method: HttpMethod::Any,
                    handler: Some("health".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_invalid_source_does_not_panic() {
        let structure = extract("package main\nfunc broken( {\n");
        assert_eq!(structure.language, SupportedLanguage::Go);
        assert!(structure.classes.is_empty());
    }

    #[test]
    fn test_extractor_is_reusable() {
        let extractor = GoExtractor::new().unwrap();
        let first = extractor.extract("package a\nfunc A() {}\n");
        let second = extractor.extract("package b\nfunc B() {}\n");
        assert_eq!(first.functions[0].name, "A");
        assert_eq!(second.functions[0].name, "B");
    }
}
