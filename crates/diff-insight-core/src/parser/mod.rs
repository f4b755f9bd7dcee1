//! 多语言结构提取模块
//!
//! 提供通用的结构提取接口和各语言的具体实现

pub mod common;
pub mod go;
pub mod python;
pub mod rust;
pub mod script;

// 重新导出核心类型
pub use common::{
    ApiRoute, ClassInfo, CodeStructure, ComplexityLevel, ExportedSymbol, ExtractorFactory,
    FunctionInfo, HttpMethod, ImportInfo, StructureExtractor, SupportedLanguage, SymbolKind,
};
pub use go::GoExtractor;
pub use python::PythonExtractor;
pub use rust::RustExtractor;
pub use script::ScriptExtractor;
