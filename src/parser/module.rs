//! Decoded module representation
//!
//! A [`Module`] is produced once by [`crate::parser::decode`] and never mutated
//! afterwards. It owns a copy of the bytes it was decoded from; function bodies
//! are kept as byte ranges into that copy and are only decoded when a function
//! is verified for execution.

use super::encoding::{PAGE_SIZE, TYPE_F32, TYPE_F64, TYPE_I32, TYPE_I64};
use std::fmt;
use std::ops::Range;

/// Which decode grammar and default entry function apply to a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Strict WebAssembly binary.
    Wasm,
    /// Permissive dialect produced by the asm.js translator.
    AsmJs,
}

impl Origin {
    pub fn from_asm_js_flag(asm_js: bool) -> Origin {
        if asm_js {
            Origin::AsmJs
        } else {
            Origin::Wasm
        }
    }

    /// Name of the export the convenience entry points invoke.
    pub fn entry_name(self) -> &'static str {
        match self {
            Origin::Wasm => "main",
            Origin::AsmJs => "caller",
        }
    }

    pub fn is_asm_js(self) -> bool {
        self == Origin::AsmJs
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Wasm => write!(f, "wasm"),
            Origin::AsmJs => write!(f, "asm.js"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub fn decode(byte: u8) -> Option<ValueType> {
        match byte {
            TYPE_I32 => Some(ValueType::I32),
            TYPE_I64 => Some(ValueType::I64),
            TYPE_F32 => Some(ValueType::F32),
            TYPE_F64 => Some(ValueType::F64),
            _ => None,
        }
    }

    pub fn emit_byte(self) -> u8 {
        match self {
            ValueType::I32 => TYPE_I32,
            ValueType::I64 => TYPE_I64,
            ValueType::F32 => TYPE_F32,
            ValueType::F64 => TYPE_F64,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionType {
    pub parameters: Vec<ValueType>,
    pub return_types: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(parameters: Vec<ValueType>, return_types: Vec<ValueType>) -> Self {
        FunctionType {
            parameters,
            return_types,
        }
    }

    /// The single result type, if any (results are limited to one).
    pub fn result(&self) -> Option<ValueType> {
        self.return_types.first().copied()
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |types: &[ValueType]| {
            types
                .iter()
                .map(ValueType::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };
        write!(
            f,
            "[{}] -> [{}]",
            join(&self.parameters),
            join(&self.return_types)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{} {}", self.min, max),
            None => write!(f, "{}", self.min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

/// A constant initialiser expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    GlobalGet(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub global_type: GlobalType,
    pub init: ConstExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportKind {
    Function(u32),
    Table(Limits),
    Memory(Limits),
    Global(GlobalType),
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportKind::Function(idx) => write!(f, "func (type {idx})"),
            ImportKind::Table(limits) => write!(f, "table {limits}"),
            ImportKind::Memory(limits) => write!(f, "memory {limits}"),
            ImportKind::Global(g) => {
                if g.mutable {
                    write!(f, "global (mut {})", g.value_type)
                } else {
                    write!(f, "global {}", g.value_type)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportIndex {
    Function(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub index: ExportIndex,
}

/// One entry of the function index space.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Index into [`Module::types`]
    pub sig_index: u32,
    pub sig: FunctionType,
    /// Body range (local declarations and instructions) within
    /// [`Module::bytes`]. Empty for imported functions.
    pub code: Range<usize>,
    pub imported: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    pub offset: ConstExpr,
    pub data: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub origin: Origin,
    /// The raw bytes this module was decoded from
    pub bytes: Vec<u8>,
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    /// The function index space; imported functions come first
    pub functions: Vec<Function>,
    pub tables: Vec<Limits>,
    pub memory: Option<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub data: Vec<DataSegment>,
}

impl Module {
    pub fn new(origin: Origin, bytes: Vec<u8>) -> Module {
        Module {
            origin,
            bytes,
            types: Vec::new(),
            imports: Vec::new(),
            functions: Vec::new(),
            tables: Vec::new(),
            memory: None,
            globals: Vec::new(),
            exports: Vec::new(),
            start: None,
            data: Vec::new(),
        }
    }

    pub fn min_mem_pages(&self) -> u32 {
        self.memory.map(|m| m.min).unwrap_or(0)
    }

    pub fn max_mem_pages(&self) -> Option<u32> {
        self.memory.and_then(|m| m.max)
    }

    /// Minimum linear memory size in bytes. Saturates at `u32::MAX` for a
    /// full 65536-page declaration.
    pub fn min_mem_size(&self) -> u32 {
        PAGE_SIZE.saturating_mul(self.min_mem_pages())
    }

    pub fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    pub fn imported_function_count(&self) -> usize {
        self.functions.iter().filter(|f| f.imported).count()
    }

    /// Global types in index space order (imported globals first).
    pub fn global_types(&self) -> Vec<GlobalType> {
        self.imports
            .iter()
            .filter_map(|import| match import.kind {
                ImportKind::Global(g) => Some(g),
                _ => None,
            })
            .chain(self.globals.iter().map(|g| g.global_type))
            .collect()
    }

    /// First export with the given name.
    pub fn find_export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }

    pub fn code_bytes(&self, function: &Function) -> &[u8] {
        &self.bytes[function.code.clone()]
    }

    pub fn data_bytes(&self, segment: &DataSegment) -> &[u8] {
        &self.bytes[segment.data.clone()]
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module ({}, {} bytes)", self.origin, self.bytes.len())?;
        for (i, t) in self.types.iter().enumerate() {
            writeln!(f, "  type[{i}] {t}")?;
        }
        for import in &self.imports {
            writeln!(f, "  import \"{}\".\"{}\" {}", import.module, import.name, import.kind)?;
        }
        for (i, func) in self.functions.iter().enumerate() {
            if func.imported {
                writeln!(f, "  func[{i}] {} (imported)", func.sig)?;
            } else {
                writeln!(
                    f,
                    "  func[{i}] {} <{}..{}>",
                    func.sig, func.code.start, func.code.end
                )?;
            }
        }
        if let Some(memory) = self.memory {
            writeln!(f, "  memory {memory}")?;
        }
        for (i, global) in self.globals.iter().enumerate() {
            writeln!(f, "  global[{i}] {:?} = {:?}", global.global_type, global.init)?;
        }
        for export in &self.exports {
            writeln!(f, "  export \"{}\" {:?}", export.name, export.index)?;
        }
        if let Some(start) = self.start {
            writeln!(f, "  start {start}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_entry_names() {
        assert_eq!(Origin::from_asm_js_flag(false).entry_name(), "main");
        assert_eq!(Origin::from_asm_js_flag(true).entry_name(), "caller");
        assert!(Origin::AsmJs.is_asm_js());
    }

    #[test]
    fn test_value_type_bytes() {
        for t in [ValueType::I32, ValueType::I64, ValueType::F32, ValueType::F64] {
            assert_eq!(ValueType::decode(t.emit_byte()), Some(t));
        }
        assert_eq!(ValueType::decode(0x40), None);
    }

    #[test]
    fn test_min_mem_size() {
        let mut module = Module::new(Origin::Wasm, vec![]);
        assert_eq!(module.min_mem_size(), 0);
        module.memory = Some(Limits { min: 2, max: None });
        assert_eq!(module.min_mem_size(), 2 * PAGE_SIZE);
        module.memory = Some(Limits { min: 65536, max: None });
        assert_eq!(module.min_mem_size(), u32::MAX);
    }

    #[test]
    fn test_function_type_display() {
        let t = FunctionType::new(vec![ValueType::I32, ValueType::F64], vec![ValueType::I64]);
        assert_eq!(t.to_string(), "[i32 f64] -> [i64]");
        assert_eq!(t.result(), Some(ValueType::I64));
    }
}
