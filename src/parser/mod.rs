//! WebAssembly binary decoder
//!
//! [`decode`] turns a byte buffer into a [`module::Module`]. Decoding checks
//! the section structure, index spaces and constant expressions, but leaves
//! function bodies undecoded: they are verified lazily by [`validate`] when a
//! function is about to run.

pub mod encoding;
pub mod instruction;
pub mod module;
pub mod reader;
pub mod validate;

use encoding::*;
use module::{
    ConstExpr, DataSegment, Export, ExportIndex, Function, Global, GlobalType, Import, ImportKind,
    Limits, Module, Origin, ValueType,
};
use reader::Reader;
use thiserror::Error;

/// Upper bound on declared locals per function body.
pub const MAX_LOCALS: u64 = 50_000;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} @+{offset}")]
pub struct DecodeError {
    /// Offset into the decoded buffer
    pub offset: usize,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(offset: usize, kind: DecodeErrorKind) -> Self {
        DecodeError { offset, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("expected magic word 0061736d, found {0}")]
    BadMagic(String),
    #[error("unsupported version {0}")]
    BadVersion(u32),
    #[error("integer too large")]
    IntegerTooLarge,
    #[error("integer representation too long")]
    IntegerRepresentationTooLong,
    #[error("invalid UTF-8 encoding")]
    InvalidUtf8,
    #[error("count {0} exceeds the remaining input")]
    CountTooLarge(u64),
    #[error("unknown section id {0}")]
    UnknownSection(u8),
    #[error("section id {0} is not supported")]
    UnsupportedSection(u8),
    #[error("section id {0} out of order or duplicated")]
    SectionOutOfOrder(u8),
    #[error("section size mismatch: declared {declared}, consumed {consumed}")]
    SectionSizeMismatch { declared: usize, consumed: usize },
    #[error("expected function type form 0x60, found {0:#04x}")]
    BadTypeForm(u8),
    #[error("invalid value type {0:#04x}")]
    BadValueType(u8),
    #[error("invalid result arity {0}")]
    InvalidResultArity(usize),
    #[error("unknown import kind {0:#04x}")]
    BadImportKind(u8),
    #[error("unknown export kind {0:#04x}")]
    BadExportKind(u8),
    #[error("invalid limits flags {0:#04x}")]
    BadLimitsFlags(u8),
    #[error("memory size must be at most 65536 pages, got {0}")]
    MemoryTooLarge(u32),
    #[error("size minimum must not be greater than maximum")]
    LimitsMinExceedsMax,
    #[error("multiple memories")]
    MultipleMemories,
    #[error("invalid table element type {0:#04x}")]
    BadTableElementType(u8),
    #[error("type index {0} out of bounds")]
    TypeIndexOutOfBounds(u32),
    #[error("function index {0} out of bounds")]
    FunctionIndexOutOfBounds(u32),
    #[error("global index {0} out of bounds")]
    GlobalIndexOutOfBounds(u32),
    #[error("memory index {0} out of bounds")]
    MemoryIndexOutOfBounds(u32),
    #[error("table index {0} out of bounds")]
    TableIndexOutOfBounds(u32),
    #[error("invalid mutability flag {0:#04x}")]
    BadMutability(u8),
    #[error("invalid constant expression")]
    BadConstExpr,
    #[error("constant expression type mismatch: expected {expected}, found {found}")]
    ConstExprTypeMismatch { expected: ValueType, found: ValueType },
    #[error("duplicate export name \"{0}\"")]
    DuplicateExport(String),
    #[error("start function must have type [] -> []")]
    BadStartFunction,
    #[error("function and code section have inconsistent lengths: {functions} vs {bodies}")]
    FunctionBodyCountMismatch { functions: usize, bodies: usize },
    #[error("data segment requires a memory")]
    DataWithoutMemory,
    #[error("invalid data segment flags {0}")]
    BadDataFlags(u32),
    #[error("unexpected trailing bytes")]
    TrailingBytes,
    #[error("too many locals")]
    TooManyLocals,
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("unknown prefixed opcode {0:#04x} {1}")]
    UnknownPrefixedOpcode(u8, u32),
    #[error("invalid block type {0:#04x}")]
    BadBlockType(u8),
    #[error("zero byte expected")]
    ZeroByteExpected,
}

/// Decodes a binary module. Function bodies are bounds-checked but not
/// decoded.
pub fn decode(bytes: &[u8], origin: Origin) -> Result<Module, DecodeError> {
    let mut module = Module::new(origin, bytes.to_vec());
    let mut reader = Reader::new(bytes);

    read_header(&mut reader)?;

    let mut last_id = 0u8;
    let mut declared_functions: Option<usize> = None;
    let mut code_seen = false;

    while !reader.is_empty() {
        let id_offset = reader.offset();
        let sec_id = reader.read_byte()?;
        let sec_len = reader.read_vu32()? as usize;
        let sec_start = reader.offset();
        let contents = reader.read_bytes(sec_len)?;

        if sec_id != SECTION_CUSTOM {
            if sec_id <= last_id {
                return Err(DecodeError::new(id_offset, DecodeErrorKind::SectionOutOfOrder(sec_id)));
            }
            last_id = sec_id;
        }

        let mut section = Reader::with_base(contents, sec_start);
        match sec_id {
            SECTION_CUSTOM => {
                // name, payload ignored
                section.read_name()?;
                continue;
            }
            SECTION_TYPE => read_section_type(&mut section, &mut module)?,
            SECTION_IMPORT => read_section_import(&mut section, &mut module)?,
            SECTION_FUNCTION => {
                let count = read_section_function(&mut section, &mut module)?;
                declared_functions = Some(count);
            }
            SECTION_TABLE => read_section_table(&mut section, &mut module)?,
            SECTION_MEMORY => read_section_memory(&mut section, &mut module)?,
            SECTION_GLOBAL => read_section_global(&mut section, &mut module)?,
            SECTION_EXPORT => read_section_export(&mut section, &mut module)?,
            SECTION_START => read_section_start(&mut section, &mut module)?,
            SECTION_CODE => {
                read_section_code(&mut section, &mut module, declared_functions.unwrap_or(0))?;
                code_seen = true;
            }
            SECTION_DATA => read_section_data(&mut section, &mut module)?,
            SECTION_ELEMENT | SECTION_DATA_COUNT => {
                return Err(DecodeError::new(id_offset, DecodeErrorKind::UnsupportedSection(sec_id)))
            }
            _ => return Err(DecodeError::new(id_offset, DecodeErrorKind::UnknownSection(sec_id))),
        }

        if !section.is_empty() {
            return Err(DecodeError::new(
                section.offset(),
                DecodeErrorKind::SectionSizeMismatch {
                    declared: sec_len,
                    consumed: section.pos(),
                },
            ));
        }
    }

    let declared = declared_functions.unwrap_or(0);
    if declared > 0 && !code_seen {
        return Err(DecodeError::new(
            reader.offset(),
            DecodeErrorKind::FunctionBodyCountMismatch {
                functions: declared,
                bodies: 0,
            },
        ));
    }

    Ok(module)
}

fn read_header(reader: &mut Reader) -> Result<(), DecodeError> {
    let magic = reader.read_bytes(4)?;
    if magic != MAGIC {
        return Err(DecodeError::new(0, DecodeErrorKind::BadMagic(hex::encode(magic))));
    }
    let version = reader.read_u32()?;
    if version != VERSION {
        return Err(DecodeError::new(4, DecodeErrorKind::BadVersion(version)));
    }
    Ok(())
}

/* SECTION READERS ************************************************/

pub(crate) fn read_value_type(reader: &mut Reader) -> Result<ValueType, DecodeError> {
    let offset = reader.offset();
    let byte = reader.read_byte()?;
    ValueType::decode(byte)
        .ok_or_else(|| DecodeError::new(offset, DecodeErrorKind::BadValueType(byte)))
}

fn read_value_types(reader: &mut Reader) -> Result<Vec<ValueType>, DecodeError> {
    let count = reader.read_count()?;
    (0..count).map(|_| read_value_type(reader)).collect()
}

fn read_limits(reader: &mut Reader) -> Result<Limits, DecodeError> {
    let offset = reader.offset();
    let flags = reader.read_byte()?;
    let min = reader.read_vu32()?;
    let max = match flags {
        0 => None,
        1 => Some(reader.read_vu32()?),
        _ => return Err(DecodeError::new(offset, DecodeErrorKind::BadLimitsFlags(flags))),
    };
    if let Some(max) = max {
        if min > max {
            return Err(DecodeError::new(offset, DecodeErrorKind::LimitsMinExceedsMax));
        }
    }
    Ok(Limits { min, max })
}

fn read_memory_limits(reader: &mut Reader) -> Result<Limits, DecodeError> {
    let offset = reader.offset();
    let limits = read_limits(reader)?;
    for pages in std::iter::once(limits.min).chain(limits.max) {
        if pages > MAX_PAGES {
            return Err(DecodeError::new(offset, DecodeErrorKind::MemoryTooLarge(pages)));
        }
    }
    Ok(limits)
}

fn read_table_type(reader: &mut Reader) -> Result<Limits, DecodeError> {
    let offset = reader.offset();
    let elem = reader.read_byte()?;
    if elem != TYPE_FUNCREF {
        return Err(DecodeError::new(offset, DecodeErrorKind::BadTableElementType(elem)));
    }
    read_limits(reader)
}

fn read_global_type(reader: &mut Reader) -> Result<GlobalType, DecodeError> {
    let value_type = read_value_type(reader)?;
    let offset = reader.offset();
    let mutable = match reader.read_byte()? {
        0 => false,
        1 => true,
        other => return Err(DecodeError::new(offset, DecodeErrorKind::BadMutability(other))),
    };
    Ok(GlobalType { value_type, mutable })
}

fn read_type_index(reader: &mut Reader, module: &Module) -> Result<u32, DecodeError> {
    let offset = reader.offset();
    let index = reader.read_vu32()?;
    if index as usize >= module.types.len() {
        return Err(DecodeError::new(offset, DecodeErrorKind::TypeIndexOutOfBounds(index)));
    }
    Ok(index)
}

/// Reads a constant expression of the given type, terminated by `end`.
/// `global.get` may only reference imported immutable globals.
fn read_const_expr(
    reader: &mut Reader,
    module: &Module,
    expected: ValueType,
) -> Result<ConstExpr, DecodeError> {
    let offset = reader.offset();
    let opcode = reader.read_byte()?;
    let (expr, found) = match opcode {
        OP_I32_CONST => (ConstExpr::I32(reader.read_vs32()?), ValueType::I32),
        OP_I64_CONST => (ConstExpr::I64(reader.read_vs64()?), ValueType::I64),
        OP_F32_CONST => (ConstExpr::F32(reader.read_f32()?), ValueType::F32),
        OP_F64_CONST => (ConstExpr::F64(reader.read_f64()?), ValueType::F64),
        OP_GLOBAL_GET => {
            let index_offset = reader.offset();
            let index = reader.read_vu32()?;
            let imported: Vec<GlobalType> = module
                .imports
                .iter()
                .filter_map(|i| match i.kind {
                    ImportKind::Global(g) => Some(g),
                    _ => None,
                })
                .collect();
            let global = imported.get(index as usize).ok_or_else(|| {
                DecodeError::new(index_offset, DecodeErrorKind::GlobalIndexOutOfBounds(index))
            })?;
            if global.mutable {
                return Err(DecodeError::new(index_offset, DecodeErrorKind::BadConstExpr));
            }
            (ConstExpr::GlobalGet(index), global.value_type)
        }
        _ => return Err(DecodeError::new(offset, DecodeErrorKind::BadConstExpr)),
    };
    if found != expected {
        return Err(DecodeError::new(
            offset,
            DecodeErrorKind::ConstExprTypeMismatch { expected, found },
        ));
    }
    let end_offset = reader.offset();
    if reader.read_byte()? != OP_END {
        return Err(DecodeError::new(end_offset, DecodeErrorKind::BadConstExpr));
    }
    Ok(expr)
}

fn read_section_type(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let count = reader.read_count()?;

    for _ in 0..count {
        let offset = reader.offset();
        let form = reader.read_byte()?;
        if form != TYPE_FUNC {
            return Err(DecodeError::new(offset, DecodeErrorKind::BadTypeForm(form)));
        }
        let parameters = read_value_types(reader)?;
        let results_offset = reader.offset();
        let return_types = read_value_types(reader)?;
        if return_types.len() > 1 {
            return Err(DecodeError::new(
                results_offset,
                DecodeErrorKind::InvalidResultArity(return_types.len()),
            ));
        }
        module.types.push(module::FunctionType {
            parameters,
            return_types,
        });
    }

    Ok(())
}

fn read_section_import(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let count = reader.read_count()?;

    for _ in 0..count {
        let module_name = reader.read_name()?;
        let name = reader.read_name()?;
        let kind_offset = reader.offset();
        let kind = match reader.read_byte()? {
            DESC_FUNC => {
                let sig_index = read_type_index(reader, module)?;
                module.functions.push(Function {
                    sig_index,
                    sig: module.types[sig_index as usize].clone(),
                    code: 0..0,
                    imported: true,
                });
                ImportKind::Function(sig_index)
            }
            DESC_TABLE => {
                let limits = read_table_type(reader)?;
                module.tables.push(limits);
                ImportKind::Table(limits)
            }
            DESC_MEMORY => {
                let limits = read_memory_limits(reader)?;
                if module.memory.is_some() {
                    return Err(DecodeError::new(kind_offset, DecodeErrorKind::MultipleMemories));
                }
                module.memory = Some(limits);
                ImportKind::Memory(limits)
            }
            DESC_GLOBAL => ImportKind::Global(read_global_type(reader)?),
            other => {
                return Err(DecodeError::new(kind_offset, DecodeErrorKind::BadImportKind(other)))
            }
        };

        module.imports.push(Import {
            module: module_name,
            name,
            kind,
        });
    }

    Ok(())
}

fn read_section_function(reader: &mut Reader, module: &mut Module) -> Result<usize, DecodeError> {
    let count = reader.read_count()?;

    for _ in 0..count {
        let sig_index = read_type_index(reader, module)?;
        module.functions.push(Function {
            sig_index,
            sig: module.types[sig_index as usize].clone(),
            code: 0..0,
            imported: false,
        });
    }

    Ok(count)
}

fn read_section_table(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let count = reader.read_count()?;
    for _ in 0..count {
        let limits = read_table_type(reader)?;
        module.tables.push(limits);
    }
    Ok(())
}

fn read_section_memory(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let count = reader.read_count()?;

    for _ in 0..count {
        let offset = reader.offset();
        let limits = read_memory_limits(reader)?;
        if module.memory.is_some() {
            return Err(DecodeError::new(offset, DecodeErrorKind::MultipleMemories));
        }
        module.memory = Some(limits);
    }

    Ok(())
}

fn read_section_global(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let count = reader.read_count()?;

    for _ in 0..count {
        let global_type = read_global_type(reader)?;
        let init = read_const_expr(reader, module, global_type.value_type)?;
        module.globals.push(Global { global_type, init });
    }

    Ok(())
}

fn read_section_export(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let count = reader.read_count()?;
    let global_count = module.global_types().len();

    for _ in 0..count {
        let name_offset = reader.offset();
        let name = reader.read_name()?;
        // asm.js tolerates duplicates, the first one wins on lookup
        if module.origin == Origin::Wasm && module.find_export(&name).is_some() {
            return Err(DecodeError::new(name_offset, DecodeErrorKind::DuplicateExport(name)));
        }
        let kind_offset = reader.offset();
        let kind = reader.read_byte()?;
        let index_offset = reader.offset();
        let idx = reader.read_vu32()?;
        let out_of_bounds = |kind: DecodeErrorKind| Err(DecodeError::new(index_offset, kind));

        let index = match kind {
            DESC_FUNC => {
                if idx as usize >= module.functions.len() {
                    return out_of_bounds(DecodeErrorKind::FunctionIndexOutOfBounds(idx));
                }
                ExportIndex::Function(idx)
            }
            DESC_TABLE => {
                if idx as usize >= module.tables.len() {
                    return out_of_bounds(DecodeErrorKind::TableIndexOutOfBounds(idx));
                }
                ExportIndex::Table(idx)
            }
            DESC_MEMORY => {
                if idx != 0 || module.memory.is_none() {
                    return out_of_bounds(DecodeErrorKind::MemoryIndexOutOfBounds(idx));
                }
                ExportIndex::Memory(idx)
            }
            DESC_GLOBAL => {
                if idx as usize >= global_count {
                    return out_of_bounds(DecodeErrorKind::GlobalIndexOutOfBounds(idx));
                }
                ExportIndex::Global(idx)
            }
            other => {
                return Err(DecodeError::new(kind_offset, DecodeErrorKind::BadExportKind(other)))
            }
        };

        module.exports.push(Export { name, index });
    }

    Ok(())
}

fn read_section_start(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let offset = reader.offset();
    let index = reader.read_vu32()?;
    let function = module
        .functions
        .get(index as usize)
        .ok_or_else(|| DecodeError::new(offset, DecodeErrorKind::FunctionIndexOutOfBounds(index)))?;
    if !function.sig.parameters.is_empty() || !function.sig.return_types.is_empty() {
        return Err(DecodeError::new(offset, DecodeErrorKind::BadStartFunction));
    }
    module.start = Some(index);
    Ok(())
}

fn read_section_code(
    reader: &mut Reader,
    module: &mut Module,
    declared: usize,
) -> Result<(), DecodeError> {
    let count_offset = reader.offset();
    let count = reader.read_count()?;
    if count != declared {
        return Err(DecodeError::new(
            count_offset,
            DecodeErrorKind::FunctionBodyCountMismatch {
                functions: declared,
                bodies: count,
            },
        ));
    }

    let first_defined = module.imported_function_count();
    for i in 0..count {
        let size = reader.read_vu32()? as usize;
        let start = reader.offset();
        reader.skip(size)?;
        module.functions[first_defined + i].code = start..start + size;
    }

    Ok(())
}

fn read_section_data(reader: &mut Reader, module: &mut Module) -> Result<(), DecodeError> {
    let count = reader.read_count()?;

    for _ in 0..count {
        let offset = reader.offset();
        let flags = reader.read_vu32()?;
        match flags {
            0 => {}
            2 => {
                let index_offset = reader.offset();
                let memory_index = reader.read_vu32()?;
                if memory_index != 0 {
                    return Err(DecodeError::new(
                        index_offset,
                        DecodeErrorKind::MemoryIndexOutOfBounds(memory_index),
                    ));
                }
            }
            // passive segments need bulk memory
            _ => return Err(DecodeError::new(offset, DecodeErrorKind::BadDataFlags(flags))),
        }
        if module.memory.is_none() {
            return Err(DecodeError::new(offset, DecodeErrorKind::DataWithoutMemory));
        }
        let init = read_const_expr(reader, module, ValueType::I32)?;
        let len = reader.read_vu32()? as usize;
        let start = reader.offset();
        reader.skip(len)?;
        module.data.push(DataSegment {
            offset: init,
            data: start..start + len,
        });
    }

    Ok(())
}
