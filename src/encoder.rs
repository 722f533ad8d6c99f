//! Builds WebAssembly binary modules (`.wasm`) for tests and examples.
//!
//! [`ModuleBuilder`] collects types, imports, functions, memory, globals,
//! exports, a start function and data segments, then encodes them with
//! [`ModuleBuilder::build`]. It is the conceptual inverse of
//! [`crate::parser::decode`].
//!
//! # Binary format overview
//!
//! A module begins with the magic number (`\0asm`) and version (1),
//! followed by sections in a fixed order. Each section is encoded as:
//!
//! ```text
//! section_id: u8 | byte_length: vu32 | contents: byte*
//! ```
//!
//! Sections are emitted only when non-empty. Values are written exactly as
//! given, even when a decoder would reject them, so malformed modules can be
//! built on purpose.
//!
//! # Example
//!
//! ```
//! use wasm_module_runner::encoder::ModuleBuilder;
//! use wasm_module_runner::parser::module::ValueType;
//!
//! let bytes = ModuleBuilder::new()
//!     .function(&[ValueType::I32], &[ValueType::I32], &[], &[0x20, 0x00, 0x0b])
//!     .export_function("main", 0)
//!     .build();
//! assert_eq!(&bytes[0..4], b"\0asm");
//! ```

use crate::parser::encoding::{
    write_f32, write_f64, write_name, write_section, write_vs32, write_vs64, write_vu32, DESC_FUNC,
    DESC_GLOBAL, DESC_MEMORY, DESC_TABLE, MAGIC, OP_END, OP_F32_CONST, OP_F64_CONST, OP_GLOBAL_GET,
    OP_I32_CONST, OP_I64_CONST, SECTION_CODE, SECTION_DATA, SECTION_EXPORT, SECTION_FUNCTION,
    SECTION_GLOBAL, SECTION_IMPORT, SECTION_MEMORY, SECTION_START, SECTION_TYPE, TYPE_FUNC, VERSION,
};
use crate::parser::module::{ConstExpr, ExportIndex, FunctionType, ValueType};

struct FunctionDef {
    type_index: u32,
    locals: Vec<(u32, ValueType)>,
    body: Vec<u8>,
}

#[derive(Default)]
pub struct ModuleBuilder {
    types: Vec<FunctionType>,
    imports: Vec<(String, String, u32)>,
    functions: Vec<FunctionDef>,
    memory: Option<(u32, Option<u32>)>,
    globals: Vec<(ValueType, bool, ConstExpr)>,
    exports: Vec<(String, ExportIndex)>,
    start: Option<u32>,
    data: Vec<(ConstExpr, Vec<u8>)>,
}

impl ModuleBuilder {
    pub fn new() -> ModuleBuilder {
        ModuleBuilder::default()
    }

    /// Index of the signature, adding it if no identical one exists.
    fn type_index(&mut self, params: &[ValueType], results: &[ValueType]) -> u32 {
        let sig = FunctionType::new(params.to_vec(), results.to_vec());
        match self.types.iter().position(|t| *t == sig) {
            Some(index) => index as u32,
            None => {
                self.types.push(sig);
                self.types.len() as u32 - 1
            }
        }
    }

    /// Imports a function. Imports take the lowest function indices.
    pub fn import_function(
        mut self,
        module: &str,
        name: &str,
        params: &[ValueType],
        results: &[ValueType],
    ) -> Self {
        let type_index = self.type_index(params, results);
        self.imports.push((module.to_string(), name.to_string(), type_index));
        self
    }

    /// Defines a function. `locals` are run-length groups and `body` is the
    /// instruction sequence including the final `end`.
    pub fn function(
        mut self,
        params: &[ValueType],
        results: &[ValueType],
        locals: &[(u32, ValueType)],
        body: &[u8],
    ) -> Self {
        let type_index = self.type_index(params, results);
        self.functions.push(FunctionDef {
            type_index,
            locals: locals.to_vec(),
            body: body.to_vec(),
        });
        self
    }

    pub fn memory(mut self, min: u32, max: Option<u32>) -> Self {
        self.memory = Some((min, max));
        self
    }

    pub fn global(mut self, value_type: ValueType, mutable: bool, init: ConstExpr) -> Self {
        self.globals.push((value_type, mutable, init));
        self
    }

    pub fn export(mut self, name: &str, index: ExportIndex) -> Self {
        self.exports.push((name.to_string(), index));
        self
    }

    pub fn export_function(self, name: &str, function_index: u32) -> Self {
        self.export(name, ExportIndex::Function(function_index))
    }

    pub fn start(mut self, function_index: u32) -> Self {
        self.start = Some(function_index);
        self
    }

    pub fn data(mut self, offset: ConstExpr, bytes: &[u8]) -> Self {
        self.data.push((offset, bytes.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());

        self.encode_type_section(&mut buf);
        self.encode_import_section(&mut buf);
        self.encode_function_section(&mut buf);
        self.encode_memory_section(&mut buf);
        self.encode_global_section(&mut buf);
        self.encode_export_section(&mut buf);
        self.encode_start_section(&mut buf);
        self.encode_code_section(&mut buf);
        self.encode_data_section(&mut buf);
        buf
    }

    // =======================================================================
    // Section encoders (in wire order)
    // =======================================================================

    fn encode_type_section(&self, buf: &mut Vec<u8>) {
        if self.types.is_empty() {
            return;
        }
        let mut contents = Vec::new();
        write_vu32(&mut contents, self.types.len() as u32);
        for ft in &self.types {
            contents.push(TYPE_FUNC);
            write_value_types(&mut contents, &ft.parameters);
            write_value_types(&mut contents, &ft.return_types);
        }
        write_section(buf, SECTION_TYPE, &contents);
    }

    fn encode_import_section(&self, buf: &mut Vec<u8>) {
        if self.imports.is_empty() {
            return;
        }
        let mut contents = Vec::new();
        write_vu32(&mut contents, self.imports.len() as u32);
        for (module, name, type_index) in &self.imports {
            write_name(&mut contents, module);
            write_name(&mut contents, name);
            contents.push(DESC_FUNC);
            write_vu32(&mut contents, *type_index);
        }
        write_section(buf, SECTION_IMPORT, &contents);
    }

    fn encode_function_section(&self, buf: &mut Vec<u8>) {
        if self.functions.is_empty() {
            return;
        }
        let mut contents = Vec::new();
        write_vu32(&mut contents, self.functions.len() as u32);
        for function in &self.functions {
            write_vu32(&mut contents, function.type_index);
        }
        write_section(buf, SECTION_FUNCTION, &contents);
    }

    fn encode_memory_section(&self, buf: &mut Vec<u8>) {
        let Some((min, max)) = self.memory else {
            return;
        };
        let mut contents = Vec::new();
        write_vu32(&mut contents, 1);
        match max {
            Some(max) => {
                contents.push(0x01);
                write_vu32(&mut contents, min);
                write_vu32(&mut contents, max);
            }
            None => {
                contents.push(0x00);
                write_vu32(&mut contents, min);
            }
        }
        write_section(buf, SECTION_MEMORY, &contents);
    }

    fn encode_global_section(&self, buf: &mut Vec<u8>) {
        if self.globals.is_empty() {
            return;
        }
        let mut contents = Vec::new();
        write_vu32(&mut contents, self.globals.len() as u32);
        for (value_type, mutable, init) in &self.globals {
            contents.push(value_type.emit_byte());
            contents.push(*mutable as u8);
            write_const_expr(&mut contents, init);
        }
        write_section(buf, SECTION_GLOBAL, &contents);
    }

    fn encode_export_section(&self, buf: &mut Vec<u8>) {
        if self.exports.is_empty() {
            return;
        }
        let mut contents = Vec::new();
        write_vu32(&mut contents, self.exports.len() as u32);
        for (name, index) in &self.exports {
            write_name(&mut contents, name);
            let (desc, index) = match *index {
                ExportIndex::Function(i) => (DESC_FUNC, i),
                ExportIndex::Table(i) => (DESC_TABLE, i),
                ExportIndex::Memory(i) => (DESC_MEMORY, i),
                ExportIndex::Global(i) => (DESC_GLOBAL, i),
            };
            contents.push(desc);
            write_vu32(&mut contents, index);
        }
        write_section(buf, SECTION_EXPORT, &contents);
    }

    fn encode_start_section(&self, buf: &mut Vec<u8>) {
        if let Some(start) = self.start {
            let mut contents = Vec::new();
            write_vu32(&mut contents, start);
            write_section(buf, SECTION_START, &contents);
        }
    }

    /// ```text
    /// code ::= size:u32 func
    /// func ::= vec(locals) expr
    /// ```
    fn encode_code_section(&self, buf: &mut Vec<u8>) {
        if self.functions.is_empty() {
            return;
        }
        let mut contents = Vec::new();
        write_vu32(&mut contents, self.functions.len() as u32);
        for function in &self.functions {
            let mut body = Vec::new();
            write_vu32(&mut body, function.locals.len() as u32);
            for (count, value_type) in &function.locals {
                write_vu32(&mut body, *count);
                body.push(value_type.emit_byte());
            }
            body.extend_from_slice(&function.body);

            write_vu32(&mut contents, body.len() as u32);
            contents.extend_from_slice(&body);
        }
        write_section(buf, SECTION_CODE, &contents);
    }

    fn encode_data_section(&self, buf: &mut Vec<u8>) {
        if self.data.is_empty() {
            return;
        }
        let mut contents = Vec::new();
        write_vu32(&mut contents, self.data.len() as u32);
        for (offset, bytes) in &self.data {
            // active segment for memory 0
            write_vu32(&mut contents, 0);
            write_const_expr(&mut contents, offset);
            write_vu32(&mut contents, bytes.len() as u32);
            contents.extend_from_slice(bytes);
        }
        write_section(buf, SECTION_DATA, &contents);
    }
}

fn write_value_types(buf: &mut Vec<u8>, types: &[ValueType]) {
    write_vu32(buf, types.len() as u32);
    buf.extend(types.iter().map(|t| t.emit_byte()));
}

fn write_const_expr(buf: &mut Vec<u8>, expr: &ConstExpr) {
    match *expr {
        ConstExpr::I32(v) => {
            buf.push(OP_I32_CONST);
            write_vs32(buf, v);
        }
        ConstExpr::I64(v) => {
            buf.push(OP_I64_CONST);
            write_vs64(buf, v);
        }
        ConstExpr::F32(v) => {
            buf.push(OP_F32_CONST);
            write_f32(buf, v);
        }
        ConstExpr::F64(v) => {
            buf.push(OP_F64_CONST);
            write_f64(buf, v);
        }
        ConstExpr::GlobalGet(index) => {
            buf.push(OP_GLOBAL_GET);
            write_vu32(buf, index);
        }
    }
    buf.push(OP_END);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::decode;
    use crate::parser::module::Origin;
    use crate::parser::module::ValueType::*;

    #[test]
    fn test_empty_module() {
        assert_eq!(ModuleBuilder::new().build(), b"\0asm\x01\0\0\0");
    }

    #[test]
    fn test_minimal_function() {
        let bytes = ModuleBuilder::new()
            .function(&[], &[I32], &[], &[0x41, 0x2a, 0x0b])
            .export_function("main", 0)
            .build();
        #[rustfmt::skip]
        let expected = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00,
            0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f,       // type
            0x03, 0x02, 0x01, 0x00,                         // function
            0x07, 0x08, 0x01, 0x04, b'm', b'a', b'i', b'n', 0x00, 0x00, // export
            0x0a, 0x06, 0x01, 0x04, 0x00, 0x41, 0x2a, 0x0b, // code
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_identical_signatures_share_a_type() {
        let bytes = ModuleBuilder::new()
            .import_function("env", "f", &[I32], &[])
            .function(&[I32], &[], &[], &[0x0b])
            .function(&[], &[F64], &[], &[0x44, 0, 0, 0, 0, 0, 0, 0, 0, 0x0b])
            .build();
        let module = decode(&bytes, Origin::Wasm).unwrap();
        assert_eq!(module.types.len(), 2);
        assert_eq!(module.functions[0].sig_index, module.functions[1].sig_index);
    }

    #[test]
    fn test_locals_and_data_round_trip() {
        let bytes = ModuleBuilder::new()
            .memory(1, Some(1))
            .function(&[], &[], &[(2, I64), (1, F32)], &[0x0b])
            .data(ConstExpr::I32(4), &[9, 8, 7])
            .build();
        let module = decode(&bytes, Origin::Wasm).unwrap();
        assert_eq!(module.code_bytes(&module.functions[0]), &[0x02, 0x02, 0x7e, 0x01, 0x7d, 0x0b]);
        assert_eq!(module.data[0].offset, ConstExpr::I32(4));
        assert_eq!(module.data_bytes(&module.data[0]), &[9, 8, 7]);
    }
}
