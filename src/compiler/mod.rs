//! Ahead-of-time compilation to closures
//!
//! [`compile`] verifies every function body up front and translates each op
//! of the verified [`Code`] into a closure. A [`CompiledModule`] can then be
//! instantiated any number of times; each instance gets real memory, real
//! globals and a host object exposing its exports.
//!
//! ```text
//!  Module ── verify ──▶ Code ── translate ──▶ CompiledFunction (actions)
//!                                                   │
//!  imports, buffer ── instantiate ──▶ Store ◀───────┘
//!                                       │
//!                                       ▼
//!                            HostObject with exports
//! ```

mod closure;
mod store;

pub use store::{to_int32, CallError, Store};

use crate::host::{HostException, HostObject, HostValue};
use crate::parser::module::{ExportIndex, ImportKind, Module, Origin};
use crate::parser::validate::{verify_function, FunctionBody, VerificationError};
use crate::runtime::code::Code;
use crate::runtime::instance::eval_const;
use crate::runtime::interpreter::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_STEP_BUDGET};
use crate::runtime::{LinearMemory, ModuleEnv, TrapReason, Value};
use log::debug;
use std::rc::Rc;
use store::{Callable, CompiledFunction};

/// Largest memory an instance may allocate, in pages (256 MiB).
pub const DEFAULT_MAX_MEMORY_PAGES: u32 = 4096;

/// Actions one host call may execute, matching the interpreter's step budget.
pub const DEFAULT_FUEL: u64 = DEFAULT_STEP_BUDGET;

/// Resource bounds applied to compiled instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_call_depth: usize,
    pub max_memory_pages: u32,
    /// Actions one host call may execute, unbounded when `None`
    pub fuel: Option<u64>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            fuel: Some(DEFAULT_FUEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstantiationError {
    #[error("import {module}.{name} is not a function")]
    ImportNotCallable { module: String, name: String },
    #[error("missing import {module}.{name}")]
    MissingImport { module: String, name: String },
    #[error("unsupported import {module}.{name}: {kind}")]
    UnsupportedImport {
        module: String,
        name: String,
        kind: String,
    },
    #[error("memory of {pages} pages exceeds the limit of {limit}")]
    MemoryTooLarge { pages: u32, limit: u32 },
    #[error("buffer of {pages} pages is smaller than the required {required}")]
    BufferTooSmall { pages: u32, required: u32 },
    #[error("global {index} initialiser: {reason}")]
    GlobalInit { index: usize, reason: TrapReason },
    #[error("data segment {index} does not fit in memory")]
    DataOutOfBounds { index: usize },
    #[error("start function failed: {0}")]
    StartFunction(HostException),
}

/// The verified, translated form of a module.
pub struct CompiledModule {
    module: Rc<Module>,
    /// One entry per function, `None` for imports
    functions: Vec<Option<Rc<CompiledFunction>>>,
    limits: ExecutionLimits,
}

pub fn compile(module: &Module) -> Result<CompiledModule, CompileError> {
    compile_with(module, ExecutionLimits::default())
}

pub fn compile_with(
    module: &Module,
    limits: ExecutionLimits,
) -> Result<CompiledModule, CompileError> {
    let env = ModuleEnv::new(module);
    let mode = env.arithmetic_mode();
    let mut functions = Vec::with_capacity(module.functions.len());

    for index in 0..module.functions.len() as u32 {
        let body = match FunctionBody::of(module, index) {
            Some(body) if !module.functions[index as usize].imported => body,
            _ => {
                functions.push(None);
                continue;
            }
        };
        let code = verify_function(&env, &body)?;
        let actions = code.ops.iter().map(|op| closure::translate(op, mode)).collect();
        functions.push(Some(Rc::new(CompiledFunction { code, actions })));
    }

    debug!(
        "compiled {} functions ({} imported)",
        functions.len(),
        module.imported_function_count()
    );
    Ok(CompiledModule {
        module: Rc::new(module.clone()),
        functions,
        limits,
    })
}

impl CompiledModule {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Verified code of a defined function.
    pub fn code(&self, function_index: u32) -> Option<&Code> {
        self.functions
            .get(function_index as usize)?
            .as_ref()
            .map(|f| &f.code)
    }

    /// Creates an instance and returns its host object.
    ///
    /// Function imports are looked up as `imports[module][name]`. A `buffer`
    /// replaces the freshly allocated memory and must be at least the
    /// declared minimum. Strict-dialect instances carry their exports in an
    /// `exports` property; asm.js instances expose them directly.
    pub fn instantiate(
        &self,
        imports: Option<&HostObject>,
        buffer: Option<LinearMemory>,
    ) -> Result<HostObject, InstantiationError> {
        let module = &self.module;
        let callables = self.link(imports)?;
        let memory = self.provision_memory(buffer)?;

        let mut globals: Vec<Value> = Vec::with_capacity(module.globals.len());
        for (index, global) in module.globals.iter().enumerate() {
            let value = eval_const(&global.init, &globals)
                .map_err(|reason| InstantiationError::GlobalInit { index, reason })?;
            globals.push(value);
        }

        let store = Rc::new(Store::new(callables, memory, globals, self.limits));
        self.write_data(&store)?;

        if let Some(start) = module.start {
            debug!("running start function {start}");
            store
                .call(start, Vec::new())
                .map_err(|e| InstantiationError::StartFunction(e.into_exception()))?;
        }

        let exports = self.exports_object(&store);
        match module.origin {
            Origin::Wasm => {
                let instance = HostObject::new();
                instance.set("exports", HostValue::Object(exports));
                Ok(instance)
            }
            Origin::AsmJs => Ok(exports),
        }
    }

    fn link(&self, imports: Option<&HostObject>) -> Result<Vec<Callable>, InstantiationError> {
        let module = &self.module;
        let mut resolved = Vec::new();
        for import in &module.imports {
            let ImportKind::Function(sig_index) = import.kind else {
                return Err(InstantiationError::UnsupportedImport {
                    module: import.module.clone(),
                    name: import.name.clone(),
                    kind: import.kind.to_string(),
                });
            };
            let value = imports
                .and_then(|imports| imports.get(&import.module))
                .and_then(|namespace| namespace.as_object().and_then(|o| o.get(&import.name)))
                .ok_or_else(|| InstantiationError::MissingImport {
                    module: import.module.clone(),
                    name: import.name.clone(),
                })?;
            let HostValue::Function(function) = value else {
                return Err(InstantiationError::ImportNotCallable {
                    module: import.module.clone(),
                    name: import.name.clone(),
                });
            };
            let sig = module.types[sig_index as usize].clone();
            resolved.push(Callable::Host { function, sig });
        }

        let mut resolved = resolved.into_iter();
        let mut callables = Vec::with_capacity(self.functions.len());
        for function in &self.functions {
            match function {
                Some(function) => callables.push(Callable::Compiled(Rc::clone(function))),
                None => {
                    if let Some(host) = resolved.next() {
                        callables.push(host);
                    }
                }
            }
        }
        Ok(callables)
    }

    fn provision_memory(
        &self,
        buffer: Option<LinearMemory>,
    ) -> Result<LinearMemory, InstantiationError> {
        let required = self.module.min_mem_pages();
        if required > self.limits.max_memory_pages {
            return Err(InstantiationError::MemoryTooLarge {
                pages: required,
                limit: self.limits.max_memory_pages,
            });
        }
        match buffer {
            Some(buffer) if buffer.has_backing() && buffer.pages() >= required => Ok(buffer),
            Some(buffer) => Err(InstantiationError::BufferTooSmall {
                pages: if buffer.has_backing() { buffer.pages() } else { 0 },
                required,
            }),
            None => Ok(LinearMemory::with_backing(required)),
        }
    }

    fn write_data(&self, store: &Store) -> Result<(), InstantiationError> {
        let globals: Vec<Value> = (0..self.module.globals.len() as u32)
            .filter_map(|i| store.global_get(i).ok())
            .collect();
        let mut memory = store.memory.borrow_mut();
        for (index, segment) in self.module.data.iter().enumerate() {
            let offset = match eval_const(&segment.offset, &globals) {
                Ok(Value::I32(offset)) => offset as u32 as u64,
                _ => return Err(InstantiationError::DataOutOfBounds { index }),
            };
            memory
                .write(offset, self.module.data_bytes(segment))
                .map_err(|_| InstantiationError::DataOutOfBounds { index })?;
        }
        Ok(())
    }

    fn exports_object(&self, store: &Rc<Store>) -> HostObject {
        let exports = HostObject::new();
        for export in &self.module.exports {
            let value = match export.index {
                ExportIndex::Function(index) => {
                    match store::export_function(store, index, &export.name) {
                        Some(function) => HostValue::Function(function),
                        None => continue,
                    }
                }
                ExportIndex::Global(index) => match store.global_get(index) {
                    Ok(Value::I64(v)) => HostValue::from_number(v as f64),
                    Ok(value) => HostValue::from_number(value_as_f64(value)),
                    Err(_) => HostValue::Undefined,
                },
                ExportIndex::Memory(_) => {
                    let memory = HostObject::new();
                    let size = store.memory.borrow().size();
                    memory.set("byteLength", HostValue::from_number(size as f64));
                    HostValue::Object(memory)
                }
                ExportIndex::Table(_) => HostValue::Object(HostObject::new()),
            };
            exports.set_if_absent(&export.name, value);
        }
        exports
    }
}

fn value_as_f64(value: Value) -> f64 {
    match value {
        Value::I32(v) => v as f64,
        Value::I64(v) => v as f64,
        Value::F32(v) => v as f64,
        Value::F64(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ModuleBuilder;
    use crate::host::{ExceptionKind, HostFunction};
    use crate::parser::decode;
    use crate::parser::module::{ConstExpr, ValueType::*};

    fn instantiate(builder: ModuleBuilder, origin: Origin) -> HostObject {
        let module = decode(&builder.build(), origin).unwrap();
        compile(&module).unwrap().instantiate(None, None).unwrap()
    }

    fn export(instance: &HostObject, name: &str) -> HostValue {
        instance
            .get("exports")
            .and_then(|e| e.as_object().cloned())
            .and_then(|e| e.get(name))
            .unwrap()
    }

    #[test]
    fn test_call_exported_function() {
        let instance = instantiate(
            ModuleBuilder::new()
                .function(&[I32, I32], &[I32], &[], &[0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b])
                .export_function("add", 0),
            Origin::Wasm,
        );
        let add = export(&instance, "add");
        assert_eq!(add.call(&[HostValue::Smi(2), HostValue::Smi(3)]), Ok(HostValue::Smi(5)));
        // ToNumber on arguments, missing ones are undefined
        assert_eq!(add.call(&[HostValue::string("4")]), Ok(HostValue::Smi(4)));
    }

    #[test]
    fn test_asm_js_exports_on_instance() {
        let instance = instantiate(
            ModuleBuilder::new()
                .function(&[], &[I32], &[], &[0x41, 0x01, 0x0b])
                .function(&[], &[I32], &[], &[0x41, 0x02, 0x0b])
                .export_function("caller", 0)
                .export_function("caller", 1),
            Origin::AsmJs,
        );
        assert!(instance.get("exports").is_none());
        assert_eq!(instance.get("caller").unwrap().call(&[]), Ok(HostValue::Smi(1)));
    }

    #[test]
    fn test_memory_globals_and_data() {
        let instance = instantiate(
            ModuleBuilder::new()
                .memory(1, None)
                .global(I32, true, ConstExpr::I32(40))
                .data(ConstExpr::I32(8), &[2, 0, 0, 0])
                // i32.const 8; i32.load; global.get 0; i32.add
                .function(&[], &[I32], &[], &[0x41, 0x08, 0x28, 0x02, 0x00, 0x23, 0x00, 0x6a, 0x0b])
                .export_function("main", 0),
            Origin::Wasm,
        );
        assert_eq!(export(&instance, "main").call(&[]), Ok(HostValue::Smi(42)));
    }

    #[test]
    fn test_float_result_is_heap_number() {
        let instance = instantiate(
            ModuleBuilder::new()
                .function(&[F64], &[F64], &[], &[0x20, 0x00, 0x0b])
                .export_function("id", 0),
            Origin::Wasm,
        );
        assert_eq!(
            export(&instance, "id").call(&[HostValue::HeapNumber(2.5)]),
            Ok(HostValue::HeapNumber(2.5))
        );
    }

    #[test]
    fn test_traps_raise_exceptions() {
        let instance = instantiate(
            ModuleBuilder::new()
                .function(&[], &[], &[], &[0x00, 0x0b])
                .function(&[], &[], &[], &[0x10, 0x01, 0x0b])
                .function(&[I64], &[], &[], &[0x0b])
                .export_function("trap", 0)
                .export_function("recurse", 1)
                .export_function("wide", 2),
            Origin::Wasm,
        );
        let kind = |name: &str| export(&instance, name).call(&[]).unwrap_err().kind;
        assert_eq!(kind("trap"), ExceptionKind::RuntimeError);
        assert_eq!(kind("recurse"), ExceptionKind::RangeError);
        assert_eq!(export(&instance, "wide").call(&[]).unwrap_err().kind, ExceptionKind::TypeError);
    }

    #[test]
    fn test_fuel_bounds_infinite_loop() {
        let module = decode(
            &ModuleBuilder::new()
                .function(&[], &[], &[], &[0x03, 0x40, 0x0c, 0x00, 0x0b, 0x0b])
                .export_function("spin", 0)
                .build(),
            Origin::Wasm,
        )
        .unwrap();
        let limits = ExecutionLimits {
            fuel: Some(1000),
            ..ExecutionLimits::default()
        };
        let instance = compile_with(&module, limits).unwrap().instantiate(None, None).unwrap();
        let err = export(&instance, "spin").call(&[]).unwrap_err();
        assert_eq!(err.message, TrapReason::OutOfFuel.to_string());
    }

    #[test]
    fn test_function_imports() {
        let module = decode(
            &ModuleBuilder::new()
                .import_function("env", "twice", &[I32], &[I32])
                .function(&[], &[I32], &[], &[0x41, 0x15, 0x10, 0x00, 0x0b])
                .export_function("main", 1)
                .build(),
            Origin::Wasm,
        )
        .unwrap();
        let compiled = compile(&module).unwrap();
        assert!(compiled.code(0).is_none());
        assert!(compiled.code(1).is_some());
        assert!(matches!(
            compiled.instantiate(None, None),
            Err(InstantiationError::MissingImport { .. })
        ));

        let env = HostObject::new();
        env.set(
            "twice",
            HostValue::Function(HostFunction::new("twice", 1, |args| {
                Ok(HostValue::from_number(args[0].to_number() * 2.0))
            })),
        );
        let imports = HostObject::new();
        imports.set("env", HostValue::Object(env));
        let instance = compiled.instantiate(Some(&imports), None).unwrap();
        assert_eq!(export(&instance, "main").call(&[]), Ok(HostValue::Smi(42)));
    }

    #[test]
    fn test_instantiation_errors() {
        let too_big = decode(&ModuleBuilder::new().memory(5000, None).build(), Origin::Wasm)
            .unwrap();
        assert!(matches!(
            compile(&too_big).unwrap().instantiate(None, None),
            Err(InstantiationError::MemoryTooLarge { pages: 5000, .. })
        ));

        let data = decode(
            &ModuleBuilder::new()
                .memory(1, None)
                .data(ConstExpr::I32(65535), &[1, 2])
                .build(),
            Origin::Wasm,
        )
        .unwrap();
        let compiled = compile(&data).unwrap();
        assert_eq!(
            compiled.instantiate(None, None).unwrap_err(),
            InstantiationError::DataOutOfBounds { index: 0 }
        );
        assert_eq!(
            compiled.instantiate(None, Some(LinearMemory::without_backing(1))).unwrap_err(),
            InstantiationError::BufferTooSmall { pages: 0, required: 1 }
        );
    }

    #[test]
    fn test_start_function_runs_and_can_fail() {
        // start sets global 0 to 7
        let instance = instantiate(
            ModuleBuilder::new()
                .global(I32, true, ConstExpr::I32(0))
                .function(&[], &[], &[], &[0x41, 0x07, 0x24, 0x00, 0x0b])
                .function(&[], &[I32], &[], &[0x23, 0x00, 0x0b])
                .start(0)
                .export_function("main", 1),
            Origin::Wasm,
        );
        assert_eq!(export(&instance, "main").call(&[]), Ok(HostValue::Smi(7)));

        let failing = decode(
            &ModuleBuilder::new().function(&[], &[], &[], &[0x00, 0x0b]).start(0).build(),
            Origin::Wasm,
        )
        .unwrap();
        assert!(matches!(
            compile(&failing).unwrap().instantiate(None, None),
            Err(InstantiationError::StartFunction(_))
        ));
    }

    #[test]
    fn test_compile_rejects_invalid_body() {
        let module = decode(
            &ModuleBuilder::new().function(&[], &[I32], &[], &[0x0b]).build(),
            Origin::Wasm,
        )
        .unwrap();
        assert!(matches!(compile(&module), Err(CompileError::Verification(_))));
    }
}
