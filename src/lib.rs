//! A harness for running WebAssembly modules in tests.
//!
//! wasm-module-runner takes module bytes, decodes and checks them, runs one
//! exported function and reduces the outcome to a single `i32` that a test
//! can assert on. Functions run either on a frame-based interpreter or
//! through a closure compiler that instantiates the module against a small
//! host object model.
//!
//! # Modules
//!
//! - [`parser`] -- Binary decoder and lazy per-function verifier.
//! - [`runtime`] -- Values, linear memory, operation semantics and the interpreter.
//! - [`compiler`] -- Closure compiler, store and instantiation.
//! - [`host`] -- Host values, objects, functions and exceptions.
//! - [`harness`] -- The test-facing entry points and error reporting.
//! - [`encoder`] -- A builder for module bytes.
//!
//! # Example
//!
//! Interpret a function with arguments:
//!
//! ```
//! use wasm_module_runner::encoder::ModuleBuilder;
//! use wasm_module_runner::harness::{self, ErrorCollector, HarnessConfig, NativeEngine};
//! use wasm_module_runner::parser::module::{Origin, ValueType::I32};
//! use wasm_module_runner::runtime::Value;
//!
//! let bytes = ModuleBuilder::new()
//!     // local.get 0  local.get 1  i32.sub
//!     .function(&[I32, I32], &[I32], &[], &[0x20, 0x00, 0x20, 0x01, 0x6b, 0x0b])
//!     .export_function("main", 0)
//!     .build();
//!
//! let mut errors = ErrorCollector::new();
//! let module =
//!     harness::decode_module_for_testing(&NativeEngine, &bytes, Origin::Wasm, &mut errors)
//!         .unwrap();
//! let result = harness::interpret_module(
//!     &NativeEngine,
//!     &HarnessConfig::default(),
//!     &mut errors,
//!     &module,
//!     0,
//!     &[Value::I32(50), Value::I32(8)],
//! );
//! assert_eq!(result, 42);
//! ```

pub mod compiler;
pub mod encoder;
pub mod harness;
pub mod host;
pub mod parser;
pub mod runtime;
