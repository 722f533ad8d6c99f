//! Test harness: decode, check, execute, extract
//!
//! Runs a module through one of two strategies and reduces the result to an
//! `i32`:
//!
//! ```text
//!  bytes ─▶ decode_module_for_testing ─▶ check_module_constraints
//!                                                   │
//!                               ┌───────────────────┴───────────────────┐
//!                               ▼                                       ▼
//!                         compiled path                         interpreted path
//!                               └───────────────────┬───────────────────┘
//!                                                   ▼
//!                                                  i32
//! ```
//!
//! Every stage takes the invocation's [`ErrorCollector`] and does nothing if
//! an earlier stage already recorded an error. A computed value is returned
//! as is; the interpreted path returns [`TRAP_SENTINEL`] for a trap; every
//! other failure returns [`FAILURE_SENTINEL`] with the reason in the
//! collector.
//!
//! # Example
//!
//! ```
//! use wasm_module_runner::encoder::ModuleBuilder;
//! use wasm_module_runner::harness::compile_and_run;
//! use wasm_module_runner::parser::module::ValueType;
//!
//! let bytes = ModuleBuilder::new()
//!     .function(&[], &[ValueType::I32], &[], &[0x41, 0x2a, 0x0b]) // i32.const 42
//!     .export_function("main", 0)
//!     .build();
//! assert_eq!(compile_and_run(&bytes, false), 42);
//! ```

mod compiled;
pub mod config;
pub mod engine;
pub mod errors;
mod interpreted;
pub mod outcome;

pub use compiled::{
    call_function_for_testing, call_function_outcome, compile_and_run, compile_and_run_with,
    instantiate_module_for_testing, instantiate_module_with,
};
pub use config::{ConfigError, HarnessConfig};
pub use engine::{Compile, Decode, NativeEngine, Verify};
pub use errors::{ErrorCollector, ErrorReport, HarnessError, ResolutionFailure, Unsupported};
pub use interpreted::{interpret_module, interpret_module_outcome};
pub use outcome::{RunOutcome, RunReport, FAILURE_SENTINEL, TRAP_SENTINEL};

use crate::parser::module::{Module, Origin};
use log::debug;

/// Decodes `bytes`, recording the decoder's diagnostic on failure.
pub fn decode_module_for_testing(
    engine: &impl Decode,
    bytes: &[u8],
    origin: Origin,
    errors: &mut ErrorCollector,
) -> Option<Module> {
    if errors.has_error() {
        return None;
    }
    debug!("decoding {} bytes as {origin}", bytes.len());
    match engine.decode(bytes, origin) {
        Ok(module) => Some(module),
        Err(e) => {
            errors.record(HarnessError::Decode(e));
            None
        }
    }
}

/// Refuses modules with imports or without exports. Both problems are
/// recorded when both apply.
pub fn check_module_constraints(module: &Module, errors: &mut ErrorCollector) -> bool {
    if !module.imports.is_empty() {
        errors.record(HarnessError::UnsupportedModule(Unsupported::HasImports));
    }
    if module.exports.is_empty() {
        errors.record(HarnessError::UnsupportedModule(Unsupported::NoExports));
    }
    !errors.has_error()
}

/// Bytes of linear memory the module declares at minimum.
pub fn min_module_mem_size(module: &Module) -> u32 {
    module.min_mem_size()
}
