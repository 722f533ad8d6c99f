//! Engine capabilities the harness runs modules through
//!
//! The harness only sees these traits. [`NativeEngine`] implements them on
//! the crate's own decoder, verifier and closure compiler; tests substitute
//! their own engines to drive failure paths.

use crate::compiler::{self, CompileError, CompiledModule, ExecutionLimits};
use crate::parser::module::{Module, Origin};
use crate::parser::validate::{verify_function, FunctionBody, VerificationError};
use crate::parser::{self, DecodeError};
use crate::runtime::code::Code;
use crate::runtime::ModuleEnv;

pub trait Decode {
    /// Decodes a module without verifying function bodies.
    fn decode(&self, bytes: &[u8], origin: Origin) -> Result<Module, DecodeError>;
}

pub trait Verify {
    fn verify(&self, env: &ModuleEnv, body: &FunctionBody) -> Result<Code, VerificationError>;
}

pub trait Compile {
    /// Verifies and compiles every function of `module`.
    fn compile(
        &self,
        module: &Module,
        limits: ExecutionLimits,
    ) -> Result<CompiledModule, CompileError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl Decode for NativeEngine {
    fn decode(&self, bytes: &[u8], origin: Origin) -> Result<Module, DecodeError> {
        parser::decode(bytes, origin)
    }
}

impl Verify for NativeEngine {
    fn verify(&self, env: &ModuleEnv, body: &FunctionBody) -> Result<Code, VerificationError> {
        verify_function(env, body)
    }
}

impl Compile for NativeEngine {
    fn compile(
        &self,
        module: &Module,
        limits: ExecutionLimits,
    ) -> Result<CompiledModule, CompileError> {
        compiler::compile_with(module, limits)
    }
}
