//! Compiled execution path

use super::config::HarnessConfig;
use super::engine::{Compile, Decode, NativeEngine};
use super::errors::{ErrorCollector, HarnessError, ResolutionFailure};
use super::outcome::{RunOutcome, RunReport};
use super::{check_module_constraints, decode_module_for_testing};
use crate::host::{HostObject, HostValue};
use crate::parser::module::{Module, Origin};
use log::{debug, trace};

/// Compiles and instantiates `module` with the default configuration.
pub fn instantiate_module_for_testing(
    engine: &impl Compile,
    module: &Module,
    errors: &mut ErrorCollector,
) -> Option<HostObject> {
    instantiate_module_with(engine, &HarnessConfig::default(), module, errors)
}

/// Compiles `module` and instantiates it without imports or a buffer.
pub fn instantiate_module_with(
    engine: &impl Compile,
    config: &HarnessConfig,
    module: &Module,
    errors: &mut ErrorCollector,
) -> Option<HostObject> {
    if errors.has_error() || !check_module_constraints(module, errors) {
        return None;
    }

    debug!("compiling {} functions", module.functions.len());
    let compiled = match engine.compile(module, config.execution_limits()) {
        Ok(compiled) => compiled,
        Err(e) => {
            errors.record(HarnessError::Compile(e));
            return None;
        }
    };

    debug!("instantiating");
    match compiled.instantiate(None, None) {
        Ok(instance) => Some(instance),
        Err(e) => {
            errors.record(HarnessError::Instantiation(e));
            None
        }
    }
}

/// Calls the export `name` of `instance` and returns the harness integer.
pub fn call_function_for_testing(
    instance: &HostObject,
    errors: &mut ErrorCollector,
    name: &str,
    args: &[HostValue],
    origin: Origin,
) -> i32 {
    call_function_outcome(instance, errors, name, args, origin).to_sentinel()
}

/// Like [`call_function_for_testing`], returning the outcome.
///
/// Asm.js instances carry their exports directly; other instances carry
/// them in their `exports` property. A trap surfaces as an exception and
/// is reported as a failed invocation.
pub fn call_function_outcome(
    instance: &HostObject,
    errors: &mut ErrorCollector,
    name: &str,
    args: &[HostValue],
    origin: Origin,
) -> RunOutcome {
    if errors.has_error() {
        return RunOutcome::Failed;
    }

    let exports = if origin.is_asm_js() {
        Some(instance.clone())
    } else {
        instance.get("exports").and_then(|e| e.as_object().cloned())
    };
    let Some(function) = exports.and_then(|exports| exports.get(name)) else {
        errors.record(HarnessError::Resolution {
            name: name.to_string(),
            failure: ResolutionFailure::Missing,
        });
        return RunOutcome::Failed;
    };
    if !function.is_callable() {
        errors.record(HarnessError::Resolution {
            name: name.to_string(),
            failure: ResolutionFailure::NotCallable(function.type_name()),
        });
        return RunOutcome::Failed;
    }

    trace!("calling {name} with {} args", args.len());
    match function.call(args) {
        Ok(HostValue::Smi(v)) => RunOutcome::Value(v),
        Ok(HostValue::HeapNumber(n)) => RunOutcome::Value(n as i32),
        Ok(other) => {
            errors.record(HarnessError::ResultType(other.type_name()));
            RunOutcome::Failed
        }
        Err(e) => {
            errors.record(HarnessError::Invocation(e));
            RunOutcome::Failed
        }
    }
}

/// Decodes and runs a module on the compiled path: the entry function is
/// `caller` for asm.js and `main` otherwise, called without arguments.
pub fn compile_and_run(bytes: &[u8], asm_js: bool) -> i32 {
    compile_and_run_with(
        &NativeEngine,
        &HarnessConfig::default(),
        bytes,
        Origin::from_asm_js_flag(asm_js),
    )
    .to_sentinel()
}

pub fn compile_and_run_with<E>(
    engine: &E,
    config: &HarnessConfig,
    bytes: &[u8],
    origin: Origin,
) -> RunReport
where
    E: Decode + Compile,
{
    let mut errors = ErrorCollector::new();
    let outcome =
        run_entry(engine, config, bytes, origin, &mut errors).unwrap_or(RunOutcome::Failed);
    debug!("compile and run: {outcome}");
    RunReport {
        outcome,
        errors: errors.into_report(),
    }
}

fn run_entry<E>(
    engine: &E,
    config: &HarnessConfig,
    bytes: &[u8],
    origin: Origin,
    errors: &mut ErrorCollector,
) -> Option<RunOutcome>
where
    E: Decode + Compile,
{
    let module = decode_module_for_testing(engine, bytes, origin, errors)?;
    let instance = instantiate_module_with(engine, config, &module, errors)?;
    Some(call_function_outcome(
        &instance,
        errors,
        origin.entry_name(),
        &[],
        origin,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileError, CompiledModule, ExecutionLimits};
    use crate::encoder::ModuleBuilder;
    use crate::host::HostFunction;
    use crate::parser::module::ValueType::*;
    use crate::parser::validate::{VerificationError, VerificationErrorKind};
    use crate::parser::DecodeError;

    fn run_default(bytes: &[u8], origin: Origin) -> RunReport {
        compile_and_run_with(&NativeEngine, &HarnessConfig::default(), bytes, origin)
    }

    #[test]
    fn test_compile_and_run_main() {
        let bytes = ModuleBuilder::new()
            .function(&[], &[I32], &[], &[0x41, 0x07, 0x0b])
            .export_function("main", 0)
            .build();
        assert_eq!(compile_and_run(&bytes, false), 7);
        // asm.js looks for "caller"
        let report = run_default(&bytes, Origin::AsmJs);
        assert_eq!(report.outcome, RunOutcome::Failed);
        assert!(matches!(
            report.errors.first(),
            Some(HarnessError::Resolution {
                failure: ResolutionFailure::Missing,
                ..
            })
        ));
    }

    #[test]
    fn test_float_result_truncates() {
        // f64.const -2.75
        let mut body = vec![0x44];
        body.extend_from_slice(&(-2.75f64).to_le_bytes());
        body.push(0x0b);
        let bytes = ModuleBuilder::new()
            .function(&[], &[F64], &[], &body)
            .export_function("caller", 0)
            .build();
        assert_eq!(compile_and_run(&bytes, true), -2);
    }

    #[test]
    fn test_trap_is_invocation_error() {
        let bytes = ModuleBuilder::new()
            .function(&[], &[I32], &[], &[0x00, 0x0b])
            .export_function("main", 0)
            .build();
        let report = run_default(&bytes, Origin::Wasm);
        assert_eq!(report.to_sentinel(), -1);
        assert!(matches!(report.errors.first(), Some(HarnessError::Invocation(_))));
    }

    #[test]
    fn test_void_result_is_result_type_error() {
        let bytes = ModuleBuilder::new()
            .function(&[], &[], &[], &[0x0b])
            .export_function("main", 0)
            .build();
        let report = run_default(&bytes, Origin::Wasm);
        assert_eq!(report.errors.first(), Some(&HarnessError::ResultType("undefined")));
    }

    #[test]
    fn test_not_callable_export() {
        let instance = HostObject::new();
        let exports = HostObject::new();
        exports.set("main", HostValue::Smi(3));
        instance.set("exports", HostValue::Object(exports));
        let mut errors = ErrorCollector::new();
        let result = call_function_for_testing(&instance, &mut errors, "main", &[], Origin::Wasm);
        assert_eq!(result, -1);
        assert_eq!(
            errors.first(),
            Some(&HarnessError::Resolution {
                name: "main".to_string(),
                failure: ResolutionFailure::NotCallable("number"),
            })
        );
    }

    #[test]
    fn test_call_with_arguments() {
        let instance = HostObject::new();
        instance.set(
            "caller",
            HostValue::Function(HostFunction::new("caller", 2, |args| {
                Ok(HostValue::from_number(args[0].to_number() - args[1].to_number()))
            })),
        );
        let mut errors = ErrorCollector::new();
        let args = [HostValue::Smi(10), HostValue::HeapNumber(0.5)];
        // 9.5 truncates toward zero
        let result =
            call_function_for_testing(&instance, &mut errors, "caller", &args, Origin::AsmJs);
        assert_eq!(result, 9);
        assert!(!errors.has_error());
    }

    #[test]
    fn test_infinite_loop_ends_with_default_config() {
        // loop br 0 end unreachable
        let bytes = ModuleBuilder::new()
            .function(&[], &[I32], &[], &[0x03, 0x40, 0x0c, 0x00, 0x0b, 0x00, 0x0b])
            .export_function("main", 0)
            .build();
        assert_eq!(compile_and_run(&bytes, false), -1);
        let report = run_default(&bytes, Origin::Wasm);
        let message = report.errors.first().unwrap().to_string();
        assert!(message.contains("ran out of fuel"), "{message}");
    }

    #[test]
    fn test_deep_recursion_raises_range_error() {
        // main() = main()
        let bytes = ModuleBuilder::new()
            .function(&[], &[I32], &[], &[0x10, 0x00, 0x0b])
            .export_function("main", 0)
            .build();
        let config = HarnessConfig {
            max_call_depth: 100_000,
            ..HarnessConfig::default()
        };
        let report = compile_and_run_with(&NativeEngine, &config, &bytes, Origin::Wasm);
        assert_eq!(report.to_sentinel(), -1);
        let message = report.errors.first().unwrap().to_string();
        assert!(message.contains("RangeError: Maximum call stack size exceeded"), "{message}");
    }

    struct BrokenCompiler;

    impl Decode for BrokenCompiler {
        fn decode(&self, bytes: &[u8], origin: Origin) -> Result<Module, DecodeError> {
            NativeEngine.decode(bytes, origin)
        }
    }

    impl Compile for BrokenCompiler {
        fn compile(
            &self,
            _module: &Module,
            _limits: ExecutionLimits,
        ) -> Result<CompiledModule, CompileError> {
            Err(CompileError::Verification(VerificationError {
                function_index: 0,
                offset: 0,
                kind: VerificationErrorKind::MissingEnd,
            }))
        }
    }

    #[test]
    fn test_compile_failure_is_recorded_once() {
        let bytes = ModuleBuilder::new()
            .function(&[], &[I32], &[], &[0x41, 0x07, 0x0b])
            .export_function("main", 0)
            .build();
        let config = HarnessConfig::default();
        let report = compile_and_run_with(&BrokenCompiler, &config, &bytes, Origin::Wasm);
        assert_eq!(report.outcome, RunOutcome::Failed);
        assert_eq!(report.errors.errors.len(), 1);
        assert!(matches!(report.errors.first(), Some(HarnessError::Compile(_))));
    }

    #[test]
    fn test_decode_failure() {
        let report = run_default(b"\0asm\x02\0\0\0", Origin::Wasm);
        assert_eq!(report.to_sentinel(), -1);
        assert!(matches!(report.errors.first(), Some(HarnessError::Decode(_))));
    }
}
