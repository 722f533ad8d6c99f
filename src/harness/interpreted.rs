//! Interpreted execution path

use super::config::HarnessConfig;
use super::engine::Verify;
use super::errors::{ErrorCollector, HarnessError};
use super::outcome::RunOutcome;
use super::check_module_constraints;
use crate::parser::module::Module;
use crate::parser::validate::FunctionBody;
use crate::runtime::{Instance, Interpreter, ThreadState, Value};
use log::debug;

/// Interprets one function of `module` and returns the harness integer.
///
/// # Panics
/// If `function_index` is not a function of `module`.
pub fn interpret_module(
    engine: &impl Verify,
    config: &HarnessConfig,
    errors: &mut ErrorCollector,
    module: &Module,
    function_index: u32,
    args: &[Value],
) -> i32 {
    interpret_module_outcome(engine, config, errors, module, function_index, args).to_sentinel()
}

/// Like [`interpret_module`], keeping traps and failures apart.
///
/// The function runs against a minimal instance: memory has its declared
/// size but no storage and there are no globals, so any load, store or
/// global access traps. Callees are verified by `engine` on their first
/// call.
pub fn interpret_module_outcome(
    engine: &impl Verify,
    config: &HarnessConfig,
    errors: &mut ErrorCollector,
    module: &Module,
    function_index: u32,
    args: &[Value],
) -> RunOutcome {
    if errors.has_error() || !check_module_constraints(module, errors) {
        return RunOutcome::Failed;
    }

    let instance = Instance::minimal(module);
    let Some(body) = FunctionBody::of(module, function_index) else {
        panic!(
            "function index {function_index} out of range for a module with {} functions",
            module.functions.len()
        );
    };
    let code = match engine.verify(&instance.env, &body) {
        Ok(code) => code,
        Err(e) => {
            errors.record(HarnessError::Verification(e));
            return RunOutcome::Failed;
        }
    };

    let mut interpreter = Interpreter::new(instance)
        .with_step_budget(config.step_budget)
        .with_max_call_depth(config.max_call_depth)
        .with_verifier(|env, body| engine.verify(env, body));
    interpreter.install_code(code);
    interpreter.reset();
    if let Err(e) = interpreter.push_frame(function_index, args) {
        errors.record(HarnessError::ArgumentMismatch(e));
        return RunOutcome::Failed;
    }

    debug!("interpreting function {function_index} with {} args", args.len());
    match interpreter.run() {
        ThreadState::Finished => match interpreter.thread().result() {
            Some(value) => RunOutcome::Value(value.truncate_to_i32()),
            None => {
                errors.record(HarnessError::ResultType("undefined"));
                RunOutcome::Failed
            }
        },
        ThreadState::Trapped => {
            if let Some(reason) = interpreter.thread().trap_reason() {
                debug!("function {function_index} trapped: {reason}");
            }
            RunOutcome::Trapped
        }
        _ => {
            errors.record(HarnessError::BudgetExhausted {
                steps: interpreter.thread().steps(),
            });
            RunOutcome::Failed
        }
    }
}
