//! Harness error taxonomy and the per-invocation error accumulator

use crate::compiler::{CompileError, InstantiationError};
use crate::host::HostException;
use crate::parser::validate::VerificationError;
use crate::parser::DecodeError;
use crate::runtime::interpreter::FrameError;
use log::warn;
use std::fmt;

/// Why a module is refused before it is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    HasImports,
    NoExports,
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsupported::HasImports => write!(f, "module has imports."),
            Unsupported::NoExports => write!(f, "module has no exports."),
        }
    }
}

/// Why an entry function could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    Missing,
    NotCallable(&'static str),
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionFailure::Missing => write!(f, "no such export"),
            ResolutionFailure::NotCallable(type_name) => write!(f, "{type_name} is not a function"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HarnessError {
    #[error("WASM.compileRun() failed: {0}")]
    Decode(DecodeError),
    #[error("Not supported: {0}")]
    UnsupportedModule(Unsupported),
    #[error("Function did not verify: {0}")]
    Verification(VerificationError),
    #[error("WASM.compileRun() failed: {0}")]
    Compile(CompileError),
    #[error("WASM.compileRun() failed: instantiation: {0}")]
    Instantiation(InstantiationError),
    #[error("Interpreter did not finish execution within its step bound ({steps} steps)")]
    BudgetExhausted { steps: u64 },
    #[error("WASM.compileRun() failed: cannot resolve {name:?}: {failure}")]
    Resolution { name: String, failure: ResolutionFailure },
    #[error("WASM.compileRun() failed: Invocation was null: {0}")]
    Invocation(HostException),
    #[error("WASM.compileRun() failed: Return value should be number, got {0}")]
    ResultType(&'static str),
    #[error("argument mismatch: {0}")]
    ArgumentMismatch(FrameError),
}

/// Records errors for one pipeline invocation. The first error recorded is
/// the primary diagnostic; stages check [`ErrorCollector::has_error`] and
/// stop once it is set.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<HarnessError>,
}

impl ErrorCollector {
    pub fn new() -> ErrorCollector {
        ErrorCollector::default()
    }

    pub fn record(&mut self, error: HarnessError) {
        warn!("{error}");
        self.errors.push(error);
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn first(&self) -> Option<&HarnessError> {
        self.errors.first()
    }

    pub fn errors(&self) -> &[HarnessError] {
        &self.errors
    }

    pub fn into_report(self) -> ErrorReport {
        ErrorReport { errors: self.errors }
    }
}

/// The errors of a finished invocation, in the order they were recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorReport {
    pub errors: Vec<HarnessError>,
}

impl ErrorReport {
    pub fn first(&self) -> Option<&HarnessError> {
        self.errors.first()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_keeps_order() {
        let mut errors = ErrorCollector::new();
        assert!(!errors.has_error());
        errors.record(HarnessError::UnsupportedModule(Unsupported::HasImports));
        errors.record(HarnessError::UnsupportedModule(Unsupported::NoExports));
        assert!(errors.has_error());
        assert_eq!(errors.first().unwrap().to_string(), "Not supported: module has imports.");

        let report = errors.into_report();
        assert_eq!(report.errors.len(), 2);
        assert_eq!(
            report.to_string(),
            "Not supported: module has imports.\nNot supported: module has no exports."
        );
    }

    #[test]
    fn test_messages() {
        let e = HarnessError::Resolution {
            name: "main".to_string(),
            failure: ResolutionFailure::NotCallable("number"),
        };
        assert_eq!(
            e.to_string(),
            "WASM.compileRun() failed: cannot resolve \"main\": number is not a function"
        );
        assert_eq!(
            HarnessError::ResultType("undefined").to_string(),
            "WASM.compileRun() failed: Return value should be number, got undefined"
        );
    }
}
