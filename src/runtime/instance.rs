//! Module environment and the interpreter's minimal instance

use super::{LinearMemory, TrapReason, Value};
use crate::parser::module::{ConstExpr, FunctionType, GlobalType, Module, Origin};
use crate::runtime::ops::ArithmeticMode;

/// Read-only view of a module that verification and execution consult.
#[derive(Debug, Clone)]
pub struct ModuleEnv<'a> {
    pub module: &'a Module,
    pub origin: Origin,
    globals: Vec<GlobalType>,
}

impl<'a> ModuleEnv<'a> {
    pub fn new(module: &'a Module) -> ModuleEnv<'a> {
        ModuleEnv {
            module,
            origin: module.origin,
            globals: module.global_types(),
        }
    }

    pub fn function_sig(&self, function_index: u32) -> Option<&'a FunctionType> {
        self.module
            .functions
            .get(function_index as usize)
            .map(|f| &f.sig)
    }

    pub fn global_type(&self, global_index: u32) -> Option<GlobalType> {
        self.globals.get(global_index as usize).copied()
    }

    pub fn has_memory(&self) -> bool {
        self.module.has_memory()
    }

    pub fn arithmetic_mode(&self) -> ArithmeticMode {
        ArithmeticMode::for_origin(self.origin)
    }
}

/// Runtime binding of a module to memory and globals for one invocation.
///
/// Does not own the module. The interpreted path builds it with
/// [`Instance::minimal`]: memory has its declared size but no storage and
/// there is no globals store, so loads, stores and global accesses trap.
#[derive(Debug)]
pub struct Instance<'a> {
    pub env: ModuleEnv<'a>,
    pub memory: LinearMemory,
    pub globals: Option<Vec<Value>>,
}

impl<'a> Instance<'a> {
    pub fn minimal(module: &'a Module) -> Instance<'a> {
        Instance {
            env: ModuleEnv::new(module),
            memory: LinearMemory::without_backing(module.min_mem_pages()),
            globals: None,
        }
    }

    pub fn module(&self) -> &'a Module {
        self.env.module
    }

    pub fn global_get(&self, index: u32) -> Result<Value, TrapReason> {
        let globals = self.globals.as_ref().ok_or(TrapReason::GlobalsUnavailable)?;
        globals
            .get(index as usize)
            .copied()
            .ok_or(TrapReason::InvalidGlobal(index))
    }

    pub fn global_set(&mut self, index: u32, value: Value) -> Result<(), TrapReason> {
        let globals = self.globals.as_mut().ok_or(TrapReason::GlobalsUnavailable)?;
        let slot = globals
            .get_mut(index as usize)
            .ok_or(TrapReason::InvalidGlobal(index))?;
        *slot = value;
        Ok(())
    }
}

/// Evaluates an initialiser against the globals initialised so far.
pub fn eval_const(expr: &ConstExpr, globals: &[Value]) -> Result<Value, TrapReason> {
    match *expr {
        ConstExpr::I32(v) => Ok(Value::I32(v)),
        ConstExpr::I64(v) => Ok(Value::I64(v)),
        ConstExpr::F32(v) => Ok(Value::F32(v)),
        ConstExpr::F64(v) => Ok(Value::F64(v)),
        ConstExpr::GlobalGet(index) => globals
            .get(index as usize)
            .copied()
            .ok_or(TrapReason::InvalidGlobal(index)),
    }
}
