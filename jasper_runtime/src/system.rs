//! The platform abstraction for native calls.
//!
//! The interpreter core marshals arguments and types; the `System` is
//! what actually transfers control into native code. A production system
//! backs this with a dynamic loader and a calling-convention trampoline;
//! the bundled [`HostSystem`] backs it with an in-process symbol registry
//! so natives can be written in Rust and exercised directly.

use crate::method::MethodRef;
use jasper_core::NativeType;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// Opaque pointer handed to native code as its environment argument; it
/// is the calling interpreter thread.
#[derive(Debug, Clone, Copy)]
pub struct NativeEnv(pub *mut ());

// The environment pointer is only dereferenced by the thread that created
// it; natives on other threads treat it as opaque.
unsafe impl Send for NativeEnv {}
unsafe impl Sync for NativeEnv {}

/// Direct-path native: flat word arguments, called without leaving the
/// active thread state.
pub type FastNativeFn = fn(env: NativeEnv, method: MethodRef, args: &[usize]) -> u64;

/// A resolved native entry point.
#[derive(Clone)]
pub enum NativeFunction {
    /// Called through [`System::call`] with marshalled, indirected
    /// arguments.
    Slow(Arc<dyn Fn(&[usize]) -> u64 + Send + Sync>),
    /// Called directly.
    Fast(FastNativeFn),
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeFunction::Slow(_) => f.write_str("NativeFunction::Slow"),
            NativeFunction::Fast(_) => f.write_str("NativeFunction::Fast"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SystemError {
    #[error("library not found: {0}")]
    LibraryNotFound(Arc<str>),
}

/// Platform services the core depends on.
pub trait System: Send + Sync {
    /// Make a library's symbols available to [`System::resolve`].
    fn load(&self, name: &str) -> Result<(), SystemError>;

    /// Look up a native symbol.
    fn resolve(&self, symbol: &str) -> Option<NativeFunction>;

    /// Invoke `function` with the marshalled argument table. `types` has
    /// one entry per argument in calling-convention order, `argc` counts
    /// them, `arg_table_size` is the padded byte size of the argument
    /// table under the platform ABI, and `return_type` selects how the
    /// 64-bit result is interpreted.
    fn call(
        &self,
        function: &NativeFunction,
        args: &[usize],
        types: &[NativeType],
        argc: usize,
        arg_table_size: usize,
        return_type: NativeType,
    ) -> u64;
}

/// In-process system: a symbol registry of Rust closures.
#[derive(Default)]
pub struct HostSystem {
    symbols: RwLock<FxHashMap<Arc<str>, NativeFunction>>,
}

impl HostSystem {
    pub fn new() -> HostSystem {
        HostSystem::default()
    }

    /// Register a slow-path native under its mangled symbol name.
    pub fn register(
        &self,
        symbol: &str,
        function: impl Fn(&[usize]) -> u64 + Send + Sync + 'static,
    ) {
        self.symbols
            .write()
            .insert(Arc::from(symbol), NativeFunction::Slow(Arc::new(function)));
    }

    /// Register a fast-path native under its mangled symbol name.
    pub fn register_fast(&self, symbol: &str, function: FastNativeFn) {
        self.symbols
            .write()
            .insert(Arc::from(symbol), NativeFunction::Fast(function));
    }
}

impl System for HostSystem {
    fn load(&self, _name: &str) -> Result<(), SystemError> {
        // All registered symbols are always visible.
        Ok(())
    }

    fn resolve(&self, symbol: &str) -> Option<NativeFunction> {
        self.symbols.read().get(symbol).cloned()
    }

    fn call(
        &self,
        function: &NativeFunction,
        args: &[usize],
        _types: &[NativeType],
        _argc: usize,
        _arg_table_size: usize,
        _return_type: NativeType,
    ) -> u64 {
        match function {
            NativeFunction::Slow(f) => f(args),
            NativeFunction::Fast(_) => {
                unreachable!("fast natives are invoked directly, not trampolined")
            }
        }
    }
}
