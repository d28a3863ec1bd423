//! Method dispatch and the per-call-site cache
//!
//! Four variants cross {raise-on-missing, return-failure} with
//! {normal override resolution, direct}. `CallSite` memoizes a resolved
//! `(program id, entry point)` binding; the binding is used only when the
//! receiver's program id matches, so reusing a call site against an
//! instance of a different blueprint re-resolves instead of dispatching
//! through a stale binding.

use crate::context::Context;
use crate::error::{LwError, LwResult};
use crate::instance::LwoRef;
use crate::program::MethodFn;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;

fn missing(lwo: &LwoRef, name: &str) -> LwError {
    LwError::MethodNotFound {
        path: lwo.load_name().to_string(),
        name: name.to_string(),
    }
}

fn resolve(lwo: &LwoRef, name: &str, direct: bool) -> Option<MethodFn> {
    let program = lwo.program();
    let entry = if direct {
        program.lookup_direct(name)
    } else {
        program.lookup(name)
    };
    entry.map(|e| e.func.clone())
}

/// Strict dispatch with override resolution
pub fn call_strict(ctx: &Context, lwo: &LwoRef, name: &str, args: &[Value]) -> LwResult<Value> {
    match resolve(lwo, name, false) {
        Some(func) => func(ctx, lwo, args),
        None => Err(missing(lwo, name)),
    }
}

/// Non-strict dispatch with override resolution; `None` when missing
pub fn call_other(
    ctx: &Context,
    lwo: &LwoRef,
    name: &str,
    args: &[Value],
) -> LwResult<Option<Value>> {
    match resolve(lwo, name, false) {
        Some(func) => func(ctx, lwo, args).map(Some),
        None => Ok(None),
    }
}

/// Strict dispatch restricted to methods the blueprint defines itself
pub fn call_direct_strict(
    ctx: &Context,
    lwo: &LwoRef,
    name: &str,
    args: &[Value],
) -> LwResult<Value> {
    match resolve(lwo, name, true) {
        Some(func) => func(ctx, lwo, args),
        None => Err(missing(lwo, name)),
    }
}

/// Non-strict direct dispatch; `None` when missing
pub fn call_direct(
    ctx: &Context,
    lwo: &LwoRef,
    name: &str,
    args: &[Value],
) -> LwResult<Option<Value>> {
    match resolve(lwo, name, true) {
        Some(func) => func(ctx, lwo, args).map(Some),
        None => Ok(None),
    }
}

/// A reusable call site with a cached method resolution
///
/// The cache is keyed by program identity, not by instance, so every
/// instance of one blueprint shares the cached binding.
pub struct CallSite {
    name: Arc<str>,
    cached: Mutex<Option<(u64, MethodFn)>>,
}

impl CallSite {
    /// Create a call site for a method name
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            cached: Mutex::new(None),
        }
    }

    /// The method name this site dispatches
    pub fn name(&self) -> &str {
        &self.name
    }

    fn resolve_cached(&self, lwo: &LwoRef) -> Option<MethodFn> {
        let program_id = lwo.program().id();
        let mut slot = self.cached.lock();
        if let Some((id, func)) = slot.as_ref() {
            if *id == program_id {
                return Some(func.clone());
            }
        }
        match lwo.program().lookup(&self.name) {
            Some(entry) => {
                let func = entry.func.clone();
                *slot = Some((program_id, func.clone()));
                Some(func)
            }
            None => {
                *slot = None;
                None
            }
        }
    }

    /// Strict call through the cache
    pub fn call(&self, ctx: &Context, lwo: &LwoRef, args: &[Value]) -> LwResult<Value> {
        match self.resolve_cached(lwo) {
            Some(func) => func(ctx, lwo, args),
            None => Err(missing(lwo, &self.name)),
        }
    }

    /// Non-strict call through the cache; `None` when missing
    pub fn try_call(&self, ctx: &Context, lwo: &LwoRef, args: &[Value]) -> LwResult<Option<Value>> {
        match self.resolve_cached(lwo) {
            Some(func) => func(ctx, lwo, args).map(Some),
            None => Ok(None),
        }
    }
}

/// Apply one call across every element of an array of instances
///
/// Results are collected positionally; non-instances and missing methods
/// yield the zero value. One call site (and therefore one cache) serves
/// the whole sweep.
pub fn broadcast(
    ctx: &Context,
    targets: &[Value],
    name: &str,
    args: &[Value],
) -> LwResult<Vec<Value>> {
    let site = CallSite::new(name);
    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        match target {
            Value::Lwo(lwo) => {
                let result = site.try_call(ctx, lwo, args)?.unwrap_or_default();
                results.push(result);
            }
            _ => results.push(Value::zero()),
        }
    }
    Ok(results)
}
