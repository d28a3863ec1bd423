//! Shallow and deep copying of instances and value graphs
//!
//! Deep copy walks the graph with a visited map keyed on the identity of
//! the original referent, so each distinct referent is duplicated exactly
//! once: two references to one shared sub-structure stay shared in the
//! copy, and cycles terminate. Copy hooks run once per new instance after
//! the whole graph is built.

use crate::context::Context;
use crate::error::{LwError, LwResult};
use crate::instance::LwoRef;
use crate::value::{ArrayRef, MappingRef, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Shallow copy: slot vector cloned, nested referents shared
pub fn copy_instance(ctx: &Context, orig: &LwoRef) -> LwResult<LwoRef> {
    let lwo = ctx.alloc_instance(orig.program())?;
    lwo.replace_vars(orig.snapshot_vars());
    if let Err(e) = ctx.run_hook(ctx.copy_hook(), &lwo, &[]) {
        ctx.discard(&lwo);
        return Err(LwError::Copy(e.to_string()));
    }
    Ok(lwo)
}

/// Deep copy a value graph
pub fn deep_copy(ctx: &Context, value: &Value) -> LwResult<Value> {
    let mut seen: FxHashMap<usize, Value> = FxHashMap::default();
    let mut created: Vec<LwoRef> = Vec::new();

    let result = walk(ctx, value, &mut seen, &mut created);
    let copied = match result {
        Ok(copied) => copied,
        Err(e) => {
            for lwo in &created {
                ctx.discard(lwo);
            }
            return Err(e);
        }
    };

    // Hooks fire only after the whole graph exists, once per new instance.
    let hook = ctx.copy_hook();
    for lwo in &created {
        if let Err(e) = ctx.run_hook(hook.clone(), lwo, &[]) {
            for l in &created {
                ctx.discard(l);
            }
            return Err(LwError::Copy(e.to_string()));
        }
    }
    Ok(copied)
}

fn walk(
    ctx: &Context,
    value: &Value,
    seen: &mut FxHashMap<usize, Value>,
    created: &mut Vec<LwoRef>,
) -> LwResult<Value> {
    let key = match value.identity() {
        Some(key) => key,
        None => return Ok(value.clone()),
    };
    if let Some(copied) = seen.get(&key) {
        return Ok(copied.clone());
    }

    match value {
        Value::Array(orig) => {
            let fresh: ArrayRef = Arc::new(RwLock::new(Vec::new()));
            // Registered before recursing so cycles resolve to the copy.
            seen.insert(key, Value::Array(fresh.clone()));
            let items = orig.read().clone();
            for item in &items {
                let copied = walk(ctx, item, seen, created)?;
                fresh.write().push(copied);
            }
            Ok(Value::Array(fresh))
        }
        Value::Mapping(orig) => {
            let fresh: MappingRef = Arc::new(RwLock::new(FxHashMap::default()));
            seen.insert(key, Value::Mapping(fresh.clone()));
            let pairs: Vec<_> = orig
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (k, v) in pairs {
                let copied = walk(ctx, &v, seen, created)?;
                fresh.write().insert(k, copied);
            }
            Ok(Value::Mapping(fresh))
        }
        Value::Lwo(orig) => {
            let lwo = ctx.alloc_instance(orig.program())?;
            seen.insert(key, Value::Lwo(lwo.clone()));
            created.push(lwo.clone());
            let vars = orig.snapshot_vars();
            let mut copied_vars = Vec::with_capacity(vars.len());
            for var in &vars {
                copied_vars.push(walk(ctx, var, seen, created)?);
            }
            lwo.replace_vars(copied_vars);
            Ok(Value::Lwo(lwo))
        }
        _ => unreachable!("scalars have no identity"),
    }
}
