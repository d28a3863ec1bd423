#![allow(dead_code)]

//! Shared fixtures: a loader with a handful of small blueprints

use lumen_core::{
    Context, LwError, LwResult, Program, ProgramBuilder, ProgramLoader, ProgramRegistry, Value,
};
use std::sync::Arc;

/// Loader compiling the fixture blueprints on demand
pub struct TestLoader;

impl ProgramLoader for TestLoader {
    fn load(&self, path: &str, registry: &ProgramRegistry) -> LwResult<Arc<Program>> {
        match path {
            "/lwo/stack" => Ok(stack_program()),
            "/lwo/cell" => Ok(cell_program()),
            "/lwo/counted_stack" => {
                let base = registry.resolve("/lwo/stack")?;
                Ok(counted_stack_program(base))
            }
            "/lwo/err_create" => Ok(ProgramBuilder::new("/lwo/err_create")
                .method("create", |_, _, _| {
                    Err(LwError::Runtime("create() failed".to_string()))
                })
                .build()),
            "/lwo/err_copy" => Ok(ProgramBuilder::new("/lwo/err_copy")
                .var("value")
                .method("copied", |_, _, _| {
                    Err(LwError::Runtime("copied() failed".to_string()))
                })
                .build()),
            "/lwo/err_restore" => Ok(ProgramBuilder::new("/lwo/err_restore")
                .var("value")
                .method("restored", |_, _, _| {
                    Err(LwError::Runtime("restored() failed".to_string()))
                })
                .build()),
            _ => Err(LwError::NotFound(path.to_string())),
        }
    }
}

/// Context backed by the fixture loader
pub fn test_context() -> Context {
    Context::with_loader(Arc::new(TestLoader))
}

/// A LIFO stack: `create` initializes, `push`/`pop`/`top`/`empty` operate
fn stack_program() -> Arc<Program> {
    ProgramBuilder::new("/lwo/stack")
        .var("stack")
        .method("create", |_, lwo, _| {
            lwo.set_var("stack", Value::array(vec![]))?;
            Ok(Value::zero())
        })
        .method("push", |_, lwo, args| {
            let item = args.first().cloned().unwrap_or_default();
            if let Some(Value::Array(items)) = lwo.var("stack") {
                items.write().push(item);
            }
            Ok(Value::zero())
        })
        .method("pop", |_, lwo, _| match lwo.var("stack") {
            Some(Value::Array(items)) => Ok(items.write().pop().unwrap_or_default()),
            _ => Ok(Value::zero()),
        })
        .method("top", |_, lwo, _| match lwo.var("stack") {
            Some(Value::Array(items)) => Ok(items.read().last().cloned().unwrap_or_default()),
            _ => Ok(Value::zero()),
        })
        .method("empty", |_, lwo, _| match lwo.var("stack") {
            Some(Value::Array(items)) => Ok(Value::Int(items.read().is_empty() as i64)),
            _ => Ok(Value::Int(1)),
        })
        .build()
}

/// Single mutable slot with `set`/`get`
fn cell_program() -> Arc<Program> {
    ProgramBuilder::new("/lwo/cell")
        .var("value")
        .method("set", |_, lwo, args| {
            lwo.set_var("value", args.first().cloned().unwrap_or_default())?;
            Ok(Value::zero())
        })
        .method("get", |_, lwo, _| Ok(lwo.var("value").unwrap_or_default()))
        .build()
}

/// Stack subtype that also counts pushes
fn counted_stack_program(base: Arc<Program>) -> Arc<Program> {
    ProgramBuilder::new("/lwo/counted_stack")
        .inherit(base)
        .var("count")
        .method("push", |_, lwo, args| {
            let item = args.first().cloned().unwrap_or_default();
            if let Some(Value::Array(items)) = lwo.var("stack") {
                items.write().push(item);
            }
            let count = lwo.var("count").and_then(|v| v.as_int()).unwrap_or(0);
            lwo.set_var("count", Value::Int(count + 1))?;
            Ok(Value::zero())
        })
        .build()
}
