//! Lumen core: a lightweight object facility for scripting runtimes
//!
//! Lightweight objects are cheap, unnamed, purely reference-counted
//! instances of a compiled program (the blueprint). They have no place in
//! a global object table, cannot be looked up by name, and disappear the
//! moment the last reference drops. What they keep from full objects:
//! per-instance variable slots, method dispatch with inheritance, a
//! driver-controlled lifecycle (creation, copy and restore hooks, UID
//! assignment), textual serialization that preserves shared structure,
//! deferred calls and an out-of-band collector for reference cycles.
//!
//! The [`Context`] is the root handle: it owns the blueprint registry,
//! the hook configuration, lifecycle accounting and the deferred-call
//! queue. A minimal session:
//!
//! ```
//! use lumen_core::{Context, ProgramBuilder, Value};
//!
//! let ctx = Context::new();
//! ctx.programs().register(
//!     ProgramBuilder::new("/lwo/cell")
//!         .var("value")
//!         .method("get", |_, lwo, _| {
//!             Ok(lwo.var("value").unwrap_or_default())
//!         })
//!         .build(),
//! );
//!
//! let cell = ctx.create("/lwo/cell", &[]).unwrap();
//! cell.set_var("value", Value::string("hello")).unwrap();
//! assert_eq!(
//!     ctx.call_strict(&cell, "get", &[]).unwrap(),
//!     Value::string("hello")
//! );
//! ```

pub mod callout;
pub mod context;
pub mod copy;
pub mod dispatch;
pub mod error;
pub mod gc;
pub mod hooks;
pub mod instance;
pub mod program;
pub mod registry;
pub mod save;
pub mod value;

pub use callout::{CalloutId, CalloutInfo, CalloutJob};
pub use context::{Accounting, ConfigOption, Context, InfoOption};
pub use copy::{copy_instance, deep_copy};
pub use dispatch::{
    broadcast, call_direct, call_direct_strict, call_other, call_strict, CallSite,
};
pub use error::{LwError, LwResult};
pub use gc::{collect_cycles, GcStats};
pub use hooks::{HookFn, HookSpec, UidFn, UidHook, DEFAULT_LW_UID};
pub use instance::{Lwo, LwoRef};
pub use program::{MethodFn, Program, ProgramBuilder, VarDef, VarType};
pub use registry::{ProgramLoader, ProgramRegistry};
pub use save::{restore_value, save_value};
pub use value::{ArrayRef, MapKey, MappingRef, Value};
