//! Pluggable lifecycle hooks
//!
//! One hook per creation event (construction, copy, restore) plus the UID
//! resolution hook. Hooks live in an explicit registry on the context, not
//! in ambient globals; replacing one affects subsequent events only.

use crate::context::Context;
use crate::error::LwResult;
use crate::instance::LwoRef;
use crate::program::Program;
use crate::value::Value;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Default UID sentinel for lightweight instances
///
/// Distinguishes lightweight identities from heavyweight-object UIDs.
pub static DEFAULT_LW_UID: Lazy<Arc<str>> = Lazy::new(|| Arc::from("lwuid"));

/// Callable form of a lifecycle hook: `(context, new instance, args)`
pub type HookFn = Arc<dyn Fn(&Context, &LwoRef, &[Value]) -> LwResult<()>>;

/// Callable form of the UID hook: `(context, program) -> uid`
pub type UidFn = Arc<dyn Fn(&Context, &Program) -> LwResult<Arc<str>>>;

/// A construction, copy or restore hook
#[derive(Clone)]
pub enum HookSpec {
    /// Invoke the conventionally named method on the new instance;
    /// a blueprint without that method is a no-op
    Method(Arc<str>),
    /// Invoke an arbitrary callable
    Closure(HookFn),
}

impl HookSpec {
    /// Hook that calls a method by name
    pub fn method(name: impl Into<Arc<str>>) -> Self {
        HookSpec::Method(name.into())
    }

    /// Hook that runs a closure
    pub fn closure(f: impl Fn(&Context, &LwoRef, &[Value]) -> LwResult<()> + 'static) -> Self {
        let f: HookFn = Arc::new(f);
        HookSpec::Closure(f)
    }
}

/// The UID resolution hook, invoked once per instance birth
#[derive(Clone)]
pub enum UidHook {
    /// Every instance gets this constant identity
    Constant(Arc<str>),
    /// Compute the identity from the program being instantiated
    Closure(UidFn),
}

impl UidHook {
    /// Constant-identity hook
    pub fn constant(uid: impl Into<Arc<str>>) -> Self {
        UidHook::Constant(uid.into())
    }

    /// Computed-identity hook
    pub fn closure(f: impl Fn(&Context, &Program) -> LwResult<Arc<str>> + 'static) -> Self {
        let f: UidFn = Arc::new(f);
        UidHook::Closure(f)
    }
}

/// The full hook registry held by a context
#[derive(Clone)]
pub(crate) struct Hooks {
    pub create: HookSpec,
    pub copy: HookSpec,
    pub restore: HookSpec,
    pub uid: UidHook,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            create: HookSpec::method("create"),
            copy: HookSpec::method("copied"),
            restore: HookSpec::method("restored"),
            uid: UidHook::Constant(DEFAULT_LW_UID.clone()),
        }
    }
}
