//! Driver-facing runtime context
//!
//! The context owns every piece of process-wide state the facility needs:
//! the program registry, the hook registry, lifecycle accounting, the
//! extra-info side table, the deferred-call queue and the runtime warning
//! log. Callers pass the context explicitly; there are no ambient globals.

use crate::callout::{CalloutId, CalloutInfo, CalloutJob, CalloutQueue};
use crate::error::{LwError, LwResult};
use crate::hooks::{HookSpec, Hooks, UidHook};
use crate::instance::{Lwo, LwoRef};
use crate::program::Program;
use crate::registry::{ProgramLoader, ProgramRegistry};
use crate::value::Value;
use crate::{copy, dispatch, gc, save};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Live-instance counters, updated synchronously with allocation and drop
#[derive(Debug)]
pub struct Accounting {
    num_instances: AtomicUsize,
    data_bytes: AtomicUsize,
}

impl Accounting {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            num_instances: AtomicUsize::new(0),
            data_bytes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn add(&self, bytes: usize) {
        self.num_instances.fetch_add(1, Ordering::Relaxed);
        self.data_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn remove(&self, bytes: usize) {
        self.num_instances.fetch_sub(1, Ordering::Relaxed);
        self.data_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Number of currently live instances
    pub fn instances(&self) -> usize {
        self.num_instances.load(Ordering::Relaxed)
    }

    /// Aggregate bytes occupied by live instances
    pub fn bytes(&self) -> usize {
        self.data_bytes.load(Ordering::Relaxed)
    }
}

impl Default for Accounting {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconfigurable per-instance options
pub enum ConfigOption {
    /// Override the effective UID
    EffectiveUid(Arc<str>),
}

/// Queryable per-instance options
pub enum InfoOption {
    /// Current effective UID
    EffectiveUid,
}

/// The lightweight object runtime context
pub struct Context {
    programs: ProgramRegistry,
    hooks: RwLock<Hooks>,
    accounting: Arc<Accounting>,
    instances: Mutex<Vec<Weak<Lwo>>>,
    extra_info: DashMap<Arc<str>, Value>,
    callouts: CalloutQueue,
    warnings: Mutex<Vec<String>>,
}

impl Context {
    /// Create a context with an empty program registry
    pub fn new() -> Self {
        Self {
            programs: ProgramRegistry::new(),
            hooks: RwLock::new(Hooks::default()),
            accounting: Arc::new(Accounting::new()),
            instances: Mutex::new(Vec::new()),
            extra_info: DashMap::new(),
            callouts: CalloutQueue::new(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Create a context whose registry compiles through `loader`
    pub fn with_loader(loader: Arc<dyn ProgramLoader>) -> Self {
        let ctx = Self::new();
        ctx.programs.set_loader(loader);
        ctx
    }

    /// The blueprint registry
    pub fn programs(&self) -> &ProgramRegistry {
        &self.programs
    }

    // ---- hook registration -------------------------------------------

    /// Replace the construction hook for subsequent creations
    pub fn set_create_hook(&self, hook: HookSpec) {
        self.hooks.write().create = hook;
    }

    /// Replace the copy hook for subsequent copies
    pub fn set_copy_hook(&self, hook: HookSpec) {
        self.hooks.write().copy = hook;
    }

    /// Replace the restore hook for subsequent restores
    pub fn set_restore_hook(&self, hook: HookSpec) {
        self.hooks.write().restore = hook;
    }

    /// Replace the UID hook for subsequently created instances
    pub fn set_uid_hook(&self, hook: UidHook) {
        self.hooks.write().uid = hook;
    }

    pub(crate) fn create_hook(&self) -> HookSpec {
        self.hooks.read().create.clone()
    }

    pub(crate) fn copy_hook(&self) -> HookSpec {
        self.hooks.read().copy.clone()
    }

    pub(crate) fn restore_hook(&self) -> HookSpec {
        self.hooks.read().restore.clone()
    }

    /// Run a lifecycle hook against a freshly built instance
    pub(crate) fn run_hook(&self, hook: HookSpec, lwo: &LwoRef, args: &[Value]) -> LwResult<()> {
        match hook {
            HookSpec::Method(name) => match lwo.program().lookup(&name) {
                Some(entry) => {
                    let func = entry.func.clone();
                    func(self, lwo, args).map(|_| ())
                }
                // A blueprint without the conventional method is fine.
                None => Ok(()),
            },
            HookSpec::Closure(func) => func(self, lwo, args),
        }
    }

    // ---- construction -------------------------------------------------

    /// Resolve a UID for a new instance of `program` via the UID hook
    fn assign_uid(&self, program: &Program) -> LwResult<Arc<str>> {
        let hook = self.hooks.read().uid.clone();
        match hook {
            UidHook::Constant(uid) => Ok(uid),
            UidHook::Closure(func) => func(self, program),
        }
    }

    /// Allocate a zero-initialized instance: UID hook, slots, registration
    ///
    /// If the UID hook fails nothing is allocated and nothing leaks.
    pub(crate) fn alloc_instance(&self, program: &Arc<Program>) -> LwResult<LwoRef> {
        let uid = self.assign_uid(program)?;
        let lwo = Lwo::new(program.clone(), uid, self.accounting.clone());
        self.instances.lock().push(Arc::downgrade(&lwo));
        Ok(lwo)
    }

    /// Construct a lightweight instance of the program at `path`
    pub fn create(&self, path: &str, args: &[Value]) -> LwResult<LwoRef> {
        let program = self.programs.resolve(path)?;
        self.create_with(&program, args)
    }

    /// Construct with a declared-type check: the resolved program must be
    /// `declared_path` or inherit from it
    pub fn create_as(&self, declared_path: &str, path: &str, args: &[Value]) -> LwResult<LwoRef> {
        let declared = self.programs.resolve(declared_path)?;
        let program = self.programs.resolve(path)?;
        if !program.accepts(&declared) {
            return Err(LwError::TypeMismatch {
                declared: declared.path().to_string(),
                actual: program.path().to_string(),
            });
        }
        self.create_with(&program, args)
    }

    fn create_with(&self, program: &Arc<Program>, args: &[Value]) -> LwResult<LwoRef> {
        let lwo = self.alloc_instance(program)?;
        if let Err(e) = self.run_hook(self.create_hook(), &lwo, args) {
            self.discard(&lwo);
            return Err(LwError::Init(e.to_string()));
        }
        Ok(lwo)
    }

    /// Unwind a partially built instance: drop residual registrations and
    /// zero its slots
    ///
    /// A failed hook may have stored the instance back into its own slot
    /// vector; clearing the slots breaks any such cycle so the refcount
    /// reaches zero once the caller drops its reference. Accounting follows
    /// automatically in `Drop`.
    pub(crate) fn discard(&self, lwo: &LwoRef) {
        self.callouts.cancel_for(lwo);
        lwo.clear_vars();
    }

    // ---- copying -------------------------------------------------------

    /// Shallow copy: slots cloned, nested referents shared
    pub fn copy(&self, lwo: &LwoRef) -> LwResult<LwoRef> {
        copy::copy_instance(self, lwo)
    }

    /// Deep copy a value graph; cycles and shared referents are preserved
    pub fn deep_copy(&self, value: &Value) -> LwResult<Value> {
        copy::deep_copy(self, value)
    }

    // ---- serialization --------------------------------------------------

    /// Serialize a value graph to its textual form
    pub fn save_value(&self, value: &Value) -> LwResult<String> {
        save::save_value(value)
    }

    /// Rebuild a value graph from its textual form
    pub fn restore_value(&self, text: &str) -> LwResult<Value> {
        save::restore_value(self, text)
    }

    // ---- dispatch convenience -------------------------------------------

    /// Strict dispatch; missing methods raise `MethodNotFound`
    pub fn call_strict(&self, lwo: &LwoRef, name: &str, args: &[Value]) -> LwResult<Value> {
        dispatch::call_strict(self, lwo, name, args)
    }

    /// Non-strict dispatch; `None` when the method is missing
    pub fn call_other(&self, lwo: &LwoRef, name: &str, args: &[Value]) -> LwResult<Option<Value>> {
        dispatch::call_other(self, lwo, name, args)
    }

    // ---- configuration and side metadata ---------------------------------

    /// Reconfigure a per-instance option
    pub fn configure(&self, lwo: &LwoRef, option: ConfigOption) {
        match option {
            ConfigOption::EffectiveUid(euid) => lwo.set_euid(euid),
        }
    }

    /// Query a per-instance option
    pub fn info(&self, lwo: &LwoRef, option: InfoOption) -> Value {
        match option {
            InfoOption::EffectiveUid => Value::Str(lwo.euid()),
        }
    }

    /// Attach driver-level metadata keyed by the instance's creation UID
    ///
    /// The record outlives the instance; last writer wins.
    pub fn set_extra_info(&self, lwo: &LwoRef, value: Value) {
        self.extra_info.insert(lwo.uid(), value);
    }

    /// Metadata for an instance, via its creation UID
    pub fn get_extra_info(&self, lwo: &LwoRef) -> Option<Value> {
        self.get_extra_info_for_uid(&lwo.uid())
    }

    /// Metadata looked up directly by UID string
    pub fn get_extra_info_for_uid(&self, uid: &str) -> Option<Value> {
        self.extra_info.get(uid).map(|v| v.clone())
    }

    // ---- accounting -------------------------------------------------------

    /// Number of currently live instances
    pub fn instance_count(&self) -> usize {
        self.accounting.instances()
    }

    /// Aggregate bytes occupied by live instances
    pub fn instance_bytes(&self) -> usize {
        self.accounting.bytes()
    }

    /// Snapshot of all live instances; prunes dead registry entries
    pub(crate) fn live_instances(&self) -> Vec<LwoRef> {
        let mut registry = self.instances.lock();
        registry.retain(|w| w.strong_count() > 0);
        registry.iter().filter_map(|w| w.upgrade()).collect()
    }

    /// Run the out-of-band cycle collector
    pub fn collect_cycles(&self) -> gc::GcStats {
        gc::collect_cycles(self)
    }

    // ---- deferred calls ----------------------------------------------------

    /// Register a deferred call; holds the instance until fired or cancelled
    pub fn schedule(
        &self,
        target: &LwoRef,
        delay: u64,
        job: CalloutJob,
        args: Vec<Value>,
    ) -> CalloutId {
        self.callouts.schedule(target.clone(), delay, job, args)
    }

    /// Cancel a deferred call, dropping the held reference immediately
    pub fn cancel_callout(&self, id: CalloutId) -> bool {
        self.callouts.cancel(id)
    }

    /// Remaining ticks for a pending registration
    pub fn find_callout(&self, id: CalloutId) -> Option<u64> {
        self.callouts.remaining(id)
    }

    /// Read-only view of every pending registration
    pub fn callout_info(&self) -> Vec<CalloutInfo> {
        self.callouts.info()
    }

    /// Advance the logical clock and fire everything due, synchronously
    ///
    /// A missing method is a reported warning, never a process failure.
    pub fn advance(&self, ticks: u64) {
        for callout in self.callouts.take_due(ticks) {
            match &callout.job {
                CalloutJob::Method(name) => {
                    match dispatch::call_other(self, &callout.target, name, &callout.args) {
                        Ok(Some(_)) => {}
                        Ok(None) => self.warn(format!(
                            "deferred call: no method '{}' in {}",
                            name,
                            callout.target.load_name()
                        )),
                        Err(e) => self.warn(format!("deferred call failed: {}", e)),
                    }
                }
                CalloutJob::Closure(func) => {
                    if let Err(e) = func(self, &callout.target, &callout.args) {
                        self.warn(format!("deferred call failed: {}", e));
                    }
                }
            }
        }
    }

    // ---- warnings ------------------------------------------------------------

    pub(crate) fn warn(&self, message: String) {
        tracing::warn!(target: "lumen", "{}", message);
        self.warnings.lock().push(message);
    }

    /// Most recent runtime warning, if any
    pub fn last_warning(&self) -> Option<String> {
        self.warnings.lock().last().cloned()
    }

    /// Drain the runtime warning log
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
