//! Lightweight instance: a value with a blueprint and its own slots
//!
//! An instance holds a shared reference to its immutable program and an
//! exclusively owned vector of variable slots sized per the program
//! layout. It has no entry in any global object table; identity is
//! reference identity (`Arc::ptr_eq`). Reclamation is by refcount, with
//! accounting updated synchronously in `Drop`.

use crate::context::Accounting;
use crate::error::{LwError, LwResult};
use crate::program::Program;
use crate::value::Value;
use parking_lot::RwLock;
use std::mem;
use std::sync::Arc;

/// Shared handle to a lightweight instance
pub type LwoRef = Arc<Lwo>;

/// A lightweight object instance
pub struct Lwo {
    program: Arc<Program>,
    vars: RwLock<Vec<Value>>,
    uid: Arc<str>,
    euid: RwLock<Arc<str>>,
    data_size: usize,
    accounting: Arc<Accounting>,
}

impl Lwo {
    /// Allocate a zero-initialized instance and register its size
    pub(crate) fn new(
        program: Arc<Program>,
        uid: Arc<str>,
        accounting: Arc<Accounting>,
    ) -> LwoRef {
        let slots = program.var_count();
        let data_size = mem::size_of::<Lwo>() + slots * mem::size_of::<Value>();
        accounting.add(data_size);
        Arc::new(Lwo {
            program,
            vars: RwLock::new(vec![Value::zero(); slots]),
            uid: uid.clone(),
            euid: RwLock::new(uid),
            data_size,
            accounting,
        })
    }

    /// The instance's blueprint
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Canonical load path of the blueprint, e.g. `/lwo/stack`
    pub fn load_name(&self) -> &str {
        self.program.path()
    }

    /// Source name of the blueprint, e.g. `/lwo/stack.c`
    pub fn program_name(&self) -> &str {
        self.program.source_name()
    }

    /// Creation UID, immutable for the instance's lifetime
    pub fn uid(&self) -> Arc<str> {
        self.uid.clone()
    }

    /// Effective UID, reconfigurable through `Context::configure`
    pub fn euid(&self) -> Arc<str> {
        self.euid.read().clone()
    }

    pub(crate) fn set_euid(&self, euid: Arc<str>) {
        *self.euid.write() = euid;
    }

    /// Read a variable by name
    pub fn var(&self, name: &str) -> Option<Value> {
        let index = self.program.var_index(name)?;
        Some(self.vars.read()[index].clone())
    }

    /// Write a variable by name, enforcing its declared type
    pub fn set_var(&self, name: &str, value: Value) -> LwResult<()> {
        let index = self
            .program
            .var_index(name)
            .ok_or_else(|| LwError::Runtime(format!("no variable '{}'", name)))?;
        if !self.program.check_type(index, &value) {
            return Err(LwError::Runtime(format!(
                "value not admissible for variable '{}'",
                name
            )));
        }
        self.vars.write()[index] = value;
        Ok(())
    }

    /// Write a slot by index, bypassing the declared-type check
    pub(crate) fn set_slot(&self, index: usize, value: Value) {
        let mut vars = self.vars.write();
        if index < vars.len() {
            vars[index] = value;
        }
    }

    /// Clone of the full slot vector, in layout order
    pub fn snapshot_vars(&self) -> Vec<Value> {
        self.vars.read().clone()
    }

    /// Replace the full slot vector (copy/restore paths)
    ///
    /// The length must match the program layout.
    pub(crate) fn replace_vars(&self, vars: Vec<Value>) {
        debug_assert_eq!(vars.len(), self.program.var_count());
        *self.vars.write() = vars;
    }

    /// Reset every slot to the zero value (cycle breaking)
    pub(crate) fn clear_vars(&self) {
        let mut vars = self.vars.write();
        for slot in vars.iter_mut() {
            *slot = Value::zero();
        }
    }

    /// Bytes attributed to this instance in the aggregate size counter
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Names of all variables, inherited ones included
    pub fn variable_list(&self) -> Vec<Arc<str>> {
        self.program.var_names()
    }

    /// Names of all callable methods
    pub fn function_list(&self) -> Vec<Arc<str>> {
        self.program.method_names()
    }

    /// Load path of the program defining method `name`
    pub fn function_exists(&self, name: &str) -> Option<Arc<str>> {
        self.program.function_exists(name)
    }

    /// Load path of the program declaring variable `name`
    pub fn variable_exists(&self, name: &str) -> Option<Arc<str>> {
        self.program.variable_exists(name)
    }

    /// Source names of the blueprint's inheritance chain, self first
    pub fn inherit_list(&self) -> Vec<Arc<str>> {
        self.program.inherit_list()
    }
}

impl Drop for Lwo {
    fn drop(&mut self) {
        self.accounting.remove(self.data_size);
    }
}

impl std::fmt::Debug for Lwo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lwo")
            .field("program", &self.program.path())
            .field("euid", &self.euid.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{ProgramBuilder, VarType};

    fn fixture() -> (Arc<Program>, Arc<Accounting>) {
        let program = ProgramBuilder::new("/lwo/pair")
            .var("left")
            .typed_var("right", VarType::Str)
            .build();
        (program, Arc::new(Accounting::new()))
    }

    #[test]
    fn test_zero_initialized_slots() {
        let (program, accounting) = fixture();
        let lwo = Lwo::new(program, Arc::from("lwuid"), accounting);
        assert_eq!(lwo.var("left"), Some(Value::Int(0)));
        assert_eq!(lwo.var("right"), Some(Value::Int(0)));
        assert_eq!(lwo.var("missing"), None);
    }

    #[test]
    fn test_typed_slot_rejects_mismatch() {
        let (program, accounting) = fixture();
        let lwo = Lwo::new(program, Arc::from("lwuid"), accounting);
        assert!(lwo.set_var("right", Value::string("ok")).is_ok());
        assert!(lwo.set_var("right", Value::Int(1)).is_err());
        assert_eq!(lwo.var("right"), Some(Value::string("ok")));
    }

    #[test]
    fn test_accounting_follows_lifetime() {
        let (program, accounting) = fixture();
        assert_eq!(accounting.instances(), 0);
        let lwo = Lwo::new(program, Arc::from("lwuid"), accounting.clone());
        assert_eq!(accounting.instances(), 1);
        assert_eq!(accounting.bytes(), lwo.data_size());
        drop(lwo);
        assert_eq!(accounting.instances(), 0);
        assert_eq!(accounting.bytes(), 0);
    }

    #[test]
    fn test_uid_and_euid() {
        let (program, accounting) = fixture();
        let lwo = Lwo::new(program, Arc::from("lwuid"), accounting);
        assert_eq!(&*lwo.uid(), "lwuid");
        assert_eq!(&*lwo.euid(), "lwuid");
        lwo.set_euid(Arc::from("other"));
        assert_eq!(&*lwo.euid(), "other");
        assert_eq!(&*lwo.uid(), "lwuid");
    }
}
