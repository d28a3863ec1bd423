//! Compiled blueprint ("program") for lightweight instances
//!
//! A program is immutable after build and shared by every instance
//! constructed from it. It owns the flattened method table (nearest
//! override wins), the ordered variable layout including inherited slots,
//! and the inheritance chain.

use crate::context::Context;
use crate::error::LwResult;
use crate::instance::LwoRef;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global counter for generating unique program IDs
static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

fn generate_program_id() -> u64 {
    NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed)
}

/// Entry point of a method: `(context, receiver, args) -> value`
pub type MethodFn = Arc<dyn Fn(&Context, &LwoRef, &[Value]) -> LwResult<Value>>;

/// Declared type of a variable slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    /// Accepts any value
    Any,
    /// Integer only
    Int,
    /// Float only
    Float,
    /// String only
    Str,
    /// Array only
    Array,
    /// Mapping only
    Mapping,
    /// Lightweight instance only
    Object,
}

impl VarType {
    /// Whether `value` is admissible for a slot of this type
    pub fn admits(self, value: &Value) -> bool {
        match self {
            VarType::Any => true,
            VarType::Int => matches!(value, Value::Int(_)),
            VarType::Float => matches!(value, Value::Float(_)),
            VarType::Str => matches!(value, Value::Str(_)),
            VarType::Array => matches!(value, Value::Array(_)),
            VarType::Mapping => matches!(value, Value::Mapping(_)),
            VarType::Object => matches!(value, Value::Lwo(_)),
        }
    }
}

/// A variable slot declaration
#[derive(Clone)]
pub struct VarDef {
    /// Slot name
    pub name: Arc<str>,
    /// Declared slot type
    pub vtype: VarType,
}

/// A resolved method table entry
#[derive(Clone)]
pub struct MethodEntry {
    /// Method name
    pub name: Arc<str>,
    /// Load path of the program that defines this entry
    pub defined_in: Arc<str>,
    pub(crate) func: MethodFn,
}

/// Immutable compiled template for lightweight instances
pub struct Program {
    id: u64,
    path: Arc<str>,
    source_name: Arc<str>,
    vars: Vec<VarDef>,
    methods: Vec<MethodEntry>,
    index: FxHashMap<Arc<str>, usize>,
    inherits: Vec<Arc<Program>>,
}

impl Program {
    /// Unique identity of this program (used to key call caches)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Canonical load path, e.g. `/lwo/stack`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Source name, e.g. `/lwo/stack.c`
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Number of variable slots, inherited ones included
    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    /// Variable slot declarations in layout order
    pub fn var_defs(&self) -> &[VarDef] {
        &self.vars
    }

    /// Variable names in layout order
    pub fn var_names(&self) -> Vec<Arc<str>> {
        self.vars.iter().map(|v| v.name.clone()).collect()
    }

    /// Slot index of a variable name
    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| &*v.name == name)
    }

    /// Whether `value` is admissible for the slot at `index`
    pub fn check_type(&self, index: usize, value: &Value) -> bool {
        self.vars
            .get(index)
            .map(|v| v.vtype.admits(value))
            .unwrap_or(false)
    }

    /// Look up a method, inherited entries included (nearest override wins)
    pub fn lookup(&self, name: &str) -> Option<&MethodEntry> {
        self.index.get(name).map(|&i| &self.methods[i])
    }

    /// Look up a method among those this program defines itself
    pub fn lookup_direct(&self, name: &str) -> Option<&MethodEntry> {
        self.lookup(name).filter(|e| e.defined_in == self.path)
    }

    /// Method names in table order
    pub fn method_names(&self) -> Vec<Arc<str>> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }

    /// Load path of the program defining `name`, if any
    pub fn function_exists(&self, name: &str) -> Option<Arc<str>> {
        self.lookup(name).map(|e| e.defined_in.clone())
    }

    /// Load path of the program declaring variable `name`, if any
    ///
    /// Inherited slots come first in the layout, so a slot index below the
    /// inherited count belongs to the parent that contributed it.
    pub fn variable_exists(&self, name: &str) -> Option<Arc<str>> {
        let index = self.var_index(name)?;
        let mut offset = 0;
        for parent in &self.inherits {
            let count = parent.var_count();
            if index < offset + count {
                return parent.variable_exists(name);
            }
            offset += count;
        }
        Some(self.path.clone())
    }

    /// Direct parents, in inheritance order
    pub fn inherits(&self) -> &[Arc<Program>] {
        &self.inherits
    }

    /// Source names of this program and all transitive parents, self first
    pub fn inherit_list(&self) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        self.collect_inherits(&mut out);
        out
    }

    fn collect_inherits(&self, out: &mut Vec<Arc<str>>) {
        if !out.iter().any(|s| *s == self.source_name) {
            out.push(self.source_name.clone());
        }
        for parent in &self.inherits {
            parent.collect_inherits(out);
        }
    }

    /// Whether this program is `declared` or inherits from it
    pub fn accepts(&self, declared: &Program) -> bool {
        self.id == declared.id || self.inherits_id(declared.id)
    }

    fn inherits_id(&self, id: u64) -> bool {
        self.inherits
            .iter()
            .any(|p| p.id == id || p.inherits_id(id))
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("vars", &self.vars.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Builder assembling a [`Program`]
///
/// Inherited slots and methods come first; own declarations follow, with
/// own methods overriding inherited entries of the same name in place.
pub struct ProgramBuilder {
    path: Arc<str>,
    source_name: Option<Arc<str>>,
    vars: Vec<VarDef>,
    methods: Vec<(Arc<str>, MethodFn)>,
    inherits: Vec<Arc<Program>>,
}

impl ProgramBuilder {
    /// Start a program at the given load path
    pub fn new(path: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            source_name: None,
            vars: Vec::new(),
            methods: Vec::new(),
            inherits: Vec::new(),
        }
    }

    /// Override the source name (defaults to `<path>.c`)
    pub fn source_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Inherit another program
    pub fn inherit(mut self, parent: Arc<Program>) -> Self {
        self.inherits.push(parent);
        self
    }

    /// Declare an untyped variable slot
    pub fn var(self, name: impl Into<Arc<str>>) -> Self {
        self.typed_var(name, VarType::Any)
    }

    /// Declare a typed variable slot
    pub fn typed_var(mut self, name: impl Into<Arc<str>>, vtype: VarType) -> Self {
        self.vars.push(VarDef {
            name: name.into(),
            vtype,
        });
        self
    }

    /// Define a method
    pub fn method(
        mut self,
        name: impl Into<Arc<str>>,
        func: impl Fn(&Context, &LwoRef, &[Value]) -> LwResult<Value> + 'static,
    ) -> Self {
        let func: MethodFn = Arc::new(func);
        self.methods.push((name.into(), func));
        self
    }

    /// Build the immutable program
    pub fn build(self) -> Arc<Program> {
        let source_name = self
            .source_name
            .unwrap_or_else(|| Arc::from(format!("{}.c", self.path)));

        // Inherited layout first, in inheritance order; duplicates collapse
        // onto the first occurrence.
        let mut vars: Vec<VarDef> = Vec::new();
        for parent in &self.inherits {
            for def in parent.var_defs() {
                if !vars.iter().any(|v| v.name == def.name) {
                    vars.push(def.clone());
                }
            }
        }
        for def in self.vars {
            if !vars.iter().any(|v| v.name == def.name) {
                vars.push(def);
            }
        }

        let mut methods: Vec<MethodEntry> = Vec::new();
        let mut index: FxHashMap<Arc<str>, usize> = FxHashMap::default();
        for parent in &self.inherits {
            for entry in &parent.methods {
                match index.get(&entry.name) {
                    Some(&i) => methods[i] = entry.clone(),
                    None => {
                        index.insert(entry.name.clone(), methods.len());
                        methods.push(entry.clone());
                    }
                }
            }
        }
        for (name, func) in self.methods {
            let entry = MethodEntry {
                name: name.clone(),
                defined_in: self.path.clone(),
                func,
            };
            match index.get(&name) {
                Some(&i) => methods[i] = entry,
                None => {
                    index.insert(name, methods.len());
                    methods.push(entry);
                }
            }
        }

        Arc::new(Program {
            id: generate_program_id(),
            path: self.path,
            source_name,
            vars,
            methods,
            index,
            inherits: self.inherits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl Fn(&Context, &LwoRef, &[Value]) -> LwResult<Value> {
        |_, _, _| Ok(Value::zero())
    }

    #[test]
    fn test_builder_defaults() {
        let program = ProgramBuilder::new("/lwo/stack").var("stack").build();
        assert_eq!(program.path(), "/lwo/stack");
        assert_eq!(program.source_name(), "/lwo/stack.c");
        assert_eq!(program.var_count(), 1);
        assert_eq!(program.var_index("stack"), Some(0));
    }

    #[test]
    fn test_unique_ids() {
        let a = ProgramBuilder::new("/a").build();
        let b = ProgramBuilder::new("/b").build();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_inherited_layout_comes_first() {
        let base = ProgramBuilder::new("/base").var("x").var("y").build();
        let child = ProgramBuilder::new("/child")
            .inherit(base)
            .var("z")
            .build();
        let expected: Vec<Arc<str>> = vec![Arc::from("x"), Arc::from("y"), Arc::from("z")];
        assert_eq!(child.var_names(), expected);
        assert_eq!(child.variable_exists("x").as_deref(), Some("/base"));
        assert_eq!(child.variable_exists("z").as_deref(), Some("/child"));
    }

    #[test]
    fn test_override_wins_and_keeps_position() {
        let base = ProgramBuilder::new("/base")
            .method("greet", |_, _, _| Ok(Value::string("base")))
            .method("other", noop())
            .build();
        let child = ProgramBuilder::new("/child")
            .inherit(base)
            .method("greet", |_, _, _| Ok(Value::string("child")))
            .build();

        let entry = child.lookup("greet").unwrap();
        assert_eq!(&*entry.defined_in, "/child");
        let expected: Vec<Arc<str>> = vec![Arc::from("greet"), Arc::from("other")];
        assert_eq!(child.method_names(), expected);
    }

    #[test]
    fn test_direct_lookup_skips_inherited() {
        let base = ProgramBuilder::new("/base").method("greet", noop()).build();
        let child = ProgramBuilder::new("/child").inherit(base).build();
        assert!(child.lookup("greet").is_some());
        assert!(child.lookup_direct("greet").is_none());
    }

    #[test]
    fn test_inherit_list_self_first() {
        let base = ProgramBuilder::new("/base").build();
        let child = ProgramBuilder::new("/child").inherit(base.clone()).build();
        let list = child.inherit_list();
        assert_eq!(&*list[0], "/child.c");
        assert_eq!(&*list[1], "/base.c");
        assert!(child.accepts(&base));
        assert!(!base.accepts(&child));
    }

    #[test]
    fn test_var_type_admits() {
        assert!(VarType::Any.admits(&Value::Int(1)));
        assert!(VarType::Str.admits(&Value::string("s")));
        assert!(!VarType::Str.admits(&Value::Int(1)));
        assert!(VarType::Array.admits(&Value::array(vec![])));
    }
}
