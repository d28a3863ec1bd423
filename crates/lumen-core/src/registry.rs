//! Blueprint resolver: maps load paths to shared compiled programs
//!
//! The actual compile step is a collaborator injected through
//! [`ProgramLoader`]; the registry only caches. Repeated resolution of the
//! same path returns the same shared program, never a duplicate compile.

use crate::error::{LwError, LwResult};
use crate::program::Program;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Loads and compiles the program for a path
///
/// Loaders receive the registry so that compiling a program can resolve
/// its inherited programs through the same cache.
pub trait ProgramLoader {
    /// Compile the program at `path`
    ///
    /// Fails with [`LwError::NotFound`] if the path does not exist and
    /// [`LwError::Compile`] if it exists but cannot be compiled.
    fn load(&self, path: &str, registry: &ProgramRegistry) -> LwResult<Arc<Program>>;
}

/// Path-keyed cache of compiled programs
pub struct ProgramRegistry {
    programs: DashMap<Arc<str>, Arc<Program>>,
    loader: RwLock<Option<Arc<dyn ProgramLoader>>>,
}

impl ProgramRegistry {
    /// Create an empty registry without a loader
    pub fn new() -> Self {
        Self {
            programs: DashMap::new(),
            loader: RwLock::new(None),
        }
    }

    /// Create a registry backed by a loader
    pub fn with_loader(loader: Arc<dyn ProgramLoader>) -> Self {
        let registry = Self::new();
        registry.set_loader(loader);
        registry
    }

    /// Install or replace the loader
    pub fn set_loader(&self, loader: Arc<dyn ProgramLoader>) {
        *self.loader.write() = Some(loader);
    }

    /// Install a pre-built program under its own path
    pub fn register(&self, program: Arc<Program>) {
        self.programs
            .insert(Arc::from(program.path()), program);
    }

    /// Cache-only probe, no compile
    pub fn lookup(&self, path: &str) -> Option<Arc<Program>> {
        self.programs.get(path).map(|p| p.clone())
    }

    /// Resolve `path` to its shared program, compiling at most once
    pub fn resolve(&self, path: &str) -> LwResult<Arc<Program>> {
        if let Some(program) = self.programs.get(path) {
            return Ok(program.clone());
        }

        // Clone the loader handle out so nested resolution during a
        // compile does not hold the lock.
        let loader = self.loader.read().clone();
        let Some(loader) = loader else {
            return Err(LwError::NotFound(path.to_string()));
        };

        let program = loader.load(path, self)?;
        tracing::debug!(path, id = program.id(), "compiled program");
        self.programs.insert(Arc::from(path), program.clone());
        if program.path() != path {
            self.programs
                .insert(Arc::from(program.path()), program.clone());
        }
        Ok(program)
    }

    /// Number of cached programs
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::new()
    }
}
