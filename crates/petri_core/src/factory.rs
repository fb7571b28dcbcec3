//! Name to constructor maps, one per entity kind

use std::sync::Arc;

use indexmap::IndexMap;

use crate::init::Initializer;
use crate::loader::Loader;
use crate::module::Module;
use crate::object::{Object, ObjectData};
use crate::program::Program;

/// Constructs a simulation file loader
pub type LoaderFactory = dyn Fn() -> Box<dyn Loader> + Send + Sync;

/// Constructs an initializer
pub type InitializerFactory = dyn Fn() -> Box<dyn Initializer> + Send + Sync;

/// Constructs a module
pub type ModuleFactory = dyn Fn() -> Box<dyn Module> + Send + Sync;

/// Constructs an object around host-prepared base data (type name and kind)
pub type ObjectFactory = dyn Fn(ObjectData) -> Box<dyn Object> + Send + Sync;

/// Constructs a program
pub type ProgramFactory = dyn Fn() -> Box<dyn Program> + Send + Sync;

/// Maps type names to constructors of a single entity kind
pub struct FactoryManager<F: ?Sized> {
    factories: IndexMap<String, Arc<F>>,
}

impl<F: ?Sized> FactoryManager<F> {
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Register a constructor, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<F>) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            log::warn!("Factory '{}' registered twice, keeping the latest", name);
        }
    }

    /// Remove a constructor, returns whether it was registered
    pub fn remove(&mut self, name: &str) -> bool {
        self.factories.shift_remove(name).is_some()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Get a shared handle to a constructor
    pub fn get(&self, name: &str) -> Option<Arc<F>> {
        self.factories.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<F: ?Sized> Default for FactoryManager<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryManager<ModuleFactory> {
    pub fn create(&self, name: &str) -> Option<Box<dyn Module>> {
        self.factories.get(name).map(|f| f())
    }
}

impl FactoryManager<ObjectFactory> {
    pub fn create(&self, name: &str, data: ObjectData) -> Option<Box<dyn Object>> {
        self.factories.get(name).map(|f| f(data))
    }
}

impl FactoryManager<ProgramFactory> {
    pub fn create(&self, name: &str) -> Option<Box<dyn Program>> {
        self.factories.get(name).map(|f| f())
    }
}

impl FactoryManager<InitializerFactory> {
    pub fn create(&self, name: &str) -> Option<Box<dyn Initializer>> {
        self.factories.get(name).map(|f| f())
    }
}

impl FactoryManager<LoaderFactory> {
    pub fn create(&self, name: &str) -> Option<Box<dyn Loader>> {
        self.factories.get(name).map(|f| f())
    }
}
