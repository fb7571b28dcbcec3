//! Per-host registry of the factories each loaded plugin provides

use std::sync::Arc;

use indexmap::IndexMap;

use crate::factory::{
    FactoryManager, InitializerFactory, LoaderFactory, ModuleFactory, ObjectFactory,
    ProgramFactory,
};
use crate::init::Initializer;
use crate::loader::Loader;
use crate::module::Module;
use crate::object::{Object, ObjectData};
use crate::program::Program;

/// Factories registered by one plugin
#[derive(Default)]
pub struct RepositoryRecord {
    loaders: FactoryManager<LoaderFactory>,
    initializers: FactoryManager<InitializerFactory>,
    modules: FactoryManager<ModuleFactory>,
    objects: FactoryManager<ObjectFactory>,
    programs: FactoryManager<ProgramFactory>,
}

impl RepositoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaders(&self) -> &FactoryManager<LoaderFactory> {
        &self.loaders
    }

    pub fn initializers(&self) -> &FactoryManager<InitializerFactory> {
        &self.initializers
    }

    pub fn modules(&self) -> &FactoryManager<ModuleFactory> {
        &self.modules
    }

    pub fn objects(&self) -> &FactoryManager<ObjectFactory> {
        &self.objects
    }

    pub fn programs(&self) -> &FactoryManager<ProgramFactory> {
        &self.programs
    }

    /// Register a loader; the name is the file extension it handles
    pub fn register_loader<L, F>(&mut self, extension: impl Into<String>, factory: F) -> &mut Self
    where
        L: Loader + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        let f: Arc<LoaderFactory> = Arc::new(move || -> Box<dyn Loader> { Box::new(factory()) });
        self.loaders.register(extension, f);
        self
    }

    pub fn register_initializer<I, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        I: Initializer + 'static,
        F: Fn() -> I + Send + Sync + 'static,
    {
        let f: Arc<InitializerFactory> =
            Arc::new(move || -> Box<dyn Initializer> { Box::new(factory()) });
        self.initializers.register(name, f);
        self
    }

    pub fn register_module<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: Module + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let f: Arc<ModuleFactory> = Arc::new(move || -> Box<dyn Module> { Box::new(factory()) });
        self.modules.register(name, f);
        self
    }

    pub fn register_object<O, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        O: Object + 'static,
        F: Fn(ObjectData) -> O + Send + Sync + 'static,
    {
        let f: Arc<ObjectFactory> =
            Arc::new(move |data: ObjectData| -> Box<dyn Object> { Box::new(factory(data)) });
        self.objects.register(name, f);
        self
    }

    pub fn register_program<P, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        P: Program + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let f: Arc<ProgramFactory> = Arc::new(move || -> Box<dyn Program> { Box::new(factory()) });
        self.programs.register(name, f);
        self
    }

    pub fn unregister_loader(&mut self, extension: &str) -> &mut Self {
        self.loaders.remove(extension);
        self
    }

    pub fn unregister_initializer(&mut self, name: &str) -> &mut Self {
        self.initializers.remove(name);
        self
    }

    pub fn unregister_module(&mut self, name: &str) -> &mut Self {
        self.modules.remove(name);
        self
    }

    pub fn unregister_object(&mut self, name: &str) -> &mut Self {
        self.objects.remove(name);
        self
    }

    pub fn unregister_program(&mut self, name: &str) -> &mut Self {
        self.programs.remove(name);
        self
    }

    /// No factory of any kind is registered
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
            && self.initializers.is_empty()
            && self.modules.is_empty()
            && self.objects.is_empty()
            && self.programs.is_empty()
    }
}

/// Records of every loaded plugin, keyed by plugin name
#[derive(Default)]
pub struct Repository {
    records: IndexMap<String, RepositoryRecord>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, plugin: &str) -> bool {
        self.records.contains_key(plugin)
    }

    pub fn get(&self, plugin: &str) -> Option<&RepositoryRecord> {
        self.records.get(plugin)
    }

    pub fn get_mut(&mut self, plugin: &str) -> Option<&mut RepositoryRecord> {
        self.records.get_mut(plugin)
    }

    /// Records in registration order
    pub fn records(&self) -> impl Iterator<Item = (&str, &RepositoryRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Create (or return the existing) record for a plugin
    pub fn register_api(&mut self, plugin: &str) -> &mut RepositoryRecord {
        self.records.entry(plugin.to_string()).or_default()
    }

    pub fn unregister_api(&mut self, plugin: &str) -> Option<RepositoryRecord> {
        self.records.shift_remove(plugin)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
