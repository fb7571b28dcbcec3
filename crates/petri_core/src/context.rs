//! Per-simulation plugin imports and type name dispatch

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{EntityKind, Error, Result};
use crate::factory::FactoryManager;
use crate::init::Initializer;
use crate::library::Library;
use crate::loader::Loader;
use crate::manager::Manager;
use crate::module::Module;
use crate::object::{Object, ObjectData};
use crate::parameters::Parameters;
use crate::program::Program;
use crate::repository::RepositoryRecord;
use crate::simulation::Simulation;

/// The plugins one simulation has imported.
///
/// Creation requests are resolved against imported plugins only: a type
/// name must be registered by exactly one of them.
#[derive(Clone)]
pub struct Context {
    manager: Arc<Manager>,
    imported: IndexMap<String, Arc<Library>>,
}

impl Context {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self {
            manager,
            imported: IndexMap::new(),
        }
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    pub fn is_imported(&self, name: &str) -> bool {
        self.imported.contains_key(name)
    }

    /// Imported plugin names in import order
    pub fn imported_names(&self) -> Vec<String> {
        self.imported.keys().cloned().collect()
    }

    /// Imported plugins in import order
    pub fn imported(&self) -> impl DoubleEndedIterator<Item = (&str, &Arc<Library>)> {
        self.imported.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Import a plugin and, before it, everything it requires.
    ///
    /// Loads the plugin through the manager when needed. Conflicts are
    /// checked before any dependency is imported.
    pub fn import_plugin(&mut self, name: &str) -> Result<Arc<Library>> {
        let mut chain = Vec::new();
        self.import_inner(name, &mut chain)
    }

    fn import_inner(&mut self, name: &str, chain: &mut Vec<String>) -> Result<Arc<Library>> {
        if let Some(library) = self.imported.get(name) {
            return Ok(library.clone());
        }

        if chain.iter().any(|n| n == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(Error::DependencyCycle { chain: cycle });
        }

        let library = self.manager.load(name)?;
        self.check_conflicts(name, &library)?;

        chain.push(name.to_string());
        for required in library.api().required_plugins() {
            self.import_inner(&required, chain)?;
        }
        chain.pop();

        self.imported.insert(name.to_string(), library.clone());
        log::debug!("Plugin imported `{}`", name);

        Ok(library)
    }

    fn check_conflicts(&self, name: &str, library: &Library) -> Result<()> {
        let conflict = |with: &str| Error::Conflict {
            plugin: name.to_string(),
            with: with.to_string(),
        };

        for other in library.api().conflict_plugins() {
            if self.imported.contains_key(&other) {
                return Err(conflict(&other));
            }
        }

        for (other, imported) in &self.imported {
            if imported.api().conflict_plugins().iter().any(|c| c == name) {
                return Err(conflict(other));
            }
        }

        Ok(())
    }

    /// Forget an imported plugin; plugins requiring it stay imported
    pub fn remove_plugin(&mut self, name: &str) -> Option<Arc<Library>> {
        let library = self.imported.shift_remove(name);
        if library.is_some() {
            log::debug!("Plugin removed `{}`", name);
        }
        library
    }

    // ========== Dispatch ==========

    /// Find the single imported plugin providing `type_name`
    fn resolve<F: ?Sized>(
        &self,
        kind: EntityKind,
        type_name: &str,
        select: impl Fn(&RepositoryRecord) -> &FactoryManager<F>,
    ) -> Result<Arc<F>> {
        let repository = self.manager.repository();

        let mut found: Vec<(&str, Arc<F>)> = self
            .imported
            .keys()
            .filter_map(|plugin| {
                let factory = select(repository.get(plugin)?).get(type_name)?;
                Some((plugin.as_str(), factory))
            })
            .collect();

        match found.len() {
            1 => Ok(found.remove(0).1),
            0 => {
                let available_in = repository
                    .records()
                    .filter(|(_, record)| select(record).exists(type_name))
                    .map(|(plugin, _)| plugin.to_string())
                    .collect();

                Err(Error::UnknownType {
                    kind,
                    type_name: type_name.to_string(),
                    available_in,
                })
            }
            _ => Err(Error::AmbiguousType {
                kind,
                type_name: type_name.to_string(),
                plugins: found.into_iter().map(|(p, _)| p.to_string()).collect(),
            }),
        }
    }

    /// Create a loader for a file extension (without the dot)
    pub fn create_loader(&self, extension: &str) -> Result<Box<dyn Loader>> {
        let factory = self.resolve(EntityKind::Loader, extension, RepositoryRecord::loaders)?;
        Ok(factory())
    }

    pub fn create_initializer(&self, type_name: &str) -> Result<Box<dyn Initializer>> {
        let factory = self.resolve(EntityKind::Initializer, type_name, RepositoryRecord::initializers)?;
        Ok(factory())
    }

    pub fn create_module(&self, type_name: &str) -> Result<Box<dyn Module>> {
        let factory = self.resolve(EntityKind::Module, type_name, RepositoryRecord::modules)?;
        Ok(factory())
    }

    /// Create an object around prepared base data
    pub fn create_object(&self, type_name: &str, data: ObjectData) -> Result<Box<dyn Object>> {
        let factory = self.resolve(EntityKind::Object, type_name, RepositoryRecord::objects)?;
        Ok(factory(data))
    }

    pub fn create_program(&self, type_name: &str) -> Result<Box<dyn Program>> {
        let factory = self.resolve(EntityKind::Program, type_name, RepositoryRecord::programs)?;
        Ok(factory())
    }

    /// Load a simulation file with the loader registered for its extension
    pub fn create_simulation(&self, path: &Path, parameters: &Parameters) -> Result<Simulation> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::loader(path, "file has no extension to select a loader"))?;

        let loader = self.create_loader(extension)?;
        loader.from_file(self, path, parameters)
    }

    /// Load a simulation from text with the loader registered for `extension`
    pub fn create_simulation_from_source(
        &self,
        extension: &str,
        source: &str,
        virtual_path: &Path,
        parameters: &Parameters,
    ) -> Result<Simulation> {
        let loader = self.create_loader(extension)?;
        loader.from_source(self, source, virtual_path, parameters)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("imported", &self.imported.keys().collect::<Vec<_>>())
            .finish()
    }
}
