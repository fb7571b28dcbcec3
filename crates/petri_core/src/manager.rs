//! Plugin manager
//!
//! Discovers plugin binaries in configured directories, keeps loaded
//! [`Library`] instances and activates plugins in dependency order.

use crate::api::ApiFactory;
use crate::error::{Error, Result};
use crate::library::{self, Library};
use crate::repository::Repository;
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Default)]
struct State {
    /// Directories scanned for plugin binaries
    directories: Vec<PathBuf>,
    /// Statically linked plugins
    builtins: IndexMap<String, ApiFactory>,
    /// Discovered plugin binaries
    extern_plugins: IndexMap<String, PathBuf>,
    /// Created libraries, active or not
    libraries: IndexMap<String, Arc<Library>>,
    /// Active plugins in activation order
    load_order: Vec<String>,
}

/// Owns every plugin of the process.
///
/// Create one per host and share it as `Arc<Manager>` with every
/// [`Context`](crate::context::Context). Loading and unloading are expected
/// during setup and teardown only, not while simulations are stepping.
pub struct Manager {
    state: RwLock<State>,
    repository: RwLock<Repository>,
}

impl Manager {
    /// Create a manager without directories or builtins
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            repository: RwLock::new(Repository::new()),
        }
    }

    /// Create a shared manager
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ========== Discovery ==========

    /// Register a statically linked plugin
    pub fn register_builtin<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn crate::api::Api> + Send + Sync + 'static,
    {
        let name = name.into();
        log::debug!("Registering builtin plugin '{}'", name);

        let factory: ApiFactory = Arc::new(factory);
        self.state.write().builtins.insert(name, factory);
    }

    /// Add a plugin directory and scan it
    pub fn add_directory(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state.write();

        if !state.directories.contains(&path) {
            state.directories.push(path.clone());
        }
        scan_directory(&path, &mut state.extern_plugins);
    }

    /// Rebuild the discovered plugin list from every directory
    pub fn rescan(&self) {
        let mut state = self.state.write();
        let state = &mut *state;

        state.extern_plugins.clear();
        for directory in &state.directories {
            scan_directory(directory, &mut state.extern_plugins);
        }
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        self.state.read().directories.clone()
    }

    pub fn builtin_names(&self) -> Vec<String> {
        self.state.read().builtins.keys().cloned().collect()
    }

    pub fn extern_names(&self) -> Vec<String> {
        self.state.read().extern_plugins.keys().cloned().collect()
    }

    /// Every plugin that can be loaded, builtins first
    pub fn names(&self) -> Vec<String> {
        let state = self.state.read();
        let mut names: Vec<String> = state.builtins.keys().cloned().collect();
        for name in state.extern_plugins.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn is_available(&self, name: &str) -> bool {
        let state = self.state.read();
        state.builtins.contains_key(name) || state.extern_plugins.contains_key(name)
    }

    /// Binary a plugin would be loaded from
    pub fn plugin_path(&self, name: &str) -> Option<PathBuf> {
        self.state.read().extern_plugins.get(name).cloned()
    }

    // ========== Loading ==========

    /// Load and activate a plugin and everything it requires.
    ///
    /// Loading an active plugin returns the existing library.
    pub fn load(&self, name: &str) -> Result<Arc<Library>> {
        let mut state = self.state.write();
        let mut repository = self.repository.write();
        let mut chain = Vec::new();

        load_locked(&mut state, &mut repository, name, &mut chain)
    }

    /// Load every available plugin
    pub fn load_all(&self) -> Result<()> {
        for name in self.names() {
            self.load(&name)?;
        }
        Ok(())
    }

    /// Deactivate every plugin in reverse activation order
    pub fn unload_all(&self) {
        let mut state = self.state.write();
        let mut repository = self.repository.write();

        while let Some(name) = state.load_order.pop() {
            let Some(library) = state.libraries.get(&name) else {
                continue;
            };

            let mut record = repository.unregister_api(&name).unwrap_or_default();
            library.api().on_unload(&mut record);

            if !record.is_empty() {
                log::warn!("Plugin '{}' left factories registered after unload", name);
            }

            log::info!("Plugin unloaded `{}`", name);
        }
    }

    /// Deactivate every plugin and close their libraries
    pub fn release_plugins(&self) {
        self.unload_all();

        let libraries: Vec<(String, Arc<Library>)> = self.state.write().libraries.drain(..).collect();

        for (name, library) in libraries.into_iter().rev() {
            if Arc::strong_count(&library) > 1 {
                log::warn!("Plugin '{}' is still referenced, it will close when released", name);
            }
            drop(library);
        }
    }

    /// Whether a plugin is active
    pub fn is_loaded(&self, name: &str) -> bool {
        self.state.read().load_order.iter().any(|n| n == name)
    }

    /// Library of an active plugin
    pub fn get(&self, name: &str) -> Option<Arc<Library>> {
        let state = self.state.read();
        if state.load_order.iter().any(|n| n == name) {
            state.libraries.get(name).cloned()
        } else {
            None
        }
    }

    /// Active plugins in activation order
    pub fn load_order(&self) -> Vec<String> {
        self.state.read().load_order.clone()
    }

    /// Read access to the factories of active plugins
    pub fn repository(&self) -> RwLockReadGuard<'_, Repository> {
        self.repository.read()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.release_plugins();
    }
}

fn load_locked(
    state: &mut State,
    repository: &mut Repository,
    name: &str,
    chain: &mut Vec<String>,
) -> Result<Arc<Library>> {
    if state.load_order.iter().any(|n| n == name) {
        if let Some(library) = state.libraries.get(name) {
            return Ok(library.clone());
        }
    }

    if chain.iter().any(|n| n == name) {
        let mut cycle = chain.clone();
        cycle.push(name.to_string());
        return Err(Error::DependencyCycle { chain: cycle });
    }

    let library = match state.libraries.get(name) {
        Some(library) => library.clone(),
        None => Arc::new(create_library(state, name)?),
    };

    // Dependencies first so `on_load` can rely on them; the library only
    // becomes visible once they all succeeded
    chain.push(name.to_string());
    for required in library.api().required_plugins() {
        log::debug!("Plugin '{}' requires '{}'", name, required);
        load_locked(state, repository, &required, chain)?;
    }
    chain.pop();

    state
        .libraries
        .entry(name.to_string())
        .or_insert_with(|| library.clone());

    let record = repository.register_api(name);
    if let Err(err) = library.api().on_load(record) {
        let mut record = repository.unregister_api(name).unwrap_or_default();
        library.api().on_unload(&mut record);
        return Err(err);
    }

    if !state.load_order.iter().any(|n| n == name) {
        state.load_order.push(name.to_string());
    }

    log::info!("Plugin loaded `{}`", name);

    Ok(library)
}

fn create_library(state: &State, name: &str) -> Result<Library> {
    if let Some(factory) = state.builtins.get(name) {
        return Ok(Library::builtin(name, factory()));
    }

    match state.extern_plugins.get(name) {
        Some(path) => Library::load_dynamic(name, path),
        None => Err(Error::PluginNotFound(name.to_string())),
    }
}

fn scan_directory(directory: &Path, plugins: &mut IndexMap<String, PathBuf>) {
    log::debug!("Scanning plugin directory: {}", directory.display());

    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("Unable to scan plugin directory {}: {}", directory.display(), err);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };

        if let Some(name) = library::plugin_name_from_file(file_name) {
            if plugins.contains_key(name) {
                log::debug!("Plugin '{}' already found, skipping {}", name, path.display());
                continue;
            }
            log::debug!("Found plugin '{}': {}", name, path.display());
            plugins.insert(name.to_string(), path);
        }
    }
}
