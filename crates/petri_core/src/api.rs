//! Plugin API - the object every plugin hands to the host

use std::sync::Arc;

use crate::error::Result;
use crate::repository::RepositoryRecord;
use crate::simulation::Simulation;

/// Implemented by every plugin.
///
/// The host calls [`Api::on_load`] once the plugin and everything it
/// requires are loaded, and [`Api::on_unload`] in reverse load order at
/// shutdown. Per-simulation hooks run when a simulation imports the plugin
/// and when it terminates.
pub trait Api: Send + Sync {
    /// Names of plugins that must be loaded (and imported) before this one
    fn required_plugins(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of plugins that cannot be imported together with this one
    fn conflict_plugins(&self) -> Vec<String> {
        Vec::new()
    }

    /// Register factories into the plugin's repository record
    fn on_load(&self, record: &mut RepositoryRecord) -> Result<()> {
        let _ = record;
        Ok(())
    }

    /// Remove everything registered in [`Api::on_load`]
    fn on_unload(&self, record: &mut RepositoryRecord) {
        let _ = record;
    }

    /// Called when a simulation imports the plugin
    fn init_simulation(&self, simulation: &mut Simulation) -> Result<()> {
        let _ = simulation;
        Ok(())
    }

    /// Called when a simulation that imported the plugin terminates
    fn finalize_simulation(&self, simulation: &mut Simulation) {
        let _ = simulation;
    }
}

/// Constructor of a statically linked plugin
pub type ApiFactory = Arc<dyn Fn() -> Box<dyn Api> + Send + Sync>;
