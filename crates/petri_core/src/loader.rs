//! Simulation file loaders
//!
//! Loaders are registered under the file extension they handle (without the
//! leading dot) and turn a scene description into a configured simulation.

use std::path::Path;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::parameters::Parameters;
use crate::simulation::Simulation;

/// Reads and writes simulations in one file format
pub trait Loader: Send {
    /// Read a simulation from a file
    fn from_file(&self, context: &Context, path: &Path, parameters: &Parameters) -> Result<Simulation> {
        let source = std::fs::read_to_string(path).map_err(|e| Error::loader(path, e.to_string()))?;
        self.from_source(context, &source, path, parameters)
    }

    /// Read a simulation from text; `virtual_path` resolves relative references
    fn from_source(
        &self,
        context: &Context,
        source: &str,
        virtual_path: &Path,
        parameters: &Parameters,
    ) -> Result<Simulation>;

    /// Write a simulation to a file
    fn to_file(&self, simulation: &Simulation, path: &Path) -> Result<()> {
        let source = self.to_source(simulation, path)?;
        std::fs::write(path, source)?;
        Ok(())
    }

    /// Write a simulation as text
    fn to_source(&self, simulation: &Simulation, virtual_path: &Path) -> Result<String>;
}
