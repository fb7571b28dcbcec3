//! Initializers: one-shot setup run by `Simulation::initialize`

use crate::error::Result;
use crate::parameters::Parameters;
use crate::simulation::Simulation;

/// Runs once when the simulation initializes, typically to populate it
pub trait Initializer: Send {
    /// Create an independent copy
    fn clone_box(&self) -> Box<dyn Initializer>;

    fn configure(&mut self, parameters: &Parameters, simulation: &mut Simulation) -> Result<()> {
        let _ = (parameters, simulation);
        Ok(())
    }

    fn call(&mut self, simulation: &mut Simulation) -> Result<()>;
}

impl Clone for Box<dyn Initializer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
