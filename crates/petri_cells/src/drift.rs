//! Program pushing its object in a fixed direction

use petri_core::prelude::*;

/// Applies a constant force every step.
///
/// Configured with `force` (vector, default `1 0`).
#[derive(Debug, Clone)]
pub struct Drift {
    force: Vector,
}

impl Default for Drift {
    fn default() -> Self {
        Self {
            force: Vector::new(1.0, 0.0),
        }
    }
}

impl Drift {
    pub fn new(force: Vector) -> Self {
        Self { force }
    }
}

impl Program for Drift {
    fn clone_box(&self) -> Box<dyn Program> {
        Box::new(self.clone())
    }

    fn configure(&mut self, parameters: &Parameters, _: &mut Simulation) -> Result<()> {
        if let Some(force) = parameters.get_vector("force")? {
            self.force = force;
        }
        Ok(())
    }

    fn call(&mut self, _: &mut Simulation, object: &mut ObjectData, _: Real) -> Result<()> {
        object.apply_force(self.force);
        Ok(())
    }

    fn store_config(&self, parameters: &mut Parameters) {
        parameters.set("force", format!("{} {}", self.force.x, self.force.y));
    }
}
