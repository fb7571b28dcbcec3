//! Built-in `basic` plugin, linked into the host

use petri_core::prelude::*;

/// Plain object without behavior
pub const OBJECT: &str = "basic.object";
/// Program holding its object at a fixed velocity
pub const VELOCITY: &str = "basic.velocity";
/// Initializer filling a rectangular grid with objects
pub const GRID: &str = "basic.grid";
/// Module counting objects every step
pub const COUNTER: &str = "basic.counter";

#[derive(Debug, Default)]
pub struct BasicPlugin;

impl Api for BasicPlugin {
    fn on_load(&self, record: &mut RepositoryRecord) -> Result<()> {
        record
            .register_object(OBJECT, BasicObject::new)
            .register_program(VELOCITY, Velocity::default)
            .register_initializer(GRID, Grid::default)
            .register_module(COUNTER, Counter::default);
        Ok(())
    }

    fn on_unload(&self, record: &mut RepositoryRecord) {
        record
            .unregister_object(OBJECT)
            .unregister_program(VELOCITY)
            .unregister_initializer(GRID)
            .unregister_module(COUNTER);
    }
}

/// Overrides the object velocity every step.
///
/// Configured with `velocity` (vector, default `0 0`).
#[derive(Debug, Clone, Default)]
pub struct Velocity {
    velocity: Vector,
}

impl Program for Velocity {
    fn clone_box(&self) -> Box<dyn Program> {
        Box::new(self.clone())
    }

    fn configure(&mut self, parameters: &Parameters, _: &mut Simulation) -> Result<()> {
        if let Some(velocity) = parameters.get_vector("velocity")? {
            self.velocity = velocity;
        }
        Ok(())
    }

    fn call(&mut self, _: &mut Simulation, object: &mut ObjectData, _: Real) -> Result<()> {
        object.velocity = self.velocity;
        Ok(())
    }

    fn store_config(&self, parameters: &mut Parameters) {
        parameters.set("velocity", format!("{} {}", self.velocity.x, self.velocity.y));
    }
}

/// Creates `rows` x `cols` objects of `type` spaced `spacing` apart,
/// starting at `origin`. Every created object is configured with the
/// initializer's remaining parameters.
#[derive(Debug, Clone)]
pub struct Grid {
    type_name: String,
    kind: ObjectKind,
    rows: u32,
    cols: u32,
    spacing: Vector,
    origin: Vector,
    object_parameters: Parameters,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            type_name: OBJECT.to_string(),
            kind: ObjectKind::Dynamic,
            rows: 1,
            cols: 1,
            spacing: Vector::ONE,
            origin: Vector::ZERO,
            object_parameters: Parameters::new(),
        }
    }
}

impl Grid {
    /// Number of objects one call creates
    pub fn object_count(&self) -> u64 {
        u64::from(self.rows) * u64::from(self.cols)
    }
}

const GRID_KEYS: [&str; 6] = ["type", "kind", "rows", "cols", "spacing", "origin"];

impl Initializer for Grid {
    fn clone_box(&self) -> Box<dyn Initializer> {
        Box::new(self.clone())
    }

    fn configure(&mut self, parameters: &Parameters, _: &mut Simulation) -> Result<()> {
        if let Some(type_name) = parameters.get("type") {
            self.type_name = type_name.to_string();
        }
        self.kind = parameters.get_or("kind", self.kind)?;
        self.rows = parameters.get_or("rows", self.rows)?;
        self.cols = parameters.get_or("cols", self.cols)?;
        if let Some(spacing) = parameters.get_vector("spacing")? {
            self.spacing = spacing;
        }
        if let Some(origin) = parameters.get_vector("origin")? {
            self.origin = origin;
        }

        self.object_parameters = parameters
            .iter()
            .filter(|(name, _)| !GRID_KEYS.contains(name))
            .collect();
        Ok(())
    }

    fn call(&mut self, simulation: &mut Simulation) -> Result<()> {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let mut object = simulation.create_object(&self.type_name, self.kind)?;
                object.configure(&self.object_parameters, simulation)?;
                object.data_mut().position =
                    self.origin + self.spacing * Vector::new(col as Real, row as Real);
                simulation.add_object(object);
            }
        }

        log::debug!("Grid created {} `{}` objects", self.object_count(), self.type_name);
        Ok(())
    }
}

/// Tracks how many objects the simulation holds
#[derive(Debug, Default)]
pub struct Counter {
    priority: i32,
    objects: usize,
    steps: u64,
}

impl Module for Counter {
    fn configure(&mut self, parameters: &Parameters, _: &mut Simulation) -> Result<()> {
        self.priority = parameters.get_or("priority", self.priority)?;
        Ok(())
    }

    fn init(&mut self, simulation: &mut Simulation) -> Result<()> {
        self.objects = simulation.object_count();
        self.steps = 0;
        Ok(())
    }

    fn update(&mut self, simulation: &mut Simulation, _: Real) -> Result<()> {
        self.objects = simulation.object_count();
        self.steps += 1;
        Ok(())
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn draw_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "objects": self.objects,
            "steps": self.steps,
        }))
    }

    fn store_config(&self, parameters: &mut Parameters) {
        if self.priority != 0 {
            parameters.set("priority", self.priority.to_string());
        }
    }
}
