//! Behavior programs attached to objects

use indexmap::IndexMap;

use crate::abi::Real;
use crate::error::Result;
use crate::object::ObjectData;
use crate::parameters::Parameters;
use crate::simulation::Simulation;

/// Behavior run by an object every step.
///
/// Named programs are stored in the simulation as templates and cloned for
/// every object that uses them, so each object gets independent state.
pub trait Program: Send {
    /// Create an independent copy
    fn clone_box(&self) -> Box<dyn Program>;

    fn configure(&mut self, parameters: &Parameters, simulation: &mut Simulation) -> Result<()> {
        let _ = (parameters, simulation);
        Ok(())
    }

    /// Called once before the first [`Program::call`]
    fn init(&mut self, simulation: &mut Simulation, object: &mut ObjectData) -> Result<()> {
        let _ = (simulation, object);
        Ok(())
    }

    /// Execute for one object and one step
    fn call(&mut self, simulation: &mut Simulation, object: &mut ObjectData, dt: Real) -> Result<()>;

    fn terminate(&mut self, simulation: &mut Simulation) {
        let _ = simulation;
    }

    /// Write configuration that recreates this program
    fn store_config(&self, parameters: &mut Parameters) {
        let _ = parameters;
    }
}

impl Clone for Box<dyn Program> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

pub(crate) struct Template {
    pub(crate) type_name: Option<String>,
    pub(crate) program: Box<dyn Program>,
}

/// Named program templates of one simulation
#[derive(Default)]
pub struct ProgramContainer {
    templates: IndexMap<String, Template>,
}

impl ProgramContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, program: Box<dyn Program>) {
        self.templates.insert(
            name.into(),
            Template {
                type_name: None,
                program,
            },
        );
    }

    /// Add a template and remember the plugin type it was created from
    pub fn add_typed(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        program: Box<dyn Program>,
    ) {
        self.templates.insert(
            name.into(),
            Template {
                type_name: Some(type_name.into()),
                program,
            },
        );
    }

    pub fn exists(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Clone the template registered under `name`
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Program>> {
        self.templates.get(name).map(|t| t.program.clone_box())
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Program>> {
        self.templates.shift_remove(name).map(|t| t.program)
    }

    /// Type the template was created from, if added with [`ProgramContainer::add_typed`]
    pub fn type_name(&self, name: &str) -> Option<&str> {
        self.templates.get(name).and_then(|t| t.type_name.as_deref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Templates in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Program)> {
        self.templates
            .iter()
            .map(|(name, t)| (name.as_str(), t.program.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<(String, Template)> {
        self.templates.drain(..).collect()
    }

    pub(crate) fn restore(&mut self, templates: Vec<(String, Template)>) {
        // Templates added while the old ones were out keep priority
        for (name, template) in templates {
            self.templates.entry(name).or_insert(template);
        }
    }
}
