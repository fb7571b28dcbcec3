//! Simulated world objects
//!
//! Every object embeds an [`ObjectData`] with the state the host needs for
//! physics, bounds checking and drawing. Plugin object types wrap it and add
//! their own behavior through [`Object::update`].

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::abi::{Real, Vector};
use crate::error::{Error, Result};
use crate::parameters::Parameters;
use crate::program::Program;
use crate::simulation::Simulation;

/// Identifier of an object within one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How physics treats an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Never moves
    Static,
    /// Moved by forces, velocity and gravity
    #[default]
    Dynamic,
    /// Fixed position, may rotate
    Pinned,
}

impl std::str::FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(ObjectKind::Static),
            "dynamic" => Ok(ObjectKind::Dynamic),
            "pinned" => Ok(ObjectKind::Pinned),
            other => Err(Error::InvalidArgument(format!("unknown object kind '{}'", other))),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Static => write!(f, "static"),
            ObjectKind::Dynamic => write!(f, "dynamic"),
            ObjectKind::Pinned => write!(f, "pinned"),
        }
    }
}

struct AttachedProgram {
    /// Template or type name the program was created from
    name: Option<String>,
    program: Box<dyn Program>,
    ready: bool,
}

/// State shared by every object type
pub struct ObjectData {
    pub id: ObjectId,
    pub type_name: String,
    pub kind: ObjectKind,
    pub position: Vector,
    pub rotation: Real,
    pub velocity: Vector,
    pub angular_velocity: Real,
    /// Force accumulated during the current step
    pub force: Vector,
    pub mass: Real,
    pub visible: bool,
    values: IndexMap<String, Real>,
    programs: Vec<AttachedProgram>,
}

impl ObjectData {
    pub fn new(type_name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id: ObjectId::default(),
            type_name: type_name.into(),
            kind,
            position: Vector::ZERO,
            rotation: 0.0,
            velocity: Vector::ZERO,
            angular_velocity: 0.0,
            force: Vector::ZERO,
            mass: 1.0,
            visible: true,
            values: IndexMap::new(),
            programs: Vec::new(),
        }
    }

    /// Accumulate a force for the current step
    pub fn apply_force(&mut self, force: Vector) {
        self.force += force;
    }

    /// Change velocity immediately
    pub fn apply_linear_impulse(&mut self, impulse: Vector) {
        if self.kind == ObjectKind::Dynamic && self.mass > 0.0 {
            self.velocity += impulse / self.mass;
        }
    }

    /// Reset per-step transient state
    pub fn clear_forces(&mut self) {
        self.force = Vector::ZERO;
    }

    /// Named scalar value (concentrations, volume, ...)
    pub fn value(&self, name: &str) -> Option<Real> {
        self.values.get(name).copied()
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: Real) {
        self.values.insert(name.into(), value);
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, Real)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn add_program(&mut self, program: Box<dyn Program>) {
        self.programs.push(AttachedProgram {
            name: None,
            program,
            ready: false,
        });
    }

    /// Attach a program and remember the name it was created from, so
    /// the object's configuration can be written back
    pub fn add_named_program(&mut self, name: impl Into<String>, program: Box<dyn Program>) {
        self.programs.push(AttachedProgram {
            name: Some(name.into()),
            program,
            ready: false,
        });
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Names of programs attached with [`ObjectData::add_named_program`]
    pub fn program_names(&self) -> impl Iterator<Item = &str> {
        self.programs.iter().filter_map(|p| p.name.as_deref())
    }

    /// Apply the common configuration keys.
    ///
    /// Recognized: `position`, `velocity`, `rotation`, `mass`, `visible`,
    /// `kind` and `programs` (comma separated program names).
    pub fn configure(&mut self, parameters: &Parameters, simulation: &mut Simulation) -> Result<()> {
        if let Some(position) = parameters.get_vector("position")? {
            self.position = position;
        }
        if let Some(velocity) = parameters.get_vector("velocity")? {
            self.velocity = velocity;
        }
        if let Some(rotation) = parameters.get_parsed("rotation")? {
            self.rotation = rotation;
        }
        if let Some(mass) = parameters.get_parsed::<Real>("mass")? {
            if mass <= 0.0 {
                return Err(Error::InvalidArgument(format!("object mass must be positive, got {}", mass)));
            }
            self.mass = mass;
        }
        if let Some(visible) = parameters.get_parsed("visible")? {
            self.visible = visible;
        }
        if let Some(kind) = parameters.get_parsed("kind")? {
            self.kind = kind;
        }
        for name in parameters.get_list("programs") {
            let program = simulation.program(&name)?;
            self.add_named_program(name, program);
        }

        Ok(())
    }

    /// Run every attached program once
    pub fn run_programs(&mut self, simulation: &mut Simulation, dt: Real) -> Result<()> {
        // Programs need `&mut self` alongside the object
        let mut programs = std::mem::take(&mut self.programs);

        let result = programs.iter_mut().try_for_each(|attached| {
            if !attached.ready {
                attached.program.init(simulation, self)?;
                attached.ready = true;
            }
            attached.program.call(simulation, self, dt)
        });

        // Programs attached while running go after the existing ones
        programs.append(&mut self.programs);
        self.programs = programs;

        result
    }

    /// Write the names of attached programs as `programs`
    pub fn store_programs(&self, parameters: &mut Parameters) {
        let names: Vec<&str> = self.program_names().collect();
        if !names.is_empty() {
            parameters.set("programs", names.join(", "));
        }
    }

    pub(crate) fn terminate_programs(&mut self, simulation: &mut Simulation) {
        for attached in &mut self.programs {
            if attached.ready {
                attached.program.terminate(simulation);
                attached.ready = false;
            }
        }
    }
}

impl Clone for ObjectData {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            type_name: self.type_name.clone(),
            kind: self.kind,
            position: self.position,
            rotation: self.rotation,
            velocity: self.velocity,
            angular_velocity: self.angular_velocity,
            force: self.force,
            mass: self.mass,
            visible: self.visible,
            values: self.values.clone(),
            programs: self
                .programs
                .iter()
                .map(|p| AttachedProgram {
                    name: p.name.clone(),
                    program: p.program.clone_box(),
                    ready: false,
                })
                .collect(),
        }
    }
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectData")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("position", &self.position)
            .field("velocity", &self.velocity)
            .field("mass", &self.mass)
            .field("programs", &self.programs.len())
            .finish()
    }
}

/// A simulated world object
pub trait Object: Send {
    fn data(&self) -> &ObjectData;

    fn data_mut(&mut self) -> &mut ObjectData;

    fn configure(&mut self, parameters: &Parameters, simulation: &mut Simulation) -> Result<()> {
        self.data_mut().configure(parameters, simulation)
    }

    /// Advance by one step; the default runs the attached programs
    fn update(&mut self, simulation: &mut Simulation, dt: Real) -> Result<()> {
        self.data_mut().run_programs(simulation, dt)
    }

    /// Extra drawable state published with the frame
    fn draw_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Write configuration that recreates this object
    fn store_config(&self, parameters: &mut Parameters) {
        let data = self.data();
        parameters.set("kind", data.kind.to_string());
        parameters.set("position", format!("{} {}", data.position.x, data.position.y));
        if data.velocity != Vector::ZERO {
            parameters.set("velocity", format!("{} {}", data.velocity.x, data.velocity.y));
        }
        if data.mass != 1.0 {
            parameters.set("mass", data.mass.to_string());
        }
        if !data.visible {
            parameters.set("visible", "false");
        }
        data.store_programs(parameters);
    }
}

/// Object type without behavior of its own
#[derive(Debug, Clone)]
pub struct BasicObject {
    data: ObjectData,
}

impl BasicObject {
    pub fn new(data: ObjectData) -> Self {
        Self { data }
    }
}

impl Object for BasicObject {
    fn data(&self) -> &ObjectData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ObjectData {
        &mut self.data
    }
}

/// User defined object type: a base type plus preset configuration
#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub base: String,
    pub parameters: Parameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_respects_mass_and_kind() {
        let mut data = ObjectData::new("ball", ObjectKind::Dynamic);
        data.mass = 2.0;
        data.apply_linear_impulse(Vector::new(4.0, 0.0));
        assert_eq!(data.velocity, Vector::new(2.0, 0.0));

        let mut wall = ObjectData::new("wall", ObjectKind::Static);
        wall.apply_linear_impulse(Vector::new(4.0, 0.0));
        assert_eq!(wall.velocity, Vector::ZERO);
    }

    #[test]
    fn test_forces_accumulate_until_cleared() {
        let mut data = ObjectData::new("ball", ObjectKind::Dynamic);
        data.apply_force(Vector::new(1.0, 2.0));
        data.apply_force(Vector::new(1.0, 0.0));
        assert_eq!(data.force, Vector::new(2.0, 2.0));

        data.clear_forces();
        assert_eq!(data.force, Vector::ZERO);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Pinned".parse::<ObjectKind>().unwrap(), ObjectKind::Pinned);
        assert!("floating".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn test_store_config_skips_defaults() {
        let mut data = ObjectData::new("ball", ObjectKind::Dynamic);
        data.position = Vector::new(1.0, -1.0);
        let object = BasicObject::new(data);

        let mut params = Parameters::new();
        object.store_config(&mut params);
        assert_eq!(params.get("position"), Some("1 -1"));
        assert_eq!(params.get("kind"), Some("dynamic"));
        assert!(!params.exists("velocity"));
        assert!(!params.exists("mass"));
    }

    #[derive(Clone)]
    struct Idle;

    impl Program for Idle {
        fn clone_box(&self) -> Box<dyn Program> {
            Box::new(self.clone())
        }

        fn call(&mut self, _: &mut Simulation, _: &mut ObjectData, _: Real) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_store_config_lists_named_programs() {
        let mut data = ObjectData::new("ball", ObjectKind::Dynamic);
        data.add_named_program("mover", Box::new(Idle));
        data.add_program(Box::new(Idle));
        data.add_named_program("spinner", Box::new(Idle));

        let copy = data.clone();
        assert_eq!(copy.program_names().collect::<Vec<_>>(), vec!["mover", "spinner"]);

        let mut params = Parameters::new();
        BasicObject::new(copy).store_config(&mut params);
        assert_eq!(params.get_list("programs"), vec!["mover", "spinner"]);
    }
}
