//! TOML scene files
//!
//! # Format
//!
//! ```toml
//! plugins = ["basic", "cells"]
//! plugin-dirs = ["plugins"]          # relative to the scene file
//!
//! [simulation]
//! dt = 0.5
//! iterations = 200
//! world-size = [100, 100]
//!
//! [parameters]
//! "cells.growth-rate" = 0.2
//!
//! [[type]]
//! name = "heavy"
//! base = "basic.object"
//! mass = 10
//!
//! [[program]]
//! name = "mover"
//! type = "basic.velocity"
//! velocity = [1, 0]
//!
//! [[module]]
//! name = "counter"
//! type = "basic.counter"
//!
//! [[object]]
//! type = "heavy"
//! position = [1, 2]
//! programs = ["mover"]
//!
//! [[init]]
//! type = "basic.grid"
//! rows = 4
//! cols = 4
//! ```
//!
//! Entries other than `type`, `name` and `base` become entity parameters:
//! numbers and booleans as written, arrays of numbers space separated
//! (vectors), arrays of strings comma separated (lists).

use std::path::Path;

use petri_core::prelude::*;
use serde::{Deserialize, Serialize};

/// Loader plugin name
pub const PLUGIN: &str = "toml";

/// File extension handled by [`TomlLoader`]
pub const EXTENSION: &str = "toml";

#[derive(Debug, Default)]
pub struct TomlPlugin;

impl Api for TomlPlugin {
    fn on_load(&self, record: &mut RepositoryRecord) -> Result<()> {
        record.register_loader(EXTENSION, TomlLoader::default);
        Ok(())
    }

    fn on_unload(&self, record: &mut RepositoryRecord) {
        record.unregister_loader(EXTENSION);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Scene {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    plugins: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    plugin_dirs: Vec<String>,
    #[serde(skip_serializing_if = "toml::Table::is_empty")]
    simulation: toml::Table,
    #[serde(skip_serializing_if = "toml::Table::is_empty")]
    parameters: toml::Table,
    #[serde(rename = "type", skip_serializing_if = "Vec::is_empty")]
    types: Vec<TypeEntry>,
    #[serde(rename = "program", skip_serializing_if = "Vec::is_empty")]
    programs: Vec<Entry>,
    #[serde(rename = "module", skip_serializing_if = "Vec::is_empty")]
    modules: Vec<Entry>,
    #[serde(rename = "object", skip_serializing_if = "Vec::is_empty")]
    objects: Vec<Entry>,
    #[serde(rename = "init", skip_serializing_if = "Vec::is_empty")]
    initializers: Vec<Entry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TypeEntry {
    name: String,
    base: String,
    #[serde(flatten)]
    parameters: toml::Table,
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(flatten)]
    parameters: toml::Table,
}

impl Entry {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.type_name)
    }
}

/// Reads and writes `.toml` scene files
#[derive(Debug, Default)]
pub struct TomlLoader;

impl Loader for TomlLoader {
    fn from_source(
        &self,
        context: &Context,
        source: &str,
        virtual_path: &Path,
        parameters: &Parameters,
    ) -> Result<Simulation> {
        let scene: Scene =
            toml::from_str(source).map_err(|e| Error::loader(virtual_path, e.to_string()))?;
        let table = |t: &toml::Table| to_parameters(t, virtual_path);

        let base_dir = virtual_path.parent().unwrap_or_else(|| Path::new(""));
        for dir in &scene.plugin_dirs {
            context.manager().add_directory(base_dir.join(dir));
        }

        let mut simulation = Simulation::with_context(Context::new(context.manager().clone()));

        for plugin in &scene.plugins {
            simulation.load_plugin(plugin)?;
        }

        simulation.configure(&table(&scene.simulation)?)?;

        for (name, value) in table(&scene.parameters)?.iter() {
            simulation.set_parameter(name, value);
        }
        // Host parameters win over the file
        for (name, value) in parameters.iter() {
            simulation.set_parameter(name, value);
        }

        for entry in &scene.types {
            simulation.add_object_type(&entry.name, &entry.base, table(&entry.parameters)?)?;
        }

        for entry in &scene.programs {
            let mut program = simulation.program(&entry.type_name)?;
            program.configure(&table(&entry.parameters)?, &mut simulation)?;
            simulation.add_program_of_type(entry.name(), &entry.type_name, program);
        }

        for entry in &scene.modules {
            let mut module = simulation.create_module(&entry.type_name)?;
            module.configure(&table(&entry.parameters)?, &mut simulation)?;
            simulation.add_module_of_type(entry.name(), &entry.type_name, module);
        }

        for entry in &scene.objects {
            let mut object = simulation.create_object(&entry.type_name, ObjectKind::default())?;
            object.configure(&table(&entry.parameters)?, &mut simulation)?;
            simulation.add_object(object);
        }

        for entry in &scene.initializers {
            let mut initializer = simulation.create_initializer(&entry.type_name)?;
            initializer.configure(&table(&entry.parameters)?, &mut simulation)?;
            simulation.add_initializer(initializer);
        }

        log::info!(
            "Loaded scene {} ({} plugins, {} objects)",
            virtual_path.display(),
            scene.plugins.len(),
            simulation.pending_object_count()
        );
        Ok(simulation)
    }

    fn to_source(&self, simulation: &Simulation, virtual_path: &Path) -> Result<String> {
        let mut scene = Scene {
            plugins: simulation.context().imported_names(),
            ..Scene::default()
        };

        let mut config = Parameters::new();
        simulation.store_config(&mut config);
        scene.simulation = to_table(&config);
        scene.parameters = to_table(simulation.parameters());

        for object_type in simulation.object_types() {
            scene.types.push(TypeEntry {
                name: object_type.name.clone(),
                base: object_type.base.clone(),
                parameters: to_table(&object_type.parameters),
            });
        }

        let programs = simulation.programs();
        for (name, program) in programs.iter() {
            let mut parameters = Parameters::new();
            program.store_config(&mut parameters);

            let type_name = programs.type_name(name).unwrap_or(name);
            scene.programs.push(Entry {
                type_name: type_name.to_string(),
                name: (type_name != name).then(|| name.to_string()),
                parameters: to_table(&parameters),
            });
        }

        let modules = simulation.modules();
        for (name, module) in modules.iter() {
            let mut parameters = Parameters::new();
            module.store_config(&mut parameters);

            // Modules added without a type are assumed to be named after it
            let type_name = modules.type_name(name).unwrap_or(name);
            scene.modules.push(Entry {
                type_name: type_name.to_string(),
                name: (type_name != name).then(|| name.to_string()),
                parameters: to_table(&parameters),
            });
        }

        for object in simulation.objects() {
            let data = object.data();
            if simulation.is_object_deleted(data.id) {
                continue;
            }
            let mut parameters = Parameters::new();
            object.store_config(&mut parameters);
            scene.objects.push(Entry {
                type_name: data.type_name.clone(),
                name: None,
                parameters: to_table(&parameters),
            });
        }

        toml::to_string(&scene).map_err(|e| Error::loader(virtual_path, e.to_string()))
    }
}

/// Flatten a TOML table into string parameters
fn to_parameters(table: &toml::Table, path: &Path) -> Result<Parameters> {
    let mut parameters = Parameters::new();
    for (name, value) in table {
        let value = to_parameter(value)
            .ok_or_else(|| Error::loader(path, format!("unsupported value for '{}': {}", name, value)))?;
        parameters.set(name, value);
    }
    Ok(parameters)
}

fn to_parameter(value: &toml::Value) -> Option<String> {
    use toml::Value;

    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(items) => {
            let numeric = items.iter().all(|v| v.is_integer() || v.is_float());
            let textual = items.iter().all(Value::is_str);
            let parts: Option<Vec<String>> = items.iter().map(to_parameter).collect();
            match (numeric, textual) {
                (true, _) => parts.map(|p| p.join(" ")),
                (_, true) => parts.map(|p| p.join(", ")),
                _ => None,
            }
        }
        Value::Table(_) => None,
    }
}

/// Turn string parameters back into typed TOML values
fn to_table(parameters: &Parameters) -> toml::Table {
    parameters
        .iter()
        .map(|(name, value)| (name.to_string(), to_value(value)))
        .collect()
}

fn to_value(raw: &str) -> toml::Value {
    use toml::Value;

    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::Float(f);
        }
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Boolean(b);
    }

    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() > 1 {
        let numbers: Option<Vec<Value>> = parts
            .iter()
            .map(|p| p.parse::<f64>().ok().filter(|f| f.is_finite()).map(Value::Float))
            .collect();
        if let Some(numbers) = numbers {
            return Value::Array(numbers);
        }
    }

    Value::String(raw.to_string())
}
