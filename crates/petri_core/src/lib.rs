//! # petri_core - Plugin Host and Simulation Lifecycle
//!
//! Hosts simulations assembled from independently compiled plugins.
//!
//! ## Overview
//!
//! Plugins are compiled into dynamic libraries (or linked in as builtins)
//! and contribute factories for five entity kinds: loaders, initializers,
//! modules, objects and programs. A simulation imports the plugins it needs
//! and creates entities by type name; the host makes sure exactly one
//! imported plugin answers each name.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  plugin binary  │────▶│   libloading    │
//! │ (libpetri_x.so) │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!                                  │ ABI check
//!                                  ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Manager     │────▶│     Library     │
//! │ (load order)    │     │  (owns the Api) │
//! └────────┬────────┘     └─────────────────┘
//!          │ on_load / on_unload
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   Repository    │◀────│     Context     │ ◀── per simulation imports
//! │ (factories)     │     │  (dispatch)     │
//! └─────────────────┘     └────────┬────────┘
//!                                  │ create by type name
//!                                  ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   Simulation    │────▶│   DrawBuffer    │ ──▶ observer thread
//! │ (stepping)      │     │ (front / back)  │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use petri_core::prelude::*;
//! use std::sync::atomic::AtomicBool;
//!
//! let manager = Manager::shared();
//! manager.add_directory("plugins");
//!
//! let mut simulation = Simulation::new(manager.clone());
//! simulation.load_plugin("cells")?;
//!
//! let cell = simulation.create_object("cells.cell", ObjectKind::Dynamic)?;
//! simulation.add_object(cell);
//!
//! let reader = simulation.frame_reader();
//! simulation.initialize(&AtomicBool::new(false))?;
//! while simulation.update()? {
//!     println!("{} objects", reader.latest().objects.len());
//! }
//! simulation.terminate();
//! ```
//!
//! ## Plugin Side
//!
//! ```ignore
//! use petri_core::prelude::*;
//!
//! #[derive(Default)]
//! struct CellsPlugin;
//!
//! impl Api for CellsPlugin {
//!     fn on_load(&self, record: &mut RepositoryRecord) -> Result<()> {
//!         record.register_object("cells.cell", Cell::new);
//!         Ok(())
//!     }
//!
//!     fn on_unload(&self, record: &mut RepositoryRecord) {
//!         record.unregister_object("cells.cell");
//!     }
//! }
//!
//! petri_core::export_plugin!(CellsPlugin);
//! ```

pub mod abi;
mod api;
mod container;
mod context;
mod draw;
mod error;
mod factory;
mod init;
mod library;
mod loader;
mod manager;
mod module;
mod object;
mod parameters;
mod physics;
mod program;
mod repository;
mod simulation;

pub use abi::{Real, Vector, PLUGIN_API_VERSION};
pub use api::{Api, ApiFactory};
pub use container::ObjectContainer;
pub use context::Context;
pub use draw::{DrawBuffer, Frame, FrameReader, ModuleFrame, ObjectFrame};
pub use error::{EntityKind, Error, Result};
pub use factory::{
    FactoryManager, InitializerFactory, LoaderFactory, ModuleFactory, ObjectFactory,
    ProgramFactory,
};
pub use init::Initializer;
pub use library::{file_extension, file_prefix, plugin_name_from_file, Library};
pub use loader::Loader;
pub use manager::Manager;
pub use module::{Module, ModuleContainer};
pub use object::{BasicObject, Object, ObjectData, ObjectId, ObjectKind, ObjectType};
pub use parameters::Parameters;
pub use physics::{Kinematic, Physics};
pub use program::{Program, ProgramContainer};
pub use repository::{Repository, RepositoryRecord};
pub use simulation::{Lifecycle, Simulation, DEFAULT_TIME_STEP};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::abi::{Real, Vector};
    pub use crate::api::Api;
    pub use crate::context::Context;
    pub use crate::draw::{Frame, FrameReader};
    pub use crate::error::{Error, Result};
    pub use crate::init::Initializer;
    pub use crate::loader::Loader;
    pub use crate::manager::Manager;
    pub use crate::module::Module;
    pub use crate::object::{BasicObject, Object, ObjectData, ObjectId, ObjectKind};
    pub use crate::parameters::Parameters;
    pub use crate::program::Program;
    pub use crate::repository::RepositoryRecord;
    pub use crate::simulation::Simulation;
}
