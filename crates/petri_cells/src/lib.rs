//! # petri_cells - Cell Plugin
//!
//! Dynamically loadable plugin providing:
//!
//! - `cells.cell` object: grows and divides
//! - `cells.drift` program: constant force on its object
//!
//! Build as a `cdylib` and drop `libpetri_cells.so` (or the platform
//! equivalent) into a plugin directory.

mod cell;
mod drift;

pub use cell::{Cell, DEFAULT_GROWTH_RATE, DEFAULT_VOLUME};
pub use drift::Drift;

use petri_core::prelude::*;

/// Object type name of [`Cell`]
pub const CELL: &str = "cells.cell";

/// Program type name of [`Drift`]
pub const DRIFT: &str = "cells.drift";

#[derive(Debug, Default)]
pub struct CellsPlugin;

impl Api for CellsPlugin {
    fn on_load(&self, record: &mut RepositoryRecord) -> Result<()> {
        record
            .register_object(CELL, Cell::new)
            .register_program(DRIFT, Drift::default);
        Ok(())
    }

    fn on_unload(&self, record: &mut RepositoryRecord) {
        record.unregister_object(CELL).unregister_program(DRIFT);
    }

    fn init_simulation(&self, simulation: &mut Simulation) -> Result<()> {
        if !simulation.has_parameter("cells.growth-rate") {
            simulation.set_parameter("cells.growth-rate", DEFAULT_GROWTH_RATE.to_string());
        }
        Ok(())
    }
}

petri_core::export_plugin!(CellsPlugin);
