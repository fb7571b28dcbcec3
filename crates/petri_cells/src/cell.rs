//! Growing cell that divides once its volume doubles

use petri_core::prelude::*;

/// Default volume of a new cell
pub const DEFAULT_VOLUME: Real = 1.0;

/// Default volume growth per time unit
pub const DEFAULT_GROWTH_RATE: Real = 0.1;

/// A cell object.
///
/// Volume grows linearly; at `division-volume` (twice the initial volume by
/// default) the cell splits into two cells of half the volume. The daughter
/// is spawned while objects are updating and updates within the same step.
pub struct Cell {
    data: ObjectData,
    growth_rate: Real,
    division_volume: Real,
}

impl Cell {
    pub fn new(mut data: ObjectData) -> Self {
        data.set_value("volume", DEFAULT_VOLUME);
        data.set_value("generation", 0.0);

        Self {
            data,
            growth_rate: DEFAULT_GROWTH_RATE,
            division_volume: 2.0 * DEFAULT_VOLUME,
        }
    }

    pub fn volume(&self) -> Real {
        self.data.value("volume").unwrap_or(DEFAULT_VOLUME)
    }

    pub fn generation(&self) -> u32 {
        self.data.value("generation").unwrap_or(0.0) as u32
    }

    /// Radius of a disc with the cell's volume as area
    pub fn radius(&self) -> Real {
        (self.volume() / std::f64::consts::PI).sqrt()
    }

    fn divide(&mut self, simulation: &mut Simulation) {
        let volume = self.volume() / 2.0;
        let generation = self.data.value("generation").unwrap_or(0.0) + 1.0;

        self.data.set_value("volume", volume);
        self.data.set_value("generation", generation);

        let mut data = self.data.clone();
        data.position += Vector::new(2.0 * self.radius(), 0.0);

        let daughter = Cell {
            data,
            growth_rate: self.growth_rate,
            division_volume: self.division_volume,
        };
        let id = simulation.add_object(Box::new(daughter));

        log::debug!("Cell {} divided into {} (generation {})", self.data.id, id, generation);
    }
}

impl Object for Cell {
    fn data(&self) -> &ObjectData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ObjectData {
        &mut self.data
    }

    fn configure(&mut self, parameters: &Parameters, simulation: &mut Simulation) -> Result<()> {
        self.data.configure(parameters, simulation)?;

        let volume = parameters.get_or("volume", self.volume())?;
        if volume <= 0.0 {
            return Err(Error::InvalidArgument(format!("cell volume must be positive, got {}", volume)));
        }
        self.data.set_value("volume", volume);

        // Per-cell rate wins over the simulation-wide one
        let shared_rate = simulation
            .parameters()
            .get_or("cells.growth-rate", self.growth_rate)?;
        self.growth_rate = parameters.get_or("growth-rate", shared_rate)?;
        self.division_volume = parameters.get_or("division-volume", 2.0 * volume)?;

        Ok(())
    }

    fn update(&mut self, simulation: &mut Simulation, dt: Real) -> Result<()> {
        self.data.run_programs(simulation, dt)?;

        let volume = self.volume() + self.growth_rate * dt;
        self.data.set_value("volume", volume);

        if volume >= self.division_volume {
            self.divide(simulation);
        }

        Ok(())
    }

    fn draw_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "radius": self.radius(),
            "generation": self.generation(),
        }))
    }

    fn store_config(&self, parameters: &mut Parameters) {
        let data = &self.data;
        parameters.set("position", format!("{} {}", data.position.x, data.position.y));
        parameters.set("volume", self.volume().to_string());
        parameters.set("growth-rate", self.growth_rate.to_string());
        parameters.set("division-volume", self.division_volume.to_string());
        data.store_programs(parameters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cell_defaults() {
        let cell = Cell::new(ObjectData::new("cells.cell", ObjectKind::Dynamic));
        assert_eq!(cell.volume(), DEFAULT_VOLUME);
        assert_eq!(cell.generation(), 0);
        assert!((cell.radius() * cell.radius() * std::f64::consts::PI - 1.0).abs() < 1e-12);
    }
}
