//! Simulation modules: global per-step behavior (diffusion, reactions, ...)

use crate::abi::Real;
use crate::error::Result;
use crate::parameters::Parameters;
use crate::simulation::Simulation;

/// Per-step simulation behavior not bound to a single object.
///
/// Modules update before objects, in descending [`Module::priority`] order.
pub trait Module: Send {
    fn configure(&mut self, parameters: &Parameters, simulation: &mut Simulation) -> Result<()> {
        let _ = (parameters, simulation);
        Ok(())
    }

    fn init(&mut self, simulation: &mut Simulation) -> Result<()> {
        let _ = simulation;
        Ok(())
    }

    fn update(&mut self, simulation: &mut Simulation, dt: Real) -> Result<()> {
        let _ = (simulation, dt);
        Ok(())
    }

    fn terminate(&mut self, simulation: &mut Simulation) {
        let _ = simulation;
    }

    /// Update order; higher runs first
    fn priority(&self) -> i32 {
        0
    }

    /// Drawable state published with the frame
    fn draw_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Write configuration that recreates this module
    fn store_config(&self, parameters: &mut Parameters) {
        let _ = parameters;
    }
}

struct ModuleSlot {
    name: String,
    type_name: Option<String>,
    priority: i32,
    module: Option<Box<dyn Module>>,
}

/// Modules of one simulation in update order
#[derive(Default)]
pub struct ModuleContainer {
    slots: Vec<ModuleSlot>,
}

impl ModuleContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, replacing any module with the same name
    pub fn add(&mut self, name: impl Into<String>, module: Box<dyn Module>) {
        self.insert(name.into(), None, module);
    }

    /// Add a module and remember the plugin type it was created from
    pub fn add_typed(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        module: Box<dyn Module>,
    ) {
        self.insert(name.into(), Some(type_name.into()), module);
    }

    fn insert(&mut self, name: String, type_name: Option<String>, module: Box<dyn Module>) {
        let priority = module.priority();

        if let Some(slot) = self.slots.iter_mut().find(|s| s.name == name) {
            log::debug!("Replacing module '{}'", name);
            slot.type_name = type_name;
            slot.priority = priority;
            slot.module = Some(module);
        } else {
            self.slots.push(ModuleSlot {
                name,
                type_name,
                priority,
                module: Some(module),
            });
        }

        // Stable: equal priorities keep registration order
        self.slots.sort_by_key(|s| std::cmp::Reverse(s.priority));
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Module>> {
        let index = self.slots.iter().position(|s| s.name == name)?;
        self.slots.remove(index).module
    }

    pub fn exists(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.slots
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.module.as_deref())
    }

    /// Type the module was created from, if added with [`ModuleContainer::add_typed`]
    pub fn type_name(&self, name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.type_name.as_deref())
    }

    /// Module names in update order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name.as_str())
    }

    /// Modules in update order, skipping any currently running
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Module)> {
        self.slots
            .iter()
            .filter_map(|s| s.module.as_deref().map(|m| (s.name.as_str(), m)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Take a module out of its slot so it can borrow the simulation
    pub(crate) fn take(&mut self, index: usize) -> Option<(String, Box<dyn Module>)> {
        let slot = self.slots.get_mut(index)?;
        slot.module.take().map(|m| (slot.name.clone(), m))
    }

    /// Put a taken module back; its slot may have moved while it was out
    pub(crate) fn restore(&mut self, name: &str, module: Box<dyn Module>) {
        match self.slots.iter_mut().find(|s| s.name == name && s.module.is_none()) {
            Some(slot) => slot.module = Some(module),
            None => log::debug!("Module '{}' was replaced while running", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Prio(i32);

    impl Module for Prio {
        fn priority(&self) -> i32 {
            self.0
        }
    }

    #[test]
    fn test_priority_order_is_stable() {
        let mut modules = ModuleContainer::new();
        modules.add("a", Box::new(Prio(0)));
        modules.add("b", Box::new(Prio(10)));
        modules.add("c", Box::new(Prio(0)));
        modules.add("d", Box::new(Prio(10)));

        assert_eq!(modules.names().collect::<Vec<_>>(), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_replace_keeps_single_entry() {
        let mut modules = ModuleContainer::new();
        modules.add("diffusion", Box::new(Prio(0)));
        modules.add("diffusion", Box::new(Prio(5)));

        assert_eq!(modules.len(), 1);
        assert_eq!(modules.get("diffusion").map(|m| m.priority()), Some(5));

        modules.add_typed("diffusion", "chem.diffusion", Box::new(Prio(5)));
        assert_eq!(modules.type_name("diffusion"), Some("chem.diffusion"));
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn test_take_and_restore() {
        let mut modules = ModuleContainer::new();
        modules.add("a", Box::new(Prio(1)));

        let (name, module) = modules.take(0).unwrap();
        assert!(modules.get("a").is_none());
        assert!(modules.exists("a"));

        modules.restore(&name, module);
        assert!(modules.get("a").is_some());
    }
}
