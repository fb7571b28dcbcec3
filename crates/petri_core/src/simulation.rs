//! Stepped simulation lifecycle
//!
//! A [`Simulation`] is configured, initialized once, stepped with
//! [`Simulation::update`] until it reports completion, then terminated.
//!
//! Object additions made during a step are queued and deletions are only
//! marked; both are applied after the step's frame is published, so the
//! published frame and every reference taken during the step stay valid.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::abi::{Real, Vector};
use crate::container::{ObjectContainer, SlotRef};
use crate::context::Context;
use crate::draw::{DrawBuffer, Frame, FrameReader, ModuleFrame, ObjectFrame};
use crate::error::{Error, Result};
use crate::init::Initializer;
use crate::library::Library;
use crate::manager::Manager;
use crate::module::{Module, ModuleContainer};
use crate::object::{Object, ObjectData, ObjectId, ObjectKind, ObjectType};
use crate::parameters::Parameters;
use crate::physics::{Kinematic, Physics};
use crate::program::{Program, ProgramContainer};

/// Default time step in seconds
pub const DEFAULT_TIME_STEP: Real = 1.0;

/// Where a simulation is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Being configured, or initialization was cancelled
    #[default]
    Unconfigured,
    Initialized,
    /// Can no longer be initialized or stepped
    Terminated,
}

/// A simulated world and its stepping state
pub struct Simulation {
    // Entities run plugin code, so they are declared (and dropped) before
    // the context that keeps plugin libraries open
    objects: ObjectContainer,
    modules: ModuleContainer,
    programs: ProgramContainer,
    initializers: Vec<Box<dyn Initializer>>,
    physics: Box<dyn Physics>,
    object_types: IndexMap<String, ObjectType>,
    draw: DrawBuffer,
    parameters: Parameters,
    time_step: Real,
    iteration: u64,
    iterations: u64,
    total_time: Real,
    world_size: Vector,
    gravity: Vector,
    lifecycle: Lifecycle,
    // Initialization progress kept across cancelled attempts
    initialized_modules: HashSet<String>,
    initializers_run: usize,
    context: Context,
}

impl Simulation {
    /// Create an empty simulation with no imported plugins
    pub fn new(manager: Arc<Manager>) -> Self {
        Self::with_context(Context::new(manager))
    }

    pub fn with_context(context: Context) -> Self {
        Self {
            objects: ObjectContainer::new(),
            modules: ModuleContainer::new(),
            programs: ProgramContainer::new(),
            initializers: Vec::new(),
            physics: Box::new(Kinematic),
            object_types: IndexMap::new(),
            draw: DrawBuffer::new(),
            parameters: Parameters::new(),
            time_step: DEFAULT_TIME_STEP,
            iteration: 0,
            iterations: 0,
            total_time: 0.0,
            world_size: Vector::ZERO,
            gravity: Vector::ZERO,
            lifecycle: Lifecycle::Unconfigured,
            initialized_modules: HashSet::new(),
            initializers_run: 0,
            context,
        }
    }

    // ========== State ==========

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn manager(&self) -> &Arc<Manager> {
        self.context.manager()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }

    pub fn time_step(&self) -> Real {
        self.time_step
    }

    /// Change the time step; zero and non-finite values are rejected
    pub fn set_time_step(&mut self, dt: Real) -> Result<()> {
        if dt == 0.0 || !dt.is_finite() {
            return Err(Error::InvalidArgument(format!("time step must be non-zero and finite, got {}", dt)));
        }
        self.time_step = dt;
        Ok(())
    }

    /// Completed steps
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Step budget, `0` for unlimited
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn set_iterations(&mut self, iterations: u64) {
        self.iterations = iterations;
    }

    pub fn has_unlimited_iterations(&self) -> bool {
        self.iterations == 0
    }

    /// Simulated time
    pub fn total_time(&self) -> Real {
        self.total_time
    }

    pub fn world_size(&self) -> Vector {
        self.world_size
    }

    /// Objects leaving `±size / 2` are removed; a non-positive dimension
    /// disables the check
    pub fn set_world_size(&mut self, size: Vector) {
        self.world_size = size;
    }

    pub fn gravity(&self) -> Vector {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector) {
        self.gravity = gravity;
    }

    pub fn set_physics(&mut self, physics: Box<dyn Physics>) {
        self.physics = physics;
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name)
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.exists(name)
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.set(name, value);
    }

    /// Apply simulation-level settings.
    ///
    /// Recognized: `dt`, `iterations`, `world-size` and `gravity`.
    pub fn configure(&mut self, config: &Parameters) -> Result<()> {
        if let Some(dt) = config.get_parsed("dt")? {
            self.set_time_step(dt)?;
        }
        if let Some(iterations) = config.get_parsed("iterations")? {
            self.iterations = iterations;
        }
        if let Some(size) = config.get_vector("world-size")? {
            self.world_size = size;
        }
        if let Some(gravity) = config.get_vector("gravity")? {
            self.gravity = gravity;
        }
        Ok(())
    }

    /// Write the settings read by [`Simulation::configure`]
    pub fn store_config(&self, config: &mut Parameters) {
        config.set("dt", self.time_step.to_string());
        config.set("iterations", self.iterations.to_string());
        config.set("world-size", format!("{} {}", self.world_size.x, self.world_size.y));
        if self.gravity != Vector::ZERO {
            config.set("gravity", format!("{} {}", self.gravity.x, self.gravity.y));
        }
    }

    // ========== Plugins ==========

    /// Import a plugin (and its requirements) and let it prepare the simulation
    pub fn load_plugin(&mut self, name: &str) -> Result<()> {
        if self.context.is_imported(name) {
            return Ok(());
        }

        let before = self.context.imported_names();
        let result = self.context.import_plugin(name);

        // Requirements imported before a failure are valid imports too
        let added: Vec<Arc<Library>> = self
            .context
            .imported()
            .filter(|(plugin, _)| !before.iter().any(|b| b.as_str() == *plugin))
            .map(|(_, library)| library.clone())
            .collect();

        // Imports stay consistent: a plugin whose initialization failed is
        // removed along with every later import that never got initialized
        for (index, library) in added.iter().enumerate() {
            log::debug!("Initializing plugin `{}` for simulation", library.name());
            if let Err(err) = library.api().init_simulation(self) {
                for rest in &added[index..] {
                    self.context.remove_plugin(rest.name());
                }
                log::warn!("Plugin `{}` failed to initialize: {}", library.name(), err);
                return Err(err);
            }
        }

        result.map(|_| ())
    }

    /// Remove an imported plugin and let it clean up the simulation
    pub fn unload_plugin(&mut self, name: &str) -> bool {
        match self.context.remove_plugin(name) {
            Some(library) => {
                library.api().finalize_simulation(self);
                true
            }
            None => false,
        }
    }

    pub fn is_plugin_loaded(&self, name: &str) -> bool {
        self.context.is_imported(name)
    }

    // ========== Modules ==========

    /// Create a module through the imported plugins
    pub fn create_module(&self, type_name: &str) -> Result<Box<dyn Module>> {
        self.context.create_module(type_name)
    }

    /// Add a module under `name`, replacing an existing one
    pub fn add_module(&mut self, name: impl Into<String>, module: Box<dyn Module>) {
        self.modules.add(name, module);
    }

    /// [`Simulation::add_module`] recording the module's plugin type
    pub fn add_module_of_type(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        module: Box<dyn Module>,
    ) {
        self.modules.add_typed(name, type_name, module);
    }

    pub fn remove_module(&mut self, name: &str) -> Option<Box<dyn Module>> {
        self.modules.remove(name)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.exists(name)
    }

    pub fn module(&self, name: &str) -> Option<&dyn Module> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> &ModuleContainer {
        &self.modules
    }

    // ========== Objects ==========

    /// Define a named object type: creating `name` creates `base` and
    /// configures it with `parameters`
    pub fn add_object_type(
        &mut self,
        name: impl Into<String>,
        base: impl Into<String>,
        parameters: Parameters,
    ) -> Result<()> {
        let name = name.into();
        let base = base.into();

        // Reject definitions that would expand back into themselves
        let mut current = base.as_str();
        loop {
            if current == name {
                return Err(Error::InvalidArgument(format!(
                    "object type '{}' is derived from itself",
                    name
                )));
            }
            match self.object_types.get(current) {
                Some(t) => current = t.base.as_str(),
                None => break,
            }
        }

        self.object_types.insert(
            name.clone(),
            ObjectType {
                name,
                base,
                parameters,
            },
        );
        Ok(())
    }

    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        self.object_types.get(name)
    }

    pub fn object_types(&self) -> impl Iterator<Item = &ObjectType> {
        self.object_types.values()
    }

    /// Create an object of a named object type or a plugin object type.
    ///
    /// The object is not part of the simulation until passed to
    /// [`Simulation::add_object`].
    pub fn create_object(&mut self, type_name: &str, kind: ObjectKind) -> Result<Box<dyn Object>> {
        if let Some(object_type) = self.object_types.get(type_name).cloned() {
            let mut object = self.create_object(&object_type.base, kind)?;
            object.configure(&object_type.parameters, self)?;
            object.data_mut().type_name = object_type.name;
            return Ok(object);
        }

        self.context
            .create_object(type_name, ObjectData::new(type_name, kind))
    }

    /// Queue an object; it becomes visible at the next safe point
    pub fn add_object(&mut self, object: Box<dyn Object>) -> ObjectId {
        let id = self.objects.add(object);
        log::trace!("Object {} queued", id);
        id
    }

    /// Mark an object for removal at the next safe point
    pub fn delete_object(&mut self, id: ObjectId) -> bool {
        self.objects.mark_deleted(id)
    }

    pub fn is_object_deleted(&self, id: ObjectId) -> bool {
        self.objects.is_deleted(id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&dyn Object> {
        self.objects.get(id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut (dyn Object + 'static)> {
        self.objects.get_mut(id)
    }

    /// Visible objects, including those marked for removal this step
    pub fn objects(&self) -> impl Iterator<Item = &dyn Object> {
        self.objects.iter()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Objects created since the last safe point
    pub fn pending_object_count(&self) -> usize {
        self.objects.pending_len()
    }

    // ========== Programs & initializers ==========

    pub fn add_program(&mut self, name: impl Into<String>, program: Box<dyn Program>) {
        self.programs.add(name, program);
    }

    /// [`Simulation::add_program`] recording the template's plugin type
    pub fn add_program_of_type(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        program: Box<dyn Program>,
    ) {
        self.programs.add_typed(name, type_name, program);
    }

    /// Clone the named program template, or create a program of that type
    /// through the imported plugins
    pub fn program(&self, name: &str) -> Result<Box<dyn Program>> {
        match self.programs.instantiate(name) {
            Some(program) => Ok(program),
            None => self.context.create_program(name),
        }
    }

    pub fn programs(&self) -> &ProgramContainer {
        &self.programs
    }

    pub fn create_initializer(&self, type_name: &str) -> Result<Box<dyn Initializer>> {
        self.context.create_initializer(type_name)
    }

    pub fn add_initializer(&mut self, initializer: Box<dyn Initializer>) {
        self.initializers.push(initializer);
    }

    pub fn initializer_count(&self) -> usize {
        self.initializers.len()
    }

    // ========== Draw state ==========

    /// Observer handle to the published frames
    pub fn frame_reader(&self) -> FrameReader {
        self.draw.reader()
    }

    /// Most recently published frame
    pub fn frame(&self) -> Arc<Frame> {
        self.draw.latest()
    }

    // ========== Lifecycle ==========

    /// Initialize modules, run initializers and publish the first frame.
    ///
    /// Returns `Ok(false)` when `cancel` was raised; the simulation then
    /// stays uninitialized and a later call resumes where this one stopped:
    /// modules and initializers that already ran are not run again.
    pub fn initialize(&mut self, cancel: &AtomicBool) -> Result<bool> {
        match self.lifecycle {
            Lifecycle::Unconfigured => {}
            Lifecycle::Initialized => {
                return Err(Error::IllegalState("simulation is already initialized".into()));
            }
            Lifecycle::Terminated => {
                return Err(Error::IllegalState("simulation was terminated".into()));
            }
        }

        log::debug!("Initializing simulation");

        self.objects.commit();

        for index in 0..self.modules.len() {
            let Some((name, mut module)) = self.modules.take(index) else {
                continue;
            };
            if self.initialized_modules.contains(&name) {
                self.modules.restore(&name, module);
                continue;
            }
            if cancel.load(Ordering::Relaxed) {
                self.modules.restore(&name, module);
                log::info!("Simulation initialization cancelled");
                return Ok(false);
            }

            let result = module.init(self);
            self.modules.restore(&name, module);
            result?;
            self.initialized_modules.insert(name);
        }

        self.objects.commit();

        let mut initializers = std::mem::take(&mut self.initializers);
        let mut result = Ok(true);
        for initializer in initializers.iter_mut().skip(self.initializers_run) {
            if cancel.load(Ordering::Relaxed) {
                log::info!("Simulation initialization cancelled");
                result = Ok(false);
                break;
            }
            if let Err(err) = initializer.call(self) {
                result = Err(err);
                break;
            }
            self.initializers_run += 1;
        }
        // Initializers added while running are kept after the existing ones
        initializers.append(&mut self.initializers);
        self.initializers = initializers;

        if !matches!(result, Ok(true)) {
            return result;
        }

        self.objects.commit();
        self.publish();
        self.lifecycle = Lifecycle::Initialized;

        log::debug!(
            "Simulation initialized: {} modules, {} objects",
            self.modules.len(),
            self.objects.len()
        );

        Ok(true)
    }

    /// Advance by one step.
    ///
    /// Returns whether the simulation should keep running.
    pub fn update(&mut self) -> Result<bool> {
        if self.lifecycle != Lifecycle::Initialized {
            return Err(Error::IllegalState("simulation is not initialized".into()));
        }

        let dt = self.time_step;
        self.iteration += 1;
        self.total_time += dt;

        for data in self.objects.active_data_mut() {
            data.clear_forces();
        }

        self.update_modules(dt)?;
        self.update_objects(dt)?;

        self.physics
            .step(dt, self.gravity, &mut self.objects.active_data_mut());

        self.detect_deserters();
        self.publish();

        let (removed, added) = self.objects.commit();
        if removed > 0 || added > 0 {
            log::trace!("Iteration {}: {} objects removed, {} added", self.iteration, removed, added);
        }

        Ok(self.iterations == 0 || self.iteration < self.iterations)
    }

    /// Terminate modules and programs and finalize imported plugins in
    /// reverse import order.
    ///
    /// Only an initialized simulation is terminated; afterwards it can no
    /// longer be initialized or stepped.
    pub fn terminate(&mut self) {
        if self.lifecycle != Lifecycle::Initialized {
            return;
        }
        self.lifecycle = Lifecycle::Terminated;

        log::debug!("Terminating simulation after {} iterations", self.iteration);

        for index in 0..self.modules.len() {
            if let Some((name, mut module)) = self.modules.take(index) {
                module.terminate(self);
                self.modules.restore(&name, module);
            }
        }

        let mut objects = self.objects.drain();
        for object in objects.objects_mut() {
            object.data_mut().terminate_programs(self);
        }
        self.objects.restore_all(objects);

        let mut templates = self.programs.drain();
        for (_, template) in &mut templates {
            template.program.terminate(self);
        }
        self.programs.restore(templates);

        let imported: Vec<Arc<Library>> = self
            .context
            .imported()
            .rev()
            .map(|(_, library)| library.clone())
            .collect();

        for library in imported {
            library.api().finalize_simulation(self);
        }
    }

    fn update_modules(&mut self, dt: Real) -> Result<()> {
        for index in 0..self.modules.len() {
            if let Some((name, mut module)) = self.modules.take(index) {
                let result = module.update(self, dt);
                self.modules.restore(&name, module);
                result?;
            }
        }
        Ok(())
    }

    fn update_objects(&mut self, dt: Real) -> Result<()> {
        // Objects queued before this point came from modules and wait for
        // the next step; objects spawned by objects update right away
        let mark = self.objects.pending_len();

        let mut index = 0;
        while index < self.objects.len() {
            self.update_object(SlotRef::Live(index), dt)?;
            index += 1;
        }

        let mut index = mark;
        while index < self.objects.pending_len() {
            self.update_object(SlotRef::Pending(index), dt)?;
            index += 1;
        }

        Ok(())
    }

    fn update_object(&mut self, slot: SlotRef, dt: Real) -> Result<()> {
        let Some(mut object) = self.objects.take(slot) else {
            return Ok(());
        };
        let result = object.update(self, dt);
        self.objects.restore(slot, object);
        result
    }

    fn detect_deserters(&mut self) {
        let half = self.world_size * 0.5;
        if half.x <= 0.0 || half.y <= 0.0 {
            return;
        }

        let deserters: Vec<ObjectId> = self
            .objects
            .iter_marked()
            .filter(|(object, deleted)| {
                let data = object.data();
                !deleted
                    && data.kind != ObjectKind::Static
                    && (data.position.x.abs() > half.x || data.position.y.abs() > half.y)
            })
            .map(|(object, _)| object.data().id)
            .collect();

        for id in deserters {
            log::debug!("Object {} left the world", id);
            self.objects.mark_deleted(id);
        }
    }

    fn publish(&mut self) {
        let frame = self.draw.back_mut();
        frame.iteration = self.iteration;
        frame.time = self.total_time;
        frame.world_size = self.world_size;

        frame.modules.extend(self.modules.iter().filter_map(|(name, module)| {
            module.draw_state().map(|state| ModuleFrame {
                name: name.to_string(),
                state,
            })
        }));

        frame.objects.extend(self.objects.iter_marked().map(|(object, deleted)| {
            let data = object.data();
            ObjectFrame {
                id: data.id,
                type_name: data.type_name.clone(),
                kind: data.kind,
                position: data.position,
                rotation: data.rotation,
                velocity: data.velocity,
                visible: data.visible,
                pending_removal: deleted,
                values: data.values().map(|(k, v)| (k.to_string(), v)).collect(),
                state: object.draw_state(),
            }
        }));

        self.draw.publish();
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("context", &self.context)
            .field("modules", &self.modules.names().collect::<Vec<_>>())
            .field("objects", &self.objects.len())
            .field("iteration", &self.iteration)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
