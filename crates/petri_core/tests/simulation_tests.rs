//! Integration tests for the simulation lifecycle
//!
//! Tests stepping, deferred object mutation, plugin hooks and the frame
//! double buffer under a concurrent observer

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use petri_core::*;

type Events = Arc<Mutex<Vec<String>>>;

fn ball(x: Real, velocity: Real) -> Box<dyn Object> {
    let mut data = ObjectData::new("ball", ObjectKind::Dynamic);
    data.position = Vector::new(x, 0.0);
    data.velocity = Vector::new(velocity, 0.0);
    Box::new(BasicObject::new(data))
}

fn simulation() -> Simulation {
    Simulation::new(Manager::shared())
}

fn not_cancelled() -> AtomicBool {
    AtomicBool::new(false)
}

/// Counts its own updates in the `updates` value
struct Counting {
    data: ObjectData,
}

impl Object for Counting {
    fn data(&self) -> &ObjectData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ObjectData {
        &mut self.data
    }

    fn update(&mut self, _: &mut Simulation, _: Real) -> Result<()> {
        let updates = self.data.value("updates").unwrap_or(0.0);
        self.data.set_value("updates", updates + 1.0);
        Ok(())
    }
}

fn counting() -> Box<dyn Object> {
    Box::new(Counting {
        data: ObjectData::new("counting", ObjectKind::Static),
    })
}

/// Spawns one counting child on its first update
struct Parent {
    data: ObjectData,
    spawned: bool,
}

impl Object for Parent {
    fn data(&self) -> &ObjectData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ObjectData {
        &mut self.data
    }

    fn update(&mut self, simulation: &mut Simulation, _: Real) -> Result<()> {
        if !self.spawned {
            self.spawned = true;
            simulation.add_object(counting());
        }
        Ok(())
    }
}

/// Spawns one counting object per update and records visibility
struct SpawningModule {
    seen: Arc<Mutex<Vec<(usize, bool)>>>,
}

impl Module for SpawningModule {
    fn update(&mut self, simulation: &mut Simulation, _: Real) -> Result<()> {
        let id = simulation.add_object(counting());
        self.seen
            .lock()
            .push((simulation.object_count(), simulation.object(id).is_some()));
        Ok(())
    }
}

/// Deletes an object on a given iteration
struct Reaper {
    target: ObjectId,
    at: u64,
}

impl Module for Reaper {
    fn update(&mut self, simulation: &mut Simulation, _: Real) -> Result<()> {
        if simulation.iteration() == self.at {
            assert!(simulation.delete_object(self.target));
        }
        Ok(())
    }
}

/// Appends its name to a shared log on every hook
struct Logging {
    name: &'static str,
    priority: i32,
    events: Events,
}

impl Module for Logging {
    fn init(&mut self, _: &mut Simulation) -> Result<()> {
        self.events.lock().push(format!("init:{}", self.name));
        Ok(())
    }

    fn update(&mut self, _: &mut Simulation, _: Real) -> Result<()> {
        self.events.lock().push(format!("update:{}", self.name));
        Ok(())
    }

    fn terminate(&mut self, _: &mut Simulation) {
        self.events.lock().push(format!("terminate:{}", self.name));
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn draw_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!(self.name))
    }
}

#[derive(Clone)]
struct Populate {
    count: usize,
    events: Events,
}

impl Initializer for Populate {
    fn clone_box(&self) -> Box<dyn Initializer> {
        Box::new(self.clone())
    }

    fn call(&mut self, simulation: &mut Simulation) -> Result<()> {
        self.events.lock().push("populate".into());
        for i in 0..self.count {
            simulation.add_object(ball(i as Real, 0.0));
        }
        Ok(())
    }
}

#[test]
fn test_update_requires_initialize() {
    let mut sim = simulation();
    assert!(matches!(sim.update(), Err(Error::IllegalState(_))));

    assert!(sim.initialize(&not_cancelled()).unwrap());
    assert!(sim.is_initialized());
    assert!(matches!(sim.initialize(&not_cancelled()), Err(Error::IllegalState(_))));
}

#[test]
fn test_zero_time_step_is_rejected() {
    let mut sim = simulation();
    sim.set_time_step(0.5).unwrap();

    assert!(matches!(sim.set_time_step(0.0), Err(Error::InvalidArgument(_))));
    assert!(sim.set_time_step(Real::NAN).is_err());
    assert_eq!(sim.time_step(), 0.5);
}

#[test]
fn test_iteration_budget() {
    let mut sim = simulation();
    sim.set_iterations(3);
    sim.set_time_step(0.25).unwrap();
    sim.initialize(&not_cancelled()).unwrap();

    assert!(sim.update().unwrap());
    assert!(sim.update().unwrap());
    assert!(!sim.update().unwrap());
    assert_eq!(sim.iteration(), 3);
    assert_eq!(sim.total_time(), 0.75);
}

#[test]
fn test_unlimited_iterations() {
    let mut sim = simulation();
    sim.initialize(&not_cancelled()).unwrap();

    for _ in 0..100 {
        assert!(sim.update().unwrap());
    }
    assert!(sim.has_unlimited_iterations());
}

#[test]
fn test_initializers_populate_and_publish_first_frame() {
    let events: Events = Default::default();
    let mut sim = simulation();
    sim.add_initializer(Box::new(Populate {
        count: 3,
        events: events.clone(),
    }));

    let reader = sim.frame_reader();
    sim.initialize(&not_cancelled()).unwrap();

    assert_eq!(sim.object_count(), 3);
    assert_eq!(reader.latest().objects.len(), 3);
    assert_eq!(reader.latest().iteration, 0);
    assert_eq!(*events.lock(), vec!["populate"]);
}

#[test]
fn test_cancelled_initialize_stays_uninitialized() {
    let events: Events = Default::default();
    let mut sim = simulation();
    sim.add_initializer(Box::new(Populate {
        count: 3,
        events: events.clone(),
    }));

    let cancel = AtomicBool::new(true);
    assert!(!sim.initialize(&cancel).unwrap());
    assert!(!sim.is_initialized());
    assert!(events.lock().is_empty());
    assert_eq!(sim.initializer_count(), 1);

    assert!(sim.initialize(&not_cancelled()).unwrap());
    assert_eq!(sim.object_count(), 3);
}

/// Adds one object, then raises the cancel flag
struct CancelAfter {
    cancel: Arc<AtomicBool>,
    events: Events,
}

impl Initializer for CancelAfter {
    fn clone_box(&self) -> Box<dyn Initializer> {
        Box::new(CancelAfter {
            cancel: self.cancel.clone(),
            events: self.events.clone(),
        })
    }

    fn call(&mut self, simulation: &mut Simulation) -> Result<()> {
        self.events.lock().push("cancel-after".into());
        simulation.add_object(ball(0.0, 0.0));
        self.cancel.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_initialize_resumes_after_cancel() {
    let events: Events = Default::default();
    let cancel = Arc::new(AtomicBool::new(false));

    let mut sim = simulation();
    sim.add_module(
        "log",
        Box::new(Logging {
            name: "log",
            priority: 0,
            events: events.clone(),
        }),
    );
    sim.add_initializer(Box::new(CancelAfter {
        cancel: cancel.clone(),
        events: events.clone(),
    }));
    sim.add_initializer(Box::new(Populate {
        count: 2,
        events: events.clone(),
    }));

    assert!(!sim.initialize(&cancel).unwrap());
    assert_eq!(sim.lifecycle(), Lifecycle::Unconfigured);
    assert_eq!(*events.lock(), vec!["init:log", "cancel-after"]);

    cancel.store(false, Ordering::SeqCst);
    assert!(sim.initialize(&cancel).unwrap());
    assert_eq!(*events.lock(), vec!["init:log", "cancel-after", "populate"]);
    assert_eq!(sim.object_count(), 3);
}

#[test]
fn test_terminated_simulation_cannot_restart() {
    let events: Events = Default::default();
    let mut sim = simulation();
    sim.add_initializer(Box::new(Populate {
        count: 1,
        events: events.clone(),
    }));

    sim.initialize(&not_cancelled()).unwrap();
    sim.update().unwrap();
    sim.terminate();
    assert_eq!(sim.lifecycle(), Lifecycle::Terminated);
    assert!(!sim.is_initialized());

    assert!(matches!(sim.initialize(&not_cancelled()), Err(Error::IllegalState(_))));
    assert!(matches!(sim.update(), Err(Error::IllegalState(_))));
    assert_eq!(*events.lock(), vec!["populate"]);
    assert_eq!(sim.object_count(), 1);

    // A second terminate is a no-op
    sim.terminate();
    assert_eq!(sim.lifecycle(), Lifecycle::Terminated);
}

#[test]
fn test_terminate_keeps_pending_and_deleted_objects() {
    let mut sim = simulation();
    let gone = sim.add_object(ball(0.0, 0.0));
    sim.initialize(&not_cancelled()).unwrap();

    assert!(sim.delete_object(gone));
    sim.add_object(ball(1.0, 0.0));
    sim.terminate();

    assert!(sim.is_object_deleted(gone));
    assert_eq!(sim.object_count(), 1);
    assert_eq!(sim.pending_object_count(), 1);
}

#[test]
fn test_module_spawned_object_is_deferred() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut sim = simulation();
    sim.add_module("spawner", Box::new(SpawningModule { seen: seen.clone() }));
    sim.initialize(&not_cancelled()).unwrap();

    sim.update().unwrap();
    assert_eq!(*seen.lock(), vec![(0, false)]);
    assert_eq!(sim.object_count(), 1);

    // Created by a module: not updated during the step that created it
    let object = sim.objects().next().unwrap();
    assert_eq!(object.data().value("updates"), None);

    sim.update().unwrap();
    assert_eq!(*seen.lock(), vec![(0, false), (1, false)]);
    assert_eq!(sim.object_count(), 2);
}

#[test]
fn test_object_spawned_object_updates_same_step() {
    let mut sim = simulation();
    sim.add_object(Box::new(Parent {
        data: ObjectData::new("parent", ObjectKind::Static),
        spawned: false,
    }));
    sim.initialize(&not_cancelled()).unwrap();
    assert_eq!(sim.object_count(), 1);

    sim.update().unwrap();
    assert_eq!(sim.object_count(), 2);

    let child = sim.objects().find(|o| o.data().type_name == "counting").unwrap();
    assert_eq!(child.data().value("updates"), Some(1.0));

    // Not published before it was folded in
    assert_eq!(sim.frame().objects.len(), 1);
}

#[test]
fn test_deleted_object_stays_in_published_frame() {
    let mut sim = simulation();
    let target = sim.add_object(ball(0.0, 2.0));
    sim.add_module("reaper", Box::new(Reaper { target, at: 2 }));
    let reader = sim.frame_reader();
    sim.initialize(&not_cancelled()).unwrap();

    sim.update().unwrap();
    assert!(!reader.latest().object(target).unwrap().pending_removal);

    sim.update().unwrap();
    let frame = reader.latest();
    let last = frame.object(target).unwrap();
    assert!(last.pending_removal);
    // Marked before physics ran, so it kept its last position
    assert_eq!(last.position, Vector::new(2.0, 0.0));
    assert_eq!(last.type_name, "ball");

    assert!(sim.object(target).is_none());
    assert_eq!(sim.object_count(), 0);

    sim.update().unwrap();
    assert!(reader.latest().object(target).is_none());
}

#[test]
fn test_deserters_are_removed() {
    let mut sim = simulation();
    sim.set_world_size(Vector::new(10.0, 10.0));
    let runner = sim.add_object(ball(0.0, 3.0));
    let sitter = sim.add_object(ball(0.0, 0.0));

    let mut wall = ObjectData::new("wall", ObjectKind::Static);
    wall.position = Vector::new(100.0, 0.0);
    let wall = sim.add_object(Box::new(BasicObject::new(wall)));

    sim.initialize(&not_cancelled()).unwrap();

    sim.update().unwrap();
    assert!(sim.object(runner).is_some());

    // x = 6 leaves [-5, 5]
    sim.update().unwrap();
    assert!(sim.frame().object(runner).unwrap().pending_removal);
    assert!(sim.object(runner).is_none());
    assert!(sim.object(sitter).is_some());
    assert!(sim.object(wall).is_some());
}

#[test]
fn test_zero_world_size_disables_deserters() {
    let mut sim = simulation();
    let runner = sim.add_object(ball(0.0, 1000.0));
    sim.initialize(&not_cancelled()).unwrap();

    sim.update().unwrap();
    assert!(sim.object(runner).is_some());
}

#[test]
fn test_modules_update_by_priority() {
    let events: Events = Default::default();
    let mut sim = simulation();
    for (name, priority) in [("low", 0), ("high", 10), ("also_low", 0)] {
        sim.add_module(
            name,
            Box::new(Logging {
                name,
                priority,
                events: events.clone(),
            }),
        );
    }

    sim.initialize(&not_cancelled()).unwrap();
    sim.update().unwrap();
    sim.terminate();

    assert_eq!(
        *events.lock(),
        vec![
            "init:high",
            "init:low",
            "init:also_low",
            "update:high",
            "update:low",
            "update:also_low",
            "terminate:high",
            "terminate:low",
            "terminate:also_low",
        ]
    );

    let names: Vec<_> = sim.frame().modules.iter().map(|m| m.name.clone()).collect();
    assert_eq!(names, vec!["high", "low", "also_low"]);
}

#[test]
fn test_physics_applies_gravity() {
    let mut sim = simulation();
    sim.set_gravity(Vector::new(0.0, -1.0));
    let id = sim.add_object(ball(0.0, 0.0));
    sim.initialize(&not_cancelled()).unwrap();

    sim.update().unwrap();
    sim.update().unwrap();

    let data = sim.object(id).unwrap().data();
    assert_eq!(data.velocity, Vector::new(0.0, -2.0));
    assert_eq!(data.position, Vector::new(0.0, -3.0));
}

#[test]
fn test_forces_are_cleared_each_step() {
    struct Pusher(ObjectId);

    impl Module for Pusher {
        fn update(&mut self, simulation: &mut Simulation, _: Real) -> Result<()> {
            if simulation.iteration() == 1 {
                if let Some(object) = simulation.object_mut(self.0) {
                    object.data_mut().apply_force(Vector::new(1.0, 0.0));
                }
            }
            Ok(())
        }
    }

    let mut sim = simulation();
    let id = sim.add_object(ball(0.0, 0.0));
    sim.add_module("pusher", Box::new(Pusher(id)));
    sim.initialize(&not_cancelled()).unwrap();

    sim.update().unwrap();
    sim.update().unwrap();

    let data = sim.object(id).unwrap().data();
    assert_eq!(data.force, Vector::ZERO);
    assert_eq!(data.velocity, Vector::new(1.0, 0.0));
}

#[test]
fn test_programs_run_per_object_copy() {
    #[derive(Clone)]
    struct Step(Real);

    impl Program for Step {
        fn clone_box(&self) -> Box<dyn Program> {
            Box::new(self.clone())
        }

        fn call(&mut self, _: &mut Simulation, object: &mut ObjectData, _: Real) -> Result<()> {
            self.0 += 1.0;
            object.set_value("calls", self.0);
            Ok(())
        }
    }

    let mut sim = simulation();
    sim.add_program("step", Box::new(Step(0.0)));

    let params = Parameters::new().with("programs", "step").with("position", "1 1");
    let mut ids = Vec::new();
    for _ in 0..2 {
        let mut object = ball(0.0, 0.0);
        object.configure(&params, &mut sim).unwrap();
        ids.push(sim.add_object(object));
    }

    sim.initialize(&not_cancelled()).unwrap();
    sim.update().unwrap();
    sim.update().unwrap();

    for id in ids {
        let data = sim.object(id).unwrap().data();
        assert_eq!(data.value("calls"), Some(2.0));
        assert_eq!(data.position, Vector::new(1.0, 1.0));
    }
}

#[test]
fn test_unknown_program_reports_type() {
    let sim = simulation();
    assert!(matches!(
        sim.program("missing"),
        Err(Error::UnknownType { kind: EntityKind::Program, .. })
    ));
}

#[test]
fn test_terminate_finalizes_in_reverse_import_order() {
    struct Hooks {
        name: &'static str,
        requires: Vec<String>,
        events: Events,
    }

    impl Api for Hooks {
        fn required_plugins(&self) -> Vec<String> {
            self.requires.clone()
        }

        fn init_simulation(&self, _: &mut Simulation) -> Result<()> {
            self.events.lock().push(format!("init:{}", self.name));
            Ok(())
        }

        fn finalize_simulation(&self, _: &mut Simulation) {
            self.events.lock().push(format!("finalize:{}", self.name));
        }
    }

    let events: Events = Default::default();
    let manager = Manager::shared();
    for (name, requires) in [("top", vec!["base".to_string()]), ("base", vec![])] {
        let events = events.clone();
        manager.register_builtin(name, move || -> Box<dyn Api> {
            Box::new(Hooks {
                name,
                requires: requires.clone(),
                events: events.clone(),
            })
        });
    }

    let mut sim = Simulation::new(manager);
    sim.load_plugin("top").unwrap();
    sim.load_plugin("top").unwrap();
    assert!(sim.is_plugin_loaded("base"));

    sim.initialize(&not_cancelled()).unwrap();
    sim.terminate();
    sim.terminate();

    assert_eq!(
        *events.lock(),
        vec!["init:base", "init:top", "finalize:top", "finalize:base"]
    );
}

#[test]
fn test_object_types_apply_preset() {
    struct Basic;

    impl Api for Basic {
        fn on_load(&self, record: &mut RepositoryRecord) -> Result<()> {
            record.register_object("basic", BasicObject::new);
            Ok(())
        }

        fn on_unload(&self, record: &mut RepositoryRecord) {
            record.unregister_object("basic");
        }
    }

    let manager = Manager::shared();
    manager.register_builtin("basic", || -> Box<dyn Api> { Box::new(Basic) });

    let mut sim = Simulation::new(manager);
    sim.load_plugin("basic").unwrap();
    sim.add_object_type("heavy", "basic", Parameters::new().with("mass", "5"))
        .unwrap();
    sim.add_object_type("heavier", "heavy", Parameters::new().with("mass", "9"))
        .unwrap();
    assert!(sim.add_object_type("basic", "heavier", Parameters::new()).is_err());

    let heavy = sim.create_object("heavy", ObjectKind::Dynamic).unwrap();
    assert_eq!(heavy.data().type_name, "heavy");
    assert_eq!(heavy.data().mass, 5.0);

    let heavier = sim.create_object("heavier", ObjectKind::Pinned).unwrap();
    assert_eq!(heavier.data().type_name, "heavier");
    assert_eq!(heavier.data().kind, ObjectKind::Pinned);
    assert_eq!(heavier.data().mass, 9.0);
}

#[test]
fn test_loader_dispatch_by_extension() {
    struct LineLoader;

    impl Loader for LineLoader {
        fn from_source(
            &self,
            context: &Context,
            source: &str,
            _: &Path,
            parameters: &Parameters,
        ) -> Result<Simulation> {
            let mut sim = Simulation::new(context.manager().clone());
            for line in source.lines().filter(|l| !l.trim().is_empty()) {
                let x: Real = line
                    .trim()
                    .parse()
                    .map_err(|_| Error::loader("<source>", format!("bad line '{}'", line)))?;
                sim.add_object(ball(x, 0.0));
            }
            sim.configure(parameters)?;
            Ok(sim)
        }

        fn to_source(&self, simulation: &Simulation, _: &Path) -> Result<String> {
            Ok(simulation
                .objects()
                .map(|o| format!("{}\n", o.data().position.x))
                .collect())
        }
    }

    struct Lines;

    impl Api for Lines {
        fn on_load(&self, record: &mut RepositoryRecord) -> Result<()> {
            record.register_loader("lines", || LineLoader);
            Ok(())
        }

        fn on_unload(&self, record: &mut RepositoryRecord) {
            record.unregister_loader("lines");
        }
    }

    let manager = Manager::shared();
    manager.register_builtin("lines", || -> Box<dyn Api> { Box::new(Lines) });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.lines");
    std::fs::write(&path, "1\n2\n\n3\n").unwrap();

    let mut context = Context::new(manager);
    assert!(matches!(
        context.create_simulation(&path, &Parameters::new()),
        Err(Error::UnknownType { kind: EntityKind::Loader, .. })
    ));

    context.import_plugin("lines").unwrap();
    let params = Parameters::new().with("iterations", "7");
    let mut sim = context.create_simulation(&path, &params).unwrap();
    assert_eq!(sim.iterations(), 7);

    sim.initialize(&not_cancelled()).unwrap();
    assert_eq!(sim.object_count(), 3);

    let loader = context.create_loader("lines").unwrap();
    let out = dir.path().join("out.lines");
    loader.to_file(&sim, &out).unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "1\n2\n3\n");

    let err = context
        .create_simulation_from_source("lines", "oops", Path::new("inline.lines"), &Parameters::new())
        .unwrap_err();
    assert!(matches!(err, Error::Loader { .. }));
}

#[test]
fn test_observer_never_sees_torn_frame() {
    const OBJECTS: usize = 64;
    const STEPS: u64 = 500;

    let mut sim = simulation();
    for _ in 0..OBJECTS {
        sim.add_object(ball(0.0, 1.0));
    }
    let reader = sim.frame_reader();
    sim.initialize(&not_cancelled()).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let observer = {
        let stop = stop.clone();
        thread::spawn(move || {
            let mut frames = 0u64;
            let mut last = 0;
            loop {
                let done = stop.load(Ordering::Acquire);
                let frame = reader.latest();
                assert!(frame.iteration >= last);
                last = frame.iteration;

                assert_eq!(frame.objects.len(), OBJECTS);
                for object in &frame.objects {
                    assert_eq!(object.position.x, frame.iteration as Real);
                }
                frames += 1;
                if done {
                    break frames;
                }
            }
        })
    };

    for _ in 0..STEPS {
        sim.update().unwrap();
    }
    stop.store(true, Ordering::Release);

    let frames = observer.join().unwrap();
    assert!(frames > 0);
    assert_eq!(sim.frame().iteration, STEPS);
}
