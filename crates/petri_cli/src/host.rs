//! Host run loop
//!
//! The simulation steps on the calling thread. A console observer thread
//! samples the published frames at a fixed period and logs a summary of
//! each new one; it is stopped through a channel once stepping ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use petri_core::prelude::*;
use thiserror::Error;

use crate::builtin::BasicPlugin;
use crate::config::{ConfigError, HostConfig};
use crate::toml_loader::{self, TomlPlugin};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Simulation(#[from] petri_core::Error),

    #[error("No scene file given")]
    NoScene,

    #[error("Failed to spawn observer thread: {0}")]
    Observer(#[from] std::io::Error),
}

/// Outcome of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub iterations: u64,
    pub time: Real,
    pub objects: usize,
    /// Stopped by the cancel flag before the iteration budget ran out
    pub cancelled: bool,
    /// Distinct frames the observer logged
    pub frames_observed: u64,
}

/// Create the plugin manager with the built-in plugins and every
/// configured plugin directory
pub fn create_manager(config: &HostConfig) -> Arc<Manager> {
    let manager = Manager::shared();
    manager.register_builtin("basic", || -> Box<dyn Api> { Box::new(BasicPlugin) });
    manager.register_builtin(toml_loader::PLUGIN, || -> Box<dyn Api> { Box::new(TomlPlugin) });

    for dir in &config.plugin_dirs {
        manager.add_directory(dir);
    }
    manager
}

/// One line per available plugin
pub fn plugin_listing(manager: &Manager) -> Vec<String> {
    let mut lines: Vec<String> = manager
        .builtin_names()
        .into_iter()
        .map(|name| format!("{:<16} (builtin)", name))
        .collect();

    for name in manager.extern_names() {
        let path = manager
            .plugin_path(&name)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        lines.push(format!("{:<16} {}", name, path));
    }
    lines
}

/// Route Ctrl-C to `cancel`
pub fn install_interrupt(cancel: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Interrupt received, stopping...");
        cancel.store(true, Ordering::SeqCst);
    }) {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }
}

/// Load the configured scene and run it until the iteration budget is
/// spent or `cancel` is raised
pub fn run_scene(
    manager: Arc<Manager>,
    config: &HostConfig,
    cancel: &AtomicBool,
) -> std::result::Result<RunSummary, HostError> {
    let scene = config.scene.as_deref().ok_or(HostError::NoScene)?;

    let mut context = Context::new(manager);
    context.import_plugin(toml_loader::PLUGIN)?;

    let parameters: Parameters = config
        .parameters
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let mut simulation = context.create_simulation(scene, &parameters)?;

    if let Some(iterations) = config.iterations {
        simulation.set_iterations(iterations);
    }
    if simulation.has_unlimited_iterations() {
        log::info!("Running without an iteration budget, press Ctrl+C to stop");
    }

    let observer = Observer::spawn(
        simulation.frame_reader(),
        Duration::from_millis(config.observer_interval_ms.max(1)),
    )?;

    let stepped = step(&mut simulation, cancel);
    simulation.terminate();
    let frames_observed = observer.stop();

    let cancelled = stepped?;
    let summary = RunSummary {
        iterations: simulation.iteration(),
        time: simulation.total_time(),
        objects: simulation.object_count(),
        cancelled,
        frames_observed,
    };

    log::info!(
        "Finished after {} iterations (t = {}), {} objects",
        summary.iterations,
        summary.time,
        summary.objects
    );
    Ok(summary)
}

/// Returns whether stepping was cancelled
fn step(simulation: &mut Simulation, cancel: &AtomicBool) -> petri_core::Result<bool> {
    if !simulation.initialize(cancel)? {
        return Ok(true);
    }

    while !cancel.load(Ordering::SeqCst) {
        if !simulation.update()? {
            return Ok(false);
        }
    }
    Ok(true)
}

struct Observer {
    stop: Sender<()>,
    handle: JoinHandle<u64>,
}

impl Observer {
    fn spawn(reader: FrameReader, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("petri-observer".into())
            .spawn(move || {
                let mut last = None;
                let mut observed = 0;
                loop {
                    let done = match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => false,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                    };

                    let frame = reader.latest();
                    if last != Some(frame.iteration) {
                        last = Some(frame.iteration);
                        observed += 1;
                        log_frame(&frame);
                    }

                    if done {
                        return observed;
                    }
                }
            })?;

        Ok(Self { stop, handle })
    }

    /// Stop the thread after a final sample; returns the frames it logged
    fn stop(self) -> u64 {
        let _ = self.stop.send(());
        match self.handle.join() {
            Ok(observed) => observed,
            Err(_) => {
                log::warn!("Observer thread panicked");
                0
            }
        }
    }
}

fn log_frame(frame: &Frame) {
    let removing = frame.objects.iter().filter(|o| o.pending_removal).count();
    log::info!(
        "Iteration {} (t = {}): {} objects ({} leaving)",
        frame.iteration,
        frame.time,
        frame.objects.len() - removing,
        removing
    );

    for module in &frame.modules {
        log::debug!("  {}: {}", module.name, module.state);
    }
}
