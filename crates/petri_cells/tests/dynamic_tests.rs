//! Integration tests loading the built cells binary from disk
//!
//! Cargo builds the cdylib next to the test executables' `deps` directory,
//! so the tests copy it from there into a scratch plugin directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use petri_cells::CELL;
use petri_core::*;

/// Build output directory of the current profile
fn profile_dir() -> PathBuf {
    let from_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| Some(exe.parent()?.parent()?.to_path_buf()))
        .filter(|dir| dir.is_dir());

    from_exe.unwrap_or_else(|| {
        let profile = if cfg!(debug_assertions) { "debug" } else { "release" };
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target").join(profile)
    })
}

/// Scratch plugin directory holding a copy of the cells binary
fn plugin_dir() -> tempfile::TempDir {
    let file = format!("{}petri_cells{}", std::env::consts::DLL_PREFIX, file_extension());
    let built = profile_dir().join(&file);
    assert!(built.is_file(), "cells plugin binary not built at {}", built.display());

    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(&built, dir.path().join(&file)).unwrap();
    dir
}

#[test]
fn test_binary_is_discovered_by_name() {
    let dir = plugin_dir();
    let manager = Manager::shared();
    manager.add_directory(dir.path());

    assert_eq!(manager.extern_names(), vec!["cells"]);
    assert!(manager.is_available("cells"));
}

#[test]
fn test_loaded_binary_runs_cells() {
    let dir = plugin_dir();
    let manager = Manager::shared();
    manager.add_directory(dir.path());

    {
        let mut sim = Simulation::new(manager.clone());
        sim.load_plugin("cells").unwrap();
        let library = manager.get("cells").unwrap();
        assert_eq!(library.path().map(Path::to_path_buf), manager.plugin_path("cells"));
        drop(library);

        let mut cell = sim.create_object(CELL, ObjectKind::Dynamic).unwrap();
        cell.configure(&Parameters::new().with("growth-rate", "0.5"), &mut sim)
            .unwrap();
        sim.add_object(cell);
        sim.initialize(&AtomicBool::new(false)).unwrap();

        for _ in 0..10 {
            if sim.object_count() == 2 {
                break;
            }
            sim.update().unwrap();
        }
        assert_eq!(sim.object_count(), 2);
        assert!(sim.objects().all(|o| o.data().type_name == CELL));

        let frame = sim.frame();
        assert_eq!(frame.objects.len(), 2);
        sim.terminate();
    }

    // Every object from the binary is gone before it unloads
    manager.release_plugins();
    assert!(!manager.is_loaded("cells"));
    assert!(manager.load_order().is_empty());
}
