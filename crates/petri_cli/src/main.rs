//! petri - Simulation Host

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use petri_cli::config::USAGE;
use petri_cli::{create_manager, install_interrupt, plugin_listing, run_scene, CliArgs, HostConfig, HostError};

fn main() {
    let config = match CliArgs::parse(std::env::args().skip(1))
        .and_then(|args| HostConfig::load(&args))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("petri: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    if config.help {
        print!("{}", USAGE);
        return;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter.as_str()))
        .init();

    if let Err(e) = run(&config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: &HostConfig) -> Result<(), HostError> {
    log::info!("petri {}", env!("CARGO_PKG_VERSION"));
    config.print_summary();

    let manager = create_manager(config);

    if config.list_plugins {
        for line in plugin_listing(&manager) {
            println!("{}", line);
        }
        return Ok(());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    install_interrupt(cancel.clone());

    let summary = run_scene(manager.clone(), config, &cancel)?;
    if summary.cancelled {
        log::info!("Run cancelled");
    }

    manager.unload_all();
    Ok(())
}
