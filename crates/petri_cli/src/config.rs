//! Host Configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Command line arguments
//! 2. Environment variables: `PETRI_PLUGINS_DIR` (path list), `PETRI_LOG`
//! 3. Config file: `--config <file>`, else `petri.toml`, else
//!    `$XDG_CONFIG_HOME/petri/host.toml`
//!
//! # Example Config File
//!
//! ```toml
//! plugin_dirs = ["/usr/lib/petri", "target/release"]
//! log_filter = "petri_core=debug,info"
//! observer_interval_ms = 500
//!
//! [parameters]
//! seed = "42"
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file in the working directory
pub const LOCAL_CONFIG: &str = "petri.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Option '{0}' requires a value")]
    MissingValue(String),

    #[error("Invalid value '{value}' for option '{option}'")]
    InvalidValue { option: String, value: String },

    #[error("Unknown option '{0}'")]
    UnknownOption(String),

    #[error("Unexpected argument '{0}', a scene file is already given")]
    UnexpectedArgument(String),
}

/// Settings of the `petri` host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directories scanned for plugin binaries
    pub plugin_dirs: Vec<PathBuf>,
    /// Log filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Console observer period
    pub observer_interval_ms: u64,
    /// Simulation parameters, override values from the scene file
    pub parameters: IndexMap<String, String>,
    /// Step budget overriding the scene file
    pub iterations: Option<u64>,
    /// Scene file to run
    pub scene: Option<PathBuf>,
    /// Print available plugins and exit
    #[serde(skip)]
    pub list_plugins: bool,
    /// Print usage and exit
    #[serde(skip)]
    pub help: bool,
    /// File the configuration was read from
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: Vec::new(),
            log_filter: "info".to_string(),
            observer_interval_ms: 1000,
            parameters: IndexMap::new(),
            iterations: None,
            scene: None,
            list_plugins: false,
            help: false,
            config_path: None,
        }
    }
}

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub plugin_dirs: Vec<PathBuf>,
    pub parameters: Vec<(String, String)>,
    pub iterations: Option<u64>,
    pub log_filter: Option<String>,
    pub scene: Option<PathBuf>,
    pub list_plugins: bool,
    pub help: bool,
}

impl CliArgs {
    /// Parse arguments, without the program name
    pub fn parse<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter().map(Into::into);

        fn value(option: &str, next: Option<String>) -> Result<String, ConfigError> {
            next.ok_or_else(|| ConfigError::MissingValue(option.to_string()))
        }

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--plugins-dir" => parsed.plugin_dirs.push(value(&arg, args.next())?.into()),
                "--plugins" => parsed.list_plugins = true,
                "-p" | "--parameter" => {
                    let name = value(&arg, args.next())?;
                    let val = value(&arg, args.next())?;
                    parsed.parameters.push((name, val));
                }
                "--iterations" => {
                    let raw = value(&arg, args.next())?;
                    let iterations = raw.parse().map_err(|_| ConfigError::InvalidValue {
                        option: arg.clone(),
                        value: raw.clone(),
                    })?;
                    parsed.iterations = Some(iterations);
                }
                "--config" => parsed.config = Some(value(&arg, args.next())?.into()),
                "--log" => parsed.log_filter = Some(value(&arg, args.next())?),
                "-h" | "--help" => parsed.help = true,
                other if other.starts_with('-') && other != "-" => {
                    return Err(ConfigError::UnknownOption(other.to_string()));
                }
                _ => {
                    if parsed.scene.is_some() {
                        return Err(ConfigError::UnexpectedArgument(arg));
                    }
                    parsed.scene = Some(arg.into());
                }
            }
        }

        Ok(parsed)
    }
}

impl HostConfig {
    /// Load configuration from every source
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        // 1. Config file
        let mut config = match &args.config {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_files().into_iter().find(|p| p.is_file()) {
                Some(path) => Self::load_from_file(&path)?,
                None => Self::default(),
            },
        };

        // 2. Environment
        config.apply_env(|name| std::env::var(name).ok());

        // 3. Command line
        config.apply_args(args);

        Ok(config)
    }

    /// Candidate config files, most specific first
    pub fn default_files() -> Vec<PathBuf> {
        let mut files = vec![PathBuf::from(LOCAL_CONFIG)];

        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| Path::new(&home).join(".config")));

        if let Some(dir) = config_home {
            files.push(dir.join("petri").join("host.toml"));
        }
        files
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply environment overrides read through `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dirs) = var("PETRI_PLUGINS_DIR") {
            for dir in std::env::split_paths(&dirs) {
                if !dir.as_os_str().is_empty() && !self.plugin_dirs.contains(&dir) {
                    self.plugin_dirs.push(dir);
                }
            }
        }

        if let Some(filter) = var("PETRI_LOG") {
            if !filter.is_empty() {
                self.log_filter = filter;
            }
        }
    }

    /// Apply command line overrides
    pub fn apply_args(&mut self, args: &CliArgs) {
        for dir in &args.plugin_dirs {
            if !self.plugin_dirs.contains(dir) {
                self.plugin_dirs.push(dir.clone());
            }
        }
        for (name, value) in &args.parameters {
            self.parameters.insert(name.clone(), value.clone());
        }
        if let Some(iterations) = args.iterations {
            self.iterations = Some(iterations);
        }
        if let Some(filter) = &args.log_filter {
            self.log_filter = filter.clone();
        }
        if let Some(scene) = &args.scene {
            self.scene = Some(scene.clone());
        }
        self.list_plugins |= args.list_plugins;
        self.help |= args.help;
    }

    pub fn print_summary(&self) {
        log::info!("Host Configuration:");
        if let Some(path) = &self.config_path {
            log::info!("  Config: {}", path.display());
        }
        for dir in &self.plugin_dirs {
            log::info!("  Plugin directory: {}", dir.display());
        }
        if let Some(scene) = &self.scene {
            log::info!("  Scene: {}", scene.display());
        }
        if let Some(iterations) = self.iterations {
            log::info!("  Iterations: {}", iterations);
        }
    }
}

/// Usage text
pub const USAGE: &str = "\
Usage: petri [OPTIONS] <SCENE>

Options:
      --plugins-dir <DIR>    Add a plugin directory (repeatable)
      --plugins              List available plugins and exit
  -p, --parameter <N> <V>    Set a simulation parameter (repeatable)
      --iterations <N>       Step budget, 0 for unlimited
      --config <FILE>        Host configuration file
      --log <FILTER>         Log filter when RUST_LOG is unset
  -h, --help                 Print this help
";
