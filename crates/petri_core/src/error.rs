//! Error types for the plugin host and simulation lifecycle

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for host operations
pub type Result<T> = std::result::Result<T, Error>;

/// The five kinds of pluggable entities a plugin can provide factories for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Loader,
    Initializer,
    Module,
    Object,
    Program,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Loader => write!(f, "loader"),
            EntityKind::Initializer => write!(f, "initializer"),
            EntityKind::Module => write!(f, "module"),
            EntityKind::Object => write!(f, "object"),
            EntityKind::Program => write!(f, "program"),
        }
    }
}

/// Errors that can occur while hosting plugins or stepping a simulation
#[derive(Debug, Error)]
pub enum Error {
    /// The OS refused to open the plugin binary
    #[error("Plugin '{name}' cannot be loaded: {message}")]
    Load {
        name: String,
        message: String,
    },

    /// Missing entry point or incompatible build configuration
    #[error("Plugin '{name}' is not compatible with this host: {reason}")]
    AbiMismatch {
        name: String,
        reason: String,
    },

    /// Neither a builtin nor a discovered binary is known under this name
    #[error("Unable to find plugin '{0}'")]
    PluginNotFound(String),

    /// Importing a plugin that conflicts with an already imported one
    #[error("Plugin '{plugin}' conflicts with imported plugin '{with}'")]
    Conflict {
        plugin: String,
        with: String,
    },

    /// Plugins require each other in a loop
    #[error("Cyclic plugin dependency: {}", .chain.join(" -> "))]
    DependencyCycle {
        chain: Vec<String>,
    },

    /// A type name resolves in more than one imported plugin
    #[error("Ambiguous {kind} type '{type_name}' is provided by plugins: {}", .plugins.join(", "))]
    AmbiguousType {
        kind: EntityKind,
        type_name: String,
        plugins: Vec<String>,
    },

    /// A type name resolves in no imported plugin
    #[error("{}", unknown_type_message(.kind, .type_name, .available_in))]
    UnknownType {
        kind: EntityKind,
        type_name: String,
        available_in: Vec<String>,
    },

    /// Operation not allowed in the current lifecycle state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Argument rejected by the operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A plugin callback reported a failure
    #[error("Plugin '{plugin}' failed: {message}")]
    Plugin {
        plugin: String,
        message: String,
    },

    /// A file loader rejected its input
    #[error("Unable to load '{path}': {message}")]
    Loader {
        path: PathBuf,
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn unknown_type_message(kind: &EntityKind, type_name: &str, available_in: &[String]) -> String {
    if available_in.is_empty() {
        format!("Unknown {} type '{}'", kind, type_name)
    } else {
        format!(
            "Unknown {} type '{}', it is available in plugins: {} (import one of them)",
            kind,
            type_name,
            available_in.join(", ")
        )
    }
}

impl Error {
    /// Create a load error
    pub fn load(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Load {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an ABI mismatch error
    pub fn abi_mismatch(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::AbiMismatch {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a plugin callback failure
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a loader error
    pub fn loader(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Loader {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_hint() {
        let err = Error::UnknownType {
            kind: EntityKind::Module,
            type_name: "diffusion".into(),
            available_in: vec!["fluids".into(), "signals".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("module type 'diffusion'"));
        assert!(msg.contains("fluids, signals"));

        let err = Error::UnknownType {
            kind: EntityKind::Object,
            type_name: "cell".into(),
            available_in: Vec::new(),
        };
        assert_eq!(err.to_string(), "Unknown object type 'cell'");
    }

    #[test]
    fn test_ambiguous_names_every_plugin() {
        let err = Error::AmbiguousType {
            kind: EntityKind::Program,
            type_name: "move".into(),
            plugins: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "Ambiguous program type 'move' is provided by plugins: a, b"
        );
    }
}
