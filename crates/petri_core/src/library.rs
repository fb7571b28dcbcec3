//! Host-side owner of one plugin: a builtin API object or a loaded binary
//!
//! Handles loading, entry point resolution, compatibility checking and
//! unloading of plugin shared libraries.

use crate::abi::{
    self, ApiBox, ApiVersionFn, CreateFn, EntryPoints, RealSizeFn, SYMBOL_API_VERSION,
    SYMBOL_CREATE, SYMBOL_REAL_SIZE,
};
use crate::api::Api;
use crate::error::{Error, Result};
use libloading::Symbol;
use std::path::{Path, PathBuf};

/// File name prefix of plugin binaries (`libpetri_` on Unix, `petri_` on Windows)
pub fn file_prefix() -> String {
    format!("{}petri_", std::env::consts::DLL_PREFIX)
}

/// File name extension of plugin binaries, including the dot
pub fn file_extension() -> &'static str {
    std::env::consts::DLL_SUFFIX
}

/// Plugin name encoded in a binary's file name, if it follows the pattern
pub fn plugin_name_from_file(file_name: &str) -> Option<&str> {
    let prefix = file_prefix();
    let name = file_name
        .strip_prefix(prefix.as_str())?
        .strip_suffix(file_extension())?;

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// A loaded plugin.
///
/// The API object is declared before the OS handle and is also released
/// explicitly in `Drop`, so the plugin's code is never unmapped while one of
/// its objects is alive.
pub struct Library {
    /// Plugin name
    name: String,
    /// The plugin implementation
    api: Option<ApiBox>,
    /// Source binary for dynamic plugins
    path: Option<PathBuf>,
    /// The underlying library handle, `None` for builtins
    handle: Option<libloading::Library>,
}

impl Library {
    /// Wrap a statically linked plugin
    pub fn builtin(name: impl Into<String>, api: Box<dyn Api>) -> Self {
        let name = name.into();
        log::debug!("Library loaded `{}` (builtin)", name);

        Self {
            name,
            api: Some(api),
            path: None,
            handle: None,
        }
    }

    /// Load a plugin binary from a path
    pub fn load_dynamic(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let path = path.as_ref();

        log::debug!("Loading shared library: {}", path.display());

        // Load the library
        let handle = unsafe {
            libloading::Library::new(path).map_err(|e| Error::load(&name, e.to_string()))?
        };

        // Resolve entry points; copying the function pointers out is fine
        // because `handle` outlives every use of them below
        let entry_points = unsafe {
            let api_version: Symbol<ApiVersionFn> = handle
                .get(SYMBOL_API_VERSION)
                .map_err(|_| missing_symbol(&name, SYMBOL_API_VERSION))?;
            let real_size: Symbol<RealSizeFn> = handle
                .get(SYMBOL_REAL_SIZE)
                .map_err(|_| missing_symbol(&name, SYMBOL_REAL_SIZE))?;
            let create: Symbol<CreateFn> = handle
                .get(SYMBOL_CREATE)
                .map_err(|_| missing_symbol(&name, SYMBOL_CREATE))?;

            EntryPoints {
                api_version: *api_version,
                real_size: *real_size,
                create: *create,
            }
        };

        // On error `handle` is dropped here, which unloads the binary
        let api = unsafe { Self::instantiate(&name, entry_points)? };

        log::debug!("Library loaded `{}` from {}", name, path.display());

        Ok(Self {
            name,
            api: Some(api),
            path: Some(path.to_path_buf()),
            handle: Some(handle),
        })
    }

    /// Verify a plugin's build configuration and construct its API object.
    ///
    /// # Safety
    /// The entry points must be valid functions with the documented
    /// signatures, and the code behind them must stay loaded for as long as
    /// the returned API object lives.
    pub unsafe fn instantiate(name: &str, entry_points: EntryPoints) -> Result<ApiBox> {
        let api_version = (entry_points.api_version)();
        let real_size = (entry_points.real_size)();

        abi::check_compatibility(api_version, real_size)
            .map_err(|reason| Error::abi_mismatch(name, reason))?;

        let raw = (entry_points.create)();
        if raw.is_null() {
            return Err(Error::abi_mismatch(name, "create function returned null"));
        }

        Ok(*Box::from_raw(raw))
    }

    /// Get the plugin name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the plugin API
    pub fn api(&self) -> &dyn Api {
        // Only `Drop` takes the API out
        match &self.api {
            Some(api) => api.as_ref(),
            None => unreachable!("plugin API accessed during drop"),
        }
    }

    /// Whether the plugin is statically linked
    pub fn is_builtin(&self) -> bool {
        self.handle.is_none()
    }

    /// Source binary of a dynamic plugin
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn missing_symbol(name: &str, symbol: &[u8]) -> Error {
    let symbol = String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)).into_owned();
    Error::abi_mismatch(name, format!("missing entry point '{}'", symbol))
}

impl Drop for Library {
    fn drop(&mut self) {
        // Release the API object while its code is still mapped
        drop(self.api.take());

        if let Some(handle) = self.handle.take() {
            log::debug!("Closing shared library `{}`", self.name);
            drop(handle);
        }

        log::debug!("Library released `{}`", self.name);
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("builtin", &self.is_builtin())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{PLUGIN_API_VERSION, REAL_SIZE};
    use std::io::Write;

    struct Empty;

    impl Api for Empty {}

    unsafe extern "C" fn good_version() -> u32 {
        PLUGIN_API_VERSION
    }

    unsafe extern "C" fn bad_version() -> u32 {
        PLUGIN_API_VERSION + 100
    }

    unsafe extern "C" fn good_size() -> u32 {
        REAL_SIZE
    }

    unsafe extern "C" fn float_size() -> u32 {
        4
    }

    #[allow(improper_ctypes_definitions)]
    unsafe extern "C" fn create() -> *mut ApiBox {
        let api: ApiBox = Box::new(Empty);
        Box::into_raw(Box::new(api))
    }

    #[test]
    fn test_plugin_file_names() {
        let file = format!("{}cells{}", file_prefix(), file_extension());
        assert_eq!(plugin_name_from_file(&file), Some("cells"));

        let bare = format!("{}{}", file_prefix(), file_extension());
        assert_eq!(plugin_name_from_file(&bare), None);
        assert_eq!(plugin_name_from_file("readme.txt"), None);
    }

    #[test]
    fn test_instantiate_checks_version() {
        let good = EntryPoints {
            api_version: good_version,
            real_size: good_size,
            create,
        };
        assert!(unsafe { Library::instantiate("good", good) }.is_ok());

        let old = EntryPoints {
            api_version: bad_version,
            ..good
        };
        let err = unsafe { Library::instantiate("old", old) }.err().unwrap();
        assert!(matches!(err, Error::AbiMismatch { ref name, .. } if name == "old"));

        let narrow = EntryPoints {
            real_size: float_size,
            ..good
        };
        let err = unsafe { Library::instantiate("narrow", narrow) }.err().unwrap();
        assert!(matches!(err, Error::AbiMismatch { .. }));
    }

    #[test]
    fn test_load_missing_binary() {
        let err = Library::load_dynamic("ghost", "/nonexistent/libpetri_ghost.so").unwrap_err();
        assert!(matches!(err, Error::Load { ref name, .. } if name == "ghost"));
    }

    #[test]
    fn test_load_garbage_binary() {
        let mut file = tempfile::Builder::new()
            .suffix(file_extension())
            .tempfile()
            .unwrap();
        file.write_all(b"definitely not a shared object").unwrap();

        let err = Library::load_dynamic("garbage", file.path()).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn test_builtin() {
        let library = Library::builtin("empty", Box::new(Empty));
        assert_eq!(library.name(), "empty");
        assert!(library.is_builtin());
        assert!(library.path().is_none());
        assert!(library.api().required_plugins().is_empty());
    }
}
