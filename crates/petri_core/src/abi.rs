//! Binary contract between the host and dynamically loaded plugins
//!
//! A plugin binary must export three `extern "C"` entry points, looked up by
//! fixed symbol name:
//!
//! | symbol                      | signature                 |
//! |-----------------------------|---------------------------|
//! | `petri_plugin_api_version`  | `fn() -> u32`             |
//! | `petri_plugin_real_size`    | `fn() -> u32`             |
//! | `petri_plugin_create`       | `fn() -> *mut ApiBox`     |
//!
//! Both sides compile [`PLUGIN_API_VERSION`] and [`Real`] in; the host refuses
//! any binary that reports different values. Use [`export_plugin!`] to
//! generate the entry points.

use crate::api::Api;

/// API version for compatibility checking
pub const PLUGIN_API_VERSION: u32 = 3;

/// Scalar type used for every simulated quantity
pub type Real = f64;

/// Two dimensional vector of [`Real`]
pub type Vector = glam::DVec2;

/// Size of [`Real`] as reported across the plugin boundary
pub const REAL_SIZE: u32 = std::mem::size_of::<Real>() as u32;

/// Symbol returning [`PLUGIN_API_VERSION`]
pub const SYMBOL_API_VERSION: &[u8] = b"petri_plugin_api_version\0";

/// Symbol returning [`REAL_SIZE`]
pub const SYMBOL_REAL_SIZE: &[u8] = b"petri_plugin_real_size\0";

/// Symbol returning a freshly allocated [`ApiBox`]
pub const SYMBOL_CREATE: &[u8] = b"petri_plugin_create\0";

/// Thin, FFI-safe owner of a plugin API object.
///
/// `Box<dyn Api>` is a fat pointer, so it is boxed once more before crossing
/// the `extern "C"` boundary.
pub type ApiBox = Box<dyn Api>;

/// Function returning the plugin API version
pub type ApiVersionFn = unsafe extern "C" fn() -> u32;

/// Function returning the size of the plugin's scalar type
pub type RealSizeFn = unsafe extern "C" fn() -> u32;

/// Function constructing the plugin API object
pub type CreateFn = unsafe extern "C" fn() -> *mut ApiBox;

/// Resolved entry points of one plugin binary
#[derive(Clone, Copy)]
pub struct EntryPoints {
    pub api_version: ApiVersionFn,
    pub real_size: RealSizeFn,
    pub create: CreateFn,
}

/// Check the build configuration reported by a plugin against the host
pub fn check_compatibility(api_version: u32, real_size: u32) -> Result<(), String> {
    if api_version != PLUGIN_API_VERSION {
        return Err(format!(
            "built against API version {}, host expects {}",
            api_version, PLUGIN_API_VERSION
        ));
    }

    if real_size != REAL_SIZE {
        return Err(format!(
            "built with {}-byte real type, host uses {} bytes",
            real_size, REAL_SIZE
        ));
    }

    Ok(())
}

/// Export the plugin entry points for an [`Api`] implementation.
///
/// The type must implement `Default`.
///
/// ```ignore
/// #[derive(Default)]
/// struct CellsPlugin;
///
/// impl petri_core::Api for CellsPlugin { /* ... */ }
///
/// petri_core::export_plugin!(CellsPlugin);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($api:ty) => {
        #[no_mangle]
        pub extern "C" fn petri_plugin_api_version() -> u32 {
            $crate::abi::PLUGIN_API_VERSION
        }

        #[no_mangle]
        pub extern "C" fn petri_plugin_real_size() -> u32 {
            $crate::abi::REAL_SIZE
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn petri_plugin_create() -> *mut $crate::abi::ApiBox {
            let api: $crate::abi::ApiBox = Box::new(<$api as Default>::default());
            Box::into_raw(Box::new(api))
        }
    };
}
