//! Shared-object entry resolution
//!
//! Opens a plugin shared object and resolves the per-ABI descriptor entry
//! points. Which paths to open is the caller's business (install-path
//! scanning lives in the discovery tooling, not here).

use std::ffi::c_ulong;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::error::{HostError, Result};
use crate::ladspa::LadspaDescriptor;
use crate::lv2::Lv2Descriptor;

type LegacyEntry = unsafe extern "C" fn(c_ulong) -> *const LadspaDescriptor;
type Lv2Entry = unsafe extern "C" fn(u32) -> *const Lv2Descriptor;

const LEGACY_ENTRY_SYMBOL: &[u8] = b"ladspa_descriptor\0";
const LV2_ENTRY_SYMBOL: &[u8] = b"lv2_descriptor\0";

/// An open plugin shared object. Descriptors resolved through it stay
/// valid only while the library is open — keep it alive for as long as any
/// instance built from its descriptors.
#[derive(Debug)]
pub struct PluginLibrary {
    library: Library,
    path: PathBuf,
}

impl PluginLibrary {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|e| HostError::Library {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve the legacy descriptor at `index`, if the library exports the
    /// legacy entry point and has that many descriptors.
    pub fn legacy_descriptor(&self, index: u32) -> Option<*const LadspaDescriptor> {
        let entry: Symbol<'_, LegacyEntry> =
            unsafe { self.library.get(LEGACY_ENTRY_SYMBOL) }.ok()?;
        let descriptor = unsafe { entry(index as c_ulong) };
        (!descriptor.is_null()).then_some(descriptor)
    }

    pub fn lv2_descriptor(&self, index: u32) -> Option<*const Lv2Descriptor> {
        let entry: Symbol<'_, Lv2Entry> = unsafe { self.library.get(LV2_ENTRY_SYMBOL) }.ok()?;
        let descriptor = unsafe { entry(index) };
        (!descriptor.is_null()).then_some(descriptor)
    }

    /// All legacy descriptors the library exports, in entry order.
    pub fn legacy_descriptors(&self) -> Vec<*const LadspaDescriptor> {
        (0..).map_while(|i| self.legacy_descriptor(i)).collect()
    }

    pub fn lv2_descriptors(&self) -> Vec<*const Lv2Descriptor> {
        (0..).map_while(|i| self.lv2_descriptor(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_is_a_library_error() {
        let err = PluginLibrary::open("/nonexistent/path/libnothing.so").unwrap_err();
        match err {
            HostError::Library { path, .. } => {
                assert!(path.to_string_lossy().contains("libnothing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
