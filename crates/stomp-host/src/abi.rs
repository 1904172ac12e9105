//! Uniform capability interface over the three native plugin ABIs.
//!
//! The classifier and the lifecycle controller only ever talk to this
//! trait; everything variant-specific lives in the concrete adapters
//! (`ladspa`, `lv2`).

use std::ffi::{c_void, CStr};

use crate::classify::{PluginIdentity, PortMeta};
use crate::error::Result;
use crate::features::FeatureTable;

/// One native plugin descriptor, adapted to a single calling convention.
///
/// Call order is fixed: `instantiate` once, then `connect_port` for every
/// declared port, then `activate`/`run`/`deactivate` as the lifecycle
/// controller drives them. The adapter owns the native handle and releases
/// it on drop.
pub trait PluginAbi {
    fn identity(&self) -> PluginIdentity;

    /// Human-readable name as far as the native side knows it. Sidecar
    /// metadata overrides this when present.
    fn name(&self) -> String;

    /// Whether this variant expects a feature table at instantiation.
    fn negotiates_features(&self) -> bool {
        true
    }

    /// Ports as declared by the variant's native metadata source, if it has
    /// one (legacy struct walk, discovery inventory). `None` means the JSON
    /// sidecar is the only source.
    fn native_ports(&self) -> Option<Vec<PortMeta>>;

    /// URI prefix scoping event-addressable parameter names, when the
    /// native side declares one.
    fn uri_prefix(&self) -> Option<String> {
        None
    }

    /// Create the native handle. A null handle from the plugin is a fatal
    /// construction error.
    fn instantiate(&mut self, sample_rate: f64, features: Option<&FeatureTable>) -> Result<()>;

    /// Wire `buffer` to the declared port at `index`.
    ///
    /// # Safety
    ///
    /// `buffer` must stay valid (and must not move) until the port is
    /// re-connected or the instance is released; the plugin dereferences it
    /// on every `run`.
    unsafe fn connect_port(&mut self, index: u32, buffer: *mut c_void);

    fn activate(&mut self);

    fn run(&mut self, frames: u32);

    fn deactivate(&mut self);

    /// Query an optional plugin-side interface (deferred work, state
    /// save/restore) by capability URI.
    fn extension_data(&self, uri: &CStr) -> Option<*const c_void>;

    /// The raw instantiated handle, for callbacks that re-enter the plugin.
    fn handle(&self) -> *mut c_void;
}
