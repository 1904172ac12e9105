//! LADSPA and LV2 plugin hosting for Stomp
//!
//! This crate loads third-party audio-effect plugins built against one of
//! three incompatible native ABIs — legacy LADSPA descriptors, LV2
//! descriptors described by a JSON metadata sidecar, and LV2 plugins found
//! through a discovery library — and presents them as a single uniform
//! [`PluginInstance`]: classified ports, bindable buffers, and a
//! run-once-per-audio-block processing contract.
//!
//! ## Usage
//!
//! ```ignore
//! use stomp_host::{HostConfig, PluginInstance, PluginLibrary, UridRegistry};
//!
//! let library = PluginLibrary::open("/usr/lib/ladspa/amp.so")?;
//! let descriptor = library.legacy_descriptor(0).expect("no descriptor");
//!
//! let urid = UridRegistry::new();
//! let mut plugin = unsafe {
//!     PluginInstance::legacy(descriptor, 48000.0, urid, HostConfig::default())?
//! };
//!
//! plugin.activate()?;
//! let input = vec![0.0f32; 512];
//! let mut output = vec![0.0f32; 512];
//! plugin.run(&[&input], &mut [&mut output], 512)?;
//! ```
//!
//! Classification is deliberately forgiving: a port the host cannot
//! understand is bound to an inert sink and logged, never a reason to
//! refuse the whole plugin. Only a null descriptor, a null instantiated
//! handle, or a non-positive sample rate are fatal.

pub mod error;
pub use error::{HostError, Result};

mod urid;
pub use urid::UridRegistry;

mod classify;
pub use classify::{
    classify_port, overrides_for, ForcedRole, PluginIdentity, PortDirection, PortInventory,
    PortKind, PortMeta, PortOverride, PortRange, PortRole,
};

mod abi;
pub use abi::PluginAbi;

pub mod ladspa;
pub mod lv2;

mod library;
pub use library::PluginLibrary;

mod sidecar;
pub use sidecar::{load_sidecar, merge_ports, parse_sidecar, SidecarDoc};

mod controls;
pub use controls::{ControlParameter, ControlRegistry};

mod atom;
pub use atom::{AtomUrids, ChannelRole, Event, EventChannel};

mod features;
pub use features::{FeatureTable, HostConfig};

mod worker;

mod instance;
pub use instance::{Lifecycle, PluginInstance};
