//! # Stomp - effect-plugin host runtime
//!
//! Umbrella crate over the Stomp subsystems:
//! - **stomp-host** - plugin hosting: port classification, feature
//!   negotiation, buffer binding, and the per-block processing lifecycle
//!   for LADSPA and LV2 plugins.
//!
//! ## Quick Start
//!
//! ```ignore
//! use stomp::prelude::*;
//!
//! let library = PluginLibrary::open("/usr/lib/ladspa/amp.so")?;
//! let descriptor = library.legacy_descriptor(0).expect("empty library");
//!
//! let mut plugin = unsafe {
//!     PluginInstance::legacy(
//!         descriptor,
//!         48000.0,
//!         UridRegistry::new(),
//!         HostConfig::default(),
//!     )?
//! };
//! plugin.activate()?;
//! ```

/// Re-export of stomp-host for direct access
pub use stomp_host as host;

pub use stomp_host::{
    AtomUrids, ChannelRole, ControlParameter, ControlRegistry, EventChannel, FeatureTable,
    HostConfig, Lifecycle, PluginIdentity, PluginInstance, PluginLibrary, PortDirection,
    PortInventory, PortKind, PortMeta, PortRange, PortRole, SidecarDoc, UridRegistry,
};

mod error;
pub use error::Error;

pub mod prelude {
    //! Common imports for host applications.
    pub use crate::{Error, HostConfig, Lifecycle, PluginInstance, PluginLibrary, UridRegistry};
}
