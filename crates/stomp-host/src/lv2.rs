//! LV2 plugin ABI
//!
//! Host-side declarations of the LV2 call surface: the descriptor, the
//! feature record, and the shim structs for the capabilities we negotiate
//! (identifier map, log sink, deferred work, options). Two adapters share
//! the descriptor: `Lv2Adapter` for plugins described by a JSON sidecar,
//! `DiscoveredAdapter` for plugins whose ports were introspected natively
//! by a discovery library.

use std::ffi::{c_char, c_void, CStr, CString};

use crate::abi::PluginAbi;
use crate::classify::{PluginIdentity, PortInventory, PortMeta};
use crate::error::{HostError, Result};
use crate::features::FeatureTable;

pub type Lv2Handle = *mut c_void;

// Capability URIs negotiated at instantiation.
pub const URID_MAP_URI: &CStr = c"http://lv2plug.in/ns/ext/urid#map";
pub const URID_UNMAP_URI: &CStr = c"http://lv2plug.in/ns/ext/urid#unmap";
pub const LOG_URI: &CStr = c"http://lv2plug.in/ns/ext/log#log";
pub const WORKER_SCHEDULE_URI: &CStr = c"http://lv2plug.in/ns/ext/worker#schedule";
pub const OPTIONS_URI: &CStr = c"http://lv2plug.in/ns/ext/options#options";
pub const OPTIONS_INTERFACE_URI: &CStr = c"http://lv2plug.in/ns/ext/options#interface";

// Plugin-side interfaces discovered through `extension_data`.
pub const WORKER_INTERFACE_URI: &CStr = c"http://lv2plug.in/ns/ext/worker#interface";
pub const STATE_INTERFACE_URI: &CStr = c"http://lv2plug.in/ns/ext/state#interface";

/// One capability record of the feature table: a fixed identifier string
/// plus an opaque data pointer the plugin casts back to the matching shim.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FeatureRecord {
    pub uri: *const c_char,
    pub data: *mut c_void,
}

/// The struct an LV2 plugin exports.
#[repr(C)]
pub struct Lv2Descriptor {
    pub uri: *const c_char,
    pub instantiate: Option<
        unsafe extern "C" fn(
            *const Lv2Descriptor,
            f64,
            *const c_char,
            *const *const FeatureRecord,
        ) -> Lv2Handle,
    >,
    pub connect_port: Option<unsafe extern "C" fn(Lv2Handle, u32, *mut c_void)>,
    pub activate: Option<unsafe extern "C" fn(Lv2Handle)>,
    pub run: Option<unsafe extern "C" fn(Lv2Handle, u32)>,
    pub deactivate: Option<unsafe extern "C" fn(Lv2Handle)>,
    pub cleanup: Option<unsafe extern "C" fn(Lv2Handle)>,
    pub extension_data: Option<unsafe extern "C" fn(*const c_char) -> *const c_void>,
}

/// Identifier-map capability: wraps the registry's lookup-or-assign.
#[repr(C)]
pub struct UridMapShim {
    pub handle: *mut c_void,
    pub map: Option<unsafe extern "C" fn(*mut c_void, *const c_char) -> u32>,
}

#[repr(C)]
pub struct UridUnmapShim {
    pub handle: *mut c_void,
    pub unmap: Option<unsafe extern "C" fn(*mut c_void, u32) -> *const c_char>,
}

/// Logging capability: the plugin hands over a type identifier and an
/// already formatted message; the host interprets neither.
#[repr(C)]
pub struct LogShim {
    pub handle: *mut c_void,
    pub log: Option<unsafe extern "C" fn(*mut c_void, u32, *const c_char) -> i32>,
}

/// Deferred-work capability: a single schedule entry point the plugin may
/// call at any time during `run`.
#[repr(C)]
pub struct WorkerScheduleShim {
    pub handle: *mut c_void,
    pub schedule_work: Option<unsafe extern "C" fn(*mut c_void, u32, *const c_void) -> i32>,
}

pub const WORKER_SUCCESS: i32 = 0;
pub const WORKER_ERR_UNKNOWN: i32 = 1;
pub const WORKER_ERR_NO_SPACE: i32 = 2;

pub type WorkerRespond = Option<unsafe extern "C" fn(*mut c_void, u32, *const c_void) -> i32>;

/// Plugin-side deferred-work interface, returned by `extension_data`.
#[repr(C)]
pub struct WorkerInterface {
    pub work: Option<
        unsafe extern "C" fn(Lv2Handle, WorkerRespond, *mut c_void, u32, *const c_void) -> i32,
    >,
    pub work_response: Option<unsafe extern "C" fn(Lv2Handle, u32, *const c_void) -> i32>,
    pub end_run: Option<unsafe extern "C" fn(Lv2Handle) -> i32>,
}

/// Plugin-side state interface, returned by `extension_data`. The host
/// retains the pointer for its caller; it does not drive save/restore
/// itself.
#[repr(C)]
pub struct StateInterface {
    pub save: Option<
        unsafe extern "C" fn(Lv2Handle, *mut c_void, *mut c_void, u32, *const *const FeatureRecord)
            -> i32,
    >,
    pub restore: Option<
        unsafe extern "C" fn(Lv2Handle, *mut c_void, *mut c_void, u32, *const *const FeatureRecord)
            -> i32,
    >,
}

/// One negotiated option record. An array of these, terminated by a zeroed
/// record, is the data of the options feature.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct OptionRecord {
    pub context: u32,
    pub subject: u32,
    pub key: u32,
    pub size: u32,
    pub type_: u32,
    pub value: *const c_void,
}

pub const OPTIONS_SUCCESS: u32 = 0;
pub const OPTIONS_ERR_UNKNOWN: u32 = 1;

/// Host-side options query: get/set entry points through which a plugin may
/// ask for (or try to change) the negotiated block length, sequence size,
/// and sample rate.
#[repr(C)]
pub struct OptionsQueryShim {
    pub handle: *mut c_void,
    pub get: Option<unsafe extern "C" fn(*mut c_void, *mut OptionRecord) -> u32>,
    pub set: Option<unsafe extern "C" fn(*mut c_void, *const OptionRecord) -> u32>,
}

fn lossy_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Adapter for sidecar-described LV2 plugins.
pub struct Lv2Adapter {
    descriptor: *const Lv2Descriptor,
    handle: Lv2Handle,
    bundle_path: CString,
}

impl Lv2Adapter {
    /// # Safety
    ///
    /// `descriptor` must point to a valid descriptor that outlives the
    /// adapter.
    pub unsafe fn new(descriptor: *const Lv2Descriptor, bundle_path: &str) -> Result<Self> {
        if descriptor.is_null() {
            return Err(HostError::Construction {
                reason: "null plugin descriptor".to_string(),
            });
        }
        let bundle_path = CString::new(bundle_path).map_err(|_| HostError::Construction {
            reason: "bundle path contains an interior NUL".to_string(),
        })?;
        Ok(Self {
            descriptor,
            handle: std::ptr::null_mut(),
            bundle_path,
        })
    }

    fn descriptor(&self) -> &Lv2Descriptor {
        unsafe { &*self.descriptor }
    }

    pub fn uri(&self) -> String {
        lossy_str(self.descriptor().uri)
    }
}

impl PluginAbi for Lv2Adapter {
    fn identity(&self) -> PluginIdentity {
        PluginIdentity::Uri(self.uri())
    }

    fn name(&self) -> String {
        self.uri()
    }

    fn native_ports(&self) -> Option<Vec<PortMeta>> {
        None
    }

    fn instantiate(&mut self, sample_rate: f64, features: Option<&FeatureTable>) -> Result<()> {
        let features = features.ok_or_else(|| HostError::Construction {
            reason: "plugin requires a feature table at instantiation".to_string(),
        })?;
        let instantiate = self
            .descriptor()
            .instantiate
            .ok_or_else(|| HostError::Construction {
                reason: "descriptor has no instantiate entry point".to_string(),
            })?;
        self.handle = unsafe {
            instantiate(
                self.descriptor,
                sample_rate,
                self.bundle_path.as_ptr(),
                features.as_ptr(),
            )
        };
        if self.handle.is_null() {
            return Err(HostError::Construction {
                reason: format!("plugin {} returned a null handle", self.uri()),
            });
        }
        Ok(())
    }

    unsafe fn connect_port(&mut self, index: u32, buffer: *mut c_void) {
        if let Some(connect) = self.descriptor().connect_port {
            connect(self.handle, index, buffer);
        }
    }

    fn activate(&mut self) {
        if let Some(activate) = self.descriptor().activate {
            unsafe { activate(self.handle) };
        }
    }

    fn run(&mut self, frames: u32) {
        if let Some(run) = self.descriptor().run {
            unsafe { run(self.handle, frames) };
        }
    }

    fn deactivate(&mut self) {
        if let Some(deactivate) = self.descriptor().deactivate {
            unsafe { deactivate(self.handle) };
        }
    }

    fn extension_data(&self, uri: &CStr) -> Option<*const c_void> {
        let query = self.descriptor().extension_data?;
        let ptr = unsafe { query(uri.as_ptr()) };
        (!ptr.is_null()).then_some(ptr)
    }

    fn handle(&self) -> *mut c_void {
        self.handle
    }
}

impl Drop for Lv2Adapter {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        if let Some(cleanup) = self.descriptor().cleanup {
            unsafe { cleanup(self.handle) };
        }
        self.handle = std::ptr::null_mut();
    }
}

/// Adapter for plugins found through a discovery library: same descriptor
/// surface, but port metadata comes from the natively introspected
/// inventory instead of (or in addition to) a sidecar.
pub struct DiscoveredAdapter {
    inner: Lv2Adapter,
    inventory: PortInventory,
}

impl DiscoveredAdapter {
    /// # Safety
    ///
    /// Same contract as [`Lv2Adapter::new`].
    pub unsafe fn new(
        descriptor: *const Lv2Descriptor,
        bundle_path: &str,
        inventory: PortInventory,
    ) -> Result<Self> {
        Ok(Self {
            inner: Lv2Adapter::new(descriptor, bundle_path)?,
            inventory,
        })
    }
}

impl PluginAbi for DiscoveredAdapter {
    fn identity(&self) -> PluginIdentity {
        if self.inventory.plugin_uri.is_empty() {
            self.inner.identity()
        } else {
            PluginIdentity::Uri(self.inventory.plugin_uri.clone())
        }
    }

    fn name(&self) -> String {
        if self.inventory.plugin_name.is_empty() {
            self.inner.name()
        } else {
            self.inventory.plugin_name.clone()
        }
    }

    fn native_ports(&self) -> Option<Vec<PortMeta>> {
        Some(self.inventory.ports.clone())
    }

    fn uri_prefix(&self) -> Option<String> {
        self.inventory.prefix.clone()
    }

    fn instantiate(&mut self, sample_rate: f64, features: Option<&FeatureTable>) -> Result<()> {
        self.inner.instantiate(sample_rate, features)
    }

    unsafe fn connect_port(&mut self, index: u32, buffer: *mut c_void) {
        self.inner.connect_port(index, buffer)
    }

    fn activate(&mut self) {
        self.inner.activate()
    }

    fn run(&mut self, frames: u32) {
        self.inner.run(frames)
    }

    fn deactivate(&mut self) {
        self.inner.deactivate()
    }

    fn extension_data(&self, uri: &CStr) -> Option<*const c_void> {
        self.inner.extension_data(uri)
    }

    fn handle(&self) -> *mut c_void {
        self.inner.handle()
    }
}
