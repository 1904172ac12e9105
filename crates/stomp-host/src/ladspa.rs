//! Legacy plugin ABI
//!
//! Host-side declaration of the legacy descriptor struct and the adapter
//! that drives it. Legacy plugins carry all of their port metadata in the
//! descriptor itself (flags plus range hints), take no feature table, and
//! identify themselves by a numeric unique id.

use std::ffi::{c_char, c_ulong, c_void, CStr};

use crate::abi::PluginAbi;
use crate::classify::{PluginIdentity, PortDirection, PortKind, PortMeta, PortRange};
use crate::error::{HostError, Result};
use crate::features::FeatureTable;

pub type LadspaData = f32;
pub type LadspaHandle = *mut c_void;

// Port descriptor bits.
pub const PORT_INPUT: i32 = 0x1;
pub const PORT_OUTPUT: i32 = 0x2;
pub const PORT_CONTROL: i32 = 0x4;
pub const PORT_AUDIO: i32 = 0x8;

// Range hint bits.
pub const HINT_BOUNDED_BELOW: i32 = 0x1;
pub const HINT_BOUNDED_ABOVE: i32 = 0x2;
pub const HINT_TOGGLED: i32 = 0x4;
pub const HINT_SAMPLE_RATE: i32 = 0x8;
pub const HINT_LOGARITHMIC: i32 = 0x10;
pub const HINT_INTEGER: i32 = 0x20;
pub const HINT_DEFAULT_MASK: i32 = 0x3C0;
pub const HINT_DEFAULT_NONE: i32 = 0x0;
pub const HINT_DEFAULT_MINIMUM: i32 = 0x40;
pub const HINT_DEFAULT_LOW: i32 = 0x80;
pub const HINT_DEFAULT_MIDDLE: i32 = 0xC0;
pub const HINT_DEFAULT_HIGH: i32 = 0x100;
pub const HINT_DEFAULT_MAXIMUM: i32 = 0x140;
pub const HINT_DEFAULT_0: i32 = 0x200;
pub const HINT_DEFAULT_1: i32 = 0x240;
pub const HINT_DEFAULT_100: i32 = 0x280;
pub const HINT_DEFAULT_440: i32 = 0x2C0;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PortRangeHint {
    pub hint_descriptor: i32,
    pub lower_bound: LadspaData,
    pub upper_bound: LadspaData,
}

/// The struct a legacy plugin exports, mirrored field for field from the
/// C header. The host never mutates it.
#[repr(C)]
pub struct LadspaDescriptor {
    pub unique_id: c_ulong,
    pub label: *const c_char,
    pub properties: i32,
    pub name: *const c_char,
    pub maker: *const c_char,
    pub copyright: *const c_char,
    pub port_count: c_ulong,
    pub port_descriptors: *const i32,
    pub port_names: *const *const c_char,
    pub port_range_hints: *const PortRangeHint,
    pub implementation_data: *mut c_void,
    pub instantiate:
        Option<unsafe extern "C" fn(*const LadspaDescriptor, c_ulong) -> LadspaHandle>,
    pub connect_port: Option<unsafe extern "C" fn(LadspaHandle, c_ulong, *mut LadspaData)>,
    pub activate: Option<unsafe extern "C" fn(LadspaHandle)>,
    pub run: Option<unsafe extern "C" fn(LadspaHandle, c_ulong)>,
    pub run_adding: Option<unsafe extern "C" fn(LadspaHandle, c_ulong)>,
    pub set_run_adding_gain: Option<unsafe extern "C" fn(LadspaHandle, LadspaData)>,
    pub deactivate: Option<unsafe extern "C" fn(LadspaHandle)>,
    pub cleanup: Option<unsafe extern "C" fn(LadspaHandle)>,
}

/// Derive a control range from a legacy range hint, including the default
/// value encoded in the hint bits.
pub(crate) fn range_from_hint(hint: &PortRangeHint, sample_rate: f64) -> PortRange {
    let scale = if hint.hint_descriptor & HINT_SAMPLE_RATE != 0 {
        sample_rate as f32
    } else {
        1.0
    };
    let min = if hint.hint_descriptor & HINT_BOUNDED_BELOW != 0 {
        hint.lower_bound * scale
    } else {
        0.0
    };
    let max = if hint.hint_descriptor & HINT_BOUNDED_ABOVE != 0 {
        hint.upper_bound * scale
    } else {
        1.0
    };

    let logarithmic = hint.hint_descriptor & HINT_LOGARITHMIC != 0 && min > 0.0 && max > 0.0;
    let interpolate = |low_weight: f32| {
        if logarithmic {
            (min.ln() * low_weight + max.ln() * (1.0 - low_weight)).exp()
        } else {
            min * low_weight + max * (1.0 - low_weight)
        }
    };

    let default = match hint.hint_descriptor & HINT_DEFAULT_MASK {
        HINT_DEFAULT_MINIMUM => min,
        HINT_DEFAULT_LOW => interpolate(0.75),
        HINT_DEFAULT_MIDDLE => interpolate(0.5),
        HINT_DEFAULT_HIGH => interpolate(0.25),
        HINT_DEFAULT_MAXIMUM => max,
        HINT_DEFAULT_0 => 0.0,
        HINT_DEFAULT_1 => 1.0,
        HINT_DEFAULT_100 => 100.0,
        HINT_DEFAULT_440 => 440.0,
        _ => min,
    };

    PortRange { min, max, default }
}

fn lossy_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Adapter driving one legacy descriptor.
#[derive(Debug)]
pub struct LadspaAdapter {
    descriptor: *const LadspaDescriptor,
    handle: LadspaHandle,
    sample_rate: f64,
}

impl LadspaAdapter {
    /// # Safety
    ///
    /// `descriptor` must point to a valid descriptor that outlives the
    /// adapter (typically the plugin library stays open for that long).
    pub unsafe fn new(descriptor: *const LadspaDescriptor) -> Result<Self> {
        if descriptor.is_null() {
            return Err(HostError::Construction {
                reason: "null legacy descriptor".to_string(),
            });
        }
        Ok(Self {
            descriptor,
            handle: std::ptr::null_mut(),
            sample_rate: 0.0,
        })
    }

    fn descriptor(&self) -> &LadspaDescriptor {
        unsafe { &*self.descriptor }
    }
}

impl PluginAbi for LadspaAdapter {
    fn identity(&self) -> PluginIdentity {
        PluginIdentity::Numeric(self.descriptor().unique_id as u64)
    }

    fn name(&self) -> String {
        lossy_str(self.descriptor().name)
    }

    fn negotiates_features(&self) -> bool {
        false
    }

    fn native_ports(&self) -> Option<Vec<PortMeta>> {
        let descriptor = self.descriptor();
        let count = descriptor.port_count as usize;
        let mut ports = Vec::with_capacity(count);
        for i in 0..count {
            let flags = if descriptor.port_descriptors.is_null() {
                0
            } else {
                unsafe { *descriptor.port_descriptors.add(i) }
            };
            let name = if descriptor.port_names.is_null() {
                String::new()
            } else {
                lossy_str(unsafe { *descriptor.port_names.add(i) })
            };

            let mut meta = PortMeta::new(i as u32, name);
            if flags & PORT_AUDIO != 0 {
                meta.kind = PortKind::Audio;
            } else if flags & PORT_CONTROL != 0 {
                meta.kind = PortKind::Control;
            }
            if flags & PORT_INPUT != 0 {
                meta.direction = Some(PortDirection::Input);
            } else if flags & PORT_OUTPUT != 0 {
                meta.direction = Some(PortDirection::Output);
            }
            if meta.kind == PortKind::Control && !descriptor.port_range_hints.is_null() {
                let hint = unsafe { &*descriptor.port_range_hints.add(i) };
                meta.range = Some(range_from_hint(hint, self.sample_rate));
            }
            ports.push(meta);
        }
        Some(ports)
    }

    fn instantiate(&mut self, sample_rate: f64, _features: Option<&FeatureTable>) -> Result<()> {
        let descriptor = self.descriptor();
        let instantiate = descriptor
            .instantiate
            .ok_or_else(|| HostError::Construction {
                reason: "legacy descriptor has no instantiate entry point".to_string(),
            })?;
        self.sample_rate = sample_rate;
        self.handle = unsafe { instantiate(self.descriptor, sample_rate as c_ulong) };
        if self.handle.is_null() {
            return Err(HostError::Construction {
                reason: format!("plugin {} returned a null handle", self.identity()),
            });
        }
        Ok(())
    }

    unsafe fn connect_port(&mut self, index: u32, buffer: *mut c_void) {
        if let Some(connect) = self.descriptor().connect_port {
            connect(self.handle, index as c_ulong, buffer as *mut LadspaData);
        }
    }

    fn activate(&mut self) {
        if let Some(activate) = self.descriptor().activate {
            unsafe { activate(self.handle) };
        }
    }

    fn run(&mut self, frames: u32) {
        if let Some(run) = self.descriptor().run {
            unsafe { run(self.handle, frames as c_ulong) };
        }
    }

    fn deactivate(&mut self) {
        if let Some(deactivate) = self.descriptor().deactivate {
            unsafe { deactivate(self.handle) };
        }
    }

    fn extension_data(&self, _uri: &CStr) -> Option<*const c_void> {
        // The legacy ABI predates extension interfaces.
        None
    }

    fn handle(&self) -> *mut c_void {
        self.handle
    }
}

impl Drop for LadspaAdapter {
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
