//! Feature table builder
//!
//! Assembles the ordered, null-terminated capability list a plugin
//! receives at instantiation. The table is built before any port is
//! touched (some plugins use the capabilities inside their instantiate
//! call), is immutable once built, and every pointee it hands out lives as
//! long as the table — which the owning instance keeps alive for the
//! plugin's whole lifetime.

use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::atom::{ATOM_FLOAT_URI, ATOM_INT_URI};
use crate::lv2::{
    FeatureRecord, LogShim, OptionRecord, OptionsQueryShim, UridMapShim, UridUnmapShim,
    WorkerScheduleShim, LOG_URI, OPTIONS_INTERFACE_URI, OPTIONS_SUCCESS, OPTIONS_URI,
    URID_MAP_URI, URID_UNMAP_URI, WORKER_SCHEDULE_URI,
};
use crate::urid::{urid_map_trampoline, urid_unmap_trampoline, UridMapCtx, UridRegistry};
use crate::worker;

pub const BUFSZ_MIN_BLOCK_URI: &str = "http://lv2plug.in/ns/ext/buf-size#minBlockLength";
pub const BUFSZ_MAX_BLOCK_URI: &str = "http://lv2plug.in/ns/ext/buf-size#maxBlockLength";
pub const BUFSZ_NOMINAL_BLOCK_URI: &str = "http://lv2plug.in/ns/ext/buf-size#nominalBlockLength";
pub const BUFSZ_SEQUENCE_SIZE_URI: &str = "http://lv2plug.in/ns/ext/buf-size#sequenceSize";
pub const PARAM_SAMPLE_RATE_URI: &str = "http://lv2plug.in/ns/lv2core#sampleRate";

/// Session-level negotiation values handed to plugins through the options
/// capability. Fixed for the lifetime of an instance; there is no
/// renegotiation mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Nominal audio block length, in frames.
    pub block_length: usize,
    /// Maximum event-sequence buffer size, in bytes. Also the fallback
    /// capacity for event ports that declare no minimum.
    pub sequence_size: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            block_length: 512,
            sequence_size: 8192,
        }
    }
}

#[derive(Clone, Copy)]
struct OptionUrids {
    min_block: u32,
    max_block: u32,
    nominal_block: u32,
    sequence_size: u32,
    sample_rate: u32,
    atom_int: u32,
    atom_float: u32,
}

impl OptionUrids {
    fn register(registry: &UridRegistry) -> Self {
        Self {
            min_block: registry.map(BUFSZ_MIN_BLOCK_URI),
            max_block: registry.map(BUFSZ_MAX_BLOCK_URI),
            nominal_block: registry.map(BUFSZ_NOMINAL_BLOCK_URI),
            sequence_size: registry.map(BUFSZ_SEQUENCE_SIZE_URI),
            sample_rate: registry.map(PARAM_SAMPLE_RATE_URI),
            atom_int: registry.map(ATOM_INT_URI),
            atom_float: registry.map(ATOM_FLOAT_URI),
        }
    }
}

/// Negotiated values plus the identifiers naming them; pointed at by both
/// the option records and the options-query shim.
struct OptionsCtx {
    block_length: i32,
    sequence_size: i32,
    sample_rate: f32,
    urids: OptionUrids,
}

unsafe extern "C" fn options_get_trampoline(
    handle: *mut c_void,
    options: *mut OptionRecord,
) -> u32 {
    if handle.is_null() || options.is_null() {
        return OPTIONS_SUCCESS;
    }
    let ctx = &*(handle as *const OptionsCtx);
    let mut record = options;
    loop {
        let rec = &mut *record;
        if rec.key == 0 && rec.value.is_null() {
            break;
        }
        if rec.key == ctx.urids.min_block
            || rec.key == ctx.urids.max_block
            || rec.key == ctx.urids.nominal_block
        {
            rec.type_ = ctx.urids.atom_int;
            rec.size = std::mem::size_of::<i32>() as u32;
            rec.value = &ctx.block_length as *const i32 as *const c_void;
        } else if rec.key == ctx.urids.sequence_size {
            rec.type_ = ctx.urids.atom_int;
            rec.size = std::mem::size_of::<i32>() as u32;
            rec.value = &ctx.sequence_size as *const i32 as *const c_void;
        } else if rec.key == ctx.urids.sample_rate {
            rec.type_ = ctx.urids.atom_float;
            rec.size = std::mem::size_of::<f32>() as u32;
            rec.value = &ctx.sample_rate as *const f32 as *const c_void;
        } else {
            rec.type_ = 0;
            rec.size = 0;
            rec.value = std::ptr::null();
        }
        record = record.add(1);
    }
    OPTIONS_SUCCESS
}

unsafe extern "C" fn options_set_trampoline(
    handle: *mut c_void,
    options: *const OptionRecord,
) -> u32 {
    if handle.is_null() || options.is_null() {
        return OPTIONS_SUCCESS;
    }
    let mut record = options;
    loop {
        let rec = &*record;
        if rec.key == 0 && rec.value.is_null() {
            break;
        }
        // Values are fixed at instantiation; acknowledge and ignore.
        tracing::debug!(key = rec.key, "ignoring option renegotiation request");
        record = record.add(1);
    }
    OPTIONS_SUCCESS
}

unsafe extern "C" fn log_trampoline(
    _handle: *mut c_void,
    type_urid: u32,
    message: *const c_char,
) -> i32 {
    if message.is_null() {
        return 0;
    }
    let message = CStr::from_ptr(message).to_string_lossy();
    let message = message.trim_end();
    tracing::debug!(target: "stomp_host::plugin", urid = type_urid, "{message}");
    message.len() as i32
}

const FEATURE_COUNT: usize = 6;
const OPTION_COUNT: usize = 5;

/// The capability table: ordered records terminated by a null sentinel.
/// Everything the records point at is boxed here so the addresses never
/// move while the plugin holds them.
pub struct FeatureTable {
    _map_ctx: Box<UridMapCtx>,
    _map_shim: Box<UridMapShim>,
    _unmap_shim: Box<UridUnmapShim>,
    _log_shim: Box<LogShim>,
    _schedule_shim: Box<WorkerScheduleShim>,
    _options_ctx: Box<OptionsCtx>,
    _options_query: Box<OptionsQueryShim>,
    _option_records: Box<[OptionRecord; OPTION_COUNT + 1]>,
    _records: Box<[FeatureRecord; FEATURE_COUNT]>,
    pointers: Box<[*const FeatureRecord; FEATURE_COUNT + 1]>,
}

impl FeatureTable {
    pub fn build(
        registry: Arc<UridRegistry>,
        instance_id: u64,
        sample_rate: f64,
        config: &HostConfig,
    ) -> Self {
        let map_ctx = Box::new(UridMapCtx {
            registry: registry.clone(),
        });
        let ctx_ptr = &*map_ctx as *const UridMapCtx as *mut c_void;

        let map_shim = Box::new(UridMapShim {
            handle: ctx_ptr,
            map: Some(urid_map_trampoline),
        });
        let unmap_shim = Box::new(UridUnmapShim {
            handle: ctx_ptr,
            unmap: Some(urid_unmap_trampoline),
        });
        let log_shim = Box::new(LogShim {
            handle: std::ptr::null_mut(),
            log: Some(log_trampoline),
        });
        let schedule_shim = Box::new(WorkerScheduleShim {
            handle: instance_id as usize as *mut c_void,
            schedule_work: Some(worker::schedule_trampoline),
        });

        let options_ctx = Box::new(OptionsCtx {
            block_length: config.block_length as i32,
            sequence_size: config.sequence_size as i32,
            sample_rate: sample_rate as f32,
            urids: OptionUrids::register(&registry),
        });
        let options_query = Box::new(OptionsQueryShim {
            handle: &*options_ctx as *const OptionsCtx as *mut c_void,
            get: Some(options_get_trampoline),
            set: Some(options_set_trampoline),
        });

        let urids = options_ctx.urids;
        let int_size = std::mem::size_of::<i32>() as u32;
        let option = |key: u32, type_: u32, size: u32, value: *const c_void| OptionRecord {
            context: 0,
            subject: 0,
            key,
            size,
            type_,
            value,
        };
        let block_ptr = &options_ctx.block_length as *const i32 as *const c_void;
        let seq_ptr = &options_ctx.sequence_size as *const i32 as *const c_void;
        let rate_ptr = &options_ctx.sample_rate as *const f32 as *const c_void;
        let option_records = Box::new([
            option(urids.min_block, urids.atom_int, int_size, block_ptr),
            option(urids.max_block, urids.atom_int, int_size, block_ptr),
            option(urids.nominal_block, urids.atom_int, int_size, block_ptr),
            option(urids.sequence_size, urids.atom_int, int_size, seq_ptr),
            option(
                urids.sample_rate,
                urids.atom_float,
                std::mem::size_of::<f32>() as u32,
                rate_ptr,
            ),
            // Null sentinel.
            option(0, 0, 0, std::ptr::null()),
        ]);

        let feature = |uri: &'static CStr, data: *mut c_void| FeatureRecord {
            uri: uri.as_ptr(),
            data,
        };
        let records = Box::new([
            feature(URID_MAP_URI, &*map_shim as *const UridMapShim as *mut c_void),
            feature(
                URID_UNMAP_URI,
                &*unmap_shim as *const UridUnmapShim as *mut c_void,
            ),
            feature(LOG_URI, &*log_shim as *const LogShim as *mut c_void),
            feature(
                WORKER_SCHEDULE_URI,
                &*schedule_shim as *const WorkerScheduleShim as *mut c_void,
            ),
            feature(
                OPTIONS_URI,
                option_records.as_ptr() as *mut c_void,
            ),
            feature(
                OPTIONS_INTERFACE_URI,
                &*options_query as *const OptionsQueryShim as *mut c_void,
            ),
        ]);

        let pointers = Box::new([
            &records[0] as *const FeatureRecord,
            &records[1] as *const FeatureRecord,
            &records[2] as *const FeatureRecord,
            &records[3] as *const FeatureRecord,
            &records[4] as *const FeatureRecord,
            &records[5] as *const FeatureRecord,
            std::ptr::null(),
        ]);

        Self {
            _map_ctx: map_ctx,
            _map_shim: map_shim,
            _unmap_shim: unmap_shim,
            _log_shim: log_shim,
            _schedule_shim: schedule_shim,
            _options_ctx: options_ctx,
            _options_query: options_query,
            _option_records: option_records,
            _records: records,
            pointers,
        }
    }

    /// The null-terminated list, in the exact shape the instantiate entry
    /// point expects.
    pub fn as_ptr(&self) -> *const *const FeatureRecord {
        self.pointers.as_ptr()
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn walk(table: &FeatureTable) -> Vec<(String, *mut c_void)> {
        let mut out = Vec::new();
        let mut cursor = table.as_ptr();
        unsafe {
            while !(*cursor).is_null() {
                let record = &**cursor;
                let uri = CStr::from_ptr(record.uri).to_str().unwrap().to_string();
                out.push((uri, record.data));
                cursor = cursor.add(1);
            }
        }
        out
    }

    #[test]
    fn test_table_is_ordered_and_null_terminated() {
        let registry = UridRegistry::new();
        let table = FeatureTable::build(registry, 1, 48000.0, &HostConfig::default());

        let features = walk(&table);
        assert_eq!(features.len(), table.feature_count());
        assert_eq!(features[0].0, URID_MAP_URI.to_str().unwrap());
        assert_eq!(features[1].0, URID_UNMAP_URI.to_str().unwrap());
        assert_eq!(features[2].0, LOG_URI.to_str().unwrap());
        assert_eq!(features[3].0, WORKER_SCHEDULE_URI.to_str().unwrap());
        assert_eq!(features[4].0, OPTIONS_URI.to_str().unwrap());
        assert_eq!(features[5].0, OPTIONS_INTERFACE_URI.to_str().unwrap());
        assert!(features.iter().all(|(_, data)| !data.is_null()));
    }

    #[test]
    fn test_identifier_map_works_through_the_table() {
        let registry = UridRegistry::new();
        let table = FeatureTable::build(registry.clone(), 1, 48000.0, &HostConfig::default());

        let features = walk(&table);
        let map = features[0].1 as *const UridMapShim;
        let uri = CString::new("urn:feature:roundtrip").unwrap();
        let id = unsafe { ((*map).map.unwrap())((*map).handle, uri.as_ptr()) };
        assert!(id > 0);
        assert_eq!(registry.map("urn:feature:roundtrip"), id);
    }

    #[test]
    fn test_options_records_carry_fixed_values() {
        let registry = UridRegistry::new();
        let config = HostConfig {
            block_length: 256,
            sequence_size: 4096,
        };
        let table = FeatureTable::build(registry.clone(), 1, 44100.0, &config);

        let features = walk(&table);
        let records = features[4].1 as *const OptionRecord;
        let mut count = 0;
        let mut cursor = records;
        unsafe {
            while !((*cursor).key == 0 && (*cursor).value.is_null()) {
                count += 1;
                cursor = cursor.add(1);
            }
        }
        assert_eq!(count, OPTION_COUNT);

        let nominal_key = registry.map(BUFSZ_NOMINAL_BLOCK_URI);
        let nominal = unsafe {
            let mut cursor = records;
            loop {
                assert!(!(*cursor).value.is_null());
                if (*cursor).key == nominal_key {
                    break *((*cursor).value as *const i32);
                }
                cursor = cursor.add(1);
            }
        };
        assert_eq!(nominal, 256);
    }

    #[test]
    fn test_options_query_returns_negotiated_values() {
        let registry = UridRegistry::new();
        let config = HostConfig::default();
        let table = FeatureTable::build(registry.clone(), 1, 96000.0, &config);

        let features = walk(&table);
        let query = features[5].1 as *const OptionsQueryShim;

        let mut asked = [
            OptionRecord {
                context: 0,
                subject: 0,
                key: registry.map(BUFSZ_NOMINAL_BLOCK_URI),
                size: 0,
                type_: 0,
                value: std::ptr::null(),
            },
            OptionRecord {
                context: 0,
                subject: 0,
                key: registry.map(PARAM_SAMPLE_RATE_URI),
                size: 0,
                type_: 0,
                value: std::ptr::null(),
            },
            OptionRecord {
                context: 0,
                subject: 0,
                key: 0,
                size: 0,
                type_: 0,
                value: std::ptr::null(),
            },
        ];

        let status = unsafe { ((*query).get.unwrap())((*query).handle, asked.as_mut_ptr()) };
        assert_eq!(status, OPTIONS_SUCCESS);
        assert_eq!(unsafe { *(asked[0].value as *const i32) }, 512);
        assert_eq!(unsafe { *(asked[1].value as *const f32) }, 96000.0);
    }
}
