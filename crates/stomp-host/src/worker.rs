//! Deferred work link
//!
//! Connects a plugin's request for off-audio-thread computation to the
//! host and back. The schedule callback carries only an instance id, never
//! a pointer to the owning instance, so a stale callback after release
//! degrades to a logged error instead of a dangling dereference.
//!
//! The work itself is performed synchronously in the scheduling context;
//! responses are queued through a single-producer/single-consumer channel
//! and delivered on the audio thread at the next block boundary, so the
//! deliver-result entry point is never invoked concurrently with an
//! in-flight `run`.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::lv2::{
    Lv2Handle, WorkerInterface, WORKER_ERR_NO_SPACE, WORKER_ERR_UNKNOWN, WORKER_SUCCESS,
};

const RESPONSE_QUEUE_DEPTH: usize = 32;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Plugin-side entry points, captured once the worker extension is
/// discovered.
#[derive(Clone, Copy)]
struct EntryPoints {
    iface: *const WorkerInterface,
    handle: Lv2Handle,
}

// Raw plugin pointers cross thread boundaries only through the slot, and
// every call through them is serialized by the scheduling context or the
// audio thread.
unsafe impl Send for EntryPoints {}
unsafe impl Sync for EntryPoints {}

pub(crate) struct WorkerSlot {
    entry: Mutex<Option<EntryPoints>>,
    responses_tx: Sender<Vec<u8>>,
    responses_rx: Receiver<Vec<u8>>,
}

impl WorkerSlot {
    fn new() -> Self {
        let (responses_tx, responses_rx) = bounded(RESPONSE_QUEUE_DEPTH);
        Self {
            entry: Mutex::new(None),
            responses_tx,
            responses_rx,
        }
    }

    pub(crate) fn connect(&self, iface: *const WorkerInterface, handle: Lv2Handle) {
        *self.entry.lock() = Some(EntryPoints { iface, handle });
    }

    fn entry(&self) -> Option<EntryPoints> {
        *self.entry.lock()
    }

    /// Perform the plugin's work synchronously; any responses it posts are
    /// queued for the next block boundary.
    fn schedule(&self, size: u32, data: *const c_void) -> i32 {
        let Some(entry) = self.entry() else {
            tracing::warn!("deferred work scheduled before the worker interface was discovered");
            return WORKER_ERR_UNKNOWN;
        };
        let iface = unsafe { &*entry.iface };
        let Some(work) = iface.work else {
            return WORKER_ERR_UNKNOWN;
        };

        let status = unsafe {
            work(
                entry.handle,
                Some(collect_response_trampoline),
                self as *const WorkerSlot as *mut c_void,
                size,
                data,
            )
        };
        if status != WORKER_SUCCESS {
            tracing::warn!(status, "plugin worker reported failure");
        }
        status
    }

    fn push_response(&self, payload: Vec<u8>) -> i32 {
        match self.responses_tx.try_send(payload) {
            Ok(()) => WORKER_SUCCESS,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("worker response queue full, dropping response");
                WORKER_ERR_NO_SPACE
            }
            Err(TrySendError::Disconnected(_)) => WORKER_ERR_UNKNOWN,
        }
    }

    /// Drain queued responses into the plugin. Audio thread only, between
    /// blocks.
    pub(crate) fn deliver(&self) {
        let Some(entry) = self.entry() else {
            while self.responses_rx.try_recv().is_ok() {}
            return;
        };
        let iface = unsafe { &*entry.iface };

        let mut delivered = false;
        while let Ok(payload) = self.responses_rx.try_recv() {
            delivered = true;
            if let Some(respond) = iface.work_response {
                let status = unsafe {
                    respond(
                        entry.handle,
                        payload.len() as u32,
                        payload.as_ptr() as *const c_void,
                    )
                };
                if status != WORKER_SUCCESS {
                    tracing::warn!(status, "plugin rejected a work response");
                }
            }
        }
        if delivered {
            if let Some(end_run) = iface.end_run {
                unsafe { end_run(entry.handle) };
            }
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.responses_rx.len()
    }
}

/// Non-owning link registry, keyed by instance id.
static LINKS: Lazy<RwLock<HashMap<u64, Arc<WorkerSlot>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub(crate) fn register(id: u64) -> Arc<WorkerSlot> {
    let slot = Arc::new(WorkerSlot::new());
    LINKS.write().insert(id, slot.clone());
    slot
}

pub(crate) fn unregister(id: u64) {
    LINKS.write().remove(&id);
}

fn lookup(id: u64) -> Option<Arc<WorkerSlot>> {
    LINKS.read().get(&id).cloned()
}

/// Schedule entry point handed to plugins through the deferred-work
/// feature. The handle encodes the owning instance id.
pub(crate) unsafe extern "C" fn schedule_trampoline(
    handle: *mut c_void,
    size: u32,
    data: *const c_void,
) -> i32 {
    let id = handle as usize as u64;
    match lookup(id) {
        Some(slot) => slot.schedule(size, data),
        None => {
            tracing::warn!(instance = id, "deferred work scheduled for unknown instance");
            WORKER_ERR_UNKNOWN
        }
    }
}

unsafe extern "C" fn collect_response_trampoline(
    handle: *mut c_void,
    size: u32,
    data: *const c_void,
) -> i32 {
    if handle.is_null() {
        return WORKER_ERR_UNKNOWN;
    }
    let slot = &*(handle as *const WorkerSlot);
    let payload = if data.is_null() || size == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(data as *const u8, size as usize).to_vec()
    };
    slot.push_response(payload)
}
