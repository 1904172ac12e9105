//! URI ⇄ integer interning registry
//!
//! Plugins and host agree on compact numeric identifiers for URI-named
//! concepts (port properties, atom types, option keys). Identifiers are
//! assigned on first sight, start at 1, and are never reassigned or removed
//! for the lifetime of the registry.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

use parking_lot::RwLock;

/// Interning table shared by reference across everything that needs
/// identifier translation for one hosting session. Zero is reserved as the
/// "no identifier" sentinel and is never handed out.
#[derive(Default)]
pub struct UridRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    by_uri: HashMap<String, u32>,
    // Index i holds the URI for identifier i + 1. CString heap storage is
    // stable, so `unmap_ptr` results stay valid for the registry's lifetime.
    by_id: Vec<CString>,
}

impl UridRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Look up `uri`, assigning the next identifier if it has not been seen.
    /// Returns 0 only for URIs that cannot be represented (interior NUL).
    pub fn map(&self, uri: &str) -> u32 {
        if let Some(&id) = self.inner.read().by_uri.get(uri) {
            return id;
        }

        let mut inner = self.inner.write();
        // Another mapper may have raced us between the locks.
        if let Some(&id) = inner.by_uri.get(uri) {
            return id;
        }

        let Ok(cstr) = CString::new(uri) else {
            tracing::warn!("refusing to intern URI with interior NUL: {uri:?}");
            return 0;
        };

        inner.by_id.push(cstr);
        let id = inner.by_id.len() as u32;
        inner.by_uri.insert(uri.to_string(), id);
        id
    }

    /// Reverse lookup. Returns `None` for 0 and for identifiers that were
    /// never assigned.
    pub fn unmap(&self, urid: u32) -> Option<String> {
        let inner = self.inner.read();
        inner
            .by_id
            .get(urid.checked_sub(1)? as usize)
            .and_then(|c| c.to_str().ok())
            .map(str::to_string)
    }

    /// Reverse lookup as a NUL-terminated pointer for the native call
    /// surface. The pointee lives as long as the registry does.
    pub(crate) fn unmap_ptr(&self, urid: u32) -> *const c_char {
        let inner = self.inner.read();
        match urid
            .checked_sub(1)
            .and_then(|i| inner.by_id.get(i as usize))
        {
            Some(cstr) => cstr.as_ptr(),
            None => std::ptr::null(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trampoline context handed to plugins through the identifier-map feature.
/// Boxed by the feature table so the pointer stays put for the plugin's
/// lifetime.
pub(crate) struct UridMapCtx {
    pub(crate) registry: Arc<UridRegistry>,
}

pub(crate) unsafe extern "C" fn urid_map_trampoline(
    handle: *mut c_void,
    uri: *const c_char,
) -> u32 {
    if handle.is_null() || uri.is_null() {
        return 0;
    }
    let ctx = &*(handle as *const UridMapCtx);
    match CStr::from_ptr(uri).to_str() {
        Ok(uri) => ctx.registry.map(uri),
        Err(_) => 0,
    }
}

pub(crate) unsafe extern "C" fn urid_unmap_trampoline(
    handle: *mut c_void,
    urid: u32,
) -> *const c_char {
    if handle.is_null() {
        return std::ptr::null();
    }
    let ctx = &*(handle as *const UridMapCtx);
    ctx.registry.unmap_ptr(urid)
}
