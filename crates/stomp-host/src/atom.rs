//! Event/atom channels
//!
//! Fixed-capacity message-sequence buffers carrying short, infrequent
//! structured messages (file-path assignments, acknowledgements) between
//! host and plugin, distinct from the per-sample audio path and the
//! per-block control values.

use std::ffi::c_void;
use std::mem;

use crate::error::{HostError, Result};
use crate::urid::UridRegistry;

pub const ATOM_SEQUENCE_URI: &str = "http://lv2plug.in/ns/ext/atom#Sequence";
pub const ATOM_PATH_URI: &str = "http://lv2plug.in/ns/ext/atom#Path";
pub const ATOM_STRING_URI: &str = "http://lv2plug.in/ns/ext/atom#String";
pub const ATOM_URID_URI: &str = "http://lv2plug.in/ns/ext/atom#URID";
pub const ATOM_OBJECT_URI: &str = "http://lv2plug.in/ns/ext/atom#Object";
pub const ATOM_INT_URI: &str = "http://lv2plug.in/ns/ext/atom#Int";
pub const ATOM_FLOAT_URI: &str = "http://lv2plug.in/ns/ext/atom#Float";
pub const ATOM_EVENT_TRANSFER_URI: &str = "http://lv2plug.in/ns/ext/atom#eventTransfer";
pub const PATCH_SET_URI: &str = "http://lv2plug.in/ns/ext/patch#Set";
pub const PATCH_PROPERTY_URI: &str = "http://lv2plug.in/ns/ext/patch#property";
pub const PATCH_VALUE_URI: &str = "http://lv2plug.in/ns/ext/patch#value";

/// Common header of every atom: payload size in bytes plus a mapped type.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct AtomHeader {
    pub size: u32,
    pub type_: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct SequenceBody {
    pub unit: u32,
    pub pad: u32,
}

/// Sequence container header: the first bytes of every channel buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct SequenceHeader {
    pub atom: AtomHeader,
    pub body: SequenceBody,
}

/// Header of one event inside a sequence: a frame timestamp plus the
/// event's atom header.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EventHeader {
    pub frames: i64,
    pub body: AtomHeader,
}

/// Body prefix of a property-set message: which logical parameter is being
/// set, and the type of the value bytes that follow.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PropertyHeader {
    pub property: u32,
    pub value_type: u32,
}

/// Identifiers every channel needs for encoding and recognizing messages,
/// mapped once per instance through the shared registry.
#[derive(Clone, Copy, Debug)]
pub struct AtomUrids {
    pub sequence: u32,
    pub path: u32,
    pub string: u32,
    pub urid: u32,
    pub object: u32,
    pub int: u32,
    pub float: u32,
    pub event_transfer: u32,
    pub patch_set: u32,
    pub patch_property: u32,
    pub patch_value: u32,
}

impl AtomUrids {
    pub fn register(registry: &UridRegistry) -> Self {
        Self {
            sequence: registry.map(ATOM_SEQUENCE_URI),
            path: registry.map(ATOM_PATH_URI),
            string: registry.map(ATOM_STRING_URI),
            urid: registry.map(ATOM_URID_URI),
            object: registry.map(ATOM_OBJECT_URI),
            int: registry.map(ATOM_INT_URI),
            float: registry.map(ATOM_FLOAT_URI),
            event_transfer: registry.map(ATOM_EVENT_TRANSFER_URI),
            patch_set: registry.map(PATCH_SET_URI),
            patch_property: registry.map(PATCH_PROPERTY_URI),
            patch_value: registry.map(PATCH_VALUE_URI),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelRole {
    /// Host → plugin.
    Request,
    /// Plugin → host.
    Notify,
}

/// One fixed-capacity sequence buffer. Allocated capacity never changes
/// after creation; writes that would not fit are rejected outright.
pub struct EventChannel {
    // u64 backing keeps the buffer 8-byte aligned for the plugin's
    // sequence walk.
    storage: Box<[u64]>,
    capacity: usize,
    role: ChannelRole,
    urids: AtomUrids,
}

impl EventChannel {
    /// Size of the sequence body alone — the logical size of a channel
    /// holding zero events.
    pub const fn empty_body_size() -> usize {
        mem::size_of::<SequenceBody>()
    }

    /// The load-bearing capacity formula: declared minimum plus the
    /// sequence container header, one event header, and one byte of
    /// padding. Under-allocating makes the native append silently fail or
    /// corrupt memory.
    pub const fn required_capacity(minimum_size: u32) -> usize {
        minimum_size as usize + mem::size_of::<SequenceHeader>() + mem::size_of::<EventHeader>() + 1
    }

    pub fn new(minimum_size: u32, role: ChannelRole, urids: AtomUrids) -> Self {
        let capacity = Self::required_capacity(minimum_size);
        let words = capacity.div_ceil(mem::size_of::<u64>());
        let mut channel = Self {
            storage: vec![0u64; words].into_boxed_slice(),
            capacity,
            role,
            urids,
        };
        channel.write_sequence_header(Self::empty_body_size());
        channel
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn urids(&self) -> &AtomUrids {
        &self.urids
    }

    /// Raw buffer start, handed to the plugin as the port buffer.
    pub fn as_raw(&mut self) -> *mut c_void {
        self.storage.as_mut_ptr() as *mut c_void
    }

    fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.storage.as_ptr() as *const u8, self.capacity) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.storage.as_mut_ptr() as *mut u8, self.capacity)
        }
    }

    fn write_sequence_header(&mut self, body_size: usize) {
        let header = SequenceHeader {
            atom: AtomHeader {
                size: body_size as u32,
                type_: self.urids.sequence,
            },
            body: SequenceBody { unit: 0, pad: 0 },
        };
        unsafe {
            (self.storage.as_mut_ptr() as *mut SequenceHeader).write(header);
        }
    }

    fn sequence_header(&self) -> SequenceHeader {
        unsafe { (self.storage.as_ptr() as *const SequenceHeader).read() }
    }

    /// Current size of the sequence body in bytes, as the plugin sees it.
    pub fn logical_size(&self) -> usize {
        self.sequence_header().atom.size as usize
    }

    /// Discard all content: size back to "header only, zero events".
    pub fn reset(&mut self) {
        self.write_sequence_header(Self::empty_body_size());
    }

    /// Write a single event, replacing whatever the channel held before.
    /// Fails closed when the event would exceed the allocated capacity.
    pub fn write_event(&mut self, type_urid: u32, body: &[u8]) -> Result<()> {
        let needed =
            mem::size_of::<SequenceHeader>() + mem::size_of::<EventHeader>() + body.len();
        if needed > self.capacity {
            tracing::warn!(
                needed,
                capacity = self.capacity,
                "event channel write rejected"
            );
            return Err(HostError::ChannelFull {
                needed,
                capacity: self.capacity,
            });
        }

        let event = EventHeader {
            frames: 0,
            body: AtomHeader {
                size: body.len() as u32,
                type_: type_urid,
            },
        };
        let offset = mem::size_of::<SequenceHeader>();
        unsafe {
            (self.bytes_mut()[offset..].as_mut_ptr() as *mut EventHeader).write_unaligned(event);
        }
        let payload_at = offset + mem::size_of::<EventHeader>();
        self.bytes_mut()[payload_at..payload_at + body.len()].copy_from_slice(body);

        let body_size =
            Self::empty_body_size() + mem::size_of::<EventHeader>() + body.len();
        self.write_sequence_header(body_size);
        Ok(())
    }

    /// Encode a property-set message: one event typed as a patch set whose
    /// key is the parameter's identifier and whose value is a textual
    /// payload (a file path or string), NUL-terminated.
    pub fn write_property(&mut self, key_urid: u32, text: &str) -> Result<()> {
        let header = PropertyHeader {
            property: key_urid,
            value_type: self.urids.path,
        };
        let mut body = Vec::with_capacity(mem::size_of::<PropertyHeader>() + text.len() + 1);
        body.extend_from_slice(&header.property.to_ne_bytes());
        body.extend_from_slice(&header.value_type.to_ne_bytes());
        body.extend_from_slice(text.as_bytes());
        body.push(0);
        self.write_event(self.urids.patch_set, &body)
    }

    /// Iterate over the events currently in the channel.
    pub fn events(&self) -> EventIter<'_> {
        let start = mem::size_of::<SequenceHeader>();
        let body = self.logical_size().saturating_sub(Self::empty_body_size());
        EventIter {
            bytes: self.bytes(),
            offset: start,
            end: (start + body).min(self.capacity),
        }
    }

    /// Whether the plugin has posted the file-accepted marker. Advisory:
    /// absence only means "not yet handled".
    pub fn has_accepted_marker(&self) -> bool {
        self.events()
            .any(|event| event.type_ == self.urids.patch_set || event.type_ == self.urids.path)
    }
}

/// One decoded event: timestamp, type identifier, raw body bytes.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub frames: i64,
    pub type_: u32,
    pub body: &'a [u8],
}

pub struct EventIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    end: usize,
}

fn pad8(size: usize) -> usize {
    (size + 7) & !7
}

impl<'a> Iterator for EventIter<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + mem::size_of::<EventHeader>() > self.end {
            return None;
        }
        let header = unsafe {
            (self.bytes[self.offset..].as_ptr() as *const EventHeader).read_unaligned()
        };
        let body_at = self.offset + mem::size_of::<EventHeader>();
        let body_end = body_at.checked_add(header.body.size as usize)?;
        if body_end > self.bytes.len() {
            return None;
        }
        // Plugins append padded events; a lone host-written event may be
        // unpadded, which the bounds check above still walks correctly.
        self.offset = body_at + pad8(header.body.size as usize);
        Some(Event {
            frames: header.frames,
            type_: header.body.type_,
            body: &self.bytes[body_at..body_end],
        })
    }
}
