//! Port metadata and role classification
//!
//! A port's role decides what gets wired to it: an audio slot, a control
//! value cell, an event channel, or an inert sink. Classification never
//! fails an instantiation — a port we cannot understand degrades to the
//! sink so the rest of the plugin still runs.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

/// How a plugin identifies itself across sessions: legacy plugins carry a
/// numeric unique id, the other variants a URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PluginIdentity {
    Numeric(u64),
    Uri(String),
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginIdentity::Numeric(id) => write!(f, "#{id}"),
            PluginIdentity::Uri(uri) => write!(f, "{uri}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Audio,
    Control,
    Event,
    Unknown,
}

/// Declared value range of a control port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            default: 0.0,
        }
    }
}

/// One declared port, merged from whatever metadata sources the descriptor
/// variant offers (native struct walk, introspected inventory, JSON sidecar).
#[derive(Debug, Clone)]
pub struct PortMeta {
    /// Stable index assigned by the plugin; never reassigned by the host.
    pub index: u32,
    pub name: String,
    pub kind: PortKind,
    pub direction: Option<PortDirection>,
    pub range: Option<PortRange>,
    /// Declared minimum capacity for event-typed ports.
    pub minimum_size: Option<u32>,
}

impl PortMeta {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            kind: PortKind::Unknown,
            direction: None,
            range: None,
            minimum_size: None,
        }
    }

    pub fn kind(mut self, kind: PortKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn direction(mut self, direction: PortDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn range(mut self, min: f32, max: f32, default: f32) -> Self {
        self.range = Some(PortRange { min, max, default });
        self
    }

    pub fn minimum_size(mut self, size: u32) -> Self {
        self.minimum_size = Some(size);
        self
    }
}

/// Natively introspected plugin metadata, as a discovery library reports
/// it. The second metadata source next to the JSON sidecar.
#[derive(Debug, Clone, Default)]
pub struct PortInventory {
    pub plugin_uri: String,
    pub plugin_name: String,
    /// URI prefix scoping event-addressable parameter names.
    pub prefix: Option<String>,
    pub ports: Vec<PortMeta>,
}

/// The single role assignment classification produces for each port.
#[derive(Debug, Clone, PartialEq)]
pub enum PortRole {
    AudioInput,
    AudioOutput,
    ControlInput(PortRange),
    /// Monitor/meter port; bound to a sink cell the host writes but never
    /// reads, because leaving it unbound makes activation undefined.
    ControlOutput,
    EventInput { minimum_size: Option<u32> },
    EventOutput,
    /// Bound to a sink cell and left functionally inert.
    Unrecognized,
}

/// Role a quirk entry forces onto a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedRole {
    AudioInput,
    AudioOutput,
    ControlInput,
    ControlOutput,
}

/// One entry of the per-plugin override table: a port a known plugin
/// misdeclares, with the role (and, for controls, the range) it actually has.
#[derive(Debug, Clone)]
pub struct PortOverride {
    pub port: u32,
    pub role: ForcedRole,
    pub min: Option<f32>,
    pub max: Option<f32>,
}

/// Plugins that ship broken port declarations. New vendor quirks are
/// additive entries here, not new classifier branches.
static OVERRIDES: Lazy<HashMap<PluginIdentity, Vec<PortOverride>>> = Lazy::new(|| {
    let mut table = HashMap::new();
    // Legacy plugin 2606 declares four ports with no type flags at all:
    // 2/3 are really the audio pair, 0/1 are controls.
    table.insert(
        PluginIdentity::Numeric(2606),
        vec![
            PortOverride {
                port: 0,
                role: ForcedRole::ControlInput,
                min: Some(0.0),
                max: Some(25.0),
            },
            PortOverride {
                port: 1,
                role: ForcedRole::ControlInput,
                min: Some(-24.0),
                max: Some(24.0),
            },
            PortOverride {
                port: 2,
                role: ForcedRole::AudioInput,
                min: None,
                max: None,
            },
            PortOverride {
                port: 3,
                role: ForcedRole::AudioOutput,
                min: None,
                max: None,
            },
        ],
    );
    table
});

pub fn overrides_for(identity: &PluginIdentity) -> Option<&'static [PortOverride]> {
    OVERRIDES.get(identity).map(Vec::as_slice)
}

/// Assign exactly one role to `meta`. Overrides win over declared flags so
/// a quirk entry corrects a port even when the declaration is merely wrong
/// rather than absent.
pub fn classify_port(meta: &PortMeta, overrides: Option<&[PortOverride]>) -> PortRole {
    if let Some(forced) = overrides.and_then(|o| o.iter().find(|o| o.port == meta.index)) {
        return apply_override(meta, forced);
    }

    match (meta.kind, meta.direction) {
        (PortKind::Audio, Some(PortDirection::Input)) => PortRole::AudioInput,
        (PortKind::Audio, Some(PortDirection::Output)) => PortRole::AudioOutput,
        (PortKind::Control, Some(PortDirection::Input)) => {
            PortRole::ControlInput(meta.range.unwrap_or_default())
        }
        (PortKind::Control, Some(PortDirection::Output)) => PortRole::ControlOutput,
        (PortKind::Event, Some(PortDirection::Input)) => PortRole::EventInput {
            minimum_size: meta.minimum_size,
        },
        (PortKind::Event, Some(PortDirection::Output)) => PortRole::EventOutput,
        _ => PortRole::Unrecognized,
    }
}

fn apply_override(meta: &PortMeta, forced: &PortOverride) -> PortRole {
    match forced.role {
        ForcedRole::AudioInput => PortRole::AudioInput,
        ForcedRole::AudioOutput => PortRole::AudioOutput,
        ForcedRole::ControlInput => {
            let declared = meta.range.unwrap_or_default();
            let min = forced.min.unwrap_or(declared.min);
            let max = forced.max.unwrap_or(declared.max);
            let default = if min <= max {
                declared.default.clamp(min, max)
            } else {
                declared.default
            };
            PortRole::ControlInput(PortRange { min, max, default })
        }
        ForcedRole::ControlOutput => PortRole::ControlOutput,
    }
}
