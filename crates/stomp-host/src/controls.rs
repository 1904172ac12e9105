//! Control parameters
//!
//! Control-rate parameters discovered during classification. Each one owns
//! a heap value cell the plugin reads (and, for meters, writes) directly
//! through the connected pointer.

use crate::classify::PortRange;

pub struct ControlParameter {
    /// Owning port index, as the plugin declared it.
    pub index: u32,
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    /// Non-zero only when the parameter is also addressable through the
    /// event channel.
    pub urid: u32,
    // Boxed so the address handed to the plugin survives registry growth.
    value: Box<f32>,
}

impl ControlParameter {
    pub fn new(index: u32, name: impl Into<String>, range: PortRange) -> Self {
        Self {
            index,
            name: name.into(),
            min: range.min,
            max: range.max,
            default: range.default,
            urid: 0,
            value: Box::new(range.default),
        }
    }

    pub fn with_urid(mut self, urid: u32) -> Self {
        self.urid = urid;
        self
    }

    pub fn value(&self) -> f32 {
        *self.value
    }

    pub fn set_value(&mut self, value: f32) {
        *self.value = value;
    }

    /// Set, clamped to the declared range. Ranges from broken metadata may
    /// be inverted; those are applied unclamped.
    pub fn set_value_clamped(&mut self, value: f32) {
        *self.value = if self.min <= self.max {
            value.clamp(self.min, self.max)
        } else {
            value
        };
    }

    pub(crate) fn value_ptr(&mut self) -> *mut f32 {
        &mut *self.value
    }
}

/// The set of control parameters of one plugin instance, in discovery
/// order.
#[derive(Default)]
pub struct ControlRegistry {
    params: Vec<ControlParameter>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter, returning its position in the registry.
    pub fn push(&mut self, param: ControlParameter) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ControlParameter> {
        self.params.get(position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut ControlParameter> {
        self.params.get_mut(position)
    }

    /// Look up by the plugin's own port index.
    pub fn by_port(&self, index: u32) -> Option<&ControlParameter> {
        self.params.iter().find(|p| p.index == index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlParameter> {
        self.params.iter()
    }
}
