//! Plugin instance and lifecycle controller
//!
//! One instantiated plugin, presented uniformly regardless of which native
//! ABI it was built against: classified ports, bound buffers, a control
//! registry, optional event channels, and a run-once-per-audio-block
//! processing contract. The controller enforces the state ordering
//! `Unbound → PortsBound → Activated → (run…) → Deactivated → released`;
//! binding happens before activation because at least one known plugin
//! reads connected port values inside its activate call.

use std::ffi::c_void;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::abi::PluginAbi;
use crate::atom::{AtomUrids, ChannelRole, EventChannel};
use crate::classify::{
    classify_port, overrides_for, PluginIdentity, PortInventory, PortMeta, PortRange, PortRole,
};
use crate::controls::{ControlParameter, ControlRegistry};
use crate::error::{HostError, Result};
use crate::features::{FeatureTable, HostConfig};
use crate::ladspa::{LadspaAdapter, LadspaDescriptor};
use crate::lv2::{
    DiscoveredAdapter, Lv2Adapter, Lv2Descriptor, StateInterface, WorkerInterface,
    STATE_INTERFACE_URI, WORKER_INTERFACE_URI,
};
use crate::sidecar::{merge_ports, parse_sidecar, SidecarDoc};
use crate::urid::UridRegistry;
use crate::worker::{self, WorkerSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unbound,
    PortsBound,
    Activated,
    Deactivated,
}

impl Lifecycle {
    fn name(self) -> &'static str {
        match self {
            Lifecycle::Unbound => "Unbound",
            Lifecycle::PortsBound => "PortsBound",
            Lifecycle::Activated => "Activated",
            Lifecycle::Deactivated => "Deactivated",
        }
    }
}

struct AudioSlot {
    port: u32,
    buffer: Box<[f32]>,
}

/// One instantiated plugin. Owns its descriptor adapter, every buffer the
/// plugin is connected to, and the feature table the plugin references for
/// its whole lifetime. Released (deactivated, quiesced, cleaned up) on
/// drop.
pub struct PluginInstance {
    abi: Box<dyn PluginAbi>,
    id: u64,
    identity: PluginIdentity,
    name: String,
    sample_rate: f64,
    config: HostConfig,
    urid: Arc<UridRegistry>,
    lifecycle: Lifecycle,
    ports: Vec<PortMeta>,
    prefix: Option<String>,
    audio_inputs: SmallVec<[AudioSlot; 2]>,
    audio_outputs: SmallVec<[AudioSlot; 2]>,
    controls: ControlRegistry,
    // One sink cell per monitor/unrecognized port. Separate cells, so a
    // meter read-back never aliases another port's writes.
    sinks: Vec<Box<f32>>,
    request: Option<EventChannel>,
    notify: Option<EventChannel>,
    // Referenced, not copied, by the plugin; must outlive the handle.
    _features: Option<FeatureTable>,
    worker: Option<Arc<WorkerSlot>>,
    state_iface: Option<*const StateInterface>,
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("sample_rate", &self.sample_rate)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

// Binding and processing are single-writer operations: exactly one caller
// drives this instance, and worker responses cross back only through the
// block-boundary handoff. Never Sync.
unsafe impl Send for PluginInstance {}

impl PluginInstance {
    /// Instantiate a legacy plugin. Port metadata comes from the native
    /// descriptor walk; no feature table is involved.
    ///
    /// # Safety
    ///
    /// `descriptor` must be valid and must outlive the instance (keep the
    /// owning [`crate::PluginLibrary`] open).
    pub unsafe fn legacy(
        descriptor: *const LadspaDescriptor,
        sample_rate: f64,
        urid: Arc<UridRegistry>,
        config: HostConfig,
    ) -> Result<Self> {
        let adapter = LadspaAdapter::new(descriptor)?;
        Self::build(Box::new(adapter), None, sample_rate, urid, config)
    }

    /// Instantiate a sidecar-described plugin.
    ///
    /// # Safety
    ///
    /// Same descriptor-lifetime contract as [`PluginInstance::legacy`].
    pub unsafe fn native(
        descriptor: *const Lv2Descriptor,
        bundle_path: &str,
        sidecar_json: &str,
        sample_rate: f64,
        urid: Arc<UridRegistry>,
        config: HostConfig,
    ) -> Result<Self> {
        let adapter = Lv2Adapter::new(descriptor, bundle_path)?;
        let doc = parse_sidecar(&adapter.name(), sidecar_json)?;
        Self::build(Box::new(adapter), Some(doc), sample_rate, urid, config)
    }

    /// Instantiate a plugin found through a discovery library. Port
    /// metadata comes from the introspected inventory; a sidecar, when
    /// also present, fills in details and is validated against it.
    ///
    /// # Safety
    ///
    /// Same descriptor-lifetime contract as [`PluginInstance::legacy`].
    pub unsafe fn discovered(
        descriptor: *const Lv2Descriptor,
        bundle_path: &str,
        inventory: PortInventory,
        sidecar_json: Option<&str>,
        sample_rate: f64,
        urid: Arc<UridRegistry>,
        config: HostConfig,
    ) -> Result<Self> {
        let adapter = DiscoveredAdapter::new(descriptor, bundle_path, inventory)?;
        let doc = sidecar_json
            .map(|json| parse_sidecar(&adapter.name(), json))
            .transpose()?;
        Self::build(Box::new(adapter), doc, sample_rate, urid, config)
    }

    fn build(
        mut abi: Box<dyn PluginAbi>,
        sidecar: Option<SidecarDoc>,
        sample_rate: f64,
        urid: Arc<UridRegistry>,
        config: HostConfig,
    ) -> Result<Self> {
        if sample_rate <= 0.0 {
            return Err(HostError::Construction {
                reason: format!("non-positive sample rate {sample_rate}"),
            });
        }

        let id = worker::next_instance_id();

        // Features first: the instantiate call is itself where some plugins
        // use them.
        let features = abi
            .negotiates_features()
            .then(|| FeatureTable::build(urid.clone(), id, sample_rate, &config));
        abi.instantiate(sample_rate, features.as_ref())?;

        let ports = merge_ports(abi.native_ports(), sidecar.as_ref())?;
        let identity = abi.identity();
        let name = sidecar
            .as_ref()
            .map(|doc| doc.plugin_name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| abi.name());
        let prefix = sidecar
            .as_ref()
            .and_then(|doc| doc.prefix.clone())
            .or_else(|| abi.uri_prefix());

        let mut instance = Self {
            abi,
            id,
            identity,
            name,
            sample_rate,
            config,
            urid,
            lifecycle: Lifecycle::Unbound,
            ports,
            prefix,
            audio_inputs: SmallVec::new(),
            audio_outputs: SmallVec::new(),
            controls: ControlRegistry::new(),
            sinks: Vec::new(),
            request: None,
            notify: None,
            _features: features,
            worker: None,
            state_iface: None,
        };

        instance.bind_ports();
        instance.connect_extensions();
        Ok(instance)
    }

    /// Classify every declared port, in index order, and wire its buffer.
    fn bind_ports(&mut self) {
        let overrides = overrides_for(&self.identity);
        let ports = self.ports.clone();
        for meta in &ports {
            match classify_port(meta, overrides) {
                PortRole::AudioInput => self.bind_audio(meta, true),
                PortRole::AudioOutput => self.bind_audio(meta, false),
                PortRole::ControlInput(range) => self.bind_control(meta, range),
                PortRole::ControlOutput => {
                    tracing::debug!("[{} {}]: monitor port {}", self.name, meta.index, meta.name);
                    self.bind_sink(meta.index);
                }
                PortRole::EventInput { minimum_size } => self.bind_event_input(meta, minimum_size),
                PortRole::EventOutput => self.bind_event_output(meta),
                PortRole::Unrecognized => {
                    tracing::warn!(
                        "[{} {}]: cannot understand port {} of {}",
                        self.name,
                        meta.index,
                        meta.name,
                        self.identity
                    );
                    self.bind_sink(meta.index);
                }
            }
        }
        self.lifecycle = Lifecycle::PortsBound;
    }

    fn bind_audio(&mut self, meta: &PortMeta, input: bool) {
        let slots = if input {
            &mut self.audio_inputs
        } else {
            &mut self.audio_outputs
        };
        if slots.len() >= 2 {
            // Only two slots are ever tracked per direction; extras stay
            // unbound.
            tracing::error!(
                "[{} {}]: {} is third audio {} port",
                self.name,
                meta.index,
                meta.name,
                if input { "input" } else { "output" }
            );
            return;
        }

        let mut slot = AudioSlot {
            port: meta.index,
            buffer: vec![0.0f32; self.config.block_length].into_boxed_slice(),
        };
        let buffer = slot.buffer.as_mut_ptr();
        slots.push(slot);
        unsafe { self.abi.connect_port(meta.index, buffer as *mut c_void) };
    }

    fn bind_control(&mut self, meta: &PortMeta, range: PortRange) {
        let position = self
            .controls
            .push(ControlParameter::new(meta.index, meta.name.clone(), range));
        let buffer = match self.controls.get_mut(position) {
            Some(param) => param.value_ptr(),
            None => return,
        };
        unsafe { self.abi.connect_port(meta.index, buffer as *mut c_void) };
    }

    fn bind_sink(&mut self, index: u32) {
        self.sinks.push(Box::new(0.0f32));
        let buffer = match self.sinks.last_mut() {
            Some(cell) => &mut **cell as *mut f32,
            None => return,
        };
        unsafe { self.abi.connect_port(index, buffer as *mut c_void) };
    }

    fn bind_event_input(&mut self, meta: &PortMeta, minimum_size: Option<u32>) {
        if self.request.is_none() {
            let minimum = minimum_size.unwrap_or(self.config.sequence_size);
            self.request = Some(EventChannel::new(
                minimum,
                ChannelRole::Request,
                AtomUrids::register(&self.urid),
            ));
        }

        // Event-addressable sub-parameter, scoped by the plugin's URI
        // prefix.
        let uri = format!("{}{}", self.parameter_scope(), meta.name);
        let urid = self.urid.map(&uri);
        tracing::debug!("[{}] event parameter {uri} -> {urid}", self.name);
        self.controls.push(
            ControlParameter::new(meta.index, meta.name.clone(), PortRange::default())
                .with_urid(urid),
        );

        let buffer = match self.request.as_mut() {
            Some(channel) => channel.as_raw(),
            None => return,
        };
        unsafe { self.abi.connect_port(meta.index, buffer) };
    }

    fn bind_event_output(&mut self, meta: &PortMeta) {
        if self.notify.is_none() {
            let minimum = meta.minimum_size.unwrap_or(self.config.sequence_size);
            self.notify = Some(EventChannel::new(
                minimum,
                ChannelRole::Notify,
                AtomUrids::register(&self.urid),
            ));
        }
        let buffer = match self.notify.as_mut() {
            Some(channel) => channel.as_raw(),
            None => return,
        };
        unsafe { self.abi.connect_port(meta.index, buffer) };
    }

    fn parameter_scope(&self) -> String {
        self.prefix
            .clone()
            .unwrap_or_else(|| format!("{}#", self.identity))
    }

    fn connect_extensions(&mut self) {
        if let Some(iface) = self.abi.extension_data(WORKER_INTERFACE_URI) {
            let slot = worker::register(self.id);
            slot.connect(iface as *const WorkerInterface, self.abi.handle());
            self.worker = Some(slot);
        }
        self.state_iface = self
            .abi
            .extension_data(STATE_INTERFACE_URI)
            .map(|iface| iface as *const StateInterface);
    }

    pub fn activate(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::PortsBound | Lifecycle::Deactivated => {}
            from => {
                return Err(HostError::Lifecycle {
                    from: from.name(),
                    operation: "activate",
                })
            }
        }
        self.abi.activate();
        self.lifecycle = Lifecycle::Activated;
        Ok(())
    }

    /// Process one audio block. The caller owns the real-time schedule;
    /// this call only does the block's work: deliver pending deferred-work
    /// results, copy inputs to the bound buffers, run the plugin, copy
    /// outputs back, and maintain the event channels.
    pub fn run(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) -> Result<()> {
        if self.lifecycle != Lifecycle::Activated {
            return Err(HostError::Lifecycle {
                from: self.lifecycle.name(),
                operation: "run",
            });
        }
        if frames > self.config.block_length {
            return Err(HostError::BlockTooLarge {
                frames,
                max: self.config.block_length,
            });
        }

        // Block boundary: no run is in flight, so results may be delivered.
        if let Some(worker) = &self.worker {
            worker.deliver();
        }

        if frames > 0 {
            for (slot, source) in self.audio_inputs.iter_mut().zip(inputs.iter()) {
                let copied = frames.min(source.len());
                slot.buffer[..copied].copy_from_slice(&source[..copied]);
                slot.buffer[copied..frames].fill(0.0);
            }
            // Declared inputs the caller supplied no data for get silence.
            for slot in self.audio_inputs.iter_mut().skip(inputs.len()) {
                slot.buffer[..frames].fill(0.0);
            }

            self.abi.run(frames as u32);

            for (slot, sink) in self.audio_outputs.iter().zip(outputs.iter_mut()) {
                let copied = frames.min(sink.len());
                sink[..copied].copy_from_slice(&slot.buffer[..copied]);
            }
        }

        self.acknowledge_notify();
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Activated {
            return Err(HostError::Lifecycle {
                from: self.lifecycle.name(),
                operation: "deactivate",
            });
        }
        self.abi.deactivate();
        self.lifecycle = Lifecycle::Deactivated;
        Ok(())
    }

    /// Write a file path (or other textual value) to the plugin through
    /// the request channel, addressed at the control registered for an
    /// event-typed port. A capacity overflow drops the write and surfaces
    /// as the returned error; a missing channel or control only logs.
    pub fn set_path_value(&mut self, position: usize, path: &str) -> Result<()> {
        let Some(request) = self.request.as_mut() else {
            tracing::warn!("[{}] no event input port for path value", self.name);
            return Ok(());
        };
        let Some(param) = self.controls.get(position) else {
            tracing::warn!("[{}] no control at position {position}", self.name);
            return Ok(());
        };
        if param.urid == 0 {
            tracing::warn!(
                "[{}] control {} is not event-addressable",
                self.name,
                param.name
            );
            return Ok(());
        }
        tracing::debug!(
            "[{}] writing {} for control {} [{}]",
            self.name,
            path,
            param.name,
            param.urid
        );
        request.write_property(param.urid, path)
    }

    /// Inspect the notify channel for the file-accepted marker; when
    /// present, reset both channels. Advisory: `false` only means "not yet
    /// handled". Also invoked automatically at the end of every block.
    pub fn acknowledge_notify(&mut self) -> bool {
        let accepted = self
            .notify
            .as_ref()
            .map(EventChannel::has_accepted_marker)
            .unwrap_or(false);
        if accepted {
            if let Some(notify) = self.notify.as_mut() {
                notify.reset();
            }
            if let Some(request) = self.request.as_mut() {
                request.reset();
            }
        }
        accepted
    }

    pub fn set_control(&mut self, position: usize, value: f32) -> bool {
        match self.controls.get_mut(position) {
            Some(param) => {
                param.set_value_clamped(value);
                true
            }
            None => false,
        }
    }

    pub fn control_value(&self, position: usize) -> Option<f32> {
        self.controls.get(position).map(ControlParameter::value)
    }

    pub fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn ports(&self) -> &[PortMeta] {
        &self.ports
    }

    /// Indices of the tracked audio input slots, in binding order.
    pub fn audio_input_ports(&self) -> Vec<u32> {
        self.audio_inputs.iter().map(|s| s.port).collect()
    }

    pub fn audio_output_ports(&self) -> Vec<u32> {
        self.audio_outputs.iter().map(|s| s.port).collect()
    }

    pub fn request_channel(&self) -> Option<&EventChannel> {
        self.request.as_ref()
    }

    pub fn notify_channel(&self) -> Option<&EventChannel> {
        self.notify.as_ref()
    }

    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    pub fn has_state_interface(&self) -> bool {
        self.state_iface.is_some()
    }

    /// The plugin's state save/restore interface, for a preset layer to
    /// drive. Valid until the instance is dropped.
    pub fn state_interface(&self) -> Option<*const StateInterface> {
        self.state_iface
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        if self.lifecycle == Lifecycle::Activated {
            self.abi.deactivate();
        }
        // Quiesce deferred work before the native handle goes away, then
        // sever the link so stale schedule callbacks cannot resolve us.
        if let Some(worker) = self.worker.take() {
            worker.deliver();
            worker::unregister(self.id);
        }
        // The adapter's own drop performs the native cleanup.
    }
}
