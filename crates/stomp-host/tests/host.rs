//! End-to-end tests driving fake in-process plugins through the full
//! bind → activate → run → deactivate lifecycle, one per descriptor
//! variant.

use std::ffi::{c_char, c_ulong, c_void, CStr, CString};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stomp_host::ladspa::{
    LadspaDescriptor, LadspaHandle, PortRangeHint, HINT_BOUNDED_ABOVE, HINT_BOUNDED_BELOW,
    HINT_DEFAULT_MIDDLE, PORT_AUDIO, PORT_CONTROL, PORT_INPUT, PORT_OUTPUT,
};
use stomp_host::lv2::{
    FeatureRecord, Lv2Descriptor, Lv2Handle, UridMapShim, WorkerInterface, WorkerRespond,
    WorkerScheduleShim, URID_MAP_URI, WORKER_INTERFACE_URI, WORKER_SCHEDULE_URI, WORKER_SUCCESS,
};
use stomp_host::{
    HostConfig, HostError, Lifecycle, PluginIdentity, PluginInstance, PortDirection,
    PortInventory, PortKind, PortMeta, UridRegistry,
};

// ---------------------------------------------------------------------------
// Fake legacy plugin
// ---------------------------------------------------------------------------

struct LegacyState {
    ports: Vec<*mut f32>,
}

unsafe extern "C" fn legacy_instantiate(
    descriptor: *const LadspaDescriptor,
    _sample_rate: c_ulong,
) -> LadspaHandle {
    let count = (*descriptor).port_count as usize;
    Box::into_raw(Box::new(LegacyState {
        ports: vec![std::ptr::null_mut(); count],
    })) as LadspaHandle
}

unsafe extern "C" fn legacy_connect(handle: LadspaHandle, port: c_ulong, buffer: *mut f32) {
    let state = &mut *(handle as *mut LegacyState);
    if (port as usize) < state.ports.len() {
        state.ports[port as usize] = buffer;
    }
}

/// Gain layout: port 0 audio in, port 1 audio out, port 2 gain control.
unsafe extern "C" fn gain_run(handle: LadspaHandle, frames: c_ulong) {
    let state = &*(handle as *const LegacyState);
    let input = state.ports[0];
    let output = state.ports[1];
    if input.is_null() || output.is_null() {
        return;
    }
    let gain = if state.ports[2].is_null() {
        1.0
    } else {
        *state.ports[2]
    };
    for i in 0..frames as usize {
        *output.add(i) = *input.add(i) * gain;
    }
}

unsafe extern "C" fn noop_run(_handle: LadspaHandle, _frames: c_ulong) {}

unsafe extern "C" fn legacy_cleanup(handle: LadspaHandle) {
    drop(Box::from_raw(handle as *mut LegacyState));
}

fn leak_cstr(s: &str) -> *const c_char {
    CString::new(s).unwrap().into_raw()
}

/// Build a leaked legacy descriptor from (flags, name, hint) triples.
fn make_legacy_descriptor(
    unique_id: u64,
    ports: &[(i32, &str, PortRangeHint)],
    run: unsafe extern "C" fn(LadspaHandle, c_ulong),
) -> *const LadspaDescriptor {
    let flags: Vec<i32> = ports.iter().map(|p| p.0).collect();
    let names: Vec<*const c_char> = ports.iter().map(|p| leak_cstr(p.1)).collect();
    let hints: Vec<PortRangeHint> = ports.iter().map(|p| p.2).collect();

    let descriptor = LadspaDescriptor {
        unique_id: unique_id as c_ulong,
        label: leak_cstr("fake"),
        properties: 0,
        name: leak_cstr("Fake Legacy Plugin"),
        maker: leak_cstr("stomp tests"),
        copyright: leak_cstr("none"),
        port_count: ports.len() as c_ulong,
        port_descriptors: Vec::leak(flags).as_ptr(),
        port_names: Vec::leak(names).as_ptr(),
        port_range_hints: Vec::leak(hints).as_ptr(),
        implementation_data: std::ptr::null_mut(),
        instantiate: Some(legacy_instantiate),
        connect_port: Some(legacy_connect),
        activate: None,
        run: Some(run),
        run_adding: None,
        set_run_adding_gain: None,
        deactivate: None,
        cleanup: Some(legacy_cleanup),
    };
    Box::leak(Box::new(descriptor))
}

fn no_hint() -> PortRangeHint {
    PortRangeHint {
        hint_descriptor: 0,
        lower_bound: 0.0,
        upper_bound: 0.0,
    }
}

fn unit_hint() -> PortRangeHint {
    PortRangeHint {
        hint_descriptor: HINT_BOUNDED_BELOW | HINT_BOUNDED_ABOVE | HINT_DEFAULT_MIDDLE,
        lower_bound: 0.0,
        upper_bound: 1.0,
    }
}

// ---------------------------------------------------------------------------
// Legacy variant
// ---------------------------------------------------------------------------

#[test]
fn test_legacy_gain_end_to_end() {
    let descriptor = make_legacy_descriptor(
        1001,
        &[
            (PORT_AUDIO | PORT_INPUT, "Input", no_hint()),
            (PORT_AUDIO | PORT_OUTPUT, "Output", no_hint()),
            (PORT_CONTROL | PORT_INPUT, "Gain", unit_hint()),
        ],
        gain_run,
    );

    let mut plugin = unsafe {
        PluginInstance::legacy(descriptor, 48000.0, UridRegistry::new(), HostConfig::default())
    }
    .unwrap();

    assert_eq!(plugin.lifecycle(), Lifecycle::PortsBound);
    assert_eq!(*plugin.identity(), PluginIdentity::Numeric(1001));
    assert_eq!(plugin.name(), "Fake Legacy Plugin");
    assert_eq!(plugin.audio_input_ports(), vec![0]);
    assert_eq!(plugin.audio_output_ports(), vec![1]);
    assert_eq!(plugin.controls().len(), 1);
    assert_eq!(plugin.control_value(0), Some(0.5));

    // Running before activation violates the lifecycle.
    let input = vec![1.0f32; 512];
    let mut output = vec![0.0f32; 512];
    let err = plugin
        .run(&[&input], &mut [&mut output[..]], 512)
        .unwrap_err();
    assert!(matches!(err, HostError::Lifecycle { .. }));

    plugin.activate().unwrap();
    assert_eq!(plugin.lifecycle(), Lifecycle::Activated);
    // Double activation is refused.
    assert!(plugin.activate().is_err());

    plugin.run(&[&input], &mut [&mut output[..]], 512).unwrap();
    assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-6));

    plugin.set_control(0, 2.0);
    // Out-of-range writes clamp to the declared maximum.
    assert_eq!(plugin.control_value(0), Some(1.0));
    plugin.run(&[&input], &mut [&mut output[..]], 512).unwrap();
    assert!(output.iter().all(|&s| (s - 1.0).abs() < 1e-6));

    // A zero-length block is a no-op, not a crash.
    plugin.run(&[&input], &mut [&mut output[..]], 0).unwrap();

    // Blocks beyond the negotiated length are refused.
    let err = plugin
        .run(&[&input], &mut [&mut output[..]], 100_000)
        .unwrap_err();
    assert!(matches!(err, HostError::BlockTooLarge { .. }));

    plugin.deactivate().unwrap();
    assert_eq!(plugin.lifecycle(), Lifecycle::Deactivated);
    // And back: deactivated instances may be activated again.
    plugin.activate().unwrap();
}

#[test]
fn test_legacy_three_audio_inputs_track_only_two() {
    let descriptor = make_legacy_descriptor(
        1002,
        &[
            (PORT_AUDIO | PORT_INPUT, "In 1", no_hint()),
            (PORT_AUDIO | PORT_INPUT, "In 2", no_hint()),
            (PORT_AUDIO | PORT_INPUT, "In 3", no_hint()),
            (PORT_AUDIO | PORT_OUTPUT, "Out", no_hint()),
        ],
        noop_run,
    );

    let plugin = unsafe {
        PluginInstance::legacy(descriptor, 48000.0, UridRegistry::new(), HostConfig::default())
    }
    .unwrap();

    // Exactly two slots per direction, in declared order; the third input
    // stays unbound without failing instantiation.
    assert_eq!(plugin.audio_input_ports(), vec![0, 1]);
    assert_eq!(plugin.audio_output_ports(), vec![3]);
}

#[test]
fn test_legacy_zero_audio_ports() {
    let descriptor = make_legacy_descriptor(
        1003,
        &[
            (PORT_CONTROL | PORT_INPUT, "Threshold", unit_hint()),
            (PORT_CONTROL | PORT_OUTPUT, "Level Meter", no_hint()),
        ],
        noop_run,
    );

    let mut plugin = unsafe {
        PluginInstance::legacy(descriptor, 48000.0, UridRegistry::new(), HostConfig::default())
    }
    .unwrap();

    assert!(plugin.audio_input_ports().is_empty());
    assert!(plugin.audio_output_ports().is_empty());
    assert_eq!(plugin.controls().len(), 1);

    plugin.activate().unwrap();
    plugin.run(&[], &mut [], 256).unwrap();
}

#[test]
fn test_legacy_quirk_overrides() {
    // Identity 2606 declares four ports with no type flags; the override
    // table supplies the real layout.
    let descriptor = make_legacy_descriptor(
        2606,
        &[
            (0, "Drive", no_hint()),
            (0, "Tone", no_hint()),
            (0, "Input", no_hint()),
            (0, "Output", no_hint()),
        ],
        noop_run,
    );

    let plugin = unsafe {
        PluginInstance::legacy(descriptor, 48000.0, UridRegistry::new(), HostConfig::default())
    }
    .unwrap();

    assert_eq!(plugin.audio_input_ports(), vec![2]);
    assert_eq!(plugin.audio_output_ports(), vec![3]);
    assert_eq!(plugin.controls().len(), 2);

    let drive = plugin.controls().by_port(0).unwrap();
    assert_eq!((drive.min, drive.max), (0.0, 25.0));
    let tone = plugin.controls().by_port(1).unwrap();
    assert_eq!((tone.min, tone.max), (-24.0, 24.0));
}

#[test]
fn test_fatal_construction_errors() {
    let err = unsafe {
        PluginInstance::legacy(
            std::ptr::null(),
            48000.0,
            UridRegistry::new(),
            HostConfig::default(),
        )
    }
    .unwrap_err();
    assert!(matches!(err, HostError::Construction { .. }));

    let descriptor = make_legacy_descriptor(1004, &[], noop_run);
    let err = unsafe {
        PluginInstance::legacy(descriptor, 0.0, UridRegistry::new(), HostConfig::default())
    }
    .unwrap_err();
    assert!(matches!(err, HostError::Construction { .. }));
}

// ---------------------------------------------------------------------------
// Fake LV2 plugin
// ---------------------------------------------------------------------------

struct Lv2State {
    ports: Vec<*mut c_void>,
    path_urid: u32,
    sequence_urid: u32,
    schedule: Option<(
        unsafe extern "C" fn(*mut c_void, u32, *const c_void) -> i32,
        *mut c_void,
    )>,
    scheduled: bool,
}

unsafe extern "C" fn lv2_instantiate(
    _descriptor: *const Lv2Descriptor,
    _sample_rate: f64,
    _bundle_path: *const c_char,
    features: *const *const FeatureRecord,
) -> Lv2Handle {
    if features.is_null() {
        return std::ptr::null_mut();
    }

    let mut state = Box::new(Lv2State {
        ports: vec![std::ptr::null_mut(); 8],
        path_urid: 0,
        sequence_urid: 0,
        schedule: None,
        scheduled: false,
    });

    // Walk the capability table the way a real plugin would.
    let mut cursor = features;
    while !(*cursor).is_null() {
        let record = &**cursor;
        let uri = CStr::from_ptr(record.uri);
        if uri == URID_MAP_URI {
            let shim = &*(record.data as *const UridMapShim);
            let map = shim.map.expect("map entry point");
            state.path_urid = map(shim.handle, c"http://lv2plug.in/ns/ext/atom#Path".as_ptr());
            state.sequence_urid =
                map(shim.handle, c"http://lv2plug.in/ns/ext/atom#Sequence".as_ptr());
        } else if uri == WORKER_SCHEDULE_URI {
            let shim = &*(record.data as *const WorkerScheduleShim);
            state.schedule = shim.schedule_work.map(|f| (f, shim.handle));
        }
        cursor = cursor.add(1);
    }

    if state.path_urid == 0 {
        // Identifier mapping is required; refuse to instantiate without it.
        return std::ptr::null_mut();
    }
    Box::into_raw(state) as Lv2Handle
}

unsafe extern "C" fn lv2_connect(handle: Lv2Handle, port: u32, buffer: *mut c_void) {
    let state = &mut *(handle as *mut Lv2State);
    if (port as usize) < state.ports.len() {
        state.ports[port as usize] = buffer;
    }
}

/// Cab layout: 0 audio in, 1 audio out, 2 mix control, 3 event in,
/// optional 4 event out.
unsafe extern "C" fn cab_run(handle: Lv2Handle, frames: u32) {
    let state = &*(handle as *const Lv2State);
    let input = state.ports[0] as *const f32;
    let output = state.ports[1] as *mut f32;
    if !input.is_null() && !output.is_null() {
        let mix = if state.ports[2].is_null() {
            1.0
        } else {
            *(state.ports[2] as *const f32)
        };
        for i in 0..frames as usize {
            *output.add(i) = *input.add(i) * mix;
        }
    }

    // When a request message is pending and a notify port is wired,
    // acknowledge by posting a path atom.
    let request = state.ports[3] as *const u32;
    let notify = state.ports[4] as *mut u32;
    if request.is_null() || notify.is_null() {
        return;
    }
    let request_body = *request;
    if request_body as usize <= std::mem::size_of::<u64>() {
        return;
    }

    let payload = b"/tmp/accepted\0";
    // Sequence header: size, type, unit, pad.
    *notify = (8 + 16 + payload.len()) as u32;
    *notify.add(1) = state.sequence_urid;
    *notify.add(2) = 0;
    *notify.add(3) = 0;
    // Event header: frames (i64), size, type, then the payload.
    *(notify.add(4) as *mut i64) = 0;
    *notify.add(6) = payload.len() as u32;
    *notify.add(7) = state.path_urid;
    std::ptr::copy_nonoverlapping(payload.as_ptr(), notify.add(8) as *mut u8, payload.len());
}

/// Worker layout: 0 audio in, 1 audio out; schedules one job on first run.
unsafe extern "C" fn worker_plugin_run(handle: Lv2Handle, _frames: u32) {
    let state = &mut *(handle as *mut Lv2State);
    if state.scheduled {
        return;
    }
    if let Some((schedule, schedule_handle)) = state.schedule {
        let payload = [7u8, 7, 7];
        let status = schedule(
            schedule_handle,
            payload.len() as u32,
            payload.as_ptr() as *const c_void,
        );
        if status == WORKER_SUCCESS {
            state.scheduled = true;
        }
    }
}

unsafe extern "C" fn lv2_cleanup(handle: Lv2Handle) {
    drop(Box::from_raw(handle as *mut Lv2State));
}

static WORK_PERFORMED: AtomicUsize = AtomicUsize::new(0);
static RESPONSES_DELIVERED: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn worker_work(
    _handle: Lv2Handle,
    respond: WorkerRespond,
    respond_handle: *mut c_void,
    size: u32,
    data: *const c_void,
) -> i32 {
    WORK_PERFORMED.fetch_add(1, Ordering::SeqCst);
    match respond {
        Some(respond) => respond(respond_handle, size, data),
        None => WORKER_SUCCESS,
    }
}

unsafe extern "C" fn worker_work_response(
    _handle: Lv2Handle,
    _size: u32,
    _data: *const c_void,
) -> i32 {
    RESPONSES_DELIVERED.fetch_add(1, Ordering::SeqCst);
    WORKER_SUCCESS
}

static WORKER_IFACE: WorkerInterface = WorkerInterface {
    work: Some(worker_work),
    work_response: Some(worker_work_response),
    end_run: None,
};

unsafe extern "C" fn worker_extension_data(uri: *const c_char) -> *const c_void {
    if CStr::from_ptr(uri) == WORKER_INTERFACE_URI {
        &WORKER_IFACE as *const WorkerInterface as *const c_void
    } else {
        std::ptr::null()
    }
}

fn make_lv2_descriptor(
    uri: &str,
    run: unsafe extern "C" fn(Lv2Handle, u32),
    extension_data: Option<unsafe extern "C" fn(*const c_char) -> *const c_void>,
) -> *const Lv2Descriptor {
    Box::leak(Box::new(Lv2Descriptor {
        uri: leak_cstr(uri),
        instantiate: Some(lv2_instantiate),
        connect_port: Some(lv2_connect),
        activate: None,
        run: Some(run),
        deactivate: None,
        cleanup: Some(lv2_cleanup),
        extension_data,
    }))
}

const CAB_SIDECAR: &str = r#"{
    "-1": {"pluginName": "Cab Sim", "prefix": "urn:cabsim#"},
    "0": {"name": "In", "index": 0, "AudioPort": true, "InputPort": true},
    "1": {"name": "Out", "index": 1, "AudioPort": true, "OutputPort": true},
    "2": {"name": "Mix", "index": 2, "ControlPort": true, "InputPort": true,
          "min": 0.0, "max": 1.0, "default": 0.5},
    "3": {"name": "model", "index": 3, "AtomPort": true, "InputPort": true,
          "minimumSize": 256}
}"#;

// ---------------------------------------------------------------------------
// Sidecar-described variant
// ---------------------------------------------------------------------------

#[test]
fn test_lv2_sidecar_end_to_end() {
    let descriptor = make_lv2_descriptor("http://example.org/cabsim", cab_run, None);
    let urid = UridRegistry::new();

    let mut plugin = unsafe {
        PluginInstance::native(
            descriptor,
            "/opt/plugins/cabsim.lv2/",
            CAB_SIDECAR,
            48000.0,
            urid,
            HostConfig::default(),
        )
    }
    .unwrap();

    assert_eq!(plugin.name(), "Cab Sim");
    assert_eq!(plugin.audio_input_ports(), vec![0]);
    assert_eq!(plugin.audio_output_ports(), vec![1]);

    // One true control at its declared default, plus the event-addressable
    // entry for the atom port.
    let mix = plugin.controls().by_port(2).unwrap();
    assert_eq!(mix.value(), 0.5);
    assert_eq!(mix.urid, 0);
    let model = plugin.controls().by_port(3).unwrap();
    assert_ne!(model.urid, 0);

    let request = plugin.request_channel().unwrap();
    assert_eq!(request.capacity(), 256 + 16 + 16 + 1);
    assert!(plugin.notify_channel().is_none());

    plugin.activate().unwrap();

    let frames = 480;
    let input: Vec<f32> = (0..frames).map(|i| (i as f32 / 100.0).sin()).collect();
    let mut output = vec![0.0f32; frames];
    plugin
        .run(&[&input], &mut [&mut output[..]], frames)
        .unwrap();
    for (i, o) in input.iter().zip(&output) {
        assert!((o - i * 0.5).abs() < 1e-6);
    }

    plugin.run(&[&input], &mut [&mut output[..]], 0).unwrap();
}

#[test]
fn test_lv2_path_message_acknowledge_roundtrip() {
    let sidecar = r#"{
        "-1": {"pluginName": "Cab Sim", "prefix": "urn:cabsim#"},
        "0": {"name": "In", "index": 0, "AudioPort": true, "InputPort": true},
        "1": {"name": "Out", "index": 1, "AudioPort": true, "OutputPort": true},
        "2": {"name": "Mix", "index": 2, "ControlPort": true, "InputPort": true,
              "min": 0.0, "max": 1.0, "default": 0.5},
        "3": {"name": "model", "index": 3, "AtomPort": true, "InputPort": true,
              "minimumSize": 256},
        "4": {"name": "notify", "index": 4, "AtomPort": true, "OutputPort": true,
              "minimumSize": 256}
    }"#;

    let descriptor = make_lv2_descriptor("http://example.org/cabsim-notify", cab_run, None);
    let mut plugin = unsafe {
        PluginInstance::native(
            descriptor,
            "/opt/plugins/cabsim.lv2/",
            sidecar,
            48000.0,
            UridRegistry::new(),
            HostConfig::default(),
        )
    }
    .unwrap();
    plugin.activate().unwrap();

    let model_position = plugin
        .controls()
        .iter()
        .position(|p| p.urid != 0)
        .unwrap();
    plugin.set_path_value(model_position, "/tmp/4x12.wav").unwrap();

    let empty = stomp_host::EventChannel::empty_body_size();
    assert!(plugin.request_channel().unwrap().logical_size() > empty);

    // The plugin acknowledges during run; the host resets both channels at
    // the block boundary.
    let input = vec![0.0f32; 64];
    let mut output = vec![0.0f32; 64];
    plugin.run(&[&input], &mut [&mut output[..]], 64).unwrap();

    assert_eq!(plugin.request_channel().unwrap().logical_size(), empty);
    assert_eq!(plugin.notify_channel().unwrap().logical_size(), empty);
    assert!(!plugin.acknowledge_notify());
}

#[test]
fn test_lv2_worker_delivers_at_block_boundary() {
    let descriptor = make_lv2_descriptor(
        "http://example.org/convolver",
        worker_plugin_run,
        Some(worker_extension_data),
    );
    let sidecar = r#"{
        "-1": {"pluginName": "Convolver"},
        "0": {"name": "In", "index": 0, "AudioPort": true, "InputPort": true},
        "1": {"name": "Out", "index": 1, "AudioPort": true, "OutputPort": true}
    }"#;

    let mut plugin = unsafe {
        PluginInstance::native(
            descriptor,
            "/opt/plugins/convolver.lv2/",
            sidecar,
            48000.0,
            UridRegistry::new(),
            HostConfig::default(),
        )
    }
    .unwrap();
    assert!(plugin.has_worker());

    plugin.activate().unwrap();

    let input = vec![0.0f32; 32];
    let mut output = vec![0.0f32; 32];

    // First block: the plugin schedules, the host performs the work
    // synchronously, but delivery waits for the next boundary.
    plugin.run(&[&input], &mut [&mut output[..]], 32).unwrap();
    assert_eq!(WORK_PERFORMED.load(Ordering::SeqCst), 1);
    assert_eq!(RESPONSES_DELIVERED.load(Ordering::SeqCst), 0);

    // Second block: the queued response is delivered before the run.
    plugin.run(&[&input], &mut [&mut output[..]], 32).unwrap();
    assert_eq!(RESPONSES_DELIVERED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lv2_malformed_sidecar_refuses_instance() {
    let descriptor = make_lv2_descriptor("http://example.org/broken", cab_run, None);
    let err = unsafe {
        PluginInstance::native(
            descriptor,
            "/opt/plugins/broken.lv2/",
            "{ this is not json",
            48000.0,
            UridRegistry::new(),
            HostConfig::default(),
        )
    }
    .unwrap_err();
    assert!(matches!(err, HostError::Sidecar { .. }));
}

// ---------------------------------------------------------------------------
// Discovery variant
// ---------------------------------------------------------------------------

fn cab_inventory() -> PortInventory {
    PortInventory {
        plugin_uri: "http://example.org/cabsim".to_string(),
        plugin_name: "Cab Sim (discovered)".to_string(),
        prefix: Some("urn:cabsim#".to_string()),
        ports: vec![
            PortMeta::new(0, "In")
                .kind(PortKind::Audio)
                .direction(PortDirection::Input),
            PortMeta::new(1, "Out")
                .kind(PortKind::Audio)
                .direction(PortDirection::Output),
            PortMeta::new(2, "Mix")
                .kind(PortKind::Control)
                .direction(PortDirection::Input)
                .range(0.0, 1.0, 0.25),
        ],
    }
}

#[test]
fn test_discovered_inventory_classification() {
    let descriptor = make_lv2_descriptor("http://example.org/cabsim", cab_run, None);
    let mut plugin = unsafe {
        PluginInstance::discovered(
            descriptor,
            "/opt/plugins/cabsim.lv2/",
            cab_inventory(),
            None,
            44100.0,
            UridRegistry::new(),
            HostConfig::default(),
        )
    }
    .unwrap();

    assert_eq!(plugin.name(), "Cab Sim (discovered)");
    assert_eq!(plugin.audio_input_ports(), vec![0]);
    assert_eq!(plugin.audio_output_ports(), vec![1]);
    assert_eq!(plugin.control_value(0), Some(0.25));

    plugin.activate().unwrap();
    let input = vec![1.0f32; 128];
    let mut output = vec![0.0f32; 128];
    plugin.run(&[&input], &mut [&mut output[..]], 128).unwrap();
    assert!((output[0] - 0.25).abs() < 1e-6);
}

#[test]
fn test_discovered_sidecar_count_mismatch_is_refused() {
    let descriptor = make_lv2_descriptor("http://example.org/cabsim", cab_run, None);
    // The inventory reports three ports; the sidecar describes four.
    let err = unsafe {
        PluginInstance::discovered(
            descriptor,
            "/opt/plugins/cabsim.lv2/",
            cab_inventory(),
            Some(CAB_SIDECAR),
            44100.0,
            UridRegistry::new(),
            HostConfig::default(),
        )
    }
    .unwrap_err();
    assert!(matches!(
        err,
        HostError::PortCountMismatch {
            sidecar: 4,
            native: 3
        }
    ));
}

// ---------------------------------------------------------------------------
// Shared registry across instances
// ---------------------------------------------------------------------------

#[test]
fn test_shared_registry_interned_once_across_instances() {
    let urid = UridRegistry::new();
    let descriptor_a = make_lv2_descriptor("http://example.org/cab-a", cab_run, None);
    let descriptor_b = make_lv2_descriptor("http://example.org/cab-b", cab_run, None);

    let a = unsafe {
        PluginInstance::native(
            descriptor_a,
            "/opt/a.lv2/",
            CAB_SIDECAR,
            48000.0,
            Arc::clone(&urid),
            HostConfig::default(),
        )
    }
    .unwrap();
    let b = unsafe {
        PluginInstance::native(
            descriptor_b,
            "/opt/b.lv2/",
            CAB_SIDECAR,
            48000.0,
            Arc::clone(&urid),
            HostConfig::default(),
        )
    }
    .unwrap();

    // Same prefix + port name, same registry: both instances agree on the
    // message key for the event-addressable parameter.
    let urid_a = a.controls().by_port(3).unwrap().urid;
    let urid_b = b.controls().by_port(3).unwrap().urid;
    assert_eq!(urid_a, urid_b);
}
