//! JSON metadata sidecar
//!
//! Plugins of the sidecar-described variant ship their port metadata as a
//! JSON document keyed by port index, with `"-1"` holding plugin-level
//! fields. The export utility that generates these documents is an
//! external collaborator; this module only consumes them.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::classify::{PortDirection, PortKind, PortMeta, PortRange};
use crate::error::{HostError, Result};

#[derive(Debug, Deserialize)]
struct RawPluginEntry {
    #[serde(rename = "pluginName")]
    plugin_name: String,
    #[serde(default)]
    prefix: Option<String>,
}

// Port class membership is encoded by key presence; the values carry no
// information.
#[derive(Debug, Deserialize)]
struct RawPortEntry {
    name: String,
    index: u32,
    #[serde(rename = "AudioPort", default)]
    audio_port: Option<Value>,
    #[serde(rename = "ControlPort", default)]
    control_port: Option<Value>,
    #[serde(rename = "AtomPort", default)]
    atom_port: Option<Value>,
    #[serde(rename = "InputPort", default)]
    input_port: Option<Value>,
    #[serde(rename = "OutputPort", default)]
    output_port: Option<Value>,
    #[serde(rename = "minimumSize", default)]
    minimum_size: Option<u32>,
    #[serde(default)]
    min: Option<f32>,
    #[serde(default)]
    max: Option<f32>,
    #[serde(rename = "default", default)]
    default_value: Option<f32>,
}

impl RawPortEntry {
    fn into_meta(self) -> PortMeta {
        let kind = if self.audio_port.is_some() {
            PortKind::Audio
        } else if self.control_port.is_some() {
            PortKind::Control
        } else if self.atom_port.is_some() {
            PortKind::Event
        } else {
            PortKind::Unknown
        };
        let direction = if self.input_port.is_some() {
            Some(PortDirection::Input)
        } else if self.output_port.is_some() {
            Some(PortDirection::Output)
        } else {
            None
        };
        let range = if self.min.is_some() || self.max.is_some() || self.default_value.is_some() {
            let min = self.min.unwrap_or(0.0);
            Some(PortRange {
                min,
                max: self.max.unwrap_or(1.0),
                default: self.default_value.unwrap_or(min),
            })
        } else {
            None
        };

        PortMeta {
            index: self.index,
            name: self.name,
            kind,
            direction,
            range,
            minimum_size: self.minimum_size,
        }
    }
}

/// Parsed sidecar document.
#[derive(Debug, Clone)]
pub struct SidecarDoc {
    pub plugin_name: String,
    /// URI prefix scoping event-addressable parameter names.
    pub prefix: Option<String>,
    /// Ports sorted by declared index.
    pub ports: Vec<PortMeta>,
}

/// Parse a sidecar document. Any malformation is fatal for this plugin
/// only; the host keeps running.
pub fn parse_sidecar(plugin: &str, json: &str) -> Result<SidecarDoc> {
    let sidecar_error = |reason: String| HostError::Sidecar {
        plugin: plugin.to_string(),
        reason,
    };

    let doc: HashMap<String, Value> =
        serde_json::from_str(json).map_err(|e| sidecar_error(e.to_string()))?;

    let plugin_entry = doc
        .get("-1")
        .ok_or_else(|| sidecar_error("missing plugin-level entry \"-1\"".to_string()))?;
    let plugin_entry: RawPluginEntry = serde_json::from_value(plugin_entry.clone())
        .map_err(|e| sidecar_error(format!("bad plugin-level entry: {e}")))?;

    let mut ports = Vec::new();
    for (key, value) in &doc {
        if key == "-1" {
            continue;
        }
        let entry: RawPortEntry = serde_json::from_value(value.clone())
            .map_err(|e| sidecar_error(format!("bad port entry {key:?}: {e}")))?;
        ports.push(entry.into_meta());
    }
    ports.sort_by_key(|p| p.index);

    Ok(SidecarDoc {
        plugin_name: plugin_entry.plugin_name,
        prefix: plugin_entry.prefix,
        ports,
    })
}

/// Read and parse a sidecar document from disk. The on-disk layout (one
/// JSON file per plugin under the export utility's config directory) is
/// the producer's concern; this only needs the final path.
pub fn load_sidecar(plugin: &str, path: impl AsRef<std::path::Path>) -> Result<SidecarDoc> {
    let json = std::fs::read_to_string(path.as_ref())?;
    parse_sidecar(plugin, &json)
}

/// Merge the two metadata sources into one port table.
///
/// Native introspection is authoritative for port classes; the sidecar
/// fills in names, ranges, and event capacities it does not know. When
/// both sources are present and disagree about the port count, neither can
/// be trusted and the instance is refused.
pub fn merge_ports(
    native: Option<Vec<PortMeta>>,
    sidecar: Option<&SidecarDoc>,
) -> Result<Vec<PortMeta>> {
    match (native, sidecar) {
        (Some(native), Some(doc)) => {
            if native.len() != doc.ports.len() {
                return Err(HostError::PortCountMismatch {
                    sidecar: doc.ports.len(),
                    native: native.len(),
                });
            }
            let merged = native
                .into_iter()
                .map(|port| {
                    let Some(side) = doc.ports.iter().find(|s| s.index == port.index) else {
                        return port;
                    };
                    PortMeta {
                        index: port.index,
                        name: if side.name.is_empty() {
                            port.name
                        } else {
                            side.name.clone()
                        },
                        kind: if port.kind == PortKind::Unknown {
                            side.kind
                        } else {
                            port.kind
                        },
                        direction: port.direction.or(side.direction),
                        range: side.range.or(port.range),
                        minimum_size: side.minimum_size.or(port.minimum_size),
                    }
                })
                .collect();
            Ok(merged)
        }
        (Some(native), None) => Ok(native),
        (None, Some(doc)) => Ok(doc.ports.clone()),
        (None, None) => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "-1": {"pluginName": "Cab Sim", "prefix": "urn:cabsim#"},
        "0": {"name": "In", "index": 0, "AudioPort": true, "InputPort": true},
        "1": {"name": "Out", "index": 1, "AudioPort": true, "OutputPort": true},
        "2": {"name": "Mix", "index": 2, "ControlPort": true, "InputPort": true,
              "min": 0.0, "max": 1.0, "default": 0.5},
        "3": {"name": "Control", "index": 3, "AtomPort": true, "InputPort": true,
              "minimumSize": 256}
    }"#;

    #[test]
    fn test_parse_full_document() {
        let doc = parse_sidecar("cabsim", DOC).unwrap();
        assert_eq!(doc.plugin_name, "Cab Sim");
        assert_eq!(doc.prefix.as_deref(), Some("urn:cabsim#"));
        assert_eq!(doc.ports.len(), 4);

        assert_eq!(doc.ports[0].kind, PortKind::Audio);
        assert_eq!(doc.ports[0].direction, Some(PortDirection::Input));
        assert_eq!(doc.ports[1].direction, Some(PortDirection::Output));

        let mix = &doc.ports[2];
        assert_eq!(mix.kind, PortKind::Control);
        let range = mix.range.unwrap();
        assert_eq!(range.default, 0.5);

        let control = &doc.ports[3];
        assert_eq!(control.kind, PortKind::Event);
        assert_eq!(control.minimum_size, Some(256));
    }

    #[test]
    fn test_ports_are_sorted_by_index() {
        let doc = parse_sidecar(
            "p",
            r#"{
                "-1": {"pluginName": "P"},
                "2": {"name": "c", "index": 2, "ControlPort": true, "InputPort": true},
                "0": {"name": "a", "index": 0, "AudioPort": true, "InputPort": true}
            }"#,
        )
        .unwrap();
        assert_eq!(doc.ports[0].index, 0);
        assert_eq!(doc.ports[1].index, 2);
    }

    #[test]
    fn test_malformed_json_is_a_sidecar_error() {
        let err = parse_sidecar("p", "{ not json").unwrap_err();
        assert!(matches!(err, HostError::Sidecar { .. }));

        let err = parse_sidecar("p", r#"{"0": {"name": "x", "index": 0}}"#).unwrap_err();
        assert!(matches!(err, HostError::Sidecar { .. }));
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn test_unflagged_port_parses_as_unknown() {
        let doc = parse_sidecar(
            "p",
            r#"{"-1": {"pluginName": "P"},
                "0": {"name": "odd", "index": 0}}"#,
        )
        .unwrap();
        assert_eq!(doc.ports[0].kind, PortKind::Unknown);
        assert_eq!(doc.ports[0].direction, None);
    }

    #[test]
    fn test_merge_count_mismatch_is_refused() {
        let doc = parse_sidecar("cabsim", DOC).unwrap();
        let native = vec![PortMeta::new(0, "only one")];
        let err = merge_ports(Some(native), Some(&doc)).unwrap_err();
        assert!(matches!(
            err,
            HostError::PortCountMismatch {
                sidecar: 4,
                native: 1
            }
        ));
    }

    #[test]
    fn test_merge_overlays_sidecar_details_on_native_flags() {
        let doc = parse_sidecar(
            "p",
            r#"{"-1": {"pluginName": "P"},
                "0": {"name": "Drive", "index": 0, "min": 0.0, "max": 10.0, "default": 2.0}}"#,
        )
        .unwrap();
        // Native knows the class but not the range.
        let native = vec![PortMeta::new(0, "")
            .kind(PortKind::Control)
            .direction(PortDirection::Input)];

        let merged = merge_ports(Some(native), Some(&doc)).unwrap();
        assert_eq!(merged[0].kind, PortKind::Control);
        assert_eq!(merged[0].name, "Drive");
        assert_eq!(merged[0].range.unwrap().max, 10.0);
    }

    #[test]
    fn test_load_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();

        let doc = load_sidecar("cabsim", file.path()).unwrap();
        assert_eq!(doc.plugin_name, "Cab Sim");
        assert_eq!(doc.ports.len(), 4);

        let err = load_sidecar("cabsim", "/nonexistent/cabsim.json").unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
    }

    #[test]
    fn test_single_source_passthrough() {
        let native = vec![PortMeta::new(0, "a"), PortMeta::new(1, "b")];
        let merged = merge_ports(Some(native.clone()), None).unwrap();
        assert_eq!(merged.len(), 2);

        let doc = parse_sidecar("cabsim", DOC).unwrap();
        let merged = merge_ports(None, Some(&doc)).unwrap();
        assert_eq!(merged.len(), 4);

        assert!(merge_ports(None, None).unwrap().is_empty());
    }
}
