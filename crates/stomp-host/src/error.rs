//! Error types for the plugin host

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    /// Null descriptor, null instantiated handle, or non-positive sample
    /// rate. Nothing about the plugin can be trusted after this; the caller
    /// gets no instance at all.
    #[error("plugin construction failed: {reason}")]
    Construction { reason: String },

    #[error("malformed metadata sidecar for {plugin}\n  Reason: {reason}")]
    Sidecar { plugin: String, reason: String },

    /// The JSON sidecar and native introspection disagree about how many
    /// ports the plugin declares. Trusting either blindly would misbind
    /// ports, so the instance is refused.
    #[error("sidecar declares {sidecar} ports but native introspection reports {native}")]
    PortCountMismatch { sidecar: usize, native: usize },

    #[error("event channel write of {needed} bytes exceeds {capacity}-byte capacity")]
    ChannelFull { needed: usize, capacity: usize },

    #[error("deferred work returned status {status}")]
    Worker { status: i32 },

    #[error("invalid lifecycle transition from {from} during {operation}")]
    Lifecycle {
        from: &'static str,
        operation: &'static str,
    },

    #[error("block of {frames} frames exceeds negotiated maximum {max}")]
    BlockTooLarge { frames: usize, max: usize },

    #[error("failed to open plugin library {path}\n  Reason: {reason}")]
    Library { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HostError::Construction {
            reason: "null descriptor".to_string(),
        };
        assert!(err.to_string().contains("null descriptor"));

        let err = HostError::ChannelFull {
            needed: 300,
            capacity: 281,
        };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("281"));

        let err = HostError::PortCountMismatch {
            sidecar: 4,
            native: 5,
        };
        assert!(err.to_string().contains("4"));
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_lifecycle_error_display() {
        let err = HostError::Lifecycle {
            from: "Unbound",
            operation: "run",
        };
        assert!(err.to_string().contains("Unbound"));
        assert!(err.to_string().contains("run"));
    }
}
