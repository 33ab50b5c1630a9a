//! Device error types.
//!
//! Object-level problems (unknown subtypes, missing parameters, rejected
//! tiles) are logged and recovered where they happen. Only native graph
//! misuse and device construction failures are represented here.

use thiserror::Error;

/// Errors raised by the native scene and shader graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NativeError {
    #[error("shader node {0} does not exist")]
    UnknownNode(usize),
    #[error("shader node '{node}' has no socket '{socket}'")]
    UnknownSocket { node: &'static str, socket: String },
    #[error("input '{socket}' of shader node {node} is already linked")]
    InputAlreadyLinked { node: usize, socket: &'static str },
    #[error("cannot link a {from} output to a {to} input")]
    SocketTypeMismatch {
        from: &'static str,
        to: &'static str,
    },
    #[error("stale native {0} handle")]
    StaleHandle(&'static str),
    #[error("unsupported image data type {0}")]
    UnsupportedImageType(String),
    #[error("image payload has {got} bytes but {expected} are required")]
    ImageSizeMismatch { got: usize, expected: usize },
}

/// Errors raised while creating a device.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no compute device is available for rendering")]
    NoComputeDevice,
    #[error("native renderer error: {0}")]
    Native(#[from] NativeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeviceError::NoComputeDevice;
        assert_eq!(err.to_string(), "no compute device is available for rendering");

        let err = NativeError::InputAlreadyLinked {
            node: 3,
            socket: "Base Color",
        };
        assert_eq!(
            err.to_string(),
            "input 'Base Color' of shader node 3 is already linked"
        );
    }

    #[test]
    fn test_native_error_converts() {
        let err: DeviceError = NativeError::StaleHandle("shader").into();
        assert!(matches!(err, DeviceError::Native(_)));
    }
}
