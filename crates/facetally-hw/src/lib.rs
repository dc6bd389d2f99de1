//! Webcam capture for the recognition loop.
//!
//! Provides V4L2-based camera access and a `FrameSource` seam so the
//! capture loop can be driven by synthetic frames in tests.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, PixelFormat};
pub use frame::Frame;
