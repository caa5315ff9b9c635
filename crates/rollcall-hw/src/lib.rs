//! rollcall-hw — Frame sources for the recognition loop.
//!
//! Provides V4L2 webcam capture with YUYV/GREY to RGB conversion, and a
//! directory replay source for offline runs.

pub mod camera;
pub mod frame;
pub mod replay;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use replay::{ReplayError, ReplayFeed};
