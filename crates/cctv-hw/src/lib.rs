//! cctv-hw — client for the networked camera peripheral.
//!
//! Polls the ESP32-CAM's status endpoint with bounded retry and drives its
//! buzzer through the control endpoint.

pub mod buzzer;
pub mod camera;

pub use camera::{Esp32Cam, PeripheralError, PeripheralStatus, RetryPolicy};
