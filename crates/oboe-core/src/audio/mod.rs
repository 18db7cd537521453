//! Audio backends
//!
//! Supports multiple backends:
//! - **JACK** (Linux): Native JACK client with one port per channel
//! - **CPAL**: Cross-platform (ALSA/PulseAudio/PipeWire, WASAPI, CoreAudio)
//! - **Null**: Timer-driven virtual device for headless use and tests
//!
//! All backends negotiate a [`StreamGeometry`] and drive the stream's
//! callback core; see [`open_endpoint`] for selection and fallback.

mod backend;
mod cpal_backend;
mod device;
mod null_backend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_backend;

pub use backend::{open_endpoint, BackendKind, EndpointHandle, StreamGeometry, StreamRequest};
pub use device::{find_device, list_devices, AudioDevice};
pub use null_backend::NULL_SAMPLE_RATE;
