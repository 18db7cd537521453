//! Oboe Core - Low-latency audio streams
//!
//! Open a stream with a [`StreamBuilder`], then move audio with blocking
//! `read`/`write` calls, optionally from a real-time thread created with
//! [`thread::create_audio_thread`].
//!
//! ```no_run
//! use oboe_core::{StreamBuilder, NANOS_PER_MILLISECOND};
//!
//! let stream = StreamBuilder::new().open_stream()?;
//! stream.request_start()?;
//! let samples = stream.frames_per_burst() as usize * stream.samples_per_frame() as usize;
//! let burst = vec![0.0f32; samples];
//! stream.write(&burst, stream.frames_per_burst(), 10 * NANOS_PER_MILLISECOND)?;
//! stream.close()?;
//! # Ok::<(), oboe_core::OboeError>(())
//! ```

pub mod audio;
pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod stream;
pub mod text;
pub mod thread;
pub mod types;

pub use audio::BackendKind;
pub use builder::StreamBuilder;
pub use error::{OboeError, OboeResult};
pub use stream::Stream;
pub use types::*;
