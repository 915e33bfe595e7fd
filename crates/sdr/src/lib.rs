// Copyright 2025-2026 CEMAXECUTER LLC

//! Streaming core for SDRplay RSP receivers.
//!
//! [`Device`] is the application entry point. Underneath it a family-specific
//! [`DeviceControl`] (built by the [`DeviceRegistry`]) sequences the vendor
//! SDK behind the [`SdrApi`] trait, and a [`CallbackDispatcher`] moves
//! samples from the driver thread into a bounded [`SampleBuffer`].

pub mod api;
pub mod buffer;
pub mod control;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod mock;
pub mod params;
pub mod registry;
#[cfg(feature = "sdrplay-api")]
pub mod sdrplay;
pub mod source;
pub mod types;

use crossbeam::channel::Sender;

pub use api::{ApiError, DeviceParams, SdrApi, UpdateReason};
pub use buffer::SampleBuffer;
pub use control::{Capabilities, DeviceControl, DeviceState, Rsp1aControl, RspDxR2Control};
pub use device::Device;
pub use dispatch::CallbackDispatcher;
pub use error::{Error, ErrorCode, Result};
pub use params::{BasicParams, ControlParams, Rsp1aParams, RspDxR2Params, TunerConfig};
pub use registry::DeviceRegistry;
pub use source::RspSource;
pub use types::{DeviceInfo, EventParams, EventType, Sample, StreamConfig, StreamingParams};

/// Sample buffer: a block of interleaved int16 IQ samples
pub struct SampleBuf {
    /// Interleaved I,Q,I,Q,... as i16
    pub data: Vec<i16>,
    /// Number of complex samples (data.len() / 2)
    pub num_samples: usize,
}

/// Common trait for streaming sources
pub trait SdrSource: Send {
    /// Start streaming samples into the channel.
    /// This function should run until stop() is called or an error occurs.
    fn start(&mut self, tx: Sender<SampleBuf>) -> Result<()>;

    /// Signal the source to stop streaming
    fn stop(&mut self);

    /// Get the sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Get the center frequency in Hz
    fn center_frequency(&self) -> u64;
}
