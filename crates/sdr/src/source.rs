// Copyright 2025-2026 CEMAXECUTER LLC

use crossbeam::channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::types::{EventType, Sample, StreamingParams};
use crate::{SampleBuf, SdrSource};

/// How long one buffer wait may block before the running flag is rechecked
const POLL_MS: u32 = 100;

/// Pumps a selected RSP's sample buffer into a block channel.
pub struct RspSource {
    device: Device,
    params: StreamingParams,
    block_size: usize,
    running: Arc<AtomicBool>,
    dropped_blocks: u64,
}

impl RspSource {
    /// `device` must already have a unit selected and tuned.
    pub fn new(device: Device, params: StreamingParams, block_size: usize) -> Result<Self> {
        if device.current_device().is_none() {
            return Err(Error::DeviceNotSelected);
        }
        if block_size == 0 {
            return Err(Error::InvalidParameter("block size must be non-zero".into()));
        }
        // a block larger than the ring can never become available
        let capacity = device.buffer_capacity();
        if block_size > capacity {
            return Err(Error::InvalidParameter(format!(
                "block size {} exceeds sample buffer capacity {}",
                block_size, capacity
            )));
        }
        Ok(Self {
            device,
            params,
            block_size,
            running: Arc::new(AtomicBool::new(false)),
            dropped_blocks: 0,
        })
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Blocks the consumer could not take in time.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Give the device back, e.g. to release it explicitly.
    pub fn into_device(self) -> Device {
        self.device
    }

    fn pump(&mut self, tx: &Sender<SampleBuf>, removed: &AtomicBool) -> Result<()> {
        let mut scratch = vec![Sample::new(0, 0); self.block_size];

        while self.running.load(Ordering::SeqCst) {
            if removed.load(Ordering::Acquire) {
                return Err(Error::Streaming("device removed".into()));
            }
            if !self.device.wait_for_samples(self.block_size, POLL_MS)
                && !(self.device.has_overflow() && self.device.samples_available() > 0)
            {
                // a saturated ring may never reach a full block, so what is
                // there is drained as a short one
                continue;
            }

            let n = self.device.read_samples(&mut scratch);
            if n == 0 {
                continue;
            }
            let mut data = Vec::with_capacity(n * 2);
            for s in &scratch[..n] {
                data.push(s.re);
                data.push(s.im);
            }

            match tx.try_send(SampleBuf {
                data,
                num_samples: n,
            }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped_blocks += 1;
                    if self.dropped_blocks == 1 {
                        log::warn!("consumer is not keeping up, dropping sample blocks");
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!("sample channel closed");
                    break;
                }
            }
        }
        Ok(())
    }
}

impl SdrSource for RspSource {
    fn start(&mut self, tx: Sender<SampleBuf>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.dropped_blocks = 0;

        let removed = Arc::new(AtomicBool::new(false));
        {
            let removed = removed.clone();
            self.device.set_event_callback(Box::new(move |event, params| {
                match event {
                    EventType::DeviceRemoved => removed.store(true, Ordering::Release),
                    EventType::PowerOverload if params.overload_detected => {
                        log::warn!("RSP power overload detected")
                    }
                    _ => {}
                }
            }))?;
        }

        self.device.start_streaming(self.params)?;
        log::info!(
            "RSP streaming started ({:.3} MHz, {} S/s)",
            self.device.frequency() / 1e6,
            self.sample_rate()
        );

        let result = self.pump(&tx, &removed);
        self.running.store(false, Ordering::SeqCst);

        let stopped = self.device.stop_streaming();
        if self.device.has_overflow() {
            log::warn!("RSP sample buffer overflowed during capture");
        }
        log::info!("RSP streaming stopped");
        result.and(stopped)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Output rate after decimation.
    fn sample_rate(&self) -> u32 {
        let factor = if self.params.decimate {
            self.params.decimation_factor.max(1) as f64
        } else {
            1.0
        };
        (self.device.sample_rate() / factor) as u32
    }

    fn center_frequency(&self) -> u64 {
        self.device.frequency() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockApi;
    use crate::types::{StreamConfig, RSP1A_HWVER};
    use crossbeam::channel::bounded;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_requires_selected_device() {
        let api = Arc::new(MockApi::with_device("1A", RSP1A_HWVER));
        let dev = Device::new(api);
        assert!(matches!(
            RspSource::new(dev, StreamingParams::default(), 1024),
            Err(Error::DeviceNotSelected)
        ));
    }

    #[test]
    fn test_block_must_fit_buffer() {
        let api = Arc::new(MockApi::simulator(50.0e3));
        let config = StreamConfig {
            buffer_capacity: 1024,
            ..StreamConfig::default()
        };
        let selected = || {
            let mut dev = Device::with_config(api.clone(), config);
            dev.select_device(&api.device(0)).unwrap();
            dev
        };

        let dev = selected();
        assert_eq!(dev.buffer_capacity(), 1023);
        match RspSource::new(dev, StreamingParams::default(), 4096) {
            Err(Error::InvalidParameter(msg)) => assert!(msg.contains("4096")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("oversized block accepted"),
        }

        // simulated batches never fill the ring exactly, so blocks come out short
        let mut src = RspSource::new(selected(), StreamingParams::default(), 1023).unwrap();
        let running = src.running_flag();
        let (tx, rx) = bounded(4);
        let worker = thread::spawn(move || src.start(tx));
        let block = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(block.num_samples > 0 && block.num_samples <= 1023);
        assert_eq!(block.data.len(), block.num_samples * 2);
        running.store(false, Ordering::SeqCst);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_reported_rate_includes_decimation() {
        let api = Arc::new(MockApi::with_device("1A", RSP1A_HWVER));
        let mut dev = Device::new(api.clone());
        dev.select_device(&api.device(0)).unwrap();
        dev.set_sample_rate(8.0e6).unwrap();
        let params = StreamingParams {
            decimate: true,
            decimation_factor: 4,
            ..StreamingParams::default()
        };
        let src = RspSource::new(dev, params, 1024).unwrap();
        assert_eq!(src.sample_rate(), 2_000_000);
        assert_eq!(src.center_frequency(), 100_000_000);
    }

    #[test]
    fn test_streams_interleaved_blocks() {
        let api = Arc::new(MockApi::simulator(50.0e3));
        let mut dev = Device::new(api.clone());
        dev.select_device(&api.device(0)).unwrap();

        let mut src = RspSource::new(dev, StreamingParams::default(), 4096).unwrap();
        let running = src.running_flag();
        let (tx, rx) = bounded(16);

        let worker = thread::spawn(move || {
            let result = src.start(tx);
            (result, src)
        });

        let block = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(block.num_samples, 4096);
        assert_eq!(block.data.len(), 8192);

        running.store(false, Ordering::SeqCst);
        let (result, src) = worker.join().unwrap();
        result.unwrap();
        assert!(!src.device().is_streaming());
    }

    #[test]
    fn test_device_removal_ends_stream() {
        let api = Arc::new(MockApi::with_device("1A", RSP1A_HWVER));
        let mut dev = Device::new(api.clone());
        dev.select_device(&api.device(0)).unwrap();
        let mut src = RspSource::new(dev, StreamingParams::default(), 64).unwrap();
        let (tx, _rx) = bounded(4);

        let remover = {
            let api = api.clone();
            thread::spawn(move || {
                while !api.deliver_device_removed() {
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let err = src.start(tx).unwrap_err();
        assert!(matches!(err, Error::Streaming(_)));
        remover.join().unwrap();
    }
}
