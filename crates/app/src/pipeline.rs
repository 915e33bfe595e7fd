// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use num_complex::Complex;

use rsp_sdr::{Device, RspSource, SampleBuf, SdrSource};

use crate::profile::Profile;

/// When to end a capture. With neither set, capture runs until the source
/// fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    pub duration: Option<Duration>,
    pub samples: Option<u64>,
}

/// Running signal statistics.
#[derive(Debug, Default)]
struct Stats {
    samples: u64,
    blocks: u64,
    energy: f64,
    peak: f32,
    clipped: u64,
}

impl Stats {
    fn add(&mut self, buf: &SampleBuf) {
        self.blocks += 1;
        self.samples += buf.num_samples as u64;
        for iq in buf.data.chunks_exact(2) {
            if iq[0] == i16::MIN || iq[0] == i16::MAX || iq[1] == i16::MIN || iq[1] == i16::MAX {
                self.clipped += 1;
            }
            let s = Complex::new(iq[0] as f32, iq[1] as f32) / 32768.0;
            let p = s.norm_sqr();
            self.energy += p as f64;
            if p > self.peak {
                self.peak = p;
            }
        }
    }

    fn mean_dbfs(&self) -> f64 {
        if self.samples == 0 {
            return f64::NEG_INFINITY;
        }
        10.0 * (self.energy / self.samples as f64).log10()
    }

    fn peak_dbfs(&self) -> f64 {
        10.0 * (self.peak as f64).log10()
    }
}

fn write_ci16<W: Write>(out: &mut W, buf: &SampleBuf) -> std::io::Result<()> {
    for v in &buf.data {
        out.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Stream from the selected device into an optional ci16 file.
pub fn run_capture(
    device: Device,
    profile: &Profile,
    limits: Limits,
    out_path: Option<&Path>,
    print_stats: bool,
) -> Result<(), String> {
    let mut source = RspSource::new(device, profile.streaming, profile.block_size)
        .map_err(|e| format!("failed to set up stream: {}", e))?;
    let sample_rate = source.sample_rate();
    let running = source.running_flag();

    let mut writer: Option<BufWriter<File>> = match out_path {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
            log::info!("writing ci16 samples to {}", path.display());
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let (tx, rx) = channel::bounded(64);
    let source_thread = std::thread::spawn(move || {
        let result = source.start(tx);
        if let Err(ref e) = result {
            log::error!("RSP source error: {}", e);
        }
        (result, source.dropped_blocks())
    });

    let mut stats = Stats::default();
    let start = Instant::now();
    let mut last_stats = Instant::now();
    let mut write_err = None;

    loop {
        let buf = match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(buf) => buf,
            Err(RecvTimeoutError::Timeout) => {
                if limits.duration.is_some_and(|d| start.elapsed() >= d) {
                    running.store(false, Ordering::SeqCst);
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // blocks still in flight after a stop request are discarded
        if !running.load(Ordering::SeqCst) {
            continue;
        }

        let mut buf = buf;
        if let Some(limit) = limits.samples {
            let remaining = limit.saturating_sub(stats.samples) as usize;
            if buf.num_samples > remaining {
                buf.num_samples = remaining;
                buf.data.truncate(remaining * 2);
            }
        }

        stats.add(&buf);
        if let Some(ref mut w) = writer {
            if let Err(e) = write_ci16(w, &buf) {
                write_err = Some(format!("write failed: {}", e));
                running.store(false, Ordering::SeqCst);
            }
        }

        let done_samples = limits.samples.is_some_and(|n| stats.samples >= n);
        let done_time = limits.duration.is_some_and(|d| start.elapsed() >= d);
        if done_samples || done_time {
            running.store(false, Ordering::SeqCst);
        }

        // Print stats every 5 seconds
        if print_stats && last_stats.elapsed().as_secs() >= 5 {
            eprintln!(
                "[{:.1}s] samples: {} blocks: {} mean: {:.1} dBFS peak: {:.1} dBFS clipped: {}",
                start.elapsed().as_secs_f64(),
                stats.samples,
                stats.blocks,
                stats.mean_dbfs(),
                stats.peak_dbfs(),
                stats.clipped,
            );
            last_stats = Instant::now();
        }
    }

    if let Some(mut w) = writer {
        w.flush().map_err(|e| format!("flush failed: {}", e))?;
    }

    let (result, dropped) = source_thread
        .join()
        .map_err(|_| "RSP source thread panicked".to_string())?;

    if print_stats {
        let elapsed = start.elapsed().as_secs_f64();
        eprintln!(
            "done ({:.1}s): samples: {} ({:.3} MS/s nominal {:.3}) mean: {:.1} dBFS \
             peak: {:.1} dBFS clipped: {} dropped blocks: {}",
            elapsed,
            stats.samples,
            stats.samples as f64 / elapsed.max(1e-9) / 1e6,
            sample_rate as f64 / 1e6,
            stats.mean_dbfs(),
            stats.peak_dbfs(),
            stats.clipped,
            dropped,
        );
    }

    if let Some(e) = write_err {
        return Err(e);
    }
    result.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsp_sdr::mock::MockApi;
    use std::sync::Arc;

    #[test]
    fn test_stats_power() {
        let mut stats = Stats::default();
        stats.add(&SampleBuf {
            data: vec![16384, 0, 0, 16384],
            num_samples: 2,
        });
        // |0.5|^2 = 0.25 -> about -6 dBFS
        assert!((stats.mean_dbfs() + 6.02).abs() < 0.01);
        assert!((stats.peak_dbfs() + 6.02).abs() < 0.01);
        assert_eq!(stats.clipped, 0);
    }

    #[test]
    fn test_ci16_is_little_endian() {
        let mut out = Vec::new();
        write_ci16(
            &mut out,
            &SampleBuf {
                data: vec![1, -2],
                num_samples: 1,
            },
        )
        .unwrap();
        assert_eq!(out, vec![0x01, 0x00, 0xfe, 0xff]);
    }

    #[test]
    fn test_capture_stops_at_sample_limit() {
        let api = Arc::new(MockApi::simulator(10.0e3));
        let mut device = Device::new(api.clone());
        device.select_device(&api.device(0)).unwrap();

        let profile = Profile {
            block_size: 1000,
            ..Profile::default()
        };
        let limits = Limits {
            duration: Some(Duration::from_secs(5)),
            samples: Some(2500),
        };
        let path = std::env::temp_dir().join(format!("rsp-capture-{}.ci16", std::process::id()));
        run_capture(device, &profile, limits, Some(&path), false).unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let _ = std::fs::remove_file(&path);
        assert_eq!(len, 2500 * 4);
    }
}
