// Copyright 2025-2026 CEMAXECUTER LLC

mod pipeline;
mod profile;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rsp_sdr::mock::MockApi;
use rsp_sdr::types::DECIMATION_FACTORS;
use rsp_sdr::{Device, DeviceInfo, SdrApi};

use crate::pipeline::Limits;
use crate::profile::Profile;

#[derive(Parser, Debug)]
#[command(name = "rsp-stream")]
#[command(about = "IQ streamer for SDRplay RSP receivers")]
struct Cli {
    /// List attached receivers and exit
    #[arg(short = 'l', long)]
    list: bool,

    /// Receiver to open: serial number or enumeration index
    #[arg(short = 'd', long)]
    device: Option<String>,

    /// JSON capture profile; flags given here override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Center frequency in MHz
    #[arg(short = 'c', long)]
    center_freq: Option<f64>,

    /// Sample rate in MS/s
    #[arg(short = 'r', long)]
    sample_rate: Option<f64>,

    /// IF bandwidth in kHz
    #[arg(short = 'b', long)]
    bandwidth: Option<u32>,

    /// Gain reduction in dB
    #[arg(short = 'g', long)]
    gain_reduction: Option<i32>,

    /// LNA state
    #[arg(long)]
    lna: Option<u8>,

    /// Enable AGC
    #[arg(long)]
    agc: bool,

    /// Hardware decimation factor: 1, 2, 4, 8, 16, 32
    #[arg(long)]
    decimation: Option<u8>,

    /// Enable bias-T power
    #[arg(long)]
    bias_t: bool,

    /// Enable HDR mode (RSPdxR2)
    #[arg(long)]
    hdr: bool,

    /// Stop after this many seconds
    #[arg(short = 't', long)]
    duration: Option<f64>,

    /// Stop after this many complex samples
    #[arg(short = 'n', long)]
    samples: Option<u64>,

    /// ci16 output file
    #[arg(short = 'w', long)]
    write: Option<PathBuf>,

    /// Use the built-in simulated receivers instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Print statistics
    #[arg(long)]
    stats: bool,
}

impl Cli {
    fn apply_to(&self, profile: &mut Profile) -> Result<(), String> {
        if let Some(ref d) = self.device {
            profile.device = Some(d.clone());
        }
        let tuner = &mut profile.tuner;
        if let Some(mhz) = self.center_freq {
            tuner.frequency_hz = mhz * 1e6;
        }
        if let Some(msps) = self.sample_rate {
            tuner.sample_rate_hz = msps * 1e6;
        }
        if let Some(khz) = self.bandwidth {
            tuner.bandwidth_khz = khz;
        }
        if let Some(gr) = self.gain_reduction {
            tuner.gain_reduction_db = gr;
        }
        if let Some(lna) = self.lna {
            tuner.lna_state = lna;
        }
        tuner.agc |= self.agc;
        tuner.bias_t |= self.bias_t;
        tuner.hdr_mode |= self.hdr;

        if let Some(factor) = self.decimation {
            if !DECIMATION_FACTORS.contains(&factor) {
                return Err(format!(
                    "invalid decimation factor {} (use 1, 2, 4, 8, 16 or 32)",
                    factor
                ));
            }
            profile.streaming.decimate = factor > 1;
            profile.streaming.decimation_factor = factor;
        }
        Ok(())
    }

    fn limits(&self) -> Limits {
        Limits {
            duration: self.duration.map(Duration::from_secs_f64),
            samples: self.samples,
        }
    }
}

fn open_api(simulate: bool) -> Result<Arc<dyn SdrApi>, String> {
    if simulate {
        return Ok(Arc::new(MockApi::simulator(100.0e3)));
    }
    #[cfg(feature = "sdrplay-api")]
    {
        Ok(Arc::new(rsp_sdr::sdrplay::SdrplayApi::new()))
    }
    #[cfg(not(feature = "sdrplay-api"))]
    {
        Err("built without SDRplay API support \
             (rebuild with --features sdrplay-api, or use --simulate)"
            .into())
    }
}

fn pick_device<'a>(
    devices: &'a [DeviceInfo],
    wanted: Option<&str>,
) -> Result<&'a DeviceInfo, String> {
    let Some(wanted) = wanted else {
        return devices.first().ok_or_else(|| "no RSP devices found".to_string());
    };
    if let Some(dev) = devices.iter().find(|d| d.serial_number == wanted) {
        return Ok(dev);
    }
    match wanted.parse::<usize>() {
        Ok(index) => devices.get(index).ok_or_else(|| {
            format!(
                "device index {} out of range ({} found)",
                index,
                devices.len()
            )
        }),
        Err(_) => Err(format!("no device with serial {}", wanted)),
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let mut profile = match cli.config {
        Some(ref path) => Profile::load(path)?,
        None => Profile::default(),
    };
    cli.apply_to(&mut profile)?;

    let api = open_api(cli.simulate)?;
    let mut device = Device::with_config(api, profile.stream);

    if cli.verbose {
        match device.api_version() {
            Ok(v) => log::info!("SDRplay API version {:.2}", v),
            Err(e) => log::warn!("could not read API version: {}", e),
        }
    }

    let devices = device
        .available_devices()
        .map_err(|e| format!("device enumeration failed: {}", e))?;

    if cli.list {
        if devices.is_empty() {
            println!("no RSP devices found");
        }
        for (i, d) in devices.iter().enumerate() {
            println!(
                "{}: {} serial {}{}",
                i,
                d.model(),
                d.serial_number,
                if d.valid { "" } else { " (busy)" }
            );
        }
        return Ok(());
    }

    let info = pick_device(&devices, profile.device.as_deref())?.clone();
    device
        .select_device(&info)
        .map_err(|e| format!("failed to select {} {}: {}", info.model(), info.serial_number, e))?;
    device
        .configure(&profile.tuner)
        .map_err(|e| format!("failed to configure {}: {}", info.serial_number, e))?;

    if cli.verbose {
        log::info!("rsp-stream starting");
        log::info!("device: {} serial {}", info.model(), info.serial_number);
        log::info!("center frequency: {:.6} MHz", profile.tuner.frequency_hz / 1e6);
        log::info!("sample rate: {:.3} MS/s", profile.tuner.sample_rate_hz / 1e6);
    }

    pipeline::run_capture(
        device,
        &profile,
        cli.limits(),
        cli.write.as_deref(),
        cli.stats,
    )
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(serial: &str) -> DeviceInfo {
        DeviceInfo {
            serial_number: serial.into(),
            ..DeviceInfo::default()
        }
    }

    #[test]
    fn test_flags_override_profile() {
        let cli = Cli::parse_from([
            "rsp-stream",
            "-c",
            "1090",
            "-r",
            "8",
            "--decimation",
            "4",
            "--bias-t",
        ]);
        let mut profile = Profile::default();
        profile.tuner.lna_state = 3;
        cli.apply_to(&mut profile).unwrap();
        assert_eq!(profile.tuner.frequency_hz, 1090.0e6);
        assert_eq!(profile.tuner.sample_rate_hz, 8.0e6);
        assert_eq!(profile.tuner.lna_state, 3);
        assert!(profile.tuner.bias_t);
        assert!(profile.streaming.decimate);
        assert_eq!(profile.streaming.decimation_factor, 4);
    }

    #[test]
    fn test_bad_decimation_rejected() {
        let cli = Cli::parse_from(["rsp-stream", "--decimation", "3"]);
        assert!(cli.apply_to(&mut Profile::default()).is_err());
    }

    #[test]
    fn test_pick_device() {
        let devs = [info("A1"), info("B2")];
        assert_eq!(pick_device(&devs, None).unwrap().serial_number, "A1");
        assert_eq!(pick_device(&devs, Some("B2")).unwrap().serial_number, "B2");
        assert_eq!(pick_device(&devs, Some("1")).unwrap().serial_number, "B2");
        assert!(pick_device(&devs, Some("5")).is_err());
        assert!(pick_device(&devs, Some("C3")).is_err());
        assert!(pick_device(&[], None).is_err());
    }
}
