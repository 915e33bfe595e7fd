// Copyright 2025-2026 CEMAXECUTER LLC

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rsp_sdr::mock::{MockApi, MockCall};
use rsp_sdr::types::{RSP1A_HWVER, RSPDXR2_HWVER};
use rsp_sdr::{
    Device, DeviceControl, DeviceRegistry, DeviceState, Error, EventType, Rsp1aControl, Sample,
    SdrApi, StreamConfig, StreamingParams,
};

fn rsp1a_control(api: &Arc<MockApi>) -> Box<dyn DeviceControl> {
    let shared: Arc<dyn SdrApi> = api.clone();
    let mut control = DeviceRegistry::global()
        .create_device_control(RSP1A_HWVER, shared)
        .unwrap();
    control.open().unwrap();
    control.select_device(&api.device(0)).unwrap();
    control
}

#[test]
fn test_reset_flagged_batch_reads_back_in_order() {
    let api = Arc::new(MockApi::with_device("1A0001", RSP1A_HWVER));
    let mut control = rsp1a_control(&api);
    control.start_streaming(StreamingParams::default()).unwrap();

    assert!(api.deliver_samples(&[(1, 2), (3, 4), (5, 6), (7, 8)], true));
    assert!(control.wait_for_samples(4, 100));

    let mut out = [Sample::new(0, 0); 4];
    assert_eq!(control.read_samples(&mut out), 4);
    assert_eq!(
        out,
        [
            Sample::new(1, 2),
            Sample::new(3, 4),
            Sample::new(5, 6),
            Sample::new(7, 8)
        ]
    );
    assert!(!control.has_overflow());
}

#[test]
fn test_batches_before_first_reset_are_dropped() {
    let api = Arc::new(MockApi::with_device("1A0001", RSP1A_HWVER));
    let mut control = rsp1a_control(&api);
    control.start_streaming(StreamingParams::default()).unwrap();

    api.deliver_samples(&[(9, 9), (9, 9)], false);
    assert_eq!(control.samples_available(), 0);

    api.deliver_samples(&[(1, 1)], true);
    api.deliver_samples(&[(2, 2)], false);
    assert_eq!(control.samples_available(), 2);
}

#[test]
fn test_start_before_select_is_rejected() {
    let api: Arc<dyn SdrApi> = Arc::new(MockApi::with_device("1A0001", RSP1A_HWVER));
    let mut control = Rsp1aControl::new(api, StreamConfig::default());
    let err = control.start_streaming(StreamingParams::default()).unwrap_err();
    assert!(matches!(err, Error::DeviceNotSelected));
    assert_eq!(control.state(), DeviceState::Closed);
}

#[test]
fn test_second_start_does_not_reinit() {
    let api = Arc::new(MockApi::with_device("1A0001", RSP1A_HWVER));
    let mut control = rsp1a_control(&api);
    control.start_streaming(StreamingParams::default()).unwrap();
    control.start_streaming(StreamingParams::default()).unwrap();
    assert!(control.is_streaming());
    assert_eq!(api.count(|c| *c == MockCall::Init), 1);
}

#[test]
fn test_stop_when_idle_succeeds() {
    let api = Arc::new(MockApi::with_device("1A0001", RSP1A_HWVER));
    let mut control = rsp1a_control(&api);
    control.stop_streaming().unwrap();
    assert_eq!(control.state(), DeviceState::Selected);
    assert_eq!(api.count(|c| *c == MockCall::Uninit), 0);
}

#[test]
fn test_overflow_is_a_flag_not_an_error() {
    let api = Arc::new(MockApi::with_device("1A0001", RSP1A_HWVER));
    let config = StreamConfig {
        buffer_capacity: 8,
        ..StreamConfig::default()
    };
    let shared: Arc<dyn SdrApi> = api.clone();
    let mut control = DeviceRegistry::global()
        .create_with_config(RSP1A_HWVER, shared, config)
        .unwrap();
    control.open().unwrap();
    control.select_device(&api.device(0)).unwrap();
    control.start_streaming(StreamingParams::default()).unwrap();

    api.deliver_samples(&[(1, 1); 5], true);
    api.deliver_samples(&[(2, 2); 5], false);
    assert!(control.has_overflow());
    assert_eq!(control.samples_available(), 5);

    control.reset_buffer();
    assert!(!control.has_overflow());
    assert_eq!(control.samples_available(), 0);
    assert!(control.is_streaming());
}

#[test]
fn test_callbacks_see_samples_and_events() {
    let api = Arc::new(MockApi::with_device("DX0001", RSPDXR2_HWVER));
    let mut dev = Device::new(api.clone());
    dev.select_device(&api.device(0)).unwrap();

    let batches = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let batches = batches.clone();
        dev.set_sample_callback(Box::new(move |s| batches.lock().unwrap().push(s.to_vec())))
            .unwrap();
        let events = events.clone();
        dev.set_event_callback(Box::new(move |t, p| events.lock().unwrap().push((t, *p))))
            .unwrap();
    }
    dev.start_streaming(StreamingParams::default()).unwrap();

    api.deliver_samples(&[(1, -1), (2, -2)], true);
    api.deliver_gain_change(40, 12, 35.5);
    api.deliver_overload(true);

    assert_eq!(
        *batches.lock().unwrap(),
        vec![vec![Sample::new(1, -1), Sample::new(2, -2)]]
    );
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, EventType::GainChange);
    assert_eq!(events[0].1.gain_reduction_db, 40);
    assert_eq!(events[0].1.current_gain_db, 35.5);
    assert_eq!(events[1].0, EventType::PowerOverload);
    assert!(events[1].1.overload_detected);
}

#[test]
fn test_consumer_thread_waits_for_producer() {
    let api = Arc::new(MockApi::with_device("1A0001", RSP1A_HWVER));
    let mut control = rsp1a_control(&api);
    control.start_streaming(StreamingParams::default()).unwrap();
    let dispatcher = control.dispatcher().clone();

    let producer = {
        let api = api.clone();
        thread::spawn(move || {
            api.deliver_samples(&[(0, 0); 100], true);
            for _ in 0..9 {
                thread::sleep(Duration::from_millis(2));
                api.deliver_samples(&[(0, 0); 100], false);
            }
        })
    };

    assert!(dispatcher.wait_for_samples(1000, 0));
    assert_eq!(control.samples_available(), 1000);
    producer.join().unwrap();
}

#[test]
fn test_simulated_session_end_to_end() {
    let api = Arc::new(MockApi::simulator(25.0e3));
    let mut dev = Device::new(api.clone());
    let devices = dev.available_devices().unwrap();
    assert_eq!(devices.len(), 2);

    dev.select_device(&devices[0]).unwrap();
    dev.apply_defaults().unwrap();
    dev.start_streaming(StreamingParams::default()).unwrap();

    assert!(dev.wait_for_samples(10_000, 2000));
    let mut out = vec![Sample::new(0, 0); 10_000];
    assert_eq!(dev.read_samples(&mut out), 10_000);
    assert!(out.iter().any(|s| s.im != 0));

    dev.stop_streaming().unwrap();
    dev.release_device().unwrap();
    assert_eq!(dev.state(), DeviceState::Closed);
}
