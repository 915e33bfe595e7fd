// Copyright 2025-2026 CEMAXECUTER LLC

//! Bridge between the driver's C callbacks and the sample buffer.
//!
//! The driver calls [`stream_callback`] / [`event_callback`] on its own
//! thread with the opaque context obtained from
//! [`CallbackDispatcher::context`]. Samples are zipped into
//! [`Sample`]s, pushed into the [`SampleBuffer`], and then handed to the
//! user's sample callback, if one is registered.
//!
//! User callbacks run synchronously on the driver thread. They must not
//! block and must not call back into the device control (stopping the
//! stream from inside a stream callback is not supported).

use std::os::raw::{c_int, c_short, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::buffer::SampleBuffer;
use crate::ffi::{
    SdrplayEventParams, SdrplayStreamCbParams, SDRPLAY_EVENT_DEVICE_REMOVED,
    SDRPLAY_EVENT_GAIN_CHANGE, SDRPLAY_EVENT_POWER_OVERLOAD_CHANGE,
    SDRPLAY_EVENT_RSPDUO_MODE_CHANGE, SDRPLAY_OVERLOAD_DETECTED,
};
use crate::types::{EventParams, EventType, Sample, StreamConfig, TunerSelect};

/// Receives every batch of samples accepted from the driver.
pub type SampleCallback = Box<dyn FnMut(&[Sample]) + Send>;

/// Receives every classified driver event.
pub type EventCallback = Box<dyn FnMut(EventType, &EventParams) + Send>;

#[derive(Default)]
struct Callbacks {
    sample: Option<SampleCallback>,
    event: Option<EventCallback>,
}

/// Converts driver callbacks into buffered samples and user notifications.
pub struct CallbackDispatcher {
    buffer: SampleBuffer,
    active: AtomicBool,
    drop_until_reset: bool,
    callbacks: Mutex<Callbacks>,
    // I/Q zip scratch, only touched from the driver thread
    scratch: Mutex<Vec<Sample>>,
    dropped_batches: AtomicU64,
}

impl CallbackDispatcher {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            buffer: SampleBuffer::new(config.buffer_capacity),
            active: AtomicBool::new(false),
            drop_until_reset: config.drop_until_reset,
            callbacks: Mutex::new(Callbacks::default()),
            scratch: Mutex::new(Vec::with_capacity(8192)),
            dropped_batches: AtomicU64::new(0),
        }
    }

    fn callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.callbacks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opaque context pointer handed to the driver alongside the trampolines.
    ///
    /// The pointer stays valid for as long as any `Arc` to this dispatcher is
    /// alive; the device control holds one for the whole streaming session.
    pub fn context(self: &Arc<Self>) -> *mut c_void {
        Arc::as_ptr(self) as *mut c_void
    }

    /// Prepare for a new streaming session.
    pub fn arm(&self) {
        self.buffer.reset();
        self.dropped_batches.store(0, Ordering::Relaxed);
        self.active.store(!self.drop_until_reset, Ordering::Release);
    }

    /// Stop accepting samples until the next reset.
    pub fn disarm(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Whether incoming stream callbacks are currently buffered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_sample_callback(&self, callback: SampleCallback) {
        self.callbacks().sample = Some(callback);
    }

    pub fn clear_sample_callback(&self) {
        self.callbacks().sample = None;
    }

    pub fn has_sample_callback(&self) -> bool {
        self.callbacks().sample.is_some()
    }

    pub fn set_event_callback(&self, callback: EventCallback) {
        self.callbacks().event = Some(callback);
    }

    pub fn clear_event_callback(&self) {
        self.callbacks().event = None;
    }

    /// Handle one stream callback.
    pub fn on_stream(&self, xi: &[i16], xq: &[i16], reset: bool) {
        if reset {
            self.buffer.reset();
            self.dropped_batches.store(0, Ordering::Relaxed);
            self.active.store(true, Ordering::Release);
        }

        if !self.active.load(Ordering::Acquire) {
            return;
        }

        let n = xi.len().min(xq.len());
        let mut scratch = self.scratch.lock().unwrap_or_else(|e| e.into_inner());
        scratch.clear();
        scratch.extend(
            xi[..n]
                .iter()
                .zip(&xq[..n])
                .map(|(&i, &q)| Sample::new(i, q)),
        );

        if !self.buffer.write(&scratch)
            && self.dropped_batches.fetch_add(1, Ordering::Relaxed) == 0
        {
            log::warn!(
                "sample buffer overflow: dropped {} samples ({} buffered)",
                n,
                self.buffer.available()
            );
        }

        // direct subscribers still get the batch when the buffer is saturated
        if let Some(cb) = self.callbacks().sample.as_mut() {
            cb(&scratch[..]);
        }
    }

    /// Handle one event callback.
    pub fn on_event(&self, event_type: EventType, params: EventParams) {
        if event_type == EventType::DeviceRemoved {
            log::warn!("device removed, streaming halted");
            self.active.store(false, Ordering::Release);
        }

        if let Some(cb) = self.callbacks().event.as_mut() {
            cb(event_type, &params);
        }
    }

    pub fn wait_for_samples(&self, count: usize, timeout_ms: u32) -> bool {
        self.buffer.wait_for_samples(count, timeout_ms)
    }

    pub fn read_samples(&self, dest: &mut [Sample]) -> usize {
        self.buffer.read(dest)
    }

    pub fn samples_available(&self) -> usize {
        self.buffer.available()
    }

    pub fn has_overflow(&self) -> bool {
        self.buffer.overflow()
    }

    pub fn reset_buffer(&self) {
        self.buffer.reset();
    }

    /// Batches dropped by the buffer since the last reset.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }
}

/// Map a vendor event id and its parameter union to our event model.
///
/// # Safety
///
/// `params`, when non-null, must point to a `sdrplay_api_EventParamsT`
/// whose active member matches `event_id`.
pub unsafe fn classify_event(
    event_id: c_int,
    params: *const SdrplayEventParams,
) -> (EventType, EventParams) {
    let mut out = EventParams::default();
    let params = params.as_ref();

    let event_type = match event_id {
        SDRPLAY_EVENT_GAIN_CHANGE => {
            if let Some(p) = params {
                out.gain_reduction_db = p.gain_params.gr_db;
                out.lna_gain_reduction_db = p.gain_params.lna_gr_db;
                out.current_gain_db = p.gain_params.curr_gain;
            }
            EventType::GainChange
        }
        SDRPLAY_EVENT_POWER_OVERLOAD_CHANGE => {
            if let Some(p) = params {
                out.overload_detected =
                    p.power_overload_params.power_overload_change_type == SDRPLAY_OVERLOAD_DETECTED;
            }
            EventType::PowerOverload
        }
        SDRPLAY_EVENT_DEVICE_REMOVED => {
            out.device_removed = true;
            EventType::DeviceRemoved
        }
        SDRPLAY_EVENT_RSPDUO_MODE_CHANGE => EventType::RspDuoModeChange,
        _ => EventType::None,
    };

    (event_type, out)
}

/// Stream A/B trampoline registered with `sdrplay_api_Init`.
///
/// # Safety
///
/// `cb_context` must be null or the value returned by
/// [`CallbackDispatcher::context`] for a dispatcher that is still alive;
/// `xi` and `xq` must each point to `num_samples` readable values.
pub unsafe extern "C" fn stream_callback(
    xi: *mut c_short,
    xq: *mut c_short,
    _params: *mut SdrplayStreamCbParams,
    num_samples: c_uint,
    reset: c_uint,
    cb_context: *mut c_void,
) {
    if cb_context.is_null() {
        return;
    }
    let dispatcher = &*(cb_context as *const CallbackDispatcher);

    let n = num_samples as usize;
    let (i, q): (&[i16], &[i16]) = if n == 0 || xi.is_null() || xq.is_null() {
        (&[], &[])
    } else {
        (slice::from_raw_parts(xi, n), slice::from_raw_parts(xq, n))
    };

    // never unwind into the driver's C frames
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        dispatcher.on_stream(i, q, reset != 0);
    }));
    if result.is_err() {
        log::error!("panic in stream callback, batch of {} samples lost", n);
    }
}

/// Event trampoline registered with `sdrplay_api_Init`.
///
/// # Safety
///
/// Same context contract as [`stream_callback`]; `params` must satisfy
/// [`classify_event`].
pub unsafe extern "C" fn event_callback(
    event_id: c_int,
    tuner: c_int,
    params: *mut SdrplayEventParams,
    cb_context: *mut c_void,
) {
    if cb_context.is_null() {
        return;
    }
    let dispatcher = &*(cb_context as *const CallbackDispatcher);

    let (event_type, event_params) = classify_event(event_id, params);
    log::debug!(
        "driver event {:?} on tuner {:?}",
        event_type,
        TunerSelect::from_raw(tuner as u32)
    );

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        dispatcher.on_event(event_type, event_params);
    }));
    if result.is_err() {
        log::error!("panic in event callback ({:?})", event_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{SdrplayGainCbParam, SdrplayPowerOverloadCbParam};
    use std::ptr;

    fn dispatcher(capacity: usize) -> Arc<CallbackDispatcher> {
        Arc::new(CallbackDispatcher::new(&StreamConfig {
            buffer_capacity: capacity,
            ..StreamConfig::default()
        }))
    }

    #[test]
    fn test_drops_until_first_reset() {
        let d = dispatcher(64);
        d.arm();
        d.on_stream(&[1, 2], &[3, 4], false);
        assert_eq!(d.samples_available(), 0);

        d.on_stream(&[1, 2], &[3, 4], true);
        assert_eq!(d.samples_available(), 2);
    }

    #[test]
    fn test_no_reset_needed_when_configured() {
        let d = Arc::new(CallbackDispatcher::new(&StreamConfig {
            buffer_capacity: 64,
            drop_until_reset: false,
            ..StreamConfig::default()
        }));
        d.arm();
        d.on_stream(&[7], &[8], false);
        assert_eq!(d.samples_available(), 1);
    }

    #[test]
    fn test_reset_flag_clears_stale_samples() {
        let d = dispatcher(64);
        d.on_stream(&[1, 2, 3], &[1, 2, 3], true);
        d.on_stream(&[9], &[9], true);

        let mut out = [Sample::new(0, 0); 8];
        assert_eq!(d.read_samples(&mut out), 1);
        assert_eq!(out[0], Sample::new(9, 9));
    }

    #[test]
    fn test_sample_callback_sees_batch_even_on_overflow() {
        let d = dispatcher(4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            d.set_sample_callback(Box::new(move |s| seen.lock().unwrap().push(s.len())));
        }

        d.on_stream(&[1, 2, 3, 4, 5], &[1, 2, 3, 4, 5], true);
        assert!(d.has_overflow());
        assert_eq!(d.samples_available(), 0);
        assert_eq!(d.dropped_batches(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[test]
    fn test_device_removed_deactivates() {
        let d = dispatcher(64);
        d.on_stream(&[1], &[1], true);
        let (t, p) = unsafe { classify_event(SDRPLAY_EVENT_DEVICE_REMOVED, ptr::null()) };
        assert_eq!(t, EventType::DeviceRemoved);
        assert!(p.device_removed);

        d.on_event(t, p);
        assert!(!d.is_active());
        d.on_stream(&[2], &[2], false);
        assert_eq!(d.samples_available(), 1);
    }

    #[test]
    fn test_classify_gain_change() {
        let raw = SdrplayEventParams {
            gain_params: SdrplayGainCbParam {
                gr_db: 40,
                lna_gr_db: 12,
                curr_gain: 37.5,
            },
        };
        let (t, p) = unsafe { classify_event(SDRPLAY_EVENT_GAIN_CHANGE, &raw) };
        assert_eq!(t, EventType::GainChange);
        assert_eq!(p.gain_reduction_db, 40);
        assert_eq!(p.lna_gain_reduction_db, 12);
        assert_eq!(p.current_gain_db, 37.5);
        assert!(!p.overload_detected);
    }

    #[test]
    fn test_classify_power_overload() {
        let raw = SdrplayEventParams {
            power_overload_params: SdrplayPowerOverloadCbParam {
                power_overload_change_type: SDRPLAY_OVERLOAD_DETECTED,
            },
        };
        let (t, p) = unsafe { classify_event(SDRPLAY_EVENT_POWER_OVERLOAD_CHANGE, &raw) };
        assert_eq!(t, EventType::PowerOverload);
        assert!(p.overload_detected);
    }

    #[test]
    fn test_classify_unknown_id() {
        let (t, p) = unsafe { classify_event(99, ptr::null()) };
        assert_eq!(t, EventType::None);
        assert_eq!(p, EventParams::default());
    }

    #[test]
    fn test_trampoline_ignores_null_context() {
        let mut i = [1i16, 2];
        let mut q = [3i16, 4];
        unsafe {
            stream_callback(i.as_mut_ptr(), q.as_mut_ptr(), ptr::null_mut(), 2, 1, ptr::null_mut());
            event_callback(SDRPLAY_EVENT_DEVICE_REMOVED, 1, ptr::null_mut(), ptr::null_mut());
        }
    }

    #[test]
    fn test_trampoline_routes_through_context() {
        let d = dispatcher(64);
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = events.clone();
            d.set_event_callback(Box::new(move |t, _| events.lock().unwrap().push(t)));
        }

        let mut i = [1i16, 3];
        let mut q = [2i16, 4];
        unsafe {
            stream_callback(i.as_mut_ptr(), q.as_mut_ptr(), ptr::null_mut(), 2, 1, d.context());
            event_callback(SDRPLAY_EVENT_RSPDUO_MODE_CHANGE, 1, ptr::null_mut(), d.context());
        }

        let mut out = [Sample::new(0, 0); 4];
        assert_eq!(d.read_samples(&mut out), 2);
        assert_eq!(&out[..2], &[Sample::new(1, 2), Sample::new(3, 4)]);
        assert_eq!(*events.lock().unwrap(), vec![EventType::RspDuoModeChange]);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let d = dispatcher(64);
        d.set_sample_callback(Box::new(|_| panic!("user bug")));
        let mut i = [1i16];
        let mut q = [1i16];
        unsafe {
            stream_callback(i.as_mut_ptr(), q.as_mut_ptr(), ptr::null_mut(), 1, 1, d.context());
        }
        // the batch was buffered before the user callback ran
        assert_eq!(d.samples_available(), 1);
    }
}
