// Copyright 2025-2026 CEMAXECUTER LLC

//! C ABI shared with the SDRplay driver's callback thread.
//!
//! Layouts follow `sdrplay_api_callback.h` (API 3.x). Only the callback
//! surface lives here; the linked entry points are in [`crate::sdrplay`].

use std::os::raw::{c_double, c_int, c_short, c_uint, c_void};

// sdrplay_api_EventT
pub const SDRPLAY_EVENT_GAIN_CHANGE: c_int = 0;
pub const SDRPLAY_EVENT_POWER_OVERLOAD_CHANGE: c_int = 1;
pub const SDRPLAY_EVENT_DEVICE_REMOVED: c_int = 2;
pub const SDRPLAY_EVENT_RSPDUO_MODE_CHANGE: c_int = 3;

// sdrplay_api_PowerOverloadCbEventIdT
pub const SDRPLAY_OVERLOAD_DETECTED: c_int = 0;
pub const SDRPLAY_OVERLOAD_CORRECTED: c_int = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SdrplayStreamCbParams {
    pub first_sample_num: c_uint,
    pub gr_changed: c_int,
    pub rf_changed: c_int,
    pub fs_changed: c_int,
    pub num_samples: c_uint,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SdrplayGainCbParam {
    pub gr_db: c_uint,
    pub lna_gr_db: c_uint,
    pub curr_gain: c_double,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SdrplayPowerOverloadCbParam {
    pub power_overload_change_type: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SdrplayRspDuoCbParam {
    pub mode_change_type: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union SdrplayEventParams {
    pub gain_params: SdrplayGainCbParam,
    pub power_overload_params: SdrplayPowerOverloadCbParam,
    pub rsp_duo_params: SdrplayRspDuoCbParam,
}

/// `sdrplay_api_StreamCallback_t`
pub type StreamCallbackFn = unsafe extern "C" fn(
    xi: *mut c_short,
    xq: *mut c_short,
    params: *mut SdrplayStreamCbParams,
    num_samples: c_uint,
    reset: c_uint,
    cb_context: *mut c_void,
);

/// `sdrplay_api_EventCallback_t`
pub type EventCallbackFn = unsafe extern "C" fn(
    event_id: c_int,
    tuner: c_int,
    params: *mut SdrplayEventParams,
    cb_context: *mut c_void,
);

#[repr(C)]
pub struct SdrplayCallbackFns {
    pub stream_a: Option<StreamCallbackFn>,
    pub stream_b: Option<StreamCallbackFn>,
    pub event: Option<EventCallbackFn>,
}
