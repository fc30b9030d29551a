use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref FRAMES: IntCounter =
        register_int_counter!("plate_gate_frames_total", "Frames processed by the detection loop")
            .expect("metric can be registered");
    pub static ref FRAME_ERRORS: IntCounter = register_int_counter!(
        "plate_gate_frame_errors_total",
        "Frames whose localization failed"
    )
    .expect("metric can be registered");
    pub static ref DECISIONS: IntCounterVec = register_int_counter_vec!(
        "plate_gate_decisions_total",
        "Authorization decisions by outcome",
        &["status"]
    )
    .expect("metric can be registered");
    pub static ref ROUTES: IntCounter =
        register_int_counter!("plate_gate_routes_total", "Route display requests issued")
            .expect("metric can be registered");
    pub static ref DISPLAY_DROPPED: IntCounter = register_int_counter!(
        "plate_gate_display_dropped_total",
        "Frames dropped because the presenter lagged"
    )
    .expect("metric can be registered");
    pub static ref FPS: IntGauge =
        register_int_gauge!("plate_gate_fps", "Frames processed in the last second")
            .expect("metric can be registered");
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
