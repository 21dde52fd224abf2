//! Prometheus metrics for the event bus

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// Total messages published
    pub static ref EVENT_PUBLISH_TOTAL: CounterVec = register_counter_vec!(
        "event_bus_publish_total",
        "Total messages published",
        &["channel", "status"]
    )
    .unwrap();

    /// Total messages received
    pub static ref EVENT_RECEIVE_TOTAL: CounterVec = register_counter_vec!(
        "event_bus_receive_total",
        "Total messages received",
        &["channel", "status"]
    )
    .unwrap();

    /// Messages a slow subscriber missed
    pub static ref EVENT_LAGGED_TOTAL: CounterVec = register_counter_vec!(
        "event_bus_lagged_total",
        "Messages dropped for lagging subscribers",
        &["channel"]
    )
    .unwrap();

    /// Handler duration
    pub static ref EVENT_PROCESS_DURATION: HistogramVec = register_histogram_vec!(
        "event_bus_process_duration_seconds",
        "Message handler duration in seconds",
        &["channel"]
    )
    .unwrap();
}
