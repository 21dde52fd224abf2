//! Prometheus metrics for the engine

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// Commands applied, by kind and status
    pub static ref ENGINE_COMMANDS_TOTAL: CounterVec = register_counter_vec!(
        "engine_commands_total",
        "Total commands processed",
        &["command", "status"]
    )
    .unwrap();

    /// Time spent applying a command
    pub static ref ENGINE_COMMAND_DURATION: HistogramVec = register_histogram_vec!(
        "engine_command_duration_seconds",
        "Command apply duration in seconds",
        &["command"]
    )
    .unwrap();

    /// Fee adjustments recorded, by reason
    pub static ref ENGINE_FEE_ADJUSTMENTS_TOTAL: CounterVec = register_counter_vec!(
        "engine_fee_adjustments_total",
        "Total fee adjustments",
        &["reason"]
    )
    .unwrap();

    /// Votes counted, by choice
    pub static ref ENGINE_VOTES_TOTAL: CounterVec = register_counter_vec!(
        "engine_votes_total",
        "Total votes cast",
        &["choice"]
    )
    .unwrap();

    /// Events handed to the bus, by channel
    pub static ref ENGINE_EVENTS_PUBLISHED_TOTAL: CounterVec = register_counter_vec!(
        "engine_events_published_total",
        "Total events published",
        &["channel"]
    )
    .unwrap();
}
