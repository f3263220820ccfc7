//! Metrics collection.
//!
//! Prometheus-compatible metrics with label cardinality protection and
//! typed convenience functions for recording measurements. All functions
//! are no-ops until a recorder is installed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::SkirmishError;
use crate::model::EndState;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Callback names accepted as labels.
const KNOWN_CALLBACKS: [&str; 4] = [
    "on_round_waiting",
    "on_round_resolved",
    "on_combat_ended",
    "on_pay_action",
];

/// Sanitizes a callback name for use as a metrics label.
#[must_use]
pub fn sanitize_callback_label(name: &str) -> &str {
    if KNOWN_CALLBACKS.contains(&name) {
        name
    } else {
        "__unknown__"
    }
}

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `SkirmishError::Io` if the recorder or HTTP listener
/// cannot be installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), SkirmishError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| SkirmishError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!(
        "skirmish_encounters_started_total",
        "Total number of encounters started"
    );
    describe_counter!(
        "skirmish_encounters_ended_total",
        "Total number of encounters that reached a terminal state"
    );
    describe_counter!(
        "skirmish_encounters_cancelled_total",
        "Total number of encounters removed by cancellation"
    );
    describe_gauge!(
        "skirmish_encounters_active",
        "Number of encounters currently accepting actions"
    );
    describe_counter!(
        "skirmish_rounds_resolved_total",
        "Total number of resolved rounds by trigger"
    );
    describe_histogram!(
        "skirmish_round_resolution_ms",
        "Time spent resolving a round under the encounter lock"
    );
    describe_counter!("skirmish_toll_payments_total", "Accepted toll payments");
    describe_counter!(
        "skirmish_toll_credits_total",
        "Credits collected through toll payments"
    );
    describe_counter!(
        "skirmish_protocol_downgrades_total",
        "Actions silently downgraded to BRACE"
    );
    describe_counter!(
        "skirmish_callback_errors_total",
        "Callback failures by callback and kind"
    );
}

/// Records a newly started encounter.
pub fn record_encounter_started() {
    counter!("skirmish_encounters_started_total").increment(1);
}

/// Records a terminal encounter.
///
/// Only the end-state kind is used as a label so combatant ids never
/// reach the metrics backend.
pub fn record_encounter_ended(end_state: &EndState) {
    counter!("skirmish_encounters_ended_total", "end_state" => end_state.kind()).increment(1);
}

/// Records a cancelled encounter.
pub fn record_encounter_cancelled() {
    counter!("skirmish_encounters_cancelled_total").increment(1);
}

/// Sets the active encounter gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_encounters_active(count: usize) {
    gauge!("skirmish_encounters_active").set(count as f64);
}

/// Records a resolved round.
pub fn record_round_resolved(trigger: &'static str, duration: Duration) {
    counter!("skirmish_rounds_resolved_total", "trigger" => trigger).increment(1);
    histogram!("skirmish_round_resolution_ms", "trigger" => trigger)
        .record(duration.as_secs_f64() * 1000.0);
}

/// Records an accepted toll payment.
pub fn record_toll_payment(amount: u64) {
    counter!("skirmish_toll_payments_total").increment(1);
    counter!("skirmish_toll_credits_total").increment(amount);
}

/// Records an action downgraded to BRACE.
pub fn record_protocol_downgrade(reason: &'static str) {
    counter!("skirmish_protocol_downgrades_total", "reason" => reason).increment(1);
}

/// Records a callback failure.
pub fn record_callback_error(callback: &str, cancelled: bool) {
    let kind = if cancelled { "cancelled" } else { "failed" };
    counter!(
        "skirmish_callback_errors_total",
        "callback" => sanitize_callback_label(callback).to_owned(),
        "kind" => kind,
    )
    .increment(1);
}
