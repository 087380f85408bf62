//! Wall-clock timestamps as they appear on the wire and in the journals.

use chrono::{Local, SecondsFormat};

/// Returns the current local time as an ISO-8601 string with offset,
/// e.g. `2024-05-01T09:30:12.004512+02:00`.
///
/// Sender and receiver each call this independently, so two timestamps
/// attached to the same message come from different clocks.
pub fn now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
