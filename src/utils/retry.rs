//! Retry utilities: backoff builders for log reconnects.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff between restarts of the replay listener.
///
/// Yields `max_times` delays growing from `min_delay` to `max_delay`, then
/// runs dry; the supervisor treats an exhausted backoff as the restart ceiling.
pub fn restart_backoff(
    min_delay: Duration,
    max_delay: Duration,
    max_times: usize,
) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(max_delay)
        .with_max_times(max_times)
        .with_jitter()
}
