//! Progress reporting capability handed to upstream transfers.

/// Receives the cumulative number of bytes handed to the network so far.
///
/// Implementations must be cheap: `report` is called once per chunk on the
/// transfer's hot path.
pub trait ProgressSink: Send + Sync {
    /// Record that `bytes_transferred` bytes (cumulative) have been sent.
    fn report(&self, bytes_transferred: u64);
}

/// A sink that discards every report.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _bytes_transferred: u64) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u64) + Send + Sync,
{
    fn report(&self, bytes_transferred: u64) {
        self(bytes_transferred)
    }
}
