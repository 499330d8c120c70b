/// Receives byte counts while a response body streams to disk.
///
/// Each attempt that gets a success status calls [`start`](Self::start)
/// again, so implementations reset on every call.
pub trait TransferProgress {
    /// `total` is the declared `Content-Length`, when the server sent one.
    fn start(&self, total: Option<u64>);
    /// `bytes` more were written to the temp file.
    fn advance(&self, bytes: u64);
}

/// Reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn start(&self, _total: Option<u64>) {}
    fn advance(&self, _bytes: u64) {}
}
