/// Tracks whether the feed is inside a streamed (in-progress) transaction.
///
/// Only message framing depends on it: between Stream Start and Stream Stop
/// every data message carries the transaction's XID.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    in_stream: bool,
    xid: Option<u32>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, xid: u32) {
        self.in_stream = true;
        self.xid = Some(xid);
    }

    pub fn stop(&mut self) {
        self.in_stream = false;
        self.xid = None;
    }

    pub fn is_in_stream(&self) -> bool {
        self.in_stream
    }

    /// XID of the transaction currently being streamed.
    pub fn xid(&self) -> Option<u32> {
        self.xid
    }

    pub fn reset(&mut self) {
        self.stop();
    }
}
