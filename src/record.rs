//! The unit of work handed from the tailing engine to a sink.

use std::path::PathBuf;

/// One framed line read from a tailed file, tagged with where it came from
/// and which sink should receive it.
#[derive(Debug, Clone)]
pub struct Record {
    pub sink_name: String,
    pub filename: PathBuf,
    /// The raw line, including its terminating newline.
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(sink_name: impl Into<String>, filename: PathBuf, payload: Vec<u8>) -> Self {
        Self {
            sink_name: sink_name.into(),
            filename,
            payload,
        }
    }

    /// `<absolute_filename>: <raw_line>` — the wire format every sink writes.
    pub fn formatted(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.filename.as_os_str().len() + 2 + self.payload.len());
        out.extend_from_slice(self.filename.to_string_lossy().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(&self.payload);
        out
    }
}
