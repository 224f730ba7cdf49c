//! Writes records to standard output. Used for debugging and as a default.

use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::record::Record;
use crate::sink::Sink;

pub struct StdoutSink;

impl Sink for StdoutSink {
    fn process(&mut self, record: &Record) -> Result<()> {
        let mut out = io::stdout();
        out.write_all(&record.formatted()).context("writing to stdout")?;
        out.flush().context("flushing stdout")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn formats_filename_colon_payload() {
        let record = Record::new("stdout", PathBuf::from("/a.log"), b"hello\n".to_vec());
        assert_eq!(record.formatted(), b"/a.log: hello\n".to_vec());
    }

    #[test]
    fn process_does_not_error() {
        let mut sink = StdoutSink;
        let record = Record::new("stdout", PathBuf::from("/a.log"), b"hello\n".to_vec());
        sink.process(&record).unwrap();
    }
}
