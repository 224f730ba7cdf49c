//! Sinks receive [`Record`]s dispatched by name from the [`SinkProxy`].

pub mod kafka;
pub mod stdout;

use std::collections::HashMap;

use anyhow::Result;
use crossbeam_channel::Receiver;

use crate::channel::Message;
use crate::record::Record;

/// A destination for framed records.
pub trait Sink: Send {
    fn process(&mut self, record: &Record) -> Result<()>;
}

/// Holds the named set of configured sinks and dispatches by
/// `record.sink_name`. An unknown sink name is logged and the record is
/// dropped — this is a configuration mismatch, not a transient failure, so
/// there is nothing to retry.
pub struct SinkProxy {
    sinks: HashMap<String, Box<dyn Sink>>,
}

impl SinkProxy {
    pub fn new(sinks: HashMap<String, Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Drain `rx` until [`Message::Stop`] is received, dispatching each
    /// record to its named sink in turn.
    pub fn run(mut self, rx: Receiver<Message>) {
        for msg in rx.iter() {
            match msg {
                Message::Stop => {
                    tracing::info!("sink proxy received stop sentinel, shutting down");
                    break;
                }
                Message::Record(record) => {
                    self.dispatch(&record);
                }
            }
        }
    }

    fn dispatch(&mut self, record: &Record) {
        match self.sinks.get_mut(&record.sink_name) {
            Some(sink) => {
                if let Err(err) = sink.process(record) {
                    tracing::warn!(sink = %record.sink_name, error = %err, "sink failed to process record, dropping");
                }
            }
            None => {
                tracing::warn!(sink = %record.sink_name, "unknown sink name, dropping record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<Vec<u8>>>>);

    impl Sink for RecordingSink {
        fn process(&mut self, record: &Record) -> Result<()> {
            self.0.lock().unwrap().push(record.payload.clone());
            Ok(())
        }
    }

    #[test]
    fn dispatches_by_sink_name_and_stops_on_sentinel() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sinks: HashMap<String, Box<dyn Sink>> = HashMap::new();
        sinks.insert("primary".to_string(), Box::new(RecordingSink(seen.clone())));
        let proxy = SinkProxy::new(sinks);

        let (tx, rx) = channel();
        tx.send(Message::Record(Record::new(
            "primary",
            PathBuf::from("/a.log"),
            b"line\n".to_vec(),
        )))
        .unwrap();
        tx.send(Message::Record(Record::new(
            "unknown",
            PathBuf::from("/a.log"),
            b"dropped\n".to_vec(),
        )))
        .unwrap();
        tx.send(Message::Stop).unwrap();

        proxy.run(rx);
        assert_eq!(*seen.lock().unwrap(), vec![b"line\n".to_vec()]);
    }
}
