//! In-process handoff from the tailing engine to the sink proxy.
//!
//! A single producer (the tailing engine — on the kqueue backend only the
//! content-tailer thread ever sends; the directory poller never touches this
//! channel) and a single consumer (the sink proxy). Shutdown is signaled by
//! pushing [`Message::Stop`] rather than by closing the channel, mirroring
//! the `"STOP"` sentinel the collector side keys off of.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::record::Record;

#[derive(Debug, Clone)]
pub enum Message {
    Record(Record),
    Stop,
}

pub fn channel() -> (Sender<Message>, Receiver<Message>) {
    unbounded()
}
