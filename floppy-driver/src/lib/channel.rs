use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use crate::buffer::TrackBuffer;
use crate::error::{FloppyError, FloppyResult};
use crate::signal::Notifier;

/// One track read, travelling from a caller to the reader task.
#[derive(Debug)]
pub struct TransferRequest {
    /// Given once the track is in the buffer.
    pub requester: Notifier,
    pub buffer: TrackBuffer,
    pub track: u16,
}

/// Commands that can be sent to the reader task.
#[derive(Debug)]
pub enum FloppyCommand {
    Read(TransferRequest),
    /// Tear down and hand the hardware back. Only the driver sends this.
    Stop,
}

/// What the reader task got from the channel.
#[derive(Debug)]
pub enum Received {
    Command(FloppyCommand),
    Timeout,
    /// Every sender has gone.
    Disconnected,
}

/// Producer end of the request channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestSender {
    tx: SyncSender<FloppyCommand>,
}

/// Consumer end of the request channel, owned by the reader task.
#[derive(Debug)]
pub struct RequestReceiver {
    rx: Receiver<FloppyCommand>,
}

/// Create a bounded FIFO channel for floppy commands.
pub fn request_channel(capacity: usize) -> (RequestSender, RequestReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (RequestSender { tx }, RequestReceiver { rx })
}

impl RequestSender {
    /// Queue a command, blocking for as long as the channel is full.
    pub fn send(&self, command: FloppyCommand) -> FloppyResult<()> {
        self.tx.send(command).map_err(|_| FloppyError::DriverStopped)
    }
}

impl RequestReceiver {
    /// Wait up to `timeout` for the next command.
    pub fn recv_timeout(&self, timeout: Duration) -> Received {
        match self.rx.recv_timeout(timeout) {
            Ok(command) => Received::Command(command),
            Err(RecvTimeoutError::Timeout) => Received::Timeout,
            Err(RecvTimeoutError::Disconnected) => Received::Disconnected,
        }
    }
}
