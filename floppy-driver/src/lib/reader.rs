use log::{debug, error, info, warn};
use std::time::Duration;

use crate::channel::{FloppyCommand, Received, RequestReceiver, TransferRequest};
use crate::config::FloppyConfig;
use crate::hardware::{FloppyHardware, DMAF_DISK, INTF_DSKBLK};
use crate::mechanics::Mechanism;
use crate::signal::Waiter;
use crate::transfer::TransferEngine;

/// Where the reader task is in servicing requests. A request is carried from
/// state to state until it has been transferred, and the only way back into
/// `Transferring` is through `Idle`, so two transfers never overlap.
#[derive(Debug)]
pub enum ReaderState {
    Homing,
    Idle,
    Seeking(TransferRequest),
    Settling(TransferRequest),
    Transferring(TransferRequest),
    Stopping,
}

/// The task that owns the drive. It services one request at a time, in the
/// order they were queued.
pub struct ReaderTask<H> {
    mechanism: Mechanism<H>,
    engine: TransferEngine,
    requests: RequestReceiver,
    idle_timeout: Duration,
}

impl<H: FloppyHardware> ReaderTask<H> {
    /// `done` must be given by the disk block interrupt handler.
    pub fn new(hw: H, config: &FloppyConfig, done: Waiter, requests: RequestReceiver) -> Self {
        ReaderTask {
            mechanism: Mechanism::new(hw, config),
            engine: TransferEngine::new(done, config.track_words),
            requests,
            idle_timeout: config.idle_timeout,
        }
    }

    /// Run until told to stop or until every sender has gone. Hands back the
    /// hardware with DMA, the interrupt, and the motor switched off.
    pub fn run(mut self) -> H {
        info!("Floppy reader task starting.");
        let mut state = ReaderState::Homing;
        loop {
            state = match state {
                ReaderState::Stopping => break,
                state => self.advance(state),
            };
        }
        self.teardown()
    }

    /// Perform the work of one state and return the next.
    pub fn advance(&mut self, state: ReaderState) -> ReaderState {
        match state {
            ReaderState::Homing => match self.mechanism.home() {
                Ok(()) => ReaderState::Idle,
                Err(e) => {
                    error!("Floppy homing failed: {}", e);
                    ReaderState::Stopping
                }
            },
            ReaderState::Idle => match self.requests.recv_timeout(self.idle_timeout) {
                Received::Command(FloppyCommand::Read(request)) => ReaderState::Seeking(request),
                Received::Command(FloppyCommand::Stop) | Received::Disconnected => {
                    ReaderState::Stopping
                }
                Received::Timeout => {
                    self.mechanism.motor_off();
                    ReaderState::Idle
                }
            },
            ReaderState::Seeking(request) => {
                self.mechanism.motor_on();
                self.mechanism.seek(request.track);
                ReaderState::Settling(request)
            }
            ReaderState::Settling(request) => {
                self.mechanism.settle();
                // Make sure the DMA for the disk is turned off.
                self.mechanism.hardware().store_dsklen(0);
                ReaderState::Transferring(request)
            }
            ReaderState::Transferring(request) => {
                debug!("Reading track {}.", request.track);
                match self.engine.read_track(self.mechanism.hardware(), &request.buffer) {
                    Ok(()) => {
                        if !request.requester.give() {
                            warn!("Requester of track {} is no longer waiting.", request.track);
                        }
                        ReaderState::Idle
                    }
                    Err(e) => {
                        // Dropping the request tells the requester it failed.
                        error!("Transfer of track {} failed: {}", request.track, e);
                        ReaderState::Stopping
                    }
                }
            }
            ReaderState::Stopping => ReaderState::Stopping,
        }
    }

    fn teardown(mut self) -> H {
        let hw = self.mechanism.hardware();
        hw.interrupts().disable_int(INTF_DSKBLK);
        hw.disable_dma(DMAF_DISK);
        hw.reset_int_vec();
        self.mechanism.motor_off();
        info!("Floppy reader task stopping.");
        self.mechanism.into_hardware()
    }
}
