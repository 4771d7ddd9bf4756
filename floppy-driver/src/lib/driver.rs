use log::{debug, error, info};
use std::thread::{self, JoinHandle};

use crate::buffer::TrackBuffer;
use crate::channel::{request_channel, FloppyCommand, RequestSender, TransferRequest};
use crate::config::FloppyConfig;
use crate::error::{FloppyError, FloppyResult};
use crate::hardware::*;
use crate::interrupt::track_transfer_done;
use crate::reader::ReaderTask;
use crate::signal;
use crate::transfer::dma_words;

/// Submits track reads to a running driver. Cheap to clone and safe to hand
/// to other threads; every clone feeds the same queue.
#[derive(Debug, Clone)]
pub struct FloppyHandle {
    requests: RequestSender,
    track_words: usize,
}

impl FloppyHandle {
    /// Read raw `track` into `buffer`, blocking until the data is there.
    /// Requests from all handles are serviced one at a time in the order
    /// they were queued; this also blocks while the queue is full.
    pub fn read_track(&self, buffer: &TrackBuffer, track: u16) -> FloppyResult<()> {
        assert_or_error!(track < NUM_TRACKS, FloppyError::InvalidTrack(track));
        let actual = buffer.len();
        assert_or_error!(actual >= self.track_words, FloppyError::BufferTooSmall {
            needed: self.track_words,
            actual,
        });

        let (requester, done) = signal::completion();
        self.requests.send(FloppyCommand::Read(TransferRequest {
            requester,
            buffer: buffer.clone(),
            track,
        }))?;
        debug!("Queued read of track {}.", track);

        // If the reader goes away with our request, the requester is dropped
        // without ever being given.
        done.take().map_err(|_| FloppyError::DriverStopped)
    }
}

/// A floppy driver instance: the reader task that owns the drive, plus the
/// means to talk to it.
pub struct FloppyDriver<H> {
    handle: FloppyHandle,
    reader_thread: JoinHandle<H>,
    priority: u32,
}

impl<H: FloppyHardware> FloppyDriver<H> {
    /// Configure the disk controller, install the interrupt handler and start
    /// the reader task. The reader homes the heads before taking requests.
    ///
    /// Host threads have no portable priority, so `priority` is only
    /// recorded.
    pub fn init(mut hw: H, priority: u32, config: FloppyConfig) -> FloppyResult<Self> {
        info!("[Init] Floppy driver starting (reader priority {}).", priority);

        hw.store_dsksync(DSK_SYNC);
        hw.store_adkcon(ADKF_SETCLR | ADKF_MFMPREC | ADKF_WORDSYNC | ADKF_FAST);

        let (notifier, done) = signal::completion();
        let isr = track_transfer_done(hw.interrupts(), notifier);
        hw.set_int_vec(isr);

        let (requests, receiver) = request_channel(config.queue_capacity);
        let track_words = dma_words(config.track_words) as usize;
        let reader = ReaderTask::new(hw, &config, done, receiver);
        let reader_thread = thread::Builder::new()
            .name("FloppyReader".into())
            .spawn(move || reader.run())
            .map_err(FloppyError::Spawn)?;

        Ok(FloppyDriver {
            handle: FloppyHandle {
                requests,
                track_words,
            },
            reader_thread,
            priority,
        })
    }

    /// Stop the reader task once it has serviced everything already queued,
    /// and take the hardware back. The interrupt handler is uninstalled and
    /// the motor is off.
    pub fn kill(self) -> FloppyResult<H> {
        info!("[Kill] Floppy driver stopping.");
        // The reader may already have died, in which case the join reports it.
        let _ = self.handle.requests.send(FloppyCommand::Stop);
        self.reader_thread.join().map_err(|_| {
            error!("Floppy reader task terminated with error.");
            FloppyError::DriverStopped
        })
    }

    /// See `FloppyHandle::read_track`.
    pub fn read_track(&self, buffer: &TrackBuffer, track: u16) -> FloppyResult<()> {
        self.handle.read_track(buffer, track)
    }

    /// A submitter for other threads.
    pub fn handle(&self) -> FloppyHandle {
        self.handle.clone()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }
}
