use log::{trace, warn};

use crate::buffer::TrackBuffer;
use crate::error::{FloppyError, FloppyResult};
use crate::hardware::*;
use crate::signal::Waiter;

/// Words a transfer of `track_words` actually moves: the length register
/// only has room for `DSK_LEN_MASK`.
pub fn dma_words(track_words: usize) -> u16 {
    track_words.min(DSK_LEN_MASK as usize) as u16
}

/// Runs disk DMA transfers and waits for their completion interrupt.
pub struct TransferEngine {
    done: Waiter,
    words: u16,
}

impl TransferEngine {
    /// Create an engine that waits on `done`, which the disk block interrupt
    /// handler gives. Transfers are `track_words` long.
    pub fn new(done: Waiter, track_words: usize) -> Self {
        TransferEngine {
            done,
            words: dma_words(track_words),
        }
    }

    /// Read the track under the heads into `buffer`, blocking until the DMA
    /// finishes. There is no timeout: if the interrupt never comes, neither
    /// does the return.
    ///
    /// The interrupt is cleared and enabled before the pointer and length are
    /// written, so a stale request can't fire against the new transfer. DMA
    /// and the interrupt are always switched off again afterwards.
    pub fn read_track<H: FloppyHardware>(&mut self, hw: &mut H,
                                         buffer: &TrackBuffer) -> FloppyResult<()> {
        // A new transfer must never be armed while a completion is pending.
        if self.done.try_take() {
            warn!("Discarding stale disk transfer completion.");
        }

        let interrupts = hw.interrupts();
        interrupts.clear_irq(INTF_DSKBLK);
        interrupts.enable_int(INTF_DSKBLK);
        hw.enable_dma(DMAF_DISK);

        {
            let mut hw = CriticalSection::enter(hw);
            hw.store_dskpt(Some(buffer.clone()));

            // Write track size twice to initiate DMA transfer.
            hw.store_dsklen(DSK_DMAEN | self.words);
            hw.store_dsklen(DSK_DMAEN | self.words);
        }
        trace!("Disk DMA armed for {} words.", self.words);

        let result = self.done.take().map_err(|_| FloppyError::DriverStopped);

        hw.store_dsklen(0);
        interrupts.disable_int(INTF_DSKBLK);
        hw.disable_dma(DMAF_DISK);
        hw.store_dskpt(None);

        result
    }
}
