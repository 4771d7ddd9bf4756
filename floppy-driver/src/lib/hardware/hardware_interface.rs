use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::buffer::TrackBuffer;

// Disk geometry.
pub const NUM_CYLINDERS: u16 = 80;
pub const NUM_TRACKS: u16 = NUM_CYLINDERS * 2;
pub const RAW_TRACK_SIZE: usize = 12800;  // Bytes of raw MFM per track.
pub const RAW_TRACK_WORDS: usize = RAW_TRACK_SIZE / 2;

// Custom chip disk registers.
pub const DSK_SYNC: u16 = 0x4489;   // Standard MFM sync marker.
pub const DSK_DMAEN: u16 = 0x8000;  // Enable bit of dsklen.
pub const DSK_LEN_MASK: u16 = 0x3FFF;

// Audio/disk control register flags.
pub const ADKF_SETCLR: u16 = 0x8000;
pub const ADKF_MFMPREC: u16 = 0x1000;
pub const ADKF_WORDSYNC: u16 = 0x0400;
pub const ADKF_FAST: u16 = 0x0100;

// Interrupt and DMA channel masks.
pub const INTF_DSKBLK: u16 = 0x0002;
pub const DMAF_DISK: u16 = 0x0010;

// Drive control port bits (CIA-B port B). All lines are active low.
pub const CIAB_DSKSTEP: u8 = 0;
pub const CIAB_DSKDIREC: u8 = 1;
pub const CIAB_DSKSIDE: u8 = 2;
pub const CIAB_DSKSEL0: u8 = 3;
pub const CIAB_DSKMOTOR: u8 = 7;

// Drive status port flags (CIA-A port A). Also active low.
pub const CIAF_DSKTRACK0: u8 = 0x10;
pub const CIAF_DSKRDY: u8 = 0x20;

/// An interrupt service routine. Runs in interrupt context, so it must never
/// block.
pub type InterruptHandler = Box<dyn Fn() + Send + Sync>;

/// The interrupt request/enable registers. These are the only registers that
/// interrupt context may touch, so they are shared rather than owned.
pub trait InterruptController: Send + Sync {
    /// Acknowledge (clear) pending requests for the given sources.
    fn clear_irq(&self, mask: u16);
    fn enable_int(&self, mask: u16);
    fn disable_int(&self, mask: u16);
}

/// Register-level access to a single floppy drive and the chipset around it.
/// Whoever holds this owns the drive exclusively.
pub trait FloppyHardware: Send + 'static {
    fn load_drive_control(&self) -> u8;
    fn store_drive_control(&mut self, value: u8);
    fn load_drive_status(&self) -> u8;

    fn store_dsksync(&mut self, value: u16);
    fn store_adkcon(&mut self, value: u16);
    /// Point disk DMA at a buffer, or at nothing.
    fn store_dskpt(&mut self, buffer: Option<TrackBuffer>);
    fn store_dsklen(&mut self, value: u16);

    fn enable_dma(&mut self, mask: u16);
    fn disable_dma(&mut self, mask: u16);

    fn interrupts(&self) -> Arc<dyn InterruptController>;
    fn set_int_vec(&mut self, handler: InterruptHandler);
    fn reset_int_vec(&mut self);

    /// Mask all interrupt delivery (critical section entry).
    fn disable_interrupts(&mut self);
    /// Unmask interrupt delivery; anything that became pending meanwhile
    /// fires now.
    fn enable_interrupts(&mut self);

    /// Block the calling task for the given number of milliseconds.
    fn wait_ms(&mut self, ms: u32);
}

/// Set a single bit of the drive control port.
pub fn bset<H: FloppyHardware + ?Sized>(hw: &mut H, bit: u8) {
    let value = hw.load_drive_control() | (1 << bit);
    hw.store_drive_control(value);
}

/// Clear a single bit of the drive control port.
pub fn bclr<H: FloppyHardware + ?Sized>(hw: &mut H, bit: u8) {
    let value = hw.load_drive_control() & !(1 << bit);
    hw.store_drive_control(value);
}

/// Interrupts are masked for as long as this lives. Derefs to the hardware so
/// the protected register writes go through it.
pub struct CriticalSection<'a, H: FloppyHardware> {
    hw: &'a mut H,
}

impl<'a, H: FloppyHardware> CriticalSection<'a, H> {
    pub fn enter(hw: &'a mut H) -> Self {
        hw.disable_interrupts();
        CriticalSection { hw }
    }
}

impl<H: FloppyHardware> Deref for CriticalSection<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.hw
    }
}

impl<H: FloppyHardware> DerefMut for CriticalSection<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.hw
    }
}

impl<H: FloppyHardware> Drop for CriticalSection<'_, H> {
    fn drop(&mut self) {
        self.hw.enable_interrupts();
    }
}
