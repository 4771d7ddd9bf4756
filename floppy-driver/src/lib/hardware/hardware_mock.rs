use std::sync::{Arc, Mutex};

use crate::buffer::TrackBuffer;
use super::hardware_interface::*;

/// A register access seen by the mock, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWrite {
    DriveControl(u8),
    DskSync(u16),
    AdkCon(u16),
    DskPt { set: bool },
    DskLen(u16),
    DmaOn(u16),
    DmaOff(u16),
    IrqClear(u16),
    IntOn(u16),
    IntOff(u16),
    VectorSet,
    VectorReset,
    InterruptsOff,
    InterruptsOn,
    Wait(u32),
}

/// Shared view of everything the mock has been asked to do.
#[derive(Clone, Default)]
pub struct MockRecord {
    writes: Arc<Mutex<Vec<RegisterWrite>>>,
}

impl MockRecord {
    fn push(&self, write: RegisterWrite) {
        self.writes.lock().unwrap().push(write);
    }

    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap().clear();
    }
}

struct MockInterrupts {
    record: MockRecord,
}

impl InterruptController for MockInterrupts {
    fn clear_irq(&self, mask: u16) {
        self.record.push(RegisterWrite::IrqClear(mask));
    }

    fn enable_int(&self, mask: u16) {
        self.record.push(RegisterWrite::IntOn(mask));
    }

    fn disable_int(&self, mask: u16) {
        self.record.push(RegisterWrite::IntOff(mask));
    }
}

/// A mock drive that records register accesses, tracks the head cylinder,
/// and completes DMA instantly, used when testing other components.
pub struct MockFloppy {
    record: MockRecord,
    interrupts: Arc<MockInterrupts>,
    handler: Option<InterruptHandler>,
    control: u8,
    pub cylinder: u16,
    /// Keep the track 0 sensor from ever asserting.
    pub track0_stuck: bool,
    latched_dsklen: u16,
    masked: bool,
    pending: bool,
}

impl MockFloppy {
    pub fn new(cylinder: u16) -> Self {
        let record = MockRecord::default();
        MockFloppy {
            interrupts: Arc::new(MockInterrupts { record: record.clone() }),
            record,
            handler: None,
            control: 0xFF,
            cylinder,
            track0_stuck: false,
            latched_dsklen: 0,
            masked: false,
            pending: false,
        }
    }

    pub fn record(&self) -> MockRecord {
        self.record.clone()
    }

    fn fire(&mut self) {
        if self.masked {
            self.pending = true;
        } else if let Some(handler) = &self.handler {
            handler();
        }
    }
}

impl FloppyHardware for MockFloppy {
    fn load_drive_control(&self) -> u8 {
        self.control
    }

    fn store_drive_control(&mut self, value: u8) {
        let step_fell = self.control & (1 << CIAB_DSKSTEP) != 0
            && value & (1 << CIAB_DSKSTEP) == 0;
        if step_fell {
            if value & (1 << CIAB_DSKDIREC) == 0 {
                self.cylinder = (self.cylinder + 1).min(NUM_CYLINDERS - 1);
            } else {
                self.cylinder = self.cylinder.saturating_sub(1);
            }
        }
        self.control = value;
        self.record.push(RegisterWrite::DriveControl(value));
    }

    fn load_drive_status(&self) -> u8 {
        // Always ready.
        if self.cylinder == 0 && !self.track0_stuck {
            !(CIAF_DSKTRACK0 | CIAF_DSKRDY)
        } else {
            !CIAF_DSKRDY
        }
    }

    fn store_dsksync(&mut self, value: u16) {
        self.record.push(RegisterWrite::DskSync(value));
    }

    fn store_adkcon(&mut self, value: u16) {
        self.record.push(RegisterWrite::AdkCon(value));
    }

    fn store_dskpt(&mut self, buffer: Option<TrackBuffer>) {
        self.record.push(RegisterWrite::DskPt { set: buffer.is_some() });
    }

    fn store_dsklen(&mut self, value: u16) {
        self.record.push(RegisterWrite::DskLen(value));
        if value & DSK_DMAEN != 0 && self.latched_dsklen == value {
            self.latched_dsklen = 0;
            self.fire();
        } else {
            self.latched_dsklen = value;
        }
    }

    fn enable_dma(&mut self, mask: u16) {
        self.record.push(RegisterWrite::DmaOn(mask));
    }

    fn disable_dma(&mut self, mask: u16) {
        self.record.push(RegisterWrite::DmaOff(mask));
    }

    fn interrupts(&self) -> Arc<dyn InterruptController> {
        self.interrupts.clone()
    }

    fn set_int_vec(&mut self, handler: InterruptHandler) {
        self.record.push(RegisterWrite::VectorSet);
        self.handler = Some(handler);
    }

    fn reset_int_vec(&mut self) {
        self.record.push(RegisterWrite::VectorReset);
        self.handler = None;
    }

    fn disable_interrupts(&mut self) {
        self.record.push(RegisterWrite::InterruptsOff);
        self.masked = true;
    }

    fn enable_interrupts(&mut self) {
        self.record.push(RegisterWrite::InterruptsOn);
        self.masked = false;
        if std::mem::take(&mut self.pending) {
            self.fire();
        }
    }

    fn wait_ms(&mut self, ms: u32) {
        self.record.push(RegisterWrite::Wait(ms));
    }
}
