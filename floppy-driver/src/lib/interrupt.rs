use std::sync::Arc;

use crate::hardware::{InterruptController, InterruptHandler, INTF_DSKBLK};
use crate::signal::Notifier;

/// Build the disk block interrupt handler. It acknowledges the interrupt and
/// wakes the reader task, and touches nothing else.
pub fn track_transfer_done(interrupts: Arc<dyn InterruptController>,
                           reader: Notifier) -> InterruptHandler {
    Box::new(move || {
        interrupts.clear_irq(INTF_DSKBLK);
        // The host scheduler picks up the woken reader on its own, so the
        // reschedule hint needs no action here.
        let _woken = reader.give();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::hardware::{FloppyHardware, MockFloppy, RegisterWrite};
    use crate::signal;

    #[test]
    fn test_acknowledges_then_wakes() {
        let floppy = MockFloppy::new(0);
        let record = floppy.record();
        let (notifier, waiter) = signal::completion();
        let isr = track_transfer_done(floppy.interrupts(), notifier);

        assert!(!waiter.try_take());
        isr();
        assert_eq!(record.writes(), vec![RegisterWrite::IrqClear(INTF_DSKBLK)]);
        assert!(waiter.try_take());

        // Firing twice before the reader runs still leaves one wakeup.
        isr();
        isr();
        assert!(waiter.try_take());
        assert!(!waiter.try_take());
    }
}
