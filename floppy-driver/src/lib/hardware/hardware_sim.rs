use floppy_utils::read_be::ReadBE;
use log::{debug, error, info, trace, warn};
use std::fs;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc::{self, Sender}};
use std::thread;
use std::time::Duration;

use crate::buffer::TrackBuffer;
use super::hardware_interface::*;

/// Time for one disk revolution at 300 RPM.
const REVOLUTION_MS: u64 = 200;

/// Something observable that happened to the simulated hardware, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveEvent {
    /// The motor line was latched by a select edge.
    MotorLatched { on: bool },
    Direction { inward: bool },
    Step { inward: bool, cylinder: u16 },
    Side { upper: bool },
    Wait(u32),
    SyncWord(u16),
    AdkCon(u16),
    DmaPointer { set: bool },
    DmaLength(u16),
    DmaEnabled,
    DmaDisabled,
    IntCleared,
    IntEnabled,
    IntDisabled,
    VectorInstalled,
    VectorRemoved,
    TransferStarted { track: u16, words: usize },
    TransferDone { track: u16 },
    InterruptDelivered,
}

/// Options for a simulated drive.
#[derive(Debug, Clone, Default)]
pub struct SimOptions {
    /// Where the heads are resting at power-on.
    pub start_cylinder: u16,
    /// Actually sleep for waits and disk revolutions.
    pub realtime: bool,
}

/// Commands that can be sent to the DMA thread.
enum DmaCommand {
    Transfer { buffer: TrackBuffer, track: u16, words: usize },
    JoinThread,
}

/// Chipset and mechanism state, shared between the owning task, the DMA
/// thread, and interrupt context.
struct SimState {
    control: u8,
    cylinder: u16,
    upper: bool,
    motor_on: bool,
    dmacon: u16,
    intena: u16,
    intreq: u16,
    master_enabled: bool,
    dskpt: Option<TrackBuffer>,
    latched_dsklen: u16,
    handler: Option<Arc<InterruptHandler>>,
    events: Vec<DriveEvent>,
}

type SharedState = Arc<Mutex<SimState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// If the disk interrupt is requested, enabled, and unmasked, return the
/// handler to run. The caller must drop the lock before running it.
fn pending_handler(sd: &mut SimState) -> Option<Arc<InterruptHandler>> {
    if sd.master_enabled && sd.intreq & sd.intena & INTF_DSKBLK != 0 {
        let handler = sd.handler.clone();
        if handler.is_some() {
            sd.events.push(DriveEvent::InterruptDelivered);
        }
        handler
    } else {
        None
    }
}

/// The interrupt registers of the simulated chipset.
struct SimInterrupts {
    state: SharedState,
}

impl InterruptController for SimInterrupts {
    fn clear_irq(&self, mask: u16) {
        let mut sd = lock(&self.state);
        sd.intreq &= !mask;
        sd.events.push(DriveEvent::IntCleared);
    }

    fn enable_int(&self, mask: u16) {
        let handler = {
            let mut sd = lock(&self.state);
            sd.intena |= mask;
            sd.events.push(DriveEvent::IntEnabled);
            pending_handler(&mut sd)
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    fn disable_int(&self, mask: u16) {
        let mut sd = lock(&self.state);
        sd.intena &= !mask;
        sd.events.push(DriveEvent::IntDisabled);
    }
}

/// A floppy drive and disk chipset, simulated on top of a raw track image
/// on the host filesystem.
pub struct SimulatedFloppy {
    image_path: Arc<PathBuf>,
    state: SharedState,
    interrupts: Arc<SimInterrupts>,
    realtime: bool,
    dma_tx: Sender<DmaCommand>,
    dma_thread: Option<thread::JoinHandle<()>>,
}

impl SimulatedFloppy {
    /// Open the image at the given path and start the DMA thread. The image
    /// must hold exactly `NUM_TRACKS` raw tracks.
    pub fn open(image_path: impl Into<PathBuf>, options: SimOptions) -> io::Result<Self> {
        let image_path = Arc::new(image_path.into());
        check_image(&image_path)?;

        let state = Arc::new(Mutex::new(SimState {
            control: 0xFF,
            cylinder: options.start_cylinder.min(NUM_CYLINDERS - 1),
            upper: false,
            motor_on: false,
            dmacon: 0,
            intena: 0,
            intreq: 0,
            master_enabled: true,
            dskpt: None,
            latched_dsklen: 0,
            handler: None,
            events: Vec::new(),
        }));

        let (dma_tx, dma_rx) = mpsc::channel();
        let dma_image_path = Arc::clone(&image_path);
        let dma_state = Arc::clone(&state);
        let realtime = options.realtime;
        let dma_thread = thread::Builder::new()
            .name("FloppyDMA".into())
            .spawn(move || loop {
                match dma_rx.recv() {
                    Ok(DmaCommand::Transfer { buffer, track, words }) => {
                        dma_iteration(&dma_image_path, &dma_state, realtime,
                                      &buffer, track, words);
                    }
                    Ok(DmaCommand::JoinThread) | Err(_) => return,
                }
            })?;
        info!("Simulated floppy '{}' inserted.", image_path.display());

        Ok(SimulatedFloppy {
            interrupts: Arc::new(SimInterrupts { state: Arc::clone(&state) }),
            image_path,
            state,
            realtime,
            dma_tx,
            dma_thread: Some(dma_thread),
        })
    }

    /// A handle for observing the drive from outside its owner.
    pub fn probe(&self) -> DriveProbe {
        DriveProbe {
            state: Arc::clone(&self.state),
        }
    }

    /// The size every image file must have.
    pub fn image_size() -> u64 {
        NUM_TRACKS as u64 * RAW_TRACK_SIZE as u64
    }
}

impl Drop for SimulatedFloppy {
    fn drop(&mut self) {
        // The thread may already be gone if it panicked; nothing to do then.
        let _ = self.dma_tx.send(DmaCommand::JoinThread);
        if let Some(dma_thread) = self.dma_thread.take() {
            if dma_thread.join().is_err() {
                error!("Floppy DMA thread terminated with error.");
            }
        }
        info!("Simulated floppy '{}' ejected.", self.image_path.display());
    }
}

impl FloppyHardware for SimulatedFloppy {
    fn load_drive_control(&self) -> u8 {
        lock(&self.state).control
    }

    /// Apply the edges of the active-low control lines.
    fn store_drive_control(&mut self, value: u8) {
        let mut sd = lock(&self.state);
        let old = sd.control;
        sd.control = value;
        let fell = |bit: u8| old & (1 << bit) != 0 && value & (1 << bit) == 0;
        let changed = |bit: u8| (old ^ value) & (1 << bit) != 0;

        if changed(CIAB_DSKDIREC) {
            let inward = value & (1 << CIAB_DSKDIREC) == 0;
            sd.events.push(DriveEvent::Direction { inward });
        }
        if changed(CIAB_DSKSIDE) {
            sd.upper = value & (1 << CIAB_DSKSIDE) == 0;
            let upper = sd.upper;
            sd.events.push(DriveEvent::Side { upper });
        }
        if fell(CIAB_DSKSTEP) {
            let inward = value & (1 << CIAB_DSKDIREC) == 0;
            sd.cylinder = if inward {
                (sd.cylinder + 1).min(NUM_CYLINDERS - 1)
            } else {
                sd.cylinder.saturating_sub(1)
            };
            let cylinder = sd.cylinder;
            trace!("Heads stepped to cylinder {}.", cylinder);
            sd.events.push(DriveEvent::Step { inward, cylinder });
        }
        if fell(CIAB_DSKSEL0) {
            // Selecting the drive latches the motor line.
            sd.motor_on = value & (1 << CIAB_DSKMOTOR) == 0;
            let on = sd.motor_on;
            sd.events.push(DriveEvent::MotorLatched { on });
        }
    }

    fn load_drive_status(&self) -> u8 {
        let sd = lock(&self.state);
        let mut status = 0xFF;
        if sd.cylinder == 0 {
            status &= !CIAF_DSKTRACK0;
        }
        if sd.motor_on {
            status &= !CIAF_DSKRDY;
        }
        status
    }

    fn store_dsksync(&mut self, value: u16) {
        lock(&self.state).events.push(DriveEvent::SyncWord(value));
    }

    fn store_adkcon(&mut self, value: u16) {
        lock(&self.state).events.push(DriveEvent::AdkCon(value));
    }

    fn store_dskpt(&mut self, buffer: Option<TrackBuffer>) {
        let mut sd = lock(&self.state);
        sd.events.push(DriveEvent::DmaPointer { set: buffer.is_some() });
        sd.dskpt = buffer;
    }

    /// Disk DMA starts on the second of two identical writes with the enable
    /// bit set.
    fn store_dsklen(&mut self, value: u16) {
        let mut sd = lock(&self.state);
        sd.events.push(DriveEvent::DmaLength(value));
        if value & DSK_DMAEN == 0 {
            sd.latched_dsklen = 0;
            return;
        }
        if sd.latched_dsklen != value {
            sd.latched_dsklen = value;
            return;
        }
        sd.latched_dsklen = 0;

        if sd.dmacon & DMAF_DISK == 0 {
            warn!("Disk DMA armed with the DMA channel disabled; ignoring.");
            return;
        }
        let buffer = match &sd.dskpt {
            Some(buffer) => buffer.clone(),
            None => {
                warn!("Disk DMA armed without a pointer; ignoring.");
                return;
            }
        };
        if !sd.motor_on {
            warn!("Disk DMA armed with the motor off.");
        }
        let track = sd.cylinder * 2 + sd.upper as u16;
        let words = (value & DSK_LEN_MASK) as usize;
        sd.events.push(DriveEvent::TransferStarted { track, words });
        drop(sd);

        if self.dma_tx.send(DmaCommand::Transfer { buffer, track, words }).is_err() {
            error!("Floppy DMA thread is gone; transfer of track {} lost.", track);
        }
    }

    fn enable_dma(&mut self, mask: u16) {
        let mut sd = lock(&self.state);
        sd.dmacon |= mask;
        sd.events.push(DriveEvent::DmaEnabled);
    }

    fn disable_dma(&mut self, mask: u16) {
        let mut sd = lock(&self.state);
        sd.dmacon &= !mask;
        sd.events.push(DriveEvent::DmaDisabled);
    }

    fn interrupts(&self) -> Arc<dyn InterruptController> {
        self.interrupts.clone()
    }

    fn set_int_vec(&mut self, handler: InterruptHandler) {
        let mut sd = lock(&self.state);
        sd.handler = Some(Arc::new(handler));
        sd.events.push(DriveEvent::VectorInstalled);
    }

    fn reset_int_vec(&mut self) {
        let mut sd = lock(&self.state);
        sd.handler = None;
        sd.events.push(DriveEvent::VectorRemoved);
    }

    fn disable_interrupts(&mut self) {
        lock(&self.state).master_enabled = false;
    }

    fn enable_interrupts(&mut self) {
        let handler = {
            let mut sd = lock(&self.state);
            sd.master_enabled = true;
            pending_handler(&mut sd)
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    fn wait_ms(&mut self, ms: u32) {
        lock(&self.state).events.push(DriveEvent::Wait(ms));
        if self.realtime {
            thread::sleep(Duration::from_millis(ms as u64));
        }
    }
}

/// An observer of a simulated drive. Safe to use from any thread.
#[derive(Clone)]
pub struct DriveProbe {
    state: SharedState,
}

impl DriveProbe {
    pub fn cylinder(&self) -> u16 {
        lock(&self.state).cylinder
    }

    pub fn upper(&self) -> bool {
        lock(&self.state).upper
    }

    /// The track under the selected head.
    pub fn track(&self) -> u16 {
        let sd = lock(&self.state);
        sd.cylinder * 2 + sd.upper as u16
    }

    pub fn motor_on(&self) -> bool {
        lock(&self.state).motor_on
    }

    pub fn vector_installed(&self) -> bool {
        lock(&self.state).handler.is_some()
    }

    pub fn dma_enabled(&self) -> bool {
        lock(&self.state).dmacon & DMAF_DISK != 0
    }

    pub fn int_enabled(&self) -> bool {
        lock(&self.state).intena & INTF_DSKBLK != 0
    }

    /// Everything that has happened so far.
    pub fn events(&self) -> Vec<DriveEvent> {
        lock(&self.state).events.clone()
    }

    /// Return and forget everything that has happened so far.
    pub fn take_events(&self) -> Vec<DriveEvent> {
        std::mem::take(&mut lock(&self.state).events)
    }
}

/// Ensure the image exists, is a file, and has the right size.
fn check_image(image_path: &Path) -> io::Result<()> {
    let metadata = fs::metadata(image_path)?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput,
            format!("'{}' is not a file", image_path.display())));
    }
    if metadata.len() != SimulatedFloppy::image_size() {
        return Err(io::Error::new(io::ErrorKind::InvalidData,
            format!("'{}' is {} bytes; disk images must be exactly {} bytes",
                    image_path.display(), metadata.len(), SimulatedFloppy::image_size())));
    }
    Ok(())
}

/// Read one raw track from the image.
fn read_track_words(image_path: &Path, track: u16) -> io::Result<Vec<u16>> {
    let mut file = fs::File::open(image_path)?;
    file.seek(SeekFrom::Start(track as u64 * RAW_TRACK_SIZE as u64))?;
    let mut words = vec![0; RAW_TRACK_WORDS];
    file.read_be_words(&mut words)?;
    Ok(words)
}

/// Perform a single DMA transfer, then raise the disk block interrupt.
fn dma_iteration(image_path: &Path, state: &SharedState, realtime: bool,
                 buffer: &TrackBuffer, track: u16, words: usize) {
    if realtime {
        thread::sleep(Duration::from_millis(REVOLUTION_MS));
    }

    let motor_on = lock(state).motor_on;
    let track_data = if motor_on {
        read_track_words(image_path, track).unwrap_or_else(|e| {
            error!("Failed to read track {} from '{}': {}", track, image_path.display(), e);
            vec![0; RAW_TRACK_WORDS]
        })
    } else {
        vec![0; RAW_TRACK_WORDS]
    };

    {
        // The track keeps spinning under the head, so long reads wrap.
        let mut dest = buffer.words();
        for (i, word) in dest.iter_mut().take(words).enumerate() {
            *word = track_data[i % track_data.len()];
        }
    }
    debug!("DMA finished reading {} words from track {}.", words, track);

    let handler = {
        let mut sd = lock(state);
        sd.intreq |= INTF_DSKBLK;
        sd.events.push(DriveEvent::TransferDone { track });
        pending_handler(&mut sd)
    };
    if let Some(handler) = handler {
        handler();
    }
}
