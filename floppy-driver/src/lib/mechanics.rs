use log::{debug, trace};

use crate::config::FloppyConfig;
use crate::error::{FloppyError, FloppyResult};
use crate::hardware::*;

/// Outward steps to try before giving up on finding track 0. A few more than
/// the drive has cylinders, so a head parked past the last one still homes.
const MAX_HOMING_STEPS: u16 = NUM_CYLINDERS + 5;

/// Which way a step pulse moves the heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadDirection {
    Inward,
    Outward,
}

impl HeadDirection {
    /// Change in track number per step. Tracks interleave the two sides, so
    /// one cylinder is two tracks.
    fn step(self) -> i16 {
        match self {
            HeadDirection::Inward => 2,
            HeadDirection::Outward => -2,
        }
    }
}

/// Which disk surface is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Lower,
    Upper,
}

impl Side {
    /// The side a track lives on, by parity.
    pub fn of_track(track: u16) -> Self {
        if track & 1 == 0 { Side::Lower } else { Side::Upper }
    }
}

/// Where the mechanism is, as far as the driver knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveState {
    pub motor_on: bool,
    pub head_direction: HeadDirection,
    pub current_track: i16,
    pub current_side: Side,
}

impl DriveState {
    /// State at power-on, before homing.
    fn unknown() -> Self {
        DriveState {
            motor_on: false,
            head_direction: HeadDirection::Outward,
            current_track: 0,
            current_side: Side::Lower,
        }
    }
}

/// Stepper, side and motor control for one drive. Owns the hardware and the
/// bookkeeping of where the heads are.
pub struct Mechanism<H> {
    hw: H,
    state: DriveState,
    step_settle_ms: u32,
    direction_settle_ms: u32,
    disk_settle_ms: u32,
}

impl<H: FloppyHardware> Mechanism<H> {
    pub fn new(hw: H, config: &FloppyConfig) -> Self {
        Mechanism {
            hw,
            state: DriveState::unknown(),
            step_settle_ms: config.step_settle_ms,
            direction_settle_ms: config.direction_settle_ms,
            disk_settle_ms: config.disk_settle_ms,
        }
    }

    pub fn state(&self) -> &DriveState {
        &self.state
    }

    pub fn hardware(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Give back the hardware at teardown.
    pub fn into_hardware(self) -> H {
        self.hw
    }

    /// Pulse the step line and wait for the heads to settle.
    pub fn step_heads(&mut self) {
        bclr(&mut self.hw, CIAB_DSKSTEP);
        bset(&mut self.hw, CIAB_DSKSTEP);

        self.hw.wait_ms(self.step_settle_ms);

        self.state.current_track += self.state.head_direction.step();
    }

    /// Set the direction of subsequent steps. Reversing needs a much longer
    /// settle than a single step.
    pub fn set_step_direction(&mut self, inward: bool) {
        if inward {
            bclr(&mut self.hw, CIAB_DSKDIREC);
            self.state.head_direction = HeadDirection::Inward;
        } else {
            bset(&mut self.hw, CIAB_DSKDIREC);
            self.state.head_direction = HeadDirection::Outward;
        }

        self.hw.wait_ms(self.direction_settle_ms);
    }

    /// Select a head. The upper side is one track above the lower.
    pub fn change_side(&mut self, side: Side) {
        match side {
            Side::Upper => {
                bclr(&mut self.hw, CIAB_DSKSIDE);
                self.state.current_track += 1;
            }
            Side::Lower => {
                bset(&mut self.hw, CIAB_DSKSIDE);
                self.state.current_track -= 1;
            }
        }
        self.state.current_side = side;
    }

    pub fn at_track0(&self) -> bool {
        self.hw.load_drive_status() & CIAF_DSKTRACK0 == 0
    }

    pub fn wait_drive_ready(&self) {
        while self.hw.load_drive_status() & CIAF_DSKRDY != 0 {
            std::hint::spin_loop();
        }
    }

    /// Spin the motor up and wait until the drive reports ready. Does nothing
    /// if it is already on.
    pub fn motor_on(&mut self) {
        if self.state.motor_on {
            return;
        }
        trace!("Floppy motor on.");

        bset(&mut self.hw, CIAB_DSKSEL0);
        bclr(&mut self.hw, CIAB_DSKMOTOR);
        bclr(&mut self.hw, CIAB_DSKSEL0);

        self.wait_drive_ready();

        self.state.motor_on = true;
    }

    /// Spin the motor down. Does nothing if it is already off.
    pub fn motor_off(&mut self) {
        if !self.state.motor_on {
            return;
        }
        trace!("Floppy motor off.");

        bset(&mut self.hw, CIAB_DSKSEL0);
        bset(&mut self.hw, CIAB_DSKMOTOR);
        bclr(&mut self.hw, CIAB_DSKSEL0);

        self.state.motor_on = false;
    }

    /// Move the heads to track 0 on the lower side and reset the bookkeeping.
    /// Fails if the track 0 sensor hasn't asserted within `MAX_HOMING_STEPS`.
    pub fn home(&mut self) -> FloppyResult<()> {
        self.motor_on();
        self.set_step_direction(false);
        let mut steps = 0;
        while !self.at_track0() {
            assert_or_error!(steps < MAX_HOMING_STEPS, FloppyError::Track0NotFound { steps });
            self.step_heads();
            steps += 1;
        }
        self.set_step_direction(true);
        self.change_side(Side::Lower);
        self.state.current_track = 0;
        debug!("Floppy heads homed after {} steps.", steps);
        Ok(())
    }

    /// Bring the heads over `track`: switch sides if the parity differs, then
    /// step towards it. Follow up with `settle` before reading.
    pub fn seek(&mut self, track: u16) {
        let target = track as i16;

        if (target ^ self.state.current_track) & 1 != 0 {
            self.change_side(Side::of_track(track));
        }

        if target != self.state.current_track {
            trace!("Seeking from track {} to {}.", self.state.current_track, target);
            self.set_step_direction(target > self.state.current_track);
            while target != self.state.current_track {
                self.step_heads();
            }
        }
    }

    /// Wait for the heads to stabilise over the track. Needed before every
    /// transfer, even if the heads didn't move.
    pub fn settle(&mut self) {
        self.hw.wait_ms(self.disk_settle_ms);
    }
}
