// Drive mode and uplink watchdog
// Note: if the RC link goes quiet the last stick position must not keep driving the
// rover, so after the timeout the command pair is forced to neutral.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::messages::DriveMode;
use crate::motor::apply_deadzone;
use crate::uplink::{Axis, UplinkPacket};

/// Stick pair fed to the mixer, deadzone already applied
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveCommand {
    pub speed: f32,
    pub steering: f32,
}

impl DriveCommand {
    pub const NEUTRAL: Self = Self {
        speed: 0.0,
        steering: 0.0,
    };

    pub fn from_uplink(packet: &UplinkPacket, deadzone: f32) -> Self {
        Self {
            speed: apply_deadzone(packet.axis(Axis::Speed), deadzone),
            steering: apply_deadzone(packet.axis(Axis::Steering), deadzone),
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.speed == 0.0 && self.steering == 0.0
    }
}

/// Uplink liveness
#[derive(Debug, Clone, Copy)]
pub struct FailsafeState {
    pub last_uplink_rx: Instant,
    pub connected: bool,
}

/// What the drives need this cycle while freewheeling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeAction {
    /// Mode edge: zero current on every drive
    Disengage,
    /// Periodic ping so the drive-side watchdog stays quiet
    Keepalive,
}

/// Result of one controller cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlStep {
    pub mode: DriveMode,
    pub command: DriveCommand,
    pub connected: bool,
    /// Set on the cycle the link was declared lost
    pub link_lost: bool,
}

pub struct DriveModeController {
    mode: DriveMode,
    failsafe: FailsafeState,
    command: DriveCommand,
    latest: Option<UplinkPacket>,
    timeout: Duration,
    keepalive_period: Duration,
    deadzone: f32,
    last_keepalive: Option<Instant>,
    edge_pending: bool,
}

impl DriveModeController {
    /// Starts in `Free`, disconnected; the first cycle counts as a mode edge
    pub fn new(now: Instant, timeout: Duration, keepalive_period: Duration, deadzone: f32) -> Self {
        Self {
            mode: DriveMode::Free,
            failsafe: FailsafeState {
                last_uplink_rx: now,
                connected: false,
            },
            command: DriveCommand::NEUTRAL,
            latest: None,
            timeout,
            keepalive_period,
            deadzone,
            last_keepalive: None,
            edge_pending: true,
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn failsafe(&self) -> FailsafeState {
        self.failsafe
    }

    pub fn command(&self) -> DriveCommand {
        self.command
    }

    /// Latest uplink packet while the link is up, `None` after a timeout
    pub fn latest(&self) -> Option<&UplinkPacket> {
        self.latest.as_ref()
    }

    fn set_mode(&mut self, mode: DriveMode) {
        if self.mode != mode {
            info!("Drive mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
            self.edge_pending = true;
        }
    }

    /// Process this cycle's newest uplink packet (if any), then run the watchdog
    pub fn update(&mut self, now: Instant, packet: Option<&UplinkPacket>) -> ControlStep {
        if let Some(packet) = packet {
            if !self.failsafe.connected {
                info!("Uplink connected (seq {})", packet.seqno);
            }
            self.failsafe.last_uplink_rx = now;
            self.failsafe.connected = true;
            self.command = DriveCommand::from_uplink(packet, self.deadzone);
            self.latest = Some(*packet);

            if packet.free_requested() {
                self.set_mode(DriveMode::Free);
            } else if !self.command.is_neutral() {
                self.set_mode(DriveMode::Drive);
            }
        }

        let mut link_lost = false;
        let silence = now.saturating_duration_since(self.failsafe.last_uplink_rx);
        if self.failsafe.connected && silence > self.timeout {
            warn!("Uplink lost ({:?} since last packet), forcing neutral", silence);
            self.command = DriveCommand::NEUTRAL;
            self.latest = None;
            self.failsafe.connected = false;
            link_lost = true;
        }

        ControlStep {
            mode: self.mode,
            command: self.command,
            connected: self.failsafe.connected,
            link_lost,
        }
    }

    /// Disengage burst on any mode edge, keepalive cadence while idling in `Free`
    pub fn free_action(&mut self, now: Instant) -> Option<FreeAction> {
        if self.edge_pending {
            self.edge_pending = false;
            self.last_keepalive = Some(now);
            return Some(FreeAction::Disengage);
        }
        if self.mode != DriveMode::Free {
            return None;
        }
        let due = self
            .last_keepalive
            .is_none_or(|last| now.saturating_duration_since(last) >= self.keepalive_period);
        if due {
            self.last_keepalive = Some(now);
            return Some(FreeAction::Keepalive);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uplink::BUTTON_FREE;

    const TIMEOUT: Duration = Duration::from_millis(500);
    const KEEPALIVE: Duration = Duration::from_millis(50);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sticks(speed: f32, steering: f32) -> UplinkPacket {
        let mut packet = UplinkPacket::default();
        packet.set_axis(Axis::Speed, speed);
        packet.set_axis(Axis::Steering, steering);
        packet
    }

    fn controller(t0: Instant) -> DriveModeController {
        DriveModeController::new(t0, TIMEOUT, KEEPALIVE, 0.05)
    }

    #[test]
    fn test_starts_free_and_disengages_once() {
        let t0 = Instant::now();
        let mut ctl = controller(t0);
        let step = ctl.update(t0, None);
        assert_eq!(step.mode, DriveMode::Free);
        assert!(!step.connected);
        assert_eq!(ctl.free_action(t0), Some(FreeAction::Disengage));
        assert_eq!(ctl.free_action(t0 + ms(10)), None);
    }

    #[test]
    fn test_keepalive_every_50ms_in_free() {
        let t0 = Instant::now();
        let mut ctl = controller(t0);
        assert_eq!(ctl.free_action(t0), Some(FreeAction::Disengage));

        assert_eq!(ctl.free_action(t0 + ms(49)), None);
        assert_eq!(ctl.free_action(t0 + ms(50)), Some(FreeAction::Keepalive));
        assert_eq!(ctl.free_action(t0 + ms(99)), None);
        assert_eq!(ctl.free_action(t0 + ms(100)), Some(FreeAction::Keepalive));
    }

    #[test]
    fn test_non_neutral_sticks_engage_drive() {
        let t0 = Instant::now();
        let mut ctl = controller(t0);
        ctl.update(t0, None);
        ctl.free_action(t0);

        // Inside the deadzone: stays free
        let step = ctl.update(t0 + ms(50), Some(&sticks(0.04, 0.0)));
        assert_eq!(step.mode, DriveMode::Free);
        assert!(step.command.is_neutral());
        assert_eq!(ctl.free_action(t0 + ms(50)), Some(FreeAction::Keepalive));

        let step = ctl.update(t0 + ms(100), Some(&sticks(0.5, 0.0)));
        assert_eq!(step.mode, DriveMode::Drive);
        assert!((step.command.speed - 0.45).abs() < 1e-5);
        assert_eq!(ctl.free_action(t0 + ms(100)), Some(FreeAction::Disengage));

        // No keepalives while driving
        assert_eq!(ctl.free_action(t0 + ms(150)), None);
        assert_eq!(ctl.free_action(t0 + ms(400)), None);
    }

    #[test]
    fn test_free_button_overrides_sticks() {
        let t0 = Instant::now();
        let mut ctl = controller(t0);
        ctl.update(t0, Some(&sticks(1.0, 0.0)));
        ctl.free_action(t0);
        assert_eq!(ctl.mode(), DriveMode::Drive);

        let mut packet = sticks(1.0, 0.0);
        packet.buttons = BUTTON_FREE;
        let step = ctl.update(t0 + ms(50), Some(&packet));
        assert_eq!(step.mode, DriveMode::Free);
        assert_eq!(ctl.free_action(t0 + ms(50)), Some(FreeAction::Disengage));
    }

    #[test]
    fn test_timeout_forces_neutral_and_keeps_mode() {
        let t0 = Instant::now();
        let mut ctl = controller(t0);
        let step = ctl.update(t0, Some(&sticks(0.8, 0.3)));
        assert!(step.connected);
        assert_eq!(step.mode, DriveMode::Drive);

        // 500 ms of silence is still within the contract
        let step = ctl.update(t0 + ms(500), None);
        assert!(step.connected);
        assert!(!step.command.is_neutral());

        let step = ctl.update(t0 + ms(501), None);
        assert!(!step.connected);
        assert!(step.link_lost);
        assert_eq!(step.command, DriveCommand::NEUTRAL);
        assert_eq!(step.mode, DriveMode::Drive);
        assert!(ctl.latest().is_none());

        // Only reported once
        let step = ctl.update(t0 + ms(551), None);
        assert!(!step.link_lost);
        assert_eq!(step.command, DriveCommand::NEUTRAL);
    }

    #[test]
    fn test_reconnect_on_next_packet() {
        let t0 = Instant::now();
        let mut ctl = controller(t0);
        ctl.update(t0, Some(&sticks(0.8, 0.0)));
        ctl.update(t0 + ms(501), None);
        assert!(!ctl.failsafe().connected);

        let step = ctl.update(t0 + ms(551), Some(&sticks(0.0, 0.0)));
        assert!(step.connected);
        assert_eq!(ctl.failsafe().last_uplink_rx, t0 + ms(551));
        assert_eq!(step.command, DriveCommand::NEUTRAL);
    }
}
