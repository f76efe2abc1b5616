// One motion-control cycle
//
// Fixed order per tick: drain CAN -> failsafe/mode -> mixer or freewheel ->
// accessories -> telemetry snapshot. Nothing in here blocks.

use std::time::Instant;

use tracing::debug;

use crate::accessory::{Accessories, ServoLink};
use crate::can::CanTransport;
use crate::config::{MAX_CAN_DRAIN, RuntimeConfig};
use crate::failsafe::{ControlStep, DriveModeController, FreeAction};
use crate::messages::{DriveMode, TELEMETRY_VERSION, TelemetrySnapshot};
use crate::motor::{DriveTelemetry, Mixer, MotorDriver};
use crate::uplink::UplinkPacket;

pub struct MotionCore<B: CanTransport> {
    driver: MotorDriver<B>,
    telemetry: DriveTelemetry,
    controller: DriveModeController,
    mixer: Mixer,
    accessories: Accessories,
    duty_divisor: f64,
    seq: u64,
}

impl<B: CanTransport> MotionCore<B> {
    pub fn new(config: &RuntimeConfig, bus: B, servo: Option<ServoLink>, now: Instant) -> Self {
        let dialect = config.dialect;
        Self {
            driver: MotorDriver::new(bus, config.host_can_id),
            telemetry: DriveTelemetry::new(dialect.duty_divisor),
            controller: DriveModeController::new(
                now,
                config.uplink_timeout(),
                config.keepalive_period(),
                config.traction.deadzone,
            ),
            mixer: Mixer::new(config.traction, dialect.traction_control),
            accessories: Accessories::new(&dialect, config.servo_limits, servo),
            duty_divisor: dialect.duty_divisor,
            seq: 0,
        }
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn accessories(&self) -> &Accessories {
        &self.accessories
    }

    pub fn driver_mut(&mut self) -> &mut MotorDriver<B> {
        &mut self.driver
    }

    /// Run one cycle. `uplink` holds the packets drained this tick in arrival
    /// order; the last one wins.
    pub fn tick(&mut self, now: Instant, uplink: &[UplinkPacket]) -> TelemetrySnapshot {
        let frames = self.driver.drain(&mut self.telemetry, MAX_CAN_DRAIN);
        if frames > 0 {
            debug!("Drained {} CAN frames", frames);
        }

        let step = self.controller.update(now, uplink.last());
        self.drive(now, &step);

        let light_frames =
            self.accessories
                .update(step.command.speed, step.connected, self.controller.latest());
        for frame in &light_frames {
            self.driver.send(frame);
        }

        self.seq += 1;
        self.snapshot(&step)
    }

    fn drive(&mut self, now: Instant, step: &ControlStep) {
        match self.controller.free_action(now) {
            Some(FreeAction::Disengage) => self.driver.disengage(),
            Some(FreeAction::Keepalive) => self.driver.keepalive(),
            None => {}
        }

        if step.mode == DriveMode::Drive {
            let duties = self.mixer.mix(
                step.command.speed,
                step.command.steering,
                &self.telemetry.rpms(),
            );
            self.driver.set_duties(&duties);
        }
    }

    fn snapshot(&self, step: &ControlStep) -> TelemetrySnapshot {
        TelemetrySnapshot {
            version: TELEMETRY_VERSION,
            seq: self.seq,
            mode: step.mode,
            connected: step.connected,
            duty_divisor: self.duty_divisor,
            drives: *self.telemetry.drives(),
        }
    }
}
