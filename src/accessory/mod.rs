// Accessories driven off vehicle state: lights on the CAN bus, pan/tilt head on serial

pub mod lights;
pub mod servo;

pub use lights::{Lights, TailLightMode};
pub use servo::{PanTilt, ServoError, ServoLink};

use tracing::warn;

use crate::can::CanFrame;
use crate::config::{FirmwareDialect, ServoLimits};
use crate::uplink::{Axis, Pov, UplinkPacket};

/// Quantize the headlight stick: only forward deflection lights up
pub fn headlight_level(packet: Option<&UplinkPacket>) -> u8 {
    let value = packet.map_or(0.0, |p| p.axis(Axis::Headlight)).max(0.0);
    (value * 255.0).round() as u8
}

pub struct Accessories {
    lights: Option<Lights>,
    head: Option<(PanTilt, ServoLink)>,
}

impl Accessories {
    /// Lights and servo are fitted per dialect; the servo also needs an open link
    pub fn new(dialect: &FirmwareDialect, limits: ServoLimits, servo: Option<ServoLink>) -> Self {
        let head = if dialect.servo {
            servo.map(|link| (PanTilt::new(limits), link))
        } else {
            None
        };
        Self {
            lights: dialect.lights.then(Lights::default),
            head,
        }
    }

    pub fn lights(&self) -> Option<&Lights> {
        self.lights.as_ref()
    }

    pub fn pan_tilt(&self) -> Option<&PanTilt> {
        self.head.as_ref().map(|(head, _)| head)
    }

    /// One cycle; returns the light frames to put on the bus.
    /// `packet` is the live uplink packet, `None` while the link is down.
    pub fn update(&mut self, speed: f32, connected: bool, packet: Option<&UplinkPacket>) -> Vec<CanFrame> {
        let headlight = headlight_level(packet);

        if let Some((head, link)) = self.head.as_mut() {
            let (pan, tilt, pov) = packet.map_or((0.0, 0.0, Pov::Centered), |p| {
                (p.axis(Axis::Pan), p.axis(Axis::Tilt), p.pov)
            });
            head.update(pan, tilt, pov);
            if let Err(e) = link.send(&head.frame(headlight)) {
                warn!("Servo write failed: {}", e);
            }
        }

        match self.lights.as_mut() {
            Some(lights) => lights.update(speed, connected, headlight),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Byte sink the test can read back
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_headlight_level() {
        let mut packet = UplinkPacket::default();
        assert_eq!(headlight_level(Some(&packet)), 0);
        packet.set_axis(Axis::Headlight, 1.0);
        assert_eq!(headlight_level(Some(&packet)), 255);
        packet.set_axis(Axis::Headlight, -1.0);
        assert_eq!(headlight_level(Some(&packet)), 0);
        assert_eq!(headlight_level(None), 0);
    }

    #[test]
    fn test_servo_written_every_cycle() {
        let buf = SharedBuf::default();
        let link = ServoLink::from_writer(Box::new(buf.clone()));
        let mut acc = Accessories::new(&FirmwareDialect::V6, ServoLimits::default(), Some(link));

        let mut packet = UplinkPacket::default();
        packet.set_axis(Axis::Pan, 0.5);
        acc.update(0.0, true, Some(&packet));
        acc.update(0.0, true, Some(&packet));

        let written = buf.0.lock().unwrap().clone();
        assert_eq!(written.len(), 10);
        assert_eq!(&written[5..], &servo::build_frame(94, 90, 0));
        assert_eq!(acc.pan_tilt().unwrap().angles(), (94.0, 90.0));
    }

    #[test]
    fn test_dialect_without_accessories() {
        let buf = SharedBuf::default();
        let link = ServoLink::from_writer(Box::new(buf.clone()));
        let mut acc = Accessories::new(&FirmwareDialect::LEGACY, ServoLimits::default(), Some(link));

        assert!(acc.update(0.5, true, None).is_empty());
        assert!(acc.lights().is_none());
        assert!(acc.pan_tilt().is_none());
        assert!(buf.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lights_without_servo() {
        let mut acc = Accessories::new(&FirmwareDialect::V5, ServoLimits::default(), None);
        let frames = acc.update(0.0, true, None);
        assert!(!frames.is_empty());
        assert!(acc.update(0.0, true, None).is_empty());
    }
}
