// Light controllers on the motor bus
//
// Two light nodes share the drive CAN bus: the rear node drives the tail light,
// the front node drives the side lights (channel 0) and headlights (channel 1).
// Every light command payload starts with the channel byte.

use crate::can::CanFrame;

pub const TAIL_LIGHT_NODE: u8 = 100;
pub const FRONT_LIGHT_NODE: u8 = 101;

pub const SIDE_CHANNEL: u8 = 0;
pub const HEAD_CHANNEL: u8 = 1;
const TAIL_CHANNEL: u8 = 0;

/// Samples in the tail-light speed average
pub const SPEED_HISTORY_LEN: usize = 16;

/// Speed drop (below the recent average) that counts as braking
pub const BRAKE_DELTA: f32 = 0.05;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCommand {
    SetMode = 0x40,
    SetColor = 0x41,
    SetBrightness = 0x42,
    SetPeriod = 0x43,
    Sync = 0x44,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightPattern {
    Off = 0,
    Steady = 1,
    Blink = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

const RED: Rgb = Rgb(255, 0, 0);
const WHITE: Rgb = Rgb(255, 255, 255);
const AMBER: Rgb = Rgb(255, 160, 0);

fn light_frame(node: u8, command: LightCommand, payload: &[u8]) -> CanFrame {
    CanFrame::fitted(node, command as u8, payload)
}

/// Full settings burst for one channel, closed by a SYNC so the node applies it at once
fn light_burst(
    node: u8,
    channel: u8,
    pattern: LightPattern,
    color: Rgb,
    brightness: u8,
    period_ms: u16,
) -> Vec<CanFrame> {
    let [p_hi, p_lo] = period_ms.to_be_bytes();
    vec![
        light_frame(node, LightCommand::SetMode, &[channel, pattern as u8]),
        light_frame(node, LightCommand::SetColor, &[channel, color.0, color.1, color.2]),
        light_frame(node, LightCommand::SetBrightness, &[channel, brightness]),
        light_frame(node, LightCommand::SetPeriod, &[channel, p_hi, p_lo]),
        light_frame(node, LightCommand::Sync, &[channel]),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailLightMode {
    Normal,
    Braking,
    ExtraBraking,
    Reverse,
}

impl TailLightMode {
    /// Pick the mode from the current speed and its recent average
    pub fn select(speed: f32, average: f32) -> Self {
        if speed > 0.0 {
            if speed < average - 3.0 * BRAKE_DELTA {
                Self::ExtraBraking
            } else if speed < average - BRAKE_DELTA {
                Self::Braking
            } else {
                Self::Normal
            }
        } else if speed < -BRAKE_DELTA {
            Self::Reverse
        } else {
            Self::Normal
        }
    }

    fn frames(self) -> Vec<CanFrame> {
        let (pattern, color, brightness, period) = match self {
            Self::Normal => (LightPattern::Steady, RED, 40, 0),
            Self::Braking => (LightPattern::Steady, RED, 255, 0),
            Self::ExtraBraking => (LightPattern::Blink, RED, 255, 100),
            Self::Reverse => (LightPattern::Steady, WHITE, 255, 0),
        };
        light_burst(TAIL_LIGHT_NODE, TAIL_CHANNEL, pattern, color, brightness, period)
    }
}

/// Fixed-size ring of recent speed samples
#[derive(Debug, Clone)]
pub struct SpeedHistory {
    samples: [f32; SPEED_HISTORY_LEN],
    next: usize,
}

impl Default for SpeedHistory {
    fn default() -> Self {
        Self {
            samples: [0.0; SPEED_HISTORY_LEN],
            next: 0,
        }
    }
}

impl SpeedHistory {
    pub fn push(&mut self, speed: f32) {
        self.samples[self.next] = speed;
        self.next = (self.next + 1) % SPEED_HISTORY_LEN;
    }

    pub fn average(&self) -> f32 {
        self.samples.iter().sum::<f32>() / SPEED_HISTORY_LEN as f32
    }
}

/// Light state machine; only changes go out on the bus
#[derive(Debug, Clone, Default)]
pub struct Lights {
    history: SpeedHistory,
    tail_sent: Option<TailLightMode>,
    side_sent: Option<bool>,
    head_sent: Option<u8>,
}

impl Lights {
    pub fn tail_mode(&self) -> Option<TailLightMode> {
        self.tail_sent
    }

    /// One cycle. `speed` is the commanded speed after failsafe, `headlight` the wanted brightness.
    pub fn update(&mut self, speed: f32, connected: bool, headlight: u8) -> Vec<CanFrame> {
        let mut frames = Vec::new();

        // Compare against history before this sample joins it
        let mode = TailLightMode::select(speed, self.history.average());
        self.history.push(speed);
        if self.tail_sent != Some(mode) {
            frames.extend(mode.frames());
            self.tail_sent = Some(mode);
        }

        if self.side_sent != Some(connected) {
            let (pattern, color, period) = if connected {
                (LightPattern::Steady, AMBER, 0)
            } else {
                (LightPattern::Blink, RED, 500)
            };
            frames.extend(light_burst(FRONT_LIGHT_NODE, SIDE_CHANNEL, pattern, color, 128, period));
            self.side_sent = Some(connected);
        }

        if self.head_sent != Some(headlight) {
            frames.push(light_frame(
                FRONT_LIGHT_NODE,
                LightCommand::SetBrightness,
                &[HEAD_CHANNEL, headlight],
            ));
            self.head_sent = Some(headlight);
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(frames: &[CanFrame], node: u8) -> usize {
        frames.iter().filter(|f| f.actuator_id == node).count()
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(TailLightMode::select(0.5, 0.5), TailLightMode::Normal);
        assert_eq!(TailLightMode::select(0.5, 0.58), TailLightMode::Braking);
        assert_eq!(TailLightMode::select(0.3, 0.5), TailLightMode::ExtraBraking);
        assert_eq!(TailLightMode::select(-0.2, 0.0), TailLightMode::Reverse);
        assert_eq!(TailLightMode::select(-0.04, 0.0), TailLightMode::Normal);
        assert_eq!(TailLightMode::select(0.0, 0.8), TailLightMode::Normal);
    }

    #[test]
    fn test_history_average() {
        let mut history = SpeedHistory::default();
        for _ in 0..8 {
            history.push(1.0);
        }
        assert_eq!(history.average(), 0.5);
        for _ in 0..SPEED_HISTORY_LEN {
            history.push(0.25);
        }
        assert_eq!(history.average(), 0.25);
    }

    #[test]
    fn test_first_cycle_sends_everything() {
        let mut lights = Lights::default();
        let frames = lights.update(0.0, false, 0);
        assert_eq!(count(&frames, TAIL_LIGHT_NODE), 5);
        // side-light burst plus the headlight brightness
        assert_eq!(count(&frames, FRONT_LIGHT_NODE), 6);
        assert_eq!(lights.tail_mode(), Some(TailLightMode::Normal));
    }

    #[test]
    fn test_unchanged_state_is_quiet() {
        let mut lights = Lights::default();
        lights.update(0.0, true, 10);
        assert!(lights.update(0.0, true, 10).is_empty());
        assert!(lights.update(0.0, true, 10).is_empty());
    }

    #[test]
    fn test_braking_burst_on_change() {
        let mut lights = Lights::default();
        for _ in 0..SPEED_HISTORY_LEN {
            lights.update(0.8, true, 0);
        }
        assert_eq!(lights.tail_mode(), Some(TailLightMode::Normal));

        let frames = lights.update(0.2, true, 0);
        assert_eq!(lights.tail_mode(), Some(TailLightMode::ExtraBraking));
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0].command, LightCommand::SetMode as u8);
        assert_eq!(frames[0].payload(), &[0, LightPattern::Blink as u8]);
        assert_eq!(frames[3].payload(), &[0, 0, 100]);
        assert_eq!(frames[4].command, LightCommand::Sync as u8);
    }

    #[test]
    fn test_side_lights_follow_connection_edges() {
        let mut lights = Lights::default();
        lights.update(0.0, true, 0);

        let frames = lights.update(0.0, false, 0);
        assert_eq!(count(&frames, FRONT_LIGHT_NODE), 5);
        assert_eq!(frames[0].payload(), &[SIDE_CHANNEL, LightPattern::Blink as u8]);

        assert!(lights.update(0.0, false, 0).is_empty());
        assert_eq!(count(&lights.update(0.0, true, 0), FRONT_LIGHT_NODE), 5);
    }

    #[test]
    fn test_headlight_only_on_change() {
        let mut lights = Lights::default();
        lights.update(0.0, true, 0);
        let frames = lights.update(0.0, true, 200);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &[HEAD_CHANNEL, 200]);
    }
}
