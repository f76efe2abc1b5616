// Six-wheel skid-steer mixing with traction control
// Converts a (speed, steering) stick pair into per-drive duty commands.
//
// Drive layout: even node ids are the left side (0, 2, 4), odd ids the right (1, 3, 5).

use crate::config::{DRIVES_COUNT, TractionTuning};

/// Zero values inside the deadzone, shift the rest toward zero by its width
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() <= deadzone {
        return 0.0;
    }
    (value - deadzone.copysign(value)).clamp(-1.0, 1.0)
}

/// Commanded fraction for each side of the vehicle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SideSpeeds {
    pub left: f32,
    pub right: f32,
}

impl SideSpeeds {
    /// Swap sides, used to check steering symmetry
    pub fn mirrored(self) -> Self {
        Self {
            left: self.right,
            right: self.left,
        }
    }
}

/// Tank-steer mix blended into an in-place pivot at low speed
///
/// # Arguments
/// * `speed` - Forward command in [-1, 1]
/// * `steering` - Turn command in [-1, 1] (positive = right)
/// * `pivot_limit` - |speed| below which the pivot blend starts
pub fn tank_mix(speed: f32, steering: f32, pivot_limit: f32) -> SideSpeeds {
    // Inner side slows down; multiplying by speed mirrors both for reverse
    let (left, right) = if steering > 0.0 {
        (1.0, 1.0 - steering)
    } else {
        (1.0 + steering, 1.0)
    };
    let left = left * speed;
    let right = right * speed;

    let pivot_speed = steering;
    let pivot_scale = if speed.abs() > pivot_limit {
        0.0
    } else {
        1.0 - speed.abs() / pivot_limit
    };

    SideSpeeds {
        left: (1.0 - pivot_scale) * left + pivot_scale * pivot_speed,
        right: (1.0 - pivot_scale) * right - pivot_scale * pivot_speed,
    }
}

/// Per-wheel anti-slip scale factors, kept across cycles
#[derive(Debug, Clone)]
pub struct TractionControl {
    scale: [f32; DRIVES_COUNT],
    tuning: TractionTuning,
}

impl TractionControl {
    pub fn new(tuning: TractionTuning) -> Self {
        Self {
            scale: [1.0; DRIVES_COUNT],
            tuning,
        }
    }

    pub fn scales(&self) -> &[f32; DRIVES_COUNT] {
        &self.scale
    }

    /// Slowest unthrottled wheel on each side, `None` if every wheel there is throttled
    fn side_minimums(&self, rpms: &[i32; DRIVES_COUNT]) -> [Option<f32>; 2] {
        let mut mins = [None::<f32>; 2];
        for (i, rpm) in rpms.iter().enumerate() {
            if self.scale[i] <= 0.99 {
                continue;
            }
            let rpm = rpm.unsigned_abs() as f32;
            let side = &mut mins[i % 2];
            *side = Some(side.map_or(rpm, |m| m.min(rpm)));
        }
        mins
    }

    /// One control step: throttle wheels spinning faster than their side-mates,
    /// let everything else recover toward full scale.
    pub fn update(&mut self, rpms: &[i32; DRIVES_COUNT]) {
        let mins = self.side_minimums(rpms);
        let TractionTuning {
            step,
            slip_ratio,
            rpm_floor,
            ..
        } = self.tuning;

        for (i, rpm) in rpms.iter().enumerate() {
            let rpm = rpm.unsigned_abs() as f32;
            let slipping = rpm >= rpm_floor && mins[i % 2].is_some_and(|min| min / rpm < slip_ratio);

            let scale = &mut self.scale[i];
            if slipping {
                *scale -= step;
            } else {
                *scale += step;
            }
            *scale = scale.clamp(0.0, 1.0);
        }
    }
}

/// Stick pair to six duty commands
#[derive(Debug, Clone)]
pub struct Mixer {
    tuning: TractionTuning,
    traction: Option<TractionControl>,
}

impl Mixer {
    pub fn new(tuning: TractionTuning, traction_control: bool) -> Self {
        Self {
            tuning,
            traction: traction_control.then(|| TractionControl::new(tuning)),
        }
    }

    pub fn traction(&self) -> Option<&TractionControl> {
        self.traction.as_ref()
    }

    /// Run one cycle. `speed`/`steering` must already be deadzone-filtered.
    pub fn mix(&mut self, speed: f32, steering: f32, rpms: &[i32; DRIVES_COUNT]) -> [f32; DRIVES_COUNT] {
        let sides = tank_mix(speed, steering, self.tuning.pivot_limit);

        let scales = match self.traction.as_mut() {
            Some(traction) => {
                traction.update(rpms);
                *traction.scales()
            }
            None => [1.0; DRIVES_COUNT],
        };

        std::array::from_fn(|i| {
            let side = if i % 2 == 0 { sides.left } else { sides.right };
            (side * scales[i]).clamp(-1.0, 1.0)
        })
    }
}
