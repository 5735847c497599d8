//! Servo channels and their safe angle ranges

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resting pan angle (head facing forward)
pub const PAN_CENTER: i32 = 90;
/// Resting tilt angle (head level)
pub const TILT_CENTER: i32 = 90;
/// Jaw fully shut
pub const MOUTH_CLOSED: i32 = 0;
/// Jaw open far enough to read as speech
pub const MOUTH_OPEN: i32 = 45;

/// A named actuator output on the microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Pan,
    Tilt,
    Mouth,
}

impl Channel {
    /// Inclusive `(min, max)` range the hardware can safely reach
    pub const fn range(self) -> (i32, i32) {
        match self {
            Channel::Pan => (60, 120),
            Channel::Tilt => (70, 110),
            Channel::Mouth => (MOUTH_CLOSED, 60),
        }
    }

    /// Name used on the wire
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Pan => "pan",
            Channel::Tilt => "tilt",
            Channel::Mouth => "mouth",
        }
    }

    pub fn clamp(self, angle: i32) -> i32 {
        let (min, max) = self.range();
        angle.clamp(min, max)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A channel paired with an angle that is already inside the channel's range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoTarget {
    channel: Channel,
    angle: i32,
}

impl ServoTarget {
    /// Build a target, clamping `angle` into the channel's safe range
    pub fn new(channel: Channel, angle: i32) -> Self {
        Self {
            channel,
            angle: channel.clamp(angle),
        }
    }

    pub fn angle(&self) -> i32 {
        self.angle
    }

    /// Encode as a protocol line, newline included
    pub fn frame(&self) -> String {
        format!("{}:{}\n", self.channel, self.angle)
    }
}
