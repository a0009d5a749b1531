#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One reading of the rotating sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// Angle in degrees, within [0, 360).
    pub angle: f64,
    /// Distance to an object in mm.
    pub distance: u32,
    /// Signal quality of the returned pulse.
    pub signal: u32,
}

impl Sample {
    pub fn new(angle: f64, distance: u32, signal: u32) -> Sample {
        // rem_euclid rounds tiny negative angles up to exactly 360.
        let angle = angle.rem_euclid(360.);
        Sample {
            angle: if angle >= 360. { 0. } else { angle },
            distance,
            signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wraps_angle() {
        assert_eq!(Sample::new(360., 10, 1).angle, 0.);
        assert_eq!(Sample::new(361.5, 10, 1).angle, 1.5);
        assert_eq!(Sample::new(-90., 10, 1).angle, 270.);
        assert_eq!(Sample::new(45., 10, 1).angle, 45.);
        assert_eq!(Sample::new(-1e-17, 10, 1).angle, 0.);
        assert!(Sample::new(-1e-14, 10, 1).angle < 360.);
    }
}
