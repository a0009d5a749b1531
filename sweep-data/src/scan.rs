use crate::sample::Sample;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sequence number assigned to every completed acquisition cycle.
pub type ScanSequence = u64;

/// Struct to hold one revolution of samples.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Scan {
    /// Samples in the order the sensor emitted them.
    pub samples: Vec<Sample>,
}

impl Scan {
    pub fn new(samples: Vec<Sample>) -> Scan {
        Scan { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Counts the points where the angle decreases, i.e. wraps past 360.
    pub fn wraparounds(&self) -> usize {
        self.samples
            .windows(2)
            .filter(|w| w[1].angle < w[0].angle)
            .count()
    }
}

impl FromIterator<Sample> for Scan {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Scan::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraparounds() {
        let scan: Scan = [350., 355., 2., 10.]
            .iter()
            .map(|a| Sample::new(*a, 100, 1))
            .collect();
        assert_eq!(scan.len(), 4);
        assert_eq!(scan.wraparounds(), 1);

        let scan: Scan = [0., 90., 180., 270.]
            .iter()
            .map(|a| Sample::new(*a, 100, 1))
            .collect();
        assert_eq!(scan.wraparounds(), 0);
        assert!(Scan::default().is_empty());
    }
}
