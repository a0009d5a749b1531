pub(crate) fn millidegrees_to_degrees(millidegrees: i32) -> f64 {
    (millidegrees as f64) / 1000.
}

pub(crate) fn centimeters_to_millimeters(cm: i32) -> u32 {
    (cm.max(0) as u32) * 10
}

pub(crate) fn to_signal(raw: i32) -> u32 {
    raw.clamp(0, 255) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millidegrees_to_degrees() {
        assert_eq!(millidegrees_to_degrees(90_000), 90.);
        assert_eq!(millidegrees_to_degrees(1_500), 1.5);
    }

    #[test]
    fn test_centimeters_to_millimeters() {
        assert_eq!(centimeters_to_millimeters(200), 2000);
        assert_eq!(centimeters_to_millimeters(-3), 0);
    }

    #[test]
    fn test_to_signal() {
        assert_eq!(to_signal(200), 200);
        assert_eq!(to_signal(300), 255);
        assert_eq!(to_signal(-1), 0);
    }
}
