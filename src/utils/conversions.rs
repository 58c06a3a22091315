/// 16-point compass labels, clockwise from north in 22.5° steps.
pub const DIRECTIONS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Round to one decimal place, halves away from zero.
///
/// # Examples
/// ```
/// use wildweather_ingest::utils::round_one_decimal;
///
/// assert_eq!(round_one_decimal(2.35), 2.4);
/// assert_eq!(round_one_decimal(-1.26), -1.3);
/// ```
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Convert a compass label to degrees.
///
/// Blank labels map to 0°, unrecognised labels to negative infinity.
pub fn direction_to_degrees(direction: &str) -> f64 {
    let direction = direction.trim();
    if direction.is_empty() {
        return 0.0;
    }
    DIRECTIONS
        .iter()
        .position(|label| *label == direction)
        .map(|index| index as f64 * 22.5)
        .unwrap_or(f64::NEG_INFINITY)
}

/// Convert degrees to the nearest compass label. Non-finite input has no label.
pub fn degrees_to_direction(degrees: f64) -> Option<&'static str> {
    if !degrees.is_finite() {
        return None;
    }
    let clean = ((degrees % 360.0) + 360.0) % 360.0;
    let index = ((clean + 11.25) / 22.5).floor() as usize % DIRECTIONS.len();
    Some(DIRECTIONS[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_one_decimal() {
        assert_eq!(round_one_decimal(2.34), 2.3);
        assert_eq!(round_one_decimal(2.35), 2.4);
        assert_eq!(round_one_decimal(-1.26), -1.3);
        assert_eq!(round_one_decimal(-0.25), -0.3);
        assert_eq!(round_one_decimal(11.0), 11.0);
    }

    #[test]
    fn test_direction_to_degrees() {
        assert_eq!(direction_to_degrees("N"), 0.0);
        assert_eq!(direction_to_degrees("NNE"), 22.5);
        assert_eq!(direction_to_degrees("NE"), 45.0);
        assert_eq!(direction_to_degrees("S"), 180.0);
        assert_eq!(direction_to_degrees("NNW"), 337.5);
        assert_eq!(direction_to_degrees(""), 0.0);
        assert_eq!(direction_to_degrees("   "), 0.0);
        assert_eq!(direction_to_degrees("GARBAGE"), f64::NEG_INFINITY);
    }

    #[test]
    fn test_degrees_to_direction() {
        assert_eq!(degrees_to_direction(0.0), Some("N"));
        assert_eq!(degrees_to_direction(11.0), Some("N"));
        assert_eq!(degrees_to_direction(11.25), Some("NNE"));
        assert_eq!(degrees_to_direction(90.0), Some("E"));
        assert_eq!(degrees_to_direction(350.0), Some("N"));
        assert_eq!(degrees_to_direction(-90.0), Some("W"));
        assert_eq!(degrees_to_direction(f64::NAN), None);
    }

    #[test]
    fn test_labels_survive_conversion_round_trip() {
        for label in DIRECTIONS {
            assert_eq!(degrees_to_direction(direction_to_degrees(label)), Some(label));
        }
    }
}
