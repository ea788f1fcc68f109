//! Unit conversions between provider units and the units the model and the
//! archive use. `None` in, `None` out.

const MS_TO_KNOTS: f64 = 1.94384;
const KNOTS_TO_MS: f64 = 0.514444;
const METERS_TO_FEET: f64 = 3.28084;

pub fn ms_to_knots(ms: Option<f64>) -> Option<f64> {
    ms.map(|v| v * MS_TO_KNOTS)
}

pub fn knots_to_ms(knots: Option<f64>) -> Option<f64> {
    knots.map(|v| v * KNOTS_TO_MS)
}

pub fn meters_to_feet(meters: Option<f64>) -> Option<f64> {
    meters.map(|v| v * METERS_TO_FEET)
}

pub fn feet_to_meters(feet: Option<f64>) -> Option<f64> {
    feet.map(|v| v / METERS_TO_FEET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knots_round_trip_within_tolerance() {
        // The two published factors are not exact reciprocals; 1e-5 covers the gap.
        for tenth in 1..=500 {
            let ms = tenth as f64 / 10.0;
            let back = knots_to_ms(ms_to_knots(Some(ms))).unwrap();
            let rel = ((back - ms) / ms).abs();
            assert!(rel < 1e-5, "{ms} m/s came back as {back} (rel {rel})");
        }
        assert_eq!(knots_to_ms(ms_to_knots(Some(0.0))), Some(0.0));
    }

    #[test]
    fn none_propagates() {
        assert_eq!(ms_to_knots(None), None);
        assert_eq!(knots_to_ms(None), None);
        assert_eq!(meters_to_feet(None), None);
        assert_eq!(feet_to_meters(None), None);
    }

    #[test]
    fn metres_to_feet_matches_factor() {
        assert!((meters_to_feet(Some(2.0)).unwrap() - 6.56168).abs() < 1e-9);
        assert!((feet_to_meters(meters_to_feet(Some(1.7))).unwrap() - 1.7).abs() < 1e-12);
    }
}
