//! Maneuver codes
//!
//! The device understands a single signed integer per maneuver:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Continue straight / nothing to announce |
//! | -1, -2, -3 | Slight, normal, sharp left |
//! | 1, 2, 3 | Slight, normal, sharp right |
//! | -7, 7 | Keep left, keep right |
//! | -8, 8 | U-turn left, U-turn right |
//! | 4 | Destination reached |
//! | 5 | Via point reached |
//! | -6 | Leave roundabout |
//! | 10..=17 | Roundabout, by exit angle (see [`ROUNDABOUT_TABLE`]) |
//!
//! Routing provider signs map to these codes one to one, except the
//! roundabout sign which is split by exit angle and the unknown-direction
//! U-turn which becomes a left U-turn.

/// Continue straight, also used when nothing is announced
pub const CODE_CONTINUE: i32 = 0;

/// Provider sign for "use roundabout"
pub const SIGN_ROUNDABOUT: i32 = 6;

/// Provider sign for a U-turn with unknown direction
pub const SIGN_U_TURN_UNKNOWN: i32 = -98;

/// Code used for a left U-turn
pub const CODE_U_TURN_LEFT: i32 = -8;

/// Provider signs that map to the same device code
const DIRECT_SIGNS: [i32; 14] = [-8, -7, -6, -3, -2, -1, 0, 1, 2, 3, 4, 5, 7, 8];

/// Roundabout exit angle buckets, degrees over [-360, 0]
///
/// `(lower, upper, code)`: an angle `a` falls in the bucket when
/// `lower <= a < upper`; the last bucket also includes 0.
pub const ROUNDABOUT_TABLE: [(f64, f64, i32); 8] = [
    (-360.0, -315.0, 17),
    (-315.0, -270.0, 16),
    (-270.0, -225.0, 15),
    (-225.0, -180.0, 14),
    (-180.0, -135.0, 13),
    (-135.0, -90.0, 12),
    (-90.0, -45.0, 11),
    (-45.0, 0.0, 10),
];

/// First roundabout code, also used when the exit angle is unknown
pub const CODE_ROUNDABOUT_FIRST: i32 = 10;

pub const CODE_ROUNDABOUT_LAST: i32 = 17;

/// Roundabout code for an exit angle given in radians
///
/// Providers report negative angles for counter-clockwise roundabouts;
/// positive (clockwise) angles are mirrored onto the same table. Angles
/// beyond a full turn are clamped to the last bucket.
pub fn roundabout_code(turn_angle_rad: f64) -> i32 {
    if !turn_angle_rad.is_finite() {
        return CODE_ROUNDABOUT_FIRST;
    }
    let degrees = (-turn_angle_rad.abs().to_degrees()).max(-360.0);

    ROUNDABOUT_TABLE
        .iter()
        .find(|(lower, upper, _)| *lower <= degrees && (degrees < *upper || *upper == 0.0))
        .map(|(_, _, code)| *code)
        .unwrap_or(CODE_ROUNDABOUT_FIRST)
}

/// Device maneuver code for a provider instruction
pub fn maneuver_code(sign: i32, turn_angle_rad: Option<f64>) -> i32 {
    match sign {
        SIGN_ROUNDABOUT => turn_angle_rad
            .map(roundabout_code)
            .unwrap_or(CODE_ROUNDABOUT_FIRST),
        SIGN_U_TURN_UNKNOWN => CODE_U_TURN_LEFT,
        s if DIRECT_SIGNS.contains(&s) => s,
        s => {
            log::debug!("Unknown maneuver sign {}, announcing as straight", s);
            CODE_CONTINUE
        }
    }
}

/// True for codes in the roundabout sub-range
pub fn is_roundabout(code: i32) -> bool {
    (CODE_ROUNDABOUT_FIRST..=CODE_ROUNDABOUT_LAST).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_direct_signs() {
        assert_eq!(maneuver_code(-2, None), -2);
        assert_eq!(maneuver_code(3, None), 3);
        assert_eq!(maneuver_code(0, None), 0);
        assert_eq!(maneuver_code(4, None), 4);
        assert_eq!(maneuver_code(-98, None), -8);
    }

    #[test]
    fn test_unknown_sign_is_straight() {
        assert_eq!(maneuver_code(42, None), CODE_CONTINUE);
        assert_eq!(maneuver_code(-99, Some(1.0)), CODE_CONTINUE);
    }

    #[test]
    fn test_roundabout_buckets() {
        assert_eq!(maneuver_code(6, Some(-PI / 8.0)), 10); // -22.5°
        assert_eq!(maneuver_code(6, Some(-PI / 2.0 + 0.01)), 11); // just under -90°
        assert_eq!(maneuver_code(6, Some(-PI / 2.0 - 0.01)), 12); // just past -90°
        assert_eq!(maneuver_code(6, Some(-PI - 0.01)), 14); // just past -180°
        assert_eq!(maneuver_code(6, Some(-1.75 * PI - 0.01)), 17); // past -315°
        assert_eq!(maneuver_code(6, Some(-2.0 * PI)), 17);
        assert_eq!(maneuver_code(6, Some(-3.0 * PI)), 17);
    }

    #[test]
    fn test_roundabout_zero_and_unknown() {
        assert_eq!(roundabout_code(0.0), 10);
        assert_eq!(roundabout_code(f64::NAN), 10);
        assert_eq!(maneuver_code(6, None), 10);
    }

    #[test]
    fn test_clockwise_roundabout_is_mirrored() {
        assert_eq!(roundabout_code(PI / 8.0), roundabout_code(-PI / 8.0));
        assert_eq!(roundabout_code(PI + 0.01), 14);
    }

    #[test]
    fn test_is_roundabout() {
        assert!(is_roundabout(10));
        assert!(is_roundabout(17));
        assert!(!is_roundabout(-6));
        assert!(!is_roundabout(2));
    }
}
