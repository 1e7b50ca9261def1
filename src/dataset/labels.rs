//! Area labels encoded in image file names
//!
//! File names follow `<anything>_a<number>[_<anything>].<ext>`; the area is
//! the number that follows the last `_a` marker.

use std::path::Path;

use tracing::warn;

const AREA_MARKER: &str = "_a";

/// Extract the area label from a path, looking only at its file name
pub fn area_from_path(path: &Path) -> f32 {
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => area_from_file_name(name),
        None => 0.0,
    }
}

/// Extract the area label from a file name.
///
/// Names without the marker are unlabeled and map to `0.0` silently. A
/// marker followed by something that is not a non-negative finite number
/// logs a warning and also maps to `0.0`; the sample is kept either way.
pub fn area_from_file_name(file_name: &str) -> f32 {
    let Some(start) = file_name.rfind(AREA_MARKER) else {
        return 0.0;
    };

    let remainder = &file_name[start + AREA_MARKER.len()..];
    let token = remainder.split('_').next().unwrap_or_default();
    let candidate = area_token(token);

    match candidate.parse::<f32>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            warn!(
                "Could not parse area from '{}' (token '{}'), using 0.0",
                file_name, token
            );
            0.0
        }
    }
}

/// Keep at most one decimal point: `12.5.jpg` becomes `12.5`
fn area_token(token: &str) -> String {
    if !token.contains('.') {
        return token.to_string();
    }

    let mut parts = token.split('.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    format!("{}.{}", whole, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::capture_warnings;
    use std::path::PathBuf;

    #[test]
    fn test_decimal_area() {
        assert_eq!(area_from_file_name("ant1_a12.5_x.jpg"), 12.5);
    }

    #[test]
    fn test_integer_area() {
        assert_eq!(area_from_file_name("ant2_a7_y.png"), 7.0);
    }

    #[test]
    fn test_missing_marker_is_zero() {
        assert_eq!(area_from_file_name("ant3.jpg"), 0.0);
    }

    #[test]
    fn test_non_numeric_token_is_zero() {
        assert_eq!(area_from_file_name("ant4_abad_x.jpg"), 0.0);
    }

    #[test]
    fn test_non_numeric_token_warns() {
        let (area, logs) = capture_warnings(|| area_from_file_name("ant4_abad_x.jpg"));
        assert_eq!(area, 0.0);
        assert!(logs.contains("WARN"), "{}", logs);
        assert!(logs.contains("ant4_abad_x.jpg"), "{}", logs);
    }

    #[test]
    fn test_unlabeled_name_is_silent() {
        let (area, logs) = capture_warnings(|| area_from_file_name("ant3.jpg"));
        assert_eq!(area, 0.0);
        assert!(logs.is_empty(), "{}", logs);
    }

    #[test]
    fn test_last_marker_wins() {
        assert_eq!(area_from_file_name("colony_a3_ant_a0.25_crop.png"), 0.25);
    }

    #[test]
    fn test_extra_dot_segments_are_discarded() {
        // Token runs into the extension when no trailing underscore follows
        assert_eq!(area_from_file_name("ant_a12.5.jpg"), 12.5);
        assert_eq!(area_from_file_name("ant_a1.2.3_x.png"), 1.2);
    }

    #[test]
    fn test_negative_area_is_rejected() {
        assert_eq!(area_from_file_name("ant_a-3_x.png"), 0.0);
    }

    #[test]
    fn test_directory_components_are_ignored() {
        let path = PathBuf::from("/data/run_a99/ant5_a0.004_z.png");
        assert_eq!(area_from_path(&path), 0.004);

        let unlabeled = PathBuf::from("/data/run_a99/ant6.png");
        assert_eq!(area_from_path(&unlabeled), 0.0);
    }
}
