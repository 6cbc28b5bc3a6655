//! Run configuration model and value validation.
//!
//! The resolver produces a [`PendingConfiguration`] whose operator-answerable
//! fields may still be open; the prompt step closes them into the immutable
//! [`RunConfiguration`] handed to the pipeline.
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{ConfigurationError, CoordinateError};

mod resolve;

pub use resolve::resolve;

/// Workspace root used when neither `--vgl-dir` nor `VGL_DIR` is given.
pub const DEFAULT_VGL_DIR: &str = "vgl_workspace";
/// Satellite stitch size used when none is given.
pub const DEFAULT_STITCH_SIZE: u32 = 8;
/// Low-altitude mode only applies below this ground sample distance.
pub const MAX_LOW_ALTITUDE_GSD: f64 = 20.0;

/// Processing mode plus the inputs that only exist in that mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// One aerial image, matched directly.
    HighAltitude { image: PathBuf },
    /// Many drone captures, mosaicked by ODM before matching.
    LowAltitude {
        gsd_cm_per_px: f64,
        odm_project: PathBuf,
    },
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::HighAltitude { .. } => "high-altitude",
            Mode::LowAltitude { .. } => "low-altitude",
        }
    }

    pub fn is_low_altitude(&self) -> bool {
        matches!(self, Mode::LowAltitude { .. })
    }
}

/// Operator choice that flags may force either way or leave open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Choice {
    On,
    Off,
    #[default]
    Ask,
}

impl Choice {
    /// Fold an on/off flag pair; clap already resolved which one came last.
    pub fn from_flags(on: bool, off: bool) -> Self {
        match (on, off) {
            (true, _) => Choice::On,
            (_, true) => Choice::Off,
            _ => Choice::Ask,
        }
    }

    /// Forced value, if any.
    pub fn forced(self) -> Option<bool> {
        match self {
            Choice::On => Some(true),
            Choice::Off => Some(false),
            Choice::Ask => None,
        }
    }
}

/// Satellite area of interest. Only constructible in a validated state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    top_left_lat: f64,
    top_left_lon: f64,
    bottom_right_lat: f64,
    bottom_right_lon: f64,
}

pub(crate) const TOP_LEFT_LAT: &str = "top-left latitude";
pub(crate) const TOP_LEFT_LON: &str = "top-left longitude";
pub(crate) const BOTTOM_RIGHT_LAT: &str = "bottom-right latitude";
pub(crate) const BOTTOM_RIGHT_LON: &str = "bottom-right longitude";

/// Coordinate field labels in prompt and argument order.
pub(crate) const COORDINATE_FIELDS: [&str; 4] =
    [TOP_LEFT_LAT, TOP_LEFT_LON, BOTTOM_RIGHT_LAT, BOTTOM_RIGHT_LON];

impl BoundingBox {
    /// Validate four already-parsed coordinates.
    pub fn new(
        top_left_lat: f64,
        top_left_lon: f64,
        bottom_right_lat: f64,
        bottom_right_lon: f64,
    ) -> Result<Self, CoordinateError> {
        check_range(TOP_LEFT_LAT, top_left_lat)?;
        check_range(TOP_LEFT_LON, top_left_lon)?;
        check_range(BOTTOM_RIGHT_LAT, bottom_right_lat)?;
        check_range(BOTTOM_RIGHT_LON, bottom_right_lon)?;
        Ok(Self {
            top_left_lat,
            top_left_lon,
            bottom_right_lat,
            bottom_right_lon,
        })
    }

    /// Validate raw coordinate text as a unit: all four or none.
    ///
    /// Returns `Ok(None)` when no coordinate was supplied at all.
    pub fn from_parts(parts: [Option<&str>; 4]) -> Result<Option<Self>, CoordinateError> {
        if parts.iter().all(Option::is_none) {
            return Ok(None);
        }
        let missing: Vec<&'static str> = COORDINATE_FIELDS
            .iter()
            .zip(parts.iter())
            .filter(|(_, part)| part.is_none())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(CoordinateError::Incomplete { missing });
        }
        let mut values = [0.0; 4];
        for (slot, (field, raw)) in values
            .iter_mut()
            .zip(COORDINATE_FIELDS.iter().zip(parts.iter()))
        {
            *slot = parse_coordinate(field, raw.unwrap_or_default())?;
        }
        Self::new(values[0], values[1], values[2], values[3]).map(Some)
    }

    pub fn top_left(&self) -> (f64, f64) {
        (self.top_left_lat, self.top_left_lon)
    }

    pub fn bottom_right(&self) -> (f64, f64) {
        (self.bottom_right_lat, self.bottom_right_lon)
    }
}

/// Parse and range-check one coordinate field.
pub(crate) fn parse_coordinate(field: &'static str, raw: &str) -> Result<f64, CoordinateError> {
    let value = parse_decimal(raw, true).ok_or_else(|| CoordinateError::Malformed {
        field,
        value: raw.to_string(),
    })?;
    check_range(field, value)?;
    Ok(value)
}

fn check_range(field: &'static str, value: f64) -> Result<(), CoordinateError> {
    let limit = if field == TOP_LEFT_LAT || field == BOTTOM_RIGHT_LAT {
        90.0
    } else {
        180.0
    };
    if (-limit..=limit).contains(&value) {
        Ok(())
    } else {
        Err(CoordinateError::OutOfRange {
            field,
            value,
            min: -limit,
            max: limit,
        })
    }
}

fn unsigned_decimal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)$").expect("valid regex"))
}

fn signed_decimal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)$").expect("valid regex")
    })
}

/// Parse a plain decimal number (digits with an optional decimal point).
///
/// A leading `+`/`-` is accepted only when `allow_sign` is set. Exponents,
/// `inf` and `NaN` are rejected even though `f64::from_str` would take them.
pub fn parse_decimal(raw: &str, allow_sign: bool) -> Option<f64> {
    let raw = raw.trim();
    let pattern = if allow_sign {
        signed_decimal()
    } else {
        unsigned_decimal()
    };
    if !pattern.is_match(raw) {
        return None;
    }
    raw.parse::<f64>().ok()
}

/// Parse a strictly positive integer count such as the stitch size.
pub fn parse_count(field: &'static str, raw: &str) -> Result<u32, ConfigurationError> {
    let invalid = |reason| ConfigurationError::InvalidValue {
        field,
        value: raw.to_string(),
        reason,
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a positive integer"));
    }
    let value: u32 = trimmed
        .parse()
        .map_err(|_| invalid("expected a positive integer"))?;
    if value == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(value)
}

/// Output of argument resolution; open fields are settled by the prompt step.
#[derive(Debug, Clone)]
pub struct PendingConfiguration {
    pub mode: Mode,
    pub vgl_dir: Option<PathBuf>,
    pub use_gpu: Choice,
    pub download_satellite: Choice,
    pub bounding_box: Option<BoundingBox>,
    pub stitch_size: Option<u32>,
    pub skip_orthophoto_review: bool,
    pub interactive: bool,
    pub dry_run: bool,
    pub verbose: bool,
}

/// Fully resolved, immutable inputs for one pipeline execution.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub mode: Mode,
    pub vgl_dir: PathBuf,
    pub use_gpu: bool,
    pub download_satellite: bool,
    pub bounding_box: Option<BoundingBox>,
    pub stitch_size: u32,
    pub skip_orthophoto_review: bool,
    pub interactive: bool,
    pub dry_run: bool,
    pub verbose: bool,
}

impl RunConfiguration {
    pub fn vgl_dir(&self) -> &Path {
        &self.vgl_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decimal_respects_sign_policy() {
        assert_eq!(parse_decimal("15.5", false), Some(15.5));
        assert_eq!(parse_decimal(".5", false), Some(0.5));
        assert_eq!(parse_decimal("7.", false), Some(7.0));
        assert_eq!(parse_decimal("-33.8", false), None);
        assert_eq!(parse_decimal("+3", false), None);
        assert_eq!(parse_decimal("-33.8", true), Some(-33.8));
        assert_eq!(parse_decimal("+151.2", true), Some(151.2));
    }

    #[test]
    fn parse_decimal_rejects_non_plain_numbers() {
        for raw in ["", ".", "1e3", "inf", "NaN", "1.2.3", "12abc", "--1", "0x10"] {
            assert_eq!(parse_decimal(raw, true), None, "accepted {raw:?}");
        }
    }

    #[test]
    fn parse_count_requires_positive_integer() {
        assert_eq!(parse_count("stitch size", "8").expect("valid"), 8);
        assert!(parse_count("stitch size", "0").is_err());
        assert!(parse_count("stitch size", "-4").is_err());
        assert!(parse_count("stitch size", "2.5").is_err());
        assert!(parse_count("stitch size", "").is_err());
    }

    #[test]
    fn choice_folds_flag_pairs() {
        assert_eq!(Choice::from_flags(true, false), Choice::On);
        assert_eq!(Choice::from_flags(false, true), Choice::Off);
        assert_eq!(Choice::from_flags(false, false), Choice::Ask);
        assert_eq!(Choice::Ask.forced(), None);
    }

    #[test]
    fn bounding_box_accepts_range_edges() {
        let bbox = BoundingBox::new(90.0, -180.0, -90.0, 180.0).expect("edges are inclusive");
        assert_eq!(bbox.top_left(), (90.0, -180.0));
        assert_eq!(bbox.bottom_right(), (-90.0, 180.0));
    }

    #[test]
    fn bounding_box_reports_missing_fields() {
        let err = BoundingBox::from_parts([Some("10"), None, Some("9"), None])
            .expect_err("partial box");
        assert_eq!(
            err,
            CoordinateError::Incomplete {
                missing: vec![TOP_LEFT_LON, BOTTOM_RIGHT_LON]
            }
        );
    }

    #[test]
    fn bounding_box_absent_when_no_parts() {
        assert_eq!(BoundingBox::from_parts([None; 4]).expect("empty"), None);
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        fn in_range_parts() -> impl Strategy<Value = [f64; 4]> {
            (-90.0..=90.0f64, -180.0..=180.0f64, -90.0..=90.0f64, -180.0..=180.0f64)
                .prop_map(|(a, b, c, d)| [a, b, c, d])
        }

        proptest! {
            #[test]
            fn partial_boxes_are_always_rejected(
                values in in_range_parts(),
                mask in 1u8..15,
            ) {
                let rendered: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
                let mut parts: [Option<&str>; 4] = [None; 4];
                for (idx, part) in parts.iter_mut().enumerate() {
                    if mask & (1 << idx) != 0 {
                        *part = Some(rendered[idx].as_str());
                    }
                }
                let is_incomplete = matches!(
                    BoundingBox::from_parts(parts),
                    Err(CoordinateError::Incomplete { .. })
                );
                prop_assert!(is_incomplete);
            }

            #[test]
            fn complete_in_range_boxes_always_pass(values in in_range_parts()) {
                let rendered: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
                let parts = [
                    Some(rendered[0].as_str()),
                    Some(rendered[1].as_str()),
                    Some(rendered[2].as_str()),
                    Some(rendered[3].as_str()),
                ];
                prop_assert!(BoundingBox::from_parts(parts).expect("valid").is_some());
            }

            #[test]
            fn any_out_of_range_coordinate_is_rejected(
                values in in_range_parts(),
                slot in 0usize..4,
                excess in 0.001f64..1000.0,
                negative in any::<bool>(),
            ) {
                let mut values = values;
                let limit = if slot % 2 == 0 { 90.0 } else { 180.0 };
                values[slot] = if negative { -(limit + excess) } else { limit + excess };
                let is_out_of_range = matches!(
                    BoundingBox::new(values[0], values[1], values[2], values[3]),
                    Err(CoordinateError::OutOfRange { .. })
                );
                prop_assert!(is_out_of_range);
            }
        }
    }
}
