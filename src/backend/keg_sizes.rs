//! Standard keg sizes.
//!
//! Labels are stable identifiers stored on [`Keg`](super::models::Keg)
//! records; descriptions are for display only.

/// `(label, description, volume in milliliters)`, ascending by volume.
pub const KEG_SIZES: &[(&str, &str, f64)] = &[
    ("corny", "Corny Keg (5 gal)", 18927.1),
    ("sixth", "Sixth Barrel (5.17 gal)", 19570.6),
    ("quarter", "Quarter Barrel (7.75 gal)", 29336.9),
    ("euro-half", "European Half Barrel (50 L)", 50000.0),
    ("half-barrel", "Half Barrel (15.5 gal)", 58673.9),
    ("euro", "European Full Barrel (100 L)", 100000.0),
];

/// Volume in milliliters for a size label, or `None` for unknown labels.
pub fn volume_ml(label: &str) -> Option<f64> {
    KEG_SIZES
        .iter()
        .find(|(l, _, _)| *l == label)
        .map(|(_, _, v)| *v)
}

/// Human-readable description for a size label.
pub fn description(label: &str) -> Option<&'static str> {
    KEG_SIZES
        .iter()
        .find(|(l, _, _)| *l == label)
        .map(|(_, d, _)| *d)
}

/// All labels, ascending by volume.
pub fn labels() -> impl Iterator<Item = &'static str> {
    KEG_SIZES.iter().map(|(l, _, _)| *l)
}

/// Label of the size whose volume is nearest to `volume_ml`.
pub fn nearest_label(volume_ml: f64) -> &'static str {
    let mut best = KEG_SIZES[0];
    for size in KEG_SIZES {
        if (size.2 - volume_ml).abs() < (best.2 - volume_ml).abs() {
            best = *size;
        }
    }
    best.0
}
