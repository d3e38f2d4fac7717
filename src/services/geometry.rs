//! Great-circle distance between coordinates

use crate::domain::types::Location;

const STATUTE_MILES_PER_NAUTICAL_MILE: f64 = 1.15077945;
/// One nautical mile per arc minute
const NAUTICAL_MILES_PER_DEGREE: f64 = 60.0;

/// Distance in statute miles using the spherical law of cosines
///
/// The cosine is clamped to [-1, 1] so rounding on identical or antipodal
/// points cannot push `acos` out of its domain.
pub fn distance(a: &Location, b: &Location) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lon1 = a.longitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let lon2 = b.longitude.to_radians();

    let cos_angle = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * (lon1 - lon2).cos();
    let angle = cos_angle.clamp(-1.0, 1.0).acos();

    let nautical_miles = NAUTICAL_MILES_PER_DEGREE * angle.to_degrees();
    STATUTE_MILES_PER_NAUTICAL_MILE * nautical_miles
}
