//! Gnomonic (TAN) projection between the tangent plane and the sky.
//!
//! Tangent-plane coordinates are the standard coordinates (ξ, η) in degrees,
//! with ξ increasing toward increasing right ascension and η toward north.

use crate::coordinate::{IntermediateCoord, SkyCoord};
use crate::error::{WcsError, WcsResult};

/// Map a tangent-plane point back onto the sphere around `crval`.
pub fn deproject(crval: SkyCoord, inter: IntermediateCoord) -> SkyCoord {
    let xi = inter.x_rad();
    let eta = inter.y_rad();
    let (sin_dec0, cos_dec0) = libm::sincos(crval.dec_deg().to_radians());

    let denom = cos_dec0 - eta * sin_dec0;
    let ra = crval.ra_deg().to_radians() + libm::atan2(xi, denom);
    let dec = libm::atan2(sin_dec0 + eta * cos_dec0, libm::hypot(xi, denom));

    SkyCoord::new(ra.to_degrees(), dec.to_degrees())
}

/// Project a sky position onto the plane tangent at `crval`.
///
/// Points 90° or more from the tangent point have no gnomonic image.
pub fn project(crval: SkyCoord, sky: SkyCoord) -> WcsResult<IntermediateCoord> {
    let (sin_dec0, cos_dec0) = libm::sincos(crval.dec_deg().to_radians());
    let (sin_dec, cos_dec) = libm::sincos(sky.dec_deg().to_radians());
    let (sin_dra, cos_dra) = libm::sincos((sky.ra_deg() - crval.ra_deg()).to_radians());

    let cos_c = sin_dec0 * sin_dec + cos_dec0 * cos_dec * cos_dra;
    if cos_c <= 0.0 {
        return Err(WcsError::behind_tangent_plane(sky));
    }

    let xi = cos_dec * sin_dra / cos_c;
    let eta = (cos_dec0 * sin_dec - sin_dec0 * cos_dec * cos_dra) / cos_c;
    Ok(IntermediateCoord::new(xi.to_degrees(), eta.to_degrees()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tangent_point_maps_to_origin() {
        let crval = SkyCoord::new(150.0, 2.2);
        let inter = project(crval, crval).unwrap();
        assert!(inter.x_deg().abs() < 1e-12);
        assert!(inter.y_deg().abs() < 1e-12);
    }

    #[test]
    fn test_origin_maps_to_tangent_point() {
        let crval = SkyCoord::new(10.0, 20.0);
        let sky = deproject(crval, IntermediateCoord::new(0.0, 0.0));
        assert!((sky.ra_deg() - 10.0).abs() < 1e-12);
        assert!((sky.dec_deg() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_roundtrip_near_pole() {
        let crval = SkyCoord::new(45.0, 89.5);
        let original = IntermediateCoord::new(0.3, -0.2);
        let recovered = project(crval, deproject(crval, original)).unwrap();
        assert!((recovered.x_deg() - 0.3).abs() < 1e-10);
        assert!((recovered.y_deg() + 0.2).abs() < 1e-10);
    }

    #[test]
    fn test_north_offset_increases_declination() {
        let crval = SkyCoord::new(0.0, 0.0);
        let sky = deproject(crval, IntermediateCoord::new(0.0, 1.0));
        assert!((sky.dec_deg() - 1.0).abs() < 1e-3);
        assert!(sky.ra_deg().abs() < 1e-12);
    }

    #[test]
    fn test_behind_plane_rejected() {
        let crval = SkyCoord::new(0.0, 0.0);
        let result = project(crval, SkyCoord::new(180.0, 0.0));
        assert!(matches!(result, Err(WcsError::BehindTangentPlane { .. })));
    }
}
