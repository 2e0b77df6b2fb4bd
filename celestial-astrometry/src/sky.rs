//! Small spherical helpers shared by index selection and catalog queries.

use celestial_wcs::SkyCoord;

pub const ARCSEC_PER_DEG: f64 = 3600.0;

#[inline]
pub fn arcsec_to_deg(arcsec: f64) -> f64 {
    arcsec / ARCSEC_PER_DEG
}

#[inline]
pub fn deg_to_arcsec(deg: f64) -> f64 {
    deg * ARCSEC_PER_DEG
}

#[inline]
pub fn arcsec_to_arcmin(arcsec: f64) -> f64 {
    arcsec / 60.0
}

/// Vincenty great-circle distance, stable at every separation.
pub fn angular_separation_deg(ra1_deg: f64, dec1_deg: f64, ra2_deg: f64, dec2_deg: f64) -> f64 {
    let (sin_lat1, cos_lat1) = libm::sincos(dec1_deg.to_radians());
    let (sin_lat2, cos_lat2) = libm::sincos(dec2_deg.to_radians());
    let (sin_dlon, cos_dlon) = libm::sincos((ra2_deg - ra1_deg).to_radians());

    let num = libm::sqrt(
        (cos_lat2 * sin_dlon).powi(2) + (cos_lat1 * sin_lat2 - sin_lat1 * cos_lat2 * cos_dlon).powi(2),
    );
    let den = sin_lat1 * sin_lat2 + cos_lat1 * cos_lat2 * cos_dlon;

    libm::atan2(num, den).to_degrees()
}

#[inline]
pub fn radec_to_xyz(ra_deg: f64, dec_deg: f64) -> [f64; 3] {
    SkyCoord::new(ra_deg, dec_deg).to_unit_vector()
}

#[inline]
pub fn xyz_to_radec(xyz: [f64; 3]) -> (f64, f64) {
    let sky = SkyCoord::from_unit_vector(xyz);
    (sky.ra_deg(), sky.dec_deg())
}

/// A circular region of sky.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCap {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub radius_deg: f64,
}

impl SkyCap {
    pub fn new(ra_deg: f64, dec_deg: f64, radius_deg: f64) -> Self {
        Self {
            ra_deg,
            dec_deg,
            radius_deg,
        }
    }

    pub fn center_xyz(&self) -> [f64; 3] {
        radec_to_xyz(self.ra_deg, self.dec_deg)
    }

    pub fn contains(&self, ra_deg: f64, dec_deg: f64) -> bool {
        angular_separation_deg(self.ra_deg, self.dec_deg, ra_deg, dec_deg) <= self.radius_deg
    }

    pub fn intersects(&self, other: &SkyCap) -> bool {
        angular_separation_deg(self.ra_deg, self.dec_deg, other.ra_deg, other.dec_deg)
            <= self.radius_deg + other.radius_deg
    }
}
