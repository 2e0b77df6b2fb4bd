#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelCoord {
    x: f64,
    y: f64,
}

impl PixelCoord {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn distance_to(&self, other: PixelCoord) -> f64 {
        libm::hypot(other.x - self.x, other.y - self.y)
    }
}

/// Tangent-plane coordinates in degrees, relative to the reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntermediateCoord {
    x: f64,
    y: f64,
}

impl IntermediateCoord {
    #[inline]
    pub fn new(x_deg: f64, y_deg: f64) -> Self {
        Self { x: x_deg, y: y_deg }
    }

    #[inline]
    pub fn x_deg(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn y_deg(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn x_rad(&self) -> f64 {
        self.x.to_radians()
    }

    #[inline]
    pub fn y_rad(&self) -> f64 {
        self.y.to_radians()
    }
}

/// Equatorial sky position in degrees.
///
/// Right ascension is normalized to `[0, 360)` on construction; declination
/// is stored as given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    ra: f64,
    dec: f64,
}

impl SkyCoord {
    #[inline]
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            ra: normalize_ra(ra_deg),
            dec: dec_deg,
        }
    }

    #[inline]
    pub fn ra_deg(&self) -> f64 {
        self.ra
    }

    #[inline]
    pub fn dec_deg(&self) -> f64 {
        self.dec
    }

    /// Cartesian unit vector on the celestial sphere.
    pub fn to_unit_vector(&self) -> [f64; 3] {
        let (sin_ra, cos_ra) = libm::sincos(self.ra.to_radians());
        let (sin_dec, cos_dec) = libm::sincos(self.dec.to_radians());
        [cos_dec * cos_ra, cos_dec * sin_ra, sin_dec]
    }

    /// Inverse of [`SkyCoord::to_unit_vector`]. The vector need not be normalized.
    pub fn from_unit_vector(xyz: [f64; 3]) -> Self {
        let [x, y, z] = xyz;
        let ra = libm::atan2(y, x).to_degrees();
        let dec = libm::atan2(z, libm::hypot(x, y)).to_degrees();
        Self::new(ra, dec)
    }
}

fn normalize_ra(ra_deg: f64) -> f64 {
    let ra = libm::fmod(ra_deg, 360.0);
    if ra >= 0.0 {
        return ra;
    }
    let wrapped = ra + 360.0;
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_coord_new_and_accessors() {
        let p = PixelCoord::new(100.5, 200.5);
        assert_eq!(p.x(), 100.5);
        assert_eq!(p.y(), 200.5);
    }

    #[test]
    fn test_pixel_distance() {
        let a = PixelCoord::new(0.0, 0.0);
        let b = PixelCoord::new(3.0, 4.0);
        assert_eq!(a.distance_to(b), 5.0);
    }

    #[test]
    fn test_intermediate_coord() {
        let c = IntermediateCoord::new(0.001, -0.002);
        assert_eq!(c.x_deg(), 0.001);
        assert_eq!(c.y_deg(), -0.002);
        assert!((c.x_rad() - 0.001_f64.to_radians()).abs() < 1e-15);
        assert!((c.y_rad() - (-0.002_f64).to_radians()).abs() < 1e-15);
    }

    #[test]
    fn test_sky_coord_normalizes_ra() {
        assert_eq!(SkyCoord::new(-10.0, 5.0).ra_deg(), 350.0);
        assert_eq!(SkyCoord::new(370.0, 5.0).ra_deg(), 10.0);
    }

    #[test]
    fn test_unit_vector_axes() {
        let v = SkyCoord::new(0.0, 0.0).to_unit_vector();
        assert!((v[0] - 1.0).abs() < 1e-15);
        let pole = SkyCoord::new(123.0, 90.0).to_unit_vector();
        assert!((pole[2] - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_unit_vector_inverse() {
        let original = SkyCoord::new(283.5, -41.25);
        let recovered = SkyCoord::from_unit_vector(original.to_unit_vector());
        assert!((recovered.ra_deg() - 283.5).abs() < 1e-10);
        assert!((recovered.dec_deg() + 41.25).abs() < 1e-10);
    }
}
