use crate::coordinate::{IntermediateCoord, PixelCoord};
use crate::error::{WcsError, WcsResult};

const DETERMINANT_THRESHOLD: f64 = 1e-15;

/// CD-matrix mapping between pixel offsets from `crpix` and tangent-plane degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransform {
    crpix: [f64; 2],
    cd: [[f64; 2]; 2],
    cd_inverse: [[f64; 2]; 2],
    determinant: f64,
}

impl LinearTransform {
    pub fn from_cd(crpix: [f64; 2], cd: [[f64; 2]; 2]) -> WcsResult<Self> {
        let determinant = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        if determinant.abs() < DETERMINANT_THRESHOLD || !determinant.is_finite() {
            return Err(WcsError::singular_cd(determinant));
        }
        let cd_inverse = compute_inverse(cd, determinant);
        Ok(Self {
            crpix,
            cd,
            cd_inverse,
            determinant,
        })
    }

    pub fn pixel_to_intermediate(&self, pixel: PixelCoord) -> IntermediateCoord {
        let d0 = pixel.x() - self.crpix[0];
        let d1 = pixel.y() - self.crpix[1];
        let x = self.cd[0][0] * d0 + self.cd[0][1] * d1;
        let y = self.cd[1][0] * d0 + self.cd[1][1] * d1;
        IntermediateCoord::new(x, y)
    }

    pub fn intermediate_to_pixel(&self, inter: IntermediateCoord) -> PixelCoord {
        let x = inter.x_deg();
        let y = inter.y_deg();
        let px = self.cd_inverse[0][0] * x + self.cd_inverse[0][1] * y + self.crpix[0];
        let py = self.cd_inverse[1][0] * x + self.cd_inverse[1][1] * y + self.crpix[1];
        PixelCoord::new(px, py)
    }

    /// Pixel offset (relative to `crpix`) that lands on the given tangent-plane point.
    pub fn intermediate_to_offset(&self, inter: IntermediateCoord) -> (f64, f64) {
        let p = self.intermediate_to_pixel(inter);
        (p.x() - self.crpix[0], p.y() - self.crpix[1])
    }

    #[inline]
    pub fn crpix(&self) -> [f64; 2] {
        self.crpix
    }

    #[inline]
    pub fn cd_matrix(&self) -> [[f64; 2]; 2] {
        self.cd
    }

    #[inline]
    pub fn cd_inverse(&self) -> [[f64; 2]; 2] {
        self.cd_inverse
    }

    #[inline]
    pub fn determinant(&self) -> f64 {
        self.determinant
    }

    /// Mean pixel scale in degrees per pixel.
    #[inline]
    pub fn pixel_scale(&self) -> f64 {
        libm::sqrt(self.determinant.abs())
    }

    /// A positive CD determinant means the image is mirrored relative to the sky.
    #[inline]
    pub fn is_flipped(&self) -> bool {
        self.determinant > 0.0
    }
}

fn compute_inverse(m: [[f64; 2]; 2], det: f64) -> [[f64; 2]; 2] {
    let inv_det = 1.0 / det;
    [
        [m[1][1] * inv_det, -m[0][1] * inv_det],
        [-m[1][0] * inv_det, m[0][0] * inv_det],
    ]
}
