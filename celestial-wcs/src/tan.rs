use crate::coordinate::{PixelCoord, SkyCoord};
use crate::distortion::SipDistortion;
use crate::error::{WcsError, WcsResult};
use crate::linear::LinearTransform;
use crate::projection::{deproject, project};

/// Reference frame a solution is expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub equinox: f64,
    pub ra_dec_sys: String,
}

impl Frame {
    pub fn new(equinox: f64, ra_dec_sys: impl Into<String>) -> Self {
        Self {
            equinox,
            ra_dec_sys: ra_dec_sys.into(),
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new(2000.0, "FK5")
    }
}

/// The subset of a transform needed to seed a guided solve.
pub trait SkyTransform {
    fn pixel_to_sky(&self, pixel: PixelCoord) -> SkyCoord;

    fn is_flipped(&self) -> bool;

    /// Solid angle covered by one pixel centred on `pixel`, in square degrees.
    fn pixel_area_deg2(&self, pixel: PixelCoord) -> f64;
}

/// Gnomonic world coordinate system with an optional SIP distortion.
#[derive(Debug, Clone, PartialEq)]
pub struct TanWcs {
    linear: LinearTransform,
    crval: SkyCoord,
    sip: Option<SipDistortion>,
    frame: Frame,
    image_size: Option<(f64, f64)>,
}

impl TanWcs {
    pub fn new(crval: SkyCoord, crpix: [f64; 2], cd: [[f64; 2]; 2], frame: Frame) -> WcsResult<Self> {
        if !crval.ra_deg().is_finite()
            || !crval.dec_deg().is_finite()
            || crval.dec_deg().abs() > 90.0
        {
            return Err(WcsError::invalid_reference_point(crval));
        }
        Ok(Self {
            linear: LinearTransform::from_cd(crpix, cd)?,
            crval,
            sip: None,
            frame,
            image_size: None,
        })
    }

    /// Attach a distortion; its reference pixel is aligned with this transform's `crpix`.
    pub fn with_sip(mut self, sip: SipDistortion) -> Self {
        self.sip = Some(sip.with_crpix(self.linear.crpix()));
        self
    }

    pub fn with_image_size(mut self, width: f64, height: f64) -> Self {
        self.image_size = Some((width, height));
        self
    }

    #[inline]
    pub fn crval(&self) -> SkyCoord {
        self.crval
    }

    #[inline]
    pub fn crpix(&self) -> [f64; 2] {
        self.linear.crpix()
    }

    #[inline]
    pub fn cd_matrix(&self) -> [[f64; 2]; 2] {
        self.linear.cd_matrix()
    }

    #[inline]
    pub fn sip(&self) -> Option<&SipDistortion> {
        self.sip.as_ref()
    }

    #[inline]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    #[inline]
    pub fn image_size(&self) -> Option<(f64, f64)> {
        self.image_size
    }

    #[inline]
    pub fn linear(&self) -> &LinearTransform {
        &self.linear
    }

    pub fn pixel_to_sky(&self, pixel: PixelCoord) -> SkyCoord {
        let undistorted = match &self.sip {
            Some(sip) => {
                let (x, y) = sip.apply(pixel.x(), pixel.y());
                PixelCoord::new(x, y)
            }
            None => pixel,
        };
        deproject(self.crval, self.linear.pixel_to_intermediate(undistorted))
    }

    pub fn sky_to_pixel(&self, sky: SkyCoord) -> WcsResult<PixelCoord> {
        let inter = project(self.crval, sky)?;
        let linear_pixel = self.linear.intermediate_to_pixel(inter);
        match &self.sip {
            Some(sip) => {
                let (x, y) = sip.apply_inverse(linear_pixel.x(), linear_pixel.y())?;
                Ok(PixelCoord::new(x, y))
            }
            None => Ok(linear_pixel),
        }
    }

    /// Mean plate scale at the reference pixel, in arcseconds per pixel.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        self.linear.pixel_scale() * 3600.0
    }

    pub fn is_flipped(&self) -> bool {
        self.linear.is_flipped()
    }

    pub fn pixel_area_deg2(&self, pixel: PixelCoord) -> f64 {
        let corner = |dx: f64, dy: f64| {
            self.pixel_to_sky(PixelCoord::new(pixel.x() + dx, pixel.y() + dy))
                .to_unit_vector()
        };
        let a = corner(-0.5, -0.5);
        let b = corner(0.5, -0.5);
        let c = corner(0.5, 0.5);
        let d = corner(-0.5, 0.5);

        let steradians = 0.5 * (cross_norm(sub(b, a), sub(d, a)) + cross_norm(sub(b, c), sub(d, c)));
        steradians * (180.0 / std::f64::consts::PI).powi(2)
    }
}

impl SkyTransform for TanWcs {
    fn pixel_to_sky(&self, pixel: PixelCoord) -> SkyCoord {
        TanWcs::pixel_to_sky(self, pixel)
    }

    fn is_flipped(&self) -> bool {
        TanWcs::is_flipped(self)
    }

    fn pixel_area_deg2(&self, pixel: PixelCoord) -> f64 {
        TanWcs::pixel_area_deg2(self, pixel)
    }
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross_norm(a: [f64; 3], b: [f64; 3]) -> f64 {
    let x = a[1] * b[2] - a[2] * b[1];
    let y = a[2] * b[0] - a[0] * b[2];
    let z = a[0] * b[1] - a[1] * b[0];
    libm::sqrt(x * x + y * y + z * z)
}
