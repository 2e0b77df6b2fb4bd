//! Interface to the external quad-matching engine.
//!
//! The engine owns its session state (field, tunables, best match). This
//! crate only drives it; a production binding wraps the native solver and
//! tests use [`crate::test_helpers::StubEngine`].

use celestial_wcs::{Frame, SkyCoord, TanWcs, WcsResult};

use crate::error::{SolveError, SolveResult};
use crate::field::Detection;
use crate::index::{CatalogIndex, IndexKey};
use crate::sky::SkyCap;

/// Image handedness relative to the sky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    Normal,
    Flipped,
    #[default]
    Unknown,
}

impl Parity {
    /// Decode the engine's numeric parity: 0 normal, 1 flipped, 2 either.
    pub fn from_code(code: i32) -> SolveResult<Self> {
        match code {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Flipped),
            2 => Ok(Self::Unknown),
            other => Err(SolveError::invalid_configuration(format!(
                "illegal parity setting {other}"
            ))),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Flipped => 1,
            Self::Unknown => 2,
        }
    }
}

/// Linear tangent-plane solution as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TanSolution {
    /// Reference sky point (ra, dec) in degrees.
    pub crval: [f64; 2],
    pub crpix: [f64; 2],
    pub cd: [[f64; 2]; 2],
    pub image_width: f64,
    pub image_height: f64,
}

impl TanSolution {
    pub fn pixel_scale_arcsec(&self) -> f64 {
        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        libm::sqrt(det.abs()) * 3600.0
    }

    pub fn to_wcs(&self, frame: &Frame) -> WcsResult<TanWcs> {
        let wcs = TanWcs::new(
            SkyCoord::new(self.crval[0], self.crval[1]),
            self.crpix,
            self.cd,
            frame.clone(),
        )?;
        Ok(wcs.with_image_size(self.image_width, self.image_height))
    }
}

/// Best match found by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub index_key: IndexKey,
    pub index_name: String,
    /// For each star of the active field, the position in `ref_xyz` of its catalog counterpart.
    pub correspondence: Vec<Option<usize>>,
    /// Per field star log-odds that the correspondence is real.
    pub match_odds: Vec<f64>,
    pub tan: TanSolution,
    /// Reference stars near the field, as unit vectors.
    pub ref_xyz: Vec<[f64; 3]>,
    /// Tag-along table row of each reference star.
    pub ref_rows: Vec<usize>,
    pub center_xyz: [f64; 3],
    pub radius_deg: f64,
    pub scale_arcsec: f64,
    pub log_odds: f64,
    pub index_jitter_arcsec: f64,
    pub n_match: usize,
    pub n_conflict: usize,
    pub n_distractor: usize,
    pub n_index: usize,
}

pub trait MatchingEngine {
    /// Restore the engine's own defaults and forget any previous result.
    fn set_default_values(&mut self);

    fn set_field_bounds(&mut self, width: f64, height: f64);

    /// Replace the field and rebuild the engine's spatial preprocessing for it.
    fn set_field(&mut self, field: &[Detection]);

    fn field_center(&self) -> (f64, f64);

    fn field_size(&self) -> (f64, f64);

    /// Positional noise of the field, pixels.
    fn field_jitter(&self) -> f64;

    fn set_scale_range(&mut self, lo_arcsec_per_px: f64, hi_arcsec_per_px: f64);

    fn scale_range(&self) -> (f64, f64);

    fn set_parity(&mut self, parity: Parity);

    fn parity(&self) -> Parity;

    fn set_match_threshold(&mut self, log_odds: f64);

    fn match_threshold(&self) -> f64;

    fn set_verbosity(&mut self, level: u8);

    /// Quad sizes to try, as fractions of the field size.
    fn set_quad_size_fraction(&mut self, lo: f64, hi: f64);

    fn quad_size_range_arcsec(&self) -> (f64, f64);

    fn max_quad_radius_arcsec(&self) -> f64;

    /// Restrict matches to a sky region, or search everywhere with `None`.
    fn set_sky_hint(&mut self, hint: Option<SkyCap>);

    /// One solve attempt against the given indices. Blocks until done.
    fn run(&mut self, indices: &[&dyn CatalogIndex]);

    fn did_solve(&self) -> bool;

    fn best_match(&self) -> Option<&MatchRecord>;

    /// Refine the best match in place at the given polynomial order.
    fn tweak(&mut self, order: u32);
}

/// Creates engine sessions; a fresh one is requested on every reset.
pub trait SessionFactory {
    type Engine: MatchingEngine;

    fn create(&self) -> Self::Engine;
}

impl<E, F> SessionFactory for F
where
    E: MatchingEngine,
    F: Fn() -> E,
{
    type Engine = E;

    fn create(&self) -> E {
        self()
    }
}
