use celestial_wcs::{Frame, PixelCoord, SkyTransform};
use tracing::{debug, info};

use crate::config::{AstrometryConfig, MAX_VERBOSITY};
use crate::engine::{MatchRecord, MatchingEngine, Parity, SessionFactory};
use crate::error::{SolveError, SolveResult};
use crate::extract::ResultExtractor;
use crate::field::{BrightLimit, Detection, Field, FieldPreparer};
use crate::index::{CatalogIndex, IndexCatalog, IndexStore};
use crate::query::CatalogQuery;
use crate::sky::{arcsec_to_arcmin, arcsec_to_deg, SkyCap};

pub const DEFAULT_SCALE_LO_ARCSEC: f64 = 1e-6;
/// One full turn per pixel.
pub const DEFAULT_SCALE_HI_ARCSEC: f64 = 3600.0 * 360.0;
pub const QUAD_SIZE_FRACTION: (f64, f64) = (0.1, 1.0);
/// Hint radius for guided solves, in units of the engine's largest quad radius.
const GUESS_RADIUS_FACTOR: f64 = 2.0;
const TWEAK_ORDER: u32 = 1;

/// Log-odds a match must reach to be accepted, ln(10¹²).
pub fn default_match_threshold() -> f64 {
    libm::log(1e12)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolveState {
    #[default]
    Unsolved,
    Solved,
}

/// Drives one engine session through blind, position-guided or guess-seeded solves.
///
/// A successful solve locks the instance until [`Solver::reset`] or a new field;
/// attempts that find nothing can be retried with different settings.
pub struct Solver<I: CatalogIndex, F: SessionFactory> {
    catalog: IndexCatalog<I>,
    factory: F,
    engine: F::Engine,
    preparer: FieldPreparer,
    image_size: Option<(f64, f64)>,
    verbosity: u8,
    frame: Frame,
    state: SolveState,
}

impl<I: CatalogIndex, F: SessionFactory> Solver<I, F> {
    pub fn new(catalog: IndexCatalog<I>, factory: F, frame: Frame) -> Self {
        let engine = factory.create();
        let mut solver = Self {
            catalog,
            factory,
            engine,
            preparer: FieldPreparer::default(),
            image_size: None,
            verbosity: 0,
            frame,
            state: SolveState::Unsolved,
        };
        solver.apply_default_values();
        solver
    }

    pub fn from_config<S>(config: &AstrometryConfig, store: &mut S, factory: F) -> SolveResult<Self>
    where
        S: IndexStore<Index = I>,
    {
        config
            .validate()
            .map_err(|e| SolveError::invalid_configuration(e.to_string()))?;
        let catalog = IndexCatalog::load(store, config.resolved_index_files());
        let frame = Frame::new(config.equinox, config.ra_dec_sys.clone());
        let mut solver = Self::new(catalog, factory, frame);
        solver.set_min_sources(config.min_sources);
        solver.set_verbosity(config.verbosity)?;
        Ok(solver)
    }

    fn apply_default_values(&mut self) {
        self.engine.set_default_values();
        self.engine
            .set_scale_range(DEFAULT_SCALE_LO_ARCSEC, DEFAULT_SCALE_HI_ARCSEC);
        self.engine.set_match_threshold(default_match_threshold());
        self.engine.set_parity(Parity::Unknown);
    }

    pub fn catalog(&self) -> &IndexCatalog<I> {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut IndexCatalog<I> {
        &mut self.catalog
    }

    pub fn engine(&self) -> &F::Engine {
        &self.engine
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn state(&self) -> SolveState {
        self.state
    }

    pub fn is_solved(&self) -> bool {
        self.state == SolveState::Solved
    }

    pub fn field(&self) -> Option<&Field> {
        self.preparer.field()
    }

    pub fn active_subset(&self) -> Option<&[Detection]> {
        self.preparer.active_subset()
    }

    pub fn set_image_size(&mut self, width: f64, height: f64) -> SolveResult<()> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(SolveError::invalid_configuration(format!(
                "image size must be positive, got {width} x {height}"
            )));
        }
        self.image_size = Some((width, height));
        self.engine.set_field_bounds(width, height);
        Ok(())
    }

    pub fn set_min_sources(&mut self, min_sources: usize) {
        self.preparer.set_min_sources(min_sources);
    }

    /// Replace the field. Any previous match is discarded, and on failure so is the previous field.
    pub fn set_field(&mut self, detections: &[Detection]) -> SolveResult<()> {
        self.state = SolveState::Unsolved;
        self.preparer.set_field(detections)?;
        self.push_active_subset();
        Ok(())
    }

    /// Change the bright-star subset handed to the engine. A held solution is
    /// discarded because its correspondences index the previous subset.
    pub fn set_bright_limit(&mut self, limit: BrightLimit) -> SolveResult<()> {
        self.preparer.set_bright_limit(limit)?;
        self.state = SolveState::Unsolved;
        self.push_active_subset();
        Ok(())
    }

    fn push_active_subset(&mut self) {
        if let Some(subset) = self.preparer.active_subset() {
            self.engine.set_field(subset);
        }
    }

    pub fn configure(
        &mut self,
        scale_lo_arcsec: f64,
        scale_hi_arcsec: f64,
        parity: Parity,
        match_threshold: f64,
    ) -> SolveResult<()> {
        self.set_scale_range(scale_lo_arcsec, scale_hi_arcsec)?;
        self.set_match_threshold(match_threshold)?;
        self.set_parity(parity);
        Ok(())
    }

    pub fn set_scale_range(&mut self, lo_arcsec: f64, hi_arcsec: f64) -> SolveResult<()> {
        if !(lo_arcsec.is_finite() && hi_arcsec.is_finite() && lo_arcsec > 0.0) {
            return Err(SolveError::invalid_configuration(format!(
                "scale bounds must be positive and finite, got {lo_arcsec} - {hi_arcsec}"
            )));
        }
        if lo_arcsec >= hi_arcsec {
            return Err(SolveError::invalid_configuration(format!(
                "minimum image scale ({lo_arcsec}) must be strictly less than maximum ({hi_arcsec})"
            )));
        }
        self.engine.set_scale_range(lo_arcsec, hi_arcsec);
        Ok(())
    }

    /// Pin the scale to a known plate scale. The window is widened by 1% each
    /// side because the engine needs distinct bounds.
    pub fn set_plate_scale(&mut self, arcsec_per_px: f64) -> SolveResult<()> {
        self.set_scale_range(0.99 * arcsec_per_px, 1.01 * arcsec_per_px)
    }

    pub fn scale_range(&self) -> (f64, f64) {
        self.engine.scale_range()
    }

    pub fn set_parity(&mut self, parity: Parity) {
        self.engine.set_parity(parity);
    }

    pub fn parity(&self) -> Parity {
        self.engine.parity()
    }

    pub fn set_match_threshold(&mut self, log_odds: f64) -> SolveResult<()> {
        if !log_odds.is_finite() {
            return Err(SolveError::invalid_configuration(format!(
                "match threshold must be finite, got {log_odds}"
            )));
        }
        self.engine.set_match_threshold(log_odds);
        Ok(())
    }

    pub fn match_threshold(&self) -> f64 {
        self.engine.match_threshold()
    }

    pub fn set_verbosity(&mut self, level: u8) -> SolveResult<()> {
        if level > MAX_VERBOSITY {
            return Err(SolveError::invalid_configuration(format!(
                "logging level must be between 0 and {MAX_VERBOSITY}, got {level}"
            )));
        }
        self.verbosity = level;
        self.engine.set_verbosity(level);
        Ok(())
    }

    /// Solve with no position hint; indices are chosen by scale alone.
    pub fn solve_blind(&mut self) -> SolveResult<bool> {
        self.attempt(None)
    }

    /// Solve near (ra, dec): only indices overlapping the cap are used and the
    /// engine only accepts matches inside it.
    pub fn solve_at(&mut self, ra_deg: f64, dec_deg: f64, radius_deg: f64) -> SolveResult<bool> {
        validate_position(ra_deg, dec_deg)?;
        if !(radius_deg.is_finite() && radius_deg > 0.0) {
            return Err(SolveError::invalid_configuration(format!(
                "search radius must be positive, got {radius_deg}"
            )));
        }
        self.attempt(Some(SkyCap::new(ra_deg, dec_deg, radius_deg)))
    }

    /// Solve seeded by an approximate transform: position, plate scale and
    /// parity are taken from `guess` at the field centre.
    pub fn solve_from_guess(
        &mut self,
        guess: &dyn SkyTransform,
        scale_uncertainty_percent: f64,
    ) -> SolveResult<bool> {
        if !(0.0..100.0).contains(&scale_uncertainty_percent) {
            return Err(SolveError::invalid_configuration(format!(
                "scale uncertainty must be in [0, 100) percent, got {scale_uncertainty_percent}"
            )));
        }
        self.check_ready()?;

        let (xc, yc) = self.engine.field_center();
        let center = PixelCoord::new(xc, yc);
        let sky = guess.pixel_to_sky(center);
        let plate_scale = libm::sqrt(guess.pixel_area_deg2(center)) * 3600.0;

        let unc = scale_uncertainty_percent / 100.0;
        if unc > 0.0 {
            self.set_scale_range(plate_scale * (1.0 - unc), plate_scale * (1.0 + unc))?;
        } else {
            self.set_plate_scale(plate_scale)?;
        }
        let (lo, hi) = self.engine.scale_range();
        debug!(
            ra = sky.ra_deg(),
            dec = sky.dec_deg(),
            plate_scale,
            lo,
            hi,
            "solving from initial guess"
        );

        let parity = if guess.is_flipped() {
            Parity::Flipped
        } else {
            Parity::Normal
        };
        debug!(?parity, "parity taken from guess");
        self.set_parity(parity);

        let radius_deg = GUESS_RADIUS_FACTOR * arcsec_to_deg(self.engine.max_quad_radius_arcsec());
        self.solve_at(sky.ra_deg(), sky.dec_deg(), radius_deg)
    }

    fn check_ready(&self) -> SolveResult<()> {
        if self.preparer.field().is_none() {
            return Err(SolveError::FieldNotSet);
        }
        if self.catalog.is_empty() {
            return Err(SolveError::NoIndicesLoaded);
        }
        if self.is_solved() {
            return Err(SolveError::AlreadySolved);
        }
        Ok(())
    }

    fn attempt(&mut self, hint: Option<SkyCap>) -> SolveResult<bool> {
        self.check_ready()?;

        let (lo, hi) = self.engine.scale_range();
        if lo >= hi {
            return Err(SolveError::invalid_configuration(format!(
                "minimum image scale ({lo}) must be strictly less than maximum ({hi})"
            )));
        }

        let (width, height) = self.engine.field_size();
        self.engine
            .set_quad_size_fraction(QUAD_SIZE_FRACTION.0, QUAD_SIZE_FRACTION.1);
        debug!(width, height, "image size in pixels");
        debug!(lo, hi, "searching plate scale range (arcsec/pixel)");
        debug!(
            min_w = arcsec_to_arcmin(lo * width),
            min_h = arcsec_to_arcmin(lo * height),
            max_w = arcsec_to_arcmin(hi * width),
            max_h = arcsec_to_arcmin(hi * height),
            "image size range (arcmin)"
        );

        let (quad_lo, quad_hi) = self.engine.quad_size_range_arcsec();
        debug!(
            quad_lo_arcmin = arcsec_to_arcmin(quad_lo),
            quad_hi_arcmin = arcsec_to_arcmin(quad_hi),
            "selecting indices by quad size"
        );
        let candidates = self
            .catalog
            .select_candidates(quad_lo, quad_hi, hint.as_ref())?;

        self.engine.set_sky_hint(hint);
        let indices: Vec<&dyn CatalogIndex> = candidates
            .iter()
            .filter_map(|&position| self.catalog.get(position))
            .map(|entry| entry.index() as &dyn CatalogIndex)
            .collect();
        debug!(indices = indices.len(), blind = hint.is_none(), "running solver");
        self.engine.run(&indices);

        if !self.engine.did_solve() {
            match hint {
                Some(cap) => debug!(ra = cap.ra_deg, dec = cap.dec_deg, "failed to verify position"),
                None => debug!("blind solve failed"),
            }
            return Ok(false);
        }

        if let Some(best) = self.engine.best_match() {
            info!(
                index = %best.index_name,
                matches = best.n_match,
                conflicts = best.n_conflict,
                unmatched = best.n_distractor,
                in_index = best.n_index,
                log_odds = best.log_odds,
                "solved"
            );
        }
        self.engine.tweak(TWEAK_ORDER);
        if let Some(best) = self.engine.best_match() {
            debug!(
                matches = best.n_match,
                conflicts = best.n_conflict,
                unmatched = best.n_distractor,
                log_odds = best.log_odds,
                "after linear tweak"
            );
        }
        self.state = SolveState::Solved;
        Ok(true)
    }

    pub fn best_match(&self) -> SolveResult<&MatchRecord> {
        if !self.is_solved() {
            return Err(SolveError::NotSolved);
        }
        self.engine.best_match().ok_or(SolveError::NotSolved)
    }

    /// Plate scale of the solution in arcsec per pixel.
    pub fn solved_image_scale(&self) -> SolveResult<f64> {
        Ok(self.best_match()?.scale_arcsec)
    }

    pub fn results(&mut self) -> SolveResult<ResultExtractor<'_, I>> {
        if !self.is_solved() {
            return Err(SolveError::NotSolved);
        }
        let best = self.engine.best_match().ok_or(SolveError::NotSolved)?;
        let active = self
            .preparer
            .active_subset()
            .ok_or(SolveError::FieldUnavailable)?;
        Ok(ResultExtractor::new(
            best,
            active,
            self.preparer.field(),
            self.engine.field_jitter(),
            &mut self.catalog,
            &self.frame,
        ))
    }

    /// Tag-along column names of the first loaded index.
    pub fn metadata_fields(&mut self) -> SolveResult<Vec<String>> {
        self.catalog.metadata_fields()
    }

    pub fn query(&mut self) -> CatalogQuery<'_, I> {
        let solution = if self.is_solved() {
            self.engine.best_match()
        } else {
            None
        };
        CatalogQuery::new(&mut self.catalog, solution, &self.frame)
    }

    /// Start over with a fresh engine session and default tunables, keeping the
    /// verbosity level. The field and image size are kept; the bright limit
    /// returns to all sources.
    pub fn reset(&mut self) {
        self.engine = self.factory.create();
        self.apply_default_values();
        self.engine.set_verbosity(self.verbosity);
        self.preparer.reset_bright_limit();
        if let Some((width, height)) = self.image_size {
            self.engine.set_field_bounds(width, height);
        }
        self.push_active_subset();
        self.state = SolveState::Unsolved;
    }
}

fn validate_position(ra_deg: f64, dec_deg: f64) -> SolveResult<()> {
    if !(0.0..=360.0).contains(&ra_deg) || !(-90.0..=90.0).contains(&dec_deg) {
        return Err(SolveError::invalid_configuration(format!(
            "({ra_deg}, {dec_deg}) is not a valid ra/dec position"
        )));
    }
    Ok(())
}
