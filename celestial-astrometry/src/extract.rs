use celestial_wcs::{Frame, PixelCoord, SkyCoord, TanWcs};
use tracing::debug;

use crate::engine::MatchRecord;
use crate::error::{SolveError, SolveResult};
use crate::field::{Detection, Field};
use crate::index::{CatalogIndex, IndexCatalog};
use crate::refine::{fit_distortion, FitSettings};
use crate::sky::xyz_to_radec;

const DISTORTION_ITERATIONS: usize = 5;

/// Log-odds above this are treated as certain.
const CERTAIN_LOG_ODDS: f64 = 40.0;

/// Logistic weight of a log-odds value.
pub fn log_odds_to_weight(log_odds: f64) -> f64 {
    if log_odds > CERTAIN_LOG_ODDS {
        return 1.0;
    }
    let odds = libm::exp(log_odds);
    odds / (1.0 + odds)
}

/// Positional uncertainty, in pixels, assigned to a correspondence of the given confidence.
pub fn position_error(confidence: f64) -> f64 {
    1.0 / (confidence + f64::EPSILON)
}

/// Flux of a catalog magnitude on a zero-point-free scale.
pub fn magnitude_to_flux(mag: f64) -> f64 {
    libm::pow(10.0, -mag / 2.5)
}

/// One side of a cross-match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRecord {
    pub pixel: PixelCoord,
    pub sky: SkyCoord,
    /// Uncertainty in x and y, pixels.
    pub pixel_error: f64,
    pub flux: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMatch {
    pub catalog: SourceRecord,
    pub observed: SourceRecord,
    /// Pixel distance between the two records.
    pub distance: f64,
}

/// Read-only view of a solved field.
pub struct ResultExtractor<'a, I: CatalogIndex> {
    best: &'a MatchRecord,
    active: &'a [Detection],
    field: Option<&'a Field>,
    field_jitter_px: f64,
    catalog: &'a mut IndexCatalog<I>,
    frame: &'a Frame,
}

impl<'a, I: CatalogIndex> ResultExtractor<'a, I> {
    pub fn new(
        best: &'a MatchRecord,
        active: &'a [Detection],
        field: Option<&'a Field>,
        field_jitter_px: f64,
        catalog: &'a mut IndexCatalog<I>,
        frame: &'a Frame,
    ) -> Self {
        Self {
            best,
            active,
            field,
            field_jitter_px,
            catalog,
            frame,
        }
    }

    pub fn best_match(&self) -> &MatchRecord {
        self.best
    }

    /// Plate scale of the solution in arcsec per pixel.
    pub fn solved_image_scale(&self) -> f64 {
        self.best.scale_arcsec
    }

    pub fn linear_wcs(&self) -> SolveResult<TanWcs> {
        Ok(self.best.tan.to_wcs(self.frame)?)
    }

    /// Refit the solution against the full field with SIP terms up to `order`.
    pub fn distorted_wcs(&self, order: u32) -> SolveResult<TanWcs> {
        if order < 1 {
            return Err(SolveError::invalid_configuration(
                "distortion order must be at least 1",
            ));
        }
        let field = self.field.ok_or(SolveError::FieldUnavailable)?;
        let linear = self.linear_wcs()?;

        let jitter_arcsec = libm::hypot(
            linear.pixel_scale_arcsec() * self.field_jitter_px,
            self.best.index_jitter_arcsec,
        );
        let settings = FitSettings {
            iterations: DISTORTION_ITERATIONS,
            ..FitSettings::new(order, jitter_arcsec)
        };
        debug!(order, jitter_arcsec, stars = field.len(), "fitting distortion");
        fit_distortion(&linear, field.detections(), &self.best.ref_xyz, &settings)
    }

    /// Field stars with a catalog counterpart, paired with that counterpart.
    /// A non-empty `filter` names the tag-along magnitude column used for catalog fluxes.
    pub fn matches(&mut self, filter: &str) -> SolveResult<Vec<SourceMatch>> {
        let wcs = self.linear_wcs()?;
        let best = self.best;

        let linked: Vec<(usize, usize)> = best
            .correspondence
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|r| (i, r)))
            .collect();
        let matched: Vec<(usize, usize)> = linked
            .iter()
            .copied()
            .filter(|&(i, r)| i < self.active.len() && r < best.ref_xyz.len())
            .collect();
        if matched.len() < linked.len() {
            debug!(
                dropped = linked.len() - matched.len(),
                active = self.active.len(),
                references = best.ref_xyz.len(),
                "skipping correspondences outside the active field or reference list"
            );
        }

        let magnitudes = if filter.is_empty() {
            None
        } else {
            let rows: Vec<usize> = matched
                .iter()
                .map(|&(_, r)| best.ref_rows.get(r).copied().unwrap_or(r))
                .collect();
            Some(self.matched_index_column(filter, &rows)?)
        };

        let mut out = Vec::with_capacity(matched.len());
        for (k, &(i, r)) in matched.iter().enumerate() {
            let detection = self.active[i];
            let confidence = best
                .match_odds
                .get(i)
                .map_or(0.0, |&l| log_odds_to_weight(l));
            let error = position_error(confidence);

            let observed_pixel = PixelCoord::new(detection.x, detection.y);
            let observed = SourceRecord {
                pixel: observed_pixel,
                sky: wcs.pixel_to_sky(observed_pixel),
                pixel_error: error,
                flux: Some(detection.flux),
            };

            let (ra, dec) = xyz_to_radec(best.ref_xyz[r]);
            let catalog_sky = SkyCoord::new(ra, dec);
            let catalog = SourceRecord {
                pixel: wcs.sky_to_pixel(catalog_sky)?,
                sky: catalog_sky,
                pixel_error: error,
                flux: magnitudes.as_ref().map(|m| magnitude_to_flux(m[k])),
            };

            out.push(SourceMatch {
                distance: catalog.pixel.distance_to(observed.pixel),
                catalog,
                observed,
            });
        }
        Ok(out)
    }

    /// Tag-along column names, read from the first index.
    pub fn metadata_fields(&mut self) -> SolveResult<Vec<String>> {
        self.catalog.metadata_fields()
    }

    fn matched_index_column(&mut self, filter: &str, rows: &[usize]) -> SolveResult<Vec<f64>> {
        let unavailable = || SolveError::metadata_unavailable(&self.best.index_name, filter);
        let position = self
            .catalog
            .position(&self.best.index_key)
            .ok_or_else(unavailable)?;
        let index = self.catalog.ensure_loaded(position)?;
        index
            .tag_along_column(filter, rows)
            .filter(|values| values.len() == rows.len())
            .ok_or_else(unavailable)
    }
}
