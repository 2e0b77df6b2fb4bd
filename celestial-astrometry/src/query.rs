use celestial_wcs::{Frame, PixelCoord, SkyCoord};
use tracing::debug;

use crate::engine::MatchRecord;
use crate::error::{SolveError, SolveResult};
use crate::extract::magnitude_to_flux;
use crate::index::{CatalogIndex, IndexCatalog, IndexKey};
use crate::sky::{arcsec_to_deg, xyz_to_radec, SkyCap};

/// A reference star returned by a catalog query.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSource {
    pub sky: SkyCoord,
    /// Position under the current solution; `None` for plain sky queries.
    pub pixel: Option<PixelCoord>,
    pub flux: Option<f64>,
    pub index: IndexKey,
    pub row: usize,
}

/// Radius queries against the loaded indices.
pub struct CatalogQuery<'a, I: CatalogIndex> {
    catalog: &'a mut IndexCatalog<I>,
    solution: Option<&'a MatchRecord>,
    frame: &'a Frame,
}

impl<'a, I: CatalogIndex> CatalogQuery<'a, I> {
    pub fn new(
        catalog: &'a mut IndexCatalog<I>,
        solution: Option<&'a MatchRecord>,
        frame: &'a Frame,
    ) -> Self {
        Self {
            catalog,
            solution,
            frame,
        }
    }

    /// Stars within `radius_arcsec` of (ra, dec) from every index whose footprint
    /// reaches the cap. Overlapping indices may return the same star more than once.
    pub fn query_by_radius(
        &mut self,
        ra_deg: f64,
        dec_deg: f64,
        radius_arcsec: f64,
        filter: &str,
    ) -> SolveResult<Vec<CatalogSource>> {
        if !(radius_arcsec.is_finite() && radius_arcsec > 0.0) {
            return Err(SolveError::invalid_configuration(format!(
                "search radius must be positive, got {radius_arcsec}"
            )));
        }
        let cap = SkyCap::new(ra_deg, dec_deg, arcsec_to_deg(radius_arcsec));
        let center = cap.center_xyz();

        let mut out = Vec::new();
        for position in 0..self.catalog.len() {
            let within = self
                .catalog
                .get(position)
                .is_some_and(|entry| entry.index().is_within_range(&cap));
            if !within {
                continue;
            }

            let index = self.catalog.ensure_loaded(position)?;
            let stars = index.search_radius(center, cap.radius_deg);
            if stars.is_empty() {
                continue;
            }

            let magnitudes = if filter.is_empty() {
                None
            } else {
                let rows: Vec<usize> = stars.iter().map(|s| s.row).collect();
                let values = index
                    .tag_along_column(filter, &rows)
                    .filter(|v| v.len() == rows.len())
                    .ok_or_else(|| {
                        SolveError::metadata_unavailable(&index.metadata().name, filter)
                    })?;
                Some(values)
            };

            let key = index.metadata().key;
            out.extend(stars.iter().enumerate().map(|(k, star)| CatalogSource {
                sky: SkyCoord::new(star.ra_deg, star.dec_deg),
                pixel: None,
                flux: magnitudes.as_ref().map(|m| magnitude_to_flux(m[k])),
                index: key,
                row: star.row,
            }));
        }
        Ok(out)
    }

    /// Radius query centred on the solved field.
    pub fn query_around_center(
        &mut self,
        radius_arcsec: f64,
        filter: &str,
    ) -> SolveResult<Vec<CatalogSource>> {
        let best = self.solution.ok_or(SolveError::NotSolved)?;
        let (ra, dec) = xyz_to_radec(best.center_xyz);
        self.query_by_radius(ra, dec, radius_arcsec, filter)
    }

    /// Stars of the matched index that land on the image, grown by `margin_px` on every side.
    pub fn query_around_solution(
        &mut self,
        filter: &str,
        margin_px: f64,
    ) -> SolveResult<Vec<CatalogSource>> {
        let best = self.solution.ok_or(SolveError::NotSolved)?;
        let wcs = best.tan.to_wcs(self.frame)?;
        let radius_deg = best.radius_deg + arcsec_to_deg(best.tan.pixel_scale_arcsec() * margin_px);

        let position =
            self.catalog
                .position(&best.index_key)
                .ok_or_else(|| SolveError::IndexLoad {
                    name: best.index_name.clone(),
                    source: anyhow::anyhow!("matched index {} is not in the catalog", best.index_key),
                })?;
        let index = self.catalog.ensure_loaded(position)?;
        let (width, height) = (best.tan.image_width, best.tan.image_height);

        let mut kept = Vec::new();
        for star in index.search_radius(best.center_xyz, radius_deg) {
            let sky = SkyCoord::new(star.ra_deg, star.dec_deg);
            let Ok(pixel) = wcs.sky_to_pixel(sky) else {
                continue;
            };
            let on_image = pixel.x() >= -margin_px
                && pixel.x() <= width + margin_px
                && pixel.y() >= -margin_px
                && pixel.y() <= height + margin_px;
            if on_image {
                kept.push((star.row, sky, pixel));
            }
        }

        let magnitudes = if filter.is_empty() || kept.is_empty() {
            None
        } else {
            let rows: Vec<usize> = kept.iter().map(|k| k.0).collect();
            let values = index
                .tag_along_column(filter, &rows)
                .filter(|v| v.len() == rows.len());
            if values.is_none() {
                debug!(
                    filter,
                    index = %index.metadata().name,
                    "tag-along column not found; catalog fluxes will not be set"
                );
            }
            values
        };

        let key = best.index_key;
        Ok(kept
            .into_iter()
            .enumerate()
            .map(|(k, (row, sky, pixel))| CatalogSource {
                sky,
                pixel: Some(pixel),
                flux: magnitudes.as_ref().map(|m| magnitude_to_flux(m[k])),
                index: key,
                row,
            })
            .collect())
    }
}
