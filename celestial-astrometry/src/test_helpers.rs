//! In-memory indices, a scripted engine and synthetic star fields for tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use celestial_wcs::{PixelCoord, SkyCoord, TanWcs};

use crate::engine::{MatchRecord, MatchingEngine, Parity, TanSolution};
use crate::field::Detection;
use crate::index::{CatalogIndex, CatalogStar, Footprint, IndexKey, IndexMetadata, IndexStore};
use crate::sky::{angular_separation_deg, xyz_to_radec, SkyCap};

#[derive(Debug, Clone)]
pub struct StubIndex {
    metadata: IndexMetadata,
    stars: Vec<CatalogStar>,
    columns: Vec<(String, Vec<f64>)>,
    loaded: bool,
    fail_reload: bool,
    reload_count: usize,
    unloads: Rc<Cell<usize>>,
}

impl StubIndex {
    pub fn new(
        name: &str,
        key: IndexKey,
        scale_lo_arcsec: f64,
        scale_hi_arcsec: f64,
        footprint: Footprint,
    ) -> Self {
        Self {
            metadata: IndexMetadata {
                name: name.to_string(),
                key,
                scale_lo_arcsec,
                scale_hi_arcsec,
                footprint,
                index_jitter_arcsec: 1.0,
            },
            stars: Vec::new(),
            columns: Vec::new(),
            loaded: false,
            fail_reload: false,
            reload_count: 0,
            unloads: Rc::new(Cell::new(0)),
        }
    }

    pub fn all_sky(name: &str, key: IndexKey, scale_lo_arcsec: f64, scale_hi_arcsec: f64) -> Self {
        Self::new(name, key, scale_lo_arcsec, scale_hi_arcsec, Footprint::AllSky)
    }

    /// Stars in row order.
    pub fn with_stars(mut self, stars: &[(f64, f64)]) -> Self {
        self.stars = stars
            .iter()
            .enumerate()
            .map(|(row, &(ra_deg, dec_deg))| CatalogStar {
                ra_deg,
                dec_deg,
                row,
            })
            .collect();
        self
    }

    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Self {
        self.columns.push((name.to_string(), values));
        self
    }

    pub fn with_jitter(mut self, jitter_arcsec: f64) -> Self {
        self.metadata.index_jitter_arcsec = jitter_arcsec;
        self
    }

    pub fn failing_reload(mut self) -> Self {
        self.fail_reload = true;
        self
    }

    pub fn reload_count(&self) -> usize {
        self.reload_count
    }

    /// Counter of `unload` calls, shared with every clone of this index.
    pub fn unload_probe(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.unloads)
    }
}

impl CatalogIndex for StubIndex {
    fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn reload(&mut self) -> anyhow::Result<()> {
        if self.fail_reload {
            anyhow::bail!("star kd-tree of {} is corrupt", self.metadata.name);
        }
        if !self.loaded {
            self.loaded = true;
            self.reload_count += 1;
        }
        Ok(())
    }

    fn unload(&mut self) {
        self.loaded = false;
        self.unloads.set(self.unloads.get() + 1);
    }

    fn search_radius(&self, center: [f64; 3], radius_deg: f64) -> Vec<CatalogStar> {
        if !self.loaded {
            return Vec::new();
        }
        let (ra, dec) = xyz_to_radec(center);
        self.stars
            .iter()
            .filter(|s| angular_separation_deg(ra, dec, s.ra_deg, s.dec_deg) <= radius_deg)
            .copied()
            .collect()
    }

    fn tag_along_columns(&self) -> Option<Vec<String>> {
        if self.columns.is_empty() {
            return None;
        }
        Some(self.columns.iter().map(|(name, _)| name.clone()).collect())
    }

    fn tag_along_column(&self, name: &str, rows: &[usize]) -> Option<Vec<f64>> {
        let (_, values) = self.columns.iter().find(|(n, _)| n == name)?;
        rows.iter().map(|&row| values.get(row).copied()).collect()
    }
}

/// Maps file paths to index templates; every load hands out a fresh clone.
#[derive(Debug, Default)]
pub struct StubIndexStore {
    files: HashMap<PathBuf, StubIndex>,
}

impl StubIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>, index: StubIndex) {
        self.files.insert(path.into(), index);
    }
}

impl IndexStore for StubIndexStore {
    type Index = StubIndex;

    fn load_metadata(&mut self, path: &Path) -> anyhow::Result<StubIndex> {
        match self.files.get(path) {
            Some(index) => Ok(index.clone()),
            None => anyhow::bail!("no such index file: {}", path.display()),
        }
    }
}

/// Settings the engine saw when `run` was called.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRun {
    pub indices: Vec<IndexKey>,
    pub hint: Option<SkyCap>,
    pub scale_range: (f64, f64),
    pub quad_range: (f64, f64),
    pub parity: Parity,
    pub match_threshold: f64,
    pub field_len: usize,
}

/// What every engine session created from one factory has been asked to do.
#[derive(Debug, Default)]
pub struct EngineLog {
    pub sessions: usize,
    pub runs: Vec<EngineRun>,
    pub tweaks: Vec<u32>,
    pub field_sizes: Vec<usize>,
    pub verbosity: Option<u8>,
}

pub type SharedLog = Rc<RefCell<EngineLog>>;

/// Engine that "finds" one scripted match whenever the settings of a run
/// admit it: its index is among the candidates, its scale is inside the
/// window, its handedness agrees with the parity, and it lies inside the hint.
#[derive(Debug)]
pub struct StubEngine {
    log: SharedLog,
    outcome: Option<MatchRecord>,
    best: Option<MatchRecord>,
    field: Vec<Detection>,
    bounds: Option<(f64, f64)>,
    scale_range: (f64, f64),
    parity: Parity,
    match_threshold: f64,
    quad_fraction: (f64, f64),
    hint: Option<SkyCap>,
    jitter_px: f64,
}

impl StubEngine {
    pub fn new(log: SharedLog, outcome: Option<MatchRecord>) -> Self {
        log.borrow_mut().sessions += 1;
        Self {
            log,
            outcome,
            best: None,
            field: Vec::new(),
            bounds: None,
            scale_range: (0.0, 0.0),
            parity: Parity::Unknown,
            match_threshold: 0.0,
            quad_fraction: (0.0, 1.0),
            hint: None,
            jitter_px: 1.0,
        }
    }

    pub fn factory(log: SharedLog, outcome: Option<MatchRecord>) -> impl Fn() -> StubEngine {
        move || StubEngine::new(Rc::clone(&log), outcome.clone())
    }

    fn admits(&self, record: &MatchRecord, indices: &[IndexKey]) -> bool {
        if !indices.contains(&record.index_key) {
            return false;
        }
        let (lo, hi) = self.scale_range;
        if record.scale_arcsec < lo || record.scale_arcsec > hi {
            return false;
        }
        let cd = record.tan.cd;
        let flipped = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0] > 0.0;
        let parity_ok = match self.parity {
            Parity::Normal => !flipped,
            Parity::Flipped => flipped,
            Parity::Unknown => true,
        };
        if !parity_ok || record.log_odds < self.match_threshold {
            return false;
        }
        match &self.hint {
            Some(cap) => {
                let (ra, dec) = xyz_to_radec(record.center_xyz);
                cap.contains(ra, dec)
            }
            None => true,
        }
    }
}

impl MatchingEngine for StubEngine {
    fn set_default_values(&mut self) {
        self.best = None;
        self.scale_range = (0.0, 0.0);
        self.parity = Parity::Unknown;
        self.match_threshold = 0.0;
        self.quad_fraction = (0.0, 1.0);
        self.hint = None;
    }

    fn set_field_bounds(&mut self, width: f64, height: f64) {
        self.bounds = Some((width, height));
    }

    fn set_field(&mut self, field: &[Detection]) {
        self.field = field.to_vec();
        self.log.borrow_mut().field_sizes.push(field.len());
    }

    fn field_center(&self) -> (f64, f64) {
        let (w, h) = self.field_size();
        (w / 2.0, h / 2.0)
    }

    fn field_size(&self) -> (f64, f64) {
        self.bounds.unwrap_or_else(|| {
            self.field
                .iter()
                .fold((0.0, 0.0), |(w, h), d| (f64::max(w, d.x), f64::max(h, d.y)))
        })
    }

    fn field_jitter(&self) -> f64 {
        self.jitter_px
    }

    fn set_scale_range(&mut self, lo_arcsec_per_px: f64, hi_arcsec_per_px: f64) {
        self.scale_range = (lo_arcsec_per_px, hi_arcsec_per_px);
    }

    fn scale_range(&self) -> (f64, f64) {
        self.scale_range
    }

    fn set_parity(&mut self, parity: Parity) {
        self.parity = parity;
    }

    fn parity(&self) -> Parity {
        self.parity
    }

    fn set_match_threshold(&mut self, log_odds: f64) {
        self.match_threshold = log_odds;
    }

    fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    fn set_verbosity(&mut self, level: u8) {
        self.log.borrow_mut().verbosity = Some(level);
    }

    fn set_quad_size_fraction(&mut self, lo: f64, hi: f64) {
        self.quad_fraction = (lo, hi);
    }

    fn quad_size_range_arcsec(&self) -> (f64, f64) {
        let (w, h) = self.field_size();
        let (lo, hi) = self.scale_range;
        (
            self.quad_fraction.0 * w.min(h) * lo,
            self.quad_fraction.1 * libm::hypot(w, h) * hi,
        )
    }

    fn max_quad_radius_arcsec(&self) -> f64 {
        self.quad_size_range_arcsec().1 / 2.0
    }

    fn set_sky_hint(&mut self, hint: Option<SkyCap>) {
        self.hint = hint;
    }

    fn run(&mut self, indices: &[&dyn CatalogIndex]) {
        let keys: Vec<IndexKey> = indices.iter().map(|i| i.metadata().key).collect();
        self.log.borrow_mut().runs.push(EngineRun {
            indices: keys.clone(),
            hint: self.hint,
            scale_range: self.scale_range,
            quad_range: self.quad_size_range_arcsec(),
            parity: self.parity,
            match_threshold: self.match_threshold,
            field_len: self.field.len(),
        });
        self.best = self
            .outcome
            .as_ref()
            .filter(|record| self.admits(record, &keys))
            .cloned();
    }

    fn did_solve(&self) -> bool {
        self.best.is_some()
    }

    fn best_match(&self) -> Option<&MatchRecord> {
        self.best.as_ref()
    }

    fn tweak(&mut self, order: u32) {
        self.log.borrow_mut().tweaks.push(order);
    }
}

/// A field imaged through a known WCS, with the catalog it was drawn from.
///
/// Matched stars come first with fluxes `1000 - i`, so the prepared field
/// keeps their order; distractors follow with fluxes below 100. Off-image
/// stars exist only in the catalog.
#[derive(Debug, Clone)]
pub struct SyntheticSky {
    pub truth: TanWcs,
    pub key: IndexKey,
    pub name: String,
    pub matched: Vec<(f64, f64)>,
    pub off_image: Vec<(f64, f64)>,
    pub distractors: Vec<(f64, f64)>,
}

impl SyntheticSky {
    pub fn new(truth: TanWcs, matched: usize, distractors: usize) -> Self {
        let (width, height) = truth.image_size().unwrap_or((1024.0, 1024.0));
        let spread = |i: usize, ax: f64, ay: f64| {
            let fx = (i as f64 * 0.618_033_988_75 + ax).fract();
            let fy = (i as f64 * 0.754_877_666_25 + ay).fract();
            (20.0 + fx * (width - 40.0), 20.0 + fy * (height - 40.0))
        };
        Self {
            matched: (0..matched).map(|i| spread(i, 0.1, 0.3)).collect(),
            distractors: (0..distractors).map(|i| spread(i, 0.45, 0.85)).collect(),
            off_image: Vec::new(),
            key: IndexKey::new(4208, 0, 1),
            name: "index-4208.fits".to_string(),
            truth,
        }
    }

    /// Add catalog stars beyond the right edge, `step` pixels apart starting `step` past it.
    pub fn with_off_image(mut self, count: usize, step: f64) -> Self {
        let (width, height) = self.image_size();
        self.off_image = (1..=count)
            .map(|k| (width + step * k as f64, height / 2.0))
            .collect();
        self
    }

    pub fn image_size(&self) -> (f64, f64) {
        self.truth.image_size().unwrap_or((1024.0, 1024.0))
    }

    fn sky(&self, pixel: (f64, f64)) -> SkyCoord {
        self.truth.pixel_to_sky(PixelCoord::new(pixel.0, pixel.1))
    }

    pub fn detections(&self) -> Vec<Detection> {
        let matched = self
            .matched
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Detection::new(x, y, 1000.0 - i as f64));
        let distractors = self
            .distractors
            .iter()
            .enumerate()
            .map(|(j, &(x, y))| Detection::new(x, y, 99.0 - j as f64 * 0.5));
        matched.chain(distractors).collect()
    }

    /// Catalog positions: matched stars first, then off-image stars.
    pub fn catalog_stars(&self) -> Vec<(f64, f64)> {
        self.matched
            .iter()
            .chain(&self.off_image)
            .map(|&p| {
                let sky = self.sky(p);
                (sky.ra_deg(), sky.dec_deg())
            })
            .collect()
    }

    /// Magnitude of catalog row `row`.
    pub fn magnitude(row: usize) -> f64 {
        10.0 + 0.1 * row as f64
    }

    /// All-sky index holding the catalog, with an `r_mag` column.
    pub fn index(&self, scale_lo_arcsec: f64, scale_hi_arcsec: f64) -> StubIndex {
        let stars = self.catalog_stars();
        let magnitudes = (0..stars.len()).map(Self::magnitude).collect();
        StubIndex::all_sky(&self.name, self.key, scale_lo_arcsec, scale_hi_arcsec)
            .with_stars(&stars)
            .with_column("r_mag", magnitudes)
    }

    /// The match an engine would report for this field, using the linear part of the truth.
    pub fn match_record(&self) -> MatchRecord {
        let (width, height) = self.image_size();
        let n_field = self.matched.len() + self.distractors.len();
        let ref_xyz: Vec<[f64; 3]> = self
            .matched
            .iter()
            .map(|&p| self.sky(p).to_unit_vector())
            .collect();
        let center = self.sky((width / 2.0, height / 2.0));
        let corner = self.sky((0.0, 0.0));
        let crval = self.truth.crval();

        MatchRecord {
            index_key: self.key,
            index_name: self.name.clone(),
            correspondence: (0..n_field)
                .map(|i| (i < self.matched.len()).then_some(i))
                .collect(),
            match_odds: (0..n_field)
                .map(|i| if i < self.matched.len() { 50.0 } else { -10.0 })
                .collect(),
            tan: TanSolution {
                crval: [crval.ra_deg(), crval.dec_deg()],
                crpix: self.truth.crpix(),
                cd: self.truth.cd_matrix(),
                image_width: width,
                image_height: height,
            },
            ref_rows: (0..ref_xyz.len()).collect(),
            ref_xyz,
            center_xyz: center.to_unit_vector(),
            radius_deg: angular_separation_deg(
                center.ra_deg(),
                center.dec_deg(),
                corner.ra_deg(),
                corner.dec_deg(),
            ),
            scale_arcsec: self.truth.pixel_scale_arcsec(),
            log_odds: 120.0,
            index_jitter_arcsec: 1.0,
            n_match: self.matched.len(),
            n_conflict: 0,
            n_distractor: self.distractors.len(),
            n_index: self.matched.len(),
        }
    }
}
