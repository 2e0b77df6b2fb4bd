//! Reference-star index abstractions.
//!
//! An index file is opened in two steps: [`IndexStore::load_metadata`] reads
//! only the header (identity, scale coverage, footprint), and
//! [`CatalogIndex::reload`] brings in the star tree and tag-along table when
//! the index is actually needed.

pub mod catalog;

pub use catalog::{IndexCatalog, IndexEntry, LoadState};

use std::fmt;
use std::path::Path;

use crate::sky::SkyCap;

/// Identity used to recognise the same index loaded twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub index_id: i64,
    pub healpix: i64,
    pub healpix_nside: i64,
}

impl IndexKey {
    pub fn new(index_id: i64, healpix: i64, healpix_nside: i64) -> Self {
        Self {
            index_id,
            healpix,
            healpix_nside,
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {} healpix {} nside {}",
            self.index_id, self.healpix, self.healpix_nside
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Footprint {
    AllSky,
    Cap(SkyCap),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub name: String,
    pub key: IndexKey,
    /// Smallest quad diameter in the index, arcsec.
    pub scale_lo_arcsec: f64,
    /// Largest quad diameter in the index, arcsec.
    pub scale_hi_arcsec: f64,
    pub footprint: Footprint,
    pub index_jitter_arcsec: f64,
}

impl IndexMetadata {
    pub fn overlaps_scale_range(&self, quad_lo_arcsec: f64, quad_hi_arcsec: f64) -> bool {
        self.scale_lo_arcsec <= quad_hi_arcsec && self.scale_hi_arcsec >= quad_lo_arcsec
    }

    /// Whether any part of the footprint lies within the cap. An nside of 0 marks an all-sky index.
    pub fn is_within_range(&self, cap: &SkyCap) -> bool {
        if self.key.healpix_nside == 0 {
            return true;
        }
        match &self.footprint {
            Footprint::AllSky => true,
            Footprint::Cap(footprint) => footprint.intersects(cap),
        }
    }
}

/// A star returned by a radius search, with its row in the index's tag-along table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogStar {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub row: usize,
}

pub trait CatalogIndex {
    fn metadata(&self) -> &IndexMetadata;

    fn is_loaded(&self) -> bool;

    /// Load the star data. Calling this on a loaded index is a no-op.
    fn reload(&mut self) -> anyhow::Result<()>;

    fn unload(&mut self);

    /// Stars within `radius_deg` of the unit vector `center`. Empty when not loaded.
    fn search_radius(&self, center: [f64; 3], radius_deg: f64) -> Vec<CatalogStar>;

    /// Names of the tag-along columns, or `None` when the index carries no table.
    fn tag_along_columns(&self) -> Option<Vec<String>>;

    /// Values of column `name` for each of `rows`, or `None` when the column is absent.
    fn tag_along_column(&self, name: &str, rows: &[usize]) -> Option<Vec<f64>>;

    fn overlaps_scale_range(&self, quad_lo_arcsec: f64, quad_hi_arcsec: f64) -> bool {
        self.metadata()
            .overlaps_scale_range(quad_lo_arcsec, quad_hi_arcsec)
    }

    fn is_within_range(&self, cap: &SkyCap) -> bool {
        self.metadata().is_within_range(cap)
    }
}

/// Opens index files.
pub trait IndexStore {
    type Index: CatalogIndex;

    /// Read the header of an index file without loading its stars.
    fn load_metadata(&mut self, path: &Path) -> anyhow::Result<Self::Index>;
}
