use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use super::{CatalogIndex, IndexKey, IndexMetadata, IndexStore};
use crate::error::{SolveError, SolveResult, UnsuitableCause};
use crate::sky::SkyCap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    MetadataOnly,
    FullyLoaded,
}

#[derive(Debug)]
pub struct IndexEntry<I> {
    path: PathBuf,
    index: I,
}

impl<I: CatalogIndex> IndexEntry<I> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn metadata(&self) -> &IndexMetadata {
        self.index.metadata()
    }

    pub fn state(&self) -> LoadState {
        if self.index.is_loaded() {
            LoadState::FullyLoaded
        } else {
            LoadState::MetadataOnly
        }
    }
}

/// Deduplicated, lazily loaded set of index files.
///
/// Entries keep the order in which their files were first seen. Dropping the
/// catalog unloads every entry.
#[derive(Debug)]
pub struct IndexCatalog<I: CatalogIndex> {
    entries: Vec<IndexEntry<I>>,
}

impl<I: CatalogIndex> Default for IndexCatalog<I> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<I: CatalogIndex> IndexCatalog<I> {
    /// Read the metadata of every file. Unreadable files and duplicate
    /// identities are logged and skipped; the first file with a given key wins.
    pub fn load<S, P>(store: &mut S, files: impl IntoIterator<Item = P>) -> Self
    where
        S: IndexStore<Index = I>,
        P: AsRef<Path>,
    {
        let mut catalog = Self::default();
        for file in files {
            let path = file.as_ref();
            let index = match store
                .load_metadata(path)
                .with_context(|| format!("reading index metadata from {}", path.display()))
            {
                Ok(index) => index,
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(path = %path.display(), %error, "skipping unreadable index");
                    continue;
                }
            };
            catalog.insert(path, index);
        }
        info!(count = catalog.len(), "index metadata loaded");
        catalog
    }

    /// Add an already opened index. Returns `false` when its key is already present.
    pub fn insert(&mut self, path: impl Into<PathBuf>, index: I) -> bool {
        let path = path.into();
        let key = index.metadata().key;
        if let Some(existing) = self.position(&key) {
            warn!(
                path = %path.display(),
                duplicate_of = %self.entries[existing].path.display(),
                %key,
                "skipping duplicate index"
            );
            return false;
        }
        debug!(
            name = %index.metadata().name,
            %key,
            scale_lo_arcsec = index.metadata().scale_lo_arcsec,
            scale_hi_arcsec = index.metadata().scale_hi_arcsec,
            "index metadata read"
        );
        self.entries.push(IndexEntry { path, index });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry<I>] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&IndexEntry<I>> {
        self.entries.get(position)
    }

    pub fn position(&self, key: &IndexKey) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.metadata().key == *key)
    }

    /// Promote an entry to fully loaded; a loaded entry is left alone.
    pub fn ensure_loaded(&mut self, position: usize) -> SolveResult<&I> {
        let entry = self
            .entries
            .get_mut(position)
            .ok_or(SolveError::NoIndicesLoaded)?;
        if !entry.index.is_loaded() {
            let name = entry.index.metadata().name.clone();
            entry
                .index
                .reload()
                .with_context(|| format!("loading star data from {}", entry.path.display()))
                .map_err(|source| SolveError::IndexLoad { name, source })?;
        }
        Ok(&entry.index)
    }

    pub fn load_all(&mut self) -> SolveResult<()> {
        for position in 0..self.entries.len() {
            self.ensure_loaded(position)?;
        }
        Ok(())
    }

    /// Positions of the entries that cover the quad-size range and, when a
    /// cap is given, overlap it. Every returned entry is fully loaded.
    pub fn select_candidates(
        &mut self,
        quad_lo_arcsec: f64,
        quad_hi_arcsec: f64,
        cap: Option<&SkyCap>,
    ) -> SolveResult<Vec<usize>> {
        let mut any_scale = false;
        let mut selected = Vec::new();

        for position in 0..self.entries.len() {
            let index = &self.entries[position].index;
            if !index.overlaps_scale_range(quad_lo_arcsec, quad_hi_arcsec) {
                continue;
            }
            any_scale = true;

            if let Some(cap) = cap {
                if !index.is_within_range(cap) {
                    continue;
                }
            }

            let index = self.ensure_loaded(position)?;
            debug!(name = %index.metadata().name, "adding index");
            selected.push(position);
        }

        if selected.is_empty() {
            let cause = if any_scale {
                UnsuitableCause::NoSkyCoverage
            } else {
                UnsuitableCause::NoMatchingScale
            };
            return Err(SolveError::NoSuitableIndices { cause });
        }
        Ok(selected)
    }

    /// Tag-along column names of the first entry, assumed to be shared by all entries.
    pub fn metadata_fields(&mut self) -> SolveResult<Vec<String>> {
        if self.is_empty() {
            return Err(SolveError::NoIndicesLoaded);
        }
        let index = self.ensure_loaded(0)?;
        match index.tag_along_columns() {
            Some(columns) => Ok(columns),
            None => {
                debug!(name = %index.metadata().name, "no metadata found for index");
                Ok(Vec::new())
            }
        }
    }

    pub fn teardown(&mut self) {
        for entry in &mut self.entries {
            entry.index.unload();
        }
        self.entries.clear();
    }
}

impl<I: CatalogIndex> Drop for IndexCatalog<I> {
    fn drop(&mut self) {
        self.teardown();
    }
}
