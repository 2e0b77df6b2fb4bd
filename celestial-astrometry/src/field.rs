use tracing::debug;

use crate::config::DEFAULT_MIN_SOURCES;
use crate::error::{SolveError, SolveResult};

/// A detected source in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub flux: f64,
}

impl Detection {
    pub fn new(x: f64, y: f64, flux: f64) -> Self {
        Self { x, y, flux }
    }

    /// Finite, non-negative position and finite, positive flux.
    pub fn is_usable(&self) -> bool {
        self.x.is_finite()
            && self.x >= 0.0
            && self.y.is_finite()
            && self.y >= 0.0
            && self.flux.is_finite()
            && self.flux > 0.0
    }
}

/// Usable detections sorted brightest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    detections: Vec<Detection>,
}

impl Field {
    pub fn prepare(detections: &[Detection], min_count: usize) -> SolveResult<Self> {
        let required = min_count.max(1);
        if detections.len() < required {
            return Err(SolveError::InsufficientSources {
                found: detections.len(),
                required,
            });
        }

        let mut usable: Vec<Detection> = detections
            .iter()
            .copied()
            .filter(Detection::is_usable)
            .collect();
        if usable.len() < required {
            return Err(SolveError::InsufficientSources {
                found: usable.len(),
                required,
            });
        }

        usable.sort_by(|a, b| b.flux.total_cmp(&a.flux));
        debug!(
            supplied = detections.len(),
            usable = usable.len(),
            "field prepared"
        );
        Ok(Self { detections: usable })
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    /// The brightest `limit` detections.
    pub fn subset(&self, limit: BrightLimit) -> &[Detection] {
        match limit {
            BrightLimit::All => &self.detections,
            BrightLimit::Count(n) => &self.detections[..n.min(self.detections.len())],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrightLimit {
    #[default]
    All,
    Count(usize),
}

/// Holds the current field and the policy used to build its active subset.
#[derive(Debug, Clone)]
pub struct FieldPreparer {
    field: Option<Field>,
    bright_limit: BrightLimit,
    min_sources: usize,
}

impl Default for FieldPreparer {
    fn default() -> Self {
        Self {
            field: None,
            bright_limit: BrightLimit::All,
            min_sources: DEFAULT_MIN_SOURCES,
        }
    }
}

impl FieldPreparer {
    pub fn new(min_sources: usize) -> Self {
        Self {
            min_sources,
            ..Self::default()
        }
    }

    /// Replace the field. On failure the previous field is discarded as well.
    pub fn set_field(&mut self, detections: &[Detection]) -> SolveResult<&Field> {
        self.field = None;
        let field = Field::prepare(detections, self.min_sources)?;
        Ok(self.field.insert(field))
    }

    pub fn set_bright_limit(&mut self, limit: BrightLimit) -> SolveResult<()> {
        if limit == BrightLimit::Count(0) {
            return Err(SolveError::invalid_configuration(
                "bright limit must be greater than zero",
            ));
        }
        self.bright_limit = limit;
        Ok(())
    }

    /// Go back to handing every usable detection to the engine.
    pub fn reset_bright_limit(&mut self) {
        self.bright_limit = BrightLimit::All;
    }

    pub fn bright_limit(&self) -> BrightLimit {
        self.bright_limit
    }

    pub fn set_min_sources(&mut self, min_sources: usize) {
        self.min_sources = min_sources;
    }

    pub fn min_sources(&self) -> usize {
        self.min_sources
    }

    pub fn field(&self) -> Option<&Field> {
        self.field.as_ref()
    }

    pub fn active_subset(&self) -> Option<&[Detection]> {
        self.field.as_ref().map(|f| f.subset(self.bright_limit))
    }

    pub fn clear(&mut self) {
        self.field = None;
    }
}
