//! Plate solving on top of an external quad-matching engine.
//!
//! `celestial-astrometry` manages the reference-index catalog, prepares the
//! detected star field, drives the engine through blind, position-guided and
//! guess-seeded solves, and turns the best match into WCS solutions,
//! cross-matched source lists and catalog queries.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`index`] | Index abstraction, deduplicating catalog, lazy loading, candidate selection |
//! | [`field`] | Detection filtering, brightness ordering, bright-star subsets |
//! | [`engine`] | The [`MatchingEngine`] seam and the match it reports |
//! | [`solver`] | Solve state machine and tunables |
//! | [`extract`] | Linear and SIP solutions, cross-matched sources |
//! | [`refine`] | Weighted SIP distortion fitting |
//! | [`query`] | Radius and on-image catalog queries |
//! | [`config`] | TOML configuration and index path resolution |
//!
//! # Example
//!
//! ```ignore
//! let config = AstrometryConfig::from_file(Path::new("astrometry.toml"))?;
//! let mut solver = Solver::from_config(&config, &mut store, || engine_session())?;
//! solver.set_image_size(1024.0, 1024.0)?;
//! solver.set_field(&detections)?;
//! solver.set_plate_scale(2.0)?;
//! if solver.solve_blind()? {
//!     let wcs = solver.results()?.distorted_wcs(2)?;
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod field;
pub mod index;
pub mod query;
pub mod refine;
pub mod sky;
pub mod solver;

pub use config::{AstrometryConfig, ConfigError};
pub use engine::{MatchRecord, MatchingEngine, Parity, SessionFactory, TanSolution};
pub use error::{ErrorKind, SolveError, SolveResult, UnsuitableCause};
pub use extract::{ResultExtractor, SourceMatch, SourceRecord};
pub use field::{BrightLimit, Detection, Field, FieldPreparer};
pub use index::{CatalogIndex, Footprint, IndexCatalog, IndexKey, IndexMetadata, IndexStore};
pub use query::{CatalogQuery, CatalogSource};
pub use sky::SkyCap;
pub use solver::{SolveState, Solver};

pub mod test_helpers;
