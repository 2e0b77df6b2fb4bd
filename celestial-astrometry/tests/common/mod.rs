#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use celestial_astrometry::index::{CatalogIndex, IndexCatalog};
use celestial_astrometry::test_helpers::{EngineLog, SharedLog, StubEngine, StubIndex, SyntheticSky};
use celestial_astrometry::{MatchRecord, Solver};
use celestial_wcs::{Frame, SkyCoord, TanWcs};

pub const WIDTH: f64 = 1024.0;
pub const HEIGHT: f64 = 1024.0;

/// North-up, east-left TAN solution centred on (10°, 20°).
pub fn truth(scale_arcsec: f64) -> TanWcs {
    let s = scale_arcsec / 3600.0;
    TanWcs::new(
        SkyCoord::new(10.0, 20.0),
        [WIDTH / 2.0, HEIGHT / 2.0],
        [[-s, 0.0], [0.0, s]],
        Frame::default(),
    )
    .unwrap()
    .with_image_size(WIDTH, HEIGHT)
}

pub fn new_log() -> SharedLog {
    Rc::new(RefCell::new(EngineLog::default()))
}

pub fn catalog_of(indices: Vec<StubIndex>) -> IndexCatalog<StubIndex> {
    let mut catalog = IndexCatalog::default();
    for index in indices {
        let path = format!("{}.fits", index.metadata().name);
        catalog.insert(path, index);
    }
    catalog
}

pub fn solver_with(
    indices: Vec<StubIndex>,
    outcome: Option<MatchRecord>,
) -> (Solver<StubIndex, impl Fn() -> StubEngine>, SharedLog) {
    let log = new_log();
    let mut solver = Solver::new(
        catalog_of(indices),
        StubEngine::factory(Rc::clone(&log), outcome),
        Frame::default(),
    );
    solver.set_image_size(WIDTH, HEIGHT).unwrap();
    (solver, log)
}

/// A solver holding the synthetic field and an all-sky index of its catalog, not yet solved.
pub fn ready_solver(sky: &SyntheticSky) -> (Solver<StubIndex, impl Fn() -> StubEngine>, SharedLog) {
    let (mut solver, log) = solver_with(vec![sky.index(1.0, 1e5)], Some(sky.match_record()));
    solver.set_field(&sky.detections()).unwrap();
    (solver, log)
}

pub fn solved_solver(sky: &SyntheticSky) -> (Solver<StubIndex, impl Fn() -> StubEngine>, SharedLog) {
    let (mut solver, log) = ready_solver(sky);
    assert!(solver.solve_blind().unwrap());
    (solver, log)
}
