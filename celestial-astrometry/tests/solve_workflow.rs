mod common;

use celestial_astrometry::index::{CatalogIndex, Footprint, IndexKey};
use celestial_astrometry::solver::{default_match_threshold, DEFAULT_SCALE_HI_ARCSEC, DEFAULT_SCALE_LO_ARCSEC};
use celestial_astrometry::test_helpers::{StubEngine, StubIndex, StubIndexStore, SyntheticSky};
use celestial_astrometry::{
    AstrometryConfig, BrightLimit, Detection, ErrorKind, MatchingEngine, Parity, SkyCap, SolveError, Solver,
    UnsuitableCause,
};
use celestial_wcs::{Frame, SkyCoord, TanWcs};
use common::{new_log, ready_solver, solved_solver, solver_with, truth, HEIGHT, WIDTH};

fn bright_field(n: usize) -> Vec<Detection> {
    (0..n)
        .map(|i| Detection::new(10.0 + 30.0 * i as f64, 500.0, 50.0 + i as f64))
        .collect()
}

// --- Index catalog ---

#[test]
fn duplicate_index_identity_keeps_first_file() {
    let mut store = StubIndexStore::new();
    store.add("a.fits", StubIndex::all_sky("a", IndexKey::new(4208, 3, 2), 10.0, 20.0));
    store.add("b.fits", StubIndex::all_sky("b", IndexKey::new(4209, 3, 2), 10.0, 20.0));
    store.add("a-again.fits", StubIndex::all_sky("a-again", IndexKey::new(4208, 3, 2), 30.0, 40.0));

    let config = AstrometryConfig {
        index_files: vec!["a.fits".into(), "b.fits".into(), "a-again.fits".into()],
        verbosity: 2,
        ..AstrometryConfig::default()
    };
    let log = new_log();
    let solver = Solver::from_config(&config, &mut store, StubEngine::factory(log.clone(), None)).unwrap();

    let names: Vec<_> = solver
        .catalog()
        .entries()
        .iter()
        .map(|e| e.metadata().name.clone())
        .collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(log.borrow().verbosity, Some(2));
}

#[test]
fn missing_index_file_does_not_abort_load() {
    let mut store = StubIndexStore::new();
    store.add("b.fits", StubIndex::all_sky("b", IndexKey::new(1, 0, 1), 10.0, 20.0));
    let config = AstrometryConfig {
        index_files: vec!["nowhere.fits".into(), "b.fits".into()],
        ..AstrometryConfig::default()
    };
    let solver = Solver::from_config(&config, &mut store, StubEngine::factory(new_log(), None)).unwrap();
    assert_eq!(solver.catalog().len(), 1);
}

#[test]
fn config_frame_is_used_for_solutions() {
    let mut store = StubIndexStore::new();
    let config = AstrometryConfig::from_toml_str("index_files = []\nequinox = 1950.0\nra_dec_sys = \"FK4\"\n").unwrap();
    let solver = Solver::from_config(&config, &mut store, StubEngine::factory(new_log(), None)).unwrap();
    assert_eq!(solver.frame(), &Frame::new(1950.0, "FK4"));
}

// --- Field preparation ---

#[test]
fn field_with_exactly_min_sources_is_accepted() {
    let (mut solver, _) = solver_with(vec![], None);
    solver.set_field(&bright_field(20)).unwrap();
    assert_eq!(solver.field().unwrap().len(), 20);
}

#[test]
fn field_below_min_sources_after_filtering_is_rejected() {
    let (mut solver, _) = solver_with(vec![], None);
    let mut detections = bright_field(20);
    detections[3].flux = 0.0;

    let err = solver.set_field(&detections).unwrap_err();
    assert!(matches!(
        err,
        SolveError::InsufficientSources {
            found: 19,
            required: 20
        }
    ));
}

#[test]
fn small_field_fails_and_later_solve_reports_field_not_set() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, _) = solver_with(vec![sky.index(1.0, 1e5)], Some(sky.match_record()));

    let err = solver.set_field(&bright_field(5)).unwrap_err();
    assert!(matches!(
        err,
        SolveError::InsufficientSources {
            found: 5,
            required: 20
        }
    ));
    assert!(matches!(solver.solve_blind(), Err(SolveError::FieldNotSet)));
    assert!(matches!(solver.solve_at(10.0, 20.0, 2.0), Err(SolveError::FieldNotSet)));
    assert!(matches!(
        solver.solve_from_guess(&truth(1.5), 10.0),
        Err(SolveError::FieldNotSet)
    ));
}

#[test]
fn failed_set_field_discards_previous_field() {
    let (mut solver, _) = solver_with(vec![], None);
    solver.set_field(&bright_field(25)).unwrap();
    assert!(solver.set_field(&bright_field(3)).is_err());
    assert!(solver.field().is_none());
}

#[test]
fn field_is_sorted_and_bright_limit_takes_prefix() {
    let (mut solver, log) = solver_with(vec![], None);
    solver.set_field(&bright_field(30)).unwrap();

    let field = solver.field().unwrap().detections().to_vec();
    assert!(field.windows(2).all(|w| w[0].flux >= w[1].flux));
    assert_eq!(field[0].flux, 79.0);

    solver.set_bright_limit(BrightLimit::Count(12)).unwrap();
    assert_eq!(solver.active_subset().unwrap(), &field[..12]);

    solver.set_bright_limit(BrightLimit::Count(500)).unwrap();
    assert_eq!(solver.active_subset().unwrap().len(), 30);

    assert_eq!(log.borrow().field_sizes, vec![30, 12, 30]);
}

#[test]
fn bright_limit_before_field_applies_on_set_field() {
    let (mut solver, log) = solver_with(vec![], None);
    solver.set_bright_limit(BrightLimit::Count(8)).unwrap();
    assert!(log.borrow().field_sizes.is_empty());

    solver.set_field(&bright_field(25)).unwrap();
    assert_eq!(solver.active_subset().unwrap().len(), 8);
    assert_eq!(log.borrow().field_sizes, vec![8]);
}

#[test]
fn zero_bright_limit_is_rejected() {
    let (mut solver, _) = solver_with(vec![], None);
    let err = solver.set_bright_limit(BrightLimit::Count(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// --- Tunables ---

#[test]
fn defaults_are_applied_to_new_sessions() {
    let (solver, _) = solver_with(vec![], None);
    assert_eq!(solver.scale_range(), (DEFAULT_SCALE_LO_ARCSEC, DEFAULT_SCALE_HI_ARCSEC));
    assert_eq!(solver.parity(), Parity::Unknown);
    assert!((solver.match_threshold() - 12.0 * std::f64::consts::LN_10).abs() < 1e-12);
}

#[test]
fn configure_rejects_inverted_scale_window() {
    let (mut solver, _) = solver_with(vec![], None);
    for (lo, hi) in [(2.0, 1.0), (1.5, 1.5), (0.0, 1.0), (f64::NAN, 1.0)] {
        let err = solver.configure(lo, hi, Parity::Normal, 20.0).unwrap_err();
        assert!(matches!(err, SolveError::InvalidConfiguration(_)), "{lo} {hi}");
    }
    assert_eq!(solver.scale_range().0, DEFAULT_SCALE_LO_ARCSEC);

    solver.configure(1.0, 2.0, Parity::Flipped, 25.0).unwrap();
    assert_eq!(solver.scale_range(), (1.0, 2.0));
    assert_eq!(solver.parity(), Parity::Flipped);
    assert_eq!(solver.match_threshold(), 25.0);
}

#[test]
fn plate_scale_opens_one_percent_window() {
    let (mut solver, _) = solver_with(vec![], None);
    solver.set_plate_scale(2.0).unwrap();
    let (lo, hi) = solver.scale_range();
    assert!((lo - 1.98).abs() < 1e-12);
    assert!((hi - 2.02).abs() < 1e-12);
}

#[test]
fn verbosity_outside_range_is_rejected() {
    let (mut solver, log) = solver_with(vec![], None);
    solver.set_verbosity(4).unwrap();
    assert_eq!(log.borrow().verbosity, Some(4));
    assert!(matches!(solver.set_verbosity(5), Err(SolveError::InvalidConfiguration(_))));
    assert_eq!(log.borrow().verbosity, Some(4));
}

#[test]
fn invalid_image_size_is_rejected() {
    let (mut solver, _) = solver_with(vec![], None);
    assert!(solver.set_image_size(0.0, 100.0).is_err());
    assert!(solver.set_image_size(100.0, f64::INFINITY).is_err());
}

// --- Solving ---

#[test]
fn solve_without_indices_fails() {
    let (mut solver, _) = solver_with(vec![], None);
    solver.set_field(&bright_field(25)).unwrap();
    assert!(matches!(solver.solve_blind(), Err(SolveError::NoIndicesLoaded)));
}

#[test]
fn blind_solve_runs_linear_tweak() {
    let sky = SyntheticSky::new(truth(1.5), 25, 5);
    let (solver, log) = solved_solver(&sky);

    assert!(solver.is_solved());
    let log = log.borrow();
    assert_eq!(log.tweaks, vec![1]);
    assert_eq!(log.runs.len(), 1);
    let run = &log.runs[0];
    assert_eq!(run.hint, None);
    assert_eq!(run.field_len, 30);
    assert_eq!(run.match_threshold, default_match_threshold());
    assert!((run.quad_range.0 - 0.1 * WIDTH * DEFAULT_SCALE_LO_ARCSEC).abs() < 1e-12);
}

#[test]
fn second_solve_fails_until_reset() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, log) = solved_solver(&sky);

    assert!(matches!(solver.solve_blind(), Err(SolveError::AlreadySolved)));
    assert!(matches!(solver.solve_at(10.0, 20.0, 1.0), Err(SolveError::AlreadySolved)));
    assert_eq!(log.borrow().runs.len(), 1);

    solver.set_plate_scale(1.5).unwrap();
    solver.reset();
    assert!(!solver.is_solved());
    assert_eq!(solver.scale_range(), (DEFAULT_SCALE_LO_ARCSEC, DEFAULT_SCALE_HI_ARCSEC));
    assert_eq!(solver.parity(), Parity::Unknown);
    assert_eq!(solver.field().unwrap().len(), 25);

    assert!(solver.solve_blind().unwrap());
    let log = log.borrow();
    assert_eq!(log.sessions, 2);
    assert_eq!(log.runs.len(), 2);
    assert_eq!(log.runs[1].field_len, 25);
}

#[test]
fn reset_restores_bright_limit_and_keeps_field() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, log) = ready_solver(&sky);
    solver.set_bright_limit(BrightLimit::Count(10)).unwrap();

    solver.reset();
    assert_eq!(solver.active_subset().unwrap().len(), 25);
    assert_eq!(log.borrow().field_sizes.last(), Some(&25));
}

#[test]
fn reset_resends_verbosity() {
    let (mut solver, log) = solver_with(vec![], None);
    solver.set_verbosity(3).unwrap();
    log.borrow_mut().verbosity = None;

    solver.reset();
    assert_eq!(log.borrow().verbosity, Some(3));
    assert_eq!(log.borrow().sessions, 2);
}

#[test]
fn bright_limit_change_clears_solution() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, log) = solved_solver(&sky);

    solver.set_bright_limit(BrightLimit::Count(10)).unwrap();
    assert!(!solver.is_solved());
    assert!(matches!(solver.results(), Err(SolveError::NotSolved)));
    assert_eq!(log.borrow().field_sizes.last(), Some(&10));

    assert!(solver.solve_blind().unwrap());
    assert_eq!(log.borrow().runs.last().unwrap().field_len, 10);
}

#[test]
fn rejected_bright_limit_keeps_solution() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, _) = solved_solver(&sky);

    assert!(solver.set_bright_limit(BrightLimit::Count(0)).is_err());
    assert!(solver.is_solved());
}

#[test]
fn new_field_clears_previous_solution() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, _) = solved_solver(&sky);

    solver.set_field(&sky.detections()).unwrap();
    assert!(!solver.is_solved());
    assert!(solver.solve_blind().unwrap());
}

#[test]
fn failed_attempt_can_be_retried() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, log) = ready_solver(&sky);

    solver.set_scale_range(10.0, 20.0).unwrap();
    assert!(!solver.solve_blind().unwrap());
    assert!(!solver.is_solved());
    assert!(matches!(solver.best_match(), Err(SolveError::NotSolved)));

    solver.set_plate_scale(1.5).unwrap();
    assert!(solver.solve_blind().unwrap());
    assert_eq!(log.borrow().tweaks, vec![1]);
    assert!((solver.solved_image_scale().unwrap() - 1.5).abs() < 1e-9);
}

#[test]
fn solve_at_offers_engine_only_overlapping_indices() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let near = StubIndex::new(
        "near",
        IndexKey::new(4110, 1, 2),
        1.0,
        1e5,
        Footprint::Cap(SkyCap::new(11.0, 21.0, 1.0)),
    );
    let far = StubIndex::new(
        "far",
        IndexKey::new(4110, 7, 2),
        1.0,
        1e5,
        Footprint::Cap(SkyCap::new(200.0, -40.0, 1.0)),
    );
    let wide = StubIndex::all_sky("wide", IndexKey::new(4119, 0, 0), 1.0, 1e5);
    let (mut solver, log) = solver_with(vec![near, far, wide, sky.index(1.0, 1e5)], None);
    solver.set_field(&sky.detections()).unwrap();

    assert!(!solver.solve_at(10.0, 20.0, 2.0).unwrap());

    let log = log.borrow();
    let run = &log.runs[0];
    assert_eq!(
        run.indices,
        vec![IndexKey::new(4110, 1, 2), IndexKey::new(4119, 0, 0), sky.key]
    );
    assert_eq!(run.hint, Some(SkyCap::new(10.0, 20.0, 2.0)));

    let far_entry = solver.catalog().get(1).unwrap();
    assert!(!far_entry.index().is_loaded());
}

#[test]
fn solve_at_outside_all_footprints_reports_sky_cause() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let north = StubIndex::new(
        "north",
        IndexKey::new(4110, 1, 2),
        1.0,
        1e5,
        Footprint::Cap(SkyCap::new(10.0, 70.0, 3.0)),
    );
    let (mut solver, _) = solver_with(vec![north], None);
    solver.set_field(&sky.detections()).unwrap();

    let err = solver.solve_at(10.0, -30.0, 1.0).unwrap_err();
    assert!(matches!(
        err,
        SolveError::NoSuitableIndices {
            cause: UnsuitableCause::NoSkyCoverage
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Resource);
}

#[test]
fn blind_solve_with_no_matching_scale_reports_scale_cause() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, _) = solver_with(vec![sky.index(1.0, 10.0)], None);
    solver.set_field(&sky.detections()).unwrap();
    solver.set_plate_scale(1.5).unwrap();

    let err = solver.solve_blind().unwrap_err();
    assert!(matches!(
        err,
        SolveError::NoSuitableIndices {
            cause: UnsuitableCause::NoMatchingScale
        }
    ));
}

#[test]
fn solve_at_validates_position_and_radius() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, log) = ready_solver(&sky);
    for (ra, dec, r) in [(-1.0, 0.0, 1.0), (361.0, 0.0, 1.0), (10.0, 91.0, 1.0), (10.0, 20.0, 0.0)] {
        assert!(
            matches!(solver.solve_at(ra, dec, r), Err(SolveError::InvalidConfiguration(_))),
            "{ra} {dec} {r}"
        );
    }
    assert!(log.borrow().runs.is_empty());
}

#[test]
fn scenario_solve_at_reports_reference_point() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let index = StubIndex::new(
        &sky.name,
        sky.key,
        1.0,
        2.0,
        Footprint::Cap(SkyCap::new(10.0, 20.0, 1.0)),
    );
    let (mut solver, _) = solver_with(vec![index], Some(sky.match_record()));
    solver.set_field(&sky.detections()).unwrap();

    assert!(solver.solve_at(10.0, 20.0, 2.0).unwrap());
    let wcs = solver.results().unwrap().linear_wcs().unwrap();
    assert!((wcs.crval().ra_deg() - 10.0).abs() < 1e-12);
    assert!((wcs.crval().dec_deg() - 20.0).abs() < 1e-12);
}

#[test]
fn solve_at_rejects_match_outside_hint() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, _) = ready_solver(&sky);
    assert!(!solver.solve_at(40.0, 20.0, 1.0).unwrap());
    assert!(!solver.is_solved());
}

#[test]
fn solve_from_guess_derives_window_parity_and_hint() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, log) = ready_solver(&sky);

    assert!(solver.solve_from_guess(&truth(1.5), 10.0).unwrap());

    let log = log.borrow();
    let run = &log.runs[0];
    assert!((run.scale_range.0 - 1.35).abs() < 1e-6);
    assert!((run.scale_range.1 - 1.65).abs() < 1e-6);
    assert_eq!(run.parity, Parity::Normal);

    let hint = run.hint.unwrap();
    assert!((hint.ra_deg - 10.0).abs() < 1e-9);
    assert!((hint.dec_deg - 20.0).abs() < 1e-9);
    let max_quad_radius_arcsec = libm::hypot(WIDTH, HEIGHT) * 1.65 / 2.0;
    assert!((hint.radius_deg - 2.0 * max_quad_radius_arcsec / 3600.0).abs() < 1e-6);
}

#[test]
fn solve_from_guess_with_flipped_guess_sets_flipped_parity() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, log) = ready_solver(&sky);
    let s = 1.5 / 3600.0;
    let mirrored = TanWcs::new(
        SkyCoord::new(10.0, 20.0),
        [WIDTH / 2.0, HEIGHT / 2.0],
        [[s, 0.0], [0.0, s]],
        Frame::default(),
    )
    .unwrap();

    assert!(!solver.solve_from_guess(&mirrored, 5.0).unwrap());
    assert_eq!(log.borrow().runs[0].parity, Parity::Flipped);
}

#[test]
fn solve_from_guess_without_uncertainty_uses_plate_scale_window() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, log) = ready_solver(&sky);
    assert!(solver.solve_from_guess(&truth(1.5), 0.0).unwrap());
    let (lo, hi) = log.borrow().runs[0].scale_range;
    assert!((lo - 0.99 * 1.5).abs() < 1e-6);
    assert!((hi - 1.01 * 1.5).abs() < 1e-6);
}

#[test]
fn solve_from_guess_validates_uncertainty() {
    let sky = SyntheticSky::new(truth(1.5), 25, 0);
    let (mut solver, _) = ready_solver(&sky);
    for pct in [-1.0, 100.0, f64::NAN] {
        assert!(matches!(
            solver.solve_from_guess(&truth(1.5), pct),
            Err(SolveError::InvalidConfiguration(_))
        ));
    }
}

#[test]
fn engine_bounds_follow_image_size() {
    let (solver, _) = solver_with(vec![], None);
    assert_eq!(solver.engine().field_size(), (WIDTH, HEIGHT));
    assert_eq!(solver.engine().field_center(), (WIDTH / 2.0, HEIGHT / 2.0));
}
