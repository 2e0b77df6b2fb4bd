//! Iterative weighted fit of a SIP-distorted TAN solution.
//!
//! Each iteration pairs reference stars with their nearest field star under
//! the current solution, then refits the tangent-plane position of every
//! pair as a polynomial in pixel offsets from `crpix`. The constant terms
//! move `crval`, the linear terms become the CD matrix and the remaining
//! terms, pulled back through CD⁻¹, become the forward SIP matrices. The
//! inverse matrices are fitted last on a regular grid over the image.

use celestial_wcs::distortion::polynomial::{exponent_pairs, power_term};
use celestial_wcs::projection::{deproject, project};
use celestial_wcs::{IntermediateCoord, PixelCoord, SipDistortion, SkyCoord, TanWcs};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{SolveError, SolveResult};
use crate::field::Detection;

const GATE_SIGMAS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSettings {
    pub order: u32,
    pub inverse_order: u32,
    pub iterations: usize,
    pub weighted: bool,
    pub jitter_arcsec: f64,
}

impl FitSettings {
    pub fn new(order: u32, jitter_arcsec: f64) -> Self {
        Self {
            order,
            inverse_order: order,
            iterations: 5,
            weighted: true,
            jitter_arcsec,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pair {
    field: usize,
    reference: usize,
    weight: f64,
}

pub fn fit_distortion(
    initial: &TanWcs,
    field: &[Detection],
    ref_xyz: &[[f64; 3]],
    settings: &FitSettings,
) -> SolveResult<TanWcs> {
    if settings.order < 1 {
        return Err(SolveError::invalid_configuration(
            "distortion order must be at least 1",
        ));
    }
    let refs: Vec<SkyCoord> = ref_xyz.iter().map(|&v| SkyCoord::from_unit_vector(v)).collect();
    let n_terms = exponent_pairs(settings.order, 0).len();
    let extent = initial
        .image_size()
        .unwrap_or_else(|| field_extent(field));

    let mut current = initial.clone();
    for iteration in 0..settings.iterations {
        let sigma_px = (settings.jitter_arcsec / current.pixel_scale_arcsec()).max(1.0);
        let pairs = correspond(&current, field, &refs, sigma_px, settings.weighted);
        if pairs.len() < n_terms.max(3) {
            return Err(SolveError::refinement_failed(format!(
                "{} correspondences for {} polynomial terms",
                pairs.len(),
                n_terms
            )));
        }
        current = fit_forward(&current, field, &refs, &pairs, settings.order)?;
        debug!(
            iteration,
            pairs = pairs.len(),
            scale_arcsec = current.pixel_scale_arcsec(),
            "distortion fit iteration"
        );
    }

    fit_inverse(&current, settings.inverse_order, extent)
}

fn field_extent(field: &[Detection]) -> (f64, f64) {
    field.iter().fold((1.0_f64, 1.0_f64), |(w, h), d| (w.max(d.x), h.max(d.y)))
}

/// Nearest field star for each reference star, keeping the closest reference per field star.
fn correspond(
    wcs: &TanWcs,
    field: &[Detection],
    refs: &[SkyCoord],
    sigma_px: f64,
    weighted: bool,
) -> Vec<Pair> {
    let gate = GATE_SIGMAS * sigma_px;
    let mut best: Vec<Option<(usize, f64)>> = vec![None; field.len()];

    for (r, sky) in refs.iter().enumerate() {
        let Ok(pixel) = wcs.sky_to_pixel(*sky) else {
            continue;
        };
        let nearest = field
            .iter()
            .enumerate()
            .map(|(j, d)| (j, pixel.distance_to(PixelCoord::new(d.x, d.y))))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((j, dist)) = nearest {
            if dist <= gate && best[j].map_or(true, |(_, d)| dist < d) {
                best[j] = Some((r, dist));
            }
        }
    }

    best.iter()
        .enumerate()
        .filter_map(|(j, b)| {
            b.map(|(r, dist)| Pair {
                field: j,
                reference: r,
                weight: if weighted {
                    libm::exp(-dist * dist / (2.0 * sigma_px * sigma_px))
                } else {
                    1.0
                },
            })
        })
        .collect()
}

fn fit_forward(
    current: &TanWcs,
    field: &[Detection],
    refs: &[SkyCoord],
    pairs: &[Pair],
    order: u32,
) -> SolveResult<TanWcs> {
    let crpix = current.crpix();
    let crval = current.crval();
    let terms = exponent_pairs(order, 0);

    let offsets: Vec<(f64, f64)> = pairs
        .iter()
        .map(|p| (field[p.field].x - crpix[0], field[p.field].y - crpix[1]))
        .collect();
    let mut xi = DVector::zeros(pairs.len());
    let mut eta = DVector::zeros(pairs.len());
    for (i, p) in pairs.iter().enumerate() {
        let inter = project(crval, refs[p.reference])?;
        xi[i] = inter.x_deg();
        eta[i] = inter.y_deg();
    }
    let w = DVector::from_iterator(pairs.len(), pairs.iter().map(|p| p.weight));

    let norm = normalization(&offsets);
    let a = design_matrix(&offsets, &terms, norm);
    let c = rescale(solve_weighted(&a, &xi, &w)?, &terms, norm);
    let d = rescale(solve_weighted(&a, &eta, &w)?, &terms, norm);

    let coefficient = |values: &Vec<f64>, p: u32, q: u32| coefficient_of(&terms, values, p, q);

    let cd = [
        [coefficient(&c, 1, 0), coefficient(&c, 0, 1)],
        [coefficient(&d, 1, 0), coefficient(&d, 0, 1)],
    ];
    let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
    if !det.is_finite() || det == 0.0 {
        return Err(SolveError::refinement_failed("fitted CD matrix is singular"));
    }
    let inv = [
        [cd[1][1] / det, -cd[0][1] / det],
        [-cd[1][0] / det, cd[0][0] / det],
    ];

    let mut sip = SipDistortion::new(crpix, order, order);
    for &(p, q) in terms.iter().filter(|&&(p, q)| p + q >= 2) {
        let (cx, cy) = (coefficient(&c, p, q), coefficient(&d, p, q));
        sip.set_a(p, q, inv[0][0] * cx + inv[0][1] * cy);
        sip.set_b(p, q, inv[1][0] * cx + inv[1][1] * cy);
    }

    let new_crval = deproject(
        crval,
        IntermediateCoord::new(coefficient(&c, 0, 0), coefficient(&d, 0, 0)),
    );
    let mut wcs = TanWcs::new(new_crval, crpix, cd, current.frame().clone())
        .map_err(|e| SolveError::refinement_failed(e.to_string()))?
        .with_sip(sip);
    if let Some((width, height)) = current.image_size() {
        wcs = wcs.with_image_size(width, height);
    }
    Ok(wcs)
}

fn fit_inverse(wcs: &TanWcs, inverse_order: u32, extent: (f64, f64)) -> SolveResult<TanWcs> {
    let Some(forward) = wcs.sip() else {
        return Ok(wcs.clone());
    };
    let crpix = forward.crpix();
    let steps = 10.max(3 * (inverse_order as usize + 1));
    let terms = exponent_pairs(inverse_order, 0);

    let mut distorted = Vec::with_capacity(steps * steps);
    let mut du = Vec::with_capacity(steps * steps);
    let mut dv = Vec::with_capacity(steps * steps);
    for i in 0..steps {
        for j in 0..steps {
            let x = extent.0 * i as f64 / (steps - 1) as f64;
            let y = extent.1 * j as f64 / (steps - 1) as f64;
            let (xd, yd) = forward.apply(x, y);
            distorted.push((xd - crpix[0], yd - crpix[1]));
            du.push(x - xd);
            dv.push(y - yd);
        }
    }

    let norm = normalization(&distorted);
    let a = design_matrix(&distorted, &terms, norm);
    let w = DVector::from_element(distorted.len(), 1.0);
    let ap = rescale(solve_weighted(&a, &DVector::from_vec(du), &w)?, &terms, norm);
    let bp = rescale(solve_weighted(&a, &DVector::from_vec(dv), &w)?, &terms, norm);

    let mut sip = forward.clone();
    sip.set_inverse_order(inverse_order, inverse_order);
    for (k, &(p, q)) in terms.iter().enumerate() {
        sip.set_ap(p, q, ap[k]);
        sip.set_bp(p, q, bp[k]);
    }
    Ok(wcs.clone().with_sip(sip))
}

fn coefficient_of(terms: &[(u32, u32)], values: &[f64], p: u32, q: u32) -> f64 {
    terms
        .iter()
        .position(|&t| t == (p, q))
        .map_or(0.0, |k| values[k])
}

fn normalization(offsets: &[(f64, f64)]) -> f64 {
    offsets
        .iter()
        .fold(1.0_f64, |m, &(u, v)| m.max(u.abs()).max(v.abs()))
}

fn design_matrix(offsets: &[(f64, f64)], terms: &[(u32, u32)], norm: f64) -> DMatrix<f64> {
    DMatrix::from_fn(offsets.len(), terms.len(), |i, k| {
        let (u, v) = offsets[i];
        let (p, q) = terms[k];
        power_term(u / norm, v / norm, p, q)
    })
}

fn rescale(solution: DVector<f64>, terms: &[(u32, u32)], norm: f64) -> Vec<f64> {
    solution
        .iter()
        .zip(terms)
        .map(|(c, &(p, q))| c / norm.powi((p + q) as i32))
        .collect()
}

fn solve_weighted(a: &DMatrix<f64>, b: &DVector<f64>, w: &DVector<f64>) -> SolveResult<DVector<f64>> {
    let sqrt_w = w.map(libm::sqrt);
    let rows = a.nrows();
    let cols = a.ncols();
    let a_w = DMatrix::from_fn(rows, cols, |i, j| a[(i, j)] * sqrt_w[i]);
    let b_w = DVector::from_fn(rows, |i, _| b[i] * sqrt_w[i]);
    let svd = a_w.svd(true, true);
    let x = svd
        .solve(&b_w, 1e-10)
        .map_err(|e| SolveError::refinement_failed(format!("SVD solve failed: {}", e)))?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::refinement_failed("non-finite polynomial coefficient"));
    }
    Ok(x)
}
