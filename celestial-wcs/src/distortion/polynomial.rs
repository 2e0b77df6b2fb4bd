#[inline]
pub fn power_term(x: f64, y: f64, p: u32, q: u32) -> f64 {
    x.powi(p as i32) * y.powi(q as i32)
}

/// Every `(p, q)` exponent pair with `min_total <= p + q <= order`, ordered by
/// total degree then by descending `p`.
pub fn exponent_pairs(order: u32, min_total: u32) -> Vec<(u32, u32)> {
    let mut pairs = Vec::new();
    for total in min_total..=order {
        for p in (0..=total).rev() {
            pairs.push((p, total - p));
        }
    }
    pairs
}

pub fn newton_raphson_2d<F>(
    target: (f64, f64),
    initial_guess: (f64, f64),
    distort_fn: F,
    max_iter: usize,
    tolerance: f64,
) -> Result<(f64, f64), &'static str>
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let (tx, ty) = target;
    let (mut x, mut y) = initial_guess;

    for _ in 0..max_iter {
        let (fx, fy) = distort_fn(x, y);
        let (dx, dy) = (fx - tx, fy - ty);

        if dx.abs() < tolerance && dy.abs() < tolerance {
            return Ok((x, y));
        }

        let (j11, j12, j21, j22) = compute_jacobian(&distort_fn, x, y);
        let (delta_x, delta_y) = solve_2x2(j11, j12, j21, j22, dx, dy)?;

        x -= delta_x;
        y -= delta_y;
    }

    Err("Newton-Raphson failed to converge")
}

fn compute_jacobian<F>(f: &F, x: f64, y: f64) -> (f64, f64, f64, f64)
where
    F: Fn(f64, f64) -> (f64, f64),
{
    const H: f64 = 1e-6;
    let (fx_px, fy_px) = f(x + H, y);
    let (fx_mx, fy_mx) = f(x - H, y);
    let (fx_py, fy_py) = f(x, y + H);
    let (fx_my, fy_my) = f(x, y - H);

    let j11 = (fx_px - fx_mx) / (2.0 * H);
    let j12 = (fx_py - fx_my) / (2.0 * H);
    let j21 = (fy_px - fy_mx) / (2.0 * H);
    let j22 = (fy_py - fy_my) / (2.0 * H);

    (j11, j12, j21, j22)
}

fn solve_2x2(
    j11: f64,
    j12: f64,
    j21: f64,
    j22: f64,
    b1: f64,
    b2: f64,
) -> Result<(f64, f64), &'static str> {
    let det = j11 * j22 - j12 * j21;
    if det.abs() < 1e-15 {
        return Err("Singular Jacobian matrix");
    }
    let inv_det = 1.0 / det;
    let x = inv_det * (j22 * b1 - j12 * b2);
    let y = inv_det * (-j21 * b1 + j11 * b2);
    Ok((x, y))
}
