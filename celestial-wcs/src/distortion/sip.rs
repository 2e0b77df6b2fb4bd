use crate::error::{WcsError, WcsResult};

use super::polynomial::{newton_raphson_2d, power_term};

/// Square coefficient matrix of a SIP polynomial, indexed `[p][q]` for the
/// term `u^p v^q`. Only entries with `p + q <= order` contribute.
#[derive(Debug, Clone, PartialEq)]
pub struct SipMatrix {
    order: u32,
    coeffs: Vec<f64>,
}

impl SipMatrix {
    pub fn zeros(order: u32) -> Self {
        let size = order as usize + 1;
        Self {
            order,
            coeffs: vec![0.0; size * size],
        }
    }

    #[inline]
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Side length of the matrix (`order + 1`).
    #[inline]
    pub fn size(&self) -> usize {
        self.order as usize + 1
    }

    pub fn get(&self, p: u32, q: u32) -> f64 {
        if p > self.order || q > self.order {
            return 0.0;
        }
        self.coeffs[p as usize * self.size() + q as usize]
    }

    pub fn set(&mut self, p: u32, q: u32, value: f64) {
        if p + q <= self.order {
            let size = self.size();
            self.coeffs[p as usize * size + q as usize] = value;
        }
    }

    pub fn eval(&self, u: f64, v: f64) -> f64 {
        let mut sum = 0.0;
        for p in 0..=self.order {
            for q in 0..=(self.order - p) {
                let c = self.get(p, q);
                if c != 0.0 {
                    sum += c * power_term(u, v, p, q);
                }
            }
        }
        sum
    }

    /// Row-major copy of the full matrix.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.coeffs
            .chunks(self.size())
            .map(|row| row.to_vec())
            .collect()
    }
}

/// Simple Imaging Polynomial distortion, applied in pixel space relative to `crpix`.
#[derive(Debug, Clone, PartialEq)]
pub struct SipDistortion {
    crpix: [f64; 2],
    a: SipMatrix,
    b: SipMatrix,
    ap: Option<SipMatrix>,
    bp: Option<SipMatrix>,
}

impl SipDistortion {
    pub fn new(crpix: [f64; 2], a_order: u32, b_order: u32) -> Self {
        Self {
            crpix,
            a: SipMatrix::zeros(a_order),
            b: SipMatrix::zeros(b_order),
            ap: None,
            bp: None,
        }
    }

    pub fn from_matrices(
        crpix: [f64; 2],
        a: SipMatrix,
        b: SipMatrix,
        inverse: Option<(SipMatrix, SipMatrix)>,
    ) -> Self {
        let (ap, bp) = match inverse {
            Some((ap, bp)) => (Some(ap), Some(bp)),
            None => (None, None),
        };
        Self { crpix, a, b, ap, bp }
    }

    pub fn set_a(&mut self, p: u32, q: u32, value: f64) {
        self.a.set(p, q, value);
    }

    pub fn set_b(&mut self, p: u32, q: u32, value: f64) {
        self.b.set(p, q, value);
    }

    pub fn set_inverse_order(&mut self, ap_order: u32, bp_order: u32) {
        self.ap = Some(SipMatrix::zeros(ap_order));
        self.bp = Some(SipMatrix::zeros(bp_order));
    }

    pub fn set_ap(&mut self, p: u32, q: u32, value: f64) {
        if let Some(ap) = self.ap.as_mut() {
            ap.set(p, q, value);
        }
    }

    pub fn set_bp(&mut self, p: u32, q: u32, value: f64) {
        if let Some(bp) = self.bp.as_mut() {
            bp.set(p, q, value);
        }
    }

    #[inline]
    pub fn crpix(&self) -> [f64; 2] {
        self.crpix
    }

    pub fn with_crpix(mut self, crpix: [f64; 2]) -> Self {
        self.crpix = crpix;
        self
    }

    #[inline]
    pub fn a(&self) -> &SipMatrix {
        &self.a
    }

    #[inline]
    pub fn b(&self) -> &SipMatrix {
        &self.b
    }

    #[inline]
    pub fn ap(&self) -> Option<&SipMatrix> {
        self.ap.as_ref()
    }

    #[inline]
    pub fn bp(&self) -> Option<&SipMatrix> {
        self.bp.as_ref()
    }

    /// Distort a pixel position: `(x, y) -> (x + A(u, v), y + B(u, v))`.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let u = x - self.crpix[0];
        let v = y - self.crpix[1];
        (x + self.a.eval(u, v), y + self.b.eval(u, v))
    }

    pub fn apply_inverse(&self, x: f64, y: f64) -> WcsResult<(f64, f64)> {
        match (&self.ap, &self.bp) {
            (Some(ap), Some(bp)) => {
                let u = x - self.crpix[0];
                let v = y - self.crpix[1];
                Ok((x + ap.eval(u, v), y + bp.eval(u, v)))
            }
            _ => self.apply_inverse_iterative(x, y),
        }
    }

    fn apply_inverse_iterative(&self, x: f64, y: f64) -> WcsResult<(f64, f64)> {
        let distort_fn = |px: f64, py: f64| self.apply(px, py);

        newton_raphson_2d((x, y), (x, y), distort_fn, 30, 1e-10)
            .map_err(WcsError::sip_inverse_diverged)
    }
}
