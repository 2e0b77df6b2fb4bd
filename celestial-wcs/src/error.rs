use thiserror::Error;

use crate::coordinate::SkyCoord;

pub type WcsResult<T> = Result<T, WcsError>;

#[derive(Debug, Error)]
pub enum WcsError {
    #[error("header has no {keyword} card")]
    MissingCard { keyword: String },

    #[error("header card {keyword} is unusable: {message}")]
    InvalidCard { keyword: String, message: String },

    #[error("CTYPE pair {ctype1}/{ctype2} is neither TAN nor TAN-SIP")]
    NotTangentPlane { ctype1: String, ctype2: String },

    /// The sky position is 90° or more from the tangent point.
    #[error("({ra_deg:.6}, {dec_deg:.6}) has no image on the tangent plane")]
    BehindTangentPlane { ra_deg: f64, dec_deg: f64 },

    #[error("reference point ({ra_deg}, {dec_deg}) is not a sky position")]
    InvalidReferencePoint { ra_deg: f64, dec_deg: f64 },

    #[error("SIP inverse did not converge: {message}")]
    SipInverseDiverged { message: String },

    #[error("CD matrix is singular (det = {determinant:e})")]
    SingularCd { determinant: f64 },
}

impl WcsError {
    pub fn missing_card(keyword: impl Into<String>) -> Self {
        Self::MissingCard {
            keyword: keyword.into(),
        }
    }

    pub fn invalid_card(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCard {
            keyword: keyword.into(),
            message: message.into(),
        }
    }

    pub fn not_tangent_plane(ctype1: &str, ctype2: &str) -> Self {
        Self::NotTangentPlane {
            ctype1: ctype1.trim().to_string(),
            ctype2: ctype2.trim().to_string(),
        }
    }

    pub fn behind_tangent_plane(sky: SkyCoord) -> Self {
        Self::BehindTangentPlane {
            ra_deg: sky.ra_deg(),
            dec_deg: sky.dec_deg(),
        }
    }

    pub fn invalid_reference_point(crval: SkyCoord) -> Self {
        Self::InvalidReferencePoint {
            ra_deg: crval.ra_deg(),
            dec_deg: crval.dec_deg(),
        }
    }

    pub fn sip_inverse_diverged(message: impl Into<String>) -> Self {
        Self::SipInverseDiverged {
            message: message.into(),
        }
    }

    pub fn singular_cd(determinant: f64) -> Self {
        Self::SingularCd { determinant }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_card_names_keyword() {
        let err = WcsError::missing_card("CD2_1");
        assert_eq!(err.to_string(), "header has no CD2_1 card");
    }

    #[test]
    fn test_invalid_sip_order_card() {
        let err = WcsError::invalid_card("AP_ORDER", "order 12 outside 0..=9");
        let text = err.to_string();
        assert!(text.starts_with("header card AP_ORDER"));
        assert!(text.ends_with("order 12 outside 0..=9"));
    }

    #[test]
    fn test_not_tangent_plane_trims_ctype_padding() {
        let err = WcsError::not_tangent_plane("RA---ZEA ", "DEC--ZEA");
        match &err {
            WcsError::NotTangentPlane { ctype1, ctype2 } => {
                assert_eq!(ctype1, "RA---ZEA");
                assert_eq!(ctype2, "DEC--ZEA");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("RA---ZEA/DEC--ZEA"));
    }

    #[test]
    fn test_behind_tangent_plane_keeps_position() {
        let err = WcsError::behind_tangent_plane(SkyCoord::new(190.0, -20.0));
        assert!(matches!(
            err,
            WcsError::BehindTangentPlane { ra_deg, dec_deg } if ra_deg == 190.0 && dec_deg == -20.0
        ));
        assert!(err.to_string().starts_with("(190.000000, -20.000000)"));
    }

    #[test]
    fn test_invalid_reference_point() {
        let err = WcsError::invalid_reference_point(SkyCoord::new(0.0, 91.0));
        assert_eq!(err.to_string(), "reference point (0, 91) is not a sky position");
    }

    #[test]
    fn test_sip_inverse_diverged() {
        let err = WcsError::sip_inverse_diverged("no convergence after 30 iterations");
        assert!(err.to_string().starts_with("SIP inverse did not converge"));
    }

    #[test]
    fn test_singular_cd_reports_determinant() {
        let err = WcsError::singular_cd(0.0);
        assert_eq!(err.to_string(), "CD matrix is singular (det = 0e0)");
    }
}
