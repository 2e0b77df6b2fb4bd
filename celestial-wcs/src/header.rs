use std::collections::HashMap;

use crate::coordinate::SkyCoord;
use crate::distortion::{SipDistortion, SipMatrix};
use crate::error::{WcsError, WcsResult};
use crate::tan::{Frame, TanWcs};

pub trait KeywordProvider {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_float(&self, key: &str) -> Option<f64>;
    fn get_int(&self, key: &str) -> Option<i64>;

    fn require_float(&self, key: &str) -> WcsResult<f64> {
        self.get_float(key)
            .ok_or_else(|| WcsError::missing_card(key))
    }

    fn require_string(&self, key: &str) -> WcsResult<String> {
        self.get_string(key)
            .ok_or_else(|| WcsError::missing_card(key))
    }
}

/// In-memory FITS-style keyword set.
#[derive(Debug, Clone, Default)]
pub struct KeywordMap {
    strings: HashMap<String, String>,
    floats: HashMap<String, f64>,
    ints: HashMap<String, i64>,
}

impl KeywordMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.strings.insert(key.into(), value.into());
        self
    }

    pub fn set_float(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.floats.insert(key.into(), value);
        self
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.ints.insert(key.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.strings.len() + self.floats.len() + self.ints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeywordProvider for KeywordMap {
    fn get_string(&self, key: &str) -> Option<String> {
        self.strings.get(key).cloned()
    }

    // Integer cards are accepted where a float is expected.
    fn get_float(&self, key: &str) -> Option<f64> {
        self.floats
            .get(key)
            .copied()
            .or_else(|| self.ints.get(key).map(|&v| v as f64))
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.ints.get(key).copied()
    }
}

const CTYPE_TAN: [&str; 2] = ["RA---TAN", "DEC--TAN"];
const CTYPE_TAN_SIP: [&str; 2] = ["RA---TAN-SIP", "DEC--TAN-SIP"];

impl TanWcs {
    pub fn to_header(&self) -> KeywordMap {
        let mut map = KeywordMap::new();
        let ctype = if self.sip().is_some() {
            CTYPE_TAN_SIP
        } else {
            CTYPE_TAN
        };
        let crpix = self.crpix();
        let cd = self.cd_matrix();

        map.set_string("CTYPE1", ctype[0])
            .set_string("CTYPE2", ctype[1])
            .set_float("CRVAL1", self.crval().ra_deg())
            .set_float("CRVAL2", self.crval().dec_deg())
            .set_float("CRPIX1", crpix[0])
            .set_float("CRPIX2", crpix[1])
            .set_float("CD1_1", cd[0][0])
            .set_float("CD1_2", cd[0][1])
            .set_float("CD2_1", cd[1][0])
            .set_float("CD2_2", cd[1][1])
            .set_float("EQUINOX", self.frame().equinox)
            .set_string("RADESYS", self.frame().ra_dec_sys.clone());

        if let Some((width, height)) = self.image_size() {
            map.set_float("IMAGEW", width).set_float("IMAGEH", height);
        }

        if let Some(sip) = self.sip() {
            write_matrix(&mut map, "A", sip.a());
            write_matrix(&mut map, "B", sip.b());
            if let (Some(ap), Some(bp)) = (sip.ap(), sip.bp()) {
                write_matrix(&mut map, "AP", ap);
                write_matrix(&mut map, "BP", bp);
            }
        }
        map
    }

    pub fn from_header<K: KeywordProvider>(header: &K) -> WcsResult<Self> {
        let ctype1 = header.require_string("CTYPE1")?;
        let ctype2 = header.require_string("CTYPE2")?;
        let has_sip = match (ctype1.trim(), ctype2.trim()) {
            (a, b) if a == CTYPE_TAN[0] && b == CTYPE_TAN[1] => false,
            (a, b) if a == CTYPE_TAN_SIP[0] && b == CTYPE_TAN_SIP[1] => true,
            _ => return Err(WcsError::not_tangent_plane(&ctype1, &ctype2)),
        };

        let crval = SkyCoord::new(
            header.require_float("CRVAL1")?,
            header.require_float("CRVAL2")?,
        );
        let crpix = [
            header.require_float("CRPIX1")?,
            header.require_float("CRPIX2")?,
        ];
        let cd = [
            [header.require_float("CD1_1")?, header.require_float("CD1_2")?],
            [header.require_float("CD2_1")?, header.require_float("CD2_2")?],
        ];
        let frame = Frame::new(
            header.get_float("EQUINOX").unwrap_or(2000.0),
            header
                .get_string("RADESYS")
                .unwrap_or_else(|| "FK5".to_string()),
        );

        let mut wcs = TanWcs::new(crval, crpix, cd, frame)?;

        if let (Some(w), Some(h)) = (header.get_float("IMAGEW"), header.get_float("IMAGEH")) {
            wcs = wcs.with_image_size(w, h);
        }

        if has_sip {
            let a = read_matrix(header, "A")?;
            let b = read_matrix(header, "B")?;
            let inverse = match (header.get_int("AP_ORDER"), header.get_int("BP_ORDER")) {
                (Some(_), Some(_)) => Some((read_matrix(header, "AP")?, read_matrix(header, "BP")?)),
                _ => None,
            };
            wcs = wcs.with_sip(SipDistortion::from_matrices(crpix, a, b, inverse));
        }
        Ok(wcs)
    }
}

fn write_matrix(map: &mut KeywordMap, prefix: &str, matrix: &SipMatrix) {
    map.set_int(format!("{prefix}_ORDER"), i64::from(matrix.order()));
    for p in 0..=matrix.order() {
        for q in 0..=(matrix.order() - p) {
            let value = matrix.get(p, q);
            if value != 0.0 {
                map.set_float(format!("{prefix}_{p}_{q}"), value);
            }
        }
    }
}

fn read_matrix<K: KeywordProvider>(header: &K, prefix: &str) -> WcsResult<SipMatrix> {
    let key = format!("{prefix}_ORDER");
    let order = header
        .get_int(&key)
        .ok_or_else(|| WcsError::missing_card(key.clone()))?;
    let order = u32::try_from(order)
        .ok()
        .filter(|&o| o <= 9)
        .ok_or_else(|| WcsError::invalid_card(key, format!("order {order} outside 0..=9")))?;

    let mut matrix = SipMatrix::zeros(order);
    for p in 0..=order {
        for q in 0..=(order - p) {
            if let Some(value) = header.get_float(&format!("{prefix}_{p}_{q}")) {
                matrix.set(p, q, value);
            }
        }
    }
    Ok(matrix)
}
