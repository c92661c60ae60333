//! External box representations and their conversion to box input parameters.

use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;

use super::BoxOutput;
use crate::{Error, Result};

/// Cosines this close to zero are treated as exact right angles.
pub(crate) const COS_EPSILON: f64 = 1e-12;
/// Angles this close to 90 degrees are snapped to 90.
pub(crate) const ANGLE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxType {
    /// `v_a`, `v_b`, `v_c` as three rows of three components.
    Basis,
    /// `a b c alpha beta gamma`.
    Lattice,
    /// `xlo xhi ylo yhi zlo zhi xy xz yz`.
    LmpData,
    /// `xlo xhi xy ylo yhi xz zlo zhi yz`.
    LmpDump,
    /// `a cos_gamma b cos_beta cos_alpha c`.
    Dcd,
}

impl BoxType {
    pub const ALL: [BoxType; 5] = [
        BoxType::Basis,
        BoxType::Lattice,
        BoxType::LmpData,
        BoxType::LmpDump,
        BoxType::Dcd,
    ];

    #[inline(always)]
    pub fn name(&self) -> &'static str {
        match self {
            BoxType::Basis => "basis",
            BoxType::Lattice => "lattice",
            BoxType::LmpData => "lmpdata",
            BoxType::LmpDump => "lmpdump",
            BoxType::Dcd => "dcd",
        }
    }

    #[inline(always)]
    pub fn arity(&self) -> usize {
        match self {
            BoxType::Basis | BoxType::LmpData | BoxType::LmpDump => 9,
            BoxType::Lattice | BoxType::Dcd => 6,
        }
    }

    /// Picks a representation from the shape of `values`.
    ///
    /// Nine values are tried as lmpdata (ordered lo/hi pairs at 0-1, 2-3, 4-5), then
    /// lmpdump (pairs at 0-1, 3-4, 6-7), then basis. Six values are tried as dcd (cosines at
    /// 1, 3 and 4), then lattice. The first candidate that converts to a valid box wins.
    pub fn infer(values: &[f64]) -> Result<BoxType> {
        let v = values;
        let candidates: Vec<BoxType> = match v.len() {
            9 => {
                let mut c = Vec::with_capacity(3);
                if v[0] < v[1] && v[2] < v[3] && v[4] < v[5] {
                    c.push(BoxType::LmpData);
                }
                if v[0] < v[1] && v[3] < v[4] && v[6] < v[7] {
                    c.push(BoxType::LmpDump);
                }
                c.push(BoxType::Basis);
                c
            }
            6 => {
                let cosine = |x: f64| (-1.0..=1.0).contains(&x);
                let mut c = Vec::with_capacity(2);
                if cosine(v[1]) && cosine(v[3]) && cosine(v[4]) {
                    c.push(BoxType::Dcd);
                }
                c.push(BoxType::Lattice);
                c
            }
            count => {
                return Err(Error::AmbiguousBoxInput {
                    count,
                    reason: "expected 6 (lattice, dcd) or 9 (basis, lmpdata, lmpdump) values".into(),
                })
            }
        };

        let found = candidates.iter().copied().find(|typ| typ.to_input(v).is_ok());
        match found {
            Some(typ) => {
                tracing::debug!(typ = typ.name(), values = v.len(), "inferred box representation");
                Ok(typ)
            }
            None => Err(Error::AmbiguousBoxInput {
                count: v.len(),
                reason: format!(
                    "no valid box among {}",
                    candidates.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
                ),
            }),
        }
    }

    /// Box input parameters reproducing `values`.
    pub fn to_input(&self, values: &[f64]) -> Result<Conversion> {
        if values.len() != self.arity() {
            return Err(self.invalid(format!(
                "expected {} values, got {}",
                self.arity(),
                values.len()
            )));
        }
        if values.iter().any(|x| !x.is_finite()) {
            return Err(self.invalid("values must be finite"));
        }

        let v = values;
        match self {
            BoxType::Dcd => self.from_cosines(v[0], v[1], v[2], v[3], v[4], v[5]),
            BoxType::Lattice => {
                let cos = |deg: f64| clean_cos(deg.to_radians().cos());
                self.from_cosines(v[0], cos(v[5]), v[1], cos(v[4]), cos(v[3]), v[2])
            }
            BoxType::Basis => self.from_basis(
                Vector3::new(v[0], v[1], v[2]),
                Vector3::new(v[3], v[4], v[5]),
                Vector3::new(v[6], v[7], v[8]),
            ),
            BoxType::LmpData => {
                let (xlo, xhi, ylo, yhi, zlo, zhi) = (v[0], v[1], v[2], v[3], v[4], v[5]);
                let (xy, xz, yz) = (v[6], v[7], v[8]);
                let mut conv = self.from_basis(
                    Vector3::new(xhi - xlo, 0.0, 0.0),
                    Vector3::new(xy, yhi - ylo, 0.0),
                    Vector3::new(xz, yz, zhi - zlo),
                )?;
                conv.origin = Some([xlo, ylo, zlo]);
                Ok(conv)
            }
            BoxType::LmpDump => {
                let reordered: Vec<f64> = [0, 1, 3, 4, 6, 7, 2, 5, 8].iter().map(|&i| v[i]).collect();
                BoxType::LmpData.to_input(&reordered)
            }
        }
    }

    /// The numeric representation of a derived box.
    pub fn from_output(&self, o: &BoxOutput) -> Vec<f64> {
        match self {
            BoxType::Basis => o.v.transpose().iter().copied().collect(),
            BoxType::Lattice => vec![o.a, o.b, o.c, o.alpha, o.beta, o.gamma],
            BoxType::LmpData => vec![o.xlo, o.xhi, o.ylo, o.yhi, o.zlo, o.zhi, o.xy, o.xz, o.yz],
            BoxType::LmpDump => vec![o.xlo, o.xhi, o.xy, o.ylo, o.yhi, o.xz, o.zlo, o.zhi, o.yz],
            BoxType::Dcd => vec![o.a, o.cos_gamma, o.b, o.cos_beta, o.cos_alpha, o.c],
        }
    }

    /// Text block for this representation.
    pub fn report(&self, o: &BoxOutput) -> String {
        let v = &o.v;
        match self {
            BoxType::Basis => (0..3)
                .map(|r| format!(" {:15.9}  {:15.9}  {:15.9}", v[(r, 0)], v[(r, 1)], v[(r, 2)]))
                .collect::<Vec<_>>()
                .join("\n"),
            BoxType::Lattice => format!(
                "{} {} {} {} {} {}  a b c alpha beta gamma",
                fmt_g(o.a),
                fmt_g(o.b),
                fmt_g(o.c),
                fmt_g(o.alpha),
                fmt_g(o.beta),
                fmt_g(o.gamma)
            ),
            BoxType::LmpData => format!(
                " {:.7} {:.7}  xlo xhi\n {:.7} {:.7}  ylo yhi\n {:.7} {:.7}  zlo zhi\n {:.7} {:.7} {:.7}  xy xz yz",
                o.xlo, o.xhi, o.ylo, o.yhi, o.zlo, o.zhi, o.xy, o.xz, o.yz
            ),
            BoxType::LmpDump => format!(
                "ITEM: BOX BOUNDS xy xz yz {} {} {}\n{:.7} {:.7} {:.7}  xlo xhi xy\n{:.7} {:.7} {:.7}  ylo yhi xz\n{:.7} {:.7} {:.7}  zlo zhi yz",
                o.bx, o.by, o.bz, o.xlo, o.xhi, o.xy, o.ylo, o.yhi, o.xz, o.zlo, o.zhi, o.yz
            ),
            BoxType::Dcd => format!(
                "{} {} {} {} {} {}  a cos_gamma b cos_beta cos_alpha c",
                fmt_g(o.a),
                fmt_g(o.cos_gamma),
                fmt_g(o.b),
                fmt_g(o.cos_beta),
                fmt_g(o.cos_alpha),
                fmt_g(o.c)
            ),
        }
    }

    fn from_basis(&self, va: Vector3<f64>, vb: Vector3<f64>, vc: Vector3<f64>) -> Result<Conversion> {
        let (a, b, c) = (va.norm(), vb.norm(), vc.norm());
        if a == 0.0 || b == 0.0 || c == 0.0 {
            return Err(self.invalid("basis vectors must be non-zero"));
        }
        let ca = clean_cos(vb.dot(&vc) / (b * c));
        let cb = clean_cos(va.dot(&vc) / (a * c));
        let cg = clean_cos(va.dot(&vb) / (a * b));
        self.from_cosines(a, cg, b, cb, ca, c)
    }

    fn from_cosines(&self, a: f64, cg: f64, b: f64, cb: f64, ca: f64, c: f64) -> Result<Conversion> {
        if a <= 0.0 || b <= 0.0 || c <= 0.0 {
            return Err(self.invalid(format!("edge lengths must be positive, got {} {} {}", a, b, c)));
        }
        let in_range = |x: f64| (-1.0..=1.0).contains(&x);
        if !(in_range(ca) && in_range(cb) && in_range(cg)) {
            return Err(self.invalid("cosines must lie in [-1, 1]"));
        }

        let sin2_gamma = 1.0 - cg * cg;
        if sin2_gamma <= 0.0 {
            return Err(self.invalid("a and b are parallel"));
        }
        let radicand = 1.0 - cb * cb - (ca - cg * cb).powi(2) / sin2_gamma;
        if radicand <= 0.0 {
            return Err(self.invalid("angles do not form a cell with positive volume"));
        }

        let degrees = |cos: f64| snap_angle(cos.acos().to_degrees());
        Ok(Conversion {
            origin: None,
            lengths: [a, b * sin2_gamma.sqrt(), c * radicand.sqrt()],
            angles: [degrees(ca), degrees(cb), degrees(cg)],
        })
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidBox {
            typ: self.name(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BoxType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basis" | "poscar" | "vasp" => Ok(BoxType::Basis),
            "lattice" | "vmd" => Ok(BoxType::Lattice),
            "lmpdata" => Ok(BoxType::LmpData),
            "lmpdump" => Ok(BoxType::LmpDump),
            "dcd" => Ok(BoxType::Dcd),
            _ => Err(Error::UnknownBoxType(s.to_string())),
        }
    }
}

/// Input parameters recovered from one representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Only representations that carry bounds set the origin.
    pub origin: Option<[f64; 3]>,
    pub lengths: [f64; 3],
    /// `alpha`, `beta`, `gamma` in degrees.
    pub angles: [f64; 3],
}

#[inline(always)]
pub(crate) fn clean_cos(x: f64) -> f64 {
    if x.abs() < COS_EPSILON {
        0.0
    } else {
        x.clamp(-1.0, 1.0)
    }
}

#[inline(always)]
pub(crate) fn snap_angle(deg: f64) -> f64 {
    if (deg - 90.0).abs() < ANGLE_EPSILON {
        90.0
    } else {
        deg
    }
}

/// Splits box text on commas and whitespace.
pub fn parse_values(text: &str) -> Result<Vec<f64>> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<f64>().map_err(|_| Error::InvalidNumber(t.to_string())))
        .collect()
}

/// `%g`-style formatting: six significant digits, trailing zeros trimmed.
pub(crate) fn fmt_g(x: f64) -> String {
    if x == 0.0 {
        return "0".into();
    }
    if !x.is_finite() {
        return format!("{}", x);
    }
    let exp = x.abs().log10().floor() as i32;
    if exp < -4 || exp >= 6 {
        let s = format!("{:.5e}", x);
        match s.split_once('e') {
            Some((mantissa, e)) => {
                let e: i32 = e.parse().unwrap_or(0);
                format!("{}e{}{:02}", trim_zeros(mantissa), if e < 0 { '-' } else { '+' }, e.abs())
            }
            None => s,
        }
    } else {
        let decimals = (5 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, x)).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_names_and_aliases() {
        assert_eq!("VMD".parse::<BoxType>().unwrap(), BoxType::Lattice);
        assert_eq!("poscar".parse::<BoxType>().unwrap(), BoxType::Basis);
        assert_eq!("vasp".parse::<BoxType>().unwrap(), BoxType::Basis);
        let err = "pdb".parse::<BoxType>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
    }

    #[test]
    fn infers_from_shape() {
        let lattice = [120.0, 150.0, 130.0, 90.0, 90.0, 90.0];
        assert_eq!(BoxType::infer(&lattice).unwrap(), BoxType::Lattice);
        let dcd = [120.0, 0.0, 150.0, 0.0, 0.0, 130.0];
        assert_eq!(BoxType::infer(&dcd).unwrap(), BoxType::Dcd);
        let lmpdata = [0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 1.0, 0.0, 0.0];
        assert_eq!(BoxType::infer(&lmpdata).unwrap(), BoxType::LmpData);
        let lmpdump = [0.0, 10.0, 1.0, 0.0, 10.0, 0.0, 0.0, 10.0, 0.0];
        assert_eq!(BoxType::infer(&lmpdump).unwrap(), BoxType::LmpDump);
        let basis = [10.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0];
        assert_eq!(BoxType::infer(&basis).unwrap(), BoxType::Basis);
    }

    #[test]
    fn rejects_unusable_shapes() {
        let err = BoxType::infer(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AmbiguousFormat);
        let err = BoxType::infer(&[0.0; 9]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AmbiguousFormat);
    }

    #[test]
    fn formats_like_printf_g() {
        assert_eq!(fmt_g(120.0), "120");
        assert_eq!(fmt_g(0.5), "0.5");
        assert_eq!(fmt_g(1.0 / 3.0), "0.333333");
        assert_eq!(fmt_g(1234567.0), "1.23457e+06");
        assert_eq!(fmt_g(0.00001), "1e-05");
        assert_eq!(fmt_g(-2.5), "-2.5");
    }

    #[test]
    fn splits_box_text() {
        assert_eq!(parse_values("1, 2 3\n4").unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(parse_values("1 x"), Err(Error::InvalidNumber(_))));
    }
}
