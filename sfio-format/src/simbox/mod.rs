//! Simulation box: twelve input parameters and everything derived from them.

mod geometry;
mod repr;

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};

use crate::value::{Column, Record, Value};
use crate::{Error, Result};

pub use geometry::BoundsCheck;
pub use repr::{parse_values, BoxType, Conversion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKey {
    X0,
    Y0,
    Z0,
    Lx,
    Ly,
    Lz,
    Alpha,
    Beta,
    Gamma,
    AllowTilt,
    Bx,
    By,
    Bz,
}

impl InputKey {
    pub const ALL: [InputKey; 13] = [
        InputKey::X0,
        InputKey::Y0,
        InputKey::Z0,
        InputKey::Lx,
        InputKey::Ly,
        InputKey::Lz,
        InputKey::Alpha,
        InputKey::Beta,
        InputKey::Gamma,
        InputKey::AllowTilt,
        InputKey::Bx,
        InputKey::By,
        InputKey::Bz,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InputKey::X0 => "x0",
            InputKey::Y0 => "y0",
            InputKey::Z0 => "z0",
            InputKey::Lx => "lx",
            InputKey::Ly => "ly",
            InputKey::Lz => "lz",
            InputKey::Alpha => "alpha",
            InputKey::Beta => "beta",
            InputKey::Gamma => "gamma",
            InputKey::AllowTilt => "allow_tilt",
            InputKey::Bx => "bx",
            InputKey::By => "by",
            InputKey::Bz => "bz",
        }
    }

    #[inline(always)]
    fn is_angle(&self) -> bool {
        matches!(self, InputKey::Alpha | InputKey::Beta | InputKey::Gamma)
    }
}

impl FromStr for InputKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match InputKey::ALL.iter().find(|k| k.name() == s) {
            Some(k) => Ok(*k),
            None => Err(Error::NotAnInput(s.to_string())),
        }
    }
}

/// Read-only parameters derived from the inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKey {
    Xlo,
    Xhi,
    Ylo,
    Yhi,
    Zlo,
    Zhi,
    CosAlpha,
    CosBeta,
    CosGamma,
    A,
    B,
    C,
    Xy,
    Xz,
    Yz,
    V,
    U,
    UInv,
    Bn,
}

impl OutputKey {
    pub const ALL: [OutputKey; 19] = [
        OutputKey::Xlo,
        OutputKey::Xhi,
        OutputKey::Ylo,
        OutputKey::Yhi,
        OutputKey::Zlo,
        OutputKey::Zhi,
        OutputKey::CosAlpha,
        OutputKey::CosBeta,
        OutputKey::CosGamma,
        OutputKey::A,
        OutputKey::B,
        OutputKey::C,
        OutputKey::Xy,
        OutputKey::Xz,
        OutputKey::Yz,
        OutputKey::V,
        OutputKey::U,
        OutputKey::UInv,
        OutputKey::Bn,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OutputKey::Xlo => "xlo",
            OutputKey::Xhi => "xhi",
            OutputKey::Ylo => "ylo",
            OutputKey::Yhi => "yhi",
            OutputKey::Zlo => "zlo",
            OutputKey::Zhi => "zhi",
            OutputKey::CosAlpha => "cos_alpha",
            OutputKey::CosBeta => "cos_beta",
            OutputKey::CosGamma => "cos_gamma",
            OutputKey::A => "a",
            OutputKey::B => "b",
            OutputKey::C => "c",
            OutputKey::Xy => "xy",
            OutputKey::Xz => "xz",
            OutputKey::Yz => "yz",
            OutputKey::V => "v",
            OutputKey::U => "u",
            OutputKey::UInv => "u_inv",
            OutputKey::Bn => "bn",
        }
    }
}

/// Any readable box parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Input(InputKey),
    Output(OutputKey),
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(k) = s.parse::<InputKey>() {
            return Ok(Key::Input(k));
        }
        match OutputKey::ALL.iter().find(|k| k.name() == s) {
            Some(k) => Ok(Key::Output(*k)),
            None => Err(Error::UnknownKey(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoxValue {
    Float(f64),
    Bool(bool),
    Str(String),
    Matrix(Matrix3<f64>),
}

impl BoxValue {
    #[inline(always)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BoxValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BoxValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BoxValue::Str(v) => Some(v),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_matrix(&self) -> Option<&Matrix3<f64>> {
        match self {
            BoxValue::Matrix(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for BoxValue {
    fn from(v: f64) -> Self {
        BoxValue::Float(v)
    }
}

impl From<bool> for BoxValue {
    fn from(v: bool) -> Self {
        BoxValue::Bool(v)
    }
}

impl From<&str> for BoxValue {
    fn from(v: &str) -> Self {
        BoxValue::Str(v.to_string())
    }
}

impl From<String> for BoxValue {
    fn from(v: String) -> Self {
        BoxValue::Str(v)
    }
}

impl From<BoxValue> for Value {
    fn from(v: BoxValue) -> Self {
        match v {
            BoxValue::Float(x) => Value::Float(x),
            BoxValue::Bool(x) => Value::Bool(x),
            BoxValue::Str(x) => Value::Str(x),
            // Row-major, one basis vector after another.
            BoxValue::Matrix(m) => Value::Array(Column::Float(m.transpose().iter().copied().collect())),
        }
    }
}

/// The twelve independent box parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxInput {
    pub x0: f64,
    pub y0: f64,
    pub z0: f64,
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    /// Angle between b and c, in degrees.
    pub alpha: f64,
    /// Angle between a and c, in degrees.
    pub beta: f64,
    /// Angle between a and b, in degrees.
    pub gamma: f64,
    pub allow_tilt: bool,
    pub bx: String,
    pub by: String,
    pub bz: String,
}

impl Default for BoxInput {
    fn default() -> Self {
        BoxInput {
            x0: 0.0,
            y0: 0.0,
            z0: 0.0,
            lx: 1.0,
            ly: 1.0,
            lz: 1.0,
            alpha: 90.0,
            beta: 90.0,
            gamma: 90.0,
            allow_tilt: false,
            bx: "pp".into(),
            by: "pp".into(),
            bz: "pp".into(),
        }
    }
}

impl BoxInput {
    pub fn get(&self, key: InputKey) -> BoxValue {
        match key {
            InputKey::X0 => self.x0.into(),
            InputKey::Y0 => self.y0.into(),
            InputKey::Z0 => self.z0.into(),
            InputKey::Lx => self.lx.into(),
            InputKey::Ly => self.ly.into(),
            InputKey::Lz => self.lz.into(),
            InputKey::Alpha => self.alpha.into(),
            InputKey::Beta => self.beta.into(),
            InputKey::Gamma => self.gamma.into(),
            InputKey::AllowTilt => self.allow_tilt.into(),
            InputKey::Bx => self.bx.as_str().into(),
            InputKey::By => self.by.as_str().into(),
            InputKey::Bz => self.bz.as_str().into(),
        }
    }

    #[inline(always)]
    fn is_orthogonal(&self) -> bool {
        self.alpha == 90.0 && self.beta == 90.0 && self.gamma == 90.0
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        for key in InputKey::ALL.iter() {
            record.insert(key.name(), self.get(*key));
        }
        record
    }
}

/// Every input and derived parameter, computed in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxOutput {
    pub x0: f64,
    pub y0: f64,
    pub z0: f64,
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub allow_tilt: bool,
    pub bx: String,
    pub by: String,
    pub bz: String,
    pub xlo: f64,
    pub xhi: f64,
    pub ylo: f64,
    pub yhi: f64,
    pub zlo: f64,
    pub zhi: f64,
    pub cos_alpha: f64,
    pub cos_beta: f64,
    pub cos_gamma: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub xy: f64,
    pub xz: f64,
    pub yz: f64,
    /// Basis vectors as rows.
    pub v: Matrix3<f64>,
    /// Rows of `v` at unit length.
    pub u: Matrix3<f64>,
    /// Inverse of `u`; NaN when `u` is singular.
    pub u_inv: Matrix3<f64>,
    /// Unit normals of the faces opposite each basis vector.
    pub bn: Matrix3<f64>,
}

impl BoxOutput {
    pub fn derive(input: &BoxInput) -> BoxOutput {
        let (lx, ly, lz) = (input.lx, input.ly, input.lz);
        let cos = |deg: f64| repr::clean_cos(deg.to_radians().cos());
        let ca = cos(input.alpha);
        let cb = cos(input.beta);
        let cg = cos(input.gamma);

        let a = lx;
        let b = ly / (1.0 - cg * cg).sqrt();
        let c = lz / (1.0 - cb * cb - (ca - cg * cb).powi(2) / (1.0 - cg * cg)).sqrt();
        let xy = b * cg;
        let xz = c * cb;
        let yz = (b * c * ca - xy * xz) / ly;

        #[rustfmt::skip]
        let v = Matrix3::new(
            lx, 0.0, 0.0,
            xy, ly, 0.0,
            xz, yz, lz,
        );
        let u = normalize_rows(&v);
        let u_inv = u
            .try_inverse()
            .unwrap_or_else(|| Matrix3::from_element(f64::NAN));
        let row = |i: usize| -> Vector3<f64> { u.row(i).transpose() };
        let bn = Matrix3::from_rows(&[
            unit(row(1).cross(&row(2))).transpose(),
            unit(row(2).cross(&row(0))).transpose(),
            unit(row(0).cross(&row(1))).transpose(),
        ]);

        BoxOutput {
            x0: input.x0,
            y0: input.y0,
            z0: input.z0,
            lx,
            ly,
            lz,
            alpha: input.alpha,
            beta: input.beta,
            gamma: input.gamma,
            allow_tilt: input.allow_tilt || !input.is_orthogonal(),
            bx: input.bx.clone(),
            by: input.by.clone(),
            bz: input.bz.clone(),
            xlo: input.x0,
            xhi: input.x0 + lx,
            ylo: input.y0,
            yhi: input.y0 + ly,
            zlo: input.z0,
            zhi: input.z0 + lz,
            cos_alpha: ca,
            cos_beta: cb,
            cos_gamma: cg,
            a,
            b,
            c,
            xy,
            xz,
            yz,
            v,
            u,
            u_inv,
            bn,
        }
    }

    pub fn get(&self, key: OutputKey) -> BoxValue {
        match key {
            OutputKey::Xlo => self.xlo.into(),
            OutputKey::Xhi => self.xhi.into(),
            OutputKey::Ylo => self.ylo.into(),
            OutputKey::Yhi => self.yhi.into(),
            OutputKey::Zlo => self.zlo.into(),
            OutputKey::Zhi => self.zhi.into(),
            OutputKey::CosAlpha => self.cos_alpha.into(),
            OutputKey::CosBeta => self.cos_beta.into(),
            OutputKey::CosGamma => self.cos_gamma.into(),
            OutputKey::A => self.a.into(),
            OutputKey::B => self.b.into(),
            OutputKey::C => self.c.into(),
            OutputKey::Xy => self.xy.into(),
            OutputKey::Xz => self.xz.into(),
            OutputKey::Yz => self.yz.into(),
            OutputKey::V => BoxValue::Matrix(self.v),
            OutputKey::U => BoxValue::Matrix(self.u),
            OutputKey::UInv => BoxValue::Matrix(self.u_inv),
            OutputKey::Bn => BoxValue::Matrix(self.bn),
        }
    }

    /// Lower corner of the box.
    #[inline(always)]
    pub fn origin(&self) -> Vector3<f64> {
        Vector3::new(self.xlo, self.ylo, self.zlo)
    }

    /// Row `i` of `v`.
    #[inline(always)]
    pub fn basis(&self, i: usize) -> Vector3<f64> {
        self.v.row(i).transpose()
    }

    /// Inputs first, then derived parameters.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("x0", self.x0);
        record.insert("y0", self.y0);
        record.insert("z0", self.z0);
        record.insert("lx", self.lx);
        record.insert("ly", self.ly);
        record.insert("lz", self.lz);
        record.insert("alpha", self.alpha);
        record.insert("beta", self.beta);
        record.insert("gamma", self.gamma);
        record.insert("allow_tilt", self.allow_tilt);
        record.insert("bx", self.bx.as_str());
        record.insert("by", self.by.as_str());
        record.insert("bz", self.bz.as_str());
        for key in OutputKey::ALL.iter() {
            record.insert(key.name(), self.get(*key));
        }
        record
    }
}

fn unit(x: Vector3<f64>) -> Vector3<f64> {
    let n = x.norm();
    if n == 0.0 {
        x
    } else {
        x / n
    }
}

fn normalize_rows(m: &Matrix3<f64>) -> Matrix3<f64> {
    let mut out = *m;
    for mut row in out.row_iter_mut() {
        let n = row.norm();
        if n != 0.0 {
            row /= n;
        }
    }
    out
}

/// A simulation cell described by its input parameters.
///
/// Derived parameters are recomputed on every read; only the inputs are stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimBox {
    input: BoxInput,
}

impl SimBox {
    pub fn new() -> SimBox {
        SimBox::default()
    }

    /// A box with `record`'s input parameters. Other keys are ignored.
    pub fn from_record(record: &Record) -> Result<SimBox> {
        let mut b = SimBox::new();
        b.update(record)?;
        Ok(b)
    }

    /// Reads the box stored as a record under `key`, if any.
    pub(crate) fn from_nested(record: &Record, key: &str) -> Result<Option<SimBox>> {
        match record.get(key).and_then(Value::as_record) {
            Some(r) => SimBox::from_record(r).map(Some),
            None => Ok(None),
        }
    }

    #[inline(always)]
    pub fn input(&self) -> &BoxInput {
        &self.input
    }

    #[inline(always)]
    pub fn output(&self) -> BoxOutput {
        BoxOutput::derive(&self.input)
    }

    /// Any input or derived parameter by name.
    pub fn get(&self, key: &str) -> Result<BoxValue> {
        Ok(match key.parse::<Key>()? {
            Key::Input(k) => self.input.get(k),
            Key::Output(k) => self.output().get(k),
        })
    }

    /// Writes one input parameter by name. Derived and unknown names are rejected.
    pub fn set<V: Into<BoxValue>>(&mut self, key: &str, value: V) -> Result<()> {
        self.set_field(key.parse::<InputKey>()?, value.into())
    }

    pub fn set_field(&mut self, key: InputKey, value: BoxValue) -> Result<()> {
        let float = |v: &BoxValue| {
            v.as_f64().ok_or(Error::KeyType {
                key: key.name(),
                expected: "a number",
            })
        };
        let text = |v: &BoxValue| {
            v.as_str().map(str::to_string).ok_or(Error::KeyType {
                key: key.name(),
                expected: "a boundary code",
            })
        };

        let input = &mut self.input;
        match key {
            InputKey::X0 => input.x0 = float(&value)?,
            InputKey::Y0 => input.y0 = float(&value)?,
            InputKey::Z0 => input.z0 = float(&value)?,
            InputKey::Lx => input.lx = float(&value)?,
            InputKey::Ly => input.ly = float(&value)?,
            InputKey::Lz => input.lz = float(&value)?,
            InputKey::Alpha => input.alpha = float(&value)?,
            InputKey::Beta => input.beta = float(&value)?,
            InputKey::Gamma => input.gamma = float(&value)?,
            InputKey::AllowTilt => {
                let allow = value.as_bool().ok_or(Error::KeyType {
                    key: key.name(),
                    expected: "a boolean",
                })?;
                if !allow && !input.is_orthogonal() {
                    tracing::warn!("Non-orthogonal box, keeping allow_tilt = true");
                    input.allow_tilt = true;
                } else {
                    input.allow_tilt = allow;
                }
            }
            InputKey::Bx => input.bx = text(&value)?,
            InputKey::By => input.by = text(&value)?,
            InputKey::Bz => input.bz = text(&value)?,
        }

        if key.is_angle() && value.as_f64() != Some(90.0) {
            self.input.allow_tilt = true;
        }
        Ok(())
    }

    /// Applies every input parameter in `record`. Keys that are not inputs are skipped with a warning.
    pub fn update(&mut self, record: &Record) -> Result<()> {
        let mut ignored = Vec::new();
        for (k, v) in record.iter() {
            let key = match k.parse::<InputKey>() {
                Ok(key) => key,
                Err(_) => {
                    ignored.push(k);
                    continue;
                }
            };
            let value = match v {
                Value::Float(x) => BoxValue::Float(*x),
                Value::Int(x) => BoxValue::Float(*x as f64),
                Value::Bool(x) => BoxValue::Bool(*x),
                Value::Str(x) => BoxValue::Str(x.clone()),
                _ => {
                    return Err(Error::KeyType {
                        key: key.name(),
                        expected: "a scalar",
                    })
                }
            };
            self.set_field(key, value)?;
        }
        if !ignored.is_empty() {
            tracing::warn!(keys = ?ignored, "Ignored invalid Box input parameters");
        }
        Ok(())
    }

    /// Rewrites the inputs so that the derived box reproduces `values` in representation `typ`.
    ///
    /// Without `typ` the representation is inferred from the values, see [`BoxType::infer`].
    pub fn set_input(&mut self, values: &[f64], typ: Option<BoxType>) -> Result<BoxType> {
        let typ = match typ {
            Some(t) => t,
            None => BoxType::infer(values)?,
        };
        let conv = typ.to_input(values)?;

        let input = &mut self.input;
        if let Some([x0, y0, z0]) = conv.origin {
            input.x0 = x0;
            input.y0 = y0;
            input.z0 = z0;
        }
        let [lx, ly, lz] = conv.lengths;
        input.lx = lx;
        input.ly = ly;
        input.lz = lz;
        let [alpha, beta, gamma] = conv.angles;
        input.alpha = alpha;
        input.beta = beta;
        input.gamma = gamma;
        if !input.is_orthogonal() {
            input.allow_tilt = true;
        }
        Ok(typ)
    }

    /// [`SimBox::set_input`] from text, with an optional type name or alias.
    pub fn set_input_str(&mut self, text: &str, typ: Option<&str>) -> Result<BoxType> {
        let typ = typ.map(str::parse::<BoxType>).transpose()?;
        let values = parse_values(text)?;
        self.set_input(&values, typ)
    }

    /// The box in representation `typ`.
    pub fn to_repr(&self, typ: BoxType) -> Vec<f64> {
        typ.from_output(&self.output())
    }

    /// Text for one representation, or for the inputs and every representation.
    pub fn report(&self, typ: Option<BoxType>) -> String {
        let o = self.output();
        if let Some(typ) = typ {
            return typ.report(&o);
        }

        let inputs = InputKey::ALL
            .iter()
            .map(|k| format!("{} = {}", k.name(), Value::from(self.input.get(*k))))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "\n# ----- input parameters (origin, bb-length, angle, boundary) -----\n{}\n\
             \n# ----- basis vectors -----\n{}\n\
             \n# ----- lattice parameters -----\n{}\n\
             # alpha is between b c, beta a c, gamma a b\n\
             \n# ----- lammps data file -----\n{}\n\
             \n# ----- lammps dump file -----\n{}\n\
             \n# ----- dcd file -----\n{}\n",
            inputs,
            BoxType::Basis.report(&o),
            BoxType::Lattice.report(&o),
            BoxType::LmpData.report(&o),
            BoxType::LmpDump.report(&o),
            BoxType::Dcd.report(&o),
        )
    }

    /// Boundary codes as periodic flags along a, b, c.
    pub fn periodic(&self) -> [bool; 3] {
        let p = |code: &str| code.starts_with('p');
        [p(&self.input.bx), p(&self.input.by), p(&self.input.bz)]
    }
}

impl fmt::Display for SimBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report(None))
    }
}
