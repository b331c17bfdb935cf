#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Element kind of a column. Numeric kinds map one-to-one onto a fixed-width
/// native buffer; `Utf8` is the unbounded string kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    F32,
    F64,
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DTypeFamily {
    Signed,
    Unsigned,
    Float,
    Utf8,
}

/// The configured default float width used whenever a result has to fall back
/// to floating point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatPrecision {
    F32,
    #[default]
    F64,
}

impl FloatPrecision {
    #[must_use]
    pub fn dtype(self) -> DType {
        match self {
            Self::F32 => DType::F32,
            Self::F64 => DType::F64,
        }
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.dtype().bits()
    }
}

impl DType {
    pub const NUMERIC: [Self; 8] = [
        Self::I8,
        Self::I16,
        Self::I32,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::F32,
        Self::F64,
    ];

    #[must_use]
    pub fn family(self) -> DTypeFamily {
        match self {
            Self::I8 | Self::I16 | Self::I32 => DTypeFamily::Signed,
            Self::U8 | Self::U16 | Self::U32 => DTypeFamily::Unsigned,
            Self::F32 | Self::F64 => DTypeFamily::Float,
            Self::Utf8 => DTypeFamily::Utf8,
        }
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::I8 | Self::U8 | Self::Utf8 => 8,
            Self::I16 | Self::U16 => 16,
            Self::I32 | Self::U32 | Self::F32 => 32,
            Self::F64 => 64,
        }
    }

    /// Width of one buffer element in bytes. Strings report a unit width.
    #[must_use]
    pub fn byte_width(self) -> usize {
        (self.bits() / 8) as usize
    }

    #[must_use]
    pub fn is_signed(self) -> bool {
        matches!(self.family(), DTypeFamily::Signed)
    }

    #[must_use]
    pub fn is_unsigned(self) -> bool {
        matches!(self.family(), DTypeFamily::Unsigned)
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self.family(), DTypeFamily::Float)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        !self.is_utf8()
    }

    #[must_use]
    pub fn is_utf8(self) -> bool {
        matches!(self, Self::Utf8)
    }

    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Utf8 => "s",
        }
    }

    /// Smallest value representable by the kind (`-inf` for strings).
    #[must_use]
    pub fn min_value(self) -> f64 {
        match self {
            Self::I8 => f64::from(i8::MIN),
            Self::I16 => f64::from(i16::MIN),
            Self::I32 => f64::from(i32::MIN),
            Self::U8 | Self::U16 | Self::U32 => 0.0,
            Self::F32 => f64::from(f32::MIN),
            Self::F64 => f64::MIN,
            Self::Utf8 => f64::NEG_INFINITY,
        }
    }

    /// Largest value representable by the kind (`inf` for strings).
    #[must_use]
    pub fn max_value(self) -> f64 {
        match self {
            Self::I8 => f64::from(i8::MAX),
            Self::I16 => f64::from(i16::MAX),
            Self::I32 => f64::from(i32::MAX),
            Self::U8 => f64::from(u8::MAX),
            Self::U16 => f64::from(u16::MAX),
            Self::U32 => f64::from(u32::MAX),
            Self::F32 => f64::from(f32::MAX),
            Self::F64 => f64::MAX,
            Self::Utf8 => f64::INFINITY,
        }
    }

    /// Whether `value` survives a round trip through this kind unchanged.
    #[must_use]
    pub fn can_hold(self, value: f64) -> bool {
        match self.family() {
            DTypeFamily::Signed | DTypeFamily::Unsigned => {
                value.is_finite()
                    && value.fract() == 0.0
                    && value >= self.min_value()
                    && value <= self.max_value()
            }
            DTypeFamily::Float => {
                value.is_nan() || matches!(self, Self::F64) || f64::from(value as f32) == value
            }
            DTypeFamily::Utf8 => false,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for DType {
    type Err = TypeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "i8" => Ok(Self::I8),
            "i16" => Ok(Self::I16),
            "i32" => Ok(Self::I32),
            "u8" => Ok(Self::U8),
            "u16" => Ok(Self::U16),
            "u32" => Ok(Self::U32),
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            "s" | "str" | "string" | "utf8" => Ok(Self::Utf8),
            _ => Err(TypeError::UnrecognisedDtype {
                token: token.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    #[must_use]
    pub fn apply_f64(self, left: f64, right: f64) -> f64 {
        match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div => left / right,
        }
    }

    /// Two's-complement arithmetic on widened integers. The caller truncates
    /// the result to the output width.
    #[must_use]
    pub fn apply_i64(self, left: i64, right: i64) -> i64 {
        match self {
            Self::Add => left.wrapping_add(right),
            Self::Sub => left.wrapping_sub(right),
            Self::Mul => left.wrapping_mul(right),
            Self::Div => left.checked_div(right).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Scalar {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64(_) | Self::Float64(_))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view of the scalar. Nulls read as NaN; strings are rejected.
    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null => Ok(f64::NAN),
            Self::Utf8(v) => Err(TypeError::NonNumericValue { value: v.clone() }),
        }
    }

    /// Numeric coercion used by dtype-hinted ingestion: strings are parsed
    /// with the numeric-literal grammar and anything unparsable becomes NaN.
    #[must_use]
    pub fn coerce_f64(&self) -> f64 {
        match self {
            Self::Utf8(v) => parse_numeric(v).unwrap_or(f64::NAN),
            other => other.to_f64().unwrap_or(f64::NAN),
        }
    }

    /// Build the canonical scalar for a numeric value stored at `dtype`.
    #[must_use]
    pub fn from_f64_for(value: f64, dtype: DType) -> Self {
        if dtype.is_integer() && value.is_finite() {
            Self::Int64(value as i64)
        } else {
            Self::Float64(value)
        }
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Self::Int64(a), Self::Float64(b)) | (Self::Float64(b), Self::Int64(a)) => {
                (*a as f64) == *b
            }
            _ => self == other,
        }
    }

    /// Total order used for sorting mixed scalars: numbers (NaN last among
    /// them), then strings, then nulls.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        fn rank(value: &Scalar) -> u8 {
            match value {
                Scalar::Int64(_) | Scalar::Float64(_) => 0,
                Scalar::Utf8(_) => 1,
                Scalar::Null => 2,
            }
        }
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.coerce_f64(), b.coerce_f64());
                match (x.is_nan(), y.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => x.total_cmp(&y),
                }
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
        }
    }
}

macro_rules! scalar_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Scalar {
            fn from(value: $ty) -> Self {
                Self::Int64(i64::from(value))
            }
        })*
    };
}

scalar_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Scalar {
    fn from(value: f32) -> Self {
        Self::Float64(f64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("unrecognised dtype {token:?}")]
    UnrecognisedDtype { token: String },
    #[error("dtype coercion from {left} to {right} has no compatible common type")]
    IncompatibleDtypes { left: DType, right: DType },
    #[error("value {value:?} is not numeric")]
    NonNumericValue { value: String },
}

// ── Inference ──────────────────────────────────────────────────────────

/// Narrowest dtype able to represent every value in `values`.
///
/// NaN is excluded from the range but forces a floating kind. Non-integral
/// data picks `f32` whenever every non-zero magnitude sits inside the normal
/// f32 range, `f64` otherwise. Empty or all-NaN input selects the `precision`
/// default.
#[must_use]
pub fn infer_dtype(values: &[f64], precision: FloatPrecision) -> DType {
    let mut saw_nan = false;
    let mut fractional = false;
    let mut seen = 0_usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut min_mag = f64::INFINITY;
    let mut max_mag = 0.0_f64;

    for &value in values {
        if value.is_nan() {
            saw_nan = true;
            continue;
        }
        seen += 1;
        if !value.is_finite() || value.fract() != 0.0 {
            fractional = true;
        }
        min = min.min(value);
        max = max.max(value);
        let mag = value.abs();
        if mag != 0.0 {
            min_mag = min_mag.min(mag);
        }
        max_mag = max_mag.max(mag);
    }

    if seen == 0 {
        return precision.dtype();
    }
    if fractional || saw_nan {
        return narrowest_float(min_mag, max_mag);
    }
    narrowest_integer(min, max).unwrap_or(DType::F64)
}

/// Smallest integer kind covering `[min, max]`, signed when `min` is negative.
#[must_use]
pub fn narrowest_integer(min: f64, max: f64) -> Option<DType> {
    let candidates = if min < 0.0 {
        [DType::I8, DType::I16, DType::I32]
    } else {
        [DType::U8, DType::U16, DType::U32]
    };
    candidates
        .into_iter()
        .find(|dtype| min >= dtype.min_value() && max <= dtype.max_value())
}

/// Smallest normal f32 magnitude; anything below it infers `f64`.
pub const F32_MIN_NORMAL: f64 = f32::MIN_POSITIVE as f64;

fn narrowest_float(min_mag: f64, max_mag: f64) -> DType {
    let fits_f32 =
        max_mag <= f64::from(f32::MAX) && (min_mag.is_infinite() || min_mag >= F32_MIN_NORMAL);
    if fits_f32 {
        DType::F32
    } else {
        DType::F64
    }
}

// ── Promotion ──────────────────────────────────────────────────────────

fn wider(left: DType, right: DType) -> DType {
    if left.bits() >= right.bits() { left } else { right }
}

fn float_holding(float: DType, other: DType) -> DType {
    if matches!(float, DType::F64) || other.bits() <= 16 {
        float
    } else {
        DType::F64
    }
}

/// Family-width unification shared by arithmetic and concatenation.
///
/// Same family keeps the wider kind; signed with unsigned lands on `i32` while
/// the unsigned side is at most 16 bits wide and on `f64` otherwise; an integer
/// meeting a float keeps the float when it holds the integer exactly.
pub fn promote_dtypes(left: DType, right: DType) -> Result<DType, TypeError> {
    use DTypeFamily::{Float, Utf8};

    if left == right {
        return Ok(left);
    }
    let out = match (left.family(), right.family()) {
        (Utf8, _) | (_, Utf8) => return Err(TypeError::IncompatibleDtypes { left, right }),
        (a, b) if a == b => wider(left, right),
        (Float, _) => float_holding(left, right),
        (_, Float) => float_holding(right, left),
        _ => {
            let unsigned = if left.is_unsigned() { left } else { right };
            if unsigned.bits() <= 16 {
                DType::I32
            } else {
                DType::F64
            }
        }
    };
    Ok(out)
}

/// Like [`promote_dtypes`] but never fails: any string side yields `Utf8`.
#[must_use]
pub fn unify_dtypes(left: DType, right: DType) -> DType {
    promote_dtypes(left, right).unwrap_or(DType::Utf8)
}

/// Dtype able to hold the negation of every value of `dtype`.
#[must_use]
pub fn negated_dtype(dtype: DType) -> DType {
    match dtype {
        DType::U8 | DType::U16 => DType::I32,
        DType::U32 => DType::F64,
        other => other,
    }
}

/// Result dtype of `left op right` for two columns.
pub fn arithmetic_dtype(
    left: DType,
    right: DType,
    op: ArithmeticOp,
    precision: FloatPrecision,
) -> Result<DType, TypeError> {
    if !left.is_numeric() || !right.is_numeric() {
        return Err(TypeError::IncompatibleDtypes { left, right });
    }
    match op {
        ArithmeticOp::Add | ArithmeticOp::Mul => promote_dtypes(left, right),
        ArithmeticOp::Sub => promote_dtypes(left, negated_dtype(right)),
        ArithmeticOp::Div => {
            if left.is_float() && right.is_float() {
                Ok(wider(left, right))
            } else {
                Ok(precision.dtype())
            }
        }
    }
}

/// Result dtype of `column op scalar`.
pub fn scalar_arithmetic_dtype(
    left: DType,
    scalar: f64,
    op: ArithmeticOp,
    precision: FloatPrecision,
) -> Result<DType, TypeError> {
    if !left.is_numeric() {
        return Err(TypeError::IncompatibleDtypes {
            left,
            right: DType::F64,
        });
    }
    if left.is_float() {
        return Ok(left);
    }
    let operand = match op {
        ArithmeticOp::Div => return Ok(precision.dtype()),
        ArithmeticOp::Sub => -scalar,
        ArithmeticOp::Add | ArithmeticOp::Mul => scalar,
    };
    if !operand.is_finite() || operand.fract() != 0.0 {
        return Ok(precision.dtype());
    }
    promote_dtypes(left, infer_dtype(&[operand], precision))
}

// ── Numeric literals ───────────────────────────────────────────────────

/// Whether `text` matches the numeric-literal grammar: an optional sign,
/// digits with an optional fraction (or a bare fraction), an optional
/// exponent, or one of `NaN` / `Infinity` / `inf`.
#[must_use]
pub fn looks_numeric(text: &str) -> bool {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix(['+', '-'])
        .unwrap_or(trimmed);
    if matches!(body, "NaN" | "nan" | "Infinity" | "inf" | "infinity") {
        return true;
    }

    let bytes = body.as_bytes();
    let mut pos = 0;
    let int_digits = count_digits(&bytes[pos..]);
    pos += int_digits;
    let mut frac_digits = 0;
    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        frac_digits = count_digits(&bytes[pos..]);
        pos += frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return false;
    }
    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        pos += 1;
        if matches!(bytes.get(pos), Some(b'+' | b'-')) {
            pos += 1;
        }
        let exp_digits = count_digits(&bytes[pos..]);
        if exp_digits == 0 {
            return false;
        }
        pos += exp_digits;
    }
    pos == bytes.len()
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Parse a numeric literal accepted by [`looks_numeric`].
#[must_use]
pub fn parse_numeric(text: &str) -> Option<f64> {
    if !looks_numeric(text) {
        return None;
    }
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let magnitude = match body {
        "NaN" | "nan" => f64::NAN,
        "Infinity" | "inf" | "infinity" => f64::INFINITY,
        digits => digits.parse::<f64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::{
        ArithmeticOp, DType, F32_MIN_NORMAL, FloatPrecision, Scalar, TypeError, arithmetic_dtype,
        infer_dtype, looks_numeric, parse_numeric, promote_dtypes, scalar_arithmetic_dtype,
        unify_dtypes,
    };

    fn range(lo: i64, hi: i64) -> Vec<f64> {
        (lo..=hi).map(|v| v as f64).collect()
    }

    #[test]
    fn inference_is_boundary_exact() {
        let p = FloatPrecision::F64;
        assert_eq!(infer_dtype(&range(0, 255), p), DType::U8);
        assert_eq!(infer_dtype(&range(0, 256), p), DType::U16);
        assert_eq!(infer_dtype(&range(-128, 127), p), DType::I8);
        assert_eq!(infer_dtype(&[-129.0], p), DType::I16);
        assert_eq!(infer_dtype(&[65_535.0], p), DType::U16);
        assert_eq!(infer_dtype(&[65_536.0], p), DType::U32);
        assert_eq!(infer_dtype(&[-32_768.0, 32_767.0], p), DType::I16);
        assert_eq!(infer_dtype(&[-32_769.0], p), DType::I32);
        assert_eq!(infer_dtype(&[4_294_967_295.0], p), DType::U32);
        assert_eq!(infer_dtype(&[4_294_967_296.0], p), DType::F64);
        assert_eq!(infer_dtype(&[-2_147_483_649.0], p), DType::F64);
    }

    #[test]
    fn fractional_data_picks_f32_when_it_fits() {
        for p in [FloatPrecision::F32, FloatPrecision::F64] {
            assert_eq!(infer_dtype(&[0.5, 1.5], p), DType::F32);
            assert_eq!(infer_dtype(&[1e39, 0.5], p), DType::F64);
            assert_eq!(infer_dtype(&[1e-39, 0.5], p), DType::F64);
            assert_eq!(infer_dtype(&[-0.5, 0.0], p), DType::F32);
        }
    }

    #[test]
    fn f32_boundaries_are_stable() {
        let p = FloatPrecision::F64;
        let max = f64::from(f32::MAX);
        assert_eq!(infer_dtype(&[0.5, max], p), DType::F32);
        assert_eq!(infer_dtype(&[0.5, -max], p), DType::F32);
        assert_eq!(infer_dtype(&[0.5, max * 2.0], p), DType::F64);
        assert_eq!(infer_dtype(&[0.5, F32_MIN_NORMAL], p), DType::F32);
        assert_eq!(infer_dtype(&[0.5, -F32_MIN_NORMAL], p), DType::F32);
        assert_eq!(infer_dtype(&[0.5, F32_MIN_NORMAL / 2.0], p), DType::F64);
        assert_eq!(infer_dtype(&[0.5, f64::INFINITY], p), DType::F64);
    }

    #[test]
    fn nan_forces_float_but_not_range() {
        assert_eq!(
            infer_dtype(&[1.0, f64::NAN, 3.0], FloatPrecision::F32),
            DType::F32
        );
        assert_eq!(
            infer_dtype(&[1.0, f64::NAN, 3.0], FloatPrecision::F64),
            DType::F32
        );
        assert_eq!(infer_dtype(&[f64::NAN], FloatPrecision::F32), DType::F32);
        assert_eq!(infer_dtype(&[f64::NAN], FloatPrecision::F64), DType::F64);
        assert_eq!(infer_dtype(&[], FloatPrecision::F64), DType::F64);
    }

    #[test]
    fn inference_is_idempotent_on_its_own_output() {
        let values = range(-300, 300);
        let first = infer_dtype(&values, FloatPrecision::F64);
        let stored: Vec<f64> = values.iter().map(|v| f64::from(*v as i16)).collect();
        assert_eq!(infer_dtype(&stored, FloatPrecision::F64), first);
    }

    #[test]
    fn dtype_tokens_round_trip() {
        for dtype in DType::NUMERIC {
            assert_eq!(dtype.token().parse::<DType>().expect("token"), dtype);
        }
        assert_eq!("s".parse::<DType>().expect("string"), DType::Utf8);
        let err = "int128".parse::<DType>().expect_err("unknown token");
        assert_eq!(
            err,
            TypeError::UnrecognisedDtype {
                token: "int128".to_owned()
            }
        );
    }

    #[test]
    fn promotion_table() {
        assert_eq!(promote_dtypes(DType::U8, DType::U16).expect("u"), DType::U16);
        assert_eq!(promote_dtypes(DType::I32, DType::I8).expect("i"), DType::I32);
        assert_eq!(promote_dtypes(DType::U8, DType::I8).expect("mix"), DType::I32);
        assert_eq!(promote_dtypes(DType::U16, DType::I32).expect("mix"), DType::I32);
        assert_eq!(promote_dtypes(DType::U32, DType::I8).expect("mix"), DType::F64);
        assert_eq!(promote_dtypes(DType::F32, DType::U16).expect("f"), DType::F32);
        assert_eq!(promote_dtypes(DType::F32, DType::I32).expect("f"), DType::F64);
        assert_eq!(promote_dtypes(DType::F32, DType::F64).expect("f"), DType::F64);
        assert!(promote_dtypes(DType::Utf8, DType::U8).is_err());
        assert_eq!(unify_dtypes(DType::Utf8, DType::U8), DType::Utf8);
    }

    #[test]
    fn promotion_is_commutative_for_every_pair() {
        for left in DType::NUMERIC {
            for right in DType::NUMERIC {
                for op in [ArithmeticOp::Add, ArithmeticOp::Mul] {
                    let a = arithmetic_dtype(left, right, op, FloatPrecision::F64).expect("a");
                    let b = arithmetic_dtype(right, left, op, FloatPrecision::F64).expect("b");
                    assert_eq!(a, b, "{left} {op:?} {right}");
                }
            }
        }
    }

    #[test]
    fn promotion_never_narrows_an_input() {
        for left in DType::NUMERIC {
            for right in DType::NUMERIC {
                let out = promote_dtypes(left, right).expect("numeric pair");
                for input in [left, right] {
                    assert!(out.can_hold(input.min_value()) || out.is_float());
                    assert!(out.can_hold(input.max_value()) || out.is_float());
                }
            }
        }
    }

    #[test]
    fn subtraction_of_unsigned_goes_signed() {
        let out = arithmetic_dtype(DType::U8, DType::U8, ArithmeticOp::Sub, FloatPrecision::F64)
            .expect("sub");
        assert_eq!(out, DType::I32);
        let out = arithmetic_dtype(DType::I8, DType::I16, ArithmeticOp::Sub, FloatPrecision::F64)
            .expect("sub");
        assert_eq!(out, DType::I16);
    }

    #[test]
    fn division_promotes_to_default_float() {
        let p = FloatPrecision::F32;
        assert_eq!(
            arithmetic_dtype(DType::U8, DType::U8, ArithmeticOp::Div, p).expect("div"),
            DType::F32
        );
        assert_eq!(
            arithmetic_dtype(DType::F32, DType::F64, ArithmeticOp::Div, p).expect("div"),
            DType::F64
        );
    }

    #[test]
    fn scalar_promotion_rules() {
        let p = FloatPrecision::F64;
        let add = ArithmeticOp::Add;
        assert_eq!(scalar_arithmetic_dtype(DType::U8, 3.0, add, p).expect("s"), DType::U8);
        assert_eq!(scalar_arithmetic_dtype(DType::U8, -3.0, add, p).expect("s"), DType::I32);
        assert_eq!(scalar_arithmetic_dtype(DType::U8, 0.5, add, p).expect("s"), DType::F64);
        assert_eq!(scalar_arithmetic_dtype(DType::I8, -3.0, add, p).expect("s"), DType::I8);
        assert_eq!(scalar_arithmetic_dtype(DType::U8, 300.0, add, p).expect("s"), DType::U16);
        assert_eq!(
            scalar_arithmetic_dtype(DType::U16, 2.0, ArithmeticOp::Sub, p).expect("s"),
            DType::I32
        );
        assert_eq!(
            scalar_arithmetic_dtype(DType::U8, -1.0, ArithmeticOp::Mul, p).expect("s"),
            DType::I32
        );
        assert_eq!(scalar_arithmetic_dtype(DType::F32, 1e9, add, p).expect("s"), DType::F32);
        assert!(scalar_arithmetic_dtype(DType::Utf8, 1.0, add, p).is_err());
    }

    #[test]
    fn numeric_literal_grammar() {
        for ok in ["1", "-2", "+3.5", ".5", "5.", "1e10", "-1.5E-3", "NaN", "-Infinity", " 42 "] {
            assert!(looks_numeric(ok), "{ok}");
        }
        for bad in ["", "-", ".", "1e", "abc", "1.2.3", "0x10", "1,000"] {
            assert!(!looks_numeric(bad), "{bad}");
        }
        assert_eq!(parse_numeric("-Infinity"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_numeric("2.5e1"), Some(25.0));
    }

    #[test]
    fn scalar_ordering_puts_numbers_before_strings() {
        let mut values = vec![
            Scalar::Utf8("b".to_owned()),
            Scalar::Null,
            Scalar::Float64(f64::NAN),
            Scalar::Int64(3),
            Scalar::Float64(1.5),
        ];
        values.sort_by(Scalar::total_cmp);
        assert_eq!(values[0], Scalar::Float64(1.5));
        assert_eq!(values[1], Scalar::Int64(3));
        assert!(values[2].is_missing());
        assert_eq!(values[3], Scalar::Utf8("b".to_owned()));
        assert!(values[4].is_null());
    }

    #[test]
    fn coercion_parses_strings() {
        assert_eq!(Scalar::from("12").coerce_f64(), 12.0);
        assert!(Scalar::from("x").coerce_f64().is_nan());
        assert!(Scalar::Null.coerce_f64().is_nan());
        assert_eq!(Scalar::from(Some(3_u8)), Scalar::Int64(3));
        assert_eq!(Scalar::from(None::<u8>), Scalar::Null);
    }

    #[test]
    fn serde_uses_snake_case_tokens() {
        let json = serde_json::to_string(&DType::U16).expect("serialize");
        assert_eq!(json, "\"u16\"");
    }
}
