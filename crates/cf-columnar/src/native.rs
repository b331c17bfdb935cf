use std::cmp::Ordering;
use std::fmt::Debug;

use cf_types::{DType, Scalar};

/// Element type of a numeric buffer.
pub trait NativeType: Copy + PartialOrd + Default + Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_f64(self) -> f64;
    fn to_i64(self) -> i64;
    /// Saturating store; NaN lands on zero for integer kinds.
    fn from_f64(value: f64) -> Self;
    /// Keep the low bits, like a store into a fixed-width buffer.
    fn from_i64_wrapping(value: i64) -> Self;

    fn is_nan(self) -> bool {
        false
    }
}

macro_rules! native_int {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl NativeType for $ty {
            const DTYPE: DType = DType::$dtype;

            fn to_f64(self) -> f64 {
                f64::from(self)
            }

            fn to_i64(self) -> i64 {
                i64::from(self)
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn from_i64_wrapping(value: i64) -> Self {
                value as $ty
            }
        })*
    };
}

native_int!(i8 => I8, i16 => I16, i32 => I32, u8 => U8, u16 => U16, u32 => U32);

impl NativeType for f32 {
    const DTYPE: DType = DType::F32;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn from_i64_wrapping(value: i64) -> Self {
        value as f32
    }

    fn is_nan(self) -> bool {
        self.is_nan()
    }
}

impl NativeType for f64 {
    const DTYPE: DType = DType::F64;

    fn to_f64(self) -> f64 {
        self
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn from_i64_wrapping(value: i64) -> Self {
        value as f64
    }

    fn is_nan(self) -> bool {
        self.is_nan()
    }
}

/// Ascending order with NaN after every number.
pub(crate) fn cmp_native<T: NativeType>(a: &T, b: &T) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

/// Ascending order with missing strings last.
pub(crate) fn cmp_text(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    }
}

/// Typed backing storage: one variant per dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Utf8(Vec<Option<String>>),
}

/// Evaluate `$numeric` with `$v` bound to the typed numeric vector, or `$utf8`
/// with `$s` bound to the string vector.
macro_rules! dispatch {
    ($data:expr, $v:ident => $numeric:expr, $s:ident => $utf8:expr) => {
        match $data {
            $crate::native::ColumnData::I8($v) => $numeric,
            $crate::native::ColumnData::I16($v) => $numeric,
            $crate::native::ColumnData::I32($v) => $numeric,
            $crate::native::ColumnData::U8($v) => $numeric,
            $crate::native::ColumnData::U16($v) => $numeric,
            $crate::native::ColumnData::U32($v) => $numeric,
            $crate::native::ColumnData::F32($v) => $numeric,
            $crate::native::ColumnData::F64($v) => $numeric,
            $crate::native::ColumnData::Utf8($s) => $utf8,
        }
    };
}

/// Rebuild the same variant from an expression generic over the element type.
macro_rules! rebuild {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::native::ColumnData::I8($v) => $crate::native::ColumnData::I8($body),
            $crate::native::ColumnData::I16($v) => $crate::native::ColumnData::I16($body),
            $crate::native::ColumnData::I32($v) => $crate::native::ColumnData::I32($body),
            $crate::native::ColumnData::U8($v) => $crate::native::ColumnData::U8($body),
            $crate::native::ColumnData::U16($v) => $crate::native::ColumnData::U16($body),
            $crate::native::ColumnData::U32($v) => $crate::native::ColumnData::U32($body),
            $crate::native::ColumnData::F32($v) => $crate::native::ColumnData::F32($body),
            $crate::native::ColumnData::F64($v) => $crate::native::ColumnData::F64($body),
            $crate::native::ColumnData::Utf8($v) => $crate::native::ColumnData::Utf8($body),
        }
    };
}

pub(crate) use dispatch;
pub(crate) use rebuild;

fn collect_native<T: NativeType>(values: &[f64]) -> Vec<T> {
    values.iter().map(|v| T::from_f64(*v)).collect()
}

fn collect_wrapping<T: NativeType>(values: &[i64]) -> Vec<T> {
    values.iter().map(|v| T::from_i64_wrapping(*v)).collect()
}

/// Text form of a number stored in a string column.
pub(crate) fn number_text(value: f64) -> Option<String> {
    if value.is_nan() {
        None
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        Some(format!("{}", value as i64))
    } else {
        Some(value.to_string())
    }
}

impl ColumnData {
    #[must_use]
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::I8 => Self::I8(vec![0; len]),
            DType::I16 => Self::I16(vec![0; len]),
            DType::I32 => Self::I32(vec![0; len]),
            DType::U8 => Self::U8(vec![0; len]),
            DType::U16 => Self::U16(vec![0; len]),
            DType::U32 => Self::U32(vec![0; len]),
            DType::F32 => Self::F32(vec![0.0; len]),
            DType::F64 => Self::F64(vec![0.0; len]),
            DType::Utf8 => Self::Utf8(vec![None; len]),
        }
    }

    /// Store `values` at `dtype`, converting like a typed buffer assignment.
    #[must_use]
    pub fn from_f64s(dtype: DType, values: &[f64]) -> Self {
        match dtype {
            DType::I8 => Self::I8(collect_native(values)),
            DType::I16 => Self::I16(collect_native(values)),
            DType::I32 => Self::I32(collect_native(values)),
            DType::U8 => Self::U8(collect_native(values)),
            DType::U16 => Self::U16(collect_native(values)),
            DType::U32 => Self::U32(collect_native(values)),
            DType::F32 => Self::F32(collect_native(values)),
            DType::F64 => Self::F64(values.to_vec()),
            DType::Utf8 => Self::Utf8(values.iter().map(|v| number_text(*v)).collect()),
        }
    }

    #[must_use]
    pub fn from_i64s_wrapping(dtype: DType, values: &[i64]) -> Self {
        match dtype {
            DType::I8 => Self::I8(collect_wrapping(values)),
            DType::I16 => Self::I16(collect_wrapping(values)),
            DType::I32 => Self::I32(collect_wrapping(values)),
            DType::U8 => Self::U8(collect_wrapping(values)),
            DType::U16 => Self::U16(collect_wrapping(values)),
            DType::U32 => Self::U32(collect_wrapping(values)),
            DType::F32 => Self::F32(collect_wrapping(values)),
            DType::F64 => Self::F64(collect_wrapping(values)),
            DType::Utf8 => Self::Utf8(values.iter().map(|v| Some(v.to_string())).collect()),
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::I8(_) => DType::I8,
            Self::I16(_) => DType::I16,
            Self::I32(_) => DType::I32,
            Self::U8(_) => DType::U8,
            Self::U16(_) => DType::U16,
            Self::U32(_) => DType::U32,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::Utf8(_) => DType::Utf8,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len(), s => s.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned copy of `[start, end)`.
    #[must_use]
    pub fn window(&self, start: usize, end: usize) -> Self {
        rebuild!(self, v => v[start..end].to_vec())
    }

    #[must_use]
    pub fn scalar_at(&self, idx: usize) -> Scalar {
        dispatch!(
            self,
            v => Scalar::from_f64_for(v[idx].to_f64(), self.dtype()),
            s => s[idx].clone().map_or(Scalar::Null, Scalar::Utf8)
        )
    }

    #[must_use]
    pub fn f64_at(&self, idx: usize) -> Option<f64> {
        dispatch!(self, v => Some(v[idx].to_f64()), _s => None)
    }
}
