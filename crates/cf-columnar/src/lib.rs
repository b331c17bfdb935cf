#![forbid(unsafe_code)]

mod native;
mod stats;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cf_runtime::{EngineOptions, RandomSource, options};
pub use cf_types::ArithmeticOp;
use cf_types::{
    DType, FloatPrecision, Scalar, TypeError, arithmetic_dtype, infer_dtype, looks_numeric,
    promote_dtypes, scalar_arithmetic_dtype,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use native::{ColumnData, NativeType};
use native::{cmp_native, cmp_text, dispatch, number_text, rebuild};

const RAND_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Gt,
    Lt,
    Eq,
    Ne,
    Ge,
    Le,
}

impl ComparisonOp {
    #[must_use]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Ge => ordering != Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column shape mismatch: left={left}, right={right}")]
    ShapeMismatch { left: usize, right: usize },
    #[error("operation {op} is not supported on {dtype} columns")]
    UnsupportedOperation { op: &'static str, dtype: DType },
    #[error("column has no label map to decode with")]
    MissingLabelMap,
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Mapping from original string values to the integer codes assigned by
/// label encoding, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    labels: Vec<Option<String>>,
    codes: BTreeMap<Option<String>, usize>,
}

impl LabelMap {
    /// Code for `label`, assigning the next free one on first sight.
    pub fn insert(&mut self, label: Option<&str>) -> usize {
        let key = label.map(str::to_owned);
        if let Some(&code) = self.codes.get(&key) {
            return code;
        }
        let code = self.labels.len();
        self.labels.push(key.clone());
        self.codes.insert(key, code);
        code
    }

    #[must_use]
    pub fn code(&self, label: Option<&str>) -> Option<usize> {
        self.codes.get(&label.map(str::to_owned)).copied()
    }

    /// Label stored under `code`; the inner `None` is a missing string.
    #[must_use]
    pub fn label(&self, code: usize) -> Option<Option<&str>> {
        self.labels.get(code).map(Option::as_deref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, usize)> + '_ {
        self.labels
            .iter()
            .enumerate()
            .map(|(code, label)| (label.as_deref(), code))
    }
}

/// A typed, fixed-length sequence with value semantics.
///
/// Cloning shares the backing buffer; every mutating method detaches a private
/// copy first, so a mutation is never observed through another `Column`.
/// `subarray` windows share the parent's buffer the same way.
#[derive(Debug, Clone)]
pub struct Column {
    data: Arc<ColumnData>,
    offset: usize,
    len: usize,
    label_map: Option<Arc<LabelMap>>,
    k_bins_bounds: Option<Arc<[f64]>>,
}

/// Text form of a scalar stored in a string column.
fn scalar_text(value: &Scalar) -> Option<String> {
    match value {
        Scalar::Null => None,
        Scalar::Utf8(text) => Some(text.clone()),
        Scalar::Int64(v) => Some(v.to_string()),
        Scalar::Float64(v) => number_text(*v),
    }
}

/// Order two scalars when they are comparable: numbers by value, strings
/// lexicographically.
#[must_use]
pub fn compare_scalars(left: &Scalar, right: &Scalar) -> Option<Ordering> {
    match (left, right) {
        (Scalar::Utf8(a), Scalar::Utf8(b)) => Some(a.cmp(b)),
        (a, b) if a.is_numeric() && b.is_numeric() => a.coerce_f64().partial_cmp(&b.coerce_f64()),
        _ => None,
    }
}

fn clamp_position(position: i64, len: usize) -> usize {
    if position < 0 {
        len.saturating_sub(usize::try_from(position.unsigned_abs()).unwrap_or(usize::MAX))
    } else {
        usize::try_from(position).unwrap_or(usize::MAX).min(len)
    }
}

pub(crate) fn clamp_request(n: usize, len: usize, what: &str) -> usize {
    if n > len {
        log::warn!("{what}({n}) requested on {len} values; returning {len}");
        len
    } else {
        n
    }
}

fn op_name(op: ArithmeticOp) -> &'static str {
    match op {
        ArithmeticOp::Add => "add",
        ArithmeticOp::Sub => "sub",
        ArithmeticOp::Mul => "mul",
        ArithmeticOp::Div => "div",
    }
}

fn fold_unseeded(values: Vec<f64>, f: impl Fn(f64, f64) -> f64) -> f64 {
    let mut iter = values.into_iter();
    match iter.next() {
        Some(first) => iter.fold(first, f),
        None => f64::NAN,
    }
}

impl Column {
    fn from_data(data: ColumnData) -> Self {
        let len = data.len();
        Self {
            data: Arc::new(data),
            offset: 0,
            len,
            label_map: None,
            k_bins_bounds: None,
        }
    }

    fn with_metadata_of(mut self, source: &Self) -> Self {
        self.label_map = source.label_map.clone();
        self.k_bins_bounds = source.k_bins_bounds.clone();
        self
    }

    fn window_of<'a, T>(&self, values: &'a [T]) -> &'a [T] {
        &values[self.offset..self.offset + self.len]
    }

    /// Private, window-free buffer ready for in-place mutation.
    fn data_mut(&mut self) -> &mut ColumnData {
        if self.offset != 0 || self.len != self.data.len() {
            let owned = self.data.window(self.offset, self.offset + self.len);
            self.data = Arc::new(owned);
            self.offset = 0;
        }
        Arc::make_mut(&mut self.data)
    }

    pub(crate) fn unsupported(&self, op: &'static str) -> ColumnError {
        ColumnError::UnsupportedOperation {
            op,
            dtype: self.dtype(),
        }
    }

    pub(crate) fn numeric_values(&self, op: &'static str) -> Result<Vec<f64>, ColumnError> {
        dispatch!(
            &*self.data,
            v => Ok(self.window_of(v).iter().map(|x| x.to_f64()).collect()),
            _s => Err(self.unsupported(op))
        )
    }

    fn integer_values(&self, op: &'static str) -> Result<Vec<i64>, ColumnError> {
        dispatch!(
            &*self.data,
            v => Ok(self.window_of(v).iter().map(|x| x.to_i64()).collect()),
            _s => Err(self.unsupported(op))
        )
    }

    fn check_same_len(&self, other: &Self) -> Result<(), ColumnError> {
        if self.len != other.len {
            return Err(ColumnError::ShapeMismatch {
                left: self.len,
                right: other.len,
            });
        }
        Ok(())
    }

    // ── Factories ──────────────────────────────────────────────────────

    /// Zero-filled column, or a column of missing strings for `Utf8`.
    #[must_use]
    pub fn empty(len: usize, dtype: DType) -> Self {
        Self::from_data(ColumnData::zeros(dtype, len))
    }

    #[must_use]
    pub fn from_f64_values(values: &[f64], dtype: DType) -> Self {
        Self::from_data(ColumnData::from_f64s(dtype, values))
    }

    pub fn from_strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_data(ColumnData::Utf8(
            values.into_iter().map(|v| Some(v.into())).collect(),
        ))
    }

    #[must_use]
    pub fn from_optional_strings(values: Vec<Option<String>>) -> Self {
        Self::from_data(ColumnData::Utf8(values))
    }

    /// Universal ingestion path for untyped values.
    ///
    /// A hint forces the dtype (strings are parsed, failures become NaN).
    /// Without one, all-numeric input infers the narrowest numeric dtype and
    /// string input is parsed only when enough entries look numeric.
    #[must_use]
    pub fn from_scalars(values: Vec<Scalar>, hint: Option<DType>) -> Self {
        Self::from_scalars_with_options(values, hint, &options())
    }

    #[must_use]
    pub fn from_scalars_with_options(
        values: Vec<Scalar>,
        hint: Option<DType>,
        options: &EngineOptions,
    ) -> Self {
        match hint {
            Some(DType::Utf8) => {
                return Self::from_optional_strings(values.iter().map(scalar_text).collect());
            }
            Some(dtype) => {
                let numbers: Vec<f64> = values.iter().map(Scalar::coerce_f64).collect();
                return Self::from_f64_values(&numbers, dtype);
            }
            None => {}
        }
        if values.is_empty() {
            return Self::empty(0, DType::Utf8);
        }

        let numeric = values.iter().filter(|v| v.is_numeric()).count();
        let nulls = values.iter().filter(|v| v.is_null()).count();
        if numeric > 0 && numeric + nulls == values.len() {
            let numbers: Vec<f64> = values.iter().map(Scalar::coerce_f64).collect();
            let dtype = infer_dtype(&numbers, options.float_precision);
            return Self::from_f64_values(&numbers, dtype);
        }

        let numeric_like = values
            .iter()
            .filter(|v| match v {
                Scalar::Utf8(text) => looks_numeric(text),
                other => other.is_numeric(),
            })
            .count();
        let ratio = numeric_like as f64 / values.len() as f64;
        if numeric_like > 0 && ratio >= options.parse_num_ratio {
            let numbers: Vec<f64> = values.iter().map(Scalar::coerce_f64).collect();
            let dtype = infer_dtype(&numbers, options.float_precision);
            log::debug!(
                "parsed {numeric_like} of {} string values as {dtype}",
                values.len()
            );
            return Self::from_f64_values(&numbers, dtype);
        }
        Self::from_optional_strings(values.iter().map(scalar_text).collect())
    }

    /// Reuse `source`: a differing hint converts, otherwise the result is a
    /// deep copy when `deep` is set and a shared handle when it is not.
    #[must_use]
    pub fn from_column(source: &Self, hint: Option<DType>, deep: bool) -> Self {
        match hint {
            Some(dtype) if dtype != source.dtype() => source.cast(dtype),
            _ if deep => source.deep_clone(None),
            _ => source.clone(),
        }
    }

    #[must_use]
    pub fn convert(&self, hint: Option<DType>, deep: bool) -> Self {
        Self::from_column(self, hint, deep)
    }

    pub fn of<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        Self::from_scalars(values.into_iter().map(Into::into).collect(), None)
    }

    pub fn repeat(len: usize, value: impl Into<Scalar>, hint: Option<DType>) -> Self {
        let value = value.into();
        let dtype = hint.unwrap_or_else(|| Self::from_scalars(vec![value.clone()], None).dtype());
        Self::from_scalars(vec![value; len], Some(dtype))
    }

    /// `start, start + step, …` up to but excluding `end`.
    pub fn range(start: f64, end: f64, step: f64) -> Result<Self, ColumnError> {
        if !(start.is_finite() && end.is_finite() && step.is_finite()) || step == 0.0 {
            return Err(ColumnError::InvalidArgument(format!(
                "range({start}, {end}, {step}) is not a finite progression"
            )));
        }
        let steps = ((end - start) / step).ceil();
        let count = if steps > 0.0 { steps as usize } else { 0 };
        let values: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
        let dtype = infer_dtype(&values, options().float_precision);
        Ok(Self::from_f64_values(&values, dtype))
    }

    /// Uniform random values in `[lo, hi)`. For strings, `lo`/`hi` bound the
    /// length of each generated word.
    pub fn rand<R: RandomSource + ?Sized>(
        len: usize,
        lo: f64,
        hi: f64,
        dtype: Option<DType>,
        rng: &mut R,
    ) -> Self {
        match dtype {
            Some(DType::Utf8) => {
                let (shortest, longest) = (lo.max(0.0) as i64, hi.max(0.0) as i64);
                let words = (0..len)
                    .map(|_| {
                        let word_len = rng.uniform_int(shortest, longest);
                        Some(
                            (0..word_len)
                                .map(|_| char::from(RAND_ALPHABET[rng.index(RAND_ALPHABET.len())]))
                                .collect::<String>(),
                        )
                    })
                    .collect();
                Self::from_optional_strings(words)
            }
            Some(dtype) if dtype.is_integer() => {
                let (lo, hi) = (lo.ceil() as i64, hi.ceil() as i64);
                let values: Vec<f64> = (0..len).map(|_| rng.uniform_int(lo, hi) as f64).collect();
                Self::from_f64_values(&values, dtype)
            }
            Some(dtype) => {
                let values: Vec<f64> = (0..len).map(|_| rng.uniform_float(lo, hi)).collect();
                Self::from_f64_values(&values, dtype)
            }
            None => {
                let values: Vec<f64> = (0..len).map(|_| rng.uniform_float(lo, hi)).collect();
                let dtype = infer_dtype(&values, options().float_precision);
                Self::from_f64_values(&values, dtype)
            }
        }
    }

    #[must_use]
    pub fn ones(len: usize, dtype: DType) -> Self {
        Self::from_f64_values(&vec![1.0; len], dtype)
    }

    #[must_use]
    pub fn zeros(len: usize, dtype: DType) -> Self {
        Self::from_f64_values(&vec![0.0; len], dtype)
    }

    pub fn from_fn<F>(len: usize, f: F, hint: Option<DType>) -> Self
    where
        F: FnMut(usize) -> Scalar,
    {
        Self::from_scalars((0..len).map(f).collect(), hint)
    }

    // ── Identity ───────────────────────────────────────────────────────

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.dtype().is_numeric()
    }

    #[must_use]
    pub fn is_string(&self) -> bool {
        self.dtype().is_utf8()
    }

    /// Bytes held by the visible values.
    #[must_use]
    pub fn memory(&self) -> usize {
        dispatch!(
            &*self.data,
            _v => self.len * self.dtype().byte_width(),
            s => self
                .window_of(s)
                .iter()
                .map(|text| text.as_ref().map_or(0, String::len))
                .sum()
        )
    }

    #[must_use]
    pub fn label_map(&self) -> Option<&LabelMap> {
        self.label_map.as_deref()
    }

    #[must_use]
    pub fn k_bins_bounds(&self) -> Option<&[f64]> {
        self.k_bins_bounds.as_deref()
    }

    #[must_use]
    pub fn shares_buffer_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    // ── Element access ─────────────────────────────────────────────────

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<Scalar> {
        (idx < self.len).then(|| self.data.scalar_at(self.offset + idx))
    }

    #[must_use]
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        if idx < self.len {
            self.data.f64_at(self.offset + idx)
        } else {
            None
        }
    }

    /// Assign one element in place.
    pub fn set_value(&mut self, idx: usize, value: impl Into<Scalar>) -> Result<(), ColumnError> {
        if idx >= self.len {
            return Err(ColumnError::OutOfBounds {
                index: idx,
                len: self.len,
            });
        }
        let value = value.into();
        dispatch!(
            self.data_mut(),
            v => v[idx] = NativeType::from_f64(value.coerce_f64()),
            s => s[idx] = scalar_text(&value)
        );
        Ok(())
    }

    /// Overwrite `other.len()` elements starting at `offset`, in place.
    pub fn set(&mut self, other: &Self, offset: usize) -> Result<(), ColumnError> {
        let end = offset
            .checked_add(other.len)
            .filter(|end| *end <= self.len)
            .ok_or(ColumnError::ShapeMismatch {
                left: self.len,
                right: offset.saturating_add(other.len),
            })?;
        let incoming = other.to_scalars();
        dispatch!(
            self.data_mut(),
            v => {
                for (slot, value) in v[offset..end].iter_mut().zip(&incoming) {
                    *slot = NativeType::from_f64(value.coerce_f64());
                }
            },
            s => {
                for (slot, value) in s[offset..end].iter_mut().zip(&incoming) {
                    *slot = scalar_text(value);
                }
            }
        );
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len).map(move |idx| self.data.scalar_at(self.offset + idx))
    }

    #[must_use]
    pub fn to_scalars(&self) -> Vec<Scalar> {
        self.iter().collect()
    }

    pub fn to_f64_vec(&self) -> Result<Vec<f64>, ColumnError> {
        self.numeric_values("to_f64_vec")
    }

    #[must_use]
    pub fn to_strings(&self) -> Vec<Option<String>> {
        self.iter().map(|value| scalar_text(&value)).collect()
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.dtype() == other.dtype()
            && self.len == other.len
            && self.iter().zip(other.iter()).all(|(a, b)| a.semantic_eq(&b))
    }

    // ── Views ──────────────────────────────────────────────────────────

    fn resolve_bounds(&self, lo: i64, hi: i64) -> (usize, usize) {
        let start = clamp_position(lo, self.len);
        let end = clamp_position(hi, self.len).max(start);
        (start, end)
    }

    fn slice_range(&self, start: usize, end: usize) -> Self {
        Self::from_data(self.data.window(self.offset + start, self.offset + end))
            .with_metadata_of(self)
    }

    fn subarray_range(&self, start: usize, end: usize) -> Self {
        Self {
            data: Arc::clone(&self.data),
            offset: self.offset + start,
            len: end - start,
            label_map: self.label_map.clone(),
            k_bins_bounds: self.k_bins_bounds.clone(),
        }
    }

    /// Fresh copy of `[lo, hi)`; negative bounds count from the end.
    #[must_use]
    pub fn slice(&self, lo: i64, hi: i64) -> Self {
        let (start, end) = self.resolve_bounds(lo, hi);
        self.slice_range(start, end)
    }

    /// Window over `[lo, hi)` sharing this column's buffer until either side
    /// is mutated.
    #[must_use]
    pub fn subarray(&self, lo: i64, hi: i64) -> Self {
        let (start, end) = self.resolve_bounds(lo, hi);
        self.subarray_range(start, end)
    }

    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let n = clamp_request(n, self.len, "head");
        self.slice_range(0, n)
    }

    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let n = clamp_request(n, self.len, "tail");
        self.slice_range(self.len - n, self.len)
    }

    // ── Copies and casts ───────────────────────────────────────────────

    fn converted(&self, target: DType) -> Self {
        if target.is_utf8() {
            return Self::from_optional_strings(self.to_strings());
        }
        let numbers = match self.numeric_values("cast") {
            Ok(numbers) => numbers,
            Err(_) => self.iter().map(|value| value.coerce_f64()).collect(),
        };
        Self::from_f64_values(&numbers, target)
    }

    /// Copy into freshly allocated storage, optionally at another dtype.
    #[must_use]
    pub fn deep_clone(&self, dtype: Option<DType>) -> Self {
        let copy = match dtype {
            Some(target) if target != self.dtype() => self.converted(target),
            _ => Self::from_data(self.data.window(self.offset, self.offset + self.len)),
        };
        copy.with_metadata_of(self)
    }

    #[must_use]
    pub fn cast(&self, dtype: DType) -> Self {
        if dtype == self.dtype() {
            self.clone()
        } else {
            self.converted(dtype).with_metadata_of(self)
        }
    }

    /// Narrow to the minimal dtype able to hold the current values.
    pub fn downcast(&self) -> Result<Self, ColumnError> {
        let values = self.numeric_values("downcast")?;
        let target = infer_dtype(&values, FloatPrecision::F32);
        if target.bits() < self.dtype().bits() {
            log::debug!("downcasting {} column to {target}", self.dtype());
            Ok(self.cast(target))
        } else {
            Ok(self.clone())
        }
    }

    // ── Structural ─────────────────────────────────────────────────────

    /// Append `other`, promoting both sides to a common dtype.
    pub fn concat(&self, other: &Self) -> Result<Self, ColumnError> {
        let (left, right) = (self.dtype(), other.dtype());
        if left.is_utf8() && right.is_utf8() {
            let mut values = self.to_strings();
            values.extend(other.to_strings());
            return Ok(Self::from_optional_strings(values));
        }
        let dtype = promote_dtypes(left, right)?;
        let mut values = self.numeric_values("concat")?;
        values.extend(other.numeric_values("concat")?);
        Ok(Self::from_f64_values(&values, dtype))
    }

    pub(crate) fn gather(&self, indices: &[usize]) -> Self {
        let offset = self.offset;
        Self::from_data(rebuild!(
            &*self.data,
            v => indices.iter().map(|&idx| v[offset + idx].clone()).collect()
        ))
        .with_metadata_of(self)
    }

    pub fn take(&self, indices: &[usize]) -> Result<Self, ColumnError> {
        if let Some(&index) = indices.iter().find(|&&idx| idx >= self.len) {
            return Err(ColumnError::OutOfBounds {
                index,
                len: self.len,
            });
        }
        Ok(self.gather(indices))
    }

    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&Scalar, usize) -> bool,
    {
        let indices: Vec<usize> = self
            .iter()
            .enumerate()
            .filter_map(|(idx, value)| predicate(&value, idx).then_some(idx))
            .collect();
        self.gather(&indices)
    }

    pub fn swap(&mut self, i: usize, j: usize) -> Result<(), ColumnError> {
        for index in [i, j] {
            if index >= self.len {
                return Err(ColumnError::OutOfBounds {
                    index,
                    len: self.len,
                });
            }
        }
        dispatch!(self.data_mut(), v => v.swap(i, j), s => s.swap(i, j));
        Ok(())
    }

    /// Sort in place. NaN and missing strings sort after every value in
    /// ascending order.
    pub fn sort_in_place(&mut self, order: SortOrder) {
        dispatch!(self.data_mut(), v => v.sort_by(cmp_native), s => s.sort_by(cmp_text));
        if order == SortOrder::Desc {
            self.reverse_in_place();
        }
    }

    #[must_use]
    pub fn sorted(&self, order: SortOrder) -> Self {
        let mut out = self.clone();
        out.sort_in_place(order);
        out
    }

    pub fn sorted_by<F>(&self, mut compare: F) -> Self
    where
        F: FnMut(&Scalar, &Scalar) -> Ordering,
    {
        let values = self.to_scalars();
        let mut indices: Vec<usize> = (0..self.len).collect();
        indices.sort_by(|&a, &b| compare(&values[a], &values[b]));
        self.gather(&indices)
    }

    pub fn reverse_in_place(&mut self) {
        dispatch!(self.data_mut(), v => v.reverse(), s => s.reverse());
    }

    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut out = self.clone();
        out.reverse_in_place();
        out
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle_in_place<R: RandomSource + ?Sized>(&mut self, rng: &mut R) {
        let len = self.len;
        let data = self.data_mut();
        for i in (1..len).rev() {
            let j = rng.index(i + 1);
            dispatch!(&mut *data, v => v.swap(i, j), s => s.swap(i, j));
        }
    }

    #[must_use]
    pub fn shuffled<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Self {
        let mut out = self.clone();
        out.shuffle_in_place(rng);
        out
    }

    // ── Functional ─────────────────────────────────────────────────────

    /// Apply `f` to every `(value, index, column)`. Without a hint the source
    /// dtype is kept when the results stay in its kind; otherwise the result
    /// dtype is inferred.
    pub fn map<F>(&self, mut f: F, hint: Option<DType>) -> Self
    where
        F: FnMut(Scalar, usize, &Self) -> Scalar,
    {
        let values: Vec<Scalar> = self
            .iter()
            .enumerate()
            .map(|(idx, value)| f(value, idx, self))
            .collect();
        let dtype = hint.or_else(|| {
            let keeps_kind = if self.is_numeric() {
                values.iter().all(|v| v.is_numeric() || v.is_null())
            } else {
                values.iter().all(|v| matches!(v, Scalar::Utf8(_) | Scalar::Null))
            };
            keeps_kind.then(|| self.dtype())
        });
        Self::from_scalars(values, dtype)
    }

    /// Numeric fast path of [`Column::map`].
    pub fn map_f64<F>(&self, f: F, hint: Option<DType>) -> Result<Self, ColumnError>
    where
        F: FnMut(f64) -> f64,
    {
        let values: Vec<f64> = self.numeric_values("map")?.into_iter().map(f).collect();
        Ok(Self::from_f64_values(&values, hint.unwrap_or_else(|| self.dtype())))
    }

    pub fn zip_with<F>(&self, other: &Self, mut f: F, hint: Option<DType>) -> Result<Self, ColumnError>
    where
        F: FnMut(Scalar, Scalar) -> Scalar,
    {
        self.check_same_len(other)?;
        let values = self.iter().zip(other.iter()).map(|(a, b)| f(a, b)).collect();
        Ok(Self::from_scalars(values, hint))
    }

    pub fn zip_with3<F>(
        &self,
        second: &Self,
        third: &Self,
        mut f: F,
        hint: Option<DType>,
    ) -> Result<Self, ColumnError>
    where
        F: FnMut(Scalar, Scalar, Scalar) -> Scalar,
    {
        self.check_same_len(second)?;
        self.check_same_len(third)?;
        let values = self
            .iter()
            .zip(second.iter())
            .zip(third.iter())
            .map(|((a, b), c)| f(a, b, c))
            .collect();
        Ok(Self::from_scalars(values, hint))
    }

    /// Cumulative application: element `i` of the result is `f` of the
    /// prefix `[0, i]`, passed as a shared view.
    pub fn cum<F>(&self, mut f: F, hint: Option<DType>) -> Self
    where
        F: FnMut(&Self) -> Scalar,
    {
        let values = (1..=self.len)
            .map(|end| f(&self.subarray_range(0, end)))
            .collect();
        Self::from_scalars(values, hint)
    }

    pub fn take_while<F: FnMut(&Scalar) -> bool>(&self, mut predicate: F) -> Self {
        let end = self
            .iter()
            .position(|value| !predicate(&value))
            .unwrap_or(self.len);
        self.slice_range(0, end)
    }

    pub fn take_until<F: FnMut(&Scalar) -> bool>(&self, mut predicate: F) -> Self {
        let end = self
            .iter()
            .position(|value| predicate(&value))
            .unwrap_or(self.len);
        self.slice_range(0, end)
    }

    pub fn all<F: FnMut(&Scalar) -> bool>(&self, mut predicate: F) -> bool {
        self.iter().all(|value| predicate(&value))
    }

    pub fn some<F: FnMut(&Scalar) -> bool>(&self, mut predicate: F) -> bool {
        self.iter().any(|value| predicate(&value))
    }

    pub fn none<F: FnMut(&Scalar) -> bool>(&self, predicate: F) -> bool {
        !self.some(predicate)
    }

    #[must_use]
    pub fn contains(&self, value: &Scalar) -> bool {
        self.iter().any(|v| v.semantic_eq(value))
    }

    #[must_use]
    pub fn remove_all(&self, values: &[Scalar]) -> Self {
        self.filter(|value, _| !values.iter().any(|v| v.semantic_eq(value)))
    }

    /// Per-element comparison against `value`; incomparable pairs yield false.
    #[must_use]
    pub fn compare_scalar(&self, value: &Scalar, op: ComparisonOp) -> Vec<bool> {
        self.iter()
            .map(|v| compare_scalars(&v, value).is_some_and(|ordering| op.holds(ordering)))
            .collect()
    }

    // ── Arithmetic ─────────────────────────────────────────────────────

    pub fn binary_numeric(&self, right: &Self, op: ArithmeticOp) -> Result<Self, ColumnError> {
        self.binary_numeric_with_options(right, op, &options())
    }

    /// Elementwise `self op right` at the promoted dtype. Integer results
    /// wrap within their width; float results are computed in f64.
    pub fn binary_numeric_with_options(
        &self,
        right: &Self,
        op: ArithmeticOp,
        options: &EngineOptions,
    ) -> Result<Self, ColumnError> {
        self.check_same_len(right)?;
        for column in [self, right] {
            if !column.is_numeric() {
                return Err(column.unsupported(op_name(op)));
            }
        }
        let dtype = arithmetic_dtype(self.dtype(), right.dtype(), op, options.float_precision)?;

        if dtype.is_integer() {
            let lhs = self.integer_values(op_name(op))?;
            let rhs = right.integer_values(op_name(op))?;
            let values: Vec<i64> = lhs.iter().zip(&rhs).map(|(a, b)| op.apply_i64(*a, *b)).collect();
            return Ok(Self::from_data(ColumnData::from_i64s_wrapping(dtype, &values)));
        }

        let lhs = self.numeric_values(op_name(op))?;
        let rhs = right.numeric_values(op_name(op))?;
        let values: Vec<f64> = lhs.iter().zip(&rhs).map(|(a, b)| op.apply_f64(*a, *b)).collect();
        Ok(Self::from_f64_values(&values, dtype))
    }

    pub fn binary_scalar(&self, scalar: f64, op: ArithmeticOp) -> Result<Self, ColumnError> {
        self.binary_scalar_with_options(scalar, op, &options())
    }

    pub fn binary_scalar_with_options(
        &self,
        scalar: f64,
        op: ArithmeticOp,
        options: &EngineOptions,
    ) -> Result<Self, ColumnError> {
        if !self.is_numeric() {
            return Err(self.unsupported(op_name(op)));
        }
        let dtype = scalar_arithmetic_dtype(self.dtype(), scalar, op, options.float_precision)?;

        if dtype.is_integer() {
            let rhs = scalar as i64;
            let values: Vec<i64> = self
                .integer_values(op_name(op))?
                .into_iter()
                .map(|v| op.apply_i64(v, rhs))
                .collect();
            return Ok(Self::from_data(ColumnData::from_i64s_wrapping(dtype, &values)));
        }

        let values: Vec<f64> = self
            .numeric_values(op_name(op))?
            .into_iter()
            .map(|v| op.apply_f64(v, scalar))
            .collect();
        Ok(Self::from_f64_values(&values, dtype))
    }

    pub fn add(&self, other: &Self) -> Result<Self, ColumnError> {
        self.binary_numeric(other, ArithmeticOp::Add)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, ColumnError> {
        self.binary_numeric(other, ArithmeticOp::Sub)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, ColumnError> {
        self.binary_numeric(other, ArithmeticOp::Mul)
    }

    pub fn div(&self, other: &Self) -> Result<Self, ColumnError> {
        self.binary_numeric(other, ArithmeticOp::Div)
    }

    pub fn add_scalar(&self, value: f64) -> Result<Self, ColumnError> {
        self.binary_scalar(value, ArithmeticOp::Add)
    }

    pub fn sub_scalar(&self, value: f64) -> Result<Self, ColumnError> {
        self.binary_scalar(value, ArithmeticOp::Sub)
    }

    pub fn mul_scalar(&self, value: f64) -> Result<Self, ColumnError> {
        self.binary_scalar(value, ArithmeticOp::Mul)
    }

    pub fn div_scalar(&self, value: f64) -> Result<Self, ColumnError> {
        self.binary_scalar(value, ArithmeticOp::Div)
    }

    /// Sum of all values; zero for an empty column.
    pub fn sum(&self) -> Result<f64, ColumnError> {
        Ok(self.numeric_values("sum")?.iter().sum())
    }

    /// Product of all values; one for an empty column.
    pub fn prod(&self) -> Result<f64, ColumnError> {
        Ok(self.numeric_values("prod")?.iter().product())
    }

    /// Left-fold difference `x0 - x1 - …`; NaN for an empty column.
    pub fn sub_fold(&self) -> Result<f64, ColumnError> {
        Ok(fold_unseeded(self.numeric_values("sub")?, |a, b| a - b))
    }

    /// Left-fold quotient `x0 / x1 / …`; NaN for an empty column.
    pub fn div_fold(&self) -> Result<f64, ColumnError> {
        Ok(fold_unseeded(self.numeric_values("div")?, |a, b| a / b))
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.semantic_eq(other)
    }
}

// ── Formatter ──────────────────────────────────────────────────────────

/// Fixed-precision display string for a value stored at `dtype`.
#[must_use]
pub fn format_scalar(value: &Scalar, dtype: DType, precision: usize) -> String {
    match value {
        Scalar::Null => "null".to_owned(),
        Scalar::Utf8(text) => text.clone(),
        Scalar::Int64(v) => v.to_string(),
        Scalar::Float64(v) if dtype.is_float() => format!("{v:.precision$}"),
        Scalar::Float64(v) => v.to_string(),
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opts = options();
        let shown = self.len.min(opts.head_len);
        let body = (0..shown)
            .filter_map(|idx| self.get(idx))
            .map(|value| format_scalar(&value, self.dtype(), opts.print_precision))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Col<{}> [{body}", self.dtype())?;
        if self.len > shown {
            write!(f, " ... {} more", self.len - shown)?;
        }
        f.write_str("]")
    }
}
