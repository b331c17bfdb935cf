use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cf_runtime::{EngineOptions, RandomSource, options};
use cf_types::{ArithmeticOp, DType, Scalar, infer_dtype, promote_dtypes};

use crate::native::ColumnData;
use crate::{Column, ColumnError, LabelMap, SortOrder, scalar_text};

/// Numeric matches in [`Column::replace`] are within this distance.
const REPLACE_TOLERANCE: f64 = 1e-4;

/// Hashable identity of a scalar for counting. Numbers are keyed by their
/// f64 bits with NaN and signed zero canonicalised.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ScalarKey {
    Number(u64),
    Text(String),
    Null,
}

impl ScalarKey {
    fn of(value: &Scalar) -> Self {
        match value {
            Scalar::Null => Self::Null,
            Scalar::Utf8(text) => Self::Text(text.clone()),
            number => {
                let v = number.coerce_f64();
                let canonical = if v.is_nan() {
                    f64::NAN
                } else if v == 0.0 {
                    0.0
                } else {
                    v
                };
                Self::Number(canonical.to_bits())
            }
        }
    }
}

impl Column {
    fn float_dtype(&self) -> DType {
        if self.dtype().is_float() {
            self.dtype()
        } else {
            options().float_precision.dtype()
        }
    }

    /// Working copy for composed statistics: the configured float width, or
    /// the column itself when it already is a float at least that wide.
    fn promoted(&self, op: &'static str, options: &EngineOptions) -> Result<Self, ColumnError> {
        if !self.is_numeric() {
            return Err(self.unsupported(op));
        }
        let target = options.float_precision.dtype();
        if self.dtype().is_float() && self.dtype().bits() >= target.bits() {
            Ok(self.clone())
        } else {
            Ok(self.cast(target))
        }
    }

    fn centered(&self, op: &'static str, options: &EngineOptions) -> Result<Self, ColumnError> {
        let mean = self.mean()?;
        self.promoted(op, options)?
            .binary_scalar_with_options(mean, ArithmeticOp::Sub, options)
    }

    // ── Reductions ─────────────────────────────────────────────────────

    /// Smallest non-NaN value; NaN when there is none.
    pub fn min(&self) -> Result<f64, ColumnError> {
        Ok(self.numeric_values("min")?.into_iter().fold(f64::NAN, f64::min))
    }

    /// Largest non-NaN value; NaN when there is none.
    pub fn max(&self) -> Result<f64, ColumnError> {
        Ok(self.numeric_values("max")?.into_iter().fold(f64::NAN, f64::max))
    }

    /// Spread between the largest and smallest value.
    pub fn value_range(&self) -> Result<f64, ColumnError> {
        Ok(self.max()? - self.min()?)
    }

    pub fn mean(&self) -> Result<f64, ColumnError> {
        let values = self.numeric_values("mean")?;
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// The `n/m` quantile of the non-NaN values.
    ///
    /// When `len * n` divides evenly by `m` the two straddling order
    /// statistics are averaged; otherwise the lower one is taken.
    pub fn n_quart(&self, n: usize, m: usize) -> Result<f64, ColumnError> {
        if m == 0 || n > m {
            return Err(ColumnError::InvalidArgument(format!(
                "quantile {n}/{m} lies outside [0, 1]"
            )));
        }
        let mut ys = self.numeric_values("n_quart")?;
        ys.retain(|v| !v.is_nan());
        if ys.is_empty() {
            return Ok(f64::NAN);
        }
        ys.sort_by(f64::total_cmp);

        let scaled = ys.len() * n;
        let mid = scaled / m;
        if scaled % m != 0 {
            return Ok(ys[mid]);
        }
        Ok(match mid {
            0 => ys[0],
            mid if mid >= ys.len() => ys[ys.len() - 1],
            mid => (ys[mid] + ys[mid - 1]) / 2.0,
        })
    }

    pub fn q1(&self) -> Result<f64, ColumnError> {
        self.n_quart(1, 4)
    }

    pub fn median(&self) -> Result<f64, ColumnError> {
        self.n_quart(2, 4)
    }

    pub fn q3(&self) -> Result<f64, ColumnError> {
        self.n_quart(3, 4)
    }

    pub fn iqr(&self) -> Result<f64, ColumnError> {
        Ok(self.q3()? - self.q1()?)
    }

    // ── Composed statistics ────────────────────────────────────────────

    pub fn var(&self) -> Result<f64, ColumnError> {
        self.var_with_options(&options())
    }

    /// Population variance.
    pub fn var_with_options(&self, options: &EngineOptions) -> Result<f64, ColumnError> {
        self.centered("var", options)?.square()?.mean()
    }

    pub fn stdev(&self) -> Result<f64, ColumnError> {
        self.stdev_with_options(&options())
    }

    pub fn stdev_with_options(&self, options: &EngineOptions) -> Result<f64, ColumnError> {
        Ok(self.var_with_options(options)?.sqrt())
    }

    /// Mean absolute deviation from the mean.
    pub fn mad(&self) -> Result<f64, ColumnError> {
        self.centered("mad", &options())?.abs()?.mean()
    }

    pub fn skewness(&self) -> Result<f64, ColumnError> {
        let centered = self.centered("skewness", &options())?;
        let spread = centered.square()?.mean()?.sqrt();
        Ok(centered.cube()?.mean()? / spread.powi(3))
    }

    /// Excess kurtosis.
    pub fn kurtosis(&self) -> Result<f64, ColumnError> {
        let centered = self.centered("kurtosis", &options())?;
        let var = centered.square()?.mean()?;
        Ok(centered.pow(4.0)?.mean()? / (var * var) - 3.0)
    }

    pub fn cov(&self, other: &Self) -> Result<f64, ColumnError> {
        self.cov_with_options(other, &options())
    }

    pub fn cov_with_options(&self, other: &Self, options: &EngineOptions) -> Result<f64, ColumnError> {
        self.check_same_len(other)?;
        let left = self.centered("cov", options)?;
        let right = other.centered("cov", options)?;
        left.binary_numeric_with_options(&right, ArithmeticOp::Mul, options)?
            .mean()
    }

    /// Pearson correlation.
    pub fn corr(&self, other: &Self) -> Result<f64, ColumnError> {
        let options = options();
        let cov = self.cov_with_options(other, &options)?;
        Ok(cov / (self.stdev_with_options(&options)? * other.stdev_with_options(&options)?))
    }

    pub fn dot(&self, other: &Self) -> Result<f64, ColumnError> {
        let options = options();
        self.promoted("dot", &options)?
            .binary_numeric_with_options(&other.promoted("dot", &options)?, ArithmeticOp::Mul, &options)?
            .sum()
    }

    /// Minkowski distance of order `p`.
    pub fn distance(&self, other: &Self, p: f64) -> Result<f64, ColumnError> {
        if p.is_nan() || p <= 0.0 {
            return Err(ColumnError::InvalidArgument(format!(
                "distance order must be positive, got {p}"
            )));
        }
        let options = options();
        let diff = self.promoted("distance", &options)?.binary_numeric_with_options(
            &other.promoted("distance", &options)?,
            ArithmeticOp::Sub,
            &options,
        )?;
        Ok(diff.abs()?.pow(p)?.sum()?.powf(p.recip()))
    }

    // ── Counting ───────────────────────────────────────────────────────

    /// Occurrences of each distinct value, in first-seen order.
    #[must_use]
    pub fn counts(&self) -> Vec<(Scalar, usize)> {
        let mut counted: Vec<(Scalar, usize)> = Vec::new();
        let mut slots: BTreeMap<ScalarKey, usize> = BTreeMap::new();
        for value in self.iter() {
            let key = ScalarKey::of(&value);
            match slots.get(&key) {
                Some(&slot) => counted[slot].1 += 1,
                None => {
                    slots.insert(key, counted.len());
                    counted.push((value, 1));
                }
            }
        }
        counted
    }

    /// Relative frequency of each distinct value, in first-seen order.
    #[must_use]
    pub fn ps(&self) -> Vec<(Scalar, f64)> {
        let total = self.len() as f64;
        self.counts()
            .into_iter()
            .map(|(value, count)| (value, count as f64 / total))
            .collect()
    }

    /// Most frequent value, earliest on ties; `Null` for an empty column.
    #[must_use]
    pub fn mode(&self) -> Scalar {
        let mut best: Option<(Scalar, usize)> = None;
        for (value, count) in self.counts() {
            if best.as_ref().is_none_or(|(_, top)| count > *top) {
                best = Some((value, count));
            }
        }
        best.map_or(Scalar::Null, |(value, _)| value)
    }

    /// Distinct values in first-seen order.
    #[must_use]
    pub fn unique(&self) -> Self {
        let mut seen = BTreeSet::new();
        let firsts: Vec<usize> = self
            .iter()
            .enumerate()
            .filter_map(|(idx, value)| seen.insert(ScalarKey::of(&value)).then_some(idx))
            .collect();
        self.gather(&firsts)
    }

    /// Index of the element scoring highest under `score`; NaN scores never win.
    pub fn arg_max<F: FnMut(&Scalar) -> f64>(&self, score: F) -> Option<usize> {
        self.arg_best(score, |candidate, best| candidate > best)
    }

    pub fn arg_min<F: FnMut(&Scalar) -> f64>(&self, score: F) -> Option<usize> {
        self.arg_best(score, |candidate, best| candidate < best)
    }

    fn arg_best<F, B>(&self, mut score: F, beats: B) -> Option<usize>
    where
        F: FnMut(&Scalar) -> f64,
        B: Fn(f64, f64) -> bool,
    {
        let mut best: Option<(usize, f64)> = None;
        for (idx, value) in self.iter().enumerate() {
            let s = score(&value);
            if s.is_nan() {
                continue;
            }
            if best.is_none_or(|(_, top)| beats(s, top)) {
                best = Some((idx, s));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// `n` largest values, largest first.
    #[must_use]
    pub fn n_largest(&self, n: usize) -> Self {
        self.drop_nan().sorted(SortOrder::Desc).head(n)
    }

    /// `n` smallest values, smallest first.
    #[must_use]
    pub fn n_smallest(&self, n: usize) -> Self {
        self.drop_nan().sorted(SortOrder::Asc).head(n)
    }

    // ── Elementwise transforms ─────────────────────────────────────────

    /// Absolute values; signed kinds move to the unsigned kind of the same width.
    pub fn abs(&self) -> Result<Self, ColumnError> {
        if !self.is_numeric() {
            return Err(self.unsupported("abs"));
        }
        if self.dtype().is_unsigned() {
            return Ok(self.clone());
        }
        let target = match self.dtype() {
            DType::I8 => DType::U8,
            DType::I16 => DType::U16,
            DType::I32 => DType::U32,
            other => other,
        };
        self.map_f64(f64::abs, Some(target))
    }

    fn rounding(&self, op: &'static str, f: fn(f64) -> f64) -> Result<Self, ColumnError> {
        if !self.is_numeric() {
            return Err(self.unsupported(op));
        }
        if self.dtype().is_integer() {
            return Ok(self.clone());
        }
        let out = self.map_f64(f, None)?;
        log::info!("{op} left a {} column holding integral values; downcast() narrows it", out.dtype());
        Ok(out)
    }

    pub fn round(&self) -> Result<Self, ColumnError> {
        self.rounding("round", f64::round)
    }

    pub fn trunc(&self) -> Result<Self, ColumnError> {
        self.rounding("trunc", f64::trunc)
    }

    pub fn floor(&self) -> Result<Self, ColumnError> {
        self.rounding("floor", f64::floor)
    }

    pub fn ceil(&self) -> Result<Self, ColumnError> {
        self.rounding("ceil", f64::ceil)
    }

    pub fn sqrt(&self) -> Result<Self, ColumnError> {
        self.map_f64(f64::sqrt, Some(self.float_dtype()))
    }

    pub fn cbrt(&self) -> Result<Self, ColumnError> {
        self.map_f64(f64::cbrt, Some(self.float_dtype()))
    }

    /// Elementwise power. Exponent 0 yields ones at the same dtype and
    /// exponent 1 a copy; anything else is computed in floating point.
    pub fn pow(&self, exponent: f64) -> Result<Self, ColumnError> {
        if !self.is_numeric() {
            return Err(self.unsupported("pow"));
        }
        if exponent == 0.0 {
            return Ok(Self::ones(self.len(), self.dtype()));
        }
        if exponent == 1.0 {
            return Ok(self.deep_clone(None));
        }
        self.map_f64(|v| v.powf(exponent), Some(self.float_dtype()))
    }

    pub fn square(&self) -> Result<Self, ColumnError> {
        self.pow(2.0)
    }

    pub fn cube(&self) -> Result<Self, ColumnError> {
        self.pow(3.0)
    }

    /// Clamp into `[lo, hi]`; an absent bound is unbounded. NaN stays NaN.
    pub fn clip(&self, lo: Option<f64>, hi: Option<f64>) -> Result<Self, ColumnError> {
        let lo = lo.unwrap_or(f64::NEG_INFINITY);
        let hi = hi.unwrap_or(f64::INFINITY);
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(ColumnError::InvalidArgument(format!(
                "clip bounds [{lo}, {hi}] are not ordered"
            )));
        }
        self.map_f64(|v| if v.is_nan() { v } else { v.clamp(lo, hi) }, None)
    }

    /// Clamp into `[q1, q3]`.
    pub fn clip_outliers(&self) -> Result<Self, ColumnError> {
        self.clip(Some(self.q1()?), Some(self.q3()?))
    }

    /// Keep only values inside `[q1, q3]`.
    pub fn remove_outliers(&self) -> Result<Self, ColumnError> {
        let (lo, hi) = (self.q1()?, self.q3()?);
        Ok(self.filter(|value, _| {
            let v = value.coerce_f64();
            v >= lo && v <= hi
        }))
    }

    /// Rescale into `[0, 1]`; a constant column maps to zeros.
    pub fn normalize(&self) -> Result<Self, ColumnError> {
        let (min, max) = (self.min()?, self.max()?);
        let range = max - min;
        let dtype = self.float_dtype();
        if range == 0.0 || !range.is_finite() {
            return self.map_f64(|v| if v.is_nan() { v } else { 0.0 }, Some(dtype));
        }
        self.map_f64(|v| (v - min) / range, Some(dtype))
    }

    /// Replace every occurrence of `from` with `to`. Numeric columns match
    /// within a small tolerance and widen when `to` does not fit.
    pub fn replace(&self, from: &Scalar, to: &Scalar) -> Result<Self, ColumnError> {
        if self.is_string() {
            let needle = scalar_text(from);
            let replacement = scalar_text(to);
            let values = self
                .to_strings()
                .into_iter()
                .map(|value| if value == needle { replacement.clone() } else { value })
                .collect();
            return Ok(Self::from_optional_strings(values));
        }

        let target = from.to_f64()?;
        let with = to.to_f64()?;
        let dtype = if self.dtype().is_float() || self.dtype().can_hold(with) {
            self.dtype()
        } else {
            promote_dtypes(self.dtype(), infer_dtype(&[with], options().float_precision))?
        };
        self.map_f64(
            |v| {
                let hit = (v - target).abs() <= REPLACE_TOLERANCE || (v.is_nan() && target.is_nan());
                if hit { with } else { v }
            },
            Some(dtype),
        )
    }

    pub fn replace_substring(&self, pattern: &str, with: &str) -> Result<Self, ColumnError> {
        if !self.is_string() {
            return Err(self.unsupported("replace_substring"));
        }
        let values = self
            .to_strings()
            .into_iter()
            .map(|value| value.map(|text| text.replace(pattern, with)))
            .collect();
        Ok(Self::from_optional_strings(values))
    }

    /// Without NaN numbers or missing strings.
    #[must_use]
    pub fn drop_nan(&self) -> Self {
        self.filter(|value, _| !value.is_missing())
    }

    // ── Binning, differencing, smoothing ───────────────────────────────

    /// Quantile-style binning into `k` bins.
    ///
    /// Bin boundaries are taken at every `len / k`-th sorted value with the
    /// last one at +inf; each value gets the index of the first boundary it
    /// is strictly below. The boundaries are kept on the result.
    pub fn k_bins(&self, k: usize) -> Result<Self, ColumnError> {
        if k == 0 {
            return Err(ColumnError::InvalidArgument(
                "k_bins needs at least one bin".to_owned(),
            ));
        }
        let values = self.numeric_values("k_bins")?;
        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);

        let bin_size = values.len() / k;
        let mut bounds: Vec<f64> = (1..k)
            .map(|i| sorted.get(i * bin_size).copied().unwrap_or(f64::INFINITY))
            .collect();
        bounds.push(f64::INFINITY);

        let codes: Vec<f64> = values
            .iter()
            .map(|v| bounds.iter().position(|bound| v < bound).unwrap_or(k - 1) as f64)
            .collect();
        let dtype = infer_dtype(&[(k - 1) as f64], options().float_precision);
        let mut out = Self::from_f64_values(&codes, dtype);
        out.k_bins_bounds = Some(Arc::from(bounds));
        Ok(out)
    }

    /// Discrete difference applied `order` times; each pass is one shorter.
    pub fn dis_diff(&self, order: usize) -> Result<Self, ColumnError> {
        if order == 0 {
            return Ok(self.clone());
        }
        let values = self.numeric_values("dis_diff")?;
        let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
        Self::from_f64_values(&diffs, options().float_precision.dtype()).dis_diff(order - 1)
    }

    /// Moving average over `n` values. The first `n` positions wrap around
    /// the end of the column to fill their window.
    pub fn smooth(&self, n: usize) -> Result<Self, ColumnError> {
        if n == 0 {
            return Err(ColumnError::InvalidArgument(
                "smoothing window must hold at least one value".to_owned(),
            ));
        }
        let values = self.numeric_values("smooth")?;
        if n == 1 {
            return Ok(self.deep_clone(None));
        }
        let dtype = options().float_precision.dtype();
        let len = values.len();
        if len == 0 {
            return Ok(Self::empty(0, dtype));
        }
        let window = n as f64;
        let smoothed: Vec<f64> = (0..len)
            .map(|i| {
                if i < n {
                    (0..n).map(|j| values[(i + j) % len]).sum::<f64>() / window
                } else {
                    values[i - n..i].iter().sum::<f64>() / window
                }
            })
            .collect();
        Ok(Self::from_f64_values(&smoothed, dtype))
    }

    // ── Sampling ───────────────────────────────────────────────────────

    /// Draw `n` values, or a fraction of the length when `n < 1`.
    pub fn sample<R: RandomSource + ?Sized>(
        &self,
        n: f64,
        with_replacement: bool,
        rng: &mut R,
    ) -> Result<Self, ColumnError> {
        if !n.is_finite() || n < 0.0 {
            return Err(ColumnError::InvalidArgument(format!(
                "sample size must be a non-negative number, got {n}"
            )));
        }
        let len = self.len();
        let count = if n < 1.0 {
            (len as f64 * n).floor() as usize
        } else {
            n as usize
        };

        if with_replacement {
            if len == 0 && count > 0 {
                return Err(ColumnError::InvalidArgument(
                    "cannot sample from an empty column".to_owned(),
                ));
            }
            let picks: Vec<usize> = (0..count).map(|_| rng.index(len)).collect();
            return Ok(self.gather(&picks));
        }

        if count > len {
            return Err(ColumnError::InvalidArgument(format!(
                "cannot draw {count} distinct values from {len} without replacement"
            )));
        }
        let mut taken = vec![false; len];
        let mut picks = Vec::with_capacity(count);
        while picks.len() < count {
            let idx = rng.index(len);
            if !taken[idx] {
                taken[idx] = true;
                picks.push(idx);
            }
        }
        Ok(self.gather(&picks))
    }

    // ── Label encoding ─────────────────────────────────────────────────

    /// Replace strings by integer codes in first-seen order, keeping the
    /// mapping on the result for [`Column::label_decode`].
    pub fn label_encode(&self, hint: Option<DType>) -> Result<Self, ColumnError> {
        let ColumnData::Utf8(_) = &*self.data else {
            return Err(self.unsupported("label_encode"));
        };
        let mut map = LabelMap::default();
        let codes: Vec<f64> = self
            .to_strings()
            .iter()
            .map(|text| map.insert(text.as_deref()) as f64)
            .collect();

        let top = map.len().saturating_sub(1) as f64;
        let dtype = match hint {
            Some(dtype) if dtype.is_numeric() && dtype.can_hold(top) => dtype,
            Some(dtype) => {
                return Err(ColumnError::InvalidArgument(format!(
                    "{dtype} cannot hold {} label codes",
                    map.len()
                )));
            }
            None => infer_dtype(&[top], options().float_precision),
        };
        let mut out = Self::from_f64_values(&codes, dtype);
        out.label_map = Some(Arc::new(map));
        Ok(out)
    }

    /// Map codes back to their original strings.
    pub fn label_decode(&self) -> Result<Self, ColumnError> {
        let map = self.label_map.clone().ok_or(ColumnError::MissingLabelMap)?;
        let texts = self
            .numeric_values("label_decode")?
            .into_iter()
            .map(|code| {
                let label = if code >= 0.0 && code.fract() == 0.0 {
                    map.label(code as usize)
                } else {
                    None
                };
                label
                    .map(|text| text.map(str::to_owned))
                    .ok_or_else(|| ColumnError::InvalidArgument(format!("code {code} has no label")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_optional_strings(texts))
    }
}
