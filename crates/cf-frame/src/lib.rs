#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cf_columnar::{Column, ColumnError, ComparisonOp, SortOrder, format_scalar};
use cf_runtime::{RandomSource, options};
use cf_types::{DType, Scalar, TypeError, unify_dtypes};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("column reference {0} does not resolve")]
    InvalidColumnReference(ColumnLabel),
    #[error("duplicate column name {0}")]
    DuplicateColumn(ColumnLabel),
    #[error("frame shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("operation {op} is not supported on column {column}")]
    UnsupportedOperation { op: String, column: ColumnLabel },
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Column identifier: integers address columns by position (negative from
/// the end), strings by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnLabel {
    Int64(i64),
    Utf8(String),
}

impl ColumnLabel {
    /// Index-style name: an integer, or a string made only of digits.
    #[must_use]
    pub fn is_digit_like(&self) -> bool {
        match self {
            Self::Int64(_) => true,
            Self::Utf8(name) => !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()),
        }
    }

    fn shifted(&self, offset: usize) -> Self {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        match self {
            Self::Int64(n) => Self::Int64(n.saturating_add(offset)),
            Self::Utf8(name) => match name.parse::<i64>() {
                Ok(n) => Self::Utf8(n.saturating_add(offset).to_string()),
                Err(_) => self.clone(),
            },
        }
    }

    fn suffixed(&self, count: usize) -> Self {
        Self::Utf8(format!("{self}{count}"))
    }
}

impl fmt::Display for ColumnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ColumnLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<i32> for ColumnLabel {
    fn from(value: i32) -> Self {
        Self::Int64(i64::from(value))
    }
}

impl From<usize> for ColumnLabel {
    fn from(value: usize) -> Self {
        Self::Int64(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for ColumnLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for ColumnLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

/// Input shapes accepted by [`DataFrame::new`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    /// Row-major values; every row must have the same width.
    Rows(Vec<Vec<Scalar>>),
    /// Column-major values.
    Columns(Vec<Vec<Scalar>>),
    /// Key/value pairs, producing `Key` and `Value` columns.
    Map(Vec<(Scalar, Scalar)>),
    /// Named columns.
    Object(Vec<(String, Vec<Scalar>)>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindFilter {
    #[default]
    All,
    Numeric,
    Utf8,
}

impl KindFilter {
    #[must_use]
    pub fn accepts(self, column: &Column) -> bool {
        match self {
            Self::All => true,
            Self::Numeric => column.is_numeric(),
            Self::Utf8 => column.is_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Rows,
    Columns,
}

fn normalize_position(position: i64, len: usize) -> Option<usize> {
    let len = i128::try_from(len).ok()?;
    let position = i128::from(position);
    let normalized = if position < 0 { len + position } else { position };
    if normalized < 0 || normalized >= len {
        return None;
    }
    usize::try_from(normalized).ok()
}

fn default_labels(n: usize) -> Vec<ColumnLabel> {
    (0..n).map(ColumnLabel::from).collect()
}

fn rows_to_columns(rows: Vec<Vec<Scalar>>) -> Result<Vec<Vec<Scalar>>, FrameError> {
    let width = rows.first().map_or(0, Vec::len);
    let mut columns: Vec<Vec<Scalar>> = (0..width).map(|_| Vec::with_capacity(rows.len())).collect();
    for (idx, row) in rows.into_iter().enumerate() {
        if row.len() != width {
            return Err(FrameError::ShapeMismatch(format!(
                "row {idx} has {} values, expected {width}",
                row.len()
            )));
        }
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }
    Ok(columns)
}

/// Rename later duplicates by appending 2, 3, … until every name is unique.
fn dedupe_names(names: &mut [ColumnLabel]) {
    loop {
        let mut renamed = false;
        for i in 0..names.len() {
            let mut count = 2;
            for j in (i + 1)..names.len() {
                if names[j] == names[i] {
                    names[j] = names[j].suffixed(count);
                    renamed = true;
                    count += 1;
                }
            }
        }
        if !renamed {
            break;
        }
    }
}

// ── Dispatch tables ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodKind {
    Any,
    Numeric,
    Utf8,
}

impl MethodKind {
    fn accepts(self, column: &Column) -> bool {
        match self {
            Self::Any => true,
            Self::Numeric => column.is_numeric(),
            Self::Utf8 => column.is_string(),
        }
    }
}

struct ColumnMethod {
    name: &'static str,
    kind: MethodKind,
    apply: fn(&Column, &[Scalar]) -> Result<Column, ColumnError>,
}

struct Aggregation {
    name: &'static str,
    kind: MethodKind,
    apply: fn(&Column) -> Result<Scalar, ColumnError>,
}

fn arg<'a>(args: &'a [Scalar], idx: usize, op: &str) -> Result<&'a Scalar, ColumnError> {
    args.get(idx)
        .ok_or_else(|| ColumnError::InvalidArgument(format!("{op} expects argument #{idx}")))
}

fn arg_f64(args: &[Scalar], idx: usize, op: &str) -> Result<f64, ColumnError> {
    Ok(arg(args, idx, op)?.to_f64()?)
}

fn opt_f64(args: &[Scalar], idx: usize) -> Result<Option<f64>, ColumnError> {
    match args.get(idx) {
        None | Some(Scalar::Null) => Ok(None),
        Some(value) => Ok(Some(value.to_f64()?)),
    }
}

fn arg_usize(args: &[Scalar], idx: usize, op: &str) -> Result<usize, ColumnError> {
    let value = arg_f64(args, idx, op)?;
    if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
        return Err(ColumnError::InvalidArgument(format!(
            "{op} expects a non-negative integer, got {value}"
        )));
    }
    Ok(value as usize)
}

fn arg_str<'a>(args: &'a [Scalar], idx: usize, op: &str) -> Result<&'a str, ColumnError> {
    arg(args, idx, op)?
        .as_str()
        .ok_or_else(|| ColumnError::InvalidArgument(format!("{op} expects a string argument #{idx}")))
}

fn opt_dtype(args: &[Scalar], idx: usize) -> Result<Option<DType>, ColumnError> {
    match args.get(idx) {
        None | Some(Scalar::Null) => Ok(None),
        Some(Scalar::Utf8(token)) => Ok(Some(token.parse::<DType>()?)),
        Some(other) => Err(ColumnError::InvalidArgument(format!(
            "expected a dtype token, got {other}"
        ))),
    }
}

fn arg_order(args: &[Scalar], idx: usize) -> Result<SortOrder, ColumnError> {
    match args.get(idx).and_then(Scalar::as_str) {
        None | Some("asc") => Ok(SortOrder::Asc),
        Some("desc" | "des") => Ok(SortOrder::Desc),
        Some(other) => Err(ColumnError::InvalidArgument(format!(
            "unknown sort order {other}"
        ))),
    }
}

/// Column operations reachable through [`DataFrame::call`]. Every entry
/// preserves the column length.
const COLUMN_METHODS: &[ColumnMethod] = &[
    ColumnMethod { name: "abs", kind: MethodKind::Numeric, apply: |c, _| c.abs() },
    ColumnMethod { name: "round", kind: MethodKind::Numeric, apply: |c, _| c.round() },
    ColumnMethod { name: "trunc", kind: MethodKind::Numeric, apply: |c, _| c.trunc() },
    ColumnMethod { name: "floor", kind: MethodKind::Numeric, apply: |c, _| c.floor() },
    ColumnMethod { name: "ceil", kind: MethodKind::Numeric, apply: |c, _| c.ceil() },
    ColumnMethod { name: "sqrt", kind: MethodKind::Numeric, apply: |c, _| c.sqrt() },
    ColumnMethod { name: "cbrt", kind: MethodKind::Numeric, apply: |c, _| c.cbrt() },
    ColumnMethod { name: "square", kind: MethodKind::Numeric, apply: |c, _| c.square() },
    ColumnMethod { name: "cube", kind: MethodKind::Numeric, apply: |c, _| c.cube() },
    ColumnMethod { name: "pow", kind: MethodKind::Numeric, apply: |c, a| c.pow(arg_f64(a, 0, "pow")?) },
    ColumnMethod { name: "normalize", kind: MethodKind::Numeric, apply: |c, _| c.normalize() },
    ColumnMethod {
        name: "clip",
        kind: MethodKind::Numeric,
        apply: |c, a| c.clip(opt_f64(a, 0)?, opt_f64(a, 1)?),
    },
    ColumnMethod { name: "clip_outliers", kind: MethodKind::Numeric, apply: |c, _| c.clip_outliers() },
    ColumnMethod { name: "downcast", kind: MethodKind::Numeric, apply: |c, _| c.downcast() },
    ColumnMethod { name: "k_bins", kind: MethodKind::Numeric, apply: |c, a| c.k_bins(arg_usize(a, 0, "k_bins")?) },
    ColumnMethod { name: "smooth", kind: MethodKind::Numeric, apply: |c, a| c.smooth(arg_usize(a, 0, "smooth")?) },
    ColumnMethod { name: "add", kind: MethodKind::Numeric, apply: |c, a| c.add_scalar(arg_f64(a, 0, "add")?) },
    ColumnMethod { name: "sub", kind: MethodKind::Numeric, apply: |c, a| c.sub_scalar(arg_f64(a, 0, "sub")?) },
    ColumnMethod { name: "mul", kind: MethodKind::Numeric, apply: |c, a| c.mul_scalar(arg_f64(a, 0, "mul")?) },
    ColumnMethod { name: "div", kind: MethodKind::Numeric, apply: |c, a| c.div_scalar(arg_f64(a, 0, "div")?) },
    ColumnMethod { name: "label_decode", kind: MethodKind::Numeric, apply: |c, _| c.label_decode() },
    ColumnMethod { name: "label_encode", kind: MethodKind::Utf8, apply: |c, a| c.label_encode(opt_dtype(a, 0)?) },
    ColumnMethod {
        name: "replace_substring",
        kind: MethodKind::Utf8,
        apply: |c, a| c.replace_substring(arg_str(a, 0, "replace_substring")?, arg_str(a, 1, "replace_substring")?),
    },
    ColumnMethod {
        name: "replace",
        kind: MethodKind::Any,
        apply: |c, a| c.replace(arg(a, 0, "replace")?, arg(a, 1, "replace")?),
    },
    ColumnMethod { name: "reverse", kind: MethodKind::Any, apply: |c, _| Ok(c.reversed()) },
    ColumnMethod { name: "sort", kind: MethodKind::Any, apply: |c, a| Ok(c.sorted(arg_order(a, 0)?)) },
    ColumnMethod {
        name: "cast",
        kind: MethodKind::Any,
        apply: |c, a| {
            let dtype = opt_dtype(a, 0)?
                .ok_or_else(|| ColumnError::InvalidArgument("cast expects a dtype token".to_owned()))?;
            Ok(c.cast(dtype))
        },
    },
    ColumnMethod { name: "clone", kind: MethodKind::Any, apply: |c, _| Ok(c.deep_clone(None)) },
];

fn float_agg(value: Result<f64, ColumnError>) -> Result<Scalar, ColumnError> {
    value.map(Scalar::Float64)
}

fn index_agg(idx: Option<usize>) -> Scalar {
    idx.and_then(|i| i64::try_from(i).ok())
        .map_or(Scalar::Null, Scalar::Int64)
}

/// Reductions reachable through [`DataFrame::agg`].
const AGGREGATIONS: &[Aggregation] = &[
    Aggregation { name: "mean", kind: MethodKind::Numeric, apply: |c| float_agg(c.mean()) },
    Aggregation { name: "median", kind: MethodKind::Numeric, apply: |c| float_agg(c.median()) },
    Aggregation { name: "q1", kind: MethodKind::Numeric, apply: |c| float_agg(c.q1()) },
    Aggregation { name: "q3", kind: MethodKind::Numeric, apply: |c| float_agg(c.q3()) },
    Aggregation { name: "var", kind: MethodKind::Numeric, apply: |c| float_agg(c.var()) },
    Aggregation { name: "stdev", kind: MethodKind::Numeric, apply: |c| float_agg(c.stdev()) },
    Aggregation { name: "mad", kind: MethodKind::Numeric, apply: |c| float_agg(c.mad()) },
    Aggregation { name: "min", kind: MethodKind::Numeric, apply: |c| float_agg(c.min()) },
    Aggregation { name: "max", kind: MethodKind::Numeric, apply: |c| float_agg(c.max()) },
    Aggregation { name: "range", kind: MethodKind::Numeric, apply: |c| float_agg(c.value_range()) },
    Aggregation { name: "iqr", kind: MethodKind::Numeric, apply: |c| float_agg(c.iqr()) },
    Aggregation { name: "skewness", kind: MethodKind::Numeric, apply: |c| float_agg(c.skewness()) },
    Aggregation { name: "kurtosis", kind: MethodKind::Numeric, apply: |c| float_agg(c.kurtosis()) },
    Aggregation { name: "sum", kind: MethodKind::Numeric, apply: |c| float_agg(c.sum()) },
    Aggregation { name: "diff", kind: MethodKind::Numeric, apply: |c| float_agg(c.sub_fold()) },
    Aggregation { name: "prod", kind: MethodKind::Numeric, apply: |c| float_agg(c.prod()) },
    Aggregation { name: "quot", kind: MethodKind::Numeric, apply: |c| float_agg(c.div_fold()) },
    Aggregation {
        name: "arg_max",
        kind: MethodKind::Any,
        apply: |c| Ok(index_agg(c.arg_max(Scalar::coerce_f64))),
    },
    Aggregation {
        name: "arg_min",
        kind: MethodKind::Any,
        apply: |c| Ok(index_agg(c.arg_min(Scalar::coerce_f64))),
    },
    Aggregation {
        name: "memory",
        kind: MethodKind::Any,
        apply: |c| Ok(Scalar::Int64(i64::try_from(c.memory()).unwrap_or(i64::MAX))),
    },
    Aggregation { name: "mode", kind: MethodKind::Any, apply: |c| Ok(c.mode()) },
    Aggregation { name: "dtype", kind: MethodKind::Any, apply: |c| Ok(Scalar::from(c.dtype().token())) },
];

// ── DataFrame ──────────────────────────────────────────────────────────

/// Named, ordered collection of equal-length columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    columns: Vec<Column>,
    names: Vec<ColumnLabel>,
}

impl DataFrame {
    /// Build from any [`FrameData`] shape. Missing names default to
    /// `0..n_cols` (`Key`/`Value` for maps); `dtypes` hints each column.
    pub fn new(
        data: FrameData,
        names: Option<Vec<ColumnLabel>>,
        dtypes: Option<Vec<DType>>,
    ) -> Result<Self, FrameError> {
        let (values, shape_names) = match data {
            FrameData::Rows(rows) => (rows_to_columns(rows)?, None),
            FrameData::Columns(columns) => (columns, None),
            FrameData::Map(pairs) => {
                let (keys, values): (Vec<Scalar>, Vec<Scalar>) = pairs.into_iter().unzip();
                (vec![keys, values], Some(vec!["Key".into(), "Value".into()]))
            }
            FrameData::Object(fields) => {
                let (labels, values): (Vec<String>, Vec<Vec<Scalar>>) = fields.into_iter().unzip();
                (values, Some(labels.into_iter().map(ColumnLabel::Utf8).collect()))
            }
        };

        if let Some(hints) = &dtypes
            && hints.len() != values.len()
        {
            return Err(FrameError::ShapeMismatch(format!(
                "{} dtype hints for {} columns",
                hints.len(),
                values.len()
            )));
        }
        let n_cols = values.len();
        let columns: Vec<Column> = values
            .into_iter()
            .enumerate()
            .map(|(idx, column)| {
                let hint = dtypes.as_ref().map(|hints| hints[idx]);
                Column::from_scalars(column, hint)
            })
            .collect();
        let names = names.or(shape_names).unwrap_or_else(|| default_labels(n_cols));
        log::debug!("built frame with {n_cols} columns");
        Self::from_parts(columns, names)
    }

    pub fn from_rows(rows: Vec<Vec<Scalar>>, names: Option<Vec<ColumnLabel>>) -> Result<Self, FrameError> {
        Self::new(FrameData::Rows(rows), names, None)
    }

    pub fn from_columns(columns: Vec<Column>, names: Option<Vec<ColumnLabel>>) -> Result<Self, FrameError> {
        let names = names.unwrap_or_else(|| default_labels(columns.len()));
        Self::from_parts(columns, names)
    }

    pub fn of(columns: Vec<Column>) -> Result<Self, FrameError> {
        Self::from_columns(columns, None)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            names: Vec::new(),
        }
    }

    fn from_parts(columns: Vec<Column>, names: Vec<ColumnLabel>) -> Result<Self, FrameError> {
        if columns.len() != names.len() {
            return Err(FrameError::ShapeMismatch(format!(
                "{} names for {} columns",
                names.len(),
                columns.len()
            )));
        }
        if let Some(first) = columns.first()
            && let Some((idx, bad)) = columns.iter().enumerate().find(|(_, c)| c.len() != first.len())
        {
            return Err(FrameError::ShapeMismatch(format!(
                "column {} has {} rows, expected {}",
                names[idx],
                bad.len(),
                first.len()
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = names.iter().find(|name| !seen.insert(*name)) {
            return Err(FrameError::DuplicateColumn(duplicate.clone()));
        }
        Ok(Self { columns, names })
    }

    fn pick(&self, indices: &[usize]) -> Self {
        Self {
            columns: indices.iter().map(|&idx| self.columns[idx].clone()).collect(),
            names: indices.iter().map(|&idx| self.names[idx].clone()).collect(),
        }
    }

    fn take_rows(&self, indices: &[usize]) -> Result<Self, FrameError> {
        let columns = self
            .columns
            .iter()
            .map(|column| column.take(indices))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_parts(columns, self.names.clone())
    }

    fn row_positions(&self) -> Vec<f64> {
        (0..self.len()).map(|idx| idx as f64).collect()
    }

    // ── Accessors ──────────────────────────────────────────────────────

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn names(&self) -> &[ColumnLabel] {
        &self.names
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn dtypes(&self) -> Vec<DType> {
        self.columns.iter().map(Column::dtype).collect()
    }

    pub fn column_index(&self, id: &ColumnLabel) -> Result<usize, FrameError> {
        let found = match id {
            ColumnLabel::Int64(position) => normalize_position(*position, self.n_cols()),
            ColumnLabel::Utf8(name) => self
                .names
                .iter()
                .position(|label| matches!(label, ColumnLabel::Utf8(n) if n == name)),
        };
        found.ok_or_else(|| FrameError::InvalidColumnReference(id.clone()))
    }

    fn resolve_all(&self, ids: &[ColumnLabel]) -> Result<Vec<usize>, FrameError> {
        let mut seen = BTreeSet::new();
        let mut indices = Vec::with_capacity(ids.len());
        for id in ids {
            let idx = self.column_index(id)?;
            if seen.insert(idx) {
                indices.push(idx);
            }
        }
        Ok(indices)
    }

    fn target_indices(
        &self,
        targets: Option<&[ColumnLabel]>,
        filter: KindFilter,
    ) -> Result<Vec<usize>, FrameError> {
        let candidates = match targets {
            Some(ids) => self.resolve_all(ids)?,
            None => (0..self.n_cols()).collect(),
        };
        Ok(candidates
            .into_iter()
            .filter(|&idx| filter.accepts(&self.columns[idx]))
            .collect())
    }

    pub fn col(&self, id: impl Into<ColumnLabel>) -> Result<&Column, FrameError> {
        let idx = self.column_index(&id.into())?;
        Ok(&self.columns[idx])
    }

    pub fn dtype(&self, id: impl Into<ColumnLabel>) -> Result<DType, FrameError> {
        Ok(self.col(id)?.dtype())
    }

    pub fn row(&self, idx: usize) -> Result<Vec<Scalar>, FrameError> {
        self.columns
            .iter()
            .map(|column| column.get(idx))
            .collect::<Option<Vec<_>>>()
            .ok_or(FrameError::Column(ColumnError::OutOfBounds {
                index: idx,
                len: self.len(),
            }))
    }

    #[must_use]
    pub fn rows(&self) -> Vec<Vec<Scalar>> {
        (0..self.len())
            .map(|idx| self.columns.iter().filter_map(|column| column.get(idx)).collect())
            .collect()
    }

    pub fn val(&self, row: usize, id: impl Into<ColumnLabel>) -> Result<Scalar, FrameError> {
        let column = self.col(id)?;
        column.get(row).ok_or(FrameError::Column(ColumnError::OutOfBounds {
            index: row,
            len: column.len(),
        }))
    }

    /// Sub-frame of the numeric columns.
    #[must_use]
    pub fn numeric(&self) -> Self {
        let indices: Vec<usize> = (0..self.n_cols())
            .filter(|&idx| self.columns[idx].is_numeric())
            .collect();
        self.pick(&indices)
    }

    /// Sub-frame of the string columns.
    #[must_use]
    pub fn nominal(&self) -> Self {
        let indices: Vec<usize> = (0..self.n_cols())
            .filter(|&idx| self.columns[idx].is_string())
            .collect();
        self.pick(&indices)
    }

    // ── Selection ──────────────────────────────────────────────────────

    /// Columns in the given order; repeated identifiers keep their first
    /// position.
    pub fn select<I, L>(&self, ids: I) -> Result<Self, FrameError>
    where
        I: IntoIterator<Item = L>,
        L: Into<ColumnLabel>,
    {
        let ids: Vec<ColumnLabel> = ids.into_iter().map(Into::into).collect();
        let indices = self.resolve_all(&ids)?;
        Ok(self.pick(&indices))
    }

    pub fn drop<I, L>(&self, ids: I) -> Result<Self, FrameError>
    where
        I: IntoIterator<Item = L>,
        L: Into<ColumnLabel>,
    {
        let ids: Vec<ColumnLabel> = ids.into_iter().map(Into::into).collect();
        let dropped: BTreeSet<usize> = self.resolve_all(&ids)?.into_iter().collect();
        let kept: Vec<usize> = (0..self.n_cols()).filter(|idx| !dropped.contains(idx)).collect();
        Ok(self.pick(&kept))
    }

    /// Append a column; the default name is its position.
    pub fn append_col(&self, column: Column, name: Option<ColumnLabel>) -> Result<Self, FrameError> {
        let mut columns = self.columns.clone();
        let mut names = self.names.clone();
        names.push(name.unwrap_or_else(|| ColumnLabel::from(self.n_cols())));
        columns.push(column);
        Self::from_parts(columns, names)
    }

    pub fn rename(&self, pairs: &[(ColumnLabel, ColumnLabel)]) -> Result<Self, FrameError> {
        let mut names = self.names.clone();
        for (old, new) in pairs {
            let idx = self.column_index(old)?;
            names[idx] = new.clone();
        }
        Self::from_parts(self.columns.clone(), names)
    }

    pub fn rename_all(&self, names: Vec<ColumnLabel>) -> Result<Self, FrameError> {
        Self::from_parts(self.columns.clone(), names)
    }

    /// Same row range from every column; negative bounds count from the end.
    #[must_use]
    pub fn slice(&self, lo: i64, hi: i64) -> Self {
        Self {
            columns: self.columns.iter().map(|column| column.slice(lo, hi)).collect(),
            names: self.names.clone(),
        }
    }

    /// Rows from several `[lo, hi)` ranges, concatenated. An odd count of
    /// bounds closes the last range at the end of the frame.
    pub fn slice_ranges(&self, bounds: &[i64]) -> Result<Self, FrameError> {
        if bounds.is_empty() {
            return Ok(self.copy());
        }
        let mut bounds = bounds.to_vec();
        if bounds.len() % 2 == 1 {
            bounds.push(i64::try_from(self.len()).unwrap_or(i64::MAX));
        }
        let mut parts = bounds.chunks(2).map(|pair| self.slice(pair[0], pair[1]));
        let first = parts.next().unwrap_or_else(|| self.slice(0, 0));
        parts.try_fold(first, |acc, part| acc.concat(&part, Axis::Rows))
    }

    /// Columns from inclusive `[from, to]` boundary pairs. An odd count of
    /// boundaries closes the last pair at the final column.
    pub fn slice_cols(&self, bounds: &[ColumnLabel]) -> Result<Self, FrameError> {
        if bounds.is_empty() || self.n_cols() == 0 {
            return Ok(self.copy());
        }
        let mut positions = bounds
            .iter()
            .map(|id| self.column_index(id))
            .collect::<Result<Vec<_>, _>>()?;
        if positions.len() % 2 == 1 {
            positions.push(self.n_cols() - 1);
        }
        let mut seen = BTreeSet::new();
        let indices: Vec<usize> = positions
            .chunks(2)
            .flat_map(|pair| pair[0].min(pair[1])..=pair[0].max(pair[1]))
            .filter(|idx| seen.insert(*idx))
            .collect();
        Ok(self.pick(&indices))
    }

    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let n = self.clamp_rows(n, "head");
        self.slice(0, i64::try_from(n).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let n = self.clamp_rows(n, "tail");
        let len = i64::try_from(self.len()).unwrap_or(i64::MAX);
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        self.slice(len - n, len)
    }

    fn clamp_rows(&self, n: usize, what: &str) -> usize {
        let len = self.len();
        if n > len {
            log::warn!("{what}({n}) requested on a frame of {len} rows; returning {len}");
            len
        } else {
            n
        }
    }

    // ── Dispatch ───────────────────────────────────────────────────────

    /// Apply the column operation `name` to the targeted columns (all when
    /// `targets` is `None`) that pass `filter`, replacing them in a new frame.
    /// A column that has no operation of that name fails the whole call.
    pub fn call(
        &self,
        targets: Option<&[ColumnLabel]>,
        name: &str,
        filter: KindFilter,
        args: &[Scalar],
    ) -> Result<Self, FrameError> {
        let method = COLUMN_METHODS.iter().find(|method| method.name == name);
        self.call_with(targets, filter, |label, column| match method {
            Some(method) if method.kind.accepts(column) => Ok((method.apply)(column, args)?),
            _ => Err(FrameError::UnsupportedOperation {
                op: name.to_owned(),
                column: label.clone(),
            }),
        })
    }

    pub fn call_with<F>(
        &self,
        targets: Option<&[ColumnLabel]>,
        filter: KindFilter,
        mut f: F,
    ) -> Result<Self, FrameError>
    where
        F: FnMut(&ColumnLabel, &Column) -> Result<Column, FrameError>,
    {
        let mut columns = self.columns.clone();
        for idx in self.target_indices(targets, filter)? {
            columns[idx] = f(&self.names[idx], &self.columns[idx])?;
        }
        Self::from_parts(columns, self.names.clone())
    }

    pub fn label_encode(&self, targets: Option<&[ColumnLabel]>) -> Result<Self, FrameError> {
        self.call(targets, "label_encode", KindFilter::Utf8, &[])
    }

    pub fn downcast(&self, targets: Option<&[ColumnLabel]>) -> Result<Self, FrameError> {
        self.call(targets, "downcast", KindFilter::Numeric, &[])
    }

    pub fn normalize(&self, targets: Option<&[ColumnLabel]>) -> Result<Self, FrameError> {
        self.call(targets, "normalize", KindFilter::Numeric, &[])
    }

    pub fn abs(&self, targets: Option<&[ColumnLabel]>) -> Result<Self, FrameError> {
        self.call(targets, "abs", KindFilter::Numeric, &[])
    }

    pub fn round(&self, targets: Option<&[ColumnLabel]>) -> Result<Self, FrameError> {
        self.call(targets, "round", KindFilter::Numeric, &[])
    }

    pub fn k_bins(&self, k: usize, targets: Option<&[ColumnLabel]>) -> Result<Self, FrameError> {
        let k = i64::try_from(k).unwrap_or(i64::MAX);
        self.call(targets, "k_bins", KindFilter::Numeric, &[Scalar::Int64(k)])
    }

    pub fn reverse(&self) -> Result<Self, FrameError> {
        let indices: Vec<usize> = (0..self.len()).rev().collect();
        self.take_rows(&indices)
    }

    // ── Aggregation ────────────────────────────────────────────────────

    /// One row per qualifying column: its name and the aggregate `name`.
    ///
    /// The values column is built from the results with dtype inference, so
    /// a text result among mostly numeric ones (a string column's `mode`)
    /// reads back as NaN.
    pub fn agg(&self, name: &str, filter: KindFilter) -> Result<Self, FrameError> {
        let aggregation = AGGREGATIONS.iter().find(|aggregation| aggregation.name == name);
        self.agg_with(name, filter, |label, column| match aggregation {
            Some(aggregation) if aggregation.kind.accepts(column) => Ok((aggregation.apply)(column)?),
            _ => Err(FrameError::UnsupportedOperation {
                op: name.to_owned(),
                column: label.clone(),
            }),
        })
    }

    pub fn agg_with<F>(&self, name: &str, filter: KindFilter, mut f: F) -> Result<Self, FrameError>
    where
        F: FnMut(&ColumnLabel, &Column) -> Result<Scalar, FrameError>,
    {
        let mut labels = Vec::new();
        let mut values = Vec::new();
        for idx in self.target_indices(None, filter)? {
            labels.push(Scalar::from(self.names[idx].to_string()));
            values.push(f(&self.names[idx], &self.columns[idx])?);
        }
        Self::from_parts(
            vec![
                Column::from_scalars(labels, Some(DType::Utf8)),
                Column::from_scalars(values, None),
            ],
            vec!["column".into(), name.into()],
        )
    }

    pub fn mean(&self) -> Result<Self, FrameError> {
        self.agg("mean", KindFilter::Numeric)
    }

    pub fn median(&self) -> Result<Self, FrameError> {
        self.agg("median", KindFilter::Numeric)
    }

    pub fn var(&self) -> Result<Self, FrameError> {
        self.agg("var", KindFilter::Numeric)
    }

    pub fn stdev(&self) -> Result<Self, FrameError> {
        self.agg("stdev", KindFilter::Numeric)
    }

    pub fn min(&self) -> Result<Self, FrameError> {
        self.agg("min", KindFilter::Numeric)
    }

    pub fn max(&self) -> Result<Self, FrameError> {
        self.agg("max", KindFilter::Numeric)
    }

    pub fn sum(&self) -> Result<Self, FrameError> {
        self.agg("sum", KindFilter::Numeric)
    }

    pub fn mode(&self) -> Result<Self, FrameError> {
        self.agg("mode", KindFilter::All)
    }

    // ── Reshaping ──────────────────────────────────────────────────────

    /// `Axis::Rows` stacks frames with the same column count pairwise;
    /// `Axis::Columns` places `other`'s columns to the right, shifting
    /// index-style names and suffixing duplicates.
    pub fn concat(&self, other: &Self, axis: Axis) -> Result<Self, FrameError> {
        match axis {
            Axis::Rows => {
                if self.n_cols() != other.n_cols() {
                    return Err(FrameError::ShapeMismatch(format!(
                        "cannot stack {} columns on {}",
                        other.n_cols(),
                        self.n_cols()
                    )));
                }
                let columns = self
                    .columns
                    .iter()
                    .zip(&other.columns)
                    .map(|(top, bottom)| top.concat(bottom))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::from_parts(columns, self.names.clone())
            }
            Axis::Columns => {
                let offset = self.n_cols();
                let shift = other.names.iter().all(ColumnLabel::is_digit_like);
                let mut names = self.names.clone();
                names.extend(other.names.iter().map(|name| {
                    if shift { name.shifted(offset) } else { name.clone() }
                }));
                dedupe_names(&mut names);
                let mut columns = self.columns.clone();
                columns.extend(other.columns.iter().cloned());
                Self::from_parts(columns, names)
            }
        }
    }

    pub fn filter<F>(&self, mut predicate: F) -> Result<Self, FrameError>
    where
        F: FnMut(&[Scalar], usize) -> bool,
    {
        let indices: Vec<usize> = self
            .rows()
            .iter()
            .enumerate()
            .filter_map(|(idx, row)| predicate(row, idx).then_some(idx))
            .collect();
        self.take_rows(&indices)
    }

    pub fn filter_col<F>(&self, id: impl Into<ColumnLabel>, mut predicate: F) -> Result<Self, FrameError>
    where
        F: FnMut(&Scalar) -> bool,
    {
        let column = self.col(id)?;
        let indices: Vec<usize> = column
            .iter()
            .enumerate()
            .filter_map(|(idx, value)| predicate(&value).then_some(idx))
            .collect();
        self.take_rows(&indices)
    }

    /// Rows where `column op value` holds.
    pub fn where_(
        &self,
        value: impl Into<Scalar>,
        id: impl Into<ColumnLabel>,
        op: ComparisonOp,
    ) -> Result<Self, FrameError> {
        let mask = self.col(id)?.compare_scalar(&value.into(), op);
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect();
        self.take_rows(&indices)
    }

    /// Drop rows where any targeted column holds one of `values`.
    pub fn remove_all(&self, values: &[Scalar], targets: Option<&[ColumnLabel]>) -> Result<Self, FrameError> {
        let targeted = self.target_indices(targets, KindFilter::All)?;
        let indices: Vec<usize> = (0..self.len())
            .filter(|&row| {
                targeted.iter().all(|&c| {
                    self.columns[c]
                        .get(row)
                        .is_none_or(|value| !values.iter().any(|v| v.semantic_eq(&value)))
                })
            })
            .collect();
        self.take_rows(&indices)
    }

    /// Keep rows whose targeted numeric values all lie inside that column's
    /// `[q1, q3]`. NaN never marks a row as an outlier.
    pub fn drop_outliers(&self, targets: Option<&[ColumnLabel]>) -> Result<Self, FrameError> {
        let bounds = self
            .target_indices(targets, KindFilter::Numeric)?
            .into_iter()
            .map(|idx| {
                let column = &self.columns[idx];
                Ok((idx, column.q1()?, column.q3()?))
            })
            .collect::<Result<Vec<_>, ColumnError>>()?;
        let indices: Vec<usize> = (0..self.len())
            .filter(|&row| {
                bounds.iter().all(|&(idx, lo, hi)| {
                    self.columns[idx]
                        .get_f64(row)
                        .is_none_or(|v| v.is_nan() || (lo..=hi).contains(&v))
                })
            })
            .collect();
        self.take_rows(&indices)
    }

    /// Rows ordered by one column; descending is the exact reverse of
    /// ascending.
    pub fn sort(&self, id: impl Into<ColumnLabel>, order: SortOrder) -> Result<Self, FrameError> {
        let keys = self.col(id)?.to_scalars();
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]));
        if order == SortOrder::Desc {
            indices.reverse();
        }
        self.take_rows(&indices)
    }

    pub fn sort_by<F>(&self, mut compare: F) -> Result<Self, FrameError>
    where
        F: FnMut(&[Scalar], &[Scalar]) -> std::cmp::Ordering,
    {
        let rows = self.rows();
        let mut indices: Vec<usize> = (0..rows.len()).collect();
        indices.sort_by(|&a, &b| compare(&rows[a], &rows[b]));
        self.take_rows(&indices)
    }

    pub fn shuffle<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Result<Self, FrameError> {
        let order = Column::from_f64_values(&self.row_positions(), DType::U32).shuffled(rng);
        let indices: Vec<usize> = order.to_f64_vec()?.into_iter().map(|p| p as usize).collect();
        self.take_rows(&indices)
    }

    /// Rows drawn at random; `n < 1` is a fraction of the row count and a
    /// request for every row is lowered to `len - 1`.
    pub fn sample<R: RandomSource + ?Sized>(
        &self,
        n: f64,
        with_replacement: bool,
        rng: &mut R,
    ) -> Result<Self, FrameError> {
        let len = self.len() as f64;
        let n = if n >= 1.0 && n >= len {
            log::warn!("sample({n}) requested on a frame of {len} rows; drawing {}", (len - 1.0).max(0.0));
            (len - 1.0).max(0.0)
        } else {
            n
        };
        let picks = Column::from_f64_values(&self.row_positions(), DType::U32)
            .sample(n, with_replacement, rng)?;
        let indices: Vec<usize> = picks.to_f64_vec()?.into_iter().map(|p| p as usize).collect();
        self.take_rows(&indices)
    }

    /// Rows become columns, all stored at one dtype: `dtype` or the
    /// unification of every column's dtype.
    pub fn transpose(&self, dtype: Option<DType>) -> Result<Self, FrameError> {
        let Some(unified) = dtype.or_else(|| self.columns.iter().map(Column::dtype).reduce(unify_dtypes)) else {
            return Ok(Self::empty());
        };
        log::info!("transposing {} x {} frame", self.len(), self.n_cols());
        let columns: Vec<Column> = self
            .rows()
            .into_iter()
            .map(|row| Column::from_scalars(row, Some(unified)))
            .collect();
        Self::from_columns(columns, None)
    }

    /// Pairwise Pearson correlations of the numeric columns.
    pub fn corr_matrix(&self) -> Result<Vec<Vec<f64>>, FrameError> {
        let numeric: Vec<&Column> = self.columns.iter().filter(|c| c.is_numeric()).collect();
        let n = numeric.len();
        let mut memo: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut matrix = vec![vec![1.0; n]; n];
        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                if i == j {
                    continue;
                }
                let key = (i.min(j), i.max(j));
                *cell = match memo.get(&key) {
                    Some(value) => *value,
                    None => {
                        let value = numeric[i].corr(numeric[j])?;
                        memo.insert(key, value);
                        value
                    }
                };
            }
        }
        Ok(matrix)
    }

    /// Correlation matrix as a frame with a leading `column` name column.
    pub fn corr(&self) -> Result<Self, FrameError> {
        let matrix = self.corr_matrix()?;
        let numeric_names: Vec<ColumnLabel> = self
            .names
            .iter()
            .zip(&self.columns)
            .filter(|(_, column)| column.is_numeric())
            .map(|(name, _)| name.clone())
            .collect();
        let mut columns = vec![Column::from_strings(numeric_names.iter().map(ToString::to_string))];
        for j in 0..matrix.len() {
            let values: Vec<f64> = matrix.iter().map(|row| row[j]).collect();
            columns.push(Column::from_f64_values(&values, DType::F64));
        }
        let mut names = vec![ColumnLabel::from("column")];
        names.extend(numeric_names);
        dedupe_names(&mut names);
        Self::from_parts(columns, names)
    }

    /// The `n` numeric columns scoring highest under aggregation `agg`.
    pub fn n_best(&self, n: usize, agg: &str) -> Result<Self, FrameError> {
        let numeric: Vec<usize> = self.target_indices(None, KindFilter::Numeric)?;
        if numeric.is_empty() {
            return Ok(self.pick(&[]));
        }
        let scores = self.agg(agg, KindFilter::Numeric)?;
        let n = if n > numeric.len() {
            log::warn!("n_best({n}) requested on {} numeric columns", numeric.len());
            numeric.len()
        } else {
            n
        };
        let values = scores.columns[1].to_f64_vec()?;
        let mut ranked: Vec<(usize, f64)> = numeric.into_iter().zip(values).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let indices: Vec<usize> = ranked.into_iter().take(n).map(|(idx, _)| idx).collect();
        Ok(self.pick(&indices))
    }

    /// Count table of one column: its distinct values and a `count` column.
    pub fn counts(&self, id: impl Into<ColumnLabel>) -> Result<Self, FrameError> {
        let id = id.into();
        let idx = self.column_index(&id)?;
        let pairs = self.columns[idx]
            .counts()
            .into_iter()
            .map(|(value, count)| (value, Scalar::Int64(i64::try_from(count).unwrap_or(i64::MAX))))
            .collect();
        Self::new(
            FrameData::Map(pairs),
            Some(vec![self.names[idx].clone(), "count".into()]),
            None,
        )
    }

    /// One `u8` indicator column per code of an integer-coded column.
    pub fn one_hot(&self, id: impl Into<ColumnLabel>) -> Result<Self, FrameError> {
        let codes = self.col(id)?.to_f64_vec()?;
        if let Some(bad) = codes.iter().find(|c| **c < 0.0 || c.fract() != 0.0 || c.is_nan()) {
            return Err(ColumnError::InvalidArgument(format!(
                "one_hot needs non-negative integer codes, found {bad}"
            ))
            .into());
        }
        let k = codes.iter().fold(0.0_f64, |acc, c| acc.max(*c + 1.0)) as usize;
        let mut columns: Vec<Column> = (0..k).map(|_| Column::empty(codes.len(), DType::U8)).collect();
        for (row, code) in codes.iter().enumerate() {
            columns[*code as usize].set_value(row, 1)?;
        }
        Self::of(columns)
    }

    /// Per-column dtype and basic statistics; NaN for string columns.
    pub fn summary(&self) -> Result<Self, FrameError> {
        let mut stats: [Vec<f64>; 5] = Default::default();
        for column in &self.columns {
            let row = if column.is_numeric() {
                let (min, max) = (column.min()?, column.max()?);
                [min, max, max - min, column.mean()?, column.stdev()?]
            } else {
                [f64::NAN; 5]
            };
            for (target, value) in stats.iter_mut().zip(row) {
                target.push(value);
            }
        }
        let mut columns = vec![
            Column::from_strings(self.names.iter().map(ToString::to_string)),
            Column::from_strings(self.columns.iter().map(|c| c.dtype().token())),
        ];
        columns.extend(stats.iter().map(|values| Column::from_f64_values(values, DType::F64)));
        let names = ["column", "dtype", "min", "max", "range", "mean", "stdev"]
            .into_iter()
            .map(ColumnLabel::from)
            .collect();
        Self::from_parts(columns, names)
    }

    /// Shallow copy sharing every column buffer.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self {
            columns: self.columns.iter().map(|column| column.deep_clone(None)).collect(),
            names: self.names.clone(),
        }
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opts = options();
        let width = opts.min_col_width;
        let cell = |text: String| -> String {
            if text.chars().count() > width {
                let cut: String = text.chars().take(width.saturating_sub(2)).collect();
                format!("{cut}..")
            } else {
                format!("{text:>width$}")
            }
        };

        let header: Vec<String> = self.names.iter().map(|name| cell(name.to_string())).collect();
        writeln!(f, "{}", header.join(" "))?;
        let shown = self.len().min(opts.head_len);
        for row in 0..shown {
            let line: Vec<String> = self
                .columns
                .iter()
                .filter_map(|column| {
                    column
                        .get(row)
                        .map(|value| cell(format_scalar(&value, column.dtype(), opts.print_precision)))
                })
                .collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        if self.len() > shown {
            writeln!(f, "... {} more rows", self.len() - shown)?;
        }
        write!(f, "[{} rows x {} columns]", self.len(), self.n_cols())
    }
}

#[cfg(test)]
mod tests {
    use cf_columnar::{Column, ColumnError, ComparisonOp, SortOrder};
    use cf_runtime::StdRandom;
    use cf_types::{DType, Scalar};

    use super::{Axis, ColumnLabel, DataFrame, FrameData, FrameError, KindFilter};

    fn abc_rows() -> DataFrame {
        DataFrame::from_rows(
            vec![
                vec![1.into(), "a".into()],
                vec![2.into(), "b".into()],
                vec![3.into(), "c".into()],
            ],
            None,
        )
        .expect("rows frame")
    }

    fn people() -> DataFrame {
        DataFrame::new(
            FrameData::Object(vec![
                ("name".to_owned(), vec!["ann".into(), "bob".into(), "cy".into(), "dee".into()]),
                ("age".to_owned(), vec![31.into(), 25.into(), 40.into(), 25.into()]),
                ("score".to_owned(), vec![1.5.into(), (-2.0).into(), 3.0.into(), 0.5.into()]),
            ]),
            None,
            None,
        )
        .expect("object frame")
    }

    fn f64s(column: &Column) -> Vec<f64> {
        column.to_f64_vec().expect("numeric column")
    }

    fn labels(items: &[&str]) -> Vec<ColumnLabel> {
        items.iter().map(|s| ColumnLabel::from(*s)).collect()
    }

    #[test]
    fn rows_construct_with_index_names() {
        let df = abc_rows();
        assert_eq!(df.len(), 3);
        assert_eq!(df.n_cols(), 2);
        assert_eq!(df.names(), &[ColumnLabel::Int64(0), ColumnLabel::Int64(1)]);
        let text = df.select([1]).expect("select");
        assert_eq!(text.n_cols(), 1);
        assert_eq!(text.dtypes(), vec![DType::Utf8]);
        assert_eq!(
            text.columns()[0].to_strings(),
            vec![Some("a".to_owned()), Some("b".to_owned()), Some("c".to_owned())]
        );
        assert_eq!(df.slice(0, 2).len(), 2);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = DataFrame::from_rows(vec![vec![1.into(), 2.into()], vec![3.into()]], None)
            .expect_err("ragged");
        assert!(matches!(err, FrameError::ShapeMismatch(_)));
        let err = DataFrame::of(vec![Column::of([1, 2]), Column::of([1])]).expect_err("unequal");
        assert!(matches!(err, FrameError::ShapeMismatch(_)));
    }

    #[test]
    fn map_and_hints() {
        let df = DataFrame::new(
            FrameData::Map(vec![("x".into(), 1.into()), ("y".into(), 2.into())]),
            None,
            Some(vec![DType::Utf8, DType::F32]),
        )
        .expect("map frame");
        assert_eq!(df.names(), labels(&["Key", "Value"]).as_slice());
        assert_eq!(df.dtype("Value").expect("resolves"), DType::F32);
        assert!(DataFrame::new(FrameData::Columns(vec![vec![1.into()]]), None, Some(vec![])).is_err());
    }

    #[test]
    fn column_resolution() {
        let df = people();
        assert_eq!(df.column_index(&(-1).into()).expect("negative"), 2);
        assert_eq!(df.column_index(&"age".into()).expect("name"), 1);
        assert_eq!(
            df.column_index(&3.into()),
            Err(FrameError::InvalidColumnReference(ColumnLabel::Int64(3)))
        );
        assert!(df.col("missing").is_err());
        assert_eq!(df.val(2, "age").expect("value"), Scalar::Int64(40));
        assert_eq!(df.row(1).expect("row")[0], Scalar::from("bob"));
        assert!(df.row(9).is_err());
    }

    #[test]
    fn select_dedupes_in_first_seen_order() {
        let df = people();
        let picked = df.select(["score", "name", "score"]).expect("select");
        assert_eq!(picked.names(), labels(&["score", "name"]).as_slice());
        let dropped = df.drop(["name"]).expect("drop");
        assert_eq!(dropped.names(), labels(&["age", "score"]).as_slice());
        assert_eq!(df.numeric().n_cols(), 2);
        assert_eq!(df.nominal().n_cols(), 1);
    }

    #[test]
    fn append_and_rename() {
        let df = people();
        let grown = df.append_col(Column::of([1, 2, 3, 4]), None).expect("append");
        assert_eq!(grown.names()[3], ColumnLabel::Int64(3));
        assert!(df.append_col(Column::of([1]), None).is_err());
        let renamed = df.rename(&[("age".into(), "years".into())]).expect("rename");
        assert_eq!(renamed.names()[1], ColumnLabel::from("years"));
        let clash = df.rename(&[("age".into(), "name".into())]).expect_err("duplicate");
        assert_eq!(clash, FrameError::DuplicateColumn("name".into()));
        assert!(df.rename_all(labels(&["a", "b"])).is_err());
    }

    #[test]
    fn multi_range_slicing() {
        let df = DataFrame::of(vec![Column::range(0.0, 10.0, 1.0).expect("range")]).expect("frame");
        let parts = df.slice_ranges(&[0, 2, 8]).expect("ranges");
        assert_eq!(f64s(&parts.columns()[0]), vec![0.0, 1.0, 8.0, 9.0]);
        assert_eq!(df.head(3).len(), 3);
        assert_eq!(df.tail(20).len(), 10);
        assert_eq!(f64s(&df.tail(2).columns()[0]), vec![8.0, 9.0]);

        let wide = people();
        let cols = wide.slice_cols(&["age".into()]).expect("cols");
        assert_eq!(cols.names(), labels(&["age", "score"]).as_slice());
        let pair = wide.slice_cols(&[0.into(), 1.into()]).expect("cols");
        assert_eq!(pair.n_cols(), 2);
    }

    #[test]
    fn vertical_concat_promotes_dtypes() {
        let top = DataFrame::of(vec![Column::from_f64_values(&[250.0, 251.0], DType::U8)]).expect("frame");
        let bottom = DataFrame::of(vec![Column::from_f64_values(&[-1.0, -2.0], DType::I8)]).expect("frame");
        let stacked = top.concat(&bottom, Axis::Rows).expect("concat");
        assert_eq!(stacked.dtypes(), vec![DType::I32]);
        assert_eq!(f64s(&stacked.columns()[0]), vec![250.0, 251.0, -1.0, -2.0]);
        let wide = DataFrame::of(vec![Column::of([1]), Column::of([2])]).expect("frame");
        assert!(top.concat(&wide, Axis::Rows).is_err());
    }

    #[test]
    fn horizontal_concat_renames() {
        let left = DataFrame::of(vec![Column::of([1]), Column::of([2])]).expect("frame");
        let right = DataFrame::of(vec![Column::of([3]), Column::of([4])]).expect("frame");
        let joined = left.concat(&right, Axis::Columns).expect("concat");
        assert_eq!(
            joined.names(),
            &[0.into(), 1.into(), 2.into(), ColumnLabel::Int64(3)]
        );

        let named = DataFrame::from_columns(vec![Column::of([1]), Column::of([2])], Some(labels(&["age", "pay"])))
            .expect("frame");
        let again = DataFrame::from_columns(vec![Column::of([3]), Column::of([4])], Some(labels(&["age", "x"])))
            .expect("frame");
        let joined = named.concat(&again, Axis::Columns).expect("concat");
        assert_eq!(joined.names(), labels(&["age", "pay", "age2", "x"]).as_slice());
    }

    #[test]
    fn call_dispatches_by_kind() {
        let df = people();
        let abs = df.abs(None).expect("abs on numeric columns");
        assert_eq!(f64s(abs.col("score").expect("col")), vec![1.5, 2.0, 3.0, 0.5]);
        assert_eq!(abs.col("name").expect("col"), df.col("name").expect("col"));

        let err = df.call(None, "abs", KindFilter::All, &[]).expect_err("string column");
        assert_eq!(
            err,
            FrameError::UnsupportedOperation {
                op: "abs".to_owned(),
                column: "name".into()
            }
        );
        assert_eq!(
            df.call(None, "frobnicate", KindFilter::All, &[]),
            Err(FrameError::UnsupportedOperation {
                op: "frobnicate".to_owned(),
                column: "name".into()
            })
        );
        assert!(df.call(None, "frobnicate", KindFilter::Utf8, &[]).is_err());
        let empty = DataFrame::empty().call(None, "frobnicate", KindFilter::All, &[]).expect("no targets");
        assert_eq!(empty.n_cols(), 0);

        let scaled = df
            .call(Some(&["age".into()]), "mul", KindFilter::All, &[Scalar::Int64(2)])
            .expect("mul");
        assert_eq!(f64s(scaled.col("age").expect("col")), vec![62.0, 50.0, 80.0, 50.0]);

        let encoded = df.label_encode(None).expect("encode");
        assert_eq!(encoded.dtype("name").expect("col"), DType::U8);
        let decoded = encoded
            .call(Some(&["name".into()]), "label_decode", KindFilter::All, &[])
            .expect("decode");
        assert_eq!(decoded.col("name").expect("col"), df.col("name").expect("col"));
    }

    #[test]
    fn call_with_and_arguments() {
        let df = people();
        let upper = df
            .call_with(None, KindFilter::Utf8, |_, column| {
                Ok(column.map(|v, _, _| Scalar::from(v.as_str().unwrap_or_default().to_uppercase()), None))
            })
            .expect("closure");
        assert_eq!(upper.val(0, "name").expect("value"), Scalar::from("ANN"));
        let err = df.call(None, "pow", KindFilter::Numeric, &[]).expect_err("missing arg");
        assert!(matches!(err, FrameError::Column(ColumnError::InvalidArgument(_))));
        let cast = df
            .call(Some(&["age".into()]), "cast", KindFilter::All, &["f32".into()])
            .expect("cast");
        assert_eq!(cast.dtype("age").expect("col"), DType::F32);
        let binned = df.k_bins(2, Some(&["age".into()])).expect("bins");
        assert_eq!(binned.dtype("age").expect("col"), DType::U8);
    }

    #[test]
    fn aggregation_tables() {
        let df = people();
        let means = df.mean().expect("mean");
        assert_eq!(means.names(), labels(&["column", "mean"]).as_slice());
        assert_eq!(means.len(), 2);
        assert_eq!(means.val(0, "column").expect("value"), Scalar::from("age"));
        assert_eq!(means.val(0, "mean").expect("value").coerce_f64(), 30.25);

        let dtypes = df.agg("dtype", KindFilter::All).expect("dtype");
        assert_eq!(dtypes.val(2, "dtype").expect("value"), Scalar::from("f32"));
        assert!(df.agg("mean", KindFilter::All).is_err());
        assert!(df.agg("nope", KindFilter::All).is_err());
        let modes = df.mode().expect("mode");
        assert_eq!(modes.len(), 3);
        let sums = df.sum().expect("sum");
        assert_eq!(sums.val(1, "sum").expect("value").coerce_f64(), 3.0);
    }

    #[test]
    fn aggregate_values_are_inferred_together() {
        let mut columns: Vec<Column> = (0..5).map(|_| Column::of([1, 1, 2])).collect();
        columns.push(Column::of(["x", "x", "y"]));
        let modes = DataFrame::of(columns).expect("frame").mode().expect("mode");
        assert!(modes.col("mode").expect("col").is_numeric());
        assert_eq!(modes.val(0, "mode").expect("value").coerce_f64(), 1.0);
        assert!(modes.val(5, "mode").expect("value").coerce_f64().is_nan());

        let mixed = people().mode().expect("mode");
        assert_eq!(mixed.dtype("mode").expect("col"), DType::Utf8);
        assert_eq!(mixed.val(1, "mode").expect("value"), Scalar::from("25"));
    }

    #[test]
    fn row_filters() {
        let df = people();
        let young = df.where_(30, "age", ComparisonOp::Lt).expect("where");
        assert_eq!(young.len(), 2);
        let positive = df.filter_col("score", |v| v.coerce_f64() > 0.0).expect("filter");
        assert_eq!(positive.len(), 3);
        let by_row = df.filter(|row, idx| idx > 0 && row[1].coerce_f64() > 24.0).expect("filter");
        assert_eq!(by_row.len(), 3);
        let removed = df.remove_all(&[Scalar::Int64(25)], None).expect("remove");
        assert_eq!(removed.len(), 2);
    }

    #[test]
    fn drop_outliers_keeps_the_interquartile_rows() {
        let df = DataFrame::of(vec![Column::of([1, 2, 3, 4, 100])]).expect("frame");
        let kept = df.drop_outliers(None).expect("outliers");
        assert_eq!(f64s(&kept.columns()[0]), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn sorting_rows() {
        let df = people();
        let asc = df.sort("score", SortOrder::Asc).expect("sort");
        assert_eq!(asc.val(0, "name").expect("value"), Scalar::from("bob"));
        let desc = df.sort("score", SortOrder::Desc).expect("sort");
        assert_eq!(desc, asc.reverse().expect("reverse"));
        let by_name_len = df
            .sort_by(|a, b| {
                let len = |row: &[Scalar]| row[0].as_str().map_or(0, str::len);
                len(a).cmp(&len(b))
            })
            .expect("sort");
        assert_eq!(by_name_len.val(0, "name").expect("value"), Scalar::from("cy"));
    }

    #[test]
    fn shuffle_and_sample_keep_shape() {
        let df = people();
        let mut rng = StdRandom::seeded(9);
        let shuffled = df.shuffle(&mut rng).expect("shuffle");
        assert_eq!(shuffled.len(), 4);
        let mut ages = f64s(shuffled.col("age").expect("col"));
        ages.sort_by(f64::total_cmp);
        assert_eq!(ages, vec![25.0, 25.0, 31.0, 40.0]);
        let half = df.sample(0.5, false, &mut rng).expect("sample");
        assert_eq!(half.len(), 2);
        assert_eq!(df.sample(10.0, false, &mut rng).expect("clamped").len(), 3);
        assert!(df.sample(-1.0, false, &mut rng).is_err());
    }

    #[test]
    fn transpose_unifies_dtypes() {
        let df = DataFrame::of(vec![
            Column::from_f64_values(&[1.0, 2.0], DType::U8),
            Column::from_f64_values(&[-3.0, 4.0], DType::I16),
        ])
        .expect("frame");
        let flipped = df.transpose(None).expect("transpose");
        assert_eq!(flipped.n_cols(), 2);
        assert_eq!(flipped.dtypes(), vec![DType::I32, DType::I32]);
        assert_eq!(f64s(&flipped.columns()[0]), vec![1.0, -3.0]);
        let text = abc_rows().transpose(None).expect("transpose");
        assert_eq!(text.dtypes(), vec![DType::Utf8; 3]);
    }

    #[test]
    fn corr_of_opposite_columns() {
        let df = DataFrame::of(vec![Column::of([1, 2, 3, 4]), Column::of([4, 3, 2, 1])]).expect("frame");
        let matrix = df.corr_matrix().expect("corr");
        let expected = [[1.0, -1.0], [-1.0, 1.0]];
        for (row, want) in matrix.iter().zip(expected) {
            for (got, want) in row.iter().zip(want) {
                assert!((got - want).abs() < 1e-9);
            }
        }
        let frame = df.corr().expect("corr frame");
        assert_eq!(frame.names()[0], ColumnLabel::from("column"));
        assert_eq!(frame.n_cols(), 3);
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn n_best_counts_and_one_hot() {
        let df = people();
        let best = df.n_best(1, "var").expect("n_best");
        assert_eq!(best.names(), labels(&["age"]).as_slice());
        assert_eq!(df.n_best(5, "var").expect("n_best").n_cols(), 2);
        assert_eq!(df.nominal().n_best(1, "var").expect("n_best").n_cols(), 0);

        let counts = df.counts("age").expect("counts");
        assert_eq!(counts.names(), &["age".into(), ColumnLabel::from("count")]);
        assert_eq!(counts.val(1, "count").expect("value"), Scalar::Int64(2));

        let codes = DataFrame::of(vec![Column::of([0, 2, 1])]).expect("frame");
        let hot = codes.one_hot(0).expect("one hot");
        assert_eq!(hot.n_cols(), 3);
        assert_eq!(f64s(&hot.columns()[2]), vec![0.0, 1.0, 0.0]);
        assert!(df.one_hot("score").is_err());
    }

    #[test]
    fn summary_covers_every_column() {
        let summary = people().summary().expect("summary");
        assert_eq!(summary.len(), 3);
        assert_eq!(summary.val(0, "dtype").expect("value"), Scalar::from("s"));
        assert!(summary.val(0, "mean").expect("value").coerce_f64().is_nan());
        assert_eq!(summary.val(1, "max").expect("value").coerce_f64(), 40.0);
    }

    #[test]
    fn copies_and_display() {
        let df = people();
        let shallow = df.copy();
        assert!(shallow.columns()[0].shares_buffer_with(&df.columns()[0]));
        let deep = df.deep_clone();
        assert!(!deep.columns()[0].shares_buffer_with(&df.columns()[0]));
        assert_eq!(deep, df);
        let rendered = df.to_string();
        assert!(rendered.contains("name"));
        assert!(rendered.ends_with("[4 rows x 3 columns]"));
    }
}
