#![forbid(unsafe_code)]

use std::sync::RwLock;

use cf_types::FloatPrecision;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-wide tunables consulted by inference, ingestion and display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Float width used whenever a result falls back to floating point.
    pub float_precision: FloatPrecision,
    /// Minimum share of numeric-looking strings for string ingestion to parse.
    pub parse_num_ratio: f64,
    pub head_len: usize,
    pub print_precision: usize,
    pub min_col_width: usize,
}

impl EngineOptions {
    pub const DEFAULT: Self = Self {
        float_precision: FloatPrecision::F64,
        parse_num_ratio: 0.8,
        head_len: 10,
        print_precision: 2,
        min_col_width: 10,
    };

    #[must_use]
    pub fn with_float_precision(mut self, precision: FloatPrecision) -> Self {
        self.float_precision = precision;
        self
    }

    #[must_use]
    pub fn with_parse_num_ratio(mut self, ratio: f64) -> Self {
        self.parse_num_ratio = ratio;
        self
    }

    #[must_use]
    pub fn with_head_len(mut self, head_len: usize) -> Self {
        self.head_len = head_len;
        self
    }

    #[must_use]
    pub fn with_print_precision(mut self, precision: usize) -> Self {
        self.print_precision = precision;
        self
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if !(0.0..=1.0).contains(&self.parse_num_ratio) {
            return Err(RuntimeError::InvalidOption(format!(
                "parse_num_ratio must lie in [0, 1], got {}",
                self.parse_num_ratio
            )));
        }
        if self.head_len == 0 {
            return Err(RuntimeError::InvalidOption(
                "head_len must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Parse options from a JSON document. Missing keys keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, RuntimeError> {
        let options: Self = serde_json::from_str(input)?;
        options.validate()?;
        Ok(options)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static OPTIONS: RwLock<EngineOptions> = RwLock::new(EngineOptions::DEFAULT);

/// Snapshot of the process-wide options.
#[must_use]
pub fn options() -> EngineOptions {
    match OPTIONS.read() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Replace the process-wide options, returning the previous value.
pub fn set_options(options: EngineOptions) -> Result<EngineOptions, RuntimeError> {
    options.validate()?;
    let mut guard = match OPTIONS.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let previous = *guard;
    *guard = options;
    log::debug!("engine options replaced: {options:?}");
    Ok(previous)
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid engine option: {0}")]
    InvalidOption(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ── Random source ──────────────────────────────────────────────────────

/// Uniform draws with `lo` inclusive and `hi` exclusive.
pub trait RandomSource {
    fn uniform_int(&mut self, lo: i64, hi: i64) -> i64;
    fn uniform_float(&mut self, lo: f64, hi: f64) -> f64;

    /// Uniform index in `[0, len)`.
    fn index(&mut self, len: usize) -> usize {
        let hi = i64::try_from(len).unwrap_or(i64::MAX);
        usize::try_from(self.uniform_int(0, hi)).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl RandomSource for StdRandom {
    fn uniform_int(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.rng.random_range(lo..hi)
    }

    fn uniform_float(&mut self, lo: f64, hi: f64) -> f64 {
        if lo.is_nan() || hi.is_nan() || hi <= lo {
            return lo;
        }
        self.rng.random_range(lo..hi)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn uniform_int(&mut self, lo: i64, hi: i64) -> i64 {
        (**self).uniform_int(lo, hi)
    }

    fn uniform_float(&mut self, lo: f64, hi: f64) -> f64 {
        (**self).uniform_float(lo, hi)
    }
}
