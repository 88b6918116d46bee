// src/types.rs
use chrono::NaiveDateTime;
use serde::Deserialize;

/// Fixed textual timestamp layout of every persisted record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// 运行模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Triangular,
    Square,
    Disabled,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triangular" => Ok(Mode::Triangular),
            "square" => Ok(Mode::Square),
            "disabled" => Ok(Mode::Disabled),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// One acquisition: the potential driven and the current read back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub output_value: f64,
    pub input_value: f64,
}

/// Time-ordered run of samples, in the order they were appended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Series {
    pub samples: Vec<Sample>,
}

impl Series {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Seconds elapsed since the first sample, one entry per sample.
    pub fn elapsed_seconds(&self) -> Vec<f64> {
        let Some(first) = self.samples.first() else {
            return Vec::new();
        };
        self.samples
            .iter()
            .map(|s| (s.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0)
            .collect()
    }
}
