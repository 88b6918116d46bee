// src/config.rs
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::drivers::{CellModel, PotentiostatError, SquareConfig, TriangularConfig, WaveformKind};
use crate::types::Mode;

fn default_device() -> String {
    "RodStat-bb663b".to_owned()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_plot_dir() -> PathBuf {
    PathBuf::from("plots")
}

/// Everything a run needs, loaded before the hardware is touched.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub mode: Mode,
    pub smoothing_factor: f64,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_plot_dir")]
    pub plot_dir: PathBuf,
    pub triangular: Option<TriangularConfig>,
    pub square: Option<SquareConfig>,
    #[serde(default)]
    pub cell: CellModel,
}

/// Record files of one month: every run is appended to `cumulative`,
/// `temporary` only ever holds the latest run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkPaths {
    pub cumulative: PathBuf,
    pub temporary: PathBuf,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, PotentiostatError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, PotentiostatError> {
        let config: AppConfig = serde_json::from_str(text)
            .map_err(|e| PotentiostatError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PotentiostatError> {
        if !(self.smoothing_factor >= 0.0) || !self.smoothing_factor.is_finite() {
            return Err(PotentiostatError::Configuration(format!(
                "smoothing_factor must be a finite value >= 0, got {}",
                self.smoothing_factor
            )));
        }
        match self.mode {
            Mode::Triangular => self.triangular_section()?.validate(),
            Mode::Square => self.square_section()?.validate(),
            Mode::Disabled => Ok(()),
        }
    }

    /// Waveform for the selected mode, `None` when acquisition is disabled.
    pub fn waveform(&self) -> Result<Option<WaveformKind>, PotentiostatError> {
        Ok(match self.mode {
            Mode::Triangular => Some(WaveformKind::triangular(self.triangular_section()?.clone())),
            Mode::Square => Some(WaveformKind::square(self.square_section()?.clone())),
            Mode::Disabled => None,
        })
    }

    pub fn sink_paths(&self, year_month: &str) -> SinkPaths {
        SinkPaths {
            cumulative: self.data_dir.join(format!("raw-data-{year_month}.jsonl")),
            temporary: self.data_dir.join(format!("tmp-data-{year_month}.jsonl")),
        }
    }

    fn triangular_section(&self) -> Result<&TriangularConfig, PotentiostatError> {
        self.triangular.as_ref().ok_or_else(|| {
            PotentiostatError::Configuration("mode is triangular but no \"triangular\" section".into())
        })
    }

    fn square_section(&self) -> Result<&SquareConfig, PotentiostatError> {
        self.square.as_ref().ok_or_else(|| {
            PotentiostatError::Configuration("mode is square but no \"square\" section".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r#"{
        "mode": "square",
        "smoothing_factor": 2.0,
        "square": {
            "duty_cycle": 0.5, "freq_signal": 5, "freq_sample": 50,
            "amplitude": 0.5, "initial": 0.5, "final": -1.0, "offset": 0.05
        }
    }"#;

    #[test]
    fn square_config_with_defaults() {
        let config = AppConfig::from_json(SQUARE).unwrap();
        assert_eq!(config.mode, Mode::Square);
        assert_eq!(config.device, "RodStat-bb663b");
        assert_eq!(config.square.as_ref().unwrap().final_value, -1.0);
        assert!(matches!(config.waveform().unwrap(), Some(WaveformKind::Square(_))));
        let paths = config.sink_paths("2024-03");
        assert_eq!(paths.cumulative, PathBuf::from("data/raw-data-2024-03.jsonl"));
        assert_eq!(paths.temporary, PathBuf::from("data/tmp-data-2024-03.jsonl"));
    }

    #[test]
    fn missing_mode_section_fails_fast() {
        let err = AppConfig::from_json(r#"{"mode": "triangular", "smoothing_factor": 1.0}"#).unwrap_err();
        assert!(matches!(err, PotentiostatError::Configuration(_)));
    }

    #[test]
    fn inverted_triangular_range_is_rejected() {
        let text = r#"{
            "mode": "triangular", "smoothing_factor": 1.0,
            "triangular": {"initial": 0, "step": 0.1, "scan_rate": 0.1,
                           "max_loops": 1, "max_value": -1, "min_value": 1}
        }"#;
        assert!(matches!(
            AppConfig::from_json(text),
            Err(PotentiostatError::Configuration(_))
        ));
    }

    #[test]
    fn unknown_mode_and_negative_smoothing_are_rejected() {
        assert!(AppConfig::from_json(r#"{"mode": "sine", "smoothing_factor": 1.0}"#).is_err());
        assert!(AppConfig::from_json(r#"{"mode": "disabled", "smoothing_factor": -1.0}"#).is_err());
        let disabled = AppConfig::from_json(r#"{"mode": "disabled", "smoothing_factor": 0.0}"#).unwrap();
        assert!(disabled.waveform().unwrap().is_none());
    }
}
