use chrono::NaiveDateTime;
use crate::drivers::PotentiostatError;
use crate::recorder::{Record, Sink};
use crate::types::{Sample, Series, TIMESTAMP_FORMAT};
// Older acquisition logs separate milliseconds with a colon.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S:%3f";
/// Parses a record timestamp in either the canonical or the legacy layout.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, LEGACY_TIMESTAMP_FORMAT))
        .ok()
}
/// Rebuilds a [`Series`] from a sink, trusting the append order.
pub struct SeriesLoader;
impl SeriesLoader {
    pub fn load(sink: &dyn Sink) -> Result<Series, PotentiostatError> {
        let lines = sink.read_all()?;
        Self::parse_lines(&lines)
    }
    pub fn parse_lines(lines: &[String]) -> Result<Series, PotentiostatError> {
        let mut samples = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: Record =
                serde_json::from_str(line).map_err(|e| PotentiostatError::MalformedRecord {
                    line: idx + 1,
                    reason: e.to_string(),
                })?;
            let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
                PotentiostatError::MalformedRecord {
                    line: idx + 1,
                    reason: format!("unparsable timestamp '{}'", record.timestamp),
                }
            })?;
            samples.push(Sample {
                timestamp,
                output_value: record.sensors.dac,
                input_value: record.sensors.adc,
            });
        }
        log::debug!("loaded {} samples", samples.len());
        Ok(Series::new(samples))
    }
}
