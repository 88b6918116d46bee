use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use crate::drivers::PotentiostatError;
use crate::types::{Sample, TIMESTAMP_FORMAT};

/// On-disk shape of one sample, one JSON object per line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub device: String,
    pub timestamp: String,
    pub sensors: Sensors,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sensors {
    #[serde(rename = "DAC")]
    pub dac: f64,
    #[serde(rename = "ADC")]
    pub adc: f64,
}

/// Append-only, line-delimited record store.
pub trait Sink {
    fn append(&mut self, line: &str) -> Result<(), PotentiostatError>;
    fn truncate(&mut self) -> Result<(), PotentiostatError>;
    fn read_all(&self) -> Result<Vec<String>, PotentiostatError>;
}

pub struct FileSink {
    path: PathBuf,
    writer: Option<File>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), writer: None }
    }
}

impl Sink for FileSink {
    fn append(&mut self, line: &str) -> Result<(), PotentiostatError> {
        if self.writer.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            self.writer = Some(file);
        }
        if let Some(w) = &mut self.writer {
            // 整行一次写入，进程被终止时文件里只留下完整的记录
            w.write_all(format!("{line}\n").as_bytes())?;
            w.flush()?;
        }
        Ok(())
    }

    fn truncate(&mut self) -> Result<(), PotentiostatError> {
        File::create(&self.path)?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<String>, PotentiostatError> {
        let bytes = std::fs::read(&self.path)?;
        let mut lines = Vec::new();
        // 按字节切行，坏掉的一行只报告这一行
        for (idx, raw) in bytes.split(|b| *b == b'\n').enumerate() {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8(raw.to_vec()).map_err(|e| PotentiostatError::MalformedRecord {
                line: idx + 1,
                reason: e.to_string(),
            })?;
            lines.push(line);
        }
        if lines.last().is_some_and(String::is_empty) {
            lines.pop();
        }
        Ok(lines)
    }
}

/// Stamps (output, input) pairs and appends them to every configured sink.
pub struct SampleRecorder {
    device: String,
    sinks: Vec<Box<dyn Sink>>,
    last_stamp: Option<NaiveDateTime>,
}

impl SampleRecorder {
    pub fn new(device: impl Into<String>, sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { device: device.into(), sinks, last_stamp: None }
    }

    #[cfg(test)]
    pub fn sinks(&self) -> &[Box<dyn Sink>] {
        &self.sinks
    }

    /// Empties a sink so it holds exactly one run afterwards.
    pub fn clear(sink: &mut dyn Sink) -> Result<(), PotentiostatError> {
        sink.truncate()
    }

    pub fn record(&mut self, output_value: f64, input_value: f64) -> Result<Sample, PotentiostatError> {
        self.record_at(Local::now().naive_local(), output_value, input_value)
    }

    pub fn record_at(
        &mut self,
        timestamp: NaiveDateTime,
        output_value: f64,
        input_value: f64,
    ) -> Result<Sample, PotentiostatError> {
        let mut stamp = timestamp.trunc_subsecs(3);
        if let Some(last) = self.last_stamp {
            if stamp <= last {
                stamp = last + chrono::Duration::milliseconds(1);
            }
        }
        let record = Record {
            device: self.device.clone(),
            timestamp: stamp.format(TIMESTAMP_FORMAT).to_string(),
            sensors: Sensors { dac: output_value, adc: input_value },
        };
        let line = serde_json::to_string(&record)?;
        log::debug!("Data: {line}");
        for sink in &mut self.sinks {
            sink.append(&line)?;
        }
        self.last_stamp = Some(stamp);
        Ok(Sample { timestamp: stamp, output_value, input_value })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[derive(Default)]
    pub struct MemorySink {
        pub lines: Vec<String>,
    }

    impl Sink for MemorySink {
        fn append(&mut self, line: &str) -> Result<(), PotentiostatError> {
            self.lines.push(line.to_owned());
            Ok(())
        }

        fn truncate(&mut self) -> Result<(), PotentiostatError> {
            self.lines.clear();
            Ok(())
        }

        fn read_all(&self) -> Result<Vec<String>, PotentiostatError> {
            Ok(self.lines.clone())
        }
    }

    pub fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 14)
            .and_then(|d| d.and_hms_milli_opt(h, m, s, ms))
            .unwrap()
    }

    pub fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("potentiostat-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn record_line_has_fixed_shape() {
        let mut recorder = SampleRecorder::new("RodStat-test", vec![Box::new(MemorySink::default())]);
        recorder.record_at(at(10, 4, 5, 67), 0.25, -1.5).unwrap();
        let lines = recorder.sinks()[0].read_all().unwrap();
        assert_eq!(
            lines,
            vec![r#"{"device":"RodStat-test","timestamp":"2024-03-14 10:04:05.067","sensors":{"DAC":0.25,"ADC":-1.5}}"#]
        );
    }

    #[test]
    fn every_sink_receives_the_same_record() {
        let sinks: Vec<Box<dyn Sink>> = vec![Box::new(MemorySink::default()), Box::new(MemorySink::default())];
        let mut recorder = SampleRecorder::new("dev", sinks);
        recorder.record(0.1, 2.0).unwrap();
        recorder.record(0.2, 3.0).unwrap();
        let a = recorder.sinks()[0].read_all().unwrap();
        let b = recorder.sinks()[1].read_all().unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn stalled_clock_still_yields_increasing_timestamps() {
        let mut recorder = SampleRecorder::new("dev", vec![Box::new(MemorySink::default())]);
        let t = at(8, 0, 0, 999);
        let first = recorder.record_at(t, 0.0, 0.0).unwrap();
        let second = recorder.record_at(t, 0.1, 0.0).unwrap();
        let third = recorder.record_at(at(7, 0, 0, 0), 0.2, 0.0).unwrap();
        assert_eq!(first.timestamp, t);
        assert_eq!(second.timestamp, at(8, 0, 1, 0));
        assert_eq!(third.timestamp, at(8, 0, 1, 1));
    }

    #[test]
    fn file_sink_appends_and_clears() {
        let path = temp_path("file_sink_appends_and_clears.jsonl");
        let mut sink = FileSink::new(&path);
        sink.truncate().unwrap();
        sink.append("one").unwrap();
        sink.append("two").unwrap();
        assert_eq!(sink.read_all().unwrap(), vec!["one", "two"]);
        SampleRecorder::clear(&mut sink).unwrap();
        assert!(sink.read_all().unwrap().is_empty());
        sink.append("three").unwrap();
        assert_eq!(sink.read_all().unwrap(), vec!["three"]);
        std::fs::remove_file(path).ok();
    }
}
