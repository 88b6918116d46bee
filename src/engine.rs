// src/engine.rs
use std::path::Path;

use chrono::Local;

use crate::config::{AppConfig, SinkPaths};
use crate::drivers::envelope::smooth_series;
use crate::drivers::{
    CalibratedChannel, EnvelopeProcessor, EnvelopeSeries, Figure, Pacer, PlotSeries, Plotter,
    PotentiostatError, SampleChannel, SeriesLoader, SimulatedCell, SleepPacer, WaveformGenerator,
};
use crate::recorder::{FileSink, SampleRecorder, Sink};
use crate::types::{Mode, Sample, Series};

const POTENTIAL_LABEL: &str = "Potential (V)";
const CURRENT_LABEL: &str = "Current (uA)";

/// Full run against the simulated cell: acquire, then analyse the run just recorded.
pub fn run(config: &AppConfig, plotter: &mut dyn Plotter) -> Result<(), PotentiostatError> {
    let year_month = Local::now().format("%Y-%m").to_string();
    let channel = CalibratedChannel::new(SimulatedCell::new(config.cell.clone()));
    let Some(paths) = acquire(config, channel, SleepPacer, &year_month)? else {
        return Ok(());
    };
    process_records(&paths.temporary, config.mode, config.smoothing_factor, plotter)?;
    Ok(())
}

/// Drives the configured waveform and records it. Returns `None` without
/// touching the channel when acquisition is disabled.
pub fn acquire<C: SampleChannel, P: Pacer>(
    config: &AppConfig,
    channel: C,
    pacer: P,
    year_month: &str,
) -> Result<Option<SinkPaths>, PotentiostatError> {
    config.validate()?;
    let Some(waveform) = config.waveform()? else {
        log::warn!("No mode is enabled, will not process data");
        return Ok(None);
    };
    std::fs::create_dir_all(&config.data_dir)?;
    let paths = config.sink_paths(year_month);

    // 清空临时文件，保证里面只有这一次的数据
    let mut temporary = FileSink::new(&paths.temporary);
    SampleRecorder::clear(&mut temporary)?;
    let sinks: Vec<Box<dyn Sink>> = vec![Box::new(FileSink::new(&paths.cumulative)), Box::new(temporary)];
    let mut recorder = SampleRecorder::new(config.device.clone(), sinks);

    log::info!("###### Starting {} acquisition on {} ######", waveform.name(), config.device);
    let summary = WaveformGenerator::with_pacer(channel, pacer).run(waveform, &mut recorder)?;
    log::info!(
        "{} samples ({} loops) of {} wave written to {}",
        summary.samples,
        summary.loops,
        summary.waveform,
        paths.temporary.display()
    );
    Ok(Some(paths))
}

/// Loads a record file and renders the figures for `mode`. Returns the number of figures.
pub fn process_records(
    path: &Path,
    mode: Mode,
    smoothing_factor: f64,
    plotter: &mut dyn Plotter,
) -> Result<usize, PotentiostatError> {
    let series = SeriesLoader::load(&FileSink::new(path))?;
    log::info!("{} samples loaded from {}", series.len(), path.display());
    let figures = analyse(&series, mode, smoothing_factor);
    for figure in &figures {
        plotter.render(figure)?;
    }
    Ok(figures.len())
}

/// Builds the figures for one captured run.
pub fn analyse(series: &Series, mode: Mode, smoothing_factor: f64) -> Vec<Figure> {
    if series.is_empty() {
        log::warn!("empty series, nothing to plot");
        return Vec::new();
    }
    let elapsed = series.elapsed_seconds();
    let dac: Vec<(f64, f64)> = elapsed
        .iter()
        .zip(series.iter())
        .map(|(t, s)| (*t, s.output_value))
        .collect();
    let adc: Vec<(f64, f64)> = elapsed
        .iter()
        .zip(series.iter())
        .map(|(t, s)| (*t, s.input_value))
        .collect();
    let potential_vs_time = time_figure("dac_vs_time", "DAC output", POTENTIAL_LABEL, vec![PlotSeries::new(Some("DAC"), dac)]);

    match mode {
        Mode::Triangular => {
            let current_vs_time = time_figure("adc_vs_time", "ADC input", CURRENT_LABEL, vec![PlotSeries::new(Some("ADC"), adc)]);
            let voltammogram = Figure {
                name: "current_vs_potential".into(),
                title: "Cyclic voltammogram".into(),
                x_label: POTENTIAL_LABEL.into(),
                y_label: CURRENT_LABEL.into(),
                series: vec![PlotSeries::new(None, smooth_series(series, smoothing_factor))],
            };
            vec![potential_vs_time, current_vs_time, voltammogram]
        }
        Mode::Square => {
            let frame = EnvelopeProcessor::new(smoothing_factor).filter(series);
            let origin = series.samples[0].timestamp;
            let on_time_axis = |samples: &[Sample]| -> Vec<(f64, f64)> {
                samples
                    .iter()
                    .map(|s| ((s.timestamp - origin).num_milliseconds() as f64 / 1000.0, s.input_value))
                    .collect()
            };
            let current_vs_time = time_figure(
                "adc_vs_time",
                "ADC input and change points",
                CURRENT_LABEL,
                vec![
                    PlotSeries::new(Some("ADC"), adc),
                    PlotSeries::new(Some("positive"), on_time_axis(&frame.positive)),
                    PlotSeries::new(Some("negative"), on_time_axis(&frame.negative)),
                ],
            );
            let envelope = Figure {
                name: "envelope_vs_potential".into(),
                title: "Square-wave voltammogram".into(),
                x_label: POTENTIAL_LABEL.into(),
                y_label: CURRENT_LABEL.into(),
                series: EnvelopeSeries::ALL
                    .into_iter()
                    .map(|kind| PlotSeries::new(Some(kind.name()), frame.points(kind)))
                    .collect(),
            };
            vec![potential_vs_time, current_vs_time, envelope]
        }
        Mode::Disabled => Vec::new(),
    }
}

fn time_figure(name: &str, title: &str, y_label: &str, series: Vec<PlotSeries>) -> Figure {
    Figure {
        name: name.into(),
        title: title.into(),
        x_label: "Time (s)".into(),
        y_label: y_label.into(),
        series,
    }
}
