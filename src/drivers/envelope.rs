//! Envelope extraction for square-wave voltammetry.
//!
//! Raw square-wave captures hold several samples per plateau. Only the first
//! sample of each plateau (a change point) is kept, the change points are split
//! by current sign into an upper and a lower envelope, and both envelopes are
//! laid on a common potential axis, gap-filled, smoothed and differenced.
use crate::types::{Sample, Series};
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeSeries {
    Upper,
    Lower,
    Total,
}
impl EnvelopeSeries {
    pub const ALL: [EnvelopeSeries; 3] = [Self::Upper, Self::Lower, Self::Total];
    pub fn name(self) -> &'static str {
        match self {
            EnvelopeSeries::Upper => "upper_envelope",
            EnvelopeSeries::Lower => "lower_envelope",
            EnvelopeSeries::Total => "total",
        }
    }
}
/// One row of the long-form envelope table. `value` is absent where the
/// envelope had no data to interpolate from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopePoint {
    pub output_value: f64,
    pub series: EnvelopeSeries,
    pub value: Option<f64>,
}
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvelopeFrame {
    /// Long form, grouped by series (upper, lower, total), each in
    /// descending `output_value` order.
    pub interpolated: Vec<EnvelopePoint>,
    pub positive: Vec<Sample>,
    pub negative: Vec<Sample>,
}
impl EnvelopeFrame {
    /// Present points of one series as (potential, current) pairs.
    pub fn points(&self, series: EnvelopeSeries) -> Vec<(f64, f64)> {
        self.interpolated
            .iter()
            .filter(|p| p.series == series)
            .filter_map(|p| p.value.map(|v| (p.output_value, v)))
            .collect()
    }
}
/// Indices of the first sample and of every sample whose output differs
/// from the one before it.
pub fn change_point_indices(series: &Series) -> Vec<usize> {
    series
        .samples
        .iter()
        .enumerate()
        .filter(|(idx, sample)| {
            *idx == 0 || series.samples[idx - 1].output_value != sample.output_value
        })
        .map(|(idx, _)| idx)
        .collect()
}
/// Change points in ascending time order.
pub fn change_points(series: &Series) -> Vec<Sample> {
    let mut points: Vec<Sample> = change_point_indices(series)
        .into_iter()
        .map(|idx| series.samples[idx])
        .collect();
    points.sort_by_key(|s| s.timestamp);
    points
}
/// Fills interior gaps linearly by position and holds the last present value
/// through a trailing gap. Leading gaps stay empty, so every filled value lies
/// within the range of the present ones.
pub fn interpolate_gaps(column: &mut [Option<f64>]) {
    let mut previous: Option<(usize, f64)> = None;
    for idx in 0..column.len() {
        let Some(value) = column[idx] else {
            continue;
        };
        if let Some((start, start_value)) = previous {
            let span = (idx - start) as f64;
            for gap in start + 1..idx {
                let t = (gap - start) as f64 / span;
                column[gap] = Some(start_value + (value - start_value) * t);
            }
        }
        previous = Some((idx, value));
    }
    if let Some((last, value)) = previous {
        column[last + 1..].fill(Some(value));
    }
}
/// Adjusted exponentially weighted mean with `alpha = 1 / (1 + com)`.
///
/// Weights keep decaying across absent entries and the running mean is
/// carried through them. Only entries before the first present value stay
/// absent.
pub fn ewm_mean(column: &[Option<f64>], com: f64) -> Vec<Option<f64>> {
    let alpha = 1.0 / (1.0 + com);
    let decay = 1.0 - alpha;
    let mut average: Option<f64> = None;
    let mut old_weight = 1.0;
    let mut out = Vec::with_capacity(column.len());
    for value in column {
        match average {
            Some(avg) => {
                old_weight *= decay;
                if let Some(v) = value {
                    average = Some((old_weight * avg + v) / (old_weight + 1.0));
                    old_weight += 1.0;
                }
            }
            None => {
                if let Some(v) = value {
                    average = Some(*v);
                    old_weight = 1.0;
                }
            }
        }
        out.push(average);
    }
    out
}
/// Smooths both columns of a raw series, used for the triangular
/// current-vs-potential curve.
pub fn smooth_series(series: &Series, com: f64) -> Vec<(f64, f64)> {
    let outputs: Vec<Option<f64>> = series.iter().map(|s| Some(s.output_value)).collect();
    let inputs: Vec<Option<f64>> = series.iter().map(|s| Some(s.input_value)).collect();
    ewm_mean(&outputs, com)
        .into_iter()
        .zip(ewm_mean(&inputs, com))
        .filter_map(|(x, y)| Some((x?, y?)))
        .collect()
}
pub struct EnvelopeProcessor {
    smoothing_factor: f64,
}
impl EnvelopeProcessor {
    pub fn new(smoothing_factor: f64) -> Self {
        Self { smoothing_factor }
    }
    pub fn filter(&self, series: &Series) -> EnvelopeFrame {
        let points = change_points(series);
        if points.is_empty() {
            return EnvelopeFrame::default();
        }
        let positive: Vec<Sample> = points
            .iter()
            .filter(|s| s.input_value > 0.0)
            .copied()
            .collect();
        // The first change point always anchors the lower envelope.
        let negative: Vec<Sample> = points
            .iter()
            .enumerate()
            .filter(|(idx, s)| *idx == 0 || s.input_value <= 0.0)
            .map(|(_, s)| *s)
            .collect();
        log::info!(
            "{} change points: {} positive, {} negative",
            points.len(),
            positive.len(),
            negative.len()
        );
        let mut rows: Vec<(f64, Option<f64>, Option<f64>)> = points
            .iter()
            .enumerate()
            .map(|(idx, s)| {
                let upper = (s.input_value > 0.0).then_some(s.input_value);
                let lower = (idx == 0 || s.input_value <= 0.0).then_some(s.input_value);
                (s.output_value, upper, lower)
            })
            .collect();
        rows.sort_by(|a, b| b.0.total_cmp(&a.0));
        let axis: Vec<f64> = rows.iter().map(|r| r.0).collect();
        let mut upper: Vec<Option<f64>> = rows.iter().map(|r| r.1).collect();
        let mut lower: Vec<Option<f64>> = rows.iter().map(|r| r.2).collect();
        interpolate_gaps(&mut upper);
        interpolate_gaps(&mut lower);
        let upper = ewm_mean(&upper, self.smoothing_factor);
        let lower = ewm_mean(&lower, self.smoothing_factor);
        let total: Vec<Option<f64>> = lower
            .iter()
            .zip(&upper)
            .map(|(l, u)| Some((*l)? - (*u)?))
            .collect();
        let mut interpolated = Vec::with_capacity(axis.len() * 3);
        for (kind, column) in EnvelopeSeries::ALL.into_iter().zip([&upper, &lower, &total]) {
            interpolated.extend(axis.iter().zip(column.iter()).map(|(x, v)| EnvelopePoint {
                output_value: *x,
                series: kind,
                value: *v,
            }));
        }
        EnvelopeFrame {
            interpolated,
            positive,
            negative,
        }
    }
}
