use std::thread;
use std::time::Duration;
use serde::Deserialize;
use crate::drivers::{PotentiostatError, SampleChannel};
use crate::recorder::SampleRecorder;
/// Rounds to 2 decimal places, the resolution every triangular value is emitted at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
#[derive(Clone, Debug, Deserialize)]
pub struct TriangularConfig {
    pub initial: f64,
    pub step: f64,
    pub scan_rate: f64,
    pub max_loops: u32,
    pub max_value: f64,
    pub min_value: f64,
}
impl TriangularConfig {
    pub fn validate(&self) -> Result<(), PotentiostatError> {
        if !(self.step > 0.0) || (round2(self.step) - self.step).abs() > 1e-9 {
            return Err(PotentiostatError::Configuration(format!(
                "triangular step must be a positive multiple of 0.01, got {}",
                self.step
            )));
        }
        if !(self.scan_rate > 0.0) {
            return Err(PotentiostatError::Configuration(format!(
                "triangular scan_rate must be positive, got {}",
                self.scan_rate
            )));
        }
        if self.max_value < self.min_value {
            return Err(PotentiostatError::Configuration(format!(
                "max_value {} is below min_value {}",
                self.max_value, self.min_value
            )));
        }
        let initial = round2(self.initial);
        if initial < self.min_value || initial > self.max_value {
            return Err(PotentiostatError::Configuration(format!(
                "initial {} outside [{}, {}]",
                self.initial, self.min_value, self.max_value
            )));
        }
        Ok(())
    }
    pub fn sample_delay(&self) -> Duration {
        Duration::from_secs_f64(self.step / self.scan_rate)
    }
}
#[derive(Clone, Debug, Deserialize)]
pub struct SquareConfig {
    /// Read for completeness; the high/low split comes from sample counts.
    pub duty_cycle: f64,
    pub freq_signal: f64,
    pub freq_sample: f64,
    pub amplitude: f64,
    pub initial: f64,
    #[serde(rename = "final")]
    pub final_value: f64,
    pub offset: f64,
}
impl SquareConfig {
    pub fn validate(&self) -> Result<(), PotentiostatError> {
        if !(self.freq_signal > 0.0) || !(self.freq_sample > 0.0) {
            return Err(PotentiostatError::Configuration(format!(
                "square frequencies must be positive (signal {}, sample {})",
                self.freq_signal, self.freq_sample
            )));
        }
        if self.points_per_cycle() < 2 {
            return Err(PotentiostatError::Configuration(format!(
                "freq_sample / freq_signal must give at least 2 points per cycle, got {}",
                self.freq_sample / self.freq_signal
            )));
        }
        if !(self.offset > 0.0) {
            return Err(PotentiostatError::Configuration(format!(
                "square offset must be positive, got {}",
                self.offset
            )));
        }
        if !(0.0..=1.0).contains(&self.duty_cycle) {
            return Err(PotentiostatError::Configuration(format!(
                "duty_cycle must lie in [0, 1], got {}",
                self.duty_cycle
            )));
        }
        Ok(())
    }
    pub fn points_per_cycle(&self) -> usize {
        (self.freq_sample / self.freq_signal).floor() as usize
    }
    /// (high-phase samples, low-phase samples) of one cycle.
    pub fn phase_counts(&self) -> (usize, usize) {
        let points = self.points_per_cycle();
        let high = points / 2;
        (high, points - high)
    }
    pub fn sample_delay(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.freq_sample)
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Rising,
    Falling,
}
/// Triangular sweep between `min_value` and `max_value`.
///
/// A loop is complete once the sweep has reversed twice and climbed back to
/// the rounded initial value; `reversals` starts at 1 and reaches 3 there.
#[derive(Clone, Debug)]
pub struct TriangularState {
    config: TriangularConfig,
    reference: f64,
    current: f64,
    direction: Direction,
    reversals: u32,
    loop_count: u32,
    started: bool,
}
impl TriangularState {
    pub fn new(config: TriangularConfig) -> Self {
        let reference = round2(config.initial);
        Self {
            config,
            reference,
            current: reference,
            direction: Direction::Rising,
            reversals: 1,
            loop_count: 0,
            started: false,
        }
    }
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }
    #[cfg(test)]
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn next_sample(&mut self) -> Option<f64> {
        if !self.started {
            self.started = true;
            return Some(self.current);
        }
        loop {
            if self.loop_count == self.config.max_loops {
                return None;
            }
            if self.reversals == 3 && self.current == self.reference {
                self.reversals = 1;
                self.loop_count += 1;
                log::info!("Loop number {}...", self.loop_count);
                continue;
            }
            match self.direction {
                Direction::Rising => {
                    let next = round2(self.current + self.config.step);
                    if next <= self.config.max_value {
                        self.current = next;
                        return Some(next);
                    }
                    self.direction = Direction::Falling;
                    self.reversals += 1;
                }
                Direction::Falling => {
                    let next = round2(self.current - self.config.step);
                    if next >= self.config.min_value {
                        self.current = next;
                        return Some(next);
                    }
                    self.direction = Direction::Rising;
                    self.reversals += 1;
                }
            }
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    High,
    Low,
}
/// Square wave whose baseline ramps down by `offset` after every low phase.
#[derive(Clone, Debug)]
pub struct SquareState {
    config: SquareConfig,
    high_count: usize,
    low_count: usize,
    phase: Phase,
    phase_counter: usize,
    step: f64,
    loop_count: u32,
}
impl SquareState {
    pub fn new(config: SquareConfig) -> Self {
        let (high_count, low_count) = config.phase_counts();
        log::info!("Points per loop: {}", config.points_per_cycle());
        Self {
            config,
            high_count,
            low_count,
            phase: Phase::High,
            phase_counter: 0,
            step: 0.0,
            loop_count: 0,
        }
    }
    #[cfg(test)]
    pub fn step(&self) -> f64 {
        self.step
    }
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }
    fn finished(&self) -> bool {
        -self.config.amplitude - self.step <= self.config.final_value
    }
    pub fn next_sample(&mut self) -> Option<f64> {
        if self.finished() {
            return None;
        }
        self.phase_counter += 1;
        let value = match self.phase {
            Phase::High => {
                let value = self.config.initial - self.step;
                if self.phase_counter == self.high_count {
                    self.phase = Phase::Low;
                    self.phase_counter = 0;
                }
                value
            }
            Phase::Low => {
                let value = -self.config.amplitude - self.step;
                if self.phase_counter == self.low_count {
                    self.phase = Phase::High;
                    self.phase_counter = 0;
                    self.step += self.config.offset;
                    self.loop_count += 1;
                    log::info!("Loop number {}...", self.loop_count);
                }
                value
            }
        };
        Some(value)
    }
}
/// Waveform selected for one run, each variant carrying its own state.
#[derive(Clone, Debug)]
pub enum WaveformKind {
    Triangular(TriangularState),
    Square(SquareState),
}
impl WaveformKind {
    pub fn triangular(config: TriangularConfig) -> Self {
        WaveformKind::Triangular(TriangularState::new(config))
    }
    pub fn square(config: SquareConfig) -> Self {
        WaveformKind::Square(SquareState::new(config))
    }
    /// Next value to drive, or `None` once the waveform is done.
    pub fn next_sample(&mut self) -> Option<f64> {
        match self {
            WaveformKind::Triangular(state) => state.next_sample(),
            WaveformKind::Square(state) => state.next_sample(),
        }
    }
    pub fn sample_delay(&self) -> Duration {
        match self {
            WaveformKind::Triangular(state) => state.config.sample_delay(),
            WaveformKind::Square(state) => state.config.sample_delay(),
        }
    }
    /// Loops completed so far.
    pub fn loop_count(&self) -> u32 {
        match self {
            WaveformKind::Triangular(state) => state.loop_count(),
            WaveformKind::Square(state) => state.loop_count(),
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            WaveformKind::Triangular(_) => "triangular",
            WaveformKind::Square(_) => "square",
        }
    }
}
/// Blocks between samples so the cell can settle.
pub trait Pacer {
    fn wait(&mut self, delay: Duration);
}
pub struct SleepPacer;
impl Pacer for SleepPacer {
    fn wait(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub samples: usize,
    pub loops: u32,
    pub waveform: &'static str,
}
/// Drives one waveform through a channel, recording every emitted sample.
///
/// The generator owns its channel; running consumes it so the hardware is
/// released when the run ends, whether it completed or failed.
pub struct WaveformGenerator<C: SampleChannel, P: Pacer = SleepPacer> {
    channel: C,
    pacer: P,
}
impl<C: SampleChannel, P: Pacer> WaveformGenerator<C, P> {
    pub fn with_pacer(channel: C, pacer: P) -> Self {
        Self { channel, pacer }
    }
    pub fn run(
        mut self,
        mut waveform: WaveformKind,
        recorder: &mut SampleRecorder,
    ) -> Result<RunSummary, PotentiostatError> {
        let delay = waveform.sample_delay();
        let mut samples = 0;
        log::info!(
            "Generating {} wave, {:.1} ms between samples",
            waveform.name(),
            delay.as_secs_f64() * 1000.0
        );
        while let Some(value) = waveform.next_sample() {
            self.channel.set_output(value)?;
            let input = self.channel.read_input()?;
            recorder.record(value, input)?;
            self.pacer.wait(delay);
            samples += 1;
        }
        let loops = waveform.loop_count();
        log::info!("{} wave finished after {samples} samples, {loops} loops", waveform.name());
        Ok(RunSummary {
            samples,
            loops,
            waveform: waveform.name(),
        })
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::tests::MemorySink;
    fn triangle(initial: f64, step: f64, max_loops: u32) -> TriangularConfig {
        TriangularConfig {
            initial,
            step,
            scan_rate: 0.25,
            max_loops,
            max_value: 1.0,
            min_value: -1.0,
        }
    }
    fn square(amplitude: f64, final_value: f64, offset: f64) -> SquareConfig {
        SquareConfig {
            duty_cycle: 0.5,
            freq_signal: 1.0,
            freq_sample: 10.0,
            amplitude,
            initial: 0.5,
            final_value,
            offset,
        }
    }
    fn drain(mut waveform: WaveformKind) -> Vec<f64> {
        let mut values = Vec::new();
        while let Some(v) = waveform.next_sample() {
            values.push(v);
            assert!(values.len() < 100_000, "waveform never terminated");
        }
        values
    }
    #[test]
    fn triangular_single_loop_sequence() {
        let values = drain(WaveformKind::triangular(triangle(0.0, 0.5, 1)));
        assert_eq!(values, vec![0.0, 0.5, 1.0, 0.5, 0.0, -0.5, -1.0, -0.5, 0.0]);
    }
    #[test]
    fn triangular_stays_in_range_with_bounded_steps() {
        let values = drain(WaveformKind::triangular(triangle(0.3, 0.07, 3)));
        assert_eq!(values[0], 0.3);
        assert_eq!(*values.last().unwrap(), 0.3);
        for v in &values {
            assert!((-1.0..=1.0).contains(v), "{v} out of range");
        }
        for pair in values.windows(2) {
            assert!((pair[1] - pair[0]).abs() <= 0.07 + 1e-9);
        }
    }
    #[test]
    fn triangular_counts_loops_and_starts_each_rising() {
        let mut state = TriangularState::new(triangle(0.0, 0.5, 2));
        let mut emitted = 0;
        while state.next_sample().is_some() {
            emitted += 1;
        }
        assert_eq!(emitted, 17);
        assert_eq!(state.loop_count(), 2);
        assert_eq!(state.direction(), Direction::Rising);
    }
    #[test]
    fn triangular_starting_at_maximum_still_closes_the_loop() {
        let values = drain(WaveformKind::triangular(triangle(1.0, 0.5, 1)));
        assert_eq!(values, vec![1.0, 0.5, 0.0, -0.5, -1.0, -0.5, 0.0, 0.5, 1.0]);
    }
    #[test]
    fn triangular_zero_loops_emits_only_initial() {
        let values = drain(WaveformKind::triangular(triangle(0.123, 0.5, 0)));
        assert_eq!(values, vec![0.12]);
    }
    #[test]
    fn triangular_validation_rejects_inverted_range() {
        let mut config = triangle(0.0, 0.5, 1);
        config.max_value = -2.0;
        assert!(matches!(
            config.validate(),
            Err(PotentiostatError::Configuration(_))
        ));
        let mut config = triangle(0.0, 0.005, 1);
        assert!(config.validate().is_err());
        config.step = 0.05;
        assert!(config.validate().is_ok());
    }
    #[test]
    fn square_phase_split_uses_floor() {
        let config = square(1.0, -2.0, 0.5);
        assert_eq!(config.points_per_cycle(), 10);
        assert_eq!(config.phase_counts(), (5, 5));
        let mut odd = config.clone();
        odd.freq_sample = 7.0;
        assert_eq!(odd.phase_counts(), (3, 4));
    }
    #[test]
    fn square_terminates_after_two_baseline_increments() {
        let mut state = SquareState::new(square(1.0, -2.0, 0.5));
        let mut values = Vec::new();
        while let Some(v) = state.next_sample() {
            values.push(v);
        }
        assert_eq!(state.loop_count(), 2);
        assert_eq!(state.step(), 1.0);
        assert_eq!(values.len(), 20);
        assert_eq!(&values[..5], &[0.5; 5]);
        assert_eq!(&values[5..10], &[-1.0; 5]);
        assert_eq!(&values[10..15], &[0.0; 5]);
        assert_eq!(&values[15..20], &[-1.5; 5]);
    }
    #[test]
    fn square_stops_before_emitting_when_already_past_final() {
        let values = drain(WaveformKind::square(square(1.0, -1.0, 0.5)));
        assert!(values.is_empty());
    }
    #[test]
    fn square_validation_requires_two_points_per_cycle() {
        let mut config = square(1.0, -2.0, 0.5);
        config.freq_sample = 1.5;
        assert!(config.validate().is_err());
        let mut config = square(1.0, -2.0, 0.0);
        assert!(config.validate().is_err());
        config.offset = 0.1;
        assert!(config.validate().is_ok());
    }
    #[derive(Default)]
    struct ScriptedChannel {
        outputs: Vec<f64>,
        calls: Vec<&'static str>,
        fail_read_at: Option<usize>,
    }
    impl SampleChannel for ScriptedChannel {
        fn set_output(&mut self, value: f64) -> Result<(), PotentiostatError> {
            self.calls.push("set");
            self.outputs.push(value);
            Ok(())
        }
        fn read_input(&mut self) -> Result<f64, PotentiostatError> {
            self.calls.push("read");
            if self.fail_read_at == Some(self.outputs.len()) {
                return Err(PotentiostatError::HardwareIo("adc timeout".into()));
            }
            Ok(self.outputs.last().copied().unwrap_or(0.0) * 10.0)
        }
    }
    #[derive(Default)]
    struct RecordingPacer(Vec<Duration>);
    impl Pacer for &mut RecordingPacer {
        fn wait(&mut self, delay: Duration) {
            self.0.push(delay);
        }
    }
    #[test]
    fn generator_drives_channel_records_and_paces_each_sample() {
        let mut channel = ScriptedChannel::default();
        let mut pacer = RecordingPacer::default();
        let mut recorder = SampleRecorder::new("test-cell", vec![Box::new(MemorySink::default())]);
        let summary = WaveformGenerator::with_pacer(&mut channel, &mut pacer)
            .run(WaveformKind::triangular(triangle(0.0, 0.5, 1)), &mut recorder)
            .unwrap();
        assert_eq!(summary.samples, 9);
        assert_eq!(summary.loops, 1);
        assert_eq!(channel.outputs.len(), 9);
        assert_eq!(&channel.calls[..4], &["set", "read", "set", "read"]);
        assert_eq!(pacer.0.len(), 9);
        assert!(pacer.0.iter().all(|d| *d == Duration::from_secs(2)));
        assert_eq!(recorder.sinks()[0].read_all().unwrap().len(), 9);
    }
    #[test]
    fn generator_aborts_on_hardware_failure_without_partial_record() {
        let mut channel = ScriptedChannel {
            fail_read_at: Some(3),
            ..Default::default()
        };
        let mut pacer = RecordingPacer::default();
        let mut recorder = SampleRecorder::new("test-cell", vec![Box::new(MemorySink::default())]);
        let err = WaveformGenerator::with_pacer(&mut channel, &mut pacer)
            .run(WaveformKind::square(square(1.0, -2.0, 0.5)), &mut recorder)
            .unwrap_err();
        assert!(matches!(err, PotentiostatError::HardwareIo(_)));
        assert_eq!(recorder.sinks()[0].read_all().unwrap().len(), 2);
        assert_eq!(pacer.0, vec![Duration::from_millis(100); 2]);
    }
}
