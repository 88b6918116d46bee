use rand::Rng;
use serde::Deserialize;
use crate::drivers::waveform::round2;
use crate::drivers::PotentiostatError;
/// Physical output/input pair driven by the waveform generator.
///
/// `set_output` takes the cell potential in volts, `read_input` returns the
/// measured current in physical units (already calibrated).
pub trait SampleChannel {
    fn set_output(&mut self, value: f64) -> Result<(), PotentiostatError>;
    fn read_input(&mut self) -> Result<f64, PotentiostatError>;
}
impl<T: SampleChannel + ?Sized> SampleChannel for &mut T {
    fn set_output(&mut self, value: f64) -> Result<(), PotentiostatError> {
        (**self).set_output(value)
    }
    fn read_input(&mut self) -> Result<f64, PotentiostatError> {
        (**self).read_input()
    }
}
/// Raw converter pair behind a calibrated channel.
pub trait Converter {
    /// Writes a DAC code as a fraction of full scale.
    fn write_normalized(&mut self, normalized: f64) -> Result<(), PotentiostatError>;
    /// Reads the ADC input voltage.
    fn read_voltage(&mut self) -> Result<f64, PotentiostatError>;
    fn release(&mut self) {}
}
// DAC output stage: inverting amplifier around the 1.58 V reference.
const DAC_REFERENCE_V: f64 = 1.58;
const DAC_GAIN: f64 = 5.0 / 3.0;
const DAC_FULL_SCALE_V: f64 = 5.2535;
// ADC front end: diode linearisation then transimpedance (8.2 kOhm).
const DIODE_A: f64 = 0.1647;
const DIODE_B: f64 = 0.7305;
const DIODE_C: f64 = 0.0544;
const TIA_BIAS_V: f64 = 1.71;
const TIA_KOHM: f64 = 8.2;
const CURRENT_OFFSET: f64 = 2.1;
/// Cell potential (V) to normalized DAC code.
pub fn potential_to_normalized(potential: f64) -> f64 {
    DAC_GAIN * (DAC_REFERENCE_V - potential) / DAC_FULL_SCALE_V
}
/// Normalized DAC code back to cell potential (V).
pub fn normalized_to_potential(normalized: f64) -> f64 {
    DAC_REFERENCE_V - normalized * DAC_FULL_SCALE_V / DAC_GAIN
}
/// ADC voltage to current, rounded to 2 decimals like the acquisition log.
pub fn voltage_to_current(voltage: f64) -> f64 {
    let fixed = DIODE_A * voltage * voltage + DIODE_B * voltage + DIODE_C;
    round2((fixed - TIA_BIAS_V) * 1000.0 / TIA_KOHM - CURRENT_OFFSET)
}
/// Inverse of [`voltage_to_current`] (without the rounding), used by the simulated cell.
pub fn current_to_voltage(current: f64) -> f64 {
    let fixed = (current + CURRENT_OFFSET) * TIA_KOHM / 1000.0 + TIA_BIAS_V;
    let c = DIODE_C - fixed;
    let discriminant = (DIODE_B * DIODE_B - 4.0 * DIODE_A * c).max(0.0);
    (-DIODE_B + discriminant.sqrt()) / (2.0 * DIODE_A)
}
/// Applies the board calibration on top of a raw converter pair.
pub struct CalibratedChannel<C: Converter> {
    converter: C,
}
impl<C: Converter> CalibratedChannel<C> {
    pub fn new(converter: C) -> Self {
        Self { converter }
    }
}
impl<C: Converter> SampleChannel for CalibratedChannel<C> {
    fn set_output(&mut self, value: f64) -> Result<(), PotentiostatError> {
        let normalized = potential_to_normalized(value);
        if !(0.0..=1.0).contains(&normalized) {
            return Err(PotentiostatError::HardwareIo(format!(
                "potential {value} V maps to DAC code {normalized:.4}, outside [0, 1]"
            )));
        }
        self.converter.write_normalized(normalized)
    }
    fn read_input(&mut self) -> Result<f64, PotentiostatError> {
        let voltage = self.converter.read_voltage()?;
        let current = voltage_to_current(voltage);
        log::debug!("voltage: {voltage:.2}V / current: {current:.2}");
        Ok(current)
    }
}
impl<C: Converter> Drop for CalibratedChannel<C> {
    fn drop(&mut self) {
        self.converter.release();
    }
}
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CellModel {
    pub resistance_kohm: f64,
    /// Charging current per volt of step, decays by half on every read.
    pub capacitance: f64,
    pub noise_ua: f64,
}
impl Default for CellModel {
    fn default() -> Self {
        Self {
            resistance_kohm: 10.0,
            capacitance: 40.0,
            noise_ua: 0.5,
        }
    }
}
/// Resistive/capacitive cell behind an ideal converter pair.
pub struct SimulatedCell {
    model: CellModel,
    potential: f64,
    charging: f64,
}
impl SimulatedCell {
    pub fn new(model: CellModel) -> Self {
        Self {
            model,
            potential: 0.0,
            charging: 0.0,
        }
    }
    fn current(&mut self) -> f64 {
        let faradaic = self.potential / self.model.resistance_kohm * 1000.0;
        let noise = if self.model.noise_ua > 0.0 {
            rand::thread_rng().gen_range(-self.model.noise_ua..=self.model.noise_ua)
        } else {
            0.0
        };
        let current = faradaic + self.charging + noise;
        self.charging *= 0.5;
        current
    }
}
impl Converter for SimulatedCell {
    fn write_normalized(&mut self, normalized: f64) -> Result<(), PotentiostatError> {
        let next = normalized_to_potential(normalized);
        self.charging += self.model.capacitance * (next - self.potential);
        self.potential = next;
        Ok(())
    }
    fn read_voltage(&mut self) -> Result<f64, PotentiostatError> {
        let current = self.current();
        Ok(current_to_voltage(current))
    }
    fn release(&mut self) {
        log::debug!("simulated cell released at {:.3} V", self.potential);
    }
}
