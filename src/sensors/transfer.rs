//! Raw-to-physical transfer functions.
//!
//! A [`Transfer`] maps one raw acquisition value to physical units.  The
//! guard then applies the per-sensor calibration on top:
//!
//! ```text
//! value = transfer(raw) × gain + offset
//! ```
//!
//! Keeping the offset additive after the gain is what lets a tare solve
//! for it exactly, whatever the transfer curve looks like.

/// Maps a raw reading to physical units.
pub trait Transfer: Send {
    fn physical(&self, raw: f32) -> f32;
}

impl<F> Transfer for F
where
    F: Fn(f32) -> f32 + Send,
{
    fn physical(&self, raw: f32) -> f32 {
        self(raw)
    }
}

/// Raw value passes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transfer for Identity {
    fn physical(&self, raw: f32) -> f32 {
        raw
    }
}

/// Built-in ADC: raw is a 0..1 fraction of the reference voltage.
#[derive(Debug, Clone, Copy)]
pub struct AdcVolts {
    pub vref: f32,
}

impl Default for AdcVolts {
    fn default() -> Self {
        Self { vref: 3.3 }
    }
}

impl Transfer for AdcVolts {
    fn physical(&self, raw: f32) -> f32 {
        raw * self.vref
    }
}

/// Strain-gauge bridge read by an HX711: raw is bridge output in mV.
#[derive(Debug, Clone, Copy)]
pub struct LoadCellBridge {
    /// Rated output (mV/V).
    pub mv_per_v: f32,
    /// Excitation voltage (V).
    pub excitation_v: f32,
    /// Full-scale capacity in output units (N).
    pub capacity: f32,
}

impl Default for LoadCellBridge {
    fn default() -> Self {
        // 60 kg cell on a 4.55 V excitation.
        Self {
            mv_per_v: 1.892,
            excitation_v: 4.55,
            capacity: 588.399,
        }
    }
}

impl Transfer for LoadCellBridge {
    fn physical(&self, raw: f32) -> f32 {
        raw / (self.mv_per_v * self.excitation_v) * self.capacity
    }
}

/// PT100-class RTD on a MAX31865.  Raw is the 15-bit resistance ratio code.
/// Output is kelvin.
#[derive(Debug, Clone, Copy)]
pub struct Rtd {
    pub nominal_ohms: f32,
    pub reference_ohms: f32,
}

impl Default for Rtd {
    fn default() -> Self {
        Self {
            nominal_ohms: 100.0,
            reference_ohms: 430.0,
        }
    }
}

const RTD_A: f32 = 3.9083e-3;
const RTD_B: f32 = -5.775e-7;
const KELVIN_OFFSET: f32 = 273.15;

impl Rtd {
    /// Callendar–Van Dusen above 0 °C, polynomial fit below.
    pub fn celsius(&self, code: f32) -> f32 {
        let rt = code / 32768.0 * self.reference_ohms;

        let z1 = -RTD_A;
        let z2 = RTD_A * RTD_A - 4.0 * RTD_B;
        let z3 = (4.0 * RTD_B) / self.nominal_ohms;
        let z4 = 2.0 * RTD_B;

        let temp = ((z2 + z3 * rt).sqrt() + z1) / z4;
        if temp >= 0.0 {
            return temp;
        }

        // Normalise to a 100 Ω element for the sub-zero fit.
        let r = rt / self.nominal_ohms * 100.0;
        let mut rpoly = r;
        let mut temp = -242.02 + 2.2228 * rpoly;
        rpoly *= r;
        temp += 2.5859e-3 * rpoly;
        rpoly *= r;
        temp -= 4.8260e-6 * rpoly;
        rpoly *= r;
        temp -= 2.8183e-8 * rpoly;
        rpoly *= r;
        temp += 1.5243e-10 * rpoly;
        temp
    }
}

impl Transfer for Rtd {
    fn physical(&self, raw: f32) -> f32 {
        self.celsius(raw) + KELVIN_OFFSET
    }
}
