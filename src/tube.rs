use crate::math::{cos, fabs, pow, round, sin, tan};
use crate::traits::Filter;
use alloc::vec::Vec;
use core::f64::consts::PI;
use rand::Rng;

//--- Tube topology ------------------------------------------------------------

/// Number of oropharynx sections, S1 (glottis) .. S10 (lips).
pub const TOTAL_SECTIONS: usize = 10;
/// Number of oropharynx regions R1..R8. Control frames carry the radii
/// of regions 2..8; region 1 is fixed. R4 spans sections S4-S5 and R5
/// spans S6-S7, so two regions are each two sections long.
pub const TOTAL_REGIONS: usize = 8;
/// Number of nasal sections, N1 (velum) .. N6 (nares).
pub const TOTAL_NASAL_SECTIONS: usize = 6;
/// Frication can enter the top-going waves of sections S3..S10.
const TOTAL_FRIC_TAPS: usize = 8;

// Oropharynx section indices.
const S1: usize = 0;
const S2: usize = 1;
const S4: usize = 3;
const S5: usize = 4;
const S6: usize = 5;
const S7: usize = 6;
const S10: usize = 9;

// Region 4 hosts the velar junction.
const R4: usize = 3;

// Nasal section indices.
const VELUM: usize = 0;
const N6: usize = 5;

// Traveling-wave directions and 3-way junction branches.
const TOP: usize = 0;
const BOTTOM: usize = 1;
const LEFT: usize = 0;
const RIGHT: usize = 1;
const UPPER: usize = 2;

/// Radius of region 1, the section abutting the glottis. Not under
/// control-frame control.
const GLOTTAL_RADIUS: f64 = 0.8;

/// Scaling applied to signals entering the vocal tract and throat (-18 dB).
pub const INPUT_SCALE: f64 = 0.125;

/// Control volumes run 0..60 dB.
const VOL_MAX: f64 = 60.0;
/// Pitch 0 is middle C, `PITCH_OFFSET` semitones above A3.
const PITCH_BASE: f64 = 220.0;
const PITCH_OFFSET: f64 = 3.0;

/// Floor substituted for non-positive oscillator frequencies.
const MIN_FREQUENCY: f64 = 1.0e-3;

//--- Conversions --------------------------------------------------------------

/// Converts a 0..60 dB control volume into a linear amplitude.
/// Volumes at or below 0 dB are silence; volumes at or above 60 dB
/// saturate at 1.
pub fn amplitude(decibel_level: f64) -> f64 {
    let db = decibel_level - VOL_MAX;
    if db <= -VOL_MAX {
        return 0.0;
    }
    if db >= 0.0 {
        return 1.0;
    }
    pow(10.0, db / 20.0)
}

/// Converts a semitone pitch offset into a frequency in Hz.
/// Pitch 0 is middle C (about 261.6 Hz).
pub fn frequency(pitch: f64) -> f64 {
    PITCH_BASE * pow(2.0, (pitch + PITCH_OFFSET) / 12.0)
}

/// Speed of sound in air at the given temperature in degrees Celsius,
/// in m/s.
pub fn speed_of_sound(temperature: f64) -> f64 {
    331.4 + (0.6 * temperature)
}

/// Kelly-Lochbaum scattering coefficient between two adjoining tube
/// sections with the given radii.
///
/// Derived from the relative cross-sectional areas:
/// ```text
///    coefficient = (a² - b²) / (a² + b²)
/// ```
/// which lies strictly within (-1, 1) when both radii are positive.
/// The degenerate zero denominator (both radii zero) yields full
/// reflection instead of a NaN that would permanently poison the
/// recirculating waveguide state.
pub fn scattering_coefficient(radius_a: f64, radius_b: f64) -> f64 {
    let a2 = radius_a * radius_a;
    let b2 = radius_b * radius_b;
    let sum = a2 + b2;
    if sum == 0.0 {
        return 1.0;
    }
    (a2 - b2) / sum
}

//--- Filters ------------------------------------------------------------------

/// A one-pole IIR LP filter modeling the portion of a pressure wave
/// reflected back into a tube from an open end.
///
/// # Formulas:
/// ## Variables:
/// ```text
///    x = input samples
///    y = output samples
///    k = aperture coefficient, (nyquist - cutoff) / nyquist
/// ```
/// ## Filter function:
/// ```text
///    y[n] = (1 - k) * x[n] + k * y[n-1]
/// ```
/// The complementary [`RadiationFilter`] uses the same aperture
/// coefficient for the energy that escapes instead of reflecting.
#[derive(Debug)]
pub struct ReflectionFilter {
    /// filter coefficient (1 - k)
    a: f64,
    /// filter coefficient k
    b: f64,
    /// y[n-1], last output value
    y1: f64,
}
impl ReflectionFilter {
    /// ### params
    /// ```text
    ///    aperture_coeff = (nyquist - cutoff) / nyquist, in (0, 1)
    /// ```
    pub fn new(aperture_coeff: f64) -> Self {
        ReflectionFilter {
            a: 1.0 - fabs(aperture_coeff),
            b: aperture_coeff,
            y1: 0.0,
        }
    }
}
impl Filter for ReflectionFilter {
    fn step(&mut self, x: f64) -> f64 {
        let y = self.a * x + self.b * self.y1;
        self.y1 = y;
        y
    }
    fn reset(&mut self) {
        self.y1 = 0.0;
    }
}

/// A one-zero HP filter modeling the energy radiating from an open tube
/// end into free air.
///
/// # Formulas:
/// ## Filter function:
/// ```text
///    y[n] = k * x[n] - k * x[n-1] + k * y[n-1]
/// ```
/// with the same aperture coefficient `k` as the matching
/// [`ReflectionFilter`].
#[derive(Debug)]
pub struct RadiationFilter {
    /// filter coefficient k
    a: f64,
    /// x[n-1], last input value
    x1: f64,
    /// y[n-1], last output value
    y1: f64,
}
impl RadiationFilter {
    /// ### params
    /// ```text
    ///    aperture_coeff = (nyquist - cutoff) / nyquist, in (0, 1)
    /// ```
    pub fn new(aperture_coeff: f64) -> Self {
        RadiationFilter {
            a: aperture_coeff,
            x1: 0.0,
            y1: 0.0,
        }
    }
}
impl Filter for RadiationFilter {
    fn step(&mut self, x: f64) -> f64 {
        let y = (self.a * x) - (self.a * self.x1) + (self.a * self.y1);
        self.x1 = x;
        self.y1 = y;
        y
    }
    fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// A one-pole LP filter modeling sound transmitted through the soft
/// tissue of the throat wall, scaled to the throat-transmission volume.
///
/// # Formulas:
/// ## Filter function:
/// ```text
///    y[n] = a * x[n] + (1 - a) * y[n-1],    a = 2 * cutoff / sampleRate
/// ```
#[derive(Debug)]
pub struct ThroatFilter {
    /// filter coefficient a
    a: f64,
    /// filter coefficient (1 - a)
    b: f64,
    /// linear throat-transmission gain
    gain: f64,
    /// y[n-1], last output value
    y1: f64,
}
impl ThroatFilter {
    /// ### params
    /// ```text
    ///    cutoff = Cutoff frequency in Hz.
    ///    volume_db = Throat-transmission volume, 0..60 dB.
    ///    sample_rate = Sample rate in Hz.
    /// ```
    pub fn new(cutoff: f64, volume_db: f64, sample_rate: usize) -> Self {
        let a = (cutoff * 2.0) / (sample_rate as f64);
        ThroatFilter {
            a,
            b: 1.0 - a,
            gain: amplitude(volume_db),
            y1: 0.0,
        }
    }
}
impl Filter for ThroatFilter {
    fn step(&mut self, x: f64) -> f64 {
        self.y1 = (self.a * x) + (self.b * self.y1);
        self.gain * self.y1
    }
    fn reset(&mut self) {
        self.y1 = 0.0;
    }
}

/// A second-order bandpass filter shaping the frication noise.
///
/// The center frequency and bandwidth follow the interpolated control
/// frame, so [`BandpassFilter::set`] may be called every sample tick;
/// retuning never resets the inner state.
///
/// # Formulas:
/// ## Filter function:
/// ```text
///    y[n] = 2 * (alpha * (x[n] - x[n-2]) + gamma * y[n-1] - beta * y[n-2])
/// ```
/// ## Coefficients for center frequency f and bandwidth bw:
/// ```text
///    t = tan(PI * bw / sampleRate)
///    beta = (1 - t) / (2 * (1 + t))
///    gamma = (0.5 + beta) * cos(2 * PI * f / sampleRate)
///    alpha = (0.5 - beta) / 2
/// ```
/// Callers keep `f` and `bw` inside (0, nyquist); this is not validated
/// per sample.
#[derive(Debug)]
pub struct BandpassFilter {
    sample_rate: usize,
    alpha: f64,
    beta: f64,
    gamma: f64,
    /// x[n-1], last input value
    x1: f64,
    /// x[n-2], second-last input value
    x2: f64,
    /// y[n-1], last output value
    y1: f64,
    /// y[n-2], second-last output value
    y2: f64,
}
impl BandpassFilter {
    /// ### params
    /// ```text
    ///    sample_rate = Sample rate in Hz.
    /// ```
    pub fn new(sample_rate: usize) -> Self {
        BandpassFilter {
            sample_rate,
            alpha: 0.0,
            beta: 0.0,
            gamma: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Retunes the filter without resetting the inner state.
    pub fn set(&mut self, center_freq: f64, bandwidth: f64) {
        let t = tan((PI * bandwidth) / (self.sample_rate as f64));
        let c = cos((2.0 * PI * center_freq) / (self.sample_rate as f64));
        self.beta = (1.0 - t) / (2.0 * (1.0 + t));
        self.gamma = (0.5 + self.beta) * c;
        self.alpha = (0.5 - self.beta) / 2.0;
    }
}
impl Filter for BandpassFilter {
    fn step(&mut self, x: f64) -> f64 {
        let y = 2.0 * ((self.alpha * (x - self.x2)) + (self.gamma * self.y1) - (self.beta * self.y2));
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

//--- Noise source -------------------------------------------------------------

/// Returns a random number within the range -1 .. 1.
fn get_white_noise<R: Rng>(rng: &mut R) -> f64 {
    rng.random_range(-1.0..=1.0)
}

/// A low-pass filtered broadband noise source, the raw material for
/// aspiration and frication.
///
/// One-zero lowpass with unity DC gain:
/// ```text
///    y[n] = (x[n] + x[n-1]) / 2
/// ```
#[derive(Debug)]
pub struct LpNoiseSource<R> {
    rng: R,
    /// x[n-1], last white-noise value
    x1: f64,
}
impl<R: Rng> LpNoiseSource<R> {
    pub fn new(rng: R) -> Self {
        LpNoiseSource { rng, x1: 0.0 }
    }

    /// Returns an LP-filtered random number.
    pub fn get_next(&mut self) -> f64 {
        let x = get_white_noise(&mut self.rng);
        let y = 0.5 * (x + self.x1);
        self.x1 = x;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
    }
}

//--- Glottal source -----------------------------------------------------------

/// Length of the single-period waveform table.
const TABLE_LENGTH: usize = 512;

/// Fixed kernel of the FIR lowpass used to decimate the 2x oversampled
/// oscillator output: an 11-tap half-band filter with unity DC gain.
const FIR_KERNEL: [f64; 11] = [
    0.009, 0.0, -0.062, 0.0, 0.303, 0.5, 0.303, 0.0, -0.062, 0.0, 0.009,
];

/// Ring-buffered convolution with [`FIR_KERNEL`].
#[derive(Debug)]
struct FirFilter {
    data: [f64; FIR_KERNEL.len()],
    pos: usize,
}
impl FirFilter {
    fn new() -> Self {
        FirFilter {
            data: [0.0; FIR_KERNEL.len()],
            pos: 0,
        }
    }

    fn step(&mut self, x: f64) -> f64 {
        self.data[self.pos] = x;
        self.pos = (self.pos + 1) % FIR_KERNEL.len();
        let mut y = 0.0;
        for (i, coefficient) in FIR_KERNEL.iter().enumerate() {
            y += coefficient * self.data[(self.pos + i) % FIR_KERNEL.len()];
        }
        y
    }

    fn reset(&mut self) {
        self.data = [0.0; FIR_KERNEL.len()];
        self.pos = 0;
    }
}

/// Waveform shape of the glottal excitation, selected once at
/// initialization.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Waveform {
    /// Glottal pulse with an amplitude-dependent falling edge.
    Pulse,
    /// Pure sine tone; the table never changes after initialization.
    Sine,
}

/// Wavetable oscillator producing the voicing excitation.
///
/// In pulse mode the table holds one glottal pulse period: a fixed
/// cubic rise `3x² - 2x³`, a parabolic fall `1 - x²` whose closure
/// point moves with the driving amplitude, and a closed phase of zeros.
/// The rise portion and the table length are invariant for the lifetime
/// of a synthesis run; only the falling edge is rewritten.
///
/// With oversampling enabled, every output sample advances the table
/// position twice at half the increment and passes both reads through a
/// fixed half-band FIR lowpass, keeping only the second value. This
/// suppresses the aliasing the sharp pulse edges would otherwise fold
/// into the audio band at typical tube sample rates.
#[derive(Debug)]
pub struct GlottalOscillator {
    waveform: Waveform,
    wavetable: [f64; TABLE_LENGTH],
    /// end of the fixed rise portion
    table_div1: usize,
    /// latest possible closure point (fall of maximal length)
    table_div2: usize,
    /// table cells the closure point travels over the amplitude range
    tn_delta: f64,
    /// table increment for a 1 Hz tone
    basic_increment: f64,
    /// fractional read position
    current_position: f64,
    /// amplitude the falling edge is currently shaped for
    prev_amplitude: f64,
    oversampling: bool,
    fir: FirFilter,
}
impl GlottalOscillator {
    /// Builds the waveform table.
    ///
    /// ### params
    /// ```text
    ///    waveform = Excitation shape, pulse or sine.
    ///    rise = Rise portion of the pulse, percent of the period.
    ///    fall_min = Shortest fall portion, percent (closure at zero amplitude).
    ///    fall_max = Longest fall portion, percent (closure at full amplitude).
    ///    sample_rate = Simulation sample rate in Hz.
    ///    oversampling = Run at 2x and decimate through the FIR lowpass.
    /// ```
    ///
    /// # Errors
    ///
    /// The pulse portions must be positive and `rise + fall_max` must
    /// leave room for a closed phase; the sample rate must be non-zero.
    pub fn new(
        waveform: Waveform,
        rise: f64,
        fall_min: f64,
        fall_max: f64,
        sample_rate: usize,
        oversampling: bool,
    ) -> Result<Self, &'static str> {
        if rise <= 0.0 || fall_min <= 0.0 || fall_max < fall_min || rise + fall_max > 100.0 {
            return Err("Invalid glottal pulse shape parameters.");
        }
        if sample_rate == 0 {
            return Err("Invalid sample rate.");
        }
        let table_div1 = round(TABLE_LENGTH as f64 * (rise / 100.0)) as usize;
        let table_div2 = round(TABLE_LENGTH as f64 * ((rise + fall_max) / 100.0)) as usize;
        let tn_length = table_div2 - table_div1;
        let tn_delta = round(TABLE_LENGTH as f64 * ((fall_max - fall_min) / 100.0));

        let mut oscillator = GlottalOscillator {
            waveform,
            wavetable: [0.0; TABLE_LENGTH],
            table_div1,
            table_div2,
            tn_delta,
            basic_increment: TABLE_LENGTH as f64 / (sample_rate as f64),
            current_position: 0.0,
            prev_amplitude: -1.0,
            oversampling,
            fir: FirFilter::new(),
        };

        match waveform {
            Waveform::Pulse => {
                // fixed cubic rise
                for i in 0..table_div1 {
                    let x = (i as f64) / (table_div1 as f64);
                    oscillator.wavetable[i] = (3.0 * x * x) - (2.0 * x * x * x);
                }
                // fall of maximal length; the closed phase past it stays zero
                for i in table_div1..table_div2 {
                    let x = ((i - table_div1) as f64) / (tn_length as f64);
                    oscillator.wavetable[i] = 1.0 - (x * x);
                }
            }
            Waveform::Sine => {
                for (i, cell) in oscillator.wavetable.iter_mut().enumerate() {
                    *cell = sin(((i as f64) / (TABLE_LENGTH as f64)) * 2.0 * PI);
                }
            }
        }

        Ok(oscillator)
    }

    /// Reshapes the falling edge for a new amplitude: higher amplitude
    /// moves the closure point later, lengthening the open phase. The
    /// rise portion and the closed phase beyond the latest closure point
    /// are never touched.
    ///
    /// Calls with an unchanged amplitude leave the table as-is, so the
    /// driver may call this every sample tick. In sine mode this is a
    /// no-op.
    pub fn update(&mut self, amplitude: f64) {
        if self.waveform == Waveform::Sine {
            return;
        }
        let amplitude = amplitude.clamp(0.0, 1.0);
        if amplitude == self.prev_amplitude {
            return;
        }
        self.prev_amplitude = amplitude;

        let new_div2 = self.table_div2 - (round((1.0 - amplitude) * self.tn_delta) as usize);
        let new_tn_length = new_div2 - self.table_div1;
        for i in self.table_div1..new_div2 {
            let x = ((i - self.table_div1) as f64) / (new_tn_length as f64);
            self.wavetable[i] = 1.0 - (x * x);
        }
        // fill in up to the latest closure point with closed phase
        for cell in &mut self.wavetable[new_div2..self.table_div2] {
            *cell = 0.0;
        }
    }

    /// Produces the next oscillator sample for the given frequency in
    /// Hz. Non-positive frequencies are clamped to a small positive
    /// floor rather than stalling or reversing the table read.
    pub fn sample(&mut self, frequency: f64) -> f64 {
        let frequency = if frequency > 0.0 {
            frequency
        } else {
            MIN_FREQUENCY
        };
        if self.oversampling {
            let mut output = 0.0;
            for _ in 0..2 {
                self.advance_position(frequency / 2.0);
                output = self.fir.step(self.read_table());
            }
            // the first sub-step value was decimated away
            output
        } else {
            self.advance_position(frequency);
            self.read_table()
        }
    }

    fn advance_position(&mut self, frequency: f64) {
        self.current_position += frequency * self.basic_increment;
        if self.current_position >= TABLE_LENGTH as f64 {
            self.current_position -= TABLE_LENGTH as f64;
        }
    }

    /// Linear interpolation between the two table cells surrounding the
    /// current position, wrapping modulo the table length.
    fn read_table(&self) -> f64 {
        let lower = self.current_position as usize;
        let upper = (lower + 1) % TABLE_LENGTH;
        let frac = self.current_position - (lower as f64);
        self.wavetable[lower] + frac * (self.wavetable[upper] - self.wavetable[lower])
    }

    /// Read access to the single-period waveform table.
    pub fn table(&self) -> &[f64] {
        &self.wavetable
    }

    /// Rewinds the phase and clears the decimation filter. The table
    /// contents are left alone.
    pub fn reset(&mut self) {
        self.current_position = 0.0;
        self.fir.reset();
    }
}

//--- Control parameters -------------------------------------------------------

/// One snapshot of the physiological parameters driving the model.
///
/// Volumes are 0..60 dB control levels, radii are in cm, and the
/// frication position is a continuous tap index in 0..8 along the
/// oropharynx (taps feed sections S3..S10).
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ControlFrame {
    /// glottal pitch as a semitone offset; 0 is middle C
    pub glot_pitch: f64,
    /// glottal (voicing) volume in dB
    pub glot_vol: f64,
    /// aspiration volume in dB
    pub asp_vol: f64,
    /// frication volume in dB
    pub fric_vol: f64,
    /// frication injection position, a continuous tube-section index
    pub fric_pos: f64,
    /// frication bandpass center frequency in Hz
    pub fric_cf: f64,
    /// frication bandpass bandwidth in Hz
    pub fric_bw: f64,
    /// radii of oropharynx regions 2..8 (region 1 is fixed)
    pub radius: [f64; TOTAL_REGIONS - 1],
    /// velar opening radius coupling the nasal tract
    pub velum: f64,
}
impl Default for ControlFrame {
    /// A silent frame with a neutral (uniform unit radius) tract.
    fn default() -> Self {
        ControlFrame {
            glot_pitch: 0.0,
            glot_vol: 0.0,
            asp_vol: 0.0,
            fric_vol: 0.0,
            fric_pos: 4.0,
            fric_cf: 2500.0,
            fric_bw: 2000.0,
            radius: [1.0; TOTAL_REGIONS - 1],
            velum: 0.1,
        }
    }
}
impl ControlFrame {
    /// Component-wise `(self - previous) * control_frequency`: the
    /// per-sample delta that walks `previous` to `self` over one
    /// control period.
    fn delta_from(&self, previous: &ControlFrame, control_frequency: f64) -> ControlFrame {
        let mut radius = [0.0; TOTAL_REGIONS - 1];
        for (delta, (cur, prev)) in radius
            .iter_mut()
            .zip(self.radius.iter().zip(previous.radius.iter()))
        {
            *delta = (cur - prev) * control_frequency;
        }
        ControlFrame {
            glot_pitch: (self.glot_pitch - previous.glot_pitch) * control_frequency,
            glot_vol: (self.glot_vol - previous.glot_vol) * control_frequency,
            asp_vol: (self.asp_vol - previous.asp_vol) * control_frequency,
            fric_vol: (self.fric_vol - previous.fric_vol) * control_frequency,
            fric_pos: (self.fric_pos - previous.fric_pos) * control_frequency,
            fric_cf: (self.fric_cf - previous.fric_cf) * control_frequency,
            fric_bw: (self.fric_bw - previous.fric_bw) * control_frequency,
            radius,
            velum: (self.velum - previous.velum) * control_frequency,
        }
    }

    /// Advances every component by the matching delta component.
    fn advance(&mut self, delta: &ControlFrame) {
        self.glot_pitch += delta.glot_pitch;
        self.glot_vol += delta.glot_vol;
        self.asp_vol += delta.asp_vol;
        self.fric_vol += delta.fric_vol;
        self.fric_pos += delta.fric_pos;
        self.fric_cf += delta.fric_cf;
        self.fric_bw += delta.fric_bw;
        for (radius, delta) in self.radius.iter_mut().zip(delta.radius.iter()) {
            *radius += delta;
        }
        self.velum += delta.velum;
    }
}

/// Largest change each control parameter may make over one control
/// period once rate limiting is wired into the interpolation step.
const DELTA_MAX: ControlFrame = ControlFrame {
    glot_pitch: 12.0,
    glot_vol: 60.0,
    asp_vol: 60.0,
    fric_vol: 60.0,
    fric_pos: 8.0,
    fric_cf: 5000.0,
    fric_bw: 5000.0,
    radius: [3.0; TOTAL_REGIONS - 1],
    velum: 1.5,
};

/// Converts the sparse control-frame sequence into a dense per-sample
/// trajectory by linear delta stepping.
///
/// A control period starts from wherever the previous one ended (so
/// trajectories are continuous across frames), walks the working frame
/// by `delta` once per sample tick, and snaps `previous` to the target
/// frame at the end of the period so no cumulative drift builds up.
#[derive(Debug)]
struct ControlInterpolator {
    /// working frame the rest of the engine reads every tick
    current: ControlFrame,
    /// frame the running control period started from
    previous: ControlFrame,
    /// per-sample delta across the running control period
    delta: ControlFrame,
    /// per-period rate limit; computed but deliberately not applied to
    /// `delta`, so output matches the unclamped reference behavior
    #[allow(dead_code)]
    delta_max: ControlFrame,
    /// reciprocal of the control period, deltas per sample
    control_frequency: f64,
}
impl ControlInterpolator {
    fn new(initial: &ControlFrame, control_period: usize) -> Self {
        let control_frequency = 1.0 / (control_period as f64);
        ControlInterpolator {
            current: *initial,
            previous: *initial,
            delta: initial.delta_from(initial, control_frequency),
            delta_max: DELTA_MAX,
            control_frequency,
        }
    }

    /// Starts a new control period running toward `target`.
    fn set_target(&mut self, target: &ControlFrame) {
        self.delta = target.delta_from(&self.previous, self.control_frequency);
        self.current = self.previous;
    }

    /// Advances the working frame by one sample tick.
    fn step(&mut self) {
        let delta = self.delta;
        self.current.advance(&delta);
    }

    /// Ends the running control period; the next one starts from
    /// `target` exactly.
    fn finish_period(&mut self, target: &ControlFrame) {
        self.previous = *target;
    }

    fn frame(&self) -> &ControlFrame {
        &self.current
    }
}

//--- Waveguide network --------------------------------------------------------

/// Static vocal-tract configuration, supplied once at initialization.
#[derive(Clone, Copy, Debug)]
pub struct TractConfig {
    /// nominal tract length in cm; the simulation rate derives from it
    pub length_cm: f64,
    /// air temperature in degrees Celsius
    pub temperature: f64,
    /// traveling-wave energy loss per junction pass, percent
    pub loss_factor: f64,
    /// unified radius of the mouth and nose openings into free air
    pub aperture_radius: f64,
    /// mouth aperture (reflection/radiation) filter cutoff in Hz
    pub mouth_coef: f64,
    /// nose aperture filter cutoff in Hz
    pub nose_coef: f64,
    /// fixed radii of nasal sections N2..N6
    pub nose_radius: [f64; TOTAL_NASAL_SECTIONS - 1],
    /// throat-transmission lowpass cutoff in Hz
    pub throat_cutoff: f64,
    /// throat-transmission volume in dB
    pub throat_vol: f64,
    /// cross-mix the aspiration noise with the glottal pulse
    pub modulation: bool,
    /// glottal volume below which pulsed noise fades to plain noise, dB
    pub mix_offset: f64,
}
impl Default for TractConfig {
    /// A typical adult male tract.
    fn default() -> Self {
        TractConfig {
            length_cm: 17.5,
            temperature: 32.0,
            loss_factor: 0.8,
            aperture_radius: 3.05,
            mouth_coef: 5000.0,
            nose_coef: 5000.0,
            nose_radius: [1.35, 1.96, 1.91, 1.3, 0.73],
            throat_cutoff: 1500.0,
            throat_vol: 6.0,
            modulation: true,
            mix_offset: 48.0,
        }
    }
}
impl TractConfig {
    /// A typical adult female tract: shorter tube, hence a higher
    /// derived simulation rate.
    pub fn female() -> Self {
        TractConfig {
            length_cm: 15.9,
            ..TractConfig::default()
        }
    }
}

/// The scattering-junction simulation of the oropharynx and nasal
/// tract.
///
/// Every section holds two traveling-wave components (top-going,
/// toward the lips/nares; bottom-going, toward the glottis) in a
/// double-buffered pair of slots. One [`Tube::propagate`] call per
/// sample tick reads only the previous slot, writes only the current
/// slot, and toggles the pair, so no read within a tick can observe a
/// value written by that same tick.
#[derive(Debug)]
pub struct Tube {
    /// oropharynx traveling waves, `[section][direction][tick parity]`
    oropharynx: [[[f64; 2]; 2]; TOTAL_SECTIONS],
    /// nasal traveling waves, same layout
    nasal: [[[f64; 2]; 2]; TOTAL_NASAL_SECTIONS],
    /// tick parity slot written this tick
    current_ptr: usize,
    /// tick parity slot read this tick
    prev_ptr: usize,
    /// scattering coefficients C1..C8; C8 is the mouth aperture
    oropharynx_coeff: [f64; TOTAL_REGIONS],
    /// nasal coefficients NC1..NC6; NC6 is the nose aperture
    nasal_coeff: [f64; TOTAL_NASAL_SECTIONS],
    /// 3-way velar junction weights: left, right, upper
    alpha: [f64; 3],
    frication_tap: [f64; TOTAL_FRIC_TAPS],
    damping_factor: f64,
    aperture_radius: f64,
    nose_radius: [f64; TOTAL_NASAL_SECTIONS - 1],
    mouth_reflection: ReflectionFilter,
    mouth_radiation: RadiationFilter,
    nose_reflection: ReflectionFilter,
    nose_radiation: RadiationFilter,
}
impl Tube {
    /// Builds the tube for a tract configuration at a given simulation
    /// sample rate. The internal nasal coefficients NC2..NC6 are fixed
    /// here; the oropharynx coefficients, the velar junction weights
    /// and NC1 follow the interpolated control frame via
    /// [`Tube::set_coefficients`].
    ///
    /// # Errors
    ///
    /// The aperture cutoffs must lie in (0, nyquist), the loss factor
    /// in 0..100 percent, and the aperture radius must be positive.
    pub fn new(tract: &TractConfig, sample_rate: usize) -> Result<Self, &'static str> {
        if sample_rate == 0 {
            return Err("Invalid sample rate.");
        }
        let nyquist = (sample_rate as f64) / 2.0;
        if tract.mouth_coef <= 0.0 || tract.mouth_coef >= nyquist {
            return Err("Invalid mouth aperture cutoff.");
        }
        if tract.nose_coef <= 0.0 || tract.nose_coef >= nyquist {
            return Err("Invalid nose aperture cutoff.");
        }
        if !(0.0..=100.0).contains(&tract.loss_factor) {
            return Err("Invalid loss factor.");
        }
        if tract.aperture_radius <= 0.0 {
            return Err("Invalid aperture radius.");
        }

        let mouth_aperture = (nyquist - tract.mouth_coef) / nyquist;
        let nose_aperture = (nyquist - tract.nose_coef) / nyquist;

        let mut tube = Tube {
            oropharynx: [[[0.0; 2]; 2]; TOTAL_SECTIONS],
            nasal: [[[0.0; 2]; 2]; TOTAL_NASAL_SECTIONS],
            current_ptr: 1,
            prev_ptr: 0,
            oropharynx_coeff: [0.0; TOTAL_REGIONS],
            nasal_coeff: [0.0; TOTAL_NASAL_SECTIONS],
            alpha: [0.0; 3],
            frication_tap: [0.0; TOTAL_FRIC_TAPS],
            damping_factor: 1.0 - (tract.loss_factor / 100.0),
            aperture_radius: tract.aperture_radius,
            nose_radius: tract.nose_radius,
            mouth_reflection: ReflectionFilter::new(mouth_aperture),
            mouth_radiation: RadiationFilter::new(mouth_aperture),
            nose_reflection: ReflectionFilter::new(nose_aperture),
            nose_radiation: RadiationFilter::new(nose_aperture),
        };

        // fixed coefficients for the internal nasal sections and the
        // nose aperture
        for i in 1..TOTAL_NASAL_SECTIONS - 1 {
            tube.nasal_coeff[i] =
                scattering_coefficient(tract.nose_radius[i - 1], tract.nose_radius[i]);
        }
        tube.nasal_coeff[TOTAL_NASAL_SECTIONS - 1] = scattering_coefficient(
            tract.nose_radius[TOTAL_NASAL_SECTIONS - 2],
            tract.aperture_radius,
        );

        Ok(tube)
    }

    /// Recomputes the radius-dependent coefficients from the currently
    /// interpolated control frame. A pure function of the frame, called
    /// once per sample tick.
    pub fn set_coefficients(&mut self, frame: &ControlFrame) {
        // region radii; region 1 is fixed
        let mut radius = [GLOTTAL_RADIUS; TOTAL_REGIONS];
        radius[1..].copy_from_slice(&frame.radius);

        for i in 0..TOTAL_REGIONS - 1 {
            self.oropharynx_coeff[i] = scattering_coefficient(radius[i], radius[i + 1]);
        }
        self.oropharynx_coeff[TOTAL_REGIONS - 1] =
            scattering_coefficient(radius[TOTAL_REGIONS - 1], self.aperture_radius);

        // velar 3-way junction weights; the junction bisects region 4,
        // so the left and right branch impedances are equal
        let r2 = radius[R4] * radius[R4];
        let v2 = frame.velum * frame.velum;
        let sum = (2.0 * r2) + v2;
        if sum == 0.0 {
            // degenerate closed junction: every branch reflects fully
            self.alpha = [0.0; 3];
        } else {
            let k = 2.0 / sum;
            self.alpha = [k * r2, k * r2, k * v2];
        }

        // the first nasal coefficient follows the velar opening
        self.nasal_coeff[0] = scattering_coefficient(frame.velum, self.nose_radius[0]);
    }

    /// Distributes the frication injection over the two taps nearest
    /// the (possibly fractional) position. The position selects the
    /// taps; the volume only scales them.
    pub fn set_frication(&mut self, volume_db: f64, position: f64) {
        let amp = amplitude(volume_db);
        let position = position.clamp(0.0, TOTAL_FRIC_TAPS as f64);
        let integer = position as usize;
        let complement = position - (integer as f64);
        let remainder = 1.0 - complement;

        self.frication_tap = [0.0; TOTAL_FRIC_TAPS];
        if integer < TOTAL_FRIC_TAPS {
            self.frication_tap[integer] = remainder * amp;
            if integer + 1 < TOTAL_FRIC_TAPS {
                self.frication_tap[integer + 1] = complement * amp;
            }
        }
    }

    /// Read access to the current frication tap weights, indexed by
    /// injection section S3..S10.
    pub fn frication_taps(&self) -> &[f64] {
        &self.frication_tap
    }

    /// Propagates one sample tick through the network and returns the
    /// summed mouth and nose output.
    ///
    /// `input` is the excitation entering the glottal end of the tract;
    /// `frication` is the bandpass-filtered noise distributed over the
    /// frication taps.
    #[allow(clippy::needless_range_loop)]
    pub fn propagate(&mut self, input: f64, frication: f64) -> f64 {
        let (cur, prev) = self.toggle();
        let damping = self.damping_factor;

        // glottal end: the excitation rides on the reflected
        // bottom-going wave
        self.oropharynx[S1][TOP][cur] = (self.oropharynx[S1][BOTTOM][prev] * damping) + input;

        // scattering junction S1-S2 (C1)
        let delta = self.oropharynx_coeff[0]
            * (self.oropharynx[S1][TOP][prev] - self.oropharynx[S2][BOTTOM][prev]);
        self.oropharynx[S2][TOP][cur] = (self.oropharynx[S1][TOP][prev] + delta) * damping;
        self.oropharynx[S1][BOTTOM][cur] = (self.oropharynx[S2][BOTTOM][prev] + delta) * damping;

        // junctions S2-S3 and S3-S4 (C2, C3), frication entering S3 and S4
        for i in S2..S4 {
            let delta = self.oropharynx_coeff[i]
                * (self.oropharynx[i][TOP][prev] - self.oropharynx[i + 1][BOTTOM][prev]);
            self.oropharynx[i + 1][TOP][cur] = ((self.oropharynx[i][TOP][prev] + delta) * damping)
                + (self.frication_tap[i - 1] * frication);
            self.oropharynx[i][BOTTOM][cur] =
                (self.oropharynx[i + 1][BOTTOM][prev] + delta) * damping;
        }

        // 3-way junction between S4 and S5, where the velum couples the
        // nasal tract
        let junction_pressure = (self.alpha[LEFT] * self.oropharynx[S4][TOP][prev])
            + (self.alpha[RIGHT] * self.oropharynx[S5][BOTTOM][prev])
            + (self.alpha[UPPER] * self.nasal[VELUM][BOTTOM][prev]);
        self.oropharynx[S4][BOTTOM][cur] =
            (junction_pressure - self.oropharynx[S4][TOP][prev]) * damping;
        self.oropharynx[S5][TOP][cur] = ((junction_pressure - self.oropharynx[S5][BOTTOM][prev])
            * damping)
            + (self.frication_tap[2] * frication);
        self.nasal[VELUM][TOP][cur] = (junction_pressure - self.nasal[VELUM][BOTTOM][prev]) * damping;

        // junction S5-S6 (C4), frication entering S6
        let delta = self.oropharynx_coeff[3]
            * (self.oropharynx[S5][TOP][prev] - self.oropharynx[S6][BOTTOM][prev]);
        self.oropharynx[S6][TOP][cur] = ((self.oropharynx[S5][TOP][prev] + delta) * damping)
            + (self.frication_tap[3] * frication);
        self.oropharynx[S5][BOTTOM][cur] = (self.oropharynx[S6][BOTTOM][prev] + delta) * damping;

        // S6-S7 lie both inside region 5: a pure damped delay, no
        // scattering
        self.oropharynx[S7][TOP][cur] =
            (self.oropharynx[S6][TOP][prev] * damping) + (self.frication_tap[4] * frication);
        self.oropharynx[S6][BOTTOM][cur] = self.oropharynx[S7][BOTTOM][prev] * damping;

        // junctions S7-S8, S8-S9, S9-S10 (C5..C7), frication entering
        // S8..S10
        for i in S7..S10 {
            let delta = self.oropharynx_coeff[i - 2]
                * (self.oropharynx[i][TOP][prev] - self.oropharynx[i + 1][BOTTOM][prev]);
            self.oropharynx[i + 1][TOP][cur] = ((self.oropharynx[i][TOP][prev] + delta) * damping)
                + (self.frication_tap[i - 1] * frication);
            self.oropharynx[i][BOTTOM][cur] =
                (self.oropharynx[i + 1][BOTTOM][prev] + delta) * damping;
        }

        // reflected wave at the mouth goes through the reflection
        // lowpass; the radiated wave through the radiation highpass
        let mouth_wave = self.oropharynx[S10][TOP][prev];
        self.oropharynx[S10][BOTTOM][cur] = damping
            * self.mouth_reflection.step(mouth_wave)
            * self.oropharynx_coeff[TOTAL_REGIONS - 1];
        let mut output = self
            .mouth_radiation
            .step(mouth_wave * (1.0 + self.oropharynx_coeff[TOTAL_REGIONS - 1]));

        // nasal cavity
        for i in VELUM..N6 {
            let delta =
                self.nasal_coeff[i] * (self.nasal[i][TOP][prev] - self.nasal[i + 1][BOTTOM][prev]);
            self.nasal[i + 1][TOP][cur] = (self.nasal[i][TOP][prev] + delta) * damping;
            self.nasal[i][BOTTOM][cur] = (self.nasal[i + 1][BOTTOM][prev] + delta) * damping;
        }

        // symmetric treatment at the nose end
        let nose_wave = self.nasal[N6][TOP][prev];
        self.nasal[N6][BOTTOM][cur] = damping
            * self.nose_reflection.step(nose_wave)
            * self.nasal_coeff[TOTAL_NASAL_SECTIONS - 1];
        output += self
            .nose_radiation
            .step(nose_wave * (1.0 + self.nasal_coeff[TOTAL_NASAL_SECTIONS - 1]));

        output
    }

    fn toggle(&mut self) -> (usize, usize) {
        self.current_ptr = 1 - self.current_ptr;
        self.prev_ptr = 1 - self.prev_ptr;
        (self.current_ptr, self.prev_ptr)
    }

    /// Zeroes all traveling-wave state and the aperture filters.
    pub fn reset(&mut self) {
        self.oropharynx = [[[0.0; 2]; 2]; TOTAL_SECTIONS];
        self.nasal = [[[0.0; 2]; 2]; TOTAL_NASAL_SECTIONS];
        self.current_ptr = 1;
        self.prev_ptr = 0;
        self.mouth_reflection.reset();
        self.mouth_radiation.reset();
        self.nose_reflection.reset();
        self.nose_radiation.reset();
    }
}

//--- Main logic ---------------------------------------------------------------

/// Static per-voice excitation parameters, supplied once at
/// initialization.
#[derive(Clone, Copy, Debug)]
pub struct VoiceParams {
    /// excitation waveform shape
    pub waveform: Waveform,
    /// rise portion of the glottal pulse, percent of the period
    pub pulse_rise: f64,
    /// shortest fall portion, percent (closure at zero amplitude)
    pub pulse_fall_min: f64,
    /// longest fall portion, percent (closure at full amplitude)
    pub pulse_fall_max: f64,
    /// portion of the glottal source replaced by pulsed noise, percent
    pub breathiness: f64,
    /// run the oscillator at 2x and decimate to suppress edge aliasing
    pub oversampling: bool,
}
impl Default for VoiceParams {
    fn default() -> Self {
        VoiceParams {
            waveform: Waveform::Pulse,
            pulse_rise: 40.0,
            pulse_fall_min: 16.0,
            pulse_fall_max: 32.0,
            breathiness: 0.5,
            oversampling: true,
        }
    }
}
impl VoiceParams {
    /// A typical female voice: same pulse shape, slightly breathier.
    pub fn female() -> Self {
        VoiceParams {
            breathiness: 1.5,
            ..VoiceParams::default()
        }
    }
}

/// Articulatory synthesis engine.
///
/// Owns all tube, filter and oscillator state exclusively; callers
/// serialize [`Synthesizer::synthesize_frame`] calls. Given identical
/// initialization parameters, control frames and RNG, the output is
/// reproducible sample for sample. To synthesize independent
/// utterances in parallel, instantiate one engine per utterance.
#[derive(Debug)]
pub struct Synthesizer<R> {
    /// simulation rate in Hz, derived from the tract length
    sample_rate: usize,
    /// simulation ticks per control frame
    control_period: usize,
    /// tube length the rounded control period actually realizes, cm
    actual_length_cm: f64,
    breathiness_factor: f64,
    crossmix_factor: f64,
    modulation: bool,
    interpolator: Option<ControlInterpolator>,
    oscillator: GlottalOscillator,
    noise_source: LpNoiseSource<R>,
    bandpass: BandpassFilter,
    throat: ThroatFilter,
    tube: Tube,
    /// accumulated output at the simulation rate
    output: Vec<f64>,
}
impl<R: Rng> Synthesizer<R> {
    /// Derives the simulation sample rate from the tract length so
    /// that one traveling-wave pass through one section takes exactly
    /// one sample tick:
    /// ```text
    ///    c = speedOfSound(temperature)
    ///    controlPeriod = round(c * sections * 100 / (length * controlRate))
    ///    sampleRate = controlRate * controlPeriod
    /// ```
    /// then sizes and zeroes all engine state. Changing the tract
    /// length or the control rate requires a new engine.
    ///
    /// # Errors
    ///
    /// Returns a message naming the invalid configuration field. There
    /// is no sensible default for a non-positive tube length or
    /// control rate.
    pub fn new(
        voice: &VoiceParams,
        tract: &TractConfig,
        control_rate: f64,
        rng: R,
    ) -> Result<Self, &'static str> {
        if tract.length_cm <= 0.0 || !tract.length_cm.is_finite() {
            return Err("Invalid tube length.");
        }
        if control_rate <= 0.0 || !control_rate.is_finite() {
            return Err("Invalid control rate.");
        }
        if !(0.0..=100.0).contains(&voice.breathiness) {
            return Err("Invalid breathiness.");
        }
        if amplitude(tract.mix_offset) == 0.0 {
            return Err("Invalid mix offset.");
        }

        let c = speed_of_sound(tract.temperature);
        let control_period =
            round((c * (TOTAL_SECTIONS as f64) * 100.0) / (tract.length_cm * control_rate)) as usize;
        if control_period == 0 {
            return Err("Control rate too high for the tube length.");
        }
        let sample_rate = (control_rate * (control_period as f64)) as usize;
        let actual_length_cm = (c * (TOTAL_SECTIONS as f64) * 100.0) / (sample_rate as f64);

        let oscillator = GlottalOscillator::new(
            voice.waveform,
            voice.pulse_rise,
            voice.pulse_fall_min,
            voice.pulse_fall_max,
            sample_rate,
            voice.oversampling,
        )?;
        let tube = Tube::new(tract, sample_rate)?;

        Ok(Synthesizer {
            sample_rate,
            control_period,
            actual_length_cm,
            breathiness_factor: voice.breathiness / 100.0,
            crossmix_factor: 1.0 / amplitude(tract.mix_offset),
            modulation: tract.modulation,
            interpolator: None,
            oscillator,
            noise_source: LpNoiseSource::new(rng),
            bandpass: BandpassFilter::new(sample_rate),
            throat: ThroatFilter::new(tract.throat_cutoff, tract.throat_vol, sample_rate),
            tube,
            output: Vec::new(),
        })
    }

    /// The derived simulation sample rate in Hz.
    pub fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    /// Simulation ticks spanned by one control frame.
    pub fn control_period(&self) -> usize {
        self.control_period
    }

    /// The tube length in cm the rounded control period actually
    /// realizes; close to, but generally not equal to, the nominal
    /// length.
    pub fn actual_length_cm(&self) -> f64 {
        self.actual_length_cm
    }

    /// Synthesizes one control frame, appending `control_period`
    /// samples to the output buffer. With `reset_first`, all filter,
    /// oscillator and tube state is cleared first (the sample rate is
    /// not rederived) and the interpolation restarts from `frame`.
    pub fn synthesize_frame(&mut self, frame: &ControlFrame, reset_first: bool) {
        if reset_first {
            self.reset_signal_path();
            self.interpolator = None;
        }
        let mut interpolator = match self.interpolator.take() {
            Some(interpolator) => interpolator,
            None => ControlInterpolator::new(frame, self.control_period),
        };

        interpolator.set_target(frame);
        for _ in 0..self.control_period {
            let current = *interpolator.frame();
            let sample = self.tick(&current);
            self.output.push(sample);
            interpolator.step();
        }
        interpolator.finish_period(frame);
        self.interpolator = Some(interpolator);
    }

    /// One simulation tick driven by the interpolated frame `current`.
    fn tick(&mut self, current: &ControlFrame) -> f64 {
        // coefficients are a pure function of the interpolated frame,
        // recomputed every tick
        self.tube.set_coefficients(current);
        self.tube.set_frication(current.fric_vol, current.fric_pos);
        self.bandpass.set(current.fric_cf, current.fric_bw);

        let ax = amplitude(current.glot_vol);
        self.oscillator.update(ax);

        let lp_noise = self.noise_source.get_next();
        let pulse = self.oscillator.sample(frequency(current.glot_pitch));
        let pulsed_noise = lp_noise * pulse;
        let noisy_pulse = ax
            * ((pulse * (1.0 - self.breathiness_factor))
                + (pulsed_noise * self.breathiness_factor));

        // aspiration: pulsed noise fades to plain noise as the glottal
        // amplitude falls
        let aspirate = if self.modulation {
            let crossmix = f64::min(ax * self.crossmix_factor, 1.0);
            (pulsed_noise * crossmix) + (lp_noise * (1.0 - crossmix))
        } else {
            lp_noise
        };

        let input = (noisy_pulse + (amplitude(current.asp_vol) * aspirate)) * INPUT_SCALE;
        let frication = self.bandpass.step(aspirate);

        let mut sample = self.tube.propagate(input, frication);
        sample += self.throat.step(noisy_pulse * INPUT_SCALE);
        sample
    }

    fn reset_signal_path(&mut self) {
        self.oscillator.reset();
        self.noise_source.reset();
        self.bandpass.reset();
        self.throat.reset();
        self.tube.reset();
    }

    /// Takes the accumulated output, at the simulation sample rate.
    pub fn take_output(&mut self) -> Vec<f64> {
        core::mem::take(&mut self.output)
    }

    /// Read access to the accumulated output without draining it.
    pub fn output(&self) -> &[f64] {
        &self.output
    }
}

/// Synthesizes a complete utterance from a control-frame sequence.
///
/// The first frame is held constant for its control period; every
/// following frame is reached by linear interpolation from its
/// predecessor. Output is at the tract-derived simulation rate; see
/// [`crate::resample()`] for conversion to a nominal rate.
///
/// # Errors
///
/// Returns a message naming the invalid configuration field.
pub fn generate_sound<R: Rng>(
    voice: &VoiceParams,
    tract: &TractConfig,
    control_rate: f64,
    frames: &[ControlFrame],
    rng: R,
) -> Result<Vec<f64>, &'static str> {
    let mut synthesizer = Synthesizer::new(voice, tract, control_rate, rng)?;
    for frame in frames {
        synthesizer.synthesize_frame(frame, false);
    }
    Ok(synthesizer.take_output())
}

/// Peak-normalizes the buffer, then applies a master volume in dB
/// (60 dB is unity). A silent buffer is left alone.
pub fn normalize_output(buf: &mut [f64], volume_db: f64) {
    let mut peak: f64 = 0.0;
    for sample in buf.iter() {
        peak = f64::max(peak, fabs(*sample));
    }
    if peak == 0.0 {
        return;
    }
    let scale = amplitude(volume_db) / peak;
    for sample in buf.iter_mut() {
        *sample *= scale;
    }
}

