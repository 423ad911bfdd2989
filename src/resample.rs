//! Sample rate conversion from the simulation rate to a nominal output
//! rate.
//!
//! The simulation rate is derived from the tube length and is almost
//! never a standard audio rate, so engine output is resampled before it
//! reaches a file or device.

use alloc::vec::Vec;

/// Streaming linear-interpolation resampler.
///
/// The fractional read position and the last input sample carry across
/// calls, so an utterance can be converted control frame by control
/// frame without seams at the block boundaries.
pub struct SampleRateConverter {
    /// input samples advanced per output sample
    ratio: f64,
    /// fractional read position; 0 addresses the sample carried over
    /// from the previous block
    position: f64,
    /// last input sample of the previous block
    last: f64,
}
impl SampleRateConverter {
    /// ### params
    /// ```text
    ///    input_rate = Rate of the incoming samples in Hz.
    ///    output_rate = Nominal rate of the produced samples in Hz.
    /// ```
    ///
    /// # Errors
    ///
    /// Both rates must be positive and finite.
    pub fn new(input_rate: f64, output_rate: f64) -> Result<Self, &'static str> {
        if input_rate <= 0.0 || !input_rate.is_finite() {
            return Err("Invalid input sample rate.");
        }
        if output_rate <= 0.0 || !output_rate.is_finite() {
            return Err("Invalid output sample rate.");
        }
        Ok(SampleRateConverter {
            ratio: input_rate / output_rate,
            position: 1.0,
            last: 0.0,
        })
    }

    /// Converts one block of input, appending the produced samples to
    /// `out`.
    pub fn convert(&mut self, input: &[f64], out: &mut Vec<f64>) {
        if input.is_empty() {
            return;
        }
        let len = input.len() as f64;
        while self.position < len {
            let lower = self.position as usize;
            let frac = self.position - (lower as f64);
            let a = if lower == 0 {
                self.last
            } else {
                input[lower - 1]
            };
            let b = input[lower];
            out.push(a + frac * (b - a));
            self.position += self.ratio;
        }
        self.position -= len;
        self.last = input[input.len() - 1];
    }

    /// Input samples advanced per output sample.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Forgets the stream position without touching the ratio.
    pub fn reset(&mut self) {
        self.position = 1.0;
        self.last = 0.0;
    }
}

/// One-shot conversion of a whole utterance.
///
/// # Errors
///
/// Both rates must be positive and finite.
pub fn resample(
    input: &[f64],
    input_rate: f64,
    output_rate: f64,
) -> Result<Vec<f64>, &'static str> {
    let mut converter = SampleRateConverter::new(input_rate, output_rate)?;
    let mut out = Vec::with_capacity(((input.len() as f64) / converter.ratio()) as usize + 1);
    converter.convert(input, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn identity_ratio_passes_samples_through() {
        let mut converter = SampleRateConverter::new(10.0, 10.0).unwrap();
        let mut out = Vec::new();
        converter.convert(&[0.0, 1.0, 2.0, 3.0], &mut out);
        converter.convert(&[4.0, 5.0, 6.0, 7.0], &mut out);
        // one sample stays carried across the block boundary
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn constant_input_stays_constant() {
        let mut converter = SampleRateConverter::new(20000.0, 44100.0).unwrap();
        let mut out = Vec::new();
        converter.convert(&[1.0; 200], &mut out);
        assert!(!out.is_empty());
        assert!(out.iter().all(|s| (s - 1.0).abs() < 1e-12));
    }

    #[test]
    fn output_length_follows_the_ratio() {
        let input: Vec<f64> = (0..2000).map(|i| f64::from(i) * 0.001).collect();
        let out = resample(&input, 20000.0, 44100.0).unwrap();
        let expected = 2000.0 * 44100.0 / 20000.0;
        assert!(((out.len() as f64) - expected).abs() < 4.0);
    }

    #[test]
    fn upsampling_interpolates_between_neighbors() {
        let out = resample(&[0.0, 1.0], 10.0, 20.0).unwrap();
        // positions 1.0 and 1.5: the exact sample, then the midpoint
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn rejects_nonpositive_rates() {
        assert!(SampleRateConverter::new(0.0, 44100.0).is_err());
        assert!(SampleRateConverter::new(22050.0, -1.0).is_err());
        assert!(SampleRateConverter::new(f64::NAN, 44100.0).is_err());
    }
}
