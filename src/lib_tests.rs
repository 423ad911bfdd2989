use super::{amplitude, frequency, scattering_coefficient, speed_of_sound};

#[test]
fn amplitude_works() {
    assert_eq!(amplitude(60.0), 1.0);
    assert_eq!(amplitude(72.0), 1.0);
    assert_eq!(amplitude(40.0), 0.1);
    assert_eq!(amplitude(45.0), 0.1778279410038923);
    assert_eq!(amplitude(0.0), 0.0);
    assert_eq!(amplitude(-5.0), 0.0);
    assert_eq!(amplitude(f64::NEG_INFINITY), 0.0);
}

#[test]
fn frequency_works() {
    // pitch 0 is middle C
    assert!((frequency(0.0) - 261.6255653005986).abs() < 1e-9);
    // -3 semitones lands exactly on the 220 Hz base
    assert_eq!(frequency(-3.0), 220.0);
    // +9 semitones is one octave above the base
    assert_eq!(frequency(9.0), 440.0);
}

#[test]
fn speed_of_sound_works() {
    assert!((speed_of_sound(0.0) - 331.4).abs() < 1e-12);
    assert!((speed_of_sound(32.0) - 350.6).abs() < 1e-12);
    assert!((speed_of_sound(20.0) - 343.4).abs() < 1e-12);
}

#[test]
fn scattering_coefficient_works() {
    // matched radii scatter nothing
    assert_eq!(scattering_coefficient(1.0, 1.0), 0.0);
    assert_eq!(scattering_coefficient(2.0, 1.0), 0.6);
    assert_eq!(scattering_coefficient(1.0, 2.0), -0.6);
    // degenerate zero denominator reflects fully instead of NaN
    assert_eq!(scattering_coefficient(0.0, 0.0), 1.0);
}
