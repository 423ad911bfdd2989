//! Tube Resonance Model articulatory speech synthesis in Rust.
//!
//! *NOTE*: This is _not_ a text-to-speech engine.
//! This is only synthesis from time-varying physiological control
//! parameters (pitch, voicing/aspiration/frication volumes, tract
//! radii, velar opening). See the `make_sound` demo on how to use this.
//!
//! ## `no_std`
//!
//! This library is unconditionally `no_std` compatible.
//! `alloc` is required for the output sample buffers.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(
    clippy::all,
    clippy::cargo,
    clippy::pedantic,
    unsafe_code,
    rustdoc::all
)]
// fine for us since loss of precision/sign is not that imporatnt, as long as it's the same every time.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

#[cfg(all(feature = "std", feature = "libm"))]
compile_error!("Features \"std\" and \"libm\" are mutually exclusive.");

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("Must specify a math feature: either \"std\" or \"libm\".");

extern crate alloc;

mod traits;
pub use traits::Filter;
mod math;
mod tube;
pub use tube::{
    BandpassFilter, ControlFrame, GlottalOscillator, INPUT_SCALE, LpNoiseSource, RadiationFilter,
    ReflectionFilter, Synthesizer, ThroatFilter, TractConfig, Tube, VoiceParams, Waveform,
    amplitude, frequency, generate_sound, normalize_output, scattering_coefficient,
    speed_of_sound,
};
mod resample;
pub use resample::{SampleRateConverter, resample};

#[cfg(test)]
mod lib_tests;
