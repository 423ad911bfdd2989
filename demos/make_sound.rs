use hound::{SampleFormat, WavSpec, WavWriter};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use trm::{ControlFrame, Synthesizer, TractConfig, VoiceParams, normalize_output, resample};

const OUTPUT_RATE: u32 = 22050;

/// A short rising vowel-like utterance on a neutral tract.
fn frames() -> Vec<ControlFrame> {
    (0..200)
        .map(|i| {
            let t = f64::from(i) / 200.0;
            ControlFrame {
                glot_pitch: -4.0 + (3.0 * t),
                glot_vol: 60.0,
                asp_vol: 12.0,
                radius: [0.8, 1.1, 1.5, 1.9, 1.4, 1.1, 0.9],
                velum: 0.1,
                ..ControlFrame::default()
            }
        })
        .collect()
}

fn main() {
    let voice = VoiceParams::default();
    let tract = TractConfig::default();
    let rng = SmallRng::seed_from_u64(69);

    let mut synthesizer = match Synthesizer::new(&voice, &tract, 250.0, rng) {
        Ok(synthesizer) => synthesizer,
        Err(error) => {
            println!("Error: {error}");
            std::process::exit(1);
        }
    };

    for (i, frame) in frames().iter().enumerate() {
        synthesizer.synthesize_frame(frame, i == 0);
    }
    let mut sound = synthesizer.take_output();
    normalize_output(&mut sound, 54.0);

    // the engine runs at the tract-derived rate; resample for the container
    let sound = resample(
        &sound,
        synthesizer.sample_rate() as f64,
        f64::from(OUTPUT_RATE),
    )
    .unwrap();

    let mut wav = WavWriter::create(
        "out.wav",
        WavSpec {
            channels: 1,
            sample_rate: OUTPUT_RATE,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )
    .unwrap();
    for sample in sound {
        wav.write_sample(sample as f32).unwrap();
    }
    wav.finalize().unwrap();
}
