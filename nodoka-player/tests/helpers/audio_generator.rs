//! WAV fixtures with known durations

use hound::{WavSpec, WavWriter};
use std::path::Path;

/// Low sample rate keeps fixtures small; duration is all the tests look at
const TEST_SAMPLE_RATE: u32 = 8000;

/// Write a silent mono WAV file of `duration_ms`
pub fn generate_silent_wav<P: AsRef<Path>>(path: P, duration_ms: u64) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (u64::from(TEST_SAMPLE_RATE) * duration_ms) / 1000;
    for _ in 0..total_frames {
        writer.write_sample(0i16)?;
    }

    writer.finalize()?;
    Ok(())
}
