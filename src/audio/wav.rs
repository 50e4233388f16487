use crate::{ParrotError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

/// Encode samples as an in-memory 16-bit PCM WAV container
///
/// # Arguments
/// * `samples` - Audio samples (f32, range -1.0 to 1.0), interleaved
/// * `sample_rate` - Sample rate in Hz
/// * `channels` - Number of channels
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| ParrotError::AudioProcessing(format!("Failed to create WAV writer: {}", e)))?;

        let mut samples_writer = writer.get_i16_writer(samples.len() as u32);
        for &sample in samples {
            samples_writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
        }
        samples_writer
            .flush()
            .map_err(|e| ParrotError::AudioProcessing(format!("Failed to write samples: {}", e)))?;

        writer
            .finalize()
            .map_err(|e| ParrotError::AudioProcessing(format!("Failed to finalize WAV: {}", e)))?;
    }

    let bytes = cursor.into_inner();
    debug!("Encoded {} samples into {} WAV bytes", samples.len(), bytes.len());
    Ok(bytes)
}

/// Decode a complete WAV container held in memory
///
/// # Returns
/// * Tuple of (interleaved samples, sample_rate, channels)
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32, u16)> {
    let mut reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| ParrotError::AudioProcessing(format!("Failed to read WAV header: {}", e)))?;

    let spec = reader.spec();
    let read_err = |e: hound::Error| ParrotError::AudioProcessing(format!("Failed to read sample: {}", e));

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(read_err)?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .map_err(read_err)?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(read_err)?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .map_err(read_err)?,
        (_, bits) => {
            return Err(ParrotError::AudioProcessing(format!(
                "Unsupported bit depth: {}",
                bits
            )));
        }
    };

    Ok((samples, spec.sample_rate, spec.channels))
}

/// Check for the RIFF container magic
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Average interleaved channels down to mono
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_encode_produces_wav_container() {
        let samples: Vec<f32> = (0..1600)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 16000.0).sin() * 0.5)
            .collect();

        let bytes = encode_wav(&samples, 16000, 1).unwrap();
        assert!(is_wav(&bytes));
        assert!(bytes.len() > samples.len() * 2);

        let (decoded, rate, channels) = decode_wav(&bytes).unwrap();
        assert_eq!(rate, 16000);
        assert_eq!(channels, 1);
        assert_eq!(decoded.len(), samples.len());
        for (original, read) in samples.iter().zip(decoded.iter()) {
            assert!((original - read).abs() < 0.001);
        }
    }

    #[test]
    fn test_garbage_is_not_wav() {
        assert!(!is_wav(b"not audio at all"));
        assert!(decode_wav(b"not audio at all").is_err());
    }

    #[test]
    fn test_downmix() {
        let stereo = vec![0.5, 0.3, 0.7, 0.1];
        let mono = downmix(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.4).abs() < 0.001);
        assert!((mono[1] - 0.4).abs() < 0.001);

        assert_eq!(downmix(&[0.2, 0.4], 1), vec![0.2, 0.4]);
    }
}
