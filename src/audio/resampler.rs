use crate::{ParrotError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Mono resampler fed with arbitrarily sized device chunks
///
/// Input is buffered until a full resampler chunk is available, so chunk
/// boundaries never get zero-padded mid-stream.
pub struct StreamResampler {
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
    input_rate: u32,
    output_rate: u32,
}

impl StreamResampler {
    /// # Arguments
    /// * `input_rate` - Device sample rate
    /// * `output_rate` - Rate expected downstream (the VAD rate)
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(ParrotError::Config(
                "Sample rates must be greater than 0".into(),
            ));
        }

        let resampler = if input_rate == output_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 128,
                window: WindowFunction::BlackmanHarris2,
            };

            let resampler = SincFixedIn::<f32>::new(
                output_rate as f64 / input_rate as f64,
                1.0,
                params,
                1024,
                1,
            )
            .map_err(|e| ParrotError::AudioProcessing(format!("Failed to create resampler: {}", e)))?;

            debug!("Created resampler: {} Hz -> {} Hz", input_rate, output_rate);
            Some(resampler)
        };

        Ok(Self {
            resampler,
            pending: Vec::new(),
            input_rate,
            output_rate,
        })
    }

    /// Push device samples; returns whatever full chunks could be converted.
    pub fn push(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }

            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let processed = resampler
                .process(&[chunk], None)
                .map_err(|e| ParrotError::AudioProcessing(format!("Resampling failed: {}", e)))?;
            output.extend_from_slice(&processed[0]);
        }

        Ok(output)
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_at_same_rate() {
        let mut resampler = StreamResampler::new(16000, 16000).unwrap();
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resampler.push(&input).unwrap(), input);
    }

    #[test]
    fn test_invalid_rate() {
        assert!(StreamResampler::new(0, 16000).is_err());
    }

    #[test]
    fn test_small_chunks_are_buffered() {
        let mut resampler = StreamResampler::new(48000, 16000).unwrap();

        // Far less than one resampler chunk
        let out = resampler.push(&vec![0.0; 100]).unwrap();
        assert!(out.is_empty());

        // Three seconds of input, fed in device-sized pieces
        let mut total = 0;
        for _ in 0..300 {
            total += resampler.push(&vec![0.0; 480]).unwrap().len();
        }
        // Roughly one third comes out, minus what is still buffered
        assert!(total > 40_000 && total <= 48_100, "got {}", total);
    }
}
