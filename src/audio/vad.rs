use crate::{ParrotError, Result};
use tracing::info;
use voice_activity_detector::VoiceActivityDetector as SileroDetector;

/// Scores one frame of mono audio with a speech probability
pub trait SpeechScorer: Send {
    /// Speech probability in 0.0..=1.0
    fn score(&mut self, frame: &[f32]) -> f32;

    /// Clear model state between utterances
    fn reset(&mut self);

    /// Frame length the model expects, in samples
    fn frame_size(&self) -> usize;
}

/// Silero voice-activity model
pub struct VoiceActivityDetector {
    detector: SileroDetector,
    sample_rate: u32,
}

impl VoiceActivityDetector {
    /// Load the model
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate of the audio (8000 or 16000)
    pub fn new(sample_rate: u32) -> Result<Self> {
        let chunk_size = frame_size_for(sample_rate)?;

        let detector = SileroDetector::builder()
            .sample_rate(sample_rate as i32)
            .chunk_size(chunk_size)
            .build()
            .map_err(|e| ParrotError::ModelLoad(format!("Failed to create VAD: {:?}", e)))?;

        info!("Loaded VAD model at {} Hz, {} samples per frame", sample_rate, chunk_size);

        Ok(Self {
            detector,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl SpeechScorer for VoiceActivityDetector {
    fn score(&mut self, frame: &[f32]) -> f32 {
        self.detector.predict(frame.iter().copied())
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn frame_size(&self) -> usize {
        // Validated in new()
        frame_size_for(self.sample_rate).unwrap_or(512)
    }
}

/// Samples per frame for the model: 32ms windows
pub fn frame_size_for(sample_rate: u32) -> Result<usize> {
    match sample_rate {
        8000 => Ok(256),
        16000 => Ok(512),
        other => Err(ParrotError::Config(format!(
            "Invalid sample rate: {}. Must be 8000 or 16000",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(frame_size_for(16000).unwrap(), 512);
        assert_eq!(frame_size_for(8000).unwrap(), 256);
        assert!(frame_size_for(44100).is_err());
    }

    #[test]
    fn test_invalid_sample_rate() {
        assert!(VoiceActivityDetector::new(44100).is_err());
    }

    #[test]
    fn test_silence_detection() {
        // Model load may be unavailable in CI
        if let Ok(mut vad) = VoiceActivityDetector::new(16000) {
            let silence = vec![0.0f32; vad.frame_size()];
            assert!(vad.score(&silence) < 0.5);
        }
    }
}
