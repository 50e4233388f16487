pub mod buffer;
pub mod capture;
pub mod device;
#[cfg(feature = "audio-io")]
pub mod input;
pub mod output;
pub mod resampler;
pub mod vad;
pub mod wav;

pub use buffer::FrameRing;
pub use capture::{
    open_gate, run_capture, CaptureAvailability, CaptureEvent, CaptureGate, CaptureSettings,
};
pub use device::{DeviceLock, DeviceState, RecordingGrant};
#[cfg(feature = "audio-io")]
pub use input::AudioInput;
#[cfg(feature = "audio-io")]
pub use output::RodioSink;
pub use output::{AudioSink, CompletionCallback, NullSink, PcmChunk, PcmDecoder, PcmFormat};
pub use resampler::StreamResampler;
pub use vad::{SpeechScorer, VoiceActivityDetector};
pub use wav::{decode_wav, downmix, encode_wav, is_wav};
