use crate::audio::wav::downmix;
use crate::{ParrotError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, SupportedStreamConfig};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Microphone on the default input device.
///
/// Delivers mono f32 blocks at the device rate whatever the device's native
/// sample type; callers resample to the detector rate.
pub struct AudioInput {
    device: Device,
    config: SupportedStreamConfig,
    stream: Option<Stream>,
    open: Arc<AtomicBool>,
}

impl AudioInput {
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| ParrotError::AudioDevice("No input device available".into()))?;

        let config = device
            .default_input_config()
            .map_err(|e| ParrotError::AudioDevice(format!("Failed to get input config: {}", e)))?;

        info!(
            "Microphone: {} ({} Hz, {} ch, {:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        Ok(Self {
            device,
            config,
            stream: None,
            open: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// Start streaming mono blocks into `audio_tx`. Blocks are dropped while
    /// the consumer is behind.
    pub fn start(&mut self, audio_tx: Sender<Vec<f32>>) -> Result<()> {
        if self.is_recording() {
            warn!("Microphone already open");
            return Ok(());
        }

        let stream = match self.config.sample_format() {
            SampleFormat::F32 => self.build_stream::<f32>(audio_tx)?,
            SampleFormat::I16 => self.build_stream::<i16>(audio_tx)?,
            SampleFormat::U16 => self.build_stream::<u16>(audio_tx)?,
            other => {
                return Err(ParrotError::AudioDevice(format!(
                    "Unsupported input sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| ParrotError::AudioDevice(format!("Failed to start input stream: {}", e)))?;

        self.open.store(true, Ordering::SeqCst);
        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream<T>(&self, audio_tx: Sender<Vec<f32>>) -> Result<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = self.config.channels() as usize;
        let open = Arc::clone(&self.open);
        let mut block: Vec<f32> = Vec::new();

        self.device
            .build_input_stream(
                &self.config.config(),
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if !open.load(Ordering::Relaxed) {
                        return;
                    }
                    block.clear();
                    block.extend(data.iter().map(|s| s.to_sample::<f32>()));
                    if let Err(e) = audio_tx.try_send(downmix(&block, channels)) {
                        debug!("Dropped microphone block: {}", e);
                    }
                },
                |err| error!("Audio input stream error: {}", err),
                None,
            )
            .map_err(|e| ParrotError::AudioDevice(format!("Failed to build input stream: {}", e)))
    }

    pub fn stop(&mut self) {
        self.open.store(false, Ordering::SeqCst);
        if self.stream.take().is_some() {
            info!("Microphone closed");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.stop();
    }
}
