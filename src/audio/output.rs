//! Spoken-reply playback
//!
//! Reply audio arrives as a byte stream. Raw little-endian f32 PCM is decoded
//! as it arrives; a WAV container is buffered and decoded once complete.

use crate::audio::wav::{decode_wav, is_wav};
use crate::Result;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Invoked exactly once when a playback ends, is stopped, or is replaced.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Layout of raw PCM reply audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            channels: 1,
        }
    }
}

/// Destination for reply audio
pub trait AudioSink: Send + Sync {
    /// Begin playing bytes received on `chunks`. Replaces any playback in
    /// progress. Returns once playback is scheduled, not when it ends.
    fn play(
        &self,
        chunks: Receiver<Vec<u8>>,
        format: PcmFormat,
        on_complete: CompletionCallback,
    ) -> Result<()>;

    /// Silence output immediately.
    fn stop(&self);

    fn is_playing(&self) -> bool;
}

/// Decoded samples and the layout they are in
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    pub samples: Vec<f32>,
    pub format: PcmFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Undetermined,
    RawF32,
    Wav,
}

/// Incremental decoder for a reply audio body
pub struct PcmDecoder {
    format: PcmFormat,
    kind: BodyKind,
    pending: Vec<u8>,
}

impl PcmDecoder {
    pub fn new(format: PcmFormat) -> Self {
        Self {
            format,
            kind: BodyKind::Undetermined,
            pending: Vec::new(),
        }
    }

    /// Feed body bytes, returning whatever can be played now.
    pub fn push(&mut self, bytes: &[u8]) -> Option<PcmChunk> {
        self.pending.extend_from_slice(bytes);

        if self.kind == BodyKind::Undetermined {
            if self.pending.len() < 4 {
                return None;
            }
            self.kind = if is_wav(&self.pending) {
                debug!("Reply audio is a WAV container");
                BodyKind::Wav
            } else {
                BodyKind::RawF32
            };
        }

        match self.kind {
            BodyKind::RawF32 => self.take_raw(),
            _ => None,
        }
    }

    /// Flush at end of body.
    pub fn finish(&mut self) -> Result<Option<PcmChunk>> {
        match self.kind {
            BodyKind::Wav => {
                let bytes = std::mem::take(&mut self.pending);
                let (samples, sample_rate, channels) = decode_wav(&bytes)?;
                Ok(Some(PcmChunk {
                    samples,
                    format: PcmFormat {
                        sample_rate,
                        channels,
                    },
                }))
            }
            _ => {
                if !self.pending.is_empty() {
                    warn!("Dropping {} trailing audio bytes", self.pending.len());
                    self.pending.clear();
                }
                Ok(None)
            }
        }
    }

    fn take_raw(&mut self) -> Option<PcmChunk> {
        let usable = self.pending.len() - self.pending.len() % 4;
        if usable == 0 {
            return None;
        }

        let samples = self.pending[..usable]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        self.pending.drain(..usable);

        Some(PcmChunk {
            samples,
            format: self.format,
        })
    }
}

/// Sink for sessions without audio output
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(
        &self,
        _chunks: Receiver<Vec<u8>>,
        _format: PcmFormat,
        on_complete: CompletionCallback,
    ) -> Result<()> {
        on_complete();
        Ok(())
    }

    fn stop(&self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

#[cfg(feature = "audio-io")]
pub use self::speaker::RodioSink;

#[cfg(feature = "audio-io")]
mod speaker {
    use super::{AudioSink, CompletionCallback, PcmChunk, PcmDecoder, PcmFormat};
    use crate::{ParrotError, Result};
    use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
    use rodio::buffer::SamplesBuffer;
    use rodio::{OutputStream, OutputStreamHandle, Sink};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{debug, error, info};

    const IDLE_POLL: Duration = Duration::from_millis(50);

    enum Command {
        Play {
            chunks: Receiver<Vec<u8>>,
            format: PcmFormat,
            on_complete: CompletionCallback,
        },
        Stop,
    }

    enum Event {
        Command(Option<Command>),
        Chunk(Option<Vec<u8>>),
        Tick,
    }

    struct Playback {
        sink: Sink,
        chunks: Option<Receiver<Vec<u8>>>,
        decoder: PcmDecoder,
        on_complete: Option<CompletionCallback>,
    }

    impl Playback {
        fn append(&self, chunk: PcmChunk) {
            if chunk.samples.is_empty() {
                return;
            }
            self.sink.append(SamplesBuffer::new(
                chunk.format.channels,
                chunk.format.sample_rate,
                chunk.samples,
            ));
        }

        fn end(mut self) {
            self.sink.stop();
            if let Some(on_complete) = self.on_complete.take() {
                on_complete();
            }
        }
    }

    /// Speaker output on the default device.
    ///
    /// The output stream lives on a dedicated thread; this handle only sends
    /// commands to it.
    pub struct RodioSink {
        commands: Sender<Command>,
        playing: Arc<AtomicBool>,
    }

    impl RodioSink {
        pub fn new() -> Result<Self> {
            let (commands, command_rx) = unbounded();
            let (ready_tx, ready_rx) = bounded(1);
            let playing = Arc::new(AtomicBool::new(false));
            let worker_playing = Arc::clone(&playing);

            std::thread::Builder::new()
                .name("parrot-playback".into())
                .spawn(move || {
                    let (_stream, handle) = match OutputStream::try_default() {
                        Ok(pair) => {
                            let _ = ready_tx.send(Ok(()));
                            pair
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    run_worker(handle, command_rx, worker_playing);
                })
                .map_err(|e| ParrotError::AudioDevice(format!("Failed to spawn playback thread: {}", e)))?;

            match ready_rx.recv() {
                Ok(Ok(())) => {
                    info!("Audio output ready");
                    Ok(Self { commands, playing })
                }
                Ok(Err(e)) => Err(ParrotError::AudioDevice(format!("No output device: {}", e))),
                Err(_) => Err(ParrotError::AudioDevice("Playback thread exited".into())),
            }
        }
    }

    impl AudioSink for RodioSink {
        fn play(
            &self,
            chunks: Receiver<Vec<u8>>,
            format: PcmFormat,
            on_complete: CompletionCallback,
        ) -> Result<()> {
            self.playing.store(true, Ordering::SeqCst);
            self.commands
                .send(Command::Play {
                    chunks,
                    format,
                    on_complete,
                })
                .map_err(|_| ParrotError::Channel("Playback thread is gone".into()))
        }

        fn stop(&self) {
            self.playing.store(false, Ordering::SeqCst);
            let _ = self.commands.send(Command::Stop);
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }
    }

    fn run_worker(handle: OutputStreamHandle, commands: Receiver<Command>, playing: Arc<AtomicBool>) {
        let mut current: Option<Playback> = None;

        loop {
            let event = match current.as_ref().and_then(|p| p.chunks.as_ref()) {
                Some(chunks) => select! {
                    recv(commands) -> cmd => Event::Command(cmd.ok()),
                    recv(chunks) -> chunk => Event::Chunk(chunk.ok()),
                },
                None => match commands.recv_timeout(IDLE_POLL) {
                    Ok(cmd) => Event::Command(Some(cmd)),
                    Err(RecvTimeoutError::Timeout) => Event::Tick,
                    Err(RecvTimeoutError::Disconnected) => Event::Command(None),
                },
            };

            match event {
                Event::Command(None) => break,
                Event::Command(Some(Command::Stop)) => {
                    if let Some(playback) = current.take() {
                        debug!("Playback stopped");
                        playback.end();
                    }
                    playing.store(false, Ordering::SeqCst);
                }
                Event::Command(Some(Command::Play {
                    chunks,
                    format,
                    on_complete,
                })) => {
                    if let Some(previous) = current.take() {
                        debug!("Playback replaced");
                        previous.end();
                    }
                    match Sink::try_new(&handle) {
                        Ok(sink) => {
                            playing.store(true, Ordering::SeqCst);
                            current = Some(Playback {
                                sink,
                                chunks: Some(chunks),
                                decoder: PcmDecoder::new(format),
                                on_complete: Some(on_complete),
                            });
                        }
                        Err(e) => {
                            error!("Failed to open playback sink: {}", e);
                            playing.store(false, Ordering::SeqCst);
                            on_complete();
                        }
                    }
                }
                Event::Chunk(Some(bytes)) => {
                    if let Some(playback) = current.as_mut() {
                        if let Some(chunk) = playback.decoder.push(&bytes) {
                            playback.append(chunk);
                        }
                    }
                }
                Event::Chunk(None) => {
                    if let Some(playback) = current.as_mut() {
                        playback.chunks = None;
                        match playback.decoder.finish() {
                            Ok(Some(chunk)) => playback.append(chunk),
                            Ok(None) => {}
                            Err(e) => error!("Failed to decode reply audio: {}", e),
                        }
                    }
                }
                Event::Tick => {
                    if current.as_ref().is_some_and(|p| p.sink.empty()) {
                        if let Some(playback) = current.take() {
                            debug!("Playback finished");
                            playback.end();
                        }
                        playing.store(false, Ordering::SeqCst);
                    }
                }
            }
        }

        if let Some(playback) = current.take() {
            playback.end();
        }
    }
}
