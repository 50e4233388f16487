use crate::messages::Utterance;
use crossbeam_channel::{bounded, Receiver, Sender};
use tokio::sync::mpsc;

/// Plumbing between the audio device thread, the capture gate thread and the
/// async turn loop.
pub struct CaptureChannels {
    /// Mono frames at the device rate, from the input callback
    pub raw_audio_tx: Sender<Vec<f32>>,
    pub raw_audio_rx: Receiver<Vec<f32>>,
    /// Finished utterances, to the turn loop
    pub utterance_tx: mpsc::UnboundedSender<Utterance>,
    pub utterance_rx: mpsc::UnboundedReceiver<Utterance>,
}

impl CaptureChannels {
    pub fn new(buffer_size: usize) -> Self {
        let (raw_audio_tx, raw_audio_rx) = bounded(buffer_size);
        let (utterance_tx, utterance_rx) = mpsc::unbounded_channel();

        Self {
            raw_audio_tx,
            raw_audio_rx,
            utterance_tx,
            utterance_rx,
        }
    }
}

impl Default for CaptureChannels {
    fn default() -> Self {
        Self::new(64)
    }
}
