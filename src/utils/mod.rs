pub mod channels;
pub mod debounce;
pub mod perf;

pub use channels::CaptureChannels;
pub use debounce::DelayedTask;
pub use perf::{LatencyTracker, Stopwatch};
