//! Capture module - frame sources and shared per-camera streams

mod backoff;
mod frame;
mod manager;
mod pipe;
#[cfg(feature = "opencv")]
mod pull;
mod stream;
mod traits;

pub use backoff::Backoff;
pub use frame::Frame;
pub use manager::{source_for, StreamManager, StreamStatus};
pub use pipe::{DecoderInput, PipeDecoder, PipeSession};
#[cfg(feature = "opencv")]
pub use pull::PullSource;
pub use stream::{SharedStream, StreamOptions};
pub use traits::{FrameSession, FrameSource};

#[cfg(test)]
pub(crate) use stream::testing;
