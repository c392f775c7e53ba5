//! Concrete implementations of the engine's collaborator traits
//! (`pipeline_engine::extract::VideoHostGateway`,
//! `pipeline_engine::transcribe::{AudioTranscriptionClient, MediaProbe}`).
//! These are the only places in the workspace that shell out to external
//! tools or speak to a transcription endpoint.

pub mod transcription;
pub mod video_gateway;

pub use transcription::{FfmpegMediaProbe, WhisperHttpClient};
pub use video_gateway::YtDlpGateway;
