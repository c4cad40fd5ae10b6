pub mod audio;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod error;
pub mod fillers;
pub mod flubber;
pub mod intern;
pub mod normalize;
pub mod pauses;
pub mod pipeline;
pub mod providers;
pub mod rebuild;
pub mod transcript;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{process_episode, EpisodeResult};
pub use transcript::{Transcript, Word};
