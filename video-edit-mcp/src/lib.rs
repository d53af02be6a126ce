//! Video Edit MCP Library
//!
//! MCP server for video, audio and image editing built on FFmpeg.
//!
//! Tools take media either as a file path or as a reference to a clip held
//! in memory. Passing `return_path = false` to a tool stores its result and
//! returns a reference, so several edits can be chained without the caller
//! managing intermediate files.
//!
//! - [`store`] - reference-keyed handle stores with decode-on-miss lookup
//! - [`media`] - video and audio handles, decoders and the per-server registry
//! - [`ffmpeg`] - ffmpeg/ffprobe subprocess runner
//! - [`zoompan`] - per-frame zoom and pan windows for still images
//! - [`effects`] - pixel effects and color adjustment for still images
//! - [`handler`] - tool implementations
//! - [`server`] - the MCP server exposing the tools

pub mod effects;
pub mod ffmpeg;
pub mod handler;
pub mod media;
pub mod server;
pub mod store;
pub mod zoompan;

pub use handler::{Produced, VideoEditHandler};
pub use media::{AudioClip, AudioStore, MediaRegistry, VideoClip, VideoStore};
pub use server::VideoEditServer;
pub use store::{HandleStore, MediaDecoder};
