//! Polysub - Video Subtitle Localization Pipeline
//!
//! A Rust implementation of a video localization pipeline: silence-aware
//! audio segmentation, word-level transcription, sentence alignment, and
//! SRT timeline generation, with durable batch processing on top.

pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod segment;
pub mod transcript;
pub mod transcribe;
pub mod sentences;
pub mod align;
pub mod timeline;
pub mod pipeline;
pub mod workflow;
pub mod batch;
