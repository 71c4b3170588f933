//! Testing utilities for imageflow pipelines.
//!
//! This module provides:
//! - A scriptable in-memory cloud
//! - A UI sink that records messages
//! - Deterministic token generation and journaling steps

mod fakes;

pub use fakes::{
    CloudCall, CollectingUi, FakeCloud, RecordingStep, SequentialTokens, UiMessage,
};
