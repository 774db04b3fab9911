//! Test support: mock transport, scripted sources and in-memory sinks

pub mod mocks;

pub use mocks::{
    MemorySink, MockTransport, PublishedMessage, RejectingVerifier, ScriptedChunkSource,
};
