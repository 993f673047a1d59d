//! Infrastructure layer
//!
//! HTTP transport to the inference server and chat stream handling.

pub mod ai;
