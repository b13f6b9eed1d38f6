//! Presentation layer: command-line parsing and text renderers.

pub mod app;
pub mod components;
