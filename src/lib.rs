pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod request;
pub mod sanitize;
pub mod splitter;
pub mod stream;
pub mod synth;
pub mod upstream;
