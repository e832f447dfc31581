pub mod config;
pub mod engine;
pub mod gemini;
pub mod http;
pub mod page;
pub mod postgres;
