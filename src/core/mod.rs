pub mod app;
pub mod builtin_personas;
pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod gemini;
pub mod message;
pub mod persona;
pub mod storage;
