pub mod anthropic;
pub mod openai;
pub mod sse;

pub use sse::{frame_anthropic, frame_openai, SseEvent, SseParser, OPENAI_DONE};
