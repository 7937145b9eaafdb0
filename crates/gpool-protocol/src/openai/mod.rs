pub mod request;
pub mod response;
pub mod stream;
pub mod types;

pub use request::{CreateChatCompletionRequest, CreateChatCompletionRequestBody};
pub use response::ChatCompletion;
pub use stream::ChatCompletionChunk;
pub use types::{ChatMessage, ErrorEnvelope, ModelInfo, StopConfiguration, Usage};
