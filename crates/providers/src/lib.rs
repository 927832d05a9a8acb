pub mod openai_compatible;
pub mod traits;

pub use openai_compatible::OpenAICompatibleProvider;
pub use traits::{ContentPart, GenerateResponse, GenerationParams, Message, ProviderError, VlmProvider};
