pub mod agent;
pub mod chat;
pub mod openai;
pub mod tools;

pub use agent::{repository_context, AgentTurn, RepoAgent, MAX_STEPS};
pub use chat::{ChatMessage, ChatModel, Completion, ToolCall};
pub use openai::OpenAiClient;
pub use tools::RepoTools;
