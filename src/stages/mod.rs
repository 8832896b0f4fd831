//! Concrete stages built on the composition core.

mod batch;
mod chat;
mod db;
mod head;
mod jq;
mod novel;
mod wiki;

pub use batch::{BatchConfig, Batcher};
pub use chat::{
    ChatClient, ChatConfig, ChatRequest, ChatResponse, ChatStage, Message, OllamaClient, ToolCall,
    ToolCallEntry,
};
pub use db::{DbConfig, DbQuery, DbQueryInput, DbWriter, open_database, query_rows};
pub use head::{Head, HeadConfig};
pub use jq::{JqConfig, JqStage};
pub use novel::{NovelChunkerConfig, NovelChunkerInput, NovelChunkerStage};
pub use wiki::{WikiChunkerConfig, WikiChunkerStage};
