pub mod conversation;
pub mod loaders;
pub mod paper;

pub use conversation::{CacheHandle, CacheState, ConversationHistory, Turn, TurnMeta};
pub use loaders::load_task_file;
pub use paper::{
    ChatMessage, ChatRole, Interpretation, Paper, PaperMeta, PaperStatus, Task, TaskStatus,
    Template,
};
