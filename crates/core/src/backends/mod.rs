pub mod ncpms;
pub mod openai;

pub use ncpms::NcpmsCatalog;
pub use openai::{OpenAiChatGenerator, OpenAiEmbedder};
