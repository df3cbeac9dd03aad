pub mod chat;
pub mod core;
pub mod history;
pub mod knowledge;
pub mod llm;
pub mod query_log;
pub mod rag;
pub mod server;
pub mod session;
pub mod state;
