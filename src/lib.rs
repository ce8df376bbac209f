//! Nyay Sahayak backend: a retrieval-grounded legal assistant for Indian
//! law, with a guided FIR interview, document drafting, a phone menu and
//! SOS alerts.

pub mod assistant;
pub mod core;
pub mod documents;
pub mod extract;
pub mod history;
pub mod interview;
pub mod ivr;
pub mod llm;
pub mod notify;
pub mod prompt;
pub mod rag;
pub mod server;
pub mod state;
pub mod stream;
pub mod vector_math;
