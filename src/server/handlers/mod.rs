pub mod ask;
pub mod config;
pub mod documents;
pub mod health;
pub mod ingest;
pub mod interview;
pub mod sos;
pub mod upload;
pub mod voice;
