pub mod cache;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod storage;
pub mod validation;
