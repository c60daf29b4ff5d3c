//! Mintline core library — config, gateway, LLM client, channels, chain
//! adapters, and the agent turn loop used by the `mintline` binary.

pub mod agent;
pub mod chain;
pub mod channels;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod session;
pub mod tools;
pub mod wallet;
