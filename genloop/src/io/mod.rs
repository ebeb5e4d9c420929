//! Side-effecting operations: filesystem layout, processes, environments,
//! history stores and the LLM command.

pub mod archive;
pub mod config;
pub mod fs;
pub mod llm;
pub mod migrate;
pub mod output;
pub mod process;
pub mod prompt;
pub mod structure;
pub mod testing_env;
pub mod workspace;
