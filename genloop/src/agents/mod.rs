//! LLM-backed agents: code generation, test analysis and the multi-attempt
//! testing workflow.

pub mod generator;
pub mod test_agent;
pub mod workflow;
