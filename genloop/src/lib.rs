//! Iterative multi-file project generation.
//!
//! A project is generated over several iterations. Each iteration asks a
//! code source for files, places them in the canonical project layout, runs
//! generated tests in an isolated testing environment and records the
//! outcome. The best tree so far is kept as the final output.
//!
//! - **[`core`]**: Pure logic (classification, quality scoring, history
//!   aggregation, strategy selection). No I/O.
//! - **[`io`]**: Filesystem layout, subprocesses, testing environments,
//!   durable history and the LLM command.
//! - **[`agents`]**: Code generation, test analysis and the multi-attempt
//!   testing workflow.
//!
//! [`pipeline`] ties them together.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
