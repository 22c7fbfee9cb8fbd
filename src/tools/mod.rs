//! Tool registry and built-in tool implementations.
//!
//! Tools self-describe through a JSON-schema definition the adapters echo
//! to the model, and execute through the registry's dispatch wrapper, which
//! turns every failure into structured information the model can react to.

pub mod fs;
pub mod registry;
pub mod types;
pub mod web;


pub use registry::ToolRegistry;
pub use types::{
    bounded_u64, optional_bool, optional_str, required_str, ApproveAll, Args, Confirmer,
    NumberSpec, Tool, ToolContext, ToolError,
};
