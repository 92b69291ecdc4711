//! Bundled workflows and their tools

pub mod data_quality;

use workflow_core::ToolRegistry;

pub use data_quality::{data_quality_graph, register_data_quality_tools};

/// Registry with every bundled tool registered
pub fn builtin_tools() -> ToolRegistry {
    let registry = ToolRegistry::new();
    register_data_quality_tools(&registry);
    registry
}
