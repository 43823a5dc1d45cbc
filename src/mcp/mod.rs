//! MCP client and virtualization layer.

pub mod client;
pub mod virtualize;

pub use client::{CollectOptions, McpClient, McpInventory, ServerHandshake};
pub use virtualize::{host_segment, safe_segment, virtualize, VirtualFile};
