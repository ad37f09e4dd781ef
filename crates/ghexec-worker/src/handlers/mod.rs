// Handlers module - step execution handlers for the supported step kinds.

pub mod handler;
pub mod node_script_handler;
pub mod output_manager;
pub mod script_handler;
pub mod step_host;

pub use handler::{Handler, HandlerData, HandlerFactory};
