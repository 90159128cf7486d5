//! Downstream generation service client

pub mod traits;
pub mod webui;

pub use traits::{GenerationBackend, GenerationOutput, ModelInventory};
pub use webui::WebUiBackend;
