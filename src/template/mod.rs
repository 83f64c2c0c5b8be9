//! Notification templates.
//!
//! - `tree`: template trees and the placeholder renderer
//! - `engine`: per-job engine rendering mail and push messages per recipient
//! - `loader`: filesystem and in-memory template definition loaders

mod engine;
mod loader;
mod tree;
mod types;

pub use engine::{TemplateDefinitions, TemplatingEngine};
pub use loader::{FileTemplateLoader, MemoryTemplateLoader, TemplateLoader};
pub use tree::{Scope, TemplateString, TemplateTree};
pub use types::{validate_id, TemplateError, TemplateResult};
