//! Question sourcing: the AI collaborator port and its deterministic fallback.

/// Stored fallback question pool.
pub mod fallback;
/// Question and difficulty models.
pub mod models;
/// OpenAI-compatible question source backend.
pub mod openai;
/// Question source port definition.
pub mod source;
