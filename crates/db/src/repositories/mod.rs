//! Database repositories.

mod document;

pub use document::DocumentRepository;
