mod document;
mod etag;
mod json_document;

pub use document::*;
pub use etag::*;
pub use json_document::*;
