pub mod handlers;
pub mod model;
pub mod upload;

pub use model::{parse_date, Author, Media, MediaKind, Memory};
pub use upload::{MemoryForm, ALLOWED_MIME_TYPES};
