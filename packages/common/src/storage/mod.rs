//! Content-addressed storage for uploaded story media.

mod error;
mod key;
mod traits;

pub mod filesystem;

pub use error::StorageError;
pub use filesystem::FilesystemMediaStore;
pub use key::MediaKey;
pub use traits::{MediaReader, MediaStore};
