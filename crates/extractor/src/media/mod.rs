pub mod collection;
pub mod format;
pub mod video;

pub use collection::{CollectionMetadata, EntryStub};
pub use format::{FormatDescriptor, PREFERRED_EXTENSION, select_combined};
pub use video::VideoMetadata;
