pub mod collection;
pub mod io;
pub mod lock;
pub mod shape;

pub use collection::{CollectionStatus, JsonCollection, ValidationReport, ValidationStatus};
pub use lock::{FileLockGuard, LockRegistry, LockStats};
pub use shape::{CollectionShape, Section, SectionKind};
