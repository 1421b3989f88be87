//! The user collection service: cached reads, id-validated writes, nested
//! per-user fields and staff, and cascade deletion of dependent records.

mod cascade;
mod store;

pub use cascade::{CascadeTarget, cascade_delete};
pub use store::{NewUser, UserStore};
