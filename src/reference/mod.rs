/// Reference lifecycle
///
/// A reference is a client's visual request for a nail-art style. It is
/// created `open`, flips to `matched` only as a side effect of an accepted
/// offer, and is destroyed (with all of its offers) by its owner.

pub mod manager;
pub mod models;

pub use manager::ReferenceManager;
pub use models::{NewReference, Reference, ReferenceFilter, ReferenceStatus};
