/// Matching transaction coordinator
///
/// Owns `resolveOffer`: the client's accept/decline decision on one offer.
/// Accepting flips the offer and its reference in a single transaction; the
/// partial unique index on accepted offers is the final word on who won.

pub mod coordinator;

pub use coordinator::{Decision, MatchingCoordinator, Resolution};
