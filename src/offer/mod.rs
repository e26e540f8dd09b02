/// Offer lifecycle
///
/// Pros submit offers against open references, one per (reference, pro).
/// Offers are resolved by the matching coordinator and may be withdrawn by
/// their pro only while still unresolved.

pub mod manager;
pub mod models;

pub use manager::OfferManager;
pub use models::{NewOffer, Offer, OfferStatus, ProOffer, ProProfile};
