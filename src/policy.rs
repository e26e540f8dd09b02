/// Access policy guard
///
/// Pure predicates over a principal and the records it wants to touch.
/// Managers call these before every mutation; a denial becomes
/// `Unauthorized` when there is no principal and `Forbidden` otherwise.
use crate::{
    auth::{Principal, Role},
    error::{MarketError, MarketResult},
    offer::Offer,
    reference::Reference,
};

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(Denial),
}

/// Reason a check was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    WrongRole { required: Role },
    NotOwner,
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allow)
    }

    /// Surface a denial as the matching error, naming the attempted action
    pub fn ensure(self, action: &str) -> MarketResult<()> {
        match self {
            Access::Allow => Ok(()),
            Access::Deny(Denial::Unauthenticated) => Err(MarketError::Unauthorized(format!(
                "Sign in to {}",
                action
            ))),
            Access::Deny(Denial::WrongRole { required }) => Err(MarketError::Forbidden(format!(
                "Only a {} may {}",
                required.as_str(),
                action
            ))),
            Access::Deny(Denial::NotOwner) => Err(MarketError::Forbidden(format!(
                "Not the owner; cannot {}",
                action
            ))),
        }
    }
}

fn require_role(principal: Option<&Principal>, role: Role) -> Result<&Principal, Denial> {
    let principal = principal.ok_or(Denial::Unauthenticated)?;
    if principal.role != role {
        return Err(Denial::WrongRole { required: role });
    }
    Ok(principal)
}

fn decide(check: Result<(), Denial>) -> Access {
    match check {
        Ok(()) => Access::Allow,
        Err(denial) => Access::Deny(denial),
    }
}

pub fn can_create_reference(principal: Option<&Principal>) -> Access {
    decide(require_role(principal, Role::Client).map(|_| ()))
}

pub fn can_create_offer(principal: Option<&Principal>) -> Access {
    decide(require_role(principal, Role::Pro).map(|_| ()))
}

/// Only the client owning the parent reference resolves its offers
pub fn can_resolve_offer(principal: Option<&Principal>, reference: &Reference) -> Access {
    decide(require_client_owner(principal, reference))
}

pub fn can_delete_reference(principal: Option<&Principal>, reference: &Reference) -> Access {
    decide(require_client_owner(principal, reference))
}

/// Ownership only; the `offer`-status guard lives in the offer manager
pub fn can_delete_offer(principal: Option<&Principal>, offer: &Offer) -> Access {
    decide(require_role(principal, Role::Pro).and_then(|p| {
        if p.id == offer.pro_id {
            Ok(())
        } else {
            Err(Denial::NotOwner)
        }
    }))
}

/// A pro acting on their own account: offer dashboard, contact card
pub fn can_act_for_pro(principal: Option<&Principal>, pro_id: &str) -> Access {
    decide(require_role(principal, Role::Pro).and_then(|p| {
        if p.id == pro_id {
            Ok(())
        } else {
            Err(Denial::NotOwner)
        }
    }))
}

fn require_client_owner(principal: Option<&Principal>, reference: &Reference) -> Result<(), Denial> {
    let principal = require_role(principal, Role::Client)?;
    if principal.id != reference.client_id {
        return Err(Denial::NotOwner);
    }
    Ok(())
}

/// Whether the requester may see a reference at all.
///
/// Open references are public. Once matched (or closed) only the owning
/// client and the pro holding the accepted offer may see it.
pub fn can_view_reference(
    principal: Option<&Principal>,
    reference: &Reference,
    accepted_pro_id: Option<&str>,
) -> bool {
    if reference.is_open() {
        return true;
    }
    is_engaged_party(principal, reference, accepted_pro_id)
}

/// Whether the requester may see the accepted pro's contact card.
pub fn can_view_contact(
    principal: Option<&Principal>,
    reference: &Reference,
    accepted_pro_id: Option<&str>,
) -> bool {
    accepted_pro_id.is_some() && is_engaged_party(principal, reference, accepted_pro_id)
}

fn is_engaged_party(
    principal: Option<&Principal>,
    reference: &Reference,
    accepted_pro_id: Option<&str>,
) -> bool {
    match principal {
        Some(p) if p.role == Role::Client => p.id == reference.client_id,
        Some(p) if p.role == Role::Pro => accepted_pro_id == Some(p.id.as_str()),
        _ => false,
    }
}
