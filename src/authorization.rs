//! Role-based access checks.
//!
//! Roles grant capabilities:
//! - `submitter` → Submit (send drafts to review, revise decided documents)
//! - `reviewer`  → Review (approve, reject, send back)
//! - `admin`     → Administer (bypasses every capability and access check)
//!
//! Document visibility and editability come from the document's own
//! `AccessControl` role sets. Default-deny.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::enums::Role;
use crate::models::AccessControl;

/// Operation classes gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Submit,
    Review,
    Administer,
}

impl Capability {
    /// The role that grants this capability.
    pub fn granted_by(self) -> Role {
        match self {
            Self::Submit => Role::Submitter,
            Self::Review => Role::Reviewer,
            Self::Administer => Role::Admin,
        }
    }
}

/// The authenticated caller, as supplied by a [`PrincipalProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub roles: BTreeSet<Role>,
}

impl Principal {
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id: id.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.is_admin() || self.roles.contains(&capability.granted_by())
    }

    pub fn can_view(&self, acl: &AccessControl) -> bool {
        self.is_admin() || intersects(&self.roles, &acl.view_roles)
    }

    pub fn can_edit(&self, acl: &AccessControl) -> bool {
        self.is_admin() || intersects(&self.roles, &acl.edit_roles)
    }
}

/// Whether any caller role appears in `allowed`.
pub fn intersects(caller: &BTreeSet<Role>, allowed: &BTreeSet<Role>) -> bool {
    caller.iter().any(|r| allowed.contains(r))
}

/// Source of the calling principal. Credentials are issued elsewhere;
/// implementations only read what an upstream gateway already verified.
pub trait PrincipalProvider: Send + Sync {
    type Request: ?Sized;

    fn principal(&self, request: &Self::Request) -> Option<Principal>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl(view: &[Role], edit: &[Role]) -> AccessControl {
        AccessControl {
            view_roles: view.iter().copied().collect(),
            edit_roles: edit.iter().copied().collect(),
        }
    }

    #[test]
    fn capability_follows_role() {
        let p = Principal::new("bob", [Role::Reviewer]);
        assert!(p.has_capability(Capability::Review));
        assert!(!p.has_capability(Capability::Submit));
        assert!(!p.has_capability(Capability::Administer));
    }

    #[test]
    fn admin_has_every_capability() {
        let p = Principal::new("root", [Role::Admin]);
        assert!(p.has_capability(Capability::Submit));
        assert!(p.has_capability(Capability::Review));
    }

    #[test]
    fn view_requires_role_intersection() {
        let restricted = acl(&[Role::Admin], &[Role::Admin]);
        let open = acl(&[Role::Viewer, Role::Reviewer], &[Role::Submitter]);
        let viewer = Principal::new("v", [Role::Viewer]);

        assert!(!viewer.can_view(&restricted));
        assert!(viewer.can_view(&open));
        assert!(!viewer.can_edit(&open));
        assert!(Principal::new("root", [Role::Admin]).can_view(&restricted));
    }

    #[test]
    fn principal_without_roles_is_denied() {
        let nobody = Principal::new("anon", []);
        assert!(!nobody.can_view(&AccessControl::default()));
        assert!(!nobody.has_capability(Capability::Submit));
    }
}
