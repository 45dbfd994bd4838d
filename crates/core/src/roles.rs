//! Well-known role name constants and the role hierarchy.
//!
//! These must match the `CHECK` constraint on `users.role`.

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MEMBER: &str = "member";
pub const ROLE_VIEWER: &str = "viewer";

/// All assignable roles, highest privilege first.
pub const ALL_ROLES: &[&str] = &[ROLE_OWNER, ROLE_ADMIN, ROLE_MEMBER, ROLE_VIEWER];

/// Numeric rank of a role; unknown roles rank below `viewer`.
pub fn role_rank(role: &str) -> u8 {
    match role {
        ROLE_OWNER => 4,
        ROLE_ADMIN => 3,
        ROLE_MEMBER => 2,
        ROLE_VIEWER => 1,
        _ => 0,
    }
}

pub fn is_valid_role(role: &str) -> bool {
    ALL_ROLES.contains(&role)
}

/// Admins and owners manage the organization (users, tenants, billing).
pub fn can_manage(role: &str) -> bool {
    role_rank(role) >= role_rank(ROLE_ADMIN)
}

/// Members and above may create and modify workflows, credentials, exports.
pub fn can_edit(role: &str) -> bool {
    role_rank(role) >= role_rank(ROLE_MEMBER)
}

/// Whether `actor` may assign `target` to someone. Nobody but an owner may
/// hand out the owner role, and nobody may grant a role above their own.
pub fn can_assign(actor: &str, target: &str) -> bool {
    if !is_valid_role(target) || !can_manage(actor) {
        return false;
    }
    if target == ROLE_OWNER {
        return actor == ROLE_OWNER;
    }
    role_rank(target) <= role_rank(actor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_is_ordered() {
        assert!(role_rank(ROLE_OWNER) > role_rank(ROLE_ADMIN));
        assert!(role_rank(ROLE_ADMIN) > role_rank(ROLE_MEMBER));
        assert!(role_rank(ROLE_MEMBER) > role_rank(ROLE_VIEWER));
        assert_eq!(role_rank("superuser"), 0);
    }

    #[test]
    fn edit_and_manage_permissions() {
        assert!(can_edit(ROLE_MEMBER));
        assert!(!can_edit(ROLE_VIEWER));
        assert!(can_manage(ROLE_ADMIN));
        assert!(!can_manage(ROLE_MEMBER));
    }

    #[test]
    fn only_owner_grants_owner() {
        assert!(can_assign(ROLE_OWNER, ROLE_OWNER));
        assert!(!can_assign(ROLE_ADMIN, ROLE_OWNER));
        assert!(can_assign(ROLE_ADMIN, ROLE_MEMBER));
        assert!(!can_assign(ROLE_MEMBER, ROLE_VIEWER));
        assert!(!can_assign(ROLE_OWNER, "root"));
    }
}
