use crate::error::{AcademyError, DomainResult};

text_enum! {
    pub enum Role {
        Admin => "admin",
        Trainer => "trainer",
        Student => "student",
    }
}

impl Role {
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Admin | Role::Trainer)
    }
}

text_enum! {
    pub enum Visibility {
        Private => "private",
        Shared => "shared",
        Public => "public",
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Private
    }
}

/// The account performing an operation. Identity is resolved by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Catalog records carrying an owner and a visibility tier.
pub trait Governed {
    fn owner_id(&self) -> i64;
    fn visibility(&self) -> Visibility;

    fn visible_to(&self, actor: &Actor) -> bool {
        visible_to(self.visibility(), self.owner_id(), actor)
    }

    fn modifiable_by(&self, actor: &Actor) -> bool {
        can_modify(self.owner_id(), actor)
    }
}

pub fn visible_to(visibility: Visibility, owner_id: i64, actor: &Actor) -> bool {
    visibility == Visibility::Public
        || owner_id == actor.id
        || (visibility == Visibility::Shared && actor.is_elevated())
}

pub fn can_modify(owner_id: i64, actor: &Actor) -> bool {
    actor.is_elevated() || owner_id == actor.id
}

/// Completion records may only be amended by admins or the trainer who recorded them.
pub fn can_amend_completion(completed_by: i64, actor: &Actor) -> bool {
    actor.is_admin() || completed_by == actor.id
}

pub fn require_elevated(actor: &Actor, action: &str) -> DomainResult<()> {
    if actor.is_elevated() {
        Ok(())
    } else {
        Err(AcademyError::permission(format!(
            "Only trainers and admins can {action}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, Role, Visibility, can_amend_completion, can_modify, visible_to};

    const OWNER: i64 = 1;

    fn actor(id: i64, role: Role) -> Actor {
        Actor { id, role }
    }

    #[test]
    fn public_records_are_visible_to_students() {
        assert!(visible_to(Visibility::Public, OWNER, &actor(9, Role::Student)));
    }

    #[test]
    fn shared_records_need_an_elevated_role() {
        assert!(visible_to(Visibility::Shared, OWNER, &actor(2, Role::Trainer)));
        assert!(visible_to(Visibility::Shared, OWNER, &actor(3, Role::Admin)));
        assert!(!visible_to(Visibility::Shared, OWNER, &actor(9, Role::Student)));
    }

    #[test]
    fn private_records_are_owner_only() {
        assert!(visible_to(Visibility::Private, OWNER, &actor(OWNER, Role::Student)));
        assert!(!visible_to(Visibility::Private, OWNER, &actor(2, Role::Trainer)));
    }

    #[test]
    fn modification_and_amendment_rules() {
        assert!(can_modify(OWNER, &actor(2, Role::Trainer)));
        assert!(can_modify(OWNER, &actor(OWNER, Role::Student)));
        assert!(!can_modify(OWNER, &actor(9, Role::Student)));

        assert!(can_amend_completion(OWNER, &actor(5, Role::Admin)));
        assert!(!can_amend_completion(OWNER, &actor(2, Role::Trainer)));
    }
}
