use crate::entities::{Action, Block, Checks, Plan, Sequence};
use crate::ids::Id;
use crate::state::State;

/// Tagged-variant discriminator for the five entity kinds: a sum type plus
/// visitor, rather than a trait object hierarchy, since the set of kinds is
/// closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EntityKind {
    Plan,
    Block,
    Checks,
    Sequence,
    Action,
}

/// Common capability set {GetID, GetState, SetState, Type} shared by every
/// entity kind, so the recovery walker and the Vault's generic update paths
/// don't need five parallel implementations.
pub trait Entity {
    fn id(&self) -> &Id;
    fn plan_id(&self) -> Option<&Id>;
    fn state(&self) -> &State;
    fn state_mut(&mut self) -> &mut State;
    fn kind(&self) -> EntityKind;
}

impl Entity for Plan {
    fn id(&self) -> &Id {
        &self.id
    }
    fn plan_id(&self) -> Option<&Id> {
        None
    }
    fn state(&self) -> &State {
        &self.state
    }
    fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Plan
    }
}

impl Entity for Block {
    fn id(&self) -> &Id {
        &self.id
    }
    fn plan_id(&self) -> Option<&Id> {
        Some(&self.plan_id)
    }
    fn state(&self) -> &State {
        &self.state
    }
    fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Block
    }
}

impl Entity for Checks {
    fn id(&self) -> &Id {
        &self.id
    }
    fn plan_id(&self) -> Option<&Id> {
        Some(&self.plan_id)
    }
    fn state(&self) -> &State {
        &self.state
    }
    fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Checks
    }
}

impl Entity for Sequence {
    fn id(&self) -> &Id {
        &self.id
    }
    fn plan_id(&self) -> Option<&Id> {
        Some(&self.plan_id)
    }
    fn state(&self) -> &State {
        &self.state
    }
    fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Sequence
    }
}

impl Entity for Action {
    fn id(&self) -> &Id {
        &self.id
    }
    fn plan_id(&self) -> Option<&Id> {
        Some(&self.plan_id)
    }
    fn state(&self) -> &State {
        &self.state
    }
    fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Action
    }
}

/// Mutable-borrow sum type used by the recovery walker to visit every
/// sub-object of a Plan tree without owning links between them; children
/// only ever carry their `PlanID`.
pub enum EntityRefMut<'a> {
    Block(&'a mut Block),
    Checks(&'a mut Checks),
    Sequence(&'a mut Sequence),
    Action(&'a mut Action),
}

impl<'a> EntityRefMut<'a> {
    pub fn entity(&self) -> &dyn Entity {
        match self {
            EntityRefMut::Block(b) => &**b as &dyn Entity,
            EntityRefMut::Checks(c) => &**c as &dyn Entity,
            EntityRefMut::Sequence(s) => &**s as &dyn Entity,
            EntityRefMut::Action(a) => &**a as &dyn Entity,
        }
    }
}
