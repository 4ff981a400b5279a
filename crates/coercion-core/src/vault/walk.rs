//! Locates a sub-entity inside a `Plan` tree by ID. Children never hold
//! owning links back to their parents or siblings; the Vault is the only
//! thing that walks the tree, and it does so fresh on every update rather
//! than maintaining a parallel index.

use coercion_domain::{Action, Block, CheckSlots, Checks, Id, Plan, Sequence};

fn checks_slots_mut(slots: &mut CheckSlots) -> [Option<&mut Checks>; 5] {
    [slots.bypass.as_mut(), slots.pre.as_mut(), slots.cont.as_mut(), slots.post.as_mut(), slots.deferred.as_mut()]
}

pub fn find_block_mut<'a>(plan: &'a mut Plan, block_id: &Id) -> Option<&'a mut Block> {
    plan.blocks.iter_mut().find(|b| &b.id == block_id)
}

pub fn find_checks_mut<'a>(plan: &'a mut Plan, checks_id: &Id) -> Option<&'a mut Checks> {
    for slot in checks_slots_mut(&mut plan.checks) {
        if let Some(c) = slot {
            if &c.id == checks_id {
                return Some(c);
            }
        }
    }
    for block in &mut plan.blocks {
        for slot in checks_slots_mut(&mut block.checks) {
            if let Some(c) = slot {
                if &c.id == checks_id {
                    return Some(c);
                }
            }
        }
    }
    None
}

pub fn find_sequence_mut<'a>(plan: &'a mut Plan, sequence_id: &Id) -> Option<&'a mut Sequence> {
    plan.blocks.iter_mut().flat_map(|b| b.sequences.iter_mut()).find(|s| &s.id == sequence_id)
}

pub fn find_action_mut<'a>(plan: &'a mut Plan, action_id: &Id) -> Option<&'a mut Action> {
    for slot in checks_slots_mut(&mut plan.checks) {
        if let Some(c) = slot {
            if let Some(a) = c.actions.iter_mut().find(|a| &a.id == action_id) {
                return Some(a);
            }
        }
    }
    for block in &mut plan.blocks {
        for slot in checks_slots_mut(&mut block.checks) {
            if let Some(c) = slot {
                if let Some(a) = c.actions.iter_mut().find(|a| &a.id == action_id) {
                    return Some(a);
                }
            }
        }
        for seq in &mut block.sequences {
            if let Some(a) = seq.actions.iter_mut().find(|a| &a.id == action_id) {
                return Some(a);
            }
        }
    }
    None
}

/// All `(Block, derived_index)` pairs, used by recovery to flag `Pos`
/// discrepancies without mutating anything.
pub fn blocks_with_derived_pos(plan: &Plan) -> impl Iterator<Item = (&Block, usize)> {
    plan.blocks.iter().enumerate().map(|(i, b)| (b, i))
}
