use crate::cancel::Cancellation;
use crate::errors::CoreError;
use crate::registry::PluginRegistry;
use crate::runner::action::ActionRunner;
use crate::vault::Vault;
use chrono::Utc;
use coercion_domain::{Id, Sequence, Status};

/// Drives one Sequence's Actions strictly in listed order. A permanently-
/// failed Action stops the Sequence; the remaining Actions stay NotStarted
/// rather than being marked Stopped.
pub struct SequenceRunner<'a> {
    pub registry: &'a PluginRegistry,
    pub vault: &'a dyn Vault,
}

impl<'a> SequenceRunner<'a> {
    pub fn new(registry: &'a PluginRegistry, vault: &'a dyn Vault) -> Self {
        Self { registry, vault }
    }

    /// Returns `true` if the Sequence completed without a failed Action.
    pub async fn run(&self, plan_id: &Id, sequence: &mut Sequence, cancellation: Cancellation) -> Result<bool, CoreError> {
        sequence.state.mark_running(Utc::now())?;
        self.persist_sequence(plan_id, sequence).await?;

        let action_runner = ActionRunner::new(self.registry, self.vault);
        let mut ok = true;
        for action in &mut sequence.actions {
            if cancellation.is_cancelled() {
                ok = false;
                break;
            }
            action_runner.run(plan_id, action, cancellation.child()).await?;
            if action.state.status != Status::Completed {
                ok = false;
                break;
            }
        }

        let terminal = if ok {
            Status::Completed
        } else if cancellation.is_cancelled() {
            Status::Stopped
        } else {
            Status::Failed
        };
        sequence.state.mark_terminal(terminal, Utc::now())?;
        self.persist_sequence(plan_id, sequence).await?;
        Ok(ok)
    }

    async fn persist_sequence(&self, plan_id: &Id, sequence: &mut Sequence) -> Result<(), CoreError> {
        let expected = sequence.state.etag.clone().unwrap_or_default();
        let new_etag = self.vault.update_sequence(plan_id, &sequence.id, sequence.state.clone(), &expected).await?;
        sequence.state.etag = Some(new_etag);
        Ok(())
    }
}
