use std::sync::Arc;

use dirauth_core::Codec;
use dirauth_state::{LedgerState, Storage};
use tracing::{debug, error, info};

use crate::error::TxError;
use crate::policy::{AuthorizationPolicy, ReferencePolicy};
use crate::validation::{validate_transaction, TxKind, ValidatedTx};

/// Validates raw transactions and applies them to the ledger's staging area
pub struct Executor<S: Storage> {
    state: Arc<LedgerState<S>>,
    policy: Arc<dyn AuthorizationPolicy>,
}

impl<S: Storage> Executor<S> {
    pub fn new(state: Arc<LedgerState<S>>) -> Self {
        Self::with_policy(state, Arc::new(ReferencePolicy::default()))
    }

    pub fn with_policy(state: Arc<LedgerState<S>>, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        Executor { state, policy }
    }

    pub fn state(&self) -> &Arc<LedgerState<S>> {
        &self.state
    }

    fn codec(&self) -> &Codec {
        self.state.codec()
    }

    /// Stateless and policy checks only; nothing is staged
    pub fn validate(&self, raw: &[u8]) -> Result<ValidatedTx, TxError> {
        validate_transaction(self.codec(), raw, &self.state, self.policy.as_ref())
    }

    /// Stage the effects of an already validated transaction
    pub fn execute(&self, validated: &ValidatedTx) -> Result<(), TxError> {
        let epoch = validated.epoch();
        let current = self.state.current_epoch();
        if !self.state.epoch_in_window(epoch) {
            return Err(TxError::WrongEpoch { epoch, current });
        }

        match &validated.kind {
            TxKind::PublishDescriptor { raw, descriptor } => {
                self.state
                    .update_mix_descriptor(raw, descriptor, epoch)
                    .map_err(|e| {
                        error!("Failed to publish descriptor (epoch {}): {}", current, e);
                        TxError::DescriptorUpdate(e.to_string())
                    })?;
                debug!(
                    "Staged descriptor {} for epoch {}",
                    descriptor.identity_key, epoch
                );
            }
            TxKind::AddAuthority {
                raw,
                authority,
                update,
            } => {
                self.state
                    .add_authority(raw, authority, *update)
                    .map_err(|e| {
                        error!("Failed to add new authority (epoch {}): {}", current, e);
                        TxError::AuthorityUpdate(e.to_string())
                    })?;
                info!("Added authority {} ({})", authority.auth, update.pub_key);
            }
        }
        Ok(())
    }

    /// Validate then execute
    pub fn deliver(&self, raw: &[u8]) -> Result<ValidatedTx, TxError> {
        let validated = self.validate(raw)?;
        self.execute(&validated)?;
        Ok(validated)
    }
}
