use dirauth_core::{Address, Authority, MixDescriptor};

/// Decides who may publish descriptors and join the authority set
pub trait AuthorizationPolicy: Send + Sync {
    fn authorize_descriptor(&self, descriptor: &MixDescriptor) -> bool;

    /// `signer` is the address of the transaction's signing key
    fn authorize_authority(&self, signer: &Address, authority: &Authority) -> bool;
}

/// Accepts every well-formed descriptor and any authority whose voting
/// power is positive and at most `max_voting_power`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePolicy {
    pub max_voting_power: i64,
}

impl Default for ReferencePolicy {
    fn default() -> Self {
        ReferencePolicy {
            max_voting_power: 1,
        }
    }
}

impl AuthorizationPolicy for ReferencePolicy {
    fn authorize_descriptor(&self, _descriptor: &MixDescriptor) -> bool {
        true
    }

    fn authorize_authority(&self, _signer: &Address, authority: &Authority) -> bool {
        authority.power > 0 && authority.power <= self.max_voting_power
    }
}
