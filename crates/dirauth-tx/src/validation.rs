use dirauth_core::crypto::keys::PUBLIC_KEY_LENGTH;
use dirauth_core::crypto::signature::SIGNATURE_LENGTH;
use dirauth_core::{
    tx_hash, verifier_from_descriptor, verify_and_parse_authority, verify_and_parse_descriptor,
    Authority, Codec, Command, Hash, MixDescriptor, Transaction, ValidatorUpdate,
};
use dirauth_state::{LedgerState, Storage};

use crate::error::TxError;
use crate::policy::AuthorizationPolicy;

/// Command-specific content of an authenticated transaction
#[derive(Debug, Clone, PartialEq)]
pub enum TxKind {
    PublishDescriptor {
        raw: Vec<u8>,
        descriptor: MixDescriptor,
    },
    AddAuthority {
        raw: Vec<u8>,
        authority: Authority,
        update: ValidatorUpdate,
    },
}

/// A transaction that passed every stateless and policy check
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTx {
    pub hash: Hash,
    pub tx: Transaction,
    pub kind: TxKind,
}

impl ValidatedTx {
    pub fn epoch(&self) -> u64 {
        self.tx.epoch
    }
}

/// Decode and authenticate a raw transaction, then check its payload.
pub fn validate_transaction<S: Storage>(
    codec: &Codec,
    raw: &[u8],
    state: &LedgerState<S>,
    policy: &dyn AuthorizationPolicy,
) -> Result<ValidatedTx, TxError> {
    let tx = Transaction::decode(codec, raw).map_err(|e| TxError::Malformed(e.to_string()))?;

    if tx.public_key.len() != PUBLIC_KEY_LENGTH * 2 {
        return Err(TxError::WrongPublicKeySize);
    }
    if tx.signature.len() != SIGNATURE_LENGTH * 2 {
        return Err(TxError::WrongSignatureSize);
    }
    tx.verify_signature(codec)
        .map_err(|_| TxError::WrongSignature)?;

    let command = Command::try_from(tx.command).map_err(|_| TxError::UnknownCommand(tx.command))?;
    let kind = match command {
        Command::PublishMixDescriptor => validate_descriptor(codec, &tx, policy)?,
        Command::AddNewAuthority => validate_authority(codec, &tx, state, policy)?,
        // Documents are only produced by the ledger; queries are not transactions.
        Command::AddConsensusDocument | Command::GetConsensus | Command::GetEpoch => {
            return Err(TxError::UnknownCommand(tx.command))
        }
    };

    Ok(ValidatedTx {
        hash: tx_hash(raw),
        tx,
        kind,
    })
}

fn validate_descriptor(
    codec: &Codec,
    tx: &Transaction,
    policy: &dyn AuthorizationPolicy,
) -> Result<TxKind, TxError> {
    let raw = hex::decode(&tx.payload)
        .map_err(|e| TxError::DescriptorInvalidVerifier(e.to_string()))?;
    let verifier = verifier_from_descriptor(codec, &raw)
        .map_err(|e| TxError::DescriptorInvalidVerifier(e.to_string()))?;
    let descriptor = verify_and_parse_descriptor(codec, &verifier, &raw, tx.epoch, tx.epoch)
        .map_err(|e| TxError::DescriptorFalseVerification(e.to_string()))?;
    if !policy.authorize_descriptor(&descriptor) {
        return Err(TxError::DescriptorNotAuthorized);
    }
    Ok(TxKind::PublishDescriptor { raw, descriptor })
}

fn validate_authority<S: Storage>(
    codec: &Codec,
    tx: &Transaction,
    state: &LedgerState<S>,
    policy: &dyn AuthorizationPolicy,
) -> Result<TxKind, TxError> {
    let raw = tx.payload.as_bytes().to_vec();
    let (authority, update) = verify_and_parse_authority(codec, &raw)
        .map_err(|e| TxError::AuthorityParse(e.to_string()))?;
    if state.has_authority(&update.pub_key) {
        return Err(TxError::AuthorityExists);
    }
    let signer = tx
        .address()
        .map_err(|e| TxError::AuthorityParse(e.to_string()))?;
    if !policy.authorize_authority(&signer, &authority) {
        return Err(TxError::AuthorityNotAuthorized);
    }
    Ok(TxKind::AddAuthority {
        raw,
        authority,
        update,
    })
}
