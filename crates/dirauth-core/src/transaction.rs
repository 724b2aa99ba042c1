use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::command::{Command, PROTOCOL_VERSION};
use crate::crypto::{hash_blake3, sign, verify, Address, Hash, KeyPair, PublicKey, Sig};
use crate::encoding::Codec;
use crate::error::CoreError;

/// Signed transaction envelope. The payload is interpreted according to
/// `command` only after the envelope itself has been authenticated.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transaction {
    pub version: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub epoch: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub command: u64,
    pub public_key: String,
    pub signature: String,
    pub payload: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SignedFields<'a> {
    version: &'a str,
    epoch: u64,
    command: u64,
    public_key: &'a str,
    payload: &'a str,
}

impl Transaction {
    /// Build and sign a new transaction.
    pub fn sign_new(
        codec: &Codec,
        signer: &KeyPair,
        command: Command,
        epoch: u64,
        payload: String,
    ) -> Result<Self, CoreError> {
        let mut tx = Transaction {
            version: PROTOCOL_VERSION.to_string(),
            epoch,
            command: command.into(),
            public_key: signer.public.to_hex(),
            signature: String::new(),
            payload,
        };
        let digest = tx.signing_hash(codec)?;
        tx.signature = sign(&signer.secret, digest.as_bytes()).to_hex();
        Ok(tx)
    }

    /// Hash of the canonical encoding of everything but the signature
    pub fn signing_hash(&self, codec: &Codec) -> Result<Hash, CoreError> {
        let fields = SignedFields {
            version: &self.version,
            epoch: self.epoch,
            command: self.command,
            public_key: &self.public_key,
            payload: &self.payload,
        };
        Ok(hash_blake3(&codec.encode(&fields)?))
    }

    pub fn public_key_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(hex::decode(&self.public_key)?)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(hex::decode(&self.signature)?)
    }

    pub fn signer(&self) -> Result<PublicKey, CoreError> {
        PublicKey::from_slice(&self.public_key_bytes()?)
    }

    pub fn address(&self) -> Result<Address, CoreError> {
        Ok(self.signer()?.address())
    }

    pub fn verify_signature(&self, codec: &Codec) -> Result<(), CoreError> {
        let signer = self.signer()?;
        let signature = Sig::from_slice(&self.signature_bytes()?)?;
        verify(&signer, self.signing_hash(codec)?.as_bytes(), &signature)
    }

    pub fn encode(&self, codec: &Codec) -> Result<Vec<u8>, CoreError> {
        codec.encode(self)
    }

    pub fn decode(codec: &Codec, raw: &[u8]) -> Result<Self, CoreError> {
        codec.decode(raw)
    }
}

/// Identifier of a raw transaction as submitted
pub fn tx_hash(raw: &[u8]) -> Hash {
    hash_blake3(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let codec = Codec::canonical();
        let kp = KeyPair::generate();
        let tx = Transaction::sign_new(
            &codec,
            &kp,
            Command::AddNewAuthority,
            3,
            "{}".to_string(),
        )
        .unwrap();
        assert!(tx.verify_signature(&codec).is_ok());
        assert_eq!(tx.signer().unwrap(), kp.public);
        assert_eq!(tx.address().unwrap(), kp.public.address());
    }

    #[test]
    fn test_tampered_epoch_fails() {
        let codec = Codec::canonical();
        let kp = KeyPair::generate();
        let mut tx = Transaction::sign_new(
            &codec,
            &kp,
            Command::PublishMixDescriptor,
            3,
            "00".to_string(),
        )
        .unwrap();
        tx.epoch = 4;
        assert!(matches!(
            tx.verify_signature(&codec),
            Err(CoreError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wire_roundtrip_keeps_signature_valid() {
        let codec = Codec::canonical();
        let kp = KeyPair::generate();
        let tx = Transaction::sign_new(&codec, &kp, Command::GetEpoch, 1, String::new()).unwrap();
        let raw = tx.encode(&codec).unwrap();
        let decoded = Transaction::decode(&codec, &raw).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.verify_signature(&codec).is_ok());
    }
}
