use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr, PickFirst};

use crate::cert::KEY_TYPE_ED25519;
use crate::crypto::PublicKey;
use crate::encoding::Codec;
use crate::error::CoreError;

/// A consensus validator record as submitted in an authority transaction
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authority {
    pub auth: String,
    #[serde_as(as = "Hex")]
    pub pub_key: Vec<u8>,
    pub key_type: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub power: i64,
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub credential: Vec<u8>,
}

impl Authority {
    pub fn new(auth: impl Into<String>, pub_key: &PublicKey, power: i64) -> Self {
        Authority {
            auth: auth.into(),
            pub_key: pub_key.to_vec(),
            key_type: KEY_TYPE_ED25519.to_string(),
            power,
            credential: Vec::new(),
        }
    }
}

/// Change to the validator set handed back to the consensus engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: PublicKey,
    pub power: i64,
}

pub fn verify_and_parse_authority(
    codec: &Codec,
    payload: &[u8],
) -> Result<(Authority, ValidatorUpdate), CoreError> {
    let authority: Authority = codec.decode(payload)?;
    if authority.auth.is_empty() {
        return Err(CoreError::InvalidAuthority(
            "authority name is empty".to_string(),
        ));
    }
    if authority.power < 0 {
        return Err(CoreError::InvalidAuthority(format!(
            "negative voting power {}",
            authority.power
        )));
    }
    if authority.key_type != KEY_TYPE_ED25519 {
        return Err(CoreError::InvalidAuthority(format!(
            "unsupported key type '{}'",
            authority.key_type
        )));
    }
    let pub_key = PublicKey::from_slice(&authority.pub_key)?;
    pub_key.to_verifying_key()?;
    let update = ValidatorUpdate {
        pub_key,
        power: authority.power,
    };
    Ok((authority, update))
}
