//! Mix node descriptors and their self-signed wire form.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::cert;
use crate::crypto::{KeyPair, PublicKey, X25519Key};
use crate::encoding::Codec;
use crate::error::CoreError;

pub const DESCRIPTOR_VERSION: &str = "v0";
/// Number of epochs a descriptor certificate stays valid for
pub const CERTIFICATE_EXPIRATION: u64 = 600;
pub const LAYER_PROVIDER: u8 = 255;
pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_ENDPOINT_LENGTH: usize = 64;
/// Mix keys may be published for `[epoch, epoch + MIX_KEY_WINDOW)`
pub const MIX_KEY_WINDOW: u64 = 3;
pub const KAETZCHEN_ENDPOINT: &str = "endpoint";

pub mod transport {
    pub const TCP: &str = "tcp";
    pub const TCP4: &str = "tcp4";
    pub const TCP6: &str = "tcp6";
}

pub type Kaetzchen = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// A mix node or provider advertisement for an epoch window
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MixDescriptor {
    pub name: String,
    pub identity_key: PublicKey,
    pub link_key: X25519Key,
    pub mix_keys: BTreeMap<u64, X25519Key>,
    pub addresses: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kaetzchen: Option<Kaetzchen>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub layer: u8,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub load_weight: u8,
}

impl MixDescriptor {
    pub fn is_provider(&self) -> bool {
        self.layer == LAYER_PROVIDER
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeDescriptor {
    version: String,
    descriptor: MixDescriptor,
}

/// Self-sign `desc` with the node's identity key.
pub fn sign_descriptor(
    codec: &Codec,
    signer: &KeyPair,
    desc: &MixDescriptor,
    expiration: u64,
) -> Result<Vec<u8>, CoreError> {
    let wrapped = NodeDescriptor {
        version: DESCRIPTOR_VERSION.to_string(),
        descriptor: desc.clone(),
    };
    let payload = codec.encode(&wrapped)?;
    cert::sign(signer, &payload, expiration)
}

/// Sign with the standard expiration for an upload targeting `epoch`.
pub fn sign_descriptor_for_epoch(
    codec: &Codec,
    signer: &KeyPair,
    desc: &MixDescriptor,
    epoch: u64,
) -> Result<Vec<u8>, CoreError> {
    let expiration = epoch
        .checked_add(CERTIFICATE_EXPIRATION)
        .ok_or_else(|| invalid(format!("epoch {epoch} out of range")))?;
    sign_descriptor(codec, signer, desc, expiration)
}

fn decode_payload(codec: &Codec, payload: &[u8]) -> Result<MixDescriptor, CoreError> {
    let wrapped: NodeDescriptor = codec.decode(payload)?;
    if wrapped.version != DESCRIPTOR_VERSION {
        return Err(CoreError::InvalidDescriptor(format!(
            "invalid descriptor version '{}'",
            wrapped.version
        )));
    }
    Ok(wrapped.descriptor)
}

/// Identity key claimed inside the blob. Nothing is verified.
pub fn verifier_from_descriptor(codec: &Codec, blob: &[u8]) -> Result<PublicKey, CoreError> {
    let payload = cert::get_certified(blob)?;
    let wrapped: NodeDescriptor = codec.decode(&payload)?;
    Ok(wrapped.descriptor.identity_key)
}

pub fn parse_descriptor_without_verify(
    codec: &Codec,
    blob: &[u8],
) -> Result<MixDescriptor, CoreError> {
    decode_payload(codec, &cert::get_certified(blob)?)
}

/// Verify a signed descriptor for `epoch`, checking expiry against `now`.
pub fn verify_and_parse_descriptor(
    codec: &Codec,
    verifier: &PublicKey,
    blob: &[u8],
    epoch: u64,
    now: u64,
) -> Result<MixDescriptor, CoreError> {
    let signatures = cert::get_signatures(blob)?;
    if signatures.len() != 1 {
        return Err(CoreError::SignatureCount {
            expected: 1,
            got: signatures.len(),
        });
    }
    let payload = cert::verify(verifier, blob, now)?;
    let desc = decode_payload(codec, &payload)?;
    if desc.identity_key != *verifier {
        return Err(CoreError::InvalidDescriptor(
            "identity key does not match signer".to_string(),
        ));
    }
    is_descriptor_well_formed(&desc, epoch)?;
    Ok(desc)
}

fn invalid(msg: String) -> CoreError {
    CoreError::InvalidDescriptor(msg)
}

pub fn is_descriptor_well_formed(desc: &MixDescriptor, epoch: u64) -> Result<(), CoreError> {
    if desc.name.is_empty() {
        return Err(invalid("descriptor missing name".to_string()));
    }
    if desc.name.len() > MAX_NAME_LENGTH {
        return Err(invalid(format!(
            "descriptor name '{}' exceeds max length",
            desc.name
        )));
    }
    if desc.link_key.is_zero() {
        return Err(invalid("descriptor missing link key".to_string()));
    }
    if desc.identity_key == PublicKey::default() {
        return Err(invalid("descriptor missing identity key".to_string()));
    }
    let window_end = epoch
        .checked_add(MIX_KEY_WINDOW)
        .ok_or_else(|| invalid(format!("epoch {epoch} out of range")))?;
    if !desc.mix_keys.contains_key(&epoch) {
        return Err(invalid(format!("descriptor missing mix key for epoch {epoch}")));
    }
    if let Some(bad) = desc
        .mix_keys
        .keys()
        .find(|e| **e < epoch || **e >= window_end)
    {
        return Err(invalid(format!(
            "descriptor contains mix key for invalid epoch {bad}"
        )));
    }

    if desc.addresses.is_empty() {
        return Err(invalid("descriptor missing addresses".to_string()));
    }
    for (transport, addrs) in &desc.addresses {
        if addrs.is_empty() {
            return Err(invalid(format!(
                "descriptor contains empty address list for transport '{transport}'"
            )));
        }
        let expected = match transport.as_str() {
            "" => return Err(invalid("descriptor contains invalid transport".to_string())),
            transport::TCP4 => Some(IpVersion::V4),
            transport::TCP6 => Some(IpVersion::V6),
            other => {
                // Other transports are only spoken between clients and providers.
                if !desc.is_provider() {
                    return Err(invalid(format!(
                        "non-provider published transport '{other}'"
                    )));
                }
                if other != transport::TCP {
                    continue;
                }
                None
            }
        };
        for addr in addrs {
            validate_address(addr, expected)
                .map_err(|reason| invalid(format!("invalid address ['{transport}']'{addr}': {reason}")))?;
        }
    }
    if desc
        .addresses
        .get(transport::TCP4)
        .map_or(true, |a| a.is_empty())
    {
        return Err(invalid("descriptor contains no tcp4 addresses".to_string()));
    }

    if desc.is_provider() {
        if let Some(kaetzchen) = &desc.kaetzchen {
            validate_kaetzchen(kaetzchen)?;
        }
    } else if desc.kaetzchen.is_some() {
        return Err(invalid(
            "descriptor contains kaetzchen for a non-provider".to_string(),
        ));
    }
    Ok(())
}

fn validate_kaetzchen(kaetzchen: &Kaetzchen) -> Result<(), CoreError> {
    for (capability, params) in kaetzchen {
        if capability.is_empty() {
            return Err(invalid("kaetzchen capability name is empty".to_string()));
        }
        let endpoint = match params.get(KAETZCHEN_ENDPOINT) {
            Some(serde_json::Value::String(ep)) => ep,
            Some(_) => {
                return Err(invalid(format!(
                    "capability '{capability}' has a non-string endpoint"
                )))
            }
            None => {
                return Err(invalid(format!(
                    "capability '{capability}' provided no endpoint"
                )))
            }
        };
        if endpoint.is_empty() || endpoint.len() > MAX_ENDPOINT_LENGTH {
            return Err(invalid(format!(
                "capability '{capability}' endpoint length out of bounds"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IpVersion {
    V4,
    V6,
}

fn split_host_port(addr: &str) -> Result<(&str, &str), String> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, port) = rest
            .split_once("]:")
            .ok_or_else(|| "missing port in address".to_string())?;
        return Ok((host, port));
    }
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| "missing port in address".to_string())?;
    if host.contains(':') {
        return Err("too many colons in address".to_string());
    }
    Ok((host, port))
}

fn validate_address(addr: &str, expected: Option<IpVersion>) -> Result<(), String> {
    let (host, port) = split_host_port(addr)?;
    if host.is_empty() {
        return Err("empty host".to_string());
    }
    let port: u16 = port.parse().map_err(|e| format!("bad port: {e}"))?;
    if port == 0 {
        return Err("port is 0".to_string());
    }
    match expected {
        Some(version) => {
            let ip: IpAddr = host.parse().map_err(|_| "address is not an IP".to_string())?;
            let actual = match ip {
                IpAddr::V4(_) => IpVersion::V4,
                IpAddr::V6(v6) if v6.to_ipv4_mapped().is_some() => IpVersion::V4,
                IpAddr::V6(_) => IpVersion::V6,
            };
            if actual != version {
                return Err("IP version mismatch".to_string());
            }
            Ok(())
        }
        None => {
            if host.parse::<IpAddr>().is_ok() || is_valid_hostname(host) {
                Ok(())
            } else {
                Err("invalid hostname".to_string())
            }
        }
    }
}

fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
