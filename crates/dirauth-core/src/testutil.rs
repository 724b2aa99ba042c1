//! Fixtures shared by the workspace's tests.

use std::collections::BTreeMap;

use crate::authority::Authority;
use crate::command::Command;
use crate::crypto::{KeyPair, X25519Key};
use crate::descriptor::{sign_descriptor_for_epoch, transport, MixDescriptor, LAYER_PROVIDER};
use crate::encoding::Codec;
use crate::transaction::Transaction;

pub fn mix_descriptor(keys: &KeyPair, name: &str, layer: u8, epoch: u64) -> MixDescriptor {
    let mut mix_keys = BTreeMap::new();
    mix_keys.insert(epoch, X25519Key::generate());
    let mut addresses = BTreeMap::new();
    addresses.insert(
        transport::TCP4.to_string(),
        vec!["127.0.0.1:29483".to_string()],
    );
    MixDescriptor {
        name: name.to_string(),
        identity_key: keys.public,
        link_key: X25519Key::generate(),
        mix_keys,
        addresses,
        kaetzchen: None,
        layer,
        load_weight: 0,
    }
}

pub fn provider_descriptor(keys: &KeyPair, name: &str, epoch: u64) -> MixDescriptor {
    let mut desc = mix_descriptor(keys, name, LAYER_PROVIDER, epoch);
    let mut params = BTreeMap::new();
    params.insert(
        "endpoint".to_string(),
        serde_json::Value::String("+echo".to_string()),
    );
    let mut kaetzchen = BTreeMap::new();
    kaetzchen.insert("echo".to_string(), params);
    desc.kaetzchen = Some(kaetzchen);
    desc
}

/// A node with its keys, descriptor and signed blob
#[derive(Debug, Clone)]
pub struct TestNode {
    pub keys: KeyPair,
    pub descriptor: MixDescriptor,
    pub raw: Vec<u8>,
}

impl TestNode {
    pub fn mix(codec: &Codec, name: &str, epoch: u64) -> Self {
        let keys = KeyPair::generate();
        let descriptor = mix_descriptor(&keys, name, 0, epoch);
        Self::sign(codec, keys, descriptor, epoch)
    }

    pub fn provider(codec: &Codec, name: &str, epoch: u64) -> Self {
        let keys = KeyPair::generate();
        let descriptor = provider_descriptor(&keys, name, epoch);
        Self::sign(codec, keys, descriptor, epoch)
    }

    /// Same identity, fresh descriptor for another epoch
    pub fn renew(&self, codec: &Codec, epoch: u64) -> Self {
        let mut descriptor = self.descriptor.clone();
        descriptor.mix_keys.clear();
        descriptor.mix_keys.insert(epoch, X25519Key::generate());
        Self::sign(codec, self.keys.clone(), descriptor, epoch)
    }

    fn sign(codec: &Codec, keys: KeyPair, descriptor: MixDescriptor, epoch: u64) -> Self {
        let raw = sign_descriptor_for_epoch(codec, &keys, &descriptor, epoch)
            .expect("signing a test descriptor");
        TestNode {
            keys,
            descriptor,
            raw,
        }
    }

    /// Raw publish transaction for this node's descriptor
    pub fn publish_tx(&self, codec: &Codec, epoch: u64) -> Vec<u8> {
        let tx = Transaction::sign_new(
            codec,
            &self.keys,
            Command::PublishMixDescriptor,
            epoch,
            hex::encode(&self.raw),
        )
        .expect("signing a test transaction");
        tx.encode(codec).expect("encoding a test transaction")
    }
}

pub fn add_authority_tx(
    codec: &Codec,
    signer: &KeyPair,
    authority: &Authority,
    epoch: u64,
) -> Vec<u8> {
    let payload = codec.encode(authority).expect("encoding a test authority");
    let payload = String::from_utf8(payload).expect("authority json is utf-8");
    Transaction::sign_new(codec, signer, Command::AddNewAuthority, epoch, payload)
        .and_then(|tx| tx.encode(codec))
        .expect("building a test authority transaction")
}
