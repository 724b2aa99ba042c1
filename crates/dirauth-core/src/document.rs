//! Per-epoch consensus documents.
//!
//! The wire form embeds the raw signed descriptor blobs, so parsing a
//! document re-verifies every descriptor it references.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr, PickFirst};

use crate::crypto::PublicKey;
use crate::descriptor::{
    is_descriptor_well_formed, verifier_from_descriptor, verify_and_parse_descriptor,
    MixDescriptor, LAYER_PROVIDER,
};
use crate::encoding::Codec;
use crate::error::CoreError;
use crate::parameters::Parameters;

pub const DOCUMENT_VERSION: &str = "document-v0";
/// Topology layers are numbered below the provider layer tag
pub const MAX_LAYERS: usize = LAYER_PROVIDER as usize;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentWire {
    pub version: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub epoch: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub genesis_epoch: u64,
    pub parameters: Parameters,
    #[serde_as(as = "Vec<Vec<Hex>>")]
    pub topology: Vec<Vec<Vec<u8>>>,
    #[serde_as(as = "Vec<Hex>")]
    pub providers: Vec<Vec<u8>>,
}

impl DocumentWire {
    pub fn new(
        epoch: u64,
        genesis_epoch: u64,
        parameters: Parameters,
        topology: Vec<Vec<Vec<u8>>>,
        providers: Vec<Vec<u8>>,
    ) -> Self {
        DocumentWire {
            version: DOCUMENT_VERSION.to_string(),
            epoch,
            genesis_epoch,
            parameters,
            topology,
            providers,
        }
    }
}

/// A verified document with its descriptors parsed
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub epoch: u64,
    pub genesis_epoch: u64,
    pub parameters: Parameters,
    pub topology: Vec<Vec<MixDescriptor>>,
    pub providers: Vec<MixDescriptor>,
}

impl Document {
    /// Layer index currently holding `identity`, if any
    pub fn layer_of(&self, identity: &PublicKey) -> Option<usize> {
        self.topology
            .iter()
            .position(|layer| layer.iter().any(|d| d.identity_key == *identity))
    }

    pub fn is_provider(&self, identity: &PublicKey) -> bool {
        self.providers.iter().any(|d| d.identity_key == *identity)
    }
}

pub fn serialize_document(codec: &Codec, doc: &DocumentWire) -> Result<Vec<u8>, CoreError> {
    let mut doc = doc.clone();
    doc.version = DOCUMENT_VERSION.to_string();
    codec.encode(&doc)
}

fn verify_embedded(codec: &Codec, blob: &[u8], epoch: u64) -> Result<MixDescriptor, CoreError> {
    let verifier = verifier_from_descriptor(codec, blob)?;
    verify_and_parse_descriptor(codec, &verifier, blob, epoch, epoch)
}

pub fn verify_and_parse_document(codec: &Codec, raw: &[u8]) -> Result<Document, CoreError> {
    let wire: DocumentWire = codec.decode(raw)?;
    if wire.version != DOCUMENT_VERSION {
        return Err(CoreError::InvalidDocument(format!(
            "invalid document version '{}'",
            wire.version
        )));
    }
    if wire.genesis_epoch == 0 {
        return Err(CoreError::InvalidDocument(
            "document has invalid genesis epoch".to_string(),
        ));
    }

    let topology = wire
        .topology
        .iter()
        .map(|layer| {
            layer
                .iter()
                .map(|blob| verify_embedded(codec, blob, wire.epoch))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    let providers = wire
        .providers
        .iter()
        .map(|blob| verify_embedded(codec, blob, wire.epoch))
        .collect::<Result<Vec<_>, _>>()?;

    let mut doc = Document {
        epoch: wire.epoch,
        genesis_epoch: wire.genesis_epoch,
        parameters: wire.parameters,
        topology,
        providers,
    };
    is_document_well_formed(&doc)?;

    for (layer, nodes) in doc.topology.iter_mut().enumerate() {
        for desc in nodes.iter_mut() {
            desc.layer = u8::try_from(layer).map_err(|_| {
                CoreError::InvalidDocument(format!("topology layer {layer} out of range"))
            })?;
        }
    }
    Ok(doc)
}

pub fn is_document_well_formed(doc: &Document) -> Result<(), CoreError> {
    let mut seen = BTreeSet::new();
    if doc.topology.is_empty() {
        return Err(CoreError::InvalidDocument(
            "document contains no topology".to_string(),
        ));
    }
    if doc.topology.len() > MAX_LAYERS {
        return Err(CoreError::InvalidDocument(format!(
            "document topology has {} layers, at most {} allowed",
            doc.topology.len(),
            MAX_LAYERS
        )));
    }
    for (layer, nodes) in doc.topology.iter().enumerate() {
        if nodes.is_empty() {
            return Err(CoreError::InvalidDocument(format!(
                "document topology layer {layer} contains no nodes"
            )));
        }
        for desc in nodes {
            is_descriptor_well_formed(desc, doc.epoch)?;
            if !seen.insert(desc.identity_key) {
                return Err(CoreError::InvalidDocument(format!(
                    "document contains multiple entries for {}",
                    desc.identity_key
                )));
            }
        }
    }
    if doc.providers.is_empty() {
        return Err(CoreError::InvalidDocument(
            "document contains no providers".to_string(),
        ));
    }
    for desc in &doc.providers {
        is_descriptor_well_formed(desc, doc.epoch)?;
        if desc.layer != LAYER_PROVIDER {
            return Err(CoreError::InvalidDocument(format!(
                "document lists {} as a provider with layer {}",
                desc.identity_key, desc.layer
            )));
        }
        if !seen.insert(desc.identity_key) {
            return Err(CoreError::InvalidDocument(format!(
                "document contains multiple entries for {}",
                desc.identity_key
            )));
        }
    }
    Ok(())
}
