//! Builds the consensus document for an epoch from uploaded descriptors.

use dirauth_core::{
    parse_descriptor_without_verify, serialize_document, verify_and_parse_document, Codec,
    Document, DocumentWire, Parameters, GENESIS_EPOCH,
};
use thiserror::Error;
use tracing::debug;

use crate::topology::{random_topology, topology_from_previous, Candidate};

/// Reasons a document could not be produced. Cloned into the commit memo.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("insufficient descriptors uploaded: have {have}, need {need}")]
    InsufficientDescriptors { have: usize, need: usize },

    #[error("no providers uploaded")]
    InsufficientProviders,

    #[error("generated document failed validation: {0}")]
    SelfCheck(String),

    #[error("conflicting document for epoch {0}")]
    Conflict(u64),
}

impl GenerateError {
    /// Retrying next block may succeed once more descriptors arrive
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GenerateError::InsufficientDescriptors { .. } | GenerateError::InsufficientProviders
        )
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub layers: usize,
    pub min_nodes_per_layer: usize,
    pub parameters: Parameters,
}

#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub document: Document,
    pub raw: Vec<u8>,
}

/// Generate the document for `epoch` from the raw descriptor blobs uploaded
/// for it. `previous` is the last committed document, if any.
pub fn generate(
    codec: &Codec,
    config: &GeneratorConfig,
    epoch: u64,
    descriptors: &[Vec<u8>],
    previous: Option<&Document>,
) -> Result<GeneratedDocument, GenerateError> {
    let mut nodes = Vec::new();
    let mut providers = Vec::new();
    for raw in descriptors {
        let desc = match parse_descriptor_without_verify(codec, raw) {
            Ok(desc) => desc,
            Err(e) => {
                debug!("Skipping unparsable descriptor for epoch {}: {}", epoch, e);
                continue;
            }
        };
        let candidate = Candidate {
            identity: desc.identity_key,
            raw: raw.clone(),
        };
        if desc.is_provider() {
            providers.push(candidate);
        } else {
            nodes.push(candidate);
        }
    }

    let need = config.layers * config.min_nodes_per_layer;
    if nodes.len() < need {
        return Err(GenerateError::InsufficientDescriptors {
            have: nodes.len(),
            need,
        });
    }
    if providers.is_empty() {
        return Err(GenerateError::InsufficientProviders);
    }

    nodes.sort_by(|a, b| a.identity.cmp(&b.identity));
    providers.sort_by(|a, b| a.identity.cmp(&b.identity));

    let topology = match previous {
        Some(prev) => topology_from_previous(&nodes, prev, config.layers),
        None => random_topology(&nodes, config.layers),
    };

    let wire = DocumentWire::new(
        epoch,
        GENESIS_EPOCH,
        config.parameters.clone(),
        topology,
        providers.into_iter().map(|c| c.raw).collect(),
    );
    let raw = serialize_document(codec, &wire)
        .map_err(|e| GenerateError::SelfCheck(format!("failed to serialize document: {e}")))?;

    let document = verify_and_parse_document(codec, &raw)
        .map_err(|e| GenerateError::SelfCheck(e.to_string()))?;
    if document.epoch != epoch {
        return Err(GenerateError::SelfCheck(format!(
            "document has invalid epoch {}",
            document.epoch
        )));
    }
    Ok(GeneratedDocument { document, raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirauth_core::testutil::TestNode;

    const EPOCH: u64 = 1;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            layers: 3,
            min_nodes_per_layer: 2,
            parameters: Parameters::default(),
        }
    }

    fn uploads(codec: &Codec, mixes: usize, providers: usize) -> Vec<Vec<u8>> {
        let mut out: Vec<Vec<u8>> = (0..mixes)
            .map(|i| TestNode::mix(codec, &format!("mix{i}"), EPOCH).raw)
            .collect();
        out.extend((0..providers).map(|i| TestNode::provider(codec, &format!("p{i}"), EPOCH).raw));
        out
    }

    #[test]
    fn test_generate_document() {
        let codec = Codec::canonical();
        let descriptors = uploads(&codec, 6, 2);
        let generated = generate(&codec, &config(), EPOCH, &descriptors, None).unwrap();

        assert_eq!(generated.document.epoch, EPOCH);
        assert_eq!(generated.document.genesis_epoch, GENESIS_EPOCH);
        assert_eq!(generated.document.topology.len(), 3);
        assert!(generated.document.topology.iter().all(|l| l.len() == 2));
        assert_eq!(generated.document.providers.len(), 2);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let codec = Codec::canonical();
        let mut descriptors = uploads(&codec, 7, 1);
        let a = generate(&codec, &config(), EPOCH, &descriptors, None).unwrap();
        // Upload order must not matter.
        descriptors.reverse();
        let b = generate(&codec, &config(), EPOCH, &descriptors, None).unwrap();
        assert_eq!(a.raw, b.raw);
    }

    #[test]
    fn test_insufficient_descriptors() {
        let codec = Codec::canonical();
        let descriptors = uploads(&codec, 5, 1);
        let err = generate(&codec, &config(), EPOCH, &descriptors, None).unwrap_err();
        assert_eq!(err, GenerateError::InsufficientDescriptors { have: 5, need: 6 });
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_missing_providers() {
        let codec = Codec::canonical();
        let descriptors = uploads(&codec, 6, 0);
        let err = generate(&codec, &config(), EPOCH, &descriptors, None).unwrap_err();
        assert_eq!(err, GenerateError::InsufficientProviders);
    }

    #[test]
    fn test_garbage_uploads_are_skipped() {
        let codec = Codec::canonical();
        let mut descriptors = uploads(&codec, 6, 1);
        descriptors.push(b"not a certificate".to_vec());
        assert!(generate(&codec, &config(), EPOCH, &descriptors, None).is_ok());
    }

    #[test]
    fn test_wrong_epoch_descriptor_fails_self_check() {
        let codec = Codec::canonical();
        let mut descriptors = uploads(&codec, 6, 1);
        descriptors.push(TestNode::mix(&codec, "stale", EPOCH + 5).raw);
        let err = generate(&codec, &config(), EPOCH, &descriptors, None).unwrap_err();
        assert!(matches!(err, GenerateError::SelfCheck(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_previous_document_keeps_layers() {
        let codec = Codec::canonical();
        let nodes: Vec<TestNode> = (0..6)
            .map(|i| TestNode::mix(&codec, &format!("mix{i}"), EPOCH))
            .collect();
        let provider = TestNode::provider(&codec, "p", EPOCH);
        let mut first: Vec<Vec<u8>> = nodes.iter().map(|n| n.raw.clone()).collect();
        first.push(provider.raw.clone());
        let prev = generate(&codec, &config(), EPOCH, &first, None).unwrap();

        let mut second: Vec<Vec<u8>> = nodes.iter().map(|n| n.renew(&codec, EPOCH + 1).raw).collect();
        second.push(provider.renew(&codec, EPOCH + 1).raw);
        let next = generate(&codec, &config(), EPOCH + 1, &second, Some(&prev.document)).unwrap();

        for node in &nodes {
            assert_eq!(
                prev.document.layer_of(&node.keys.public),
                next.document.layer_of(&node.keys.public)
            );
        }
    }
}
