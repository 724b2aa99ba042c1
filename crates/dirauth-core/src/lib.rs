//! Dirauth Core - Certificates, wire types, and serialization
//!
//! This crate signs, verifies, and (de)serializes the descriptors, documents,
//! authority records, and transactions handled by the directory authority.

pub mod authority;
pub mod cert;
pub mod command;
pub mod crypto;
pub mod descriptor;
pub mod document;
pub mod encoding;
pub mod epoch;
pub mod error;
pub mod merkle;
pub mod parameters;
pub mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use authority::{verify_and_parse_authority, Authority, ValidatorUpdate};
pub use command::{Command, Query, PROTOCOL_VERSION};
pub use crypto::{hash_blake3, sign, verify, Address, Hash, KeyPair, PublicKey, SecretKey, Sig};
pub use descriptor::{
    is_descriptor_well_formed, parse_descriptor_without_verify, sign_descriptor,
    sign_descriptor_for_epoch, verifier_from_descriptor, verify_and_parse_descriptor,
    MixDescriptor, CERTIFICATE_EXPIRATION, LAYER_PROVIDER,
};
pub use document::{
    is_document_well_formed, serialize_document, verify_and_parse_document, Document,
    DocumentWire, DOCUMENT_VERSION, MAX_LAYERS,
};
pub use encoding::Codec;
pub use epoch::{EpochRecord, GENESIS_EPOCH};
pub use error::CoreError;
pub use merkle::{verify_merkle_proof, MerkleProof};
pub use parameters::Parameters;
pub use transaction::{tx_hash, Transaction};
