pub mod hash;
pub mod keys;
pub mod signature;

pub use hash::{hash_blake3, Hash};
pub use keys::{Address, KeyPair, PublicKey, SecretKey, X25519Key};
pub use signature::{sign, verify, Sig};
