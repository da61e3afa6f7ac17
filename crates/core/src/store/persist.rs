use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::errors::CoreError;
use super::records::RecordStore;

/// Magic bytes identifying an encrypted twfolio store image.
pub const MAGIC: &[u8; 4] = b"TWFO";

/// Current at-rest format version.
pub const CURRENT_VERSION: u16 = 1;

/// Fixed header length:
/// magic(4) + version(2) + salt(16) + nonce(12) + kdf(12) = 46.
/// Everything after the header is AES-GCM ciphertext (tag included).
const HEADER_LEN: usize = 46;

/// Argon2id cost parameters, stored in the header so future versions can
/// raise them without breaking old images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfCost {
    /// Memory in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
}

impl Default for KdfCost {
    fn default() -> Self {
        Self {
            memory_kib: 19_456, // 19 MiB
            iterations: 2,
            lanes: 1,
        }
    }
}

impl KdfCost {
    /// Reject costs a crafted file could use to exhaust memory/CPU on open.
    fn validate(&self) -> Result<(), CoreError> {
        if !(8..=1_048_576).contains(&self.memory_kib) {
            return Err(CoreError::InvalidFileFormat(format!(
                "KDF memory out of safe range: {} KiB",
                self.memory_kib
            )));
        }
        if !(1..=20).contains(&self.iterations) {
            return Err(CoreError::InvalidFileFormat(format!(
                "KDF iterations out of safe range: {}",
                self.iterations
            )));
        }
        if !(1..=16).contains(&self.lanes) {
            return Err(CoreError::InvalidFileFormat(format!(
                "KDF lanes out of safe range: {}",
                self.lanes
            )));
        }
        Ok(())
    }
}

fn derive_key(password: &str, salt: &[u8; 16], cost: &KdfCost) -> Result<[u8; 32], CoreError> {
    let params = Params::new(cost.memory_kib, cost.iterations, cost.lanes, Some(32))
        .map_err(|e| CoreError::Encryption(format!("Invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CoreError::Encryption(format!("Argon2 key derivation failed: {e}")))?;
    Ok(key)
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CoreError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)
        .map_err(|e| CoreError::Encryption(format!("Failed to gather randomness: {e}")))?;
    Ok(buf)
}

/// Serialize and encrypt the record store into a portable byte image.
///
/// Flow: RecordStore → bincode → AES-256-GCM(Argon2id(password)) → header + ciphertext.
pub fn seal(store: &RecordStore, password: &str) -> Result<Vec<u8>, CoreError> {
    let plaintext = bincode::serialize(store)
        .map_err(|e| CoreError::Serialization(format!("Failed to serialize store: {e}")))?;

    let salt: [u8; 16] = random_bytes()?;
    let nonce: [u8; 12] = random_bytes()?;
    let cost = KdfCost::default();
    let key = derive_key(password, &salt, &cost)?;

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CoreError::Encryption(format!("Failed to create cipher: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|e| CoreError::Encryption(format!("Encryption failed: {e}")))?;

    let mut image = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    image.extend_from_slice(MAGIC);
    image.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    image.extend_from_slice(&salt);
    image.extend_from_slice(&nonce);
    image.extend_from_slice(&cost.memory_kib.to_le_bytes());
    image.extend_from_slice(&cost.iterations.to_le_bytes());
    image.extend_from_slice(&cost.lanes.to_le_bytes());
    image.extend_from_slice(&ciphertext);
    Ok(image)
}

/// Decrypt and deserialize a record store from an at-rest image.
pub fn open(image: &[u8], password: &str) -> Result<RecordStore, CoreError> {
    if image.len() < HEADER_LEN {
        return Err(CoreError::InvalidFileFormat(
            "Image too small to carry a header".into(),
        ));
    }
    if &image[0..4] != MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes — not a twfolio store image".into(),
        ));
    }

    let version = u16::from_le_bytes([image[4], image[5]]);
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let mut salt = [0u8; 16];
    salt.copy_from_slice(&image[6..22]);
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&image[22..34]);

    let read_u32 = |at: usize| -> u32 {
        u32::from_le_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]])
    };
    let cost = KdfCost {
        memory_kib: read_u32(34),
        iterations: read_u32(38),
        lanes: read_u32(42),
    };
    cost.validate()?;

    let key = derive_key(password, &salt, &cost)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CoreError::Encryption(format!("Failed to create cipher: {e}")))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), &image[HEADER_LEN..])
        .map_err(|_| CoreError::Decryption)?;

    bincode::deserialize(&plaintext)
        .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize store: {e}")))
}

/// Save the store to an encrypted file on disk (native only).
#[cfg(not(target_arch = "wasm32"))]
pub fn save_to_file(store: &RecordStore, path: &str, password: &str) -> Result<(), CoreError> {
    let bytes = seal(store, password)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Load the store from an encrypted file on disk (native only).
#[cfg(not(target_arch = "wasm32"))]
pub fn load_from_file(path: &str, password: &str) -> Result<RecordStore, CoreError> {
    let bytes = std::fs::read(path)?;
    open(&bytes, password)
}
