/// Sealed field envelope
///
/// Layout of a sealed value:
///
/// ```text
/// +---------------------------+--------------------------------------+
/// | RSA-OAEP(SHA-1) key block |  AES-256-CBC ciphertext, PKCS#7      |
/// |        256 bytes          |  zero IV                             |
/// +---------------------------+--------------------------------------+
/// ```
///
/// The key block decrypts to at least 32 bytes; the first 32 are the AES key.
/// Sealed values travel base64 encoded inside GraphQL responses.
use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::domain::shared::{Result, TelephonyError};

/// Size of the RSA encrypted key block, a 2048-bit modulus
pub const KEY_BLOCK_LEN: usize = 256;

/// AES-256 key length
pub const SYMMETRIC_KEY_LEN: usize = 32;

const BLOCK_LEN: usize = 16;

/// Algorithm name registered with the backend alongside the public key
pub const SEALING_ALGORITHM: &str = "RSAEncryptionOAEPAESCBC";

/// Open a sealed value. Empty input opens to empty output.
pub fn open(private_key: &RsaPrivateKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.is_empty() {
        return Ok(Vec::new());
    }
    if sealed.len() < KEY_BLOCK_LEN {
        return Err(TelephonyError::DecryptSealedData(format!(
            "sealed value is {} bytes, shorter than the {} byte key block",
            sealed.len(),
            KEY_BLOCK_LEN
        )));
    }

    let (key_block, ciphertext) = sealed.split_at(KEY_BLOCK_LEN);
    let symmetric_key = private_key
        .decrypt(Oaep::new::<Sha1>(), key_block)
        .map_err(|e| TelephonyError::DecryptSealedData(format!("key block: {}", e)))?;
    if symmetric_key.len() < SYMMETRIC_KEY_LEN {
        return Err(TelephonyError::DecryptSealedData(format!(
            "symmetric key is {} bytes, expected {}",
            symmetric_key.len(),
            SYMMETRIC_KEY_LEN
        )));
    }

    cbc_decrypt(&symmetric_key[..SYMMETRIC_KEY_LEN], ciphertext)
}

/// Open a sealed UTF-8 string
pub fn open_string(private_key: &RsaPrivateKey, sealed: &[u8]) -> Result<String> {
    let plain = open(private_key, sealed)?;
    String::from_utf8(plain)
        .map_err(|e| TelephonyError::DecryptSealedData(format!("invalid UTF-8: {}", e)))
}

/// Open a sealed duration: a big-endian signed 32-bit integer
pub fn open_duration(private_key: &RsaPrivateKey, sealed: &[u8]) -> Result<i32> {
    let plain = open(private_key, sealed)?;
    duration_from_bytes(&plain)
}

pub fn duration_from_bytes(plain: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = plain
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            TelephonyError::DecryptSealedData(format!(
                "duration needs 4 bytes, got {}",
                plain.len()
            ))
        })?;
    Ok(i32::from_be_bytes(bytes))
}

/// Seal `plaintext` for the holder of `public_key`
pub fn seal(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let mut symmetric_key = [0u8; SYMMETRIC_KEY_LEN];
    rng.fill_bytes(&mut symmetric_key);

    let key_block = public_key
        .encrypt(&mut rng, Oaep::new::<Sha1>(), &symmetric_key)
        .map_err(|e| TelephonyError::DecryptSealedData(format!("seal key block: {}", e)))?;
    if key_block.len() != KEY_BLOCK_LEN {
        return Err(TelephonyError::DecryptSealedData(format!(
            "public key produces {} byte key blocks, expected {}",
            key_block.len(),
            KEY_BLOCK_LEN
        )));
    }

    let mut sealed = key_block;
    sealed.extend(cbc_encrypt(&symmetric_key, plaintext)?);
    Ok(sealed)
}

/// Decode the base64 transport encoding of a sealed field
pub fn decode_field(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| TelephonyError::DecryptSealedData(format!("invalid base64: {}", e)))
}

pub fn encode_field(sealed: &[u8]) -> String {
    STANDARD.encode(sealed)
}

fn cipher(key: &[u8]) -> Result<Aes256> {
    Aes256::new_from_slice(key)
        .map_err(|_| TelephonyError::DecryptSealedData("invalid AES key length".to_string()))
}

fn cbc_decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(TelephonyError::DecryptSealedData(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_LEN
        )));
    }

    let cipher = cipher(key)?;
    let mut previous = [0u8; BLOCK_LEN];
    let mut plain = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.chunks(BLOCK_LEN) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        for (byte, prev) in block.iter_mut().zip(previous.iter()) {
            *byte ^= prev;
        }
        plain.extend_from_slice(&block);
        previous.copy_from_slice(chunk);
    }

    strip_padding(plain)
}

fn cbc_encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;
    let pad = BLOCK_LEN - plaintext.len() % BLOCK_LEN;
    let mut padded = plaintext.to_vec();
    padded.resize(plaintext.len() + pad, pad as u8);

    let mut previous = [0u8; BLOCK_LEN];
    let mut out = Vec::with_capacity(padded.len());
    for chunk in padded.chunks(BLOCK_LEN) {
        let mut block = GenericArray::clone_from_slice(chunk);
        for (byte, prev) in block.iter_mut().zip(previous.iter()) {
            *byte ^= prev;
        }
        cipher.encrypt_block(&mut block);
        previous.copy_from_slice(&block);
        out.extend_from_slice(&block);
    }
    Ok(out)
}

fn strip_padding(mut plain: Vec<u8>) -> Result<Vec<u8>> {
    let pad = plain.last().copied().unwrap_or(0) as usize;
    let valid = (1..=BLOCK_LEN).contains(&pad)
        && pad <= plain.len()
        && plain[plain.len() - pad..].iter().all(|&b| b as usize == pad);
    if !valid {
        return Err(TelephonyError::DecryptSealedData(
            "invalid PKCS#7 padding".to_string(),
        ));
    }
    plain.truncate(plain.len() - pad);
    Ok(plain)
}
