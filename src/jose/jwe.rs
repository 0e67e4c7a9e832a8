//! # JWE Compact Serialization
//!
//! Decryption (and encryption, for request objects) of compact JWE
//! artifacts.
//!
//! Key management: `RSA1_5`, `RSA-OAEP`, `RSA-OAEP-256`, `dir`,
//! `A128GCMKW`, `A192GCMKW`, `A256GCMKW`.
//! Content encryption: `A128GCM`, `A192GCM`, `A256GCM`, `A128CBC-HS256`,
//! `A192CBC-HS384`, `A256CBC-HS512`.
//!
//! Anything else is rejected with a typed error rather than silently
//! skipped. ECDH-ES key agreement is recognized during key selection but is
//! not part of the supported subset.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, OsRng, Payload};
use aes_gcm::{AesGcm, KeyInit, Nonce};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use super::Header;
use super::jwk::Jwk;
use super::jws::segment;
use crate::error::RpError;

type Aes128Gcm = AesGcm<aes::Aes128, aes_gcm::aes::cipher::consts::U12>;
type Aes192Gcm = AesGcm<aes::Aes192, aes_gcm::aes::cipher::consts::U12>;
type Aes256Gcm = AesGcm<aes::Aes256, aes_gcm::aes::cipher::consts::U12>;

/// A decrypted compact JWE.
#[derive(Clone, Debug)]
pub struct DecryptedJwe {
    /// Protected header.
    pub header: Header,

    /// Decrypted plaintext.
    pub plaintext: Vec<u8>,
}

/// Decrypt a compact JWE.
///
/// `key` is an RSA private JWK for `RSA*` key management, or a symmetric
/// `oct` JWK for `dir` and `A*GCMKW`.
///
/// # Errors
///
/// Fails on malformed input, unsupported algorithms, a key that does not fit
/// the header, or an authentication failure.
pub fn decrypt(compact: &str, key: &Jwk) -> Result<DecryptedJwe, RpError> {
    let parts: Vec<&str> = compact.split('.').collect();
    let [header_b64, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
        return Err(RpError::Jwt("JWE is not a valid compact serialization".to_string()));
    };

    let header: Header = serde_json::from_slice(&segment(header_b64)?)
        .map_err(|e| RpError::Jwt(format!("failed to parse JWE header: {e}")))?;
    let enc = header
        .enc
        .clone()
        .ok_or_else(|| RpError::Jwt("JWE header is missing enc".to_string()))?;

    let cek = unwrap_cek(&header, key, &segment(encrypted_key)?)?;
    if cek.len() != cek_len(&enc)? {
        return Err(RpError::Jwt("JWE content encryption key has the wrong length".to_string()));
    }

    let plaintext = content_decrypt(
        &enc,
        &cek,
        &segment(iv)?,
        &segment(ciphertext)?,
        &segment(tag)?,
        header_b64.as_bytes(),
    )?;

    Ok(DecryptedJwe { header, plaintext })
}

/// Encrypt a payload as a compact JWE.
///
/// `key` is an RSA public JWK for `RSA*` key management, or a symmetric
/// `oct` JWK for `dir` and `A*GCMKW`.
///
/// # Errors
///
/// Fails on unsupported algorithms or a key that does not fit them.
pub fn encrypt(
    plaintext: &[u8], alg: &str, enc: &str, key: &Jwk, cty: Option<&str>,
) -> Result<String, RpError> {
    let mut header = Header::from_alg(alg);
    header.enc = Some(enc.to_string());
    header.cty = cty.map(ToString::to_string);
    header.kid = key.kid.clone();

    // content encryption key: the shared secret for dir, fresh otherwise
    let cek = if alg == "dir" {
        key.secret_bytes()?
    } else {
        let mut cek = vec![0u8; cek_len(enc)?];
        OsRng.fill_bytes(&mut cek);
        cek
    };
    if cek.len() != cek_len(enc)? {
        return Err(RpError::Config(
            "JWE content encryption key has the wrong length for the enc algorithm".to_string(),
        ));
    }

    let encrypted_key = match alg {
        "dir" => Vec::new(),
        "RSA1_5" => key
            .rsa_public()?
            .encrypt(&mut OsRng, rsa::Pkcs1v15Encrypt, &cek)
            .map_err(|e| RpError::Jwt(format!("failed to wrap JWE key: {e}")))?,
        "RSA-OAEP" => key
            .rsa_public()?
            .encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &cek)
            .map_err(|e| RpError::Jwt(format!("failed to wrap JWE key: {e}")))?,
        "RSA-OAEP-256" => key
            .rsa_public()?
            .encrypt(&mut OsRng, rsa::Oaep::new::<Sha256>(), &cek)
            .map_err(|e| RpError::Jwt(format!("failed to wrap JWE key: {e}")))?,
        "A128GCMKW" | "A192GCMKW" | "A256GCMKW" => {
            let kek = key.secret_bytes()?;
            let mut kw_iv = [0u8; 12];
            OsRng.fill_bytes(&mut kw_iv);
            let (wrapped, kw_tag) = gcm_encrypt(&kek, &kw_iv, &cek, b"")?;
            header.iv = Some(Base64UrlUnpadded::encode_string(&kw_iv));
            header.tag = Some(Base64UrlUnpadded::encode_string(&kw_tag));
            wrapped
        }
        other => return Err(RpError::UnsupportedAlgorithm(other.to_string())),
    };

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| RpError::Jwt(format!("failed to serialize JWE header: {e}")))?;
    let header_b64 = Base64UrlUnpadded::encode_string(&header_json);

    let iv_len = if enc.ends_with("GCM") { 12 } else { 16 };
    let mut iv = vec![0u8; iv_len];
    OsRng.fill_bytes(&mut iv);

    let (ciphertext, tag) = content_encrypt(enc, &cek, &iv, plaintext, header_b64.as_bytes())?;

    Ok(format!(
        "{header_b64}.{}.{}.{}.{}",
        Base64UrlUnpadded::encode_string(&encrypted_key),
        Base64UrlUnpadded::encode_string(&iv),
        Base64UrlUnpadded::encode_string(&ciphertext),
        Base64UrlUnpadded::encode_string(&tag)
    ))
}

/// Required content-encryption key length in bytes.
fn cek_len(enc: &str) -> Result<usize, RpError> {
    match enc {
        "A128GCM" => Ok(16),
        "A192GCM" => Ok(24),
        "A128CBC-HS256" | "A256GCM" => Ok(32),
        "A192CBC-HS384" => Ok(48),
        "A256CBC-HS512" => Ok(64),
        other => Err(RpError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn unwrap_cek(header: &Header, key: &Jwk, encrypted_key: &[u8]) -> Result<Vec<u8>, RpError> {
    match header.alg.as_str() {
        "dir" => {
            if !encrypted_key.is_empty() {
                return Err(RpError::Jwt(
                    "dir JWE must have an empty encrypted key segment".to_string(),
                ));
            }
            key.secret_bytes()
        }
        "RSA1_5" => key
            .rsa_private()?
            .decrypt(rsa::Pkcs1v15Encrypt, encrypted_key)
            .map_err(|_| RpError::Jwt("failed to unwrap JWE key".to_string())),
        "RSA-OAEP" => key
            .rsa_private()?
            .decrypt(rsa::Oaep::new::<Sha1>(), encrypted_key)
            .map_err(|_| RpError::Jwt("failed to unwrap JWE key".to_string())),
        "RSA-OAEP-256" => key
            .rsa_private()?
            .decrypt(rsa::Oaep::new::<Sha256>(), encrypted_key)
            .map_err(|_| RpError::Jwt("failed to unwrap JWE key".to_string())),
        "A128GCMKW" | "A192GCMKW" | "A256GCMKW" => {
            let kek = key.secret_bytes()?;
            let iv = segment(header.iv.as_deref().ok_or_else(|| {
                RpError::Jwt("GCM key wrapping requires an iv header".to_string())
            })?)?;
            let tag = segment(header.tag.as_deref().ok_or_else(|| {
                RpError::Jwt("GCM key wrapping requires a tag header".to_string())
            })?)?;
            gcm_decrypt(&kek, &iv, encrypted_key, &tag, b"")
        }
        other => Err(RpError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn content_decrypt(
    enc: &str, cek: &[u8], iv: &[u8], ciphertext: &[u8], tag: &[u8], aad: &[u8],
) -> Result<Vec<u8>, RpError> {
    match enc {
        "A128GCM" | "A192GCM" | "A256GCM" => gcm_decrypt(cek, iv, ciphertext, tag, aad),
        "A128CBC-HS256" | "A192CBC-HS384" | "A256CBC-HS512" => {
            cbc_hmac_decrypt(enc, cek, iv, ciphertext, tag, aad)
        }
        other => Err(RpError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn content_encrypt(
    enc: &str, cek: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), RpError> {
    match enc {
        "A128GCM" | "A192GCM" | "A256GCM" => gcm_encrypt(cek, iv, plaintext, aad),
        "A128CBC-HS256" | "A192CBC-HS384" | "A256CBC-HS512" => {
            cbc_hmac_encrypt(enc, cek, iv, plaintext, aad)
        }
        other => Err(RpError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn gcm_decrypt(
    key: &[u8], iv: &[u8], ciphertext: &[u8], tag: &[u8], aad: &[u8],
) -> Result<Vec<u8>, RpError> {
    if iv.len() != 12 || tag.len() != 16 {
        return Err(RpError::Jwt("invalid GCM iv or tag length".to_string()));
    }
    let mut msg = Vec::with_capacity(ciphertext.len() + tag.len());
    msg.extend_from_slice(ciphertext);
    msg.extend_from_slice(tag);
    let payload = Payload { msg: &msg, aad };
    let nonce = Nonce::from_slice(iv);

    let plaintext = match key.len() {
        16 => Aes128Gcm::new_from_slice(key).expect("length checked").decrypt(nonce, payload),
        24 => Aes192Gcm::new_from_slice(key).expect("length checked").decrypt(nonce, payload),
        32 => Aes256Gcm::new_from_slice(key).expect("length checked").decrypt(nonce, payload),
        _ => return Err(RpError::Jwt("invalid GCM key length".to_string())),
    };
    plaintext.map_err(|_| RpError::Jwt("failed to decrypt JWE".to_string()))
}

fn gcm_encrypt(
    key: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), RpError> {
    let payload = Payload { msg: plaintext, aad };
    let nonce = Nonce::from_slice(iv);

    let mut sealed = match key.len() {
        16 => Aes128Gcm::new_from_slice(key).expect("length checked").encrypt(nonce, payload),
        24 => Aes192Gcm::new_from_slice(key).expect("length checked").encrypt(nonce, payload),
        32 => Aes256Gcm::new_from_slice(key).expect("length checked").encrypt(nonce, payload),
        _ => return Err(RpError::Config("invalid GCM key length".to_string())),
    }
    .map_err(|_| RpError::Jwt("failed to encrypt JWE".to_string()))?;

    let tag = sealed.split_off(sealed.len() - 16);
    Ok((sealed, tag))
}

/// Authentication input per RFC 7518 §5.2.2.1:
/// `aad || iv || ciphertext || 64-bit aad bit length`.
fn cbc_mac_tag(enc: &str, mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let al = (aad.len() as u64 * 8).to_be_bytes();
    let parts = [aad, iv, ciphertext, &al];

    macro_rules! mac {
        ($digest:ty) => {{
            let mut mac = <Hmac<$digest> as Mac>::new_from_slice(mac_key)
                .expect("HMAC accepts any key length");
            for part in parts {
                mac.update(part);
            }
            mac.finalize().into_bytes().to_vec()
        }};
    }

    let full = match enc {
        "A128CBC-HS256" => mac!(Sha256),
        "A192CBC-HS384" => mac!(Sha384),
        _ => mac!(Sha512),
    };
    // authentication tag is the left half of the full MAC
    full[..full.len() / 2].to_vec()
}

fn cbc_hmac_decrypt(
    enc: &str, cek: &[u8], iv: &[u8], ciphertext: &[u8], tag: &[u8], aad: &[u8],
) -> Result<Vec<u8>, RpError> {
    if iv.len() != 16 {
        return Err(RpError::Jwt("invalid CBC iv length".to_string()));
    }
    let (mac_key, enc_key) = cek.split_at(cek.len() / 2);

    let expected = cbc_mac_tag(enc, mac_key, aad, iv, ciphertext);
    if expected.len() != tag.len()
        || !expected.iter().zip(tag).fold(true, |eq, (a, b)| eq & (a == b))
    {
        return Err(RpError::Jwt("failed to decrypt JWE".to_string()));
    }

    let plaintext = match enc_key.len() {
        16 => cbc::Decryptor::<aes::Aes128>::new_from_slices(enc_key, iv)
            .expect("length checked")
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        24 => cbc::Decryptor::<aes::Aes192>::new_from_slices(enc_key, iv)
            .expect("length checked")
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        32 => cbc::Decryptor::<aes::Aes256>::new_from_slices(enc_key, iv)
            .expect("length checked")
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        _ => return Err(RpError::Jwt("invalid CBC key length".to_string())),
    };
    plaintext.map_err(|_| RpError::Jwt("failed to decrypt JWE".to_string()))
}

fn cbc_hmac_encrypt(
    enc: &str, cek: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), RpError> {
    let (mac_key, enc_key) = cek.split_at(cek.len() / 2);

    let ciphertext = match enc_key.len() {
        16 => cbc::Encryptor::<aes::Aes128>::new_from_slices(enc_key, iv)
            .expect("length checked")
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<aes::Aes192>::new_from_slices(enc_key, iv)
            .expect("length checked")
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => cbc::Encryptor::<aes::Aes256>::new_from_slices(enc_key, iv)
            .expect("length checked")
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        _ => return Err(RpError::Config("invalid CBC key length".to_string())),
    };

    let tag = cbc_mac_tag(enc, mac_key, aad, iv, &ciphertext);
    Ok((ciphertext, tag))
}
