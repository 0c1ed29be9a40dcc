use aes::Aes256;
use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Length of an `EncodingAESKey` as shown in the WeCom console.
const ENCODING_AES_KEY_LEN: usize = 43;
/// Block size used for the PKCS#7 padding of callback payloads.
const PAD_BLOCK: usize = 32;
const RANDOM_PREFIX_LEN: usize = 16;
const LENGTH_FIELD_LEN: usize = 4;

/// The key is 43 base64 characters whose last one may carry unused bits.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid EncodingAESKey: {0}")]
    InvalidKey(String),
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("invalid base64 payload: {0}")]
    Base64(String),
    #[error("decrypt failed: {0}")]
    Decrypt(String),
    #[error("invalid plaintext: {0}")]
    InvalidPlaintext(String),
    #[error("receiver mismatch: expected {expected}, got {actual}")]
    ReceiverMismatch { expected: String, actual: String },
    #[error("invalid callback xml: {0}")]
    Xml(String),
}

#[derive(Debug, Deserialize)]
struct EncryptedEnvelope {
    #[serde(rename = "Encrypt")]
    encrypt: String,
}

/// Signature check and AES-256-CBC payload codec for WeCom callbacks.
pub struct MsgCrypt {
    token: String,
    key: [u8; 32],
    receive_id: String,
}

impl MsgCrypt {
    /// `receive_id` is the corp id the payloads are addressed to.
    pub fn new(
        token: impl Into<String>,
        encoding_aes_key: &str,
        receive_id: impl Into<String>,
    ) -> Result<Self, CryptoError> {
        let encoding_aes_key = encoding_aes_key.trim();
        if encoding_aes_key.len() != ENCODING_AES_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {ENCODING_AES_KEY_LEN} characters, got {}",
                encoding_aes_key.len()
            )));
        }
        let decoded = KEY_ENGINE
            .decode(format!("{encoding_aes_key}="))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("key does not decode to 32 bytes".into()))?;
        Ok(Self {
            token: token.into(),
            key,
            receive_id: receive_id.into(),
        })
    }

    /// SHA1 over the sorted concatenation of token, timestamp, nonce and payload.
    pub fn signature(&self, timestamp: &str, nonce: &str, encrypted: &str) -> String {
        let mut parts = [self.token.as_str(), timestamp, nonce, encrypted];
        parts.sort_unstable();
        let mut hasher = Sha1::new();
        for part in parts {
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Verifies a callback URL check and returns the decrypted `echostr`.
    pub fn verify_url(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        echostr: &str,
    ) -> Result<String, CryptoError> {
        self.check_signature(msg_signature, timestamp, nonce, echostr)?;
        self.decrypt(echostr)
    }

    /// Verifies and decrypts a POSTed callback body, returning the message XML.
    pub fn decrypt_message(
        &self,
        body: &str,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<String, CryptoError> {
        let envelope: EncryptedEnvelope =
            quick_xml::de::from_str(body).map_err(|e| CryptoError::Xml(e.to_string()))?;
        self.check_signature(msg_signature, timestamp, nonce, &envelope.encrypt)?;
        self.decrypt(&envelope.encrypt)
    }

    /// Encrypts a payload the way WeCom expects it inside `<Encrypt>`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.encrypt_with_prefix(uuid::Uuid::new_v4().into_bytes(), plaintext)
    }

    fn encrypt_with_prefix(
        &self,
        prefix: [u8; RANDOM_PREFIX_LEN],
        plaintext: &str,
    ) -> Result<String, CryptoError> {
        let length = u32::try_from(plaintext.len())
            .map_err(|_| CryptoError::InvalidPlaintext("payload too large".into()))?;
        let mut buf = Vec::with_capacity(
            RANDOM_PREFIX_LEN + LENGTH_FIELD_LEN + plaintext.len() + self.receive_id.len() + PAD_BLOCK,
        );
        buf.extend_from_slice(&prefix);
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(plaintext.as_bytes());
        buf.extend_from_slice(self.receive_id.as_bytes());
        let pad = PAD_BLOCK - buf.len() % PAD_BLOCK;
        buf.resize(buf.len() + pad, pad as u8);

        let len = buf.len();
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let encrypted = cipher
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(|_| CryptoError::Decrypt("payload is not block aligned".into()))?;
        Ok(STANDARD.encode(encrypted))
    }

    fn check_signature(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        encrypted: &str,
    ) -> Result<(), CryptoError> {
        if self.signature(timestamp, nonce, encrypted) != msg_signature {
            return Err(CryptoError::SignatureMismatch);
        }
        Ok(())
    }

    fn decrypt(&self, encrypted: &str) -> Result<String, CryptoError> {
        let mut buf = STANDARD
            .decode(encrypted.trim())
            .map_err(|e| CryptoError::Base64(e.to_string()))?;
        let cipher = Aes256CbcDec::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let plain = cipher
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| CryptoError::Decrypt("ciphertext is not block aligned".into()))?;

        let pad = plain.last().copied().map_or(0, usize::from);
        if !(1..=PAD_BLOCK).contains(&pad) || pad > plain.len() {
            return Err(CryptoError::Decrypt(format!("bad padding {pad}")));
        }
        let content = &plain[..plain.len() - pad];
        let header = RANDOM_PREFIX_LEN + LENGTH_FIELD_LEN;
        if content.len() < header {
            return Err(CryptoError::InvalidPlaintext("payload too short".into()));
        }
        let mut length = [0u8; LENGTH_FIELD_LEN];
        length.copy_from_slice(&content[RANDOM_PREFIX_LEN..header]);
        let msg_end = header + u32::from_be_bytes(length) as usize;
        if msg_end > content.len() {
            return Err(CryptoError::InvalidPlaintext(
                "length field exceeds payload".into(),
            ));
        }

        let receiver = String::from_utf8_lossy(&content[msg_end..]);
        if receiver != self.receive_id {
            return Err(CryptoError::ReceiverMismatch {
                expected: self.receive_id.clone(),
                actual: receiver.into_owned(),
            });
        }
        String::from_utf8(content[header..msg_end].to_vec())
            .map_err(|e| CryptoError::InvalidPlaintext(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TOKEN: &str = "QDG6eK";
    pub(crate) const AES_KEY: &str = "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C";
    pub(crate) const CORP_ID: &str = "ww1436e0e65a779aee";
    const PREFIX: [u8; 16] = *b"0123456789abcdef";
    const ECHO_CIPHERTEXT: &str = "sKqRbbiSUnDhFHOvPjtUMRQLHDQt3gvNzTbxnF/rKRrDUYqU+GREppwlYPOo6V78ZfFUJI9YaTVNSolqDZNR7A==";
    const ECHO_SIGNATURE: &str = "94e7b88b4d32e2e2df1b693d43964429cc4209d1";

    pub(crate) fn crypt() -> MsgCrypt {
        MsgCrypt::new(TOKEN, AES_KEY, CORP_ID).expect("crypt")
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(matches!(
            MsgCrypt::new(TOKEN, "short", CORP_ID),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn verify_url_decrypts_known_echostr() {
        let echo = crypt()
            .verify_url(ECHO_SIGNATURE, "1409659813", "1372623149", ECHO_CIPHERTEXT)
            .expect("verify");
        assert_eq!(echo, "echo-1234");
    }

    #[test]
    fn encryption_matches_known_ciphertext() {
        let encrypted = crypt()
            .encrypt_with_prefix(PREFIX, "echo-1234")
            .expect("encrypt");
        assert_eq!(encrypted, ECHO_CIPHERTEXT);
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let err = crypt()
            .verify_url("0000", "1409659813", "1372623149", ECHO_CIPHERTEXT)
            .expect_err("signature");
        assert_eq!(err, CryptoError::SignatureMismatch);
    }

    #[test]
    fn payload_for_another_corp_is_rejected() {
        let other = MsgCrypt::new(TOKEN, AES_KEY, "ww-other").expect("crypt");
        let encrypted = other.encrypt("hi").expect("encrypt");
        let signature = crypt().signature("1", "2", &encrypted);
        let err = crypt()
            .verify_url(&signature, "1", "2", &encrypted)
            .expect_err("receiver");
        assert!(matches!(err, CryptoError::ReceiverMismatch { actual, .. } if actual == "ww-other"));
    }

    #[test]
    fn decrypts_posted_message_envelope() {
        let crypt = crypt();
        let inner = "<xml><MsgType><![CDATA[text]]></MsgType><Content><![CDATA[你好]]></Content></xml>";
        let encrypted = crypt.encrypt(inner).expect("encrypt");
        let body = format!(
            "<xml><ToUserName><![CDATA[{CORP_ID}]]></ToUserName><AgentID><![CDATA[1000002]]></AgentID><Encrypt><![CDATA[{encrypted}]]></Encrypt></xml>"
        );
        let signature = crypt.signature("1409659813", "263014780", &encrypted);
        let xml = crypt
            .decrypt_message(&body, &signature, "1409659813", "263014780")
            .expect("decrypt");
        assert_eq!(xml, inner);
    }
}
