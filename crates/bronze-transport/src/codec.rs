//! Frame codec: zlib inflation and AES-256-CBC envelope decryption.
//!
//! Both receivers funnel every inbound frame through [`Codec::decode`]
//! (or [`Codec::decode_text`] for socket text frames) and get back a JSON
//! object. Failures are per-frame [`DecodeError`]s.

use std::io::Read;

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use flate2::read::ZlibDecoder;
use serde_json::Value;

use bronze_core::{DecodeError, DecodeResult, Secret};

type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Decodes inbound frames.
#[derive(Clone)]
pub struct Codec {
    compress: bool,
    key: Option<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("compress", &self.compress)
            .field("encrypted", &self.key.is_some())
            .finish()
    }
}

impl Codec {
    /// Creates a codec.
    ///
    /// The key is right-padded with `\0` to 32 bytes (longer keys are truncated).
    pub fn new(compress: bool, encrypt_key: Option<&Secret>) -> Self {
        let key = encrypt_key.filter(|k| !k.is_empty()).map(|k| {
            let mut key = [0u8; KEY_LEN];
            let raw = k.expose().as_bytes();
            let len = raw.len().min(KEY_LEN);
            key[..len].copy_from_slice(&raw[..len]);
            key
        });
        Self { compress, key }
    }

    /// Returns `true` if bodies are expected to be zlib-compressed.
    pub fn compress(&self) -> bool {
        self.compress
    }

    /// Inflates a zlib stream.
    pub fn inflate(bytes: &[u8]) -> DecodeResult<Vec<u8>> {
        let mut out = Vec::with_capacity(bytes.len() * 4);
        ZlibDecoder::new(bytes)
            .read_to_end(&mut out)
            .map_err(|e| DecodeError::Decompress(e.to_string()))?;
        Ok(out)
    }

    /// Decrypts an `encrypt` envelope value.
    ///
    /// Layout: `base64(iv[16] ++ base64(ciphertext))`.
    pub fn decrypt(&self, envelope: &str) -> DecodeResult<String> {
        let key = self.key.as_ref().ok_or(DecodeError::MissingKey)?;

        let outer = STANDARD
            .decode(envelope.trim())
            .map_err(|e| DecodeError::Decrypt(format!("outer base64: {e}")))?;
        if outer.len() <= IV_LEN {
            return Err(DecodeError::Decrypt("envelope too short".into()));
        }
        let (iv, inner) = outer.split_at(IV_LEN);
        let mut buf = STANDARD
            .decode(inner)
            .map_err(|e| DecodeError::Decrypt(format!("inner base64: {e}")))?;

        let cipher = Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| DecodeError::Decrypt(e.to_string()))?;
        let plain = cipher
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|_| DecodeError::Decrypt("bad padding".into()))?;

        String::from_utf8(plain.to_vec()).map_err(|e| DecodeError::Decrypt(e.to_string()))
    }

    /// Decodes a binary frame or request body into JSON.
    pub fn decode(&self, bytes: &[u8]) -> DecodeResult<Value> {
        if self.compress {
            let inflated = Self::inflate(bytes)?;
            self.open(&inflated)
        } else {
            self.open(bytes)
        }
    }

    /// Decodes a text frame (never compressed) into JSON.
    pub fn decode_text(&self, text: &str) -> DecodeResult<Value> {
        self.open(text.as_bytes())
    }

    fn open(&self, bytes: &[u8]) -> DecodeResult<Value> {
        let value: Value = serde_json::from_slice(bytes)?;
        match value.get("encrypt").and_then(Value::as_str) {
            Some(envelope) => {
                let plain = self.decrypt(envelope)?;
                Ok(serde_json::from_str(&plain)?)
            }
            None => Ok(value),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cbc::cipher::BlockEncryptMut;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use serde_json::json;
    use std::io::Write;

    pub(crate) fn deflate(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn encrypt(key: &str, plain: &str) -> String {
        let mut padded_key = [0u8; KEY_LEN];
        padded_key[..key.len()].copy_from_slice(key.as_bytes());
        let iv = b"0123456789abcdef";

        let len = plain.len();
        let mut buf = vec![0u8; len + IV_LEN];
        buf[..len].copy_from_slice(plain.as_bytes());
        let ciphertext = cbc::Encryptor::<Aes256>::new_from_slices(&padded_key, iv)
            .unwrap()
            .encrypt_padded_mut::<Pkcs7>(&mut buf, len)
            .unwrap();

        let mut outer = iv.to_vec();
        outer.extend_from_slice(STANDARD.encode(ciphertext).as_bytes());
        STANDARD.encode(outer)
    }

    #[test]
    fn plain_json_passes_through() {
        let codec = Codec::new(false, None);
        let value = codec.decode(br#"{"s":0,"sn":1,"d":{}}"#).unwrap();
        assert_eq!(value["sn"], 1);
    }

    #[test]
    fn compressed_body_is_inflated() {
        let codec = Codec::new(true, None);
        let body = deflate(br#"{"s":3}"#);
        assert_eq!(codec.decode(&body).unwrap(), json!({"s": 3}));
    }

    #[test]
    fn encrypted_envelope_is_opened() {
        let key = Secret::new("short-key");
        let codec = Codec::new(true, Some(&key));
        let inner = r#"{"s":0,"d":{"verify_token":"v"}}"#;
        let envelope = json!({ "encrypt": encrypt("short-key", inner) }).to_string();
        let body = deflate(envelope.as_bytes());

        let value = codec.decode(&body).unwrap();
        assert_eq!(value["d"]["verify_token"], "v");
    }

    #[test]
    fn encrypted_without_key_fails() {
        let codec = Codec::new(false, None);
        let envelope = json!({ "encrypt": encrypt("k", "{}") }).to_string();
        assert!(matches!(
            codec.decode(envelope.as_bytes()),
            Err(DecodeError::MissingKey)
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let codec = Codec::new(true, None);
        assert!(matches!(
            codec.decode(b"not zlib"),
            Err(DecodeError::Decompress(_))
        ));
        let codec = Codec::new(false, None);
        assert!(matches!(codec.decode(b"{oops"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let codec = Codec::new(false, Some(&Secret::new("wrong")));
        let envelope = json!({ "encrypt": encrypt("right", r#"{"a":1}"#) }).to_string();
        assert!(codec.decode(envelope.as_bytes()).is_err());
    }
}
