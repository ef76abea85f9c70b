//! ECDH key agreement and AES-CFB stream encryption.
//!
//! A connection configured with the server's public key generates an
//! ephemeral key pair on the same curve, derives a shared secret and sends
//! its own public key in the `*key` handshake quest. Both directions are
//! then encrypted with AES in CFB mode:
//!
//! - key: the first 32 (or 16) bytes of the secret, or SHA-256 of the secret
//!   when it is too short
//! - IV: MD5 of the secret
//!
//! Each direction keeps its own keystream position for the lifetime of the
//! connection; it is never reset between frames.

use std::fmt;
use std::str::FromStr;

use aes::{Aes128, Aes256};
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};
use md5::Md5;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{ProtocolError, Result};

/// Length of a raw X||Y public key on the supported curves.
pub const RAW_PUBLIC_KEY_LENGTH: usize = 64;

/// Length of the CFB initialisation vector.
pub const IV_LENGTH: usize = 16;

const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// Named elliptic curves recognised in key configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    Secp192r1,
    Secp224r1,
    Secp256r1,
    Secp256k1,
}

impl Curve {
    pub fn name(self) -> &'static str {
        match self {
            Curve::Secp192r1 => "secp192r1",
            Curve::Secp224r1 => "secp224r1",
            Curve::Secp256r1 => "secp256r1",
            Curve::Secp256k1 => "secp256k1",
        }
    }

    /// Whether key agreement is implemented for this curve.
    pub fn is_supported(self) -> bool {
        matches!(self, Curve::Secp256r1 | Curve::Secp256k1)
    }
}

impl FromStr for Curve {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "secp192r1" | "prime192v1" => Ok(Curve::Secp192r1),
            "secp224r1" => Ok(Curve::Secp224r1),
            "secp256r1" | "prime256v1" => Ok(Curve::Secp256r1),
            "secp256k1" => Ok(Curve::Secp256k1),
            other => Err(ProtocolError::UnsupportedCurve(other.to_string())),
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// AES key width requested in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AesKeyBits {
    Aes128,
    #[default]
    Aes256,
}

impl AesKeyBits {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            128 => Ok(AesKeyBits::Aes128),
            256 => Ok(AesKeyBits::Aes256),
            other => Err(ProtocolError::InvalidKeyBits(other)),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            AesKeyBits::Aes128 => 128,
            AesKeyBits::Aes256 => 256,
        }
    }

    pub fn key_len(self) -> usize {
        self.bits() as usize / 8
    }
}

/// A validated public key on a supported curve, stored as raw X||Y.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerPublicKey {
    curve: Curve,
    raw: Vec<u8>,
}

impl PeerPublicKey {
    /// Parse a public key from raw X||Y or SEC1 uncompressed bytes.
    pub fn new(curve: Curve, bytes: &[u8]) -> Result<Self> {
        let sec1 = match bytes.len() {
            RAW_PUBLIC_KEY_LENGTH => {
                let mut sec1 = Vec::with_capacity(RAW_PUBLIC_KEY_LENGTH + 1);
                sec1.push(SEC1_UNCOMPRESSED_TAG);
                sec1.extend_from_slice(bytes);
                sec1
            }
            len if len == RAW_PUBLIC_KEY_LENGTH + 1 && bytes[0] == SEC1_UNCOMPRESSED_TAG => {
                bytes.to_vec()
            }
            len => {
                return Err(ProtocolError::InvalidPublicKey(format!(
                    "expected {} raw or {} SEC1 bytes, got {}",
                    RAW_PUBLIC_KEY_LENGTH,
                    RAW_PUBLIC_KEY_LENGTH + 1,
                    len
                )))
            }
        };

        // Reject points that are not on the curve.
        match curve {
            Curve::Secp256r1 => {
                p256::PublicKey::from_sec1_bytes(&sec1)
                    .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?;
            }
            Curve::Secp256k1 => {
                k256::PublicKey::from_sec1_bytes(&sec1)
                    .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?;
            }
            Curve::Secp192r1 | Curve::Secp224r1 => {
                return Err(ProtocolError::UnsupportedCurve(curve.name().to_string()))
            }
        }

        Ok(Self {
            curve,
            raw: sec1[1..].to_vec(),
        })
    }

    /// Parse a PEM `PUBLIC KEY` (SubjectPublicKeyInfo) document.
    ///
    /// The curve is taken from the key's algorithm parameters.
    pub fn from_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = p256::PublicKey::from_public_key_pem(pem) {
            use p256::elliptic_curve::sec1::ToEncodedPoint;
            return Self::new(Curve::Secp256r1, key.to_encoded_point(false).as_bytes());
        }
        if let Ok(key) = k256::PublicKey::from_public_key_pem(pem) {
            use k256::elliptic_curve::sec1::ToEncodedPoint;
            return Self::new(Curve::Secp256k1, key.to_encoded_point(false).as_bytes());
        }
        Err(ProtocolError::InvalidPublicKey(
            "PEM data is not a secp256r1 or secp256k1 public key".to_string(),
        ))
    }

    /// Encode as a PEM `PUBLIC KEY` document.
    pub fn to_pem(&self) -> Result<String> {
        let sec1 = self.sec1_bytes();
        let pem = match self.curve {
            Curve::Secp256r1 => p256::PublicKey::from_sec1_bytes(&sec1)
                .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?
                .to_public_key_pem(LineEnding::LF),
            Curve::Secp256k1 => k256::PublicKey::from_sec1_bytes(&sec1)
                .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?
                .to_public_key_pem(LineEnding::LF),
            Curve::Secp192r1 | Curve::Secp224r1 => {
                return Err(ProtocolError::UnsupportedCurve(self.curve.name().to_string()))
            }
        };
        pem.map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Raw X||Y bytes, as sent on the wire.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn sec1_bytes(&self) -> Vec<u8> {
        let mut sec1 = Vec::with_capacity(self.raw.len() + 1);
        sec1.push(SEC1_UNCOMPRESSED_TAG);
        sec1.extend_from_slice(&self.raw);
        sec1
    }
}

impl fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerPublicKey")
            .field("curve", &self.curve)
            .field("len", &self.raw.len())
            .finish()
    }
}

enum SecretInner {
    P256(p256::SecretKey),
    K256(k256::SecretKey),
}

/// An ECDH key pair.
///
/// The secret scalar is zeroized on drop by the curve crates.
pub struct EcdhKeyPair {
    curve: Curve,
    secret: SecretInner,
}

impl EcdhKeyPair {
    /// Generate a random key pair.
    pub fn generate(curve: Curve) -> Result<Self> {
        let secret = match curve {
            Curve::Secp256r1 => SecretInner::P256(p256::SecretKey::random(&mut OsRng)),
            Curve::Secp256k1 => SecretInner::K256(k256::SecretKey::random(&mut OsRng)),
            Curve::Secp192r1 | Curve::Secp224r1 => {
                return Err(ProtocolError::UnsupportedCurve(curve.name().to_string()))
            }
        };
        Ok(Self { curve, secret })
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> PeerPublicKey {
        let sec1 = match &self.secret {
            SecretInner::P256(secret) => {
                use p256::elliptic_curve::sec1::ToEncodedPoint;
                secret.public_key().to_encoded_point(false).as_bytes().to_vec()
            }
            SecretInner::K256(secret) => {
                use k256::elliptic_curve::sec1::ToEncodedPoint;
                secret.public_key().to_encoded_point(false).as_bytes().to_vec()
            }
        };
        PeerPublicKey {
            curve: self.curve,
            raw: sec1[1..].to_vec(),
        }
    }

    /// Compute the shared secret (the x-coordinate of the shared point).
    pub fn agree(&self, peer: &PeerPublicKey) -> Result<Zeroizing<Vec<u8>>> {
        if peer.curve != self.curve {
            return Err(ProtocolError::KeyExchange(format!(
                "curve mismatch: local {}, peer {}",
                self.curve, peer.curve
            )));
        }

        let sec1 = peer.sec1_bytes();
        let secret = match &self.secret {
            SecretInner::P256(secret) => {
                let public = p256::PublicKey::from_sec1_bytes(&sec1)
                    .map_err(|e| ProtocolError::KeyExchange(e.to_string()))?;
                let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                shared.raw_secret_bytes().to_vec()
            }
            SecretInner::K256(secret) => {
                let public = k256::PublicKey::from_sec1_bytes(&sec1)
                    .map_err(|e| ProtocolError::KeyExchange(e.to_string()))?;
                let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                shared.raw_secret_bytes().to_vec()
            }
        };
        Ok(Zeroizing::new(secret))
    }
}

impl fmt::Debug for EcdhKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdhKeyPair")
            .field("curve", &self.curve)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Client side of the key exchange: an ephemeral key pair plus the
/// secret it shares with the server.
pub struct EcdhExchange {
    public_key: PeerPublicKey,
    secret: Zeroizing<Vec<u8>>,
}

impl EcdhExchange {
    /// Generate an ephemeral key pair on the server's curve and agree.
    pub fn new(server: &PeerPublicKey) -> Result<Self> {
        let pair = EcdhKeyPair::generate(server.curve())?;
        let secret = pair.agree(server)?;
        Ok(Self {
            public_key: pair.public_key(),
            secret,
        })
    }

    /// Ephemeral public key to send to the server.
    pub fn public_key(&self) -> &PeerPublicKey {
        &self.public_key
    }

    pub fn shared_secret(&self) -> &[u8] {
        &self.secret
    }

    /// Derive the session keys for the requested AES width.
    pub fn session_keys(&self, bits: AesKeyBits) -> SessionKeys {
        SessionKeys::derive(&self.secret, bits)
    }
}

impl fmt::Debug for EcdhExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdhExchange")
            .field("public_key", &self.public_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// AES key and IV derived from a shared secret.
#[derive(Clone)]
pub struct SessionKeys {
    bits: AesKeyBits,
    key: Zeroizing<Vec<u8>>,
    iv: [u8; IV_LENGTH],
}

impl SessionKeys {
    pub fn derive(secret: &[u8], bits: AesKeyBits) -> Self {
        let key_len = bits.key_len();
        let key = if secret.len() >= key_len {
            secret[..key_len].to_vec()
        } else {
            Sha256::digest(secret)[..key_len].to_vec()
        };

        let mut iv = [0u8; IV_LENGTH];
        iv.copy_from_slice(&Md5::digest(secret));

        Self {
            bits,
            key: Zeroizing::new(key),
            iv,
        }
    }

    pub fn bits(&self) -> AesKeyBits {
        self.bits
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LENGTH] {
        &self.iv
    }

    pub fn encryptor(&self) -> Result<StreamEncryptor> {
        StreamEncryptor::new(self)
    }

    pub fn decryptor(&self) -> Result<StreamDecryptor> {
        StreamDecryptor::new(self)
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("bits", &self.bits)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn cipher_init_error(e: impl fmt::Display) -> ProtocolError {
    ProtocolError::KeyExchange(format!("cipher init failed: {e}"))
}

enum EncryptorInner {
    Aes128(BufEncryptor<Aes128>),
    Aes256(BufEncryptor<Aes256>),
}

/// Outbound CFB keystream.
pub struct StreamEncryptor(EncryptorInner);

impl StreamEncryptor {
    pub fn new(keys: &SessionKeys) -> Result<Self> {
        let inner = match keys.bits {
            AesKeyBits::Aes128 => EncryptorInner::Aes128(
                BufEncryptor::new_from_slices(&keys.key, &keys.iv).map_err(cipher_init_error)?,
            ),
            AesKeyBits::Aes256 => EncryptorInner::Aes256(
                BufEncryptor::new_from_slices(&keys.key, &keys.iv).map_err(cipher_init_error)?,
            ),
        };
        Ok(Self(inner))
    }

    /// Encrypt in place, continuing from the previous call's position.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        match &mut self.0 {
            EncryptorInner::Aes128(c) => c.encrypt(data),
            EncryptorInner::Aes256(c) => c.encrypt(data),
        }
    }
}

impl fmt::Debug for StreamEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamEncryptor")
    }
}

enum DecryptorInner {
    Aes128(BufDecryptor<Aes128>),
    Aes256(BufDecryptor<Aes256>),
}

/// Inbound CFB keystream.
pub struct StreamDecryptor(DecryptorInner);

impl StreamDecryptor {
    pub fn new(keys: &SessionKeys) -> Result<Self> {
        let inner = match keys.bits {
            AesKeyBits::Aes128 => DecryptorInner::Aes128(
                BufDecryptor::new_from_slices(&keys.key, &keys.iv).map_err(cipher_init_error)?,
            ),
            AesKeyBits::Aes256 => DecryptorInner::Aes256(
                BufDecryptor::new_from_slices(&keys.key, &keys.iv).map_err(cipher_init_error)?,
            ),
        };
        Ok(Self(inner))
    }

    /// Decrypt in place, continuing from the previous call's position.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        match &mut self.0 {
            DecryptorInner::Aes128(c) => c.decrypt(data),
            DecryptorInner::Aes256(c) => c.decrypt(data),
        }
    }
}

impl fmt::Debug for StreamDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamDecryptor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(bits: AesKeyBits) -> SessionKeys {
        let secret: Vec<u8> = (0u8..32).collect();
        SessionKeys::derive(&secret, bits)
    }

    #[test]
    fn test_curve_names() {
        assert_eq!("secp256r1".parse::<Curve>().unwrap(), Curve::Secp256r1);
        assert_eq!("prime256v1".parse::<Curve>().unwrap(), Curve::Secp256r1);
        assert_eq!("SECP256K1".parse::<Curve>().unwrap(), Curve::Secp256k1);
        assert_eq!("secp224r1".parse::<Curve>().unwrap(), Curve::Secp224r1);
        assert!("ed25519".parse::<Curve>().is_err());
    }

    #[test]
    fn test_unsupported_curves_rejected() {
        for curve in [Curve::Secp192r1, Curve::Secp224r1] {
            assert!(!curve.is_supported());
            assert!(matches!(
                EcdhKeyPair::generate(curve).unwrap_err(),
                ProtocolError::UnsupportedCurve(_)
            ));
            assert!(PeerPublicKey::new(curve, &[0u8; 64]).is_err());
        }
    }

    #[test]
    fn test_aes_key_bits() {
        assert_eq!(AesKeyBits::from_bits(128).unwrap().key_len(), 16);
        assert_eq!(AesKeyBits::from_bits(256).unwrap().key_len(), 32);
        assert!(matches!(
            AesKeyBits::from_bits(192).unwrap_err(),
            ProtocolError::InvalidKeyBits(192)
        ));
    }

    #[test]
    fn test_ecdh_agreement_both_curves() {
        for curve in [Curve::Secp256r1, Curve::Secp256k1] {
            let server = EcdhKeyPair::generate(curve).unwrap();
            let exchange = EcdhExchange::new(&server.public_key()).unwrap();

            assert_eq!(exchange.public_key().raw_bytes().len(), RAW_PUBLIC_KEY_LENGTH);
            let server_secret = server.agree(exchange.public_key()).unwrap();
            assert_eq!(&server_secret[..], exchange.shared_secret());
            assert_eq!(server_secret.len(), 32);
        }
    }

    #[test]
    fn test_public_key_accepts_raw_and_sec1() {
        let pair = EcdhKeyPair::generate(Curve::Secp256r1).unwrap();
        let raw = pair.public_key().raw_bytes().to_vec();

        let mut sec1 = vec![SEC1_UNCOMPRESSED_TAG];
        sec1.extend_from_slice(&raw);

        let from_raw = PeerPublicKey::new(Curve::Secp256r1, &raw).unwrap();
        let from_sec1 = PeerPublicKey::new(Curve::Secp256r1, &sec1).unwrap();
        assert_eq!(from_raw, from_sec1);
    }

    #[test]
    fn test_pem_roundtrip_both_curves() {
        for curve in [Curve::Secp256r1, Curve::Secp256k1] {
            let key = EcdhKeyPair::generate(curve).unwrap().public_key();
            let pem = key.to_pem().unwrap();
            assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

            let parsed = PeerPublicKey::from_pem(&pem).unwrap();
            assert_eq!(parsed, key);
            assert_eq!(parsed.curve(), curve);
        }
    }

    #[test]
    fn test_pem_rejects_garbage() {
        assert!(matches!(
            PeerPublicKey::from_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n")
                .unwrap_err(),
            ProtocolError::InvalidPublicKey(_)
        ));
    }

    #[test]
    fn test_public_key_rejects_bad_points() {
        assert!(matches!(
            PeerPublicKey::new(Curve::Secp256r1, &[0u8; 64]).unwrap_err(),
            ProtocolError::InvalidPublicKey(_)
        ));
        assert!(matches!(
            PeerPublicKey::new(Curve::Secp256r1, &[1u8; 10]).unwrap_err(),
            ProtocolError::InvalidPublicKey(_)
        ));
    }

    #[test]
    fn test_curve_mismatch() {
        let p256 = EcdhKeyPair::generate(Curve::Secp256r1).unwrap();
        let k256 = EcdhKeyPair::generate(Curve::Secp256k1).unwrap();
        assert!(matches!(
            p256.agree(&k256.public_key()).unwrap_err(),
            ProtocolError::KeyExchange(_)
        ));
    }

    #[test]
    fn test_key_derivation() {
        let secret: Vec<u8> = (0u8..32).collect();

        let k256 = SessionKeys::derive(&secret, AesKeyBits::Aes256);
        assert_eq!(k256.key(), &secret[..]);

        let k128 = SessionKeys::derive(&secret, AesKeyBits::Aes128);
        assert_eq!(k128.key(), &secret[..16]);

        let iv: [u8; 16] = Md5::digest(&secret).into();
        assert_eq!(k256.iv(), &iv);
        assert_eq!(k128.iv(), &iv);
    }

    #[test]
    fn test_short_secret_is_hashed() {
        let secret = [7u8; 24];
        let keys = SessionKeys::derive(&secret, AesKeyBits::Aes256);
        assert_eq!(keys.key(), &Sha256::digest(secret)[..]);
    }

    #[test]
    fn test_stream_roundtrip_both_widths() {
        for bits in [AesKeyBits::Aes128, AesKeyBits::Aes256] {
            let keys = keys(bits);
            for len in [0usize, 1, 15, 16, 17, 100, 1024] {
                let plain: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
                let mut data = plain.clone();

                keys.encryptor().unwrap().encrypt(&mut data);
                if len > 0 {
                    assert_ne!(data, plain);
                }
                keys.decryptor().unwrap().decrypt(&mut data);
                assert_eq!(data, plain, "bits={bits:?} len={len}");
            }
        }
    }

    #[test]
    fn test_stream_offset_carried_across_calls() {
        for bits in [AesKeyBits::Aes128, AesKeyBits::Aes256] {
            let keys = keys(bits);
            let plain: Vec<u8> = (0u8..15).collect();

            let mut continuous = plain.clone();
            keys.encryptor().unwrap().encrypt(&mut continuous);

            let mut split = plain.clone();
            let mut enc = keys.encryptor().unwrap();
            enc.encrypt(&mut split[..10]);
            enc.encrypt(&mut split[10..]);
            assert_eq!(split, continuous);

            let mut dec = keys.decryptor().unwrap();
            dec.decrypt(&mut split[..3]);
            dec.decrypt(&mut split[3..]);
            assert_eq!(split, plain);
        }
    }

    #[test]
    fn test_multiple_frames_share_keystream() {
        let keys = keys(AesKeyBits::Aes256);
        let mut enc = keys.encryptor().unwrap();
        let mut dec = keys.decryptor().unwrap();

        let first = b"FPNN frame one".to_vec();
        let second = b"FPNN frame one".to_vec();

        let mut a = first.clone();
        let mut b = second.clone();
        enc.encrypt(&mut a);
        enc.encrypt(&mut b);
        // Same plaintext at different stream positions encrypts differently.
        assert_ne!(a, b);

        dec.decrypt(&mut a);
        dec.decrypt(&mut b);
        assert_eq!(a, first);
        assert_eq!(b, second);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let keys = keys(AesKeyBits::Aes128);
        let debug = format!("{keys:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("[0, 1, 2"));
    }
}
