//! WinZip AES encryption (AE-1 and AE-2).
//!
//! An encrypted entry's data is laid out as
//!
//! ```text
//! salt (8/12/16) | password verifier (2) | ciphertext | authentication code (10)
//! ```
//!
//! PBKDF2-HMAC-SHA1 with 1000 iterations turns the password and salt into
//! `2 * key_len + 2` bytes: the AES key, the HMAC key and the verifier.
//! The ciphertext is AES-CTR with a little-endian counter starting at 1 and
//! no nonce. The authentication code is the first 10 bytes of HMAC-SHA1 over
//! the ciphertext.

use std::io::{self, Read};

use aes::cipher::{BlockEncrypt, KeyInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

use super::{Password, fill_random};
use crate::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// PBKDF2 iteration count fixed by the WinZip AES format.
pub const KEY_DERIVATION_ITERATIONS: u32 = 1000;

/// Length of the password verification value.
pub const PASSWORD_VERIFIER_LEN: usize = 2;

/// Length of the truncated HMAC-SHA1 authentication code.
pub const AUTH_CODE_LEN: usize = 10;

const BLOCK_SIZE: usize = 16;

/// AES key strength, as encoded in the AES extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AesStrength {
    /// 128-bit key, 8-byte salt.
    Aes128 = 1,
    /// 192-bit key, 12-byte salt. Readable but never written.
    Aes192 = 2,
    /// 256-bit key, 16-byte salt.
    Aes256 = 3,
}

impl AesStrength {
    /// Decodes the strength byte of the AES extra field.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Aes128),
            2 => Some(Self::Aes192),
            3 => Some(Self::Aes256),
            _ => None,
        }
    }

    /// Key length in bytes.
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// Salt length in bytes.
    pub const fn salt_len(self) -> usize {
        self.key_len() / 2
    }

    /// Bytes added to the compressed data: salt, verifier and auth code.
    pub const fn overhead(self) -> u64 {
        (self.salt_len() + PASSWORD_VERIFIER_LEN + AUTH_CODE_LEN) as u64
    }
}

/// AES vendor version.
///
/// AE-1 keeps the CRC-32 of the plaintext in the headers; AE-2 stores zero
/// there and relies on the authentication code alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum AesVendorVersion {
    /// AE-1.
    #[default]
    Ae1 = 1,
    /// AE-2.
    Ae2 = 2,
}

impl AesVendorVersion {
    /// Decodes the version field of the AES extra field.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Ae1),
            2 => Some(Self::Ae2),
            _ => None,
        }
    }
}

enum BlockCipher {
    Aes128(Box<aes::Aes128>),
    Aes192(Box<aes::Aes192>),
    Aes256(Box<aes::Aes256>),
}

impl BlockCipher {
    fn new(strength: AesStrength, key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::InvalidArgument(format!("AES key must be {} bytes", strength.key_len()));
        Ok(match strength {
            AesStrength::Aes128 => Self::Aes128(Box::new(aes::Aes128::new_from_slice(key).map_err(invalid)?)),
            AesStrength::Aes192 => Self::Aes192(Box::new(aes::Aes192::new_from_slice(key).map_err(invalid)?)),
            AesStrength::Aes256 => Self::Aes256(Box::new(aes::Aes256::new_from_slice(key).map_err(invalid)?)),
        })
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let block = aes::Block::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }
}

/// AES-CTR keystream with the WinZip counter layout.
pub(crate) struct CtrKeystream {
    cipher: BlockCipher,
    counter: u128,
    buffer: [u8; BLOCK_SIZE],
    pos: usize,
}

impl CtrKeystream {
    fn new(strength: AesStrength, key: &[u8]) -> Result<Self> {
        Ok(Self {
            cipher: BlockCipher::new(strength, key)?,
            counter: 1,
            buffer: [0u8; BLOCK_SIZE],
            pos: BLOCK_SIZE,
        })
    }

    /// XORs the keystream into `target`. Encryption and decryption are the
    /// same operation.
    pub(crate) fn apply(&mut self, mut target: &mut [u8]) {
        while !target.is_empty() {
            if self.pos == BLOCK_SIZE {
                self.buffer = self.counter.to_le_bytes();
                self.cipher.encrypt_block(&mut self.buffer);
                self.counter = self.counter.wrapping_add(1);
                self.pos = 0;
            }
            let n = target.len().min(BLOCK_SIZE - self.pos);
            for (dst, k) in target[..n].iter_mut().zip(&self.buffer[self.pos..self.pos + n]) {
                *dst ^= k;
            }
            target = &mut target[n..];
            self.pos += n;
        }
    }
}

/// Keys derived for one AES-encrypted entry.
pub struct AesEntryKeys {
    strength: AesStrength,
    encryption: Zeroizing<Vec<u8>>,
    authentication: Zeroizing<Vec<u8>>,
    verifier: [u8; PASSWORD_VERIFIER_LEN],
}

impl AesEntryKeys {
    /// Runs PBKDF2 over the password and salt.
    pub fn derive(password: &Password, strength: AesStrength, salt: &[u8]) -> Result<Self> {
        if salt.len() != strength.salt_len() {
            return Err(Error::InvalidArgument(format!(
                "AES salt must be {} bytes, got {}",
                strength.salt_len(),
                salt.len()
            )));
        }
        let key_len = strength.key_len();
        let mut derived = Zeroizing::new(vec![0u8; 2 * key_len + PASSWORD_VERIFIER_LEN]);
        pbkdf2::pbkdf2::<HmacSha1>(password.as_bytes(), salt, KEY_DERIVATION_ITERATIONS, &mut derived)
            .map_err(|e| Error::InvalidArgument(format!("key derivation failed: {e}")))?;
        let verifier = [derived[2 * key_len], derived[2 * key_len + 1]];
        Ok(Self {
            strength,
            encryption: Zeroizing::new(derived[..key_len].to_vec()),
            authentication: Zeroizing::new(derived[key_len..2 * key_len].to_vec()),
            verifier,
        })
    }

    /// Reads the salt and verifier from the start of the entry data, derives
    /// the keys and checks the verifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongPassword`] when the verifier does not match.
    pub fn from_reader<R: Read>(
        r: &mut R,
        password: &Password,
        strength: AesStrength,
        entry_name: &str,
    ) -> Result<Self> {
        let mut header = vec![0u8; strength.salt_len() + PASSWORD_VERIFIER_LEN];
        r.read_exact(&mut header).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidFormat(format!(
                    "entry '{entry_name}' is shorter than its AES header"
                ))
            } else {
                Error::Io(e)
            }
        })?;
        let (salt, stored) = header.split_at(strength.salt_len());
        let keys = Self::derive(password, strength, salt)?;
        if stored != keys.verifier {
            log::debug!("AES password verifier mismatch for '{}'", entry_name);
            return Err(Error::WrongPassword {
                entry_name: entry_name.to_string(),
            });
        }
        Ok(keys)
    }

    /// Returns the key strength.
    pub fn strength(&self) -> AesStrength {
        self.strength
    }

    /// Returns the password verification value.
    pub fn verifier(&self) -> [u8; PASSWORD_VERIFIER_LEN] {
        self.verifier
    }

    pub(crate) fn keystream(&self) -> Result<CtrKeystream> {
        CtrKeystream::new(self.strength, &self.encryption)
    }

    fn mac(&self) -> Result<HmacSha1> {
        <HmacSha1 as Mac>::new_from_slice(&self.authentication)
            .map_err(|e| Error::InvalidArgument(format!("invalid HMAC key: {e}")))
    }

    /// Authenticates `len` bytes of ciphertext from `r` followed by the
    /// 10-byte authentication code. Nothing is decrypted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] if the code does not verify.
    pub fn authenticate<R: Read>(&self, r: &mut R, len: u64, entry_name: &str) -> Result<()> {
        let mut mac = self.mac()?;
        let mut remaining = len;
        let mut buf = vec![0u8; crate::READ_BUFFER_SIZE];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            r.read_exact(&mut buf[..want])
                .map_err(|e| truncated_payload(e, entry_name))?;
            mac.update(&buf[..want]);
            remaining -= want as u64;
        }
        let mut code = [0u8; AUTH_CODE_LEN];
        r.read_exact(&mut code)
            .map_err(|e| truncated_payload(e, entry_name))?;
        verify_code(mac, &code, entry_name)
    }

    /// Verifies and decrypts an in-memory payload holding the ciphertext
    /// followed by the authentication code. The buffer is truncated to the
    /// plaintext on success and left untouched on failure.
    pub fn open_in_place(&self, data: &mut Vec<u8>, entry_name: &str) -> Result<()> {
        if data.len() < AUTH_CODE_LEN {
            return Err(Error::InvalidFormat(format!(
                "entry '{entry_name}' is shorter than its AES authentication code"
            )));
        }
        let split = data.len() - AUTH_CODE_LEN;
        let mut mac = self.mac()?;
        mac.update(&data[..split]);
        verify_code(mac, &data[split..], entry_name)?;
        data.truncate(split);
        self.keystream()?.apply(data);
        Ok(())
    }
}

impl std::fmt::Debug for AesEntryKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesEntryKeys")
            .field("strength", &self.strength)
            .finish_non_exhaustive()
    }
}

fn truncated_payload(e: io::Error, entry_name: &str) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::InvalidFormat(format!("AES payload of '{entry_name}' is truncated"))
    } else {
        Error::Io(e)
    }
}

fn verify_code(mac: HmacSha1, code: &[u8], entry_name: &str) -> Result<()> {
    // Constant-time comparison of the leading 80 bits
    mac.verify_truncated_left(code).map_err(|_| {
        log::warn!("AES authentication code mismatch for '{}'", entry_name);
        Error::AuthenticationFailed {
            entry_name: entry_name.to_string(),
        }
    })
}

/// Encrypts entry data and accumulates its authentication code.
pub struct AesEncryptor {
    keystream: CtrKeystream,
    mac: HmacSha1,
}

impl AesEncryptor {
    /// Creates an encryptor with a fresh random salt. Returns it together
    /// with the salt and verifier that must precede the ciphertext.
    pub fn new(password: &Password, strength: AesStrength) -> Result<(Self, Vec<u8>)> {
        let mut salt = vec![0u8; strength.salt_len()];
        fill_random(&mut salt)?;
        let keys = AesEntryKeys::derive(password, strength, &salt)?;
        let encryptor = Self {
            keystream: keys.keystream()?,
            mac: keys.mac()?,
        };
        let mut header = salt;
        header.extend_from_slice(&keys.verifier);
        Ok((encryptor, header))
    }

    /// Encrypts `buf` in place and feeds the ciphertext to the HMAC.
    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        self.keystream.apply(buf);
        self.mac.update(buf);
    }

    /// Returns the authentication code to append after the ciphertext.
    pub fn finish(self) -> [u8; AUTH_CODE_LEN] {
        let digest = self.mac.finalize().into_bytes();
        let mut code = [0u8; AUTH_CODE_LEN];
        code.copy_from_slice(&digest[..AUTH_CODE_LEN]);
        code
    }
}

/// Decrypts already-authenticated ciphertext.
///
/// The reader must be limited to the ciphertext; the authentication code
/// is checked beforehand with [`AesEntryKeys::authenticate`].
pub struct AesDecryptReader<R> {
    inner: R,
    keystream: CtrKeystream,
}

impl<R: Read> AesDecryptReader<R> {
    /// Wraps `inner`, which must be positioned at the first ciphertext byte.
    pub fn new(inner: R, keys: &AesEntryKeys) -> Result<Self> {
        Ok(Self {
            inner,
            keystream: keys.keystream()?,
        })
    }
}

impl<R: Read> Read for AesDecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.keystream.apply(&mut buf[..n]);
        Ok(n)
    }
}
