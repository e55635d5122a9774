//! Entry encryption for ZIP archives.
//!
//! Two schemes are supported:
//!
//! - **ZipCrypto**, the traditional PKWARE stream cipher. It is weak and
//!   only offered for compatibility with old tools.
//! - **WinZip AES** (AE-1 and AE-2), AES in CTR mode with keys derived by
//!   PBKDF2-HMAC-SHA1 and an HMAC-SHA1 authentication code over the
//!   ciphertext.
//!
//! Encryption is applied after compression; the encryption header (12 bytes
//! for ZipCrypto, salt plus verifier for AES) and the AES authentication
//! code are part of the entry's compressed size.

mod password;
mod winzip_aes;
mod zipcrypto;

pub use password::Password;
pub use winzip_aes::{
    AUTH_CODE_LEN, AesDecryptReader, AesEncryptor, AesEntryKeys, AesStrength, AesVendorVersion,
    KEY_DERIVATION_ITERATIONS, PASSWORD_VERIFIER_LEN,
};
pub use zipcrypto::{
    HEADER_LEN as ZIPCRYPTO_HEADER_LEN, ZipCryptoDecryptor, ZipCryptoEncryptor, ZipCryptoKeys,
    ZipCryptoReader,
};

use std::io;

/// The encryption scheme applied to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionMethod {
    /// No encryption.
    #[default]
    None,
    /// Traditional PKWARE encryption.
    ZipCrypto,
    /// WinZip AES with the given key strength.
    Aes(AesStrength),
}

impl EncryptionMethod {
    /// Returns true for any scheme other than [`EncryptionMethod::None`].
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, EncryptionMethod::None)
    }

    /// Returns the number of bytes the scheme adds to the compressed data.
    pub fn overhead(&self) -> u64 {
        match self {
            EncryptionMethod::None => 0,
            EncryptionMethod::ZipCrypto => zipcrypto::HEADER_LEN as u64,
            EncryptionMethod::Aes(strength) => strength.overhead(),
        }
    }

    /// Returns a short label for log and display output.
    pub fn name(&self) -> &'static str {
        match self {
            EncryptionMethod::None => "none",
            EncryptionMethod::ZipCrypto => "ZipCrypto",
            EncryptionMethod::Aes(AesStrength::Aes128) => "AES-128",
            EncryptionMethod::Aes(AesStrength::Aes192) => "AES-192",
            EncryptionMethod::Aes(AesStrength::Aes256) => "AES-256",
        }
    }
}

impl std::fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fills `buf` from the operating system's random source.
pub(crate) fn fill_random(buf: &mut [u8]) -> io::Result<()> {
    getrandom::getrandom(buf)
        .map_err(|e| io::Error::other(format!("random source unavailable: {e}")))
}

/// Picks the first available password in priority order.
pub(crate) fn resolve_password<'a>(candidates: &[Option<&'a Password>]) -> Option<&'a Password> {
    candidates.iter().flatten().copied().next()
}
