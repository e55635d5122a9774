//! Password handling for ZIP encryption.

use zeroize::Zeroizing;

/// A password for entry encryption/decryption.
///
/// ZipCrypto and WinZip AES both key off raw password bytes with no
/// declared encoding. Strings are stored as UTF-8; archives written by
/// legacy tools may need the exact bytes of another code page, which
/// [`Password::from_bytes`] accepts. The bytes are wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Password {
    bytes: Zeroizing<Vec<u8>>,
}

impl Password {
    /// Creates a password from a string, encoded as UTF-8.
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self::from_bytes(password.into().into_bytes())
    }

    /// Creates a password from raw bytes, for archives whose passwords were
    /// entered in a legacy code page.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes.into()),
        }
    }

    /// Returns the bytes fed to key derivation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the password as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Returns true if the password is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&[u8]> for Password {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}
