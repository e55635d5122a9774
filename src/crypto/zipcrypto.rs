//! Traditional PKWARE ("ZipCrypto") encryption.
//!
//! Three 32-bit keys are initialised from fixed constants and updated with
//! every plaintext byte. Each entry starts with a 12-byte encryption header:
//! eleven random bytes followed by a check byte, which is the high byte of
//! the CRC-32 or, for entries with a data descriptor, the high byte of the
//! DOS time. The check byte lets a reader reject most wrong passwords
//! before touching the payload.

use std::io::{self, Read};

use super::{Password, fill_random};
use crate::{Error, Result};

/// Length of the encryption header.
pub const HEADER_LEN: usize = 12;

const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

#[inline]
fn crc_update(crc: u32, byte: u8) -> u32 {
    (crc >> 8) ^ CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
}

/// The ZipCrypto key state.
#[derive(Clone)]
pub struct ZipCryptoKeys {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl ZipCryptoKeys {
    /// Initialises the keys from a password.
    pub fn new(password: &Password) -> Self {
        let mut keys = Self {
            k0: 0x1234_5678,
            k1: 0x2345_6789,
            k2: 0x3456_7890,
        };
        for &b in password.as_bytes() {
            keys.update(b);
        }
        keys
    }

    #[inline]
    fn update(&mut self, plain: u8) {
        self.k0 = crc_update(self.k0, plain);
        self.k1 = self
            .k1
            .wrapping_add(self.k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.k2 = crc_update(self.k2, (self.k1 >> 24) as u8);
    }

    #[inline]
    fn stream_byte(&self) -> u8 {
        let t = (self.k2 | 2) as u16;
        (t.wrapping_mul(t ^ 1) >> 8) as u8
    }

    /// Encrypts one byte.
    #[inline]
    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.stream_byte();
        self.update(plain);
        cipher
    }

    /// Decrypts one byte.
    #[inline]
    pub fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.stream_byte();
        self.update(plain);
        plain
    }
}

impl Drop for ZipCryptoKeys {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.k0.zeroize();
        self.k1.zeroize();
        self.k2.zeroize();
    }
}

impl std::fmt::Debug for ZipCryptoKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipCryptoKeys").finish_non_exhaustive()
    }
}

/// Encrypts entry data with ZipCrypto.
#[derive(Debug)]
pub struct ZipCryptoEncryptor {
    keys: ZipCryptoKeys,
}

impl ZipCryptoEncryptor {
    /// Creates an encryptor and returns it with the encrypted header that
    /// must precede the entry data.
    pub fn new(password: &Password, check_byte: u8) -> Result<(Self, [u8; HEADER_LEN])> {
        let mut header = [0u8; HEADER_LEN];
        fill_random(&mut header[..HEADER_LEN - 1])?;
        header[HEADER_LEN - 1] = check_byte;
        Ok(Self::with_header(password, header))
    }

    /// Creates an encryptor from a caller-chosen plaintext header.
    pub fn with_header(password: &Password, mut header: [u8; HEADER_LEN]) -> (Self, [u8; HEADER_LEN]) {
        let mut keys = ZipCryptoKeys::new(password);
        for b in header.iter_mut() {
            *b = keys.encrypt_byte(*b);
        }
        (Self { keys }, header)
    }

    /// Encrypts `buf` in place.
    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        for b in buf {
            *b = self.keys.encrypt_byte(*b);
        }
    }
}

/// Decrypts entry data with ZipCrypto.
#[derive(Debug)]
pub struct ZipCryptoDecryptor {
    keys: ZipCryptoKeys,
}

impl ZipCryptoDecryptor {
    /// Consumes the encryption header and checks the password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongPassword`] if the decrypted check byte does not
    /// match `check_byte`. About one wrong password in 256 passes this test;
    /// the CRC check after extraction catches the rest.
    pub fn new(
        password: &Password,
        header: &[u8; HEADER_LEN],
        check_byte: u8,
        entry_name: &str,
    ) -> Result<Self> {
        let mut keys = ZipCryptoKeys::new(password);
        let mut last = 0;
        for &b in header {
            last = keys.decrypt_byte(b);
        }
        if last != check_byte {
            log::debug!("ZipCrypto check byte mismatch for '{}'", entry_name);
            return Err(Error::WrongPassword {
                entry_name: entry_name.to_string(),
            });
        }
        Ok(Self { keys })
    }

    /// Decrypts `buf` in place.
    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        for b in buf {
            *b = self.keys.decrypt_byte(*b);
        }
    }
}

/// A reader that decrypts ZipCrypto data on the fly.
#[derive(Debug)]
pub struct ZipCryptoReader<R> {
    inner: R,
    decryptor: ZipCryptoDecryptor,
}

impl<R: Read> ZipCryptoReader<R> {
    /// Reads the 12-byte header from `inner` and verifies the password.
    pub fn new(mut inner: R, password: &Password, check_byte: u8, entry_name: &str) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        inner.read_exact(&mut header).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidFormat(format!(
                    "entry '{entry_name}' is shorter than its encryption header"
                ))
            } else {
                Error::Io(e)
            }
        })?;
        let decryptor = ZipCryptoDecryptor::new(password, &header, check_byte, entry_name)?;
        Ok(Self { inner, decryptor })
    }
}

impl<R: Read> Read for ZipCryptoReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.decryptor.decrypt_in_place(&mut buf[..n]);
        Ok(n)
    }
}
