//! The per-entry transform chain: compress, then encrypt, then emit.
//!
//! Compressed bytes land in a [`CipherSink`] which encrypts them in place
//! and holds them until the writer drains them into the archive sink. The
//! encryption header is queued at construction so it is counted as part of
//! the entry's compressed size.

use std::io::{self, Write};
use std::mem;

use crate::Result;
use crate::checksum::{Checksum, Crc32};
use crate::codec::{CompressionMethod, EntryEncoder, ParallelDeflateOptions};
use crate::crypto::{AesEncryptor, ZipCryptoEncryptor};

/// The payload cipher of one entry.
pub(crate) enum Cipher {
    None,
    ZipCrypto(ZipCryptoEncryptor),
    Aes(AesEncryptor),
}

/// Encrypts whatever the compressor writes and buffers it for draining.
pub(crate) struct CipherSink {
    cipher: Cipher,
    pending: Vec<u8>,
}

impl CipherSink {
    /// `header` is the already-encrypted encryption header, if any.
    pub(crate) fn new(cipher: Cipher, header: Vec<u8>) -> Self {
        Self {
            cipher,
            pending: header,
        }
    }

    fn take(&mut self) -> Vec<u8> {
        mem::take(&mut self.pending)
    }

    /// Returns the remaining bytes followed by the AES authentication code.
    fn finish(self) -> Vec<u8> {
        let mut tail = self.pending;
        if let Cipher::Aes(encryptor) = self.cipher {
            tail.extend_from_slice(&encryptor.finish());
        }
        tail
    }
}

impl Write for CipherSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = self.pending.len();
        self.pending.extend_from_slice(buf);
        let fresh = &mut self.pending[start..];
        match &mut self.cipher {
            Cipher::None => {}
            Cipher::ZipCrypto(encryptor) => encryptor.encrypt_in_place(fresh),
            Cipher::Aes(encryptor) => encryptor.encrypt_in_place(fresh),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Final counters of a sealed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PipelineOutput {
    pub crc32: u32,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Compressor plus cipher for one entry, with running CRC and counters.
pub(crate) struct EntryPipeline {
    encoder: EntryEncoder<CipherSink>,
    crc: Crc32,
    bytes_in: u64,
    bytes_out: u64,
}

impl EntryPipeline {
    pub(crate) fn new(
        method: CompressionMethod,
        level: u32,
        parallel: Option<&ParallelDeflateOptions>,
        cipher: CipherSink,
    ) -> Result<Self> {
        Ok(Self {
            encoder: EntryEncoder::new(method, level, parallel, cipher)?,
            crc: Crc32::new(),
            bytes_in: 0,
            bytes_out: 0,
        })
    }

    pub(crate) fn is_parallel(&self) -> bool {
        self.encoder.is_parallel()
    }

    pub(crate) fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub(crate) fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Feeds uncompressed bytes and forwards whatever output is ready.
    pub(crate) fn write<S: Write>(&mut self, data: &[u8], sink: &mut S) -> io::Result<()> {
        // The parallel writer hashes blocks on its workers.
        if !self.encoder.is_parallel() {
            self.crc.update(data);
        }
        self.encoder.write_all(data)?;
        self.bytes_in += data.len() as u64;
        self.drain(sink)
    }

    fn drain<S: Write>(&mut self, sink: &mut S) -> io::Result<()> {
        let ready = self.encoder.sink_mut().take();
        if !ready.is_empty() {
            sink.write_all(&ready)?;
            self.bytes_out += ready.len() as u64;
        }
        Ok(())
    }

    /// Flushes the compressor and cipher into `sink`.
    pub(crate) fn finish<S: Write>(mut self, sink: &mut S) -> io::Result<PipelineOutput> {
        self.drain(sink)?;
        let (cipher, parallel_crc) = self.encoder.finish()?;
        let tail = cipher.finish();
        sink.write_all(&tail)?;
        self.bytes_out += tail.len() as u64;
        Ok(PipelineOutput {
            crc32: parallel_crc.unwrap_or_else(|| self.crc.finalize()),
            bytes_in: self.bytes_in,
            bytes_out: self.bytes_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AUTH_CODE_LEN, AesStrength, Password};

    #[test]
    fn test_plain_stored_passthrough() {
        let sink = CipherSink::new(Cipher::None, Vec::new());
        let mut pipeline = EntryPipeline::new(CompressionMethod::Stored, 6, None, sink).unwrap();
        let mut out = Vec::new();
        pipeline.write(b"hello ", &mut out).unwrap();
        pipeline.write(b"world", &mut out).unwrap();
        let result = pipeline.finish(&mut out).unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(result.bytes_in, 11);
        assert_eq!(result.bytes_out, 11);
        assert_eq!(result.crc32, crc32fast::hash(b"hello world"));
    }

    #[test]
    fn test_header_counts_toward_output() {
        let password = Password::new("pw");
        let (encryptor, header) = ZipCryptoEncryptor::new(&password, 0xAB).unwrap();
        let sink = CipherSink::new(Cipher::ZipCrypto(encryptor), header.to_vec());
        let pipeline = EntryPipeline::new(CompressionMethod::Stored, 6, None, sink).unwrap();
        let mut out = Vec::new();
        let result = pipeline.finish(&mut out).unwrap();
        assert_eq!(result.bytes_out, 12);
        assert_eq!(out, header);
    }

    #[test]
    fn test_aes_appends_auth_code() {
        let password = Password::new("pw");
        let (encryptor, header) = AesEncryptor::new(&password, AesStrength::Aes128).unwrap();
        let header_len = header.len();
        let sink = CipherSink::new(Cipher::Aes(encryptor), header);
        let mut pipeline = EntryPipeline::new(CompressionMethod::Stored, 6, None, sink).unwrap();
        let mut out = Vec::new();
        pipeline.write(b"secret", &mut out).unwrap();
        let result = pipeline.finish(&mut out).unwrap();
        assert_eq!(out.len(), header_len + 6 + AUTH_CODE_LEN);
        assert_ne!(&out[header_len..header_len + 6], b"secret");
        assert_eq!(result.bytes_out, out.len() as u64);
    }

    #[test]
    fn test_parallel_crc_matches_serial() {
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let options = ParallelDeflateOptions::default().threads(2).block_size(64 * 1024);
        let sink = CipherSink::new(Cipher::None, Vec::new());
        let mut pipeline =
            EntryPipeline::new(CompressionMethod::Deflate, 6, Some(&options), sink).unwrap();
        assert!(pipeline.is_parallel());
        let mut out = Vec::new();
        pipeline.write(&data, &mut out).unwrap();
        let result = pipeline.finish(&mut out).unwrap();
        assert_eq!(result.crc32, crc32fast::hash(&data));
        assert_eq!(result.bytes_out, out.len() as u64);
    }
}
