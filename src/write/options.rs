//! Write options and configuration for archive creation.

use crate::codec::{CompressionMethod, DEFAULT_LEVEL, MAX_LEVEL, ParallelDeflateOptions, validate_level};
use crate::crypto::{AesStrength, AesVendorVersion, EncryptionMethod, Password};
use crate::format::{TimestampFormat, Zip64Policy};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Default chunk size for streaming entry content (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default size hint at which deflate switches to the parallel writer (16 MiB).
pub const DEFAULT_PARALLEL_THRESHOLD: u64 = 16 * 1024 * 1024;

fn check_writable(encryption: EncryptionMethod) -> Result<EncryptionMethod> {
    if encryption == EncryptionMethod::Aes(AesStrength::Aes192) {
        return Err(Error::InvalidArgument(
            "AES-192 entries can be read but not written".into(),
        ));
    }
    Ok(encryption)
}

/// Options for creating archives.
///
/// These apply to every entry unless overridden through [`EntryOptions`].
///
/// # Example
///
/// ```rust
/// use zipforge::crypto::AesStrength;
/// use zipforge::format::Zip64Policy;
/// use zipforge::write::WriteOptions;
///
/// let options = WriteOptions::new()
///     .level(9)?
///     .password("secret")
///     .aes(AesStrength::Aes128)
///     .zip64(Zip64Policy::Never)
///     .comment("nightly build");
/// assert!(options.is_encrypted());
/// # Ok::<(), zipforge::Error>(())
/// ```
#[derive(Clone)]
pub struct WriteOptions {
    /// Compression method to use.
    pub method: CompressionMethod,
    /// Compression level (0-9).
    pub level: u32,
    /// Encryption method. With a password set and this left at
    /// [`EncryptionMethod::None`], entries are encrypted with AES-256.
    pub encryption: EncryptionMethod,
    /// Password for encryption.
    pub password: Option<Password>,
    /// WinZip AES vendor version. AE-2 stores a zero CRC.
    pub aes_version: AesVendorVersion,
    /// When to emit Zip64 structures.
    pub zip64: Zip64Policy,
    /// Timestamp representations to write.
    pub timestamps: TimestampFormat,
    /// Chunk size used when streaming entry content.
    pub buffer_size: usize,
    /// Size hint at which deflate entries use the parallel writer
    /// (None = never).
    pub parallel_threshold: Option<u64>,
    /// Settings for the parallel writer.
    pub parallel: ParallelDeflateOptions,
    /// Archive comment.
    pub comment: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Deflate,
            level: DEFAULT_LEVEL,
            encryption: EncryptionMethod::None,
            password: None,
            aes_version: AesVendorVersion::Ae1,
            zip64: Zip64Policy::AsNecessary,
            timestamps: TimestampFormat::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            parallel_threshold: Some(DEFAULT_PARALLEL_THRESHOLD),
            parallel: ParallelDeflateOptions::default(),
            comment: None,
        }
    }
}

impl std::fmt::Debug for WriteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteOptions")
            .field("method", &self.method)
            .field("level", &self.level)
            .field("encryption", &self.effective_encryption())
            .field("has_password", &self.password.is_some())
            .field("aes_version", &self.aes_version)
            .field("zip64", &self.zip64)
            .field("timestamps", &self.timestamps)
            .field("buffer_size", &self.buffer_size)
            .field("parallel_threshold", &self.parallel_threshold)
            .field("comment", &self.comment)
            .finish()
    }
}

impl WriteOptions {
    /// Creates new write options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression method.
    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = method;
        self
    }

    /// Stores entries without compression.
    pub fn stored(self) -> Self {
        self.method(CompressionMethod::Stored)
    }

    /// Sets the compression level (strict validation).
    ///
    /// Valid values are 0-9, where:
    /// - 0: No compression (deflate framing only)
    /// - 1-3: Fast compression, lower ratio
    /// - 4-6: Balanced compression (default is 6)
    /// - 7-9: Maximum compression, slower
    ///
    /// Use [`level_clamped`] instead if you want invalid values to be silently
    /// clamped to 9 rather than returning an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`] if level is greater than 9.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zipforge::write::WriteOptions;
    ///
    /// let opts = WriteOptions::new().level(9)?;
    /// assert_eq!(opts.level, 9);
    ///
    /// let result = WriteOptions::new().level(15);
    /// assert!(result.is_err());
    /// # Ok::<(), zipforge::Error>(())
    /// ```
    ///
    /// [`level_clamped`]: Self::level_clamped
    pub fn level(mut self, level: u32) -> Result<Self> {
        self.level = validate_level(level)?;
        Ok(self)
    }

    /// Sets the compression level, clamping values above 9 (lenient validation).
    ///
    /// ```rust
    /// use zipforge::write::WriteOptions;
    ///
    /// assert_eq!(WriteOptions::new().level_clamped(7).level, 7);
    /// assert_eq!(WriteOptions::new().level_clamped(15).level, 9);
    /// ```
    pub fn level_clamped(mut self, level: u32) -> Self {
        self.level = level.min(MAX_LEVEL);
        self
    }

    /// Sets the encryption method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for AES-192, which is accepted on
    /// read only.
    pub fn encryption(mut self, encryption: EncryptionMethod) -> Result<Self> {
        self.encryption = check_writable(encryption)?;
        Ok(self)
    }

    /// Encrypts entries with traditional PKWARE encryption.
    pub fn zipcrypto(mut self) -> Self {
        self.encryption = EncryptionMethod::ZipCrypto;
        self
    }

    /// Encrypts entries with WinZip AES.
    ///
    /// AES-192 is downgraded to AES-256 since it cannot be written.
    pub fn aes(mut self, strength: AesStrength) -> Self {
        let strength = match strength {
            AesStrength::Aes192 => AesStrength::Aes256,
            other => other,
        };
        self.encryption = EncryptionMethod::Aes(strength);
        self
    }

    /// Sets the WinZip AES vendor version.
    pub fn aes_version(mut self, version: AesVendorVersion) -> Self {
        self.aes_version = version;
        self
    }

    /// Sets the password for encryption.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the Zip64 policy.
    pub fn zip64(mut self, policy: Zip64Policy) -> Self {
        self.zip64 = policy;
        self
    }

    /// Sets the timestamp representations to write.
    pub fn timestamps(mut self, format: TimestampFormat) -> Self {
        self.timestamps = format;
        self
    }

    /// Sets the streaming chunk size (at least 1 byte).
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Sets the size hint at which the parallel writer is used, or disables
    /// it with `None`.
    pub fn parallel_threshold(mut self, threshold: Option<u64>) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Sets the parallel writer settings.
    pub fn parallel(mut self, options: ParallelDeflateOptions) -> Self {
        self.parallel = options;
        self
    }

    /// Sets the parallel block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.parallel = self.parallel.block_size(size);
        self
    }

    /// Sets the number of parallel compression threads.
    pub fn threads(mut self, threads: usize) -> Self {
        self.parallel = self.parallel.threads(threads);
        self
    }

    /// Sets an archive comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Returns the encryption applied to entries that do not override it.
    pub fn effective_encryption(&self) -> EncryptionMethod {
        match (self.encryption, &self.password) {
            (EncryptionMethod::None, Some(_)) => EncryptionMethod::Aes(AesStrength::Aes256),
            (encryption, _) => encryption,
        }
    }

    /// Returns whether entries are encrypted by default.
    pub fn is_encrypted(&self) -> bool {
        self.effective_encryption().is_encrypted()
    }
}

/// Per-entry overrides of [`WriteOptions`].
///
/// # Example
///
/// ```rust
/// use zipforge::codec::CompressionMethod;
/// use zipforge::write::EntryOptions;
///
/// let options = EntryOptions::new()
///     .method(CompressionMethod::Stored)
///     .comment("already compressed")
///     .size_hint(4096);
/// assert_eq!(options.size_hint, Some(4096));
/// ```
#[derive(Clone, Default)]
pub struct EntryOptions {
    /// Compression method (None = archive default).
    pub method: Option<CompressionMethod>,
    /// Compression level (None = archive default).
    pub level: Option<u32>,
    /// Encryption method (None = archive default).
    pub encryption: Option<EncryptionMethod>,
    /// Password for this entry, taking precedence over the archive password.
    pub password: Option<Password>,
    /// Entry comment.
    pub comment: Option<String>,
    /// Timestamps and attributes.
    pub meta: EntryMeta,
    /// Expected uncompressed size, used to pick parallel deflate and to
    /// announce Zip64 up front on forward-only sinks.
    pub size_hint: Option<u64>,
    /// Exact size and CRC, when the content is already in memory.
    pub(crate) known: Option<(u64, u32)>,
}

impl std::fmt::Debug for EntryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryOptions")
            .field("method", &self.method)
            .field("level", &self.level)
            .field("encryption", &self.encryption)
            .field("has_password", &self.password.is_some())
            .field("comment", &self.comment)
            .field("meta", &self.meta)
            .field("size_hint", &self.size_hint)
            .finish()
    }
}

impl EntryOptions {
    /// Creates options that inherit everything from the archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the compression method.
    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Overrides the compression level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`] if level is greater than 9.
    pub fn level(mut self, level: u32) -> Result<Self> {
        self.level = Some(validate_level(level)?);
        Ok(self)
    }

    /// Overrides the encryption method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for AES-192.
    pub fn encryption(mut self, encryption: EncryptionMethod) -> Result<Self> {
        self.encryption = Some(check_writable(encryption)?);
        Ok(self)
    }

    /// Stores this entry unencrypted regardless of the archive settings.
    pub fn unencrypted(mut self) -> Self {
        self.encryption = Some(EncryptionMethod::None);
        self
    }

    /// Sets a password for this entry.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the entry comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Sets timestamps and attributes.
    pub fn meta(mut self, meta: EntryMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Sets the modification time.
    pub fn modified(mut self, time: Timestamp) -> Self {
        self.meta.modified = Some(time);
        self
    }

    /// Sets the expected uncompressed size.
    pub fn size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub(crate) fn known_content(mut self, data: &[u8]) -> Self {
        let crc = crc32fast::hash(data);
        self.known = Some((data.len() as u64, crc));
        self.size_hint = Some(data.len() as u64);
        self
    }
}

/// Metadata for an entry being written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMeta {
    /// Modification time (None = time of writing).
    pub modified: Option<Timestamp>,
    /// Access time.
    pub accessed: Option<Timestamp>,
    /// Creation time.
    pub created: Option<Timestamp>,
    /// MS-DOS attributes.
    pub attributes: Option<u32>,
    /// Unix mode bits. When set, the entry is recorded as made on Unix.
    pub unix_mode: Option<u32>,
}

impl EntryMeta {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates metadata from a filesystem path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the path cannot be read.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(&metadata))
    }

    /// Creates metadata from std::fs::Metadata.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let unix_mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };
        #[cfg(not(unix))]
        let unix_mode = None;

        let mut attributes = if metadata.is_dir() { 0x10 } else { 0x20 };
        if metadata.permissions().readonly() {
            attributes |= 0x01;
        }
        Self {
            modified: metadata.modified().ok().and_then(Timestamp::from_system_time),
            accessed: metadata.accessed().ok().and_then(Timestamp::from_system_time),
            created: metadata.created().ok().and_then(Timestamp::from_system_time),
            attributes: Some(attributes),
            unix_mode,
        }
    }

    /// Sets the modification time.
    pub fn modified(mut self, time: Timestamp) -> Self {
        self.modified = Some(time);
        self
    }

    /// Sets MS-DOS attributes.
    pub fn attributes(mut self, attrs: u32) -> Self {
        self.attributes = Some(attrs);
        self
    }

    /// Sets Unix mode bits.
    pub fn unix_mode(mut self, mode: u32) -> Self {
        self.unix_mode = Some(mode);
        self
    }
}

/// Result of writing an archive.
#[must_use = "write results should be checked to ensure archive was created successfully"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Number of file entries written.
    pub entries_written: usize,
    /// Number of directories written.
    pub directories_written: usize,
    /// Total uncompressed bytes.
    pub total_size: u64,
    /// Total compressed bytes, encryption overhead included.
    pub compressed_size: u64,
    /// End offset of the archive, which is its size unless the sink
    /// started after a prefix.
    pub archive_size: u64,
    /// Whether any Zip64 field or end record was written.
    pub zip64: bool,
}

impl WriteResult {
    /// Returns the compression ratio (compressed / uncompressed).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.total_size as f64
        }
    }

    /// Returns the space savings percentage.
    pub fn space_savings(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            1.0 - self.compression_ratio()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_options_default() {
        let opts = WriteOptions::default();
        assert_eq!(opts.level, 6);
        assert_eq!(opts.method, CompressionMethod::Deflate);
        assert_eq!(opts.zip64, Zip64Policy::AsNecessary);
        assert!(!opts.is_encrypted());
    }

    #[test]
    fn test_level_valid() {
        for level in 0..=9 {
            let result = WriteOptions::new().level(level);
            assert_eq!(result.unwrap().level, level);
        }
    }

    #[test]
    fn test_level_invalid() {
        for level in [10, 15, 100, u32::MAX] {
            let result = WriteOptions::new().level(level);
            assert!(matches!(
                result.unwrap_err(),
                Error::InvalidCompressionLevel { level: l } if l == level
            ));
        }
    }

    #[test]
    fn test_level_clamped() {
        assert_eq!(WriteOptions::new().level_clamped(0).level, 0);
        assert_eq!(WriteOptions::new().level_clamped(9).level, 9);
        assert_eq!(WriteOptions::new().level_clamped(10).level, 9);
        assert_eq!(WriteOptions::new().level_clamped(u32::MAX).level, 9);
    }

    #[test]
    fn test_password_implies_aes256() {
        let opts = WriteOptions::new().password("pw");
        assert_eq!(
            opts.effective_encryption(),
            EncryptionMethod::Aes(AesStrength::Aes256)
        );
        let opts = WriteOptions::new().password("pw").zipcrypto();
        assert_eq!(opts.effective_encryption(), EncryptionMethod::ZipCrypto);
    }

    #[test]
    fn test_aes192_not_writable() {
        let result = WriteOptions::new().encryption(EncryptionMethod::Aes(AesStrength::Aes192));
        assert!(result.unwrap_err().is_argument_error());
        let opts = WriteOptions::new().aes(AesStrength::Aes192);
        assert_eq!(opts.encryption, EncryptionMethod::Aes(AesStrength::Aes256));
    }

    #[test]
    fn test_debug_hides_password() {
        let opts = WriteOptions::new().password("hunter2");
        let debug = format!("{:?}", opts);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("has_password: true"));

        let entry = EntryOptions::new().password("hunter2");
        assert!(!format!("{:?}", entry).contains("hunter2"));
    }

    #[test]
    fn test_known_content() {
        let opts = EntryOptions::new().known_content(b"hello");
        assert_eq!(opts.known, Some((5, crc32fast::hash(b"hello"))));
        assert_eq!(opts.size_hint, Some(5));
    }

    #[test]
    fn test_entry_meta_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"x").unwrap();
        let meta = EntryMeta::from_path(&path).unwrap();
        assert!(meta.modified.is_some());
        assert_eq!(meta.attributes.map(|a| a & 0x10), Some(0));
    }

    #[test]
    fn test_write_result_ratio() {
        let result = WriteResult {
            total_size: 1000,
            compressed_size: 250,
            ..Default::default()
        };
        assert!((result.compression_ratio() - 0.25).abs() < 1e-9);
        assert!((result.space_savings() - 0.75).abs() < 1e-9);
        assert_eq!(WriteResult::default().compression_ratio(), 1.0);
    }
}
