//! Parallel deflate writer for large entries.
//!
//! Input is cut into fixed-size blocks. Each block is deflated on its own
//! (no shared dictionary) and ended with a sync flush so that it stops on a
//! byte boundary without the final-block bit. Compressed blocks come back
//! from the worker pool out of order, tagged with their index, and are
//! written strictly in index order. An empty final block closes the stream.
//!
//! The CRC-32 of each block is computed by the worker and folded into the
//! entry CRC with [`Crc32::combine`], so the caller does not hash the input
//! a second time.
//!
//! Without the `parallel` feature the same block format is produced on the
//! calling thread.
//!
//! # Example
//!
//! ```rust
//! use std::io::Write;
//! use zipforge::codec::{ParallelDeflateOptions, ParallelDeflateWriter};
//!
//! let options = ParallelDeflateOptions::default().threads(2);
//! let mut writer = ParallelDeflateWriter::new(Vec::new(), options)?;
//! writer.write_all(&b"Hello, World! ".repeat(10_000))?;
//! let (compressed, crc) = writer.finish()?;
//! assert!(!compressed.is_empty());
//! # let _ = crc;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;
use std::io::{self, Write};

use flate2::{Compress, Compression, FlushCompress};

use super::DEFAULT_LEVEL;
use crate::checksum::{Checksum, Crc32};
use crate::Result;

/// Default block size for parallel compression (1 MB).
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Minimum block size (64 KB).
pub const MIN_BLOCK_SIZE: usize = 64 * 1024;

/// A final, empty fixed-Huffman block.
const FINAL_BLOCK: [u8; 2] = [0x03, 0x00];

/// Options for parallel deflate.
#[derive(Debug, Clone)]
pub struct ParallelDeflateOptions {
    /// Compression level (0-9, default 6).
    pub level: u32,
    /// Number of worker threads (None = auto-detect).
    pub threads: Option<usize>,
    /// Uncompressed bytes per block.
    pub block_size: usize,
    /// Maximum number of blocks dispatched but not yet written.
    ///
    /// Bounds memory use to roughly `max_in_flight * block_size`.
    pub max_in_flight: Option<usize>,
}

impl Default for ParallelDeflateOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            threads: None,
            block_size: DEFAULT_BLOCK_SIZE,
            max_in_flight: None,
        }
    }
}

impl ParallelDeflateOptions {
    /// Creates new options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression level (0-9).
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(super::MAX_LEVEL);
        self
    }

    /// Sets the number of threads to use.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads.max(1));
        self
    }

    /// Sets the block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size.max(MIN_BLOCK_SIZE);
        self
    }

    /// Sets the maximum number of blocks in flight.
    pub fn max_in_flight(mut self, blocks: usize) -> Self {
        self.max_in_flight = Some(blocks.max(1));
        self
    }

    /// Returns the effective number of threads.
    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Returns the effective in-flight bound.
    pub fn effective_max_in_flight(&self) -> usize {
        self.max_in_flight
            .unwrap_or_else(|| self.effective_threads() * 2)
    }
}

/// One compressed block.
#[derive(Debug)]
struct CompressedBlock {
    data: Vec<u8>,
    crc: u32,
    len: u64,
}

/// Deflates one block with a sync flush, without the final-block bit.
fn compress_block(input: &[u8], level: u32) -> io::Result<CompressedBlock> {
    let mut compress = Compress::new(Compression::new(level), false);
    let mut out = Vec::with_capacity(input.len() / 2 + 1024);
    loop {
        if out.capacity() - out.len() < 64 {
            out.reserve(out.capacity().max(4096));
        }
        let consumed = compress.total_in() as usize;
        compress
            .compress_vec(&input[consumed..], &mut out, FlushCompress::Sync)
            .map_err(io::Error::other)?;
        // The flush is complete once all input is consumed and the encoder
        // stopped short of filling the output buffer.
        if compress.total_in() as usize == input.len() && out.len() < out.capacity() {
            break;
        }
    }
    Ok(CompressedBlock {
        crc: crc32fast::hash(input),
        len: input.len() as u64,
        data: out,
    })
}

#[cfg(feature = "parallel")]
struct WorkerPool {
    pool: rayon::ThreadPool,
    tx: std::sync::mpsc::SyncSender<(usize, io::Result<CompressedBlock>)>,
    rx: std::sync::mpsc::Receiver<(usize, io::Result<CompressedBlock>)>,
}

/// A writer that deflates blocks on a worker pool and emits them in order.
pub struct ParallelDeflateWriter<W: Write> {
    inner: W,
    level: u32,
    block_size: usize,
    max_in_flight: usize,
    buffer: Vec<u8>,
    next_index: usize,
    next_to_write: usize,
    in_flight: usize,
    ready: BTreeMap<usize, CompressedBlock>,
    crc: Crc32,
    total_out: u64,
    #[cfg(feature = "parallel")]
    workers: WorkerPool,
}

impl<W: Write> std::fmt::Debug for ParallelDeflateWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelDeflateWriter")
            .field("level", &self.level)
            .field("block_size", &self.block_size)
            .field("blocks", &self.next_index)
            .finish_non_exhaustive()
    }
}

impl<W: Write> ParallelDeflateWriter<W> {
    /// Creates a writer with its own worker pool.
    pub fn new(inner: W, options: ParallelDeflateOptions) -> Result<Self> {
        let max_in_flight = options.effective_max_in_flight();
        #[cfg(feature = "parallel")]
        let workers = {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.effective_threads())
                .thread_name(|i| format!("zipforge-deflate-{i}"))
                .build()
                .map_err(|e| crate::Error::Io(io::Error::other(e)))?;
            // Capacity equals the in-flight bound, so workers never block
            // on send.
            let (tx, rx) = std::sync::mpsc::sync_channel(max_in_flight);
            WorkerPool { pool, tx, rx }
        };
        log::debug!(
            "parallel deflate: level {}, block size {}, {} threads",
            options.level,
            options.block_size,
            options.effective_threads()
        );
        Ok(Self {
            inner,
            level: options.level,
            block_size: options.block_size.max(MIN_BLOCK_SIZE),
            max_in_flight,
            buffer: Vec::with_capacity(options.block_size),
            next_index: 0,
            next_to_write: 0,
            in_flight: 0,
            ready: BTreeMap::new(),
            crc: Crc32::new(),
            total_out: 0,
            #[cfg(feature = "parallel")]
            workers,
        })
    }

    /// Returns a mutable reference to the output.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Returns the number of compressed bytes written so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Returns the number of blocks dispatched so far.
    pub fn blocks(&self) -> usize {
        self.next_index
    }

    fn dispatch(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        while self.in_flight >= self.max_in_flight {
            self.receive_one()?;
        }
        let block = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.block_size));
        let index = self.next_index;
        self.next_index += 1;
        self.in_flight += 1;

        #[cfg(feature = "parallel")]
        {
            let tx = self.workers.tx.clone();
            let level = self.level;
            self.workers.pool.spawn(move || {
                let result = compress_block(&block, level);
                // The receiver outlives every job unless the writer was
                // dropped, in which case the result is not wanted.
                let _ = tx.send((index, result));
            });
        }
        #[cfg(not(feature = "parallel"))]
        {
            let compressed = compress_block(&block, self.level)?;
            self.accept(index, compressed)?;
        }
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn receive_one(&mut self) -> io::Result<()> {
        let (index, result) = self
            .workers
            .rx
            .recv()
            .map_err(|_| io::Error::other("deflate worker pool disconnected"))?;
        self.accept(index, result?)
    }

    #[cfg(not(feature = "parallel"))]
    fn receive_one(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn accept(&mut self, index: usize, block: CompressedBlock) -> io::Result<()> {
        self.in_flight -= 1;
        self.ready.insert(index, block);
        while let Some(block) = self.ready.remove(&self.next_to_write) {
            self.inner.write_all(&block.data)?;
            self.total_out += block.data.len() as u64;
            self.crc.combine(&Crc32::with_initial(block.crc, block.len));
            self.next_to_write += 1;
        }
        Ok(())
    }

    /// Compresses the remaining input, waits for all blocks and writes the
    /// final block. Returns the output and the CRC-32 of all input.
    pub fn finish(mut self) -> io::Result<(W, u32)> {
        self.dispatch()?;
        while self.in_flight > 0 {
            self.receive_one()?;
        }
        self.inner.write_all(&FINAL_BLOCK)?;
        self.total_out += FINAL_BLOCK.len() as u64;
        log::debug!(
            "parallel deflate finished: {} blocks, {} -> {} bytes",
            self.next_index,
            self.crc.len(),
            self.total_out
        );
        let crc = self.crc.finalize();
        Ok((self.inner, crc))
    }
}

impl<W: Write> Write for ParallelDeflateWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.block_size - self.buffer.len();
        let n = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() == self.block_size {
            self.dispatch()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
