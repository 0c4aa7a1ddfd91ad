use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Bytes of framing around each payload: length prefix + crc32 trailer.
const FRAME_OVERHEAD: u64 = 8;

/// Encode a single event as `[u32 len][bincode][u32 crc32]`.
fn encode_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes; `Ok(false)` on a clean or torn EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Result of scanning a log file from the start.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte length of the valid prefix. Anything after it is discarded on open.
    pub valid_len: u64,
    /// True when trailing bytes were truncated or failed their checksum.
    pub torn_tail: bool,
}

/// Append-only write-ahead log of booking events.
///
/// Replay stops at the first frame that is short or fails its CRC. Garbage
/// can reach the file two ways: a crash mid-append, cleaned up by `open`
/// truncating to the replayed prefix, or a batch whose write or fsync fails
/// while the process keeps running, cleaned up by `rollback` truncating to
/// the end of the last synced batch. If `rollback` itself fails the log
/// refuses every further append until it is compacted.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length after the last successful `flush_sync`.
    committed_len: u64,
    pending_appends: u64,
    appends_since_compact: u64,
    failed: bool,
}

impl Wal {
    /// Open (or create) the log at `path`, truncated to `valid_len` bytes.
    pub fn open(path: &Path, valid_len: u64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        let committed_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            committed_len,
            pending_appends: 0,
            appends_since_compact: 0,
            failed: false,
        })
    }

    /// Append and fsync one event. Production code batches through
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event without flushing. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::other("wal refused append after a failed rollback"));
        }
        encode_frame(&mut self.writer, event)?;
        self.pending_appends += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.sync_all()?;
        self.committed_len = file.metadata()?.len();
        self.appends_since_compact += self.pending_appends;
        self.pending_appends = 0;
        Ok(())
    }

    /// Drop everything appended since the last successful `flush_sync`, both
    /// the bytes still buffered and any that already reached the file.
    pub fn rollback(&mut self) -> io::Result<()> {
        let reopened = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .and_then(|file| {
                file.set_len(self.committed_len)?;
                file.sync_all()?;
                Ok(file)
            });
        match reopened {
            Ok(file) => {
                let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
                // into_parts hands back the unwritten buffer instead of flushing it
                let _ = stale.into_parts();
                self.pending_appends = 0;
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.compact")
    }

    /// Write a full snapshot of `events` next to the log and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            encode_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the live log and reopen it for appends.
    ///
    /// The snapshot is the whole truth, so this also clears a failed rollback.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        if !self.failed {
            self.writer.flush()?;
        }
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let _ = stale.into_parts();
        self.committed_len = self.writer.get_ref().metadata()?.len();
        self.pending_appends = 0;
        self.appends_since_compact = 0;
        self.failed = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Scan the log, returning every event in the valid prefix.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_full(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as u64;
            if replay.valid_len + FRAME_OVERHEAD + len > file_len {
                break;
            }

            let mut payload = vec![0u8; len as usize];
            let mut crc_buf = [0u8; 4];
            if !read_full(&mut reader, &mut payload)? || !read_full(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => replay.events.push(event),
                Err(_) => break,
            }
            replay.valid_len += FRAME_OVERHEAD + len;
        }

        replay.torn_tail = replay.valid_len < file_len;
        Ok(replay)
    }
}
