use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Larger length prefixes can only come from a corrupt tail.
const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// One record: `[u32 le: len][bincode: Event][u32 le: crc32 of payload]`.
fn encode_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len as usize <= MAX_RECORD_BYTES)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read one record and the number of bytes it occupied.
/// `Ok(None)` means a clean end of log or a torn/corrupt tail.
fn decode_record(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_BYTES {
        tracing::warn!(len, "WAL: implausible record length, stopping replay");
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    let mut crc_buf = [0u8; 4];
    for buf in [payload.as_mut_slice(), crc_buf.as_mut_slice()] {
        match reader.read_exact(buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::warn!("WAL: truncated record discarded");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        tracing::warn!("WAL: checksum mismatch, stopping replay");
        return Ok(None);
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Some((event, (len + 8) as u64))),
        Err(e) => {
            tracing::warn!("WAL: undecodable record, stopping replay: {e}");
            Ok(None)
        }
    }
}

/// Append-only log of scheduling events.
///
/// The engine owns exactly one `Wal` inside its writer task. A crash mid-write
/// leaves at most one torn record at the tail; `recover` cuts it off before the
/// log is reopened for appends.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer a record without syncing. Pair with `flush_sync` once per batch.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a snapshot of `events` next to the log and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            encode_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the log and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        tracing::info!(path = %self.path.display(), "WAL compacted");
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every intact event in the log, in append order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(Self::read_intact(path)?.0)
    }

    /// Replay, then truncate the file to the end of the last intact record so
    /// new appends are not written behind a torn tail.
    pub fn recover(path: &Path) -> io::Result<Vec<Event>> {
        let (events, intact_len, file_len) = Self::read_intact(path)?;
        if file_len > intact_len {
            tracing::warn!(
                path = %path.display(),
                discarded = file_len - intact_len,
                "WAL: truncating damaged tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(intact_len)?;
            file.sync_all()?;
        }
        Ok(events)
    }

    /// Intact events, the byte length they span, and the file's full length.
    fn read_intact(path: &Path) -> io::Result<(Vec<Event>, u64, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0, 0)),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut intact_len = 0;
        while let Some((event, consumed)) = decode_record(&mut reader)? {
            events.push(event);
            intact_len += consumed;
        }
        Ok((events, intact_len, file_len))
    }
}
