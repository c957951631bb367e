//! Append-only booking event journal. Every accepted mutation lands here
//! before it is applied in memory, and startup loads the file to rebuild
//! state.
//!
//! On-disk layout is a sequence of frames:
//!
//! ```text
//! [u32: payload len][u32: crc32 of payload][bincode: Event]
//! ```
//!
//! A crash mid-append leaves a short or checksum-broken frame at the tail;
//! loading stops at the first such frame and discards the rest, so a torn
//! tail never poisons recovery.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

const FRAME_HEADER: usize = 8;

/// One event framed for disk: header plus payload in a single buffer so the
/// frame hits the writer in one `write_all`.
fn frame(event: &Event) -> io::Result<Vec<u8>> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut buf = Vec::with_capacity(FRAME_HEADER + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// What one attempt to read a frame produced.
enum NextFrame {
    Event(Event),
    /// Clean end of file.
    End,
    /// Short read or checksum failure: the torn tail.
    Torn,
}

fn read_frame(reader: &mut impl Read) -> io::Result<NextFrame> {
    let mut header = [0u8; FRAME_HEADER];
    match read_or_eof(reader, &mut header)? {
        Filled::Complete => {}
        Filled::Empty => return Ok(NextFrame::End),
        Filled::Partial => return Ok(NextFrame::Torn),
    }
    let len = u32::from_le_bytes(header[..4].try_into().unwrap()) as usize;
    let stored_crc = u32::from_le_bytes(header[4..].try_into().unwrap());

    let mut payload = vec![0u8; len];
    if !matches!(read_or_eof(reader, &mut payload)?, Filled::Complete) {
        return Ok(NextFrame::Torn);
    }
    if crc32fast::hash(&payload) != stored_crc {
        return Ok(NextFrame::Torn);
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(NextFrame::Event(event)),
        Err(_) => Ok(NextFrame::Torn),
    }
}

enum Filled {
    Complete,
    Partial,
    Empty,
}

/// Fill `buf` from the reader, distinguishing a clean EOF before the first
/// byte from one in the middle of the buffer.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Filled> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 { Filled::Empty } else { Filled::Partial });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Filled::Complete)
}

pub struct Journal {
    out: BufWriter<File>,
    path: PathBuf,
    appended: u64,
}

impl Journal {
    /// Open (or create) the journal file at `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { out: BufWriter::new(file), path: path.to_path_buf(), appended: 0 })
    }

    /// Buffer one event without flushing or syncing. `commit` makes the whole
    /// buffered batch durable with a single fsync.
    pub fn buffer(&mut self, event: &Event) -> io::Result<()> {
        self.out.write_all(&frame(event)?)?;
        self.appended += 1;
        Ok(())
    }

    /// Flush the buffer and fsync the file. One call per group-commit batch.
    pub fn commit(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()
    }

    /// Buffer and commit one event. Tests only; production batches.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.buffer(event)?;
        self.commit()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames appended since the journal was opened or last rewritten. The
    /// compactor uses this as its rewrite trigger.
    pub fn appends_since_rewrite(&self) -> u64 {
        self.appended
    }

    /// Phase one of a rewrite: write `events` to a sibling temp file and
    /// fsync it. Slow I/O; safe to run while appends continue.
    pub fn stage_rewrite(path: &Path, events: &[Event]) -> io::Result<()> {
        let staged = path.with_extension("journal.tmp");
        let mut out = BufWriter::new(File::create(&staged)?);
        for event in events {
            out.write_all(&frame(event)?)?;
        }
        out.flush()?;
        out.get_ref().sync_all()
    }

    /// Phase two: rename the staged file over the journal and reopen for
    /// appending. Fast; run while holding the writer.
    pub fn finish_rewrite(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("journal.tmp"), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.out = BufWriter::new(file);
        self.appended = 0;
        Ok(())
    }

    /// Both rewrite phases back to back. Tests only.
    #[cfg(test)]
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        Self::stage_rewrite(&self.path, events)?;
        self.finish_rewrite()
    }

    /// Load every intact event from disk. A missing file is an empty journal;
    /// a torn tail ends the load without error.
    pub fn load(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        loop {
            match read_frame(&mut reader)? {
                NextFrame::Event(event) => events.push(event),
                NextFrame::End | NextFrame::Torn => break,
            }
        }
        Ok(events)
    }
}
