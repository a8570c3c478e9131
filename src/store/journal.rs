//! Write-through JSON-lines journal.
//!
//! Every committed write is one line. Replaying the file in order rebuilds
//! the latest state (last record per key wins). [`Journal::compact`] rewrites
//! the file to one record per live key via tmp file + rename.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::model::{ContentItem, Source, SourceId, SyncRun};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum Record {
    Source(Source),
    DeleteSource(SourceId),
    Item(ContentItem),
    Run(SyncRun),
}

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    /// The file may end mid-line (crash or failed write); the next append
    /// starts with a newline so it is not glued onto the torn record.
    torn: bool,
}

/// Whether a non-empty file lacks its final newline.
fn ends_mid_line(path: &Path) -> io::Result<bool> {
    let mut f = File::open(path)?;
    if f.metadata()?.len() == 0 {
        return Ok(false);
    }
    f.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl Journal {
    /// Open for append, creating parent directories and the file.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            torn: ends_mid_line(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &Record) -> Result<(), PersistenceError> {
        let mut line = Vec::with_capacity(512);
        if self.torn {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, record)?;
        line.push(b'\n');
        match self.file.write_all(&line) {
            Ok(()) => {
                self.torn = false;
                Ok(())
            }
            Err(e) => {
                self.torn = true;
                Err(e.into())
            }
        }
    }

    /// Replace the journal with `records` and keep appending to the new file.
    pub fn compact<'a>(&mut self, records: impl Iterator<Item = Record> + 'a) -> io::Result<()> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for r in records {
                let line = serde_json::to_vec(&r)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                out.write_all(&line)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.torn = false;
        Ok(())
    }
}

/// Read all records. Undecodable lines (typically a torn last write) are
/// skipped and counted.
pub fn replay(path: &Path) -> io::Result<(Vec<Record>, usize)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut records = Vec::new();
    let mut skipped = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(&line) {
            Ok(r) => records.push(r),
            Err(e) => {
                tracing::warn!(target: "store", error = %e, "skipping undecodable journal line");
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}
