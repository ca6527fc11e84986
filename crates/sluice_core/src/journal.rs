//! Durable action journal.
//!
//! [`JournalStore`] implements [`ActionStore`] on top of any
//! [`LogBackend`] as an append-only log of CBOR records. Each `save`
//! appends an upsert frame and each `delete` appends a remove frame,
//! followed by a `sync`, so a crash after either call never loses the
//! mutation. Dead frames accumulate until compaction rewrites the log
//! from the live set.
//!
//! ## On-disk layout
//!
//! ```text
//! [magic "SLQJ"][version u16-le]            file header, 6 bytes
//! [len u32-le][crc32 u32-le][cbor payload]  one frame per record
//! ```
//!
//! The CRC covers the payload only. A torn final frame (short header,
//! short payload, bad checksum or undecodable bytes at the tail) is the
//! expected signature of a crash mid-append and is truncated away on
//! open; the same damage anywhere before the tail is corruption and
//! fails the open.

use crate::action::QueuedAction;
use crate::error::{CoreError, CoreResult};
use crate::store::ActionStore;
use crate::types::ActionId;
use serde::{Deserialize, Serialize};
use sluice_storage::LogBackend;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Magic bytes opening a journal file.
pub const JOURNAL_MAGIC: [u8; 4] = *b"SLQJ";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// File header length in bytes: magic plus version.
const HEADER_LEN: u64 = 6;

/// Frame header length in bytes: payload length plus checksum.
const FRAME_HEADER_LEN: u64 = 8;

/// One persisted journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum JournalRecord {
    /// Insert or replace an action.
    Upsert(QueuedAction),
    /// Remove an action.
    Remove(ActionId),
}

/// Computes the IEEE CRC32 checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

/// Counts describing the current journal contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JournalStats {
    /// Frames currently in the log.
    pub frames: u64,
    /// Actions alive after replay.
    pub live: u64,
    /// Frames superseded by later upserts or removes.
    pub dead: u64,
}

/// Result of a read-only journal integrity scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalCheck {
    /// Frames with valid headers and checksums.
    pub frames: u64,
    /// Actions alive after replaying those frames.
    pub live: u64,
    /// True if trailing bytes after the last valid frame would be
    /// truncated on open.
    pub torn_tail: bool,
}

struct ScanResult {
    live: HashMap<ActionId, QueuedAction>,
    frames: u64,
    /// Log length covered by valid frames, header included.
    valid_len: u64,
}

/// A durable [`ActionStore`] over an append-only log backend.
#[derive(Debug)]
pub struct JournalStore<B: LogBackend> {
    backend: B,
    live: HashMap<ActionId, QueuedAction>,
    frames: u64,
    compact_min_dead: u64,
}

impl<B: LogBackend> JournalStore<B> {
    /// Opens a journal, initializing an empty backend with a fresh
    /// header and recovering an existing one by replay.
    ///
    /// A torn final frame is truncated away with a warning; records
    /// before it survive.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, an unrecognized header, or
    /// corruption before the final frame.
    pub fn open(mut backend: B, compact_min_dead: u64) -> CoreResult<Self> {
        let size = backend.size()?;

        if size == 0 {
            let mut header = Vec::with_capacity(HEADER_LEN as usize);
            header.extend_from_slice(&JOURNAL_MAGIC);
            header.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
            backend.append(&header)?;
            backend.sync()?;
            return Ok(Self {
                backend,
                live: HashMap::new(),
                frames: 0,
                compact_min_dead,
            });
        }

        read_header(&backend, size)?;
        let scan = scan_frames(&backend, size)?;

        if scan.valid_len < size {
            warn!(
                valid = scan.valid_len,
                size, "truncating torn journal tail"
            );
            backend.truncate(scan.valid_len)?;
            backend.sync()?;
        }

        debug!(
            frames = scan.frames,
            live = scan.live.len(),
            "journal recovered"
        );

        Ok(Self {
            backend,
            live: scan.live,
            frames: scan.frames,
            compact_min_dead,
        })
    }

    /// Scans a journal without modifying it.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, an unrecognized header, or
    /// corruption before the final frame.
    pub fn check(backend: &B) -> CoreResult<JournalCheck> {
        let size = backend.size()?;
        if size == 0 {
            return Ok(JournalCheck {
                frames: 0,
                live: 0,
                torn_tail: false,
            });
        }

        read_header(backend, size)?;
        let scan = scan_frames(backend, size)?;
        Ok(JournalCheck {
            frames: scan.frames,
            live: scan.live.len() as u64,
            torn_tail: scan.valid_len < size,
        })
    }

    /// Current frame and liveness counts.
    #[must_use]
    pub fn stats(&self) -> JournalStats {
        let live = self.live.len() as u64;
        JournalStats {
            frames: self.frames,
            live,
            dead: self.frames.saturating_sub(live),
        }
    }

    /// Rewrites the log to contain only the live set.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewritten log cannot be made durable.
    pub fn compact(&mut self) -> CoreResult<()> {
        let mut data = Vec::new();
        data.extend_from_slice(&JOURNAL_MAGIC);
        data.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());

        for action in self.live.values() {
            let frame = encode_frame(&JournalRecord::Upsert(action.clone()))?;
            data.extend_from_slice(&frame);
        }

        self.backend.replace(&data)?;
        let reclaimed = self.frames.saturating_sub(self.live.len() as u64);
        self.frames = self.live.len() as u64;
        debug!(live = self.frames, reclaimed, "journal compacted");
        Ok(())
    }

    fn append_record(&mut self, record: &JournalRecord) -> CoreResult<()> {
        let frame = encode_frame(record)?;
        self.backend.append(&frame)?;
        self.backend.sync()?;
        self.frames += 1;
        Ok(())
    }

    /// Compacts once dead frames reach the configured floor and at
    /// least half the log is dead.
    fn maybe_compact(&mut self) -> CoreResult<()> {
        let stats = self.stats();
        if stats.dead >= self.compact_min_dead && stats.dead >= stats.live {
            self.compact()?;
        }
        Ok(())
    }
}

impl<B: LogBackend> ActionStore for JournalStore<B> {
    fn load(&mut self) -> CoreResult<Vec<QueuedAction>> {
        Ok(self.live.values().cloned().collect())
    }

    fn save(&mut self, action: &QueuedAction) -> CoreResult<()> {
        self.append_record(&JournalRecord::Upsert(action.clone()))?;
        self.live.insert(action.id, action.clone());
        self.maybe_compact()
    }

    fn delete(&mut self, id: ActionId) -> CoreResult<()> {
        if self.live.remove(&id).is_none() {
            return Ok(());
        }
        self.append_record(&JournalRecord::Remove(id))?;
        self.maybe_compact()
    }
}

fn read_header<B: LogBackend>(backend: &B, size: u64) -> CoreResult<()> {
    if size < HEADER_LEN {
        return Err(CoreError::invalid_format(format!(
            "journal shorter than its header: {size} bytes"
        )));
    }
    let header = backend.read_at(0, HEADER_LEN as usize)?;
    if header[0..4] != JOURNAL_MAGIC {
        return Err(CoreError::invalid_format("bad journal magic"));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != JOURNAL_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported journal version {version}, expected {JOURNAL_VERSION}"
        )));
    }
    Ok(())
}

fn scan_frames<B: LogBackend>(backend: &B, size: u64) -> CoreResult<ScanResult> {
    let mut live = HashMap::new();
    let mut frames = 0u64;
    let mut offset = HEADER_LEN;

    while offset < size {
        // Short frame header only ever happens at the tail.
        if size - offset < FRAME_HEADER_LEN {
            break;
        }
        let header = backend.read_at(offset, FRAME_HEADER_LEN as usize)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let payload_offset = offset + FRAME_HEADER_LEN;
        let is_last = payload_offset.saturating_add(len) >= size;
        if payload_offset + len > size {
            break;
        }

        let payload = backend.read_at(payload_offset, len as usize)?;
        let actual_crc = compute_crc32(&payload);
        if actual_crc != expected_crc {
            if is_last {
                break;
            }
            return Err(CoreError::ChecksumMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let record: JournalRecord = match ciborium::de::from_reader(payload.as_slice()) {
            Ok(record) => record,
            Err(e) if is_last => {
                warn!("undecodable final journal frame: {e}");
                break;
            }
            Err(e) => {
                return Err(CoreError::journal_corruption(format!(
                    "undecodable frame at offset {offset}: {e}"
                )));
            }
        };

        match record {
            JournalRecord::Upsert(action) => {
                live.insert(action.id, action);
            }
            JournalRecord::Remove(id) => {
                live.remove(&id);
            }
        }

        frames += 1;
        offset = payload_offset + len;
    }

    Ok(ScanResult {
        live,
        frames,
        valid_len: offset,
    })
}

fn encode_frame(record: &JournalRecord) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(record, &mut payload)
        .map_err(|e| CoreError::codec(format!("failed to encode journal record: {e}")))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN as usize + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}
