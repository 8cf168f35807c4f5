//! Bounded durable FIFO queue of readings awaiting delivery.
//!
//! Every mutation is appended to a JSON-lines journal and synced before it
//! is visible in memory, so a crash never loses an enqueued reading. On
//! open the journal is replayed and rewritten down to the live entries.
//!
//! Attempt counts are diagnostic and deliberately not journaled; a restart
//! resets them to zero.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use sensey_types::Reading;

use crate::error::{ClientError, Result};

/// Compact once the journal holds this many dead records beyond the live set.
const COMPACTION_SLACK: usize = 256;

/// One queued reading.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Journal-assigned id, unique for the life of the journal file.
    pub id: u64,
    pub reading: Reading,
    /// Delivery attempts so far. In-memory only.
    pub attempt_count: u32,
    pub enqueued_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Push {
        id: u64,
        #[serde(with = "time::serde::rfc3339")]
        enqueued_at: OffsetDateTime,
        reading: Reading,
    },
    Ack {
        id: u64,
    },
    Evict {
        id: u64,
    },
}

/// Durable bounded FIFO queue.
pub struct DurableQueue {
    entries: VecDeque<QueueEntry>,
    journal: File,
    path: PathBuf,
    capacity: usize,
    next_id: u64,
    journal_records: usize,
}

impl DurableQueue {
    /// Open a queue backed by the journal at `path`, creating it if absent.
    ///
    /// Existing records are replayed; entries beyond `capacity` are evicted
    /// oldest-first, and the journal is compacted down to the live set.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if capacity == 0 {
            return Err(ClientError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut entries = replay(&path)?;
        let next_id = entries.iter().map(|e| e.id).max().map_or(0, |id| id + 1);

        let evicted = entries.len().saturating_sub(capacity);
        if evicted > 0 {
            warn!("Queue over capacity on open, evicting {} oldest entries", evicted);
            entries.drain(..evicted);
        }

        let mut queue = Self {
            entries,
            journal: open_append(&path)?,
            path,
            capacity,
            next_id,
            journal_records: 0,
        };
        queue.compact()?;

        info!(
            "Queue opened with {} pending entries at {}",
            queue.entries.len(),
            queue.path.display()
        );
        Ok(queue)
    }

    /// Enqueue a reading, evicting the oldest entry if the queue is full.
    /// The reading is durable once this returns.
    ///
    /// The push and any eviction are journaled in a single write, push
    /// first, so a failed append never destroys the oldest entry without
    /// admitting the new one.
    pub fn push(&mut self, reading: Reading) -> Result<u64> {
        let entry = QueueEntry {
            id: self.next_id,
            enqueued_at: OffsetDateTime::now_utc(),
            attempt_count: 0,
            reading,
        };

        let mut records = vec![JournalRecord::Push {
            id: entry.id,
            enqueued_at: entry.enqueued_at,
            reading: entry.reading.clone(),
        }];
        let evict = if self.entries.len() >= self.capacity {
            self.entries.front().map(|oldest| oldest.id)
        } else {
            None
        };
        if let Some(id) = evict {
            records.push(JournalRecord::Evict { id });
        }
        self.append_all(&records)?;

        self.next_id += 1;
        if evict.is_some()
            && let Some(oldest) = self.entries.pop_front()
        {
            warn!(
                "Queue full ({} entries), evicting oldest reading from {}",
                self.capacity, oldest.reading.client_id
            );
        }
        let id = entry.id;
        self.entries.push_back(entry);
        debug!("Enqueued reading, {} pending", self.entries.len());
        Ok(id)
    }

    /// The oldest pending entry, if any.
    pub fn front(&self) -> Option<QueueEntry> {
        self.entries.front().cloned()
    }

    /// The oldest `max_n` pending entries, cloned, not removed.
    pub fn peek_batch(&self, max_n: usize) -> Vec<QueueEntry> {
        self.entries.iter().take(max_n).cloned().collect()
    }

    /// Remove delivered entries. Ids that are unknown or already evicted
    /// are ignored. Durable once this returns.
    pub fn acknowledge(&mut self, ids: &[u64]) -> Result<()> {
        for &id in ids {
            if self.entries.iter().any(|e| e.id == id) {
                self.append(&JournalRecord::Ack { id })?;
                self.remove(id);
            }
        }
        self.maybe_compact()?;
        Ok(())
    }

    /// Bump the attempt counter after a failed delivery.
    pub fn record_failure(&mut self, id: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.attempt_count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove(&mut self, id: u64) {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            self.entries.remove(pos);
        }
    }

    fn append(&mut self, record: &JournalRecord) -> Result<()> {
        self.append_all(std::slice::from_ref(record))
    }

    fn append_all(&mut self, records: &[JournalRecord]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        self.journal.write_all(&buf)?;
        self.journal.sync_data()?;
        self.journal_records += records.len();
        Ok(())
    }

    fn maybe_compact(&mut self) -> Result<()> {
        if self.journal_records > self.entries.len() + COMPACTION_SLACK {
            self.compact()?;
        }
        Ok(())
    }

    /// Rewrite the journal with only the live entries, through a temp file
    /// and rename so a crash mid-compaction leaves a valid journal behind.
    fn compact(&mut self) -> Result<()> {
        let tmp = self.path.with_extension("journal.tmp");
        {
            let mut out = File::create(&tmp)?;
            for entry in &self.entries {
                let record = JournalRecord::Push {
                    id: entry.id,
                    enqueued_at: entry.enqueued_at,
                    reading: entry.reading.clone(),
                };
                let mut line = serde_json::to_vec(&record)?;
                line.push(b'\n');
                out.write_all(&line)?;
            }
            out.sync_data()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.journal = open_append(&self.path)?;
        self.journal_records = self.entries.len();
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn replay(path: &Path) -> Result<VecDeque<QueueEntry>> {
    if !path.exists() {
        return Ok(VecDeque::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut entries: VecDeque<QueueEntry> = VecDeque::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: JournalRecord = serde_json::from_str(&line).map_err(|e| {
            ClientError::CorruptJournal(format!("line {}: {}", line_no + 1, e))
        })?;
        match record {
            JournalRecord::Push {
                id,
                enqueued_at,
                reading,
            } => entries.push_back(QueueEntry {
                id,
                reading,
                attempt_count: 0,
                enqueued_at,
            }),
            JournalRecord::Ack { id } | JournalRecord::Evict { id } => {
                if let Some(pos) = entries.iter().position(|e| e.id == id) {
                    entries.remove(pos);
                }
            }
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("queue.journal")
    }

    fn reading(n: u32) -> Reading {
        Reading::now("c1").with_field("temperature", 20.0 + n as f64)
    }

    #[test]
    fn test_push_and_front_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = DurableQueue::open(journal_path(&dir), 10).unwrap();

        queue.push(reading(0)).unwrap();
        queue.push(reading(1)).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.front().unwrap().reading.fields["temperature"], 20.0);
    }

    #[test]
    fn test_acknowledge_removes_front() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = DurableQueue::open(journal_path(&dir), 10).unwrap();

        let id = queue.push(reading(0)).unwrap();
        queue.push(reading(1)).unwrap();
        queue.acknowledge(&[id]).unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().reading.fields["temperature"], 21.0);
    }

    #[test]
    fn test_peek_batch_does_not_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = DurableQueue::open(journal_path(&dir), 10).unwrap();

        for n in 0..3 {
            queue.push(reading(n)).unwrap();
        }

        let batch = queue.peek_batch(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].reading.fields["temperature"], 20.0);
        assert_eq!(batch[1].reading.fields["temperature"], 21.0);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_partial_acknowledgement_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = DurableQueue::open(journal_path(&dir), 10).unwrap();

        let id = queue.push(reading(0)).unwrap();
        queue.acknowledge(&[id, 9999]).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        {
            let mut queue = DurableQueue::open(&path, 10).unwrap();
            queue.push(reading(0)).unwrap();
            queue.push(reading(1)).unwrap();
            let front = queue.front().unwrap();
            queue.acknowledge(&[front.id]).unwrap();
            // Dropped without further shutdown, as in a crash.
        }

        let queue = DurableQueue::open(&path, 10).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().reading.fields["temperature"], 21.0);
    }

    #[test]
    fn test_attempt_count_resets_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        {
            let mut queue = DurableQueue::open(&path, 10).unwrap();
            let id = queue.push(reading(0)).unwrap();
            queue.record_failure(id);
            queue.record_failure(id);
            assert_eq!(queue.front().unwrap().attempt_count, 2);
        }

        let queue = DurableQueue::open(&path, 10).unwrap();
        assert_eq!(queue.front().unwrap().attempt_count, 0);
    }

    #[test]
    fn test_full_queue_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = DurableQueue::open(journal_path(&dir), 3).unwrap();

        for n in 0..5 {
            queue.push(reading(n)).unwrap();
        }

        assert_eq!(queue.len(), 3);
        // Readings 0 and 1 were evicted; 2 is now the oldest.
        assert_eq!(queue.front().unwrap().reading.fields["temperature"], 22.0);
    }

    // Each push past capacity journals the new entry together with the
    // eviction of the oldest; replay must land on the same live set.
    #[test]
    fn test_eviction_at_capacity_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        {
            let mut queue = DurableQueue::open(&path, 2).unwrap();
            for n in 0..4 {
                queue.push(reading(n)).unwrap();
            }
            // Dropped without compaction, as in a crash.
        }

        let queue = DurableQueue::open(&path, 2).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.front().unwrap().reading.fields["temperature"], 22.0);
    }

    #[test]
    fn test_ids_stay_unique_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let first_id = {
            let mut queue = DurableQueue::open(&path, 10).unwrap();
            queue.push(reading(0)).unwrap()
        };
        let second_id = {
            let mut queue = DurableQueue::open(&path, 10).unwrap();
            queue.push(reading(1)).unwrap()
        };
        assert!(second_id > first_id);
    }

    #[test]
    fn test_compaction_preserves_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        {
            let mut queue = DurableQueue::open(&path, 10).unwrap();
            for round in 0..300u32 {
                let id = queue.push(reading(round)).unwrap();
                queue.acknowledge(&[id]).unwrap();
            }
            queue.push(reading(999)).unwrap();
        }

        // The journal was compacted at least once along the way; the one
        // live entry must still be there.
        let queue = DurableQueue::open(&path, 10).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().reading.fields["temperature"], 1019.0);
    }

    #[test]
    fn test_corrupt_journal_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);
        fs::write(&path, "{\"op\":\"push\"\nnot json\n").unwrap();

        assert!(matches!(
            DurableQueue::open(&path, 10),
            Err(ClientError::CorruptJournal(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DurableQueue::open(journal_path(&dir), 0),
            Err(ClientError::Config(_))
        ));
    }
}
