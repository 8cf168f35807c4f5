//! Append-only per-client file storage.
//!
//! One CSV file per client under the data directory. The header row fixes
//! that client's schema: `timestamp` plus the field names seen for that
//! client (schemas are per-client because the field set is sensor-dependent).
//!
//! Writers serialize per client id, so appends for different clients never
//! contend. Reads go through a cache keyed by `(client_id, window)` that is
//! invalidated on the next successful store for that client.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use sensey_types::{Reading, TimeWindow};

use crate::config::FileConfig;
use crate::error::{Result, StorageError};

/// Cache entries are dropped wholesale past this point to bound memory.
const CACHE_CAPACITY: usize = 64;

/// File-backed series store.
#[derive(Clone)]
pub struct FileSeriesStore {
    inner: Arc<Inner>,
}

struct Inner {
    data_dir: PathBuf,
    /// Per-client write locks. The map lock is only held to fetch or insert
    /// an entry, never across file I/O.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Parsed range results, invalidated per client on store.
    cache: Mutex<ReadCache>,
}

/// Cached range results plus a per-client generation bumped on every store.
/// A read that raced a store checks the generation before publishing its
/// snapshot, so the cache never holds data older than the last write.
#[derive(Default)]
struct ReadCache {
    entries: HashMap<(String, TimeWindow), Arc<Vec<Reading>>>,
    generations: HashMap<String, u64>,
}

impl ReadCache {
    fn generation(&self, client_id: &str) -> u64 {
        self.generations.get(client_id).copied().unwrap_or(0)
    }
}

impl FileSeriesStore {
    /// Open the store, creating the data directory if needed.
    ///
    /// Fails fast if the directory cannot be created or written to.
    pub fn open(config: &FileConfig) -> Result<Self> {
        let data_dir = config.data_dir.clone();

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).map_err(|e| StorageError::CreateDirectory {
                path: data_dir.clone(),
                source: e,
            })?;
        }
        probe_writable(&data_dir)?;

        info!("File series store initialized at {}", data_dir.display());
        Ok(Self {
            inner: Arc::new(Inner {
                data_dir,
                locks: Mutex::new(HashMap::new()),
                cache: Mutex::new(ReadCache::default()),
            }),
        })
    }

    /// Append one reading to the client's file.
    pub fn store(&self, reading: &Reading) -> Result<()> {
        let client_id = reading.client_id.as_str();
        let path = self.client_path(client_id)?;

        let lock = self.client_lock(client_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if !path.exists() {
            let mut header: Vec<String> = vec!["timestamp".to_string()];
            header.extend(reading.fields.keys().cloned());
            write_full_file(&path, &header, std::iter::once(reading))?;
            debug!("Created series file for {}", client_id);
        } else {
            let header = read_header(&path, client_id)?;
            let missing: Vec<&String> = reading
                .fields
                .keys()
                .filter(|name| !header.contains(name))
                .collect();

            if missing.is_empty() {
                append_record(&path, &header, reading)?;
            } else {
                // Schema grew: rewrite once with a widened header so every
                // field keeps round-tripping.
                warn!(
                    "Widening schema for {} with new fields {:?}",
                    client_id, missing
                );
                let mut widened = header.clone();
                let mut added: Vec<String> = missing.into_iter().cloned().collect();
                added.sort();
                widened.extend(added);

                let existing = self.load(client_id)?;
                write_full_file(&path, &widened, existing.iter().chain(std::iter::once(reading)))?;
            }
        }

        self.invalidate(client_id);
        debug!("Stored reading for client {}", client_id);
        Ok(())
    }

    /// The `n` most recent readings, newest first. Unknown clients yield an
    /// empty vector.
    pub fn latest(&self, client_id: &str, n: usize) -> Result<Vec<Reading>> {
        let mut series = self.load(client_id)?;
        series.sort_by_key(|r| r.timestamp);
        series.reverse();
        series.truncate(n);
        Ok(series)
    }

    /// Readings within the window, ascending by timestamp.
    pub fn range_query(&self, client_id: &str, window: TimeWindow) -> Result<Vec<Reading>> {
        let key = (client_id.to_string(), window);
        let generation = {
            let cache = self.inner.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.entries.get(&key) {
                return Ok(cached.as_ref().clone());
            }
            cache.generation(client_id)
        };

        let now = OffsetDateTime::now_utc();
        let mut series = self.load(client_id)?;
        series.retain(|r| window.contains(r.timestamp, now));
        series.sort_by_key(|r| r.timestamp);

        self.cache_insert(key, generation, Arc::new(series.clone()));
        Ok(series)
    }

    /// Clients with at least one stored reading, sorted.
    pub fn list_clients(&self) -> Result<Vec<String>> {
        if !self.inner.data_dir.exists() {
            return Ok(Vec::new());
        }

        let mut clients = Vec::new();
        for entry in fs::read_dir(&self.inner.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                clients.push(stem.to_string());
            }
        }
        clients.sort();
        Ok(clients)
    }

    /// Confirm the data directory is still reachable and writable.
    pub fn health_check(&self) -> Result<()> {
        probe_writable(&self.inner.data_dir)
    }

    fn client_path(&self, client_id: &str) -> Result<PathBuf> {
        validate_client_id(client_id)?;
        Ok(self.inner.data_dir.join(format!("{client_id}.csv")))
    }

    fn client_lock(&self, client_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(client_id.to_string()).or_default())
    }

    fn invalidate(&self, client_id: &str) {
        let mut cache = self.inner.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache.generations.entry(client_id.to_string()).or_insert(0) += 1;
        cache
            .entries
            .retain(|(cached_client, _), _| cached_client != client_id);
    }

    /// Publish a snapshot unless a store for this client landed after
    /// `generation` was read; caching it then would mask that write until
    /// the next invalidation.
    fn cache_insert(&self, key: (String, TimeWindow), generation: u64, snapshot: Arc<Vec<Reading>>) {
        let mut cache = self.inner.cache.lock().unwrap_or_else(|e| e.into_inner());
        if cache.generation(&key.0) != generation {
            return;
        }
        if cache.entries.len() >= CACHE_CAPACITY {
            cache.entries.clear();
        }
        cache.entries.insert(key, snapshot);
    }

    /// Parse the client's whole file. Missing file means unknown client,
    /// which is an empty series, not an error.
    fn load(&self, client_id: &str) -> Result<Vec<Reading>> {
        let path = self.client_path(client_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut series = Vec::new();
        for record in reader.records() {
            let record = record?;
            let raw_ts = record.get(0).unwrap_or_default();
            let timestamp = OffsetDateTime::parse(raw_ts, &Rfc3339).map_err(|_| {
                StorageError::CorruptRecord {
                    client_id: client_id.to_string(),
                    detail: format!("bad timestamp '{raw_ts}'"),
                }
            })?;

            let mut reading = Reading::new(client_id, timestamp);
            for (i, name) in header.iter().enumerate().skip(1) {
                let raw = record.get(i).unwrap_or_default();
                if raw.is_empty() {
                    continue;
                }
                let value: f64 = raw.parse().map_err(|_| StorageError::CorruptRecord {
                    client_id: client_id.to_string(),
                    detail: format!("non-numeric value '{raw}' for field '{name}'"),
                })?;
                reading.fields.insert(name.clone(), value);
            }
            series.push(reading);
        }

        Ok(series)
    }
}

/// Reject ids that would escape the data directory or collide with
/// bookkeeping files.
fn validate_client_id(client_id: &str) -> Result<()> {
    let ok = !client_id.is_empty()
        && !client_id.starts_with('.')
        && !client_id.contains(['/', '\\'])
        && !client_id.contains("..");
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidClientId(client_id.to_string()))
    }
}

fn probe_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(".sensey-probe");
    fs::write(&probe, b"ok")?;
    fs::remove_file(&probe)?;
    Ok(())
}

fn read_header(path: &Path, client_id: &str) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if header.first().map(String::as_str) != Some("timestamp") {
        return Err(StorageError::CorruptRecord {
            client_id: client_id.to_string(),
            detail: "header does not start with 'timestamp'".to_string(),
        });
    }
    Ok(header)
}

fn format_record(header: &[String], reading: &Reading) -> Result<Vec<String>> {
    let ts = reading
        .timestamp
        .format(&Rfc3339)
        .map_err(|e| StorageError::CorruptRecord {
            client_id: reading.client_id.clone(),
            detail: format!("unformattable timestamp: {e}"),
        })?;

    let mut record = Vec::with_capacity(header.len());
    record.push(ts);
    for name in &header[1..] {
        match reading.fields.get(name) {
            Some(value) => record.push(value.to_string()),
            None => record.push(String::new()),
        }
    }
    Ok(record)
}

/// Append one record with a single write so a reading is never partially
/// visible.
fn append_record(path: &Path, header: &[String], reading: &Reading) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(format_record(header, reading)?)?;
    let line = writer.into_inner().map_err(|e| e.into_error())?;

    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(&line)?;
    file.sync_data()?;
    Ok(())
}

/// Rewrite the whole file through a temp path and rename into place.
fn write_full_file<'a>(
    path: &Path,
    header: &[String],
    readings: impl Iterator<Item = &'a Reading>,
) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(header)?;
        for reading in readings {
            writer.write_record(format_record(header, reading)?)?;
        }
        writer.flush()?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_data()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
