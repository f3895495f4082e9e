#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::primitives::bytes::{buf::Cursor, var};
use crate::storage::archive::FieldPayload;
use crate::storage::codec::{check_version, decode_count, ColumnCodec, ColumnKind};
use crate::types::{Result, RoadGraphError};

/// One key/value tag pair.
pub type Tag = (String, String);

/// Tags of one element as `(key id, value id)` pairs into the [`TagCodec`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagList(pub SmallVec<[(u32, u32); 4]>);

impl TagList {
    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the element carries no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl ColumnCodec for TagList {
    const KIND: ColumnKind = ColumnKind::Tags;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        for list in values {
            var::encode_u64(list.0.len() as u64, out);
            for &(key, value) in &list.0 {
                var::encode_u64(key as u64, out);
                var::encode_u64(value as u64, out);
            }
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let len = decode_count(&mut cur)?;
            let mut list = SmallVec::with_capacity(len);
            for _ in 0..len {
                let key = u32::try_from(cur.var_u64()?)
                    .map_err(|_| RoadGraphError::Corruption("tag key id out of range"))?;
                let value = u32::try_from(cur.var_u64()?)
                    .map_err(|_| RoadGraphError::Corruption("tag value id out of range"))?;
                list.push((key, value));
            }
            values.push(TagList(list));
        }
        if cur.remaining() != 0 {
            return Err(RoadGraphError::Corruption("trailing bytes after tag column"));
        }
        Ok(values)
    }
}

#[derive(Default)]
struct Dictionary {
    strings: Vec<String>,
    lookup: FxHashMap<String, u32>,
}

/// Counters kept by the [`TagCodec`].
#[derive(Default)]
pub struct TagCodecMetrics {
    intern_calls: AtomicU64,
    intern_hits: AtomicU64,
    resolve_calls: AtomicU64,
    resolve_misses: AtomicU64,
}

/// Point-in-time copy of [`TagCodecMetrics`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TagCodecMetricsSnapshot {
    /// Strings submitted for interning.
    pub intern_calls: u64,
    /// Interned strings that were already known.
    pub intern_hits: u64,
    /// Identifier lookups.
    pub resolve_calls: u64,
    /// Lookups of unknown identifiers.
    pub resolve_misses: u64,
}

impl TagCodecMetricsSnapshot {
    /// Fraction of intern calls served from the dictionary.
    pub fn intern_hit_rate(&self) -> f64 {
        if self.intern_calls == 0 {
            return 0.0;
        }
        self.intern_hits as f64 / self.intern_calls as f64
    }
}

impl TagCodecMetrics {
    /// Copies the current counter values.
    pub fn snapshot(&self) -> TagCodecMetricsSnapshot {
        TagCodecMetricsSnapshot {
            intern_calls: self.intern_calls.load(Ordering::Relaxed),
            intern_hits: self.intern_hits.load(Ordering::Relaxed),
            resolve_calls: self.resolve_calls.load(Ordering::Relaxed),
            resolve_misses: self.resolve_misses.load(Ordering::Relaxed),
        }
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared string dictionary compressing tag keys and values to `u32` ids.
///
/// Ids are dense and assigned in first-seen order, so the dictionary
/// persists as a plain string column.
#[derive(Default)]
pub struct TagCodec {
    dictionary: RwLock<Dictionary>,
    metrics: TagCodecMetrics,
}

/// Archive field holding the dictionary strings.
pub const TAG_STRINGS_FIELD: &str = "tag_strings";

impl TagCodec {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a dictionary from its persisted strings.
    pub fn restore(strings: Vec<String>) -> Result<Self> {
        let mut lookup = FxHashMap::default();
        lookup.reserve(strings.len());
        for (id, string) in strings.iter().enumerate() {
            let id = u32::try_from(id)
                .map_err(|_| RoadGraphError::Corruption("tag dictionary too large"))?;
            if lookup.insert(string.clone(), id).is_some() {
                return Err(RoadGraphError::Corruption("duplicate tag dictionary entry"));
            }
        }
        Ok(Self {
            dictionary: RwLock::new(Dictionary { strings, lookup }),
            metrics: TagCodecMetrics::default(),
        })
    }

    /// Returns the id of `value`, assigning the next one if unseen.
    pub fn intern(&self, value: &str) -> Result<u32> {
        TagCodecMetrics::inc(&self.metrics.intern_calls);
        if let Some(&id) = self.dictionary.read().lookup.get(value) {
            TagCodecMetrics::inc(&self.metrics.intern_hits);
            return Ok(id);
        }
        let mut dictionary = self.dictionary.write();
        if let Some(&id) = dictionary.lookup.get(value) {
            TagCodecMetrics::inc(&self.metrics.intern_hits);
            return Ok(id);
        }
        let id = u32::try_from(dictionary.strings.len())
            .map_err(|_| RoadGraphError::Invalid("tag dictionary full"))?;
        dictionary.strings.push(value.to_owned());
        dictionary.lookup.insert(value.to_owned(), id);
        trace!(id, "tags.intern");
        Ok(id)
    }

    /// Returns the string behind `id`.
    pub fn resolve(&self, id: u32) -> Result<String> {
        TagCodecMetrics::inc(&self.metrics.resolve_calls);
        match self.dictionary.read().strings.get(id as usize) {
            Some(value) => Ok(value.clone()),
            None => {
                TagCodecMetrics::inc(&self.metrics.resolve_misses);
                Err(RoadGraphError::Corruption("unknown tag dictionary id"))
            }
        }
    }

    /// Compresses tag pairs, preserving their order.
    pub fn encode(&self, tags: &[Tag]) -> Result<TagList> {
        let mut list = SmallVec::with_capacity(tags.len());
        for (key, value) in tags {
            list.push((self.intern(key)?, self.intern(value)?));
        }
        Ok(TagList(list))
    }

    /// Expands a compressed list back into tag pairs.
    pub fn decode(&self, list: &TagList) -> Result<Vec<Tag>> {
        let dictionary = self.dictionary.read();
        list.0
            .iter()
            .map(|&(key, value)| {
                let key = dictionary.strings.get(key as usize);
                let value = dictionary.strings.get(value as usize);
                match (key, value) {
                    (Some(key), Some(value)) => Ok((key.clone(), value.clone())),
                    _ => {
                        TagCodecMetrics::inc(&self.metrics.resolve_misses);
                        Err(RoadGraphError::Corruption("unknown tag dictionary id"))
                    }
                }
            })
            .collect()
    }

    /// Number of distinct strings.
    pub fn len(&self) -> usize {
        self.dictionary.read().strings.len()
    }

    /// Returns true when nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dictionary strings encoded for the archive.
    pub fn payload(&self) -> FieldPayload {
        FieldPayload::column(TAG_STRINGS_FIELD, &self.dictionary.read().strings)
    }

    /// Intern and resolve counters.
    pub fn metrics(&self) -> TagCodecMetricsSnapshot {
        self.metrics.snapshot()
    }
}
