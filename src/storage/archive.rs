#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::primitives::bytes::{buf, buf::Cursor, var};
use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::codec::{ColumnCodec, ColumnKind};
use crate::types::{entry_crc32, Result, RoadGraphError};

const ARCHIVE_MAGIC: [u8; 4] = *b"RGAR";
const ARCHIVE_FORMAT_VERSION: u16 = 1;
const HEADER_LEN: u64 = 16;
const TRAILER_LEN: u64 = 16;
const FLAG_SNAPPY: u8 = 0x01;
const JSON_CODEC_VERSION: u16 = 1;

/// Caller-level data version stamped on every save.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct ArchiveVersion(pub u32);

impl fmt::Display for ArchiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One encoded field handed to [`Archive::save_fields_of`].
#[derive(Clone, Debug)]
pub struct FieldPayload {
    /// Field name, unique per owner.
    pub field: String,
    /// Encoding family.
    pub kind: ColumnKind,
    /// Codec version the payload was written with.
    pub codec_version: u16,
    /// Uncompressed encoded bytes.
    pub bytes: Vec<u8>,
}

impl FieldPayload {
    /// Encodes a column through its codec.
    pub fn column<T: ColumnCodec>(field: impl Into<String>, values: &[T]) -> Self {
        let mut bytes = Vec::new();
        T::encode_all(values, &mut bytes);
        Self {
            field: field.into(),
            kind: T::KIND,
            codec_version: T::VERSION,
            bytes,
        }
    }

    /// Serializes a metadata value as JSON.
    pub fn json<T: Serialize>(field: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self {
            field: field.into(),
            kind: ColumnKind::Json,
            codec_version: JSON_CODEC_VERSION,
            bytes: serde_json::to_vec(value)?,
        })
    }
}

/// Something whose state is persisted as a set of named fields.
pub trait ArchiveOwner {
    /// Owner key in the archive.
    fn owner_name(&self) -> &str;
    /// Encodes every persisted field. Loads unloaded columns as needed.
    fn archived_fields(&self) -> Result<Vec<FieldPayload>>;
}

/// A field read back from the archive, decompressed and checksum-verified.
#[derive(Clone, Debug)]
pub struct ArchivedField {
    /// Encoding family recorded at save time.
    pub kind: ColumnKind,
    /// Codec version recorded at save time.
    pub codec_version: u16,
    /// Uncompressed encoded bytes.
    pub bytes: Vec<u8>,
}

impl ArchivedField {
    /// Decodes the payload as a column of `T`, checking the recorded kind.
    pub fn decode<T: ColumnCodec>(&self) -> Result<Vec<T>> {
        if self.kind != T::KIND {
            return Err(RoadGraphError::Corruption("column kind mismatch"));
        }
        T::decode_all(&self.bytes, self.codec_version)
    }
}

#[derive(Clone, Debug)]
struct EntryMeta {
    kind: ColumnKind,
    codec_version: u16,
    flags: u8,
    raw_len: u64,
    stored_len: u64,
    offset: u64,
    crc32: u32,
}

struct ArchiveState {
    io: StdFileIo,
    version: ArchiveVersion,
    entries: BTreeMap<(String, String), EntryMeta>,
}

/// Named, versioned single-file container of column payloads keyed by
/// `(owner, field)`.
///
/// Layout: a 16-byte header (magic, format version, archive version), the
/// entry payloads back to back, a footer index describing every entry, and a
/// 16-byte trailer (footer offset, footer checksum, magic). Loading a field
/// reads the footer once at open and then only that field's payload bytes.
pub struct Archive {
    path: PathBuf,
    state: RwLock<ArchiveState>,
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("version", &state.version)
            .field("entries", &state.entries.len())
            .finish()
    }
}

impl Archive {
    /// Creates (or truncates) an empty archive at `path`.
    pub fn create(path: impl AsRef<Path>, version: ArchiveVersion) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        write_archive(&path, version, &BTreeMap::new(), |_, _| Ok(()))?;
        Self::open(path)
    }

    /// Opens an existing archive and reads its footer index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (io, version, entries) = read_index(&path)?;
        debug!(
            path = %path.display(),
            %version,
            entries = entries.len(),
            "archive.open"
        );
        Ok(Self {
            path,
            state: RwLock::new(ArchiveState {
                io,
                version,
                entries,
            }),
        })
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version stamped by the last save.
    pub fn version(&self) -> ArchiveVersion {
        self.state.read().version
    }

    /// Returns true when `(owner, field)` has been persisted.
    pub fn contains(&self, owner: &str, field: &str) -> bool {
        self.state
            .read()
            .entries
            .contains_key(&(owner.to_string(), field.to_string()))
    }

    /// Names of all owners with at least one field.
    pub fn owners(&self) -> Vec<String> {
        let state = self.state.read();
        let mut owners: Vec<String> = state.entries.keys().map(|(owner, _)| owner.clone()).collect();
        owners.dedup();
        owners
    }

    /// Field names persisted for `owner`, sorted.
    pub fn fields_of(&self, owner: &str) -> Vec<String> {
        self.state
            .read()
            .entries
            .keys()
            .filter(|(entry_owner, _)| entry_owner == owner)
            .map(|(_, field)| field.clone())
            .collect()
    }

    /// Reads one field. Returns `None` when it was never saved.
    pub fn load_field_of(&self, owner: &str, field: &str) -> Result<Option<ArchivedField>> {
        let state = self.state.read();
        let Some(meta) = state.entries.get(&(owner.to_string(), field.to_string())) else {
            return Ok(None);
        };
        let bytes = read_entry(&state.io, owner, field, meta)?;
        trace!(owner, field, bytes = bytes.len(), "archive.load_field");
        Ok(Some(ArchivedField {
            kind: meta.kind,
            codec_version: meta.codec_version,
            bytes,
        }))
    }

    /// Reads and decodes one column field.
    pub fn load_column<T: ColumnCodec>(&self, owner: &str, field: &str) -> Result<Option<Vec<T>>> {
        match self.load_field_of(owner, field)? {
            Some(archived) => Ok(Some(archived.decode::<T>()?)),
            None => Ok(None),
        }
    }

    /// Reads a JSON metadata field.
    pub fn load_value<T: DeserializeOwned>(&self, owner: &str, field: &str) -> Result<Option<T>> {
        let Some(archived) = self.load_field_of(owner, field)? else {
            return Ok(None);
        };
        if archived.kind != ColumnKind::Json {
            return Err(RoadGraphError::Corruption("metadata field is not JSON"));
        }
        if archived.codec_version != JSON_CODEC_VERSION {
            return Err(RoadGraphError::Corruption("unsupported metadata version"));
        }
        Ok(Some(serde_json::from_slice(&archived.bytes)?))
    }

    /// Persists every field of `owner`, replacing whatever the owner had
    /// saved before, and stamps the archive with `version`.
    ///
    /// The file is rewritten into a temporary sibling and renamed over the
    /// original; other owners' payloads are copied without re-encoding.
    pub fn save_fields_of(&self, owner: &dyn ArchiveOwner, version: ArchiveVersion) -> Result<()> {
        let fields = owner.archived_fields()?;
        self.save_payloads(owner.owner_name(), fields, version)
    }

    /// Persists pre-encoded payloads under `owner`.
    pub fn save_payloads(
        &self,
        owner: &str,
        fields: Vec<FieldPayload>,
        version: ArchiveVersion,
    ) -> Result<()> {
        let mut state = self.state.write();
        let mut pending: BTreeMap<(String, String), PendingEntry> = BTreeMap::new();
        for ((entry_owner, field), meta) in &state.entries {
            if entry_owner != owner {
                pending.insert(
                    (entry_owner.clone(), field.clone()),
                    PendingEntry::Existing(meta.clone()),
                );
            }
        }
        let field_count = fields.len();
        let mut raw_total = 0usize;
        for payload in fields {
            raw_total += payload.bytes.len();
            pending.insert(
                (owner.to_string(), payload.field.clone()),
                PendingEntry::Fresh(compress(owner, payload)?),
            );
        }

        let tmp = tmp_path(&self.path);
        let io = state.io.clone();
        write_archive(&tmp, version, &pending, |meta, out| {
            let bytes = io.read_vec(meta.offset, meta.stored_len as usize)?;
            out.write_all(&bytes)?;
            Ok(())
        })?;
        fs::rename(&tmp, &self.path)?;

        let (io, version, entries) = read_index(&self.path)?;
        *state = ArchiveState {
            io,
            version,
            entries,
        };
        debug!(
            owner,
            fields = field_count,
            raw_bytes = raw_total,
            %version,
            "archive.save_fields_of"
        );
        Ok(())
    }

    /// Total stored (possibly compressed) payload bytes.
    pub fn stored_bytes(&self) -> u64 {
        self.state
            .read()
            .entries
            .values()
            .map(|meta| meta.stored_len)
            .sum()
    }
}

struct CompressedEntry {
    kind: ColumnKind,
    codec_version: u16,
    flags: u8,
    raw_len: u64,
    stored: Vec<u8>,
    crc32: u32,
}

enum PendingEntry {
    Existing(EntryMeta),
    Fresh(CompressedEntry),
}

fn compress(owner: &str, payload: FieldPayload) -> Result<CompressedEntry> {
    let raw_len = payload.bytes.len() as u64;
    let compressed = snap::raw::Encoder::new()
        .compress_vec(&payload.bytes)
        .map_err(|err| RoadGraphError::Serialization(err.to_string()))?;
    let (flags, stored) = if compressed.len() < payload.bytes.len() {
        (FLAG_SNAPPY, compressed)
    } else {
        (0, payload.bytes)
    };
    let crc32 = entry_crc32(owner, &payload.field, &stored);
    Ok(CompressedEntry {
        kind: payload.kind,
        codec_version: payload.codec_version,
        flags,
        raw_len,
        stored,
        crc32,
    })
}

fn read_entry(io: &StdFileIo, owner: &str, field: &str, meta: &EntryMeta) -> Result<Vec<u8>> {
    let stored_len = usize::try_from(meta.stored_len)
        .map_err(|_| RoadGraphError::Corruption("entry larger than address space"))?;
    let stored = io.read_vec(meta.offset, stored_len)?;
    if entry_crc32(owner, field, &stored) != meta.crc32 {
        return Err(RoadGraphError::Corruption("archive entry checksum mismatch"));
    }
    let bytes = if meta.flags & FLAG_SNAPPY != 0 {
        snap::raw::Decoder::new()
            .decompress_vec(&stored)
            .map_err(|_| RoadGraphError::Corruption("archive entry failed to decompress"))?
    } else {
        stored
    };
    if bytes.len() as u64 != meta.raw_len {
        return Err(RoadGraphError::Corruption("archive entry length mismatch"));
    }
    Ok(bytes)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_archive<F>(
    path: &Path,
    version: ArchiveVersion,
    entries: &BTreeMap<(String, String), PendingEntry>,
    mut copy_existing: F,
) -> Result<()>
where
    F: FnMut(&EntryMeta, &mut BufWriter<File>) -> Result<()>,
{
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(&ARCHIVE_MAGIC);
    header.extend_from_slice(&ARCHIVE_FORMAT_VERSION.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&version.0.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    out.write_all(&header)?;

    let mut offset = HEADER_LEN;
    let mut footer = Vec::new();
    var::encode_u64(entries.len() as u64, &mut footer);
    for ((owner, field), entry) in entries {
        let meta = match entry {
            PendingEntry::Existing(meta) => {
                copy_existing(meta, &mut out)?;
                EntryMeta {
                    offset,
                    ..meta.clone()
                }
            }
            PendingEntry::Fresh(fresh) => {
                out.write_all(&fresh.stored)?;
                EntryMeta {
                    kind: fresh.kind,
                    codec_version: fresh.codec_version,
                    flags: fresh.flags,
                    raw_len: fresh.raw_len,
                    stored_len: fresh.stored.len() as u64,
                    offset,
                    crc32: fresh.crc32,
                }
            }
        };
        offset += meta.stored_len;
        buf::put_str(&mut footer, owner);
        buf::put_str(&mut footer, field);
        footer.push(meta.kind.as_u8());
        footer.extend_from_slice(&meta.codec_version.to_le_bytes());
        footer.push(meta.flags);
        var::encode_u64(meta.raw_len, &mut footer);
        var::encode_u64(meta.stored_len, &mut footer);
        var::encode_u64(meta.offset, &mut footer);
        footer.extend_from_slice(&meta.crc32.to_le_bytes());
    }
    out.write_all(&footer)?;

    let footer_crc = crc32fast::hash(&footer);
    out.write_all(&offset.to_le_bytes())?;
    out.write_all(&footer_crc.to_le_bytes())?;
    out.write_all(&ARCHIVE_MAGIC)?;
    let file = out
        .into_inner()
        .map_err(|err| RoadGraphError::Io(err.into_error()))?;
    file.sync_all()?;
    Ok(())
}

type ArchiveIndex = (StdFileIo, ArchiveVersion, BTreeMap<(String, String), EntryMeta>);

fn read_index(path: &Path) -> Result<ArchiveIndex> {
    let io = StdFileIo::open_read(path)?;
    let len = io.len()?;
    if len < HEADER_LEN + TRAILER_LEN {
        return Err(RoadGraphError::Corruption("archive shorter than header"));
    }
    let header = io.read_vec(0, HEADER_LEN as usize)?;
    let mut cur = Cursor::new(&header);
    if cur.take(4)? != ARCHIVE_MAGIC {
        return Err(RoadGraphError::Corruption("archive magic mismatch"));
    }
    if cur.u16_le()? != ARCHIVE_FORMAT_VERSION {
        return Err(RoadGraphError::Corruption("unsupported archive format"));
    }
    let _reserved = cur.u16_le()?;
    let version = ArchiveVersion(cur.u32_le()?);

    let trailer = io.read_vec(len - TRAILER_LEN, TRAILER_LEN as usize)?;
    let mut cur = Cursor::new(&trailer);
    let footer_offset = cur.u64_le()?;
    let footer_crc = cur.u32_le()?;
    if cur.take(4)? != ARCHIVE_MAGIC {
        return Err(RoadGraphError::Corruption("archive trailer magic mismatch"));
    }
    if footer_offset < HEADER_LEN || footer_offset > len - TRAILER_LEN {
        return Err(RoadGraphError::Corruption("archive footer offset out of range"));
    }
    let footer = io.read_vec(footer_offset, (len - TRAILER_LEN - footer_offset) as usize)?;
    if crc32fast::hash(&footer) != footer_crc {
        return Err(RoadGraphError::Corruption("archive footer checksum mismatch"));
    }

    let mut cur = Cursor::new(&footer);
    let count = cur.var_u64()?;
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let owner = cur.str()?.to_string();
        let field = cur.str()?.to_string();
        let kind = ColumnKind::try_from(cur.u8()?)?;
        let codec_version = cur.u16_le()?;
        let flags = cur.u8()?;
        let raw_len = cur.var_u64()?;
        let stored_len = cur.var_u64()?;
        let offset = cur.var_u64()?;
        let crc32 = cur.u32_le()?;
        if offset
            .checked_add(stored_len)
            .map_or(true, |end| end > footer_offset)
        {
            return Err(RoadGraphError::Corruption("archive entry out of range"));
        }
        entries.insert(
            (owner, field),
            EntryMeta {
                kind,
                codec_version,
                flags,
                raw_len,
                stored_len,
                offset,
                crc32,
            },
        );
    }
    if cur.remaining() != 0 {
        return Err(RoadGraphError::Corruption("trailing bytes in archive footer"));
    }
    Ok((io, version, entries))
}
