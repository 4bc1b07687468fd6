use crate::error::SimError;
use crate::units::{BytesSize, TimeStamp};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Dense handle for a declared file, assigned in declaration order
pub type FileId = u32;

/// Index of a part within its file
pub type PartInd = u32;

/// Identity of a part, the atomic cache admission/eviction unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId {
    pub file: FileId,
    pub index: PartInd,
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.file, self.index)
    }
}

/// A file as declared by the trace: a name and a total byte size
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    pub name: String,
    #[serde(deserialize_with = "crate::units::deserialize_byte_size")]
    pub size: BytesSize,
}

/// A raw access record as it appears in the trace, before normalization
#[derive(Debug, Clone, Deserialize)]
pub struct RawAccess {
    pub file: String,
    #[serde(default)]
    pub offset: BytesSize,
    #[serde(deserialize_with = "crate::units::deserialize_byte_size")]
    pub size: BytesSize,
    pub ts: TimeStamp,
    /// Submitter/job/node that produced the access, carried through untouched
    #[serde(default)]
    pub origin: Option<String>,
}

/// Per-file metadata derived once when the file set is built
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub name: String,
    pub size: BytesSize,
    pub part_count: PartInd,
}

/// Interned set of declared files. Files are immutable once observed.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<FileMeta>,
    by_name: HashMap<String, FileId>,
}

impl FileSet {
    pub fn new(specs: Vec<FileSpec>, part_size: BytesSize) -> Self {
        let mut set = Self::default();
        for spec in specs {
            set.declare(spec, part_size);
        }
        set
    }

    fn declare(&mut self, spec: FileSpec, part_size: BytesSize) -> FileId {
        if let Some(&id) = self.by_name.get(&spec.name) {
            return id;
        }
        let id = self.files.len() as FileId;
        let part_count = spec.size.div_ceil(part_size) as PartInd;
        self.by_name.insert(spec.name.clone(), id);
        self.files.push(FileMeta {
            name: spec.name,
            size: spec.size,
            part_count,
        });
        id
    }

    pub fn lookup(&self, name: &str) -> Option<FileId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: FileId) -> &FileMeta {
        &self.files[id as usize]
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// One part touched by an access: part index plus the part's full byte size.
/// All parts of a file share the configured part size except the last, which
/// holds whatever the file size leaves over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub index: PartInd,
    pub size: BytesSize,
}

/// A normalized access event. Immutable; owned by the sequence that produced it.
#[derive(Debug, Clone)]
pub struct Access {
    pub ts: TimeStamp,
    pub file: FileId,
    pub offset: BytesSize,
    pub bytes: BytesSize,
    /// Submitter/job/node that produced the access, carried through untouched
    pub origin: Option<String>,
    /// Parts touched by the byte range, in ascending index order
    pub parts: Vec<PartSpec>,
}

impl Access {
    pub fn part_id(&self, slot: usize) -> PartId {
        PartId {
            file: self.file,
            index: self.parts[slot].index,
        }
    }
}

/// Values determined by the first full pass over the sequence, used to size
/// fixed-width downstream structures without dynamic reallocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceSummary {
    pub accesses: usize,
    pub total_parts: usize,
    pub max_parts_per_access: usize,
    pub max_ts: TimeStamp,
}

/// An ordered, finite sequence of normalized accesses.
///
/// Normalization happens once, in `from_raw`; every later pass over `iter` re-yields
/// identical output. The sequence is immutable after construction, so it can be shared
/// (behind an `Arc`) by any number of concurrently running cache processors.
#[derive(Debug)]
pub struct AccessSequence {
    part_size: BytesSize,
    files: FileSet,
    accesses: Vec<Access>,
    summary: SequenceSummary,
}

impl AccessSequence {
    /// Normalizes raw trace records against the declared files.
    ///
    /// Each raw byte range is split on fixed part-size boundaries, except for a file's
    /// final (possibly shorter) part. Malformed records are rejected here, before any
    /// of them can reach cache state.
    pub fn from_raw(
        files: FileSet,
        raw: Vec<RawAccess>,
        part_size: BytesSize,
    ) -> Result<Self, SimError> {
        if part_size == 0 {
            return Err(SimError::InvalidConfig {
                reason: "part size must be positive".to_string(),
            });
        }
        let mut accesses = Vec::with_capacity(raw.len());
        let mut summary = SequenceSummary::default();

        for (access_ind, record) in raw.into_iter().enumerate() {
            let file = files.lookup(&record.file).ok_or_else(|| SimError::UnknownFile {
                access_ind,
                file: record.file.clone(),
            })?;
            let meta = files.get(file);

            if record.size == 0 {
                return Err(SimError::MalformedAccess {
                    access_ind,
                    file: record.file,
                    reason: "access size is zero".to_string(),
                });
            }
            let end = record.offset.checked_add(record.size);
            match end {
                Some(end) if end <= meta.size => {}
                _ => {
                    return Err(SimError::MalformedAccess {
                        access_ind,
                        file: record.file,
                        reason: format!(
                            "byte range [{}, {:?}) exceeds file size {}",
                            record.offset, end, meta.size
                        ),
                    });
                }
            }

            let parts = resolve_parts(record.offset, record.size, meta.size, part_size);

            summary.accesses += 1;
            summary.total_parts += parts.len();
            summary.max_parts_per_access = summary.max_parts_per_access.max(parts.len());
            summary.max_ts = summary.max_ts.max(record.ts);

            accesses.push(Access {
                ts: record.ts,
                file,
                offset: record.offset,
                bytes: record.size,
                origin: record.origin,
                parts,
            });
        }

        Ok(Self {
            part_size,
            files,
            accesses,
            summary,
        })
    }

    /// A fresh, restartable pass over the normalized accesses
    pub fn iter(&self) -> impl Iterator<Item = &Access> {
        self.accesses.iter()
    }

    pub fn get(&self, ind: usize) -> &Access {
        &self.accesses[ind]
    }

    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    pub fn part_size(&self) -> BytesSize {
        self.part_size
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn summary(&self) -> &SequenceSummary {
        &self.summary
    }
}

/// Resolves a validated byte range into the ordered set of parts it touches
fn resolve_parts(
    offset: BytesSize,
    bytes: BytesSize,
    file_size: BytesSize,
    part_size: BytesSize,
) -> Vec<PartSpec> {
    let first = offset / part_size;
    let last = (offset + bytes - 1) / part_size;
    (first..=last)
        .map(|index| {
            let part_start = index * part_size;
            let size = part_size.min(file_size - part_start);
            PartSpec {
                index: index as PartInd,
                size,
            }
        })
        .collect()
}
