//! Zip archives of path maps.
//!
//! [`archive`] flattens a map, serializes every leaf through a
//! [`CodecRegistry`] and writes one zip entry per leaf, named after the leaf's
//! `/`-joined path plus the codec's extension. [`restore`] reads such an
//! archive back, choosing each entry's deserializer by its extension.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, PoisonError};

use log::{debug, trace};
use pathmap_core::codec::{self, CodecError, CodecRegistry};
use pathmap_core::{
    Key, Leaf, LeafVisitor, PathConfig, PathMap, PathMapError, Value, default_config,
};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Delimiter of path segments inside entry names.
pub const ENTRY_DELIMITER: char = '/';

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOC: u64 = 1 << 20;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported archive format: {0:?}")]
    UnsupportedFormat(String),
    #[error("two leaves map to archive entry {0}")]
    DuplicateEntry(String),
    #[error("key segment {0:?} contains '/' and cannot be archived")]
    InvalidSegment(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Path(#[from] PathMapError),
}

/// Container formats an archive can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    #[default]
    Zip,
}

impl ArchiveFormat {
    /// Infers the format from the extension of `path`.
    pub fn from_path(path: &Path) -> Result<Self, ArchiveError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        extension.parse()
    }
}

impl FromStr for ArchiveFormat {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("zip") {
            Ok(ArchiveFormat::Zip)
        } else {
            Err(ArchiveError::UnsupportedFormat(s.to_string()))
        }
    }
}

/// One serialized leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// The leaf's segments joined with `/`.
    pub path: String,
    pub extension: String,
    pub payload: Vec<u8>,
}

impl ArchiveEntry {
    /// The zip entry name.
    pub fn name(&self) -> String {
        format!("{}{}", self.path, self.extension)
    }
}

struct EntryCollector<'r> {
    registry: &'r CodecRegistry,
    entries: Vec<ArchiveEntry>,
    names: HashSet<String>,
    error: Option<ArchiveError>,
}

impl EntryCollector<'_> {
    fn collect(&mut self, path: &[&Key], leaf: &Arc<dyn Leaf>) -> Result<(), ArchiveError> {
        let mut segments = Vec::with_capacity(path.len());
        for key in path {
            let segment = key.to_string();
            if segment.contains(ENTRY_DELIMITER) {
                return Err(ArchiveError::InvalidSegment(segment));
            }
            segments.push(segment);
        }

        let (payload, extension) = self.registry.serialize(&**leaf)?;
        let entry = ArchiveEntry {
            path: segments.join("/"),
            extension: extension.to_string(),
            payload,
        };
        let name = entry.name();
        if !self.names.insert(name.clone()) {
            return Err(ArchiveError::DuplicateEntry(name));
        }
        trace!("encoded {} ({} bytes)", name, entry.payload.len());
        self.entries.push(entry);
        Ok(())
    }
}

impl LeafVisitor for EntryCollector<'_> {
    fn visit_leaf(&mut self, path: &[&Key], leaf: &Arc<dyn Leaf>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.collect(path, leaf) {
            self.error = Some(err);
        }
    }
}

/// Serializes every leaf of `map`, in traversal order.
///
/// Fails before returning any entry if a key segment contains `/`, a leaf
/// fails to encode, or two leaves would share an entry name.
pub fn encode_entries(
    map: &PathMap,
    registry: &CodecRegistry,
) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut collector = EntryCollector {
        registry,
        entries: Vec::new(),
        names: HashSet::new(),
        error: None,
    };
    map.visit_leaves(&mut collector);
    match collector.error {
        Some(err) => Err(err),
        None => Ok(collector.entries),
    }
}

/// Writes `map` as a zip archive into `writer`, returning the writer.
pub fn write_archive<W: Write + Seek>(
    map: &PathMap,
    writer: W,
    registry: &CodecRegistry,
) -> Result<W, ArchiveError> {
    let entries = encode_entries(map, registry)?;
    write_entries(&entries, writer)
}

fn write_entries<W: Write + Seek>(entries: &[ArchiveEntry], writer: W) -> Result<W, ArchiveError> {
    let mut zip = ZipWriter::new(writer);
    for entry in entries {
        zip.start_file(entry.name(), SimpleFileOptions::default())?;
        zip.write_all(&entry.payload)?;
    }
    let writer = zip.finish()?;
    debug!("wrote archive with {} entries", entries.len());
    Ok(writer)
}

/// Archives `map` to `destination` using the global registry.
///
/// The format is inferred from the destination's extension.
pub fn archive(map: &PathMap, destination: impl AsRef<Path>) -> Result<(), ArchiveError> {
    let destination = destination.as_ref();
    let format = ArchiveFormat::from_path(destination)?;
    let registry = codec::global().read().unwrap_or_else(PoisonError::into_inner);
    archive_with(map, destination, format, &registry)
}

/// Archives `map` to `destination` in `format` using `registry`.
///
/// Every leaf is encoded before `destination` is created, so a failing leaf
/// leaves no file behind.
pub fn archive_with(
    map: &PathMap,
    destination: impl AsRef<Path>,
    format: ArchiveFormat,
    registry: &CodecRegistry,
) -> Result<(), ArchiveError> {
    let destination = destination.as_ref();
    let entries = encode_entries(map, registry)?;
    match format {
        ArchiveFormat::Zip => {
            let file = File::create(destination)?;
            let mut writer = write_entries(&entries, BufWriter::new(file))?;
            writer.flush()?;
        }
    }
    debug!("archived {} leaves to {}", entries.len(), destination.display());
    Ok(())
}

/// Splits an entry name into the leaf path and its extension.
///
/// The longest extension known to `registry` that ends the final path
/// component wins. Otherwise the extension starts at the last `.` of the final
/// component, and a component without `.` has an empty extension.
pub fn split_entry_name<'n>(name: &'n str, registry: &CodecRegistry) -> (&'n str, &'n str) {
    let start = name.rfind(ENTRY_DELIMITER).map_or(0, |i| i + 1);
    let file_name = &name[start..];
    let registered = registry
        .extensions()
        .filter(|ext| file_name.ends_with(*ext))
        .map(str::len)
        .max();
    let at = match registered {
        Some(len) => name.len() - len,
        None => file_name.rfind('.').map_or(name.len(), |i| start + i),
    };
    name.split_at(at)
}

/// Reads a zip archive from `reader` into a new map configured with `config`.
pub fn read_archive<R: Read + Seek>(
    reader: R,
    registry: &CodecRegistry,
    config: PathConfig,
) -> Result<PathMap, ArchiveError> {
    let mut zip = ZipArchive::new(reader)?;
    let mut map = PathMap::with_config(config);
    let separator = map.separator().to_string();

    for index in 0..zip.len() {
        let mut file = zip.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut payload = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
        file.read_to_end(&mut payload)?;

        let (path, extension) = split_entry_name(&name, registry);
        let leaf = registry.deserialize(extension, &payload)?;
        trace!("decoded {} as {}", name, leaf.leaf_type_name());
        map.set(path.replace(ENTRY_DELIMITER, &separator), Value::shared(leaf))?;
    }

    debug!("restored {} entries", zip.len());
    Ok(map)
}

/// Restores a map from `source` using the global registry and default configuration.
///
/// The format is inferred from the source's extension.
pub fn restore(source: impl AsRef<Path>) -> Result<PathMap, ArchiveError> {
    let source = source.as_ref();
    let format = ArchiveFormat::from_path(source)?;
    let registry = codec::global().read().unwrap_or_else(PoisonError::into_inner);
    restore_with(source, format, &registry, default_config())
}

/// Restores a map from `source` in `format` using `registry`.
///
/// Entry paths are translated to `config`'s separator before assignment.
pub fn restore_with(
    source: impl AsRef<Path>,
    format: ArchiveFormat,
    registry: &CodecRegistry,
    config: PathConfig,
) -> Result<PathMap, ArchiveError> {
    let source = source.as_ref();
    let map = match format {
        ArchiveFormat::Zip => read_archive(BufReader::new(File::open(source)?), registry, config)?,
    };
    debug!("restored {} from {}", map.len(), source.display());
    Ok(map)
}
