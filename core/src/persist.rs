use crate::config::SHARD_EXTENSION;
use crate::error::{Error, Result};
use crate::index::ShardIndex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Bumped whenever the shard layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Leading record of every shard file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardHeader {
    pub version: u32,
    pub shard: u32,
    pub documents: u64,
    pub terms: u64,
    pub created_at: String,
}

#[derive(Serialize)]
struct ShardFileRef<'a> {
    header: ShardHeader,
    index: &'a ShardIndex,
}

#[derive(Deserialize)]
struct ShardFile {
    header: ShardHeader,
    index: ShardIndex,
}

/// A shard loaded for searching, read-only for the rest of the session.
#[derive(Debug)]
pub struct LoadedShard {
    pub path: PathBuf,
    pub header: ShardHeader,
    pub index: ShardIndex,
}

impl LoadedShard {
    /// File name, used to label results.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// `<prefix>_<shard>.idx`
pub fn shard_path(prefix: &str, shard: usize) -> PathBuf {
    PathBuf::from(format!("{prefix}_{shard}.{SHARD_EXTENSION}"))
}

/// Write `index` to `path`. The file appears under its final name only once fully written.
pub fn save_shard(index: &ShardIndex, shard: usize, path: &Path) -> Result<ShardHeader> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    let header = ShardHeader {
        version: FORMAT_VERSION,
        shard: shard as u32,
        documents: index.num_docs() as u64,
        terms: index.num_terms() as u64,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
    };

    let tmp = path.with_extension(format!("{SHARD_EXTENSION}.tmp"));
    let f = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    let mut writer = BufWriter::new(f);
    let file = ShardFileRef { header: header.clone(), index };
    bincode::serialize_into(&mut writer, &file)
        .map_err(|source| Error::Format { path: tmp.clone(), source })?;
    writer.flush().map_err(|e| Error::io(&tmp, e))?;
    drop(writer);
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;

    tracing::info!(
        path = %path.display(),
        documents = header.documents,
        terms = header.terms,
        "shard written"
    );
    Ok(header)
}

pub fn load_shard(path: &Path) -> Result<LoadedShard> {
    let f = File::open(path).map_err(|e| Error::io(path, e))?;
    let file: ShardFile = bincode::deserialize_from(BufReader::new(f))
        .map_err(|source| Error::Format { path: path.to_path_buf(), source })?;
    if file.header.version != FORMAT_VERSION {
        return Err(Error::Version {
            path: path.to_path_buf(),
            found: file.header.version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(LoadedShard { path: path.to_path_buf(), header: file.header, index: file.index })
}

/// A value containing glob metacharacters is used as-is, anything else is a shard prefix.
pub fn resolve_pattern(pattern: &str) -> String {
    if pattern.contains(['*', '?', '[']) {
        pattern.to_string()
    } else {
        format!("{pattern}_*.{SHARD_EXTENSION}")
    }
}

/// Load every shard matching `pattern`, in sorted path order. Matching nothing is an error.
pub fn load_all(pattern: &str) -> Result<Vec<LoadedShard>> {
    let resolved = resolve_pattern(pattern);
    let mut paths = Vec::new();
    for entry in glob::glob(&resolved)? {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            Error::io(path, e.into())
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(Error::NoShards { pattern: resolved });
    }
    paths.sort();

    let shards = paths.iter().map(|p| load_shard(p)).collect::<Result<Vec<_>>>()?;
    let documents: usize = shards.iter().map(|s| s.index.num_docs()).sum();
    tracing::info!(pattern = %resolved, shards = shards.len(), documents, "shards loaded");
    Ok(shards)
}
