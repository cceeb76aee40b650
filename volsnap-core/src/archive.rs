/*!
Archive creation and extraction for directory snapshots.

A snapshot is a gzip-compressed tar of the source tree. Every file, directory
and symlink below the source root is stored under its path relative to the
root, unless an exclusion pattern matches that relative path. Directories are
stored without their contents; the walk adds each child on its own, so an
excluded directory does not hide children that are not excluded themselves.

Entries that cannot be read are skipped: one unreadable file never costs the
whole snapshot. The archive being written is never stored in itself, even
when it lies inside the source tree.
*/

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tar::{Archive, Builder};
use tempfile::TempPath;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::exclude::ExclusionMatcher;
use crate::naming::archive_file_name;
use crate::{Result, VolsnapError};

/// What went into an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Entries stored in the archive
    pub entries: usize,
    /// Entries left out by an exclusion pattern
    pub excluded: usize,
    /// Entries that could not be read
    pub skipped: usize,
    /// Size of the compressed archive on disk
    pub bytes: u64,
}

/// Archive `source` into a gzip-compressed tar at `output`
///
/// The archive is flushed and closed when this returns. Failing to create
/// `output` is an error; failing to read an entry only skips that entry.
pub fn create_archive(
    source: &Path,
    exclusions: &ExclusionMatcher,
    output: &Path,
) -> Result<ArchiveSummary> {
    if !source.is_dir() {
        return Err(VolsnapError::archive(format!(
            "Backup source {} is not a directory",
            source.display()
        )));
    }

    let file = File::create(output).map_err(|e| {
        VolsnapError::archive(format!(
            "Failed to create archive {}: {e}",
            output.display()
        ))
    })?;
    let output_name = output.file_name();
    let output_path = fs::canonicalize(output).ok();

    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut summary = ArchiveSummary::default();

    for entry in WalkDir::new(source).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "Skipping unreadable entry");
                summary.skipped += 1;
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };

        if output_path.is_some()
            && Some(entry.file_name()) == output_name
            && fs::canonicalize(entry.path()).ok() == output_path
        {
            debug!(path = %entry.path().display(), "Skipping the archive being written");
            continue;
        }

        if exclusions.matches(&relative.to_string_lossy()) {
            summary.excluded += 1;
            continue;
        }

        let added = if entry.file_type().is_dir() {
            builder.append_dir(relative, entry.path())
        } else {
            builder.append_path_with_name(entry.path(), relative)
        };

        match added {
            Ok(()) => summary.entries += 1,
            Err(err) => {
                debug!(path = %entry.path().display(), error = %err, "Skipping entry");
                summary.skipped += 1;
            }
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| VolsnapError::archive(format!("Failed to finish tar stream: {e}")))?;
    let writer = encoder
        .finish()
        .map_err(|e| VolsnapError::archive(format!("Failed to finish compression: {e}")))?;
    writer
        .into_inner()
        .map_err(|e| VolsnapError::archive(format!("Failed to flush archive: {}", e.error())))?;

    summary.bytes = fs::metadata(output)?.len();

    info!(
        source = %source.display(),
        archive = %output.display(),
        entries = summary.entries,
        excluded = summary.excluded,
        skipped = summary.skipped,
        bytes = summary.bytes,
        "Archive created"
    );
    Ok(summary)
}

/// Reserve a fresh file in `dir` for the archive of snapshot `key`
///
/// The file is created exclusively under a hidden name, so it never aliases
/// an existing snapshot even when `dir` is also a snapshot directory. It is
/// removed when the returned path is dropped.
pub fn temp_archive(dir: &Path, key: &str) -> Result<TempPath> {
    fs::create_dir_all(dir).map_err(|e| {
        VolsnapError::archive(format!(
            "Failed to create temp directory {}: {e}",
            dir.display()
        ))
    })?;

    let prefix = format!(".{}.", archive_file_name(key));
    let file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            VolsnapError::archive(format!(
                "Failed to create temp archive in {}: {e}",
                dir.display()
            ))
        })?;
    Ok(file.into_temp_path())
}

/// Extract the archive at `archive` into `target`, overwriting existing entries
pub fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| {
        VolsnapError::archive(format!("Failed to open archive {}: {e}", archive.display()))
    })?;

    let mut archive_reader = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive_reader.set_overwrite(true);
    archive_reader.set_preserve_permissions(true);
    archive_reader.set_preserve_mtime(true);

    archive_reader.unpack(target).map_err(|e| {
        VolsnapError::archive(format!(
            "Failed to extract {} into {}: {e}",
            archive.display(),
            target.display()
        ))
    })?;

    info!(archive = %archive.display(), target = %target.display(), "Archive extracted");
    Ok(())
}
