//! Fixtures shared by the engine tests.

use std::fs;
use std::path::Path;

use crate::archive::create_archive;
use crate::destination::Destination;
use crate::exclude::ExclusionMatcher;
use crate::storage::{
    BackendResolver, DefaultResolver, DestinationOptions, MemoryStorage, StorageBackend,
};
use crate::Result;

pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Compressed archive of a tree holding the given files
pub fn archive_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let source = tempfile::TempDir::new().unwrap();
    let out = tempfile::TempDir::new().unwrap();
    for (relative, content) in files {
        write_file(source.path(), relative, content);
    }
    let archive = out.path().join("fixture.tar.gz");
    create_archive(source.path(), &ExclusionMatcher::default(), &archive).unwrap();
    fs::read(archive).unwrap()
}

/// Object store destinations go to `memory`, local ones to the filesystem
pub fn memory_resolver(
    memory: MemoryStorage,
) -> impl Fn(&Destination, &DestinationOptions) -> Result<Box<dyn StorageBackend>> {
    move |destination: &Destination, options: &DestinationOptions| match destination {
        Destination::ObjectStore { .. } => Ok(Box::new(memory.clone()) as Box<dyn StorageBackend>),
        Destination::LocalFilesystem { .. } => DefaultResolver.resolve(destination, options),
    }
}

pub fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
}
