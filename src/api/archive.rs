use std::io;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

/// A gzipped tarball of a directory and the SHA-256 of its bytes.
pub struct Archive {
    pub bytes: Vec<u8>,
    pub digest: String,
}

/// Pack `dir` into a `.tar.gz` rooted at the directory's own name.
///
/// The digest depends only on file names, contents and the executable bit:
/// entries are written in sorted path order with normalized headers (no
/// mtimes or owners), and the gzip header carries no timestamp.
pub fn pack_directory(dir: &Path) -> io::Result<Archive> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        ));
    }
    let prefix = archive_name(dir);

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    let root = Path::new(&prefix);
    builder.append_dir(root, dir)?;
    let mut entries = Vec::new();
    collect_entries(dir, Path::new(""), &mut entries)?;
    for relative in entries {
        builder.append_path_with_name(dir.join(&relative), root.join(&relative))?;
    }
    let bytes = builder.into_inner()?.finish()?;

    let digest = hex::encode(Sha256::digest(&bytes));
    Ok(Archive { bytes, digest })
}

/// Depth-first listing of `dir` relative to the packed root, siblings sorted
/// by name. Symlinks are listed but not followed.
fn collect_entries(dir: &Path, relative: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut children = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| (e.file_name(), e.path())))
        .collect::<io::Result<Vec<_>>>()?;
    children.sort();

    for (name, path) in children {
        let child = relative.join(&name);
        let is_dir = std::fs::symlink_metadata(&path)?.is_dir();
        out.push(child.clone());
        if is_dir {
            collect_entries(&path, &child, out)?;
        }
    }
    Ok(())
}

/// Name the service files the archive under: the directory's last component.
pub fn archive_name(dir: &Path) -> String {
    dir.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "root".to_string())
}
