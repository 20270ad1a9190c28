//! Unpacking downloaded artifacts into an install directory.
//!
//! Archives whose entries all live under one top-level folder are unwrapped, so
//! `jdk-21.0.2+13/bin/java` lands at `<dest>/bin/java`.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use flate2::read::GzDecoder;
use log::debug;
use crate::descriptor::ArtifactKind;
use crate::util::make_executable;

/// Unpacks `artifact` into `dest`, which must already exist.
///
/// `file_name` is the name a single-file artifact is stored under.
pub fn unpack(kind: ArtifactKind, artifact: &Path, dest: &Path, file_name: &str) -> io::Result<()> {
    match kind {
        ArtifactKind::Zip => extract_zip(artifact, dest),
        ArtifactKind::TarGz => extract_tar_gz(artifact, dest),
        ArtifactKind::File => place_file(artifact, dest, file_name),
    }
}

pub fn extract_zip(artifact: &Path, dest: &Path) -> io::Result<()> {
    let mut archive = zip::ZipArchive::new(File::open(artifact)?).map_err(invalid)?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(invalid)?;
        if let Some(path) = entry.enclosed_name() {
            names.push(path);
        }
    }
    let root = common_root(&names);
    if let Some(root) = &root {
        debug!("Stripping common root {:?}", root);
    }

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(invalid)?;
        let Some(name) = entry.enclosed_name() else {
            return Err(invalid(format!("unsafe path in archive: {}", entry.name())));
        };
        let Some(relative) = strip_root(&name, root.as_ref()) else {
            continue;
        };
        let out = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

pub fn extract_tar_gz(artifact: &Path, dest: &Path) -> io::Result<()> {
    let names = {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(artifact)?));
        let mut names = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            if is_pax_header(&entry) {
                continue;
            }
            names.push(safe_path(&entry.path()?)?);
        }
        names
    };
    let root = common_root(&names);
    if let Some(root) = &root {
        debug!("Stripping common root {:?}", root);
    }

    let mut archive = tar::Archive::new(GzDecoder::new(File::open(artifact)?));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if is_pax_header(&entry) {
            continue;
        }
        let name = safe_path(&entry.path()?)?;
        let Some(relative) = strip_root(&name, root.as_ref()) else {
            continue;
        };
        let out = dest.join(relative);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        if entry.header().entry_type().is_hard_link() {
            let target = entry
                .link_name()?
                .ok_or_else(|| invalid(format!("hard link without target: {}", name.display())))?;
            let target = strip_root(&safe_path(&target)?, root.as_ref())
                .ok_or_else(|| invalid(format!("hard link to archive root: {}", name.display())))?;
            fs::hard_link(dest.join(target), &out)?;
            continue;
        }
        entry.unpack(&out)?;
    }
    Ok(())
}

/// Pax metadata records that `tar` yields as entries of their own.
fn is_pax_header<R: io::Read>(entry: &tar::Entry<'_, R>) -> bool {
    matches!(
        entry.header().entry_type(),
        tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
    )
}

/// Moves a single-file artifact to `<dest>/<file_name>` and marks it executable.
pub fn place_file(artifact: &Path, dest: &Path, file_name: &str) -> io::Result<()> {
    let target = dest.join(file_name);
    if fs::rename(artifact, &target).is_err() {
        fs::copy(artifact, &target)?;
        fs::remove_file(artifact)?;
    }
    make_executable(&target)
}

/// The single top-level folder every entry shares, if any.
///
/// An archive holding nothing but that folder's own entry, or a lone file at the
/// top level, has no root to strip.
pub fn common_root(paths: &[PathBuf]) -> Option<OsString> {
    let mut root: Option<OsString> = None;
    let mut nested = false;
    for path in paths {
        let mut components = path.components();
        let first = match components.next() {
            Some(Component::Normal(first)) => first,
            _ => return None,
        };
        match &root {
            Some(existing) if existing.as_os_str() != first => return None,
            Some(_) => {}
            None => root = Some(first.to_os_string()),
        }
        if components.next().is_some() {
            nested = true;
        }
    }
    root.filter(|_| nested)
}

fn strip_root(path: &Path, root: Option<&OsString>) -> Option<PathBuf> {
    let relative = match root {
        Some(root) => path.strip_prefix(root).ok()?.to_path_buf(),
        None => path.to_path_buf(),
    };
    (!relative.as_os_str().is_empty()).then_some(relative)
}

/// Rejects absolute paths and `..` components.
fn safe_path(path: &Path) -> io::Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(invalid(format!("unsafe path in archive: {}", path.display()))),
        }
    }
    Ok(clean)
}

fn invalid<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}
