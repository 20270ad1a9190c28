//! The directory alias primitive behind `<root>/<tool>/current`.
//!
//! POSIX systems get a symbolic link swapped in with a rename. On Windows a
//! directory symlink needs elevation or developer mode, so a junction is the
//! fallback.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use log::debug;

/// Points `link` at `target`, replacing any existing alias.
#[cfg(unix)]
pub fn replace_dir_link(target: &Path, link: &Path) -> io::Result<()> {
    let staging = staging_path(link);
    debug!("Linking {} -> {}", link.display(), target.display());
    let _ = fs::remove_file(&staging);
    std::os::unix::fs::symlink(target, &staging)?;
    if let Err(err) = fs::rename(&staging, link) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    Ok(())
}

#[cfg(windows)]
pub fn replace_dir_link(target: &Path, link: &Path) -> io::Result<()> {
    remove_dir_link(link)?;
    if std::os::windows::fs::symlink_dir(target, link).is_ok() {
        return Ok(());
    }
    debug!("Directory symlink refused, creating a junction for {}", link.display());
    create_junction(target, link)
}

#[cfg(windows)]
fn create_junction(target: &Path, link: &Path) -> io::Result<()> {
    use std::process::Command;

    let status = Command::new("cmd")
        .args(["/C", "mklink", "/J"])
        .arg(link)
        .arg(target)
        .output();
    if matches!(&status, Ok(out) if out.status.success()) {
        return Ok(());
    }
    let script = format!(
        "New-Item -ItemType Junction -Path '{}' -Target '{}' | Out-Null",
        link.display(),
        target.display()
    );
    for shell in ["pwsh", "powershell"] {
        let out = Command::new(shell)
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output();
        if matches!(&out, Ok(out) if out.status.success()) {
            return Ok(());
        }
        debug!("{} could not create junction {}", shell, link.display());
    }
    Err(io::Error::other(format!(
        "could not create a link or junction at {}",
        link.display()
    )))
}

/// Removes an alias. A missing alias is fine; a real directory is left alone.
pub fn remove_dir_link(link: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(link) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if meta.file_type().is_symlink() {
        return remove_symlink(link);
    }
    if is_junction(link, &meta) {
        return fs::remove_dir(link);
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{} exists and is not a link", link.display()),
    ))
}

#[cfg(unix)]
fn remove_symlink(link: &Path) -> io::Result<()> {
    fs::remove_file(link)
}

#[cfg(windows)]
fn remove_symlink(link: &Path) -> io::Result<()> {
    fs::remove_dir(link).or_else(|_| fs::remove_file(link))
}

#[cfg(unix)]
fn is_junction(_link: &Path, _meta: &fs::Metadata) -> bool {
    false
}

#[cfg(windows)]
fn is_junction(_link: &Path, meta: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
    meta.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0
}

/// Where the alias points, when that can be read back.
pub fn read_dir_link(link: &Path) -> Option<PathBuf> {
    fs::read_link(link).ok()
}

/// Whether anything (link, junction or otherwise) sits at `link`.
pub fn link_exists(link: &Path) -> bool {
    fs::symlink_metadata(link).is_ok()
}

#[cfg(unix)]
fn staging_path(link: &Path) -> PathBuf {
    let mut name = link.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    link.with_file_name(name)
}
