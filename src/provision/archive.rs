//! Single-entry extraction from release archives.
//!
//! Runs synchronously; callers move it onto the blocking pool.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use super::ProvisionError;

/// Release archive layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    /// Debian package: ar container holding `data.tar.gz`.
    Deb,
    TarGz,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".deb") {
            Some(Self::Deb)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Copy `entry` out of `archive` to `dest`.
pub fn extract_entry(
    format: ArchiveFormat,
    archive: &Path,
    entry: &str,
    dest: &Path,
) -> Result<(), ProvisionError> {
    let file = File::open(archive)?;
    let found = match format {
        ArchiveFormat::Zip => extract_zip(file, entry, dest)?,
        ArchiveFormat::Deb => extract_deb(file, entry, dest)?,
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(file), entry, dest)?,
    };
    if found {
        Ok(())
    } else {
        Err(ProvisionError::EntryNotFound {
            entry: entry.to_string(),
            archive: archive.to_path_buf(),
        })
    }
}

fn extract_zip(file: File, entry: &str, dest: &Path) -> Result<bool, ProvisionError> {
    let mut zip = zip::ZipArchive::new(file)?;
    let mut member = match zip.by_name(entry) {
        Ok(member) => member,
        Err(zip::result::ZipError::FileNotFound) => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    write_replacing(&mut member, dest)?;
    Ok(true)
}

fn extract_deb(file: File, entry: &str, dest: &Path) -> Result<bool, ProvisionError> {
    let mut deb = ar::Archive::new(file);
    while let Some(member) = deb.next_entry() {
        let member = member?;
        let name = member.header().identifier().to_vec();
        match name.as_slice() {
            b"data.tar.gz" => return extract_tar(GzDecoder::new(member), entry, dest),
            b"data.tar" => return extract_tar(member, entry, dest),
            _ => continue,
        }
    }
    Ok(false)
}

fn extract_tar<R: Read>(reader: R, entry: &str, dest: &Path) -> Result<bool, ProvisionError> {
    let wanted = normalize(entry);
    let mut tarball = tar::Archive::new(reader);
    for member in tarball.entries()? {
        let mut member = member?;
        let path = String::from_utf8_lossy(&member.path_bytes()).into_owned();
        if normalize(&path) == wanted {
            write_replacing(&mut member, dest)?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

/// Write next to `dest` and rename over it, so a running executable is never truncated.
fn write_replacing<R: Read>(reader: &mut R, dest: &Path) -> io::Result<()> {
    let staging = staging_path(dest);
    let mut out = File::create(&staging)?;
    io::copy(reader, &mut out)?;
    out.sync_all()?;
    drop(out);
    std::fs::rename(&staging, dest)
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".new");
    PathBuf::from(name)
}
