use super::WorkspaceError;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveKind {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub(crate) fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }
}

/// Unpacks `source` into `dest`, returning the number of entries written
pub(crate) fn unpack(source: &Path, kind: ArchiveKind, dest: &Path) -> Result<usize, WorkspaceError> {
    let file = File::open(source).map_err(|e| WorkspaceError::io(source, e))?;
    let reader: Box<dyn Read> = match kind {
        ArchiveKind::Tar => Box::new(file),
        ArchiveKind::TarGz => Box::new(GzDecoder::new(file)),
        ArchiveKind::Zip => return unpack_zip(source, file, dest),
    };

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    let mut count = 0;
    for entry in archive.entries().map_err(|e| WorkspaceError::io(source, e))? {
        let mut entry = entry.map_err(|e| WorkspaceError::io(source, e))?;
        let path = entry
            .path()
            .map_err(|e| WorkspaceError::io(source, e))?
            .into_owned();

        ensure_contained(&path)?;

        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            debug!(path = %path.display(), "Skipping link entry");
            continue;
        }

        entry
            .unpack_in(dest)
            .map_err(|e| WorkspaceError::io(dest.join(&path), e))?;
        count += 1;
    }

    Ok(count)
}

fn unpack_zip(source: &Path, file: File, dest: &Path) -> Result<usize, WorkspaceError> {
    let zip_err = |e: zip::result::ZipError| WorkspaceError::io(source, io::Error::other(e));
    let mut archive = ZipArchive::new(file).map_err(zip_err)?;

    let mut count = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(zip_err)?;
        let name = entry.name().to_string();
        ensure_contained(Path::new(&name))?;
        let path = entry
            .enclosed_name()
            .ok_or_else(|| WorkspaceError::PathEscape(name.clone()))?;

        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            debug!(path = %path.display(), "Skipping link entry");
            continue;
        }

        let target = dest.join(&path);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| WorkspaceError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| WorkspaceError::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| WorkspaceError::io(&target, e))?;

        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))
                .map_err(|e| WorkspaceError::io(&target, e))?;
        }
        count += 1;
    }

    Ok(count)
}

fn ensure_contained(path: &Path) -> Result<(), WorkspaceError> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceError::PathEscape(path.display().to_string()));
            }
        }
    }
    Ok(())
}

/// Archives wrapping everything in one top-level directory use that directory as root
pub(crate) fn effective_root(dest: &Path) -> Result<PathBuf, WorkspaceError> {
    let mut children = fs::read_dir(dest)
        .map_err(|e| WorkspaceError::io(dest, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect::<Vec<_>>();

    if children.len() == 1 && children[0].is_dir() {
        if let Some(only) = children.pop() {
            return Ok(only);
        }
    }

    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        tar = { "app.tar", Some(ArchiveKind::Tar) },
        tar_gz = { "app.tar.gz", Some(ArchiveKind::TarGz) },
        tgz_upper = { "APP.TGZ", Some(ArchiveKind::TarGz) },
        zip = { "app.zip", Some(ArchiveKind::Zip) },
        zip_upper = { "SRC.ZIP", Some(ArchiveKind::Zip) },
        plain = { "README", None },
    )]
    fn test_archive_kind(name: &str, expected: Option<ArchiveKind>) {
        assert_eq!(ArchiveKind::from_path(Path::new(name)), expected);
    }

    #[test]
    fn test_ensure_contained() {
        assert!(ensure_contained(Path::new("src/main.rs")).is_ok());
        assert!(ensure_contained(Path::new("./src/main.rs")).is_ok());
        assert!(ensure_contained(Path::new("../etc/passwd")).is_err());
        assert!(ensure_contained(Path::new("/etc/passwd")).is_err());
        assert!(ensure_contained(Path::new("a/../../b")).is_err());
    }

    #[test]
    fn test_unpack_plain_tar() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive_path = dir.path().join("src.tar");
        {
            let file = File::create(&archive_path).unwrap();
            let mut builder = tar::Builder::new(file);
            let content = b"fn main() {}";
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "src/main.rs", &content[..])
                .unwrap();
            builder.finish().unwrap();
        }

        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();
        let count = unpack(&archive_path, ArchiveKind::Tar, &dest).unwrap();
        assert_eq!(count, 1);
        assert!(dest.join("src/main.rs").exists());
        // src is the only top-level entry
        assert_eq!(effective_root(&dest).unwrap(), dest.join("src"));
    }

    fn write_zip(path: &Path, build: impl FnOnce(&mut zip::ZipWriter<File>)) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        build(&mut writer);
        writer.finish().unwrap();
    }

    #[test]
    fn test_unpack_zip_skips_links() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let dir = tempfile::TempDir::new().unwrap();
        let archive_path = dir.path().join("src.zip");
        write_zip(&archive_path, |zip| {
            let options = SimpleFileOptions::default().unix_permissions(0o755);
            zip.add_directory("app/", options).unwrap();
            zip.start_file("app/run.sh", options).unwrap();
            zip.write_all(b"#!/bin/sh\nexec node server.js\n").unwrap();
            zip.add_symlink("app/passwd", "/etc/passwd", options).unwrap();
        });

        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();
        let count = unpack(&archive_path, ArchiveKind::Zip, &dest).unwrap();

        assert_eq!(count, 1);
        assert!(dest.join("app/run.sh").is_file());
        assert!(fs::symlink_metadata(dest.join("app/passwd")).is_err());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.join("app/run.sh")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_unpack_zip_rejects_escaping_entry() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let dir = tempfile::TempDir::new().unwrap();
        let archive_path = dir.path().join("evil.zip");
        write_zip(&archive_path, |zip| {
            zip.start_file("../escaped.txt", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"owned").unwrap();
        });

        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();
        let err = unpack(&archive_path, ArchiveKind::Zip, &dest).unwrap_err();

        assert!(matches!(err, WorkspaceError::PathEscape(_)));
        assert!(!dir.path().join("escaped.txt").exists());
    }
}
