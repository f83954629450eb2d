use crate::constants::{DOCKERFILE_ENTRY_MODE, DOCKERFILE_ENTRY_NAME};
use crate::error::{BuildError, Result};
use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};

/// Packs inline build steps and context files into a tar stream the engine
/// accepts as a build input.
pub struct ArchivePacker {
    root: PathBuf,
}

impl ArchivePacker {
    /// Create a packer for the given context root. The root is canonicalized so
    /// entry names come out right for relative and symlinked roots.
    pub fn new(context_root: &Path) -> Result<Self> {
        let root = fs::canonicalize(context_root).map_err(|source| BuildError::ArchivePack {
            path: context_root.to_path_buf(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the synthetic Dockerfile entry followed by every path in `files`.
    ///
    /// Every entry carries the pack-time clock as its mtime, atime and ctime.
    /// A single unreadable file fails the whole archive.
    pub fn pack<W: Write>(&self, steps: &str, files: &[PathBuf], out: W) -> Result<W> {
        let now = pack_time();
        let mut builder = Builder::new(out);

        let mut header = normalized_header(steps.len() as u64, DOCKERFILE_ENTRY_MODE, now);
        builder
            .append_data(&mut header, DOCKERFILE_ENTRY_NAME, steps.as_bytes())
            .map_err(|source| pack_error(Path::new(DOCKERFILE_ENTRY_NAME), source))?;

        for file in files {
            self.append_file(&mut builder, file, now)?;
        }

        builder
            .into_inner()
            .map_err(|source| pack_error(&self.root, source))
    }

    /// Pack into an in-memory buffer.
    pub fn pack_to_vec(&self, steps: &str, files: &[PathBuf]) -> Result<Vec<u8>> {
        self.pack(steps, files, Vec::new())
    }

    /// Name of `path` inside the archive: its location relative to the
    /// canonical context root. Paths outside the root are rejected.
    pub fn entry_name(&self, path: &Path) -> Result<PathBuf> {
        let file_name = path.file_name().ok_or_else(|| {
            pack_error(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let parent = fs::canonicalize(parent).map_err(|source| pack_error(path, source))?;
        let full = parent.join(file_name);
        full.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                pack_error(
                    path,
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("outside of context root {}", self.root.display()),
                    ),
                )
            })
    }

    fn append_file<W: Write>(&self, builder: &mut Builder<W>, path: &Path, now: u64) -> Result<()> {
        let name = self.entry_name(path)?;
        tracing::debug!(entry = %name.display(), "is writing to tarball");

        let metadata = fs::metadata(path).map_err(|source| pack_error(path, source))?;
        let content = fs::read(path).map_err(|source| pack_error(path, source))?;

        let mut header = normalized_header(content.len() as u64, permission_bits(&metadata), now);
        builder
            .append_data(&mut header, &name, content.as_slice())
            .map_err(|source| pack_error(path, source))
    }
}

fn normalized_header(size: u64, mode: u32, now: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(now);
    if let Some(gnu) = header.as_gnu_mut() {
        gnu.set_atime(now);
        gnu.set_ctime(now);
    }
    header
}

fn pack_time() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn pack_error(path: &Path, source: io::Error) -> BuildError {
    BuildError::ArchivePack {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tar::Archive;
    use tempfile::TempDir;

    fn entries(bytes: &[u8]) -> Vec<(String, String, Header)> {
        let mut archive = Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().to_string();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (name, content, entry.header().clone())
            })
            .collect()
    }

    #[test]
    fn test_steps_only_archive() {
        let dir = TempDir::new().unwrap();
        let packer = ArchivePacker::new(dir.path()).unwrap();
        let bytes = packer.pack_to_vec("FROM x", &[]).unwrap();

        let entries = entries(&bytes);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "Dockerfile");
        assert_eq!(entries[0].1, "FROM x");
    }

    #[test]
    fn test_entries_are_relative_to_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("app.py"), "print(1)").unwrap();
        fs::write(dir.path().join("src").join("lib.py"), "x = 2").unwrap();

        let packer = ArchivePacker::new(dir.path()).unwrap();
        let files = vec![dir.path().join("app.py"), dir.path().join("src").join("lib.py")];
        let entries = entries(&packer.pack_to_vec("FROM x", &files).unwrap());

        let names: Vec<&str> = entries.iter().map(|e| e.0.as_str()).collect();
        assert_eq!(names, vec!["Dockerfile", "app.py", "src/lib.py"]);
        assert_eq!(entries[2].1, "x = 2");
    }

    #[test]
    fn test_timestamps_are_normalized() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.txt"), "old").unwrap();
        filetime::set_file_mtime(
            dir.path().join("old.txt"),
            filetime::FileTime::from_unix_time(1_000, 0),
        )
        .unwrap();

        let before = chrono::Utc::now().timestamp() as u64;
        let packer = ArchivePacker::new(dir.path()).unwrap();
        let entries = entries(
            &packer
                .pack_to_vec("FROM x", &[dir.path().join("old.txt")])
                .unwrap(),
        );

        for (_, _, header) in &entries {
            let mtime = header.mtime().unwrap();
            assert!(mtime >= before);
            let gnu = header.as_gnu().unwrap();
            assert_eq!(gnu.atime().unwrap(), mtime);
            assert_eq!(gnu.ctime().unwrap(), mtime);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_copied_from_source() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("run.sh");
        fs::write(&script, "#!/bin/sh").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let packer = ArchivePacker::new(dir.path()).unwrap();
        let entries = entries(&packer.pack_to_vec("FROM x", &[script]).unwrap());
        assert_eq!(entries[0].2.mode().unwrap(), 0o644);
        assert_eq!(entries[1].2.mode().unwrap(), 0o755);
    }

    #[test]
    fn test_path_outside_root_is_rejected() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), "nope").unwrap();

        let packer = ArchivePacker::new(dir.path()).unwrap();
        let err = packer
            .pack_to_vec("FROM x", &[outside.path().join("secret")])
            .unwrap_err();
        assert!(matches!(err, BuildError::ArchivePack { .. }));
    }

    #[test]
    fn test_missing_file_aborts_pack() {
        let dir = TempDir::new().unwrap();
        let packer = ArchivePacker::new(dir.path()).unwrap();
        let err = packer
            .pack_to_vec("FROM x", &[dir.path().join("vanished.txt")])
            .unwrap_err();
        assert!(matches!(err, BuildError::ArchivePack { .. }));
    }
}
