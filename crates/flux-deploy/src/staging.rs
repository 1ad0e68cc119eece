//! Source staging — confined extraction of uploaded archives.
//!
//! The uploaded tar (gzip-wrapped when the daemon's compression is
//! enabled) is materialized under `<root>/apps/<name>/`. Only directory
//! and regular-file entries are honored; absolute paths and `..`
//! traversal are rejected before anything is written.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::DeployError;

/// Extract `archive` into `<root>/apps/<name>` and return that path.
pub fn stage_source(
    root_dir: &Path,
    name: &str,
    archive: impl Read,
    gzipped: bool,
) -> Result<PathBuf, DeployError> {
    let project_dir = root_dir.join("apps").join(name);
    std::fs::create_dir_all(&project_dir)?;

    if gzipped {
        unpack(tar::Archive::new(GzDecoder::new(archive)), &project_dir)?;
    } else {
        unpack(tar::Archive::new(archive), &project_dir)?;
    }

    debug!(path = %project_dir.display(), "source staged");
    Ok(project_dir)
}

fn unpack<R: Read>(mut archive: tar::Archive<R>, dest: &Path) -> Result<(), DeployError> {
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let confined = confine(&path)?;
        let target = dest.join(confined);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&target)?;
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut file = std::fs::File::create(&target)?;
                std::io::copy(&mut entry, &mut file)?;
            }
            // Links, devices, and the rest are ignored.
            _ => {}
        }
    }
    Ok(())
}

/// Reject archive paths that would escape the staging directory.
fn confine(path: &Path) -> Result<&Path, DeployError> {
    if path.is_absolute() {
        return Err(DeployError::Validation(format!(
            "archive entry has an absolute path: {}",
            path.display()
        )));
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(DeployError::Validation(format!(
                "archive entry escapes the project directory: {}",
                path.display()
            )));
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn tar_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, *path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn extracts_files_and_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tar_with(&[
            ("index.html", "<h1>hi</h1>"),
            ("static/css/site.css", "body{}"),
        ]);

        let project = stage_source(dir.path(), "web", archive.as_slice(), false).unwrap();

        assert_eq!(project, dir.path().join("apps").join("web"));
        assert_eq!(
            std::fs::read_to_string(project.join("index.html")).unwrap(),
            "<h1>hi</h1>"
        );
        assert_eq!(
            std::fs::read_to_string(project.join("static/css/site.css")).unwrap(),
            "body{}"
        );
    }

    #[test]
    fn extracts_gzipped_archives() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = tar_with(&[("flux.json", "{}")]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tarball).unwrap();
        let gzipped = encoder.finish().unwrap();

        let project = stage_source(dir.path(), "web", gzipped.as_slice(), true).unwrap();
        assert!(project.join("flux.json").exists());
    }

    #[test]
    fn rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tar_with(&[("../evil", "pwned")]);

        let err = stage_source(dir.path(), "web", archive.as_slice(), false).unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)));
        assert!(!dir.path().join("evil").exists());
    }

    #[test]
    fn rejects_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        // append_data would normalize the path, so write the header raw.
        header.set_path("/etc/passwd").ok();
        header.set_cksum();
        builder.append(&header, "oops\n".as_bytes()).unwrap();
        let archive = builder.into_inner().unwrap();

        let result = stage_source(dir.path(), "web", archive.as_slice(), false);
        assert!(result.is_err());
    }

    #[test]
    fn ignores_symlink_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_cksum();
        builder
            .append_link(&mut header, "link", "/etc/passwd")
            .unwrap();
        let archive = builder.into_inner().unwrap();

        stage_source(dir.path(), "web", archive.as_slice(), false).unwrap();
        assert!(!dir.path().join("apps/web/link").exists());
    }

    #[test]
    fn restaging_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        stage_source(
            dir.path(),
            "web",
            tar_with(&[("index.html", "v1")]).as_slice(),
            false,
        )
        .unwrap();
        let project = stage_source(
            dir.path(),
            "web",
            tar_with(&[("index.html", "v2")]).as_slice(),
            false,
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(project.join("index.html")).unwrap(),
            "v2"
        );
    }
}
