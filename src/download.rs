use crate::error::{ProvisionError, Result};
use crate::platform::ArchiveExt;
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use walkdir::WalkDir;

pub async fn download_file(client: &reqwest::Client, url: &str, local_path: &Path) -> Result<()> {
    let filename = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());
    tracing::info!("Downloading {}...", filename);

    let response = client
        .get(url)
        .header("User-Agent", crate::config::USER_AGENT)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ProvisionError::network(url, e))?;
    let total_size = response.content_length().unwrap_or(0);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Downloading {}", filename));

    let mut file = fs::File::create(local_path)
        .map_err(|e| ProvisionError::io(format!("Could not create {}", local_path.display()), e))?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProvisionError::network(url, e))?;
        file.write_all(&chunk)
            .map_err(|e| ProvisionError::io(format!("Could not write {}", local_path.display()), e))?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    pb.finish_with_message("Download complete");
    Ok(())
}

/// Unpack `archive_path` into `extract_dir`, choosing the format from the
/// archive's file name.
pub fn extract_archive(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    let archive_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    tracing::info!("Extracting {}...", archive_name);

    let outcome = match ArchiveExt::from_file_name(&archive_name) {
        ArchiveExt::Zip => extract_zip(archive_path, extract_dir),
        ArchiveExt::TarGz => extract_tar_gz(archive_path, extract_dir),
    };

    outcome.map_err(|e| ProvisionError::Extraction {
        archive: archive_name,
        reason: e.to_string(),
    })
}

fn extract_zip(archive_path: &Path, extract_dir: &Path) -> io::Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;

        let outpath = match file.enclosed_name() {
            Some(path) => extract_dir.join(path),
            None => {
                tracing::warn!("Skipping unsafe path in zip: {}", file.name());
                continue;
            }
        };

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode().filter(|m| m & 0o777 != 0) {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}

fn extract_tar_gz(archive_path: &Path, extract_dir: &Path) -> io::Result<()> {
    let file = fs::File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    archive.unpack(extract_dir)?;

    Ok(())
}

/// Depth-first search for a non-directory entry named exactly `file_name`.
///
/// Entries are visited in file-name order so the result does not depend on
/// the filesystem's directory order.
pub fn find_file(start: &Path, file_name: &str) -> Option<PathBuf> {
    WalkDir::new(start)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|entry| !entry.file_type().is_dir() && entry.file_name() == file_name)
        .map(|entry| entry.into_path())
}

/// Names of the top-level entries of `dir`, for diagnostics.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures;
    use tempfile::TempDir;

    #[test]
    fn test_extracts_tar_gz() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("tool_1.0.0_linux_amd64.tar.gz");
        fixtures::write_tar_gz(&archive, &[("tool_1.0.0/tool", "#!/bin/sh\necho hi\n")]);

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        extract_archive(&archive, &out).unwrap();

        assert!(out.join("tool_1.0.0").join("tool").is_file());
    }

    #[test]
    fn test_extracts_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("tool_1.0.0_windows_amd64.zip");
        fixtures::write_zip(&archive, &[("bin/tool.exe", "MZ"), ("README.md", "docs")]);

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        extract_archive(&archive, &out).unwrap();

        assert_eq!(fs::read(out.join("bin").join("tool.exe")).unwrap(), b"MZ");
        assert!(out.join("README.md").is_file());
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();

        let err = extract_archive(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::Extraction { .. }));
    }

    #[test]
    fn test_find_file_searches_depth_first() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/nested")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/nested/tool"), b"1").unwrap();
        fs::write(dir.path().join("b/tool"), b"2").unwrap();
        fs::write(dir.path().join("tool.txt"), b"3").unwrap();

        let found = find_file(dir.path(), "tool").unwrap();
        assert_eq!(found, dir.path().join("a/nested/tool"));
        assert!(find_file(dir.path(), "missing").is_none());
    }

    #[test]
    fn test_find_file_ignores_directories_with_matching_name() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("tool")).unwrap();
        fs::write(dir.path().join("tool").join("tool"), b"bin").unwrap();

        assert_eq!(
            find_file(dir.path(), "tool").unwrap(),
            dir.path().join("tool").join("tool")
        );
    }

    #[test]
    fn test_list_dir_is_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        assert_eq!(list_dir(dir.path()), vec!["a", "b"]);
    }
}
