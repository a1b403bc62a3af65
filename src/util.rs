use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::error::{HarnessError, HarnessResult};

const COMPACT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format(COMPACT_FORMAT).to_string()
}

pub fn parse_utc_compact(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, COMPACT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn ensure_directory(path: &Path) -> HarnessResult<()> {
    fs::create_dir_all(path).map_err(|source| {
        HarnessError::io(
            format!("failed to create directory: {}", path.display()),
            source,
        )
    })
}

pub fn sha256_file(path: &Path) -> HarnessResult<String> {
    let mut file = File::open(path).map_err(|source| {
        HarnessError::io(
            format!("failed to open file for hashing: {}", path.display()),
            source,
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file.read(&mut buf).map_err(|source| {
            HarnessError::io(
                format!("failed to read file for hashing: {}", path.display()),
                source,
            )
        })?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn sha256_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Writes pretty JSON through a sibling temp file so readers never observe a
/// half-written document.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> HarnessResult<()> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| {
        HarnessError::json(
            format!("failed to serialize json: {}", path.display()),
            source,
        )
    })?;
    write_bytes_replacing(path, &data, true)
}

pub fn write_text(path: &Path, text: &str) -> HarnessResult<()> {
    write_bytes_replacing(path, text.as_bytes(), false)
}

fn write_bytes_replacing(path: &Path, data: &[u8], trailing_newline: bool) -> HarnessResult<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = File::create(&tmp_path).map_err(|source| {
        HarnessError::io(
            format!("failed to create file: {}", tmp_path.display()),
            source,
        )
    })?;
    file.write_all(data).map_err(|source| {
        HarnessError::io(format!("failed to write file: {}", path.display()), source)
    })?;
    if trailing_newline {
        file.write_all(b"\n").map_err(|source| {
            HarnessError::io(
                format!("failed to finalize file: {}", path.display()),
                source,
            )
        })?;
    }
    file.sync_all().map_err(|source| {
        HarnessError::io(format!("failed to flush file: {}", path.display()), source)
    })?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|source| {
        HarnessError::io(
            format!("failed to move file into place: {}", path.display()),
            source,
        )
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> HarnessResult<T> {
    let raw = fs::read(path)
        .map_err(|source| HarnessError::io(format!("failed to read {}", path.display()), source))?;
    serde_json::from_slice(&raw)
        .map_err(|source| HarnessError::json(format!("failed to parse {}", path.display()), source))
}

pub fn read_text_lossy(path: &Path) -> HarnessResult<String> {
    let raw = fs::read(path)
        .map_err(|source| HarnessError::io(format!("failed to read {}", path.display()), source))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

pub fn copy_file(source: &Path, target: &Path) -> HarnessResult<u64> {
    if let Some(parent) = target.parent() {
        ensure_directory(parent)?;
    }
    fs::copy(source, target).map_err(|err| {
        HarnessError::io(
            format!(
                "failed to copy {} -> {}",
                source.display(),
                target.display()
            ),
            err,
        )
    })
}

/// Relative path rendered with forward slashes for manifests and reports.
pub fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
