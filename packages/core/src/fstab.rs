//! Mount table snapshots and device resolution.
//!
//! The same table type backs both the static `/etc/fstab` snapshot and the
//! live `/proc/self/mounts` snapshot. A snapshot is never modified after it
//! is loaded; reloading builds a new one and swaps it in.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use snafu::ResultExt;

use crate::device::{self, BlockDevice};
use crate::error::{Error, IoResultExt, Result, TableParseSnafu};

/// Fstab option that disables automounting.
pub const NOAUTO: &str = "noauto";

/// A single mount table line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// The device identifier (a path, `UUID=xxx` or `LABEL=xxx`).
    pub source: String,
    /// Mount point path.
    pub target: PathBuf,
    /// Filesystem type (e.g., "vfat", "ext4").
    pub fstype: String,
    /// Mount options.
    pub options: Vec<String>,
    pub dump: u8,
    pub pass: u16,
}

impl MountEntry {
    /// Parses a single table line.
    ///
    /// Returns `Ok(None)` for comments and blank lines. The options, dump
    /// and pass columns are optional, as in fstab(5). Fields are raw bytes;
    /// the target keeps them as-is, everything else is decoded lossily.
    pub fn from_line(line: &[u8]) -> Result<Option<Self>> {
        let line = line.trim_ascii();

        if line.is_empty() || line.starts_with(b"#") {
            return Ok(None);
        }

        let parts: Vec<&[u8]> = line
            .split(|b| b.is_ascii_whitespace())
            .filter(|field| !field.is_empty())
            .collect();
        if parts.len() < 3 || parts.len() > 6 {
            return Err(Error::EntryParse {
                message: format!("expected 3 to 6 fields, found {}", parts.len()),
            });
        }

        let options = parts
            .get(3)
            .map(|opts| {
                String::from_utf8_lossy(opts)
                    .split(',')
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| vec!["defaults".to_string()]);
        let dump = match parts.get(4) {
            Some(field) => parse_number(field, "dump")?,
            None => 0,
        };
        let pass = match parts.get(5) {
            Some(field) => parse_number(field, "pass")?,
            None => 0,
        };

        Ok(Some(Self {
            source: String::from_utf8_lossy(&unescape_table_field(parts[0])).into_owned(),
            target: PathBuf::from(OsString::from_vec(unescape_table_field(parts[1]))),
            fstype: String::from_utf8_lossy(parts[2]).into_owned(),
            options,
            dump,
            pass,
        }))
    }

    /// Whether `name` is one of the entry's options.
    ///
    /// `name` matches both a bare flag and the key of a `key=value` option.
    pub fn has_option(&self, name: &str) -> bool {
        self.options
            .iter()
            .any(|opt| opt == name || opt.split_once('=').is_some_and(|(key, _)| key == name))
    }
}

fn parse_number<T>(field: &[u8], name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let text = String::from_utf8_lossy(field);
    text.parse::<T>().map_err(|e| Error::EntryParse {
        message: format!("bad {name} field '{text}': {e}"),
    })
}

/// Unescapes octal sequences (`\040` and friends) in table fields.
fn unescape_table_field(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] == b'\\' {
            if let Some(digits) = input.get(i + 1..i + 4)
                && digits.iter().all(|d| (b'0'..=b'7').contains(d))
            {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    result.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        result.push(input[i]);
        i += 1;
    }
    result
}

/// What the resolver needs to know about a hotplug device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub devnode: String,
    /// Device-mapper nodes are matched through their symlinks instead.
    pub is_device_mapper: bool,
    pub devlinks: Vec<String>,
    pub uuid: Option<String>,
    pub label: Option<String>,
}

impl DeviceIdentity {
    /// Captures the identity of a hotplug device.
    pub fn of(device: &impl BlockDevice) -> Self {
        let devnode = device.devnode().unwrap_or_default().to_string();
        Self {
            is_device_mapper: device::is_device_mapper(&devnode),
            devlinks: device.devlinks(),
            uuid: device.fs_uuid().map(str::to_string),
            label: device.fs_label().map(str::to_string),
            devnode,
        }
    }
}

/// Immutable snapshot of a mount table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    /// Reads and parses a table file.
    ///
    /// Paths in the kernel's tables are raw bytes, so the file is not
    /// required to be UTF-8.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read(path).table_read_context(path)?;
        Self::parse(path, &content)
    }

    /// Parses table content. `path` is only used for error reporting.
    pub fn parse(path: &Path, content: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();

        for (index, line) in content.split(|&b| b == b'\n').enumerate() {
            let entry = MountEntry::from_line(line).context(TableParseSnafu {
                path,
                line: index + 1,
            })?;
            entries.extend(entry);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// First entry whose source is exactly `source`.
    pub fn find_source(&self, source: &str) -> Option<&MountEntry> {
        self.entries.iter().find(|e| e.source == source)
    }

    /// Resolves a device to at most one entry, first match wins:
    ///
    /// 1. the device node, or for device-mapper nodes each symlink in turn;
    /// 2. `UUID=<uuid>`;
    /// 3. `LABEL=<label>`.
    pub fn resolve(&self, id: &DeviceIdentity) -> Option<&MountEntry> {
        let by_path = if id.is_device_mapper {
            id.devlinks.iter().find_map(|link| self.find_source(link))
        } else {
            self.find_source(&id.devnode)
        };

        by_path
            .or_else(|| {
                id.uuid
                    .as_ref()
                    .and_then(|uuid| self.find_source(&format!("UUID={uuid}")))
            })
            .or_else(|| {
                id.label
                    .as_ref()
                    .and_then(|label| self.find_source(&format!("LABEL={label}")))
            })
    }

    /// Resolves a hotplug device.
    pub fn resolve_device(&self, device: &impl BlockDevice) -> Option<&MountEntry> {
        self.resolve(&DeviceIdentity::of(device))
    }

    /// Whether the entry the device resolves to carries option `name`.
    pub fn has_option(&self, device: &impl BlockDevice, name: &str) -> bool {
        self.resolve_device(device)
            .is_some_and(|entry| entry.has_option(name))
    }

    /// Whether the device appears in this table. Meaningful for the live
    /// table, where it means "is mounted".
    pub fn contains_device(&self, device: &impl BlockDevice) -> bool {
        self.resolve_device(device).is_some()
    }
}
