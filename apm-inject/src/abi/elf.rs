//! glibc requirement of a shared object, from its versioned dynamic symbols
//!
//! Every imported glibc symbol carries a version such as `GLIBC_2.34`. The
//! highest of these is the oldest glibc the object can be loaded against.

use std::path::Path;
use std::sync::LazyLock;

use object::elf::{FileHeader32, FileHeader64, SHT_DYNSYM};
use object::read::elf::FileHeader;
use object::{Endianness, FileKind, SymbolIndex};
use regex::Regex;

use super::Version;
use crate::domain::AbiError;

static GLIBC_SYMBOL_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^GLIBC_([0-9.]+)$").expect("symbol version regex is valid"));

/// Highest `GLIBC_x.y[.z]` version among `names`
///
/// Names that are not glibc versions (`GLIBC_PRIVATE`, `GCC_3.0`, ...) are
/// skipped. Returns `None` when nothing references glibc.
///
/// # Errors
/// Returns [`AbiError::InvalidVersion`] for a malformed glibc version.
pub fn max_glibc_version<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Option<Version>, AbiError> {
    let mut required: Option<Version> = None;
    for name in names {
        let Some(captures) = GLIBC_SYMBOL_VERSION.captures(name) else {
            continue;
        };
        let version: Version = captures[1].parse()?;
        required = Some(required.map_or(version, |r| r.max(version)));
    }
    Ok(required)
}

/// Version names attached to the dynamic symbols of an ELF image
///
/// # Errors
/// Returns an error if `data` is not a parseable ELF file.
pub fn dynamic_symbol_versions(data: &[u8]) -> Result<Vec<String>, AbiError> {
    match FileKind::parse(data)? {
        FileKind::Elf32 => versions_of::<FileHeader32<Endianness>>(data),
        FileKind::Elf64 => versions_of::<FileHeader64<Endianness>>(data),
        other => Err(AbiError::NotElf(format!("{other:?}"))),
    }
}

fn versions_of<Elf: FileHeader<Endian = Endianness>>(data: &[u8]) -> Result<Vec<String>, AbiError> {
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let sections = header.sections(endian, data)?;
    let symbols = sections.symbols(endian, data, SHT_DYNSYM)?;
    let Some(versions) = sections.versions(endian, data)? else {
        // Unversioned object
        return Ok(Vec::new());
    };

    let mut names = Vec::new();
    for index in 0..symbols.len() {
        let version_index = versions.version_index(endian, SymbolIndex(index));
        if let Some(version) = versions.version(version_index)? {
            names.push(String::from_utf8_lossy(version.name()).into_owned());
        }
    }
    Ok(names)
}

/// glibc version required by the shared object at `path`
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn required_glibc_version(path: &Path) -> Result<Option<Version>, AbiError> {
    let data = std::fs::read(path)?;
    let names = dynamic_symbol_versions(&data)?;
    max_glibc_version(names.iter().map(String::as_str))
}
