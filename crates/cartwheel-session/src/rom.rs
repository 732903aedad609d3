use log::{debug, info};
use sha1::{Digest, Sha1};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

use crate::config::Platform;

/// Largest cartridge the GBA address space can map (32 MiB).
pub const MAX_ROM_SIZE: u64 = 0x200_0000;

#[derive(Error, Debug)]
pub enum RomError {
    #[error("the size is invalid (0 bytes)")]
    EmptyImage,

    #[error("unable to read ROM archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("unable to read ROM archive entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("no ROM found in archive")]
    NoRomInArchive,

    #[error("archive entry '{0}' is larger than a cartridge can be")]
    TooLarge(String),

    #[error("unable to determine the platform of '{0}'")]
    UnknownPlatform(String),
}

/// How the source bytes are packaged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContainerHint {
    Raw,
    Zip,
    /// Sniff the zip signature.
    #[default]
    Auto,
}

/// Cartridge bytes as fetched.
#[derive(Clone, Debug)]
pub struct RomSource {
    pub bytes: Vec<u8>,
    pub container: ContainerHint,
    pub file_name: String,
}

impl RomSource {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            container: ContainerHint::Auto,
            file_name: file_name.into(),
        }
    }

    pub fn with_container(mut self, container: ContainerHint) -> Self {
        self.container = container;
        self
    }
}

/// A validated cartridge image. Never mutated after loading.
#[derive(Clone, Debug)]
pub struct RomImage {
    bytes: Vec<u8>,
    platform: Platform,
    name: String,
    fingerprint: String,
}

impl RomImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercase SHA-1 of the image. Used as the save namespace.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Shared extension used by several handheld dumps.
const GENERIC_EXTENSION: &str = "bin";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";

const REGION_TAGS: &[&str] = &["(u)", "(usa)", "(e)", "(europe)", "(w)", "(world)", "(ue)"];

#[derive(Debug, Default, Clone, Copy)]
pub struct RomLoader;

impl RomLoader {
    /// Validates `source` into a [`RomImage`]. When `platform` is `None` it is
    /// inferred from the file (or archive entry) extension.
    pub fn load(source: RomSource, platform: Option<Platform>) -> Result<RomImage, RomError> {
        let is_zip = match source.container {
            ContainerHint::Raw => false,
            ContainerHint::Zip => true,
            ContainerHint::Auto => {
                source.bytes.starts_with(ZIP_MAGIC) || source.bytes.starts_with(ZIP_EMPTY_MAGIC)
            }
        };

        let (file_name, bytes) = if is_zip {
            extract_from_zip(&source.bytes, platform)?
        } else {
            (source.file_name, source.bytes)
        };

        if bytes.is_empty() {
            return Err(RomError::EmptyImage);
        }

        let platform = match platform {
            Some(p) => p,
            None => extension_of(&file_name)
                .and_then(|ext| Platform::from_extension(&ext))
                .ok_or_else(|| RomError::UnknownPlatform(file_name.clone()))?,
        };

        let fingerprint = fingerprint(&bytes);
        let name = Path::new(&file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file_name)
            .to_string();

        info!("name: {name}");
        info!("sha1: {fingerprint}");

        Ok(RomImage {
            bytes,
            platform,
            name,
            fingerprint,
        })
    }
}

/// Lowercase hex SHA-1 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    Sha1::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Higher is better. `None` means the entry is never a ROM candidate.
fn extension_score(name: &str, platform: Option<Platform>) -> Option<u8> {
    let ext = extension_of(name)?;
    if ext == GENERIC_EXTENSION {
        return Some(1);
    }
    let detected = Platform::from_extension(&ext)?;
    match platform {
        Some(p) if p == detected => Some(3),
        Some(_) => Some(2),
        None => Some(3),
    }
}

fn name_score(name: &str) -> u8 {
    let lower = name.to_ascii_lowercase();
    let mut score = 0;
    if lower.contains("[!]") {
        score += 2;
    }
    if REGION_TAGS.iter().any(|tag| lower.contains(tag)) {
        score += 1;
    }
    score
}

fn extract_from_zip(
    bytes: &[u8],
    platform: Option<Platform>,
) -> Result<(String, Vec<u8>), RomError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut best: Option<(usize, (u8, u8))> = None;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(ext_score) = extension_score(&name, platform) else {
            debug!("skipping archive entry {name}");
            continue;
        };
        let score = (ext_score, name_score(&name));
        // Strictly greater keeps the earliest entry on ties.
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((i, score));
        }
    }

    let (index, _) = best.ok_or(RomError::NoRomInArchive)?;
    let mut entry = archive.by_index(index)?;
    let name = entry.name().to_string();
    // The declared size comes from the archive header and is not trusted.
    let mut out = Vec::new();
    (&mut entry).take(MAX_ROM_SIZE + 1).read_to_end(&mut out)?;
    if out.len() as u64 > MAX_ROM_SIZE {
        return Err(RomError::TooLarge(name));
    }
    debug!("using archive entry {name}");
    Ok((name, out))
}
