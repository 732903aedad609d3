use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::audio::DEFAULT_DRIFT_THRESHOLD;

/// Frame rate the core emulates at, shared by the cycle budget and the audio
/// rate correction.
pub const CORE_FRAME_RATE: f64 = 59.7275;

/// Game Boy Advance master clock.
pub const GBA_CLOCK_HZ: u32 = 16_777_216;
/// Game Boy / Game Boy Color master clock.
pub const GB_CLOCK_HZ: u32 = 4_194_304;

/// Dirty-counter signals are ignored for this long after start.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(5);
/// Frames stay hidden for this long after a geometry change.
pub const DEFAULT_BORDER_SETTLE: Duration = Duration::from_millis(250);
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Console variant driven by the core.
pub enum Platform {
    Gb,
    Gbc,
    Gba,
}

impl Platform {
    pub const fn is_gba(self) -> bool {
        matches!(self, Platform::Gba)
    }

    pub const fn clock_hz(self) -> u32 {
        match self {
            Platform::Gba => GBA_CLOCK_HZ,
            Platform::Gb | Platform::Gbc => GB_CLOCK_HZ,
        }
    }

    /// Cycles emulated per display tick.
    pub fn cycles_per_frame(self) -> u32 {
        (self.clock_hz() as f64 / CORE_FRAME_RATE) as u32
    }

    /// File extensions that identify a cartridge image for this platform.
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Platform::Gba => &["gba", "agb"],
            Platform::Gb => &["gb", "sgb", "dmg"],
            Platform::Gbc => &["gbc", "cgb"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        [Platform::Gba, Platform::Gbc, Platform::Gb]
            .into_iter()
            .find(|p| p.extensions().contains(&ext.as_str()))
    }

    pub const fn type_key(self) -> &'static str {
        match self {
            Platform::Gba => "gba",
            Platform::Gbc => "gbc",
            Platform::Gb => "gb",
        }
    }

    /// Parses an application type key (`vba-m-gba`, `gbc`, ...).
    pub fn from_type_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        let key = key.strip_prefix("vba-m-").unwrap_or(&key);
        match key {
            "gba" => Some(Platform::Gba),
            "gbc" => Some(Platform::Gbc),
            "gb" => Some(Platform::Gb),
            _ => None,
        }
    }
}

/// Screen rotation in quarter turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rotation {
    quadrant: u8,
}

impl Rotation {
    pub const NONE: Rotation = Rotation { quadrant: 0 };

    pub const fn from_quadrant(quadrant: u8) -> Self {
        Self {
            quadrant: quadrant % 4,
        }
    }

    /// Returns `None` unless `degrees` is a multiple of 90.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        Some(Self::from_quadrant((degrees / 90).rem_euclid(4) as u8))
    }

    /// Parses an externally supplied rotation, logging and falling back to no
    /// rotation when the value is unusable.
    pub fn parse_or_default(raw: &str) -> Self {
        let Ok(degrees) = raw.trim().parse::<i64>() else {
            error!("rotation value is not a number: {raw}");
            return Self::NONE;
        };
        Self::from_degrees(degrees).unwrap_or_else(|| {
            error!("rotation value is not a 90 degree value: {raw}");
            Self::NONE
        })
    }

    pub const fn quadrant(self) -> u8 {
        self.quadrant
    }

    pub const fn degrees(self) -> u32 {
        self.quadrant as u32 * 90
    }

    /// Odd quadrants put the screen on its side.
    pub const fn sideways(self) -> bool {
        self.quadrant % 2 != 0
    }

    pub const fn inverse(self) -> Self {
        Self::from_quadrant(4 - self.quadrant)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Cartridge hardware hints forwarded to the core. `-1` means autodetect.
pub struct CartridgeHints {
    pub flash_size: i32,
    pub save_type: i32,
    pub rtc: bool,
    pub mirroring: bool,
}

impl Default for CartridgeHints {
    fn default() -> Self {
        Self {
            flash_size: -1,
            save_type: -1,
            rtc: false,
            mirroring: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// GB/GBC-only presentation extras.
pub struct GbExtras {
    pub hw_type: i32,
    pub colors: i32,
    pub palette: i32,
    pub border: i32,
}

impl GbExtras {
    pub const fn border_enabled(&self) -> bool {
        self.border == 1
    }
}

/// Immutable configuration of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub platform: Platform,
    pub rotation: Rotation,
    pub cartridge: CartridgeHints,
    pub gb: GbExtras,
    pub disable_lookup: bool,
    pub debug: bool,
    /// Delivered half-samples after which one stereo sample is dropped.
    /// `None` disables the correction.
    pub audio_drift_threshold: Option<u32>,
    pub warmup: Duration,
    pub border_settle: Duration,
    pub autosave_interval: Option<Duration>,
    /// Prepended to `<fingerprint>/sav` to form the storage path.
    pub storage_prefix: String,
}

impl SessionConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            rotation: Rotation::NONE,
            cartridge: CartridgeHints::default(),
            gb: GbExtras::default(),
            disable_lookup: false,
            debug: false,
            audio_drift_threshold: Some(DEFAULT_DRIFT_THRESHOLD),
            warmup: DEFAULT_WARMUP,
            border_settle: DEFAULT_BORDER_SETTLE,
            autosave_interval: Some(DEFAULT_AUTOSAVE_INTERVAL),
            storage_prefix: String::new(),
        }
    }

    pub fn cycles_per_frame(&self) -> u32 {
        self.platform.cycles_per_frame()
    }

    /// Hardware type handed to the core. Only the plain GB variant honours the
    /// configured value; GBC always runs as hardware type 1.
    pub fn effective_hw_type(&self) -> i32 {
        match self.platform {
            Platform::Gb => self.gb.hw_type,
            Platform::Gbc | Platform::Gba => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("the application type was not specified")]
    MissingType,

    #[error("unknown application type '{0}'")]
    UnknownType(String),
}

/// Externally supplied session settings, as found in a config file or on the
/// command line. Numeric values are kept as text so that malformed input can
/// be reported and skipped instead of rejecting the whole file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawSessionConfig {
    #[serde(rename = "type")]
    pub app_type: Option<String>,
    pub rotation: Option<String>,
    pub flash_size: Option<String>,
    pub save_type: Option<String>,
    pub rtc: Option<bool>,
    pub mirroring: Option<bool>,
    pub hw_type: Option<String>,
    pub colors: Option<String>,
    pub palette: Option<String>,
    pub border: Option<String>,
    pub disable_lookup: Option<bool>,
    pub debug: Option<bool>,
    /// `0` disables drift correction.
    pub audio_drift_threshold: Option<u32>,
    pub warmup_ms: Option<u64>,
    pub border_settle_ms: Option<u64>,
    /// `0` disables periodic save checks.
    pub autosave_secs: Option<u64>,
    pub storage_prefix: Option<String>,
}

impl RawSessionConfig {
    /// Fills unset fields from `other`.
    pub fn or(self, other: RawSessionConfig) -> RawSessionConfig {
        RawSessionConfig {
            app_type: self.app_type.or(other.app_type),
            rotation: self.rotation.or(other.rotation),
            flash_size: self.flash_size.or(other.flash_size),
            save_type: self.save_type.or(other.save_type),
            rtc: self.rtc.or(other.rtc),
            mirroring: self.mirroring.or(other.mirroring),
            hw_type: self.hw_type.or(other.hw_type),
            colors: self.colors.or(other.colors),
            palette: self.palette.or(other.palette),
            border: self.border.or(other.border),
            disable_lookup: self.disable_lookup.or(other.disable_lookup),
            debug: self.debug.or(other.debug),
            audio_drift_threshold: self.audio_drift_threshold.or(other.audio_drift_threshold),
            warmup_ms: self.warmup_ms.or(other.warmup_ms),
            border_settle_ms: self.border_settle_ms.or(other.border_settle_ms),
            autosave_secs: self.autosave_secs.or(other.autosave_secs),
            storage_prefix: self.storage_prefix.or(other.storage_prefix),
        }
    }

    pub fn resolve(&self) -> Result<SessionConfig, ConfigError> {
        let app_type = self.app_type.as_deref().ok_or(ConfigError::MissingType)?;
        let platform = Platform::from_type_key(app_type)
            .ok_or_else(|| ConfigError::UnknownType(app_type.to_string()))?;

        let mut config = SessionConfig::new(platform);

        if let Some(rot) = self.rotation.as_deref() {
            config.rotation = Rotation::parse_or_default(rot);
        }

        config.cartridge = CartridgeHints {
            flash_size: parse_number("flashSize", self.flash_size.as_deref(), -1),
            save_type: parse_number("saveType", self.save_type.as_deref(), -1),
            rtc: self.rtc.unwrap_or(false),
            mirroring: self.mirroring.unwrap_or(false),
        };

        config.gb = GbExtras {
            hw_type: parse_number("hwType", self.hw_type.as_deref(), 0),
            colors: parse_number("colors", self.colors.as_deref(), 0),
            palette: parse_number("palette", self.palette.as_deref(), 0),
            border: parse_number("border", self.border.as_deref(), 0),
        };
        if platform.is_gba() && config.gb.border_enabled() {
            warn!("border display is not available for GBA; ignoring");
            config.gb.border = 0;
        }

        config.disable_lookup = self.disable_lookup.unwrap_or(false);
        config.debug = self.debug.unwrap_or(false);

        if let Some(threshold) = self.audio_drift_threshold {
            config.audio_drift_threshold = (threshold > 0).then_some(threshold);
        }
        if let Some(ms) = self.warmup_ms {
            config.warmup = Duration::from_millis(ms);
        }
        if let Some(ms) = self.border_settle_ms {
            config.border_settle = Duration::from_millis(ms);
        }
        if let Some(secs) = self.autosave_secs {
            config.autosave_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(prefix) = &self.storage_prefix {
            config.storage_prefix = prefix.clone();
        }

        Ok(config)
    }
}

fn parse_number(name: &str, raw: Option<&str>, default: i32) -> i32 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<i32>() {
        Ok(v) => v,
        Err(_) => {
            error!("{name} value is not a number: {raw}");
            default
        }
    }
}
