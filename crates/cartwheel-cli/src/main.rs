mod audio;
mod config;
mod display_loop;
#[cfg(not(target_os = "android"))]
mod gamepad;
mod screenshot;

use cartwheel_session::StdStorage;
use cartwheel_session::audio::{AudioSink, NullAudioSink};
use cartwheel_session::config::{Platform, RawSessionConfig};
use cartwheel_session::ffi::FfiCoreLoader;
use cartwheel_session::input::{Controller, NullController};
use cartwheel_session::rom::RomSource;
use cartwheel_session::session::{Session, SessionState};
use cartwheel_session::storage::LocalSaveStore;
use clap::Parser;
use display_loop::DisplayLoop;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// Display refresh rate the session is ticked at.
const DISPLAY_HZ: f64 = 60.0;

#[derive(Parser, Debug)]
#[command(name = "cartwheel", version, about = "Run a GB/GBC/GBA cartridge")]
struct Args {
    /// Path to ROM file (raw image or zip archive)
    rom: PathBuf,

    /// Application type (gb, gbc, gba, vba-m-gba...). Inferred from the ROM
    /// extension when omitted.
    #[arg(long = "type")]
    app_type: Option<String>,

    /// Screen rotation in degrees (multiple of 90)
    #[arg(long)]
    rotation: Option<String>,

    #[arg(long)]
    flash_size: Option<String>,

    #[arg(long)]
    save_type: Option<String>,

    /// Cartridge has a real-time clock
    #[arg(long)]
    rtc: bool,

    #[arg(long)]
    mirroring: bool,

    /// GB hardware type
    #[arg(long)]
    hw_type: Option<String>,

    #[arg(long)]
    colors: Option<String>,

    #[arg(long)]
    palette: Option<String>,

    /// Show the GB/GBC border (0 or 1)
    #[arg(long)]
    border: Option<String>,

    /// Skip the cartridge database lookup
    #[arg(long)]
    disable_lookup: bool,

    /// Config file (defaults to the per-user cartwheel.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save directory
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Run without audio or controller, as fast as possible
    #[arg(long)]
    headless: bool,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Write the last frame to this PNG on exit
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Enable debug logging and audio statistics
    #[arg(long)]
    debug: bool,

    #[arg(long)]
    no_audio: bool,
}

impl Args {
    /// Settings given on the command line. Flags that were not passed stay
    /// unset so the config file can supply them.
    fn session_overrides(&self) -> RawSessionConfig {
        RawSessionConfig {
            app_type: self.app_type.clone(),
            rotation: self.rotation.clone(),
            flash_size: self.flash_size.clone(),
            save_type: self.save_type.clone(),
            rtc: self.rtc.then_some(true),
            mirroring: self.mirroring.then_some(true),
            hw_type: self.hw_type.clone(),
            colors: self.colors.clone(),
            palette: self.palette.clone(),
            border: self.border.clone(),
            disable_lookup: self.disable_lookup.then_some(true),
            debug: self.debug.then_some(true),
            ..RawSessionConfig::default()
        }
    }
}

/// Falls back to the ROM's extension when no type was configured.
fn type_from_path(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    Platform::from_extension(ext).map(|p| p.type_key().to_string())
}

#[cfg(not(target_os = "android"))]
fn gamepad_controller() -> Option<Box<dyn Controller>> {
    gamepad::GilrsController::new().map(|pad| Box::new(pad) as Box<dyn Controller>)
}

#[cfg(target_os = "android")]
fn gamepad_controller() -> Option<Box<dyn Controller>> {
    None
}

fn build_controller(headless: bool) -> Box<dyn Controller> {
    if headless {
        return Box::new(NullController);
    }
    gamepad_controller().unwrap_or_else(|| Box::new(NullController))
}

fn build_sink(muted: bool) -> Box<dyn AudioSink> {
    if !muted && let Some(sink) = audio::start_stream() {
        return Box::new(sink);
    }
    Box::new(NullAudioSink::default())
}

fn run(args: Args) -> Result<(), String> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let file_config = config::load_from_file(&config_path);

    let mut raw = args.session_overrides().or(file_config.session);
    if raw.app_type.is_none() {
        raw.app_type = type_from_path(&args.rom);
    }
    let session_config = raw.resolve().map_err(|e| e.to_string())?;

    let storage_dir = args
        .storage
        .clone()
        .or(file_config.storage_dir)
        .unwrap_or_else(config::default_data_dir);
    info!("saves in {}", storage_dir.display());
    let store = LocalSaveStore::new(StdStorage::new(storage_dir));

    let muted = args.headless || args.no_audio || file_config.mute;
    let mut session = Session::new(
        session_config,
        Box::new(store),
        build_sink(muted),
        build_controller(args.headless),
    );

    session
        .load_core(&mut FfiCoreLoader)
        .map_err(|e| e.to_string())?;

    let bytes = std::fs::read(&args.rom)
        .map_err(|e| format!("Failed to read {}: {e}", args.rom.display()))?;
    let file_name = args
        .rom
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    session
        .set_rom(RomSource::new(file_name, bytes))
        .map_err(|e| e.to_string())?;

    let mut display = DisplayLoop::new(DISPLAY_HZ, !args.headless);
    session.start(display.wait()).map_err(|e| e.to_string())?;

    let limit = args.seconds.map(Duration::from_secs);
    loop {
        if args.frames.is_some_and(|n| display.ticks() > n) {
            break;
        }
        if limit.is_some_and(|l| display.elapsed() >= l) {
            break;
        }
        session.tick(display.wait());
        if session.state() != SessionState::Running {
            info!("menu requested; exiting");
            break;
        }
    }

    session.stop();

    if let Some(path) = &args.screenshot {
        match session.framebuffer() {
            Some(frame) => screenshot::write_png(path, frame)
                .map_err(|e| format!("Failed to write {}: {e}", path.display()))?,
            None => error!("no frame to capture"),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_defer_to_the_config_file() {
        let args = Args::parse_from(["cartwheel", "game.gba", "--rotation", "90"]);
        let file = RawSessionConfig {
            rotation: Some("180".into()),
            rtc: Some(true),
            flash_size: Some("65536".into()),
            ..RawSessionConfig::default()
        };
        let merged = args.session_overrides().or(file);
        assert_eq!(merged.rotation.as_deref(), Some("90"));
        assert_eq!(merged.rtc, Some(true));
        assert_eq!(merged.flash_size.as_deref(), Some("65536"));
        assert_eq!(merged.app_type, None);
    }

    #[test]
    fn type_is_inferred_from_the_extension() {
        assert_eq!(type_from_path(Path::new("x/Game.GBA")), Some("gba".into()));
        assert_eq!(type_from_path(Path::new("pokemon.gbc")), Some("gbc".into()));
        assert_eq!(type_from_path(Path::new("game.zip")), None);
        assert_eq!(type_from_path(Path::new("noext")), None);
    }

    #[test]
    fn flags_parse() {
        let args = Args::parse_from([
            "cartwheel",
            "rom.gb",
            "--type",
            "vba-m-gb",
            "--border",
            "1",
            "--headless",
            "--frames",
            "120",
        ]);
        let raw = args.session_overrides();
        assert_eq!(raw.app_type.as_deref(), Some("vba-m-gb"));
        assert_eq!(raw.border.as_deref(), Some("1"));
        let session = raw.resolve().unwrap();
        assert_eq!(session.platform, Platform::Gb);
        assert!(session.gb.border_enabled());
        assert!(args.headless);
        assert_eq!(args.frames, Some(120));
    }
}
