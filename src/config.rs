use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

const CONFIG_PATH: &str = "vaporsync.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.sections.clear();

        let mut current_section: Option<String> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Section header: [SectionName]
            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                let name = &line[1..line.len() - 1];
                let section = name.trim().to_string();
                current_section = Some(section.clone());
                self.sections.entry(section).or_default();
                continue;
            }

            // Key/value pair: key=value
            if let Some(eq_idx) = line.find('=') {
                let (key_raw, value_raw) = line.split_at(eq_idx);
                let key = key_raw.trim();
                if key.is_empty() {
                    continue;
                }
                // Skip '=' and trim whitespace from the value.
                let value = value_raw[1..].trim().to_string();
                let section = current_section.clone().unwrap_or_default();
                self.sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value);
            }
        }

        Ok(())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    /// Fixed simulation rate of the headless run loop, in ticks per second.
    pub tick_hz: u32,
    /// Seed for the stage's injected RNG; a run is replayable from it.
    pub seed: u64,
    /// Optional path to a JSON stage script; the built-in stage runs when
    /// this is unset.
    pub stage_script: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self { log_level: LogLevel::Info, tick_hz: 120, seed: 1, stage_script: None }
    }
}

// Global, mutable configuration instance.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    let default = Config::default();

    let mut content = String::new();
    content.push_str("[Options]\n");
    content.push_str(&format!("LogLevel = {}\n", default.log_level.as_str()));
    content.push_str(&format!("TickRate = {}\n", default.tick_hz));
    content.push_str(&format!("Seed = {}\n", default.seed));
    content.push_str("StageScript = \n");

    std::fs::write(CONFIG_PATH, content)
}

pub fn load() {
    if !std::path::Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(CONFIG_PATH) {
        Ok(()) => {
            // Populate the global CONFIG struct from the file, using default
            // values for any missing or malformed keys.
            let mut cfg = CONFIG.lock().unwrap();
            let default = Config::default();

            cfg.log_level = conf
                .get("Options", "LogLevel")
                .and_then(|v| LogLevel::from_str(&v).ok())
                .unwrap_or(default.log_level);
            cfg.tick_hz = conf
                .get("Options", "TickRate")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|&hz| hz > 0)
                .unwrap_or(default.tick_hz);
            cfg.seed = conf
                .get("Options", "Seed")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default.seed);
            cfg.stage_script = conf
                .get("Options", "StageScript")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        Err(e) => {
            warn!("Could not load '{CONFIG_PATH}': {e}. Using default settings.");
        }
    }
}

pub fn get() -> Config {
    CONFIG.lock().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ini_reader_handles_sections_comments_and_whitespace() {
        let dir = std::env::temp_dir().join("vaporsync-config-test");
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("sample.ini");
        std::fs::write(
            &path,
            "; comment\n[Options]\nLogLevel = debug\n  TickRate=240\n\n# another\nSeed = 99\n",
        )
        .expect("write sample");

        let mut ini = SimpleIni::new();
        ini.load(&path).expect("parse sample");
        assert_eq!(ini.get("Options", "LogLevel").as_deref(), Some("debug"));
        assert_eq!(ini.get("Options", "TickRate").as_deref(), Some("240"));
        assert_eq!(ini.get("Options", "Seed").as_deref(), Some("99"));
        assert_eq!(ini.get("Options", "Missing"), None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn log_level_round_trips_through_strings() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(LogLevel::from_str(level.as_str()), Ok(level));
        }
        assert!(LogLevel::from_str("verbose").is_err());
    }
}
