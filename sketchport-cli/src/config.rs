//! Configuration file support for sketchport.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SKETCHPORT_*)
//! 3. Local config file (./sketchport.toml)
//! 4. Global config file (~/.config/sketchport/config.toml)

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// USB device identification for port matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub port: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Upload tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Chunk size in bytes.
    pub chunk_size: Option<usize>,
    /// Pacing delay between chunks, in milliseconds.
    pub chunk_delay_ms: Option<u64>,
    /// Baud rate declared in the generated sketch envelope.
    pub sketch_baud: Option<u32>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Upload settings.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Remembered USB devices treated as known boards.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

const LOCAL_CONFIG: &str = "sketchport.toml";

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Global first, so the local file overrides it
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Some(global_config) = Self::load_from_file(&global_path) {
                    debug!("Loaded global config from {}", global_path.display());
                    config.merge(global_config);
                }
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sketchport").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one, the other taking precedence.
    fn merge(&mut self, other: Self) {
        if other.connection.port.is_some() {
            self.connection.port = other.connection.port;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.upload.chunk_size.is_some() {
            self.upload.chunk_size = other.upload.chunk_size;
        }
        if other.upload.chunk_delay_ms.is_some() {
            self.upload.chunk_delay_ms = other.upload.chunk_delay_ms;
        }
        if other.upload.sketch_baud.is_some() {
            self.upload.sketch_baud = other.upload.sketch_baud;
        }
        self.usb_device.extend(other.usb_device);
    }

    /// Save a USB device for future auto-detection.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        let device = UsbDevice { vid, pid };

        // Don't add duplicates
        if self.usb_device.contains(&device) {
            return Ok(());
        }

        // A local config keeps the device project-scoped; otherwise global
        let path = if Path::new(LOCAL_CONFIG).exists() {
            PathBuf::from(LOCAL_CONFIG)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("config.toml")
        } else {
            PathBuf::from(LOCAL_CONFIG)
        };

        self.usb_device.push(device);

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        info!("Saved USB device to {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.upload.chunk_size.is_none());
        assert!(config.usb_device.is_empty());
    }

    #[test]
    fn test_usb_device_matches() {
        let device = UsbDevice { vid: 0x2341, pid: 0x0043 };
        assert!(device.matches(0x2341, 0x0043));
        assert!(!device.matches(0x2341, 0x0042));
        assert!(!device.matches(0x2A03, 0x0043));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [connection]
            port = "/dev/ttyACM0"
            baud = 115200

            [upload]
            chunk_size = 32
            chunk_delay_ms = 25
            sketch_baud = 9600

            [[usb_device]]
            vid = 0x2341
            pid = 0x0043
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.connection.baud, Some(115200));
        assert_eq!(config.upload.chunk_size, Some(32));
        assert_eq!(config.upload.chunk_delay_ms, Some(25));
        assert_eq!(config.usb_device.len(), 1);
        assert!(config.usb_device[0].matches(0x2341, 0x0043));
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str("[connection]\nbaud = 57600\n").unwrap();
        assert_eq!(config.connection.baud, Some(57600));
        assert!(config.connection.port.is_none());
        assert!(config.usb_device.is_empty());
    }

    #[test]
    fn test_merge_overrides_and_extends() {
        let mut base: Config = toml::from_str(
            "[connection]\nport = \"/dev/ttyUSB0\"\nbaud = 9600\n[[usb_device]]\nvid = 1\npid = 2\n",
        )
        .unwrap();
        let overlay: Config =
            toml::from_str("[connection]\nbaud = 115200\n[[usb_device]]\nvid = 3\npid = 4\n")
                .unwrap();

        base.merge(overlay);

        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.connection.baud, Some(115200));
        assert_eq!(base.usb_device.len(), 2);
    }

    #[test]
    fn test_load_from_missing_path_uses_defaults() {
        let config = Config::load_from_path(Path::new("/nonexistent/sketchport.toml"));
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_roundtrip_serialization() {
        let mut config = Config::default();
        config.connection.port = Some("COM7".to_string());
        config.usb_device.push(UsbDevice { vid: 0x1A86, pid: 0x7523 });

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.connection.port.as_deref(), Some("COM7"));
        assert_eq!(parsed.usb_device, config.usb_device);
    }
}
