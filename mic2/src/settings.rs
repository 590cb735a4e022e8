use anyhow::{Context, Result};
#[cfg(feature = "audio")]
use mic2_audio::CaptureOptions;
use mic2_usb::gps::GpsOptions;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

const AUDIO_READ_CHUNK: usize = 4096;
const AUDIO_CHANNELS: u16 = 1;

/// Tunables for talking to the device, stored as JSON. Every field is kept whichever features
/// are enabled, so one file serves any build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub usb_timeout_ms: u64,
    pub gps_read_chunk: usize,
    pub gps_idle_backoff_ms: u64,
    pub audio_read_chunk: usize,
    pub audio_channels: u16,
}

impl Default for Settings {
    fn default() -> Self {
        let gps = GpsOptions::default();

        Self {
            usb_timeout_ms: 1000,
            gps_read_chunk: gps.read_chunk,
            gps_idle_backoff_ms: gps.idle_backoff.as_millis() as u64,
            audio_read_chunk: AUDIO_READ_CHUNK,
            audio_channels: AUDIO_CHANNELS,
        }
    }
}

impl Settings {
    pub fn read(path: &Path) -> Result<Settings> {
        match File::open(path) {
            Ok(reader) => serde_json::from_reader(reader).context(format!(
                "Could not parse MIC2 settings file at {}",
                path.to_string_lossy()
            )),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(error) => Err(error).context(format!(
                "Could not open MIC2 settings file for reading at {}",
                path.to_string_lossy()
            )),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if let Err(e) = create_dir_all(parent) {
                if e.kind() != ErrorKind::AlreadyExists {
                    return Err(e).context(format!(
                        "Could not create settings directory at {}",
                        parent.to_string_lossy()
                    ));
                }
            }
        }
        let writer = File::create(path).context(format!(
            "Could not open MIC2 settings file for writing at {}",
            path.to_string_lossy()
        ))?;
        serde_json::to_writer_pretty(writer, self).context(format!(
            "Could not write to MIC2 settings file at {}",
            path.to_string_lossy()
        ))?;
        Ok(())
    }

    pub fn usb_timeout(&self) -> Duration {
        Duration::from_millis(self.usb_timeout_ms)
    }

    pub fn gps_options(&self) -> GpsOptions {
        GpsOptions {
            read_chunk: self.gps_read_chunk.max(1),
            idle_backoff: Duration::from_millis(self.gps_idle_backoff_ms),
        }
    }

    #[cfg(feature = "audio")]
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            channels: self.audio_channels.max(1),
            read_chunk: self.audio_read_chunk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let settings = Settings::read(&directory.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.usb_timeout(), Duration::from_secs(1));
        assert_eq!(settings.gps_options().read_chunk, 1024);
    }

    #[cfg(feature = "audio")]
    #[test]
    fn audio_defaults_match_the_capture_pipeline() {
        let settings = Settings::default();
        assert_eq!(settings.capture_options(), CaptureOptions::default());
    }

    #[test]
    fn written_settings_read_back() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("nested").join("settings.json");

        let settings = Settings {
            usb_timeout_ms: 250,
            audio_channels: 2,
            ..Default::default()
        };
        settings.write(&path).unwrap();
        assert_eq!(Settings::read(&path).unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.json");
        std::fs::write(&path, r#"{ "gps_idle_backoff_ms": 25 }"#).unwrap();

        let settings = Settings::read(&path).unwrap();
        assert_eq!(settings.gps_options().idle_backoff, Duration::from_millis(25));
        assert_eq!(settings.usb_timeout_ms, 1000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Settings::read(&path).is_err());
    }
}
