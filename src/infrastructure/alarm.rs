use crate::infrastructure::error::InfraError;
use std::io::Write;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::Mutex;

/// Plays the end-of-session alarm. Callers treat failures as non-fatal.
pub trait AlarmPlayer: Send + Sync {
    fn play(&self, sound: &str, volume: u32) -> Result<(), InfraError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlarm;

impl AlarmPlayer for SilentAlarm {
    fn play(&self, sound: &str, _volume: u32) -> Result<(), InfraError> {
        log::debug!("alarm '{sound}' suppressed");
        Ok(())
    }
}

/// Rings the terminal bell on stderr; used when the `audio` feature is off.
/// Stdout carries command output only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBellAlarm;

impl TerminalBellAlarm {
    fn ring<W: Write>(out: &mut W, volume: u32) -> Result<(), InfraError> {
        if volume == 0 {
            return Ok(());
        }
        out.write_all(b"\x07")
            .and_then(|_| out.flush())
            .map_err(|error| InfraError::Alarm(error.to_string()))
    }
}

impl AlarmPlayer for TerminalBellAlarm {
    fn play(&self, _sound: &str, volume: u32) -> Result<(), InfraError> {
        Self::ring(&mut std::io::stderr().lock(), volume)
    }
}

/// Records requested alarms instead of playing them.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingAlarm {
    played: Mutex<Vec<String>>,
    fail: bool,
}

#[cfg(test)]
impl RecordingAlarm {
    pub fn failing() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played
            .lock()
            .map(|played| played.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl AlarmPlayer for RecordingAlarm {
    fn play(&self, sound: &str, _volume: u32) -> Result<(), InfraError> {
        if let Ok(mut played) = self.played.lock() {
            played.push(sound.to_string());
        }
        if self.fail {
            return Err(InfraError::Alarm("no audio device".to_string()));
        }
        Ok(())
    }
}

/// Decodes `<sound_dir>/<sound>.{wav,mp3,ogg,flac}` on a dedicated thread, falling
/// back to a short synthesized chime when no file matches.
#[cfg(feature = "audio")]
#[derive(Debug, Clone, Default)]
pub struct RodioAlarm {
    sound_dir: Option<PathBuf>,
}

#[cfg(feature = "audio")]
impl RodioAlarm {
    pub fn new(sound_dir: Option<PathBuf>) -> Self {
        Self { sound_dir }
    }

    fn play_blocking(path: Option<PathBuf>, volume: f32) -> Result<(), String> {
        use rodio::{Decoder, OutputStream, Sink, Source};
        use std::time::Duration;

        let (_stream, handle) = OutputStream::try_default()
            .map_err(|error| format!("failed to open audio output: {error}"))?;
        let sink =
            Sink::try_new(&handle).map_err(|error| format!("failed to create audio sink: {error}"))?;
        sink.set_volume(volume);

        match path {
            Some(path) => {
                let file = std::fs::File::open(&path)
                    .map_err(|error| format!("failed to open {}: {error}", path.display()))?;
                let source = Decoder::new(std::io::BufReader::new(file))
                    .map_err(|error| format!("failed to decode {}: {error}", path.display()))?;
                sink.append(source);
            }
            None => {
                for frequency in [880.0_f32, 660.0, 880.0] {
                    sink.append(
                        rodio::source::SineWave::new(frequency)
                            .take_duration(Duration::from_millis(250))
                            .amplify(0.4),
                    );
                }
            }
        }
        sink.sleep_until_end();
        Ok(())
    }
}

#[cfg(feature = "audio")]
impl AlarmPlayer for RodioAlarm {
    fn play(&self, sound: &str, volume: u32) -> Result<(), InfraError> {
        let path = resolve_sound_file(self.sound_dir.as_deref(), sound);
        let volume = volume.min(100) as f32 / 100.0;
        std::thread::Builder::new()
            .name("alarm".to_string())
            .spawn(move || {
                if let Err(error) = Self::play_blocking(path, volume) {
                    log::warn!("alarm playback failed: {error}");
                }
            })
            .map(|_| ())
            .map_err(|error| InfraError::Alarm(error.to_string()))
    }
}

const SOUND_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "flac"];

pub fn resolve_sound_file(sound_dir: Option<&std::path::Path>, sound: &str) -> Option<PathBuf> {
    let dir = sound_dir?;
    let name = sound.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return None;
    }
    SOUND_EXTENSIONS
        .iter()
        .map(|extension| dir.join(format!("{name}.{extension}")))
        .find(|candidate| candidate.is_file())
}

/// The alarm matching this build and the user's settings.
pub fn default_alarm(enabled: bool, sound_dir: Option<PathBuf>) -> Box<dyn AlarmPlayer> {
    if !enabled {
        return Box::new(SilentAlarm);
    }
    #[cfg(feature = "audio")]
    {
        Box::new(RodioAlarm::new(sound_dir))
    }
    #[cfg(not(feature = "audio"))]
    {
        let _ = sound_dir;
        Box::new(TerminalBellAlarm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn recording_alarm_tracks_sounds_even_when_failing() {
        let alarm = RecordingAlarm::failing();
        assert!(alarm.play("bell", 50).is_err());
        assert_eq!(alarm.played(), vec!["bell".to_string()]);
    }

    #[test]
    fn sound_names_cannot_escape_the_sound_dir() {
        let dir = std::env::temp_dir().join(format!("pomotrack-alarm-tests-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create dir");
        fs::write(dir.join("chime.wav"), b"RIFF").expect("write sound");

        assert_eq!(
            resolve_sound_file(Some(dir.as_path()), "chime"),
            Some(dir.join("chime.wav"))
        );
        assert_eq!(resolve_sound_file(Some(dir.as_path()), "../chime"), None);
        assert_eq!(resolve_sound_file(Some(dir.as_path()), "missing"), None);
        assert_eq!(resolve_sound_file(None, "chime"), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn terminal_bell_writes_only_the_bell_byte_and_respects_mute() {
        let mut out = Vec::new();
        TerminalBellAlarm::ring(&mut out, 40).expect("ring");
        assert_eq!(out, b"\x07");

        let mut muted = Vec::new();
        TerminalBellAlarm::ring(&mut muted, 0).expect("muted");
        assert!(muted.is_empty());

        assert!(TerminalBellAlarm.play("bell", 0).is_ok());
    }
}
