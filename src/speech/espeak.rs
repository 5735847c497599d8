//! `SpeechEngine` backed by the espeak-ng command line and an external
//! WAV player

use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::engine::{PhonemeEvent, SpeechEngine, SpeechError};

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Words per minute, matching the assistant's original speaking rate
const SPEAKING_RATE: &str = "150";

/// Separator requested between phoneme mnemonics inside a word
const PHONEME_SEPARATOR: char = '_';

pub struct EspeakEngine {
    binary: String,
    player: Vec<String>,
    /// Process currently producing audio, so `stop` can kill it
    current: Mutex<Option<Child>>,
}

impl EspeakEngine {
    /// Check that espeak runs at all.
    ///
    /// Failure here means the assistant cannot talk and must not start.
    pub fn detect(binary: &str, player: &[String]) -> Result<Self, SpeechError> {
        if player.is_empty() {
            return Err(SpeechError::Unavailable("no audio player configured".to_string()));
        }

        let output = Command::new(binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SpeechError::Unavailable(format!("{}: {}", binary, e)))?;

        if !output.status.success() {
            return Err(SpeechError::Unavailable(format!(
                "{} --version exited with {}",
                binary, output.status
            )));
        }

        info!(
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "speech engine ready"
        );

        Ok(Self {
            binary: binary.to_string(),
            player: player.to_vec(),
            current: Mutex::new(None),
        })
    }

    fn espeak(&self, voice: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-v", voice, "-s", SPEAKING_RATE]);
        cmd
    }

    /// Run `cmd` to completion while keeping it killable from `stop`
    fn run_tracked(&self, mut cmd: Command, stdin: Option<&[u8]>) -> Result<(), SpeechError> {
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd.spawn()?;
        let input = child.stdin.take();
        *self.lock_current() = Some(child);

        if let (Some(mut pipe), Some(bytes)) = (input, stdin) {
            // Write errors surface through the exit status below
            if let Err(e) = pipe.write_all(bytes) {
                debug!(error = %e, "player closed its input early");
            }
        }

        loop {
            {
                let mut current = self.lock_current();
                let Some(child) = current.as_mut() else {
                    return Ok(());
                };
                if let Some(status) = child.try_wait()? {
                    *current = None;
                    if status.success() {
                        return Ok(());
                    }
                    return Err(SpeechError::Engine(format!("audio process exited with {}", status)));
                }
            }
            thread::sleep(CHILD_POLL_INTERVAL);
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Child>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SpeechEngine for EspeakEngine {
    fn voices(&self) -> Vec<String> {
        let output = match Command::new(&self.binary).arg("--voices").output() {
            Ok(output) if output.status.success() => output,
            _ => return Vec::new(),
        };

        parse_voice_list(&String::from_utf8_lossy(&output.stdout))
    }

    fn phonemes(&self, text: &str, voice: &str) -> Result<Vec<PhonemeEvent>, SpeechError> {
        let output = self
            .espeak(voice)
            .args(["-q", "-x"])
            .arg(format!("--sep={}", PHONEME_SEPARATOR))
            .arg(text)
            .output()?;
        if !output.status.success() {
            return Err(SpeechError::Engine(format!(
                "phoneme extraction exited with {}",
                output.status
            )));
        }

        Ok(parse_phonemes(&String::from_utf8_lossy(&output.stdout)))
    }

    fn play(&self, text: &str, voice: &str) -> Result<(), SpeechError> {
        let mut cmd = self.espeak(voice);
        cmd.arg(text);
        self.run_tracked(cmd, None)
    }

    fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError> {
        let output = self.espeak(voice).arg("--stdout").arg(text).output()?;
        if !output.status.success() {
            return Err(SpeechError::Engine(format!("synthesis exited with {}", output.status)));
        }
        Ok(output.stdout)
    }

    fn play_wav(&self, wav: &[u8]) -> Result<(), SpeechError> {
        let mut cmd = Command::new(&self.player[0]);
        cmd.args(&self.player[1..]);
        self.run_tracked(cmd, Some(wav))
    }

    fn stop(&self) {
        if let Some(child) = self.lock_current().as_mut() {
            debug!(pid = child.id(), "killing audio process");
            let _ = child.kill();
        }
    }
}

/// Language codes from `espeak-ng --voices` (second column, header skipped)
fn parse_voice_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// One event per phoneme of `espeak -x --sep=_` output.
///
/// Stress and pause marks are not phonemes; a mark glued to a phoneme
/// stays part of it.
fn parse_phonemes(mnemonics: &str) -> Vec<PhonemeEvent> {
    mnemonics
        .split_whitespace()
        .flat_map(|word| word.split(PHONEME_SEPARATOR))
        .filter(|symbol| symbol.chars().any(|c| c.is_alphanumeric() || c == '@'))
        .map(|symbol| PhonemeEvent {
            symbol: symbol.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voice_list() {
        let listing = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  hi              --/M      Hindi              inc/hi
";
        assert_eq!(parse_voice_list(listing), vec!["af", "en-us", "hi"]);
    }

    #[test]
    fn test_parse_phonemes() {
        let events = parse_phonemes(" h_@_l_'oU w_'3:_l_d\n");
        let symbols: Vec<_> = events.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["h", "@", "l", "'oU", "w", "'3:", "l", "d"]);
    }

    #[test]
    fn test_parse_phonemes_skips_bare_marks() {
        let events = parse_phonemes("_:_ h_'_aI ,");
        let symbols: Vec<_> = events.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["h", "aI"]);
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let result = EspeakEngine::detect("/nonexistent/espeak-ng", &["aplay".to_string()]);
        assert!(matches!(result, Err(SpeechError::Unavailable(_))));
    }

    #[test]
    fn test_missing_player_is_unavailable() {
        let result = EspeakEngine::detect("espeak-ng", &[]);
        assert!(matches!(result, Err(SpeechError::Unavailable(_))));
    }
}
