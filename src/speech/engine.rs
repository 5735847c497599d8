//! Text-to-speech collaborator interface and decoded audio

use std::io::Cursor;
use std::time::Duration;

/// Errors from speech synthesis and playback
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),

    #[error("speech engine failed: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode synthesized audio: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported sample width: {0} bits")]
    UnsupportedFormat(u16),

    #[error("playback thread panicked")]
    PlaybackPanicked,
}

/// One entry of the phoneme timeline for an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonemeEvent {
    pub symbol: String,
}

/// A speech synthesizer and audio output device.
///
/// Playback calls block until the audio has finished or `stop` is called
/// from another thread.
pub trait SpeechEngine: Send + Sync {
    /// Voices that can be passed to the other methods
    fn voices(&self) -> Vec<String>;

    /// Phoneme breakdown of `text`
    fn phonemes(&self, text: &str, voice: &str) -> Result<Vec<PhonemeEvent>, SpeechError>;

    /// Speak `text` directly on the output device
    fn play(&self, text: &str, voice: &str) -> Result<(), SpeechError>;

    /// Render `text` to an in-memory WAV file
    fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError>;

    /// Play a WAV file produced by `synthesize`
    fn play_wav(&self, wav: &[u8]) -> Result<(), SpeechError>;

    /// Interrupt whatever is playing
    fn stop(&self) {}
}

/// Interleaved 16-bit PCM samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Decode a 16-bit WAV file.
    ///
    /// Streaming synthesizers (espeak-ng writing to a pipe) leave placeholder
    /// RIFF and data lengths in the header; those are cut down to the bytes
    /// actually present before decoding.
    pub fn from_wav(bytes: &[u8]) -> Result<Self, SpeechError> {
        let bytes = fit_chunk_lengths(bytes);
        let mut reader = hound::WavReader::new(Cursor::new(bytes.as_slice()))?;
        let spec = reader.spec();

        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(SpeechError::UnsupportedFormat(spec.bits_per_sample));
        }

        let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            samples,
            channels: spec.channels.max(1),
            sample_rate: spec.sample_rate,
        })
    }

    /// Samples per window holding `frames` frames across all channels
    pub fn window_len(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }

    /// Real-time duration of `samples` interleaved samples
    pub fn duration_of(&self, samples: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = samples as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }

}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let field = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Copy of a RIFF/WAVE file whose RIFF and `data` lengths do not claim more
/// bytes than the buffer holds. The data length is rounded down to whole
/// frames. Anything that is not RIFF/WAVE is passed through for hound to
/// reject.
fn fit_chunk_lengths(bytes: &[u8]) -> Vec<u8> {
    let mut fixed = bytes.to_vec();
    if fixed.len() < 12 || &fixed[0..4] != b"RIFF" || &fixed[8..12] != b"WAVE" {
        return fixed;
    }

    let total = fixed.len();
    if read_u32(&fixed, 4).is_some_and(|len| len as usize > total - 8) {
        write_u32(&mut fixed, 4, (total - 8) as u32);
    }

    let mut block_align = 2usize;
    let mut at = 12;
    while let Some(len) = read_u32(&fixed, at + 4) {
        let body = at + 8;
        let available = total - body;

        let mut id = [0u8; 4];
        id.copy_from_slice(&fixed[at..at + 4]);

        match &id {
            b"fmt " => {
                if let Some(align) = fixed.get(body + 12..body + 14) {
                    block_align = (u16::from_le_bytes([align[0], align[1]]) as usize).max(1);
                }
            }
            b"data" => {
                if len as usize > available {
                    let whole = available - available % block_align;
                    write_u32(&mut fixed, at + 4, whole as u32);
                }
                break;
            }
            _ => {}
        }

        // chunks are padded to an even length
        let next = body.saturating_add(len as usize + (len as usize & 1));
        if next >= total {
            break;
        }
        at = next;
    }

    fixed
}


#[cfg(test)]
mod tests {
    use super::testing::wav_bytes;
    use super::*;

    #[test]
    fn test_decode_wav() {
        let pcm = PcmBuffer::from_wav(&wav_bytes(&[0, 100, -100, 32000], 8000)).unwrap();
        assert_eq!(pcm.samples, vec![0, 100, -100, 32000]);
        assert_eq!(pcm.channels, 1);
        assert_eq!(pcm.sample_rate, 8000);
    }

    #[test]
    fn test_truncated_wav_keeps_decoded_samples() {
        let mut bytes = wav_bytes(&[1, 2, 3, 4], 8000);
        bytes.truncate(bytes.len() - 4);

        let pcm = PcmBuffer::from_wav(&bytes).unwrap();
        assert_eq!(pcm.samples, vec![1, 2]);
    }

    /// Header as espeak-ng leaves it when `--stdout` is a pipe
    fn with_streaming_placeholders(mut bytes: Vec<u8>) -> Vec<u8> {
        write_u32(&mut bytes, 4, 0x7fff_f024);
        let data = bytes.windows(4).position(|w| w == b"data").unwrap();
        write_u32(&mut bytes, data + 4, 0x7fff_f000);
        bytes
    }

    #[test]
    fn test_streamed_wav_header_is_decoded() {
        let bytes = with_streaming_placeholders(wav_bytes(&[0, 100, -100, 32000], 22_050));

        let pcm = PcmBuffer::from_wav(&bytes).unwrap();
        assert_eq!(pcm.samples, vec![0, 100, -100, 32000]);
        assert_eq!(pcm.sample_rate, 22_050);
    }

    #[test]
    fn test_streamed_wav_with_partial_sample() {
        let mut bytes = with_streaming_placeholders(wav_bytes(&[7, 8, 9], 16_000));
        bytes.pop();

        let pcm = PcmBuffer::from_wav(&bytes).unwrap();
        assert_eq!(pcm.samples, vec![7, 8]);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(PcmBuffer::from_wav(b"definitely not a wav").is_err());
    }

    #[test]
    fn test_durations() {
        let pcm = PcmBuffer {
            samples: vec![0; 32_000],
            channels: 2,
            sample_rate: 16_000,
        };
        assert_eq!(pcm.window_len(1024), 2048);
        assert_eq!(pcm.duration_of(pcm.samples.len()), Duration::from_secs(1));
        assert_eq!(pcm.duration_of(3200), Duration::from_millis(100));
    }
}
