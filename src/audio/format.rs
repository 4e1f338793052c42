use anyhow::{anyhow, Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::capture::AudioEncoding;

/// Detect the container/codec from signature bytes.
///
/// The file extension is a hint only; callers that verify audio must trust
/// this sniff, not the name, because the capture device's negotiated format
/// can legitimately differ from what the extension suggests.
pub fn detect(bytes: &[u8]) -> Option<AudioEncoding> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(AudioEncoding::Wav);
    }
    if bytes.len() >= 4 && &bytes[0..4] == b"fLaC" {
        return Some(AudioEncoding::Flac);
    }
    if bytes.len() >= 4 && &bytes[0..4] == b"OggS" {
        return Some(AudioEncoding::Ogg);
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(AudioEncoding::M4a);
    }
    if bytes.len() >= 3 && &bytes[0..3] == b"ID3" {
        return Some(AudioEncoding::Mp3);
    }
    // Bare MPEG audio frame sync (no ID3 header)
    if bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0 {
        return Some(AudioEncoding::Mp3);
    }
    None
}

/// Fully decoded audio: interleaved 16-bit PCM plus stream parameters
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Decode an in-memory audio file to interleaved PCM.
///
/// Fails on anything symphonia cannot probe or cleanly decode, which makes
/// this double as the integrity check for promoted and migrated files.
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio> {
    let source = std::io::Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    // Hint the probe with the sniffed container, never the file name
    let mut hint = Hint::new();
    if let Some(encoding) = detect(bytes) {
        hint.with_extension(encoding.extension());
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No decodable audio track"))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported audio codec")?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(anyhow!("Failed to read audio packet: {err}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|err| anyhow!("Failed to decode audio: {err}"))?;

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(anyhow!("Audio stream contains no samples"));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Encode PCM to the canonical WAV container, in memory.
pub fn encode_wav(audio: &DecodedAudio) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
    for &sample in &audio.samples {
        writer
            .write_sample(sample)
            .context("Failed to write sample to WAV")?;
    }
    writer.finalize().context("Failed to finalize WAV data")?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(duration_secs: f64, sample_rate: u32) -> DecodedAudio {
        let count = (duration_secs * sample_rate as f64) as usize;
        let samples = (0..count)
            .map(|i| ((i % 100) as i16 - 50) * 100)
            .collect();
        DecodedAudio {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    #[test]
    fn detect_recognizes_wav_signature() {
        let bytes = encode_wav(&tone(0.1, 16000)).unwrap();
        assert_eq!(detect(&bytes), Some(AudioEncoding::Wav));
    }

    #[test]
    fn detect_ignores_extension_lookalikes() {
        // Plain text is not audio no matter what a file is named
        assert_eq!(detect(b"not audio at all"), None);
        assert_eq!(detect(b""), None);
    }

    #[test]
    fn detect_recognizes_other_signatures() {
        assert_eq!(detect(b"fLaC\x00\x00\x00\x22rest"), Some(AudioEncoding::Flac));
        assert_eq!(detect(b"OggS\x00\x02more-bytes"), Some(AudioEncoding::Ogg));
        assert_eq!(
            detect(b"\x00\x00\x00\x20ftypM4A \x00\x00"),
            Some(AudioEncoding::M4a)
        );
        assert_eq!(detect(b"ID3\x04\x00\x00\x00\x00\x00\x00"), Some(AudioEncoding::Mp3));
    }

    #[test]
    fn decode_round_trips_wav() {
        let original = tone(0.5, 16000);
        let bytes = encode_wav(&original).unwrap();

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), original.samples.len());
        assert!((decoded.duration_secs() - 0.5).abs() < 0.01);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"definitely not an audio file").is_err());
    }

    #[test]
    fn decode_rejects_header_without_samples() {
        let bytes = encode_wav(&tone(0.5, 16000)).unwrap();
        assert!(decode(&bytes[..12]).is_err());
    }
}
