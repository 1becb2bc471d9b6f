//! Base64 transport encoding for audio payloads
//!
//! Outbound recordings and inbound synthesized speech both travel as
//! standard padded base64 inside JSON bodies.

use super::EncodedAudio;
use crate::error::AudioError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode a finished recording as transport text
///
/// Consumes the recording. Empty recordings cannot be sent.
pub fn encode(audio: EncodedAudio) -> Result<String, AudioError> {
    if audio.is_empty() {
        return Err(AudioError::CodecReadError(
            "recording contains no audio".to_string(),
        ));
    }
    Ok(bytes_to_base64(audio.bytes()))
}

/// Base64-encode raw bytes without line breaks
pub fn bytes_to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode transport text back to bytes
///
/// A leading `data:<mime>;base64,` header is ignored.
pub fn base64_to_bytes(text: &str) -> Result<Vec<u8>, AudioError> {
    Ok(STANDARD.decode(strip_data_url_prefix(text.trim()))?)
}

/// Drop a data URL header, leaving only the payload
pub fn strip_data_url_prefix(text: &str) -> &str {
    if !text.starts_with("data:") {
        return text;
    }
    match text.split_once(',') {
        Some((_, payload)) => payload,
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let inputs: [&[u8]; 4] = [b"", b"\x00", b"\xff\xfe\xfd", b"RIFF\x24\x00\x00\x00WAVE"];
        for input in inputs {
            assert_eq!(base64_to_bytes(&bytes_to_base64(input)).unwrap(), input);
        }
    }

    #[test]
    fn test_no_whitespace() {
        let bytes = vec![0xabu8; 4096];
        let text = bytes_to_base64(&bytes);
        assert!(!text.contains('\n'));
        assert!(!text.contains(' '));
    }

    #[test]
    fn test_strips_data_url() {
        assert_eq!(strip_data_url_prefix("data:audio/wav;base64,AAEC"), "AAEC");
        assert_eq!(strip_data_url_prefix("AAEC"), "AAEC");
        assert_eq!(
            base64_to_bytes("data:audio/webm;base64,AAEC").unwrap(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_invalid_text() {
        assert!(matches!(
            base64_to_bytes("not*base64"),
            Err(AudioError::InvalidTransportText(_))
        ));
    }

    #[test]
    fn test_encode_recording() {
        let audio = EncodedAudio::new("audio/wav", vec![1, 2, 3]);
        assert_eq!(encode(audio).unwrap(), "AQID");
    }

    #[test]
    fn test_encode_empty_recording_fails() {
        let audio = EncodedAudio::new("audio/wav", Vec::new());
        assert!(matches!(encode(audio), Err(AudioError::CodecReadError(_))));
    }
}
