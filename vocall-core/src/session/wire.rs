//! JSON envelopes exchanged with the live voice service.
//!
//! ```text
//! client → {"setup": {...}}                          once, first message
//! server → {"setupComplete": {}}                     channel is open
//! client → {"realtimeInput": {"audio": {mimeType, data}}}
//! server → {"serverContent": {"modelTurn": {"parts": [{"inlineData": {...}}]}}}
//! ```

use serde::{Deserialize, Serialize};

use crate::buffering::EncodedFrame;
use crate::PLAYBACK_SAMPLE_RATE;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified, e.g. `models/gemini-2.5-flash-native-audio-preview-09-2025`.
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub audio: Blob,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

impl ClientMessage {
    pub fn setup(model: &str, system_instruction: &str) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        let system_instruction = (!system_instruction.trim().is_empty()).then(|| Content {
            parts: vec![Part {
                text: Some(system_instruction.to_string()),
                inline_data: None,
            }],
        });
        Self::Setup(Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".into()],
            },
            system_instruction,
        })
    }

    pub fn audio(frame: &EncodedFrame) -> Self {
        Self::RealtimeInput(RealtimeInput {
            audio: Blob {
                mime_type: frame.mime_type(),
                data: frame.data.clone(),
            },
        })
    }
}

impl ServerMessage {
    /// Every inline audio part of the model turn, in order.
    pub fn audio_frames(&self) -> Vec<EncodedFrame> {
        let Some(turn) = self
            .server_content
            .as_ref()
            .and_then(|c| c.model_turn.as_ref())
        else {
            return Vec::new();
        };
        turn.parts
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .filter(|blob| blob.mime_type.starts_with("audio/") && !blob.data.is_empty())
            .map(|blob| {
                let rate =
                    EncodedFrame::rate_from_mime(&blob.mime_type).unwrap_or(PLAYBACK_SAMPLE_RATE);
                EncodedFrame::new(rate, blob.data.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_message_shape() {
        let msg = ClientMessage::setup("gemini-live", "Be brief.");
        let json = serde_json::to_value(&msg).expect("serialize setup");
        assert_eq!(json["setup"]["model"], "models/gemini-live");
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be brief."
        );
    }

    #[test]
    fn blank_instruction_is_omitted() {
        let json = serde_json::to_value(ClientMessage::setup("models/x", "  ")).unwrap();
        assert_eq!(json["setup"]["model"], "models/x");
        assert!(json["setup"].get("systemInstruction").is_none());
    }

    #[test]
    fn audio_message_carries_mime_and_data() {
        let frame = EncodedFrame::new(16_000, "AAA=");
        let json = serde_json::to_value(ClientMessage::audio(&frame)).unwrap();
        assert_eq!(
            json["realtimeInput"]["audio"]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert_eq!(json["realtimeInput"]["audio"]["data"], "AAA=");
    }

    #[test]
    fn extracts_audio_parts_from_model_turn() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {"parts": [
                    {"text": "thinking"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}},
                    {"inlineData": {"mimeType": "audio/pcm", "data": "AQAB"}},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBO"}}
                ]},
                "turnComplete": false
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).expect("parse server message");
        let frames = msg.audio_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], EncodedFrame::new(24_000, "AAAA"));
        assert_eq!(frames[1].sample_rate, PLAYBACK_SAMPLE_RATE);
    }

    #[test]
    fn setup_complete_and_unknown_fields_parse() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"setupComplete": {}, "usageMetadata": {"x": 1}}"#).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.audio_frames().is_empty());
    }
}
