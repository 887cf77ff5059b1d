use hashbrown::HashMap;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Raw per-phoneme model output: channel name -> one value per phoneme index.
pub type RawAnimData = HashMap<String, Vec<f32>>;

/// Errors produced while decoding a remote animation-builder response.
#[derive(Debug, Error)]
pub enum RawDataError {
    #[error("remote payload parse error: {0}")]
    Parse(String),
    #[error("remote payload root is not an object")]
    RootNotObject,
    #[error("section '{0}' is not an object")]
    NotAnObject(String),
    #[error("channel '{0}' is not an array")]
    NotAnArray(String),
    #[error("channel '{channel}' holds a non-numeric value at index {index}")]
    NotANumber { channel: String, index: usize },
}

/// Decoded `{ "lipsync": {...}, "facial": {...} }` response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemotePayload {
    pub lipsync: Option<RawAnimData>,
    pub facial: Option<RawAnimData>,
}

/// Which sections a remote response command refers to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandTargets {
    pub lipsync: bool,
    pub facial: bool,
}

impl CommandTargets {
    pub fn any(&self) -> bool {
        self.lipsync || self.facial
    }
}

/// Commands are matched by substring, so "build_lipsync_facial" names both.
pub fn command_targets(command: &str) -> CommandTargets {
    CommandTargets {
        lipsync: command.contains("lipsync"),
        facial: command.contains("facial"),
    }
}

fn section_to_raw(name: &str, section: &JsonValue) -> Result<RawAnimData, RawDataError> {
    let obj: &Map<String, JsonValue> = section
        .as_object()
        .ok_or_else(|| RawDataError::NotAnObject(name.to_string()))?;

    let mut out = RawAnimData::with_capacity(obj.len());
    for (channel, values) in obj {
        let arr = values
            .as_array()
            .ok_or_else(|| RawDataError::NotAnArray(channel.clone()))?;
        let mut floats = Vec::with_capacity(arr.len());
        for (index, v) in arr.iter().enumerate() {
            let f = v.as_f64().ok_or_else(|| RawDataError::NotANumber {
                channel: channel.clone(),
                index,
            })?;
            floats.push(f as f32);
        }
        out.insert(channel.clone(), floats);
    }
    Ok(out)
}

/// Parse a remote builder response into raw per-channel arrays.
///
/// Missing sections decode to `None`; present sections must be objects of
/// numeric arrays.
pub fn parse_remote_payload(text: &str) -> Result<RemotePayload, RawDataError> {
    let root: JsonValue =
        serde_json::from_str(text).map_err(|e| RawDataError::Parse(e.to_string()))?;
    let root = root.as_object().ok_or(RawDataError::RootNotObject)?;

    let lipsync = match root.get("lipsync") {
        Some(section) => Some(section_to_raw("lipsync", section)?),
        None => None,
    };
    let facial = match root.get("facial") {
        Some(section) => Some(section_to_raw("facial", section)?),
        None => None,
    };
    Ok(RemotePayload { lipsync, facial })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_sections() {
        let text = r#"{
            "lipsync": { "JawOpen": [0.1, 0.5, 1], "MouthClose": [] },
            "facial": { "BrowInnerUp": [0.25] }
        }"#;
        let p = parse_remote_payload(text).unwrap();
        let ls = p.lipsync.unwrap();
        assert_eq!(ls["JawOpen"], vec![0.1, 0.5, 1.0]);
        assert!(ls["MouthClose"].is_empty());
        assert_eq!(p.facial.unwrap()["BrowInnerUp"], vec![0.25]);
    }

    #[test]
    fn missing_section_is_none() {
        let p = parse_remote_payload(r#"{ "facial": {} }"#).unwrap();
        assert!(p.lipsync.is_none());
        assert!(p.facial.unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            parse_remote_payload("not json"),
            Err(RawDataError::Parse(_))
        ));
        assert!(matches!(
            parse_remote_payload("[1,2]"),
            Err(RawDataError::RootNotObject)
        ));
        assert!(matches!(
            parse_remote_payload(r#"{ "lipsync": { "JawOpen": 3 } }"#),
            Err(RawDataError::NotAnArray(_))
        ));
        assert!(matches!(
            parse_remote_payload(r#"{ "lipsync": { "JawOpen": [0.1, "x"] } }"#),
            Err(RawDataError::NotANumber { index: 1, .. })
        ));
    }

    #[test]
    fn command_matching() {
        let t = command_targets("build_lipsync");
        assert!(t.lipsync && !t.facial);
        assert!(command_targets("lipsync+facial").facial);
        assert!(!command_targets("ping").any());
    }
}
