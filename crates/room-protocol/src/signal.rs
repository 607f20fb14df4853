//! Negotiation payloads carried by the signaling relay.
//!
//! The relay never inspects these beyond schema validation; they travel
//! verbatim between the two peers of a link.

use serde::{Deserialize, Serialize};

/// Role of a session description in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// A local or remote session description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A trickled ICE candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidateInit {
    /// Candidate with only the candidate line set.
    #[must_use]
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_description_wire_shape() {
        let desc = SessionDescription::offer("v=0");
        assert_eq!(
            serde_json::to_value(&desc).unwrap(),
            json!({"type": "offer", "sdp": "v=0"})
        );
    }

    #[test]
    fn test_ice_candidate_browser_shape() {
        let value = json!({
            "candidate": "candidate:1 1 udp 2122260223 10.0.0.1 54400 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0,
            "usernameFragment": "abcd"
        });
        let candidate: IceCandidateInit = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_m_line_index, Some(0));
        assert_eq!(serde_json::to_value(&candidate).unwrap(), value);
    }

    #[test]
    fn test_ice_candidate_optional_fields_omitted() {
        let candidate = IceCandidateInit::new("candidate:1");
        assert_eq!(
            serde_json::to_value(&candidate).unwrap(),
            json!({"candidate": "candidate:1"})
        );
    }

    #[test]
    fn test_unknown_sdp_type_rejected() {
        let result: Result<SessionDescription, _> =
            serde_json::from_value(json!({"type": "bogus", "sdp": ""}));
        assert!(result.is_err());
    }
}
