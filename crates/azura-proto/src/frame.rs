//! Parsing of inbound WebSocket frames from the Azuracast now-playing feed.
//!
//! Two shapes arrive on the socket: the initial `connect` acknowledgment,
//! which wraps the now-playing document inside the subscription
//! confirmation, and incremental `channel` updates, which carry the same
//! document directly under `pub.data.np`. Anything else (server pings and
//! the like) comes back as `FrameKind::Unrecognized` with
//! `changed == false` rather than as an error.
//!
//! The wire format keys subscription data on `station:<shortCode>` and uses
//! a top-level `pub` key, so this module navigates `serde_json::Value`
//! instead of deriving a typed document.

use std::time::Duration;

use serde_json::Value;
use tracing::trace;
use url::Url;

use crate::status::{ConnectionState, FrameKind, StreamStatus};

/// Errors produced while extracting a status from a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("missing field `{0}` in now-playing data")]
    MissingField(&'static str),
}

/// Parse one inbound frame into a status snapshot.
///
/// `short_code` is needed because the connect acknowledgment keys its
/// subscription data on `station:<short_code>`. `default_dj` stands in when
/// the frame names no live streamer; pass an empty string for no default.
pub fn parse_frame(
    raw: &[u8],
    short_code: &str,
    default_dj: &str,
) -> Result<StreamStatus, FrameError> {
    let json: Value = serde_json::from_slice(raw)?;
    let root = json.as_object().ok_or(FrameError::NotAnObject)?;
    trace!(frame = %json, "inbound frame");

    let mut status = StreamStatus::default();

    if let Some(connect) = root.get("connect") {
        status.kind = FrameKind::Connect;
        status.ping_interval = connect
            .get("ping")
            .and_then(Value::as_u64)
            .map(Duration::from_secs);

        // A bad shortcode leaves the acknowledgment without publications:
        // the socket stays up and frames keep arriving, but none of them
        // will ever carry metadata for this station.
        let publications = connect
            .get("subs")
            .and_then(|subs| subs.get(format!("station:{short_code}")))
            .and_then(|sub| sub.get("publications"))
            .and_then(Value::as_array);
        let Some(first) = publications.and_then(|p| p.first()) else {
            status.connection = ConnectionState::StationNotFound;
            status.changed = true;
            return Ok(status);
        };

        let np = first
            .get("data")
            .and_then(|data| data.get("np"))
            .ok_or(FrameError::MissingField("np"))?;
        extract_now_playing(np, default_dj, &mut status)?;
    } else if root.contains_key("channel") {
        status.kind = FrameKind::Channel;
        let np = root
            .get("pub")
            .ok_or(FrameError::MissingField("pub"))?
            .get("data")
            .ok_or(FrameError::MissingField("data"))?
            .get("np")
            .ok_or(FrameError::MissingField("np"))?;
        extract_now_playing(np, default_dj, &mut status)?;
    } else {
        // Server ping or some other frame we don't understand. Not an
        // error, but nothing worth delivering either.
        status.kind = FrameKind::Unrecognized;
        status.changed = false;
    }

    Ok(status)
}

/// Both frame shapes converge on the same `np` document; everything below
/// the envelope is extracted here.
fn extract_now_playing(
    np: &Value,
    default_dj: &str,
    status: &mut StreamStatus,
) -> Result<(), FrameError> {
    let (is_live_dj, dj) = resolve_dj(np.get("live"), default_dj);
    status.is_live_dj = is_live_dj;
    status.dj = dj;

    let song = np
        .get("now_playing")
        .ok_or(FrameError::MissingField("now_playing"))?
        .get("song")
        .ok_or(FrameError::MissingField("song"))?;

    status.album = require_str(song, "album")?;
    status.artist = require_str(song, "artist")?;
    status.track = require_str(song, "title")?;

    // Artwork is best-effort: a missing or unparsable URL is simply no art.
    status.artwork = song
        .get("art")
        .and_then(Value::as_str)
        .and_then(|art| Url::parse(art).ok());

    status.connection = ConnectionState::Connected;
    status.changed = true;
    trace!(track = %status.track, artist = %status.artist, dj = %status.dj, "extracted now-playing");
    Ok(())
}

fn require_str(song: &Value, field: &'static str) -> Result<String, FrameError> {
    song.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(FrameError::MissingField(field))
}

/// DJ resolution: a non-empty `streamer_name` means a live DJ is on air;
/// otherwise the caller-supplied default stands in.
fn resolve_dj(live: Option<&Value>, default_dj: &str) -> (bool, String) {
    let streamer = live
        .and_then(|live| live.get("streamer_name"))
        .and_then(Value::as_str)
        .unwrap_or("");
    if streamer.is_empty() {
        (false, default_dj.to_owned())
    } else {
        (true, streamer.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_frame(short_code: &str, ping: u64, streamer: &str, title: &str) -> String {
        format!(
            r#"{{"connect":{{"client":"c1","version":"0","ping":{ping},"pong":true,
                "subs":{{"station:{short_code}":{{"publications":[{{"data":{{"np":{{
                    "live":{{"streamer_name":"{streamer}"}},
                    "now_playing":{{"song":{{"album":"A","artist":"B","title":"{title}","art":"https://x/y.png"}}}}
                }}}}}}]}}}}}}}}"#
        )
    }

    const CHANNEL_FRAME: &str = r#"{"channel":"station:spiral","pub":{"data":{"np":{
        "live":{"streamer_name":"DJ Spud"},
        "now_playing":{"song":{"album":"A","artist":"B","title":"C","art":"https://x/y.png"}}
    }},"offset":12}}"#;

    #[test]
    fn channel_frame_extracts_track_dj_and_artwork() {
        let status = parse_frame(CHANNEL_FRAME.as_bytes(), "spiral", "").unwrap();
        assert_eq!(status.kind, FrameKind::Channel);
        assert!(status.changed);
        assert_eq!(status.track, "C");
        assert_eq!(status.artist, "B");
        assert_eq!(status.album, "A");
        assert_eq!(status.dj, "DJ Spud");
        assert!(status.is_live_dj);
        assert_eq!(status.artwork.as_ref().map(Url::as_str), Some("https://x/y.png"));
        assert_eq!(status.connection, ConnectionState::Connected);
    }

    #[test]
    fn connect_frame_extracts_fields_and_ping_interval() {
        let raw = connect_frame("spiral", 25, "DJ Spud", "C");
        let status = parse_frame(raw.as_bytes(), "spiral", "").unwrap();
        assert_eq!(status.kind, FrameKind::Connect);
        assert!(status.changed);
        assert_eq!(status.ping_interval, Some(Duration::from_secs(25)));
        assert_eq!(status.track, "C");
        assert_eq!(status.connection, ConnectionState::Connected);
    }

    #[test]
    fn connect_frame_for_wrong_shortcode_is_station_not_found() {
        // The subscription key won't match, so no publications are visible.
        let raw = connect_frame("spiral", 25, "DJ Spud", "C");
        let status = parse_frame(raw.as_bytes(), "other", "").unwrap();
        assert_eq!(status.connection, ConnectionState::StationNotFound);
        assert!(status.changed);
        assert_eq!(status.kind, FrameKind::Connect);
        assert!(status.track.is_empty());
    }

    #[test]
    fn empty_publications_is_station_not_found() {
        let raw = r#"{"connect":{"ping":25,"subs":{"station:spiral":{"publications":[]}}}}"#;
        let status = parse_frame(raw.as_bytes(), "spiral", "").unwrap();
        assert_eq!(status.connection, ConnectionState::StationNotFound);
        assert_eq!(status.ping_interval, Some(Duration::from_secs(25)));
    }

    #[test]
    fn empty_streamer_falls_back_to_default_dj() {
        let raw = connect_frame("spiral", 25, "", "C");
        let status = parse_frame(raw.as_bytes(), "spiral", "Spud the Robot").unwrap();
        assert!(!status.is_live_dj);
        assert_eq!(status.dj, "Spud the Robot");
    }

    #[test]
    fn absent_live_block_falls_back_to_default_dj() {
        let raw = r#"{"channel":"station:spiral","pub":{"data":{"np":{
            "now_playing":{"song":{"album":"A","artist":"B","title":"C"}}
        }}}}"#;
        let status = parse_frame(raw.as_bytes(), "spiral", "Spud the Robot").unwrap();
        assert!(!status.is_live_dj);
        assert_eq!(status.dj, "Spud the Robot");
    }

    #[test]
    fn named_streamer_wins_over_default_dj() {
        let raw = connect_frame("spiral", 25, "DJ Spud", "C");
        let status = parse_frame(raw.as_bytes(), "spiral", "Spud the Robot").unwrap();
        assert!(status.is_live_dj);
        assert_eq!(status.dj, "DJ Spud");
    }

    #[test]
    fn missing_title_is_a_typed_error() {
        let raw = r#"{"channel":"x","pub":{"data":{"np":{
            "now_playing":{"song":{"album":"A","artist":"B"}}
        }}}}"#;
        let err = parse_frame(raw.as_bytes(), "spiral", "").unwrap_err();
        assert!(matches!(err, FrameError::MissingField("title")));
    }

    #[test]
    fn missing_envelope_link_is_a_typed_error() {
        let raw = r#"{"channel":"x","pub":{"data":{}}}"#;
        let err = parse_frame(raw.as_bytes(), "spiral", "").unwrap_err();
        assert!(matches!(err, FrameError::MissingField("np")));
    }

    #[test]
    fn invalid_json_is_malformed_payload() {
        let err = parse_frame(b"{not json", "spiral", "").unwrap_err();
        assert!(matches!(err, FrameError::MalformedPayload(_)));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = parse_frame(b"[1,2,3]", "spiral", "").unwrap_err();
        assert!(matches!(err, FrameError::NotAnObject));
    }

    #[test]
    fn unrecognized_frame_is_not_an_update() {
        let status = parse_frame(b"{}", "spiral", "").unwrap();
        assert_eq!(status.kind, FrameKind::Unrecognized);
        assert!(!status.changed);
        assert_eq!(status.connection, ConnectionState::Disconnected);
    }

    #[test]
    fn unparsable_artwork_url_is_dropped() {
        let raw = r#"{"channel":"x","pub":{"data":{"np":{
            "now_playing":{"song":{"album":"A","artist":"B","title":"C","art":"not a url"}}
        }}}}"#;
        let status = parse_frame(raw.as_bytes(), "spiral", "").unwrap();
        assert!(status.changed);
        assert!(status.artwork.is_none());
    }

    #[test]
    fn same_payload_twice_parses_equal() {
        let a = parse_frame(CHANNEL_FRAME.as_bytes(), "spiral", "").unwrap();
        let b = parse_frame(CHANNEL_FRAME.as_bytes(), "spiral", "").unwrap();
        assert_eq!(a, b);
    }
}
