use std::time::Duration;

use url::Url;

/// Connection lifecycle as seen by metadata consumers.
///
/// Transitions:
///   Disconnected -> Connecting -> Connected -> Disconnected
/// `StationNotFound` and `FailedSubscribe` are entered from `Connected` when
/// the shortcode has no publications or the subscription could not be set
/// up. Both mean "no metadata will arrive"; callers display them like
/// `Disconnected` but they are kept distinct for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Socket is up but the station shortcode has no publications on this
    /// server, so the subscription will never carry metadata.
    StationNotFound,
    /// Configuration was incomplete or the subscription frame could not be
    /// sent.
    FailedSubscribe,
}

/// Which of the two inbound frame shapes produced a status.
///
/// Only `Connect` frames carry the server's heartbeat interval, so the
/// connection layer keys its liveness watchdog off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameKind {
    Connect,
    Channel,
    #[default]
    Unrecognized,
}

/// Snapshot of a station's now-playing state, derived from one frame.
///
/// String fields are empty, never absent, when the server had nothing to
/// say. A snapshot with `changed == false` carries no update and must not
/// be delivered to subscribers.
#[derive(Debug, Clone, Default)]
pub struct StreamStatus {
    pub connection: ConnectionState,
    pub changed: bool,
    pub is_live_dj: bool,
    pub track: String,
    pub artist: String,
    pub album: String,
    pub dj: String,
    pub artwork: Option<Url>,
    /// Server-declared heartbeat interval, present only on `Connect` frames.
    pub ping_interval: Option<Duration>,
    pub kind: FrameKind,
}

/// Equality is the dedup key deciding whether subscribers get notified.
/// Artwork and ping interval are deliberately excluded.
impl PartialEq for StreamStatus {
    fn eq(&self, other: &Self) -> bool {
        self.connection == other.connection
            && self.is_live_dj == other.is_live_dj
            && self.track == other.track
            && self.artist == other.artist
            && self.album == other.album
            && self.dj == other.dj
    }
}

impl Eq for StreamStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(track: &str, artwork: Option<&str>) -> StreamStatus {
        StreamStatus {
            connection: ConnectionState::Connected,
            changed: true,
            track: track.to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            dj: "DJ".to_string(),
            artwork: artwork.and_then(|a| Url::parse(a).ok()),
            ..StreamStatus::default()
        }
    }

    #[test]
    fn equality_ignores_artwork_and_ping_interval() {
        let mut a = playing("Track", Some("https://example.com/a.png"));
        let mut b = playing("Track", None);
        b.ping_interval = Some(Duration::from_secs(25));
        assert_eq!(a, b);

        a.track = "Other".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn equality_covers_connection_and_dj_fields() {
        let a = playing("Track", None);
        let mut b = playing("Track", None);
        b.connection = ConnectionState::Disconnected;
        assert_ne!(a, b);

        let mut c = playing("Track", None);
        c.is_live_dj = true;
        assert_ne!(a, c);
    }
}
