//! Façade merging the live metadata feed with the configuration fallback.
//!
//! The coordinator listens to the connection's status updates and publishes
//! one unified now-playing value: the live status when it actually names a
//! track and artist, otherwise whatever the config cache (or the station
//! descriptor itself) can say about the station.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use azura_proto::stations::StationDescriptor;
use azura_proto::status::{ConnectionState, StreamStatus};

use crate::connection::MetadataConnection;
use crate::resolver::ConfigResolver;

const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// What the surrounding UI shows for the current station, regardless of
/// whether the live feed or the config fallback produced it.
#[derive(Debug, Clone, Default)]
pub struct UnifiedMetadata {
    pub track: String,
    pub artist: String,
    pub album: Option<String>,
    pub artwork: Option<Url>,
    pub dj: Option<String>,
    pub is_live_dj: bool,
}

impl UnifiedMetadata {
    /// Live data is only worth showing when it names both a track and an
    /// artist.
    pub fn is_valid(&self) -> bool {
        !self.track.is_empty() && !self.artist.is_empty()
    }
}

/// Dedup key: case- and whitespace-insensitive track plus album.
impl PartialEq for UnifiedMetadata {
    fn eq(&self, other: &Self) -> bool {
        fn key(value: &str) -> String {
            value.trim().to_lowercase()
        }
        key(&self.track) == key(&other.track)
            && key(self.album.as_deref().unwrap_or_default())
                == key(other.album.as_deref().unwrap_or_default())
    }
}

/// Connection state as presented to the UI. `Failed` folds the subscribe
/// and shortcode failures together; both mean "no live metadata, show
/// fallback info" and neither blocks playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl From<ConnectionState> for MetadataState {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Disconnected => MetadataState::Disconnected,
            ConnectionState::Connecting => MetadataState::Connecting,
            ConnectionState::Connected => MetadataState::Connected,
            ConnectionState::StationNotFound | ConnectionState::FailedSubscribe => {
                MetadataState::Failed
            }
        }
    }
}

/// Merges [`MetadataConnection`] and [`ConfigResolver`] into one unified
/// now-playing feed for UI code.
pub struct MetadataCoordinator {
    connection: Arc<MetadataConnection>,
    resolver: Arc<ConfigResolver>,
    current: Arc<Mutex<CurrentStation>>,
    updates: broadcast::Sender<Option<UnifiedMetadata>>,
    merge_task: JoinHandle<()>,
}

#[derive(Default)]
struct CurrentStation {
    station: Option<StationDescriptor>,
    metadata: Option<UnifiedMetadata>,
}

impl MetadataCoordinator {
    /// Must be called from within a tokio runtime; the merge loop is
    /// spawned here and lives until the coordinator is dropped.
    pub fn new(connection: Arc<MetadataConnection>, resolver: Arc<ConfigResolver>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let current = Arc::new(Mutex::new(CurrentStation::default()));

        let merge_task = tokio::spawn(merge_loop(
            connection.subscribe(),
            Arc::clone(&resolver),
            Arc::clone(&current),
            updates.clone(),
        ));

        Self {
            connection,
            resolver,
            current,
            updates,
            merge_task,
        }
    }

    /// Point the live connection at a new station, warm the config cache in
    /// the background, and publish fallback metadata right away so the UI
    /// has something to show before the first frame arrives. Any previous
    /// station is disconnected first.
    pub fn connect_to_station(&self, descriptor: StationDescriptor) {
        self.disconnect_current_station();

        let fallback = fallback_metadata(&descriptor, self.resolver.as_ref());
        {
            let mut current = lock(&self.current);
            current.station = Some(descriptor.clone());
            current.metadata = fallback.clone();
        }
        let _ = self.updates.send(fallback);

        self.connection.configure(descriptor);
        self.connection.connect();

        // A warm-up failure only means fallback metadata stays thinner.
        let resolver = Arc::clone(&self.resolver);
        tokio::spawn(async move {
            if !resolver.has_cached_stations() {
                if let Err(err) = resolver.fetch_stations().await {
                    warn!("station roster warm-up failed: {err}");
                }
            }
        });
    }

    /// Disconnect the live feed and clear the published metadata.
    pub fn disconnect_current_station(&self) {
        self.connection.disconnect();
        let had_station = {
            let mut current = lock(&self.current);
            current.metadata = None;
            current.station.take().is_some()
        };
        if had_station {
            let _ = self.updates.send(None);
        }
    }

    /// Subscribe to unified metadata changes; `None` means "no station".
    /// Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<Option<UnifiedMetadata>> {
        self.updates.subscribe()
    }

    pub fn current_metadata(&self) -> Option<UnifiedMetadata> {
        lock(&self.current).metadata.clone()
    }

    pub fn connection_state(&self) -> MetadataState {
        self.connection.state().into()
    }
}

impl Drop for MetadataCoordinator {
    fn drop(&mut self) {
        self.merge_task.abort();
    }
}

async fn merge_loop(
    mut statuses: broadcast::Receiver<StreamStatus>,
    resolver: Arc<ConfigResolver>,
    current: Arc<Mutex<CurrentStation>>,
    updates: broadcast::Sender<Option<UnifiedMetadata>>,
) {
    loop {
        let status = match statuses.recv().await {
            Ok(status) => status,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(missed, "merge loop lagged behind status updates");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        let mut guard = lock(&current);
        let Some(station) = guard.station.clone() else {
            continue;
        };

        let unified = unified_metadata(&status, &station, resolver.as_ref());
        let changed = match (&guard.metadata, &unified) {
            (Some(previous), Some(next)) => previous != next,
            (None, None) => false,
            _ => true,
        };
        if changed {
            guard.metadata = unified.clone();
            drop(guard);
            let _ = updates.send(unified);
        }
    }
}

/// Prefer the live status when it is a real update naming both track and
/// artist; otherwise fall back to config data for this station.
fn unified_metadata(
    status: &StreamStatus,
    station: &StationDescriptor,
    resolver: &ConfigResolver,
) -> Option<UnifiedMetadata> {
    if status.changed && !status.track.is_empty() && !status.artist.is_empty() {
        return Some(UnifiedMetadata {
            track: status.track.clone(),
            artist: status.artist.clone(),
            album: (!status.album.is_empty()).then(|| status.album.clone()),
            artwork: status.artwork.clone(),
            dj: (!status.dj.is_empty()).then(|| status.dj.clone()),
            is_live_dj: status.is_live_dj,
        });
    }
    fallback_metadata(station, resolver)
}

/// Station info from the config cache when available, else the descriptor's
/// own display copy: station name stands in for the track, its description
/// for the artist.
fn fallback_metadata(
    station: &StationDescriptor,
    resolver: &ConfigResolver,
) -> Option<UnifiedMetadata> {
    let info = resolver.station_info(&station.short_code);

    let track = info
        .as_ref()
        .map(|info| info.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| station.name.clone());
    let artist = info
        .as_ref()
        .map(|info| info.description.clone())
        .filter(|description| !description.is_empty())
        .unwrap_or_else(|| station.description.clone());
    let dj = if !station.default_dj.is_empty() {
        Some(station.default_dj.clone())
    } else {
        info.as_ref()
            .map(|info| info.default_dj.clone())
            .filter(|dj| !dj.is_empty())
    };

    Some(UnifiedMetadata {
        track,
        artist,
        album: None,
        artwork: None,
        dj,
        is_live_dj: false,
    })
}

fn lock(mutex: &Mutex<CurrentStation>) -> MutexGuard<'_, CurrentStation> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unified_equality_is_case_and_whitespace_insensitive() {
        let a = UnifiedMetadata {
            track: "  So What ".to_string(),
            artist: "Miles Davis".to_string(),
            album: Some("Kind of Blue".to_string()),
            ..UnifiedMetadata::default()
        };
        let b = UnifiedMetadata {
            track: "so what".to_string(),
            artist: "someone else entirely".to_string(),
            album: Some("KIND OF BLUE".to_string()),
            ..UnifiedMetadata::default()
        };
        assert_eq!(a, b);

        let c = UnifiedMetadata {
            album: Some("Sketches of Spain".to_string()),
            ..a.clone()
        };
        assert_ne!(a, c);
    }

    #[test]
    fn validity_needs_track_and_artist() {
        let mut metadata = UnifiedMetadata::default();
        assert!(!metadata.is_valid());
        metadata.track = "Track".to_string();
        assert!(!metadata.is_valid());
        metadata.artist = "Artist".to_string();
        assert!(metadata.is_valid());
    }

    #[test]
    fn failure_states_fold_into_failed() {
        assert_eq!(
            MetadataState::from(ConnectionState::StationNotFound),
            MetadataState::Failed
        );
        assert_eq!(
            MetadataState::from(ConnectionState::FailedSubscribe),
            MetadataState::Failed
        );
        assert_eq!(
            MetadataState::from(ConnectionState::Connected),
            MetadataState::Connected
        );
    }
}
