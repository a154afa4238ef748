//! Station descriptors, the hosted configuration document, and the two
//! Azuracast REST payload shapes the resolver consumes.

use serde::{Deserialize, Serialize};

/// Identifies which Azuracast instance and station to subscribe to.
/// Replaced wholesale on station switch, never mutated in place.
///
/// `name` and `description` are display copy used as last-resort fallback
/// metadata when neither the live feed nor the config cache has anything
/// for this station; they may be left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationDescriptor {
    pub server_host: String,
    pub short_code: String,
    pub default_dj: String,
    pub name: String,
    pub description: String,
}

/// Normalized station record, the common output shape regardless of which
/// config source produced it. Field names on the wire follow the hosted
/// config document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: String,
    #[serde(rename = "streamURL")]
    pub stream_url: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "longDesc")]
    pub long_description: String,
    #[serde(rename = "serverName")]
    pub server_host: String,
    #[serde(rename = "shortCode")]
    pub short_code: String,
    #[serde(rename = "defaultDJ")]
    pub default_dj: String,
}

/// Wrapper for the hosted config document.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDocument {
    pub configs: Vec<ConfigSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Azuracast,
    Static,
}

/// One entry in the resolver's ordered source list. Everything but the
/// format is optional in the document; validity is checked when the source
/// is tried, not at decode time.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSource {
    pub format: ConfigFormat,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    stations: Vec<serde_json::Value>,
}

impl ConfigSource {
    /// Stations embedded in a static source. Entries that don't decode are
    /// dropped individually rather than failing the whole source.
    pub fn station_configs(&self) -> Vec<StationConfig> {
        self.stations
            .iter()
            .filter_map(|station| serde_json::from_value(station.clone()).ok())
            .collect()
    }

    pub fn is_valid_azuracast(&self) -> bool {
        self.format == ConfigFormat::Azuracast
            && self.server.as_deref().is_some_and(|server| !server.is_empty())
    }

    pub fn is_valid_static(&self) -> bool {
        self.format == ConfigFormat::Static && !self.station_configs().is_empty()
    }
}

/// Station row from the public `/api/stations` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PublicStation {
    pub id: i64,
    pub name: String,
    pub shortcode: String,
    #[serde(default)]
    pub description: String,
    pub listen_url: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Station row from the admin `/api/admin/stations` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminStation {
    pub id: i64,
    pub name: String,
    pub short_code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_document_decodes_both_source_kinds() {
        let raw = r#"{"configs":[
            {"format":"azuracast","server":"radio.example.com","exclude":["hidden"]},
            {"format":"static","stations":[{
                "name":"Test Station","streamURL":"https://s/radio/live",
                "imageURL":"","desc":"ambient","longDesc":"ambient, longer",
                "serverName":"s","shortCode":"test_station","defaultDJ":"Nobody"
            }]}
        ]}"#;
        let doc: ConfigDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.configs.len(), 2);

        let azuracast = &doc.configs[0];
        assert!(azuracast.is_valid_azuracast());
        assert!(!azuracast.is_valid_static());
        assert_eq!(azuracast.exclude, vec!["hidden".to_string()]);

        let stations = doc.configs[1].station_configs();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].short_code, "test_station");
        assert_eq!(stations[0].default_dj, "Nobody");
        assert!(doc.configs[1].is_valid_static());
    }

    #[test]
    fn undecodable_static_entries_drop_individually() {
        let raw = r#"{"configs":[{"format":"static","stations":[
            {"name":"only a name"},
            {"name":"Full","streamURL":"u","imageURL":"","desc":"d",
             "longDesc":"ld","serverName":"s","shortCode":"full","defaultDJ":""}
        ]}]}"#;
        let doc: ConfigDocument = serde_json::from_str(raw).unwrap();
        let stations = doc.configs[0].station_configs();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].short_code, "full");
    }

    #[test]
    fn azuracast_source_without_server_is_invalid() {
        let raw = r#"{"configs":[{"format":"azuracast"}]}"#;
        let doc: ConfigDocument = serde_json::from_str(raw).unwrap();
        assert!(!doc.configs[0].is_valid_azuracast());
    }

    #[test]
    fn public_station_payload_decodes() {
        let raw = r#"[{"id":1,"name":"Spiral","shortcode":"spiral",
            "description":"ambient","listen_url":"https://s/radio/spiral/live",
            "url":"https://spiral.example"}]"#;
        let stations: Vec<PublicStation> = serde_json::from_str(raw).unwrap();
        assert_eq!(stations[0].shortcode, "spiral");
        assert_eq!(stations[0].listen_url, "https://s/radio/spiral/live");
    }

    #[test]
    fn admin_station_payload_decodes() {
        let raw = r#"[{"id":1,"name":"Spiral","short_code":"spiral",
            "description":"ambient","is_enabled":true}]"#;
        let stations: Vec<AdminStation> = serde_json::from_str(raw).unwrap();
        assert_eq!(stations[0].short_code, "spiral");
        assert!(stations[0].is_enabled);
    }
}
