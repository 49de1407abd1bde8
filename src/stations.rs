/// Station registry for the offshore buoy network.
///
/// Defines the canonical list of buoys whose observations this service
/// analyzes, along with their display metadata. Analyses are keyed by the
/// station id carried in the data, so an id missing from this registry is
/// still analyzed; the registry only supplies names and positions for
/// reports.

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Metadata for a single moored buoy.
pub struct Station {
    /// Short station identifier as it appears in the observation table.
    pub station_id: &'static str,
    /// Human-readable buoy name.
    pub name: &'static str,
    /// Where the buoy sits and what exposure it sees.
    pub description: &'static str,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
}

/// All buoys of the network, offshore stations first.
pub static BUOY_REGISTRY: &[Station] = &[
    Station {
        station_id: "M1",
        name: "M1 Galway Bay",
        description: "Original offshore station west of Galway Bay. \
                      Decommissioned; historical record only.",
        latitude: 53.1266,
        longitude: -11.2000,
    },
    Station {
        station_id: "M2",
        name: "M2 Irish Sea",
        description: "Irish Sea station off the Dublin coast. Fetch-limited; \
                      rarely sees Atlantic swell.",
        latitude: 53.4800,
        longitude: -5.4250,
    },
    Station {
        station_id: "M3",
        name: "M3 Southwest",
        description: "Southwest approaches off Mizen Head. Exposed to \
                      Atlantic storms tracking from the southwest.",
        latitude: 51.2166,
        longitude: -10.5500,
    },
    Station {
        station_id: "M4",
        name: "M4 Donegal Bay",
        description: "Northwest station off Donegal Bay. Largest measured \
                      wave heights in the network.",
        latitude: 55.0000,
        longitude: -10.0000,
    },
    Station {
        station_id: "M5",
        name: "M5 Southeast",
        description: "Celtic Sea station off the Wexford coast.",
        latitude: 51.6900,
        longitude: -6.7040,
    },
    Station {
        station_id: "M6",
        name: "M6 West Porcupine",
        description: "Deep-water Atlantic station on the Porcupine Bank. \
                      Open-ocean reference for unsheltered conditions.",
        latitude: 53.0748,
        longitude: -15.8814,
    },
    Station {
        station_id: "FS1",
        name: "FS1 Fastnet",
        description: "Fastnet station off the south coast. Short record.",
        latitude: 51.4000,
        longitude: -7.9000,
    },
    Station {
        station_id: "AMETS Berth A Wave Buoy",
        name: "AMETS Berth A",
        description: "Atlantic Marine Energy Test Site, outer berth (100 m depth).",
        latitude: 54.2750,
        longitude: -10.2950,
    },
    Station {
        station_id: "AMETS Berth B Wave Buoy",
        name: "AMETS Berth B",
        description: "Atlantic Marine Energy Test Site, inner berth (50 m depth).",
        latitude: 54.2251,
        longitude: -10.1499,
    },
    Station {
        station_id: "Belmullet Inshore",
        name: "Belmullet Inshore",
        description: "Inshore wave buoy off Belmullet. Shallow water; \
                      waves are depth-limited in large storms.",
        latitude: 54.2400,
        longitude: -10.1400,
    },
];

/// Returns all station ids in the registry.
pub fn all_station_ids() -> Vec<&'static str> {
    BUOY_REGISTRY.iter().map(|s| s.station_id).collect()
}

/// Looks up a station by id. Returns `None` if not found.
pub fn find_station(station_id: &str) -> Option<&'static Station> {
    BUOY_REGISTRY.iter().find(|s| s.station_id == station_id)
}

/// Display name for a station id, falling back to the raw id.
pub fn display_name(station_id: &str) -> String {
    find_station(station_id)
        .map(|s| s.name.to_string())
        .unwrap_or_else(|| station_id.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
