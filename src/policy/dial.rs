//! Policy dials and the immutable policy vector.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Number of dials in a policy vector.
pub const DIAL_COUNT: usize = 32;

/// A named lockdown dial.
///
/// Economic dials describe how open a sector is; social dials describe how
/// permissive a social-distancing measure is. Declaration order is the
/// feature order used by the parameter mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dial {
    // Economic focus
    /// Crop and livestock farming.
    Agriculture,
    /// Chemical and pharmaceutical plants.
    Chemical,
    /// Retail and wholesale trade.
    Commerce,
    /// Building and civil works.
    Construction,
    /// Schools and universities.
    Education,
    /// Financial and professional services.
    FinProfServices,
    /// Food and consumer staples.
    FoodConsumables,
    /// Non-emergency healthcare.
    Healthcare,
    /// Hotels, restaurants and tourism.
    HospitalityTourism,
    /// General manufacturing.
    Manufacturing,
    /// Mining and quarrying.
    Mining,
    /// Engineering works.
    Engineering,
    /// Media and entertainment.
    Media,
    /// Energy production.
    Energy,
    /// Telecommunications.
    Telecom,
    /// Public administration.
    PublicAdmin,
    /// Logistics and shipping.
    SupplyChainShip,
    /// Forestry, husbandry and fishing.
    ForestHusbFish,
    /// Textile mills.
    Textiles,
    /// Freight transport.
    Transportation,
    /// Water and power utilities.
    Utilities,

    // Social focus
    /// Permitted size of gatherings.
    GatheringSize,
    /// Openness of national borders.
    OpenBorder,
    /// Domestic air travel.
    AirTravel,
    /// Intercity road and rail travel.
    RoadRailTravel,
    /// Urban public transport.
    PublicTransport,
    /// Freedom from curfew; `0` is a full curfew.
    Curfew,
    /// Online deliveries.
    Ecommerce,
    /// Public events.
    EventsAllowed,
    /// Places of worship.
    WorshipAllowed,
    /// Leniency of contact tracing.
    ContactTracing,
    /// Leniency of testing requirements.
    CovidTesting,
}

impl Dial {
    /// All dials in feature order.
    pub const ALL: [Self; DIAL_COUNT] = [
        Self::Agriculture,
        Self::Chemical,
        Self::Commerce,
        Self::Construction,
        Self::Education,
        Self::FinProfServices,
        Self::FoodConsumables,
        Self::Healthcare,
        Self::HospitalityTourism,
        Self::Manufacturing,
        Self::Mining,
        Self::Engineering,
        Self::Media,
        Self::Energy,
        Self::Telecom,
        Self::PublicAdmin,
        Self::SupplyChainShip,
        Self::ForestHusbFish,
        Self::Textiles,
        Self::Transportation,
        Self::Utilities,
        Self::GatheringSize,
        Self::OpenBorder,
        Self::AirTravel,
        Self::RoadRailTravel,
        Self::PublicTransport,
        Self::Curfew,
        Self::Ecommerce,
        Self::EventsAllowed,
        Self::WorshipAllowed,
        Self::ContactTracing,
        Self::CovidTesting,
    ];

    /// Position of this dial in the feature vector.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns true for economic-sector dials.
    #[must_use]
    pub const fn is_economic(self) -> bool {
        self.index() < Self::GatheringSize.index()
    }

    /// Canonical snake_case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Agriculture => "agriculture",
            Self::Chemical => "chemical",
            Self::Commerce => "commerce",
            Self::Construction => "construction",
            Self::Education => "education",
            Self::FinProfServices => "fin_prof_services",
            Self::FoodConsumables => "food_consumables",
            Self::Healthcare => "healthcare",
            Self::HospitalityTourism => "hospitality_tourism",
            Self::Manufacturing => "manufacturing",
            Self::Mining => "mining",
            Self::Engineering => "engineering",
            Self::Media => "media",
            Self::Energy => "energy",
            Self::Telecom => "telecom",
            Self::PublicAdmin => "public_admin",
            Self::SupplyChainShip => "supply_chain_ship",
            Self::ForestHusbFish => "forest_husb_fish",
            Self::Textiles => "textiles",
            Self::Transportation => "transportation",
            Self::Utilities => "utilities",
            Self::GatheringSize => "gathering_size",
            Self::OpenBorder => "open_border",
            Self::AirTravel => "air_travel",
            Self::RoadRailTravel => "road_rail_travel",
            Self::PublicTransport => "public_transport",
            Self::Curfew => "curfew",
            Self::Ecommerce => "ecommerce",
            Self::EventsAllowed => "events_allowed",
            Self::WorshipAllowed => "worship_allowed",
            Self::ContactTracing => "contact_tracing",
            Self::CovidTesting => "covid_testing",
        }
    }

    /// Looks a dial up by its canonical name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownDial` for names outside the catalogue.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .iter()
            .copied()
            .find(|dial| dial.name() == name)
            .ok_or_else(|| ConfigError::UnknownDial {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for Dial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable setting of every dial, each in `[0, 1]`.
///
/// Unset dials are 0. Equality and hashing are structural, so two vectors
/// with identical values are interchangeable as map keys.
///
/// # Examples
///
/// ```
/// use lockdown_planner::{Dial, PolicyVector};
///
/// let policy = PolicyVector::default().with(Dial::Agriculture, 0.5).unwrap();
/// assert_eq!(policy.get(Dial::Agriculture), 0.5);
/// assert_eq!(policy.get(Dial::AirTravel), 0.0);
/// ```
#[derive(Clone, Copy)]
pub struct PolicyVector {
    values: [f64; DIAL_COUNT],
}

impl PolicyVector {
    /// Builds a vector from `(dial, value)` pairs; later pairs win.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DialOutOfRange` for values outside `[0, 1]`.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Dial, f64)>) -> Result<Self, ConfigError> {
        pairs
            .into_iter()
            .try_fold(Self::default(), |policy, (dial, value)| policy.with(dial, value))
    }

    /// Returns a copy with one dial changed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DialOutOfRange` for values outside `[0, 1]`.
    pub fn with(mut self, dial: Dial, value: f64) -> Result<Self, ConfigError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::DialOutOfRange {
                dial: dial.name().to_string(),
                value,
            });
        }
        // Collapse -0.0 so that bitwise equality matches numeric equality.
        self.values[dial.index()] = value + 0.0;
        Ok(self)
    }

    /// Level of `dial`; unset dials are fully open.
    #[must_use]
    pub const fn get(&self, dial: Dial) -> f64 {
        self.values[dial.index()]
    }

    /// Dial values in feature order.
    #[must_use]
    pub const fn features(&self) -> &[f64; DIAL_COUNT] {
        &self.values
    }

    /// Non-zero dials in feature order.
    pub fn active_dials(&self) -> impl Iterator<Item = (Dial, f64)> + '_ {
        Dial::ALL
            .iter()
            .map(|&dial| (dial, self.get(dial)))
            .filter(|(_, value)| *value != 0.0)
    }
}

impl Default for PolicyVector {
    fn default() -> Self {
        Self {
            values: [0.0; DIAL_COUNT],
        }
    }
}

impl PartialEq for PolicyVector {
    fn eq(&self, other: &Self) -> bool {
        self.values
            .iter()
            .zip(other.values.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for PolicyVector {}

impl Hash for PolicyVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.values {
            value.to_bits().hash(state);
        }
    }
}

impl fmt::Debug for PolicyVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.active_dials()).finish()
    }
}

impl fmt::Display for PolicyVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (dial, value) in self.active_dials() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{dial}={value}")?;
            first = false;
        }
        if first {
            f.write_str("closed")?;
        }
        Ok(())
    }
}

impl Serialize for PolicyVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.active_dials())
    }
}

impl<'de> Deserialize<'de> for PolicyVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<Dial, f64>::deserialize(deserializer)?;
        Self::from_pairs(raw).map_err(D::Error::custom)
    }
}
