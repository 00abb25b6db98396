//! Transit line identity and product categories.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// The small set of transport product categories every backend is
/// normalized into.
///
/// Backends disagree wildly on taxonomy; the classifier maps their
/// mode codes and brand strings onto these ten buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Product {
    HighSpeedTrain,
    RegionalTrain,
    SuburbanTrain,
    Subway,
    Tram,
    Bus,
    Ferry,
    Cablecar,
    OnDemand,
}

impl Product {
    /// One-character wire code, stable across serialized contexts.
    pub fn code(&self) -> char {
        match self {
            Product::HighSpeedTrain => 'I',
            Product::RegionalTrain => 'R',
            Product::SuburbanTrain => 'S',
            Product::Subway => 'U',
            Product::Tram => 'T',
            Product::Bus => 'B',
            Product::Ferry => 'F',
            Product::Cablecar => 'C',
            Product::OnDemand => 'P',
        }
    }

    /// Inverse of [`Product::code`].
    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'I' => Some(Product::HighSpeedTrain),
            'R' => Some(Product::RegionalTrain),
            'S' => Some(Product::SuburbanTrain),
            'U' => Some(Product::Subway),
            'T' => Some(Product::Tram),
            'B' => Some(Product::Bus),
            'F' => Some(Product::Ferry),
            'C' => Some(Product::Cablecar),
            'P' => Some(Product::OnDemand),
            _ => None,
        }
    }

    /// All products, in classifier precedence order.
    pub fn all() -> &'static [Product] {
        &[
            Product::HighSpeedTrain,
            Product::RegionalTrain,
            Product::SuburbanTrain,
            Product::Subway,
            Product::Tram,
            Product::Bus,
            Product::Ferry,
            Product::Cablecar,
            Product::OnDemand,
        ]
    }
}

impl Serialize for Product {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_char(self.code())
    }
}

impl<'de> Deserialize<'de> for Product {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let c = char::deserialize(deserializer)?;
        Product::from_code(c)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown product code {c:?}")))
    }
}

/// Accessibility and feature flags attached to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineAttr {
    WheelchairAccess,
    BicycleCarriage,
    Wifi,
    PowerSockets,
    AirConditioned,
    Restaurant,
    CircleClockwise,
    CircleAnticlockwise,
    ServiceReplacement,
    LineAirport,
}

/// A transit line or service.
///
/// Equality and hashing consider *only* `(product, label)`: backends hand
/// out differing route keys for what riders consider the same line, so
/// deduplication must ignore the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    /// Backend route key, opaque and not comparable across backends.
    pub id: Option<String>,
    /// Network/agency identifier.
    pub network: Option<String>,
    /// Normalized product category; `None` when classification failed.
    pub product: Option<Product>,
    /// Rider-facing short code, e.g. `"ICE123"` or `"S2"`.
    pub label: Option<String>,
    /// Long descriptive name.
    pub name: Option<String>,
    /// Bare service number where distinct from the label.
    pub number: Option<String>,
    /// Feature flags.
    pub attrs: BTreeSet<LineAttr>,
    /// Free-text note accumulated from backend remarks.
    pub message: Option<String>,
    /// Headsign / direction text.
    pub direction: Option<String>,
}

impl Line {
    /// A line with just a product and label; the common classifier output.
    pub fn new(product: Option<Product>, label: Option<String>) -> Self {
        Self {
            id: None,
            network: None,
            product,
            label,
            name: None,
            number: None,
            attrs: BTreeSet::new(),
            message: None,
            direction: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    pub fn with_attr(mut self, attr: LineAttr) -> Self {
        self.attrs.insert(attr);
        self
    }
}

impl PartialEq for Line {
    fn eq(&self, other: &Self) -> bool {
        self.product == other.product && self.label == other.label
    }
}

impl Eq for Line {}

impl Hash for Line {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.product.hash(state);
        self.label.hash(state);
    }
}

impl PartialOrd for Line {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Line {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.product
            .cmp(&other.product)
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.product, &self.label) {
            (Some(p), Some(l)) => write!(f, "{}{}", p.code(), l),
            (Some(p), None) => write!(f, "{}?", p.code()),
            (None, Some(l)) => write!(f, "?{l}"),
            (None, None) => write!(f, "?"),
        }
    }
}
