use crate::error::BracketError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Boy,
    Girl,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Boy => f.write_str("boy"),
            Gender::Girl => f.write_str("girl"),
        }
    }
}

impl FromStr for Gender {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "boy" | "boys" => Ok(Gender::Boy),
            "girl" | "girls" => Ok(Gender::Girl),
            _ => Err(BracketError::InvalidGender(s.to_string())),
        }
    }
}

/// Which part of the catalog a bracket draws from.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GenderFilter {
    Boy,
    Girl,
    Mixed,
}

impl GenderFilter {
    pub fn admits(&self, gender: Gender) -> bool {
        match self {
            GenderFilter::Mixed => true,
            GenderFilter::Boy => gender == Gender::Boy,
            GenderFilter::Girl => gender == Gender::Girl,
        }
    }
}

impl Default for GenderFilter {
    fn default() -> Self {
        GenderFilter::Girl
    }
}

impl fmt::Display for GenderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenderFilter::Boy => f.write_str("boy"),
            GenderFilter::Girl => f.write_str("girl"),
            GenderFilter::Mixed => f.write_str("mixed"),
        }
    }
}

impl FromStr for GenderFilter {
    type Err = BracketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("mixed") {
            return Ok(GenderFilter::Mixed);
        }
        match s.parse::<Gender>()? {
            Gender::Boy => Ok(GenderFilter::Boy),
            Gender::Girl => Ok(GenderFilter::Girl),
        }
    }
}

/// Identity of an idol: name and group with case and punctuation stripped.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct IdolKey(String);

impl IdolKey {
    /// `normalize` strips every `:`, so the separator keeps the two parts apart.
    pub fn new(name: &str, group: &str) -> Self {
        Self(format!("{}:{}", normalize(name), normalize(group)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercased alphanumerics only.
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Case and punctuation insensitive comparison.
pub fn loose_eq(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// A stored picture of an idol.
///
/// `object_name` is the opaque storage reference; `hash` is the content hash computed
/// when the catalog was rebuilt. Bytes are filled in at most once and never change
/// afterwards.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct IdolImage {
    pub object_name: String,
    pub hash: String,
    #[serde(skip)]
    bytes: OnceLock<Arc<[u8]>>,
}

impl IdolImage {
    pub fn new(object_name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            hash: hash.into(),
            bytes: OnceLock::new(),
        }
    }

    pub fn with_bytes(object_name: impl Into<String>, hash: impl Into<String>, bytes: Vec<u8>) -> Self {
        let image = Self::new(object_name, hash);
        let _ = image.bytes.set(Arc::from(bytes));
        image
    }

    /// Bytes if they have been resolved already.
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.bytes.get().cloned()
    }

    /// Records resolved bytes. A second call keeps the first value.
    pub fn set_bytes(&self, bytes: Vec<u8>) -> Arc<[u8]> {
        self.bytes.get_or_init(|| Arc::from(bytes)).clone()
    }
}

impl PartialEq for IdolImage {
    fn eq(&self, other: &Self) -> bool {
        self.object_name == other.object_name && self.hash == other.hash
    }
}

impl Eq for IdolImage {}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Idol {
    pub name: String,
    pub group: String,
    pub gender: Gender,
    #[serde(default)]
    pub images: Vec<IdolImage>,
}

impl Idol {
    pub fn new(name: impl Into<String>, group: impl Into<String>, gender: Gender) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            gender,
            images: Vec::new(),
        }
    }

    pub fn key(&self) -> IdolKey {
        IdolKey::new(&self.name, &self.group)
    }

    /// Loose match against a group and name typed by a participant.
    pub fn matches(&self, group: &str, name: &str) -> bool {
        loose_eq(&self.group, group) && loose_eq(&self.name, name)
    }

    pub fn with_image(mut self, image: IdolImage) -> Self {
        self.images.push(image);
        self
    }
}

impl fmt::Display for Idol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.group, self.name)
    }
}
