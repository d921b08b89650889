//! Seed parsing, canonicalization, and hashing.
//!
//! Seeds are adjective+noun pairs from two closed dictionaries, accepted as
//! camel case (`MistyForge`) or concatenated in any letter case
//! (`mistyforge`, `MISTYFORGE`). The canonical form is the lowercase
//! concatenation; its BLAKE2b-64 hash anchors the whole RNG tree.

use thiserror::Error;

pub const ADJECTIVES: [&str; 77] = [
    "ancient", "ashen", "autumn", "bitter", "black", "bleak", "blue", "bold", "brisk", "bronze",
    "calm", "clear", "cold", "crimson", "dark", "dawn", "deep", "dusty", "eager", "ember", "faded",
    "fierce", "frozen", "gentle", "golden", "grand", "gray", "green", "grim", "hollow", "icy",
    "iron", "jagged", "keen", "lively", "lone", "long", "lunar", "misty", "mossy", "noble",
    "north", "old", "pale", "pine", "primal", "quiet", "rapid", "red", "remote", "rough", "royal",
    "rugged", "sable", "scarlet", "silent", "silver", "smoky", "snowy", "solid", "south", "spare",
    "spring", "stone", "storm", "strong", "summer", "swift", "timber", "vast", "verdant", "warm",
    "west", "white", "wild", "winter", "young",
];

pub const NOUNS: [&str; 73] = [
    "anchor", "arch", "atlas", "basin", "beacon", "bend", "bluff", "bridge", "brook", "cairn",
    "canyon", "cape", "cavern", "citadel", "cliff", "coast", "cove", "crown", "delta", "dune",
    "fall", "fang", "field", "fjord", "forest", "forge", "gate", "glade", "gorge", "grove",
    "harbor", "haven", "height", "hill", "hollow", "isle", "keep", "knoll", "lagoon", "lake",
    "march", "marsh", "mesa", "moor", "mount", "peak", "plain", "point", "range", "reach", "reef",
    "rest", "ridge", "river", "shore", "sound", "spire", "spring", "steppe", "strait", "summit",
    "tarn", "thicket", "vale", "valley", "vault", "vista", "watch", "water", "way", "wilds",
    "wood", "yard",
];

const EXAMPLE_SEEDS: [&str; 5] = [
    "MistyForge",
    "AncientHarbor",
    "CrimsonRidge",
    "SilentCove",
    "VerdantVale",
];

const SEED_PERSONALIZATION: &[u8; 9] = b"terrainm0";

/// Raised when a seed is invalid or ambiguous. The message always carries a
/// handful of valid example seeds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason} Examples: {examples}")]
pub struct SeedParseError {
    reason: String,
    examples: String,
}

impl SeedParseError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            examples: EXAMPLE_SEEDS.join(", "),
        }
    }
}

/// Validated seed parts and deterministic metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSeed {
    pub original: String,
    pub adjective: String,
    pub noun: String,
    pub canonical: String,
    pub seed_hash: u64,
}

/// Canonical lowercase concatenated seed.
pub fn canonical_seed(adjective: &str, noun: &str) -> String {
    format!("{adjective}{noun}")
}

/// Hash the canonical seed to an unsigned 64-bit integer
/// (BLAKE2b, digest 8 bytes, personalization `terrainm0`, big-endian).
pub fn seed_hash64(seed: &str) -> u64 {
    assert!(seed.is_ascii(), "canonical seed must be ASCII");
    let digest = blake2b_simd::Params::new()
        .hash_length(8)
        .personal(SEED_PERSONALIZATION)
        .hash(seed.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(digest.as_bytes());
    u64::from_be_bytes(bytes)
}

/// Parse `seed_text` into adjective+noun form using the internal dictionaries.
pub fn parse_seed(seed_text: &str) -> Result<ParsedSeed, SeedParseError> {
    let raw = seed_text.trim();
    if raw.is_empty() {
        return Err(SeedParseError::new("Seed cannot be empty."));
    }
    if !raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SeedParseError::new(
            "Seed must contain letters only (no spaces or symbols).",
        ));
    }

    if let Some((adjective, noun)) = split_camel_case(raw) {
        if is_adjective(&adjective) && is_noun(&noun) {
            let canonical = canonical_seed(&adjective, &noun);
            let seed_hash = seed_hash64(&canonical);
            return Ok(ParsedSeed {
                original: raw.to_string(),
                adjective,
                noun,
                canonical,
                seed_hash,
            });
        }
    }

    let lowercase = raw.to_ascii_lowercase();
    let matches = split_concatenated(&lowercase);
    match matches.len() {
        1 => {
            let (adjective, noun) = matches[0].clone();
            let canonical = canonical_seed(&adjective, &noun);
            let seed_hash = seed_hash64(&canonical);
            Ok(ParsedSeed {
                original: raw.to_string(),
                adjective,
                noun,
                canonical,
                seed_hash,
            })
        }
        0 => Err(SeedParseError::new(
            "Seed must be adjective+noun from the internal dictionaries.",
        )),
        _ => {
            let options = matches
                .iter()
                .take(4)
                .map(|(a, n)| canonical_seed(a, n))
                .collect::<Vec<_>>()
                .join(", ");
            Err(SeedParseError::new(format!(
                "Seed is ambiguous. Candidate splits: {options}."
            )))
        }
    }
}

fn is_adjective(word: &str) -> bool {
    ADJECTIVES.binary_search(&word).is_ok()
}

fn is_noun(word: &str) -> bool {
    NOUNS.binary_search(&word).is_ok()
}

/// Split at uppercase boundaries; valid only when exactly two words result.
fn split_camel_case(raw: &str) -> Option<(String, String)> {
    let chars: Vec<char> = raw.chars().collect();
    let mut boundaries = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            boundaries.push(i);
        }
    }
    if boundaries.len() != 1 {
        return None;
    }
    let split = boundaries[0];
    let adjective: String = chars[..split].iter().collect::<String>().to_ascii_lowercase();
    let noun: String = chars[split..].iter().collect::<String>().to_ascii_lowercase();
    if adjective.is_empty() || noun.is_empty() {
        return None;
    }
    Some((adjective, noun))
}

/// Enumerate every dictionary-valid (adjective, noun) split of a lowercase seed.
fn split_concatenated(raw_lower: &str) -> Vec<(String, String)> {
    let mut matches = Vec::new();
    if raw_lower.len() < 4 {
        return matches;
    }
    for i in 2..raw_lower.len() - 1 {
        let adjective = &raw_lower[..i];
        let noun = &raw_lower[i..];
        if is_adjective(adjective) && is_noun(noun) {
            matches.push((adjective.to_string(), noun.to_string()));
        }
    }
    matches
}
