//! A closed dictionary of common OSM tag keys, standing in for the
//! external tag vocabulary/codec collaborator described in the
//! specification. `encode`/`decode` give every entity's tag stream a
//! compact representation without storing every key as a full string.

/// Keys common enough in OSM extracts to deserve a dedicated code.
/// Index into this table (1-based) is the positive `code` returned by
/// `encode` when both key and value are in the table.
const DICTIONARY: &[(&str, &[&str])] = &[
    ("highway", &["residential", "service", "track", "footway", "unclassified"]),
    ("building", &["yes", "house", "residential"]),
    ("name", &[]),
    ("natural", &["water", "wood", "tree"]),
    ("landuse", &["residential", "farmland", "forest"]),
    ("amenity", &["parking", "school", "restaurant"]),
    ("addr:housenumber", &[]),
    ("addr:street", &[]),
    ("addr:city", &[]),
    ("addr:postcode", &[]),
    ("surface", &["paved", "unpaved", "asphalt", "gravel"]),
    ("oneway", &["yes", "no"]),
    ("waterway", &["stream", "river", "drain"]),
    ("leisure", &["park", "pitch", "garden"]),
    ("barrier", &["fence", "wall", "gate"]),
];

/// Keys that are never persisted, regardless of dictionary membership.
const SKIP_KEYS: &[&str] = &["created_by", "import_uuid", "attribution"];
const SKIP_PREFIXES: &[&str] = &["source", "tiger:"];

/// Returns true if the key/value pair must be omitted entirely.
pub fn should_skip(key: &str) -> bool {
    SKIP_KEYS.contains(&key) || SKIP_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Outcome of looking up a key/value pair in the dictionary, matching the
/// three encodings of a tag record.
pub enum Code {
    /// `code > 0`: both key and value are dictionary entries; nothing
    /// else needs to be written.
    Full(i8),
    /// `code < 0`: the key is dictionary-resolved; the value is written
    /// verbatim as a NUL-terminated string.
    KeyOnly(i8),
    /// `code == 0`: neither side is recognized; both are written
    /// verbatim as NUL-terminated strings.
    None,
}

pub fn encode(key: &str, val: &str) -> Code {
    for (idx, (dict_key, values)) in DICTIONARY.iter().enumerate() {
        if *dict_key == key {
            let code = (idx + 1) as i8;
            // Only the first listed value is recoverable from the code
            // alone; any other dictionary value still needs the value
            // bytes written out, same as an unrecognized value.
            if values.first() == Some(&val) {
                return Code::Full(code);
            }
            return Code::KeyOnly(-code);
        }
    }
    Code::None
}

/// Resolves a positive or negative dictionary code back to its key, and
/// for positive codes, the value is expected in the accompanying slot.
pub fn decode_key(code: i8) -> Option<&'static str> {
    let idx = code.unsigned_abs() as usize;
    DICTIONARY.get(idx.checked_sub(1)?).map(|(k, _)| *k)
}

/// For a positive full-match code, resolves the value too. `encode` only
/// ever emits `Full` when the value is a key's first listed value, so
/// that's the only value a full-match code can mean.
pub fn decode_full(code: i8) -> Option<(&'static str, &'static str)> {
    if code <= 0 {
        return None;
    }
    let idx = (code - 1) as usize;
    let (key, values) = DICTIONARY.get(idx)?;
    values.first().map(|v| (*key, *v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_list_matches_spec() {
        assert!(should_skip("created_by"));
        assert!(should_skip("import_uuid"));
        assert!(should_skip("attribution"));
        assert!(should_skip("source"));
        assert!(should_skip("source:date"));
        assert!(should_skip("tiger:county"));
        assert!(!should_skip("name"));
        assert!(!should_skip("highway"));
    }

    #[test]
    fn dictionary_round_trips() {
        match encode("highway", "residential") {
            Code::Full(code) => {
                assert!(code > 0);
                assert_eq!(decode_full(code), Some(("highway", "residential")));
            }
            _ => panic!("expected full match"),
        }
    }

    #[test]
    fn unknown_key_value_falls_back() {
        match encode("shop", "bakery") {
            Code::None => {}
            _ => panic!("expected no match"),
        }
    }

    #[test]
    fn known_key_unknown_value_is_key_only() {
        match encode("highway", "motorway_link_ramp_exotic") {
            Code::KeyOnly(code) => {
                assert!(code < 0);
                assert_eq!(decode_key(code), Some("highway"));
            }
            _ => panic!("expected key-only match"),
        }
    }

    /// A non-first dictionary value must not be confused with the first
    /// one on read-back: `encode` has to fall back to `KeyOnly` for it
    /// since `Full`'s code byte alone can't distinguish which value.
    #[test]
    fn non_first_dictionary_value_is_key_only_not_full() {
        match encode("highway", "service") {
            Code::KeyOnly(code) => {
                assert!(code < 0);
                assert_eq!(decode_key(code), Some("highway"));
            }
            _ => panic!("expected key-only match to avoid corrupting the value"),
        }
    }
}
