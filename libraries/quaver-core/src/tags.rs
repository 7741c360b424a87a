//! Music tags
//!
//! A [`Tags`] value is an immutable multi-valued mapping from tag name to an
//! ordered list of values. Tags can repeat values, and the repetition is
//! meaningful: `{"artist": ["a", "a"]}` is a different set of tags than
//! `{"artist": ["a"]}`.
//!
//! Names starting with `~` are pseudo-tags: values that do not exist in a
//! file's real tags, either supplied by the scanner (`~filename`) or derived
//! from other tags (`~parsed_tracknumber`).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Prefix that all pseudo-tag names start with.
pub const PSEUDO_PREFIX: &str = "~";

/// A well-known tag.
///
/// Code that needs a specific tag (e.g. the track number) should use this
/// enum. Code working with arbitrary tags (e.g. a user-entered query) may use
/// raw `&str` names instead; both normalize through [`TagName`].
///
/// See <https://picard.musicbrainz.org/docs/tags/> for documentation on the
/// file-native tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    /// Album title.
    Album,
    /// Album artist.
    AlbumArtist,
    /// Track artist.
    Artist,
    /// Disc number, possibly in `N/Total` form. Prefer [`Tag::ParsedDiscNumber`].
    DiscNumber,
    /// Total discs. Prefer [`Tag::ParsedTotalDiscs`].
    DiscTotal,
    /// MusicBrainz release id.
    MusicbrainzAlbumId,
    /// Track title.
    Title,
    /// Total discs. Prefer [`Tag::ParsedTotalDiscs`].
    TotalDiscs,
    /// Total tracks. Prefer [`Tag::ParsedTotalTracks`].
    TotalTracks,
    /// Track number, possibly in `N/Total` form. Prefer [`Tag::ParsedTrackNumber`].
    TrackNumber,
    /// Total tracks. Prefer [`Tag::ParsedTotalTracks`].
    TrackTotal,

    /// Pseudo-tag: file basename, from the scanner.
    Basename,
    /// Pseudo-tag: absolute directory name, from the scanner.
    Dirname,
    /// Pseudo-tag: duration in seconds as a float, from the scanner.
    DurationSeconds,
    /// Pseudo-tag: full filename, from the scanner.
    Filename,

    /// Derived pseudo-tag: human-readable duration.
    DurationHuman,
    /// Derived pseudo-tag: disc number with any `/Total` suffix stripped.
    ParsedDiscNumber,
    /// Derived pseudo-tag: total discs, from whichever tag supplies it.
    ParsedTotalDiscs,
    /// Derived pseudo-tag: total tracks, from whichever tag supplies it.
    ParsedTotalTracks,
    /// Derived pseudo-tag: track number with any `/Total` suffix stripped.
    ParsedTrackNumber,
}

impl Tag {
    /// Canonical string name of the tag.
    pub const fn name(self) -> &'static str {
        match self {
            Tag::Album => "album",
            Tag::AlbumArtist => "albumartist",
            Tag::Artist => "artist",
            Tag::DiscNumber => "discnumber",
            Tag::DiscTotal => "disctotal",
            Tag::MusicbrainzAlbumId => "musicbrainz_albumid",
            Tag::Title => "title",
            Tag::TotalDiscs => "totaldiscs",
            Tag::TotalTracks => "totaltracks",
            Tag::TrackNumber => "tracknumber",
            Tag::TrackTotal => "tracktotal",
            Tag::Basename => "~basename",
            Tag::Dirname => "~dirname",
            Tag::DurationSeconds => "~duration_seconds",
            Tag::Filename => "~filename",
            Tag::DurationHuman => "~duration_human",
            Tag::ParsedDiscNumber => "~parsed_discnumber",
            Tag::ParsedTotalDiscs => "~parsed_totaldiscs",
            Tag::ParsedTotalTracks => "~parsed_totaltracks",
            Tag::ParsedTrackNumber => "~parsed_tracknumber",
        }
    }
}

/// Tags whose values are recomputed by [`Tags::derive`].
const DERIVED_TAGS: [Tag; 5] = [
    Tag::DurationHuman,
    Tag::ParsedDiscNumber,
    Tag::ParsedTotalDiscs,
    Tag::ParsedTotalTracks,
    Tag::ParsedTrackNumber,
];

/// Normalization boundary for tag identifiers.
///
/// Anything that can name a tag — a well-known [`Tag`] or a raw string —
/// converts to its canonical string form here, before map access.
pub trait TagName {
    /// Canonical string name.
    fn tag_name(&self) -> &str;
}

impl TagName for Tag {
    fn tag_name(&self) -> &str {
        self.name()
    }
}

impl TagName for &str {
    fn tag_name(&self) -> &str {
        self
    }
}

impl TagName for String {
    fn tag_name(&self) -> &str {
        self
    }
}

/// Tags from a file/track, or composed for a medium or album.
///
/// Immutable after construction; "modification" means building a new value.
/// Equality is by mapping content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, Vec<String>>);

impl Tags {
    /// Builds tags from (name, values) entries.
    ///
    /// Entries repeating a name have their values appended in order.
    pub fn new<I, N, V, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: TagName,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, values) in entries {
            map.entry(name.tag_name().to_string())
                .or_default()
                .extend(values.into_iter().map(Into::into));
        }
        map.retain(|_, values| !values.is_empty());
        Self(map)
    }

    /// All values for a tag, or an empty slice if the tag is absent.
    pub fn get(&self, name: impl TagName) -> &[String] {
        self.0.get(name.tag_name()).map_or(&[], Vec::as_slice)
    }

    /// Whether the tag has at least one value.
    pub fn contains(&self, name: impl TagName) -> bool {
        self.0.contains_key(name.tag_name())
    }

    /// A single value, or `None` unless there is exactly one value.
    pub fn one_or_none(&self, name: impl TagName) -> Option<&str> {
        match self.get(name) {
            [value] => Some(value),
            _ => None,
        }
    }

    /// A single integer value, or `None` if that's not possible.
    pub fn int_or_none(&self, name: impl TagName) -> Option<u32> {
        self.one_or_none(name)?.parse().ok()
    }

    /// A single display value representing all of a tag's values.
    ///
    /// The given tags are checked in order and the first present one is used;
    /// multiple values are joined with `separator`.
    pub fn singular<N: TagName>(&self, names: &[N], default: &str, separator: &str) -> String {
        for name in names {
            let values = self.get(name.tag_name());
            if !values.is_empty() {
                return values.join(separator);
            }
        }
        default.to_string()
    }

    /// Iterates over (name, values) pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct tag names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no tags at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a copy of self with all derived pseudo-tags recomputed.
    pub fn derive(&self) -> Tags {
        self.derive_only(&DERIVED_TAGS)
    }

    fn derive_only(&self, which: &[Tag]) -> Tags {
        let mut map = self.0.clone();
        for tag in which {
            map.remove(tag.name());
        }
        for tag in which {
            if let Some(values) = self.derived_values(*tag) {
                map.insert(tag.name().to_string(), values);
            }
        }
        Self(map)
    }

    fn derived_values(&self, tag: Tag) -> Option<Vec<String>> {
        match tag {
            Tag::DurationHuman => self.duration_human(),
            Tag::ParsedDiscNumber => self.index_or_total(true, Tag::DiscNumber, &[]),
            Tag::ParsedTrackNumber => self.index_or_total(true, Tag::TrackNumber, &[]),
            Tag::ParsedTotalDiscs => {
                self.index_or_total(false, Tag::DiscNumber, &[Tag::TotalDiscs, Tag::DiscTotal])
            }
            Tag::ParsedTotalTracks => {
                self.index_or_total(false, Tag::TrackNumber, &[Tag::TotalTracks, Tag::TrackTotal])
            }
            _ => None,
        }
    }

    /// Derives an index or total from `N`/`N/Total`-style tags.
    ///
    /// Plain tags that carry only the intended value win over the composite
    /// form. An unparsable composite value passes through unchanged when the
    /// index is wanted, so odd-but-present data is preserved.
    fn index_or_total(&self, is_index: bool, composite: Tag, plain: &[Tag]) -> Option<Vec<String>> {
        for tag in plain {
            if self.contains(*tag) {
                return Some(self.get(*tag).to_vec());
            }
        }
        let value = self.one_or_none(composite)?;
        match split_index_total(value) {
            Some((index, total)) => {
                let part = if is_index { Some(index) } else { total };
                part.map(|part| vec![part.to_string()])
            }
            None => is_index.then(|| vec![value.to_string()]),
        }
    }

    fn duration_human(&self) -> Option<Vec<String>> {
        let seconds: f64 = self.one_or_none(Tag::DurationSeconds)?.parse().ok()?;
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let total = seconds.round() as u64;
        let (hours, remainder) = (total / 3600, total % 3600);
        let (minutes, seconds) = (remainder / 60, remainder % 60);
        let human = if hours > 0 {
            format!("{hours}\u{2236}{minutes:02}\u{2236}{seconds:02}")
        } else {
            format!("{minutes}\u{2236}{seconds:02}")
        };
        Some(vec![human])
    }
}

/// Splits an `N` or `N/Total` value into its parts, or `None` if the value
/// doesn't match either form.
fn split_index_total(value: &str) -> Option<(&str, Option<&str>)> {
    fn digits(s: &str) -> bool {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
    }
    match value.split_once('/') {
        Some((index, total)) if digits(index) && digits(total) => Some((index, Some(total))),
        Some(_) => None,
        None if digits(value) => Some((value, None)),
        None => None,
    }
}

/// Tag names excluded from intersection when composing.
fn excluded_from_intersection(name: &str) -> bool {
    name == Tag::DurationSeconds.name() || name == Tag::DurationHuman.name()
}

/// Returns the tags for an entity composed of tagged sub-entities.
///
/// E.g. the tags for a medium composed of tracks. The composite entity's
/// tags are the multiset intersection of its components' tags: a
/// (name, value) pair survives with the minimum multiplicity it has across
/// all components. Durations are the exception — they are summed rather than
/// intersected. Empty input composes to empty tags.
pub fn compose<'a, I>(components: I) -> Tags
where
    I: IntoIterator<Item = &'a Tags>,
{
    let components: Vec<&Tags> = components.into_iter().collect();
    let Some((first, rest)) = components.split_first() else {
        return Tags::default();
    };

    let mut min_counts: HashMap<(&str, &str), usize> = HashMap::new();
    for (name, values) in first.iter() {
        if excluded_from_intersection(name) {
            continue;
        }
        for value in values {
            *min_counts.entry((name, value.as_str())).or_insert(0) += 1;
        }
    }
    for tags in rest {
        let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
        for (name, values) in tags.iter() {
            if excluded_from_intersection(name) {
                continue;
            }
            for value in values {
                *counts.entry((name, value.as_str())).or_insert(0) += 1;
            }
        }
        min_counts.retain(|pair, min| match counts.get(pair) {
            Some(count) => {
                *min = (*min).min(*count);
                true
            }
            None => false,
        });
    }

    // Rebuild in the first component's value order, consuming multiplicity.
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, values) in first.iter() {
        if excluded_from_intersection(name) {
            continue;
        }
        for value in values {
            if let Some(remaining) = min_counts.get_mut(&(name, value.as_str())) {
                if *remaining > 0 {
                    *remaining -= 1;
                    map.entry(name.to_string()).or_default().push(value.clone());
                }
            }
        }
    }

    if let Some(total) = summed_duration(&components) {
        map.insert(
            Tag::DurationSeconds.name().to_string(),
            vec![total.to_string()],
        );
    }

    Tags(map).derive_only(&[Tag::DurationHuman])
}

/// Sum of the components' durations, if every component has exactly one
/// parsable duration value.
fn summed_duration(components: &[&Tags]) -> Option<f64> {
    if components.is_empty() {
        return None;
    }
    components
        .iter()
        .map(|tags| {
            tags.one_or_none(Tag::DurationSeconds)
                .and_then(|value| value.parse::<f64>().ok())
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lookup_by_enum_and_raw_string_agree() {
        let tags = Tags::new([(Tag::Album, ["Blue"])]);
        assert_eq!(tags.get(Tag::Album), ["Blue"]);
        assert_eq!(tags.get("album"), ["Blue"]);
        assert!(tags.contains("album"));
        assert!(!tags.contains("artist"));
    }

    #[test]
    fn values_preserve_multiplicity_and_order() {
        let tags = Tags::new([("artist", vec!["a", "b", "a"])]);
        assert_eq!(tags.get("artist"), ["a", "b", "a"]);
    }

    #[test]
    fn one_or_none_requires_exactly_one_value() {
        let tags = Tags::new([("artist", vec!["a", "b"]), ("album", vec!["x"])]);
        assert_eq!(tags.one_or_none("album"), Some("x"));
        assert_eq!(tags.one_or_none("artist"), None);
        assert_eq!(tags.one_or_none("missing"), None);
    }

    #[test]
    fn int_or_none_parses_single_value() {
        let tags = Tags::new([("tracknumber", ["7"]), ("discnumber", ["x"])]);
        assert_eq!(tags.int_or_none(Tag::TrackNumber), Some(7));
        assert_eq!(tags.int_or_none(Tag::DiscNumber), None);
    }

    #[test]
    fn singular_joins_and_falls_back() {
        let tags = Tags::new([("artist", vec!["a", "b"])]);
        assert_eq!(
            tags.singular(&[Tag::AlbumArtist, Tag::Artist], "[unknown]", "; "),
            "a; b"
        );
        assert_eq!(tags.singular(&[Tag::Title], "[unknown]", "; "), "[unknown]");
    }

    #[test]
    fn derive_parses_index_and_total_from_composite() {
        let tags = Tags::new([("tracknumber", ["3/12"]), ("discnumber", ["1"])]).derive();
        assert_eq!(tags.get(Tag::ParsedTrackNumber), ["3"]);
        assert_eq!(tags.get(Tag::ParsedTotalTracks), ["12"]);
        assert_eq!(tags.get(Tag::ParsedDiscNumber), ["1"]);
        assert!(!tags.contains(Tag::ParsedTotalDiscs));
    }

    #[test]
    fn derive_prefers_plain_total_tags() {
        let tags = Tags::new([("tracknumber", ["3/12"]), ("totaltracks", ["14"])]).derive();
        assert_eq!(tags.get(Tag::ParsedTotalTracks), ["14"]);
    }

    #[test]
    fn derive_passes_unparsable_index_through() {
        let tags = Tags::new([("tracknumber", ["A1"])]).derive();
        assert_eq!(tags.get(Tag::ParsedTrackNumber), ["A1"]);
        assert!(!tags.contains(Tag::ParsedTotalTracks));
    }

    #[test]
    fn derive_formats_human_duration() {
        let minutes = Tags::new([("~duration_seconds", ["245.3"])]).derive();
        assert_eq!(minutes.get(Tag::DurationHuman), ["4\u{2236}05"]);

        let hours = Tags::new([("~duration_seconds", ["3725.0"])]).derive();
        assert_eq!(hours.get(Tag::DurationHuman), ["1\u{2236}02\u{2236}05"]);
    }

    #[test]
    fn derive_is_recomputed_not_accumulated() {
        let tags = Tags::new([
            ("tracknumber", ["3"]),
            ("~parsed_tracknumber", ["999"]), // stale
        ])
        .derive();
        assert_eq!(tags.get(Tag::ParsedTrackNumber), ["3"]);
    }

    #[test]
    fn compose_of_nothing_is_empty() {
        assert!(compose([]).is_empty());
    }

    #[test]
    fn compose_keeps_min_multiplicity() {
        let a = Tags::new([("artist", vec!["x", "x", "y"])]);
        let b = Tags::new([("artist", vec!["x", "x", "x"])]);
        let composed = compose([&a, &b]);
        assert_eq!(composed.get("artist"), ["x", "x"]);
    }

    #[test]
    fn compose_drops_pairs_absent_from_any_component() {
        let a = Tags::new([("album", ["A"]), ("artist", ["x"])]);
        let b = Tags::new([("album", ["A"]), ("artist", ["y"])]);
        let composed = compose([&a, &b]);
        assert_eq!(composed.get("album"), ["A"]);
        assert!(!composed.contains("artist"));
    }

    #[test]
    fn compose_sums_durations_instead_of_intersecting() {
        let a = Tags::new([("album", ["A"]), ("~duration_seconds", ["1.5"])]);
        let b = Tags::new([("album", ["A"]), ("~duration_seconds", ["2.5"])]);
        let composed = compose([&a, &b]);
        assert_eq!(composed.get(Tag::DurationSeconds), ["4"]);
        assert_eq!(composed.get(Tag::DurationHuman), ["0\u{2236}04"]);
    }

    #[test]
    fn compose_omits_duration_when_any_component_lacks_it() {
        let a = Tags::new([("~duration_seconds", ["1.5"])]);
        let b = Tags::new([("album", ["A"])]);
        let composed = compose([&a, &b]);
        assert!(!composed.contains(Tag::DurationSeconds));
        assert!(!composed.contains(Tag::DurationHuman));
    }

    fn arb_tags() -> impl Strategy<Value = Tags> {
        proptest::collection::btree_map(
            "[a-c]{1,2}",
            proptest::collection::vec("[x-z]", 1..4),
            0..4,
        )
        .prop_map(|map| Tags::new(map))
    }

    proptest! {
        #[test]
        fn compose_multiplicity_is_pairwise_minimum(a in arb_tags(), b in arb_tags()) {
            let composed = compose([&a, &b]);
            for (name, values) in composed.iter() {
                for value in values {
                    let n = |tags: &Tags| {
                        tags.get(name).iter().filter(|v| *v == value).count()
                    };
                    let composed_count = n(&composed);
                    prop_assert_eq!(composed_count, n(&a).min(n(&b)));
                    prop_assert!(composed_count > 0);
                }
            }
            // Nothing appears that is absent from either input.
            for (name, values) in a.iter() {
                for value in values {
                    if !b.get(name).contains(value) {
                        prop_assert!(!composed.get(name).contains(value));
                    }
                }
            }
        }
    }
}
