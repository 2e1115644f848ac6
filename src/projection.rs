//! Projection allowlist and the rules deciding whether a collection's
//! declared projection is acceptable downstream.

use std::collections::BTreeMap;

use log::warn;

use crate::extent::{Extent, MERCATOR_EXTENT, WGS84_EXTENT};
use crate::model::LoadedCollection;

pub const WGS84: &str = "EPSG:4326";
pub const WEB_MERCATOR: &str = "EPSG:3857";
pub const LEGACY_WEB_MERCATOR: &str = "EPSG:900913";

/// Always accepted, whatever the host configuration says.
pub const DEFAULT_PROJECTIONS: [&str; 3] = [WGS84, WEB_MERCATOR, LEGACY_WEB_MERCATOR];

/// Projection identifiers the downstream spatial engine interprets correctly,
/// each with the extent its coordinates must stay within, when known.
///
/// Built once per batch and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionAllowlist {
    codes: BTreeMap<String, Option<Extent>>,
}

impl Default for ProjectionAllowlist {
    fn default() -> Self {
        let mut codes = BTreeMap::new();
        codes.insert(normalize(WGS84), Some(WGS84_EXTENT));
        codes.insert(normalize(WEB_MERCATOR), Some(MERCATOR_EXTENT));
        codes.insert(normalize(LEGACY_WEB_MERCATOR), Some(MERCATOR_EXTENT));
        Self { codes }
    }
}

impl ProjectionAllowlist {
    /// Defaults plus the given codes, none of them with a known extent.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        codes
            .into_iter()
            .fold(Self::default(), |list, code| list.with_code(code.as_ref(), None))
    }

    /// Add a configured code. Built-in defaults keep their own extent.
    pub fn with_code(mut self, code: &str, extent: Option<Extent>) -> Self {
        let key = normalize(code);
        if key.is_empty() {
            return self;
        }
        if DEFAULT_PROJECTIONS.iter().any(|default| normalize(default) == key) {
            return self;
        }
        let slot = self.codes.entry(key).or_insert(None);
        if extent.is_some() {
            *slot = extent;
        }
        self
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains_key(&normalize(code))
    }

    /// Valid extent for coordinates in `projection`.
    ///
    /// Undeclared projections are read as WGS84. Returns `None` when the
    /// projection is allowed but its extent is unknown.
    pub fn extent_for(&self, projection: Option<&str>) -> Option<Extent> {
        match projection {
            None => Some(WGS84_EXTENT),
            Some(code) => self.codes.get(&normalize(code)).copied().flatten(),
        }
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Nothing declared; legacy files are optimistically accepted.
    PassUndeclared,
    /// Carries the offending projection identifier.
    Reject(String),
}

pub fn validate(collection: &LoadedCollection, allowlist: &ProjectionAllowlist) -> Verdict {
    match collection.projection.as_deref() {
        None => Verdict::PassUndeclared,
        Some(code) if allowlist.contains(code) => Verdict::Pass,
        Some(code) => {
            warn!(
                "{} declares projection {} which is not allowlisted",
                collection.file_name, code
            );
            Verdict::Reject(code.to_owned())
        }
    }
}

/// Validate the layers converted from one archive.
///
/// When at least one layer declares a projection, every declaring layer must
/// be allowlisted. Layers without a declaration are not checked on their own.
/// The first offending layer, in layer order, is reported.
pub fn validate_layers(layers: &[LoadedCollection], allowlist: &ProjectionAllowlist) -> Verdict {
    let mut declared = layers
        .iter()
        .filter(|layer| layer.projection.is_some())
        .peekable();
    if declared.peek().is_none() {
        return Verdict::PassUndeclared;
    }
    declared
        .map(|layer| validate(layer, allowlist))
        .find(|verdict| matches!(verdict, Verdict::Reject(_)))
        .unwrap_or(Verdict::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::FeatureCollection;
    use rstest::{fixture, rstest};

    #[fixture]
    fn allowlist() -> ProjectionAllowlist {
        ProjectionAllowlist::from_codes(["EPSG:2154", "EPSG:27572"])
    }

    fn layer(projection: Option<&str>) -> LoadedCollection {
        LoadedCollection::new(
            "layer.zip",
            FeatureCollection {
                bbox: None,
                features: Vec::new(),
                foreign_members: None,
            },
        )
        .with_projection(projection.map(str::to_owned))
    }

    #[test]
    fn defaults_are_always_present() {
        let list = ProjectionAllowlist::from_codes(Vec::<String>::new());
        assert_eq!(list.len(), 3);
        for code in DEFAULT_PROJECTIONS {
            assert!(list.contains(code));
        }
    }

    #[rstest]
    fn configured_codes_extend_defaults(allowlist: ProjectionAllowlist) {
        assert_eq!(allowlist.len(), 5);
        assert!(allowlist.contains("EPSG:2154"));
        assert!(allowlist.contains(" epsg:2154 "));
        assert!(!allowlist.contains("EPSG:32631"));
    }

    #[rstest]
    #[case(None, Verdict::PassUndeclared)]
    #[case(Some("EPSG:4326"), Verdict::Pass)]
    #[case(Some("EPSG:900913"), Verdict::Pass)]
    #[case(Some("EPSG:2154"), Verdict::Pass)]
    #[case(Some("EPSG:32631"), Verdict::Reject("EPSG:32631".to_owned()))]
    fn single_collection(
        allowlist: ProjectionAllowlist,
        #[case] projection: Option<&str>,
        #[case] expected: Verdict,
    ) {
        assert_eq!(validate(&layer(projection), &allowlist), expected);
    }

    #[rstest]
    fn layers_without_declarations_pass_undeclared(allowlist: ProjectionAllowlist) {
        let layers = vec![layer(None), layer(None)];
        assert_eq!(validate_layers(&layers, &allowlist), Verdict::PassUndeclared);
        assert_eq!(validate_layers(&[], &allowlist), Verdict::PassUndeclared);
    }

    #[rstest]
    fn every_declared_layer_must_be_allowlisted(allowlist: ProjectionAllowlist) {
        let mixed_ok = vec![layer(None), layer(Some("EPSG:2154"))];
        assert_eq!(validate_layers(&mixed_ok, &allowlist), Verdict::Pass);

        let mixed_bad = vec![
            layer(Some("EPSG:4326")),
            layer(None),
            layer(Some("EPSG:32631")),
            layer(Some("EPSG:5698")),
        ];
        assert_eq!(
            validate_layers(&mixed_bad, &allowlist),
            Verdict::Reject("EPSG:32631".to_owned())
        );
    }

    #[test]
    fn extents_follow_declarations() {
        let list = ProjectionAllowlist::default().with_code(
            "EPSG:2154",
            Some(Extent::new(-378305.81, 6093283.21, 1212610.74, 7186901.68)),
        );
        assert_eq!(list.extent_for(None), Some(WGS84_EXTENT));
        assert_eq!(list.extent_for(Some("EPSG:3857")), Some(MERCATOR_EXTENT));
        assert!(list.extent_for(Some("EPSG:2154")).is_some());
        assert_eq!(list.extent_for(Some("EPSG:27572")), None);

        let overridden = list.with_code("EPSG:4326", Some(Extent::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(overridden.extent_for(Some("EPSG:4326")), Some(WGS84_EXTENT));
    }
}
