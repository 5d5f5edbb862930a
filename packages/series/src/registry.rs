//! Registry of municipalities the forecaster supports.
//!
//! The default set is the TOML file in `registry/` baked into the binary
//! with [`include_str!`]. Deployments that track a different set of
//! municipalities pass their own file to [`MunicipalityRegistry::from_path`]
//! instead of changing code.

use std::collections::BTreeMap;
use std::path::Path;

use dengue_watch_series_models::Municipality;
use serde::Deserialize;

use crate::SeriesError;

/// Municipality registry embedded at compile time.
const EMBEDDED_REGISTRY_TOML: &str = include_str!("../registry/municipalities.toml");

/// Number of municipalities in the embedded registry. Enforced by a test.
#[cfg(test)]
const EXPECTED_MUNICIPALITY_COUNT: usize = 33;

/// On-disk layout: a list of `[[municipality]]` tables.
#[derive(Debug, Deserialize)]
struct RegistryFile {
    municipality: Vec<Municipality>,
}

/// Lookup table from IBGE code to [`Municipality`].
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityRegistry {
    municipalities: BTreeMap<String, Municipality>,
}

impl MunicipalityRegistry {
    /// Returns the registry compiled into the binary.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed. It is a compile-time
    /// constant, so a failure here is a development error caught by tests.
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml_str(EMBEDDED_REGISTRY_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded municipality registry: {e}"))
    }

    /// Parses a registry from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::RegistryParse`] for malformed TOML and
    /// [`SeriesError::Registry`] for duplicate codes or blank fields.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, SeriesError> {
        let file: RegistryFile = toml::from_str(toml_str)?;
        Self::from_municipalities(file.municipality)
    }

    /// Reads a registry TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Io`] if the file cannot be read, plus the
    /// conditions of [`Self::from_toml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeriesError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let registry = Self::from_toml_str(&contents)?;
        log::info!(
            "Loaded {} municipalities from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Builds a registry from already-parsed entries.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Registry`] if a code repeats or a code or
    /// name is blank.
    pub fn from_municipalities(
        entries: impl IntoIterator<Item = Municipality>,
    ) -> Result<Self, SeriesError> {
        let mut municipalities = BTreeMap::new();

        for entry in entries {
            if entry.code.trim().is_empty() || entry.name.trim().is_empty() {
                return Err(SeriesError::Registry {
                    message: format!("Municipality entry has a blank code or name: {entry:?}"),
                });
            }
            let code = entry.code.trim().to_string();
            if municipalities.contains_key(&code) {
                return Err(SeriesError::Registry {
                    message: format!("Duplicate municipality code: {code}"),
                });
            }
            let municipality = Municipality {
                code: code.clone(),
                name: entry.name.trim().to_string(),
                state: entry.state.trim().to_string(),
                ..entry
            };
            municipalities.insert(code, municipality);
        }

        Ok(Self { municipalities })
    }

    /// Looks up a municipality by IBGE code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Municipality> {
        self.municipalities.get(code)
    }

    /// Returns `true` if `code` is registered.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.municipalities.contains_key(code)
    }

    /// Iterates over municipalities ordered by code.
    pub fn iter(&self) -> impl Iterator<Item = &Municipality> {
        self.municipalities.values()
    }

    /// Number of registered municipalities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.municipalities.len()
    }

    /// Returns `true` if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.municipalities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_embedded_registry() {
        let registry = MunicipalityRegistry::embedded();
        assert_eq!(
            registry.len(),
            EXPECTED_MUNICIPALITY_COUNT,
            "Expected {EXPECTED_MUNICIPALITY_COUNT} municipalities, found {}. \
             Update EXPECTED_MUNICIPALITY_COUNT after adding/removing entries.",
            registry.len()
        );
    }

    #[test]
    fn embedded_entries_have_required_fields() {
        for m in MunicipalityRegistry::embedded().iter() {
            assert_eq!(m.code.len(), 7, "{} has a non-IBGE code", m.name);
            assert_eq!(m.state.len(), 2, "{} has invalid state: {}", m.name, m.state);
            assert!(
                (-34.0..=6.0).contains(&m.latitude) && (-74.0..=-34.0).contains(&m.longitude),
                "{} has coordinates outside Brazil",
                m.name
            );
        }
    }

    #[test]
    fn resolves_known_code() {
        let registry = MunicipalityRegistry::embedded();
        assert_eq!(registry.get("3106200").map(|m| m.name.as_str()), Some("Belo Horizonte"));
        assert!(!registry.contains("0000000"));
    }

    #[test]
    fn rejects_duplicate_codes() {
        let toml_str = r#"
            [[municipality]]
            code = "1"
            name = "A"
            state = "MG"
            latitude = 0.0
            longitude = 0.0

            [[municipality]]
            code = "1"
            name = "B"
            state = "MG"
            latitude = 0.0
            longitude = 0.0
        "#;
        let err = MunicipalityRegistry::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, SeriesError::Registry { .. }));
    }

    #[test]
    fn trims_padded_fields() {
        let toml_str = r#"
            [[municipality]]
            code = " 3106200 "
            name = " Belo Horizonte"
            state = "MG "
            latitude = -19.9167
            longitude = -43.9345
        "#;
        let registry = MunicipalityRegistry::from_toml_str(toml_str).unwrap();
        let m = registry.get("3106200").unwrap();
        assert_eq!(m.code, "3106200");
        assert_eq!(m.name, "Belo Horizonte");
        assert_eq!(m.state, "MG");
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = MunicipalityRegistry::from_toml_str("[[municipality]]\ncode = ").unwrap_err();
        assert!(matches!(err, SeriesError::RegistryParse(_)));
    }
}
