//! Package descriptor parsing.
//!
//! A descriptor names a package and, optionally, the version to verify:
//! `[@scope/]name[@versionSpec]`. Parsing is purely syntactic; whether the
//! package or version exists is decided by the registry.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a package descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The descriptor was empty.
    #[error("package descriptor is empty")]
    Empty,

    /// The descriptor contains whitespace.
    #[error("package descriptor '{input}' must not contain whitespace")]
    Whitespace {
        /// The rejected descriptor.
        input: String,
    },

    /// A scoped descriptor has no `/` separating scope and name.
    #[error("scoped package descriptor '{input}' is missing '/' after the scope")]
    MissingScopeSeparator {
        /// The rejected descriptor.
        input: String,
    },

    /// The scope between `@` and `/` is empty.
    #[error("package descriptor '{input}' has an empty scope")]
    EmptyScope {
        /// The rejected descriptor.
        input: String,
    },

    /// The package name is empty.
    #[error("package descriptor '{input}' is missing a package name")]
    EmptyName {
        /// The rejected descriptor.
        input: String,
    },

    /// The descriptor ends with `@` and no version.
    #[error("package descriptor '{input}' has an empty version after '@'")]
    EmptyVersion {
        /// The rejected descriptor.
        input: String,
    },
}

/// A parsed `[@scope/]name[@versionSpec]` descriptor.
///
/// # Examples
///
/// ```
/// use provenance_verifier::descriptor::PackageDescriptor;
///
/// let descriptor: PackageDescriptor = "@scope/name@1.2.3".parse()?;
/// assert_eq!(descriptor.scope(), Some("@scope"));
/// assert_eq!(descriptor.name(), "name");
/// assert_eq!(descriptor.version_spec(), Some("1.2.3"));
/// assert_eq!(descriptor.registry_path(), "@scope/name");
/// # Ok::<(), provenance_verifier::descriptor::DescriptorError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageDescriptor {
    scope: Option<String>,
    name: String,
    version_spec: Option<String>,
}

impl PackageDescriptor {
    /// Parse a descriptor string.
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`] describing the first syntactic problem.
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        if input.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if input.chars().any(char::is_whitespace) {
            return Err(DescriptorError::Whitespace {
                input: input.to_owned(),
            });
        }

        let (scope, rest) = match input.strip_prefix('@') {
            Some(scoped) => {
                let (scope, rest) =
                    scoped
                        .split_once('/')
                        .ok_or_else(|| DescriptorError::MissingScopeSeparator {
                            input: input.to_owned(),
                        })?;
                if scope.is_empty() {
                    return Err(DescriptorError::EmptyScope {
                        input: input.to_owned(),
                    });
                }
                (Some(format!("@{scope}")), rest)
            }
            None => (None, input),
        };

        let (name, version_spec) = match rest.split_once('@') {
            Some((_, "")) => {
                return Err(DescriptorError::EmptyVersion {
                    input: input.to_owned(),
                });
            }
            Some((name, version)) => (name, Some(version.to_owned())),
            None => (rest, None),
        };
        if name.is_empty() {
            return Err(DescriptorError::EmptyName {
                input: input.to_owned(),
            });
        }

        Ok(Self {
            scope,
            name: name.to_owned(),
            version_spec,
        })
    }

    /// Return the scope including its leading `@`, if any.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Return the unscoped package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the requested version, tag, or range, if any.
    #[must_use]
    pub fn version_spec(&self) -> Option<&str> {
        self.version_spec.as_deref()
    }

    /// Return the path of the package document under the registry root.
    #[must_use]
    pub fn registry_path(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{scope}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl FromStr for PackageDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.registry_path())?;
        if let Some(version) = &self.version_spec {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::scoped_with_version("@scope/name@1.2.3", Some("@scope"), "name", Some("1.2.3"))]
    #[case::unscoped_with_version("name@1.2.3", None, "name", Some("1.2.3"))]
    #[case::unscoped_bare("left-pad", None, "left-pad", None)]
    #[case::scoped_bare("@babel/core", Some("@babel"), "core", None)]
    #[case::dist_tag("react@next", None, "react", Some("next"))]
    #[case::range("lodash@^4.17.0", None, "lodash", Some("^4.17.0"))]
    #[case::version_with_at("name@npm:other@1.0.0", None, "name", Some("npm:other@1.0.0"))]
    fn parses_valid_descriptors(
        #[case] input: &str,
        #[case] scope: Option<&str>,
        #[case] name: &str,
        #[case] version: Option<&str>,
    ) {
        let descriptor = PackageDescriptor::parse(input).expect("valid descriptor");
        assert_eq!(descriptor.scope(), scope);
        assert_eq!(descriptor.name(), name);
        assert_eq!(descriptor.version_spec(), version);
    }

    #[rstest]
    #[case::empty("", DescriptorError::Empty)]
    #[case::whitespace("left pad", DescriptorError::Whitespace { input: "left pad".to_owned() })]
    #[case::no_separator(
        "@scope",
        DescriptorError::MissingScopeSeparator { input: "@scope".to_owned() }
    )]
    #[case::empty_scope("@/name", DescriptorError::EmptyScope { input: "@/name".to_owned() })]
    #[case::empty_scoped_name(
        "@scope/",
        DescriptorError::EmptyName { input: "@scope/".to_owned() }
    )]
    #[case::version_only(
        "@1.0.0",
        DescriptorError::MissingScopeSeparator { input: "@1.0.0".to_owned() }
    )]
    #[case::bare_version("name@", DescriptorError::EmptyVersion { input: "name@".to_owned() })]
    #[case::missing_name(
        "@scope/@1.0.0",
        DescriptorError::EmptyName { input: "@scope/@1.0.0".to_owned() }
    )]
    fn rejects_malformed_descriptors(#[case] input: &str, #[case] expected: DescriptorError) {
        assert_eq!(PackageDescriptor::parse(input), Err(expected));
    }

    #[rstest]
    #[case("@scope/name@1.2.3")]
    #[case("name@latest")]
    #[case("name")]
    fn display_round_trips_the_input(#[case] input: &str) {
        let descriptor: PackageDescriptor = input.parse().expect("valid descriptor");
        assert_eq!(descriptor.to_string(), input);
    }

    #[test]
    fn registry_path_keeps_scope_separator() {
        let descriptor = PackageDescriptor::parse("@types/node@20.0.0").expect("valid");
        assert_eq!(descriptor.registry_path(), "@types/node");
    }
}
