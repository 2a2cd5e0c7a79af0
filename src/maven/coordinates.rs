use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::maven::version::MavenVersion;

pub const DEFAULT_EXTENSION: &str = "jar";
pub const POM_EXTENSION: &str = "pom";

#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord)]
pub struct MavenArtifactId(pub String);

#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord)]
pub struct MavenGroupId(pub String);

#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord)]
pub enum MavenClassifier {
    Unclassified,
    Classified(String),
}
impl MavenClassifier {
    pub fn from_optional(classifier: Option<&str>) -> MavenClassifier {
        match classifier {
            None | Some("") => MavenClassifier::Unclassified,
            Some(c) => MavenClassifier::Classified(c.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MavenClassifier::Unclassified => None,
            MavenClassifier::Classified(c) => Some(c),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed coordinate {input:?}: {reason}")]
pub struct MalformedCoordinateError {
    pub input: String,
    pub reason: String,
}

/// A fully qualified artifact: `group:name[:extension[:classifier]]:version`.
///
/// Two coordinates that differ only in their version compete for the same slot in a resolved
///  class path, see [Coordinate::identity_key].
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct Coordinate {
    pub group_id: MavenGroupId,
    pub artifact_id: MavenArtifactId,
    pub version: MavenVersion,
    pub classifier: MavenClassifier,
    pub extension: String,
}

/// coordinate minus version - the unit of version conflicts
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub group_id: MavenGroupId,
    pub artifact_id: MavenArtifactId,
    pub classifier: MavenClassifier,
}

impl Coordinate {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Coordinate {
        Coordinate {
            group_id: MavenGroupId(group_id.to_string()),
            artifact_id: MavenArtifactId(artifact_id.to_string()),
            version: MavenVersion::new(version),
            classifier: MavenClassifier::Unclassified,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn parse(s: &str) -> Result<Coordinate, MalformedCoordinateError> {
        let malformed = |reason: &str| MalformedCoordinateError {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = s.trim().split(':').collect();
        let (group_id, artifact_id, extension, classifier, version) = match segments.as_slice() {
            [g, a, v] => (*g, *a, DEFAULT_EXTENSION, None, *v),
            [g, a, e, v] => (*g, *a, *e, None, *v),
            [g, a, e, c, v] => (*g, *a, *e, Some(*c), *v),
            _ if segments.len() < 3 => return Err(malformed("expected at least group:name:version")),
            _ => return Err(malformed("too many ':' separated segments")),
        };

        if group_id.is_empty() {
            return Err(malformed("empty group id"));
        }
        if artifact_id.is_empty() {
            return Err(malformed("empty artifact id"));
        }
        if extension.is_empty() {
            return Err(malformed("empty extension"));
        }
        if version.is_empty() {
            return Err(malformed("empty version"));
        }

        let coordinate = Coordinate {
            group_id: MavenGroupId(group_id.to_string()),
            artifact_id: MavenArtifactId(artifact_id.to_string()),
            version: MavenVersion::new(version),
            classifier: MavenClassifier::from_optional(classifier),
            extension: extension.to_string(),
        };
        coordinate.check_path_safe().map_err(|reason| malformed(&reason))?;
        Ok(coordinate)
    }

    /// Every part of a coordinate ends up as a path segment, both in the repository layout and
    ///  in the local cache. Separators, `.` / `..` and control characters are rejected, as are
    ///  empty segments of the dotted group id.
    pub fn check_path_safe(&self) -> Result<(), String> {
        for segment in self.group_id.0.split('.') {
            check_segment("group id", &self.group_id.0, segment)?;
        }
        check_segment("artifact id", &self.artifact_id.0, &self.artifact_id.0)?;
        check_segment("version", self.version.as_str(), self.version.as_str())?;
        check_segment("extension", &self.extension, &self.extension)?;
        if let Some(classifier) = self.classifier.as_str() {
            check_segment("classifier", classifier, classifier)?;
        }
        Ok(())
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            classifier: self.classifier.clone(),
        }
    }

    /// same artifact, version ignored
    pub fn matches_identity(&self, other: &Coordinate) -> bool {
        self.group_id == other.group_id
            && self.artifact_id == other.artifact_id
            && self.classifier == other.classifier
    }

    /// The coordinate of the POM describing this artifact
    pub fn pom(&self) -> Coordinate {
        Coordinate {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            classifier: MavenClassifier::Unclassified,
            extension: POM_EXTENSION.to_string(),
        }
    }

    pub fn with_version(&self, version: MavenVersion) -> Coordinate {
        Coordinate {
            version,
            ..self.clone()
        }
    }
}

fn check_segment(what: &str, value: &str, segment: &str) -> Result<(), String> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(format!("{} {:?} is not a valid path segment", what, value));
    }
    if segment.contains(|c: char| c == '/' || c == '\\' || c == ':' || c.is_control()) {
        return Err(format!("{} {:?} contains a path separator or control character", what, value));
    }
    Ok(())
}

impl FromStr for Coordinate {
    type Err = MalformedCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coordinate::parse(s)
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group_id.0, self.artifact_id.0, self.extension)?;
        if let MavenClassifier::Classified(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        write!(f, ":{}", self.version)
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group_id.0, self.artifact_id.0)?;
        if let MavenClassifier::Classified(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Compile,
    Runtime,
    Test,
    Provided,
}
impl Scope {
    /// Maps a scope string as it appears in a POM. `system` behaves like `provided`. Returns
    ///  `None` for `import` which only has a meaning inside dependency management.
    pub fn from_pom(scope: Option<&str>) -> Option<Scope> {
        match scope.map(str::trim) {
            None | Some("") | Some("compile") => Some(Scope::Compile),
            Some("runtime") => Some(Scope::Runtime),
            Some("test") => Some(Scope::Test),
            Some("provided") | Some("system") => Some(Scope::Provided),
            Some(_) => None,
        }
    }

    /// The effective scope of a dependency declared with scope `declared` by an artifact that is
    ///  itself on the class path with scope `self`. `None` means the dependency does not
    ///  propagate.
    pub fn inherit(self, declared: Scope) -> Option<Scope> {
        match declared {
            Scope::Test | Scope::Provided => None,
            Scope::Compile => Some(self),
            Scope::Runtime => match self {
                Scope::Compile => Some(Scope::Runtime),
                other => Some(other),
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Compile => "compile",
            Scope::Runtime => "runtime",
            Scope::Test => "test",
            Scope::Provided => "provided",
        }
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(Scope::Compile),
            "runtime" => Ok(Scope::Runtime),
            "test" => Ok(Scope::Test),
            "provided" => Ok(Scope::Provided),
            other => Err(anyhow::anyhow!("unknown scope {:?}", other)),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub coordinate: Coordinate,
    pub scope: Scope,
    pub optional: bool,
}
impl Dependency {
    pub fn new(coordinate: Coordinate, scope: Scope) -> Dependency {
        Dependency {
            coordinate,
            scope,
            optional: false,
        }
    }
}
