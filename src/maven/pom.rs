#![allow(non_snake_case)]

//! The subset of the POM format (https://maven.apache.org/pom.html) that matters for dependency
//!  resolution: coordinates, parent, properties, dependency management and dependencies.

use std::collections::HashMap;

use anyhow::anyhow;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::maven::coordinates::*;
use crate::maven::version::MavenVersion;

lazy_static! {
    static ref PROPERTY_REGEX: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// properties referencing each other are expanded at most this many times
const MAX_INTERPOLATION_PASSES: usize = 8;

// NB: leaf values are Option<String> throughout because empty elements like <version/> do not
//  deserialize into a plain String
#[derive(Deserialize, Debug, Default, Clone)]
pub struct Pom {
    pub groupId: Option<String>,
    pub artifactId: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<PomParent>,
    pub properties: Option<HashMap<String, Option<String>>>,
    pub dependencyManagement: Option<PomDependencyManagement>,
    pub dependencies: Option<PomDependencies>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PomParent {
    pub groupId: Option<String>,
    pub artifactId: Option<String>,
    pub version: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PomDependencyManagement {
    pub dependencies: Option<PomDependencies>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PomDependencies {
    #[serde(default)]
    pub dependency: Vec<PomDependency>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PomDependency {
    pub groupId: Option<String>,
    pub artifactId: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub classifier: Option<String>,
    pub scope: Option<String>,
    pub optional: Option<String>,
}

impl Pom {
    pub fn parse(xml: &[u8]) -> anyhow::Result<Pom> {
        let xml = std::str::from_utf8(xml)?;
        let pom: Pom = serde_xml_rs::from_str(xml)
            .map_err(|e| anyhow!("invalid POM: {}", e))?;
        Ok(pom)
    }

    /// The parent POM's coordinate, if the POM declares one
    pub fn parent_coordinate(&self) -> anyhow::Result<Option<Coordinate>> {
        match &self.parent {
            None => Ok(None),
            Some(parent) => {
                let group_id = non_empty(&parent.groupId).ok_or_else(|| anyhow!("parent without groupId"))?;
                let artifact_id = non_empty(&parent.artifactId).ok_or_else(|| anyhow!("parent without artifactId"))?;
                let version = non_empty(&parent.version).ok_or_else(|| anyhow!("parent without version"))?;
                Ok(Some(path_safe(Coordinate::new(group_id, artifact_id, version).pom())?))
            }
        }
    }
}

fn path_safe(coordinate: Coordinate) -> anyhow::Result<Coordinate> {
    coordinate.check_path_safe()
        .map_err(|reason| anyhow!("invalid coordinate {}: {}", coordinate, reason))?;
    Ok(coordinate)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// The dependency-relevant content of a POM after merging in its parent chain and imported BOMs.
///  Values are stored raw and interpolated on access so that properties declared by a child
///  apply to declarations inherited from the parent.
#[derive(Debug, Clone, Default)]
pub struct EffectivePom {
    properties: HashMap<String, String>,
    managed: Vec<PomDependency>,
    imported: Vec<PomDependency>,
    dependencies: Vec<PomDependency>,
}

impl EffectivePom {
    pub fn build(pom: &Pom, parent: Option<&EffectivePom>) -> EffectivePom {
        let mut result = parent.cloned().unwrap_or_default();

        let parent_group = pom.parent.as_ref().and_then(|p| non_empty(&p.groupId));
        let parent_version = pom.parent.as_ref().and_then(|p| non_empty(&p.version));
        let group_id = non_empty(&pom.groupId).or(parent_group);
        let version = non_empty(&pom.version).or(parent_version);

        let builtins: [(&str, Option<&str>); 11] = [
            ("project.groupId", group_id),
            ("pom.groupId", group_id),
            ("groupId", group_id),
            ("project.artifactId", non_empty(&pom.artifactId)),
            ("pom.artifactId", non_empty(&pom.artifactId)),
            ("project.version", version),
            ("pom.version", version),
            ("version", version),
            ("project.parent.groupId", parent_group),
            ("project.parent.version", parent_version),
            ("parent.version", parent_version),
        ];

        for (key, value) in builtins {
            if let Some(value) = value {
                result.properties.insert(key.to_string(), value.to_string());
            }
        }
        if let Some(properties) = &pom.properties {
            for (key, value) in properties {
                result.properties.insert(key.clone(), value.clone().unwrap_or_default());
            }
        }

        // own declarations take precedence over inherited ones
        if let Some(declared) = pom.dependencyManagement.as_ref().and_then(|m| m.dependencies.as_ref()) {
            let mut managed = declared.dependency.clone();
            managed.append(&mut result.managed);
            result.managed = managed;
        }
        if let Some(declared) = &pom.dependencies {
            let mut dependencies = result.dependencies;
            for dependency in &declared.dependency {
                dependencies.retain(|d| management_key(d) != management_key(dependency));
            }
            dependencies.extend(declared.dependency.iter().cloned());
            result.dependencies = dependencies;
        }

        result
    }

    /// BOMs referenced with scope `import` in dependency management, in declaration order
    pub fn imports(&self) -> anyhow::Result<Vec<Coordinate>> {
        self.managed.iter()
            .filter(|d| non_empty(&d.scope) == Some("import"))
            .map(|d| {
                let group_id = self.required(&d.groupId, "groupId")?;
                let artifact_id = self.required(&d.artifactId, "artifactId")?;
                let version = self.required(&d.version, "version")?;
                path_safe(Coordinate::new(&group_id, &artifact_id, &version).pom())
            })
            .collect()
    }

    /// Adds a BOM's managed versions with lower precedence than everything already present
    pub fn import_management(&mut self, bom: &EffectivePom) {
        for d in bom.managed.iter().chain(bom.imported.iter()) {
            if non_empty(&d.scope) == Some("import") {
                continue;
            }
            let mut d = d.clone();
            d.groupId = d.groupId.map(|v| bom.interpolate(&v));
            d.artifactId = d.artifactId.map(|v| bom.interpolate(&v));
            d.version = d.version.map(|v| bom.interpolate(&v));
            self.imported.push(d);
        }
    }

    /// The declared dependencies with versions and scopes filled in from dependency management.
    ///  Dependencies that never propagate (test, provided) are skipped if their version can not
    ///  be determined.
    pub fn dependencies(&self) -> anyhow::Result<Vec<Dependency>> {
        let mut result = Vec::new();

        for d in &self.dependencies {
            let group_id = self.required(&d.groupId, "groupId")?;
            let artifact_id = self.required(&d.artifactId, "artifactId")?;
            let type_ = non_empty(&d.type_).map(|t| self.interpolate(t)).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
            let classifier = non_empty(&d.classifier).map(|c| self.interpolate(c));

            let managed = self.find_managed(&group_id, &artifact_id, &type_, classifier.as_deref());

            let scope_string = non_empty(&d.scope)
                .or_else(|| managed.and_then(|m| non_empty(&m.scope)))
                .map(|s| self.interpolate(s));
            let scope = match Scope::from_pom(scope_string.as_deref()) {
                Some(scope) => scope,
                None => continue,
            };

            let version = non_empty(&d.version)
                .or_else(|| managed.and_then(|m| non_empty(&m.version)))
                .map(|v| self.interpolate(v));
            let version = match version {
                Some(v) if !v.contains("${") => v,
                _ if matches!(scope, Scope::Test | Scope::Provided) => continue,
                Some(v) => return Err(anyhow!("unresolved property in version of {}:{}: {}", group_id, artifact_id, v)),
                None => return Err(anyhow!("no version for dependency {}:{}", group_id, artifact_id)),
            };

            let optional = non_empty(&d.optional)
                .map(|o| self.interpolate(o) == "true")
                .unwrap_or(false);

            let (extension, classifier) = extension_for_type(&type_, classifier);

            let coordinate = path_safe(Coordinate {
                group_id: MavenGroupId(group_id),
                artifact_id: MavenArtifactId(artifact_id),
                version: MavenVersion::new(&version),
                classifier: MavenClassifier::from_optional(classifier.as_deref()),
                extension,
            })?;
            result.push(Dependency {
                coordinate,
                scope,
                optional,
            });
        }

        Ok(result)
    }

    fn find_managed(&self, group_id: &str, artifact_id: &str, type_: &str, classifier: Option<&str>) -> Option<&PomDependency> {
        let key = (group_id.to_string(), artifact_id.to_string(), type_.to_string(), classifier.unwrap_or("").to_string());

        self.managed.iter()
            .filter(|d| non_empty(&d.scope) != Some("import"))
            .find(|d| self.interpolated_key(d) == key)
            .or_else(|| self.imported.iter().find(|d| self.interpolated_key(d) == key))
    }

    fn interpolated_key(&self, d: &PomDependency) -> (String, String, String, String) {
        let (g, a, t, c) = management_key(d);
        (self.interpolate(&g), self.interpolate(&a), self.interpolate(&t), self.interpolate(&c))
    }

    fn required(&self, value: &Option<String>, what: &str) -> anyhow::Result<String> {
        non_empty(value)
            .map(|v| self.interpolate(v))
            .ok_or_else(|| anyhow!("dependency without {}", what))
    }

    /// Replaces `${name}` references with property values. Unknown properties are left in place.
    pub fn interpolate(&self, value: &str) -> String {
        let mut current = value.to_string();
        for _ in 0..MAX_INTERPOLATION_PASSES {
            if !current.contains("${") {
                break;
            }
            let next = PROPERTY_REGEX.replace_all(&current, |caps: &Captures| {
                self.properties.get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            }).into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}

fn management_key(d: &PomDependency) -> (String, String, String, String) {
    (
        non_empty(&d.groupId).unwrap_or("").to_string(),
        non_empty(&d.artifactId).unwrap_or("").to_string(),
        non_empty(&d.type_).unwrap_or(DEFAULT_EXTENSION).to_string(),
        non_empty(&d.classifier).unwrap_or("").to_string(),
    )
}

/// Maps a POM dependency `type` to the file extension (and implied classifier) of the artifact
fn extension_for_type(type_: &str, classifier: Option<String>) -> (String, Option<String>) {
    match type_ {
        "test-jar" => ("jar".to_string(), classifier.or_else(|| Some("tests".to_string()))),
        "bundle" | "maven-plugin" | "ejb" | "ejb-client" | "java-source" | "javadoc" => ("jar".to_string(), classifier),
        other => (other.to_string(), classifier),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PARENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>org.example</groupId>
  <artifactId>parent</artifactId>
  <version>7</version>
  <packaging>pom</packaging>
  <properties>
    <slf4j.version>2.0.9</slf4j.version>
    <junit.version>4.13.2</junit.version>
  </properties>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>org.slf4j</groupId>
        <artifactId>slf4j-api</artifactId>
        <version>${slf4j.version}</version>
      </dependency>
      <dependency>
        <groupId>org.example</groupId>
        <artifactId>bom</artifactId>
        <version>1.2</version>
        <type>pom</type>
        <scope>import</scope>
      </dependency>
    </dependencies>
  </dependencyManagement>
  <dependencies>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>${junit.version}</version>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>"#;

    const CHILD: &str = r#"<project>
  <parent>
    <groupId>org.example</groupId>
    <artifactId>parent</artifactId>
    <version>7</version>
  </parent>
  <artifactId>child</artifactId>
  <properties>
    <slf4j.version>2.0.12</slf4j.version>
  </properties>
  <dependencies>
    <dependency>
      <groupId>org.slf4j</groupId>
      <artifactId>slf4j-api</artifactId>
    </dependency>
    <dependency>
      <groupId>${project.groupId}</groupId>
      <artifactId>sibling</artifactId>
      <version>${project.version}</version>
      <type>test-jar</type>
      <optional>true</optional>
    </dependency>
    <dependency>
      <groupId>com.acme</groupId>
      <artifactId>managed-by-bom</artifactId>
      <scope>runtime</scope>
    </dependency>
    <dependency>
      <groupId>javax.servlet</groupId>
      <artifactId>servlet-api</artifactId>
      <scope>provided</scope>
    </dependency>
  </dependencies>
  <build>
    <plugins>
      <plugin>
        <artifactId>maven-surefire-plugin</artifactId>
        <dependencies>
          <dependency><groupId>ignored</groupId><artifactId>ignored</artifactId><version>1</version></dependency>
        </dependencies>
      </plugin>
    </plugins>
  </build>
</project>"#;

    const BOM: &str = r#"<project>
  <groupId>org.example</groupId>
  <artifactId>bom</artifactId>
  <version>1.2</version>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>com.acme</groupId>
        <artifactId>managed-by-bom</artifactId>
        <version>${project.version}</version>
      </dependency>
    </dependencies>
  </dependencyManagement>
</project>"#;

    fn effective_child() -> EffectivePom {
        let parent = EffectivePom::build(&Pom::parse(PARENT.as_bytes()).unwrap(), None);
        let child_pom = Pom::parse(CHILD.as_bytes()).unwrap();
        let mut child = EffectivePom::build(&child_pom, Some(&parent));
        let bom = EffectivePom::build(&Pom::parse(BOM.as_bytes()).unwrap(), None);
        child.import_management(&bom);
        child
    }

    #[test]
    fn test_parse_plain_pom() {
        let pom = Pom::parse(PARENT.as_bytes()).unwrap();
        assert_eq!(pom.artifactId.as_deref(), Some("parent"));
        assert_eq!(pom.dependencies.unwrap().dependency.len(), 1);
        assert_eq!(pom.dependencyManagement.unwrap().dependencies.unwrap().dependency.len(), 2);
        assert_eq!(pom.properties.unwrap().get("slf4j.version").cloned().flatten().as_deref(), Some("2.0.9"));
    }

    #[test]
    fn test_parse_invalid_pom() {
        assert!(Pom::parse(b"<project><dependencies>").is_err());
        assert!(Pom::parse(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_parent_coordinate() {
        let pom = Pom::parse(CHILD.as_bytes()).unwrap();
        assert_eq!(pom.parent_coordinate().unwrap(), Some(Coordinate::parse("org.example:parent:pom:7").unwrap()));
        assert_eq!(Pom::parse(PARENT.as_bytes()).unwrap().parent_coordinate().unwrap(), None);
    }

    #[test]
    fn test_imports() {
        let parent = EffectivePom::build(&Pom::parse(PARENT.as_bytes()).unwrap(), None);
        assert_eq!(parent.imports().unwrap(), vec![Coordinate::parse("org.example:bom:pom:1.2").unwrap()]);
    }

    #[test]
    fn test_effective_dependencies() {
        let dependencies = effective_child().dependencies().unwrap();
        let rendered: Vec<(String, Scope, bool)> = dependencies.iter()
            .map(|d| (d.coordinate.to_string(), d.scope, d.optional))
            .collect();

        assert_eq!(rendered, vec![
            ("junit:junit:jar:4.13.2".to_string(), Scope::Test, false),
            ("org.slf4j:slf4j-api:jar:2.0.12".to_string(), Scope::Compile, false),
            ("org.example:sibling:jar:tests:7".to_string(), Scope::Compile, true),
            ("com.acme:managed-by-bom:jar:1.2".to_string(), Scope::Runtime, false),
        ]);
    }

    #[test]
    fn test_missing_version_fails() {
        let pom = Pom::parse(br#"<project><groupId>g</groupId><artifactId>a</artifactId><version>1</version>
            <dependencies><dependency><groupId>x</groupId><artifactId>y</artifactId></dependency></dependencies>
            </project>"#).unwrap();
        assert!(EffectivePom::build(&pom, None).dependencies().is_err());
    }

    #[test]
    fn test_dependency_escaping_the_repository_layout_fails() {
        for (group_id, artifact_id, version) in [("x./tmp/pwn", "a", "1"), ("g", "..", "1"), ("g", "a", "${evil}")] {
            let pom = Pom::parse(format!(r#"<project><groupId>g</groupId><artifactId>a</artifactId><version>1</version>
                <properties><evil>../../..</evil></properties>
                <dependencies><dependency><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version></dependency></dependencies>
                </project>"#, group_id, artifact_id, version).as_bytes()).unwrap();
            assert!(EffectivePom::build(&pom, None).dependencies().is_err(), "{}:{}:{}", group_id, artifact_id, version);
        }
    }

    #[test]
    fn test_parent_escaping_the_repository_layout_fails() {
        let pom = Pom::parse(br#"<project><parent><groupId>g</groupId><artifactId>..</artifactId><version>1</version></parent>
            <artifactId>a</artifactId></project>"#).unwrap();
        assert!(pom.parent_coordinate().is_err());
    }

    #[test]
    fn test_interpolate_nested_and_unknown() {
        let pom = Pom::parse(br#"<project><groupId>g</groupId><artifactId>a</artifactId><version>1</version>
            <properties><a>${b}</a><b>x${c}</b><c>y</c></properties></project>"#).unwrap();
        let effective = EffectivePom::build(&pom, None);
        assert_eq!(effective.interpolate("${a}-${project.version}"), "xy-1");
        assert_eq!(effective.interpolate("${unknown}"), "${unknown}");
    }
}
