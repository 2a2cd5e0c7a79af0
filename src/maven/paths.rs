use std::path::PathBuf;

use crate::maven::coordinates::*;

/// Directory name used in the local cache for artifacts without classifier
pub const UNCLASSIFIED_DIR: &str = "_";

/// The path of an artifact relative to the root of a remote repository with default (Maven 2)
///  layout, e.g. `org/slf4j/slf4j-api/2.0.9/slf4j-api-2.0.9.jar`
pub fn as_maven_path(coordinate: &Coordinate) -> String {
    format!(
        "{}/{}/{}/{}",
        coordinate.group_id.0.replace('.', "/"),
        coordinate.artifact_id.0,
        coordinate.version,
        maven_file_name(coordinate),
    )
}

/// `<artifactId>-<version>[-<classifier>].<extension>`
pub fn maven_file_name(coordinate: &Coordinate) -> String {
    let classifier_string = match &coordinate.classifier {
        MavenClassifier::Unclassified => "".to_string(),
        MavenClassifier::Classified(c) => format!("-{}", c),
    };

    format!("{}-{}{}.{}",
            coordinate.artifact_id.0,
            coordinate.version,
            classifier_string,
            coordinate.extension,
    )
}

/// The directory holding a coordinate's cache entry relative to the cache root:
///  `<group as path>/<artifactId>/<version>/<classifier or '_'>`
pub fn cache_directory(coordinate: &Coordinate) -> PathBuf {
    let mut result = PathBuf::new();
    for segment in coordinate.group_id.0.split('.') {
        result.push(segment);
    }
    result.push(&coordinate.artifact_id.0);
    result.push(coordinate.version.as_str());
    result.push(coordinate.classifier.as_str().unwrap_or(UNCLASSIFIED_DIR));
    result
}
