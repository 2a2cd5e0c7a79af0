use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::maven::coordinates::Coordinate;
use crate::maven::paths::as_maven_path;
use crate::maven::remote_repo::{RepoError, RepositoryClient};

/// in-memory repository for tests, counting fetches per coordinate
pub struct StubRepository {
    files: Mutex<HashMap<Coordinate, Bytes>>,
    failures: Mutex<HashMap<Coordinate, RepoError>>,
    fetches: Mutex<HashMap<Coordinate, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Option<Duration>,
}

impl StubRepository {
    pub fn new() -> StubRepository {
        StubRepository {
            files: Default::default(),
            failures: Default::default(),
            fetches: Default::default(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: None,
        }
    }

    pub fn with_latency(self, latency: Duration) -> StubRepository {
        StubRepository {
            latency: Some(latency),
            ..self
        }
    }

    pub fn add_file(&self, coordinate: &Coordinate, data: &[u8]) {
        self.files.lock().unwrap().insert(coordinate.clone(), Bytes::copy_from_slice(data));
    }

    pub fn remove_file(&self, coordinate: &Coordinate) {
        self.files.lock().unwrap().remove(coordinate);
    }

    pub fn add_pom(&self, coordinate: &str, xml: &str) {
        self.add_file(&Coordinate::parse(coordinate).unwrap(), xml.as_bytes());
    }

    /// Adds a jar and a POM declaring `dependencies`. A dependency is written as a coordinate,
    ///  optionally followed by `@<scope>` and / or a trailing `?` marking it optional.
    pub fn add_artifact(&self, coordinate: &str, dependencies: &[&str]) {
        let coordinate = Coordinate::parse(coordinate).unwrap();

        let mut xml = format!(
            "<project><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version><dependencies>",
            coordinate.group_id.0, coordinate.artifact_id.0, coordinate.version,
        );
        for dependency in dependencies {
            let (dependency, optional) = match dependency.strip_suffix('?') {
                Some(d) => (d, true),
                None => (*dependency, false),
            };
            let (dependency, scope) = match dependency.split_once('@') {
                Some((d, scope)) => (d, scope),
                None => (dependency, "compile"),
            };
            let d = Coordinate::parse(dependency).unwrap();
            xml.push_str(&format!(
                "<dependency><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version><type>{}</type>",
                d.group_id.0, d.artifact_id.0, d.version, d.extension,
            ));
            if let Some(classifier) = d.classifier.as_str() {
                xml.push_str(&format!("<classifier>{}</classifier>", classifier));
            }
            xml.push_str(&format!("<scope>{}</scope><optional>{}</optional></dependency>", scope, optional));
        }
        xml.push_str("</dependencies></project>");

        self.add_file(&coordinate.pom(), xml.as_bytes());
        self.add_file(&coordinate, format!("contents of {}", coordinate).as_bytes());
    }

    pub fn fail_with(&self, coordinate: &Coordinate, error: RepoError) {
        self.failures.lock().unwrap().insert(coordinate.clone(), error);
    }

    pub fn fetch_count(&self, coordinate: &Coordinate) -> usize {
        self.fetches.lock().unwrap().get(coordinate).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }

    /// the highest number of fetches that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryClient for StubRepository {
    async fn fetch_artifact(&self, coordinate: &Coordinate) -> Result<Bytes, RepoError> {
        *self.fetches.lock().unwrap().entry(coordinate.clone()).or_default() += 1;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(e) = self.failures.lock().unwrap().get(coordinate) {
            return Err(e.clone());
        }
        self.files.lock().unwrap()
            .get(coordinate)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(as_maven_path(coordinate)))
    }
}
