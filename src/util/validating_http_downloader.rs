use std::time::Duration;

use bytes::{Bytes, BytesMut};
use hex::FromHex;
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, CONTENT_LENGTH, USER_AGENT};
use hyper_tls::HttpsConnector;
use sha1::{Digest, Sha1};
use tracing::{debug, trace};

use crate::maven::remote_repo::RepoError;

/// Upper bound for a downloaded body, which is held in memory completely
pub const DEFAULT_MAX_BODY_SIZE: usize = 512 * 1024 * 1024;

/// Downloads files relative to a fixed base URI, checking the body's integrity against a hashcode
///  if one is returned in a header.
///
/// Instances do HTTP connection caching internally, so keeping them alive has performance benefits.
pub struct ValidatingHttpDownloader {
    client: Client<HttpsConnector<HttpConnector>>,
    base_uri: String, // with trailing '/'
    timeout: Duration,
    max_body_size: usize,
}
impl ValidatingHttpDownloader {
    pub fn new(base_uri: String, timeout: Duration) -> anyhow::Result<ValidatingHttpDownloader> {
        let mut base_uri = base_uri;
        if !base_uri.ends_with('/') {
            base_uri.push('/');
        }

        // check that the base URI is valid
        Uri::try_from(base_uri.clone())?;

        Ok(ValidatingHttpDownloader {
            client: Client::builder()
                .build::<_, Body>(HttpsConnector::new()),
            base_uri,
            timeout,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        })
    }

    pub fn with_max_body_size(self, max_body_size: usize) -> ValidatingHttpDownloader {
        ValidatingHttpDownloader {
            max_body_size,
            ..self
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// A single attempt at downloading a file, including the body. Exceeding the timeout is
    ///  reported as a (transient) network error.
    pub async fn get(&self, path: &str) -> Result<Bytes, RepoError> {
        let artifact_path = format!("{}{}", self.base_uri, path);
        match tokio::time::timeout(self.timeout, self.do_get(&artifact_path)).await {
            Ok(result) => result,
            Err(_) => Err(RepoError::Network(format!("timeout after {:?} getting {}", self.timeout, artifact_path))),
        }
    }

    async fn do_get(&self, artifact_path: &str) -> Result<Bytes, RepoError> {
        let uri = Uri::try_from(artifact_path)
            .map_err(|e| RepoError::Rejected(format!("invalid URI {}: {}", artifact_path, e)))?;
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(USER_AGENT, concat!("maven-resolver-demo/", env!("CARGO_PKG_VERSION"))) // Maven Central returns a 403 without a user agent
            .body(Body::empty())
            .map_err(|e| RepoError::Rejected(e.to_string()))?;

        trace!("getting {:?}", request);

        let response = self.client.request(request)
            .await
            .map_err(|e| RepoError::Network(format!("{}: {}", artifact_path, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(RepoError::NotFound(artifact_path.to_string()));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
            return Err(RepoError::Network(format!("{}: upstream responded {}", artifact_path, status)));
        }
        if !status.is_success() {
            return Err(RepoError::Rejected(format!("{}: upstream responded {}", artifact_path, status)));
        }

        let expected_sha1 = expected_sha1(response.headers());
        let expected_md5 = expected_md5(response.headers());

        let too_large = || RepoError::Rejected(format!("{}: body exceeds {} bytes", artifact_path, self.max_body_size));

        let content_length = response.headers().get(CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok());
        if content_length.map_or(false, |len| len > self.max_body_size) {
            return Err(too_large());
        }

        let mut body = response.into_body();
        let mut buffer = BytesMut::with_capacity(content_length.unwrap_or(0));
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| RepoError::Network(format!("{}: {}", artifact_path, e)))?;
            if buffer.len() + chunk.len() > self.max_body_size {
                return Err(too_large());
            }
            buffer.extend_from_slice(&chunk);
        }
        let body = buffer.freeze();

        if let Some(expected) = expected_sha1 {
            let actual: [u8; 20] = Sha1::digest(&body).into();
            trace!("validating SHA1 hash");
            if actual != expected {
                return Err(RepoError::Network(format!("{}: SHA1 checksum mismatch", artifact_path)));
            }
        }
        if let Some(expected) = expected_md5 {
            let actual: [u8; 16] = md5::compute(&body).into();
            trace!("validating MD5 hash");
            if actual != expected {
                return Err(RepoError::Network(format!("{}: MD5 checksum mismatch", artifact_path)));
            }
        }

        debug!("downloaded {} ({} bytes)", artifact_path, body.len());
        Ok(body)
    }
}

fn expected_sha1(headers: &HeaderMap) -> Option<[u8; 20]> {
    let sha1_hash_header = headers.get("x-checksum-sha1")
        .or_else(|| headers.get("x-goog-meta-checksum-sha1"))
        .or_else(|| headers.get("etag"))
        ;
    let sha1_string = sha1_hash_header
        .map(|h| h.to_str().unwrap_or(""))
        .map(|s| if s.len() == 42 { &s[1..41] } else { s } )?;

    // etags are not necessarily checksums, so anything that does not look like one is skipped
    match <[u8; 20]>::from_hex(sha1_string) {
        Ok(hash) => Some(hash),
        Err(_) => {
            trace!("ignoring non-SHA1 checksum header {:?}", sha1_string);
            None
        }
    }
}

fn expected_md5(headers: &HeaderMap) -> Option<[u8; 16]> {
    let md5_string = headers.get("x-checksum-md5")
        .or_else(|| headers.get("x-goog-meta-checksum-md5"))
        .map(|h| h.to_str().unwrap_or(""))?;

    match <[u8; 16]>::from_hex(md5_string) {
        Ok(hash) => Some(hash),
        Err(_) => {
            trace!("ignoring invalid MD5 checksum header {:?}", md5_string);
            None
        }
    }
}
