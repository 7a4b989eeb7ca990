//! Pluggable artifact sources: local files or a remote model registry.

use super::formats::{ModelFormat, detect_format};
use super::pipeline::Pipeline;
use crate::error::MlError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Where a model artifact's bytes come from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Human-readable location used in logs and errors.
    fn location(&self) -> String;

    async fn fetch(&self) -> Result<Vec<u8>, MlError>;
}

/// Artifact stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileArtifactSource {
    pub path: PathBuf,
}

impl FileArtifactSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ArtifactSource for FileArtifactSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<Vec<u8>, MlError> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            MlError::artifact(format!("cannot read {}: {e}", self.path.display()))
        })
    }
}

/// Artifact served over HTTP(S), e.g. by a model registry.
#[derive(Debug, Clone)]
pub struct HttpArtifactSource {
    pub url: String,
    client: reqwest::Client,
}

impl HttpArtifactSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    fn location(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Vec<u8>, MlError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MlError::artifact(format!(
                "GET {} returned {}",
                self.url, status
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Pick a source from a configured location: URLs go over HTTP, anything
/// else is a filesystem path.
pub fn source_for(location: &str) -> Box<dyn ArtifactSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpArtifactSource::new(location))
    } else {
        Box::new(FileArtifactSource::new(location))
    }
}

/// Fetch, parse and validate a pipeline artifact.
pub async fn load_pipeline(source: &dyn ArtifactSource) -> Result<Pipeline, MlError> {
    let location = source.location();
    match detect_format(&location) {
        ModelFormat::Json => {}
        ModelFormat::Pickle => {
            return Err(MlError::artifact(format!(
                "{location} is a Python pickle; export it to the pipeline JSON format"
            )));
        }
        other => {
            return Err(MlError::artifact(format!(
                "{location}: unsupported model format {other:?}"
            )));
        }
    }

    let bytes = source.fetch().await?;
    let pipeline = Pipeline::from_json_slice(&bytes)?;
    tracing::info!(
        location = %location,
        model = %pipeline.name,
        version = %pipeline.version,
        steps = pipeline.steps.len(),
        "Loaded model artifact"
    );
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Classifier;

    const ARTIFACT: &str = r#"{
        "name": "tiny",
        "version": "1",
        "steps": [
            {"name": "imputer", "kind": "simple_imputer",
             "feature_names_in": ["koi_period"], "statistics": [1.0]},
            {"name": "classifier", "kind": "logistic_regression",
             "coef": [0.5], "intercept": 0.0}
        ]
    }"#;

    /// In-memory source standing in for a registry.
    struct StaticSource {
        location: String,
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl ArtifactSource for StaticSource {
        fn location(&self) -> String {
            self.location.clone()
        }

        async fn fetch(&self) -> Result<Vec<u8>, MlError> {
            Ok(self.bytes.clone())
        }
    }

    /// Answer one HTTP request per canned `(status line, body)` and return
    /// the listener's base URL.
    async fn serve_canned(responses: Vec<(&'static str, &'static str)>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let request_line = String::from_utf8_lossy(&request);
                assert!(
                    request_line.starts_with("GET /models/koi.json?rev=2 HTTP/1.1"),
                    "{request_line}"
                );
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_load_from_registry() {
        let base = serve_canned(vec![("200 OK", ARTIFACT)]).await;
        let url = format!("{base}/models/koi.json?rev=2");

        let source = source_for(&url);
        assert_eq!(source.location(), url);
        let pipeline = load_pipeline(source.as_ref()).await.unwrap();
        assert_eq!(pipeline.name, "tiny");
        assert_eq!(pipeline.feature_names_in().unwrap(), &["koi_period"]);
    }

    #[tokio::test]
    async fn test_registry_error_status_fails() {
        let base = serve_canned(vec![("404 Not Found", "{}")]).await;
        let url = format!("{base}/models/koi.json?rev=2");

        let err = load_pipeline(&HttpArtifactSource::new(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Artifact(_)), "{err:?}");
        assert_eq!(
            err.to_string(),
            format!("Artifact source error: GET {url} returned 404 Not Found")
        );
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, ARTIFACT).unwrap();

        let pipeline = load_pipeline(&FileArtifactSource::new(&path)).await.unwrap();
        assert_eq!(pipeline.name, "tiny");
        assert_eq!(pipeline.feature_names_in().unwrap(), &["koi_period"]);
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let source = FileArtifactSource::new("/nonexistent/model.json");
        let err = load_pipeline(&source).await.unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[tokio::test]
    async fn test_corrupt_artifact_fails() {
        let source = StaticSource {
            location: "mem://model.json".into(),
            bytes: b"{not json".to_vec(),
        };
        assert!(matches!(
            load_pipeline(&source).await.unwrap_err(),
            MlError::Serde(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_structure_fails() {
        let source = StaticSource {
            location: "mem://model.json".into(),
            bytes: br#"{"name": "empty", "steps": []}"#.to_vec(),
        };
        assert!(matches!(
            load_pipeline(&source).await.unwrap_err(),
            MlError::Model(_)
        ));
    }

    #[tokio::test]
    async fn test_pickle_rejected() {
        let source = StaticSource {
            location: "models/gradientboost_exoplanets.pkl".into(),
            bytes: ARTIFACT.as_bytes().to_vec(),
        };
        let err = load_pipeline(&source).await.unwrap_err();
        assert!(err.to_string().contains("pickle"));
    }

    #[test]
    fn test_source_for() {
        assert_eq!(
            source_for("https://registry.local/koi.json").location(),
            "https://registry.local/koi.json"
        );
        assert_eq!(source_for("models/koi.json").location(), "models/koi.json");
    }
}
