//! Pseudopotential files

use super::{Download, SubtypeHandler};
use crate::error::{RestError, RestResult};
use crate::graph::Node;
use tracing::debug;

/// Handler for `UpfData` nodes; downloads return the stored file as is
#[derive(Debug, Default)]
pub struct UpfHandler;

impl SubtypeHandler for UpfHandler {
    fn download(&self, node: &Node, _format: Option<&str>) -> RestResult<Download> {
        let filename = node.attribute_str("filename").ok_or_else(|| {
            RestError::validation(format!("Error in getting content of node {}: no filename", node.id))
        })?;
        let content = node.repository.get_object_content(filename).map_err(|e| {
            debug!(node = %node.id, error = %e, "pseudopotential file unavailable");
            RestError::validation(format!("Error in getting {} content", filename))
        })?;

        Ok(Download {
            filename: filename.to_string(),
            data: String::from_utf8_lossy(&content).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::Repository;
    use serde_json::json;

    fn upf(filename: &str) -> Node {
        Node::new(7, "data.upf.UpfData.")
            .with_attribute("filename", json!(filename))
            .with_repository(Repository::new().with_object("Si.pbe.UPF", "<UPF version=\"2.0.1\">").unwrap())
    }

    #[test]
    fn test_download_returns_file_content() {
        let download = UpfHandler.download(&upf("Si.pbe.UPF"), None).unwrap();
        assert_eq!(download.filename, "Si.pbe.UPF");
        assert!(download.data.starts_with("<UPF"));
    }

    #[test]
    fn test_download_missing_file() {
        let err = UpfHandler.download(&upf("O.pbe.UPF"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("Error in getting O.pbe.UPF content"));

        let bare = Node::new(8, "data.upf.UpfData.");
        let err = UpfHandler.download(&bare, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("no filename"));
    }

    #[test]
    fn test_no_derived_properties() {
        let err = UpfHandler.derived_properties(&upf("Si.pbe.UPF")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureNotAvailable);
    }
}
