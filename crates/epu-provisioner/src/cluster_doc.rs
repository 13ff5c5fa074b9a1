use serde::{Deserialize, Serialize};

use crate::error::ProvisionerError;

/// A `<workspace>` element: one ctx_name group's image/quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    pub image: String,
    pub quantity: u32,
    #[serde(default)]
    pub ctx: String,
}

/// The resolved cluster document: one or more workspaces, each naming a
/// `ctx_name` that a provision request's `nodes` map must reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "cluster")]
pub struct ClusterDocument {
    #[serde(rename = "workspace", default)]
    pub workspaces: Vec<Workspace>,
}

impl ClusterDocument {
    pub fn parse(xml: &str) -> Result<Self, ProvisionerError> {
        quick_xml::de::from_str(xml).map_err(|e| ProvisionerError::InvalidDocument(e.to_string()))
    }

    pub fn to_xml(&self) -> Result<String, ProvisionerError> {
        quick_xml::se::to_string(self).map_err(|e| ProvisionerError::InvalidDocument(e.to_string()))
    }

    pub fn workspace_names(&self) -> Vec<&str> {
        self.workspaces.iter().map(|w| w.name.as_str()).collect()
    }

    /// Every `ctx_name` key in `requested` must name a `<workspace>` in this
    /// document, and the requested id count must match the workspace's
    /// declared `quantity`.
    pub fn validate_request<'a>(
        &self,
        requested: impl Iterator<Item = (&'a str, usize)>,
    ) -> Result<(), ProvisionerError> {
        for (ctx_name, count) in requested {
            let ws = self
                .workspaces
                .iter()
                .find(|w| w.name == ctx_name)
                .ok_or_else(|| ProvisionerError::InvalidDocument(format!(
                    "ctx_name {:?} has no matching <workspace> in the cluster document",
                    ctx_name
                )))?;
            if ws.quantity as usize != count {
                return Err(ProvisionerError::InvalidDocument(format!(
                    "workspace {:?} declares quantity {} but request has {} node ids",
                    ctx_name, ws.quantity, count
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<cluster>
        <workspace><name>head-node</name><image>img-1</image><quantity>1</quantity><ctx>ctx-1</ctx></workspace>
        <workspace><name>worker</name><image>img-2</image><quantity>3</quantity><ctx>ctx-2</ctx></workspace>
    </cluster>"#;

    #[test]
    fn parses_multiple_workspaces() {
        let doc = ClusterDocument::parse(DOC).unwrap();
        assert_eq!(doc.workspaces.len(), 2);
        assert_eq!(doc.workspace_names(), vec!["head-node", "worker"]);
    }

    #[test]
    fn validate_request_rejects_unknown_ctx_name() {
        let doc = ClusterDocument::parse(DOC).unwrap();
        let err = doc.validate_request(vec![("ghost", 1)].into_iter()).unwrap_err();
        assert!(matches!(err, ProvisionerError::InvalidDocument(_)));
    }

    #[test]
    fn validate_request_rejects_count_mismatch() {
        let doc = ClusterDocument::parse(DOC).unwrap();
        let err = doc.validate_request(vec![("worker", 2)].into_iter()).unwrap_err();
        assert!(matches!(err, ProvisionerError::InvalidDocument(_)));
    }

    #[test]
    fn validate_request_accepts_matching_counts() {
        let doc = ClusterDocument::parse(DOC).unwrap();
        doc.validate_request(vec![("head-node", 1), ("worker", 3)].into_iter())
            .unwrap();
    }
}
