//! The ID collaborator: canonical id and GID generation as a service.
//!
//! Extractors running out of process ask for ids through this boundary. The
//! operation is pure, so a remote implementation can be retried freely and
//! [`LocalIdService`] needs no state beyond its hasher.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Result;
use crate::identity::{CanonicalId, EntityDescriptor, Gid, GidHasher, generate_canonical_id};
use crate::types::Language;

/// Request for one entity's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdRequest {
    /// Project the entity belongs to
    pub project_id: String,
    /// What the entity is
    pub descriptor: EntityDescriptor,
}

impl IdRequest {
    /// Create a request.
    #[must_use]
    pub fn new(project_id: &str, descriptor: EntityDescriptor) -> Self {
        Self {
            project_id: project_id.to_string(),
            descriptor,
        }
    }
}

/// The identity of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdResponse {
    /// Canonical id
    pub canonical_id: CanonicalId,
    /// Language-tagged hash of the canonical id
    pub gid: Gid,
}

/// Generates identities for entity descriptors.
#[async_trait]
pub trait IdService: Send + Sync {
    /// Generate the identity of one entity.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedElement`] for an unusable
    /// descriptor, or [`crate::Error::CollaboratorUnavailable`] if a remote
    /// service cannot be reached.
    async fn generate_id(&self, request: IdRequest) -> Result<IdResponse>;

    /// Generate identities for several entities, in request order.
    ///
    /// # Errors
    ///
    /// Fails with the first error any request produces.
    async fn generate_ids(&self, requests: Vec<IdRequest>) -> Result<Vec<IdResponse>> {
        try_join_all(requests.into_iter().map(|r| self.generate_id(r))).await
    }
}

/// In-process [`IdService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalIdService {
    hasher: GidHasher,
}

impl LocalIdService {
    /// A service deriving GIDs with `hasher`.
    #[must_use]
    pub fn new(hasher: GidHasher) -> Self {
        Self { hasher }
    }

    /// Generate an identity without going through the async trait.
    ///
    /// The GID prefix comes from the descriptor's language, or else from
    /// its file extension.
    ///
    /// # Errors
    ///
    /// See [`generate_canonical_id`].
    pub fn identify(&self, request: &IdRequest) -> Result<IdResponse> {
        let canonical_id = generate_canonical_id(&request.descriptor, &request.project_id)?;
        let language = request.descriptor.language.or_else(|| {
            request
                .descriptor
                .file_path
                .as_deref()
                .and_then(|p| p.rsplit_once('.'))
                .and_then(|(_, ext)| Language::from_extension(ext))
        });
        let gid = self.hasher.gid(language, &canonical_id);
        trace!(id = %canonical_id, gid = %gid, "Generated identity");
        Ok(IdResponse { canonical_id, gid })
    }
}

#[async_trait]
impl IdService for LocalIdService {
    async fn generate_id(&self, request: IdRequest) -> Result<IdResponse> {
        self.identify(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::types::ElementKind;
    use serde_json::json;

    #[tokio::test]
    async fn local_service_derives_prefix_from_extension_or_language() {
        let service = LocalIdService::default();

        let ts = service
            .generate_id(IdRequest::new("shop", EntityDescriptor::function("src/cart.ts", "add", 1)))
            .await
            .unwrap();
        assert_eq!(ts.canonical_id.as_str(), "knit://shop/function:src/cart.ts:add(#1)");
        assert!(ts.gid.as_str().starts_with("ts_"));

        let table = service
            .generate_id(IdRequest::new("shop", EntityDescriptor::table(Some("public"), "users")))
            .await
            .unwrap();
        assert!(table.gid.as_str().starts_with("unk_"));

        let tagged = service
            .generate_id(IdRequest::new(
                "shop",
                EntityDescriptor::table(Some("public"), "users").with_language(Language::Sql),
            ))
            .await
            .unwrap();
        assert_eq!(tagged.canonical_id, table.canonical_id);
        assert!(tagged.gid.as_str().starts_with("sql_"));
    }

    #[tokio::test]
    async fn batch_preserves_order_and_fails_on_bad_descriptor() {
        let service = LocalIdService::new(GidHasher::with_width(Some(16)).unwrap());
        let ids = service
            .generate_ids(vec![
                IdRequest::new("p", EntityDescriptor::file("b.py")),
                IdRequest::new("p", EntityDescriptor::file("a.py")),
            ])
            .await
            .unwrap();
        assert_eq!(ids[0].canonical_id.as_str(), "knit://p/file:b.py");
        assert_eq!(ids[1].gid.as_str().len(), "py_".len() + 16);

        let err = service
            .generate_ids(vec![IdRequest::new(
                "p",
                EntityDescriptor::named(ElementKind::Class, "a.py", ""),
            )])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedElement { .. }));
    }

    #[test]
    fn wire_format_is_camel_case() {
        let request: IdRequest = serde_json::from_value(json!({
            "projectId": "p",
            "descriptor": {"kind": "Function", "filePath": "a.go", "name": "Run", "parameterCount": 0}
        }))
        .unwrap();
        let response = LocalIdService::default().identify(&request).unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["canonicalId"], json!("knit://p/function:a.go:Run(#0)"));
        assert!(value["gid"].as_str().unwrap().starts_with("go_"));
    }
}
