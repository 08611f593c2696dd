use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

use crate::error::GatewayError;
use crate::gateway::StorageGateway;
use crate::types::{
    ArtifactOptions, DeleteOutcome, GranteeType, NodeId, NodeKind, NodePage, PermissionEntry,
    PermissionRequest, RemoteNode, Role,
};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";
const PERMISSION_FIELDS: &str =
    "id,type,role,allowFileDiscovery,domain,emailAddress,permissionDetails(inherited)";
/// Sent on every call so shared-drive items are visible and report
/// `permissionDetails`.
const SUPPORTS_ALL_DRIVES: (&str, &str) = ("supportsAllDrives", "true");
/// Quota reasons Drive reports with a 403 instead of a 429.
const QUOTA_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
    "sharingRateLimitExceeded",
];

/// Google Drive v3 REST backend.
pub struct DriveClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    page_size: u32,
}

impl fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveClient")
            .field("client", &"<reqwest::Client>")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl DriveClient {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: crate::http::default_client(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            access_token: access_token.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        self.base_url = base_url;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| GatewayError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Http(e)
                }
            })?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }
}

impl StorageGateway for DriveClient {
    async fn list_nodes(&self, page_token: Option<&str>) -> Result<NodePage, GatewayError> {
        let mut url = self.endpoint(&["files"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("q", "trashed = false")
                .append_pair("spaces", "drive")
                .append_pair("corpora", "allDrives")
                .append_pair("includeItemsFromAllDrives", "true")
                .append_pair(SUPPORTS_ALL_DRIVES.0, SUPPORTS_ALL_DRIVES.1)
                .append_pair("pageSize", &self.page_size.to_string())
                .append_pair(
                    "fields",
                    &format!(
                        "nextPageToken,files(id,name,mimeType,parents,permissionIds,permissions({PERMISSION_FIELDS}))"
                    ),
                );
            if let Some(token) = page_token.filter(|t| !t.is_empty()) {
                query.append_pair("pageToken", token);
            }
        }
        let response = self.send(self.client.get(url)).await?;
        let list: FileList = read_json(response).await?;

        let mut nodes = Vec::with_capacity(list.files.len());
        for file in list.files {
            // Listing leaves `permissions` empty for shared-drive items.
            let lookup = file.permissions.is_empty() && !file.permission_ids.is_empty();
            let mut node = file.into_node();
            if lookup {
                node.permissions = self.list_permissions(&node.id).await?;
            }
            nodes.push(node);
        }
        Ok(NodePage {
            nodes,
            next_page_token: list.next_page_token,
        })
    }

    async fn list_permissions(&self, node: &NodeId) -> Result<Vec<PermissionEntry>, GatewayError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.endpoint(&["files", node.as_str(), "permissions"])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair(SUPPORTS_ALL_DRIVES.0, SUPPORTS_ALL_DRIVES.1)
                    .append_pair(
                        "fields",
                        &format!("nextPageToken,permissions({PERMISSION_FIELDS})"),
                    );
                if let Some(token) = page_token.as_deref() {
                    query.append_pair("pageToken", token);
                }
            }
            let response = self.send(self.client.get(url)).await?;
            let list: PermissionList = read_json(response).await?;
            entries.extend(
                list.permissions
                    .into_iter()
                    .filter_map(DrivePermission::into_entry),
            );
            match list.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(entries)
    }

    async fn create_permission(
        &self,
        node: &NodeId,
        request: &PermissionRequest,
    ) -> Result<String, GatewayError> {
        let mut url = self.endpoint(&["files", node.as_str(), "permissions"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair(SUPPORTS_ALL_DRIVES.0, SUPPORTS_ALL_DRIVES.1)
                .append_pair("fields", "id");
            if matches!(request.grantee, GranteeType::User | GranteeType::Group) {
                query.append_pair("sendNotificationEmail", "false");
            }
        }
        let body = NewPermission {
            kind: request.grantee.as_str(),
            role: request.role.as_str(),
            allow_file_discovery: request.discoverable,
            domain: request.domain.as_deref(),
            email_address: request.email.as_deref(),
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        let created: Created = read_json(response).await?;
        tracing::debug!(node_id = %node, entry_id = %created.id, grantee = %request.grantee, "permission created");
        Ok(created.id)
    }

    async fn delete_permission(
        &self,
        node: &NodeId,
        entry_id: &str,
    ) -> Result<DeleteOutcome, GatewayError> {
        let mut url = self.endpoint(&["files", node.as_str(), "permissions", entry_id])?;
        url.query_pairs_mut()
            .append_pair(SUPPORTS_ALL_DRIVES.0, SUPPORTS_ALL_DRIVES.1);
        match self.send(self.client.delete(url)).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(GatewayError::NotFound(_)) => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e),
        }
    }

    async fn create_artifact(
        &self,
        kind: NodeKind,
        parent: Option<&NodeId>,
        options: &ArtifactOptions,
    ) -> Result<NodeId, GatewayError> {
        let mut url = self.endpoint(&["files"])?;
        url.query_pairs_mut()
            .append_pair(SUPPORTS_ALL_DRIVES.0, SUPPORTS_ALL_DRIVES.1)
            .append_pair("fields", "id")
            .append_pair(
                "ignoreDefaultVisibility",
                if options.ignore_default_visibility {
                    "true"
                } else {
                    "false"
                },
            );
        let body = NewFile {
            name: &options.name,
            mime_type: match kind {
                NodeKind::File => DOCUMENT_MIME_TYPE,
                NodeKind::Folder => FOLDER_MIME_TYPE,
            },
            parents: parent.map(NodeId::as_str).into_iter().collect(),
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        let created: Created = read_json(response).await?;
        Ok(NodeId::new(created.id))
    }

    async fn delete_artifact(&self, node: &NodeId) -> Result<(), GatewayError> {
        let mut url = self.endpoint(&["files", node.as_str()])?;
        url.query_pairs_mut()
            .append_pair(SUPPORTS_ALL_DRIVES.0, SUPPORTS_ALL_DRIVES.1);
        match self.send(self.client.delete(url)).await {
            Ok(_) | Err(GatewayError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "google-drive"
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn error_from_response(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let retry_after = crate::http::retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .map(|envelope| envelope.error);
    let reason = detail
        .as_ref()
        .and_then(|d| d.errors.first())
        .and_then(|item| item.reason.clone());
    let message = detail.and_then(|d| d.message).unwrap_or(body);
    classify(status, reason.as_deref(), message, retry_after)
}

/// Map a non-success status and Drive error reason onto the gateway taxonomy.
pub(crate) fn classify(
    status: u16,
    reason: Option<&str>,
    message: String,
    retry_after: Option<Duration>,
) -> GatewayError {
    match status {
        401 => GatewayError::Unauthorized(message),
        403 if reason.is_some_and(|r| QUOTA_REASONS.contains(&r)) => {
            GatewayError::RateLimited { retry_after }
        }
        403 => GatewayError::Forbidden(message),
        404 => GatewayError::NotFound(message),
        408 => GatewayError::Timeout,
        429 => GatewayError::RateLimited { retry_after },
        500..=599 => GatewayError::Server { status, message },
        _ => GatewayError::Api { status, message },
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    permission_ids: Vec<String>,
    #[serde(default)]
    permissions: Vec<DrivePermission>,
}

impl DriveFile {
    fn into_node(self) -> RemoteNode {
        let kind = if self.mime_type == FOLDER_MIME_TYPE {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        RemoteNode {
            id: NodeId::new(self.id),
            name: self.name,
            kind,
            parent: self.parents.into_iter().next().map(NodeId::new),
            permissions: self
                .permissions
                .into_iter()
                .filter_map(DrivePermission::into_entry)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrivePermission {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    role: String,
    #[serde(default)]
    allow_file_discovery: bool,
    domain: Option<String>,
    email_address: Option<String>,
    #[serde(default)]
    permission_details: Vec<PermissionDetail>,
}

impl DrivePermission {
    fn into_entry(self) -> Option<PermissionEntry> {
        let Some(grantee) = GranteeType::parse(&self.kind) else {
            tracing::debug!(entry_id = %self.id, kind = %self.kind, "skipping permission with unknown grantee type");
            return None;
        };
        let role = Role::parse(&self.role).unwrap_or_else(|| {
            tracing::warn!(entry_id = %self.id, role = %self.role, "unknown permission role, treating as reader");
            Role::Reader
        });
        // Shared drives describe inheritance per detail; the entry is inherited
        // only when every detail is.
        let inherited = !self.permission_details.is_empty()
            && self.permission_details.iter().all(|d| d.inherited);
        Some(PermissionEntry {
            id: self.id,
            grantee,
            role,
            discoverable: self.allow_file_discovery,
            inherited,
            domain: self.domain,
            email: self.email_address,
        })
    }
}

#[derive(Deserialize)]
struct PermissionDetail {
    #[serde(default)]
    inherited: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionList {
    #[serde(default)]
    permissions: Vec<DrivePermission>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPermission<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_file_discovery: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_address: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFile<'a> {
    name: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{
        body_partial_json, header, method, path, query_param, query_param_is_missing,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use proptest::prelude::*;

    use super::*;

    fn client_for(server: &MockServer) -> DriveClient {
        DriveClient::new("test-token").with_base_url(server.uri())
    }

    #[test]
    fn debug_redacts_token() {
        let client = DriveClient::new("secret-token");
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = DriveClient::new("t").with_base_url("https://example.com/drive/v3//");
        let url = client.endpoint(&["files", "abc"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/drive/v3/files/abc");
    }

    #[test]
    fn endpoint_escapes_segments() {
        let client = DriveClient::new("t").with_base_url("https://example.com");
        let url = client.endpoint(&["files", "a/b", "permissions"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/files/a%2Fb/permissions");
    }

    #[test]
    fn classify_quota_403_as_rate_limited() {
        let err = classify(
            403,
            Some("userRateLimitExceeded"),
            "slow down".into(),
            Some(Duration::from_secs(2)),
        );
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn classify_statuses() {
        assert!(matches!(
            classify(401, None, "x".into(), None),
            GatewayError::Unauthorized(_)
        ));
        assert!(matches!(
            classify(403, Some("insufficientFilePermissions"), "x".into(), None),
            GatewayError::Forbidden(_)
        ));
        assert!(matches!(
            classify(404, None, "x".into(), None),
            GatewayError::NotFound(_)
        ));
        assert!(classify(429, None, "x".into(), None).is_rate_limited());
        assert!(matches!(
            classify(503, None, "x".into(), None),
            GatewayError::Server { status: 503, .. }
        ));
        assert!(matches!(
            classify(400, Some("invalid"), "x".into(), None),
            GatewayError::Api { status: 400, .. }
        ));
    }

    proptest! {
        #[test]
        fn classify_never_mixes_retry_and_auth(
            status in 400u16..600,
            reason in prop::option::of(prop::sample::select(vec![
                "rateLimitExceeded",
                "userRateLimitExceeded",
                "sharingRateLimitExceeded",
                "insufficientFilePermissions",
                "notFound",
                "badRequest",
            ])),
        ) {
            let err = classify(status, reason, "message".into(), None);
            let quota = status == 403 && reason.is_some_and(|r| QUOTA_REASONS.contains(&r));
            prop_assert_eq!(err.is_rate_limited(), status == 429 || quota);
            prop_assert_eq!(err.is_auth_failure(), matches!(status, 401 | 403) && !quota);
            prop_assert!(!(err.is_transient() && err.is_auth_failure()));
            if status >= 500 {
                prop_assert!(err.is_transient());
            }
        }
    }

    #[test]
    fn inherited_only_when_every_detail_is_inherited() {
        let mixed: DrivePermission = serde_json::from_value(json!({
            "id": "anyoneWithLink",
            "type": "anyone",
            "role": "reader",
            "permissionDetails": [{"inherited": true}, {"inherited": false}]
        }))
        .unwrap();
        assert!(!mixed.into_entry().unwrap().inherited);

        let inherited: DrivePermission = serde_json::from_value(json!({
            "id": "anyoneWithLink",
            "type": "anyone",
            "role": "reader",
            "permissionDetails": [{"inherited": true}]
        }))
        .unwrap();
        assert!(inherited.into_entry().unwrap().inherited);
    }

    #[test]
    fn unknown_grantee_type_is_skipped() {
        let perm: DrivePermission = serde_json::from_value(json!({
            "id": "x",
            "type": "deleted",
            "role": "reader"
        }))
        .unwrap();
        assert!(perm.into_entry().is_none());
    }

    #[tokio::test]
    async fn list_nodes_maps_files_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("q", "trashed = false"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nextPageToken": "page-2",
                "files": [
                    {
                        "id": "folder-1",
                        "name": "Shared",
                        "mimeType": "application/vnd.google-apps.folder",
                        "permissions": [
                            {"id": "anyoneWithLink", "type": "anyone", "role": "reader", "allowFileDiscovery": false},
                            {"id": "owner-1", "type": "user", "role": "owner", "emailAddress": "me@example.com"}
                        ]
                    },
                    {
                        "id": "doc-1",
                        "name": "Notes",
                        "mimeType": "application/vnd.google-apps.document",
                        "parents": ["folder-1"]
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server).list_nodes(None).await.unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(page.nodes.len(), 2);

        let folder = &page.nodes[0];
        assert_eq!(folder.kind, NodeKind::Folder);
        assert_eq!(folder.parent, None);
        assert_eq!(folder.permissions.len(), 2);
        assert!(folder.permissions[0].is_direct_public());
        assert_eq!(folder.permissions[1].email.as_deref(), Some("me@example.com"));

        let doc = &page.nodes[1];
        assert_eq!(doc.kind, NodeKind::File);
        assert_eq!(doc.parent, Some(NodeId::new("folder-1")));
        assert!(doc.permissions.is_empty());
    }

    #[tokio::test]
    async fn list_nodes_covers_shared_drives() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("corpora", "allDrives"))
            .and(query_param("includeItemsFromAllDrives", "true"))
            .and(query_param("supportsAllDrives", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    {
                        "id": "team-doc",
                        "name": "Roadmap",
                        "mimeType": "application/vnd.google-apps.document",
                        "parents": ["team-folder"],
                        "permissionIds": ["anyoneWithLink"]
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/team-doc/permissions"))
            .and(query_param("supportsAllDrives", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "permissions": [
                    {
                        "id": "anyoneWithLink",
                        "type": "anyone",
                        "role": "reader",
                        "permissionDetails": [{"inherited": true}]
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server).list_nodes(None).await.unwrap();
        let doc = &page.nodes[0];
        assert_eq!(doc.permissions.len(), 1);
        assert!(doc.permissions[0].inherited);
        assert!(!doc.permissions[0].is_direct_public());
    }

    #[tokio::test]
    async fn mutations_support_shared_drives() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/files/team-doc/permissions/anyoneWithLink"))
            .and(query_param("supportsAllDrives", "true"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/files/artifact-1"))
            .and(query_param("supportsAllDrives", "true"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = client
            .delete_permission(&NodeId::new("team-doc"), "anyoneWithLink")
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        client
            .delete_artifact(&NodeId::new("artifact-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_nodes_forwards_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server).list_nodes(Some("page-2")).await.unwrap();
        assert!(page.nodes.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn list_nodes_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Invalid Credentials", "errors": [{"reason": "authError"}]}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).list_nodes(None).await.unwrap_err();
        match err {
            GatewayError::Unauthorized(message) => assert_eq!(message, "Invalid Credentials"),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "4"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_nodes(None).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn delete_permission_not_found_is_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/files/doc-1/permissions/anyoneWithLink"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Permission not found: anyoneWithLink."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .delete_permission(&NodeId::new("doc-1"), "anyoneWithLink")
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn delete_permission_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/files/doc-1/permissions/anyoneWithLink"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .delete_permission(&NodeId::new("doc-1"), "anyoneWithLink")
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn delete_permission_forbidden_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/files/doc-1/permissions/anyoneWithLink"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "no access", "errors": [{"reason": "insufficientFilePermissions"}]}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .delete_permission(&NodeId::new("doc-1"), "anyoneWithLink")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden(_)));
    }

    #[tokio::test]
    async fn create_permission_sends_discoverability() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/doc-1/permissions"))
            .and(query_param("fields", "id"))
            .and(query_param("supportsAllDrives", "true"))
            .and(query_param_is_missing("sendNotificationEmail"))
            .and(body_partial_json(json!({
                "type": "anyone",
                "role": "reader",
                "allowFileDiscovery": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "anyoneWithLink"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .create_permission(
                &NodeId::new("doc-1"),
                &PermissionRequest::anyone(Role::Reader, false),
            )
            .await
            .unwrap();
        assert_eq!(id, "anyoneWithLink");
    }

    #[tokio::test]
    async fn create_user_permission_suppresses_notification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/doc-1/permissions"))
            .and(query_param("sendNotificationEmail", "false"))
            .and(body_partial_json(json!({
                "type": "user",
                "emailAddress": "auditor@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "perm-9"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .create_permission(
                &NodeId::new("doc-1"),
                &PermissionRequest::user(Role::Reader, "auditor@example.com"),
            )
            .await
            .unwrap();
        assert_eq!(id, "perm-9");
    }

    #[tokio::test]
    async fn create_artifact_passes_visibility_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .and(query_param("ignoreDefaultVisibility", "true"))
            .and(query_param("supportsAllDrives", "true"))
            .and(body_partial_json(json!({
                "name": "probe",
                "mimeType": "application/vnd.google-apps.document",
                "parents": ["folder-1"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new-doc"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server)
            .create_artifact(
                NodeKind::File,
                Some(&NodeId::new("folder-1")),
                &ArtifactOptions {
                    name: "probe".into(),
                    ignore_default_visibility: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(id, NodeId::new("new-doc"));
    }

    #[tokio::test]
    async fn delete_missing_artifact_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/files/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .delete_artifact(&NodeId::new("gone"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_permissions_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/doc-1/permissions"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nextPageToken": "p2",
                "permissions": [{"id": "owner-1", "type": "user", "role": "owner"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/doc-1/permissions"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "permissions": [{"id": "anyone", "type": "anyone", "role": "reader", "allowFileDiscovery": true}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let entries = client_for(&server)
            .list_permissions(&NodeId::new("doc-1"))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].discoverable);
        assert_eq!(entries[0].role, Role::Owner);
    }

    #[tokio::test]
    async fn connection_error_is_transient() {
        let client = DriveClient::new("t").with_base_url("http://127.0.0.1:1");
        let err = client.list_nodes(None).await.unwrap_err();
        assert!(err.is_transient(), "expected transient, got {err:?}");
    }
}
