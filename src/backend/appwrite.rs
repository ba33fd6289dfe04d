//! Appwrite REST adapter.
//!
//! Speaks the v1 REST API directly with `reqwest`: Storage for blobs,
//! Databases for picture records. Queries are sent as JSON-encoded
//! `queries[]` parameters. No timeout or retry is applied; a failed call is
//! returned to the caller as-is.

use super::{BackendError, BackendResult, BlobStore, DocumentQuery, DocumentStore, Page};
use crate::models::{
    blob::{PictureUpload, StoredBlob},
    picture::{PictureRecord, ValidPicture},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{
    RequestBuilder, Response, StatusCode,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const KEY_HEADER: &str = "X-Appwrite-Key";

/// Connection settings shared by the storage and database adapters.
#[derive(Clone, Debug)]
pub struct AppwriteClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    api_key: Option<String>,
}

impl AppwriteClient {
    /// `endpoint` includes the API version, e.g. `https://cloud.appwrite.io/v1`.
    pub fn new(endpoint: &str, project_id: &str, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header(PROJECT_HEADER, &self.project_id);
        match &self.api_key {
            Some(key) => req.header(KEY_HEADER, key),
            None => req,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.post(self.url(path)))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.delete(self.url(path)))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a non-success response into a [`BackendError`].
async fn check(resp: Response) -> BackendResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    if status == StatusCode::NOT_FOUND {
        Err(BackendError::NotFound(message))
    } else {
        Err(BackendError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(resp: Response) -> BackendResult<T> {
    let resp = check(resp).await?;
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| BackendError::Decode(err.to_string()))
}

fn query_equal(attribute: &str, value: &str) -> String {
    json!({ "method": "equal", "attribute": attribute, "values": [value] }).to_string()
}

fn query_starts_with(attribute: &str, value: &str) -> String {
    json!({ "method": "startsWith", "attribute": attribute, "values": [value] }).to_string()
}

fn query_limit(limit: usize) -> String {
    json!({ "method": "limit", "values": [limit] }).to_string()
}

fn query_offset(offset: usize) -> String {
    json!({ "method": "offset", "values": [offset] }).to_string()
}

fn as_params(queries: Vec<String>) -> Vec<(&'static str, String)> {
    queries.into_iter().map(|q| ("queries[]", q)).collect()
}

#[derive(Deserialize)]
struct FileList {
    total: u64,
    files: Vec<FileDto>,
}

#[derive(Deserialize)]
struct FileDto {
    #[serde(rename = "$id")]
    id: String,
    name: String,
    #[serde(rename = "$createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
    #[serde(rename = "sizeOriginal", default)]
    size_original: u64,
}

impl From<FileDto> for StoredBlob {
    fn from(dto: FileDto) -> Self {
        StoredBlob {
            id: dto.id,
            name: dto.name,
            content_type: dto.mime_type.filter(|m| !m.is_empty()),
            size_bytes: dto.size_original,
            created_at: dto.created_at,
        }
    }
}

/// Storage bucket adapter.
#[derive(Clone, Debug)]
pub struct AppwriteBlobStore {
    client: AppwriteClient,
    bucket_id: String,
}

impl AppwriteBlobStore {
    pub fn new(client: AppwriteClient, bucket_id: &str) -> Self {
        Self {
            client,
            bucket_id: bucket_id.to_string(),
        }
    }

    fn files_path(&self) -> String {
        format!("/storage/buckets/{}/files", self.bucket_id)
    }

    fn file_path(&self, blob_id: &str) -> String {
        format!("{}/{}", self.files_path(), blob_id)
    }

    async fn list_files(&self, queries: Vec<String>) -> BackendResult<FileList> {
        let resp = self
            .client
            .get(&self.files_path())
            .query(&as_params(queries))
            .send()
            .await?;
        decode(resp).await
    }
}

#[async_trait]
impl BlobStore for AppwriteBlobStore {
    async fn find_by_name(&self, name: &str) -> BackendResult<Option<StoredBlob>> {
        let list = self
            .list_files(vec![query_equal("name", name), query_limit(1)])
            .await?;
        Ok(list.files.into_iter().next().map(StoredBlob::from))
    }

    async fn create(&self, blob_id: &str, upload: PictureUpload) -> BackendResult<StoredBlob> {
        let mut part = Part::bytes(upload.bytes.to_vec()).file_name(upload.name.clone());
        if let Some(content_type) = upload.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new()
            .text("fileId", blob_id.to_string())
            .part("file", part);

        debug!(blob_id, name = %upload.name, "creating file");
        let resp = self
            .client
            .post(&self.files_path())
            .multipart(form)
            .send()
            .await?;
        let dto: FileDto = decode(resp).await?;
        Ok(dto.into())
    }

    async fn download(&self, blob_id: &str) -> BackendResult<(StoredBlob, Bytes)> {
        let meta: FileDto = decode(self.client.get(&self.file_path(blob_id)).send().await?).await?;
        let resp = self
            .client
            .get(&format!("{}/view", self.file_path(blob_id)))
            .send()
            .await?;
        let bytes = check(resp).await?.bytes().await?;
        Ok((meta.into(), bytes))
    }

    async fn delete(&self, blob_id: &str) -> BackendResult<()> {
        let resp = self.client.delete(&self.file_path(blob_id)).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn list(&self, limit: usize, offset: usize) -> BackendResult<Page<StoredBlob>> {
        let list = self
            .list_files(vec![query_limit(limit), query_offset(offset)])
            .await?;
        Ok(Page {
            total: list.total,
            items: list.files.into_iter().map(StoredBlob::from).collect(),
        })
    }

    fn view_url(&self, blob_id: &str) -> String {
        format!(
            "{}/view?project={}",
            self.client.url(&self.file_path(blob_id)),
            self.client.project_id
        )
    }
}

#[derive(Deserialize)]
struct DocumentList {
    total: u64,
    documents: Vec<PictureDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PictureDocument {
    #[serde(rename = "$id")]
    id: String,
    image_id: String,
    image_name: String,
    created_at: DateTime<Utc>,
    image_url: String,
}

impl From<PictureDocument> for PictureRecord {
    fn from(doc: PictureDocument) -> Self {
        PictureRecord {
            document_id: doc.id,
            image_id: doc.image_id,
            image_name: doc.image_name,
            created_at: doc.created_at,
            image_url: doc.image_url,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PictureData<'a> {
    image_id: &'a str,
    image_name: &'a str,
    created_at: DateTime<Utc>,
    image_url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDocument<'a> {
    document_id: &'a str,
    data: PictureData<'a>,
}

/// Database collection adapter.
#[derive(Clone, Debug)]
pub struct AppwriteDocumentStore {
    client: AppwriteClient,
    database_id: String,
    collection_id: String,
}

impl AppwriteDocumentStore {
    pub fn new(client: AppwriteClient, database_id: &str, collection_id: &str) -> Self {
        Self {
            client,
            database_id: database_id.to_string(),
            collection_id: collection_id.to_string(),
        }
    }

    fn documents_path(&self) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            self.database_id, self.collection_id
        )
    }
}

#[async_trait]
impl DocumentStore for AppwriteDocumentStore {
    async fn list(&self, query: &DocumentQuery) -> BackendResult<Page<PictureRecord>> {
        let mut queries = Vec::with_capacity(3);
        if let Some(prefix) = query.name_prefix.as_deref() {
            queries.push(query_starts_with("imageName", prefix));
        }
        queries.push(query_limit(query.limit));
        queries.push(query_offset(query.offset));

        let resp = self
            .client
            .get(&self.documents_path())
            .query(&as_params(queries))
            .send()
            .await?;
        let list: DocumentList = decode(resp).await?;
        Ok(Page {
            total: list.total,
            items: list.documents.into_iter().map(PictureRecord::from).collect(),
        })
    }

    async fn create(
        &self,
        document_id: &str,
        picture: &ValidPicture,
        image_url: &str,
    ) -> BackendResult<PictureRecord> {
        let body = CreateDocument {
            document_id,
            data: PictureData {
                image_id: &picture.image_id,
                image_name: &picture.image_name,
                created_at: picture.created_at,
                image_url,
            },
        };
        let resp = self
            .client
            .post(&self.documents_path())
            .json(&body)
            .send()
            .await?;
        let doc: PictureDocument = decode(resp).await?;
        Ok(doc.into())
    }

    async fn delete(&self, document_id: &str) -> BackendResult<()> {
        let path = format!("{}/{}", self.documents_path(), document_id);
        check(self.client.delete(&path).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AppwriteClient {
        AppwriteClient::new(&format!("{}/v1/", server.uri()), "proj", Some("secret".into()))
    }

    fn document_json(id: &str, name: &str) -> serde_json::Value {
        json!({
            "$id": id,
            "$createdAt": "2024-05-01T10:00:00.000+00:00",
            "imageId": format!("img-{id}"),
            "imageName": name,
            "createdAt": "2024-05-01T09:59:59.000+00:00",
            "imageUrl": format!("http://cdn/{id}")
        })
    }

    #[tokio::test]
    async fn lists_documents_with_prefix_query_and_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/db/collections/pics/documents"))
            .and(header(PROJECT_HEADER, "proj"))
            .and(header(KEY_HEADER, "secret"))
            .and(query_param(
                "queries[]",
                r#"{"attribute":"imageName","method":"startsWith","values":["cat"]}"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 1,
                "documents": [document_json("d1", "cat.png")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = AppwriteDocumentStore::new(client(&server), "db", "pics");
        let page = DocumentStore::list(
            &store,
            &DocumentQuery {
                name_prefix: Some("cat".into()),
                limit: 100,
                offset: 0,
            },
        )
        .await
        .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].document_id, "d1");
        assert_eq!(page.items[0].image_id, "img-d1");
        assert_eq!(page.items[0].image_name, "cat.png");
    }

    #[tokio::test]
    async fn creates_document_with_generated_id_and_camel_case_data() {
        let server = MockServer::start().await;
        let created_at: DateTime<Utc> = "2024-05-01T09:59:59Z".parse().unwrap();
        Mock::given(method("POST"))
            .and(path("/v1/databases/db/collections/pics/documents"))
            .and(body_json(json!({
                "documentId": "d1",
                "data": {
                    "imageId": "img-d1",
                    "imageName": "cat.png",
                    "createdAt": created_at,
                    "imageUrl": "http://cdn/d1"
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(document_json("d1", "cat.png")))
            .mount(&server)
            .await;

        let store = AppwriteDocumentStore::new(client(&server), "db", "pics");
        let picture = ValidPicture {
            image_id: "img-d1".into(),
            image_name: "cat.png".into(),
            created_at,
        };
        let record = DocumentStore::create(&store, "d1", &picture, "http://cdn/d1")
            .await
            .unwrap();
        assert_eq!(record.document_id, "d1");
        assert_eq!(record.image_url, "http://cdn/d1");
    }

    #[tokio::test]
    async fn find_by_name_uses_equal_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/storage/buckets/bkt/files"))
            .and(query_param(
                "queries[]",
                r#"{"attribute":"name","method":"equal","values":["cat.png"]}"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 1,
                "files": [{
                    "$id": "img1",
                    "$createdAt": "2024-05-01T10:00:00.000+00:00",
                    "name": "cat.png",
                    "mimeType": "image/png",
                    "sizeOriginal": 42
                }]
            })))
            .mount(&server)
            .await;

        let store = AppwriteBlobStore::new(client(&server), "bkt");
        let blob = store.find_by_name("cat.png").await.unwrap().unwrap();
        assert_eq!(blob.id, "img1");
        assert_eq!(blob.size_bytes, 42);
        assert_eq!(blob.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn maps_not_found_and_other_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/storage/buckets/bkt/files/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "File not found", "code": 404, "type": "storage_file_not_found"
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/storage/buckets/bkt/files/locked"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .mount(&server)
            .await;

        let store = AppwriteBlobStore::new(client(&server), "bkt");
        match BlobStore::delete(&store, "gone").await {
            Err(BackendError::NotFound(msg)) => assert_eq!(msg, "File not found"),
            other => panic!("unexpected: {other:?}"),
        }
        match BlobStore::delete(&store, "locked").await {
            Err(BackendError::Status { status, .. }) => assert_eq!(status, 401),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn uploads_file_as_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/storage/buckets/bkt/files"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "$id": "img1",
                "$createdAt": "2024-05-01T10:00:00.000+00:00",
                "name": "cat.png",
                "mimeType": "image/png",
                "sizeOriginal": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = AppwriteBlobStore::new(client(&server), "bkt");
        let upload = PictureUpload::new(
            "cat.png",
            Some("image/png".into()),
            Bytes::from_static(b"png"),
        );
        let blob = BlobStore::create(&store, "img1", upload).await.unwrap();
        assert_eq!(blob.name, "cat.png");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"fileId\""));
        assert!(body.contains("filename=\"cat.png\""));
    }

    #[test]
    fn view_url_points_at_file_view() {
        let client = AppwriteClient::new("https://cloud.example/v1", "proj", None);
        let store = AppwriteBlobStore::new(client, "bkt");
        assert_eq!(
            store.view_url("img1"),
            "https://cloud.example/v1/storage/buckets/bkt/files/img1/view?project=proj"
        );
    }
}
