//! The S3-protocol-compatible object store (`spec.md` §4.5): AWS S3 or
//! MinIO through the same trait, path-style addressed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use futures_util::Stream;

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("s3 error: {0}")]
    S3(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub payload_data_start: Option<u64>,
    pub payload_content_type: Option<String>,
}

impl ObjectMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(start) = self.payload_data_start {
            map.insert("payload-data-start".to_string(), start.to_string());
        }
        if let Some(ref ct) = self.payload_content_type {
            map.insert("payload-content-type".to_string(), ct.clone());
        }
        map
    }
}

pub struct MultipartUploadHandle {
    pub upload_id: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// `putObject`, `getObject`, `headObject`, `deleteObject`, plus the full
/// multipart trio required by `spec.md` §4.5.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<(), ObjectStoreError>;

    /// Streams an object's bytes into the object store without buffering
    /// the whole body, used by the ingest pipeline's parallel writes
    /// (`spec.md` §4.1). The stream is boxed rather than generic so this
    /// trait stays object-safe: the ingest pipeline holds its collaborators
    /// as `Arc<dyn ObjectStore>` and picks the concrete backend once, at
    /// startup.
    async fn put_object_stream(
        &self,
        key: &str,
        stream: std::pin::Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>,
        content_length: u64,
        metadata: ObjectMetadata,
    ) -> Result<(), ObjectStoreError>;

    async fn get_object(&self, key: &str) -> Result<Bytes, ObjectStoreError>;

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, ObjectStoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError>;

    async fn create_multipart_upload(
        &self,
        key: &str,
    ) -> Result<MultipartUploadHandle, ObjectStoreError>;

    async fn upload_part(
        &self,
        handle: &MultipartUploadHandle,
        part_number: i32,
        bytes: Bytes,
    ) -> Result<CompletedPart, ObjectStoreError>;

    async fn complete_multipart_upload(
        &self,
        handle: MultipartUploadHandle,
        parts: Vec<CompletedPart>,
    ) -> Result<(), ObjectStoreError>;

    async fn abort_multipart_upload(
        &self,
        handle: MultipartUploadHandle,
    ) -> Result<(), ObjectStoreError>;

    async fn list_parts(
        &self,
        handle: &MultipartUploadHandle,
    ) -> Result<Vec<CompletedPart>, ObjectStoreError>;
}

/// An `aws-sdk-s3`-backed object store. Works unmodified against MinIO via
/// endpoint override and path-style addressing, per `spec.md` §4.5.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client pointed at either AWS S3 (no endpoint override) or a
    /// MinIO-compatible endpoint, matching `spec.md`'s "same interface"
    /// requirement.
    pub async fn connect(endpoint_url: Option<&str>, region: &str, bucket: impl Into<String>) -> S3ObjectStore {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(endpoint_url) = endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let shared_config = loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if endpoint_url.is_some() {
            // MinIO requires path-style addressing; AWS S3 defaults to virtual-hosted.
            s3_config_builder = s3_config_builder.force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());
        S3ObjectStore::new(client, bucket)
    }
}

/// Chunk size used by [`S3ObjectStore::put_object_stream`]'s internal
/// multipart upload; matches the default multipart chunk size of the
/// ingress HTTP multipart endpoint (`spec.md` §4.1).
const STREAM_CHUNK_SIZE: usize = 25 * 1024 * 1024;

impl S3ObjectStore {
    async fn create_multipart_upload_with_metadata(
        &self,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<MultipartUploadHandle, ObjectStoreError> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key);
        for (k, v) in metadata.to_map() {
            request = request.metadata(k, v);
        }
        let output = request
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        let upload_id = output
            .upload_id()
            .ok_or_else(|| ObjectStoreError::S3("missing upload id".into()))?
            .to_string();
        Ok(MultipartUploadHandle {
            upload_id,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<(), ObjectStoreError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));
        for (k, v) in metadata.to_map() {
            request = request.metadata(k, v);
        }
        request
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        Ok(())
    }

    /// Streams the body straight into a multipart upload, chunked at
    /// [`STREAM_CHUNK_SIZE`] bytes, so a multi-gigabyte data item never sits
    /// fully buffered in process memory (`spec.md` §4.1, §9: "the
    /// object-store upload is either completed via multipart S3 or
    /// aborted").
    async fn put_object_stream(
        &self,
        key: &str,
        stream: std::pin::Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>,
        _content_length: u64,
        metadata: ObjectMetadata,
    ) -> Result<(), ObjectStoreError> {
        use futures_util::StreamExt;

        let handle = self.create_multipart_upload_with_metadata(key, &metadata).await?;
        let mut stream = stream;
        let mut part_number = 1i32;
        let mut buffer = Vec::with_capacity(STREAM_CHUNK_SIZE);
        let mut parts = Vec::new();

        let result: Result<(), ObjectStoreError> = async {
            while let Some(chunk) = stream.next().await {
                buffer.extend_from_slice(&chunk?);
                while buffer.len() >= STREAM_CHUNK_SIZE {
                    let piece: Vec<u8> = buffer.drain(..STREAM_CHUNK_SIZE).collect();
                    parts.push(self.upload_part(&handle, part_number, Bytes::from(piece)).await?);
                    part_number += 1;
                }
            }
            if !buffer.is_empty() {
                parts.push(self.upload_part(&handle, part_number, Bytes::from(buffer.clone())).await?);
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => self.complete_multipart_upload(handle, parts).await,
            Err(err) => {
                let _ = self.abort_multipart_upload(handle).await;
                Err(err)
            }
        }
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?
            .into_bytes();
        Ok(bytes)
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, ObjectStoreError> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|_| ObjectStoreError::NotFound(key.to_string()))?;
        let metadata = output.metadata().cloned().unwrap_or_default();
        Ok(ObjectMetadata {
            payload_data_start: metadata
                .get("payload-data-start")
                .and_then(|v| v.parse().ok()),
            payload_content_type: metadata.get("payload-content-type").cloned(),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
    ) -> Result<MultipartUploadHandle, ObjectStoreError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        let upload_id = output
            .upload_id()
            .ok_or_else(|| ObjectStoreError::S3("missing upload id".into()))?
            .to_string();
        Ok(MultipartUploadHandle {
            upload_id,
            key: key.to_string(),
        })
    }

    async fn upload_part(
        &self,
        handle: &MultipartUploadHandle,
        part_number: i32,
        bytes: Bytes,
    ) -> Result<CompletedPart, ObjectStoreError> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        let etag = output
            .e_tag()
            .ok_or_else(|| ObjectStoreError::S3("missing etag".into()))?
            .to_string();
        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        handle: MultipartUploadHandle,
        parts: Vec<CompletedPart>,
    ) -> Result<(), ObjectStoreError> {
        let completed_parts: Vec<_> = parts
            .into_iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.etag)
                    .build()
            })
            .collect();
        let completed = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        handle: MultipartUploadHandle,
    ) -> Result<(), ObjectStoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        Ok(())
    }

    async fn list_parts(
        &self,
        handle: &MultipartUploadHandle,
    ) -> Result<Vec<CompletedPart>, ObjectStoreError> {
        let output = self
            .client
            .list_parts()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;
        Ok(output
            .parts()
            .iter()
            .filter_map(|p| {
                Some(CompletedPart {
                    part_number: p.part_number()?,
                    etag: p.e_tag()?.to_string(),
                })
            })
            .collect())
    }
}

/// An in-memory fake, used by tests for both services without a live MinIO.
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, (Bytes, ObjectMetadata)>>,
    multiparts: Mutex<HashMap<String, (String, Vec<(i32, Bytes)>)>>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            multiparts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<(), ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, metadata));
        Ok(())
    }

    async fn put_object_stream(
        &self,
        key: &str,
        stream: std::pin::Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>,
        _content_length: u64,
        metadata: ObjectMetadata,
    ) -> Result<(), ObjectStoreError> {
        use futures_util::StreamExt;
        let mut buf = Vec::new();
        let mut stream = stream;
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::from(buf), metadata));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(b, _)| b.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, m)| m.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
    ) -> Result<MultipartUploadHandle, ObjectStoreError> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.multiparts
            .lock()
            .unwrap()
            .insert(upload_id.clone(), (key.to_string(), Vec::new()));
        Ok(MultipartUploadHandle {
            upload_id,
            key: key.to_string(),
        })
    }

    async fn upload_part(
        &self,
        handle: &MultipartUploadHandle,
        part_number: i32,
        bytes: Bytes,
    ) -> Result<CompletedPart, ObjectStoreError> {
        let etag = format!("{:x}", md5_like(&bytes));
        let mut multiparts = self.multiparts.lock().unwrap();
        let entry = multiparts
            .get_mut(&handle.upload_id)
            .ok_or_else(|| ObjectStoreError::NotFound(handle.upload_id.clone()))?;
        entry.1.push((part_number, bytes));
        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        handle: MultipartUploadHandle,
        mut parts: Vec<CompletedPart>,
    ) -> Result<(), ObjectStoreError> {
        parts.sort_by_key(|p| p.part_number);
        let (key, mut chunks) = self
            .multiparts
            .lock()
            .unwrap()
            .remove(&handle.upload_id)
            .ok_or_else(|| ObjectStoreError::NotFound(handle.upload_id.clone()))?;
        chunks.sort_by_key(|(n, _)| *n);
        let mut buf = Vec::new();
        for (_, bytes) in chunks {
            buf.extend_from_slice(&bytes);
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key, (Bytes::from(buf), ObjectMetadata::default()));
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        handle: MultipartUploadHandle,
    ) -> Result<(), ObjectStoreError> {
        self.multiparts.lock().unwrap().remove(&handle.upload_id);
        Ok(())
    }

    async fn list_parts(
        &self,
        handle: &MultipartUploadHandle,
    ) -> Result<Vec<CompletedPart>, ObjectStoreError> {
        let multiparts = self.multiparts.lock().unwrap();
        let (_, chunks) = multiparts
            .get(&handle.upload_id)
            .ok_or_else(|| ObjectStoreError::NotFound(handle.upload_id.clone()))?;
        Ok(chunks
            .iter()
            .map(|(n, b)| CompletedPart {
                part_number: *n,
                etag: format!("{:x}", md5_like(b)),
            })
            .collect())
    }
}

fn md5_like(bytes: &Bytes) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryObjectStore::default();
        store
            .put_object("raw-data-item/abc", Bytes::from_static(b"hello"), ObjectMetadata::default())
            .await
            .unwrap();
        let bytes = store.get_object("raw-data-item/abc").await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn multipart_upload_concatenates_parts_in_order() {
        let store = InMemoryObjectStore::default();
        let handle = store.create_multipart_upload("bundle-payload/plan1").await.unwrap();
        let p2 = store.upload_part(&handle, 2, Bytes::from_static(b"world")).await.unwrap();
        let p1 = store.upload_part(&handle, 1, Bytes::from_static(b"hello ")).await.unwrap();
        store.complete_multipart_upload(handle, vec![p1, p2]).await.unwrap();
        let bytes = store.get_object("bundle-payload/plan1").await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn head_on_missing_object_errors() {
        let store = InMemoryObjectStore::default();
        assert!(matches!(
            store.head_object("missing").await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }
}
