//! MethodTransport: outbound replay over the collection's own remote
//! methods, `<collection>.remove` and `<collection>.sync`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::sync::{SyncErrorKind, SyncTransport, SyncTransportError};
use crate::types::Document;

use super::traits::RemoteMethods;

pub struct MethodTransport {
    remote: Arc<dyn RemoteMethods>,
    collection: String,
}

impl MethodTransport {
    pub fn new(remote: Arc<dyn RemoteMethods>, collection: impl Into<String>) -> Self {
        Self {
            remote,
            collection: collection.into(),
        }
    }

    fn method(&self, name: &str) -> String {
        format!("{}.{}", self.collection, name)
    }
}

#[async_trait]
impl SyncTransport for MethodTransport {
    async fn remove_doc(&self, doc: &Document) -> Result<(), SyncTransportError> {
        self.remote
            .call(&self.method("remove"), vec![Value::Object(doc.clone())])
            .await?;
        Ok(())
    }

    async fn update_doc(&self, doc: &Document) -> Result<Option<Document>, SyncTransportError> {
        let response = self
            .remote
            .call(&self.method("sync"), vec![Value::Object(doc.clone())])
            .await?;
        match response {
            Value::Null => Ok(None),
            // Accepted as sent.
            Value::Bool(true) => Ok(Some(doc.clone())),
            Value::Bool(false) => Err(SyncTransportError::with_kind(
                format!("{} rejected the upload", self.method("sync")),
                SyncErrorKind::Permanent,
            )),
            Value::Object(server_doc) => Ok(Some(server_doc)),
            other => Err(SyncTransportError::with_kind(
                format!("unexpected response from {}: {other}", self.method("sync")),
                SyncErrorKind::Permanent,
            )),
        }
    }
}
