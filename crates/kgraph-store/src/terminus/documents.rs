//! [`DocumentEngine`] over the TerminusDB document API.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::document::{DocumentEngine, ID};
use crate::terminus::{woql, TerminusClient};
use crate::{Result, StoreError};

fn document_id(doc: &Value) -> Result<&str> {
    doc.get(ID)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Serialization(format!("document without {ID}")))
}

#[async_trait]
impl DocumentEngine for TerminusClient {
    fn name(&self) -> &'static str {
        "terminusdb"
    }

    async fn get_document(&self, id: &str) -> Result<Option<Value>> {
        let url = self.url("document");
        let builder = self
            .request(Method::GET, &url)
            .query(&[("id", id), ("graph_type", "instance")]);
        match self.send_optional(builder).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    async fn insert_document(&self, doc: &Value) -> Result<bool> {
        let id = document_id(doc)?;
        if self.get_document(id).await?.is_some() {
            return Ok(false);
        }
        let url = self.url("document");
        let builder = self
            .request(Method::POST, &url)
            .query(&Self::commit_params(&format!("Insert {id}")))
            .json(doc);
        self.send_checked(builder).await?;
        tracing::debug!(document_id = id, "Document inserted");
        Ok(true)
    }

    async fn replace_document(&self, doc: &Value) -> Result<()> {
        let id = document_id(doc)?;
        let url = self.url("document");
        let builder = self
            .request(Method::PUT, &url)
            .query(&Self::commit_params(&format!("Replace {id}")))
            .json(doc);
        self.send_checked(builder).await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let url = self.url("document");
        let builder = self
            .request(Method::DELETE, &url)
            .query(&[("id", id)])
            .query(&Self::commit_params(&format!("Delete {id}")));
        Ok(self.send_optional(builder).await?.is_some())
    }

    async fn list_documents(&self, types: &[String], skip: usize, count: usize) -> Result<Vec<Value>> {
        let bindings = self.woql(woql::list_documents(types, skip, count)).await?;
        bindings
            .into_iter()
            .map(|mut binding| match binding.get_mut(woql::DOC_VAR).map(Value::take) {
                Some(doc @ Value::Object(_)) => Ok(doc),
                _ => Err(StoreError::Serialization(format!(
                    "WOQL binding without {}",
                    woql::DOC_VAR
                ))),
            })
            .collect()
    }
}
