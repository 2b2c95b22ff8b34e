//! `$ref` resolution for `openapiv3` documents.
//!
//! `openapiv3` keeps references as `ReferenceOr::Reference` and never follows them. Specs in the
//! wild split components across files and URLs, so references are resolved here:
//! - local: `#/components/...`
//! - file: `./common.yaml#/...`, `/abs/common.yaml#/...`, `file:///...#/...`
//! - URL: `https://example.com/common.yaml#/...`
//!
//! A reference is relative to the document that contains it. Resolution therefore returns the
//! [`SpecLocation`] of the resolved value next to the value itself, and callers pass that
//! location back in for anything nested inside it.

use crate::error::{OpenApiToolsError, Result};
use crate::loader::SpecLocation;
use apigate_http::safety::sanitize_reqwest_error;
use openapiv3::{OpenAPI, ReferenceOr};
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Caching resolver rooted at one `OpenAPI` document.
#[derive(Debug)]
pub struct OpenApiResolver<'a> {
    root: SpecLocation,
    client: &'a Client,
    docs: RwLock<HashMap<SpecLocation, Arc<Value>>>,
}

impl<'a> OpenApiResolver<'a> {
    /// Create a resolver whose root document is the already-parsed `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if `spec` cannot be converted to JSON.
    pub fn new(root: SpecLocation, spec: &OpenAPI, client: &'a Client) -> Result<Self> {
        let value =
            serde_json::to_value(spec).map_err(|e| OpenApiToolsError::OpenApi(e.to_string()))?;
        let docs = HashMap::from([(root.clone(), Arc::new(value))]);
        Ok(Self {
            root,
            client,
            docs: RwLock::new(docs),
        })
    }

    #[must_use]
    pub fn root(&self) -> &SpecLocation {
        &self.root
    }

    /// Follow `item` until it is no longer a reference.
    ///
    /// # Errors
    ///
    /// Returns an error on a reference cycle, a missing pointer target, a document that cannot be
    /// loaded, or a target that does not deserialize as `T`.
    pub async fn resolve<T>(
        &self,
        within: &SpecLocation,
        item: &ReferenceOr<T>,
    ) -> Result<(SpecLocation, T)>
    where
        T: Clone + DeserializeOwned,
    {
        let mut visited: HashSet<(SpecLocation, Option<String>)> = HashSet::new();
        let mut doc = within.clone();
        let mut current = item.clone();

        loop {
            let reference = match current {
                ReferenceOr::Item(value) => return Ok((doc, value)),
                ReferenceOr::Reference { reference } => reference,
            };

            let (target, pointer) = split_reference(&doc, &reference)?;
            if !visited.insert((target.clone(), pointer.clone())) {
                return Err(OpenApiToolsError::OpenApi(format!(
                    "Cyclic $ref detected while resolving: {reference}"
                )));
            }

            let document = self.document(&target).await?;
            let selected = match pointer.as_deref() {
                Some(ptr) => document.pointer(ptr).cloned().ok_or_else(|| {
                    OpenApiToolsError::OpenApi(format!(
                        "Unresolved $ref '{reference}' (no '{ptr}' in {target})"
                    ))
                })?,
                None => (*document).clone(),
            };

            current = serde_json::from_value(selected).map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "$ref '{reference}' in {target} has an unexpected shape: {e}"
                ))
            })?;
            doc = target;
        }
    }

    async fn document(&self, location: &SpecLocation) -> Result<Arc<Value>> {
        let cached = self.docs.read().get(location).cloned();
        if let Some(doc) = cached {
            return Ok(doc);
        }

        let text = match location {
            SpecLocation::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "Failed to read referenced file {}: {e}",
                    path.display()
                ))
            })?,
            SpecLocation::Url(url) => {
                let resp = self.client.get(url.clone()).send().await.map_err(|e| {
                    OpenApiToolsError::OpenApi(format!(
                        "Failed to fetch referenced document {location}: {}",
                        sanitize_reqwest_error(&e)
                    ))
                })?;
                resp.text().await.map_err(|e| {
                    OpenApiToolsError::OpenApi(format!(
                        "Failed to read referenced document {location}: {}",
                        sanitize_reqwest_error(&e)
                    ))
                })?
            }
        };

        let value: Value = serde_yaml::from_str(&text).map_err(|e| {
            OpenApiToolsError::OpenApi(format!("Failed to parse referenced document {location}: {e}"))
        })?;

        tracing::debug!(document = %location, "loaded referenced document");
        let value = Arc::new(value);
        self.docs.write().insert(location.clone(), Arc::clone(&value));
        Ok(value)
    }
}

/// Split a `$ref` into the target document and an optional JSON pointer.
fn split_reference(within: &SpecLocation, reference: &str) -> Result<(SpecLocation, Option<String>)> {
    let (doc_part, fragment) = match reference.split_once('#') {
        Some((d, f)) => (d, Some(f)),
        None => (reference, None),
    };

    let pointer = match fragment {
        None | Some("") => None,
        Some(f) if f.starts_with('/') => Some(f.to_string()),
        Some(_) => {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Unsupported $ref fragment (expected a JSON pointer): {reference}"
            )));
        }
    };

    let target = if doc_part.is_empty() {
        within.clone()
    } else {
        locate_document(within, doc_part)?
    };
    Ok((target, pointer))
}

fn locate_document(within: &SpecLocation, doc_part: &str) -> Result<SpecLocation> {
    let bad_ref = |e: String| OpenApiToolsError::OpenApi(format!("Bad $ref '{doc_part}': {e}"));

    if doc_part.contains("://") {
        return SpecLocation::parse(doc_part).map_err(|e| bad_ref(e.to_string()));
    }

    match within {
        SpecLocation::Url(base) => base
            .join(doc_part)
            .map(SpecLocation::from_url)
            .map_err(|e| bad_ref(e.to_string())),
        SpecLocation::File(base) => {
            let path = Path::new(doc_part);
            let resolved = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.parent().unwrap_or_else(|| Path::new(".")).join(path)
            };
            Ok(SpecLocation::from_path(resolved))
        }
    }
}
