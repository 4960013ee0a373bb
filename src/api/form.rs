//! Editor form extraction: query string plus a urlencoded or multipart body

use bytes::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;

use crate::content::FormValues;
use crate::core::error::{Error, Result};
use crate::query::RequestParams;

/// File part of a multipart body
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-side file name
    pub file_name: String,
    /// Content
    pub data: Bytes,
}

/// Values of one editor request. Body values take precedence over the
/// query string, and the first occurrence of a name wins.
#[derive(Debug, Default)]
pub struct EditorForm {
    query: RequestParams,
    body: RequestParams,
    files: HashMap<String, Upload>,
}

impl EditorForm {
    /// Form built from explicit parts
    pub fn new(query: RequestParams, body: RequestParams) -> Self {
        Self {
            query,
            body,
            files: HashMap::new(),
        }
    }

    /// Body value, else query value, else ""
    pub fn value(&self, name: &str) -> String {
        self.body
            .get(name)
            .or_else(|| self.query.get(name))
            .unwrap_or_default()
            .to_string()
    }

    /// Query-string value only, "" when absent
    pub fn query_value(&self, name: &str) -> String {
        self.query.value(name)
    }

    /// Query-string parameters
    pub fn query(&self) -> &RequestParams {
        &self.query
    }

    /// Uploaded file `name`; a part submitted without a file does not count
    pub fn file(&self, name: &str) -> Option<&Upload> {
        self.files.get(name)
    }

    /// Uploaded file `name`, required
    pub fn require_file(&self, name: &str) -> Result<&Upload> {
        self.file(name)
            .ok_or_else(|| Error::invalid_argument(format!("no file uploaded in '{name}'")))
    }
}

impl FormValues for EditorForm {
    fn form_value(&self, name: &str) -> String {
        self.value(name)
    }
}

impl<S: Send + Sync> FromRequest<S> for EditorForm {
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let query = RequestParams::parse(req.uri().query().unwrap_or_default());
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut form = EditorForm::new(query, RequestParams::default());
        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            let mut values = HashMap::new();
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(IntoResponse::into_response)?
            {
                let name = field.name().unwrap_or_default().to_string();
                match field.file_name().map(str::to_string) {
                    Some(file_name) => {
                        let data = field.bytes().await.map_err(IntoResponse::into_response)?;
                        if !file_name.is_empty() && !form.files.contains_key(&name) {
                            form.files.insert(name, Upload { file_name, data });
                        }
                    }
                    None => {
                        let text = field.text().await.map_err(IntoResponse::into_response)?;
                        values.entry(name).or_insert(text);
                    }
                }
            }
            form.body = RequestParams::from(values);
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let body = Bytes::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            form.body = RequestParams::from_bytes(&body);
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    #[tokio::test]
    async fn test_urlencoded_body_wins_over_query() {
        let req = HttpRequest::post("/editor/pages?id=abc&name=fromquery")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=from+body&base=b.html"))
            .unwrap();
        let form = EditorForm::from_request(req, &()).await.unwrap();
        assert_eq!(form.value("name"), "from body");
        assert_eq!(form.value("id"), "abc");
        assert_eq!(form.value("base"), "b.html");
        assert_eq!(form.value("missing"), "");
        assert_eq!(form.query_value("name"), "fromquery");
    }

    #[tokio::test]
    async fn test_multipart_files_and_fields() {
        let body = "--XX\r\n\
            Content-Disposition: form-data; name=\"name\"\r\n\r\n\
            notes.txt\r\n\
            --XX\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"local.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            hello\r\n\
            --XX\r\n\
            Content-Disposition: form-data; name=\"other\"; filename=\"\"\r\n\r\n\
            \r\n\
            --XX--\r\n";
        let req = HttpRequest::post("/editor/files")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XX")
            .body(Body::from(body))
            .unwrap();
        let form = EditorForm::from_request(req, &()).await.unwrap();
        assert_eq!(form.value("name"), "notes.txt");
        let upload = form.file("file").unwrap();
        assert_eq!(upload.file_name, "local.txt");
        assert_eq!(&upload.data[..], b"hello");
        assert!(form.file("other").is_none());
        assert!(form.require_file("other").is_err());
    }
}
