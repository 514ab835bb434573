//! Form bodies, either urlencoded or `multipart/form-data` (uploads).

use std::collections::HashMap;

use spin_sdk::http::Request;

use crate::core::helpers::content_type;
use crate::core::query_params::parse_form;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

pub fn parse_request_form(req: &Request) -> anyhow::Result<FormData> {
    let ct = content_type(req);
    if ct.starts_with("multipart/form-data") {
        parse_multipart(ct, req.body())
    } else {
        Ok(FormData {
            fields: parse_form(req.body()),
            files: HashMap::new(),
        })
    }
}

pub fn parse_multipart(content_type: &str, body: &[u8]) -> anyhow::Result<FormData> {
    let boundary = multer::parse_boundary(content_type)?;
    let body = body.to_vec();
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    // The whole body is already in memory, so nothing here actually waits.
    futures::executor::block_on(async move {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(|m| m.to_string());
                    let data = field.bytes().await?.to_vec();
                    // An empty file input still sends a part
                    if file_name.is_empty() && data.is_empty() {
                        continue;
                    }
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            data,
                        },
                    );
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok::<_, anyhow::Error>(form)
    })
}
