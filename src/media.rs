//! Uploaded images, stored as raw bytes with their content type alongside.

use image::ImageFormat;
use mime_guess::from_path;
use spin_sdk::http::Response;
use uuid::Uuid;

use crate::config::*;
use crate::core::errors::AppError;
use crate::core::multipart::UploadedFile;
use crate::core::store::Store;

/// Raster formats accepted for upload, with their served type and extension.
fn accepted_format(format: ImageFormat) -> Option<(&'static str, &'static str)> {
    match format {
        ImageFormat::Png => Some(("image/png", "png")),
        ImageFormat::Jpeg => Some(("image/jpeg", "jpg")),
        ImageFormat::Gif => Some(("image/gif", "gif")),
        ImageFormat::WebP => Some(("image/webp", "webp")),
        _ => None,
    }
}

/// Content type of an upload judged by its leading bytes. The declared type
/// and file name are ignored, so markup formats such as SVG never pass.
pub fn image_content_type(file: &UploadedFile) -> Option<&'static str> {
    let format = image::guess_format(&file.data).ok()?;
    accepted_format(format).map(|(content_type, _)| content_type)
}

pub fn validate_image(file: &UploadedFile) -> Result<&'static str, String> {
    if file.data.is_empty() {
        return Err("The submitted file is empty.".to_string());
    }
    if file.data.len() > MAX_UPLOAD_BYTES {
        return Err("The submitted file is too large.".to_string());
    }
    image_content_type(file).ok_or_else(|| {
        "Upload a valid image. The file you uploaded was either not an image or a corrupted image."
            .to_string()
    })
}

/// Saves the bytes under `{folder}/{uuid}.{ext}` and returns that key. The
/// extension follows the detected format.
pub fn save_media(store: &Store, folder: &str, file: &UploadedFile, content_type: &str) -> anyhow::Result<String> {
    let ext = image::guess_format(&file.data)
        .ok()
        .and_then(accepted_format)
        .map(|(_, ext)| ext)
        .unwrap_or("img");
    let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);

    store.set(&media_key(&key), &file.data)?;
    store.set(&media_type_key(&key), content_type.as_bytes())?;
    Ok(key)
}

pub fn delete_media(store: &Store, key: &str) -> anyhow::Result<()> {
    store.delete(&media_key(key))?;
    store.delete(&media_type_key(key))
}

pub fn serve_media(store: &Store, path: &str) -> anyhow::Result<Response> {
    let key = path.trim_start_matches("/media/");
    let data = match store.get(&media_key(key))? {
        Some(d) => d,
        None => return Ok(AppError::NotFound("File not found".to_string()).into()),
    };
    let content_type = store
        .get(&media_type_key(key))?
        .and_then(|ct| String::from_utf8(ct).ok())
        .unwrap_or_else(|| from_path(key).first_or_octet_stream().to_string());

    Ok(Response::builder()
        .status(200)
        .header("content-type", content_type)
        .header("cache-control", "public, max-age=86400")
        .header("x-content-type-options", "nosniff")
        .body(data)
        .build())
}
