//! Uploaded post images. Files are content-addressed, so uploading the same picture twice
//! stores it once.
use crate::twoface::{BlockingResp, Cause, DescribeErr, ExternalError, Fallible, TfError};
use actix_web::{http::header, web, HttpResponse};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::info;

/// Directory under the media root that post images live in.
const POSTS_DIR: &str = "posts";

/// An image sent inside a JSON form body.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImageUpload {
    /// The client's file name. Only used for logging; stored names are derived from the content.
    pub name: String,
    /// Base64 of the file's bytes
    pub content: String,
}

/// Formats we accept, with the extension and content type they're served under.
fn stored_kind(format: ImageFormat) -> Option<(&'static str, &'static str)> {
    match format {
        ImageFormat::Gif => Some(("gif", "image/gif")),
        ImageFormat::Png => Some(("png", "image/png")),
        ImageFormat::Jpeg => Some(("jpg", "image/jpeg")),
        ImageFormat::WebP => Some(("webp", "image/webp")),
        ImageFormat::Bmp => Some(("bmp", "image/bmp")),
        _ => None,
    }
}

fn content_type_for(extension: &str) -> Option<&'static str> {
    match extension {
        "gif" => Some("image/gif"),
        "png" => Some("image/png"),
        "jpg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// URL path that serves a stored image, given its media-relative path.
pub fn url(stored_path: &str) -> String {
    format!("/media/{}", stored_path)
}

fn not_an_image() -> ExternalError {
    ExternalError::invalid_field(
        "Upload a valid image. The file you uploaded was either not an image or a corrupted image",
    )
}

/// An upload that decoded as an image, with the path it will be stored under.
#[derive(Debug)]
pub struct CheckedImage {
    /// Media-relative, e.g. `posts/<sha256>.gif`
    pub stored_path: String,
    file_name: String,
    client_name: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Decode the upload to make sure it's a whole image. Nothing is written yet, see `store`.
    pub async fn check(&self, upload: &ImageUpload) -> Fallible<CheckedImage> {
        let bytes = base64::decode(&upload.content).describe_err(ExternalError::invalid_field(
            "Image content must be base64",
        ))?;
        let format = image::guess_format(&bytes).describe_err(not_an_image())?;
        guard!(let Some((extension, _)) = stored_kind(format) else {
            return Err(TfError::reject(
                Cause::UserInvalidField,
                "Images must be gif, png, jpeg, webp or bmp",
            ));
        });
        let bytes = web::block(move || {
            image::load_from_memory_with_format(&bytes, format)
                .describe_err(not_an_image())
                .map(|_| bytes)
        })
        .await
        .to_resp()?;

        let file_name = format!("{}.{}", hex::encode(Sha256::digest(&bytes)), extension);
        Ok(CheckedImage {
            stored_path: format!("{}/{}", POSTS_DIR, file_name),
            file_name,
            client_name: upload.name.clone(),
            bytes,
        })
    }

    /// Write a checked image to disk. Returns its media-relative path.
    pub async fn store(&self, image: CheckedImage) -> Fallible<String> {
        let dir = self.root.join(POSTS_DIR);
        let path = dir.join(&image.file_name);
        let bytes = image.bytes;
        web::block(move || {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&path, &bytes)
        })
        .await
        .to_resp()?;
        info!(
            upload = &image.client_name[..],
            stored = &image.stored_path[..],
            "saved post image"
        );
        Ok(image.stored_path)
    }

    /// Serve `posts/{file_name}`. Anything that isn't a name this store could have produced is a 404.
    pub async fn serve(&self, file_name: &str) -> Fallible<HttpResponse> {
        let not_found = || TfError::reject(Cause::NotFound, "Image not found");
        let mut parts = file_name.splitn(2, '.');
        let digest = parts.next().unwrap_or_default();
        let extension = parts.next().unwrap_or_default();
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(not_found());
        }
        guard!(let Some(content_type) = content_type_for(extension) else {
            return Err(not_found());
        });

        let path = self.root.join(POSTS_DIR).join(file_name);
        let bytes = match web::block(move || std::fs::read(path)).await {
            Ok(bytes) => bytes,
            Err(actix_web::error::BlockingError::Error(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(not_found())
            }
            Err(e) => return Err(anyhow::anyhow!("couldn't read image: {}", e).into()),
        };
        Ok(HttpResponse::Ok()
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
            .body(bytes))
    }
}
