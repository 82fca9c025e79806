//! Multipart upload parsing.

use crate::error::{Error, Result};
use crate::inference::BackgroundChoice;
use crate::pipeline::EnhancementRequest;
use crate::registry::UpsampleScale;
use futures_util::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use warp::hyper::body::Buf;
use warp::multipart::{FormData, Part};

/// Form field carrying the image.
pub const FILE_FIELD: &str = "file";

/// Longest accepted text field, in bytes.
const MAX_TEXT_FIELD: usize = 4096;

/// The uploaded file part.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    /// Client-side file name, if any.
    pub filename: Option<String>,
    /// Declared MIME type.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Fields of an upload form, before interpretation.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    /// The `file` part, if present.
    pub file: Option<UploadedFile>,
    /// Every other field, as text.
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Identity token, for failure logs.
    pub fn user_token(&self) -> &str {
        self.field("user_id").unwrap_or_default()
    }

    /// Requested version, for failure logs.
    pub fn version(&self) -> &str {
        self.field("version").unwrap_or_default()
    }

    /// Interpret the form as an enhancement request.
    ///
    /// Absent optional fields take their defaults. Only field syntax is
    /// checked here; the request itself is validated by the pipeline.
    pub fn into_request(self) -> Result<EnhancementRequest> {
        let mut request = {
            let file = self.file.as_ref().ok_or_else(|| Error::validation("No file part"))?;
            if file.bytes.is_empty() && file.filename.as_deref().is_none_or(str::is_empty) {
                return Err(Error::validation("No selected file"));
            }
            EnhancementRequest::new(Vec::new(), file.content_type.clone(), self.user_token())
        };

        if let Some(version) = self.field("version") {
            request = request.with_version(version);
        }
        if let Some(upscale) = self.field("upscale") {
            let upscale = upscale
                .parse::<u32>()
                .map_err(|_| Error::validation(format!("upscale must be an integer, got '{upscale}'")))?;
            request = request.with_upscale(upscale);
        }

        let background = self
            .field("bg_upsampler")
            .map_or(Ok(BackgroundChoice::None), str::parse::<BackgroundChoice>)?;
        let scale = self
            .field("real_esrgan")
            .map_or(Ok(UpsampleScale::X4), str::parse::<UpsampleScale>)?;
        request = request.with_background(background, scale);

        if let Some(file) = self.file {
            request.image_bytes = file.bytes;
        }
        Ok(request)
    }
}

async fn read_part(part: Part, limit: usize) -> Result<Vec<u8>> {
    let name = part.name().to_string();
    let mut stream = std::pin::pin!(part.stream());
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::validation(format!("Malformed upload: {e}")))?;
        if bytes.len() + chunk.remaining() > limit {
            return Err(Error::validation(format!("Field '{name}' is too large")));
        }
        bytes.extend_from_slice(chunk.chunk());
    }
    Ok(bytes)
}

/// Collect every part of a multipart body.
///
/// The file part may be up to `max_file_bytes + 1` bytes, so the oversize
/// case still reaches request validation with its usual message.
pub async fn read_form(form: FormData, max_file_bytes: u64) -> Result<UploadForm> {
    let file_limit = usize::try_from(max_file_bytes.saturating_add(1)).unwrap_or(usize::MAX);
    let mut parts = std::pin::pin!(form.map_err(|e| Error::validation(format!("Malformed upload: {e}"))));
    let mut upload = UploadForm::default();

    while let Some(part) = parts.try_next().await? {
        let name = part.name().to_string();
        if name == FILE_FIELD {
            let filename = part.filename().map(str::to_string);
            let content_type = part.content_type().map(str::to_string);
            let bytes = read_part(part, file_limit).await?;
            upload.file = Some(UploadedFile {
                filename,
                content_type,
                bytes,
            });
        } else {
            let bytes = read_part(part, MAX_TEXT_FIELD).await?;
            let value = String::from_utf8(bytes)
                .map_err(|_| Error::validation(format!("Field '{name}' is not valid UTF-8")))?;
            upload.fields.insert(name, value);
        }
    }
    Ok(upload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::ModelVersion;

    fn form(fields: &[(&str, &str)]) -> UploadForm {
        UploadForm {
            file: Some(UploadedFile {
                filename: Some("face.png".to_string()),
                content_type: Some("image/png".to_string()),
                bytes: vec![1, 2, 3],
            }),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_defaults_when_fields_absent() {
        let request = form(&[("user_id", "abc")]).into_request().unwrap();
        assert_eq!(request.user_token, "abc");
        assert_eq!(request.version, "1.4");
        assert_eq!(request.upscale, 4);
        assert_eq!(request.background, BackgroundChoice::None);
        assert_eq!(request.background_scale, UpsampleScale::X4);
        assert_eq!(request.image_bytes, vec![1, 2, 3]);
        assert_eq!(request.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_all_fields_are_read() {
        let request = form(&[
            ("user_id", "abc"),
            ("version", "RestoreFormer"),
            ("upscale", "2"),
            ("bg_upsampler", "realesrgan"),
            ("real_esrgan", "x2"),
        ])
        .into_request()
        .unwrap();
        assert_eq!(request.version, ModelVersion::RestoreFormer.as_str());
        assert_eq!(request.upscale, 2);
        assert_eq!(request.background, BackgroundChoice::RealEsrgan);
        assert_eq!(request.background_scale, UpsampleScale::X2);
    }

    #[test]
    fn test_blank_fields_take_defaults() {
        let request = form(&[("user_id", "abc"), ("version", " "), ("upscale", "")])
            .into_request()
            .unwrap();
        assert_eq!(request.version, "1.4");
        assert_eq!(request.upscale, 4);
    }

    #[test]
    fn test_missing_file_part() {
        let mut upload = form(&[("user_id", "abc")]);
        upload.file = None;
        let err = upload.into_request().unwrap_err();
        assert_eq!(err.to_string(), "No file part");
    }

    #[test]
    fn test_empty_file_selection() {
        let mut upload = form(&[("user_id", "abc")]);
        upload.file = Some(UploadedFile::default());
        assert_eq!(upload.into_request().unwrap_err().to_string(), "No selected file");
    }

    #[test]
    fn test_malformed_scalars_are_validation_errors() {
        let err = form(&[("upscale", "four")]).into_request().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = form(&[("bg_upsampler", "waifu2x")]).into_request().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = form(&[("real_esrgan", "x3")]).into_request().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
