use crate::JobId;

/// Progress of the current (or most recent) dataset upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    pub id: JobId,
    pub file_name: String,
    pub percent: u8,
}

/// Pre-flight check run before any network activity.
///
/// Extensions are compared case-insensitively and may be given with or
/// without the leading dot.
pub fn validate_upload_name(file_name: &str, accepted: &[String]) -> Result<(), String> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(stem, ext)| (stem, ext.trim()))
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext);

    let Some(extension) = extension else {
        return Err(format!("file `{file_name}` has no extension"));
    };

    let allowed = accepted
        .iter()
        .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(extension));
    if allowed {
        Ok(())
    } else {
        Err(format!(
            "file `{file_name}` must be one of: {}",
            accepted
                .iter()
                .map(|ext| format!(".{}", ext.trim_start_matches('.')))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}
