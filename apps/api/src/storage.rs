use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

/// Object key for the recording of one candidate answer.
/// `upload_id` keeps two racing uploads for the same turn from sharing a key.
pub fn answer_audio_key(
    interview_id: Uuid,
    turn: i32,
    upload_id: Uuid,
    extension: &str,
) -> String {
    format!("interviews/{interview_id}/turn-{turn}-{upload_id}.{extension}")
}

/// Archives raw answer audio so the session can be replayed later.
pub async fn put_audio(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    bytes: Bytes,
    content_type: &str,
) -> Result<(), AppError> {
    let size = bytes.len();
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(bytes))
        .content_type(content_type)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("upload of {key} failed: {e}")))?;

    info!("Uploaded {size} bytes of answer audio to s3://{bucket}/{key}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_audio_key_layout() {
        let id = Uuid::nil();
        let upload = Uuid::from_u128(1);
        assert_eq!(
            answer_audio_key(id, 3, upload, "webm"),
            "interviews/00000000-0000-0000-0000-000000000000/\
             turn-3-00000000-0000-0000-0000-000000000001.webm"
        );
    }

    #[test]
    fn test_racing_uploads_for_one_turn_get_distinct_keys() {
        let id = Uuid::new_v4();
        let first = answer_audio_key(id, 2, Uuid::new_v4(), "webm");
        let second = answer_audio_key(id, 2, Uuid::new_v4(), "webm");
        assert_ne!(first, second);
        assert!(first.starts_with(&format!("interviews/{id}/turn-2-")));
    }
}
