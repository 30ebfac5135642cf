use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use shared::UploadResponse;
use std::io::Write;
use uuid::Uuid;

use crate::caption::CaptionService;
use crate::error::ApiError;
use crate::scratch::ScratchFile;
use crate::tts::SpeechService;
use crate::vision::{VisionFeature, VisionService};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/upload").route(web::post().to(upload)))
        .service(web::resource("/upload-with-audio").route(web::post().to(upload_with_audio)));
}

/// POST /upload
/// form-data: file field named 'image'
/// returns: json { vision: {...} }
async fn upload(
    vision: web::Data<VisionService>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let image = read_image_field(&mut payload).await?;
    validate_image(&image)?;
    let scratch = ScratchFile::from_bytes(&image)?;
    info!("[{}] /upload: analyzing {} byte image", request_id, image.len());

    let result = vision
        .annotate_file(scratch.path(), &VisionFeature::all())
        .await
        .map_err(|e| {
            error!("[{}] vision analysis failed: {}", request_id, e);
            ApiError::from(e)
        })?;

    Ok(HttpResponse::Ok().json(UploadResponse { vision: result }))
}

/// POST /upload-with-audio
/// form-data: file field named 'image'
/// returns: WAV audio bytes as an attachment
///
/// Strict sequence: vision analysis, then narration grounded in the vision
/// result, then speech synthesis. The first failing step aborts the rest.
async fn upload_with_audio(
    vision: web::Data<VisionService>,
    caption: web::Data<CaptionService>,
    speech: web::Data<SpeechService>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let image = read_image_field(&mut payload).await?;
    validate_image(&image)?;
    let scratch = ScratchFile::from_bytes(&image)?;
    info!(
        "[{}] /upload-with-audio: narrating {} byte image",
        request_id,
        image.len()
    );

    let vision_result = vision
        .annotate_file(scratch.path(), &VisionFeature::all())
        .await
        .map_err(|e| {
            error!("[{}] vision analysis failed: {}", request_id, e);
            ApiError::from(e)
        })?;

    let narration = caption
        .narrate_file(scratch.path(), Some(&vision_result))
        .await
        .map_err(|e| {
            error!("[{}] narration failed: {}", request_id, e);
            ApiError::from(e)
        })?;
    info!(
        "[{}] narration of {} chars generated",
        request_id,
        narration.len()
    );

    // narrate() guarantees a non-empty narration, so speech is only ever
    // invoked with usable text.
    let audio = speech.synthesize(&narration).await.map_err(|e| {
        error!("[{}] speech synthesis failed: {}", request_id, e);
        ApiError::from(e)
    })?;

    Ok(HttpResponse::Ok()
        .content_type(audio.content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename("description.wav".to_string())],
        })
        .body(audio.bytes))
}

/// Collect the bytes of the multipart field named `image`, enforcing the
/// upload size limit while streaming.
async fn read_image_field(payload: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Ok(Some(mut field)) = payload.try_next().await {
        if field.name() != Some("image") {
            // Drain so the stream can advance to the next field.
            while let Some(Ok(_)) = field.next().await {}
            continue;
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| ApiError::BadRequest(format!("invalid multipart payload: {}", e)))?;
            if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::BadRequest(format!(
                    "image exceeds the {} byte limit",
                    MAX_UPLOAD_BYTES
                )));
            }
            data.write_all(&chunk)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
        }
        if data.is_empty() {
            return Err(ApiError::BadRequest("empty file".into()));
        }
        return Ok(data);
    }
    Err(ApiError::BadRequest("no 'image' file field in request".into()))
}

fn validate_image(data: &[u8]) -> Result<(), ApiError> {
    image::guess_format(data)
        .map(|_| ())
        .map_err(|_| ApiError::BadRequest("unsupported or non-image upload".into()))
}
