mod caption;
mod config;
mod error;
mod gemini;
mod routes;
mod scratch;
mod tts;
mod vision;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use caption::CaptionService;
use config::{AppConfig, PromptConfig};
use routes::configure_routes;
use tts::SpeechService;
use vision::VisionService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env();
    let prompts = PromptConfig::load(&config.prompts_path);

    match &config.project_id {
        Some(project) => log::info!("Project {} in {}", project, config.location),
        None => log::info!("No project id configured; region {}", config.location),
    }
    if config.gemini_api_key.is_none() {
        log::warn!(
            "GEMINI_API_KEY is not set; narration and speech calls will fail with an authentication error"
        );
    }
    if config.vision_api_key.is_none() {
        log::warn!(
            "No vision API key configured (GOOGLE_VISION_API_KEY or GEMINI_API_KEY); vision calls will fail with an authentication error"
        );
    }

    let vision = VisionService::new(&config);
    let caption = CaptionService::new(&config, prompts);
    let speech = SpeechService::new(&config);

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(vision.clone()))
            .app_data(web::Data::new(caption.clone()))
            .app_data(web::Data::new(speech.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
