use anyhow::{Ok, Result};

use super::config_model::DotEnvyConfig;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = super::config_model::BackendServer {
        port: std::env::var("SERVER_PORT")
            .expect("SERVER_PORT is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = super::config_model::Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let project_url =
        std::env::var("SUPABASE_PROJECT_URL").expect("SUPABASE_PROJECT_URL is invalid");
    let supabase = super::config_model::Supabase {
        jwt_secret: std::env::var("SUPABASE_JWT_SECRET").expect("SUPABASE_JWT_SECRET is invalid"),
        audio_bucket: std::env::var("SUPABASE_AUDIO_BUCKET")
            .unwrap_or_else(|_| "audio-files".to_string()),
        s3_endpoint: std::env::var("SUPABASE_S3_ENDPOINT")
            .unwrap_or_else(|_| format!("{}/storage/v1/s3", project_url)),
        s3_region: std::env::var("SUPABASE_S3_REGION").expect("SUPABASE_S3_REGION is invalid"),
        s3_access_key: std::env::var("SUPABASE_S3_ACCESS_KEY_ID")
            .expect("SUPABASE_S3_ACCESS_KEY_ID is invalid"),
        s3_secret_key: std::env::var("SUPABASE_S3_SECRET_ACCESS_KEY")
            .expect("SUPABASE_S3_SECRET_ACCESS_KEY is invalid"),
        project_url,
    };

    let engine = super::config_model::Engine {
        base_url: std::env::var("ENGINE_BASE_URL").expect("ENGINE_BASE_URL is invalid"),
        api_key: std::env::var("ENGINE_API_KEY").expect("ENGINE_API_KEY is invalid"),
        timeout_secs: std::env::var("ENGINE_TIMEOUT")
            .unwrap_or_else(|_| "600".to_string())
            .parse()?,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        supabase,
        engine,
    })
}
