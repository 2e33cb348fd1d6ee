#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub supabase: Supabase,
    pub engine: Engine,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

/// Supabase hosts both the auth boundary (JWT secret) and the storage bucket
/// that keeps uploads and separated stems, reached over its S3-compatible
/// endpoint.
#[derive(Debug, Clone)]
pub struct Supabase {
    pub project_url: String,
    pub jwt_secret: String,
    pub audio_bucket: String,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
}

/// The hosted Demucs separation service.
#[derive(Debug, Clone)]
pub struct Engine {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}
