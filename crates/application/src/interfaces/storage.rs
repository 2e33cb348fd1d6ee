use anyhow::Result;
use async_trait::async_trait;

/// Blob-store operations on separated stem files. The store itself lives
/// outside this system; deletion cleanup is the only thing we do to it.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait StemStorageClient: Send + Sync {
    async fn delete_object(&self, storage_path: &str) -> Result<()>;
}

/// Storage object path for a result file URL served from the public bucket,
/// if the URL points into it.
pub fn object_path_from_url(public_url: &str, bucket: &str) -> Option<String> {
    let marker = format!("/object/public/{}/", bucket);
    let start = public_url.find(&marker)? + marker.len();
    let rest = &public_url[start..];
    let path = match rest.split_once('?') {
        Some((path, _)) => path,
        None => rest,
    };
    if path.is_empty() { None } else { Some(path.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_object_path_from_a_public_url() {
        let url = "https://abc.supabase.co/storage/v1/object/public/audio-files/u1/separated/x_vocals.wav";
        assert_eq!(
            object_path_from_url(url, "audio-files"),
            Some("u1/separated/x_vocals.wav".to_string())
        );
    }

    #[test]
    fn strips_query_strings() {
        let url = "https://abc.supabase.co/storage/v1/object/public/audio-files/u1/separated/x_drums.wav?download=true";
        assert_eq!(
            object_path_from_url(url, "audio-files"),
            Some("u1/separated/x_drums.wav".to_string())
        );
    }

    #[test]
    fn ignores_urls_outside_the_bucket() {
        let url = "https://cdn.example/somewhere/else.wav";
        assert_eq!(object_path_from_url(url, "audio-files"), None);
    }
}
