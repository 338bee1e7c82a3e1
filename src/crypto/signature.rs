use sha2::{Digest, Sha256};

/// Signs request parameters the way the image CDN expects.
///
/// Parameters are sorted by name, joined as `k=v&k=v`, suffixed with the API
/// secret and hashed with SHA-256. Returns the lowercase hex digest.
pub fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
