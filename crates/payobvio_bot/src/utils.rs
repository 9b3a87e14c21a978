use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// GitHub rejects app tokens that live longer than ten minutes
const JWT_LIFETIME_SECS: u64 = 60 * 10;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: u64,
    exp: u64,
    iss: String,
}

/// To access github api as the application, we need to generate a jwt to use with github's api
pub fn generate_github_jwt(app_id: u64, private_key: &str) -> anyhow::Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs();

    let claims = Claims {
        // backdated to absorb clock drift between us and github
        iat: now.saturating_sub(60),
        exp: now + JWT_LIFETIME_SECS - 60,
        iss: app_id.to_string(),
    };

    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .context("CLIENT_PRIVATE_KEY is not a valid RSA key")?;

    encode(&Header::new(Algorithm::RS256), &claims, &key).context("Failed encoding jwt token")
}
