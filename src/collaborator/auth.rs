use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    config,
    core::{
        error::{BridgeError, BridgeResult},
        traits::Authorizer,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub exp: u64,
    pub iat: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn secret_bytes(cfg: &config::Auth) -> BridgeResult<Vec<u8>> {
    let secret = cfg
        .secret
        .as_ref()
        .ok_or_else(|| BridgeError::Configuration("missing secret".to_string()))?;
    if cfg.base64_secret {
        general_purpose::STANDARD
            .decode(secret)
            .map_err(|_| BridgeError::Configuration("invalid base64 secret".to_string()))
    } else {
        Ok(secret.as_bytes().to_vec())
    }
}

fn decoding_key(cfg: &config::Auth) -> BridgeResult<DecodingKey> {
    match cfg.algorithm {
        Algorithm::HS256 | Algorithm::HS512 => Ok(DecodingKey::from_secret(&secret_bytes(cfg)?)),
        Algorithm::RS256 => {
            let public_key = cfg
                .public_key
                .as_ref()
                .ok_or_else(|| BridgeError::Configuration("missing public_key".to_string()))?;
            DecodingKey::from_rsa_pem(public_key.as_bytes())
                .map_err(|_| BridgeError::Configuration("bad pem".to_string()))
        }
        _ => Err(BridgeError::Configuration(
            "unsupported algorithm".to_string(),
        )),
    }
}

/// JWT verification against a shared secret or an RSA public key.
pub struct JwtAuthorizer {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    // only HMAC deployments can mint tokens locally
    encoding_key: Option<EncodingKey>,
    validation: Validation,
    ttl_secs: u64,
    users: Vec<String>,
}

impl JwtAuthorizer {
    pub fn new(cfg: &config::Auth) -> BridgeResult<Self> {
        let decoding_key = decoding_key(cfg)?;
        let encoding_key = match cfg.algorithm {
            Algorithm::HS256 | Algorithm::HS512 => {
                Some(EncodingKey::from_secret(&secret_bytes(cfg)?))
            }
            _ => None,
        };

        let mut validation = Validation::new(cfg.algorithm);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        Ok(Self {
            algorithm: cfg.algorithm,
            decoding_key,
            encoding_key,
            validation,
            ttl_secs: cfg.token_ttl_secs,
            users: cfg.users.clone(),
        })
    }

    pub fn verify(&self, token: &str) -> BridgeResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Mint a token for `user_id`, valid for the configured lifetime.
    pub fn issue_token(&self, user_id: &str) -> BridgeResult<String> {
        let key = self.encoding_key.as_ref().ok_or_else(|| {
            BridgeError::Configuration("token issuance needs an HMAC secret".to_string())
        })?;
        let iat = now_secs();
        let claims = Claims {
            user_id: user_id.to_string(),
            exp: iat + self.ttl_secs,
            iat,
        };
        Ok(encode(&Header::new(self.algorithm), &claims, key)?)
    }

    fn is_known(&self, user_id: &str) -> bool {
        self.users.is_empty() || self.users.iter().any(|u| u == user_id)
    }
}

impl Authorizer for JwtAuthorizer {
    fn is_authorized(&self, token: &str) -> bool {
        match self.verify(token) {
            Ok(claims) => self.is_known(&claims.user_id),
            Err(e) => {
                warn!("Token rejected: {e}");
                false
            }
        }
    }

    fn identity_from_token(&self, token: &str) -> Option<String> {
        self.verify(token)
            .ok()
            .map(|claims| claims.user_id)
            .filter(|user_id| !user_id.is_empty())
    }
}

/// Used when no `auth` section is configured: every action is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllAuthorizer;

impl Authorizer for DenyAllAuthorizer {
    fn is_authorized(&self, _token: &str) -> bool {
        false
    }

    fn identity_from_token(&self, _token: &str) -> Option<String> {
        None
    }
}
