use actix::Addr;
use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::{ApiError, SessionError};
use crate::session::{GetSession, SessionManager};

type HmacSha256 = Hmac<Sha256>;

/// Issues and checks the tokens handed out on wallet connect.
#[derive(Clone)]
pub struct SessionGate {
    secret: Vec<u8>,
}

impl SessionGate {
    pub fn new(secret: &str) -> Self {
        SessionGate {
            secret: secret.as_bytes().to_vec(),
        }
    }

    pub fn token_for(&self, public_key: &str) -> String {
        hex::encode(self.hasher(public_key).finalize().into_bytes())
    }

    fn hasher(&self, public_key: &str) -> HmacSha256 {
        let mut hmac_hasher =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC takes keys of any size");
        hmac_hasher.update(public_key.as_bytes());
        hmac_hasher
    }

    fn verify(&self, public_key: &str, token: &str) -> bool {
        match hex::decode(token) {
            Ok(hash) => self.hasher(public_key).verify_slice(&hash).is_ok(),
            Err(_) => false,
        }
    }

    /// Lets the request through only while a wallet session is open and the
    /// `Authorization` header carries that session's token. Returns the
    /// connected public key.
    pub async fn check(
        &self,
        request: &HttpRequest,
        session: &Addr<SessionManager>,
    ) -> Result<String, ApiError> {
        let token = request
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .map(HeaderValue::to_str)
            .and_then(Result::ok)
            .ok_or(ApiError::Unauthorized)?;
        let snapshot = session
            .send(GetSession)
            .await
            .map_err(|_| SessionError::Unavailable)?;
        match snapshot.public_key {
            Some(public_key) if snapshot.connected && self.verify(&public_key, token) => {
                Ok(public_key)
            }
            _ => Err(ApiError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_bound_to_key_and_secret() {
        let gate = SessionGate::new("secret");
        let token = gate.token_for("alice");
        assert_eq!(token.len(), 64);
        assert!(gate.verify("alice", &token));
        assert!(!gate.verify("bob", &token));
        assert!(!SessionGate::new("other").verify("alice", &token));
        assert!(!gate.verify("alice", "not hex"));
    }
}
