//! Bearer-token sessions. A login hands out an HS256 JWT; every later request proves who it is
//! by sending it back in the `Authorization` header.
use crate::datastore::structs::User;
use crate::twoface::{Cause, DescribeErr, ExternalError, Fallible, TfError};
use actix_web::{dev::Payload, http::header::Header, web, FromRequest, HttpRequest};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use anyhow::anyhow;
use chrono::{offset::Utc, Duration};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header as JwtHeader, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const LOGIN_REQUIRED: ExternalError = ExternalError {
    cause: Cause::UserBadAuth,
    text: "Login required",
};

/// What a token says about its bearer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User ID
    pub sub: i32,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

const RESET_PURPOSE: &str = "password_reset";

const BAD_RESET_LINK: ExternalError = ExternalError {
    cause: Cause::UserInvalidField,
    text: "The password reset link was invalid, possibly because it has already been used",
};

/// A password reset link. It stops working once the password changes, so each link works once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResetClaims {
    /// User ID
    pub sub: i32,
    pub purpose: String,
    /// Derived from the password hash at the time the link was issued
    pub fingerprint: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and checks login tokens and password reset tokens.
#[derive(Clone)]
pub struct Tokens {
    secret: Vec<u8>,
    ttl: Duration,
    reset_ttl: Duration,
}

/// Short digest of a password hash. Never reveals the hash itself.
fn password_fingerprint(password_hash: &str) -> String {
    hex::encode(&Sha256::digest(password_hash.as_bytes())[..16])
}

impl Tokens {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::seconds(ttl_secs),
            reset_ttl: Duration::days(3),
        }
    }

    pub fn with_reset_ttl(mut self, ttl_secs: i64) -> Self {
        self.reset_ttl = Duration::seconds(ttl_secs);
        self
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn issue(&self, user: &User) -> Fallible<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let token = encode(
            &JwtHeader::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Fallible<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .describe_err(ExternalError {
            cause: Cause::UserBadAuth,
            text: "Invalid or expired token",
        })?;
        Ok(data.claims)
    }

    pub fn issue_reset(&self, user: &User) -> Fallible<String> {
        let now = Utc::now();
        let claims = ResetClaims {
            sub: user.id,
            purpose: RESET_PURPOSE.to_owned(),
            fingerprint: password_fingerprint(&user.password_hash),
            iat: now.timestamp(),
            exp: (now + self.reset_ttl).timestamp(),
        };
        let token = encode(
            &JwtHeader::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(token)
    }

    /// Checks signature and expiry. Whether the link was already used needs the user's current
    /// password hash, see `reset_matches`.
    pub fn verify_reset(&self, token: &str) -> Fallible<ResetClaims> {
        let data = decode::<ResetClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .describe_err(BAD_RESET_LINK)?;
        if data.claims.purpose != RESET_PURPOSE {
            return Err(TfError::reject(BAD_RESET_LINK.cause, BAD_RESET_LINK.text));
        }
        Ok(data.claims)
    }

    pub fn reset_matches(claims: &ResetClaims, user: &User) -> Fallible<()> {
        if claims.sub != user.id || claims.fingerprint != password_fingerprint(&user.password_hash)
        {
            return Err(TfError::reject(BAD_RESET_LINK.cause, BAD_RESET_LINK.text));
        }
        Ok(())
    }
}

fn claims_from(req: &HttpRequest) -> Fallible<Claims> {
    let tokens = req
        .app_data::<web::Data<Tokens>>()
        .ok_or_else(|| anyhow!("Tokens weren't registered as app data"))?;
    let auth = Authorization::<Bearer>::parse(req)
        .map_err(|e| anyhow!("no usable bearer token: {}", e))
        .describe_err(LOGIN_REQUIRED)?;
    tokens.verify(auth.into_scheme().token())
}

/// Whoever sent the request. Guests, and requests with a bad token, are `Viewer(None)`.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<Claims>);

impl Viewer {
    pub fn user_id(&self) -> Option<i32> {
        self.0.as_ref().map(|claims| claims.sub)
    }
}

impl FromRequest for Viewer {
    type Error = TfError;
    type Future = Ready<Result<Self, Self::Error>>;
    type Config = ();

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(Viewer(claims_from(req).ok())))
    }
}

/// A viewer that must be logged in. Extraction fails with 401 otherwise.
#[derive(Debug, Clone)]
pub struct LoggedIn(pub Claims);

impl FromRequest for LoggedIn {
    type Error = TfError;
    type Future = Ready<Result<Self, Self::Error>>;
    type Config = ();

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(claims_from(req).map(LoggedIn))
    }
}
