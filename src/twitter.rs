//! Twitter credential check
//!
//! Calls `account/verify_credentials` on behalf of the signatory, signing
//! the request with OAuth 1.0a (HMAC-SHA1) using the app's consumer key and
//! the access token stored with the signup.

use crate::config::TwitterConfig;
use crate::models::Credentials;
use crate::pipeline::verifier::VerificationTransport;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const VERIFY_PATH: &str = "/1.1/account/verify_credentials.json";
const VERIFY_QUERY: [(&str, &str); 2] = [("skip_status", "true"), ("include_entities", "false")];

/// Signed HTTPS transport for profile verification
pub struct TwitterTransport {
    http: reqwest::Client,
    api_url: String,
    consumer_key: String,
    consumer_secret: String,
}

impl TwitterTransport {
    pub fn new(http: reqwest::Client, config: &TwitterConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
        }
    }

    fn authorization(&self, url: &str, credentials: &Credentials, nonce: &str, timestamp: i64) -> String {
        let timestamp = timestamp.to_string();
        let oauth_params = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", credentials.token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let mut all_params: Vec<(&str, &str)> = oauth_params.to_vec();
        all_params.extend(VERIFY_QUERY);
        let base = signature_base_string("GET", url, &all_params);
        let signature = sign(&base, &self.consumer_secret, &credentials.secret);

        let mut header_params: Vec<(&str, &str)> = oauth_params.to_vec();
        header_params.push(("oauth_signature", signature.as_str()));
        let fields: Vec<String> = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }
}

#[async_trait]
impl VerificationTransport for TwitterTransport {
    async fn fetch_profile(&self, credentials: &Credentials) -> Result<Vec<u8>, String> {
        let url = format!("{}{}", self.api_url, VERIFY_PATH);
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let authorization = self.authorization(&url, credentials, &nonce, chrono::Utc::now().timestamp());

        let response = self
            .http
            .get(&url)
            .query(&VERIFY_QUERY)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("verify_credentials returned {}", status));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}

/// RFC 3986 percent-encoding (unreserved characters pass through)
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// `METHOD&url&sorted-params`, each part percent-encoded
pub fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let joined = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}&{}&{}", method.to_uppercase(), percent_encode(url), percent_encode(&joined))
}

fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> String {
    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(base.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
