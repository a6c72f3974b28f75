// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `X-Twilio-Signature` validation.
//!
//! The signature is `base64(HMAC-SHA1(auth_token, url + k1 + v1 + k2 + v2 ...))`
//! with the POST parameters sorted by name and `url` exactly as configured
//! in the Twilio console, query string included.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

fn signing_mac(auth_token: &str, url: &str, params: &BTreeMap<String, String>) -> Option<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());
    for (key, value) in params {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Some(mac)
}

/// The signature Twilio would send for this request.
pub fn compute_signature(auth_token: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    signing_mac(auth_token, url, params)
        .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Constant-time check of a signature header. A missing or malformed
/// header never validates.
pub fn verify_signature(
    auth_token: &str,
    url: &str,
    params: &BTreeMap<String, String>,
    signature_header: Option<&str>,
) -> bool {
    let signature = signature_header.unwrap_or("").trim();
    if signature.is_empty() {
        return false;
    }
    let Ok(expected) = STANDARD.decode(signature) else {
        return false;
    };
    let Some(mac) = signing_mac(auth_token, url, params) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}
