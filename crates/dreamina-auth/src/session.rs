//! Login and credit verification
//!
//! Handles the two identity service interactions:
//! 1. Email/password login, which hands back a `sessionid` cookie
//! 2. Credit lookup, which both validates a session and reports its balance
//!
//! Both are plain POSTs that impersonate the Dreamina web client. Any deviation
//! from the expected response shape is reported as an error, never a panic.

use reqwest::StatusCode;
use reqwest::header::{
    CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER, SET_COOKIE,
    USER_AGENT,
};
use serde_json::Value;
use tracing::debug;

use crate::constants::{
    APP_ID, BROWSER_USER_AGENT, CREDIT_ENDPOINT, CREDIT_FIELDS, CREDIT_SUCCESS_RET,
    LOGIN_ENDPOINT, LOGIN_SUCCESS_MESSAGE, SESSION_COOKIE, WEB_ORIGIN,
};
use crate::error::{Error, Result};

/// Identity service URLs. Overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub login: String,
    pub credit: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: LOGIN_ENDPOINT.to_string(),
            credit: CREDIT_ENDPOINT.to_string(),
        }
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(REFERER, HeaderValue::from_static(WEB_ORIGIN));
    headers.insert(ORIGIN, HeaderValue::from_static(WEB_ORIGIN));
    headers.insert(HeaderName::from_static("appid"), HeaderValue::from_static(APP_ID));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers
}

/// Log in with email and password, returning the new session token.
///
/// Success requires HTTP 200, `"message": "success"` in the body and a
/// non-empty `sessionid` cookie on the response.
pub async fn login(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    email: &str,
    password: &str,
) -> Result<String> {
    let response = client
        .post(&endpoints.login)
        .headers(browser_headers())
        .query(&[("aid", APP_ID), ("account_sdk_source", "web")])
        .form(&[("email", email), ("password", password), ("mix_mode", "1")])
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::Status {
            endpoint: "login",
            status: status.as_u16(),
        });
    }

    // Grab the cookie before the body consumes the response
    let token = session_cookie(response.headers());

    let body: Value = response
        .json()
        .await
        .map_err(|e| Error::Malformed(format!("login response is not JSON: {e}")))?;

    let message = body.get("message").and_then(Value::as_str).unwrap_or("");
    if message != LOGIN_SUCCESS_MESSAGE {
        return Err(Error::Rejected(format!("login returned message {message:?}")));
    }

    debug!("login accepted, session cookie present: {}", token.is_some());
    token.ok_or_else(|| Error::MissingField(format!("{SESSION_COOKIE} cookie")))
}

/// Look up the current credit balance for a session token.
///
/// A successful answer doubles as proof the token is still valid.
pub async fn fetch_credit(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    session_token: &str,
) -> Result<i64> {
    let cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE}={session_token}"))
        .map_err(|e| Error::Malformed(format!("session token is not a valid cookie value: {e}")))?;

    let response = client
        .post(&endpoints.credit)
        .headers(browser_headers())
        .header(CONTENT_TYPE, "application/json")
        .header(COOKIE, cookie)
        .send()
        .await
        .map_err(|e| Error::Http(format!("credit request failed: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::Status {
            endpoint: "credit",
            status: status.as_u16(),
        });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| Error::Malformed(format!("credit response is not JSON: {e}")))?;

    parse_credit(&body)
}

/// Sum the credit buckets of a credit endpoint response.
///
/// `ret` must be `"0"`. `data.credit` must be an object; individual buckets
/// that are absent count as zero.
pub fn parse_credit(body: &Value) -> Result<i64> {
    let ok = match body.get("ret") {
        Some(Value::String(ret)) => ret == CREDIT_SUCCESS_RET,
        Some(Value::Number(ret)) => ret.as_i64() == Some(0),
        _ => false,
    };
    if !ok {
        let ret = body.get("ret").cloned().unwrap_or(Value::Null);
        return Err(Error::Rejected(format!("credit endpoint returned ret={ret}")));
    }

    let credit = body
        .pointer("/data/credit")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::MissingField("data.credit".into()))?;

    let total = CREDIT_FIELDS
        .iter()
        .filter_map(|field| credit.get(*field))
        .map(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)).unwrap_or(0))
        .sum();

    Ok(total)
}

/// Extract the `sessionid` value from `Set-Cookie` response headers.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, value)| name.trim() == SESSION_COOKIE && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}
