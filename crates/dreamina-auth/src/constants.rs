//! Dreamina web client constants
//!
//! These identify the public web application, the same values the browser
//! sends. They are not secrets; session tokens are handled by the cache.

/// Web application id sent as both the `aid` query param and the `Appid` header
pub const APP_ID: &str = "513641";

/// Email/password login endpoint (international passport service)
pub const LOGIN_ENDPOINT: &str = "https://login-row.www.capcut.com/passport/web/email/login/";

/// Credit balance endpoint, doubles as the session validity check
pub const CREDIT_ENDPOINT: &str = "https://commerce-api-sg.capcut.com/commerce/v1/benefits/user_credit";

/// Origin and referer expected by both endpoints
pub const WEB_ORIGIN: &str = "https://dreamina.capcut.com";

/// Browser user agent presented to the identity service
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Cookie that carries the session token
pub const SESSION_COOKIE: &str = "sessionid";

/// `message` value of a successful login response
pub const LOGIN_SUCCESS_MESSAGE: &str = "success";

/// `ret` value of a successful credit response
pub const CREDIT_SUCCESS_RET: &str = "0";

/// Balance buckets summed into the usable credit total.
pub const CREDIT_FIELDS: &[&str] = &["vip_credit", "gift_credit", "purchase_credit"];
