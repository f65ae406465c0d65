use sha2::{Digest, Sha512};
use tower_cookies::cookie::time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, CookieManagerLayer, Cookies, Key, SignedCookies};

use crate::error::{AppError, Result};

/// The name of the cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "authjs.session-token";
/// The name of the signed cookie carrying the pending OAuth state.
pub const STATE_COOKIE: &str = "authjs.oauth-state";

/// The cookie plugin: a per-request jar plus a signed view keyed from the
/// process-wide cookie secret.
#[derive(Clone)]
pub struct CookiePlugin {
    key: Key,
    secure: bool,
}

impl CookiePlugin {
    /// Derives the 64-byte jar key from `secret`.
    pub fn new(secret: &[u8], secure: bool) -> Result<Self> {
        if secret.is_empty() {
            return Err(AppError::Config("cookie secret must not be empty".to_string()));
        }

        let digest = Sha512::digest(secret);
        Ok(Self {
            key: Key::from(digest.as_slice()),
            secure,
        })
    }

    /// The layer that parses `Cookie` and writes `Set-Cookie`.
    pub fn layer(&self) -> CookieManagerLayer {
        CookieManagerLayer::new()
    }

    pub fn signed<'a>(&'a self, cookies: &'a Cookies) -> SignedCookies<'a> {
        cookies.signed(&self.key)
    }

    /// Creates an `HttpOnly`, `SameSite=Lax` cookie scoped to `/`.
    pub fn build(&self, name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
        let mut cookie = Cookie::new(name, value);

        cookie.set_http_only(true);
        if self.secure {
            cookie.set_secure(true);
        }
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(max_age);
        cookie.set_path("/");

        cookie
    }

    /// A removal cookie matching what [`CookiePlugin::build`] set.
    pub fn expired(&self, name: &'static str) -> Cookie<'static> {
        let mut cookie = Cookie::new(name, "");
        cookie.set_max_age(Duration::seconds(0));
        cookie.set_path("/");
        cookie
    }
}
