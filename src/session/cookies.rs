//! Session and profile cookies.
//!
//! Values are opaque strings. The jar percent-encodes on write and decodes on
//! read, so profile prompts with spaces, `;` or non-ASCII text round-trip.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

/// Cookie holding the debate session id.
pub const SESSION_COOKIE: &str = "mirror_session_id";
/// Cookie holding the user's profile prompt.
pub const PROFILE_PROMPT_COOKIE: &str = "mirror_profile_prompt";

const COOKIE_MAX_AGE_DAYS: i64 = 30;

fn read(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .max_age(time::Duration::days(COOKIE_MAX_AGE_DAYS))
        .same_site(SameSite::Lax)
        .build()
}

/// Session id from the jar, if present and non-empty.
#[must_use]
pub fn session_id(jar: &CookieJar) -> Option<String> {
    read(jar, SESSION_COOKIE)
}

/// Profile prompt from the jar, if present and non-empty.
#[must_use]
pub fn profile_prompt(jar: &CookieJar) -> Option<String> {
    read(jar, PROFILE_PROMPT_COOKIE)
}

#[must_use]
pub fn with_session_id(jar: CookieJar, id: impl Into<String>) -> CookieJar {
    jar.add(build(SESSION_COOKIE, id.into()))
}

#[must_use]
pub fn with_profile_prompt(jar: CookieJar, prompt: impl Into<String>) -> CookieJar {
    jar.add(build(PROFILE_PROMPT_COOKIE, prompt.into()))
}

/// Return the existing session id, or mint a UUID v4 and set the cookie.
#[must_use]
pub fn ensure_session_id(jar: CookieJar) -> (CookieJar, String) {
    match session_id(&jar) {
        Some(id) => (jar, id),
        None => {
            let id = Uuid::new_v4().to_string();
            (with_session_id(jar, id.clone()), id)
        }
    }
}
