use actix_web::cookie::{time::Duration, Cookie, SameSite};

use crate::settings::SessionSettings;

/// Attributes shared by every cookie the factory emits
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub domain: Option<String>,
}

/// Cookie factory for the session cookie
///
/// Centralizes the cookie attributes so every response carries the same
/// name, path, domain and flags; only the value and `Max-Age` vary.
#[derive(Debug, Clone)]
pub struct CookieFactory {
    name: String,
    options: CookieOptions,
}

impl CookieFactory {
    #[must_use]
    pub fn new(name: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(
            settings.cookie_name.clone(),
            CookieOptions {
                http_only: settings.http_only,
                secure: settings.secure,
                same_site: settings.same_site.into(),
                path: settings.cookie_path.clone(),
                domain: settings.cookie_domain.clone(),
            },
        )
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.name
    }

    /// Build the session cookie; `max_age` of `None` yields a browser-session cookie
    #[must_use]
    pub fn create_session_cookie(&self, value: String, max_age: Option<i64>) -> Cookie<'static> {
        let mut cookie = self.base_cookie(value);
        cookie.set_max_age(max_age.map(Duration::seconds));
        cookie
    }

    fn base_cookie(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::build(self.name.clone(), value)
            .http_only(self.options.http_only)
            .secure(self.options.secure)
            .same_site(self.options.same_site)
            .path(self.options.path.clone())
            .finish();
        if let Some(domain) = &self.options.domain {
            cookie.set_domain(domain.clone());
        }
        cookie
    }
}

/// Find the value of `cookie_name` in a raw `Cookie` request header
///
/// Unparsable fragments are skipped; the first matching cookie wins.
#[must_use]
pub fn extract_cookie_value(cookie_header: &str, cookie_name: &str) -> Option<String> {
    cookie_header
        .split(';')
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .filter_map(|fragment| Cookie::parse(fragment).ok())
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
}
