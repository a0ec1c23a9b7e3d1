use super::handlers::{auth, health, me};
use utoipa::OpenApi;
use utoipa::openapi::{Contact, Info, InfoBuilder, License};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::signup::register,
        auth::verification::verify,
        auth::signup::signup,
        auth::login::login,
        auth::session::session,
        auth::session::logout,
        auth::verification::enroll_two_factor,
        me::me,
    ),
    components(schemas(
        health::Health,
        auth::types::RegisterRequest,
        auth::types::RegisterResponse,
        auth::types::VerifyRequest,
        auth::types::VerifyResponse,
        auth::types::SignupRequest,
        auth::types::LoginRequest,
        auth::types::AuthResponse,
        auth::types::SessionResponse,
        auth::types::TwoFactorEnrollResponse,
        auth::types::UserResponse,
        auth::submission::SubmissionReply,
    )),
    tags(
        (name = "auth", description = "Registration, verification, login and sessions"),
        (name = "me", description = "Authenticated profile"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// Generated `OpenAPI` spec with info taken from Cargo.toml metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut spec = ApiDoc::openapi();
    spec.info = cargo_info();
    spec
}

fn cargo_info() -> Info {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Sesamo"));
            assert_eq!(contact.email.as_deref(), Some("team@sesamo.dev"));
        }
    }

    #[test]
    fn openapi_covers_the_auth_surface() {
        let spec = openapi();
        for path in [
            "/health",
            "/v1/auth/register",
            "/v1/auth/verify",
            "/v1/auth/signup",
            "/v1/auth/login",
            "/v1/auth/logout",
            "/v1/auth/session",
            "/v1/auth/two-factor",
            "/v1/me",
        ] {
            assert!(
                spec.paths.paths.contains_key(path),
                "missing path: {path}"
            );
        }
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Team Sesamo <team@sesamo.dev>"),
            (Some("Team Sesamo"), Some("team@sesamo.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<only@example.com>"), (None, Some("only@example.com")));
    }
}
