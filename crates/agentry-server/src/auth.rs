//! Demo bearer-token → role table. Not a real auth system: good enough to
//! exercise role-gating end to end. No token (or an unrecognized one)
//! resolves to the least-privileged role.

use agentry_core::Role;
use axum::http::HeaderMap;

pub fn role_from_headers(headers: &HeaderMap) -> Role {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Role::Readonly;
    };
    let Ok(value) = header.to_str() else {
        return Role::Readonly;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return Role::Readonly;
    };

    match token {
        "admin-demo-token" => Role::Admin,
        "operator-demo-token" => Role::Operator,
        "dev-demo-token" => Role::Dev,
        "readonly-demo-token" => Role::Readonly,
        _ => Role::Readonly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_header_resolves_to_readonly() {
        assert_eq!(role_from_headers(&HeaderMap::new()), Role::Readonly);
    }

    #[test]
    fn recognized_token_resolves_to_its_role() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer admin-demo-token"),
        );
        assert_eq!(role_from_headers(&headers), Role::Admin);
    }

    #[test]
    fn unrecognized_token_resolves_to_readonly() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer not-a-real-token"),
        );
        assert_eq!(role_from_headers(&headers), Role::Readonly);
    }
}
