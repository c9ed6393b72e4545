use crate::constants::MAX_TEAM_NAME_LEN;

/// Trimmed, length-capped team name; `None` when nothing is left.
pub fn sanitize_team_name(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TEAM_NAME_LEN).collect())
}

pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

pub fn is_admin(header: Option<&str>, admin_token: &str) -> bool {
    bearer_token(header)
        .map(|token| token == admin_token)
        .unwrap_or(false)
}

pub fn normalize_guess_rate(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
