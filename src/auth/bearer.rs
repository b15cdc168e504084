/// Why an `Authorization` header was refused before any token check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerShapeError {
    Missing,
    Malformed,
}

/// Extracts `<token>` from `"Bearer <token>"`.
///
/// The header must split on single spaces into exactly two parts, the first
/// being `Bearer`. `"Bearer "` passes with an empty token; repeated spaces do
/// not.
pub fn bearer_token(header: Option<&str>) -> Result<&str, BearerShapeError> {
    let header = match header {
        Some(h) if !h.is_empty() => h,
        _ => return Err(BearerShapeError::Missing),
    };
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(BearerShapeError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_shapes() {
        assert_eq!(bearer_token(None), Err(BearerShapeError::Missing));
        assert_eq!(bearer_token(Some("")), Err(BearerShapeError::Missing));
        assert_eq!(bearer_token(Some("ajshahdashda")), Err(BearerShapeError::Malformed));
        assert_eq!(
            bearer_token(Some("ashdh ajshahdashda")),
            Err(BearerShapeError::Malformed)
        );
        assert_eq!(bearer_token(Some("bearer abc")), Err(BearerShapeError::Malformed));
        assert_eq!(bearer_token(Some("Bearer    abc")), Err(BearerShapeError::Malformed));
        assert_eq!(bearer_token(Some("Bearer ")), Ok(""));
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
    }
}
