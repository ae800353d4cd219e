//! Host failure type.
//!
//! Hosts report failures in several wire shapes. Depending on the service
//! revision an unauthorized caller shows up as a structured `Unauthorized`
//! variant, as `Other = "Access Denied"`, or as a bare HTTP-style status
//! code. All of them collapse into [`HostError::Unauthorized`] here so that
//! callers only ever match on one value.

/// Payload text the older host revision uses for an unauthorized caller.
pub const ACCESS_DENIED: &str = "Access Denied";

/// A failure reported by (or while talking to) the model host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The caller is not allowed to perform this operation.
    #[error("unauthorized")]
    Unauthorized,

    /// The host understood the call and declined it.
    #[error("host rejected the call: {0}")]
    Rejected(String),

    /// The host answered with a non-success status code.
    #[error("host returned status {0}")]
    Status(u16),

    /// The message never made it to the host, or the reply was lost.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl HostError {
    /// Map a numeric status code onto a host error.
    ///
    /// 401 and 403 are the unauthorized codes; everything else is kept as-is.
    pub fn from_status(code: u16) -> Self {
        match code {
            401 | 403 => HostError::Unauthorized,
            other => HostError::Status(other),
        }
    }

    /// Map a tagged error variant (`tag`, optional text payload) onto a host error.
    pub fn from_variant(tag: &str, payload: Option<&str>) -> Self {
        match (tag, payload) {
            ("Unauthorized", _) => HostError::Unauthorized,
            ("Other", Some(ACCESS_DENIED)) => HostError::Unauthorized,
            ("Other", Some(msg)) => HostError::Rejected(msg.to_string()),
            (tag, Some(msg)) => HostError::Rejected(format!("{tag}: {msg}")),
            (tag, None) => HostError::Rejected(tag.to_string()),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, HostError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_status_codes() {
        assert_eq!(HostError::from_status(401), HostError::Unauthorized);
        assert_eq!(HostError::from_status(403), HostError::Unauthorized);
        assert_eq!(HostError::from_status(500), HostError::Status(500));
    }

    #[test]
    fn test_unauthorized_variants() {
        assert!(HostError::from_variant("Unauthorized", None).is_unauthorized());
        assert!(HostError::from_variant("Other", Some("Access Denied")).is_unauthorized());
    }

    #[test]
    fn test_other_variants_are_rejections() {
        assert_eq!(
            HostError::from_variant("Other", Some("out of memory")),
            HostError::Rejected("out of memory".into())
        );
        assert_eq!(
            HostError::from_variant("InvalidInput", Some("bad chunk")),
            HostError::Rejected("InvalidInput: bad chunk".into())
        );
        assert!(!HostError::from_variant("StatusCode", None).is_unauthorized());
    }
}
