//! Identifier generation for requests and jobs.
//!
//! Both correlation ids and job ids are random 128-bit identifiers rendered
//! as canonical lowercase hyphenated hex. They are generated server-side at
//! admission and threaded through every component that touches the request.

use uuid::Uuid;

/// Generate a correlation id for a single request.
pub fn request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a batch job id.
pub fn job_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_canonical_uuid() {
        let id = request_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = job_id();
        let b = job_id();
        assert_ne!(a, b);
    }
}
