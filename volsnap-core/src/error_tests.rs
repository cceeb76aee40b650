/*!
Tests for error types and the fatal/per-target classification.
*/

#[cfg(test)]
mod tests {
    use crate::error::VolsnapError;
    use std::io;

    #[test]
    fn test_error_display() {
        let error = VolsnapError::configuration("missing dest");
        assert_eq!(error.to_string(), "Configuration error: missing dest");

        let error = VolsnapError::UnsupportedScheme("ftp://host/x".to_string());
        assert_eq!(error.to_string(), "Not supported scheme: ftp://host/x");

        let error = VolsnapError::storage("access denied");
        assert_eq!(error.to_string(), "Storage error: access denied");
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = VolsnapError::from(io_error);

        match error {
            VolsnapError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_invalid_pattern_keeps_source() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let error = VolsnapError::InvalidPattern {
            pattern: "(unclosed".to_string(),
            source,
        };

        assert!(error.to_string().contains("(unclosed"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(VolsnapError::UnsupportedScheme("ftp://x".into()).is_fatal());
        assert!(VolsnapError::configuration("bad").is_fatal());
        assert!(VolsnapError::storage("quota exceeded").is_fatal());

        assert!(!VolsnapError::local_storage("permission denied").is_fatal());
        assert!(!VolsnapError::archive("truncated").is_fatal());
        assert!(!VolsnapError::from(io::Error::new(io::ErrorKind::Other, "x")).is_fatal());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VolsnapError>();
        assert_sync::<VolsnapError>();
    }
}
