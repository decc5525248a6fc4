use http::StatusCode;

use crate::error::{TransportError, TrialError};

/// Responses with status code strictly greater than this value are counted
/// as failures.
///
/// Note that "400 Bad Request" itself is a success.
pub const STATUS_FAILURE_THRESHOLD: u16 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    None,
    TransportError,
    StatusError,
}

/// Verdict of a single benchmark trial.
#[derive(Debug)]
pub struct Outcome {
    pub classification: Classification,
    pub cause: Cause,
    pub status: Option<StatusCode>,
    error: Option<TransportError>,
}

impl Outcome {
    /// Classifies the result of a single request.
    pub fn classify(result: Result<StatusCode, TransportError>) -> Self {
        match result {
            Ok(status) if status.as_u16() > STATUS_FAILURE_THRESHOLD => Self {
                classification: Classification::Failure,
                cause: Cause::StatusError,
                status: Some(status),
                error: None,
            },
            Ok(status) => Self {
                classification: Classification::Success,
                cause: Cause::None,
                status: Some(status),
                error: None,
            },
            Err(err) => Self {
                classification: Classification::Failure,
                cause: Cause::TransportError,
                status: None,
                error: Some(err),
            },
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.classification == Classification::Success
    }

    /// Converts this outcome into the scheduler's trial result.
    pub fn into_result(self) -> Result<(), TrialError> {
        match (self.error, self.status) {
            (Some(err), ..) => Err(TrialError::Transport(err)),
            (None, Some(status)) if self.cause == Cause::StatusError => Err(TrialError::Status(status)),
            (None, ..) => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use super::*;

    fn status(code: u16) -> Outcome {
        Outcome::classify(Ok(StatusCode::from_u16(code).unwrap()))
    }

    #[test]
    fn success_codes() {
        for code in [200, 201, 204, 301, 304, 399] {
            let outcome = status(code);
            assert!(outcome.is_success(), "code: {code}");
            assert_eq!(Cause::None, outcome.cause);
            assert_eq!(Some(code), outcome.status.map(|v| v.as_u16()));
            assert!(outcome.into_result().is_ok());
        }
    }

    // Exactly 400 is not a failure. This is the current threshold and is
    // kept as is.
    #[test]
    fn bad_request_is_success() {
        let outcome = status(400);

        assert_eq!(Classification::Success, outcome.classification);
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn failure_codes_keep_status() {
        for code in [401, 404, 500, 503] {
            let outcome = status(code);
            assert_eq!(Classification::Failure, outcome.classification);
            assert_eq!(Cause::StatusError, outcome.cause);
            assert_eq!(Some(code), outcome.status.map(|v| v.as_u16()));

            match outcome.into_result() {
                Err(TrialError::Status(v)) => assert_eq!(code, v.as_u16()),
                other => panic!("unexpected result for {code}: {other:?}"),
            }
        }
    }

    #[test]
    fn transport_error_is_never_status_error() {
        let errors = [
            TransportError::Connect(io::Error::from(io::ErrorKind::ConnectionRefused)),
            TransportError::Tls(io::Error::from(io::ErrorKind::InvalidData)),
            TransportError::Timeout,
        ];

        for err in errors {
            let outcome = Outcome::classify(Err(err));
            assert_eq!(Classification::Failure, outcome.classification);
            assert_eq!(Cause::TransportError, outcome.cause);
            assert_eq!(None, outcome.status);
            assert!(matches!(outcome.into_result(), Err(TrialError::Transport(..))));
        }
    }
}
