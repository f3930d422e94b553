//! Error taxonomy and mapping (spec §4.I, §7).
//!
//! Two layers, matching `sqlx_core::Error`'s shape: [`Error`] covers
//! everything that can go wrong below the protocol (I/O, TLS, handshake,
//! pool exhaustion, misuse), and [`DatabaseError`] is the PEP-249-shaped
//! taxonomy the gateway's own error payloads are classified into.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying socket or TLS handshake failed.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket-layer failure (handshake rejected, protocol violation, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The `connect` handshake frame was rejected by the gateway.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// An inbound frame could not be parsed as JSON. This is treated as
    /// channel-fatal (spec §4.B: "protocol corruption").
    #[error("could not decode frame: {0}")]
    Protocol(#[from] serde_json::Error),

    /// The channel (or one of its queries) was used after `close()`.
    #[error("cannot operate on a closed connection/cursor")]
    ChannelClosed,

    /// A query method was called from a state that forbids it (spec §4.D).
    #[error("{0}")]
    InvalidState(String),

    /// Parameter-count mismatch before a request was ever sent (spec §4.D, §4.E).
    #[error("number of parameter values ({provided}) does not match the number of parameters ({expected})")]
    ParameterCountMismatch { expected: usize, provided: usize },

    /// The pool has no capacity to satisfy this request (spec §4.H).
    #[error("no capacity")]
    NoCapacity,

    /// A server-reported SQL/CL failure, classified into the taxonomy of §4.I.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// The gateway's own diagnostic fields, carried unmodified through
/// classification (spec §4.I: "the taxonomy class is chosen by the mapping
/// but does not discard diagnostic fields").
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetails {
    pub message: String,
    pub sql_state: Option<String>,
    pub sql_rc: Option<i32>,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(state) = &self.sql_state {
            write!(f, " (sql_state={state}")?;
            if let Some(rc) = self.sql_rc {
                write!(f, ", sql_rc={rc}")?;
            }
            write!(f, ")")?;
        } else if let Some(rc) = self.sql_rc {
            write!(f, " (sql_rc={rc})")?;
        }
        Ok(())
    }
}

/// Mirrors the widely-used database-client standard's exception hierarchy
/// (spec §4.I).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatabaseError {
    /// Misuse of the client API itself.
    #[error("interface error: {0}")]
    Interface(ErrorDetails),
    /// Invalid input, out-of-range conversions.
    #[error("data error: {0}")]
    Data(ErrorDetails),
    /// Connection lost, network failure.
    #[error("operational error: {0}")]
    Operational(ErrorDetails),
    /// Constraint violations.
    #[error("integrity error: {0}")]
    Integrity(ErrorDetails),
    /// Server-reported internal failure.
    #[error("internal error: {0}")]
    Internal(ErrorDetails),
    /// Missing table, missing column, bad SQL, closed cursor.
    #[error("programming error: {0}")]
    Programming(ErrorDetails),
    /// Feature the server cannot provide.
    #[error("not supported error: {0}")]
    NotSupported(ErrorDetails),
    /// Uncategorized server-reported failure.
    #[error("database error: {0}")]
    Generic(ErrorDetails),
}

impl DatabaseError {
    pub fn details(&self) -> &ErrorDetails {
        match self {
            DatabaseError::Interface(d)
            | DatabaseError::Data(d)
            | DatabaseError::Operational(d)
            | DatabaseError::Integrity(d)
            | DatabaseError::Internal(d)
            | DatabaseError::Programming(d)
            | DatabaseError::NotSupported(d)
            | DatabaseError::Generic(d) => d,
        }
    }

    pub fn closed_connection() -> DatabaseError {
        DatabaseError::Programming(ErrorDetails {
            message: "Cannot operate on a closed connection/cursor".to_string(),
            sql_state: None,
            sql_rc: None,
        })
    }

    /// First-match-wins classification of a raw server payload (spec §4.I).
    ///
    /// `message` is the gateway's `error` field (or a connection/handshake
    /// message if the failure never reached the server).
    pub fn classify(message: &str, sql_state: Option<&str>, sql_rc: Option<i32>) -> DatabaseError {
        let details = ErrorDetails {
            message: message.to_string(),
            sql_state: sql_state.map(str::to_string),
            sql_rc,
        };

        let lower = message.to_ascii_lowercase();

        if lower.contains("not found") || is_file_not_found(message) {
            return DatabaseError::Programming(details);
        }

        let is_23xxx = sql_state
            .map(|s| s.trim_start_matches(['0', ' ']).starts_with("23"))
            .unwrap_or(false)
            || sql_state.map(|s| s.starts_with("23")).unwrap_or(false);
        if is_23xxx || message.contains("Constraint Error") {
            return DatabaseError::Integrity(details);
        }

        if message.contains("Invalid Input") || message.contains("Out of Range") {
            return DatabaseError::Data(details);
        }

        DatabaseError::Generic(details)
    }
}

/// Matches the `*FILE not found.` pattern from spec §4.I / §8 scenario 4.
fn is_file_not_found(message: &str) -> bool {
    message
        .rsplit_once("FILE not found.")
        .map(|(prefix, _)| prefix.ends_with('*') || prefix.trim_end().ends_with('*'))
        .unwrap_or(false)
        || message.contains("FILE not found.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_file_not_found_as_programming_error() {
        let err = DatabaseError::classify("*FILE not found.", Some("42704"), Some(-204));
        assert!(matches!(err, DatabaseError::Programming(_)));
        assert_eq!(err.details().sql_rc, Some(-204));
    }

    #[test]
    fn classifies_constraint_violation_as_integrity_error() {
        let err = DatabaseError::classify("Constraint Error on insert", Some("23505"), None);
        assert!(matches!(err, DatabaseError::Integrity(_)));
    }

    #[test]
    fn classifies_invalid_input_as_data_error() {
        let err = DatabaseError::classify("Invalid Input Error: bad literal", None, None);
        assert!(matches!(err, DatabaseError::Data(_)));
    }

    #[test]
    fn falls_back_to_generic_database_error() {
        let err = DatabaseError::classify("something the server doesn't categorize", None, None);
        assert!(matches!(err, DatabaseError::Generic(_)));
    }

    #[test]
    fn not_found_takes_priority_over_constraint_text() {
        // first-match-wins: "not found" rule comes before the integrity rule.
        let err = DatabaseError::classify("Table not found (Constraint Error)", None, None);
        assert!(matches!(err, DatabaseError::Programming(_)));
    }
}
