//! Logon gate: allow-list admission for local client logons.
//!
//! Local logons are never sent upstream; they only decide whether a client
//! may use the shared upstream credential and which delivery cursor it owns.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::error::AcarsError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateConfigError {
    #[error("allow-list contains no logons")]
    Empty,
}

/// Static allow-list loaded once at startup.
#[derive(Clone)]
pub struct LogonGate {
    allowed: HashSet<String>,
}

impl LogonGate {
    /// Build a gate from allow-list entries.
    ///
    /// Entries are trimmed; blank entries are dropped. At least one logon
    /// must remain.
    pub fn new<I, S>(entries: I) -> Result<Self, GateConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed: HashSet<String> = entries
            .into_iter()
            .map(|e| e.as_ref().trim().to_owned())
            .filter(|e| !e.is_empty())
            .collect();
        if allowed.is_empty() {
            return Err(GateConfigError::Empty);
        }
        Ok(Self { allowed })
    }

    /// Build a gate from a comma-separated list (`ALLOWED_LOGONS`).
    pub fn from_csv(csv: &str) -> Result<Self, GateConfigError> {
        Self::new(csv.split(','))
    }

    /// Case-sensitive exact match.
    pub fn authorize(&self, logon: &str) -> Result<(), AcarsError> {
        if self.allowed.contains(logon) {
            Ok(())
        } else {
            Err(AcarsError::UnauthorizedLogon)
        }
    }

    pub fn is_allowed(&self, logon: &str) -> bool {
        self.allowed.contains(logon)
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

// Logons are credentials; keep them out of debug output.
impl fmt::Debug for LogonGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogonGate")
            .field("allowed", &self.allowed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_exact_match() {
        let gate = LogonGate::from_csv("pilot1,pilot2").expect("non-empty");
        assert!(gate.authorize("pilot1").is_ok());
        assert!(gate.authorize("pilot2").is_ok());
        assert_eq!(gate.authorize("evil"), Err(AcarsError::UnauthorizedLogon));
    }

    #[test]
    fn authorize_is_case_sensitive() {
        let gate = LogonGate::from_csv("Pilot1").expect("non-empty");
        assert!(gate.authorize("pilot1").is_err());
        assert!(gate.authorize("PILOT1").is_err());
        assert!(gate.authorize("Pilot1").is_ok());
    }

    #[test]
    fn csv_entries_are_trimmed_and_blanks_dropped() {
        let gate = LogonGate::from_csv(" pilot1 , ,pilot2,").expect("non-empty");
        assert_eq!(gate.len(), 2);
        assert!(gate.is_allowed("pilot1"));
        assert!(!gate.is_allowed(""));
    }

    #[test]
    fn empty_allow_list_is_rejected() {
        assert_eq!(LogonGate::from_csv("").unwrap_err(), GateConfigError::Empty);
        assert_eq!(
            LogonGate::new(Vec::<String>::new()).unwrap_err(),
            GateConfigError::Empty
        );
    }

    #[test]
    fn debug_output_hides_logons() {
        let gate = LogonGate::from_csv("secret-logon").expect("non-empty");
        let rendered = format!("{gate:?}");
        assert!(!rendered.contains("secret-logon"));
    }
}
