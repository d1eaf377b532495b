//! Debug information seam
//!
//! Generation-0 methods have no slot map in the baseline; their local names
//! and slots come from the module's debug information through a
//! [`DebugInfoProvider`].

use crate::error::{Diagnostic, DiagnosticCode, EmitError};
use crate::locals::LocalSlot;
use enc_metadata::Token;
use std::fmt::{self, Debug, Display, Formatter};

/// Answers local slot layouts of generation-0 methods
pub trait DebugInfoProvider: Send + Sync + Debug {
    /// Locals of the method body with the given MethodDef token, in slot order
    ///
    /// # Errors
    /// Returns error if the debug information cannot be read
    fn method_locals(&self, method: Token) -> Result<Vec<LocalSlot>, DebugInfoError>;
}

/// Provider for modules without debug information
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDebugInfo;

impl DebugInfoProvider for NoDebugInfo {
    fn method_locals(&self, _method: Token) -> Result<Vec<LocalSlot>, DebugInfoError> {
        Ok(Vec::new())
    }
}

/// Failure category of a debug information read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugInfoErrorKind {
    /// Not a debug information image
    BadImageFormat,
    /// Corrupt records
    InvalidData,
    /// Underlying read failed
    Io,
    /// Anything else; never converted into a diagnostic
    Other,
}

impl DebugInfoErrorKind {
    /// Whether the failure is reported as a diagnostic
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl Display for DebugInfoErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadImageFormat => "bad image format",
            Self::InvalidData => "invalid data",
            Self::Io => "I/O error",
            Self::Other => "error",
        };
        f.write_str(name)
    }
}

/// Debug information read failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DebugInfoError {
    pub kind: DebugInfoErrorKind,
    pub message: String,
}

impl DebugInfoError {
    #[must_use]
    pub fn new(kind: DebugInfoErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Read the locals of `method`, turning recoverable failures into a
/// `DebugInfoUnreadable` diagnostic naming the method and token
pub(crate) fn read_method_locals(
    provider: &dyn DebugInfoProvider,
    method_name: &str,
    token: Token,
) -> Result<Vec<LocalSlot>, EmitError> {
    match provider.method_locals(token) {
        Ok(slots) => Ok(slots),
        Err(err) if err.kind.is_recoverable() => Err(Diagnostic::new(
            DiagnosticCode::DebugInfoUnreadable,
            format!("unable to read debug information of method '{method_name}' (token {token}): {err}"),
        )
        .with_symbol(method_name)
        .with_token(token)
        .into()),
        Err(err) => Err(EmitError::DebugInfo(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enc_metadata::{Handle, TableIndex};

    #[derive(Debug)]
    struct Failing(DebugInfoErrorKind);

    impl DebugInfoProvider for Failing {
        fn method_locals(&self, _method: Token) -> Result<Vec<LocalSlot>, DebugInfoError> {
            Err(DebugInfoError::new(self.0, "corrupt"))
        }
    }

    fn token() -> Token {
        Handle::new(TableIndex::MethodDef, 3).token()
    }

    #[test]
    fn recoverable_kinds_become_diagnostics() {
        for kind in [
            DebugInfoErrorKind::BadImageFormat,
            DebugInfoErrorKind::InvalidData,
            DebugInfoErrorKind::Io,
        ] {
            let err = read_method_locals(&Failing(kind), "C.F()", token()).unwrap_err();
            match err {
                EmitError::Diagnostic(d) => {
                    assert_eq!(d.code, DiagnosticCode::DebugInfoUnreadable);
                    assert_eq!(d.token, Some(token()));
                    assert!(d.message.contains("C.F()"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn other_kind_propagates() {
        let err = read_method_locals(&Failing(DebugInfoErrorKind::Other), "C.F()", token()).unwrap_err();
        assert!(matches!(err, EmitError::DebugInfo(e) if e.kind == DebugInfoErrorKind::Other));
    }

    #[test]
    fn no_debug_info_has_no_locals() {
        assert!(NoDebugInfo.method_locals(token()).unwrap().is_empty());
    }
}
