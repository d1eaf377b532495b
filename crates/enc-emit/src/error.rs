//! Error types and diagnostics for delta emission
//!
//! User-facing failures are [`Diagnostic`]s returned in the emit result; an
//! [`EmitError`] signals an engine defect or an unrecoverable collaborator
//! failure.

use crate::debug_info::DebugInfoError;
use enc_metadata::{DeltaError, IlError, SignatureError, Token};
use std::fmt::{self, Display, Formatter};

/// Errors raised while computing a delta
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// Fatal user-facing failure; reported as a diagnostic by the engine
    #[error("{0}")]
    Diagnostic(Diagnostic),

    /// Internal inconsistency: row exhaustion, key collisions, missing rows
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Debug information failure outside the recoverable kinds
    #[error("debug information failure: {0}")]
    DebugInfo(#[from] DebugInfoError),

    /// Delta assembly failure
    #[error(transparent)]
    Metadata(#[from] DeltaError),

    /// Signature blob encoding failure
    #[error("signature encoding failed: {0}")]
    Signature(#[from] SignatureError),

    /// Instruction encoding failure
    #[error("IL encoding failed: {0}")]
    Il(#[from] IlError),
}

impl EmitError {
    /// Create an invariant violation
    #[inline]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Whether the error is reported to the user as a diagnostic
    #[inline]
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Diagnostic(_))
    }
}

impl From<Diagnostic> for EmitError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::Diagnostic(diagnostic)
    }
}

impl From<MissingSymbolError> for EmitError {
    fn from(error: MissingSymbolError) -> Self {
        Self::Diagnostic(Diagnostic::from(error))
    }
}

/// A well-known type or member the engine depends on is not available
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing well-known member '{member}'")]
pub struct MissingSymbolError {
    /// Full name of the missing type or member
    pub member: String,
}

impl MissingSymbolError {
    #[inline]
    pub fn new(member: impl Into<String>) -> Self {
        Self {
            member: member.into(),
        }
    }
}

/// Classification of a fatal diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// Several previous declarations match an edited symbol
    AmbiguousSymbol,
    /// An edited symbol has no row in the baseline or no declaration
    UnresolvedSymbol,
    /// A runtime support type or member is missing
    MissingWellKnownMember,
    /// A signature or body uses an embedded interop type
    NoPiaEmbeddedType,
    /// Writing an output stream failed
    EmitFailure,
    /// Local slot information of a baseline method cannot be read
    DebugInfoUnreadable,
    /// A symbol is targeted by more than one edit
    DuplicateEdit,
    /// The code generator failed for a method
    CodeGenerationFailed,
}

impl DiagnosticCode {
    /// Stable identifier
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::AmbiguousSymbol => "ENC0001",
            Self::UnresolvedSymbol => "ENC0002",
            Self::MissingWellKnownMember => "ENC0003",
            Self::NoPiaEmbeddedType => "ENC0004",
            Self::EmitFailure => "ENC0005",
            Self::DebugInfoUnreadable => "ENC0006",
            Self::DuplicateEdit => "ENC0007",
            Self::CodeGenerationFailed => "ENC0008",
        }
    }
}

impl Display for DiagnosticCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Fatal, user-facing outcome of a diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Classification
    pub code: DiagnosticCode,
    /// Human-readable description
    pub message: String,
    /// Symbol the diagnostic is about
    pub symbol: Option<String>,
    /// Metadata token the diagnostic is about
    pub token: Option<Token>,
}

impl Diagnostic {
    /// Create new diagnostic
    #[inline]
    #[must_use]
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            symbol: None,
            token: None,
        }
    }

    /// Attach the symbol name
    #[inline]
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Attach the metadata token
    #[inline]
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    pub(crate) fn unresolved(symbol: impl Display) -> Self {
        Self::new(
            DiagnosticCode::UnresolvedSymbol,
            format!("symbol '{symbol}' has no counterpart in the baseline"),
        )
        .with_symbol(symbol.to_string())
    }
}

impl From<MissingSymbolError> for Diagnostic {
    fn from(error: MissingSymbolError) -> Self {
        Self::new(DiagnosticCode::MissingWellKnownMember, error.to_string()).with_symbol(error.member)
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enc_metadata::{Handle, TableIndex};

    #[test]
    fn diagnostic_display_carries_code() {
        let diag = Diagnostic::new(DiagnosticCode::DuplicateEdit, "C.F edited twice")
            .with_symbol("C.F")
            .with_token(Handle::new(TableIndex::MethodDef, 2).token());
        assert_eq!(diag.to_string(), "error ENC0007: C.F edited twice");
        assert_eq!(diag.symbol.as_deref(), Some("C.F"));
        assert_eq!(diag.token.map(Token::raw), Some(0x0600_0002));
    }

    #[test]
    fn missing_symbol_becomes_diagnostic() {
        let err: EmitError = MissingSymbolError::new("System.Exception..ctor(string)").into();
        assert!(err.is_diagnostic());
        match err {
            EmitError::Diagnostic(d) => {
                assert_eq!(d.code, DiagnosticCode::MissingWellKnownMember);
                assert!(d.message.contains("System.Exception..ctor(string)"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invariant_violation_is_not_diagnostic() {
        let err = EmitError::invariant("table MethodDef exhausted");
        assert!(!err.is_diagnostic());
        assert!(err.to_string().contains("exhausted"));
    }
}
