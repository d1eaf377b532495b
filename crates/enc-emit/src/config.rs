//! Emit configuration
//!
//! Provides [`EmitOptions`], loadable from TOML with every field optional.

use enc_metadata::Handle;
use serde::{Deserialize, Serialize};

/// Message of the stub replacing a deleted method body
pub const DELETED_METHOD_MESSAGE: &str = "Attempted to invoke a deleted method implementation. \
This can happen when a method is deleted or its name or signature is changed while the application is running.";

/// Message of the stub replacing a deleted lambda body
pub const DELETED_LAMBDA_MESSAGE: &str = "Attempted to invoke a deleted lambda or local function implementation. \
This can happen when lambda or local function is deleted while the application is running.";

/// Options controlling delta emission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Replace bodies of deleted methods with throwing stubs
    pub emit_deleted_member_stubs: bool,
    /// Mark deleted members with `MetadataUpdateDeletedAttribute` when resolvable
    pub emit_deleted_attribute: bool,
    /// Write the debug stream (local slot names per emitted body)
    pub emit_debug_stream: bool,
    /// Exception message of deleted-method stubs
    pub deleted_method_message: String,
    /// Exception message of deleted-lambda stubs
    pub deleted_lambda_message: String,
    /// Upper bound of rows per table
    pub max_rows_per_table: u32,
    /// Assembly that defines core types not found among the references
    pub core_assembly: String,
}

impl EmitOptions {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from TOML; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns error if the document is not valid TOML or a value has the
    /// wrong type
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns error if the row limit is zero or beyond the token range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rows_per_table == 0 || self.max_rows_per_table > Handle::MAX_ROW {
            return Err(ConfigError::RowLimit(self.max_rows_per_table));
        }
        Ok(())
    }

    /// With deleted-member stubs on or off
    #[inline]
    #[must_use]
    pub fn with_deleted_member_stubs(mut self, enabled: bool) -> Self {
        self.emit_deleted_member_stubs = enabled;
        self
    }

    /// With the deleted-member attribute on or off
    #[inline]
    #[must_use]
    pub fn with_deleted_attribute(mut self, enabled: bool) -> Self {
        self.emit_deleted_attribute = enabled;
        self
    }

    /// With the debug stream on or off
    #[inline]
    #[must_use]
    pub fn with_debug_stream(mut self, enabled: bool) -> Self {
        self.emit_debug_stream = enabled;
        self
    }

    /// With row limit per table
    #[inline]
    #[must_use]
    pub fn with_max_rows_per_table(mut self, max: u32) -> Self {
        self.max_rows_per_table = max;
        self
    }

    /// With core assembly name
    #[inline]
    #[must_use]
    pub fn with_core_assembly(mut self, name: impl Into<String>) -> Self {
        self.core_assembly = name.into();
        self
    }
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            emit_deleted_member_stubs: true,
            emit_deleted_attribute: true,
            emit_debug_stream: true,
            deleted_method_message: DELETED_METHOD_MESSAGE.to_owned(),
            deleted_lambda_message: DELETED_LAMBDA_MESSAGE.to_owned(),
            max_rows_per_table: Handle::MAX_ROW,
            core_assembly: "System.Runtime".to_owned(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed TOML
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Row limit out of range
    #[error("max_rows_per_table must be between 1 and {max}, got {0}", max = Handle::MAX_ROW)]
    RowLimit(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_stubs_and_attribute() {
        let options = EmitOptions::new();
        assert!(options.emit_deleted_member_stubs);
        assert!(options.emit_deleted_attribute);
        assert_eq!(options.max_rows_per_table, Handle::MAX_ROW);
        assert!(options.deleted_method_message.starts_with("Attempted to invoke a deleted method"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let options = EmitOptions::from_toml_str(
            r#"
            emit_debug_stream = false
            max_rows_per_table = 100
            "#,
        )
        .unwrap();
        assert!(!options.emit_debug_stream);
        assert_eq!(options.max_rows_per_table, 100);
        assert_eq!(options.core_assembly, "System.Runtime");
    }

    #[test]
    fn zero_row_limit_is_rejected() {
        let err = EmitOptions::from_toml_str("max_rows_per_table = 0").unwrap_err();
        assert!(matches!(err, ConfigError::RowLimit(0)));
    }

    #[test]
    fn wrong_type_is_parse_error() {
        let err = EmitOptions::from_toml_str("emit_debug_stream = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn builders_chain() {
        let options = EmitOptions::new()
            .with_deleted_attribute(false)
            .with_core_assembly("mscorlib")
            .with_max_rows_per_table(10);
        assert!(!options.emit_deleted_attribute);
        assert_eq!(options.core_assembly, "mscorlib");
        assert!(options.validate().is_ok());
    }
}
