//! Delta engine entry point
//!
//! Provides [`DeltaEngine`], which turns a baseline, a new compilation and a
//! list of semantic edits into a metadata delta, an IL delta, a debug stream
//! and the baseline of the next generation.
//!
//! # Example
//!
//! ```ignore
//! let engine = DeltaEngine::new(EmitOptions::default());
//! let mut streams = OutputStreams::new(&mut metadata, &mut il, &mut debug);
//! let result = engine.emit_difference(&baseline, compilation, &generator, &edits, &mut streams)?;
//! let next = result.baseline.expect("delta emitted");
//! ```

use crate::baseline::Baseline;
use crate::codegen::MethodCodeGenerator;
use crate::config::EmitOptions;
use crate::edit::{duplicate_edits, SemanticEdit};
use crate::emitter::EmittedBody;
use crate::error::{Diagnostic, DiagnosticCode, EmitError};
use crate::matcher::EditResolver;
use crate::session::DeltaSession;
use crate::synthesized::SynthesizedMemberReport;
use enc_metadata::{DeltaError, MetadataDelta};
use enc_symbols::SymbolTable;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

/// Sinks receiving the three streams of a delta
pub struct OutputStreams<'a> {
    pub metadata: &'a mut dyn Write,
    pub il: &'a mut dyn Write,
    pub debug: &'a mut dyn Write,
}

impl<'a> OutputStreams<'a> {
    pub fn new(metadata: &'a mut dyn Write, il: &'a mut dyn Write, debug: &'a mut dyn Write) -> Self {
        Self { metadata, il, debug }
    }
}

/// Delta produced by a successful diff
#[derive(Debug)]
pub struct EmittedDelta {
    pub metadata: MetadataDelta,
    /// IL stream; body offsets index into it
    pub il: Vec<u8>,
    pub bodies: Vec<EmittedBody>,
}

/// Outcome of [`DeltaEngine::emit_difference`]
///
/// Either a delta with the next baseline, or diagnostics and nothing else.
#[derive(Debug)]
pub struct EmitDifferenceResult {
    pub baseline: Option<Baseline>,
    pub diagnostics: Vec<Diagnostic>,
    pub delta: Option<EmittedDelta>,
    pub synthesized: Vec<SynthesizedMemberReport>,
}

impl EmitDifferenceResult {
    fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            baseline: None,
            diagnostics,
            delta: None,
            synthesized: Vec::new(),
        }
    }

    /// Whether a delta was emitted
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.diagnostics.is_empty() && self.baseline.is_some()
    }
}

/// Line of the debug stream
#[derive(Serialize)]
struct DebugRecord<'a> {
    method: String,
    name: &'a str,
    locals: &'a [String],
}

fn emit_failure(stream: &str, error: &impl std::fmt::Display) -> Diagnostic {
    Diagnostic::new(DiagnosticCode::EmitFailure, format!("writing the {stream} stream failed: {error}"))
}

/// Computes generation deltas
#[derive(Debug, Clone, Default)]
pub struct DeltaEngine {
    options: EmitOptions,
}

impl DeltaEngine {
    #[must_use]
    pub fn new(options: EmitOptions) -> Self {
        Self { options }
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    /// Emit the delta from `baseline` to `compilation` described by `edits`
    ///
    /// User-facing failures come back as diagnostics in the result, with no
    /// delta and no next baseline; nothing is written to `streams` unless
    /// the whole delta was computed.
    ///
    /// # Errors
    /// Returns error on an internal inconsistency: row exhaustion, a
    /// metadata encoding fault or an unrecoverable debug information failure
    #[tracing::instrument(skip_all, fields(generation = baseline.generation() + 1, edits = edits.len()))]
    pub fn emit_difference(
        &self,
        baseline: &Baseline,
        compilation: Arc<SymbolTable>,
        generator: &dyn MethodCodeGenerator,
        edits: &[SemanticEdit],
        streams: &mut OutputStreams<'_>,
    ) -> Result<EmitDifferenceResult, EmitError> {
        tracing::info!(
            generation = baseline.generation() + 1,
            edits = edits.len(),
            "emitting delta"
        );

        let duplicates = duplicate_edits(edits);
        if !duplicates.is_empty() {
            return Ok(EmitDifferenceResult::failed(duplicates));
        }

        let resolution = EditResolver::new(baseline, &compilation).resolve_all(edits)?;
        if !resolution.diagnostics.is_empty() {
            return Ok(EmitDifferenceResult::failed(resolution.diagnostics));
        }

        let mut session = DeltaSession::new(&self.options, baseline, &compilation, generator);
        let applied = session.apply(&resolution.edits);
        let output = match applied.and_then(|()| session.finish(Arc::clone(&compilation))) {
            Ok(output) => output,
            Err(EmitError::Diagnostic(diagnostic)) => {
                tracing::debug!(code = %diagnostic.code, "delta rejected");
                return Ok(EmitDifferenceResult::failed(vec![diagnostic]));
            }
            Err(e) => return Err(e),
        };

        let metadata = output.written.metadata;
        match metadata.write_to(&mut *streams.metadata) {
            Ok(()) => {}
            Err(DeltaError::Io(e)) => return Ok(EmitDifferenceResult::failed(vec![emit_failure("metadata", &e)])),
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = streams.il.write_all(&output.written.il) {
            return Ok(EmitDifferenceResult::failed(vec![emit_failure("IL", &e)]));
        }
        if self.options.emit_debug_stream {
            if let Err(e) = write_debug_stream(&mut *streams.debug, &output.bodies) {
                return Ok(EmitDifferenceResult::failed(vec![emit_failure("debug", &e)]));
            }
        }

        tracing::info!(
            generation = output.baseline.generation(),
            rows = metadata.enc_map().len(),
            log_entries = metadata.enc_log().len(),
            bodies = output.bodies.len(),
            il_bytes = output.written.il.len(),
            "delta emitted"
        );

        Ok(EmitDifferenceResult {
            baseline: Some(output.baseline),
            diagnostics: Vec::new(),
            delta: Some(EmittedDelta {
                metadata,
                il: output.written.il,
                bodies: output.bodies,
            }),
            synthesized: output.report,
        })
    }
}

fn write_debug_stream(out: &mut dyn Write, bodies: &[EmittedBody]) -> std::io::Result<()> {
    for body in bodies {
        let record = DebugRecord {
            method: body.method.to_string(),
            name: &body.name,
            locals: &body.locals,
        };
        serde_json::to_writer(&mut *out, &record)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use enc_metadata::{Handle, TableIndex};

    #[test]
    fn debug_stream_is_json_lines() {
        let bodies = vec![EmittedBody {
            method: Handle::new(TableIndex::MethodDef, 2).token(),
            name: "C.F()".into(),
            offset: 0,
            locals: vec!["int32 V_0 //x".into()],
        }];
        let mut out = Vec::new();
        write_debug_stream(&mut out, &bodies).unwrap();
        let text = String::from_utf8(out).unwrap();
        let line: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(line["name"], "C.F()");
        assert_eq!(line["locals"][0], "int32 V_0 //x");
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn failed_result_has_no_baseline() {
        let result = EmitDifferenceResult::failed(vec![Diagnostic::new(DiagnosticCode::DuplicateEdit, "twice")]);
        assert!(!result.is_success());
        assert!(result.delta.is_none());
    }
}
