//! Testing utilities for the ENC delta workspace
//!
//! Shared fixtures: a program DSL with a scripted code generator, a
//! generation-0 layout, output stream sinks and a driver that chains
//! generations through the engine.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

mod layout;
mod program;
mod streams;

pub use layout::{compile_full, FixtureDebugInfo};
pub use program::{
    corlib, empty_body, object_constructor_body, returns_int, returns_string, FixtureCodeGenerator, Program,
    ProgramBuilder, COMPILER_GENERATED, CORLIB, EMBEDDED, METADATA_UPDATE_DELETED,
};
pub use streams::{body_at, il_listing, FailingWriter, InMemoryStreams};

use enc_emit::{
    Baseline, DebugInfoProvider, DeltaEngine, Diagnostic, DiagnosticCode, EmitDifferenceResult, EmitOptions,
    EmittedBody, SemanticEdit,
};
use enc_metadata::MetadataDelta;
use std::sync::Arc;

/// Install a test subscriber honouring `RUST_LOG`; repeated calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Result of one generation plus the bytes written for it
#[derive(Debug)]
pub struct Emitted {
    pub result: EmitDifferenceResult,
    pub streams: InMemoryStreams,
}

impl Emitted {
    /// Metadata delta of a successful generation
    #[must_use]
    pub fn delta(&self) -> &MetadataDelta {
        &self.result.delta.as_ref().expect("delta emitted").metadata
    }

    #[must_use]
    pub fn bodies(&self) -> &[EmittedBody] {
        &self.result.delta.as_ref().expect("delta emitted").bodies
    }

    /// Emitted body of the method or lambda called `name`
    #[must_use]
    pub fn body(&self, name: &str) -> &EmittedBody {
        self.bodies()
            .iter()
            .find(|b| b.name == name)
            .unwrap_or_else(|| panic!("no body named {name}"))
    }

    /// Instruction listing of the body called `name`
    #[must_use]
    pub fn il(&self, name: &str) -> Vec<String> {
        il_listing(&self.streams.il, self.body(name))
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.result.diagnostics
    }

    #[must_use]
    pub fn diagnostic_codes(&self) -> Vec<DiagnosticCode> {
        self.result.diagnostics.iter().map(|d| d.code).collect()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

/// Chains generations of one module through the engine
#[derive(Debug)]
pub struct Generations {
    engine: DeltaEngine,
    baseline: Baseline,
}

impl Generations {
    /// Generation 0 of `program` with default options
    #[must_use]
    pub fn start(program: &Program) -> Self {
        Self::with_options(program, EmitOptions::default())
    }

    #[must_use]
    pub fn with_options(program: &Program, options: EmitOptions) -> Self {
        let (metadata, debug_info) = compile_full(program);
        Self::with_debug_info(program, options, metadata, Arc::new(debug_info))
    }

    /// Generation 0 with a caller-supplied debug information provider
    #[must_use]
    pub fn with_debug_info(
        program: &Program,
        options: EmitOptions,
        metadata: enc_emit::ModuleMetadata,
        debug_info: Arc<dyn DebugInfoProvider>,
    ) -> Self {
        let baseline = Baseline::initial(metadata, program.compilation(), debug_info).expect("valid generation 0");
        Self {
            engine: DeltaEngine::new(options),
            baseline,
        }
    }

    #[must_use]
    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    /// Emit the next generation; the baseline advances only on success
    pub fn emit(&mut self, program: &Program, edits: &[SemanticEdit]) -> Emitted {
        let mut streams = InMemoryStreams::new();
        let result = self
            .engine
            .emit_difference(
                &self.baseline,
                program.compilation(),
                program.generator(),
                edits,
                &mut streams.streams(),
            )
            .expect("no internal error");
        if let Some(next) = &result.baseline {
            self.baseline = next.clone();
        }
        Emitted { result, streams }
    }
}
