//! ENC Emit
//!
//! Generation-to-generation delta engine for edit-and-continue.
//!
//! # Overview
//!
//! Given the [`Baseline`] of a running module, the symbol table of the edited
//! program and a list of [`SemanticEdit`]s, the [`DeltaEngine`]:
//! - binds each edit to the rows of the previous generation ([`EditResolver`])
//! - allocates rows for new definitions without ever reusing a token
//! - re-emits changed method bodies, keeping surviving locals in their slots
//! - synthesizes or reuses lambdas, closures, anonymous types and delegates
//! - stubs deleted methods with a throwing body and marks deleted members
//! - writes the metadata delta, IL delta and debug stream, and returns the
//!   next baseline
//!
//! # Example
//!
//! ```rust,ignore
//! use enc_emit::prelude::*;
//!
//! let baseline = Baseline::initial(metadata, compilation.clone(), debug_info)?;
//! let engine = DeltaEngine::new(EmitOptions::default());
//! let edits = [SemanticEdit::update(method_key)];
//! let result = engine.emit_difference(&baseline, edited, &generator, &edits, &mut streams)?;
//! assert!(result.is_success());
//! ```

#![allow(missing_docs)]

pub mod allocator;
pub mod attributes;
pub mod baseline;
pub mod codegen;
pub mod config;
pub mod debug_info;
pub mod edit;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod locals;
pub mod matcher;
pub mod resolver;
pub mod synthesized;
pub mod writer;

mod definitions;
mod deletion;
mod session;

// Re-exports
pub use allocator::{ReferenceKey, RowAllocator};
pub use attributes::{reconcile_attributes, AttributeRow, AttributeWrite, Reconciliation};
pub use baseline::{
    Baseline, BodyKey, DefinitionRecord, DeletedMemberRecord, ModuleMetadata, ModuleMetadataBuilder, ReplacedType,
};
pub use codegen::{
    primitive_signature, ClosureDef, CodeGenError, GeneratedBody, IlOp, LambdaDef, LocalDef, LocalKind, MemberTarget,
    MethodCodeGenerator, MethodIl,
};
pub use config::{ConfigError, EmitOptions, DELETED_LAMBDA_MESSAGE, DELETED_METHOD_MESSAGE};
pub use debug_info::{DebugInfoError, DebugInfoErrorKind, DebugInfoProvider, NoDebugInfo};
pub use edit::{duplicate_edits, SemanticEdit};
pub use emitter::EmittedBody;
pub use engine::{DeltaEngine, EmitDifferenceResult, EmittedDelta, OutputStreams};
pub use error::{Diagnostic, DiagnosticCode, EmitError, MissingSymbolError};
pub use locals::{
    LocalSlot, LocalSlotMap, LocalSlotPreserver, SlotAssignment, SlotState, SlotTypeEquivalence,
    StructuralEquivalence,
};
pub use matcher::{EditResolver, Resolution, ResolvedEdit};
pub use resolver::{CompilationResolver, WellKnownSymbolResolver, WellKnownType};
pub use synthesized::{
    AnonymousTypeRecord, CapturedField, ClosureRecord, ContainerRecord, DelegateRecord, LambdaRecord,
    SynthesizedMemberReport, SynthesizedState,
};
pub use writer::{DeltaTableWriter, WrittenDelta};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::{
        Baseline, DebugInfoProvider, DeltaEngine, Diagnostic, DiagnosticCode, EmitDifferenceResult, EmitError,
        EmitOptions, GeneratedBody, IlOp, MemberTarget, MethodCodeGenerator, MethodIl, ModuleMetadata,
        OutputStreams, SemanticEdit,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
