//! Diagnostic Tests
//!
//! Rejected edits produce diagnostics, no output and no next baseline.
//!
use enc_emit::prelude::*;
use enc_emit::{DebugInfoError, DebugInfoErrorKind, LocalDef, LocalSlot};
use enc_metadata::Token;
use enc_symbols::{DeclKey, SyntaxMap, SyntaxNodeId, TypeSymbol};
use enc_test_utils::*;
use mockall::mock;
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use std::io;
use std::sync::Arc;

mock! {
    pub Pdb {}

    impl DebugInfoProvider for Pdb {
        fn method_locals(&self, method: Token) -> Result<Vec<LocalSlot>, DebugInfoError>;
    }
}

impl std::fmt::Debug for MockPdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockPdb")
    }
}

fn program() -> (ProgramBuilder, DeclKey, DeclKey) {
    let mut program = ProgramBuilder::new();
    let c = program.class("N", "C");
    let f = program.method(&c, "F", &[], TypeSymbol::INT32, returns_int(1));
    let g = program.method(&c, "G", &[], TypeSymbol::VOID, empty_body());
    (program, f, g)
}

fn with_local_x() -> MethodIl {
    MethodIl::new(vec![IlOp::LdcI4(1), IlOp::Stloc(0), IlOp::Ldloc(0), IlOp::Ret], 1).with_local(LocalDef::named(
        "x",
        TypeSymbol::INT32,
        SyntaxNodeId(1),
    ))
}

fn assert_rejected(emitted: &Emitted, code: DiagnosticCode) {
    assert_eq!(emitted.diagnostic_codes(), vec![code]);
    assert!(emitted.result.baseline.is_none());
    assert!(emitted.result.delta.is_none());
    assert!(emitted.streams.is_empty());
}

#[test]
fn test_duplicate_edits_are_rejected() {
    init_test_tracing();
    let (mut program, f, _) = program();
    let mut generations = Generations::start(&program.build());

    program.il(&f, returns_int(2));
    let emitted = generations.emit(
        &program.build(),
        &[SemanticEdit::update(f.clone()), SemanticEdit::update(f.clone())],
    );
    assert_rejected(&emitted, DiagnosticCode::DuplicateEdit);
    assert_eq!(emitted.diagnostics()[0].symbol.as_deref(), Some("N.C.F()"));
    assert_eq!(generations.baseline().generation(), 0);
}

#[test]
fn test_update_of_unknown_symbol_is_unresolved() {
    init_test_tracing();
    let (mut program, f, _) = program();
    let mut generations = Generations::start(&program.build());

    let c = f.owner().expect("declaring type").clone();
    let h = program.method(&c, "H", &[], TypeSymbol::VOID, empty_body());
    let emitted = generations.emit(&program.build(), &[SemanticEdit::update(h)]);
    assert_rejected(&emitted, DiagnosticCode::UnresolvedSymbol);
}

#[test]
fn test_missing_exception_type_rejects_deletion() {
    init_test_tracing();
    let (program, _, g) = program();
    let mut generations = Generations::start(&program.build());

    let mut edited = program.clone();
    edited.remove(&g).unreference("System.Exception");
    let emitted = generations.emit(&edited.build(), &[SemanticEdit::delete(g)]);
    assert_rejected(&emitted, DiagnosticCode::MissingWellKnownMember);
    let symbol = emitted.diagnostics()[0].symbol.clone().unwrap_or_default();
    assert!(symbol.starts_with("System.Exception"), "{symbol}");
}

#[test]
fn test_embedded_interop_type_cannot_be_used() {
    init_test_tracing();
    let (mut program, f, _) = program();
    let widget = program.embedded_interop_type("Interop", "IWidget");
    let mut generations = Generations::start(&program.build());

    let c = f.owner().expect("declaring type").clone();
    let m = program.method(
        &c,
        "M",
        &[("widget", TypeSymbol::Defined(widget))],
        TypeSymbol::VOID,
        empty_body(),
    );
    let emitted = generations.emit(&program.build(), &[SemanticEdit::insert(m)]);
    assert_rejected(&emitted, DiagnosticCode::NoPiaEmbeddedType);
    assert_eq!(emitted.diagnostics()[0].symbol.as_deref(), Some("Interop.IWidget"));
}

#[test]
fn test_code_generation_failure_names_method() {
    init_test_tracing();
    let (mut program, f, _) = program();
    let mut generations = Generations::start(&program.build());
    let f_token = generations.baseline().token_of(&f);

    program.il(&f, returns_int(2));
    let built = program.build().failing_for(&f, "unsupported construct");
    let emitted = generations.emit(&built, &[SemanticEdit::update(f.clone())]);
    assert_rejected(&emitted, DiagnosticCode::CodeGenerationFailed);
    let diagnostic = &emitted.diagnostics()[0];
    assert_eq!(diagnostic.token, f_token);
    assert!(diagnostic.message.contains("unsupported construct"));

    // the baseline did not move, so the same edit succeeds once codegen does
    let retried = generations.emit(&program.build(), &[SemanticEdit::update(f)]);
    assert!(retried.is_success(), "{:?}", retried.diagnostics());
    assert_eq!(retried.delta().generation(), 1);
}

#[test]
fn test_unreadable_debug_info_is_reported() {
    init_test_tracing();
    let (mut program, f, _) = program();
    program.il(&f, with_local_x());
    let built = program.build();
    let (metadata, _) = compile_full(&built);
    let f_token = metadata
        .definitions
        .iter()
        .find(|(k, _)| *k == f)
        .map(|(_, h)| h.token())
        .expect("F laid out");

    let mut pdb = MockPdb::new();
    pdb.expect_method_locals()
        .with(eq(f_token))
        .times(1)
        .returning(|_| Err(DebugInfoError::new(DebugInfoErrorKind::InvalidData, "truncated local scope")));
    let mut generations = Generations::with_debug_info(&built, EmitOptions::default(), metadata, Arc::new(pdb));

    let emitted = generations.emit(&built, &[SemanticEdit::update(f)]);
    assert_rejected(&emitted, DiagnosticCode::DebugInfoUnreadable);
    assert_eq!(emitted.diagnostics()[0].token, Some(f_token));
}

#[test]
fn test_unexpected_debug_info_failure_is_an_error() {
    init_test_tracing();
    let (mut program, f, _) = program();
    program.il(&f, with_local_x());
    let built = program.build();
    let (metadata, _) = compile_full(&built);

    let mut pdb = MockPdb::new();
    pdb.expect_method_locals()
        .returning(|_| Err(DebugInfoError::new(DebugInfoErrorKind::Other, "reader poisoned")));
    let baseline = Baseline::initial(metadata, built.compilation(), Arc::new(pdb)).expect("valid generation 0");

    let mut streams = InMemoryStreams::new();
    let result = DeltaEngine::default().emit_difference(
        &baseline,
        built.compilation(),
        built.generator(),
        &[SemanticEdit::update(f)],
        &mut streams.streams(),
    );
    assert!(matches!(result, Err(EmitError::DebugInfo(_))));
    assert!(streams.is_empty());
}

#[test]
fn test_debug_info_slots_seed_first_update() {
    init_test_tracing();
    let (mut program, f, _) = program();
    program.il(&f, with_local_x());
    let built = program.build();
    let (metadata, _) = compile_full(&built);

    let mut pdb = MockPdb::new();
    pdb.expect_method_locals().times(1).returning(|_| {
        Ok(vec![
            LocalSlot::live(&LocalDef::temp(TypeSymbol::STRING)),
            LocalSlot::live(&LocalDef::named("x", TypeSymbol::INT32, SyntaxNodeId(1))),
        ])
    });
    let mut generations = Generations::with_debug_info(&built, EmitOptions::default(), metadata, Arc::new(pdb));

    let emitted = generations.emit(&built, &[SemanticEdit::update_with_map(f.clone(), SyntaxMap::identity())]);
    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    assert_eq!(emitted.body("N.C.F()").locals, vec!["[unchanged] V_0", "int32 V_1 //x"]);

    // later generations use the recorded layout, not the debug information
    let again = generations.emit(&built, &[SemanticEdit::update_with_map(f, SyntaxMap::identity())]);
    assert!(again.is_success(), "{:?}", again.diagnostics());
    assert_eq!(again.body("N.C.F()").locals, vec!["[unchanged] V_0", "int32 V_1 //x"]);
}

#[test]
fn test_failed_stream_write_reports_emit_failure() {
    init_test_tracing();
    let (mut program, f, _) = program();
    let generations = Generations::start(&program.build());

    program.il(&f, returns_int(2));
    let built = program.build();
    let mut metadata = FailingWriter::new(io::ErrorKind::StorageFull);
    let (mut il, mut debug) = (Vec::new(), Vec::new());
    let result = DeltaEngine::default()
        .emit_difference(
            generations.baseline(),
            built.compilation(),
            built.generator(),
            &[SemanticEdit::update(f)],
            &mut OutputStreams::new(&mut metadata, &mut il, &mut debug),
        )
        .expect("I/O failures are diagnostics");

    assert!(!result.is_success());
    assert!(result.baseline.is_none());
    let codes: Vec<DiagnosticCode> = result.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![DiagnosticCode::EmitFailure]);
    assert!(il.is_empty());
}
