//! Local Slot Tests
//!
//! Surviving locals keep their slots across generations, starting from the
//! layout recorded in the generation-0 debug information.
//!
use enc_emit::prelude::*;
use enc_emit::LocalDef;
use enc_metadata::TableIndex;
use enc_symbols::{DeclKey, SyntaxMap, SyntaxNodeId, TypeSymbol};
use enc_test_utils::*;
use pretty_assertions::assert_eq;

const F: &str = "N.C.F()";

fn named(name: &str, ty: TypeSymbol, node: u32) -> LocalDef {
    LocalDef::named(name, ty, SyntaxNodeId(node))
}

/// Body storing into each local in declaration order
fn body(locals: Vec<LocalDef>) -> MethodIl {
    let mut ops = Vec::new();
    for (i, _) in locals.iter().enumerate() {
        ops.push(IlOp::Ldnull);
        ops.push(IlOp::Stloc(u16::try_from(i).expect("local index")));
    }
    ops.push(IlOp::Ret);
    locals.into_iter().fold(MethodIl::new(ops, 1), MethodIl::with_local)
}

fn program() -> (ProgramBuilder, DeclKey) {
    let mut program = ProgramBuilder::new();
    let c = program.class("N", "C");
    let f = program.method(
        &c,
        "F",
        &[],
        TypeSymbol::VOID,
        body(vec![named("x", TypeSymbol::INT32, 1), named("y", TypeSymbol::STRING, 2)]),
    );
    (program, f)
}

fn stores(listing: &[String]) -> Vec<String> {
    listing
        .iter()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|op| op.starts_with("stloc"))
        .map(str::to_owned)
        .collect()
}

#[test]
fn test_correlated_locals_keep_slots_from_debug_info() {
    init_test_tracing();
    let (mut program, f) = program();
    let mut generations = Generations::start(&program.build());

    program.il(
        &f,
        body(vec![
            named("y", TypeSymbol::STRING, 2),
            named("z", TypeSymbol::INT64, 3),
            named("x", TypeSymbol::INT32, 1),
        ]),
    );
    let first = generations.emit(
        &program.build(),
        &[SemanticEdit::update_with_map(f.clone(), SyntaxMap::identity())],
    );
    assert!(first.is_success(), "{:?}", first.diagnostics());
    assert_eq!(
        first.body(F).locals,
        vec!["int32 V_0 //x", "string V_1 //y", "int64 V_2 //z"]
    );
    assert_eq!(stores(&first.il(F)), vec!["stloc.1", "stloc.2", "stloc.0"]);
    assert_eq!(first.delta().rows_of(TableIndex::StandAloneSig).count(), 1);

    program.il(
        &f,
        body(vec![named("x", TypeSymbol::INT32, 1), named("z", TypeSymbol::INT64, 3)]),
    );
    let second = generations.emit(&program.build(), &[SemanticEdit::update_with_map(f, SyntaxMap::identity())]);
    assert!(second.is_success(), "{:?}", second.diagnostics());
    assert_eq!(
        second.body(F).locals,
        vec!["int32 V_0 //x", "[unchanged] V_1", "int64 V_2 //z"]
    );
    assert_eq!(stores(&second.il(F)), vec!["stloc.0", "stloc.2"]);
}

#[test]
fn test_without_syntax_map_locals_take_fresh_slots() {
    init_test_tracing();
    let (mut program, f) = program();
    let mut generations = Generations::start(&program.build());

    program.il(&f, body(vec![named("x", TypeSymbol::INT32, 1)]));
    let emitted = generations.emit(&program.build(), &[SemanticEdit::update(f)]);
    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    assert_eq!(
        emitted.body(F).locals,
        vec!["[unchanged] V_0", "[unchanged] V_1", "int32 V_2 //x"]
    );
}

#[test]
fn test_remapped_syntax_nodes_correlate() {
    init_test_tracing();
    let (mut program, f) = program();
    let mut generations = Generations::start(&program.build());

    program.il(
        &f,
        body(vec![named("y", TypeSymbol::STRING, 12), named("x", TypeSymbol::INT64, 11)]),
    );
    let map = SyntaxMap::from_pairs([(SyntaxNodeId(1), SyntaxNodeId(11)), (SyntaxNodeId(2), SyntaxNodeId(12))]);
    let emitted = generations.emit(&program.build(), &[SemanticEdit::update_with_map(f, map)]);
    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());
    // x changed type, so only y survives
    assert_eq!(
        emitted.body(F).locals,
        vec!["[unchanged] V_0", "string V_1 //y", "int64 V_2 //x"]
    );
}

#[test]
fn test_debug_stream_lists_slots() {
    init_test_tracing();
    let (mut program, f) = program();
    let mut generations = Generations::start(&program.build());

    program.il(&f, body(vec![named("x", TypeSymbol::INT32, 1)]));
    let emitted = generations.emit(&program.build(), &[SemanticEdit::update_with_map(f, SyntaxMap::identity())]);
    assert!(emitted.is_success(), "{:?}", emitted.diagnostics());

    let lines = emitted.streams.debug_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["name"], F);
    assert_eq!(
        lines[0]["locals"],
        serde_json::json!(["int32 V_0 //x", "[unchanged] V_1"])
    );
}
